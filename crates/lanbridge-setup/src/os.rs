use std::collections::HashMap;
use std::fs;

/// Parse `/etc/os-release` content into key-value pairs.
fn parse_os_release(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim_matches('"');
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

/// Whether the release describes an apt-based distribution.
fn is_debian_family(release: &HashMap<String, String>) -> bool {
    let id = release.get("ID").map_or("", String::as_str);
    let like = release.get("ID_LIKE").map_or("", String::as_str);
    id == "debian" || id == "ubuntu" || like.split_whitespace().any(|l| l == "debian" || l == "ubuntu")
}

/// Log the detected distribution and warn when it is not apt-based.
///
/// The installer drives `apt` and `snap`; on other distributions those
/// steps will most likely fail, but the run is not stopped here.
pub fn report_distribution() {
    let Ok(content) = fs::read_to_string("/etc/os-release") else {
        tracing::warn!("could not read /etc/os-release; assuming an apt-based host");
        return;
    };
    let release = parse_os_release(&content);
    let name = release
        .get("PRETTY_NAME")
        .or_else(|| release.get("ID"))
        .map_or("unknown", String::as_str);
    if is_debian_family(&release) {
        tracing::info!("detected {name}");
    } else {
        tracing::warn!("detected {name}: only Debian/Ubuntu hosts (apt + snap) are supported");
    }
}
