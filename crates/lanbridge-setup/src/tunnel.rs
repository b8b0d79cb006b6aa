use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use lanbridge_core::tunnels::TunnelList;
use lanbridge_core::{Endpoint, Error, PollPolicy, Probe, Result, check_interrupted};

use crate::cmd::{Runner, Step};
use crate::config::TunnelConfig;

/// Register the auth token with ngrok (`ngrok config add-authtoken`).
pub fn configure_authtoken(config: &TunnelConfig, runner: &impl Runner, token: &str) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::precondition("ngrok auth token must not be empty"));
    }
    runner.run(
        &Step::new(
            "Configuring ngrok",
            config.ngrok_path.display().to_string(),
            &["config", "add-authtoken", token],
        )
        .failure("Error configuring ngrok")
        .sensitive(),
    )?;
    tracing::info!("Ngrok has been configured successfully.");
    Ok(())
}

/// Source of raw status API bodies.
///
/// `Err` means the API is not reachable yet and is retried by [`discover`].
pub trait StatusSource {
    fn fetch(&self) -> std::result::Result<String, String>;
}

/// Status API over HTTP.
#[derive(Debug)]
pub struct HttpStatus {
    http: reqwest::blocking::Client,
    url: String,
}

impl HttpStatus {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        // reqwest is built with rustls-no-provider; `Err` only means a
        // provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| Error::Discovery(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

impl StatusSource for HttpStatus {
    fn fetch(&self) -> std::result::Result<String, String> {
        let resp = self.http.get(&self.url).send().map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("{} returned HTTP {status}", self.url));
        }
        resp.text().map_err(|e| e.to_string())
    }
}

/// Poll the status API until the first tunnel reports its public endpoint.
///
/// Unreachable API and an empty tunnel list are retried; a malformed body or
/// public URL is fatal. `alive` is checked before every probe so a crashed
/// tunnel process fails fast instead of waiting for the timeout.
pub fn discover<F>(
    source: &impl StatusSource,
    policy: &PollPolicy,
    interrupt: &AtomicBool,
    mut alive: F,
) -> Result<Endpoint>
where
    F: FnMut() -> Result<()>,
{
    policy.wait_for("tunnel endpoint", interrupt, || {
        alive()?;
        let body = match source.fetch() {
            Ok(body) => body,
            Err(reason) => return Ok(Probe::Pending(reason)),
        };
        Ok(match TunnelList::parse(&body)?.first_endpoint()? {
            Some(endpoint) => Probe::Ready(endpoint),
            None => Probe::Pending("no tunnels listed yet".into()),
        })
    })
}

/// A running `ngrok tcp <port>` child.
///
/// The child is killed and reaped on drop.
#[derive(Debug)]
pub struct TunnelProcess {
    child: Child,
    ngrok_path: PathBuf,
}

impl TunnelProcess {
    /// Start the tunnel in the background, in its own process group so a
    /// terminal Ctrl+C reaches only us and teardown stays ordered.
    pub fn spawn(config: &TunnelConfig) -> Result<Self> {
        let port = config.port.to_string();
        tracing::info!("Starting Ngrok tunnel...");
        tracing::debug!("exec (background): {} tcp {port}", config.ngrok_path.display());

        let child = Command::new(&config.ngrok_path)
            .args(["tcp", &port])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: config.ngrok_path.display().to_string(),
                source,
            })?;

        Ok(Self {
            child,
            ngrok_path: config.ngrok_path.clone(),
        })
    }

    /// Error if the child has already exited.
    pub fn ensure_running(&mut self) -> Result<()> {
        match self.child.try_wait()? {
            Some(status) => Err(Error::Discovery(format!(
                "ngrok exited before reporting a tunnel ({status})"
            ))),
            None => Ok(()),
        }
    }

    /// Start the tunnel and wait for its public endpoint.
    ///
    /// Setting `interrupt` aborts discovery; the child is reaped on drop.
    pub fn start(config: &TunnelConfig, interrupt: &AtomicBool) -> Result<(Self, Endpoint)> {
        check_interrupted(interrupt)?;
        let mut tunnel = Self::spawn(config)?;
        let source = HttpStatus::new(&config.status_url, config.request_timeout)?;
        let endpoint =
            discover(&source, &config.discovery, interrupt, || tunnel.ensure_running())?;
        tracing::info!("Ngrok tunnel established: {endpoint}");
        Ok((tunnel, endpoint))
    }

    /// Ask ngrok to stop, then reap the child.
    ///
    /// A failing `ngrok stop` is logged; the child is killed regardless.
    pub fn stop(self, runner: &impl Runner) {
        let step = Step::new(
            "Stopping Ngrok tunnel",
            self.ngrok_path.display().to_string(),
            &["stop"],
        );
        match runner.run(&step) {
            Ok(_) => tracing::info!("Ngrok tunnel stopped."),
            Err(e) => tracing::warn!("ngrok stop failed, terminating the tunnel process: {e}"),
        }
    }
}

impl Drop for TunnelProcess {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use super::*;
    use crate::testing::FakeRunner;

    const STATUS: &str = r#"{"tunnels":[{"public_url":"tcp://0.tcp.ngrok.io:55123"}]}"#;

    struct ScriptedStatus(RefCell<VecDeque<std::result::Result<String, String>>>);

    impl ScriptedStatus {
        fn new(responses: Vec<std::result::Result<&str, &str>>) -> Self {
            Self(RefCell::new(
                responses
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ))
        }
    }

    impl StatusSource for ScriptedStatus {
        fn fetch(&self) -> std::result::Result<String, String> {
            self.0
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err("script exhausted".into()))
        }
    }

    fn poll() -> PollPolicy {
        PollPolicy::new(Duration::from_secs(5), Duration::ZERO, Duration::ZERO)
    }

    #[test]
    fn authtoken_step_is_sensitive() {
        let runner = FakeRunner::new();
        configure_authtoken(&TunnelConfig::default(), &runner, " 2abcTOKEN ").expect("configured");
        let steps = runner.steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].program, "/snap/bin/ngrok");
        assert_eq!(steps[0].args, vec!["config", "add-authtoken", "2abcTOKEN"]);
        assert!(steps[0].sensitive);
    }

    #[test]
    fn authtoken_failure_is_fatal() {
        let runner =
            FakeRunner::new().always_fail("/snap/bin/ngrok config add-authtoken bad");
        let err = configure_authtoken(&TunnelConfig::default(), &runner, "bad")
            .expect_err("ngrok rejected token");
        match err {
            Error::Command { message, .. } => assert_eq!(message, "Error configuring ngrok"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_authtoken_is_rejected_without_running_ngrok() {
        let runner = FakeRunner::new();
        let err = configure_authtoken(&TunnelConfig::default(), &runner, "   ")
            .expect_err("empty token");
        assert!(matches!(err, Error::Precondition(_)));
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn discover_reads_first_tunnel() {
        let source = ScriptedStatus::new(vec![Ok(STATUS)]);
        let endpoint =
            discover(&source, &poll(), &AtomicBool::new(false), || Ok(())).expect("endpoint");
        assert_eq!(endpoint.host, "0.tcp.ngrok.io");
        assert_eq!(endpoint.port, 55123);
    }

    #[test]
    fn discover_waits_through_startup() {
        let source = ScriptedStatus::new(vec![
            Err("connection refused"),
            Ok(r#"{"tunnels":[]}"#),
            Ok(STATUS),
        ]);
        let checks = Cell::new(0);
        let endpoint = discover(&source, &poll(), &AtomicBool::new(false), || {
            checks.set(checks.get() + 1);
            Ok(())
        })
        .expect("endpoint on third probe");
        assert_eq!(endpoint.to_string(), "0.tcp.ngrok.io:55123");
        assert_eq!(checks.get(), 3);
    }

    #[test]
    fn discover_fails_fast_on_malformed_body() {
        let source = ScriptedStatus::new(vec![Ok("not json"), Ok(STATUS)]);
        let err = discover(&source, &poll(), &AtomicBool::new(false), || Ok(()))
            .expect_err("malformed");
        assert!(matches!(err, Error::Discovery(_)));
    }

    #[test]
    fn discover_times_out_when_never_ready() {
        let source = ScriptedStatus::new(vec![]);
        let policy = PollPolicy::new(
            Duration::ZERO,
            Duration::from_millis(10),
            Duration::from_millis(10),
        );
        let err = discover(&source, &policy, &AtomicBool::new(false), || Ok(()))
            .expect_err("timeout");
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[test]
    fn discover_stops_when_tunnel_process_died() {
        let source = ScriptedStatus::new(vec![Err("connection refused"), Ok(STATUS)]);
        let err = discover(&source, &poll(), &AtomicBool::new(false), || {
            Err(Error::Discovery("ngrok exited before reporting a tunnel".into()))
        })
        .expect_err("dead tunnel");
        assert!(matches!(err, Error::Discovery(_)));
    }

    #[test]
    fn discover_stops_on_interrupt() {
        let source = ScriptedStatus::new(vec![Err("connection refused"), Ok(STATUS)]);
        let interrupt = AtomicBool::new(false);
        let err = discover(&source, &poll(), &interrupt, || {
            interrupt.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        })
        .expect_err("interrupted");
        assert!(matches!(err, Error::Interrupted));
        assert_eq!(source.0.borrow().len(), 1, "second probe must not run");
    }

    #[test]
    fn tunnel_is_not_spawned_once_interrupted() {
        let config = TunnelConfig {
            ngrok_path: PathBuf::from("/nonexistent/lanbridge/ngrok"),
            ..TunnelConfig::default()
        };
        let err = TunnelProcess::start(&config, &AtomicBool::new(true)).expect_err("interrupted");
        assert!(matches!(err, Error::Interrupted));
    }

    #[test]
    fn http_status_fetches_body() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).expect("read request");
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{STATUS}",
                STATUS.len()
            );
            stream.write_all(response.as_bytes()).expect("write response");
        });

        let source = HttpStatus::new(
            &format!("http://{addr}/api/tunnels"),
            Duration::from_secs(5),
        )
        .expect("client");
        let endpoint =
            discover(&source, &poll(), &AtomicBool::new(false), || Ok(())).expect("endpoint");
        assert_eq!(endpoint.port, 55123);
        server.join().expect("server thread");
    }

    #[test]
    fn http_status_unreachable_is_pending() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let source =
            HttpStatus::new(&format!("http://{addr}/api/tunnels"), Duration::from_secs(1))
                .expect("client");
        assert!(source.fetch().is_err());
    }
}
