use std::net::IpAddr;

use dialoguer::{Confirm, Password};
use lanbridge_core::{Error, Result};

/// Resolve the ngrok auth token: flag/env value first, then a hidden prompt.
pub fn prompt_authtoken(non_interactive: bool, provided: Option<&str>) -> Result<String> {
    if let Some(token) = provided.map(str::trim)
        && !token.is_empty()
    {
        return Ok(token.to_string());
    }
    if non_interactive {
        return Err(Error::precondition(
            "--authtoken or NGROK_AUTHTOKEN is required in non-interactive mode",
        ));
    }
    let token: String = Password::new()
        .with_prompt("Enter your Ngrok auth token")
        .interact()
        .map_err(|e| Error::Prompt(e.to_string()))?;
    Ok(token)
}

/// Answers to give the OpenVPN installer script for an ngrok-fronted server.
pub fn recommended_config(local_ip: IpAddr) -> String {
    format!(
        "Recommended Configuration:\n\
         IP Address: {local_ip} (your local static ip address)\n\
         Public IPv4 address or hostname: 0.tcp.ngrok.io     (or 1.tcp.ngrok.io)\n\
         Do you want to enable IPv6 support (NAT)? [y/n]: n\n\
         Port choice [1-3]: 1                                (Port 1194)\n\
         Protocol [1-2]: 2                                   (TCP) (Ngrok only support TCP by default)\n\
         DNS [1-12]: 9                                       (Google or anything for your taste)\n\
         Enable compression? [y/n]: n\n\
         Customize encryption settings? [y/n]: n             (default should suffice)\n\
         Client name: ovpn name                              (anything suffice)\n\
         Select an option [1-2]: 1                           (passwordless or password)\n"
    )
}

/// Print the recommended answers and wait until the user is ready.
pub fn show_recommended_config(local_ip: IpAddr, non_interactive: bool) -> Result<()> {
    #[allow(clippy::print_stdout)]
    {
        println!();
        println!("{}", recommended_config(local_ip));
        println!("Please use these recommendations when prompted by the core.sh script.");
    }
    if non_interactive {
        return Ok(());
    }
    let ready = Confirm::new()
        .with_prompt("Continue to the OpenVPN installer?")
        .default(true)
        .interact()
        .map_err(|e| Error::Prompt(e.to_string()))?;
    if !ready {
        return Err(Error::precondition("setup cancelled before running core.sh"));
    }
    Ok(())
}
