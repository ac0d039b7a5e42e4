use anyhow::{Result, anyhow, bail};

/// Convert macOS /dev/tty.* ports to /dev/cu.* ports
///
/// On macOS, /dev/tty.* ports block on open until carrier detect; the
/// /dev/cu.* twin does not.
fn normalize_mac_port_name(port_name: &str) -> String {
    #[cfg(target_os = "macos")]
    {
        if port_name.starts_with("/dev/tty.") {
            return port_name.replace("/dev/tty.", "/dev/cu.");
        }
    }
    port_name.to_string()
}

pub fn normalize_port_name(port_name: &str) -> String {
    normalize_mac_port_name(port_name)
}

/// Fail early, listing what is there, when an explicit port does not exist.
pub fn check_port_available(port_name: &str) -> Result<()> {
    let ports =
        serialport::available_ports().map_err(|e| anyhow!("Failed to get available ports list: {}", e))?;

    #[cfg(target_os = "macos")]
    let ports: Vec<_> = ports
        .into_iter()
        .filter(|port| !port.port_name.starts_with("/dev/tty."))
        .collect();

    if ports.iter().any(|p| p.port_name == port_name) {
        return Ok(());
    }

    let available_ports: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();
    bail!(
        "The specified port '{}' does not exist. Available ports: {}",
        port_name,
        if available_ports.is_empty() {
            "No available ports".to_string()
        } else {
            available_ports.join(", ")
        }
    )
}
