use std::net::{Ipv4Addr, UdpSocket};

/// Address of the interface that routes to the outside world.
///
/// Connecting a UDP socket sends nothing; it only makes the kernel pick a
/// source address. Falls back to loopback on isolated hosts.
pub fn local_ipv4() -> Ipv4Addr {
    let probe = || -> std::io::Result<Ipv4Addr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        match socket.local_addr()?.ip() {
            std::net::IpAddr::V4(v4) if !v4.is_unspecified() => Ok(v4),
            other => Err(std::io::Error::other(format!("unusable address {other}"))),
        }
    };
    match probe() {
        Ok(ip) => ip,
        Err(err) => {
            tracing::debug!(target: "wki::discovery", %err, "no routable address; using loopback");
            Ipv4Addr::LOCALHOST
        }
    }
}

/// Host name reported in health output and mDNS properties.
pub fn device_name() -> String {
    sysinfo::System::host_name()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Host label usable inside an mDNS host name (`<label>.local.`).
pub fn mdns_host_label(device: &str) -> String {
    let label: String = device
        .split('.')
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let label = label.trim_matches('-');
    if label.is_empty() {
        "wki".to_string()
    } else {
        label.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_label_is_sanitized() {
        assert_eq!(mdns_host_label("werkstatt-pc.fritz.box"), "werkstatt-pc");
        assert_eq!(mdns_host_label("Büro PC"), "B-ro-PC");
        assert_eq!(mdns_host_label(""), "wki");
    }

    #[test]
    fn device_name_is_never_empty() {
        assert!(!device_name().is_empty());
    }
}
