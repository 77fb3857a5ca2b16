//! `netstat -n` output parsing.

use std::net::IpAddr;

use crate::error::{Error, Result};

/// Local and peer IPs of every ESTABLISHED TCP row, in table order.
///
/// A row that cannot be read completely is an error rather than being
/// skipped: a missed address could let the router capture the tunnel's own
/// traffic.
pub fn parse_established(output: &str) -> Result<Vec<String>> {
    let mut addresses = Vec::new();

    for line in output.lines() {
        let row = line.trim();
        if !row.starts_with("tcp") || !row.contains("ESTABLISHED") {
            continue;
        }

        let columns: Vec<&str> = row.split_whitespace().collect();
        if columns.len() < 5 {
            return Err(Error::Scan(format!("short netstat row: {}", row)));
        }

        for column in &columns[3..5] {
            let ip = parse_host(column)
                .ok_or_else(|| Error::Scan(format!("unparsable address in row: {}", row)))?;
            addresses.push(ip.to_string());
        }
    }

    Ok(addresses)
}

/// The IP part of `host:port`.
///
/// Handles multiple address formats:
/// - IPv4: "10.0.0.5:22"
/// - IPv6: "::1:38023" or "[fe80::1%eth0]:443"
fn parse_host(address: &str) -> Option<IpAddr> {
    let last_colon = address.rfind(':')?;
    let host = &address[..last_colon];
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    // Scoped IPv6 addresses carry an interface suffix
    let host = host.split('%').next().unwrap_or(host);
    host.parse().ok()
}
