//! Address ranges routed through the tunnel.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

/// Narrowest network a guessed range is allowed to be.
pub const MIN_COVERING_PREFIX: u8 = 24;

/// Smallest network that contains every address, never narrower than a /24.
///
/// Cluster ranges are only ever guessed from a sample of pod or service
/// IPs, so a single address still yields its whole /24.
pub fn covering_cidr(ips: &[Ipv4Addr]) -> Option<Ipv4Net> {
    let (first, rest) = ips.split_first()?;
    let first = u32::from(*first);

    let shared = rest
        .iter()
        .map(|ip| (first ^ u32::from(*ip)).leading_zeros() as u8)
        .fold(MIN_COVERING_PREFIX, u8::min);

    Ipv4Net::new(Ipv4Addr::from(first), shared)
        .ok()
        .map(|net| net.trunc())
}

/// Parse the addresses that are IPv4, skipping everything else.
pub fn ipv4_addresses<'a, I>(values: I) -> Vec<Ipv4Addr>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .filter_map(|value| value.trim().parse().ok())
        .collect()
}
