//! Queryable message id codec.
//!
//! A message stored on a broker is globally addressable by the pair
//! (store host, physical commit-log offset). The encoded form is
//! 32 uppercase hex chars: 4 bytes IPv4 + 4 bytes port + 8 bytes offset.
//! Callers fall back to the broker-assigned id when encoding fails
//! (e.g. the store host is not a plain ip:port).

pub fn encode(store_host: &str, commit_log_offset: u64) -> Option<String> {
    let (ip, port) = store_host.split_once(':')?;
    let ip: std::net::Ipv4Addr = ip.parse().ok()?;
    let port: u16 = port.parse().ok()?;

    let mut buf = [0u8; 16];
    buf[..4].copy_from_slice(&ip.octets());
    buf[4..8].copy_from_slice(&(port as u32).to_be_bytes());
    buf[8..].copy_from_slice(&commit_log_offset.to_be_bytes());
    Some(hex::encode_upper(buf))
}
