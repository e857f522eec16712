//! Network infrastructure: local port probing using `spawn_blocking`.

use std::time::Duration;

use anyhow::Result;

/// Connect timeout for the direct socket probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Whether something accepts TCP connections on `127.0.0.1:port`.
///
/// # Errors
///
/// Returns an error only if the blocking task panics.
pub async fn tcp_listening(port: u16) -> Result<bool> {
    let result = tokio::task::spawn_blocking(move || {
        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
        std::net::TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok()
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking panicked: {e}"))?;
    Ok(result)
}

/// Process ids from `lsof -t` style output, one per line.
#[must_use]
pub fn parse_pids(output: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = output
        .lines()
        .filter_map(|l| l.trim().parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Whether `ss -ltnH` output lists a listener on `port`.
#[must_use]
pub fn ss_lists_port(output: &str, port: u16) -> bool {
    let suffix = format!(":{port}");
    output.lines().any(|line| {
        line.split_whitespace()
            .nth(3)
            .is_some_and(|local| local.ends_with(&suffix))
    })
}
