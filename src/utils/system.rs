/// Host limit checks run before a benchmark
use std::fs;
use tracing::{info, warn};

const LIMITS_PATH: &str = "/proc/self/limits";
const PORT_RANGE_PATH: &str = "/proc/sys/net/ipv4/ip_local_port_range";
const FIN_TIMEOUT_PATH: &str = "/proc/sys/net/ipv4/tcp_fin_timeout";

/// File descriptors kept back for the runtime, logs and result files.
const FD_HEADROOM: u64 = 64;

/// Extract the soft "Max open files" limit from `/proc/self/limits` content.
fn parse_soft_fd_limit(content: &str) -> Option<u64> {
    let line = content
        .lines()
        .find(|line| line.starts_with("Max open files"))?;
    // "Max open files  <soft>  <hard>  files"
    line.split_whitespace().nth(3)?.parse::<u64>().ok()
}

/// Parse `ip_local_port_range` content into `(min, max)`.
fn parse_port_range(content: &str) -> Option<(u32, u32)> {
    let mut parts = content.split_whitespace();
    let min = parts.next()?.parse::<u32>().ok()?;
    let max = parts.next()?.parse::<u32>().ok()?;
    (max >= min).then_some((min, max))
}

/// Check file descriptor limit (ulimit -n) against the requested connections
fn check_fd_limit(connections: usize) -> bool {
    let Ok(content) = fs::read_to_string(LIMITS_PATH) else {
        // Silently ignore if file doesn't exist (non-Linux)
        return true;
    };

    match parse_soft_fd_limit(&content) {
        Some(soft_limit) if soft_limit < connections as u64 + FD_HEADROOM => {
            warn!(
                "⚠️  File descriptor limit (ulimit -n) is {} for {} connections",
                soft_limit, connections
            );
            warn!("    Clients will fail to connect and report error_reconnect");
            warn!("    Suggested: 'ulimit -n {}'", (connections as u64 + FD_HEADROOM).max(65536));
            false
        }
        _ => true,
    }
}

/// Check that the ephemeral port range can hold every client connection
fn check_port_range(connections: usize) -> bool {
    let Ok(content) = fs::read_to_string(PORT_RANGE_PATH) else {
        return true;
    };

    match parse_port_range(&content) {
        Some((min, max)) if ((max - min) as usize) < connections => {
            warn!(
                "⚠️  net.ipv4.ip_local_port_range is {}-{} ({} ports) for {} connections",
                min,
                max,
                max - min,
                connections
            );
            warn!("    Suggested: 'sysctl -w net.ipv4.ip_local_port_range=\"10000 65535\"'");
            false
        }
        _ => true,
    }
}

/// Check TCP FIN timeout setting; reconnect-heavy runs pile up TIME_WAIT sockets
fn check_tcp_fin_timeout() -> bool {
    let Ok(content) = fs::read_to_string(FIN_TIMEOUT_PATH) else {
        return true;
    };

    match content.trim().parse::<u32>() {
        Ok(value) if value > 30 => {
            warn!("ℹ️  net.ipv4.tcp_fin_timeout is {} seconds (high)", value);
            false
        }
        _ => true,
    }
}

/// Check host limits for a run of `connections` clients and log findings.
///
/// Returns `true` when nothing suboptimal was found. Never fails: a run on a
/// constrained host still completes and reports its error flags.
pub fn check_host_limits(connections: usize) -> bool {
    info!(connections, "Checking host limits before benchmark");

    let fd_ok = check_fd_limit(connections);
    let ports_ok = check_port_range(connections);
    let fin_ok = check_tcp_fin_timeout();

    let all_ok = fd_ok && ports_ok && fin_ok;
    if all_ok {
        info!("✓ Host limits accommodate the requested connection count");
    }
    all_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_host_limits_does_not_panic() {
        // Should not panic on any system (Linux, macOS, Windows)
        check_host_limits(1000);
    }

    #[test]
    fn test_parse_soft_fd_limit() {
        let content = "Limit                     Soft Limit           Hard Limit           Units\n\
                       Max cpu time              unlimited            unlimited            seconds\n\
                       Max open files            1024                 524288               files\n";
        assert_eq!(parse_soft_fd_limit(content), Some(1024));
        assert_eq!(parse_soft_fd_limit("Max cpu time unlimited"), None);
    }

    #[test]
    fn test_parse_port_range() {
        assert_eq!(parse_port_range("32768\t60999\n"), Some((32768, 60999)));
        assert_eq!(parse_port_range("60999 32768"), None);
        assert_eq!(parse_port_range("garbage"), None);
    }
}
