//! ICMP prober with native sockets and a `ping` command fallback.
//!
//! A probe is a sweep of five echo requests. The target counts as alive when
//! at least one reply comes back, and the detail string is a round-trip
//! summary line in the familiar `rtt min/avg/max/mdev` shape.

use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::process::Command;

use super::ProbeError;

/// Echo requests per probe.
const ECHO_COUNT: u16 = 5;

/// Reply wait per echo request. Bounds the whole sweep at 5 seconds.
const ECHO_TIMEOUT: Duration = Duration::from_secs(1);

/// ICMP capability state
#[derive(Debug, Clone, Copy, PartialEq)]
enum IcmpCapability {
    /// Native ICMP sockets are available
    Native,
    /// Only command fallback is available
    CommandOnly,
}

static ICMP_CAPABILITY: OnceLock<IcmpCapability> = OnceLock::new();

/// Sequence counter so concurrent sweeps to the same destination stay apart.
static PING_SEQUENCE: AtomicU16 = AtomicU16::new(0);

/// Detect ICMP capability by attempting to create a socket.
fn detect_icmp_capability() -> IcmpCapability {
    // Try RAW first (requires CAP_NET_RAW or root), then DGRAM (unprivileged
    // on Linux with ping_group_range set, or macOS).
    if Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("ICMP probe: using native ICMP (RAW socket, privileged)");
        return IcmpCapability::Native;
    }
    if Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("ICMP probe: using native ICMP (DGRAM socket, unprivileged)");
        return IcmpCapability::Native;
    }
    tracing::info!("ICMP probe: native ICMP unavailable, using command fallback");
    IcmpCapability::CommandOnly
}

/// ICMP echo prober for one hostname.
#[derive(Debug)]
pub struct IcmpProbe {
    hostname: String,
}

impl IcmpProbe {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
        }
    }

    pub fn target(&self) -> &str {
        &self.hostname
    }

    /// Sweep the target with [`ECHO_COUNT`] echo requests.
    pub async fn is_alive(&self) -> (bool, String) {
        let capability = *ICMP_CAPABILITY.get_or_init(detect_icmp_capability);
        if capability == IcmpCapability::CommandOnly {
            return self.is_alive_command().await;
        }

        let ip = match resolve_address(&self.hostname).await {
            Ok(ip) => ip,
            Err(_) => {
                return (
                    false,
                    format!("{}: failure in name resolution", self.hostname),
                )
            }
        };

        // Blocking sockets in a dedicated thread keep the timing honest.
        let sweep =
            tokio::task::spawn_blocking(move || run_blocking_sweep(ip, ECHO_COUNT, ECHO_TIMEOUT))
                .await;

        match sweep {
            Ok(Ok(rtts)) if !rtts.is_empty() => (true, summarize_rtts(&rtts)),
            Ok(Ok(_)) => (false, format!("{}: unreachable", self.hostname)),
            Ok(Err(e)) => {
                let detail = e.to_string();
                if detail.contains("Permission") || detail.contains("Operation not permitted") {
                    tracing::warn!(
                        "native ping for {} failed with a permission error, \
                         falling back to command: {}",
                        self.hostname,
                        detail
                    );
                    self.is_alive_command().await
                } else {
                    (false, format!("{}: unreachable", self.hostname))
                }
            }
            Err(e) => {
                tracing::warn!("ping sweep task failed for {}: {}", self.hostname, e);
                (false, format!("{}: unreachable", self.hostname))
            }
        }
    }

    /// Run `ping -c 5 -q` and classify by exit code.
    async fn is_alive_command(&self) -> (bool, String) {
        let count = ECHO_COUNT.to_string();
        let output = match Command::new("ping")
            .args(["-c", &count, "-q", &self.hostname])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("failed to execute ping: {}", e);
                return (
                    false,
                    format!("{}: failure in name resolution", self.hostname),
                );
            }
        };

        match output.status.code() {
            Some(0) => {
                // The last non-empty line is the rtt summary.
                let stdout = String::from_utf8_lossy(&output.stdout);
                let summary = stdout
                    .lines()
                    .rev()
                    .find(|line| !line.trim().is_empty())
                    .unwrap_or_default()
                    .to_string();
                (true, summary)
            }
            Some(1) => (false, format!("{}: unreachable", self.hostname)),
            _ => (
                false,
                format!("{}: failure in name resolution", self.hostname),
            ),
        }
    }
}

/// Resolve hostname to IP address.
async fn resolve_address(address: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs: Vec<_> = tokio::net::lookup_host(format!("{}:0", address))
        .await
        .map_err(|e| ProbeError::Network(format!("DNS resolution failed: {}", e)))?
        .collect();

    addrs
        .into_iter()
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| ProbeError::Network(format!("no addresses found for {}", address)))
}

fn open_icmp_socket(ip: IpAddr) -> Result<Socket, ProbeError> {
    let (domain, protocol) = match ip {
        IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4),
        IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6),
    };
    Socket::new(domain, Type::RAW, Some(protocol))
        .or_else(|_| Socket::new(domain, Type::DGRAM, Some(protocol)))
        .map_err(|e| ProbeError::Network(format!("failed to create ICMP socket: {}", e)))
}

/// Send `count` echo requests and collect the round-trip time of each reply.
/// Lost echoes are skipped; only socket-level permission errors fail the
/// sweep so the caller can fall back to the command path.
fn run_blocking_sweep(
    ip: IpAddr,
    count: u16,
    per_echo_timeout: Duration,
) -> Result<Vec<Duration>, ProbeError> {
    let socket = open_icmp_socket(ip)?;
    socket
        .set_write_timeout(Some(per_echo_timeout))
        .map_err(|e| ProbeError::Network(format!("failed to set timeout: {}", e)))?;
    socket
        .connect(&SocketAddr::new(ip, 0).into())
        .map_err(|e| ProbeError::Network(format!("failed to connect: {}", e)))?;

    let identifier: u16 = rand::random();
    let base_sequence = PING_SEQUENCE.fetch_add(count, Ordering::Relaxed);
    let mut rtts = Vec::with_capacity(count as usize);

    for i in 0..count {
        let sequence = base_sequence.wrapping_add(i);
        let packet = build_echo_request(ip, identifier, sequence);

        let start = Instant::now();
        if let Err(e) = socket.send(&packet) {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                return Err(ProbeError::Network(format!("Permission denied: {}", e)));
            }
            // Destination unreachable surfaces here on a connected socket.
            continue;
        }

        if let Some(rtt) =
            wait_for_reply(&socket, ip, identifier, sequence, start, per_echo_timeout)?
        {
            rtts.push(rtt);
        }
    }

    Ok(rtts)
}

/// Wait for the echo reply matching `identifier`/`sequence`, discarding any
/// other traffic, until `timeout` elapses.
fn wait_for_reply(
    socket: &Socket,
    ip: IpAddr,
    identifier: u16,
    sequence: u16,
    start: Instant,
    timeout: Duration,
) -> Result<Option<Duration>, ProbeError> {
    loop {
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Ok(None);
        }
        socket
            .set_read_timeout(Some(timeout - elapsed))
            .map_err(|e| ProbeError::Network(format!("failed to set timeout: {}", e)))?;

        let mut buf: [MaybeUninit<u8>; 1500] = unsafe { MaybeUninit::uninit().assume_init() };
        let len = match socket.recv(&mut buf) {
            Ok(len) => len,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Ok(None)
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ProbeError::Network(format!("Permission denied: {}", e)))
            }
            // e.g. an asynchronous unreachable error; count the echo as lost
            Err(_) => return Ok(None),
        };
        // SAFETY: recv initialized `len` bytes
        let buf: &[u8] = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, len) };

        if is_echo_reply(ip, buf, identifier, sequence) {
            return Ok(Some(start.elapsed()));
        }
        // Someone else's packet, keep waiting.
    }
}

/// Build an echo request packet: ICMP type 8 for IPv4, ICMPv6 type 128.
fn build_echo_request(ip: IpAddr, identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = vec![0u8; 64]; // 8 byte header + 56 byte payload

    packet[0] = match ip {
        IpAddr::V4(_) => 8,
        IpAddr::V6(_) => 128,
    };
    packet[1] = 0; // Code
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    // Payload carries the send timestamp.
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    packet[8..16].copy_from_slice(&timestamp.to_be_bytes());

    // The kernel computes the ICMPv6 checksum; IPv4 is on us.
    if ip.is_ipv4() {
        let checksum = icmp_checksum(&packet);
        packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    }

    packet
}

/// Does `buf` hold the echo reply for `identifier`/`sequence`?
///
/// RAW IPv4 sockets deliver the IP header in front of the ICMP message,
/// DGRAM sockets do not; the version nibble tells the two apart.
fn is_echo_reply(ip: IpAddr, buf: &[u8], identifier: u16, sequence: u16) -> bool {
    let (offset, reply_type) = match ip {
        IpAddr::V4(_) => {
            let offset = if !buf.is_empty() && buf[0] >> 4 == 4 {
                20
            } else {
                0
            };
            (offset, 0u8)
        }
        IpAddr::V6(_) => (0, 129u8),
    };
    if buf.len() < offset + 8 {
        return false;
    }
    buf[offset] == reply_type
        && u16::from_be_bytes([buf[offset + 4], buf[offset + 5]]) == identifier
        && u16::from_be_bytes([buf[offset + 6], buf[offset + 7]]) == sequence
}

/// Compute ICMP checksum (RFC 1071).
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;

    while i < data.len() - 1 {
        sum += u16::from_be_bytes([data[i], data[i + 1]]) as u32;
        i += 2;
    }

    // Handle odd byte
    if i < data.len() {
        sum += (data[i] as u32) << 8;
    }

    // Fold 32-bit sum to 16 bits
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}

/// Format collected round-trip times as an `rtt min/avg/max/mdev` line.
fn summarize_rtts(rtts: &[Duration]) -> String {
    let ms: Vec<f64> = rtts.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
    let min = ms.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = ms.iter().cloned().fold(0.0f64, f64::max);
    let avg = ms.iter().sum::<f64>() / ms.len() as f64;
    let mdev = (ms.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / ms.len() as f64).sqrt();
    format!(
        "rtt min/avg/max/mdev = {:.3}/{:.3}/{:.3}/{:.3} ms",
        min, avg, max, mdev
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    const V4: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    const V6: IpAddr = IpAddr::V6(Ipv6Addr::LOCALHOST);

    #[test]
    fn test_icmp_checksum_folds_to_zero() {
        // Checksumming a packet that already carries a correct checksum
        // yields zero.
        let packet = build_echo_request(V4, 0x1234, 0x0001);
        assert_eq!(icmp_checksum(&packet), 0);
    }

    #[test]
    fn test_build_echo_request_v4() {
        let packet = build_echo_request(V4, 0x1234, 0x0001);
        assert_eq!(packet.len(), 64);
        assert_eq!(packet[0], 8); // Type
        assert_eq!(packet[1], 0); // Code
        assert_eq!(packet[4..6], [0x12, 0x34]); // ID
        assert_eq!(packet[6..8], [0x00, 0x01]); // Sequence
    }

    #[test]
    fn test_build_echo_request_v6() {
        let packet = build_echo_request(V6, 0xBEEF, 7);
        assert_eq!(packet[0], 128);
        assert_eq!(packet[4..6], [0xBE, 0xEF]);
        assert_eq!(packet[6..8], [0x00, 0x07]);
    }

    #[test]
    fn test_is_echo_reply_dgram() {
        let mut reply = vec![0u8; 8];
        reply[0] = 0; // Echo Reply
        reply[4..6].copy_from_slice(&0x1234u16.to_be_bytes());
        reply[6..8].copy_from_slice(&5u16.to_be_bytes());
        assert!(is_echo_reply(V4, &reply, 0x1234, 5));
        assert!(!is_echo_reply(V4, &reply, 0x1234, 6));
        assert!(!is_echo_reply(V4, &reply, 0x4321, 5));
    }

    #[test]
    fn test_is_echo_reply_skips_ip_header() {
        // RAW socket framing: 20-byte IPv4 header in front.
        let mut reply = vec![0u8; 28];
        reply[0] = 0x45; // version 4, IHL 5
        reply[20] = 0; // Echo Reply
        reply[24..26].copy_from_slice(&0x00AAu16.to_be_bytes());
        reply[26..28].copy_from_slice(&9u16.to_be_bytes());
        assert!(is_echo_reply(V4, &reply, 0x00AA, 9));
    }

    #[test]
    fn test_is_echo_reply_truncated() {
        assert!(!is_echo_reply(V4, &[0u8; 4], 1, 1));
        assert!(!is_echo_reply(V6, &[], 1, 1));
    }

    #[test]
    fn test_summarize_rtts() {
        let rtts = [
            Duration::from_micros(1000),
            Duration::from_micros(2000),
            Duration::from_micros(3000),
        ];
        let summary = summarize_rtts(&rtts);
        assert_eq!(summary, "rtt min/avg/max/mdev = 1.000/2.000/3.000/0.816 ms");
    }

    #[tokio::test]
    async fn test_resolve_address_literal() {
        assert_eq!(resolve_address("127.0.0.1").await.unwrap(), V4);
        assert_eq!(resolve_address("::1").await.unwrap(), V6);
    }
}
