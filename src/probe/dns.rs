//! DNS prober using raw UDP packets.
//!
//! Resolves the target hostname's A record against a configurable nameserver
//! and reports alive only when the answer is an IPv4 dotted quad. Resolver
//! failures map to fixed, human-readable detail strings.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::net::UdpSocket;
use tokio::time::Instant;

/// Nameserver queried when none is configured.
const DEFAULT_NAMESERVER: &str = "8.8.8.8";

/// Wait per query attempt.
const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Overall budget across retries.
const QUERY_LIFETIME: Duration = Duration::from_secs(5);

/// Dotted-quad IPv4 syntax, each octet 0-255.
fn ipv4_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:(?:[1-9]?\d|1\d\d|2[0-4]\d|25[0-5])\.){3}(?:[1-9]?\d|1\d\d|2[0-4]\d|25[0-5])$",
        )
        .expect("static regex")
    })
}

/// What a single query attempt produced.
enum QueryOutcome {
    /// Parsed response, already mapped to its answer string.
    Answer(String),
    /// No response within the attempt timeout.
    Timeout,
    /// Socket-level failure; no point retrying.
    Unreachable,
}

/// DNS lookup prober for one hostname.
#[derive(Debug)]
pub struct DnsProbe {
    hostname: String,
    nameserver: String,
}

impl DnsProbe {
    pub fn new(hostname: &str) -> Self {
        Self::with_nameserver(hostname, DEFAULT_NAMESERVER)
    }

    pub fn with_nameserver(hostname: &str, nameserver: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            nameserver: nameserver.to_string(),
        }
    }

    pub fn target(&self) -> &str {
        &self.hostname
    }

    /// Alive iff the lookup answer is an IPv4 dotted quad.
    pub async fn is_alive(&self) -> (bool, String) {
        let answer = self.lookup().await;
        (ipv4_pattern().is_match(&answer), answer)
    }

    /// Resolve the hostname, retrying within [`QUERY_LIFETIME`].
    pub async fn lookup(&self) -> String {
        let deadline = Instant::now() + QUERY_LIFETIME;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return "Request Timeout".to_string();
            }
            match self.query_once(remaining.min(QUERY_TIMEOUT)).await {
                QueryOutcome::Answer(answer) => return answer,
                QueryOutcome::Timeout => continue,
                QueryOutcome::Unreachable => return "No response to dns request".to_string(),
            }
        }
    }

    async fn query_once(&self, timeout: Duration) -> QueryOutcome {
        let target_addr = if self.nameserver.contains(':') {
            self.nameserver.clone()
        } else {
            format!("{}:53", self.nameserver)
        };

        let packet = build_query(&self.hostname);
        let tx_id = u16::from_be_bytes([packet[0], packet[1]]);

        let socket = match UdpSocket::bind("0.0.0.0:0").await {
            Ok(socket) => socket,
            Err(e) => {
                tracing::warn!("failed to bind dns socket: {}", e);
                return QueryOutcome::Unreachable;
            }
        };
        if let Err(e) = socket.connect(&target_addr).await {
            tracing::warn!("failed to connect to nameserver {}: {}", target_addr, e);
            return QueryOutcome::Unreachable;
        }
        if let Err(e) = socket.send(&packet).await {
            tracing::warn!("failed to send dns query: {}", e);
            return QueryOutcome::Unreachable;
        }

        // Keep receiving on this socket until the attempt deadline; a
        // mismatched transaction ID is someone else's response and must not
        // end the attempt early, or a chatty responder would drive a re-send
        // loop.
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return QueryOutcome::Timeout;
            }
            let mut response = [0u8; 512];
            let n = match tokio::time::timeout(remaining, socket.recv(&mut response)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    tracing::warn!("failed to receive dns response: {}", e);
                    return QueryOutcome::Unreachable;
                }
                Err(_) => return QueryOutcome::Timeout,
            };

            if let Some(answer) = parse_answer(&response[..n], tx_id) {
                return QueryOutcome::Answer(answer);
            }
        }
    }
}

/// Build a DNS query packet for the hostname's A record.
fn build_query(hostname: &str) -> Vec<u8> {
    let tx_id: u16 = rand::random();
    let flags: u16 = 0x0100; // Standard query, recursion desired
    let qd_count: u16 = 1;
    let an_count: u16 = 0;
    let ns_count: u16 = 0;
    let ar_count: u16 = 0;

    // Header (12 bytes)
    let mut packet = Vec::with_capacity(64);
    packet.extend_from_slice(&tx_id.to_be_bytes());
    packet.extend_from_slice(&flags.to_be_bytes());
    packet.extend_from_slice(&qd_count.to_be_bytes());
    packet.extend_from_slice(&an_count.to_be_bytes());
    packet.extend_from_slice(&ns_count.to_be_bytes());
    packet.extend_from_slice(&ar_count.to_be_bytes());

    // Question: length-prefixed labels, null terminated
    for label in hostname.trim_end_matches('.').split('.') {
        let label = label.as_bytes();
        packet.push(label.len().min(63) as u8);
        packet.extend_from_slice(&label[..label.len().min(63)]);
    }
    packet.push(0);

    // QTYPE: A record (1)
    packet.extend_from_slice(&1u16.to_be_bytes());
    // QCLASS: IN (1)
    packet.extend_from_slice(&1u16.to_be_bytes());

    packet
}

/// Map a raw DNS response to its answer string, `None` when the response does
/// not belong to `tx_id` or is truncated.
///
/// RCODE 3 (NXDOMAIN) means the hostname does not exist; any other non-zero
/// RCODE is lumped together as the nameserver refusing to answer. A clean
/// response yields the first A record as a dotted quad, or "No records" /
/// "No answer" when the answer section is empty or carries no A record.
fn parse_answer(response: &[u8], tx_id: u16) -> Option<String> {
    if response.len() < 12 {
        return None;
    }
    if u16::from_be_bytes([response[0], response[1]]) != tx_id {
        return None;
    }

    let rcode = response[3] & 0x0F;
    if rcode == 3 {
        return Some("Hostname does not exist".to_string());
    }
    if rcode != 0 {
        return Some("No response to dns request".to_string());
    }

    let qd_count = u16::from_be_bytes([response[4], response[5]]);
    let an_count = u16::from_be_bytes([response[6], response[7]]);
    if an_count == 0 {
        return Some("No records".to_string());
    }

    // Skip the question section.
    let mut pos = 12;
    for _ in 0..qd_count {
        pos = skip_name(response, pos)?;
        pos += 4; // QTYPE + QCLASS
    }

    // Scan the answer records for the first A record.
    for _ in 0..an_count {
        pos = skip_name(response, pos)?;
        if pos + 10 > response.len() {
            return None;
        }
        let rtype = u16::from_be_bytes([response[pos], response[pos + 1]]);
        let rd_length = u16::from_be_bytes([response[pos + 8], response[pos + 9]]) as usize;
        pos += 10;
        if pos + rd_length > response.len() {
            return None;
        }
        if rtype == 1 && rd_length == 4 {
            let octets = &response[pos..pos + 4];
            return Some(format!(
                "{}.{}.{}.{}",
                octets[0], octets[1], octets[2], octets[3]
            ));
        }
        pos += rd_length;
    }

    // Answers present (e.g. only CNAMEs) but nothing we asked for.
    Some("No answer".to_string())
}

/// Advance past an encoded domain name, following the compression-pointer
/// convention (RFC 1035 §4.1.4): a pointer ends the name.
fn skip_name(response: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = *response.get(pos)? as usize;
        if len & 0xC0 == 0xC0 {
            return Some(pos + 2);
        }
        if len == 0 {
            return Some(pos + 1);
        }
        pos += 1 + len;
    }
}
