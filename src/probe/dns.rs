//! DNS query probe.
//!
//! # Responsibilities
//! - Send one recursive query of the configured type per attempt over UDP
//! - Report the response code (mnemonic and numeric) with each result
//!
//! # Design Decisions
//! - Fresh ephemeral socket per attempt, random query id
//! - Replies with a foreign id are discarded until the timeout
//! - An unknown record type fails every attempt with `rcode_value = -1`

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use tokio::net::UdpSocket;
use tokio::time;

use crate::config::DnsTarget;
use crate::observability::metrics::{DNS_DURATION_SECONDS, DNS_REQUESTS_TOTAL};
use crate::observability::MetricsSink;
use crate::probe::classify::{classify_dns, rcode_name, DnsError};
use crate::probe::{Outcome, Probe, ProbeKind, TargetId};

/// Largest UDP reply accepted.
const MAX_RESPONSE: usize = 4096;

/// Response code, or why none was obtained.
pub type DnsOutput = Result<u16, DnsError>;

/// Parse a record type from the supported set (case-insensitive).
pub fn parse_record_type(value: &str) -> Option<RecordType> {
    let record_type = match value.to_ascii_uppercase().as_str() {
        "A" => RecordType::A,
        "AAAA" => RecordType::AAAA,
        "ANY" => RecordType::ANY,
        "CNAME" => RecordType::CNAME,
        "MX" => RecordType::MX,
        "NS" => RecordType::NS,
        "PTR" => RecordType::PTR,
        "SOA" => RecordType::SOA,
        "SPF" => RecordType::from(99),
        "SRV" => RecordType::SRV,
        "TXT" => RecordType::TXT,
        _ => return None,
    };
    Some(record_type)
}

fn transport(error: impl std::fmt::Display) -> DnsError {
    DnsError::Transport(error.to_string())
}

pub struct DnsProbe {
    id: TargetId,
    target: DnsTarget,
    server: String,
    query: Result<Query, DnsError>,
}

impl DnsProbe {
    pub fn new(target: DnsTarget) -> Self {
        // Hostnames are kept verbatim for labels and resolved per attempt.
        let server = match target.server_ip.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, target.server_port).to_string(),
            Err(_) => format!("{}:{}", target.server_ip, target.server_port),
        };

        let query = build_query(&target);
        if let Err(error) = &query {
            tracing::warn!(
                name = %target.name,
                ?error,
                "DNS target unusable, every attempt will fail"
            );
        }

        Self {
            id: TargetId::new(ProbeKind::Dns, target.name.clone()),
            target,
            server,
            query,
        }
    }

    async fn exchange(&self, query: &Query) -> DnsOutput {
        let host = (self.target.server_ip.as_str(), self.target.server_port);
        let server = tokio::net::lookup_host(host)
            .await
            .map_err(transport)?
            .next()
            .ok_or_else(|| DnsError::Transport(format!("no address for {}", self.server)))?;

        let local = if server.is_ipv4() {
            SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0)
        } else {
            SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0)
        };
        let socket = UdpSocket::bind(local).await.map_err(transport)?;
        socket.connect(server).await.map_err(transport)?;

        let id: u16 = rand::random();
        let mut message = Message::new();
        message
            .set_id(id)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(query.clone());
        let request = message.to_vec().map_err(transport)?;
        socket.send(&request).await.map_err(transport)?;

        let mut buf = vec![0u8; MAX_RESPONSE];
        loop {
            let len = socket.recv(&mut buf).await.map_err(transport)?;
            let response = match Message::from_vec(&buf[..len]) {
                Ok(response) => response,
                Err(error) => return Err(transport(error)),
            };
            if response.id() != id || response.message_type() != MessageType::Response {
                tracing::trace!(name = %self.id.name, "Discarding unrelated DNS reply");
                continue;
            }
            return Ok(response.response_code().into());
        }
    }
}

fn build_query(target: &DnsTarget) -> Result<Query, DnsError> {
    let record_type = parse_record_type(&target.record_type)
        .ok_or_else(|| DnsError::InvalidRecordType(target.record_type.clone()))?;

    let mut name = Name::from_ascii(&target.domain).map_err(transport)?;
    name.set_fqdn(true);

    Ok(Query::query(name, record_type))
}

#[async_trait]
impl Probe for DnsProbe {
    type Output = DnsOutput;

    fn id(&self) -> &TargetId {
        &self.id
    }

    fn rate(&self) -> f64 {
        self.target.rps
    }

    async fn attempt(&self) -> DnsOutput {
        let query = match &self.query {
            Ok(query) => query,
            Err(error) => return Err(error.clone()),
        };

        match time::timeout(self.target.timeout(), self.exchange(query)).await {
            Ok(output) => output,
            Err(_) => Err(DnsError::Timeout),
        }
    }

    /// Only NOERROR counts as success for the breaker.
    fn succeeded(&self, output: &DnsOutput) -> bool {
        matches!(output, Ok(0))
    }

    fn rejected(&self) -> DnsOutput {
        Err(DnsError::Rejected)
    }

    fn report(&self, outcome: &Outcome<DnsOutput>, sink: &dyn MetricsSink) -> &'static str {
        let result = classify_dns(&outcome.output).as_str();
        let (rcode, rcode_value) = match &outcome.output {
            Ok(code) => (rcode_name(*code).to_string(), i32::from(*code)),
            Err(_) => (String::new(), -1),
        };

        let labels = [
            ("name", self.target.name.clone()),
            ("domain", self.target.domain.clone()),
            ("server", self.server.clone()),
            ("rcode", rcode),
            ("rcode_value", rcode_value.to_string()),
            ("result", result.to_string()),
        ];
        sink.increment_counter(DNS_REQUESTS_TOTAL, &labels);
        sink.observe_histogram(DNS_DURATION_SECONDS, &labels, outcome.elapsed.as_secs_f64());

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemorySink;
    use crate::probe::Verdict;
    use std::time::Duration;

    fn target(record_type: &str) -> DnsTarget {
        DnsTarget {
            name: "resolver".to_string(),
            domain: "example.com".to_string(),
            record_type: record_type.to_string(),
            rps: 1.0,
            server_ip: "127.0.0.1".to_string(),
            server_port: 53,
            timeout_ms: 200,
        }
    }

    #[test]
    fn test_record_types_case_insensitive() {
        assert_eq!(parse_record_type("a"), Some(RecordType::A));
        assert_eq!(parse_record_type("Aaaa"), Some(RecordType::AAAA));
        assert_eq!(parse_record_type("TXT"), Some(RecordType::TXT));
        assert_eq!(parse_record_type("spf"), Some(RecordType::from(99)));
        assert_eq!(parse_record_type("BOGUS"), None);
        assert_eq!(parse_record_type(""), None);
    }

    #[test]
    fn test_query_is_fully_qualified() {
        let query = build_query(&target("MX")).unwrap();
        assert!(query.name().is_fqdn());
        assert_eq!(query.query_type(), RecordType::MX);
    }

    #[test]
    fn test_server_label() {
        assert_eq!(DnsProbe::new(target("A")).server, "127.0.0.1:53");

        let mut v6 = target("A");
        v6.server_ip = "::1".to_string();
        assert_eq!(DnsProbe::new(v6).server, "[::1]:53");
    }

    #[tokio::test]
    async fn test_unknown_record_type_fails_each_attempt() {
        let probe = DnsProbe::new(target("BOGUS"));
        let sink = MemorySink::new();

        for _ in 0..3 {
            let output = probe.attempt().await;
            assert_eq!(output, Err(DnsError::InvalidRecordType("BOGUS".to_string())));
            let outcome = Outcome {
                elapsed: Duration::ZERO,
                output,
                verdict: Verdict::Failed,
            };
            assert_eq!(probe.report(&outcome, &sink), "error");
        }

        assert_eq!(
            sink.counter(
                DNS_REQUESTS_TOTAL,
                &[("result", "error"), ("rcode_value", "-1"), ("rcode", "")]
            ),
            3
        );
    }

    #[test]
    fn test_report_nxdomain() {
        let probe = DnsProbe::new(target("A"));
        let sink = MemorySink::new();
        let outcome = Outcome {
            elapsed: Duration::from_millis(3),
            output: Ok(3),
            verdict: Verdict::Failed,
        };

        assert_eq!(probe.report(&outcome, &sink), "error");
        assert_eq!(
            sink.counter(
                DNS_REQUESTS_TOTAL,
                &[("rcode", "NXDOMAIN"), ("rcode_value", "3"), ("server", "127.0.0.1:53")]
            ),
            1
        );
        assert!(!probe.succeeded(&outcome.output));
        assert!(probe.succeeded(&Ok(0)));
    }
}
