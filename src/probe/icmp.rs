//! ICMP echo probe.
//!
//! Sends one unprivileged (datagram socket) echo request per attempt and
//! reports the round-trip time and the TTL echoed back.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use surge_ping::{Client, Config, IcmpPacket, PingIdentifier, PingSequence, ICMP};

use crate::config::IcmpTarget;
use crate::observability::metrics::{ICMP_DURATION_SECONDS, ICMP_REQUESTS_TOTAL};
use crate::observability::MetricsSink;
use crate::probe::classify::classify_icmp;
use crate::probe::{Outcome, Probe, ProbeKind, TargetId};

const PAYLOAD: [u8; 16] = [0; 16];

/// Echo reply details.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoReply {
    pub rtt: Duration,
    pub ttl: u32,
}

/// Reply, or a description of why none arrived.
pub type IcmpOutput = Result<EchoReply, String>;

pub struct IcmpProbe {
    id: TargetId,
    target: IcmpTarget,
}

impl IcmpProbe {
    pub fn new(target: IcmpTarget) -> Self {
        Self {
            id: TargetId::new(ProbeKind::Icmp, target.name.clone()),
            target,
        }
    }

    async fn resolve(&self) -> Result<IpAddr, String> {
        if let Ok(ip) = self.target.host.parse::<IpAddr>() {
            return Ok(ip);
        }
        tokio::net::lookup_host((self.target.host.as_str(), 0))
            .await
            .map_err(|e| e.to_string())?
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| format!("no address for {}", self.target.host))
    }

    async fn ping(&self) -> IcmpOutput {
        let ip = self.resolve().await?;
        let kind = if ip.is_ipv4() { ICMP::V4 } else { ICMP::V6 };
        let config = Config::builder()
            .kind(kind)
            .ttl(self.target.ttl)
            .sock_type_hint(socket2::Type::DGRAM)
            .build();
        let client = Client::new(&config).map_err(|e| e.to_string())?;

        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(self.target.timeout());
        let (packet, rtt) = pinger
            .ping(PingSequence(0), &PAYLOAD)
            .await
            .map_err(|e| e.to_string())?;

        let ttl = match packet {
            IcmpPacket::V4(packet) => packet.get_ttl().map(u32::from),
            IcmpPacket::V6(packet) => Some(u32::from(packet.get_max_hop_limit())),
        };
        Ok(EchoReply {
            rtt,
            ttl: ttl.unwrap_or(self.target.ttl),
        })
    }
}

#[async_trait]
impl Probe for IcmpProbe {
    type Output = IcmpOutput;

    fn id(&self) -> &TargetId {
        &self.id
    }

    fn rate(&self) -> f64 {
        self.target.rps
    }

    async fn attempt(&self) -> IcmpOutput {
        // Resolution has no deadline of its own.
        match tokio::time::timeout(self.target.timeout(), self.ping()).await {
            Ok(output) => output,
            Err(_) => Err("request timeout".to_string()),
        }
    }

    fn succeeded(&self, output: &IcmpOutput) -> bool {
        output.is_ok()
    }

    fn rejected(&self) -> IcmpOutput {
        Err("circuit breaker open".to_string())
    }

    fn report(&self, outcome: &Outcome<IcmpOutput>, sink: &dyn MetricsSink) -> &'static str {
        let result = classify_icmp(&outcome.output).as_str();
        let (ttl, seconds) = match &outcome.output {
            Ok(reply) => (reply.ttl, reply.rtt.as_secs_f64()),
            Err(_) => (self.target.ttl, outcome.elapsed.as_secs_f64()),
        };

        let labels = [
            ("name", self.target.name.clone()),
            ("host", self.target.host.clone()),
            ("ttl", ttl.to_string()),
            ("result", result.to_string()),
        ];
        sink.increment_counter(ICMP_REQUESTS_TOTAL, &labels);
        sink.observe_histogram(ICMP_DURATION_SECONDS, &labels, seconds);

        result
    }
}
