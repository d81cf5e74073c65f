use super::NormalizeError;
use crate::cef::CefEvent;
use chrono::{DateTime, Utc};

const TUPLE_FIELDS: usize = 8;

/// Transport protocol code of a flow tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "T" => Some(Protocol::Tcp),
            "U" => Some(Protocol::Udp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

/// Direction of a flow relative to the VM the MAC belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "I" => Some(Direction::Inbound),
            "O" => Some(Direction::Outbound),
            _ => None,
        }
    }

    /// CEF `deviceDirection` value.
    pub fn cef_value(&self) -> u8 {
        match self {
            Direction::Inbound => 0,
            Direction::Outbound => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allow,
    Deny,
    Unknown,
}

impl Outcome {
    pub fn from_code(code: &str) -> Self {
        match code {
            "A" => Outcome::Allow,
            "D" => Outcome::Deny,
            _ => Outcome::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Allow => "Allow",
            Outcome::Deny => "Deny",
            Outcome::Unknown => "Unknown",
        }
    }

    pub fn severity(&self) -> u8 {
        match self {
            Outcome::Allow => 0,
            Outcome::Deny => 6,
            Outcome::Unknown => 4,
        }
    }
}

/// Rewrite a bare hex MAC into colon-separated pairs:
/// `000D3AF33854` becomes `00:0D:3A:F3:38:54`.
pub fn format_mac(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let last = chars.len().saturating_sub(1);
    let mut out = String::with_capacity(raw.len() + raw.len() / 2);
    for (i, c) in chars.iter().enumerate() {
        out.push(*c);
        if i % 2 == 1 && i != last {
            out.push(':');
        }
    }
    out
}

/// One flow tuple, flattened together with the rule and MAC it was nested under.
///
/// Codes are kept as they appear on the wire; the mapping to CEF values happens
/// in [`FlatEvent::apply_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatEvent {
    pub timestamp: i64,
    pub resource_id: String,
    pub rule: String,
    pub mac: String,
    pub source_ip: String,
    pub dest_ip: String,
    pub source_port: String,
    pub dest_port: String,
    pub protocol: String,
    pub direction: String,
    pub outcome: String,
}

impl FlatEvent {
    /// Parse `epoch,srcIp,dstIp,srcPort,dstPort,proto,direction,outcome`.
    pub fn from_tuple(
        tuple: &str,
        resource_id: &str,
        rule: &str,
        raw_mac: &str,
    ) -> Result<Self, NormalizeError> {
        let fields: Vec<&str> = tuple.split(',').collect();
        if fields.len() != TUPLE_FIELDS {
            return Err(NormalizeError::MalformedTuple {
                tuple: tuple.to_string(),
                fields: fields.len(),
            });
        }

        let timestamp = fields[0]
            .parse::<i64>()
            .map_err(|_| NormalizeError::MalformedTimestamp {
                tuple: tuple.to_string(),
                value: fields[0].to_string(),
            })?;

        Ok(Self {
            timestamp,
            resource_id: resource_id.to_string(),
            rule: rule.to_string(),
            mac: format_mac(raw_mac),
            source_ip: fields[1].to_string(),
            dest_ip: fields[2].to_string(),
            source_port: fields[3].to_string(),
            dest_port: fields[4].to_string(),
            protocol: fields[5].to_string(),
            direction: fields[6].to_string(),
            outcome: fields[7].to_string(),
        })
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0)
    }

    /// Fill the tuple-specific fields of a CEF event built from the record skeleton.
    pub fn apply_to(&self, event: &mut CefEvent) {
        event.time = self.time();
        event.set("cs1", self.rule.as_str());
        event.set("cs1label", "Rule Name");
        event.set("start", self.timestamp.saturating_mul(1000).to_string());
        event.set("src", self.source_ip.as_str());
        event.set("dst", self.dest_ip.as_str());
        event.set("spt", self.source_port.as_str());
        event.set("dpt", self.dest_port.as_str());

        if let Some(protocol) = Protocol::from_code(&self.protocol) {
            event.set("proto", protocol.as_str());
        }

        // The MAC is the VM's own, so it is the destination on inbound flows.
        match Direction::from_code(&self.direction) {
            Some(direction @ Direction::Inbound) => {
                event.set("deviceDirection", direction.cef_value().to_string());
                event.set("dmac", self.mac.as_str());
            }
            Some(direction @ Direction::Outbound) => {
                event.set("deviceDirection", direction.cef_value().to_string());
                event.set("smac", self.mac.as_str());
            }
            None => {}
        }

        let outcome = Outcome::from_code(&self.outcome);
        event.set("outcome", outcome.as_str());
        event.severity = outcome.severity();
    }
}
