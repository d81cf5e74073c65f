pub mod flat;
pub mod gateway;
pub mod nsg;

pub use flat::{format_mac, Direction, FlatEvent, Outcome, Protocol};
pub use gateway::{GatewayAccessRecord, GatewayFirewallRecord, GatewayRecord};
pub use nsg::NsgRecord;

use crate::cef::CefEvent;
use crate::source::decoder::{decode_records, DecodeError};
use crate::source::naming::{synthesize_key, ResourceIdentity, ResourceType};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::warn;

/// Problems with a single record or flow tuple. These are collected next to
/// the events that did decode and never abort a batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("unexpected number of fields in tuple '{tuple}': got {fields}, expected 8")]
    MalformedTuple { tuple: String, fields: usize },

    #[error("invalid epoch timestamp '{value}' in tuple '{tuple}'")]
    MalformedTimestamp { tuple: String, value: String },

    #[error("malformed record for '{resource_id}': {reason}")]
    MalformedRecord { resource_id: String, reason: String },
}

/// Capabilities shared by every record kind the harvester understands.
pub trait AzureRecord: DeserializeOwned + Send + Sync {
    const RESOURCE_TYPE: ResourceType;

    fn time(&self) -> DateTime<Utc>;

    fn resource_id(&self) -> &str;

    fn operation_name(&self) -> &str;

    /// Subscription, resource group and name parsed out of the resource id.
    fn identity(&self) -> &ResourceIdentity;

    fn source_name(&self) -> &str {
        &self.identity().name
    }

    /// Event with the fields every event of this record shares.
    fn cef_skeleton(&self) -> CefEvent;

    /// All events of this record plus whatever went wrong building them.
    fn to_cef_events(&self) -> (Vec<CefEvent>, Vec<NormalizeError>);

    /// Container the record's objects are written to, if its operation is known.
    fn container_name(&self) -> Option<&'static str>;

    /// Object key this record would have been read from.
    fn source_key(&self) -> String {
        synthesize_key(self.resource_id(), self.time())
    }
}

/// Parse the resource id once and keep it. A resource id that does not parse
/// leaves the identity empty, so the CEF fields derived from it are omitted.
pub(crate) fn memoized_identity<'a>(
    cell: &'a OnceLock<ResourceIdentity>,
    resource_id: &str,
    resource_type: ResourceType,
) -> &'a ResourceIdentity {
    cell.get_or_init(|| match ResourceIdentity::parse(resource_id, resource_type) {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "Could not derive resource identity");
            ResourceIdentity::default()
        }
    })
}

/// Options applied while turning decoded records into events.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventOptions {
    /// Only records strictly after this time produce events.
    pub after: Option<DateTime<Utc>>,
}

impl EventOptions {
    pub fn after(watermark: Option<DateTime<Utc>>) -> Self {
        Self { after: watermark }
    }

    pub fn admits(&self, time: DateTime<Utc>) -> bool {
        self.after.map_or(true, |after| time > after)
    }
}

/// Events decoded from one fragment of one object.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    pub events: Vec<CefEvent>,
    pub errors: Vec<NormalizeError>,
    /// Every record decoded, filtered or not.
    pub record_count: usize,
    /// Latest time among the records that passed the filter.
    pub watermark: Option<DateTime<Utc>>,
}

impl EventBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn first_event_time(&self) -> Option<DateTime<Utc>> {
        self.events.iter().filter_map(|e| e.time).min()
    }

    pub fn last_event_time(&self) -> Option<DateTime<Utc>> {
        self.events.iter().filter_map(|e| e.time).max()
    }
}

/// The kinds of log a harvester can be pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    NsgFlow,
    GatewayAccess,
    GatewayFirewall,
}

impl RecordKind {
    pub fn container_name(&self) -> &'static str {
        match self {
            RecordKind::NsgFlow => nsg::FLOW_CONTAINER,
            RecordKind::GatewayAccess => gateway::ACCESS_CONTAINER,
            RecordKind::GatewayFirewall => gateway::FIREWALL_CONTAINER,
        }
    }

    /// Decode a fragment and normalize every admitted record into CEF events.
    pub fn decode_events(
        &self,
        bytes: &[u8],
        options: &EventOptions,
    ) -> Result<EventBatch, DecodeError> {
        match self {
            RecordKind::NsgFlow => normalize::<NsgRecord>(bytes, options),
            RecordKind::GatewayAccess => normalize::<GatewayAccessRecord>(bytes, options),
            RecordKind::GatewayFirewall => normalize::<GatewayFirewallRecord>(bytes, options),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::NsgFlow => "nsg_flow",
            RecordKind::GatewayAccess => "gateway_access",
            RecordKind::GatewayFirewall => "gateway_firewall",
        };
        f.write_str(name)
    }
}

pub fn normalize<R: AzureRecord>(
    bytes: &[u8],
    options: &EventOptions,
) -> Result<EventBatch, DecodeError> {
    let records: Vec<R> = decode_records(bytes)?;
    Ok(normalize_records(&records, options))
}

pub fn normalize_records<R: AzureRecord>(records: &[R], options: &EventOptions) -> EventBatch {
    let mut batch = EventBatch {
        record_count: records.len(),
        ..Default::default()
    };

    for record in records.iter().filter(|r| options.admits(r.time())) {
        let (events, errors) = record.to_cef_events();
        batch.events.extend(events);
        batch.errors.extend(errors);
        batch.watermark = batch.watermark.max(Some(record.time()));
    }

    batch
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, Utc};

    pub const NSG_RESOURCE_ID: &str = "/SUBSCRIPTIONS/SUBI/RESOURCEGROUPS/RGNAME/PROVIDERS/MICROSOFT.NETWORK/NETWORKSECURITYGROUPS/RGNAME-NSG";

    /// A flow-event record with one rule, one MAC and the given tuples.
    pub fn nsg_record(time: &str, tuples: &[&str]) -> String {
        let tuples = tuples
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            r#"{{ "time": "{time}", "systemId": "5f0d1c5e-0000-0000-0000-000000000000", "category": "NetworkSecurityGroupFlowEvent", "resourceId": "{rid}", "operationName": "NetworkSecurityGroupFlowEvents", "properties": {{"Version": 1, "flows": [{{"rule": "UserRule_HTTP", "flows": [{{"mac": "000D3AF33854", "flowTuples": [{tuples}]}}]}}]}}}}"#,
            time = time,
            rid = NSG_RESOURCE_ID,
            tuples = tuples
        )
    }

    /// Wrap records in the hourly document envelope.
    pub fn document(records: &[String]) -> String {
        format!("{{\"records\": [{}]}}", records.join("\n,"))
    }

    pub fn tuple_at(time: DateTime<Utc>) -> String {
        format!("{},10.199.1.8,10.193.160.4,15425,80,T,I,A", time.timestamp())
    }
}
