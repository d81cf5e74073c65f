use super::flat::FlatEvent;
use super::{memoized_identity, AzureRecord, NormalizeError};
use crate::cef::CefEvent;
use crate::source::naming::{ResourceIdentity, ResourceType};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

pub const FLOW_OPERATION: &str = "NetworkSecurityGroupFlowEvents";
pub const EVENT_OPERATION: &str = "NetworkSecurityGroupEvents";
pub const FLOW_CONTAINER: &str = "insights-logs-networksecuritygroupflowevent";
pub const EVENT_CONTAINER: &str = "insights-logs-networksecuritygroupevent";

const PRODUCT: &str = "Azure NSG";

/// A network security group diagnostic record. Flow-event records nest
/// `rule -> mac -> tuples` under `properties.flows`; other operations carry a
/// free-form property bag.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NsgRecord {
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub system_id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub operation_name: String,
    #[serde(default)]
    pub properties: Value,
    #[serde(skip)]
    identity: OnceLock<ResourceIdentity>,
}

#[derive(Debug, Deserialize)]
struct FlowProperties {
    #[serde(default)]
    flows: Vec<RuleFlows>,
}

#[derive(Debug, Deserialize)]
struct RuleFlows {
    #[serde(default)]
    rule: String,
    #[serde(default)]
    flows: Vec<MacFlows>,
}

#[derive(Debug, Deserialize)]
struct MacFlows {
    #[serde(default)]
    mac: String,
    #[serde(rename = "flowTuples", default)]
    flow_tuples: Vec<String>,
}

impl NsgRecord {
    /// Flatten every flow tuple of a flow-event record. Other operations have
    /// no tuples and yield nothing. A record with no `operationName` is read
    /// as a flow event if its properties hold flows.
    pub fn flat_events(&self) -> (Vec<FlatEvent>, Vec<NormalizeError>) {
        let mut events = Vec::new();
        let mut errors = Vec::new();

        if !self.operation_name.is_empty() && self.operation_name != FLOW_OPERATION {
            return (events, errors);
        }

        let properties = match FlowProperties::deserialize(&self.properties) {
            Ok(properties) => properties,
            Err(e) => {
                errors.push(NormalizeError::MalformedRecord {
                    resource_id: self.resource_id.clone(),
                    reason: e.to_string(),
                });
                return (events, errors);
            }
        };

        for rule in &properties.flows {
            for mac in &rule.flows {
                for tuple in &mac.flow_tuples {
                    match FlatEvent::from_tuple(tuple, &self.resource_id, &rule.rule, &mac.mac) {
                        Ok(event) => events.push(event),
                        Err(e) => errors.push(e),
                    }
                }
            }
        }

        (events, errors)
    }
}

impl AzureRecord for NsgRecord {
    const RESOURCE_TYPE: ResourceType = ResourceType::NetworkSecurityGroup;

    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn resource_id(&self) -> &str {
        &self.resource_id
    }

    fn operation_name(&self) -> &str {
        &self.operation_name
    }

    fn identity(&self) -> &ResourceIdentity {
        memoized_identity(&self.identity, &self.resource_id, Self::RESOURCE_TYPE)
    }

    fn cef_skeleton(&self) -> CefEvent {
        let identity = self.identity();
        let mut event = CefEvent::skeleton(PRODUCT);
        event.name = self.category.clone();
        event.device_event_class_id = self.operation_name.clone();
        event.set("deviceExternalId", self.system_id.as_str());
        event.set("cs2", identity.name.as_str());
        event.set("cs2label", PRODUCT);
        event.set("cs3", identity.subscription_id.as_str());
        event.set("cs3label", "Subscription ID");
        event.set("cs4", identity.resource_group.as_str());
        event.set("cs4label", "Resource Group");
        event
    }

    fn to_cef_events(&self) -> (Vec<CefEvent>, Vec<NormalizeError>) {
        let (flat, errors) = self.flat_events();
        if flat.is_empty() {
            return (Vec::new(), errors);
        }

        let skeleton = self.cef_skeleton();
        let events = flat
            .iter()
            .map(|tuple| {
                let mut event = skeleton.clone();
                tuple.apply_to(&mut event);
                event
            })
            .collect();
        (events, errors)
    }

    fn container_name(&self) -> Option<&'static str> {
        match self.operation_name.as_str() {
            FLOW_OPERATION => Some(FLOW_CONTAINER),
            EVENT_OPERATION => Some(EVENT_CONTAINER),
            _ => None,
        }
    }
}
