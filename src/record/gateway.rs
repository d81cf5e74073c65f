use super::{memoized_identity, AzureRecord, NormalizeError};
use crate::cef::CefEvent;
use crate::source::naming::{ResourceIdentity, ResourceType};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::OnceLock;

pub const ACCESS_OPERATION: &str = "ApplicationGatewayAccess";
pub const FIREWALL_OPERATION: &str = "ApplicationGatewayFirewall";
pub const ACCESS_CONTAINER: &str = "insights-logs-applicationgatewayaccesslog";
pub const FIREWALL_CONTAINER: &str = "insights-logs-applicationgatewayfirewalllog";

const PRODUCT: &str = "Azure Application Gateway";

/// Fields shared by application gateway access and firewall records.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRecord {
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub operation_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(skip)]
    identity: OnceLock<ResourceIdentity>,
}

impl GatewayRecord {
    fn identity(&self) -> &ResourceIdentity {
        memoized_identity(&self.identity, &self.resource_id, ResourceType::ApplicationGateway)
    }

    /// A record cut off before its `operationName` is taken to be of the
    /// operation its container holds.
    fn is_operation(&self, operation: &str) -> bool {
        self.operation_name.is_empty() || self.operation_name == operation
    }

    fn cef_skeleton(&self) -> CefEvent {
        let identity = self.identity();
        let mut event = CefEvent::skeleton(PRODUCT);
        event.name = identity.name.clone();
        event.device_event_class_id = self.category.clone();
        event.set("cs2", identity.name.as_str());
        event.set("cs2label", PRODUCT);
        event.set("cs3", identity.subscription_id.as_str());
        event.set("cs3label", "Subscription ID");
        event.set("cs4", identity.resource_group.as_str());
        event.set("cs4label", "Resource Group");
        event
    }

    /// Render a property as CEF text. Missing or null properties become empty
    /// strings and are dropped at render time.
    pub fn property(&self, name: &str) -> String {
        match self.properties.get(name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => i.to_string(),
                (None, Some(f)) if f.fract() == 0.0 && fits_i64(f) => (f as i64).to_string(),
                _ => n.to_string(),
            },
            Some(other) => other.to_string(),
        }
    }

    /// The whole property bag as JSON, carried in `msg`.
    fn properties_json(&self) -> String {
        serde_json::to_string(&self.properties).unwrap_or_default()
    }

    fn base_event(&self) -> CefEvent {
        let mut event = self.cef_skeleton();
        event.time = Some(self.time);
        event.set("msg", self.properties_json());
        event
    }
}

fn fits_i64(f: f64) -> bool {
    f >= i64::MIN as f64 && f < i64::MAX as f64
}

/// Access log record (`ApplicationGatewayAccess`).
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct GatewayAccessRecord(pub GatewayRecord);

/// Web application firewall record (`ApplicationGatewayFirewall`).
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct GatewayFirewallRecord(pub GatewayRecord);

impl AzureRecord for GatewayAccessRecord {
    const RESOURCE_TYPE: ResourceType = ResourceType::ApplicationGateway;

    fn time(&self) -> DateTime<Utc> {
        self.0.time
    }

    fn resource_id(&self) -> &str {
        &self.0.resource_id
    }

    fn operation_name(&self) -> &str {
        &self.0.operation_name
    }

    fn identity(&self) -> &ResourceIdentity {
        self.0.identity()
    }

    fn cef_skeleton(&self) -> CefEvent {
        self.0.cef_skeleton()
    }

    fn to_cef_events(&self) -> (Vec<CefEvent>, Vec<NormalizeError>) {
        if !self.0.is_operation(ACCESS_OPERATION) {
            return (Vec::new(), Vec::new());
        }

        let record = &self.0;
        let mut event = record.base_event();
        let method = record.property("httpMethod");
        event.set("src", record.property("clientIP"));
        event.set("spt", record.property("clientPort"));
        event.set("request", record.property("requestUri"));
        event.set("requestMethod", method.as_str());
        event.set("act", method);
        (vec![event], Vec::new())
    }

    fn container_name(&self) -> Option<&'static str> {
        (self.0.operation_name == ACCESS_OPERATION).then_some(ACCESS_CONTAINER)
    }
}

impl AzureRecord for GatewayFirewallRecord {
    const RESOURCE_TYPE: ResourceType = ResourceType::ApplicationGateway;

    fn time(&self) -> DateTime<Utc> {
        self.0.time
    }

    fn resource_id(&self) -> &str {
        &self.0.resource_id
    }

    fn operation_name(&self) -> &str {
        &self.0.operation_name
    }

    fn identity(&self) -> &ResourceIdentity {
        self.0.identity()
    }

    fn cef_skeleton(&self) -> CefEvent {
        self.0.cef_skeleton()
    }

    fn to_cef_events(&self) -> (Vec<CefEvent>, Vec<NormalizeError>) {
        if !self.0.is_operation(FIREWALL_OPERATION) {
            return (Vec::new(), Vec::new());
        }

        let record = &self.0;
        let mut event = record.base_event();
        event.set("src", record.property("clientIp"));
        event.set("spt", record.property("clientPort"));
        event.set("cs1", record.property("requestUri"));
        event.set("cs1label", "requestUri");
        event.set("act", record.property("action"));
        event.set("cs5", record.property("message"));
        event.set("cs5label", "message");
        event.set("cs6", record.property("instanceId"));
        event.set("cs6label", "instanceId");
        (vec![event], Vec::new())
    }

    fn container_name(&self) -> Option<&'static str> {
        (self.0.operation_name == FIREWALL_OPERATION).then_some(FIREWALL_CONTAINER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EventOptions, RecordKind};

    const APPGW_ID: &str = "/SUBSCRIPTIONS/SUBID/RESOURCEGROUPS/RGNAME/PROVIDERS/MICROSOFT.NETWORK/APPLICATIONGATEWAYS/APPGWNAME";

    fn access_json(properties: &str) -> String {
        format!(
            r#"{{"resourceId": "{}", "operationName": "ApplicationGatewayAccess", "time": "2017-08-08T20:18:34Z", "category": "ApplicationGatewayAccessLog", "properties": {}}}"#,
            APPGW_ID, properties
        )
    }

    fn firewall_json(properties: &str) -> String {
        format!(
            r#"{{"resourceId": "{}", "operationName": "ApplicationGatewayFirewall", "time": "2017-08-08T20:18:34Z", "category": "ApplicationGatewayFirewallLog", "properties": {}}}"#,
            APPGW_ID, properties
        )
    }

    #[test]
    fn test_access_record() {
        let record: GatewayAccessRecord = serde_json::from_str(&access_json(
            r#"{"instanceId": "ApplicationGatewayRole_IN_0", "clientIP": "52.161.21.33", "clientPort": 52310, "httpMethod": "GET", "requestUri": "/index.html?x=1", "httpStatus": 200}"#,
        ))
        .unwrap();

        assert_eq!(record.source_name(), "APPGWNAME");
        let (events, errors) = record.to_cef_events();
        assert!(errors.is_empty());
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.device_product, "Azure Application Gateway");
        assert_eq!(event.name, "APPGWNAME");
        assert_eq!(event.device_event_class_id, "ApplicationGatewayAccessLog");
        assert_eq!(event.extension["src"], "52.161.21.33");
        assert_eq!(event.extension["spt"], "52310");
        assert_eq!(event.extension["request"], "/index.html?x=1");
        assert_eq!(event.extension["requestMethod"], "GET");
        assert_eq!(event.extension["act"], "GET");
        assert_eq!(event.extension["cs3"], "SUBID");

        let msg: Value = serde_json::from_str(&event.extension["msg"]).unwrap();
        assert_eq!(msg["httpStatus"], 200);
        // `=` inside msg is escaped on the wire
        assert!(event.wire_line().contains("x\\=1"));
    }

    #[test]
    fn test_access_record_ignores_other_operations() {
        let json = access_json("{}").replace("ApplicationGatewayAccess\"", "ApplicationGatewayFirewall\"");
        let record: GatewayAccessRecord = serde_json::from_str(&json).unwrap();
        let (events, errors) = record.to_cef_events();
        assert!(events.is_empty());
        assert!(errors.is_empty());
        assert_eq!(record.container_name(), None);
    }

    #[test]
    fn test_firewall_record() {
        let record: GatewayFirewallRecord = serde_json::from_str(&firewall_json(
            r#"{"instanceId": "ApplicationGatewayRole_IN_0", "clientIp": "104.210.252.3", "clientPort": "", "requestUri": "/wp-login.php", "ruleId": "942100", "message": "SQL Injection Attack Detected via libinjection", "action": "Blocked"}"#,
        ))
        .unwrap();

        let (events, _) = record.to_cef_events();
        let event = &events[0];
        assert_eq!(event.extension["src"], "104.210.252.3");
        assert_eq!(event.extension["cs1"], "/wp-login.php");
        assert_eq!(event.extension["cs1label"], "requestUri");
        assert_eq!(event.extension["act"], "Blocked");
        assert_eq!(event.extension["cs5"], "SQL Injection Attack Detected via libinjection");
        assert_eq!(event.extension["cs6"], "ApplicationGatewayRole_IN_0");
        assert!(!event.extension_text().contains("spt="));
        assert_eq!(record.container_name(), Some(FIREWALL_CONTAINER));
    }

    #[test]
    fn test_missing_properties_are_omitted() {
        let record: GatewayFirewallRecord =
            serde_json::from_str(&firewall_json(r#"{"clientPort": 443.0}"#)).unwrap();
        let (events, _) = record.to_cef_events();
        let text = events[0].extension_text();

        assert!(text.contains("spt=443"));
        assert!(!text.contains("src="));
        assert!(!text.contains("cs5="));
        assert!(text.contains("cs5label=message"));
    }

    #[test]
    fn test_huge_whole_float_is_not_clamped() {
        let record: GatewayFirewallRecord = serde_json::from_str(&firewall_json(
            r#"{"clientPort": 1e300, "contentLength": -12.0}"#,
        ))
        .unwrap();
        assert_eq!(record.0.property("clientPort"), "1e300");
        assert_eq!(record.0.property("contentLength"), "-12");
    }

    #[test]
    fn test_firewall_document_through_decoder() {
        let doc = format!(
            "{{\"records\": [{}\n,{}]}}",
            firewall_json(r#"{"clientIp": "104.210.252.3", "action": "Blocked"}"#),
            firewall_json(r#"{"clientIp": "104.210.252.4", "action": "Detected"}"#)
                .replace("20:18:34", "20:19:34"),
        );

        let batch = RecordKind::GatewayFirewall
            .decode_events(doc.as_bytes(), &EventOptions::default())
            .unwrap();
        assert_eq!(batch.record_count, 2);
        assert_eq!(batch.events.len(), 2);
        for event in &batch.events {
            assert_eq!(event.name, "APPGWNAME");
            assert_eq!(event.extension["cs3"], "SUBID");
            assert_eq!(event.extension["cs4"], "RGNAME");
        }
        assert_eq!(batch.events[1].extension["act"], "Detected");
    }

    #[test]
    fn test_access_document_through_decoder() {
        let doc = format!(
            "{{\"records\": [{}]}}",
            access_json(r#"{"clientIP": "52.161.21.33", "httpMethod": "POST"}"#)
        );
        let batch = RecordKind::GatewayAccess
            .decode_events(doc.as_bytes(), &EventOptions::default())
            .unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].extension["requestMethod"], "POST");
        assert_eq!(batch.events[0].extension["cs2"], "APPGWNAME");
    }

    #[test]
    fn test_record_cut_before_time_still_emits() {
        // The fragment starts after the first record's opening brace, so its
        // resourceId and operationName never reach the decoder.
        let doc = format!(
            "{{\"records\": [{}\n,{}]}}",
            firewall_json(r#"{"action": "Blocked"}"#),
            firewall_json(r#"{"action": "Detected"}"#).replace("20:18:34", "20:19:34"),
        );
        let start = doc.find("\"operationName\"").unwrap();

        let batch = RecordKind::GatewayFirewall
            .decode_events(&doc.as_bytes()[start..], &EventOptions::default())
            .unwrap();
        assert_eq!(batch.record_count, 2);
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[0].extension["act"], "Blocked");
        assert!(!batch.events[0].extension_text().contains("cs3="));
        assert_eq!(batch.events[1].extension["cs3"], "SUBID");
    }
}
