use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

const KEY_EXAMPLE: &str = "resourceId=/SUBSCRIPTIONS/SUBID/RESOURCEGROUPS/RGNAME/PROVIDERS/MICROSOFT.NETWORK/NETWORKSECURITYGROUPS/RGNAME-NSG/y=2017/m=06/d=09/h=00/m=00/PT1H.json";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("malformed object key '{key}', expected something like: {}", KEY_EXAMPLE)]
    MalformedKey { key: String },

    #[error("resource id '{resource_id}' does not name a {resource_type}")]
    MalformedResourceId {
        resource_id: String,
        resource_type: &'static str,
    },
}

/// Parsed form of an hourly object key:
/// `.../<source_name>/y=YYYY/m=MM/d=DD/h=HH/m=MM/PT1H.json`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKey {
    pub source_name: String,
    pub log_time: DateTime<Utc>,
    stamp: String,
}

fn key_regex() -> &'static Regex {
    static KEY_RE: OnceLock<Regex> = OnceLock::new();
    KEY_RE.get_or_init(|| {
        Regex::new(r".*/(.*)/y=([0-9]{4})/m=([0-9]{2})/d=([0-9]{2})/h=([0-9]{2})/m=([0-9]{2}).*")
            .unwrap()
    })
}

impl ObjectKey {
    pub fn parse(key: &str) -> Result<Self, NamingError> {
        let malformed = || NamingError::MalformedKey {
            key: key.to_string(),
        };

        let caps = key_regex().captures(key).ok_or_else(malformed)?;
        if caps.len() != 7 {
            return Err(malformed());
        }

        let field = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();
        let number = |i: usize| field(i).parse::<u32>().map_err(|_| malformed());

        let year = field(2).parse::<i32>().map_err(|_| malformed())?;
        let log_time = Utc
            .with_ymd_and_hms(year, number(3)?, number(4)?, number(5)?, number(6)?, 0)
            .single()
            .ok_or_else(malformed)?;

        let source_name = field(1).to_string();
        if source_name.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            source_name,
            log_time,
            stamp: format!("{}{}{}{}{}", field(2), field(3), field(4), field(5), field(6)),
        })
    }

    /// `<source>-YYYY-MM-DD-HH`, used as the human handle for an object in logs.
    pub fn short_name(&self) -> String {
        format!(
            "{}-{}",
            self.source_name,
            self.log_time.format("%Y-%m-%d-%H")
        )
    }

    /// Stem for files written by the file sink: `nsgLog-<source>-YYYYMMDDHHMM`.
    pub fn local_file_stem(&self) -> String {
        format!("nsgLog-{}-{}", self.source_name, self.stamp)
    }
}

/// Inverse of [`ObjectKey::parse`]: the key under which a record with this
/// resource id and time would have been written.
pub fn synthesize_key(resource_id: &str, time: DateTime<Utc>) -> String {
    format!(
        "resourceId={}/{}/m=00/PT1H.json",
        resource_id,
        time.format("y=%Y/m=%m/d=%d/h=%H")
    )
}

/// The resource type segment a record kind is expected to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    NetworkSecurityGroup,
    ApplicationGateway,
}

impl ResourceType {
    fn segment(&self) -> &'static str {
        match self {
            ResourceType::NetworkSecurityGroup => "NETWORKSECURITYGROUPS",
            ResourceType::ApplicationGateway => "APPLICATIONGATEWAYS",
        }
    }

    fn regex(&self) -> &'static Regex {
        static NSG_RE: OnceLock<Regex> = OnceLock::new();
        static APPGW_RE: OnceLock<Regex> = OnceLock::new();
        let cell = match self {
            ResourceType::NetworkSecurityGroup => &NSG_RE,
            ResourceType::ApplicationGateway => &APPGW_RE,
        };
        cell.get_or_init(|| {
            Regex::new(&format!(
                r"(?i)SUBSCRIPTIONS/([^/]+)/RESOURCEGROUPS/([^/]+)/PROVIDERS/.*{}/([^/]+)",
                self.segment()
            ))
            .unwrap()
        })
    }
}

/// Subscription / resource group / resource name triple parsed out of a resource id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceIdentity {
    pub subscription_id: String,
    pub resource_group: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn parse(resource_id: &str, resource_type: ResourceType) -> Result<Self, NamingError> {
        let caps = resource_type
            .regex()
            .captures(resource_id)
            .ok_or_else(|| NamingError::MalformedResourceId {
                resource_id: resource_id.to_string(),
                resource_type: resource_type.segment(),
            })?;

        let field = |i: usize| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default();
        Ok(Self {
            subscription_id: field(1),
            resource_group: field(2),
            name: field(3),
        })
    }
}
