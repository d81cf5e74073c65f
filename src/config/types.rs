use crate::record::RecordKind;
use crate::sink::SyslogProtocol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    pub storage: StorageConfig,
    pub sink: SinkConfig,
    #[serde(default)]
    pub web: Option<WebConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: RecordKind,
    /// Directory holding the container's objects.
    pub root: PathBuf,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "resourceId=".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default = "default_job_name")]
    pub name: String,
    #[serde(default)]
    pub begin_time: Option<DateTime<Utc>>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            name: default_job_name(),
            begin_time: None,
            concurrency: default_concurrency(),
            poll_interval: default_poll_interval(),
        }
    }
}

fn default_job_name() -> String {
    "nsg-harvester".to_string()
}

fn default_concurrency() -> usize {
    1
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the per-sink checkpoint stores.
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    File {
        path: PathBuf,
    },
    Syslog {
        #[serde(default = "default_protocol")]
        protocol: SyslogProtocol,
        host: String,
        port: u16,
    },
}

fn default_protocol() -> SyslogProtocol {
    SyslogProtocol::Tcp
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub listen: String,
}
