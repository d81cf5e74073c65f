use super::{Sink, SinkError, SinkKind};
use crate::cef::frame_syslog_line;
use crate::pipeline::job::WorkItem;
use crate::record::EventBatch;
use crate::source::object::TransportError;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyslogProtocol {
    Tcp,
    Udp,
}

impl fmt::Display for SyslogProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyslogProtocol::Tcp => f.write_str("tcp"),
            SyslogProtocol::Udp => f.write_str("udp"),
        }
    }
}

#[derive(Debug)]
enum Transport {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl Transport {
    async fn connect(protocol: SyslogProtocol, address: &str) -> std::io::Result<Self> {
        match protocol {
            SyslogProtocol::Tcp => Ok(Transport::Tcp(TcpStream::connect(address).await?)),
            SyslogProtocol::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                socket.connect(address).await?;
                Ok(Transport::Udp(socket))
            }
        }
    }

    async fn send(&mut self, line: &[u8]) -> std::io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.write_all(line).await,
            Transport::Udp(socket) => socket.send(line).await.map(|_| ()),
        }
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.flush().await,
            Transport::Udp(_) => Ok(()),
        }
    }
}

/// Forwards events to a remote collector over one long-lived connection,
/// one CEF line per event. A failed write redials the collector once.
#[derive(Debug)]
pub struct SyslogSink {
    transport: Mutex<Transport>,
    protocol: SyslogProtocol,
    address: String,
    hostname: String,
    emitted: AtomicU64,
}

impl SyslogSink {
    /// Connect to the collector. Failing to connect means there is no sink.
    pub async fn dial(
        protocol: SyslogProtocol,
        host: &str,
        port: u16,
    ) -> Result<Self, TransportError> {
        let address = format!("{}:{}", host, port);
        let transport = Transport::connect(protocol, &address)
            .await
            .map_err(|source| TransportError::Dial {
                address: address.clone(),
                source,
            })?;

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());

        info!(address = %address, protocol = %protocol, "Connected to syslog collector");
        Ok(Self {
            transport: Mutex::new(transport),
            protocol,
            address,
            hostname,
            emitted: AtomicU64::new(0),
        })
    }

    /// Override the hostname written into each line.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Replace a broken connection and send `line` on the new one.
    async fn redial_and_send(
        &self,
        transport: &mut Transport,
        line: &[u8],
        cause: std::io::Error,
    ) -> Result<(), TransportError> {
        warn!(address = %self.address, error = %cause, "Write to syslog collector failed, reconnecting");
        *transport = Transport::connect(self.protocol, &self.address)
            .await
            .map_err(|source| TransportError::Dial {
                address: self.address.clone(),
                source,
            })?;
        transport.send(line).await?;
        info!(address = %self.address, "Reconnected to syslog collector");
        Ok(())
    }

    fn frame(&self, line: &str) -> String {
        let mut framed = frame_syslog_line(&self.hostname, line, Utc::now());
        framed.push('\n');
        framed
    }
}

#[async_trait]
impl Sink for SyslogSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Syslog
    }

    async fn emit(&self, item: &WorkItem, batch: &EventBatch) -> Result<(), SinkError> {
        let mut transport = self.transport.lock().await;
        for event in &batch.events {
            let framed = self.frame(&event.wire_line());
            if let Err(e) = transport.send(framed.as_bytes()).await {
                self.redial_and_send(&mut transport, framed.as_bytes(), e).await?;
            }
            self.emitted.fetch_add(1, Ordering::Relaxed);
        }
        transport.flush().await.map_err(TransportError::from)?;

        debug!(
            key = %item.object.key,
            events = batch.events.len(),
            total = self.emitted.load(Ordering::Relaxed),
            "Sent events"
        );
        Ok(())
    }

    fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}
