//! Zabbix sender protocol client.
//!
//! Each request is one frame: `ZBXD`, a flags byte, the payload length as
//! a little-endian u64, then the JSON payload. The server answers with a
//! frame of the same shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::SendError;

pub const DEFAULT_PORT: u16 = 10051;

const MAGIC: &[u8; 4] = b"ZBXD";
const FLAG_PROTOCOL: u8 = 0x01;
const FLAG_COMPRESSED: u8 = 0x02;
const HEADER_LEN: usize = 13;
const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;

static ACK_COUNTS: OnceLock<Option<regex::Regex>> = OnceLock::new();

/// One trapper item value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataItem {
    pub host: String,
    pub key: String,
    pub value: String,
}

/// Tag every cached entry with `host`, ordered by key
pub fn make_data_items(metrics: HashMap<String, String>, host: &str) -> Vec<DataItem> {
    let mut items: Vec<DataItem> = metrics
        .into_iter()
        .map(|(key, value)| DataItem { host: host.to_string(), key, value })
        .collect();
    items.sort_by(|a, b| a.key.cmp(&b.key));
    items
}

/// Server acknowledgment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SenderAck {
    pub response: String,
    #[serde(default)]
    pub info: String,
}

impl SenderAck {
    /// `(processed, failed)` counts parsed from the info string
    pub fn counts(&self) -> Option<(u64, u64)> {
        let re = ACK_COUNTS
            .get_or_init(|| regex::Regex::new(r"processed:\s*(\d+);\s*failed:\s*(\d+)").ok())
            .as_ref()?;
        let caps = re.captures(&self.info)?;
        Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
    }
}

impl std::fmt::Display for SenderAck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.response, self.info)
    }
}

/// Sends one batch of items to a remote collector.
#[async_trait]
pub trait BatchSender: Send + Sync {
    async fn send(&self, items: &[DataItem]) -> Result<SenderAck, SendError>;
}

#[derive(Serialize)]
struct SenderRequest<'a> {
    request: &'static str,
    data: &'a [DataItem],
    clock: i64,
}

/// Frame a sender request for the wire
pub fn encode_request(items: &[DataItem], clock: i64) -> Result<Vec<u8>, SendError> {
    let payload = serde_json::to_vec(&SenderRequest {
        request: "sender data",
        data: items,
        clock,
    })?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(MAGIC);
    frame.push(FLAG_PROTOCOL);
    frame.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Parse a frame header, returning the payload length
pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<u64, SendError> {
    if &header[..4] != MAGIC {
        return Err(SendError::Protocol("missing ZBXD header".into()));
    }
    if header[4] & FLAG_COMPRESSED != 0 {
        return Err(SendError::Protocol("compressed responses are not supported".into()));
    }
    let mut len = [0u8; 8];
    len.copy_from_slice(&header[5..]);
    let len = u64::from_le_bytes(len);
    if len > MAX_RESPONSE_BYTES {
        return Err(SendError::Protocol(format!("response of {} bytes is too large", len)));
    }
    Ok(len)
}

/// Append the default trapper port when `server` has none
pub fn with_default_port(server: &str) -> String {
    if server.parse::<SocketAddr>().is_ok() {
        return server.to_string();
    }
    match server.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => server.to_string(),
        _ if server.contains(':') => format!("[{}]:{}", server.trim_matches(|c: char| c == '[' || c == ']'), DEFAULT_PORT),
        _ => format!("{}:{}", server, DEFAULT_PORT),
    }
}

/// Sender talking to a Zabbix server or proxy over TCP
pub struct ZabbixSender {
    server: String,
    timeout: Duration,
}

impl ZabbixSender {
    pub fn new(server: impl Into<String>, timeout: Duration) -> Self {
        Self { server: server.into(), timeout }
    }

    async fn resolve(&self) -> Result<SocketAddr, SendError> {
        let target = with_default_port(&self.server);
        let mut addrs = tokio::net::lookup_host(target.clone())
            .await
            .map_err(|source| SendError::Resolve { addr: target.clone(), source })?;
        addrs.next().ok_or(SendError::NoAddress(target))
    }

    async fn exchange(&self, addr: SocketAddr, frame: &[u8]) -> Result<SenderAck, SendError> {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(frame).await?;
        stream.flush().await?;

        let mut header = [0u8; HEADER_LEN];
        stream.read_exact(&mut header).await?;
        let len = decode_header(&header)?;

        let mut body = vec![0u8; len as usize];
        stream.read_exact(&mut body).await?;

        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl BatchSender for ZabbixSender {
    async fn send(&self, items: &[DataItem]) -> Result<SenderAck, SendError> {
        let addr = self.resolve().await?;
        let frame = encode_request(items, chrono::Utc::now().timestamp())?;

        tracing::debug!(server = %addr, items = items.len(), bytes = frame.len(), "Sending batch");

        let ack = tokio::time::timeout(self.timeout, self.exchange(addr, &frame))
            .await
            .map_err(|_| SendError::Timeout(self.timeout.as_secs()))??;

        if ack.response != "success" {
            return Err(SendError::Rejected {
                response: ack.response,
                info: ack.info,
            });
        }
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        let items = vec![DataItem { host: "node01".into(), key: "hw.dummy".into(), value: "1".into() }];
        let frame = encode_request(&items, 1_700_000_000).unwrap();

        assert_eq!(&frame[..4], b"ZBXD");
        assert_eq!(frame[4], 0x01);
        let mut len = [0u8; 8];
        len.copy_from_slice(&frame[5..13]);
        assert_eq!(u64::from_le_bytes(len) as usize, frame.len() - 13);

        let body: serde_json::Value = serde_json::from_slice(&frame[13..]).unwrap();
        assert_eq!(body["request"], "sender data");
        assert_eq!(body["clock"], 1_700_000_000);
        assert_eq!(body["data"][0]["host"], "node01");
        assert_eq!(body["data"][0]["key"], "hw.dummy");
        assert_eq!(body["data"][0]["value"], "1");
    }

    #[test]
    fn header_validation() {
        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(b"ZBXD");
        header[4] = 0x01;
        header[5] = 42;
        assert_eq!(decode_header(&header).unwrap(), 42);

        header[4] = 0x03;
        assert!(decode_header(&header).is_err());

        header[..4].copy_from_slice(b"HTTP");
        assert!(decode_header(&header).is_err());
    }

    #[test]
    fn default_port_is_appended() {
        assert_eq!(with_default_port("localhost"), "localhost:10051");
        assert_eq!(with_default_port("zbx.example.com:10052"), "zbx.example.com:10052");
        assert_eq!(with_default_port("10.0.0.5"), "10.0.0.5:10051");
        assert_eq!(with_default_port("::1"), "[::1]:10051");
        assert_eq!(with_default_port("[::1]:10052"), "[::1]:10052");
    }

    #[test]
    fn items_are_tagged_and_sorted() {
        let metrics = HashMap::from([
            ("hw.system.Main".to_string(), "0".to_string()),
            ("hw.chassis.Fans".to_string(), "1".to_string()),
        ]);
        let items = make_data_items(metrics, "node01.example.com");
        assert_eq!(items[0].key, "hw.chassis.Fans");
        assert!(items.iter().all(|i| i.host == "node01.example.com"));
    }

    #[test]
    fn ack_counts() {
        let ack = SenderAck {
            response: "success".into(),
            info: "processed: 3; failed: 1; total: 4; seconds spent: 0.000055".into(),
        };
        assert_eq!(ack.counts(), Some((3, 1)));

        let other = SenderAck { response: "success".into(), info: "processed: 12; failed: 0; total: 12".into() };
        assert_eq!(other.counts(), Some((12, 0)));
        assert_eq!(SenderAck { response: "failed".into(), info: String::new() }.counts(), None);
    }

    #[tokio::test]
    async fn resolves_literal_address_with_default_port() {
        let sender = ZabbixSender::new("127.0.0.1", Duration::from_secs(1));
        let addr = sender.resolve().await.unwrap();
        assert_eq!(addr, "127.0.0.1:10051".parse::<SocketAddr>().unwrap());

        let sender = ZabbixSender::new("[::1]:10052", Duration::from_secs(1));
        assert_eq!(sender.resolve().await.unwrap().port(), 10052);
    }
}
