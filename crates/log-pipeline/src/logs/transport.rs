// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Collector → relay wire protocol.
//!
//! TCP, one length-delimited frame per message (4-byte big-endian length).
//! A batch frame is a flag byte followed by the body:
//!
//! ```text
//!   ┌──────┬────────────────────────────────────────────┐
//!   │ flag │ {"seq":42,"events":[{...},{...}]}          │  flag 0: plain JSON
//!   └──────┴────────────────────────────────────────────┘  flag 1: zstd(JSON)
//! ```
//!
//! The relay answers every batch with `{"ack":42}` once all of its events are
//! queued for indexing. A collector that does not get the ack in time drops
//! the connection and sends the very same frame again, so duplicates are
//! bit-identical.

use std::io::{Read, Write};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;
use zstd::stream::read::Decoder;
use zstd::stream::write::Encoder;

use crate::logs::constants::MAX_FRAME_SIZE_BYTES;

pub const FLAG_PLAIN: u8 = 0;
pub const FLAG_ZSTD: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection closed by peer")]
    Closed,
    #[error("failed to encode frame: {0}")]
    Encode(serde_json::Error),
    #[error("invalid frame: {0}")]
    Decode(String),
    #[error("acknowledgement for batch {got}, expected {expected}")]
    UnexpectedAck { expected: u64, got: u64 },
}

/// Codec shared by both ends of the connection.
#[must_use]
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_SIZE_BYTES)
        .new_codec()
}

/// A decoded batch, as seen by the relay.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchFrame {
    pub seq: u64,
    pub events: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ack: u64,
}

fn compress(data: &[u8], level: i32) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = Encoder::new(Vec::new(), level)?;
    encoder.write_all(data)?;
    encoder.finish()
}

/// Encodes already serialized documents into a batch frame. A compression
/// level of `0` sends plain JSON.
pub fn encode_batch(
    seq: u64,
    documents: &[String],
    compression_level: i32,
) -> Result<Bytes, TransportError> {
    let capacity = documents.iter().map(|d| d.len() + 1).sum::<usize>() + 32;
    let mut body = Vec::with_capacity(capacity);
    body.extend(format!("{{\"seq\":{seq},\"events\":[").as_bytes());
    for (i, document) in documents.iter().enumerate() {
        if i > 0 {
            body.push(b',');
        }
        body.extend(document.as_bytes());
    }
    body.extend(b"]}");

    let mut frame = BytesMut::with_capacity(body.len() + 1);
    if compression_level > 0 {
        let compressed = compress(&body, compression_level)?;
        frame.put_u8(FLAG_ZSTD);
        frame.extend_from_slice(&compressed);
    } else {
        frame.put_u8(FLAG_PLAIN);
        frame.extend_from_slice(&body);
    }
    Ok(frame.freeze())
}

pub fn decode_batch(frame: &[u8]) -> Result<BatchFrame, TransportError> {
    let Some((&flag, body)) = frame.split_first() else {
        return Err(TransportError::Decode("empty frame".to_string()));
    };
    let batch = match flag {
        FLAG_PLAIN => serde_json::from_slice(body),
        FLAG_ZSTD => {
            let mut decompressed = Vec::new();
            Decoder::new(body)?
                .take(MAX_FRAME_SIZE_BYTES as u64 + 1)
                .read_to_end(&mut decompressed)?;
            if decompressed.len() > MAX_FRAME_SIZE_BYTES {
                return Err(TransportError::Decode(
                    "decompressed batch exceeds the frame limit".to_string(),
                ));
            }
            serde_json::from_slice(&decompressed)
        }
        other => {
            return Err(TransportError::Decode(format!(
                "unknown frame flag {other}"
            )))
        }
    };
    batch.map_err(|e| TransportError::Decode(e.to_string()))
}

pub fn encode_ack(seq: u64) -> Result<Bytes, TransportError> {
    serde_json::to_vec(&Ack { ack: seq })
        .map(Bytes::from)
        .map_err(TransportError::Encode)
}

pub fn decode_ack(frame: &[u8]) -> Result<Ack, TransportError> {
    serde_json::from_slice(frame).map_err(|e| TransportError::Decode(e.to_string()))
}

/// Collector end of the connection. Connects lazily and forgets the
/// connection after any failure so the next send starts fresh.
pub struct RelayClient {
    addr: String,
    ack_timeout: Duration,
    connection: Option<Framed<TcpStream, LengthDelimitedCodec>>,
}

impl RelayClient {
    #[must_use]
    pub fn new(addr: String, ack_timeout: Duration) -> Self {
        RelayClient {
            addr,
            ack_timeout,
            connection: None,
        }
    }

    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.connection.is_some() {
            return Ok(());
        }
        let stream = tokio::time::timeout(self.ack_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| TransportError::Timeout(self.ack_timeout))??;
        stream.set_nodelay(true)?;
        debug!("COLLECTOR | Connected to relay {}", self.addr);
        self.connection = Some(Framed::new(stream, codec()));
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.connection = None;
    }

    /// Sends one batch frame and waits for its acknowledgement.
    pub async fn send(&mut self, frame: Bytes, seq: u64) -> Result<(), TransportError> {
        let result = self.send_inner(frame, seq).await;
        if result.is_err() {
            self.disconnect();
        }
        result
    }

    async fn send_inner(&mut self, frame: Bytes, seq: u64) -> Result<(), TransportError> {
        self.connect().await?;
        let ack_timeout = self.ack_timeout;
        let Some(connection) = self.connection.as_mut() else {
            return Err(TransportError::Closed);
        };
        connection.send(frame).await?;

        let reply = tokio::time::timeout(ack_timeout, connection.next())
            .await
            .map_err(|_| TransportError::Timeout(ack_timeout))?;
        let ack = match reply {
            Some(Ok(bytes)) => decode_ack(&bytes)?,
            Some(Err(e)) => return Err(TransportError::Io(e)),
            None => return Err(TransportError::Closed),
        };
        if ack.ack != seq {
            return Err(TransportError::UnexpectedAck {
                expected: seq,
                got: ack.ack,
            });
        }
        Ok(())
    }
}
