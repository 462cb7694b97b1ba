// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Collector against a relay that loses an acknowledgement.

#![allow(clippy::unwrap_used)]

mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log_pipeline::config::Config;
use log_pipeline::logs::capture::{CaptureWriter, OwnerMetadata, SourceStream};
use log_pipeline::logs::collector::Collector;
use log_pipeline::logs::constants::ADMISSION_LABEL;
use log_pipeline::logs::transport::{codec, decode_batch, encode_ack};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// Records every frame it reads and acknowledges all of them except the
/// `silent_frame`-th, which it leaves unanswered.
async fn flaky_relay(listener: TcpListener, frames: Arc<Mutex<Vec<Bytes>>>, silent_frame: usize) {
    let mut seen = 0;
    while let Ok((stream, _)) = listener.accept().await {
        let mut framed = Framed::new(stream, codec());
        while let Some(Ok(frame)) = framed.next().await {
            let frame = frame.freeze();
            frames.lock().unwrap().push(frame.clone());
            seen += 1;
            if seen == silent_frame {
                continue;
            }
            let batch = decode_batch(&frame).unwrap();
            if framed.send(encode_ack(batch.seq).unwrap()).await.is_err() {
                break;
            }
        }
    }
}

#[tokio::test]
async fn test_unacknowledged_batch_is_resent_identically() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = listener.local_addr().unwrap().to_string();
    let frames = Arc::new(Mutex::new(Vec::new()));
    tokio::spawn(flaky_relay(listener, frames.clone(), 2));

    let mut writers: Vec<CaptureWriter> = ["api", "worker"]
        .iter()
        .map(|name| {
            let owner = OwnerMetadata::new(format!("{name}-id"))
                .with_name(*name)
                .with_label(ADMISSION_LABEL, "true");
            let writer = CaptureWriter::create(dir.path(), owner).unwrap();
            writer.write_container_config().unwrap();
            writer
        })
        .collect();
    for n in 0..10 {
        for writer in &mut writers {
            writer
                .write_line(SourceStream::Stdout, &format!("line {n}"))
                .unwrap();
        }
    }

    let config = Config {
        collector_relay_addr: relay_addr,
        collector_batch_max_events: 4,
        collector_ack_timeout: Duration::from_millis(100),
        collector_compression_level: 3,
        ..common::fast_config(dir.path())
    };
    let collector = Collector::new(Arc::new(config), None).unwrap();
    let counters = collector.counters();
    let running = collector.start(CancellationToken::new()).await.unwrap();
    let counters_ref = &counters;
    assert!(
        common::wait_until(Duration::from_secs(5), || async move {
            counters_ref.snapshot().forwarded == 20
        })
        .await
    );
    let snapshot = running.shutdown().await;
    assert_eq!(snapshot.lost, 0);

    let frames = frames.lock().unwrap().clone();
    // The silent frame came back byte for byte.
    assert_eq!(frames[1], frames[2]);

    let mut by_seq = BTreeMap::new();
    for frame in &frames {
        let batch = decode_batch(frame).unwrap();
        by_seq.entry(batch.seq).or_insert(batch.events);
    }
    let mut per_owner: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for events in by_seq.into_values() {
        for event in events {
            per_owner
                .entry(event["owner"]["name"].as_str().unwrap().to_string())
                .or_default()
                .push(event["message"].as_str().unwrap().to_string());
        }
    }
    let expected: Vec<String> = (0..10).map(|n| format!("line {n}")).collect();
    assert_eq!(per_owner["api"], expected);
    assert_eq!(per_owner["worker"], expected);
}
