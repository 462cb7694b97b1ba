// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Incremental reader for one append-only capture file.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// One complete line, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub bytes: Vec<u8>,
    /// The line was longer than the limit; `bytes` holds only its prefix.
    pub truncated: bool,
}

pub struct Tailer {
    path: PathBuf,
    file: Option<File>,
    offset: u64,
    start_at_end: bool,
    max_line_bytes: usize,
    partial: Vec<u8>,
    partial_truncated: bool,
    buf: Vec<u8>,
}

impl Tailer {
    #[must_use]
    pub fn new(path: PathBuf, start_at_end: bool, max_line_bytes: usize) -> Self {
        Tailer {
            path,
            file: None,
            offset: 0,
            start_at_end,
            max_line_bytes,
            partial: Vec::new(),
            partial_truncated: false,
            buf: vec![0; READ_CHUNK_SIZE],
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads whatever complete lines are available right now. An empty
    /// result means the caller should wait before polling again. A trailing
    /// line without `\n` is kept until the rest of it is written.
    pub async fn read_lines(&mut self) -> std::io::Result<Vec<Line>> {
        let mut lines = Vec::new();
        if self.file.is_none() && !self.open().await? {
            return Ok(lines);
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(lines);
        };

        let len = file.metadata().await?.len();
        if len < self.offset {
            warn!(
                "COLLECTOR | {} was truncated ({} < {}), reading from the start",
                self.path.display(),
                len,
                self.offset
            );
            file.seek(SeekFrom::Start(0)).await?;
            self.offset = 0;
            self.partial.clear();
            self.partial_truncated = false;
        }

        let n = file.read(&mut self.buf).await?;
        if n > 0 {
            self.offset += n as u64;
            let chunk = std::mem::take(&mut self.buf);
            self.split(&chunk[..n], &mut lines);
            self.buf = chunk;
        }
        Ok(lines)
    }

    async fn open(&mut self) -> std::io::Result<bool> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        if self.start_at_end {
            self.offset = file.seek(SeekFrom::End(0)).await?;
        }
        debug!(
            "COLLECTOR | Tailing {} from offset {}",
            self.path.display(),
            self.offset
        );
        self.file = Some(file);
        Ok(true)
    }

    fn split(&mut self, mut chunk: &[u8], lines: &mut Vec<Line>) {
        while let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
            self.append(&chunk[..pos]);
            lines.push(Line {
                bytes: std::mem::take(&mut self.partial),
                truncated: std::mem::take(&mut self.partial_truncated),
            });
            chunk = &chunk[pos + 1..];
        }
        self.append(chunk);
    }

    fn append(&mut self, bytes: &[u8]) {
        let room = self.max_line_bytes.saturating_sub(self.partial.len());
        if bytes.len() > room {
            self.partial.extend_from_slice(&bytes[..room]);
            self.partial_truncated = true;
        } else {
            self.partial.extend_from_slice(bytes);
        }
    }
}
