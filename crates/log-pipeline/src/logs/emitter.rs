// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Reference event emitter.
//!
//! Writes one self-contained JSON record per line and flushes after every
//! line. The trace identity of a record is whatever [`CorrelationContext`]
//! the caller passes in; nothing is read from ambient state.

use std::io::{self, Stdout, Write};

use chrono::{DateTime, Duration, FixedOffset, SubsecRound, Utc};
use serde_json::{Map, Value};

use crate::logs::record::{Correlation, Level, LogRecord, SCHEMA_VERSION};

/// Trace and span the caller is working in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationContext {
    pub trace_id: String,
    pub span_id: String,
    pub parent_id: Option<String>,
    pub exportable: bool,
}

impl CorrelationContext {
    #[must_use]
    pub fn root(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        CorrelationContext {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            parent_id: None,
            exportable: false,
        }
    }

    /// A span of the same trace whose parent is this one.
    #[must_use]
    pub fn child(&self, span_id: impl Into<String>) -> Self {
        CorrelationContext {
            trace_id: self.trace_id.clone(),
            span_id: span_id.into(),
            parent_id: Some(self.span_id.clone()),
            exportable: self.exportable,
        }
    }

    #[must_use]
    pub fn with_exportable(mut self, exportable: bool) -> Self {
        self.exportable = exportable;
        self
    }

    /// `None` unless both identifiers are set, so a record never carries
    /// half a correlation.
    #[must_use]
    pub fn correlation(&self) -> Option<Correlation> {
        if self.trace_id.is_empty() || self.span_id.is_empty() {
            return None;
        }
        Some(Correlation {
            trace_id: self.trace_id.clone(),
            span_id: self.span_id.clone(),
            parent_id: self.parent_id.clone(),
            exportable: self.exportable,
        })
    }
}

pub struct Emitter<W: Write> {
    writer: W,
    application_name: String,
    logger_origin: String,
    thread_origin: String,
    last_timestamp: Option<DateTime<FixedOffset>>,
}

impl Emitter<Stdout> {
    #[must_use]
    pub fn stdout(application_name: impl Into<String>) -> Self {
        Emitter::new(io::stdout(), application_name)
    }
}

impl<W: Write> Emitter<W> {
    #[must_use]
    pub fn new(writer: W, application_name: impl Into<String>) -> Self {
        Emitter {
            writer,
            application_name: application_name.into(),
            logger_origin: "root".to_string(),
            thread_origin: "main".to_string(),
            last_timestamp: None,
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger_origin: impl Into<String>) -> Self {
        self.logger_origin = logger_origin.into();
        self
    }

    #[must_use]
    pub fn with_thread(mut self, thread_origin: impl Into<String>) -> Self {
        self.thread_origin = thread_origin.into();
        self
    }

    pub fn emit(
        &mut self,
        level: Level,
        message: &str,
        context: Option<&CorrelationContext>,
        extra_fields: Map<String, Value>,
    ) -> io::Result<LogRecord> {
        self.emit_at(Utc::now().into(), level, message, context, extra_fields)
    }

    /// Emits with an explicit timestamp. Timestamps of one emitter never go
    /// backwards: an earlier or equal time is bumped one millisecond past the
    /// previous record.
    pub fn emit_at(
        &mut self,
        timestamp: DateTime<FixedOffset>,
        level: Level,
        message: &str,
        context: Option<&CorrelationContext>,
        extra_fields: Map<String, Value>,
    ) -> io::Result<LogRecord> {
        let mut timestamp = timestamp.trunc_subsecs(3);
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                timestamp = last + Duration::milliseconds(1);
            }
        }

        let record = LogRecord {
            timestamp,
            schema_version: SCHEMA_VERSION,
            message: message.to_string(),
            level,
            logger_origin: self.logger_origin.clone(),
            thread_origin: self.thread_origin.clone(),
            application_name: self.application_name.clone(),
            correlation: context.and_then(CorrelationContext::correlation),
            extra_fields,
        };
        let mut line = record.to_json_line();
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        self.last_timestamp = Some(timestamp);
        Ok(record)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
