// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Custom tracing formatter for the pipeline's own diagnostics.
//!
//! Collector and relay diagnostics usually end up in the same container log
//! streams the collector tails, so every line is prefixed with `LOG_PIPELINE`
//! to make it trivially excludable by an `exclude_at_match` rule.
//!
//! # Format
//!
//! ```text
//! LOG_PIPELINE | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! # Examples
//!
//! ```text
//! LOG_PIPELINE | INFO | COLLECTOR | Started worker for owner 4f1c...
//! LOG_PIPELINE | WARN | forwarder{seq=12}: COLLECTOR | Relay unavailable, retrying in 400ms
//! ```

use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::log_level::LogLevel;

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "LOG_PIPELINE | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                // Populated by the fmt layer on span creation
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Builds the filter for the pipeline binaries.
///
/// `RUST_LOG` wins when set, so a single noisy dependency can be silenced
/// without touching the pipeline's own verbosity. Otherwise the configured
/// level applies to this crate and `warn` to everything else.
#[must_use]
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,log_pipeline={lvl},log_collector={lvl},log_relay={lvl}",
            lvl = level.as_ref()
        ))
    })
}
