// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! HTTP client for the index store's bulk API.

use core::time::Duration;
use std::error::Error;

use tracing::error;

use crate::config::Config;

/// Builds the client used by the index writer. A builder failure falls back
/// to reqwest's defaults rather than preventing the relay from starting.
#[must_use]
pub fn get_client(config: &Config) -> reqwest::Client {
    match build_client(config) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "RELAY | Failed to build HTTP client: {}, using reqwest defaults",
                e
            );
            reqwest::Client::new()
        }
    }
}

fn build_client(config: &Config) -> Result<reqwest::Client, Box<dyn Error>> {
    let client = reqwest::Client::builder()
        .timeout(config.index_timeout)
        .connect_timeout(config.index_timeout)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(120)))
        .build()?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_client_with_default_config() {
        let client = get_client(&Config::default());
        // Building a request exercises the client without any network I/O.
        assert!(client.get("http://localhost:9200").build().is_ok());
    }
}
