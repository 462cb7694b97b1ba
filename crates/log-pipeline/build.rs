// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Build script for log-pipeline.
//!
//! Records the build time as `BUILD_TIMESTAMP` (RFC3339) so the binaries can
//! report exactly which build is running.

fn main() {
    let now = chrono::Utc::now();
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", now.to_rfc3339());
    println!("cargo:rerun-if-changed=build.rs");
}
