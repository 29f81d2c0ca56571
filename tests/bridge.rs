// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![cfg(feature = "bridge-log")]

use std::fs;
use std::sync::Arc;

use mmlog::LogContext;
use mmlog::Severity;
use tempfile::TempDir;

#[test]
fn test_log_crate_records_are_written() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = Arc::new(
        LogContext::builder(temp_dir.path(), "bridged")
            .max_files(2)
            .file_size(8192)
            .level(Severity::Info)
            .build()
            .unwrap(),
    );
    mmlog::bridge::try_setup_log_crate(ctx.clone()).unwrap();
    assert!(mmlog::bridge::try_setup_log_crate(ctx.clone()).is_err());

    log::info!(target: "bridge_test", "served {} requests", 42);
    log::debug!(target: "bridge_test", "suppressed");
    log::error!(target: "bridge_test", "upstream {}", "timeout");
    log::logger().flush();

    assert_eq!(ctx.data_offset(), ctx.offset());
    let content = fs::read(ctx.slot_path(0)).unwrap();
    let text = std::str::from_utf8(&content[..ctx.offset()]).unwrap();
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2, "{text}");
    assert!(lines[0].ends_with(" INFO bridge_test: served 42 requests"));
    assert!(lines[1].ends_with("ERROR bridge_test: upstream timeout"));
    assert_eq!(ctx.stats().suppressed, 1);
}
