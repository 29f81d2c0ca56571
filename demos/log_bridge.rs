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

use std::sync::Arc;

use mmlog::LogContext;
use mmlog::Severity;

fn main() {
    let dir = std::env::temp_dir().join("mmlog-log-bridge");
    let ctx = Arc::new(
        LogContext::builder(&dir, "log_bridge")
            .max_files(2)
            .file_size(64 * 1024)
            .level(Severity::Info)
            .build()
            .unwrap(),
    );
    mmlog::bridge::setup_log_crate(ctx.clone());

    log::error!("Hello error!");
    log::warn!("Hello warn!");
    log::info!("Hello info!");
    log::debug!("Hello debug!");
    log::trace!("Hello trace!");

    log::logger().flush();
    println!("{} bytes in {}", ctx.offset(), ctx.slot_path(ctx.file_idx()).display());
}
