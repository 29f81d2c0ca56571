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

use std::time::Duration;

use mmlog::Arg;
use mmlog::LogContext;
use mmlog::Severity;

fn main() {
    let dir = std::env::temp_dir().join("mmlog-ring-writer");
    let ctx = LogContext::builder(&dir, "ring_writer")
        .max_files(4)
        .file_size(4096)
        .level(Severity::Info)
        .sync_bytes(Some(1024))
        .sync_interval(Some(Duration::from_millis(200)))
        .background_flush(Duration::from_millis(100))
        .build()
        .unwrap();

    for i in 0..1000u32 {
        let severity = if i % 10 == 0 {
            Severity::Warn
        } else {
            Severity::Debug
        };
        ctx.print(severity, "request {} took {}ms\n", &[Arg::from(i), Arg::from(i % 37)])
            .unwrap();
        ctx.print(Severity::Info, "heartbeat {}\n", &[Arg::from(i)])
            .unwrap();
    }

    let stats = ctx.stats();
    println!("wrote to {} in slot {}", dir.display(), ctx.file_idx());
    println!("{stats:?}");
    ctx.destroy().unwrap();
}
