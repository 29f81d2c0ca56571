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

//! mmlog is a memory-mapped, rotating log writer.
//!
//! # Overview
//!
//! A [`LogContext`] writes messages into a fixed ring of preallocated slot files named
//! `{base_path}/{name}.{i}`. The current slot is memory mapped, so appending a message is a copy
//! into the mapping. When a message does not fit, the context moves to the next slot, wrapping
//! around to overwrite the oldest one. Bytes are synchronized to stable storage whenever the bytes
//! or the time since the last flush exceed a [`SyncPolicy`].
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use mmlog::LogContext;
//! use mmlog::Severity;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let ctx = LogContext::builder(dir.path(), "server")
//!     .max_files(8)
//!     .file_size(1024 * 1024)
//!     .level(Severity::Info)
//!     .sync_bytes(Some(64 * 1024))
//!     .sync_interval(Some(Duration::from_millis(500)))
//!     .build()
//!     .unwrap();
//!
//! ctx.print(Severity::Info, "accepted {} from {}\n", &["conn-7".into(), "10.0.0.3".into()])
//!     .unwrap();
//! ctx.print(Severity::Debug, "not written\n", &[]).unwrap();
//! assert_eq!(ctx.stats().suppressed, 1);
//!
//! ctx.destroy().unwrap();
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod fileset;
pub mod format;
pub mod level;
pub mod sync;
pub mod trap;

#[cfg(feature = "bridge-log")]
pub mod bridge;

mod clock;
mod context;
mod error;
mod flusher;
mod rolling;
mod window;

pub use self::context::LogContext;
pub use self::context::LogContextBuilder;
pub use self::context::Written;
pub use self::context::init;
pub use self::context::init_ex;
pub use self::error::Error;
pub use self::error::ErrorKind;
pub use self::error::Status;
pub use self::fileset::FileSet;
pub use self::format::Arg;
pub use self::format::Formatter;
pub use self::level::LevelFilter;
pub use self::level::Severity;
pub use self::rolling::Stats;
pub use self::sync::SyncPolicy;
pub use self::trap::Trap;
