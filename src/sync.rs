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

/// Decides when written bytes must be synchronized to stable storage.
///
/// After each write the context compares the bytes written and the time elapsed since the last
/// durable flush against two thresholds. Exceeding either one triggers a flush, which bounds the
/// data lost on a crash to one threshold's worth of bytes or time.
///
/// A threshold of `None` disables that trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    bytes: Option<usize>,
    interval: Option<Duration>,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::new(Some(Self::DEFAULT_BYTES), Some(Self::DEFAULT_INTERVAL))
    }
}

impl SyncPolicy {
    /// Default byte threshold: 1 MiB.
    pub const DEFAULT_BYTES: usize = 1024 * 1024;
    /// Default time threshold: one second.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    /// Creates a policy with the given thresholds.
    pub const fn new(bytes: Option<usize>, interval: Option<Duration>) -> Self {
        SyncPolicy { bytes, interval }
    }

    /// A policy that never flushes on its own; bytes are synchronized on rotation, on explicit
    /// flush, and on destroy.
    pub const fn never() -> Self {
        SyncPolicy::new(None, None)
    }

    /// A policy that flushes after every non-empty write.
    pub const fn always() -> Self {
        SyncPolicy::new(Some(0), None)
    }

    /// Returns a copy with the byte threshold replaced.
    #[must_use]
    pub const fn with_bytes(mut self, bytes: Option<usize>) -> Self {
        self.bytes = bytes;
        self
    }

    /// Returns a copy with the time threshold replaced.
    #[must_use]
    pub const fn with_interval(mut self, interval: Option<Duration>) -> Self {
        self.interval = interval;
        self
    }

    /// The byte threshold.
    pub const fn bytes_threshold(&self) -> Option<usize> {
        self.bytes
    }

    /// The time threshold.
    pub const fn time_threshold(&self) -> Option<Duration> {
        self.interval
    }

    /// Returns `true` if either threshold is exceeded.
    pub fn should_sync(&self, bytes_since_sync: usize, time_since_sync: Duration) -> bool {
        self.should_sync_on_bytes(bytes_since_sync) || self.should_sync_on_time(time_since_sync)
    }

    fn should_sync_on_bytes(&self, bytes_since_sync: usize) -> bool {
        self.bytes.is_some_and(|n| bytes_since_sync > n)
    }

    fn should_sync_on_time(&self, time_since_sync: Duration) -> bool {
        self.interval.is_some_and(|d| time_since_sync > d)
    }
}
