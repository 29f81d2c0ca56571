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

use crate::Error;
use crate::ErrorKind;
use crate::Trap;
use crate::clock;
use crate::clock::Clock;
use crate::fileset::FileSet;
use crate::sync::SyncPolicy;
use crate::window::MappedWindow;

/// Counters describing the activity of a context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Stats {
    /// Messages copied into a slot.
    pub writes: u64,
    /// Bytes copied into slots, terminators excluded.
    pub bytes_written: u64,
    /// Messages rejected by the level filter.
    pub suppressed: u64,
    /// Messages cut to fit one slot.
    pub truncations: u64,
    /// Slot changes.
    pub rotations: u64,
    /// Successful durable flushes.
    pub syncs: u64,
    /// Failed durable flushes.
    pub flush_failures: u64,
}

/// The mutable half of a context: the ring position, the mapped window and the sync bookkeeping.
///
/// Every method runs under the context lock.
#[derive(Debug)]
pub(crate) struct State {
    files: FileSet,
    window: Option<MappedWindow>,
    file_idx: usize,
    policy: SyncPolicy,
    pub(crate) clock: Clock,
    stats: Stats,
    last_error: Option<String>,
    trap: Box<dyn Trap>,
    #[cfg(test)]
    failing_syncs: usize,
}

impl State {
    /// Creates the base directory and maps slot 0.
    pub(crate) fn new(
        files: FileSet,
        policy: SyncPolicy,
        clock: Clock,
        trap: Box<dyn Trap>,
    ) -> Result<Self, Error> {
        files.create_dir()?;

        let mut state = State {
            files,
            window: None,
            file_idx: 0,
            policy,
            clock,
            stats: Stats::default(),
            last_error: None,
            trap,
            #[cfg(test)]
            failing_syncs: 0,
        };
        state.window = Some(state.map_slot(0)?);
        Ok(state)
    }

    pub(crate) fn file_idx(&self) -> usize {
        self.file_idx
    }

    pub(crate) fn window(&self) -> Option<&MappedWindow> {
        self.window.as_ref()
    }

    pub(crate) fn stats(&self) -> Stats {
        self.stats
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    pub(crate) fn policy(&self) -> SyncPolicy {
        self.policy
    }

    fn map_slot(&self, idx: usize) -> Result<MappedWindow, Error> {
        let file = self.files.open_slot(idx)?;
        MappedWindow::map(file, self.clock.now()).map_err(|err| {
            err.with_context("path", self.files.slot_path(idx).display())
                .with_context("slot", idx)
        })
    }

    /// Copies one message into the current slot, rotating first if it does not fit, then applies
    /// the sync policy.
    ///
    /// Returns whether a rotation happened.
    pub(crate) fn append(&mut self, bytes: &[u8], terminate: bool) -> Result<bool, Error> {
        let needed = bytes.len() + usize::from(terminate);
        let rotated = self.ensure_capacity(needed)?;

        let Some(window) = self.window.as_mut() else {
            unreachable!("ensure_capacity leaves a mapped window on success");
        };
        let n = window.append(bytes, terminate)?;

        self.stats.writes += 1;
        self.stats.bytes_written += n as u64;
        if terminate {
            self.stats.truncations += 1;
        }

        self.maybe_sync();
        Ok(rotated)
    }

    /// Makes room for `len` bytes in the current window.
    ///
    /// Returns whether a rotation happened.
    fn ensure_capacity(&mut self, len: usize) -> Result<bool, Error> {
        if len > self.files.file_size() {
            return Err(Error::parameter("message larger than a slot")
                .with_context("len", len)
                .with_context("file_size", self.files.file_size()));
        }

        match self.window.as_ref() {
            Some(window) if window.fits(len) => Ok(false),
            Some(_) => {
                self.rotate()?;
                Ok(true)
            }
            None => {
                // a previous rotation failed to map its slot; retry the same slot
                self.window = Some(self.map_slot(self.file_idx)?);
                Ok(false)
            }
        }
    }

    /// Flushes and releases the current window, then maps the next slot in the ring.
    pub(crate) fn rotate(&mut self) -> Result<(), Error> {
        self.release();
        self.file_idx = self.files.next_slot(self.file_idx);
        self.stats.rotations += 1;
        self.window = Some(self.map_slot(self.file_idx)?);
        Ok(())
    }

    /// Flushes if the sync policy says so; failures are reported, never returned.
    pub(crate) fn maybe_sync(&mut self) {
        let now = self.clock.now();
        let Some(window) = self.window.as_ref() else {
            return;
        };

        let bytes_since_sync = window.bytes_since_sync();
        let time_since_sync = clock::elapsed(window.msync_time(), now);
        if self.policy.should_sync(bytes_since_sync, time_since_sync) {
            if let Err(err) = self.sync() {
                self.report(err);
            }
        }
    }

    /// Flushes `[data_offset, offset)` of the current window.
    pub(crate) fn sync(&mut self) -> Result<(), Error> {
        let now = self.clock.now();
        let Some(window) = self.window.as_mut() else {
            return Ok(());
        };

        #[cfg(test)]
        let result = if self.failing_syncs > 0 {
            self.failing_syncs -= 1;
            Err(std::io::Error::other("simulated flush failure"))
        } else {
            window.sync(now)
        };
        #[cfg(not(test))]
        let result = window.sync(now);

        match result {
            Ok(()) => {
                self.stats.syncs += 1;
                Ok(())
            }
            Err(err) => Err(Error::flush("failed to flush mapped window", err)
                .with_context("path", self.files.slot_path(self.file_idx).display())
                .with_context("offset", window.offset())),
        }
    }

    /// Flushes and drops the current window, reporting a failed flush.
    fn release(&mut self) {
        if let Err(err) = self.sync() {
            self.report(err);
        }
        self.window = None;
    }

    /// Flushes on demand, recording a failure before returning it.
    pub(crate) fn flush(&mut self) -> Result<(), Error> {
        let result = self.sync();
        if let Err(err) = &result {
            self.record(err);
        }
        result
    }

    /// Flushes and drops the current window, returning a failed flush.
    ///
    /// The mapping and descriptor are released whether or not the flush succeeds. Calling this on
    /// a closed state is a no-op.
    pub(crate) fn close(&mut self) -> Result<(), Error> {
        let result = self.sync();
        self.window = None;
        result
    }

    pub(crate) fn report(&mut self, err: Error) {
        self.record(&err);
        self.trap.trap(&err);
    }

    /// Makes the next `n` flushes of a mapped window fail.
    #[cfg(test)]
    pub(crate) fn fail_next_syncs(&mut self, n: usize) {
        self.failing_syncs = n;
    }

    fn record(&mut self, err: &Error) {
        if err.kind() == ErrorKind::Flush {
            self.stats.flush_failures += 1;
        }
        self.last_error = Some(err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    use jiff::Span;
    use jiff::Timestamp;
    use tempfile::TempDir;

    use super::*;
    use crate::clock::ManualClock;
    use crate::trap::NoopTrap;

    fn state(temp_dir: &TempDir, num_files: usize, file_size: usize, policy: SyncPolicy) -> State {
        state_with_trap(temp_dir, num_files, file_size, policy, Box::new(NoopTrap::default()))
    }

    fn state_with_trap(
        temp_dir: &TempDir,
        num_files: usize,
        file_size: usize,
        policy: SyncPolicy,
        trap: Box<dyn Trap>,
    ) -> State {
        let files = FileSet::new(temp_dir.path(), "state", num_files, file_size).unwrap();
        let start = Timestamp::from_str("2024-08-10T00:00:00Z").unwrap();
        let clock = Clock::ManualClock(ManualClock::new(start));
        State::new(files, policy, clock, trap).unwrap()
    }

    #[derive(Debug, Clone, Default)]
    struct RecordingTrap(Arc<Mutex<Vec<String>>>);

    impl RecordingTrap {
        fn trapped(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Trap for RecordingTrap {
        fn trap(&self, err: &Error) {
            self.0.lock().unwrap().push(err.to_string());
        }
    }

    fn offset(state: &State) -> usize {
        state.window().unwrap().offset()
    }

    #[test]
    fn test_writes_within_slot_never_rotate() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = state(&temp_dir, 3, 100, SyncPolicy::never());

        for _ in 0..10 {
            assert!(!state.append(b"0123456789", false).unwrap());
        }
        assert_eq!(state.file_idx(), 0);
        assert_eq!(offset(&state), 100);
        assert_eq!(state.stats().rotations, 0);

        assert!(state.append(b"x", false).unwrap());
        assert_eq!(state.file_idx(), 1);
        assert_eq!(offset(&state), 1);
        assert_eq!(state.stats().rotations, 1);
    }

    #[test]
    fn test_rotation_resets_offsets_and_flushes_previous_slot() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = state(&temp_dir, 2, 16, SyncPolicy::never());

        state.append(b"aaaaaaaaaa", false).unwrap();
        assert_eq!(state.window().unwrap().data_offset(), 0);
        state.append(b"bbbbbbbbbb", false).unwrap();

        let window = state.window().unwrap();
        assert_eq!(window.offset(), 10);
        assert_eq!(window.data_offset(), 0);
        assert_eq!(window.msync_offset(), 0);

        let previous = fs::read(temp_dir.path().join("state.0")).unwrap();
        assert_eq!(&previous[..10], b"aaaaaaaaaa");
        assert_eq!(previous.len(), 16);
    }

    #[test]
    fn test_ring_wraps_and_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = state(&temp_dir, 3, 8, SyncPolicy::never());

        for round in [b"00000000", b"11111111", b"22222222", b"33333333"] {
            state.append(round, false).unwrap();
        }
        // four full slots over a ring of three: the fourth overwrote slot 0
        assert_eq!(state.file_idx(), 0);
        assert_eq!(state.stats().rotations, 3);
        state.sync().unwrap();

        assert_eq!(fs::read(temp_dir.path().join("state.0")).unwrap(), b"33333333");
        assert_eq!(fs::read(temp_dir.path().join("state.1")).unwrap(), b"11111111");
        assert_eq!(fs::read(temp_dir.path().join("state.2")).unwrap(), b"22222222");
    }

    #[test]
    fn test_oversized_write_is_rejected_without_rotation() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = state(&temp_dir, 2, 8, SyncPolicy::never());
        state.append(b"abc", false).unwrap();

        let err = state.append(b"123456789", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parameter);
        assert_eq!(state.file_idx(), 0);
        assert_eq!(offset(&state), 3);
    }

    #[test]
    fn test_byte_threshold_bounds_unsynced_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let policy = SyncPolicy::never().with_bytes(Some(25));
        let mut state = state(&temp_dir, 2, 1000, policy);

        for _ in 0..50 {
            state.append(b"0123456789", false).unwrap();
            let window = state.window().unwrap();
            assert!(window.offset() - window.msync_offset() <= 25);
            assert_eq!(window.data_offset(), window.msync_offset());
        }
        assert!(state.stats().syncs > 0);
    }

    #[test]
    fn test_time_threshold_triggers_sync() {
        let temp_dir = TempDir::new().unwrap();
        let policy = SyncPolicy::never().with_interval(Some(Duration::from_secs(1)));
        let mut state = state(&temp_dir, 2, 1000, policy);
        let start = state.clock.now();

        state.append(b"early", false).unwrap();
        assert_eq!(state.window().unwrap().data_offset(), 0);

        let now = start.checked_add(Span::new().milliseconds(1500)).unwrap();
        state.clock.set_now(now);
        state.append(b"late", false).unwrap();

        let window = state.window().unwrap();
        assert_eq!(window.data_offset(), 9);
        assert_eq!(window.msync_time(), now);
        assert_eq!(state.stats().syncs, 1);
    }

    #[test]
    fn test_idle_time_threshold_via_maybe_sync() {
        let temp_dir = TempDir::new().unwrap();
        let policy = SyncPolicy::never().with_interval(Some(Duration::from_secs(1)));
        let mut state = state(&temp_dir, 1, 64, policy);
        let start = state.clock.now();

        state.append(b"pending", false).unwrap();
        state.maybe_sync();
        assert_eq!(state.window().unwrap().data_offset(), 0);

        state
            .clock
            .set_now(start.checked_add(Span::new().seconds(2)).unwrap());
        state.maybe_sync();
        assert_eq!(state.window().unwrap().data_offset(), 7);
    }

    #[test]
    fn test_close_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = state(&temp_dir, 1, 64, SyncPolicy::never());
        state.append(b"bye", false).unwrap();

        state.close().unwrap();
        assert!(state.window().is_none());
        state.close().unwrap();

        let content = fs::read(temp_dir.path().join("state.0")).unwrap();
        assert_eq!(&content[..3], b"bye");
    }

    #[test]
    fn test_write_after_lost_window_remaps_current_slot() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = state(&temp_dir, 2, 16, SyncPolicy::never());
        state.append(b"abc", false).unwrap();
        state.window = None;

        assert!(!state.append(b"def", false).unwrap());
        assert_eq!(state.file_idx(), 0);
        assert_eq!(offset(&state), 3);
    }

    #[test]
    fn test_failed_threshold_flush_keeps_the_write() {
        let temp_dir = TempDir::new().unwrap();
        let trap = RecordingTrap::default();
        let mut state =
            state_with_trap(&temp_dir, 2, 64, SyncPolicy::always(), Box::new(trap.clone()));

        state.fail_next_syncs(1);
        assert!(!state.append(b"kept", false).unwrap());

        let window = state.window().unwrap();
        assert_eq!(window.offset(), 4);
        assert_eq!(window.data_offset(), 0);
        assert_eq!(window.msync_offset(), 0);
        assert_eq!(state.stats().writes, 1);
        assert_eq!(state.stats().flush_failures, 1);
        assert_eq!(state.stats().syncs, 0);

        let last_error = state.last_error().unwrap();
        assert!(last_error.contains("failed to flush mapped window"), "{last_error}");
        assert!(last_error.contains("simulated flush failure"), "{last_error}");
        assert_eq!(trap.trapped(), [last_error]);

        // the next evaluation retries the pending bytes
        state.append(b"next", false).unwrap();
        let window = state.window().unwrap();
        assert_eq!(window.data_offset(), 8);
        assert_eq!(state.stats().syncs, 1);
        assert_eq!(state.stats().flush_failures, 1);
    }

    #[test]
    fn test_failed_flush_during_rotation_still_rotates() {
        let temp_dir = TempDir::new().unwrap();
        let trap = RecordingTrap::default();
        let mut state =
            state_with_trap(&temp_dir, 2, 8, SyncPolicy::never(), Box::new(trap.clone()));

        state.append(b"abcdef", false).unwrap();
        state.fail_next_syncs(1);
        assert!(state.append(b"ghij", false).unwrap());

        assert_eq!(state.file_idx(), 1);
        assert_eq!(offset(&state), 4);
        assert_eq!(state.stats().rotations, 1);
        assert_eq!(state.stats().flush_failures, 1);
        assert_eq!(trap.trapped().len(), 1);
        assert!(state.last_error().is_some());
    }

    #[test]
    fn test_failed_flush_on_demand_is_recorded_and_returned() {
        let temp_dir = TempDir::new().unwrap();
        let trap = RecordingTrap::default();
        let mut state =
            state_with_trap(&temp_dir, 1, 64, SyncPolicy::never(), Box::new(trap.clone()));
        state.append(b"pending", false).unwrap();

        state.fail_next_syncs(1);
        let err = state.flush().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Flush);
        assert_eq!(state.stats().flush_failures, 1);
        assert_eq!(state.last_error(), Some(err.to_string()));
        // returned to the caller, not trapped
        assert!(trap.trapped().is_empty());

        state.flush().unwrap();
        assert_eq!(state.window().unwrap().data_offset(), 7);
    }

    #[test]
    fn test_failed_flush_on_close_still_releases_window() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = state(&temp_dir, 1, 64, SyncPolicy::never());
        state.append(b"last words", false).unwrap();

        state.fail_next_syncs(1);
        let err = state.close().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Flush);
        assert!(state.window().is_none());

        // nothing left to flush
        state.close().unwrap();
    }
}
