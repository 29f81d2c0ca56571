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

use std::any::Any;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::Error;
use crate::Severity;
use crate::Status;
use crate::Trap;
use crate::clock::Clock;
use crate::fileset::FileSet;
use crate::flusher::Flusher;
use crate::format::Arg;
use crate::format::Formatter;
use crate::format::Rendered;
use crate::level::LevelFilter;
use crate::rolling::State;
use crate::rolling::Stats;
use crate::sync::SyncPolicy;
use crate::trap::DefaultTrap;

/// Creates a context with default sync thresholds.
///
/// Returns `None` if the parameters are invalid or the first slot cannot be created or mapped.
/// Use [`init_ex`] or [`LogContextBuilder::build`] to learn why.
///
/// # Examples
///
/// ```
/// use mmlog::Severity;
///
/// let dir = tempfile::tempdir().unwrap();
/// let ctx = mmlog::init("app", dir.path(), 2, 4096).unwrap();
/// ctx.print(Severity::Info, "started in {}ms", &[12u32.into()]).unwrap();
/// ctx.destroy().unwrap();
/// ```
pub fn init(
    name: &str,
    path: impl AsRef<Path>,
    num_files: usize,
    file_size: usize,
) -> Option<LogContext> {
    LogContext::builder(path.as_ref(), name)
        .max_files(num_files)
        .file_size(file_size)
        .build()
        .ok()
}

/// Creates a context, reporting the failure class as a [`Status`].
///
/// On success `out` holds the new context. On failure `out` is left untouched.
pub fn init_ex(
    name: &str,
    path: impl AsRef<Path>,
    num_files: usize,
    file_size: usize,
    out: &mut Option<LogContext>,
) -> Status {
    let result = LogContext::builder(path.as_ref(), name)
        .max_files(num_files)
        .file_size(file_size)
        .build();

    match result {
        Ok(ctx) => {
            *out = Some(ctx);
            Status::Ok
        }
        Err(err) => err.status(),
    }
}

/// The outcome of one print call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Written {
    len: usize,
    truncated: bool,
    rotated: bool,
}

impl Written {
    /// Bytes copied into the slot. Zero for a suppressed message.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing was copied, as for a suppressed message.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the message was cut to fit one slot.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Whether the write moved to the next slot first.
    pub fn is_rotated(&self) -> bool {
        self.rotated
    }
}

#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<State>,
    level: LevelFilter,
    suppressed: AtomicU64,
}

impl Shared {
    pub(crate) fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A memory-mapped, rotating log writer.
///
/// A context owns a ring of `num_files` slot files of `file_size` bytes each and keeps exactly one
/// of them mapped. Messages are appended to the mapping; a message that does not fit moves the
/// context to the next slot, overwriting its previous contents. Durable flushes are issued when
/// the bytes or the time since the last flush exceed the configured [`SyncPolicy`].
///
/// A context is `Send + Sync`. Share it between threads with [`Arc`] or scoped threads; every
/// write is serialized by one lock, and the level filter is checked before the lock is taken.
pub struct LogContext {
    shared: Arc<Shared>,
    files: FileSet,
    formatter: Formatter,
    opaque: Option<Box<dyn Any + Send + Sync>>,
    flusher: Option<Flusher>,
}

impl fmt::Debug for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogContext")
            .field("files", &self.files)
            .field("level", &self.level())
            .field("background_flush", &self.flusher.is_some())
            .finish_non_exhaustive()
    }
}

impl LogContext {
    /// Creates a new [`LogContextBuilder`].
    ///
    /// # Examples
    ///
    /// ```
    /// use mmlog::LogContext;
    ///
    /// let builder = LogContext::builder("/var/log/my_app", "my_app");
    /// ```
    #[must_use]
    pub fn builder(base_path: impl Into<PathBuf>, name: impl Into<String>) -> LogContextBuilder {
        LogContextBuilder::new(base_path, name)
    }

    /// Returns `true` if a message of `severity` would be written.
    pub fn enabled(&self, severity: Severity) -> bool {
        self.shared.level.enabled(severity)
    }

    /// Renders a template and its arguments and appends the result.
    ///
    /// A message below the current level returns an empty [`Written`] without rendering. A
    /// message longer than one slot is truncated and flagged.
    ///
    /// # Errors
    ///
    /// Return an error if the template does not match the arguments, or if moving to the next slot
    /// fails to open or map it. A failed durable flush is not an error here; see
    /// [`LogContext::last_error`].
    pub fn print(&self, severity: Severity, template: &str, args: &[Arg]) -> Result<Written, Error> {
        if !self.enabled(severity) {
            return Ok(self.suppress());
        }
        let rendered = self.formatter.format(template, args)?;
        self.commit(rendered)
    }

    /// Appends preformatted arguments, as produced by [`format_args!`].
    ///
    /// # Examples
    ///
    /// ```
    /// use mmlog::Severity;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let ctx = mmlog::init("app", dir.path(), 1, 4096).unwrap();
    /// let written = ctx
    ///     .print_fmt(Severity::Warn, format_args!("disk {}% full\n", 93))
    ///     .unwrap();
    /// assert_eq!(written.len(), 14);
    /// ```
    pub fn print_fmt(&self, severity: Severity, args: fmt::Arguments) -> Result<Written, Error> {
        if !self.enabled(severity) {
            return Ok(self.suppress());
        }
        let rendered = self.formatter.format_args(args)?;
        self.commit(rendered)
    }

    /// Appends bytes verbatim.
    pub fn print_bytes(&self, severity: Severity, bytes: &[u8]) -> Result<Written, Error> {
        if !self.enabled(severity) {
            return Ok(self.suppress());
        }
        let rendered = self.formatter.format_bytes(bytes);
        self.commit(rendered)
    }

    pub(crate) fn suppress(&self) -> Written {
        self.shared.suppressed.fetch_add(1, Ordering::Relaxed);
        Written::default()
    }

    fn commit(&self, rendered: Rendered) -> Result<Written, Error> {
        let truncated = rendered.is_truncated();
        let rotated = self.shared.state().append(rendered.bytes(), truncated)?;
        Ok(Written {
            len: rendered.len(),
            truncated,
            rotated,
        })
    }

    /// Synchronizes every byte written to the current slot to stable storage.
    pub fn flush(&self) -> Result<(), Error> {
        self.shared.state().flush()
    }

    /// Changes the level threshold.
    ///
    /// The change is serialized with in-flight writes: a write that already holds the lock
    /// completes under the previous threshold.
    pub fn set_level(&self, level: Severity) {
        let _state = self.shared.state();
        self.shared.level.set_level(level);
    }

    /// Restores the level threshold the context was created with.
    pub fn reset_level(&self) {
        self.set_level(self.default_level());
    }

    /// The current level threshold.
    pub fn level(&self) -> Severity {
        self.shared.level.level()
    }

    /// The level threshold the context was created with.
    pub fn default_level(&self) -> Severity {
        self.shared.level.default_level()
    }

    pub fn name(&self) -> &str {
        self.files.name()
    }

    pub fn base_path(&self) -> &Path {
        self.files.base_path()
    }

    pub fn num_files(&self) -> usize {
        self.files.num_files()
    }

    pub fn file_size(&self) -> usize {
        self.files.file_size()
    }

    /// The path of slot `idx`, `{base_path}/{name}.{idx}`.
    pub fn slot_path(&self, idx: usize) -> PathBuf {
        self.files.slot_path(idx)
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        self.shared.state().policy()
    }

    /// The slot currently written to.
    pub fn file_idx(&self) -> usize {
        self.shared.state().file_idx()
    }

    /// The next write position within the current slot.
    pub fn offset(&self) -> usize {
        self.shared.state().window().map_or(0, |w| w.offset())
    }

    /// The durable high-water mark within the current slot.
    pub fn data_offset(&self) -> usize {
        self.shared.state().window().map_or(0, |w| w.data_offset())
    }

    /// The write position at the last durable flush.
    pub fn msync_offset(&self) -> usize {
        self.shared.state().window().map_or(0, |w| w.msync_offset())
    }

    pub fn stats(&self) -> Stats {
        let mut stats = self.shared.state().stats();
        stats.suppressed = self.shared.suppressed.load(Ordering::Relaxed);
        stats
    }

    /// The last error that was not returned to a caller, such as a failed threshold flush.
    pub fn last_error(&self) -> Option<String> {
        self.shared.state().last_error()
    }

    /// The extension data attached with [`LogContextBuilder::opaque`], if it is a `T`.
    pub fn opaque<T: Any>(&self) -> Option<&T> {
        self.opaque.as_deref()?.downcast_ref::<T>()
    }

    #[cfg(feature = "bridge-log")]
    pub(crate) fn report(&self, err: Error) {
        self.shared.state().report(err);
    }

    /// Flushes pending bytes, unmaps and closes the current slot, and releases the context.
    ///
    /// # Errors
    ///
    /// Return the final flush error, if any. The mapping and the file are released either way.
    pub fn destroy(mut self) -> Result<(), Error> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), Error> {
        if let Some(mut flusher) = self.flusher.take() {
            flusher.stop();
        }
        self.shared.state().close()
    }
}

impl Drop for LogContext {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            let err = Error::new(err.kind(), "failed to close log context on drop")
                .with_source(err);
            self.shared.state().report(err);
        }
    }
}

/// A builder for configuring [`LogContext`].
pub struct LogContextBuilder {
    // required
    base_path: PathBuf,
    name: String,

    // has default
    num_files: usize,
    file_size: usize,
    level: Severity,
    policy: SyncPolicy,
    background_flush: Option<Duration>,
    clock: Clock,
    trap: Box<dyn Trap>,
    opaque: Option<Box<dyn Any + Send + Sync>>,
}

impl fmt::Debug for LogContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogContextBuilder")
            .field("base_path", &self.base_path)
            .field("name", &self.name)
            .field("num_files", &self.num_files)
            .field("file_size", &self.file_size)
            .field("level", &self.level)
            .field("policy", &self.policy)
            .field("background_flush", &self.background_flush)
            .field("trap", &self.trap)
            .finish_non_exhaustive()
    }
}

impl LogContextBuilder {
    /// Default number of slots.
    pub const DEFAULT_NUM_FILES: usize = 4;
    /// Default slot size: 16 MiB.
    pub const DEFAULT_FILE_SIZE: usize = 16 * 1024 * 1024;

    /// Creates a new [`LogContextBuilder`].
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            name: name.into(),
            num_files: Self::DEFAULT_NUM_FILES,
            file_size: Self::DEFAULT_FILE_SIZE,
            level: Severity::MIN,
            policy: SyncPolicy::default(),
            background_flush: None,
            clock: Clock::DefaultClock,
            trap: Box::new(DefaultTrap::default()),
            opaque: None,
        }
    }

    /// Set the number of slot files in the ring, in `1..=65535`.
    #[must_use]
    pub fn max_files(mut self, n: usize) -> Self {
        self.num_files = n;
        self
    }

    /// Set the size of each slot file in bytes, in `1..=u32::MAX`.
    #[must_use]
    pub fn file_size(mut self, n: usize) -> Self {
        self.file_size = n;
        self
    }

    /// Set the initial (and default) level threshold.
    #[must_use]
    pub fn level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }

    /// Set both sync thresholds.
    #[must_use]
    pub fn sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the byte threshold; `None` disables it.
    #[must_use]
    pub fn sync_bytes(mut self, bytes: Option<usize>) -> Self {
        self.policy = self.policy.with_bytes(bytes);
        self
    }

    /// Set the time threshold; `None` disables it.
    #[must_use]
    pub fn sync_interval(mut self, interval: Option<Duration>) -> Self {
        self.policy = self.policy.with_interval(interval);
        self
    }

    /// Run a background thread that applies the time threshold every `interval`, so idle periods
    /// are bounded as well.
    #[must_use]
    pub fn background_flush(mut self, interval: Duration) -> Self {
        self.background_flush = Some(interval);
        self
    }

    /// Set the trap for errors that are not returned to a caller.
    ///
    /// Default to [`DefaultTrap`].
    #[must_use]
    pub fn trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    /// Attach caller-owned extension data, dropped with the context.
    #[must_use]
    pub fn opaque(mut self, data: impl Any + Send + Sync) -> Self {
        self.opaque = Some(Box::new(data));
        self
    }

    #[cfg(test)]
    fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the [`LogContext`].
    ///
    /// # Errors
    ///
    /// Return an error if either:
    ///
    /// * The name, base path, number of files or file size is invalid.
    /// * The base directory or the first slot file cannot be created.
    /// * The first slot file cannot be mapped.
    pub fn build(self) -> Result<LogContext, Error> {
        let Self {
            base_path,
            name,
            num_files,
            file_size,
            level,
            policy,
            background_flush,
            clock,
            trap,
            opaque,
        } = self;

        let files = FileSet::new(base_path, name, num_files, file_size)?;
        let state = State::new(files.clone(), policy, clock, trap)?;
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            level: LevelFilter::new(level),
            suppressed: AtomicU64::new(0),
        });

        let flusher = background_flush.map(|interval| {
            let thread_name = format!("mmlog-flush-{}", files.name());
            Flusher::spawn(thread_name, shared.clone(), interval)
        });

        Ok(LogContext {
            shared,
            formatter: Formatter::new(files.file_size()),
            files,
            opaque,
            flusher,
        })
    }
}
