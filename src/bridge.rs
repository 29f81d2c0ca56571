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

//! A bridge to forward logs from the `log` crate to a [`LogContext`].
//!
//! Each record becomes one line:
//!
//! ```text
//! 2024-08-11T22:44:57.172105+08:00  INFO my_app::server: listening on 0.0.0.0:8080
//! ```

use std::sync::Arc;

use jiff::Zoned;
use jiff::tz::TimeZone;

use crate::LogContext;
use crate::Severity;

/// A [`log::Log`] implementation writing through a shared [`LogContext`].
#[derive(Debug)]
pub struct MmapLogger {
    context: Arc<LogContext>,
    tz: Option<TimeZone>,
}

impl MmapLogger {
    pub fn new(context: Arc<LogContext>) -> Self {
        MmapLogger { context, tz: None }
    }

    /// Render timestamps in `tz` instead of the system time zone.
    #[must_use]
    pub fn with_time_zone(mut self, tz: TimeZone) -> Self {
        self.tz = Some(tz);
        self
    }

    pub fn context(&self) -> &Arc<LogContext> {
        &self.context
    }
}

impl log::Log for MmapLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.context.enabled(Severity::from(metadata.level()))
    }

    fn log(&self, record: &log::Record) {
        let severity = Severity::from(record.level());
        if !self.context.enabled(severity) {
            self.context.suppress();
            return;
        }

        let time = match self.tz.clone() {
            Some(tz) => Zoned::now().with_time_zone(tz),
            None => Zoned::now(),
        }
        .strftime("%Y-%m-%dT%H:%M:%S.%6f%:z");
        let level = record.level();
        let target = record.target();
        let message = record.args();

        let result = self.context.print_fmt(
            severity,
            format_args!("{time} {level:>5} {target}: {message}\n"),
        );
        if let Err(err) = result {
            self.context.report(err);
        }
    }

    fn flush(&self) {
        if let Err(err) = self.context.flush() {
            self.context.report(err);
        }
    }
}

/// Set up the log crate global logger over `context`.
///
/// All logs from the log crate will be written to `context`. Any log events that occur before
/// initialization will be ignored.
///
/// This function will set the global maximum log level to `Trace`. Filtering then happens
/// against the level of `context`, which can be changed with [`LogContext::set_level`].
///
/// # Errors
///
/// Return an error if the log crate global logger has already been set.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// let dir = tempfile::tempdir().unwrap();
/// let ctx = Arc::new(mmlog::init("app", dir.path(), 2, 4096).unwrap());
/// if let Err(err) = mmlog::bridge::try_setup_log_crate(ctx) {
///     eprintln!("failed to setup log crate: {err}");
/// }
/// ```
pub fn try_setup_log_crate(context: Arc<LogContext>) -> Result<(), log::SetLoggerError> {
    log::set_boxed_logger(Box::new(MmapLogger::new(context)))?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

/// Set up the log crate global logger over `context`.
///
/// # Panics
///
/// Panic if the log crate global logger has already been set.
pub fn setup_log_crate(context: Arc<LogContext>) {
    try_setup_log_crate(context).expect(
        "mmlog::bridge::setup_log_crate must be called before the log crate global logger initialized",
    )
}
