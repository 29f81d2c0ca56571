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

//! Message severities and the threshold filter.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

use crate::Error;

/// The severity of a message.
///
/// Severities occupy the fixed interval `0..=7`. A larger value is more severe, and a context
/// whose threshold is `t` keeps every message with severity `>= t`:
///
/// | value | severity                 |
/// |-------|--------------------------|
/// | 0     | [`Trace`](Self::Trace)       |
/// | 1     | [`Debug`](Self::Debug)       |
/// | 2     | [`Info`](Self::Info)         |
/// | 3     | [`Notice`](Self::Notice)     |
/// | 4     | [`Warn`](Self::Warn)         |
/// | 5     | [`Error`](Self::Error)       |
/// | 6     | [`Critical`](Self::Critical) |
/// | 7     | [`Fatal`](Self::Fatal)       |
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Notice = 3,
    Warn = 4,
    Error = 5,
    Critical = 6,
    Fatal = 7,
}

impl Severity {
    /// The least severe value.
    pub const MIN: Severity = Severity::Trace;
    /// The most severe value.
    pub const MAX: Severity = Severity::Fatal;

    const ALL: [Severity; 8] = [
        Severity::Trace,
        Severity::Debug,
        Severity::Info,
        Severity::Notice,
        Severity::Warn,
        Severity::Error,
        Severity::Critical,
        Severity::Fatal,
    ];

    /// Returns the numeric value in `0..=7`.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a numeric value, returning `None` outside `0..=7`.
    pub const fn from_u8(value: u8) -> Option<Severity> {
        if value as usize >= Self::ALL.len() {
            return None;
        }
        Some(Self::ALL[value as usize])
    }

    /// Returns the upper-case name of this severity.
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Notice => "NOTICE",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl TryFrom<u8> for Severity {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        Severity::from_u8(value).ok_or_else(|| {
            Error::parameter("severity out of range").with_context("severity", value)
        })
    }
}

impl FromStr for Severity {
    type Err = Error;

    /// Parses a name (case-insensitive) or a number in `0..=7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = s.parse::<u8>() {
            return Severity::try_from(value);
        }

        Severity::ALL
            .into_iter()
            .find(|severity| severity.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::parameter("unknown severity").with_context("severity", s))
    }
}

#[cfg(feature = "bridge-log")]
impl From<log::Level> for Severity {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Severity::Error,
            log::Level::Warn => Severity::Warn,
            log::Level::Info => Severity::Info,
            log::Level::Debug => Severity::Debug,
            log::Level::Trace => Severity::Trace,
        }
    }
}

/// A filter that rejects messages less severe than its threshold.
///
/// The threshold is read without locking so that suppressed messages cost one atomic load.
/// Writers of the threshold are serialized by the owning context.
#[derive(Debug)]
pub struct LevelFilter {
    level: AtomicU8,
    default_level: Severity,
}

impl LevelFilter {
    /// Creates a filter whose current and default threshold is `level`.
    pub fn new(level: Severity) -> Self {
        LevelFilter {
            level: AtomicU8::new(level.as_u8()),
            default_level: level,
        }
    }

    /// Returns `true` if a message of `severity` passes the filter.
    pub fn enabled(&self, severity: Severity) -> bool {
        severity >= self.level()
    }

    /// Returns the current threshold.
    pub fn level(&self) -> Severity {
        // only valid severities are ever stored
        Severity::from_u8(self.level.load(Ordering::Acquire)).unwrap_or(Severity::MIN)
    }

    /// Returns the threshold the filter was created with.
    pub fn default_level(&self) -> Severity {
        self.default_level
    }

    pub(crate) fn set_level(&self, level: Severity) {
        self.level.store(level.as_u8(), Ordering::Release);
    }
}
