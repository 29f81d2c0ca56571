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

use std::fmt;
use std::io;

/// The category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid slot count, slot size, name, path or message template.
    Parameter,
    /// A slot file could not be created, opened or resized.
    Filesystem,
    /// A slot file could not be mapped into memory.
    Mapping,
    /// Mapped bytes could not be synchronized to stable storage.
    Flush,
}

impl ErrorKind {
    /// Returns the string form of this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Parameter => "parameter",
            ErrorKind::Filesystem => "filesystem",
            ErrorKind::Mapping => "mapping",
            ErrorKind::Flush => "flush",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The status reported by [`init_ex`](crate::init_ex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The context was created.
    Ok,
    /// A parameter was rejected before touching the filesystem.
    Param,
    /// The base directory or the first slot file could not be prepared.
    Fs,
    /// The first slot file could not be mapped.
    Map,
}

/// The error struct of mmlog.
pub struct Error {
    kind: ErrorKind,
    message: String,
    sources: Vec<anyhow::Error>,
    context: Vec<(&'static str, String)>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            write!(f, " }}")?;
        }

        if !self.sources.is_empty() {
            write!(f, ", sources: [")?;
            for (i, source) in self.sources.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{source}")?;
            }
            write!(f, "]")?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // If alternate has been specified, we will print like Debug.
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("context", &self.context);
            de.field("sources", &self.sources);
            return de.finish();
        }

        write!(f, "{} ({})", self.message, self.kind)?;
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "   {k}: {v}")?;
            }
        }
        if !self.sources.is_empty() {
            writeln!(f)?;
            writeln!(f, "Sources:")?;
            for source in self.sources.iter() {
                writeln!(f, "   {source:#}")?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.sources.first().map(|v| v.as_ref())
    }
}

impl Error {
    /// Create a new Error with error kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sources: vec![],
            context: vec![],
        }
    }

    /// Add one more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Add one more source in error.
    pub fn with_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        self.sources.push(src.into());
        self
    }

    /// Return the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Return the message of this error, without context or sources.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Return an iterator over all sources of this error.
    pub fn sources(&self) -> impl ExactSizeIterator<Item = &(dyn std::error::Error + 'static)> {
        self.sources.iter().map(|v| v.as_ref())
    }

    /// Map this error onto the status codes of [`init_ex`](crate::init_ex).
    ///
    /// A flush failure can only surface while mapping the first slot, so it reports as
    /// [`Status::Map`].
    pub fn status(&self) -> Status {
        match self.kind {
            ErrorKind::Parameter => Status::Param,
            ErrorKind::Filesystem => Status::Fs,
            ErrorKind::Mapping | ErrorKind::Flush => Status::Map,
        }
    }

    pub(crate) fn parameter(message: impl Into<String>) -> Error {
        Error::new(ErrorKind::Parameter, message)
    }

    pub(crate) fn filesystem(message: impl Into<String>, err: io::Error) -> Error {
        Error::new(ErrorKind::Filesystem, message).with_source(err)
    }

    pub(crate) fn mapping(message: impl Into<String>, err: io::Error) -> Error {
        Error::new(ErrorKind::Mapping, message).with_source(err)
    }

    pub(crate) fn flush(message: impl Into<String>, err: io::Error) -> Error {
        Error::new(ErrorKind::Flush, message).with_source(err)
    }

    /// Default constructor for [`Error`] from [`fmt::Error`].
    pub fn from_fmt_error(err: fmt::Error) -> Error {
        Error::parameter("failed to perform format").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_context_and_sources() {
        let err = Error::filesystem(
            "failed to open slot file",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        )
        .with_context("path", "/tmp/x/app.0")
        .with_context("slot", 0);

        assert_eq!(
            err.to_string(),
            "failed to open slot file (filesystem), context: { path: /tmp/x/app.0, slot: 0 }, sources: [denied]"
        );
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert_eq!(err.sources().len(), 1);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::parameter("bad").status(), Status::Param);
        let io = || io::Error::other("boom");
        assert_eq!(Error::filesystem("fs", io()).status(), Status::Fs);
        assert_eq!(Error::mapping("map", io()).status(), Status::Map);
        assert_eq!(Error::flush("flush", io()).status(), Status::Map);
    }
}
