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

//! Rendering messages into exact-length buffers.
//!
//! A message is a template plus a typed argument list. `{}` in the template is replaced by the
//! next argument; `{{` and `}}` stand for literal braces.
//!
//! ```
//! use mmlog::format::Arg;
//! use mmlog::format::measure;
//! use mmlog::format::render;
//!
//! let args = [Arg::from("GET"), Arg::from(200u16), Arg::from(1.5)];
//! let template = "{} /index -> {} in {}ms {{ok}}";
//! assert_eq!(measure(template, &args).unwrap(), 31);
//! assert_eq!(render(template, &args).unwrap(), b"GET /index -> 200 in 1.5ms {ok}");
//! ```
//!
//! A template is measured with a length-only pass first, so the output buffer is allocated once
//! at its final size. Preformatted [`fmt::Arguments`] are rendered exactly once: a `Display` impl
//! may print something different each time it runs.

use std::fmt;
use std::fmt::Write;

use crate::Error;

/// A typed message argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg<'a> {
    Str(&'a str),
    Int(i64),
    Uint(u64),
    Float(f64),
    Char(char),
    Bool(bool),
    /// Raw bytes, copied verbatim.
    Bytes(&'a [u8]),
}

impl Arg<'_> {
    fn render<S: Sink>(&self, sink: &mut S) -> fmt::Result {
        match *self {
            Arg::Str(v) => sink.write_str(v),
            Arg::Int(v) => write!(sink, "{v}"),
            Arg::Uint(v) => write!(sink, "{v}"),
            Arg::Float(v) => write!(sink, "{v}"),
            Arg::Char(v) => sink.write_char(v),
            Arg::Bool(v) => write!(sink, "{v}"),
            Arg::Bytes(v) => {
                sink.write_bytes(v);
                Ok(())
            }
        }
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(v: &'a str) -> Self {
        Arg::Str(v)
    }
}

impl<'a> From<&'a String> for Arg<'a> {
    fn from(v: &'a String) -> Self {
        Arg::Str(v)
    }
}

impl<'a> From<&'a [u8]> for Arg<'a> {
    fn from(v: &'a [u8]) -> Self {
        Arg::Bytes(v)
    }
}

macro_rules! impl_from_int {
    ($variant:ident: $wide:ty => $($ty:ty),+) => {
        $(
            impl From<$ty> for Arg<'_> {
                fn from(v: $ty) -> Self {
                    Arg::$variant(<$wide>::from(v))
                }
            }
        )+
    };
}

impl_from_int!(Int: i64 => i8, i16, i32, i64);
impl_from_int!(Uint: u64 => u8, u16, u32, u64);

impl From<isize> for Arg<'_> {
    fn from(v: isize) -> Self {
        Arg::Int(v as i64)
    }
}

impl From<usize> for Arg<'_> {
    fn from(v: usize) -> Self {
        Arg::Uint(v as u64)
    }
}

impl From<f32> for Arg<'_> {
    fn from(v: f32) -> Self {
        Arg::Float(f64::from(v))
    }
}

impl From<f64> for Arg<'_> {
    fn from(v: f64) -> Self {
        Arg::Float(v)
    }
}

impl From<char> for Arg<'_> {
    fn from(v: char) -> Self {
        Arg::Char(v)
    }
}

impl From<bool> for Arg<'_> {
    fn from(v: bool) -> Self {
        Arg::Bool(v)
    }
}

trait Sink: Write {
    fn write_bytes(&mut self, bytes: &[u8]);
}

/// Counts bytes without storing them.
#[derive(Default)]
struct Counter(usize);

impl Write for Counter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

impl Sink for Counter {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.0 += bytes.len();
    }
}

/// Stores at most `cap` bytes and counts the rest.
struct Buffer {
    buf: Vec<u8>,
    cap: usize,
    dropped: usize,
}

impl Buffer {
    fn with_capacity(cap: usize) -> Self {
        Buffer {
            buf: Vec::with_capacity(cap),
            cap,
            dropped: 0,
        }
    }

    fn unbounded() -> Self {
        Buffer {
            buf: Vec::new(),
            cap: usize::MAX,
            dropped: 0,
        }
    }
}

impl Write for Buffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

impl Sink for Buffer {
    fn write_bytes(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.cap - self.buf.len());
        self.buf.extend_from_slice(&bytes[..n]);
        self.dropped += bytes.len() - n;
    }
}

fn walk<S: Sink>(template: &str, args: &[Arg], sink: &mut S) -> Result<(), Error> {
    let bytes = template.as_bytes();
    let mut args = args.iter();
    let mut literal = 0;
    let mut i = 0;

    while i < bytes.len() {
        match (bytes[i], bytes.get(i + 1)) {
            (b'{', Some(b'{')) | (b'}', Some(b'}')) => {
                // keep one brace of the pair
                sink.write_str(&template[literal..=i])
                    .map_err(Error::from_fmt_error)?;
                i += 2;
                literal = i;
            }
            (b'{', Some(b'}')) => {
                sink.write_str(&template[literal..i])
                    .map_err(Error::from_fmt_error)?;
                let arg = args.next().ok_or_else(|| {
                    Error::parameter("template has more placeholders than arguments")
                        .with_context("template", template)
                })?;
                arg.render(sink).map_err(Error::from_fmt_error)?;
                i += 2;
                literal = i;
            }
            (b'{', _) | (b'}', _) => {
                return Err(Error::parameter("unmatched brace in template")
                    .with_context("template", template)
                    .with_context("position", i));
            }
            _ => i += 1,
        }
    }

    sink.write_str(&template[literal..])
        .map_err(Error::from_fmt_error)?;

    if args.next().is_some() {
        return Err(Error::parameter("template has fewer placeholders than arguments")
            .with_context("template", template));
    }
    Ok(())
}

/// Computes the exact rendered length of a message without rendering it.
pub fn measure(template: &str, args: &[Arg]) -> Result<usize, Error> {
    let mut counter = Counter::default();
    walk(template, args, &mut counter)?;
    Ok(counter.0)
}

/// Renders a message into a buffer of exactly its measured length.
pub fn render(template: &str, args: &[Arg]) -> Result<Vec<u8>, Error> {
    let len = measure(template, args)?;
    let mut buffer = Buffer::with_capacity(len);
    walk(template, args, &mut buffer)?;
    Ok(buffer.buf)
}

/// A rendered message ready to be copied into a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Rendered {
    /// The bytes to store, without any terminator.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes to store.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether there is nothing to store.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the message was cut to fit one slot.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Renders messages capped to the capacity of one slot.
///
/// A message whose length exceeds `limit` is cut to `limit - 1` bytes; the writer stores a `0x00`
/// terminator after it, so the stored form occupies exactly `limit` bytes.
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    limit: usize,
}

impl Formatter {
    pub fn new(limit: usize) -> Self {
        Formatter { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn capped(&self, len: usize) -> (usize, bool) {
        if len > self.limit {
            (self.limit.saturating_sub(1), true)
        } else {
            (len, false)
        }
    }

    /// Renders a template and its arguments.
    pub fn format(&self, template: &str, args: &[Arg]) -> Result<Rendered, Error> {
        let (cap, truncated) = self.capped(measure(template, args)?);
        let mut buffer = Buffer::with_capacity(cap);
        walk(template, args, &mut buffer)?;
        Ok(Rendered {
            bytes: buffer.buf,
            truncated: truncated || buffer.dropped > 0,
        })
    }

    /// Renders preformatted arguments, such as the output of [`format_args!`].
    pub fn format_args(&self, args: fmt::Arguments) -> Result<Rendered, Error> {
        let mut buffer = Buffer::unbounded();
        buffer.write_fmt(args).map_err(Error::from_fmt_error)?;

        let mut bytes = buffer.buf;
        let (cap, truncated) = self.capped(bytes.len());
        bytes.truncate(cap);
        Ok(Rendered { bytes, truncated })
    }

    /// Caps raw bytes.
    pub fn format_bytes(&self, bytes: &[u8]) -> Rendered {
        let (cap, truncated) = self.capped(bytes.len());
        Rendered {
            bytes: bytes[..cap].to_vec(),
            truncated,
        }
    }
}
