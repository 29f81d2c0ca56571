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

use std::fs::File;
use std::io;

use jiff::Timestamp;
use memmap2::MmapMut;

use crate::Error;

/// The single writable mapping over the current slot file.
///
/// Offsets satisfy `data_offset <= msync_offset <= offset <= len` at all times. Bytes before
/// `data_offset` have been synchronized to stable storage.
#[derive(Debug)]
pub(crate) struct MappedWindow {
    mmap: MmapMut,
    // held so the descriptor lives as long as the mapping
    _file: File,
    offset: usize,
    data_offset: usize,
    msync_offset: usize,
    msync_time: Timestamp,
}

impl MappedWindow {
    /// Maps the whole of `file` for writing.
    pub(crate) fn map(file: File, now: Timestamp) -> Result<Self, Error> {
        // SAFETY: slot files are created and sized by this process and are not truncated while
        // mapped; concurrent modification by other processes is outside the supported model.
        let mmap = unsafe { MmapMut::map_mut(&file) }
            .map_err(|err| Error::mapping("failed to map slot file", err))?;

        Ok(MappedWindow {
            mmap,
            _file: file,
            offset: 0,
            data_offset: 0,
            msync_offset: 0,
            msync_time: now,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.mmap.len()
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn data_offset(&self) -> usize {
        self.data_offset
    }

    pub(crate) fn msync_offset(&self) -> usize {
        self.msync_offset
    }

    pub(crate) fn msync_time(&self) -> Timestamp {
        self.msync_time
    }

    pub(crate) fn remaining(&self) -> usize {
        self.len() - self.offset
    }

    pub(crate) fn fits(&self, len: usize) -> bool {
        len <= self.remaining()
    }

    pub(crate) fn bytes_since_sync(&self) -> usize {
        self.offset - self.msync_offset
    }

    /// Copies `bytes` at the write offset and advances it.
    ///
    /// With `terminate`, a `0x00` byte is stored right after `bytes`; it occupies capacity but is
    /// not counted in the offset, so the next write overwrites it.
    pub(crate) fn append(&mut self, bytes: &[u8], terminate: bool) -> Result<usize, Error> {
        let needed = bytes.len() + usize::from(terminate);
        let capacity = self.len();
        let start = self.offset;
        let end = start + bytes.len();

        let Some(dst) = self.mmap.get_mut(start..start + needed) else {
            return Err(Error::parameter("write exceeds mapped window")
                .with_context("offset", start)
                .with_context("len", needed)
                .with_context("capacity", capacity));
        };
        dst[..bytes.len()].copy_from_slice(bytes);
        if terminate {
            dst[bytes.len()] = 0;
        }

        self.offset = end;
        Ok(bytes.len())
    }

    /// Flushes `[data_offset, offset)` to stable storage and marks it durable.
    ///
    /// On failure the sync markers are left untouched so the next evaluation retries.
    pub(crate) fn sync(&mut self, now: Timestamp) -> io::Result<()> {
        if self.offset > self.data_offset {
            self.mmap
                .flush_range(self.data_offset, self.offset - self.data_offset)?;
        }
        self.data_offset = self.offset;
        self.msync_offset = self.offset;
        self.msync_time = now;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn written(&self) -> &[u8] {
        &self.mmap[..self.offset]
    }
}
