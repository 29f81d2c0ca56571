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

//! The on-disk ring of slot files.
//!
//! Slot `i` of a context named `name` under `base_path` lives at `{base_path}/{name}.{i}`, with
//! `i` written in decimal without padding. Every slot file is exactly `file_size` bytes long;
//! bytes that were never written read as `0x00`.

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;

use crate::Error;

/// The largest number of slots in a ring.
pub const MAX_FILES: usize = 65535;

/// The largest size of one slot in bytes.
pub const MAX_FILE_SIZE: usize = u32::MAX as usize;

/// Resolves, creates and resizes the slot files of one context.
#[derive(Debug, Clone)]
pub struct FileSet {
    base_path: PathBuf,
    name: String,
    num_files: usize,
    file_size: usize,
}

impl FileSet {
    /// Validates the ring geometry.
    ///
    /// # Errors
    ///
    /// Return a parameter error if either:
    ///
    /// * `name` is empty or contains a path separator.
    /// * `base_path` is empty.
    /// * `num_files` is not in `1..=65535`.
    /// * `file_size` is not in `1..=u32::MAX`.
    pub fn new(
        base_path: impl Into<PathBuf>,
        name: impl Into<String>,
        num_files: usize,
        file_size: usize,
    ) -> Result<Self, Error> {
        let base_path = base_path.into();
        let name = name.into();

        if name.is_empty() {
            return Err(Error::parameter("name must not be empty"));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::parameter("name must be a plain file name").with_context("name", name));
        }
        if base_path.as_os_str().is_empty() {
            return Err(Error::parameter("base path must not be empty"));
        }
        if !(1..=MAX_FILES).contains(&num_files) {
            return Err(Error::parameter("number of files out of range")
                .with_context("num_files", num_files));
        }
        if !(1..=MAX_FILE_SIZE).contains(&file_size) {
            return Err(
                Error::parameter("file size out of range").with_context("file_size", file_size)
            );
        }

        Ok(FileSet {
            base_path,
            name,
            num_files,
            file_size,
        })
    }

    /// The directory holding the slot files.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// The file name prefix of every slot.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of slots in the ring.
    pub fn num_files(&self) -> usize {
        self.num_files
    }

    /// Size of each slot file in bytes.
    pub fn file_size(&self) -> usize {
        self.file_size
    }

    /// Returns the path of slot `idx`.
    pub fn slot_path(&self, idx: usize) -> PathBuf {
        self.base_path.join(format!("{}.{idx}", self.name))
    }

    /// Returns the paths of every slot in ring order.
    pub fn slot_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        (0..self.num_files).map(|idx| self.slot_path(idx))
    }

    /// Returns the slot that follows `idx` in the ring.
    pub fn next_slot(&self, idx: usize) -> usize {
        (idx + 1) % self.num_files
    }

    /// Creates the base directory if absent.
    pub fn create_dir(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.base_path).map_err(|err| {
            Error::filesystem("failed to create log directory", err)
                .with_context("path", self.base_path.display())
        })
    }

    /// Opens slot `idx`, discarding its previous contents.
    ///
    /// The file is created if absent, truncated, then extended to exactly `file_size` bytes. The
    /// extension is sparse where the filesystem supports it and always reads back as zeros.
    pub fn open_slot(&self, idx: usize) -> Result<File, Error> {
        let path = self.slot_path(idx);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|err| {
                Error::filesystem("failed to open slot file", err)
                    .with_context("path", path.display())
                    .with_context("slot", idx)
            })?;

        file.set_len(self.file_size as u64).map_err(|err| {
            Error::filesystem("failed to resize slot file", err)
                .with_context("path", path.display())
                .with_context("file_size", self.file_size)
        })?;

        Ok(file)
    }
}
