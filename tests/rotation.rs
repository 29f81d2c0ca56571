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

use std::fs;

use mmlog::Arg;
use mmlog::LogContext;
use mmlog::Severity;
use mmlog::SyncPolicy;
use mmlog::trap::NoopTrap;
use tempfile::TempDir;

fn context(temp_dir: &TempDir, num_files: usize, file_size: usize) -> LogContext {
    LogContext::builder(temp_dir.path(), "ring")
        .max_files(num_files)
        .file_size(file_size)
        .sync_policy(SyncPolicy::never())
        .trap(NoopTrap::default())
        .build()
        .expect("failed to build log context")
}

fn slot_files(temp_dir: &TempDir) -> Vec<String> {
    let mut files = fs::read_dir(temp_dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok()?.file_name().into_string().ok())
        .collect::<Vec<_>>();
    files.sort();
    files
}

#[test]
fn test_messages_never_straddle_slots() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = context(&temp_dir, 3, 100);

    let mut lines = Vec::new();
    for i in 0..12 {
        let line = format!("line-{i:02}:{}\n", "x".repeat(20));
        ctx.print(Severity::Info, "{}", &[Arg::from(&line)]).unwrap();
        lines.push(line);
    }
    let last_idx = ctx.file_idx();
    ctx.destroy().unwrap();

    // every slot holds whole lines followed by zero padding
    for idx in 0..3 {
        let content = fs::read(temp_dir.path().join(format!("ring.{idx}"))).unwrap();
        assert_eq!(content.len(), 100);
        let end = content.iter().position(|&b| b == 0).unwrap_or(content.len());
        let text = std::str::from_utf8(&content[..end]).unwrap();
        for line in text.split_inclusive('\n') {
            assert!(lines.iter().any(|l| l == line), "torn line {line:?} in slot {idx}");
        }
    }
    // twelve 29-byte lines fill three slots and wrap into the first
    assert_eq!(last_idx, 0);
}

#[test]
fn test_ring_visits_slots_in_order_and_creates_no_extra_files() {
    let temp_dir = TempDir::new().unwrap();
    let num_files = 4;
    let ctx = context(&temp_dir, num_files, 10);

    let mut visited = vec![ctx.file_idx()];
    for _ in 0..(num_files * 3) {
        ctx.print_bytes(Severity::Info, b"0123456789").unwrap();
        visited.push(ctx.file_idx());
    }
    visited.dedup();

    let expected = (0..visited.len()).map(|i| i % num_files).collect::<Vec<_>>();
    assert_eq!(visited, expected);
    assert_eq!(slot_files(&temp_dir), ["ring.0", "ring.1", "ring.2", "ring.3"]);
}

#[test]
fn test_single_slot_ring_rewrites_itself() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = context(&temp_dir, 1, 8);

    ctx.print_bytes(Severity::Info, b"aaaaaa").unwrap();
    let written = ctx.print_bytes(Severity::Info, b"bbbb").unwrap();
    assert!(written.is_rotated());
    assert_eq!((ctx.file_idx(), ctx.offset()), (0, 4));
    ctx.destroy().unwrap();

    // the slot is truncated and re-extended on rotation
    let content = fs::read(temp_dir.path().join("ring.0")).unwrap();
    assert_eq!(content, b"bbbb\0\0\0\0");
}

#[test]
fn test_new_context_starts_a_fresh_generation() {
    let temp_dir = TempDir::new().unwrap();

    let ctx = context(&temp_dir, 2, 16);
    ctx.print_bytes(Severity::Info, b"old generation").unwrap();
    ctx.destroy().unwrap();

    let ctx = context(&temp_dir, 2, 16);
    assert_eq!((ctx.file_idx(), ctx.offset()), (0, 0));
    ctx.destroy().unwrap();

    let content = fs::read(temp_dir.path().join("ring.0")).unwrap();
    assert!(content.iter().all(|&b| b == 0));
}

#[test]
fn test_oversized_message_is_truncated_and_terminated() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = context(&temp_dir, 2, 32);

    let long = "y".repeat(100);
    let written = ctx.print(Severity::Error, "{}", &[Arg::from(&long)]).unwrap();
    assert!(written.is_truncated());
    assert_eq!(written.len(), 31);
    assert_eq!(ctx.stats().truncations, 1);

    // the terminator does not count, so one more byte still fits
    let written = ctx.print_bytes(Severity::Error, b"!").unwrap();
    assert!(!written.is_rotated());
    assert_eq!(ctx.offset(), 32);
    ctx.destroy().unwrap();

    let content = fs::read(temp_dir.path().join("ring.0")).unwrap();
    assert_eq!(&content[..31], &long.as_bytes()[..31]);
    assert_eq!(content[31], b'!');
}
