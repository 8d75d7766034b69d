// Copyright 2025 eraflo
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

//! Byte streams that archives read from and write into.

use super::{ArchiveError, ArchiveResult};

/// A byte-oriented stream with a movable cursor.
pub trait ArchiveStream {
    /// Reads exactly `buf.len()` bytes at the cursor and advances it.
    fn read(&mut self, buf: &mut [u8]) -> ArchiveResult<()>;

    /// Writes `buf` at the cursor and advances it, growing the stream if needed.
    fn write(&mut self, buf: &[u8]);

    /// Moves the cursor `count` bytes towards the end.
    fn move_forward(&mut self, count: u64);

    /// Moves the cursor `count` bytes towards the start, stopping at 0.
    fn move_backward(&mut self, count: u64);

    /// The current cursor position, in bytes from the start.
    fn cursor_pos(&self) -> u64;

    /// Reserves room for `count` more bytes.
    fn allocate(&mut self, count: u64);

    /// Checks if at least `count` bytes can be read at the cursor.
    fn has_more_data(&self, count: u64) -> bool;

    /// Moves the cursor to an absolute position.
    fn seek(&mut self, position: u64) {
        let cursor = self.cursor_pos();
        if cursor > position {
            self.move_backward(cursor - position);
        } else {
            self.move_forward(position - cursor);
        }
    }
}

/// An in-memory stream backed by a growable byte buffer.
#[derive(Debug, Default, Clone)]
pub struct MemoryStream {
    buffer: Vec<u8>,
    cursor: usize,
}

impl MemoryStream {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stream over existing bytes, with the cursor at the start.
    pub fn from_bytes(buffer: Vec<u8>) -> Self {
        Self { buffer, cursor: 0 }
    }

    /// Returns the bytes written so far.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the stream and returns its buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.cursor)
    }
}

impl ArchiveStream for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> ArchiveResult<()> {
        if self.remaining() < buf.len() {
            return Err(ArchiveError::UnexpectedEnd {
                position: self.cursor as u64,
                requested: buf.len(),
            });
        }
        buf.copy_from_slice(&self.buffer[self.cursor..self.cursor + buf.len()]);
        self.cursor += buf.len();
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) {
        let end = self.cursor + buf.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        self.buffer[self.cursor..end].copy_from_slice(buf);
        self.cursor = end;
    }

    fn move_forward(&mut self, count: u64) {
        self.cursor = self.cursor.saturating_add(count as usize);
    }

    fn move_backward(&mut self, count: u64) {
        self.cursor = self.cursor.saturating_sub(count as usize);
    }

    fn cursor_pos(&self) -> u64 {
        self.cursor as u64
    }

    fn allocate(&mut self, count: u64) {
        self.buffer.reserve(count as usize);
    }

    fn has_more_data(&self, count: u64) -> bool {
        self.remaining() as u64 >= count
    }
}

/// A stream that only tracks how many bytes would have been written.
///
/// Used for dry runs that need sizes and offsets but no data.
#[derive(Debug, Default, Clone, Copy)]
pub struct SizeCounterStream {
    cursor: u64,
    high_water_mark: u64,
}

impl SizeCounterStream {
    /// Creates a counter at position 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// The furthest position the cursor has reached.
    pub fn total_size(&self) -> u64 {
        self.high_water_mark
    }
}

impl ArchiveStream for SizeCounterStream {
    fn read(&mut self, _buf: &mut [u8]) -> ArchiveResult<()> {
        Err(ArchiveError::Unsupported("reading from a size counter"))
    }

    fn write(&mut self, buf: &[u8]) {
        self.move_forward(buf.len() as u64);
    }

    fn move_forward(&mut self, count: u64) {
        self.cursor = self.cursor.saturating_add(count);
        self.high_water_mark = self.high_water_mark.max(self.cursor);
    }

    fn move_backward(&mut self, count: u64) {
        self.cursor = self.cursor.saturating_sub(count);
    }

    fn cursor_pos(&self) -> u64 {
        self.cursor
    }

    fn allocate(&mut self, _count: u64) {}

    fn has_more_data(&self, _count: u64) -> bool {
        false
    }
}
