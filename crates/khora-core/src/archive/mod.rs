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

//! Bidirectional archives used to persist engine objects.
//!
//! An archive is either loading or saving; the same `serialize` call reads a
//! value into its argument in the first case and writes the argument out in
//! the second. Scalars, strings and collections go through a fixed-width
//! `bincode` encoding so that a dry run against a [`SizeCounterStream`]
//! predicts the exact size of the real write. Object references cannot be
//! encoded that way; they are handed to [`ObjectArchive::serialize_object`],
//! which the package loader and saver implement.

mod error;
mod stream;

pub use error::*;
pub use stream::*;

use crate::object::ObjectRef;
use serde::{de::DeserializeOwned, Serialize};
use std::io;

/// Upper bound for a single decoded value, guarding against corrupted lengths.
const DECODE_LIMIT: usize = 256 * 1024 * 1024;

fn codec_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
        .with_limit::<DECODE_LIMIT>()
}

/// Adapts an [`ArchiveStream`] to `std::io` so `bincode` can drive it.
struct StreamIo<'a>(&'a mut dyn ArchiveStream);

impl io::Read for StreamIo<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_exact(buf)?;
        Ok(buf.len())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.0
            .read(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::UnexpectedEof, e.to_string()))
    }
}

impl io::Write for StreamIo<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes `value` at the stream's cursor.
pub fn write_value<T: Serialize + ?Sized>(
    stream: &mut dyn ArchiveStream,
    value: &T,
) -> ArchiveResult<()> {
    bincode::serde::encode_into_std_write(value, &mut StreamIo(stream), codec_config())?;
    Ok(())
}

/// Reads a value at the stream's cursor.
pub fn read_value<T: DeserializeOwned>(stream: &mut dyn ArchiveStream) -> ArchiveResult<T> {
    let value = bincode::serde::decode_from_std_read(&mut StreamIo(stream), codec_config())?;
    Ok(value)
}

/// Reads into or writes out `value`, depending on `loading`.
pub fn serialize_value<T: Serialize + DeserializeOwned>(
    loading: bool,
    stream: &mut dyn ArchiveStream,
    value: &mut T,
) -> ArchiveResult<()> {
    if loading {
        *value = read_value(stream)?;
        Ok(())
    } else {
        write_value(stream, value)
    }
}

/// The archive seen by [`EngineObject::serialize`](crate::object::EngineObject::serialize).
///
/// It is object-safe so that every engine object can stream itself without
/// knowing whether a package loader, a package saver or a size-counting dry
/// run is on the other side. Generic helpers are provided as inherent methods
/// on `dyn ObjectArchive`.
pub trait ObjectArchive {
    /// Checks if this archive reads values.
    fn is_loading(&self) -> bool;

    /// The stream values are read from or written into.
    fn stream(&mut self) -> &mut dyn ArchiveStream;

    /// Returns the version registered under `key`, or 0.
    fn custom_version(&self, key: &str) -> u32;

    /// Registers the version of `key`; only meaningful while saving.
    fn set_custom_version(&mut self, key: &str, version: u32);

    /// Reads into or writes out an object reference.
    fn serialize_object(&mut self, slot: &mut ObjectRef) -> ArchiveResult<()>;
}

impl dyn ObjectArchive + '_ {
    /// Reads into or writes out a plain value.
    pub fn serialize<T: Serialize + DeserializeOwned>(&mut self, value: &mut T) -> ArchiveResult<()> {
        let loading = self.is_loading();
        serialize_value(loading, self.stream(), value)
    }

    /// Reads into or writes out a list of object references.
    pub fn serialize_object_list(&mut self, slots: &mut Vec<ObjectRef>) -> ArchiveResult<()> {
        let mut len = slots.len() as u64;
        self.serialize(&mut len)?;
        if self.is_loading() {
            // Every reference is one fixed-width index.
            let needed = len.saturating_mul(std::mem::size_of::<u64>() as u64);
            if !self.stream().has_more_data(needed) {
                return Err(ArchiveError::Decode(format!(
                    "object list of {len} references overruns the stream"
                )));
            }
            slots.clear();
            slots.resize(len as usize, ObjectRef::Null);
        }
        for slot in slots.iter_mut() {
            self.serialize_object(slot)?;
        }
        Ok(())
    }
}
