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

use std::fmt;

/// A specialized `Result` type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// An error raised while streaming values through an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    /// The stream ended before the requested number of bytes could be read.
    UnexpectedEnd {
        /// Cursor position at which the read was attempted.
        position: u64,
        /// Number of bytes requested.
        requested: usize,
    },
    /// A value could not be encoded.
    Encode(String),
    /// The bytes at the cursor do not decode into the requested value.
    Decode(String),
    /// The operation is not supported by the underlying stream.
    Unsupported(&'static str),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::UnexpectedEnd {
                position,
                requested,
            } => {
                write!(
                    f,
                    "Unexpected end of stream reading {requested} bytes at offset {position}"
                )
            }
            ArchiveError::Encode(details) => write!(f, "Failed to encode value: {details}"),
            ArchiveError::Decode(details) => write!(f, "Failed to decode value: {details}"),
            ArchiveError::Unsupported(what) => write!(f, "Unsupported archive operation: {what}"),
        }
    }
}

impl std::error::Error for ArchiveError {}

impl From<bincode::error::EncodeError> for ArchiveError {
    fn from(e: bincode::error::EncodeError) -> Self {
        ArchiveError::Encode(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for ArchiveError {
    fn from(e: bincode::error::DecodeError) -> Self {
        ArchiveError::Decode(e.to_string())
    }
}
