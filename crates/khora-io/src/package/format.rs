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

//! Defines the binary layout of Khora package files.
//!
//! A package file is a header followed by the concatenated bodies of its
//! contained objects:
//!
//! ```text
//! "KHORAPKG" | format_version | custom versions | contained table | dependency table | bodies...
//! ```
//!
//! Every field after the marker is encoded with the archive codec, so the
//! header size only depends on the table contents and never on the offsets
//! stored in them.

use std::collections::BTreeMap;

use khora_core::archive::{read_value, write_value, ArchiveResult, ArchiveStream};
use khora_core::object::{ObjectFlags, ObjectId, TableIndex};
use serde::{Deserialize, Serialize};

/// A unique byte sequence to identify Khora package files. ("KHORAPKG").
pub const PACKAGE_MARKER: [u8; 8] = *b"KHORAPKG";
/// The format version written by this build.
pub const PACKAGE_FORMAT_VERSION: u32 = 1;
/// The oldest format version this build can read.
pub const MIN_SUPPORTED_FORMAT_VERSION: u32 = 1;
/// The default extension of package files.
pub const DEFAULT_PACKAGE_EXTENSION: &str = "kpkg";

/// The encoded value of a null object reference.
pub const NULL_OBJECT_INDEX: u64 = u64::MAX;
/// Set on an encoded reference that indexes the dependency table.
pub const DEPENDENT_OBJECT_FLAG: u64 = 1 << 63;

/// An object serialized as part of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainedObjectRecord {
    /// Path relative to the package, e.g. `Terrain/Layer0`.
    pub object_path: String,
    /// Registered class name of the object.
    pub class_name: String,
    /// Custom version of the class when the package was saved.
    pub class_version: u32,
    /// Persistent flags of the object.
    pub object_flags: ObjectFlags,
    /// Offset of the object's body from the start of the file.
    pub stream_start: u64,
    /// Size of the object's body in bytes.
    pub stream_size: u64,
    /// The live object, once created or looked up.
    #[serde(skip)]
    pub handle: Option<ObjectId>,
}

/// An object referenced by a package but owned by another one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyObjectRecord {
    /// Full path of the object, including its package.
    pub object_full_path: String,
    /// Registered class name of the object.
    pub class_name: String,
    /// The live object, once resolved.
    #[serde(skip)]
    pub handle: Option<ObjectId>,
}

/// Everything stored in front of the object bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageHeader {
    /// The format version the file was written with.
    pub format_version: u32,
    /// Versions registered by objects while they were saved, keyed by feature.
    pub custom_versions: BTreeMap<String, u32>,
    /// Contained objects, every outer before its inners.
    pub contained: Vec<ContainedObjectRecord>,
    /// Objects of other packages referenced by the contained ones.
    pub dependencies: Vec<DependencyObjectRecord>,
}

impl Default for PackageHeader {
    fn default() -> Self {
        Self {
            format_version: PACKAGE_FORMAT_VERSION,
            custom_versions: BTreeMap::new(),
            contained: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

impl PackageHeader {
    /// Writes the marker and the header at the stream's cursor.
    pub fn write(&self, stream: &mut dyn ArchiveStream) -> ArchiveResult<()> {
        stream.write(&PACKAGE_MARKER);
        write_value(stream, &self.format_version)?;
        write_value(stream, &self.custom_versions)?;
        write_value(stream, &self.contained)?;
        write_value(stream, &self.dependencies)
    }

    /// Reads a header from the start of the stream.
    ///
    /// Returns the header and whether the leading marker was present. A file
    /// without marker is read from offset 0 on a best-effort basis.
    pub fn read(stream: &mut dyn ArchiveStream) -> ArchiveResult<(Self, bool)> {
        stream.seek(0);
        let mut marker = [0u8; PACKAGE_MARKER.len()];
        let has_marker = stream.read(&mut marker).is_ok() && marker == PACKAGE_MARKER;
        if !has_marker {
            stream.seek(0);
        }

        let header = Self {
            format_version: read_value(stream)?,
            custom_versions: read_value(stream)?,
            contained: read_value(stream)?,
            dependencies: read_value(stream)?,
        };
        Ok((header, has_marker))
    }
}

/// A decoded object reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedRef {
    /// No object.
    Null,
    /// An index into the contained table.
    Contained(TableIndex),
    /// An index into the dependency table.
    Dependency(TableIndex),
}

impl EncodedRef {
    /// Encodes the reference into its on-disk index.
    pub fn encode(self) -> u64 {
        match self {
            EncodedRef::Null => NULL_OBJECT_INDEX,
            EncodedRef::Contained(idx) => idx as u64,
            EncodedRef::Dependency(idx) => idx as u64 | DEPENDENT_OBJECT_FLAG,
        }
    }

    /// Decodes an on-disk index against the sizes of both tables.
    ///
    /// Indices that fall outside their table decode as [`EncodedRef::Null`].
    pub fn decode(raw: u64, contained_len: usize, dependency_len: usize) -> Self {
        if raw == NULL_OBJECT_INDEX {
            return EncodedRef::Null;
        }
        if raw & DEPENDENT_OBJECT_FLAG != 0 {
            let idx = (raw & !DEPENDENT_OBJECT_FLAG) as usize;
            if idx < dependency_len {
                return EncodedRef::Dependency(idx);
            }
        } else if (raw as usize) < contained_len {
            return EncodedRef::Contained(raw as usize);
        }
        EncodedRef::Null
    }
}
