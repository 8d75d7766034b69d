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

use std::io;
use std::path::{Path, PathBuf};

use khora_core::archive::ArchiveError;
use khora_data::ObjectError;
use thiserror::Error;

/// A specialized `Result` type for package operations.
pub type PackageResult<T> = Result<T, PackageError>;

/// An error that aborts a package operation.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The file was written with a format this build cannot read.
    #[error(
        "Unsupported package format version {found} (supported: {min} to {current})"
    )]
    UnsupportedVersion {
        /// The version found in the file.
        found: u32,
        /// The oldest supported version.
        min: u32,
        /// The version written by this build.
        current: u32,
    },
    /// The package file could not be read or written.
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// The header or an object body could not be encoded or decoded.
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
    /// An object could not be created in the object database.
    #[error("Object error: {0}")]
    Object(#[from] ObjectError),
    /// The object to save is not owned by a package.
    #[error("'{0}' is not owned by any package")]
    InvalidSaveTarget(String),
    /// No known package contains the requested path.
    #[error("Nothing found at '{0}'")]
    NotFound(String),
    /// An object wrote a different number of bytes in the two save passes.
    #[error("Object '{path}' wrote {counted} bytes while sizing but {written} bytes while saving")]
    NondeterministicSave {
        /// The package-relative path of the object.
        path: String,
        /// Bytes written in the sizing pass.
        counted: u64,
        /// Bytes written in the real pass.
        written: u64,
    },
    /// The package itself is malformed.
    #[error("Invalid package '{package}': {reason}")]
    InvalidPackage {
        /// The package path.
        package: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl PackageError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        PackageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A problem that did not stop a load but may have lost data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackageWarning {
    /// The file does not start with the package marker.
    #[error("Package marker missing")]
    MissingMarker,
    /// An object body did not consume exactly its recorded size.
    #[error("Object '{object_path}' read {actual} bytes, {expected} expected")]
    SizeMismatch {
        /// The package-relative path of the object.
        object_path: String,
        /// The recorded size.
        expected: u64,
        /// The number of bytes consumed.
        actual: u64,
    },
    /// An object could not be created or its body could not be read.
    #[error("Failed to read object '{object_path}': {reason}")]
    ObjectReadFailed {
        /// The package-relative path of the object.
        object_path: String,
        /// What went wrong.
        reason: String,
    },
    /// A referenced object of another package could not be found.
    #[error("Unresolved dependency '{object_path}'")]
    UnresolvedDependency {
        /// The full path of the dependency.
        object_path: String,
    },
    /// A record names an outer object that is not part of the package.
    #[error("Object '{object_path}' has no outer record")]
    MissingOuter {
        /// The package-relative path of the object.
        object_path: String,
    },
}

/// The outcome of a load that did not fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadStatus {
    /// Every object was loaded as recorded.
    #[default]
    Success,
    /// The load completed; the listed problems may have lost data.
    WithWarnings(Vec<PackageWarning>),
}

impl LoadStatus {
    /// Builds a status from the warnings gathered during a load.
    pub fn from_warnings(warnings: Vec<PackageWarning>) -> Self {
        if warnings.is_empty() {
            LoadStatus::Success
        } else {
            LoadStatus::WithWarnings(warnings)
        }
    }

    /// Checks if the load completed without any warning.
    pub fn is_success(&self) -> bool {
        matches!(self, LoadStatus::Success)
    }

    /// The warnings raised during the load.
    pub fn warnings(&self) -> &[PackageWarning] {
        match self {
            LoadStatus::Success => &[],
            LoadStatus::WithWarnings(warnings) => warnings,
        }
    }
}
