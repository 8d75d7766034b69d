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

use std::any::Any;
use std::path::{Path, PathBuf};

use khora_core::archive::{ArchiveResult, ObjectArchive};
use khora_core::object::{EngineObject, ObjectClass};

/// The root object of a package.
///
/// A package owns its contained objects through the outer→inner hierarchy
/// and is never contained in another package. Its own body is not persisted:
/// the file location is derived from the content root it was found in.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Package {
    content_root: PathBuf,
    file_path: PathBuf,
}

impl Package {
    /// The content root directory the package belongs to.
    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// The package file, empty for packages that were never given a location.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub(crate) fn set_location(&mut self, content_root: &Path, file_path: &Path) {
        self.content_root = content_root.to_path_buf();
        self.file_path = file_path.to_path_buf();
    }
}

impl EngineObject for Package {
    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn serialize(&mut self, _ar: &mut dyn ObjectArchive) -> ArchiveResult<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ObjectClass for Package {
    const CLASS_NAME: &'static str = "Package";
}

/// Returns the file of the package `package_path` under `content_root`.
pub fn package_file_path(content_root: &Path, package_path: &str, extension: &str) -> PathBuf {
    content_root.join(format!("{package_path}.{extension}"))
}
