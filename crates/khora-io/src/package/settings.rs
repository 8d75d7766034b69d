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

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::format::DEFAULT_PACKAGE_EXTENSION;

/// Settings of the package layer.
///
/// Stored as RON; every field is optional in the file.
///
/// ```ron
/// (
///     extension: "kpkg",
///     content_roots: ["assets/packages"],
///     refresh_on_miss: true,
///     publish_events: true,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageSettings {
    /// The extension of package files, without the leading dot.
    pub extension: String,
    /// Content roots registered when the package context is created.
    pub content_roots: Vec<PathBuf>,
    /// Rescan the content roots once before giving up on a lookup.
    pub refresh_on_miss: bool,
    /// Queue [`PackageEvent`](super::PackageEvent)s on the context's bus.
    /// They are kept until drained.
    pub publish_events: bool,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            extension: DEFAULT_PACKAGE_EXTENSION.to_string(),
            content_roots: Vec::new(),
            refresh_on_miss: true,
            publish_events: true,
        }
    }
}

impl PackageSettings {
    /// Parses settings from RON text.
    pub fn from_ron(text: &str) -> anyhow::Result<Self> {
        ron::from_str(text).context("Invalid package settings")
    }

    /// Reads settings from a RON file.
    pub fn load(file_path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read package settings {file_path:?}"))?;
        Self::from_ron(&text)
    }

    /// Formats the settings as RON.
    pub fn to_ron(&self) -> anyhow::Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .context("Failed to format package settings")
    }
}
