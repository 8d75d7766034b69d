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

//! Object path helpers.
//!
//! A full object path is made of the root object's name (usually a package
//! path such as `Maps/Forest`) followed by [`ROOT_OBJECT_SEPARATOR`] and the
//! outer chain of the object joined with [`OBJECT_SEPARATOR`]:
//!
//! ```text
//! Maps/Forest:Terrain/Layer0
//! ^^^^^^^^^^^ ^^^^^^^^^^^^^^
//!   package    package-relative object path
//! ```

use std::path::Path;

/// Separates the root object (package) from the rest of the path.
pub const ROOT_OBJECT_SEPARATOR: char = ':';
/// Separates an outer object from its inner object.
pub const OBJECT_SEPARATOR: char = '/';

/// Returns the full path of an object called `name` whose outer has `outer_path`.
pub fn join(outer_path: &str, name: &str) -> String {
    let separator = if outer_path.contains(ROOT_OBJECT_SEPARATOR) {
        OBJECT_SEPARATOR
    } else {
        ROOT_OBJECT_SEPARATOR
    };
    format!("{outer_path}{separator}{name}")
}

/// Returns the package part of a full object path, or `""` when the path has none.
pub fn package_path(full_path: &str) -> &str {
    full_path
        .split_once(ROOT_OBJECT_SEPARATOR)
        .map_or("", |(package, _)| package)
}

/// Returns the package-relative part of a full object path.
///
/// A path without a package part is returned unchanged.
pub fn relative_path(full_path: &str) -> &str {
    full_path
        .split_once(ROOT_OBJECT_SEPARATOR)
        .map_or(full_path, |(_, relative)| relative)
}

/// Splits a package-relative path into its outer path and the object's own name.
///
/// The outer path is `""` for direct children of the package.
pub fn split_outer(relative_path: &str) -> (&str, &str) {
    relative_path
        .rsplit_once(OBJECT_SEPARATOR)
        .unwrap_or(("", relative_path))
}

/// Computes the package-relative path of `full_path` inside `package`.
pub fn relative_to_package<'a>(full_path: &'a str, package: &str) -> Option<&'a str> {
    full_path
        .strip_prefix(package)?
        .strip_prefix(ROOT_OBJECT_SEPARATOR)
}

/// Checks if `name` can be used as the name of a non-root object.
pub fn is_valid_object_name(name: &str) -> bool {
    !name.is_empty() && !name.contains([ROOT_OBJECT_SEPARATOR, OBJECT_SEPARATOR])
}

/// Checks if `name` is a valid package name: an alphanumeric or `_` first
/// character followed by alphanumerics, `_` or `/`.
pub fn is_valid_package_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() || first == '_' => chars
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == OBJECT_SEPARATOR),
        _ => false,
    }
}

/// Strips every character that is not allowed in a package name.
///
/// Leading separators are dropped too. An input with nothing usable left
/// becomes `"InvalidName"`.
pub fn sanitize_package_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == OBJECT_SEPARATOR)
        .collect();
    let cleaned = cleaned.trim_start_matches(OBJECT_SEPARATOR);
    if cleaned.is_empty() {
        "InvalidName".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Derives a package path from a package file located under `content_root`.
///
/// The path is made relative to the root, stripped of its extension and
/// written with forward slashes, e.g. `<root>/Maps/Forest.kpkg` becomes
/// `Maps/Forest`.
pub fn package_path_from_file(file_path: &Path, content_root: &Path) -> String {
    let relative = file_path.strip_prefix(content_root).unwrap_or(file_path);
    let stem = relative.with_extension("");
    let generic: Vec<String> = stem
        .components()
        .filter_map(|component| match component {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    generic.join("/")
}
