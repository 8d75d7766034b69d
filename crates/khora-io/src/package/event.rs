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

/// A notification about the lifecycle of a package.
///
/// Every variant carries the package path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageEvent {
    /// The package was found in a content root and its header indexed.
    Scanned(String),
    /// The package finished loading and its objects are linked.
    Loaded(String),
    /// The package's objects were destroyed; the package is load-pending again.
    Unloaded(String),
    /// The package was written to disk.
    Saved(String),
}
