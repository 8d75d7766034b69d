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

//! Package persistence: the binary package format, the loader and saver that
//! move object graphs in and out of it, and the catalog of known packages.
//!
//! [`PackageContext`] is the entry point; the other types are usable on their
//! own for tooling that works on a bare [`khora_data::ObjectDatabase`].

mod catalog;
mod context;
mod error;
mod event;
pub mod format;
mod loader;
mod object;
mod saver;
mod settings;

pub use catalog::{IndexedObject, PackageCatalog};
pub use context::PackageContext;
pub use error::{LoadStatus, PackageError, PackageResult, PackageWarning};
pub use event::PackageEvent;
pub use loader::{ObjectResolver, PackageLoader};
pub use object::{package_file_path, Package};
pub use saver::PackageSaver;
pub use settings::PackageSettings;
