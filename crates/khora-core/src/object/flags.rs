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

//! Lifecycle and persistence flags carried by every engine object.

use crate::khora_bitflags;
use serde::{Deserialize, Serialize};

khora_bitflags! {
    /// A set of object flags.
    ///
    /// Some bits describe what an object *is* (e.g. [`ObjectFlags::TRANSIENT`]) and
    /// are persisted with it; the others describe where it currently stands in the
    /// package lifecycle and never reach the disk.
    #[derive(Serialize, Deserialize)]
    pub struct ObjectFlags: u32 {
        /// The object is scheduled for destruction and must not be persisted.
        const MARKED_FOR_DELETE = 1 << 0;
        /// The object is a root that is never owned by another object.
        const ROOT_OBJECT = 1 << 1;
        /// The object is recorded for identity only and never streamed to bytes.
        const TRANSIENT = 1 << 2;
        /// The object changed since its package was last saved.
        const PACKAGE_DIRTY = 1 << 3;
        /// The object (or package) exists as a shell whose body is not loaded yet.
        const PACKAGE_LOAD_PENDING = 1 << 4;
        /// The object's body was streamed in from its package.
        const PACKAGE_LOADED = 1 << 5;
    }
}

impl ObjectFlags {
    /// Bits that only make sense at runtime.
    const RUNTIME_ONLY: Self = Self::MARKED_FOR_DELETE
        .with(Self::PACKAGE_DIRTY)
        .with(Self::PACKAGE_LOAD_PENDING)
        .with(Self::PACKAGE_LOADED);

    /// The subset of flags written into a package record.
    ///
    /// Dirtiness, deletion marks and load state are stripped so that saving a
    /// freshly loaded package reproduces the same bytes.
    pub const fn persistent(self) -> Self {
        self.without(Self::RUNTIME_ONLY)
    }
}
