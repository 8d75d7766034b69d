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

//! Provides the foundational traits and primitive types of Khora's object model.
//!
//! Engine objects live in an outer→inner ownership hierarchy rooted at
//! packages. This module only defines the contracts: how an object is
//! identified ([`ObjectId`]), flagged ([`ObjectFlags`]), addressed by path
//! ([`path`]), how it refers to other objects ([`ObjectRef`]) and how it
//! streams itself through an archive ([`EngineObject`]). Storage lives in
//! `khora-data`, persistence in `khora-io`.

mod flags;
mod id;
pub mod path;
mod reference;

pub use flags::*;
pub use id::*;
pub use reference::*;

use crate::archive::{ArchiveResult, ObjectArchive};
use std::any::Any;

/// A live engine object that can be persisted inside a package.
///
/// # Examples
///
/// ```
/// use khora_core::archive::{ArchiveResult, ObjectArchive};
/// use khora_core::object::{EngineObject, ObjectClass, ObjectRef, VisitReferences};
///
/// #[derive(Default)]
/// struct Door {
///     locked: bool,
///     key: ObjectRef,
/// }
///
/// impl EngineObject for Door {
///     fn class_name(&self) -> &'static str {
///         Self::CLASS_NAME
///     }
///
///     fn serialize(&mut self, ar: &mut dyn ObjectArchive) -> ArchiveResult<()> {
///         ar.serialize(&mut self.locked)?;
///         ar.serialize_object(&mut self.key)
///     }
///
///     fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
///         self.key.visit_references(visitor);
///     }
///
///     fn as_any(&self) -> &dyn std::any::Any {
///         self
///     }
///
///     fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
///         self
///     }
/// }
///
/// impl ObjectClass for Door {
///     const CLASS_NAME: &'static str = "Door";
/// }
/// ```
pub trait EngineObject: Any + Send {
    /// The registered class name of this object.
    fn class_name(&self) -> &'static str;

    /// Streams the object's fields in or out, depending on `ar.is_loading()`.
    ///
    /// Reads and writes must mirror each other exactly: the package saver
    /// relies on two consecutive writes producing the same number of bytes.
    fn serialize(&mut self, ar: &mut dyn ObjectArchive) -> ArchiveResult<()>;

    /// Calls `visitor` on every [`ObjectRef`] held by this object, including
    /// those nested in containers and sub-structs.
    fn visit_references(&mut self, _visitor: &mut dyn FnMut(&mut ObjectRef)) {}

    /// Called on every object of a package once all of them were streamed.
    ///
    /// References to sibling objects may not be usable yet.
    fn post_serialize(&mut self, _loading: bool) {}

    /// Called after the whole package is linked and flagged as loaded.
    fn post_load(&mut self) {}

    /// Called last; every reference of the package is linked at this point.
    fn constructed(&mut self) {}

    /// Returns a reference to `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable reference to `self` as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Static class information of an [`EngineObject`] type.
///
/// The class name is what package files record; the object database uses
/// `Default` to instantiate a class by name while loading.
pub trait ObjectClass: EngineObject + Default {
    /// The unique name of the class.
    const CLASS_NAME: &'static str;
    /// The name of the parent class, used by `is_child_of` queries.
    const PARENT_CLASS: Option<&'static str> = None;
}
