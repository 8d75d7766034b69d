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

//! Storage of live engine objects and their outer→inner hierarchy.

use std::collections::HashMap;
use std::fmt;

use khora_core::object::{path, EngineObject, ObjectFlags, ObjectId};

use super::ClassRegistry;

/// An error raised when an object cannot be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// No class with this name is registered.
    UnknownClass(String),
    /// The name cannot be used for an object at this place in the hierarchy.
    InvalidName(String),
    /// The outer handle does not resolve to a live object.
    InvalidOuter(ObjectId),
    /// An object already exists at the path with an unrelated class.
    ClassMismatch {
        /// Full path of the existing object.
        path: String,
        /// Class of the existing object.
        existing: &'static str,
        /// Class that was requested.
        requested: String,
    },
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectError::UnknownClass(class) => write!(f, "Unknown object class '{class}'"),
            ObjectError::InvalidName(name) => write!(f, "Invalid object name '{name}'"),
            ObjectError::InvalidOuter(id) => write!(f, "Outer object {id} is not alive"),
            ObjectError::ClassMismatch {
                path,
                existing,
                requested,
            } => write!(
                f,
                "Object '{path}' already exists as '{existing}', not '{requested}'"
            ),
        }
    }
}

impl std::error::Error for ObjectError {}

/// The bookkeeping of one live object.
pub struct ObjectEntry {
    name: String,
    path: String,
    class: &'static str,
    outer: Option<ObjectId>,
    children: Vec<ObjectId>,
    flags: ObjectFlags,
    // `None` while the body is checked out with `take_object`.
    object: Option<Box<dyn EngineObject>>,
}

impl ObjectEntry {
    /// The object's own name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The object's full path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The object's class name.
    pub fn class_name(&self) -> &'static str {
        self.class
    }

    /// The object owning this one, `None` for roots.
    pub fn outer(&self) -> Option<ObjectId> {
        self.outer
    }

    /// The objects directly owned by this one, in creation order.
    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    /// The object's own flags.
    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }
}

impl fmt::Debug for ObjectEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectEntry")
            .field("path", &self.path)
            .field("class", &self.class)
            .field("outer", &self.outer)
            .field("flags", &self.flags)
            .field("checked_out", &self.object.is_none())
            .finish()
    }
}

/// The database of every live engine object.
///
/// Objects are addressed by generational [`ObjectId`]s and indexed by their
/// full path. Every object except roots has exactly one outer; destroying an
/// object destroys everything it owns.
#[derive(Debug, Default)]
pub struct ObjectDatabase {
    classes: ClassRegistry,
    slots: Vec<(ObjectId, Option<ObjectEntry>)>,
    freed_slots: Vec<u32>,
    by_path: HashMap<String, ObjectId>,
}

impl ObjectDatabase {
    /// Creates an empty database instantiating objects from `classes`.
    pub fn new(classes: ClassRegistry) -> Self {
        Self {
            classes,
            ..Default::default()
        }
    }

    /// The registry used to instantiate objects.
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// The registry used to instantiate objects, mutably.
    pub fn classes_mut(&mut self) -> &mut ClassRegistry {
        &mut self.classes
    }

    /// Returns the object called `name` under `outer`, creating it if needed.
    ///
    /// `flags` are added to the object's flags in both cases. An existing object
    /// is only returned if its class is `class` or derives from it. Objects
    /// without an outer are roots and must carry a valid package name.
    pub fn create_or_get(
        &mut self,
        class: &str,
        name: &str,
        outer: Option<ObjectId>,
        flags: ObjectFlags,
    ) -> Result<ObjectId, ObjectError> {
        let full_path = match outer {
            Some(outer_id) => {
                if !path::is_valid_object_name(name) {
                    return Err(ObjectError::InvalidName(name.to_string()));
                }
                let outer_path = self
                    .full_path(outer_id)
                    .ok_or(ObjectError::InvalidOuter(outer_id))?;
                path::join(outer_path, name)
            }
            None => {
                if !path::is_valid_package_name(name) {
                    return Err(ObjectError::InvalidName(name.to_string()));
                }
                name.to_string()
            }
        };

        if let Some(existing) = self.get(&full_path) {
            let existing_class = self.class_name(existing).unwrap_or_default();
            if !self.classes.is_child_of(existing_class, class) {
                return Err(ObjectError::ClassMismatch {
                    path: full_path,
                    existing: existing_class,
                    requested: class.to_string(),
                });
            }
            self.set_flags(existing, flags);
            return Ok(existing);
        }

        let descriptor = *self
            .classes
            .get(class)
            .ok_or_else(|| ObjectError::UnknownClass(class.to_string()))?;
        let mut flags = flags;
        if outer.is_none() {
            flags.insert(ObjectFlags::ROOT_OBJECT);
        }

        let id = self.allocate(ObjectEntry {
            name: name.to_string(),
            path: full_path.clone(),
            class: descriptor.name,
            outer,
            children: Vec::new(),
            flags,
            object: Some(descriptor.instantiate()),
        });
        if let Some(outer_entry) = outer.and_then(|o| self.entry_mut(o)) {
            outer_entry.children.push(id);
        }
        log::trace!("Created object '{full_path}' ({}) as {id}", descriptor.name);
        self.by_path.insert(full_path, id);
        Ok(id)
    }

    /// Typed shorthand for [`create_or_get`](Self::create_or_get).
    pub fn create<T: khora_core::object::ObjectClass>(
        &mut self,
        name: &str,
        outer: Option<ObjectId>,
        flags: ObjectFlags,
    ) -> Result<ObjectId, ObjectError> {
        self.create_or_get(T::CLASS_NAME, name, outer, flags)
    }

    fn allocate(&mut self, entry: ObjectEntry) -> ObjectId {
        if let Some(index) = self.freed_slots.pop() {
            let (id_slot, entry_slot) = &mut self.slots[index as usize];
            id_slot.generation += 1;
            *entry_slot = Some(entry);
            *id_slot
        } else {
            let id = ObjectId::new(self.slots.len() as u32, 0);
            self.slots.push((id, Some(entry)));
            id
        }
    }

    /// Finds a live object by full path.
    pub fn get(&self, full_path: &str) -> Option<ObjectId> {
        self.by_path.get(full_path).copied()
    }

    /// Checks if `id` refers to a live object.
    pub fn is_valid(&self, id: ObjectId) -> bool {
        self.entry(id).is_some()
    }

    /// Returns the bookkeeping of a live object.
    pub fn entry(&self, id: ObjectId) -> Option<&ObjectEntry> {
        self.slots
            .get(id.index as usize)
            .and_then(|(slot_id, entry)| {
                if slot_id.generation == id.generation {
                    entry.as_ref()
                } else {
                    None
                }
            })
    }

    fn entry_mut(&mut self, id: ObjectId) -> Option<&mut ObjectEntry> {
        self.slots
            .get_mut(id.index as usize)
            .and_then(|(slot_id, entry)| {
                if slot_id.generation == id.generation {
                    entry.as_mut()
                } else {
                    None
                }
            })
    }

    /// The full path of a live object.
    pub fn full_path(&self, id: ObjectId) -> Option<&str> {
        self.entry(id).map(ObjectEntry::path)
    }

    /// The own name of a live object.
    pub fn name(&self, id: ObjectId) -> Option<&str> {
        self.entry(id).map(ObjectEntry::name)
    }

    /// The class name of a live object.
    pub fn class_name(&self, id: ObjectId) -> Option<&'static str> {
        self.entry(id).map(ObjectEntry::class_name)
    }

    /// The outer of a live object.
    pub fn outer(&self, id: ObjectId) -> Option<ObjectId> {
        self.entry(id).and_then(ObjectEntry::outer)
    }

    /// The direct children of a live object; empty for dead handles.
    pub fn children(&self, id: ObjectId) -> &[ObjectId] {
        self.entry(id).map_or(&[][..], ObjectEntry::children)
    }

    /// Follows the outer chain up to the root.
    pub fn outermost(&self, id: ObjectId) -> Option<ObjectId> {
        let mut current = self.entry(id).map(|_| id)?;
        while let Some(outer) = self.outer(current) {
            current = outer;
        }
        Some(current)
    }

    /// Every object owned by `id`, directly or not, each outer before its inners.
    pub fn subobjects(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut found = Vec::new();
        let mut stack: Vec<ObjectId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            found.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        found
    }

    /// The flags of a live object; empty for dead handles.
    pub fn flags(&self, id: ObjectId) -> ObjectFlags {
        self.entry(id).map_or(ObjectFlags::EMPTY, ObjectEntry::flags)
    }

    /// Sets `flags` on a live object.
    pub fn set_flags(&mut self, id: ObjectId, flags: ObjectFlags) {
        if let Some(entry) = self.entry_mut(id) {
            entry.flags.insert(flags);
        }
    }

    /// Clears `flags` on a live object.
    pub fn clear_flags(&mut self, id: ObjectId, flags: ObjectFlags) {
        if let Some(entry) = self.entry_mut(id) {
            entry.flags.remove(flags);
        }
    }

    /// The union of the flags of `id` and of all its outers.
    pub fn collect_all_flags(&self, id: ObjectId) -> ObjectFlags {
        let mut flags = ObjectFlags::EMPTY;
        let mut current = Some(id);
        while let Some(entry) = current.and_then(|c| self.entry(c)) {
            flags |= entry.flags;
            current = entry.outer;
        }
        flags
    }

    /// Flags `id` and everything it owns for deletion.
    pub fn mark_for_delete(&mut self, id: ObjectId) {
        self.set_flags(id, ObjectFlags::MARKED_FOR_DELETE);
        for sub in self.subobjects(id) {
            self.set_flags(sub, ObjectFlags::MARKED_FOR_DELETE);
        }
    }

    /// Destroys `id` and everything it owns. Returns `false` for dead handles.
    pub fn destroy(&mut self, id: ObjectId) -> bool {
        let Some(outer) = self.entry(id).map(ObjectEntry::outer) else {
            return false;
        };
        if let Some(outer_entry) = outer.and_then(|o| self.entry_mut(o)) {
            outer_entry.children.retain(|child| *child != id);
        }

        let mut doomed = vec![id];
        doomed.extend(self.subobjects(id));
        for victim in doomed {
            if let Some(entry) = self.slots[victim.index as usize].1.take() {
                log::trace!("Destroyed object '{}'", entry.path);
                self.by_path.remove(&entry.path);
                self.freed_slots.push(victim.index);
            }
        }
        true
    }

    /// Moves the body of an object out of the database.
    ///
    /// The bookkeeping stays in place, so paths, flags and the hierarchy remain
    /// queryable while the body is being worked on.
    pub fn take_object(&mut self, id: ObjectId) -> Option<Box<dyn EngineObject>> {
        self.entry_mut(id)?.object.take()
    }

    /// Puts back a body taken with [`take_object`](Self::take_object).
    ///
    /// Returns `false`, dropping `object`, if `id` was destroyed meanwhile.
    pub fn restore_object(&mut self, id: ObjectId, object: Box<dyn EngineObject>) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.object = Some(object);
                true
            }
            None => false,
        }
    }

    /// The body of a live object.
    pub fn object_dyn(&self, id: ObjectId) -> Option<&dyn EngineObject> {
        self.entry(id)?.object.as_deref()
    }

    /// The body of a live object, mutably.
    pub fn object_dyn_mut(&mut self, id: ObjectId) -> Option<&mut (dyn EngineObject + 'static)> {
        self.entry_mut(id)?.object.as_deref_mut()
    }

    /// The body of a live object, if it is a `T`.
    pub fn object<T: EngineObject>(&self, id: ObjectId) -> Option<&T> {
        self.object_dyn(id)?.as_any().downcast_ref::<T>()
    }

    /// The body of a live object, mutably, if it is a `T`.
    pub fn object_mut<T: EngineObject>(&mut self, id: ObjectId) -> Option<&mut T> {
        self.object_dyn_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    /// Handles of every live object, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.slots
            .iter()
            .filter(|(_, entry)| entry.is_some())
            .map(|(id, _)| *id)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Checks if no object is alive.
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}
