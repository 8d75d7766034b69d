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

use std::collections::HashMap;

use khora_core::object::{EngineObject, ObjectClass};

/// Runtime information about a registered object class.
#[derive(Debug, Clone, Copy)]
pub struct ClassDescriptor {
    /// The unique class name, as recorded in package files.
    pub name: &'static str,
    /// The name of the parent class, if any.
    pub parent: Option<&'static str>,
    factory: fn() -> Box<dyn EngineObject>,
}

impl ClassDescriptor {
    /// Creates a default instance of the class.
    pub fn instantiate(&self) -> Box<dyn EngineObject> {
        (self.factory)()
    }
}

fn instantiate_default<T: ObjectClass>() -> Box<dyn EngineObject> {
    Box::new(T::default())
}

/// A registry that maps class names to their descriptors.
///
/// Packages only know classes by name; this registry is the single place where
/// a name turns back into a concrete Rust type.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: HashMap<&'static str, ClassDescriptor>,
}

impl ClassRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the class `T`. Registering the same name twice replaces the
    /// previous descriptor.
    pub fn register<T: ObjectClass>(&mut self) {
        let descriptor = ClassDescriptor {
            name: T::CLASS_NAME,
            parent: T::PARENT_CLASS,
            factory: instantiate_default::<T>,
        };
        if self.classes.insert(T::CLASS_NAME, descriptor).is_some() {
            log::warn!("Class '{}' was registered twice", T::CLASS_NAME);
        }
    }

    /// Looks up a class by name.
    pub fn get(&self, name: &str) -> Option<&ClassDescriptor> {
        self.classes.get(name)
    }

    /// Checks if a class called `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Creates a default instance of the class called `name`.
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn EngineObject>> {
        self.get(name).map(ClassDescriptor::instantiate)
    }

    /// Checks if `class` is `parent` or derives from it, following the
    /// registered parent chain.
    pub fn is_child_of(&self, class: &str, parent: &str) -> bool {
        let mut current = Some(class);
        // Bounded by the number of classes so a malformed chain cannot loop.
        for _ in 0..=self.classes.len() {
            match current {
                Some(name) if name == parent => return true,
                Some(name) => current = self.get(name).and_then(|c| c.parent),
                None => return false,
            }
        }
        false
    }

    /// Returns the number of registered classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Checks if no class is registered.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
