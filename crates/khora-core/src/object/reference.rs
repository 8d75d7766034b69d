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

//! Object reference slots and the per-type walk over them.

use super::ObjectId;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

/// An index into a package's contained-object table.
pub type TableIndex = usize;

/// A field that refers to another engine object.
///
/// While a package is being loaded, a reference may point at an object whose
/// shell does not exist yet. Such a slot is parked as
/// [`ObjectRef::Unresolved`] with the table index of its target and is patched
/// by the loader's relink pass before the load returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ObjectRef {
    /// No object.
    #[default]
    Null,
    /// A live object.
    Resolved(ObjectId),
    /// A contained object of the package being loaded, not linked yet.
    Unresolved(TableIndex),
}

impl ObjectRef {
    /// Returns the referenced object, if the slot is resolved.
    pub fn get(&self) -> Option<ObjectId> {
        match self {
            ObjectRef::Resolved(id) => Some(*id),
            _ => None,
        }
    }

    /// Checks if the slot holds no object.
    pub fn is_null(&self) -> bool {
        matches!(self, ObjectRef::Null)
    }

    /// Checks if the slot still waits for the relink pass.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, ObjectRef::Unresolved(_))
    }
}

impl From<ObjectId> for ObjectRef {
    fn from(id: ObjectId) -> Self {
        ObjectRef::Resolved(id)
    }
}

impl From<Option<ObjectId>> for ObjectRef {
    fn from(id: Option<ObjectId>) -> Self {
        id.map_or(ObjectRef::Null, ObjectRef::Resolved)
    }
}

/// Enumerates every [`ObjectRef`] slot reachable from a value.
///
/// Implemented for the slot itself and for the standard containers, so that a
/// type holding nested collections or structs only has to forward the call to
/// each of its fields.
pub trait VisitReferences {
    /// Calls `visitor` once per reference slot.
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef));
}

impl VisitReferences for ObjectRef {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        visitor(self);
    }
}

impl<T: VisitReferences> VisitReferences for Option<T> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        if let Some(value) = self {
            value.visit_references(visitor);
        }
    }
}

impl<T: VisitReferences + ?Sized> VisitReferences for Box<T> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        (**self).visit_references(visitor);
    }
}

impl<T: VisitReferences> VisitReferences for [T] {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        for value in self.iter_mut() {
            value.visit_references(visitor);
        }
    }
}

impl<T: VisitReferences, const N: usize> VisitReferences for [T; N] {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.as_mut_slice().visit_references(visitor);
    }
}

impl<T: VisitReferences> VisitReferences for Vec<T> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.as_mut_slice().visit_references(visitor);
    }
}

impl<A: VisitReferences, B: VisitReferences> VisitReferences for (A, B) {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.0.visit_references(visitor);
        self.1.visit_references(visitor);
    }
}

// Map keys are immutable in place; only values are walked.
impl<K: Eq + Hash, V: VisitReferences, S> VisitReferences for HashMap<K, V, S> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        for value in self.values_mut() {
            value.visit_references(visitor);
        }
    }
}

impl<K: Ord, V: VisitReferences> VisitReferences for BTreeMap<K, V> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        for value in self.values_mut() {
            value.visit_references(visitor);
        }
    }
}

// Set elements are rebuilt since patching a slot changes its hash/order.
impl<T: VisitReferences + Eq + Hash> VisitReferences for HashSet<T> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        let mut elements: Vec<T> = self.drain().collect();
        elements.visit_references(visitor);
        self.extend(elements);
    }
}

impl<T: VisitReferences + Ord> VisitReferences for BTreeSet<T> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        let mut elements: Vec<T> = std::mem::take(self).into_iter().collect();
        elements.visit_references(visitor);
        self.extend(elements);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inner {
        target: ObjectRef,
    }

    impl VisitReferences for Inner {
        fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
            self.target.visit_references(visitor);
        }
    }

    #[test]
    fn visits_nested_containers() {
        let mut list = vec![ObjectRef::Unresolved(0), ObjectRef::Null];
        let mut map: HashMap<String, (ObjectRef, Inner)> = HashMap::new();
        map.insert(
            "a".into(),
            (
                ObjectRef::Unresolved(1),
                Inner {
                    target: ObjectRef::Unresolved(2),
                },
            ),
        );
        let mut set: HashSet<ObjectRef> = [ObjectRef::Unresolved(3)].into_iter().collect();

        let mut seen = Vec::new();
        let mut collect = |slot: &mut ObjectRef| {
            if let ObjectRef::Unresolved(idx) = *slot {
                seen.push(idx);
                *slot = ObjectRef::Resolved(ObjectId::new(idx as u32, 0));
            }
        };
        list.visit_references(&mut collect);
        map.visit_references(&mut collect);
        set.visit_references(&mut collect);

        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(list[0], ObjectRef::Resolved(ObjectId::new(0, 0)));
        assert!(list[1].is_null());
        assert!(set.contains(&ObjectRef::Resolved(ObjectId::new(3, 0))));
        assert_eq!(map["a"].1.target.get(), Some(ObjectId::new(2, 0)));
    }

    #[test]
    fn unresolved_slot_never_reads_as_a_handle() {
        for table_len in [1usize, 2, 3, 7, 8, 9, 1023, 1024, 1025] {
            for idx in [0, table_len / 2, table_len - 1] {
                let slot = ObjectRef::Unresolved(idx);
                assert!(slot.get().is_none());
                assert_ne!(slot, ObjectRef::Resolved(ObjectId::new(idx as u32, 0)));
            }
        }
    }
}
