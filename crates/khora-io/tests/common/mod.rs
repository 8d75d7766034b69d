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

//! Object classes and helpers shared by the package integration tests.

#![allow(dead_code)]

use std::any::Any;
use std::path::Path;

use anyhow::{Context, Result};
use khora_core::archive::{ArchiveResult, ObjectArchive};
use khora_core::object::{EngineObject, ObjectClass, ObjectFlags, ObjectId, ObjectRef, VisitReferences};
use khora_data::ClassRegistry;
use khora_io::PackageContext;

/// A generic scene object with a target and a list of links.
#[derive(Debug, Default)]
pub struct Prop {
    pub health: u32,
    pub name: String,
    pub target: ObjectRef,
    pub links: Vec<ObjectRef>,
}

impl EngineObject for Prop {
    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn serialize(&mut self, ar: &mut dyn ObjectArchive) -> ArchiveResult<()> {
        ar.serialize(&mut self.health)?;
        ar.serialize(&mut self.name)?;
        ar.serialize_object(&mut self.target)?;
        ar.serialize_object_list(&mut self.links)
    }

    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.target.visit_references(visitor);
        self.links.visit_references(visitor);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ObjectClass for Prop {
    const CLASS_NAME: &'static str = "Prop";
}

/// A prop subclass, with a versioned encoding.
#[derive(Debug, Default)]
pub struct Lamp {
    pub intensity: f32,
    pub switch: ObjectRef,
    pub lit: bool,
}

impl EngineObject for Lamp {
    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn serialize(&mut self, ar: &mut dyn ObjectArchive) -> ArchiveResult<()> {
        if !ar.is_loading() {
            ar.set_custom_version(Self::CLASS_NAME, 1);
        }
        ar.serialize(&mut self.intensity)?;
        ar.serialize_object(&mut self.switch)
    }

    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.switch.visit_references(visitor);
    }

    fn constructed(&mut self) {
        self.lit = self.intensity > 0.0;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ObjectClass for Lamp {
    const CLASS_NAME: &'static str = "Lamp";
    const PARENT_CLASS: Option<&'static str> = Some(Prop::CLASS_NAME);
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn classes() -> ClassRegistry {
    let mut classes = ClassRegistry::new();
    classes.register::<Prop>();
    classes.register::<Lamp>();
    classes
}

/// A context with `root` registered as its only content root.
pub fn context(root: &Path) -> PackageContext {
    init_logger();
    let mut context = PackageContext::new(classes());
    context.register_content_root(root);
    context
}

pub fn add_prop(context: &mut PackageContext, name: &str, outer: ObjectId, health: u32) -> Result<ObjectId> {
    let id = context
        .database_mut()
        .create::<Prop>(name, Some(outer), ObjectFlags::EMPTY)?;
    prop_mut(context, id)?.health = health;
    Ok(id)
}

pub fn prop(context: &PackageContext, id: ObjectId) -> Result<&Prop> {
    context
        .database()
        .object::<Prop>(id)
        .with_context(|| format!("{id} is not a live prop"))
}

pub fn prop_mut(context: &mut PackageContext, id: ObjectId) -> Result<&mut Prop> {
    context
        .database_mut()
        .object_mut::<Prop>(id)
        .with_context(|| format!("{id} is not a live prop"))
}

pub fn path_of(context: &PackageContext, slot: ObjectRef) -> Option<String> {
    slot.get()
        .and_then(|id| context.database().full_path(id))
        .map(str::to_string)
}

/// Writes `Maps/Forest` and `Props` under `root`:
///
/// ```text
/// Maps/Forest:Tree          -> Props:Crate, links [Tree/Branch, Light]
/// Maps/Forest:Tree/Branch
/// Maps/Forest:Light (Lamp)  -> Tree
/// Props:Crate
/// ```
pub fn write_sample_content(root: &Path) -> Result<()> {
    let mut context = context(root);

    let props = context.create_package("Props", root)?;
    let crate_id = add_prop(&mut context, "Crate", props, 50)?;
    prop_mut(&mut context, crate_id)?.name = "wooden crate".into();

    let forest = context.create_package("Maps/Forest", root)?;
    let tree = add_prop(&mut context, "Tree", forest, 10)?;
    let branch = add_prop(&mut context, "Branch", tree, 3)?;
    let light = context
        .database_mut()
        .create::<Lamp>("Light", Some(forest), ObjectFlags::EMPTY)?;
    {
        let lamp = context
            .database_mut()
            .object_mut::<Lamp>(light)
            .context("lamp body")?;
        lamp.intensity = 2.5;
        lamp.switch = tree.into();
    }
    let tree_body = prop_mut(&mut context, tree)?;
    tree_body.name = "oak".into();
    tree_body.target = crate_id.into();
    tree_body.links = vec![branch.into(), light.into()];

    context.save(props)?;
    context.save(forest)?;
    Ok(())
}
