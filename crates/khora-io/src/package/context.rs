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

use std::path::{Path, PathBuf};

use khora_core::event::EventBus;
use khora_core::object::{path, ObjectClass, ObjectFlags, ObjectId};
use khora_data::{ClassRegistry, ObjectDatabase};

use super::loader::reset_package;
use super::{
    package_file_path, LoadStatus, ObjectResolver, Package, PackageCatalog, PackageError,
    PackageEvent, PackageLoader, PackageResult, PackageSaver, PackageSettings,
};

/// Returns the package part of `full_path`; a path without one names a package.
fn package_of(full_path: &str) -> &str {
    match path::package_path(full_path) {
        "" => full_path,
        package_path => package_path,
    }
}

/// Owns the live objects and the package catalog, and exposes the package
/// operations of the engine.
///
/// Create one at startup and pass it to whatever needs to find, load or save
/// objects.
#[derive(Debug)]
pub struct PackageContext {
    database: ObjectDatabase,
    catalog: PackageCatalog,
    settings: PackageSettings,
    events: EventBus<PackageEvent>,
}

impl PackageContext {
    /// Creates a context with default settings.
    pub fn new(classes: ClassRegistry) -> Self {
        Self::with_settings(classes, PackageSettings::default())
    }

    /// Creates a context and registers the content roots listed in `settings`.
    pub fn with_settings(mut classes: ClassRegistry, settings: PackageSettings) -> Self {
        if !classes.contains(Package::CLASS_NAME) {
            classes.register::<Package>();
        }
        let mut context = Self {
            database: ObjectDatabase::new(classes),
            catalog: PackageCatalog::new(&settings.extension),
            settings,
            events: EventBus::new(),
        };
        for root in context.settings.content_roots.clone() {
            context.register_content_root(&root);
        }
        context
    }

    /// The live objects.
    pub fn database(&self) -> &ObjectDatabase {
        &self.database
    }

    /// The live objects, mutably.
    pub fn database_mut(&mut self) -> &mut ObjectDatabase {
        &mut self.database
    }

    /// The package catalog.
    pub fn catalog(&self) -> &PackageCatalog {
        &self.catalog
    }

    /// The settings the context was created with.
    pub fn settings(&self) -> &PackageSettings {
        &self.settings
    }

    /// The bus package lifecycle events are published on.
    ///
    /// Events queue up until they are drained; a context nobody listens to
    /// should be created with [`PackageSettings::publish_events`] off.
    pub fn events(&self) -> &EventBus<PackageEvent> {
        &self.events
    }

    fn publish(&self, event: PackageEvent) {
        if self.settings.publish_events {
            self.events.publish(event);
        }
    }

    /// Registers a content root and indexes its packages.
    pub fn register_content_root(&mut self, root: impl AsRef<Path>) -> Vec<String> {
        let found = self
            .catalog
            .register_content_root(root.as_ref(), &mut self.database);
        for package_path in &found {
            self.publish(PackageEvent::Scanned(package_path.clone()));
        }
        found
    }

    /// Forgets a content root and destroys its packages.
    pub fn unregister_content_root(&mut self, root: impl AsRef<Path>) -> Vec<String> {
        let removed = self
            .catalog
            .unregister_content_root(root.as_ref(), &mut self.database);
        for package_path in &removed {
            self.publish(PackageEvent::Unloaded(package_path.clone()));
        }
        removed
    }

    /// Indexes package files added to the content roots since the last scan.
    pub fn refresh_packages(&mut self) -> Vec<String> {
        let found = self.catalog.refresh_packages(&mut self.database);
        for package_path in &found {
            self.publish(PackageEvent::Scanned(package_path.clone()));
        }
        found
    }

    /// Finds the full path of an indexed object from a full or partial path.
    pub fn find_object(&self, name: &str, class: Option<&str>) -> Option<String> {
        self.catalog
            .find_object(name, class, self.database.classes())
    }

    /// Loads a package if it is not loaded yet.
    ///
    /// A package that is already loading, further up a dependency chain,
    /// is left alone.
    pub fn load_package(&mut self, package_path: &str) -> PackageResult<LoadStatus> {
        if self.catalog.is_loading(package_path) {
            log::debug!("Package '{package_path}' is already loading");
            return Ok(LoadStatus::Success);
        }
        let Some(mut loader) = self.catalog.begin_load(package_path) else {
            return Err(PackageError::NotFound(package_path.to_string()));
        };
        if loader.is_loaded(&self.database) {
            self.catalog.finish_load(loader);
            return Ok(LoadStatus::Success);
        }

        let result = loader.load(self);
        self.catalog.finish_load(loader);
        if let Err(e) = &result {
            log::error!("Failed to load package '{package_path}': {e}");
        }
        result
    }

    /// Loads an in-memory package file as the package `package_path`.
    ///
    /// Live objects of a package with the same path are destroyed first.
    pub fn load_from_bytes(&mut self, package_path: &str, bytes: Vec<u8>) -> PackageResult<LoadStatus> {
        let loader = PackageLoader::from_bytes(package_path, bytes)?;
        if let Some(existing) = self.database.get(package_path) {
            reset_package(&mut self.database, existing);
        }
        self.catalog.insert_loader(loader, &mut self.database);
        self.load_package(package_path)
    }

    /// Loads the package owning `name` and returns the object.
    ///
    /// `name` is a full path, a package path, or a bare object name that is
    /// looked up with [`find_object`](Self::find_object). If nothing matches,
    /// the content roots are rescanned once (see
    /// [`PackageSettings::refresh_on_miss`]).
    pub fn load(&mut self, name: &str, class: &str) -> PackageResult<ObjectId> {
        let full_path = self
            .resolve_name(name, class)
            .ok_or_else(|| PackageError::NotFound(name.to_string()))?;
        let package_path = package_of(&full_path);
        if !self.catalog.contains_package(package_path) && self.settings.refresh_on_miss {
            log::debug!("Package '{package_path}' is not indexed, refreshing packages");
            self.refresh_packages();
        }
        if !self.catalog.contains_package(package_path) {
            return Err(PackageError::NotFound(full_path));
        }

        self.load_package(package_path)?;
        self.database
            .get(&full_path)
            .filter(|&object| self.is_of_class(object, class))
            .ok_or(PackageError::NotFound(full_path))
    }

    /// Returns the live object named `name`, loading its package if needed.
    ///
    /// `name` is resolved like in [`load`](Self::load).
    pub fn get_or_load(&mut self, name: &str, class: &str) -> Option<ObjectId> {
        let Some(full_path) = self.resolve_name(name, class) else {
            log::warn!("No '{class}' matches '{name}'");
            return None;
        };
        let package_path = package_of(&full_path);
        let pending = self
            .catalog
            .loader(package_path)
            .is_some_and(|loader| !loader.is_loaded(&self.database));
        if !pending {
            if let Some(object) = self.database.get(&full_path) {
                if self.is_of_class(object, class) {
                    return Some(object);
                }
                log::warn!("'{full_path}' exists but is not a '{class}'");
                return None;
            }
        }

        match self.load(&full_path, class) {
            Ok(object) => Some(object),
            Err(e) => {
                log::warn!("Cannot resolve '{full_path}': {e}");
                None
            }
        }
    }

    /// Turns a bare object name into the full path of an indexed object.
    ///
    /// Full paths and known package paths are returned as they are.
    fn resolve_name(&mut self, name: &str, class: &str) -> Option<String> {
        if !path::package_path(name).is_empty()
            || self.catalog.contains_package(name)
            || self.database.get(name).is_some()
        {
            return Some(name.to_string());
        }
        if let Some(found) = self.find_object(name, Some(class)) {
            return Some(found);
        }
        if !self.settings.refresh_on_miss {
            return None;
        }
        log::debug!("No '{class}' named '{name}' is indexed, refreshing packages");
        self.refresh_packages();
        self.find_object(name, Some(class))
    }

    fn is_of_class(&self, object: ObjectId, class: &str) -> bool {
        self.database
            .class_name(object)
            .is_some_and(|actual| self.database.classes().is_child_of(actual, class))
    }

    /// The package owning `object`, or `object` itself if it is a package.
    pub fn owning_package(&self, object: ObjectId) -> Option<ObjectId> {
        let root = self.database.outermost(object)?;
        self.is_of_class(root, Package::CLASS_NAME).then_some(root)
    }

    /// Saves the package owning `object` to its file.
    pub fn save(&mut self, object: ObjectId) -> PackageResult<PathBuf> {
        let result = self.save_package(object);
        if let Err(e) = &result {
            log::error!("Failed to save {object}: {e}");
        }
        result
    }

    fn save_package(&mut self, object: ObjectId) -> PackageResult<PathBuf> {
        let package = self.save_target(object)?;
        let package_path = self
            .database
            .full_path(package)
            .unwrap_or_default()
            .to_string();
        // Saving a package that was never loaded would write it empty.
        if self
            .catalog
            .loader(&package_path)
            .is_some_and(|loader| !loader.is_loaded(&self.database))
        {
            self.load_package(&package_path)?;
        }

        let mut saver = PackageSaver::new(&self.database, package)?;
        let file_path = saver.save(&mut self.database)?;
        self.clear_dirty(package);
        self.catalog
            .insert_loader(saver.into_loader(), &mut self.database);
        self.publish(PackageEvent::Saved(package_path));
        Ok(file_path)
    }

    /// Serializes the package owning `object` without touching the disk.
    pub fn save_to_bytes(&mut self, object: ObjectId) -> PackageResult<Vec<u8>> {
        let package = self.save_target(object)?;
        PackageSaver::new(&self.database, package)?.save_to_bytes(&mut self.database)
    }

    fn save_target(&self, object: ObjectId) -> PackageResult<ObjectId> {
        self.owning_package(object).ok_or_else(|| {
            let what = self
                .database
                .full_path(object)
                .map_or_else(|| object.to_string(), str::to_string);
            PackageError::InvalidSaveTarget(what)
        })
    }

    fn clear_dirty(&mut self, package: ObjectId) {
        self.database
            .clear_flags(package, ObjectFlags::PACKAGE_DIRTY);
        for object in self.database.subobjects(package) {
            self.database
                .clear_flags(object, ObjectFlags::PACKAGE_DIRTY);
        }
    }

    /// Flags the package owning `object` as changed since its last save.
    pub fn mark_dirty(&mut self, object: ObjectId) -> bool {
        match self.owning_package(object) {
            Some(package) => {
                self.database.set_flags(package, ObjectFlags::PACKAGE_DIRTY);
                true
            }
            None => false,
        }
    }

    /// Checks if the package owning `object` changed since its last save.
    pub fn is_dirty(&self, object: ObjectId) -> bool {
        self.owning_package(object).is_some_and(|package| {
            self.database
                .flags(package)
                .contains(ObjectFlags::PACKAGE_DIRTY)
        })
    }

    /// Creates a new, empty package that will be saved under `content_root`.
    ///
    /// `name` is sanitized into a valid package path. An existing package with
    /// that path is returned as is.
    pub fn create_package(&mut self, name: &str, content_root: impl AsRef<Path>) -> PackageResult<ObjectId> {
        let package_path = path::sanitize_package_name(name);
        if package_path != name {
            log::warn!("Package name '{name}' sanitized to '{package_path}'");
        }
        if let Some(existing) = self.database.get(&package_path) {
            if self.database.object::<Package>(existing).is_some() {
                return Ok(existing);
            }
            return Err(PackageError::InvalidPackage {
                package: package_path,
                reason: "the path belongs to an object that is not a package".to_string(),
            });
        }

        let package = self.database.create::<Package>(
            &package_path,
            None,
            ObjectFlags::PACKAGE_LOADED | ObjectFlags::PACKAGE_DIRTY,
        )?;
        let root = content_root.as_ref();
        let file_path = package_file_path(root, &package_path, self.catalog.extension());
        if let Some(body) = self.database.object_mut::<Package>(package) {
            body.set_location(root, &file_path);
        }
        log::info!("Created package '{package_path}'");
        Ok(package)
    }

    /// Destroys the objects of a package, keeping it indexed.
    pub fn unload_package(&mut self, package_path: &str) -> bool {
        let unloaded = self.catalog.unload(package_path, &mut self.database);
        if unloaded {
            self.publish(PackageEvent::Unloaded(package_path.to_string()));
        }
        unloaded
    }

    /// Destroys `object` and notifies the catalog.
    ///
    /// Destroying an indexed package removes it from the catalog; destroying an
    /// object of an indexed package unloads that package.
    pub fn destroy_object(&mut self, object: ObjectId) -> bool {
        if !self.database.is_valid(object) {
            return false;
        }
        if let Some(package_path) = self.catalog.on_object_deleted(object, &mut self.database) {
            self.publish(PackageEvent::Unloaded(package_path));
        }
        if self.database.is_valid(object) {
            self.database.destroy(object);
        }
        true
    }
}

impl ObjectResolver for PackageContext {
    fn database(&mut self) -> &mut ObjectDatabase {
        &mut self.database
    }

    fn get_or_load(&mut self, full_path: &str, class: &str) -> Option<ObjectId> {
        PackageContext::get_or_load(self, full_path, class)
    }

    fn package_loaded(&mut self, package_path: &str) {
        self.publish(PackageEvent::Loaded(package_path.to_string()));
    }
}
