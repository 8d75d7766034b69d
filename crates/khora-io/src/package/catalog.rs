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

//! Index of the packages found under the registered content roots.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use khora_core::object::{path, ObjectClass, ObjectId};
use khora_data::{ClassRegistry, ObjectDatabase};
use walkdir::WalkDir;

use super::{Package, PackageLoader};

/// Where an indexed object lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedObject {
    /// The package containing the object.
    pub package_path: String,
    /// The recorded class of the object.
    pub class_name: String,
}

/// Maps content roots to the packages found in them and to the objects those
/// packages contain, without loading any object body.
///
/// Loaders are taken out of the catalog while they load (see
/// [`begin_load`](Self::begin_load)); the package stays flagged as in progress
/// so that a dependency cycle resolves to the existing shell instead of
/// starting a second load.
#[derive(Debug)]
pub struct PackageCatalog {
    extension: String,
    content_roots: Vec<PathBuf>,
    loaders: HashMap<String, PackageLoader>,
    objects: BTreeMap<String, IndexedObject>,
    in_progress: HashSet<String>,
}

impl PackageCatalog {
    /// Creates an empty catalog looking for files with `extension`.
    pub fn new(extension: &str) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_string(),
            content_roots: Vec::new(),
            loaders: HashMap::new(),
            objects: BTreeMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// The extension of package files.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The registered content roots.
    pub fn content_roots(&self) -> &[PathBuf] {
        &self.content_roots
    }

    /// Registers a content root and indexes its packages.
    ///
    /// Registering a known root only rescans for new files. Returns the paths
    /// of the packages indexed by this call.
    pub fn register_content_root(&mut self, root: &Path, db: &mut ObjectDatabase) -> Vec<String> {
        if self.content_roots.iter().any(|known| known == root) {
            log::debug!("Content root {root:?} already registered, refreshing");
            return self.refresh_packages(db);
        }
        self.content_roots.push(root.to_path_buf());
        let found = self.scan_root(root, db);
        log::info!(
            "Registered content root {root:?} with {} package(s)",
            found.len()
        );
        found
    }

    /// Forgets a content root, destroying every package found in it.
    ///
    /// Returns the paths of the removed packages.
    pub fn unregister_content_root(&mut self, root: &Path, db: &mut ObjectDatabase) -> Vec<String> {
        let before = self.content_roots.len();
        self.content_roots.retain(|known| known != root);
        if self.content_roots.len() == before {
            return Vec::new();
        }

        let doomed: Vec<String> = self
            .loaders
            .values()
            .filter(|loader| loader.content_root() == root)
            .map(|loader| loader.package_path().to_string())
            .collect();
        for package_path in &doomed {
            self.remove_package(package_path, db);
        }
        log::info!(
            "Unregistered content root {root:?}, removed {} package(s)",
            doomed.len()
        );
        doomed
    }

    /// Rescans every content root for package files that are not indexed yet.
    ///
    /// Packages whose file disappeared are kept.
    pub fn refresh_packages(&mut self, db: &mut ObjectDatabase) -> Vec<String> {
        let roots = self.content_roots.clone();
        roots
            .iter()
            .flat_map(|root| self.scan_root(root, db))
            .collect()
    }

    fn scan_root(&mut self, root: &Path, db: &mut ObjectDatabase) -> Vec<String> {
        let mut found = Vec::new();
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            let file_path = entry.path();
            if !entry.file_type().is_file()
                || file_path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str())
            {
                continue;
            }

            let package_path = path::package_path_from_file(file_path, root);
            if self.loaders.contains_key(&package_path) || self.in_progress.contains(&package_path) {
                continue;
            }
            if !path::is_valid_package_name(&package_path) {
                log::warn!("Skipping {file_path:?}: '{package_path}' is not a valid package name");
                continue;
            }

            match PackageLoader::prepare(&package_path, root, file_path) {
                Ok(loader) => {
                    self.insert_loader(loader, db);
                    found.push(package_path);
                }
                Err(e) => log::error!("Failed to read package header of {file_path:?}: {e}"),
            }
        }
        found
    }

    /// Indexes `loader`, replacing any loader of the same package.
    ///
    /// The package object is created as a load-pending shell if it does not
    /// exist yet.
    pub fn insert_loader(&mut self, mut loader: PackageLoader, db: &mut ObjectDatabase) {
        if let Err(e) = loader.attach_package(db) {
            log::error!("Cannot index package '{}': {e}", loader.package_path());
            return;
        }
        let package_path = loader.package_path().to_string();
        self.forget_objects(&package_path);

        self.objects.insert(
            package_path.clone(),
            IndexedObject {
                package_path: package_path.clone(),
                class_name: Package::CLASS_NAME.to_string(),
            },
        );
        for record in loader.contained_objects() {
            self.objects.insert(
                path::join(&package_path, &record.object_path),
                IndexedObject {
                    package_path: package_path.clone(),
                    class_name: record.class_name.clone(),
                },
            );
        }
        log::debug!(
            "Indexed package '{package_path}' ({} objects)",
            loader.contained_objects().len()
        );
        self.loaders.insert(package_path, loader);
    }

    fn forget_objects(&mut self, package_path: &str) {
        self.objects
            .retain(|_, indexed| indexed.package_path != package_path);
    }

    /// Checks if a package is indexed, including while it loads.
    pub fn contains_package(&self, package_path: &str) -> bool {
        self.loaders.contains_key(package_path) || self.in_progress.contains(package_path)
    }

    /// The indexed package paths, sorted.
    pub fn package_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        paths.extend(self.in_progress.iter().map(String::as_str));
        paths.sort_unstable();
        paths
    }

    /// The loader of a package, unless it is loading right now.
    pub fn loader(&self, package_path: &str) -> Option<&PackageLoader> {
        self.loaders.get(package_path)
    }

    /// Where an indexed object lives.
    pub fn indexed_object(&self, full_path: &str) -> Option<&IndexedObject> {
        self.objects.get(full_path)
    }

    /// Finds the full path of an indexed object from a full or partial path.
    ///
    /// An exact path wins. Otherwise the first path containing `name` is
    /// returned, preferring objects of exactly `class`, then objects of a class
    /// deriving from it. This is a heuristic and may be ambiguous.
    pub fn find_object(
        &self,
        name: &str,
        class: Option<&str>,
        classes: &ClassRegistry,
    ) -> Option<String> {
        let matches_class = |indexed: &IndexedObject| {
            class.map_or(true, |c| classes.is_child_of(&indexed.class_name, c))
        };
        if let Some(indexed) = self.objects.get(name) {
            if matches_class(indexed) {
                return Some(name.to_string());
            }
        }

        let mut candidates = self
            .objects
            .iter()
            .filter(|(full_path, _)| full_path.contains(name));
        let Some(class) = class else {
            return candidates.next().map(|(full_path, _)| full_path.clone());
        };

        let candidates: Vec<_> = candidates.collect();
        candidates
            .iter()
            .find(|(_, indexed)| indexed.class_name == class)
            .or_else(|| {
                candidates
                    .iter()
                    .find(|(_, indexed)| classes.is_child_of(&indexed.class_name, class))
            })
            .map(|(full_path, _)| (*full_path).clone())
    }

    /// Takes the loader of a package out of the catalog for loading.
    ///
    /// Until [`finish_load`](Self::finish_load) the package is reported as
    /// loading and this returns `None` for it.
    pub fn begin_load(&mut self, package_path: &str) -> Option<PackageLoader> {
        let loader = self.loaders.remove(package_path)?;
        self.in_progress.insert(package_path.to_string());
        Some(loader)
    }

    /// Gives back a loader taken with [`begin_load`](Self::begin_load).
    pub fn finish_load(&mut self, loader: PackageLoader) {
        self.in_progress.remove(loader.package_path());
        self.loaders
            .insert(loader.package_path().to_string(), loader);
    }

    /// Checks if a package is being loaded.
    pub fn is_loading(&self, package_path: &str) -> bool {
        self.in_progress.contains(package_path)
    }

    /// Unloads a package, keeping it indexed. Returns `false` if it is unknown
    /// or loading.
    pub fn unload(&mut self, package_path: &str, db: &mut ObjectDatabase) -> bool {
        match self.loaders.get_mut(package_path) {
            Some(loader) => {
                loader.unload(db);
                true
            }
            None => false,
        }
    }

    fn remove_package(&mut self, package_path: &str, db: &mut ObjectDatabase) -> bool {
        let Some(mut loader) = self.loaders.remove(package_path) else {
            return false;
        };
        loader.unload(db);
        if let Some(package) = loader.package() {
            db.destroy(package);
        }
        self.forget_objects(package_path);
        log::debug!("Removed package '{package_path}'");
        true
    }

    /// Reacts to the deletion of `object`.
    ///
    /// Deleting an indexed package removes it from the catalog entirely;
    /// deleting one of its objects unloads the owning package. Returns the
    /// path of the affected package, if any.
    pub fn on_object_deleted(&mut self, object: ObjectId, db: &mut ObjectDatabase) -> Option<String> {
        let package = db.outermost(object)?;
        let package_path = db.full_path(package)?.to_string();
        if !self.loaders.contains_key(&package_path) {
            return None;
        }

        if package == object {
            self.remove_package(&package_path, db);
        } else {
            self.unload(&package_path, db);
        }
        Some(package_path)
    }
}
