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

//! Reconstructs the object graph of a package file.
//!
//! Loading runs over the contained-object table in table order, which puts
//! every outer before its inners:
//!
//! 1. shells are created (transient records are only looked up),
//! 2. each body is streamed from its recorded offset,
//! 3. transient records that were missing are looked up again,
//!
//! and finally references parked as [`ObjectRef::Unresolved`] are patched by
//! the relink pass.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use khora_core::archive::{read_value, ArchiveResult, ArchiveStream, MemoryStream, ObjectArchive};
use khora_core::object::{path, ObjectFlags, ObjectId, ObjectRef, TableIndex};
use khora_data::ObjectDatabase;

use super::format::{
    ContainedObjectRecord, DependencyObjectRecord, EncodedRef, PackageHeader,
    MIN_SUPPORTED_FORMAT_VERSION, PACKAGE_FORMAT_VERSION,
};
use super::{LoadStatus, Package, PackageError, PackageResult, PackageWarning};

/// Gives a loader access to live objects and to the other packages.
pub trait ObjectResolver {
    /// The database objects are created in.
    fn database(&mut self) -> &mut ObjectDatabase;

    /// Returns the object at `full_path`, loading its package if needed.
    fn get_or_load(&mut self, full_path: &str, class: &str) -> Option<ObjectId>;

    /// Called once a package is linked, before its objects are constructed.
    fn package_loaded(&mut self, _package_path: &str) {}
}

/// A bare database only resolves objects that are already alive.
impl ObjectResolver for ObjectDatabase {
    fn database(&mut self) -> &mut ObjectDatabase {
        self
    }

    fn get_or_load(&mut self, full_path: &str, _class: &str) -> Option<ObjectId> {
        self.get(full_path)
    }
}

#[derive(Debug, Clone)]
enum LoaderSource {
    File(PathBuf),
    Memory(Vec<u8>),
}

/// Loads one package into an [`ObjectDatabase`].
#[derive(Debug)]
pub struct PackageLoader {
    package_path: String,
    content_root: PathBuf,
    source: LoaderSource,
    header: PackageHeader,
    header_warnings: Vec<PackageWarning>,
    record_by_path: HashMap<String, TableIndex>,
    // Record or one of its outers is transient.
    transient: Vec<bool>,
    package: Option<ObjectId>,
    delay_link_required: bool,
    // Dependencies that failed to resolve during the current load.
    missing_dependencies: HashSet<TableIndex>,
}

fn read_file(file_path: &Path) -> PackageResult<Vec<u8>> {
    fs::read(file_path).map_err(|e| PackageError::io(file_path, e))
}

fn read_header(
    package_path: &str,
    stream: &mut MemoryStream,
) -> PackageResult<(PackageHeader, Vec<PackageWarning>)> {
    let (header, has_marker) = PackageHeader::read(stream)?;
    let mut warnings = Vec::new();
    if !has_marker {
        log::warn!("Package '{package_path}' has no package marker, reading it best-effort");
        warnings.push(PackageWarning::MissingMarker);
    }
    if !(MIN_SUPPORTED_FORMAT_VERSION..=PACKAGE_FORMAT_VERSION).contains(&header.format_version) {
        return Err(PackageError::UnsupportedVersion {
            found: header.format_version,
            min: MIN_SUPPORTED_FORMAT_VERSION,
            current: PACKAGE_FORMAT_VERSION,
        });
    }
    Ok((header, warnings))
}

impl PackageLoader {
    /// Reads the header of the package file `file_path`.
    ///
    /// Object bodies are not touched; they are read by [`load`](Self::load).
    pub fn prepare(package_path: &str, content_root: &Path, file_path: &Path) -> PackageResult<Self> {
        let mut stream = MemoryStream::from_bytes(read_file(file_path)?);
        let (header, warnings) = read_header(package_path, &mut stream)?;
        log::debug!(
            "Prepared package '{package_path}': {} contained, {} dependencies",
            header.contained.len(),
            header.dependencies.len()
        );
        Ok(Self::new(
            package_path,
            content_root.to_path_buf(),
            LoaderSource::File(file_path.to_path_buf()),
            header,
            warnings,
        ))
    }

    /// Creates a loader over an in-memory package file.
    pub fn from_bytes(package_path: &str, bytes: Vec<u8>) -> PackageResult<Self> {
        let mut stream = MemoryStream::from_bytes(bytes);
        let (header, warnings) = read_header(package_path, &mut stream)?;
        Ok(Self::new(
            package_path,
            PathBuf::new(),
            LoaderSource::Memory(stream.into_bytes()),
            header,
            warnings,
        ))
    }

    /// Creates a loader for a package that was just written to `file_path`,
    /// with the live handles of its records already attached.
    pub(crate) fn from_saved(
        package_path: &str,
        content_root: &Path,
        file_path: &Path,
        header: PackageHeader,
        package: ObjectId,
    ) -> Self {
        let mut loader = Self::new(
            package_path,
            content_root.to_path_buf(),
            LoaderSource::File(file_path.to_path_buf()),
            header,
            Vec::new(),
        );
        loader.package = Some(package);
        loader
    }

    fn new(
        package_path: &str,
        content_root: PathBuf,
        source: LoaderSource,
        header: PackageHeader,
        header_warnings: Vec<PackageWarning>,
    ) -> Self {
        let record_by_path: HashMap<String, TableIndex> = header
            .contained
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.object_path.clone(), idx))
            .collect();

        let mut transient: Vec<bool> = Vec::with_capacity(header.contained.len());
        for record in &header.contained {
            let (outer_path, _) = path::split_outer(&record.object_path);
            let outer_transient = record_by_path
                .get(outer_path)
                .is_some_and(|&outer| outer < transient.len() && transient[outer]);
            transient.push(outer_transient || record.object_flags.contains(ObjectFlags::TRANSIENT));
        }

        Self {
            package_path: package_path.to_string(),
            content_root,
            source,
            header,
            header_warnings,
            record_by_path,
            transient,
            package: None,
            delay_link_required: false,
            missing_dependencies: HashSet::new(),
        }
    }

    /// The path of the package, e.g. `Maps/Forest`.
    pub fn package_path(&self) -> &str {
        &self.package_path
    }

    /// The content root the package was found in; empty for in-memory packages.
    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// The package file, `None` for in-memory packages.
    pub fn file_path(&self) -> Option<&Path> {
        match &self.source {
            LoaderSource::File(file_path) => Some(file_path),
            LoaderSource::Memory(_) => None,
        }
    }

    /// The records of the objects serialized in the package.
    pub fn contained_objects(&self) -> &[ContainedObjectRecord] {
        &self.header.contained
    }

    /// The records of the objects of other packages referenced by this one.
    pub fn dependent_objects(&self) -> &[DependencyObjectRecord] {
        &self.header.dependencies
    }

    /// The custom versions the package was saved with.
    pub fn custom_versions(&self) -> &BTreeMap<String, u32> {
        &self.header.custom_versions
    }

    /// The package object, once attached.
    pub fn package(&self) -> Option<ObjectId> {
        self.package
    }

    /// Checks if the package object is alive and flagged as loaded.
    pub fn is_loaded(&self, db: &ObjectDatabase) -> bool {
        self.package
            .is_some_and(|package| db.flags(package).contains(ObjectFlags::PACKAGE_LOADED))
    }

    /// Returns the package object, creating a load-pending shell if needed.
    pub fn attach_package(&mut self, db: &mut ObjectDatabase) -> PackageResult<ObjectId> {
        if let Some(package) = self.package.filter(|p| db.is_valid(*p)) {
            return Ok(package);
        }

        let package = match db.get(&self.package_path) {
            Some(existing) if db.object::<Package>(existing).is_some() => existing,
            Some(_) => {
                return Err(PackageError::InvalidPackage {
                    package: self.package_path.clone(),
                    reason: "the path belongs to an object that is not a package".to_string(),
                })
            }
            None => db.create::<Package>(
                &self.package_path,
                None,
                ObjectFlags::PACKAGE_LOAD_PENDING,
            )?,
        };

        if let LoaderSource::File(file_path) = &self.source {
            if let Some(body) = db.object_mut::<Package>(package) {
                body.set_location(&self.content_root, file_path);
            }
        }
        self.package = Some(package);
        Ok(package)
    }

    /// Creates, streams and links every contained object of the package.
    ///
    /// Problems limited to single objects are reported as warnings in the
    /// returned status; only I/O failures and unreadable headers are errors.
    pub fn load(&mut self, resolver: &mut dyn ObjectResolver) -> PackageResult<LoadStatus> {
        let bytes = match &self.source {
            LoaderSource::File(file_path) => read_file(file_path)?,
            LoaderSource::Memory(bytes) => bytes.clone(),
        };
        let mut stream = MemoryStream::from_bytes(bytes);
        let package = self.attach_package(resolver.database())?;
        log::info!(
            "Loading package '{}' ({} objects)",
            self.package_path,
            self.header.contained.len()
        );

        let mut warnings = self.header_warnings.clone();
        self.delay_link_required = false;
        self.missing_dependencies.clear();
        let record_count = self.header.contained.len();

        for idx in 0..record_count {
            self.create_contained_object(resolver.database(), package, idx, &mut warnings);
        }

        let mut loaded = Vec::with_capacity(record_count);
        for idx in 0..record_count {
            if let Some(handle) =
                self.serialize_contained_object(resolver, &mut stream, idx, &mut warnings)
            {
                loaded.push(handle);
            }
        }

        // Streaming may have created transient objects that were missing before.
        for idx in 0..record_count {
            if self.transient[idx] && self.header.contained[idx].handle.is_none() {
                self.create_contained_object(resolver.database(), package, idx, &mut warnings);
            }
        }

        if self.delay_link_required {
            self.link_contained_objects(resolver.database());
        }

        let db = resolver.database();
        db.clear_flags(
            package,
            ObjectFlags::PACKAGE_LOAD_PENDING | ObjectFlags::PACKAGE_DIRTY,
        );
        db.set_flags(package, ObjectFlags::PACKAGE_LOADED);
        for &handle in &loaded {
            if let Some(object) = db.object_dyn_mut(handle) {
                object.post_serialize(true);
            }
        }
        for &handle in &loaded {
            if let Some(object) = db.object_dyn_mut(handle) {
                object.post_load();
            }
        }
        resolver.package_loaded(&self.package_path);
        let db = resolver.database();
        for &handle in &loaded {
            if let Some(object) = db.object_dyn_mut(handle) {
                object.constructed();
            }
        }

        if warnings.is_empty() {
            log::info!("Loaded package '{}'", self.package_path);
        } else {
            log::warn!(
                "Loaded package '{}' with {} warning(s)",
                self.package_path,
                warnings.len()
            );
        }
        Ok(LoadStatus::from_warnings(warnings))
    }

    fn create_contained_object(
        &mut self,
        db: &mut ObjectDatabase,
        package: ObjectId,
        idx: TableIndex,
        warnings: &mut Vec<PackageWarning>,
    ) -> Option<ObjectId> {
        let record = &self.header.contained[idx];
        if let Some(handle) = record.handle.filter(|h| db.is_valid(*h)) {
            return Some(handle);
        }

        let object_path = record.object_path.clone();
        if self.transient[idx] {
            // Never created by the loader; it exists already or stays null.
            let handle = db.get(&path::join(&self.package_path, &object_path));
            self.header.contained[idx].handle = handle;
            return handle;
        }
        let class_name = record.class_name.clone();
        let flags = record.object_flags.persistent() | ObjectFlags::PACKAGE_LOAD_PENDING;

        let (outer_path, name) = path::split_outer(&object_path);
        let outer = if outer_path.is_empty() {
            Some(package)
        } else {
            let outer_record = self.record_by_path.get(outer_path).copied();
            match outer_record {
                Some(outer_idx) if outer_idx != idx => {
                    self.create_contained_object(db, package, outer_idx, warnings)
                }
                _ => {
                    log::warn!(
                        "Object '{object_path}' of package '{}' has no outer record",
                        self.package_path
                    );
                    warnings.push(PackageWarning::MissingOuter {
                        object_path: object_path.clone(),
                    });
                    db.get(&path::join(&self.package_path, outer_path))
                }
            }
        };

        let result = match outer {
            Some(outer) => db
                .create_or_get(&class_name, name, Some(outer), flags)
                .map_err(|e| e.to_string()),
            None => Err("its outer object could not be created".to_string()),
        };
        match result {
            Ok(handle) => {
                self.header.contained[idx].handle = Some(handle);
                Some(handle)
            }
            Err(reason) => {
                log::warn!(
                    "Cannot create '{object_path}' in package '{}': {reason}",
                    self.package_path
                );
                warnings.push(PackageWarning::ObjectReadFailed {
                    object_path,
                    reason,
                });
                None
            }
        }
    }

    fn serialize_contained_object(
        &mut self,
        resolver: &mut dyn ObjectResolver,
        stream: &mut MemoryStream,
        idx: TableIndex,
        warnings: &mut Vec<PackageWarning>,
    ) -> Option<ObjectId> {
        if self.transient[idx] {
            return None;
        }
        let handle = self.header.contained[idx].handle?;
        let db = resolver.database();
        if !db.flags(handle).contains(ObjectFlags::PACKAGE_LOAD_PENDING) {
            return None;
        }
        let mut object = db.take_object(handle)?;

        let start = self.header.contained[idx].stream_start;
        let expected = self.header.contained[idx].stream_size;
        stream.seek(start);
        let result = {
            let mut archive = LoaderArchive {
                stream: &mut *stream,
                resolver: &mut *resolver,
                contained: &self.header.contained,
                dependencies: &mut self.header.dependencies,
                custom_versions: &self.header.custom_versions,
                delay_link_required: &mut self.delay_link_required,
                missing_dependencies: &mut self.missing_dependencies,
                warnings: &mut *warnings,
            };
            object.serialize(&mut archive)
        };
        let consumed = stream.cursor_pos().saturating_sub(start);

        let db = resolver.database();
        db.restore_object(handle, object);
        db.clear_flags(handle, ObjectFlags::PACKAGE_LOAD_PENDING);
        db.set_flags(handle, ObjectFlags::PACKAGE_LOADED);

        let object_path = &self.header.contained[idx].object_path;
        match result {
            Err(e) => {
                log::warn!(
                    "Failed to read '{object_path}' of package '{}': {e}",
                    self.package_path
                );
                warnings.push(PackageWarning::ObjectReadFailed {
                    object_path: object_path.clone(),
                    reason: e.to_string(),
                });
            }
            Ok(()) if consumed != expected => {
                log::warn!(
                    "Object '{object_path}' of package '{}' read {consumed} bytes, {expected} recorded",
                    self.package_path
                );
                warnings.push(PackageWarning::SizeMismatch {
                    object_path: object_path.clone(),
                    expected,
                    actual: consumed,
                });
            }
            Ok(()) => log::trace!("Read '{object_path}' ({consumed} bytes)"),
        }
        Some(handle)
    }

    fn link_contained_objects(&mut self, db: &mut ObjectDatabase) {
        let handles: Vec<Option<ObjectId>> =
            self.header.contained.iter().map(|record| record.handle).collect();
        let mut linked = 0usize;

        for (idx, handle) in handles.iter().enumerate() {
            if self.transient[idx] {
                continue;
            }
            let Some(handle) = *handle else {
                continue;
            };
            let Some(object) = db.object_dyn_mut(handle) else {
                continue;
            };
            object.visit_references(&mut |slot: &mut ObjectRef| {
                if let ObjectRef::Unresolved(target) = *slot {
                    *slot = handles.get(target).copied().flatten().into();
                    linked += 1;
                }
            });
        }

        self.delay_link_required = false;
        log::debug!(
            "Relinked {linked} reference(s) in package '{}'",
            self.package_path
        );
    }

    /// Destroys the package's objects and makes it load-pending again.
    ///
    /// The package object itself and the record tables survive, so the package
    /// can be loaded again.
    pub fn unload(&mut self, db: &mut ObjectDatabase) {
        if let Some(package) = self.package {
            reset_package(db, package);
        }
        for record in &mut self.header.contained {
            record.handle = None;
        }
        for record in &mut self.header.dependencies {
            record.handle = None;
        }
        log::info!("Unloaded package '{}'", self.package_path);
    }
}

/// Destroys every object of `package` and flags it load-pending.
pub(crate) fn reset_package(db: &mut ObjectDatabase, package: ObjectId) {
    if !db.is_valid(package) {
        return;
    }
    for child in db.children(package).to_vec() {
        db.destroy(child);
    }
    db.clear_flags(
        package,
        ObjectFlags::PACKAGE_LOADED | ObjectFlags::PACKAGE_DIRTY,
    );
    db.set_flags(package, ObjectFlags::PACKAGE_LOAD_PENDING);
}

/// The archive seen by objects while their package is being loaded.
struct LoaderArchive<'a> {
    stream: &'a mut MemoryStream,
    resolver: &'a mut dyn ObjectResolver,
    contained: &'a [ContainedObjectRecord],
    dependencies: &'a mut [DependencyObjectRecord],
    custom_versions: &'a BTreeMap<String, u32>,
    delay_link_required: &'a mut bool,
    missing_dependencies: &'a mut HashSet<TableIndex>,
    warnings: &'a mut Vec<PackageWarning>,
}

impl LoaderArchive<'_> {
    fn resolve_dependency(&mut self, idx: TableIndex) -> Option<ObjectId> {
        if self.missing_dependencies.contains(&idx) {
            return None;
        }
        let record = &mut self.dependencies[idx];
        if let Some(handle) = record.handle {
            if self.resolver.database().is_valid(handle) {
                return Some(handle);
            }
        }

        let handle = self
            .resolver
            .get_or_load(&record.object_full_path, &record.class_name);
        if handle.is_none() {
            log::warn!(
                "Unresolved dependency '{}' ({})",
                record.object_full_path,
                record.class_name
            );
            self.warnings.push(PackageWarning::UnresolvedDependency {
                object_path: record.object_full_path.clone(),
            });
            self.missing_dependencies.insert(idx);
        }
        record.handle = handle;
        handle
    }
}

impl ObjectArchive for LoaderArchive<'_> {
    fn is_loading(&self) -> bool {
        true
    }

    fn stream(&mut self) -> &mut dyn ArchiveStream {
        &mut *self.stream
    }

    fn custom_version(&self, key: &str) -> u32 {
        self.custom_versions.get(key).copied().unwrap_or(0)
    }

    fn set_custom_version(&mut self, _key: &str, _version: u32) {}

    fn serialize_object(&mut self, slot: &mut ObjectRef) -> ArchiveResult<()> {
        let raw: u64 = read_value(&mut *self.stream)?;
        *slot = match EncodedRef::decode(raw, self.contained.len(), self.dependencies.len()) {
            EncodedRef::Null => ObjectRef::Null,
            EncodedRef::Dependency(idx) => self.resolve_dependency(idx).into(),
            EncodedRef::Contained(idx) => match self.contained[idx].handle {
                Some(handle) => ObjectRef::Resolved(handle),
                None => {
                    *self.delay_link_required = true;
                    ObjectRef::Unresolved(idx)
                }
            },
        };
        Ok(())
    }
}
