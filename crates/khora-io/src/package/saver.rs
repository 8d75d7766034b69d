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

//! Flattens the object graph of a package into a package file.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use khora_core::archive::{
    write_value, ArchiveResult, ArchiveStream, MemoryStream, ObjectArchive, SizeCounterStream,
};
use khora_core::object::{path, ObjectClass, ObjectFlags, ObjectId, ObjectRef, TableIndex};
use khora_data::ObjectDatabase;

use super::format::{ContainedObjectRecord, DependencyObjectRecord, EncodedRef, PackageHeader};
use super::{Package, PackageError, PackageLoader, PackageResult};

/// Saves one package.
///
/// Object bodies are written twice: first against a [`SizeCounterStream`] to
/// learn their sizes and the dependency table, then for real once the header
/// size, and therefore every body offset, is known.
#[derive(Debug)]
pub struct PackageSaver {
    package: ObjectId,
    package_path: String,
    content_root: PathBuf,
    file_path: PathBuf,
    header: PackageHeader,
    transient: Vec<bool>,
    contained_index: HashMap<ObjectId, TableIndex>,
    dependency_index: HashMap<ObjectId, TableIndex>,
}

impl PackageSaver {
    /// Collects the live objects of `package` into a contained-object table.
    pub fn new(db: &ObjectDatabase, package: ObjectId) -> PackageResult<Self> {
        let package_path = db
            .full_path(package)
            .ok_or_else(|| PackageError::InvalidSaveTarget(package.to_string()))?
            .to_string();
        let body = db
            .object::<Package>(package)
            .ok_or_else(|| PackageError::InvalidSaveTarget(package_path.clone()))?;

        let mut saver = Self {
            package,
            content_root: body.content_root().to_path_buf(),
            file_path: body.file_path().to_path_buf(),
            package_path,
            header: PackageHeader::default(),
            transient: Vec::new(),
            contained_index: HashMap::new(),
            dependency_index: HashMap::new(),
        };
        saver.setup_contained_objects(db)?;
        Ok(saver)
    }

    fn setup_contained_objects(&mut self, db: &ObjectDatabase) -> PackageResult<()> {
        for object in db.subobjects(self.package) {
            let collected = db.collect_all_flags(object);
            if collected.contains(ObjectFlags::MARKED_FOR_DELETE) {
                continue;
            }
            let class_name = db.class_name(object).unwrap_or_default();
            let full_path = db.full_path(object).unwrap_or_default();
            if db.classes().is_child_of(class_name, Package::CLASS_NAME) {
                return Err(PackageError::InvalidPackage {
                    package: self.package_path.clone(),
                    reason: format!("'{full_path}' is a package inside another package"),
                });
            }
            let Some(object_path) = path::relative_to_package(full_path, &self.package_path) else {
                continue;
            };

            self.contained_index
                .insert(object, self.header.contained.len());
            self.transient
                .push(collected.contains(ObjectFlags::TRANSIENT));
            self.header.contained.push(ContainedObjectRecord {
                object_path: object_path.to_string(),
                class_name: class_name.to_string(),
                class_version: 0,
                object_flags: db.flags(object).persistent(),
                stream_start: 0,
                stream_size: 0,
                handle: Some(object),
            });
        }
        log::debug!(
            "Package '{}' has {} object(s) to save",
            self.package_path,
            self.header.contained.len()
        );
        Ok(())
    }

    /// The package being saved.
    pub fn package(&self) -> ObjectId {
        self.package
    }

    /// The path of the package being saved.
    pub fn package_path(&self) -> &str {
        &self.package_path
    }

    /// The file the package is saved to; empty if it has no location.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// The records of the objects saved in the package.
    pub fn contained_objects(&self) -> &[ContainedObjectRecord] {
        &self.header.contained
    }

    /// The records of the objects of other packages referenced by this one.
    pub fn dependent_objects(&self) -> &[DependencyObjectRecord] {
        &self.header.dependencies
    }

    /// The custom versions registered by the saved objects.
    pub fn custom_versions(&self) -> &BTreeMap<String, u32> {
        &self.header.custom_versions
    }

    /// Serializes the package into the bytes of a package file.
    pub fn save_to_bytes(&mut self, db: &mut ObjectDatabase) -> PackageResult<Vec<u8>> {
        self.header.dependencies.clear();
        self.header.custom_versions.clear();
        self.dependency_index.clear();
        for record in &mut self.header.contained {
            record.stream_start = 0;
            record.stream_size = 0;
        }
        let record_count = self.header.contained.len();

        // Sizing pass, behind a header whose dependency table is still empty.
        let mut counter = SizeCounterStream::new();
        self.header.write(&mut counter)?;
        let dummy_header_size = counter.cursor_pos();
        for idx in 0..record_count {
            if self.transient[idx] {
                continue;
            }
            let start = counter.cursor_pos();
            self.serialize_body(db, idx, &mut counter)?;
            let record = &mut self.header.contained[idx];
            record.stream_start = start;
            record.stream_size = counter.cursor_pos() - start;
        }
        let body_size = counter.cursor_pos() - dummy_header_size;

        for record in &mut self.header.contained {
            record.class_version = self
                .header
                .custom_versions
                .get(&record.class_name)
                .copied()
                .unwrap_or(0);
        }
        let mut header_counter = SizeCounterStream::new();
        self.header.write(&mut header_counter)?;
        let header_size = header_counter.cursor_pos();
        for (idx, record) in self.header.contained.iter_mut().enumerate() {
            if !self.transient[idx] {
                record.stream_start = record.stream_start - dummy_header_size + header_size;
            }
        }
        let total_size = header_size + body_size;

        let dependency_count = self.header.dependencies.len();
        let mut stream = MemoryStream::new();
        stream.allocate(total_size);
        self.header.write(&mut stream)?;
        for idx in 0..record_count {
            if self.transient[idx] {
                continue;
            }
            let start = stream.cursor_pos();
            self.serialize_body(db, idx, &mut stream)?;
            let written = stream.cursor_pos() - start;
            let record = &self.header.contained[idx];
            if start != record.stream_start || written != record.stream_size {
                return Err(PackageError::NondeterministicSave {
                    path: record.object_path.clone(),
                    counted: record.stream_size,
                    written,
                });
            }
        }
        if self.header.dependencies.len() != dependency_count
            || stream.cursor_pos() != total_size
        {
            return Err(PackageError::NondeterministicSave {
                path: self.package_path.clone(),
                counted: total_size,
                written: stream.cursor_pos(),
            });
        }

        log::debug!(
            "Serialized package '{}': {header_size} header bytes, {body_size} body bytes",
            self.package_path
        );
        Ok(stream.into_bytes())
    }

    /// Serializes the package and writes it to its file.
    pub fn save(&mut self, db: &mut ObjectDatabase) -> PackageResult<PathBuf> {
        if self.file_path.as_os_str().is_empty() {
            return Err(PackageError::InvalidPackage {
                package: self.package_path.clone(),
                reason: "the package has no file location".to_string(),
            });
        }
        let bytes = self.save_to_bytes(db)?;
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| PackageError::io(parent, e))?;
        }
        write_atomically(&self.file_path, &bytes)?;
        log::info!(
            "Saved package '{}' to {:?} ({} bytes)",
            self.package_path,
            self.file_path,
            bytes.len()
        );
        Ok(self.file_path.clone())
    }

    /// Turns the saved tables into the loader of the package, live handles included.
    pub fn into_loader(self) -> PackageLoader {
        PackageLoader::from_saved(
            &self.package_path,
            &self.content_root,
            &self.file_path,
            self.header,
            self.package,
        )
    }

    fn serialize_body(
        &mut self,
        db: &mut ObjectDatabase,
        idx: TableIndex,
        stream: &mut dyn ArchiveStream,
    ) -> PackageResult<()> {
        let record = &self.header.contained[idx];
        let object = record.handle.and_then(|handle| Some((handle, db.take_object(handle)?)));
        let Some((handle, mut object)) = object else {
            return Err(PackageError::InvalidPackage {
                package: self.package_path.clone(),
                reason: format!("the body of '{}' is not available", record.object_path),
            });
        };

        let result = {
            let mut archive = SaverArchive {
                db: &*db,
                stream,
                package: self.package,
                contained_index: &self.contained_index,
                dependencies: &mut self.header.dependencies,
                dependency_index: &mut self.dependency_index,
                custom_versions: &mut self.header.custom_versions,
            };
            object.serialize(&mut archive)
        };
        db.restore_object(handle, object);
        result?;
        Ok(())
    }
}

/// Writes `bytes` to a hidden sibling of `file_path`, then renames it over
/// the package file. A failed save leaves the previous file untouched.
fn write_atomically(file_path: &Path, bytes: &[u8]) -> PackageResult<()> {
    let file_name = file_path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    let temp_path = file_path.with_file_name(format!(".{file_name}.tmp"));
    let written = File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&temp_path, file_path));
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(PackageError::io(file_path, e));
    }
    Ok(())
}

/// The archive seen by objects while their package is being saved.
struct SaverArchive<'a> {
    db: &'a ObjectDatabase,
    stream: &'a mut dyn ArchiveStream,
    package: ObjectId,
    contained_index: &'a HashMap<ObjectId, TableIndex>,
    dependencies: &'a mut Vec<DependencyObjectRecord>,
    dependency_index: &'a mut HashMap<ObjectId, TableIndex>,
    custom_versions: &'a mut BTreeMap<String, u32>,
}

impl SaverArchive<'_> {
    fn encode(&mut self, object: ObjectId) -> EncodedRef {
        if let Some(&idx) = self.contained_index.get(&object) {
            return EncodedRef::Contained(idx);
        }
        if object != self.package && self.db.outermost(object) == Some(self.package) {
            // Owned by this package but left out of it, e.g. marked for delete.
            return EncodedRef::Null;
        }
        if let Some(&idx) = self.dependency_index.get(&object) {
            return EncodedRef::Dependency(idx);
        }

        let idx = self.dependencies.len();
        self.dependencies.push(DependencyObjectRecord {
            object_full_path: self.db.full_path(object).unwrap_or_default().to_string(),
            class_name: self.db.class_name(object).unwrap_or_default().to_string(),
            handle: Some(object),
        });
        self.dependency_index.insert(object, idx);
        EncodedRef::Dependency(idx)
    }
}

impl ObjectArchive for SaverArchive<'_> {
    fn is_loading(&self) -> bool {
        false
    }

    fn stream(&mut self) -> &mut dyn ArchiveStream {
        &mut *self.stream
    }

    fn custom_version(&self, key: &str) -> u32 {
        self.custom_versions.get(key).copied().unwrap_or(0)
    }

    fn set_custom_version(&mut self, key: &str, version: u32) {
        self.custom_versions.insert(key.to_string(), version);
    }

    fn serialize_object(&mut self, slot: &mut ObjectRef) -> ArchiveResult<()> {
        let encoded = match *slot {
            ObjectRef::Resolved(object) if self.db.is_valid(object) => self.encode(object),
            _ => EncodedRef::Null,
        };
        write_value(&mut *self.stream, &encoded.encode())
    }
}
