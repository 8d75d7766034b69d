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

mod common;

use anyhow::{Context, Result};
use common::{add_prop, context, path_of, prop, prop_mut, write_sample_content, Lamp, Prop};
use khora_core::archive::MemoryStream;
use khora_core::object::{ObjectClass, ObjectFlags};
use khora_io::package::format::PackageHeader;
use khora_io::package::PackageLoader;
use khora_io::{PackageError, PackageEvent, PackageWarning};
use tempfile::tempdir;

#[test]
fn test_save_and_reload_restores_graph() -> Result<()> {
    // --- 1. Setup: write two packages to a real content root ---
    let dir = tempdir()?;
    write_sample_content(dir.path())?;
    assert!(dir.path().join("Maps").join("Forest.kpkg").is_file());
    assert!(dir.path().join("Props.kpkg").is_file());

    // --- 2. Load through a fresh context ---
    let mut context = context(dir.path());
    let tree = context.load("Maps/Forest:Tree", Prop::CLASS_NAME)?;

    // --- 3. Verify fields and references ---
    let body = prop(&context, tree)?;
    assert_eq!(body.health, 10);
    assert_eq!(body.name, "oak");
    assert_eq!(path_of(&context, body.target).as_deref(), Some("Props:Crate"));
    let links: Vec<_> = body.links.iter().map(|l| path_of(&context, *l)).collect();
    assert_eq!(
        links,
        vec![
            Some("Maps/Forest:Tree/Branch".to_string()),
            Some("Maps/Forest:Light".to_string())
        ]
    );

    // The dependency pulled in the whole `Props` package.
    let crate_id = context.database().get("Props:Crate").context("crate")?;
    assert_eq!(prop(&context, crate_id)?.name, "wooden crate");

    let light = context.load("Maps/Forest:Light", Prop::CLASS_NAME)?;
    let lamp = context
        .database()
        .object::<Lamp>(light)
        .context("lamp body")?;
    assert_eq!(lamp.intensity, 2.5);
    assert_eq!(lamp.switch.get(), Some(tree));
    assert!(lamp.lit, "constructed hook should run after linking");

    let forest = context.database().get("Maps/Forest").context("package")?;
    let flags = context.database().flags(forest);
    assert!(flags.contains(ObjectFlags::PACKAGE_LOADED));
    assert!(!flags.contains(ObjectFlags::PACKAGE_LOAD_PENDING));
    assert!(!context.is_dirty(forest));

    let loader = context.catalog().loader("Maps/Forest").context("loader")?;
    assert_eq!(loader.custom_versions().get(Lamp::CLASS_NAME), Some(&1));
    Ok(())
}

#[test]
fn test_resave_of_unchanged_package_is_byte_identical() -> Result<()> {
    let dir = tempdir()?;
    write_sample_content(dir.path())?;
    let file = dir.path().join("Maps").join("Forest.kpkg");
    let original = std::fs::read(&file)?;

    let mut context = context(dir.path());
    let tree = context.load("Maps/Forest:Tree", Prop::CLASS_NAME)?;
    context.save(tree)?;

    assert_eq!(std::fs::read(&file)?, original);
    Ok(())
}

#[test]
fn test_saving_an_unloaded_package_loads_it_first() -> Result<()> {
    let dir = tempdir()?;
    write_sample_content(dir.path())?;
    let file = dir.path().join("Props.kpkg");
    let original = std::fs::read(&file)?;

    let mut context = context(dir.path());
    let props = context.database().get("Props").context("package shell")?;
    assert!(context.database().children(props).is_empty());

    context.save(props)?;

    assert_eq!(std::fs::read(&file)?, original);
    assert!(context.database().get("Props:Crate").is_some());
    Ok(())
}

#[test]
fn test_save_replaces_the_file_in_one_step() -> Result<()> {
    let dir = tempdir()?;
    let mut context = context(dir.path());
    let level = context.create_package("Level", dir.path())?;
    let a = add_prop(&mut context, "A", level, 1)?;
    let file = context.save(level)?;

    prop_mut(&mut context, a)?.health = 2;
    assert_eq!(context.save(level)?, file);
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());

    let mut reader = common::context(dir.path());
    reader.load_package("Level")?;
    let a = reader.database().get("Level:A").context("A")?;
    assert_eq!(prop(&reader, a)?.health, 2);

    // A file that cannot be replaced fails the save and leaves no temp file.
    let blocked = context.create_package("Blocked", dir.path())?;
    let target = dir.path().join("Blocked.kpkg");
    std::fs::create_dir(&target)?;
    std::fs::write(target.join("keep"), b"keep")?;
    assert!(matches!(context.save(blocked), Err(PackageError::Io { .. })));
    assert!(target.join("keep").exists());
    assert!(!dir.path().join(".Blocked.kpkg.tmp").exists());
    Ok(())
}

#[test]
fn test_dependency_cycle_between_packages() -> Result<()> {
    // --- 1. Setup: Alpha:Gate -> Beta:Key -> Alpha:Gate ---
    let dir = tempdir()?;
    {
        let mut writer = context(dir.path());
        let alpha = writer.create_package("Alpha", dir.path())?;
        let beta = writer.create_package("Beta", dir.path())?;
        let gate = add_prop(&mut writer, "Gate", alpha, 1)?;
        let key = add_prop(&mut writer, "Key", beta, 2)?;
        prop_mut(&mut writer, gate)?.target = key.into();
        prop_mut(&mut writer, key)?.target = gate.into();
        writer.save(alpha)?;
        writer.save(beta)?;
    }

    // --- 2. Loading one side loads the other exactly once ---
    let mut context = context(dir.path());
    context.events().drain();
    let gate = context.load("Alpha:Gate", Prop::CLASS_NAME)?;
    let key = context.database().get("Beta:Key").context("key")?;

    assert_eq!(prop(&context, gate)?.target.get(), Some(key));
    assert_eq!(prop(&context, key)?.target.get(), Some(gate));
    assert_eq!(prop(&context, key)?.health, 2);
    assert_eq!(
        context.events().drain(),
        vec![
            PackageEvent::Loaded("Beta".into()),
            PackageEvent::Loaded("Alpha".into())
        ]
    );
    for package in ["Alpha", "Beta"] {
        let loader = context.catalog().loader(package).context("loader")?;
        assert!(loader.is_loaded(context.database()));
    }
    Ok(())
}

#[test]
fn test_transient_objects_are_not_persisted() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut writer = context(dir.path());
        let level = writer.create_package("Level", dir.path())?;
        let cache = add_prop(&mut writer, "Cache", level, 99)?;
        writer.database_mut().set_flags(cache, ObjectFlags::TRANSIENT);
        let entry = add_prop(&mut writer, "Entry", cache, 98)?;
        let holder = add_prop(&mut writer, "Holder", level, 1)?;
        prop_mut(&mut writer, holder)?.target = entry.into();
        prop_mut(&mut writer, holder)?.links = vec![cache.into(), holder.into()];
        writer.save(level)?;
    }

    let mut context = context(dir.path());
    let holder = context.load("Level:Holder", Prop::CLASS_NAME)?;

    let body = prop(&context, holder)?;
    assert!(body.target.is_null());
    assert!(body.links[0].is_null());
    assert_eq!(body.links[1].get(), Some(holder));
    assert!(context.database().get("Level:Cache").is_none());
    assert!(context.database().get("Level:Cache/Entry").is_none());

    let loader = context.catalog().loader("Level").context("loader")?;
    let cache_record = &loader.contained_objects()[0];
    assert_eq!(cache_record.object_path, "Cache");
    assert_eq!(cache_record.stream_size, 0);
    Ok(())
}

#[test]
fn test_truncated_file_loads_remaining_objects() -> Result<()> {
    // --- 1. Setup: three objects, then cut into the last body ---
    let dir = tempdir()?;
    {
        let mut writer = context(dir.path());
        let level = writer.create_package("Level", dir.path())?;
        let a = add_prop(&mut writer, "A", level, 1)?;
        let b = add_prop(&mut writer, "B", level, 2)?;
        add_prop(&mut writer, "C", level, 3)?;
        prop_mut(&mut writer, a)?.target = b.into();
        writer.save(level)?;
    }
    let file = dir.path().join("Level.kpkg");
    let bytes = std::fs::read(&file)?;
    std::fs::write(&file, &bytes[..bytes.len() - 4])?;

    // --- 2. Load reports the damaged object and keeps the rest ---
    let mut context = context(dir.path());
    let status = context.load_package("Level")?;

    assert!(!status.is_success());
    assert!(matches!(
        status.warnings(),
        [PackageWarning::ObjectReadFailed { object_path, .. }] if object_path == "C"
    ));
    let a = context.database().get("Level:A").context("A")?;
    let b = context.database().get("Level:B").context("B")?;
    assert_eq!(prop(&context, a)?.target.get(), Some(b));
    assert_eq!(prop(&context, b)?.health, 2);
    assert!(context.database().get("Level:C").is_some());
    Ok(())
}

#[test]
fn test_corrupted_list_length_fails_only_that_object() -> Result<()> {
    // --- 1. Setup: the last body ends with an empty link list ---
    let dir = tempdir()?;
    {
        let mut writer = context(dir.path());
        let level = writer.create_package("Level", dir.path())?;
        add_prop(&mut writer, "A", level, 1)?;
        add_prop(&mut writer, "B", level, 2)?;
        writer.save(level)?;
    }
    let file = dir.path().join("Level.kpkg");
    let mut bytes = std::fs::read(&file)?;
    let len_at = bytes.len() - 8;
    bytes[len_at..].copy_from_slice(&0x00FF_FFFF_FFFF_FFFFu64.to_le_bytes());
    std::fs::write(&file, &bytes)?;

    // --- 2. The huge length is rejected as a read failure ---
    let mut context = context(dir.path());
    let status = context.load_package("Level")?;

    assert!(matches!(
        status.warnings(),
        [PackageWarning::ObjectReadFailed { object_path, .. }] if object_path == "B"
    ));
    let a = context.database().get("Level:A").context("A")?;
    assert_eq!(prop(&context, a)?.health, 1);
    assert!(context.database().get("Level:B").is_some());
    Ok(())
}

#[test]
fn test_unsupported_format_version_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let header = PackageHeader {
        format_version: 42,
        ..Default::default()
    };
    let mut stream = MemoryStream::new();
    header.write(&mut stream)?;
    let file = dir.path().join("Future.kpkg");
    std::fs::write(&file, stream.bytes())?;

    let result = PackageLoader::prepare("Future", dir.path(), &file);
    assert!(matches!(
        result,
        Err(PackageError::UnsupportedVersion { found: 42, .. })
    ));

    // The scan skips the file instead of failing.
    let context = context(dir.path());
    assert!(!context.catalog().contains_package("Future"));
    Ok(())
}

#[test]
fn test_in_memory_round_trip_replaces_live_objects() -> Result<()> {
    let dir = tempdir()?;
    write_sample_content(dir.path())?;
    let mut context = context(dir.path());
    let crate_id = context.load("Props:Crate", Prop::CLASS_NAME)?;
    let bytes = context.save_to_bytes(crate_id)?;

    prop_mut(&mut context, crate_id)?.health = 0;
    let status = context.load_from_bytes("Props", bytes)?;

    assert!(status.is_success());
    assert!(!context.database().is_valid(crate_id));
    let reloaded = context.database().get("Props:Crate").context("crate")?;
    assert_eq!(prop(&context, reloaded)?.health, 50);
    Ok(())
}
