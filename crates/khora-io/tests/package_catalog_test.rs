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
use common::{classes, context, init_logger, write_sample_content, Lamp, Prop};
use khora_core::object::{ObjectClass, ObjectFlags};
use khora_io::{Package, PackageContext, PackageError, PackageEvent, PackageSettings};
use tempfile::tempdir;

#[test]
fn test_register_content_root_indexes_headers_only() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    write_sample_content(dir.path())?;

    let mut context = PackageContext::new(classes());
    let found = context.register_content_root(dir.path());

    assert_eq!(found, vec!["Maps/Forest", "Props"]);
    assert_eq!(
        context.events().drain(),
        vec![
            PackageEvent::Scanned("Maps/Forest".into()),
            PackageEvent::Scanned("Props".into())
        ]
    );
    assert_eq!(context.catalog().package_paths(), vec!["Maps/Forest", "Props"]);

    // Only load-pending package shells exist so far.
    let forest = context.database().get("Maps/Forest").context("shell")?;
    assert!(context
        .database()
        .flags(forest)
        .contains(ObjectFlags::PACKAGE_LOAD_PENDING));
    assert!(context.database().children(forest).is_empty());
    let light = context
        .catalog()
        .indexed_object("Maps/Forest:Light")
        .context("indexed light")?;
    assert_eq!(light.package_path, "Maps/Forest");
    assert_eq!(light.class_name, Lamp::CLASS_NAME);

    // Registering the same root again only picks up new files.
    assert!(context.register_content_root(dir.path()).is_empty());
    assert_eq!(context.catalog().content_roots().len(), 1);
    Ok(())
}

#[test]
fn test_find_object_by_partial_path_and_class() -> Result<()> {
    let dir = tempdir()?;
    write_sample_content(dir.path())?;
    let context = context(dir.path());

    let find = |name: &str, class: Option<&str>| context.find_object(name, class);
    assert_eq!(find("Maps/Forest:Tree", None).as_deref(), Some("Maps/Forest:Tree"));
    assert_eq!(find("Tree", None).as_deref(), Some("Maps/Forest:Tree"));
    assert_eq!(find("Branch", None).as_deref(), Some("Maps/Forest:Tree/Branch"));
    // An exact class match beats an earlier subclass match.
    assert_eq!(find("Forest", Some(Prop::CLASS_NAME)).as_deref(), Some("Maps/Forest:Tree"));
    assert_eq!(find("Forest", Some(Lamp::CLASS_NAME)).as_deref(), Some("Maps/Forest:Light"));
    assert_eq!(find("Light", Some(Prop::CLASS_NAME)).as_deref(), Some("Maps/Forest:Light"));
    assert_eq!(find("Props", Some(Package::CLASS_NAME)).as_deref(), Some("Props"));
    assert_eq!(find("Crate", Some(Lamp::CLASS_NAME)), None);
    assert_eq!(find("Nowhere", None), None);
    Ok(())
}

#[test]
fn test_missing_package_triggers_one_refresh() -> Result<()> {
    let dir = tempdir()?;
    let mut context = context(dir.path());
    assert!(context.catalog().package_paths().is_empty());

    // Files appear after the root was scanned.
    write_sample_content(dir.path())?;
    let crate_id = context.load("Props:Crate", Prop::CLASS_NAME)?;

    assert!(context.database().is_valid(crate_id));
    let events = context.events().drain();
    assert!(events.contains(&PackageEvent::Scanned("Props".into())));
    assert!(events.contains(&PackageEvent::Loaded("Props".into())));
    Ok(())
}

#[test]
fn test_refresh_on_miss_can_be_disabled() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    let settings = PackageSettings {
        content_roots: vec![dir.path().to_path_buf()],
        refresh_on_miss: false,
        ..Default::default()
    };
    let mut context = PackageContext::with_settings(classes(), settings);
    write_sample_content(dir.path())?;

    assert!(matches!(
        context.load("Props:Crate", Prop::CLASS_NAME),
        Err(PackageError::NotFound(_))
    ));

    let mut found = context.refresh_packages();
    found.sort();
    assert_eq!(found, vec!["Maps/Forest", "Props"]);
    assert!(context.load("Props:Crate", Prop::CLASS_NAME).is_ok());
    Ok(())
}

#[test]
fn test_bare_object_names_are_found_in_the_index() -> Result<()> {
    // --- 1. Indexed content ---
    let dir = tempdir()?;
    write_sample_content(dir.path())?;
    let mut context = context(dir.path());

    let crate_id = context.load("Crate", Prop::CLASS_NAME)?;
    assert_eq!(context.database().full_path(crate_id), Some("Props:Crate"));
    let branch = context
        .get_or_load("Branch", Prop::CLASS_NAME)
        .context("branch")?;
    assert_eq!(context.database().full_path(branch), Some("Maps/Forest:Tree/Branch"));
    assert_eq!(context.get_or_load("Crate", Lamp::CLASS_NAME), None);
    assert!(matches!(
        context.load("Nowhere", Prop::CLASS_NAME),
        Err(PackageError::NotFound(_))
    ));

    // --- 2. Files written after the scan are found by one refresh ---
    let late = tempdir()?;
    let mut context = common::context(late.path());
    write_sample_content(late.path())?;

    let crate_id = context.load("Crate", Prop::CLASS_NAME)?;
    assert_eq!(context.database().full_path(crate_id), Some("Props:Crate"));
    assert!(context
        .events()
        .drain()
        .contains(&PackageEvent::Scanned("Props".into())));
    Ok(())
}

#[test]
fn test_get_or_load_checks_class() -> Result<()> {
    let dir = tempdir()?;
    write_sample_content(dir.path())?;
    let mut context = context(dir.path());

    assert_eq!(context.get_or_load("Maps/Forest:Tree", Lamp::CLASS_NAME), None);
    // The package was loaded anyway; the object is there under its real class.
    let tree = context
        .get_or_load("Maps/Forest:Tree", Prop::CLASS_NAME)
        .context("tree")?;
    assert_eq!(context.database().class_name(tree), Some(Prop::CLASS_NAME));
    assert!(context.get_or_load("Maps/Forest:Light", Prop::CLASS_NAME).is_some());
    assert_eq!(context.get_or_load("Maps/Forest:Nothing", Prop::CLASS_NAME), None);
    assert_eq!(context.get_or_load("Missing:Thing", Prop::CLASS_NAME), None);
    Ok(())
}

#[test]
fn test_unregister_content_root_destroys_its_packages() -> Result<()> {
    let dir = tempdir()?;
    write_sample_content(dir.path())?;
    let mut context = context(dir.path());
    context.load("Maps/Forest:Tree", Prop::CLASS_NAME)?;
    context.events().drain();

    let mut removed = context.unregister_content_root(dir.path());
    removed.sort();

    assert_eq!(removed, vec!["Maps/Forest", "Props"]);
    assert!(context.catalog().package_paths().is_empty());
    assert!(context.catalog().content_roots().is_empty());
    assert!(context.database().get("Maps/Forest").is_none());
    assert!(context.database().get("Props:Crate").is_none());
    assert_eq!(context.find_object("Tree", None), None);
    assert_eq!(context.events().drain().len(), 2);
    Ok(())
}

#[test]
fn test_destroying_objects_updates_the_catalog() -> Result<()> {
    let dir = tempdir()?;
    write_sample_content(dir.path())?;
    let mut context = context(dir.path());
    let tree = context.load("Maps/Forest:Tree", Prop::CLASS_NAME)?;
    let forest = context.database().get("Maps/Forest").context("package")?;
    context.events().drain();

    // --- 1. Deleting a contained object unloads its package ---
    assert!(context.destroy_object(tree));
    assert!(!context.database().is_valid(tree));
    assert!(context.database().children(forest).is_empty());
    assert!(context
        .database()
        .flags(forest)
        .contains(ObjectFlags::PACKAGE_LOAD_PENDING));
    assert_eq!(
        context.events().drain(),
        vec![PackageEvent::Unloaded("Maps/Forest".into())]
    );

    // It can be loaded again on demand.
    let reloaded = context
        .get_or_load("Maps/Forest:Tree", Prop::CLASS_NAME)
        .context("reloaded tree")?;
    assert_ne!(reloaded, tree);

    // --- 2. Deleting the package drops it from the catalog ---
    assert!(context.destroy_object(forest));
    assert!(!context.catalog().contains_package("Maps/Forest"));
    assert!(context.database().get("Maps/Forest:Tree").is_none());
    assert!(context.catalog().contains_package("Props"));
    assert!(!context.destroy_object(forest));
    Ok(())
}

#[test]
fn test_unload_package_keeps_it_indexed() -> Result<()> {
    let dir = tempdir()?;
    write_sample_content(dir.path())?;
    let mut context = context(dir.path());
    let crate_id = context.load("Props:Crate", Prop::CLASS_NAME)?;

    assert!(context.unload_package("Props"));
    assert!(!context.database().is_valid(crate_id));
    assert!(context.catalog().contains_package("Props"));
    assert!(!context.unload_package("Unknown"));

    assert!(context.load("Props:Crate", Prop::CLASS_NAME).is_ok());
    Ok(())
}

#[test]
fn test_dirty_state_and_save_targets() -> Result<()> {
    let dir = tempdir()?;
    write_sample_content(dir.path())?;
    let mut context = context(dir.path());
    let crate_id = context.load("Props:Crate", Prop::CLASS_NAME)?;
    assert!(!context.is_dirty(crate_id));

    assert!(context.mark_dirty(crate_id));
    assert!(context.is_dirty(crate_id));

    context.events().drain();
    let file = context.save(crate_id)?;
    assert_eq!(file, dir.path().join("Props.kpkg"));
    assert!(!context.is_dirty(crate_id));
    assert_eq!(
        context.events().drain(),
        vec![PackageEvent::Saved("Props".into())]
    );

    // A root that is not a package has nothing to save into.
    let loose = context
        .database_mut()
        .create::<Prop>("Loose", None, ObjectFlags::EMPTY)?;
    assert!(!context.mark_dirty(loose));
    assert!(matches!(
        context.save(loose),
        Err(PackageError::InvalidSaveTarget(_))
    ));
    Ok(())
}

#[test]
fn test_create_package_sanitizes_names() -> Result<()> {
    let dir = tempdir()?;
    let mut context = context(dir.path());

    let level = context.create_package("//Ma ps/Lev-el", dir.path())?;
    assert_eq!(context.database().full_path(level), Some("Maps/Level"));
    assert!(context.is_dirty(level));
    assert_eq!(context.create_package("Maps/Level", dir.path())?, level);

    let file = context.save(level)?;
    assert_eq!(file, dir.path().join("Maps").join("Level.kpkg"));
    assert!(context.catalog().contains_package("Maps/Level"));
    Ok(())
}

#[test]
fn test_settings_file_configures_the_context() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    let content = dir.path().join("content");
    let settings = PackageSettings {
        extension: "pak".into(),
        content_roots: vec![content.clone()],
        ..Default::default()
    };
    let settings_path = dir.path().join("packages.ron");
    std::fs::write(&settings_path, settings.to_ron()?)?;

    // --- 1. A writer using the custom extension ---
    let loaded = PackageSettings::load(&settings_path)?;
    assert_eq!(loaded, settings);
    let mut writer = PackageContext::with_settings(classes(), loaded.clone());
    let level = writer.create_package("Level", &content)?;
    let file = writer.save(level)?;
    assert_eq!(file, content.join("Level.pak"));

    // --- 2. Only contexts looking for `.pak` files see it ---
    let reader = PackageContext::with_settings(classes(), loaded);
    assert!(reader.catalog().contains_package("Level"));
    let default = context(&content);
    assert!(!default.catalog().contains_package("Level"));
    Ok(())
}

#[test]
fn test_silent_context_queues_no_events() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    write_sample_content(dir.path())?;
    let settings = PackageSettings {
        content_roots: vec![dir.path().to_path_buf()],
        publish_events: false,
        ..Default::default()
    };
    let mut context = PackageContext::with_settings(classes(), settings);

    let crate_id = context.load("Props:Crate", Prop::CLASS_NAME)?;
    context.mark_dirty(crate_id);
    context.save(crate_id)?;
    context.unload_package("Props");

    assert_eq!(context.events().pending(), 0);
    Ok(())
}
