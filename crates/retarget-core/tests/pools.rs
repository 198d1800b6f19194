//! Integration tests for pool hierarchies, providers and dumping

mod common;

use common::{nested_reference, reference, reference_node, submission};
use retarget_core::{
    build_generator_mirror, DirectoryProvider, MemoryProvider, MirrorError, PoolConfig, PoolError,
    UnitPool, UNIT_EXTENSION,
};
use std::sync::Arc;
use tempfile::TempDir;

fn write_units(dir: &TempDir) {
    for unit in [reference(), submission()] {
        let path = dir
            .path()
            .join(format!("{}.{}", unit.name().unwrap(), UNIT_EXTENSION));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, unit.encode()).unwrap();
    }
}

#[test]
fn test_directory_provider_and_dump() {
    let units = TempDir::new().unwrap();
    let dumps = TempDir::new().unwrap();
    write_units(&units);

    let config = PoolConfig {
        dump_dir: Some(dumps.path().to_path_buf()),
        ..PoolConfig::default()
    };
    let pool = UnitPool::with_provider(config, Arc::new(DirectoryProvider::new(units.path())));
    let r = pool.resolve_name("pkg.R").unwrap();
    let s = pool.resolve("pkg/S").unwrap();
    assert!(!r.is_synthesized());

    let mirror = build_generator_mirror(&r, &s, &pool).unwrap();
    let dumped = dumps
        .path()
        .join(format!("{}.{}", mirror.name(), UNIT_EXTENSION));
    assert_eq!(std::fs::read(dumped).unwrap(), mirror.bytes());
}

#[test]
fn test_sessions_isolated_under_shared_parent() {
    let units = TempDir::new().unwrap();
    write_units(&units);
    let shared = Arc::new(UnitPool::with_provider(
        PoolConfig::default(),
        Arc::new(DirectoryProvider::new(units.path())),
    ));

    let first = UnitPool::child_of(shared.clone());
    let second = UnitPool::child_of(shared.clone());
    let r = first.resolve("pkg/R").unwrap();
    let s = first.resolve("pkg/S").unwrap();

    let mirror = build_generator_mirror(&r, &s, &first).unwrap();
    assert!(first.contains(mirror.name()));
    assert!(!second.contains(mirror.name()));
    assert!(!shared.contains(mirror.name()));
    assert!(Arc::ptr_eq(&r, &second.resolve("pkg/R").unwrap()));
}

#[test]
fn test_missing_unit_reported() {
    let units = TempDir::new().unwrap();
    let pool = UnitPool::with_provider(
        PoolConfig::default(),
        Arc::new(DirectoryProvider::new(units.path())),
    );
    assert!(matches!(
        pool.resolve("pkg/Missing"),
        Err(PoolError::BinaryNotFound(name)) if name == "pkg/Missing"
    ));
}

#[test]
fn test_concurrent_mirrors_converge() {
    let units = TempDir::new().unwrap();
    write_units(&units);
    let pool = Arc::new(UnitPool::with_provider(
        PoolConfig::default(),
        Arc::new(DirectoryProvider::new(units.path())),
    ));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = pool.clone();
            std::thread::spawn(move || {
                let r = pool.resolve("pkg/R").unwrap();
                let s = pool.resolve("pkg/S").unwrap();
                build_generator_mirror(&r, &s, &pool).unwrap()
            })
        })
        .collect();
    let mirrors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for mirror in &mirrors[1..] {
        assert!(Arc::ptr_eq(&mirrors[0], mirror));
    }
    assert_eq!(pool.synthesized_bytes().len(), 1);
}

#[test]
fn test_failed_dump_defines_nothing() {
    let dumps = TempDir::new().unwrap();
    let config = PoolConfig {
        dump_dir: Some(dumps.path().to_path_buf()),
        ..PoolConfig::default()
    };
    let mirror_name = config.synthesized_name(&config.generator_prefix, &["pkg/R", "pkg/S"]);
    // The nested mirror is staged after the outer one; block its dump path
    let blocked = dumps
        .path()
        .join(format!("{mirror_name}$Node.{UNIT_EXTENSION}"));
    std::fs::create_dir_all(&blocked).unwrap();

    let provider: MemoryProvider = [nested_reference(), reference_node(), submission()]
        .into_iter()
        .map(|unit| (unit.name().unwrap().to_string(), unit.encode()))
        .collect();
    let pool = UnitPool::with_provider(config, Arc::new(provider));
    let r = pool.resolve("pkg/R").unwrap();
    let s = pool.resolve("pkg/S").unwrap();

    assert!(matches!(
        build_generator_mirror(&r, &s, &pool),
        Err(MirrorError::Pool(PoolError::Io(_)))
    ));
    assert!(pool.synthesized_bytes().is_empty());
    assert!(!pool.contains(&mirror_name));
}
