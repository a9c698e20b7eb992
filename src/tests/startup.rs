//! Index checks done before `serve` accepts requests.

use super::{abc_store, StubEncoder};
use crate::config::Config;
use crate::open_store;
use crate::semantic::{check_dimensions, EmbeddingStore, SearchError};

fn config_with_index(dir: &std::path::Path, store: &EmbeddingStore) -> Config {
    let mut config = Config::load_with(dir).unwrap();
    config.index_path = dir.join("index.json").display().to_string();
    store.save(&config.index_path()).unwrap();
    config
}

#[test]
fn test_check_dimensions() {
    let store = abc_store();

    assert!(check_dimensions(&store, &StubEncoder::new().with_dimensions(2)).is_ok());
    // model not loaded yet, nothing to compare against
    assert!(check_dimensions(&store, &StubEncoder::new()).is_ok());
    assert!(check_dimensions(&EmbeddingStore::empty(), &StubEncoder::new().with_dimensions(512)).is_ok());

    match check_dimensions(&store, &StubEncoder::new().with_dimensions(512)) {
        Err(SearchError::IncompatibleIndex {
            encoder,
            encoder_dims,
            index_dims,
        }) => {
            assert_eq!(encoder, "stub");
            assert_eq!(encoder_dims, 512);
            assert_eq!(index_dims, 2);
        }
        other => panic!("expected IncompatibleIndex, got {other:?}"),
    }
}

#[test]
fn test_serve_refuses_incompatible_index() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_with_index(tmp.path(), &abc_store());

    let result = open_store(&config, &StubEncoder::new().with_dimensions(512));

    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("512"));
}

#[test]
fn test_serve_loads_compatible_index() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_with_index(tmp.path(), &abc_store());

    let store = open_store(&config, &StubEncoder::new().with_dimensions(2)).unwrap();

    assert_eq!(store.len(), 3);
}

#[test]
fn test_degraded_start_serves_empty_index() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_with_index(tmp.path(), &abc_store());
    config.degraded_start = true;

    let store = open_store(&config, &StubEncoder::new().with_dimensions(512)).unwrap();
    assert!(store.is_empty());

    std::fs::write(config.index_path(), "[1, 2").unwrap();
    let store = open_store(&config, &StubEncoder::new()).unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_missing_index_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::load_with(tmp.path()).unwrap();

    assert!(open_store(&config, &StubEncoder::new()).is_err());
}
