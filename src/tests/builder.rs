use std::path::Path;

use super::{StubCaptioner, StubEncoder};
use crate::builder::{build_index, fingerprint_group, read_groups, BuildError};
use crate::semantic::themes::{KEY_THEMES_PREFIX, NO_THEMES_SUMMARY};
use crate::semantic::EmbeddingStore;

fn touch(dir: &Path, names: &[&str]) {
    for name in names {
        std::fs::write(dir.join(name), b"img").unwrap();
    }
}

fn write_metadata(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("metadata.csv");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_groups_in_first_appearance_order() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["a1.png", "b1.png", "a2.png"]);
    let metadata = write_metadata(
        tmp.path(),
        "sref,filename,page,row,col\n\
         222,a1.png,1,0,0\n\
         111,b1.png,1,0,1\n\
         222,a2.png,1,1,0\n",
    );

    let groups = read_groups(&metadata, tmp.path()).unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].code, "222");
    assert_eq!(groups[0].images.len(), 2);
    assert_eq!(groups[0].images[1].filename, "a2.png");
    assert_eq!(groups[1].code, "111");
}

#[test]
fn test_missing_images_and_blank_codes_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["a1.png", "x.png"]);
    let metadata = write_metadata(
        tmp.path(),
        "sref,filename,page,row,col\n\
         222,a1.png,1,0,0\n\
         222,gone.png,1,0,1\n\
         ,x.png,1,1,0\n",
    );

    let groups = read_groups(&metadata, tmp.path()).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].images.len(), 1);
}

#[test]
fn test_fingerprint_is_mean_of_images() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["a1.png", "a2.png"]);
    let metadata = write_metadata(
        tmp.path(),
        "sref,filename,page,row,col,caption\n\
         222,a1.png,1,0,0,a foggy forest at dawn\n\
         222,a2.png,1,0,1,a dark forest in winter\n",
    );
    let encoder = StubEncoder::new()
        .with_image("a1.png", vec![1.0, 0.0])
        .with_image("a2.png", vec![0.0, 1.0]);

    let groups = read_groups(&metadata, tmp.path()).unwrap();
    let entry = fingerprint_group(&encoder, None, &groups[0]).unwrap();

    assert_eq!(entry.embedding, vec![0.5, 0.5]);
    assert_eq!(entry.image_count, 2);
    assert_eq!(entry.thumbnails, vec!["a1.png", "a2.png"]);
    assert_eq!(
        entry.combined_captions,
        "a foggy forest at dawn a dark forest in winter"
    );
    assert!(entry.summary.starts_with(KEY_THEMES_PREFIX));
    assert!(entry.summary.contains("forest (2)"));
}

#[test]
fn test_failed_images_left_out_of_fingerprint() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["a1.png", "broken.png"]);
    let metadata = write_metadata(
        tmp.path(),
        "sref,filename,page,row,col\n\
         222,a1.png,1,0,0\n\
         222,broken.png,1,0,1\n",
    );
    let encoder = StubEncoder::new().with_image("a1.png", vec![0.2, 0.4]);

    let groups = read_groups(&metadata, tmp.path()).unwrap();
    let entry = fingerprint_group(&encoder, None, &groups[0]).unwrap();

    assert_eq!(entry.embedding, vec![0.2, 0.4]);
}

#[test]
fn test_build_and_reload_index() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["a1.png", "b1.png", "c1.png"]);
    let metadata = write_metadata(
        tmp.path(),
        "sref,filename,page,row,col\n\
         111,a1.png,1,0,0\n\
         222,b1.png,1,0,1\n\
         333,c1.png,1,0,2\n",
    );
    // 333 has no decodable image and is dropped
    let encoder = StubEncoder::new()
        .with_image("a1.png", vec![1.0, 0.0])
        .with_image("b1.png", vec![0.0, 1.0]);

    let store = build_index(&encoder, None, &metadata, tmp.path(), false).unwrap();
    assert_eq!(store.len(), 2);
    assert!(!store.contains("333"));

    let index_path = tmp.path().join("index.json");
    store.save(&index_path).unwrap();
    let loaded = EmbeddingStore::load(&index_path).unwrap();

    assert_eq!(loaded.all_entries(), store.all_entries());
    assert_eq!(loaded.get("222").unwrap().thumbnails, vec!["b1.png"]);
}

#[test]
fn test_build_with_nothing_usable() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["a1.png"]);
    let metadata = write_metadata(tmp.path(), "sref,filename,page,row,col\n111,a1.png,1,0,0\n");

    let result = build_index(&StubEncoder::new(), None, &metadata, tmp.path(), false);

    assert!(matches!(result, Err(BuildError::Empty)));
}

#[test]
fn test_missing_metadata_file() {
    let tmp = tempfile::tempdir().unwrap();

    let result = read_groups(&tmp.path().join("nope.csv"), tmp.path());

    assert!(matches!(result, Err(BuildError::Metadata(_))));
}

#[test]
fn test_captioner_fills_summary() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["a1.png", "a2.png", "a3.png"]);
    // ingestion table layout: no caption column
    let metadata = write_metadata(
        tmp.path(),
        "page,sref,filename,row,col,x1,y1,x2,y2\n\
         1,222,a1.png,0,0,0,0,10,10\n\
         1,222,a2.png,0,1,10,0,20,10\n\
         1,222,a3.png,1,0,0,10,10,20\n",
    );
    let encoder = StubEncoder::new()
        .with_image("a1.png", vec![1.0, 0.0])
        .with_image("a2.png", vec![0.0, 1.0]);
    // a3.png has no caption; a2.png is captioned even though it cannot be embedded
    let captioner = StubCaptioner::default()
        .with_caption("a1.png", "a red lighthouse on a cliff")
        .with_caption("a2.png", "a lighthouse under red clouds");

    let groups = read_groups(&metadata, tmp.path()).unwrap();
    let entry = fingerprint_group(&encoder, Some(&captioner), &groups[0]).unwrap();

    assert_eq!(
        entry.combined_captions,
        "a red lighthouse on a cliff a lighthouse under red clouds"
    );
    assert_eq!(entry.summary, "Key themes: red (2), lighthouse (2)");
}

#[test]
fn test_metadata_caption_overrides_captioner() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["a1.png", "a2.png"]);
    let metadata = write_metadata(
        tmp.path(),
        "sref,filename,page,row,col,caption\n\
         222,a1.png,1,0,0,hand checked caption\n\
         222,a2.png,1,0,1,\n",
    );
    let encoder = StubEncoder::new()
        .with_image("a1.png", vec![1.0, 0.0])
        .with_image("a2.png", vec![0.0, 1.0]);
    let captioner = StubCaptioner::default()
        .with_caption("a1.png", "model caption one")
        .with_caption("a2.png", "model caption two");

    let groups = read_groups(&metadata, tmp.path()).unwrap();
    let entry = fingerprint_group(&encoder, Some(&captioner), &groups[0]).unwrap();

    assert_eq!(entry.combined_captions, "hand checked caption model caption two");
}

#[test]
fn test_no_captions_gives_default_summary() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), &["a1.png"]);
    let metadata = write_metadata(tmp.path(), "sref,filename,page,row,col\n222,a1.png,1,0,0\n");
    let encoder = StubEncoder::new().with_image("a1.png", vec![1.0, 0.0]);

    let store = build_index(
        &encoder,
        Some(&StubCaptioner::default()),
        &metadata,
        tmp.path(),
        false,
    )
    .unwrap();

    let entry = store.get("222").unwrap();
    assert_eq!(entry.combined_captions, "");
    assert_eq!(entry.summary, NO_THEMES_SUMMARY);
}
