use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use citadel::http::file::{ResolveError, resolve};

const MAX_PATH_LEN: usize = 200;

struct TestRoot {
    path: PathBuf,
}

impl TestRoot {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("citadel-resolve-{}-{}", std::process::id(), name));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.path.join(name);
        fs::write(&path, contents).unwrap();
        path
    }
}

impl Drop for TestRoot {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

#[test]
fn test_resolve_existing_file() {
    let root = TestRoot::new("existing");
    root.write("page.html", b"<p>hi</p>");

    let resolved = resolve(&root.path, "/page.html", "index.html", MAX_PATH_LEN).unwrap();
    assert_eq!(resolved.len, 9);
    assert_eq!(resolved.bytes().unwrap(), b"<p>hi</p>");
    assert!(resolved.path.ends_with("page.html"));
}

#[test]
fn test_resolve_bare_slash_uses_default_document() {
    let root = TestRoot::new("default-doc");
    root.write("index.html", b"welcome");

    let resolved = resolve(&root.path, "/", "index.html", MAX_PATH_LEN).unwrap();
    assert!(resolved.path.ends_with("index.html"));
    assert_eq!(resolved.bytes().unwrap(), b"welcome");
}

#[test]
fn test_resolve_missing_file_is_not_found() {
    let root = TestRoot::new("missing");
    match resolve(&root.path, "/nope.html", "index.html", MAX_PATH_LEN) {
        Err(ResolveError::NotFound) => {}
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[test]
fn test_resolve_non_world_readable_file_is_forbidden() {
    let root = TestRoot::new("forbidden");
    let file = root.write("secret.txt", b"classified");
    fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();

    match resolve(&root.path, "/secret.txt", "index.html", MAX_PATH_LEN) {
        Err(ResolveError::Forbidden) => {}
        other => panic!("expected Forbidden, got {:?}", other),
    }
}

#[test]
fn test_resolve_directory_target_is_malformed() {
    let root = TestRoot::new("directory");
    fs::create_dir(root.path.join("subdir")).unwrap();

    match resolve(&root.path, "/subdir", "index.html", MAX_PATH_LEN) {
        Err(ResolveError::Malformed) => {}
        other => panic!("expected Malformed, got {:?}", other),
    }
}

#[test]
fn test_resolve_rejects_parent_traversal() {
    let root = TestRoot::new("traversal");
    match resolve(&root.path, "/../etc/passwd", "index.html", MAX_PATH_LEN) {
        Err(ResolveError::Malformed) => {}
        other => panic!("expected Malformed, got {:?}", other),
    }
}

#[test]
fn test_resolve_zero_length_file_has_no_mapping() {
    let root = TestRoot::new("empty");
    root.write("empty.html", b"");

    let resolved = resolve(&root.path, "/empty.html", "index.html", MAX_PATH_LEN).unwrap();
    assert_eq!(resolved.len, 0);
    assert!(resolved.bytes().is_none());
}

#[test]
fn test_resolve_overlong_path_is_not_found() {
    let root = TestRoot::new("overlong");
    let target = format!("/{}", "a".repeat(300));
    match resolve(&root.path, &target, "index.html", MAX_PATH_LEN) {
        Err(ResolveError::NotFound) => {}
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[test]
fn test_resolve_nested_path() {
    let root = TestRoot::new("nested");
    fs::create_dir_all(root.path.join("a/b")).unwrap();
    root.write("a/b/c.txt", b"deep");

    let resolved = resolve(&root.path, "/a/b/c.txt", "index.html", MAX_PATH_LEN).unwrap();
    assert_eq!(resolved.bytes().unwrap(), b"deep");
}

#[test]
fn test_mapping_is_released_on_drop() {
    let root = TestRoot::new("release");
    root.write("f.txt", b"payload");

    // Repeated resolution must not accumulate mappings; each drop unmaps.
    for _ in 0..64 {
        let resolved = resolve(&root.path, "/f.txt", "index.html", MAX_PATH_LEN).unwrap();
        assert_eq!(resolved.bytes().unwrap(), b"payload");
    }
}
