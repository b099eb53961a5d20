/*!
 * Integration tests for directory bundling: filtering, entrypoints, manifest
 * and archive layout
 */

use flate2::read::GzDecoder;
use rsconnect::core::checksum::buffer_checksum;
use rsconnect::core::{write_manifest, BundleArchiver, CancelToken, ContentKind};
use rsconnect::deploy::{prepare_bundle, BundleRequest};
use rsconnect::environment::EnvironmentDescriptor;
use rsconnect::RsconnectError;
use rsconnect_core_manifest::{AppMode, Manifest};
use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;

fn python_request(dir: &Path) -> BundleRequest {
    let mut request = BundleRequest::new(dir, ContentKind::Api);
    request.environment = Some(EnvironmentDescriptor::from_requirements_file(dir, "3.11.4"));
    request
}

/// Every entry name in a gzip tar archive, in archive order
fn archive_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
    let file = fs::File::open(path).unwrap();
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            (name, data)
        })
        .collect()
}

#[test]
fn test_python_api_with_virtualenv() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    fs::write(root.join("app.py"), "from flask import Flask\napp = Flask(__name__)\n").unwrap();
    fs::write(root.join("requirements.txt"), "flask\n").unwrap();
    fs::create_dir_all(root.join("venv/bin")).unwrap();
    fs::write(root.join("venv/bin/python"), "#!/bin/sh\n").unwrap();
    fs::create_dir_all(root.join("__pycache__")).unwrap();
    fs::write(root.join("__pycache__/app.cpython-311.pyc"), [0u8; 8]).unwrap();

    let cancel = CancelToken::new();

    // Explicit directory exclusion
    let mut request = python_request(root);
    request.excludes = vec!["venv/".to_string()];
    let built = prepare_bundle(&request, &cancel).unwrap();
    let paths: Vec<&str> = built.manifest.paths().collect();
    assert_eq!(paths, vec!["app.py", "requirements.txt"]);
    assert_eq!(built.manifest.metadata.appmode, AppMode::PythonApi);
    assert_eq!(built.manifest.metadata.entrypoint.as_deref(), Some("app"));

    // Detected without any pattern
    let built = prepare_bundle(&python_request(root), &cancel).unwrap();
    let paths: Vec<&str> = built.manifest.paths().collect();
    assert_eq!(paths, vec!["app.py", "requirements.txt"]);
}

#[test]
fn test_ambiguous_html_entrypoint() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.html"), "<p>a</p>").unwrap();
    fs::write(temp.path().join("b.html"), "<p>b</p>").unwrap();

    let request = BundleRequest::new(temp.path(), ContentKind::Html);
    match prepare_bundle(&request, &CancelToken::new()) {
        Err(RsconnectError::AmbiguousEntrypoint { candidates, .. }) => {
            assert_eq!(candidates, vec!["a.html", "b.html"]);
        }
        other => panic!("expected an ambiguous entrypoint, got {:?}", other),
    }

    // Naming one resolves it
    let mut request = BundleRequest::new(temp.path(), ContentKind::Html);
    request.entrypoint = Some("b.html".to_string());
    let built = prepare_bundle(&request, &CancelToken::new()).unwrap();
    assert_eq!(built.manifest.metadata.primary_html.as_deref(), Some("b.html"));
}

#[test]
fn test_extra_file_overrides_exclude() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join("index.html"), "<p>report</p>").unwrap();
    fs::write(root.join("data.csv"), "a,b\n1,2\n").unwrap();
    fs::write(root.join("other.csv"), "c,d\n").unwrap();

    let mut request = BundleRequest::new(root, ContentKind::Html);
    request.excludes = vec!["*.csv".to_string()];
    request.extra_files = vec!["data.csv".to_string()];

    let built = prepare_bundle(&request, &CancelToken::new()).unwrap();
    let paths: Vec<&str> = built.manifest.paths().collect();
    assert_eq!(paths, vec!["data.csv", "index.html"]);
}

#[test]
fn test_missing_extra_file() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("index.html"), "<p>x</p>").unwrap();

    let mut request = BundleRequest::new(temp.path(), ContentKind::Html);
    request.extra_files = vec!["nope.txt".to_string()];
    assert!(matches!(
        prepare_bundle(&request, &CancelToken::new()),
        Err(RsconnectError::Config(_))
    ));
}

#[test]
fn test_bundle_matches_manifest() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join("app.py"), "app = object()\n").unwrap();
    fs::write(root.join("requirements.txt"), "fastapi\n").unwrap();
    fs::create_dir_all(root.join("static/css")).unwrap();
    fs::write(root.join("static/css/site.css"), "body {}\n").unwrap();

    let cancel = CancelToken::new();
    let built = prepare_bundle(&python_request(root), &cancel).unwrap();
    let staging = TempDir::new().unwrap();
    let bundle = BundleArchiver::new(&cancel)
        .with_staging_dir(staging.path())
        .archive(&built)
        .unwrap();

    let entries = archive_entries(bundle.path());
    assert_eq!(entries[0].0, "manifest.json");

    let manifest: Manifest = serde_json::from_slice(&entries[0].1).unwrap();
    let listed: BTreeSet<&str> = manifest.paths().collect();
    let archived: BTreeSet<&str> = entries[1..].iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(listed, archived);
    assert!(archived.contains("static/css/site.css"));

    // Checksums in the manifest describe the archived bytes
    for (name, data) in &entries[1..] {
        let expected = &manifest.files[name].checksum;
        assert_eq!(&buffer_checksum(data), expected, "{}", name);
    }
}

#[test]
fn test_bundles_are_deterministic() {
    let temp = TempDir::new().unwrap();
    let content = temp.path().join("site");
    fs::create_dir(&content).unwrap();
    fs::write(content.join("index.html"), "<h1>hi</h1>").unwrap();
    fs::write(content.join("style.css"), "h1 {}").unwrap();

    let cancel = CancelToken::new();
    let request = BundleRequest::new(&content, ContentKind::Html);

    let first = BundleArchiver::new(&cancel)
        .with_staging_dir(temp.path())
        .archive(&prepare_bundle(&request, &cancel).unwrap())
        .unwrap();

    // Touching a file changes its mtime but not the bundle
    fs::write(content.join("style.css"), "h1 {}").unwrap();
    let second = BundleArchiver::new(&cancel)
        .with_staging_dir(temp.path())
        .archive(&prepare_bundle(&request, &cancel).unwrap())
        .unwrap();

    assert_eq!(first.sha256(), second.sha256());
    assert_eq!(
        fs::read(first.path()).unwrap(),
        fs::read(second.path()).unwrap()
    );
}

#[test]
fn test_write_manifest_then_bundle_ignores_it() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join("index.html"), "<p>x</p>").unwrap();

    let cancel = CancelToken::new();
    let request = BundleRequest::new(root, ContentKind::Html);
    let built = prepare_bundle(&request, &cancel).unwrap();
    let written = write_manifest(root, &built).unwrap();
    assert_eq!(written, root.join("manifest.json"));

    // The on-disk manifest is not listed as a payload file
    let rebuilt = prepare_bundle(&request, &cancel).unwrap();
    let paths: Vec<&str> = rebuilt.manifest.paths().collect();
    assert_eq!(paths, vec!["index.html"]);

    let on_disk = Manifest::from_json(&fs::read_to_string(&written).unwrap()).unwrap();
    assert!(on_disk.diff(&rebuilt.manifest).is_empty());
}

#[test]
fn test_persisted_bundle() {
    let temp = TempDir::new().unwrap();
    let content = temp.path().join("site");
    fs::create_dir(&content).unwrap();
    fs::write(content.join("index.html"), "<h1>hi</h1>").unwrap();

    let cancel = CancelToken::new();
    let built = prepare_bundle(&BundleRequest::new(&content, ContentKind::Html), &cancel).unwrap();
    let bundle = BundleArchiver::new(&cancel)
        .with_staging_dir(temp.path())
        .archive(&built)
        .unwrap();

    let output = temp.path().join("site.tar.gz");
    let path = bundle.persist(&output).unwrap();
    assert_eq!(path, output);

    let names: Vec<String> = archive_entries(&output).into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["manifest.json", "index.html"]);
}
