// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde_json::{json, Value};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use cloudesk_core::application::package_manager::PackageManager;
use cloudesk_core::domain::config::ServerConfig;
use cloudesk_core::domain::mount::MountConfig;
use cloudesk_core::domain::package::{PackageError, PackageScope};
use cloudesk_core::domain::session::{Session, UserProfile};
use cloudesk_core::presentation::app::{build_dispatcher, build_package_manager};

fn alice() -> Session {
    Session::new("test").with_user(UserProfile {
        id: "1".to_string(),
        username: "alice".to_string(),
        name: "Alice".to_string(),
        groups: vec!["users".to_string()],
    })
}

fn manager(root: &Path) -> PackageManager {
    let mut config = ServerConfig::default();
    config.http.dist = root.join("dist");
    config.vfs.mounts.insert(
        "home".to_string(),
        MountConfig::Template(format!("{}/users/%USERNAME%", root.display())),
    );
    std::fs::create_dir_all(root.join("dist")).unwrap();
    std::fs::create_dir_all(root.join("users/alice")).unwrap();
    build_package_manager(&config, Arc::new(build_dispatcher(&config)))
}

fn archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

#[tokio::test]
async fn test_list_merges_tiers_with_system_precedence() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let packages = manager(root);

    std::fs::write(
        root.join("dist/packages.json"),
        json!({"a": {"path": "packages/a", "className": "SystemA"}}).to_string(),
    )
    .unwrap();
    std::fs::create_dir_all(root.join("users/alice/.packages")).unwrap();
    std::fs::write(
        root.join("users/alice/.packages/packages.json"),
        json!({
            "a": {"path": "home:///.packages/a", "className": "UserA"},
            "b": {"path": "home:///.packages/b"}
        })
        .to_string(),
    )
    .unwrap();

    let session = alice();
    let merged = packages.list(&session, None, None).await.unwrap();
    assert_eq!(merged.len(), 2);
    assert_eq!(merged["a"].scope, Some(PackageScope::System));
    assert_eq!(merged["a"].class_name.as_deref(), Some("SystemA"));
    assert_eq!(merged["b"].scope, Some(PackageScope::User));

    let user_only = packages
        .list(&session, Some(PackageScope::User), None)
        .await
        .unwrap();
    assert_eq!(user_only["a"].class_name.as_deref(), Some("UserA"));

    // Search paths that do not exist contribute nothing
    let missing = vec!["home:///nowhere".to_string()];
    let user_only = packages
        .list(&session, Some(PackageScope::User), Some(missing.as_slice()))
        .await
        .unwrap();
    assert!(user_only.is_empty());
}

#[tokio::test]
async fn test_corrupt_archive_leaves_no_destination() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let packages = manager(root);

    let mut data = archive(&[
        ("good.txt", b"fine".as_slice()),
        ("bad.txt", b"CORRUPT-ME-PAYLOAD".as_slice()),
    ]);
    let needle = b"CORRUPT-ME-PAYLOAD";
    let offset = data
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap();
    data[offset] ^= 0xff;
    std::fs::write(root.join("users/alice/broken.zip"), data).unwrap();

    let err = packages
        .install(&alice(), "home:///broken.zip", "home:///.packages/Broken", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, PackageError::InvalidArchive(_)), "{err:?}");
    assert!(!root.join("users/alice/.packages/Broken").exists());
}

#[tokio::test]
async fn test_install_extracts_and_regenerates_manifest() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let packages = manager(root);

    let data = archive(&[
        ("metadata.json", br#"{"className": "Writer", "name": "Writer"}"#.as_slice()),
        ("assets/", b"".as_slice()),
        ("assets/icon.svg", b"<svg/>".as_slice()),
        ("main.js", b"writer();".as_slice()),
    ]);
    std::fs::write(root.join("users/alice/writer.zip"), data).unwrap();

    let session = alice();
    let paths = vec!["home:///.packages".to_string()];
    packages
        .install(&session, "home:///writer.zip", "home:///.packages/Writer", &paths)
        .await
        .unwrap();

    let installed = root.join("users/alice/.packages/Writer");
    assert_eq!(std::fs::read_to_string(installed.join("main.js")).unwrap(), "writer();");
    assert_eq!(
        std::fs::read_to_string(installed.join("assets/icon.svg")).unwrap(),
        "<svg/>"
    );

    let manifest: Value = serde_json::from_slice(
        &std::fs::read(root.join("users/alice/.packages/packages.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["Writer"]["path"], "home:///.packages/Writer");
    assert_eq!(manifest["Writer"]["className"], "Writer");
    assert_eq!(manifest["Writer"]["scope"], "user");

    let again = packages
        .install(&session, "home:///writer.zip", "home:///.packages/Writer", &paths)
        .await
        .unwrap_err();
    assert!(matches!(again, PackageError::AlreadyExists(_)));

    packages
        .uninstall(&session, "home:///.packages/Writer")
        .await
        .unwrap();
    assert!(!installed.exists());
}
