// Tool discovery order and candidate validation

use crate::common::helpers::*;
use mediabatch::engine::CapabilityDetector;
use mediabatch::engine::hardware::ToolSpec;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TOOL: &str = "mediabatch-locate-fixture";

fn spec(name: &'static str, known: Vec<PathBuf>, vendor: Vec<PathBuf>) -> ToolSpec {
    ToolSpec {
        name,
        product: "mediabatch-locate",
        version_args: Some(&["-version"]),
        known_locations: known,
        vendor_dirs: vendor,
        relative_paths: Vec::new(),
    }
}

/// `<root>/glob-a/<TOOL>` plus a vendor install at
/// `<root>/vendor/Mediabatch-Locate-7.1/bin/<TOOL>`
fn layout(root: &Path) -> (PathBuf, PathBuf) {
    let known = root.join("glob-a");
    let vendor_bin = root.join("vendor").join("Mediabatch-Locate-7.1").join("bin");
    std::fs::create_dir_all(&known).unwrap();
    std::fs::create_dir_all(&vendor_bin).unwrap();
    (touch(&known, TOOL), touch(&vendor_bin, TOOL))
}

#[test]
fn test_known_locations_expand_globs_before_vendor_folders() {
    let dir = TempDir::new().unwrap();
    let (known, vendor) = layout(dir.path());
    let runner = ScriptedRunner::new();
    let detector = CapabilityDetector::new(&runner);

    let spec = spec(
        TOOL,
        vec![dir.path().join("glob-*").join(TOOL)],
        vec![dir.path().join("vendor")],
    );
    let found = detector.locate(&spec).unwrap();
    assert_eq!(found.path, known);
    assert_eq!(runner.calls().len(), 1);

    std::fs::remove_file(&known).unwrap();
    let found = detector.locate(&spec).unwrap();
    assert_eq!(found.path, vendor);
}

#[test]
fn test_path_wins_over_known_locations() {
    let dir = TempDir::new().unwrap();
    let (known, _) = layout(dir.path());
    let runner = ScriptedRunner::new();
    let detector = CapabilityDetector::new(&runner);

    // `sh` is always on PATH
    let spec = spec("sh", vec![known.clone()], Vec::new());
    let found = detector.locate(&spec).unwrap();
    assert_ne!(found.path, known);
    assert_eq!(found.path.file_name().unwrap(), "sh");
}

#[test]
fn test_nothing_found() {
    let dir = TempDir::new().unwrap();
    let runner = ScriptedRunner::new();
    let detector = CapabilityDetector::new(&runner);
    let spec = spec(
        TOOL,
        vec![dir.path().join("missing-*").join(TOOL)],
        vec![dir.path().join("no-vendor")],
    );
    assert!(detector.locate(&spec).is_none());
    assert!(!detector.is_available(&spec));
    assert!(runner.calls().is_empty());
}

#[cfg(unix)]
mod real_scripts {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(path: &Path, body: &str) {
        std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_broken_install_is_skipped_for_vendor_install() {
        let dir = TempDir::new().unwrap();
        let (known, vendor) = layout(dir.path());
        script(&known, "echo 'error while loading shared libraries' 1>&2; exit 1");
        script(&vendor, "echo 'mediabatch-locate version 7.1'");

        let detector = CapabilityDetector::system();
        let spec = spec(
            TOOL,
            vec![dir.path().join("glob-*").join(TOOL)],
            vec![dir.path().join("vendor")],
        );
        let found = detector.locate(&spec).unwrap();
        assert_eq!(found.path, vendor);
        assert_eq!(found.version.as_deref(), Some("mediabatch-locate version 7.1"));
    }
}
