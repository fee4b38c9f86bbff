use super::profile::{IMAGE_EXTENSIONS, JPEG_XR_EXTENSIONS, VIDEO_EXTENSIONS};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Check if a path has a video file extension
pub fn is_video_file(path: &Path) -> bool {
    has_extension(path, VIDEO_EXTENSIONS)
}

/// Check if a path has a supported image extension
pub fn is_image_file(path: &Path) -> bool {
    has_extension(path, IMAGE_EXTENSIONS)
}

/// JPEG XR inputs need an intermediate decode before conversion
pub fn is_jpeg_xr(path: &Path) -> bool {
    has_extension(path, JPEG_XR_EXTENSIONS)
}

/// Scan a directory recursively, in file-name order, invoking a callback for each match
pub fn scan_streaming<F, P>(root: &Path, accept: P, mut on_file: F) -> Result<()>
where
    F: FnMut(PathBuf),
    P: Fn(&Path) -> bool,
{
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file() && accept(path) {
            on_file(path.to_path_buf());
        }
    }

    Ok(())
}

/// Expand command-line inputs: directories are scanned, files are kept as given.
pub fn collect_inputs<P>(inputs: &[PathBuf], accept: P) -> Result<Vec<PathBuf>>
where
    P: Fn(&Path) -> bool,
{
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            scan_streaming(input, &accept, |path| files.push(path))
                .with_context(|| format!("Failed to scan {}", input.display()))?;
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}
