use std::path::{Path, PathBuf};

/// Suffix appended when the derived output would overwrite its own input.
pub const COLLISION_SUFFIX: &str = "_converted";

/// Derive the output path for an input.
///
/// The pattern supports `{basename}` (input stem), `{filename}` (full input
/// name) and `{ext}` (target extension); the extension is always appended.
/// The output lands in `output_dir` when given, otherwise next to the input.
/// If the result is the input itself, `_converted` is added before the
/// extension so the original is never overwritten.
pub fn derive_output_path(
    input: &Path,
    output_dir: Option<&Path>,
    pattern: &str,
    extension: &str,
) -> PathBuf {
    let dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| match input.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        });

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let original_filename = input
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let extension = extension.trim_start_matches('.');

    let name = pattern
        .replace("{basename}", &stem)
        .replace("{filename}", &original_filename)
        .replace("{ext}", extension);
    let name = if name.trim().is_empty() { stem } else { name };

    let candidate = dir.join(format!("{}.{}", name, extension));
    if same_file(&candidate, input) {
        dir.join(format!("{}{}.{}", name, COLLISION_SUFFIX, extension))
    } else {
        candidate
    }
}

/// Path equality, falling back to comparing canonical parents so `./a.png`
/// and `/abs/dir/a.png` collide. Case-insensitive on Windows.
pub fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (normalize(a), normalize(b)) {
        (Some(x), Some(y)) => {
            if cfg!(windows) {
                x.to_string_lossy().to_lowercase() == y.to_string_lossy().to_lowercase()
            } else {
                x == y
            }
        }
        _ => false,
    }
}

fn normalize(path: &Path) -> Option<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Some(canonical);
    }
    // The output usually does not exist yet; canonicalize its parent instead
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    parent.canonicalize().ok().map(|p| p.join(name))
}

/// Default name for a joined output: `joined-<first stem>.<first ext>`.
pub fn join_output_path(first_input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let extension = first_input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "mp4".to_string());
    derive_output_path(first_input, output_dir, "joined-{basename}", &extension)
}
