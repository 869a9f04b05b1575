use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

/// Move a finished download into its final place, creating intermediate
/// directories. Falls back to copy + remove when rename crosses devices.
pub fn move_file(from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

/// Sibling name preserving the pre-sync local bytes of a conflicting file:
/// `<stem>_conflict_copy.<ext>`, then `<stem>_conflict_copy (k).<ext>` with
/// k counting from 2 when the name is already taken.
pub fn unique_conflict_path(path: &Utf8Path) -> Utf8PathBuf {
    let parent = path.parent().unwrap_or(Utf8Path::new(""));
    let stem = path.file_stem().unwrap_or(path.as_str());
    let ext = path.extension();

    let mut attempt = 1u32;
    loop {
        let suffix = if attempt == 1 {
            String::new()
        } else {
            format!(" ({attempt})")
        };
        let file_name = match ext {
            Some(ext) => format!("{stem}_conflict_copy{suffix}.{ext}"),
            None => format!("{stem}_conflict_copy{suffix}"),
        };
        let candidate = parent.join(file_name);
        if !candidate.exists() {
            return candidate;
        }
        attempt += 1;
    }
}

/// First non-existing directory among `<path>`, `<path> (2)`, `<path> (3)`, …
/// Used when cloning a project whose name is already taken locally.
pub fn unique_directory(path: &Utf8Path) -> Utf8PathBuf {
    if !path.exists() {
        return path.to_owned();
    }
    let mut attempt = 2u32;
    loop {
        let candidate = Utf8PathBuf::from(format!("{path} ({attempt})"));
        if !candidate.exists() {
            return candidate;
        }
        attempt += 1;
    }
}
