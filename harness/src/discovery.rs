//! Finding fixture files.
//!
//! Fixtures are every file under the fixture directory whose name ends with the fixture suffix,
//! searched recursively and returned sorted by path so runs are reproducible.  Symlinked
//! directories aren't followed, so a link back up the tree can't make a fixture appear twice.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Everything found under a fixture directory
#[derive(Debug, Default)]
pub struct Discovered {
    /// Sorted by path
    pub fixtures: Vec<PathBuf>,
    /// Directories (or directory entries) which couldn't be read.  Any fixtures inside them are
    /// missing from `fixtures`.
    pub errors: Vec<DiscoveryError>,
}

#[derive(Debug, thiserror::Error)]
#[error("can't search {} for fixtures: {1}", .0.display())]
pub struct DiscoveryError(pub PathBuf, #[source] pub io::Error);

/// Discover every fixture under `root`.  Only an unreadable `root` is an error; problems further
/// down are collected in [`Discovered::errors`].
pub fn discover_fixtures(root: &Path, suffix: &str) -> io::Result<Discovered> {
    let entries = fs::read_dir(root)?;
    let mut found = Discovered::default();
    discover_recursive(root, entries, suffix, &mut found);
    found.fixtures.sort();
    Ok(found)
}

fn discover_recursive(dir: &Path, entries: fs::ReadDir, suffix: &str, found: &mut Discovered) {
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                found.errors.push(DiscoveryError(dir.to_owned(), e));
                continue;
            }
        };
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if name.starts_with('.') {
            continue;
        }
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                found.errors.push(DiscoveryError(path, e));
                continue;
            }
        };

        if file_type.is_dir() {
            if matches!(name, "target" | "node_modules") {
                continue;
            }
            match fs::read_dir(&path) {
                Ok(sub_entries) => discover_recursive(&path, sub_entries, suffix, found),
                Err(e) => found.errors.push(DiscoveryError(path, e)),
            }
        } else if file_type.is_symlink() && path.is_dir() {
            log::debug!("Not following symlinked directory {}", path.display());
        } else if name.ends_with(suffix) {
            found.fixtures.push(path);
        }
    }
}
