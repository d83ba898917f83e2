//! Packing namespace directories into one zip archive.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::{InstallError, InstallResult};

/// File extensions kept in a pack. Files without an extension are kept too.
pub const PACKED_EXTENSIONS: &[&str] = &[
    "toml", "rs", "py", "yml", "yaml", "json", "txt", "md", "jpg", "png", "gif", "ipynb",
];

/// Write every source directory into a single deflate zip at
/// `destination`, each under its own directory name.
///
/// Hidden files, hidden directories and `__`-prefixed directories are
/// skipped, as are files whose extension is not in [`PACKED_EXTENSIONS`].
/// Returns the archived files per namespace directory name.
///
/// # Errors
///
/// Returns [`InstallError::NotADirectory`] for a source that is not a
/// directory, [`InstallError::DuplicateSource`] when two sources share a
/// directory name, and I/O, walk or archive errors.
pub fn pack<P: AsRef<Path>>(
    sources: &[P],
    destination: &Path,
) -> InstallResult<BTreeMap<String, Vec<PathBuf>>> {
    let mut packed: BTreeMap<String, (PathBuf, Vec<PathBuf>)> = BTreeMap::new();
    for source in sources {
        let root = std::path::absolute(source.as_ref())?;
        if !root.is_dir() {
            return Err(InstallError::NotADirectory { path: root });
        }
        let name = namespace_dir(&root);
        if let Some((first, _)) = packed.get(&name) {
            return Err(InstallError::DuplicateSource {
                name,
                first: first.clone(),
                second: root,
            });
        }
        let files = collect_files(&root)?;
        packed.insert(name, (root, files));
    }

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = zip::ZipWriter::new(BufWriter::new(File::create(destination)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut listing = BTreeMap::new();
    for (namespace, (root, files)) in packed {
        for file in &files {
            let relative = file.strip_prefix(&root).unwrap_or(file);
            let name = archive_name(&namespace, relative);
            debug!(file = %file.display(), member = %name, "packing file");
            writer.start_file(name, options)?;
            let mut input = File::open(file)?;
            std::io::copy(&mut input, &mut writer)?;
        }
        listing.insert(namespace, files);
    }
    writer.finish()?.flush()?;

    info!(
        destination = %destination.display(),
        namespaces = listing.len(),
        files = listing.values().map(Vec::len).sum::<usize>(),
        "packed namespaces"
    );
    Ok(listing)
}

fn collect_files(root: &Path) -> InstallResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_type().is_dir() || !is_skipped_dir(e));
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && is_packed_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name.starts_with("__")
}

fn is_packed_file(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    if name.starts_with('.') {
        return false;
    }
    match path.extension() {
        None => true,
        Some(ext) => PACKED_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed)),
    }
}

fn namespace_dir(root: &Path) -> String {
    root.components()
        .next_back()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `namespace/relative/path` with `/` separators on every platform.
fn archive_name(namespace: &str, relative: &Path) -> String {
    let mut name = namespace.to_owned();
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_filter_follows_extension_list() {
        assert!(is_packed_file(Path::new("ns/ops.toml")));
        assert!(is_packed_file(Path::new("ns/LICENSE")));
        assert!(is_packed_file(Path::new("ns/notes.MD")));
        assert!(!is_packed_file(Path::new("ns/.hidden.toml")));
        assert!(!is_packed_file(Path::new("ns/model.bin")));
    }

    #[test]
    fn archive_names_use_forward_slashes() {
        assert_eq!(
            archive_name("vision", Path::new("sub").join("ops.toml").as_path()),
            "vision/sub/ops.toml"
        );
    }
}
