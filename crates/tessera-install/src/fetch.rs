//! Fetching sources into the install root.
//!
//! Zip archives are streamed into a `.cache` file inside the install root
//! and extracted next to it; the cache file is removed whatever happens.
//! Git remotes are cloned with a hardened `git` environment.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, info};
use url::Url;

use crate::error::FetchError;
use crate::source::RemoteSource;

/// Maximum archive download size (200 MB).
const MAX_DOWNLOAD_SIZE: u64 = 200 * 1024 * 1024;

/// Maximum number of members in an archive.
const MAX_ENTRY_COUNT: u64 = 10_000;

/// Maximum total extracted size (500 MB).
const MAX_EXTRACTED_SIZE: u64 = 500_000_000;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const CHUNK_SIZE: usize = 64 * 1024;

/// Download progress, reported after every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Bytes received so far.
    pub downloaded: u64,
    /// Total size, when the server announced it.
    pub total: Option<u64>,
}

impl Progress {
    /// Completed fraction in `0.0..=1.0`, if the total is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> Option<f64> {
        self.total
            .filter(|t| *t > 0)
            .map(|t| (self.downloaded.min(t) as f64) / (t as f64))
    }
}

impl fmt::Display for Progress {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MB: f64 = 1024.0 * 1024.0;
        let done = self.downloaded as f64 / MB;
        match (self.total, self.fraction()) {
            (Some(total), Some(fraction)) => write!(
                f,
                "Fetching...{:.0}%, {done:.2} MB / {:.2} MB",
                fraction * 100.0,
                total as f64 / MB
            ),
            _ => write!(f, "Fetching...{done:.2} MB"),
        }
    }
}

/// Fetch `source` into `root`, returning the top-level directories it
/// produced. [`RemoteSource::Local`] fetches nothing and yields its path.
pub(crate) fn fetch(
    source: &RemoteSource,
    root: &Path,
    progress: &mut dyn FnMut(Progress),
) -> Result<Vec<PathBuf>, FetchError> {
    match source {
        RemoteSource::Zip { url } => fetch_zip(url, root, progress),
        RemoteSource::Git { url, branch } => {
            let name = source.checkout_name().ok_or_else(|| FetchError::Git {
                message: format!("cannot derive a directory name from '{url}'"),
            })?;
            let target = root.join(name);
            clone_git_repo(url, branch.as_deref(), &target)?;
            Ok(vec![target])
        },
        RemoteSource::Local { path } => Ok(vec![path.clone()]),
    }
}

fn fetch_zip(
    url: &Url,
    root: &Path,
    progress: &mut dyn FnMut(Progress),
) -> Result<Vec<PathBuf>, FetchError> {
    if url.scheme() == "file" {
        let path = url.to_file_path().map_err(|()| FetchError::UnsafePath {
            name: url.to_string(),
        })?;
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        progress(Progress {
            downloaded: size,
            total: Some(size),
        });
        return extract_zip(file, root);
    }

    std::fs::create_dir_all(root)?;
    // Removed on drop, on every path out of this function.
    let mut cache = tempfile::Builder::new()
        .suffix(".cache")
        .tempfile_in(root)?;
    debug!(url = %url, cache = %cache.path().display(), "downloading archive");
    download(url, cache.as_file_mut(), progress)?;
    cache.as_file_mut().rewind()?;
    extract_zip(cache.as_file_mut(), root)
}

fn download(url: &Url, out: &mut File, progress: &mut dyn FnMut(Progress)) -> Result<(), FetchError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("tessera-install/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .timeout(DOWNLOAD_TIMEOUT)
        .build()?;
    let mut response = client.get(url.clone()).send()?.error_for_status()?;

    let total = response.content_length();
    if let Some(len) = total
        && len > MAX_DOWNLOAD_SIZE
    {
        return Err(FetchError::TooLarge {
            size: len,
            limit: MAX_DOWNLOAD_SIZE,
        });
    }

    let mut downloaded: u64 = 0;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = response.read(&mut buf)?;
        let Some(chunk) = buf.get(..n).filter(|c| !c.is_empty()) else {
            break;
        };
        out.write_all(chunk)?;
        downloaded = downloaded.saturating_add(u64::try_from(n).unwrap_or(u64::MAX));
        if downloaded > MAX_DOWNLOAD_SIZE {
            return Err(FetchError::TooLarge {
                size: downloaded,
                limit: MAX_DOWNLOAD_SIZE,
            });
        }
        progress(Progress { downloaded, total });
    }
    out.flush()?;
    info!(url = %url, bytes = downloaded, "downloaded archive");
    Ok(())
}

/// Extract every member below a top-level directory into `root`.
///
/// Members at the archive root are skipped. Returns the top-level
/// directories that received at least one member.
pub(crate) fn extract_zip<R: Read + Seek>(reader: R, root: &Path) -> Result<Vec<PathBuf>, FetchError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    if u64::try_from(archive.len()).unwrap_or(u64::MAX) > MAX_ENTRY_COUNT {
        return Err(FetchError::ArchiveLimit {
            what: "entry count",
            limit: MAX_ENTRY_COUNT,
        });
    }
    std::fs::create_dir_all(root)?;

    let mut total_size: u64 = 0;
    let mut namespaces = BTreeSet::new();
    for index in 0..archive.len() {
        let mut member = archive.by_index(index)?;
        let name = member.name().to_owned();
        let Some(relative) = member.enclosed_name() else {
            return Err(FetchError::UnsafePath { name });
        };
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(FetchError::UnsafePath { name });
        }
        let mut components = relative.components();
        let (Some(top), Some(_)) = (components.next(), components.next()) else {
            if member.is_dir() {
                let dir = root.join(&relative);
                std::fs::create_dir_all(&dir)?;
                namespaces.insert(dir);
            } else {
                debug!(member = %name, "skipping file at archive root");
            }
            continue;
        };

        total_size = total_size.saturating_add(member.size());
        if total_size > MAX_EXTRACTED_SIZE {
            return Err(FetchError::ArchiveLimit {
                what: "extracted size",
                limit: MAX_EXTRACTED_SIZE,
            });
        }

        let target = root.join(&relative);
        if member.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            std::io::copy(&mut member, &mut out)?;
        }
        namespaces.insert(root.join(top));
    }

    debug!(root = %root.display(), namespaces = namespaces.len(), "extracted archive");
    Ok(namespaces.into_iter().collect())
}

/// Clone `url` into `target` with `git clone --depth=1`.
fn clone_git_repo(url: &str, branch: Option<&str>, target: &Path) -> Result<(), FetchError> {
    if target.exists() {
        return Err(FetchError::Git {
            message: format!("destination '{}' already exists", target.display()),
        });
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut cmd = Command::new("git");
    // Only PATH and HOME survive; git config from the environment, the
    // system and the user is ignored.
    cmd.env_clear();
    if let Ok(path) = std::env::var("PATH") {
        cmd.env("PATH", path);
    }
    if let Ok(home) = std::env::var("HOME") {
        cmd.env("HOME", home);
    }
    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd.env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes");
    cmd.stdin(Stdio::null());

    cmd.args(["clone", "--depth=1"]);
    if let Some(branch) = branch {
        cmd.args(["--branch", branch]);
    }
    cmd.arg("--").arg(url).arg(target);

    debug!(url, branch = ?branch, target = %target.display(), "cloning repository");
    let output = cmd.output().map_err(|e| FetchError::Git {
        message: format!("failed to run git: {e}"),
    })?;
    if !output.status.success() {
        return Err(FetchError::Git {
            message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    info!(url, target = %target.display(), "cloned repository");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use zip::write::SimpleFileOptions;

    use super::*;

    fn archive(members: &[(&str, &str)]) -> Cursor<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in members {
            if name.ends_with('/') {
                writer.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
        }
        let mut cursor = writer.finish().unwrap();
        cursor.rewind().unwrap();
        cursor
    }

    #[test]
    fn top_level_directories_become_namespaces() {
        let tmp = tempfile::tempdir().unwrap();
        let data = archive(&[
            ("README.md", "root file"),
            ("vision/", ""),
            ("vision/models.toml", "x"),
            ("vision/sub/deep.toml", "y"),
            ("text/ops.toml", "z"),
        ]);

        let dirs = extract_zip(data, tmp.path()).unwrap();
        assert_eq!(dirs, vec![tmp.path().join("text"), tmp.path().join("vision")]);
        assert!(tmp.path().join("vision/sub/deep.toml").is_file());
        assert!(!tmp.path().join("README.md").exists());
    }

    #[test]
    fn escaping_members_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let data = archive(&[("../evil/x.toml", "x")]);
        assert!(matches!(
            extract_zip(data, tmp.path()),
            Err(FetchError::UnsafePath { .. })
        ));
    }

    #[test]
    fn garbage_is_not_an_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let data = Cursor::new(b"not a zip".to_vec());
        assert!(matches!(
            extract_zip(data, tmp.path()),
            Err(FetchError::Archive(_))
        ));
    }

    #[test]
    fn progress_renders_percent_when_total_known() {
        let p = Progress {
            downloaded: 512 * 1024,
            total: Some(1024 * 1024),
        };
        assert_eq!(p.fraction(), Some(0.5));
        assert_eq!(p.to_string(), "Fetching...50%, 0.50 MB / 1.00 MB");

        let p = Progress {
            downloaded: 1024 * 1024,
            total: None,
        };
        assert_eq!(p.fraction(), None);
        assert_eq!(p.to_string(), "Fetching...1.00 MB");
    }
}
