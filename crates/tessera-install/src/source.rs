//! Remote source specifiers.
//!
//! Accepted forms:
//! - `https://host/bundle.zip`: zip archive, one namespace per top-level directory
//! - `https://host/org/repo.git` (also `ssh://`, `file://`, `user@host:path.git`): git remote
//! - `github@org/repo[:branch]`, `gitlab@…`, `bitbucket@…`: hosted git shorthand,
//!   branch defaults to `master`
//! - `file@<path>`: a local `.zip`, a local `.git` repository, or a directory
//!   installed in place

use std::fmt;
use std::path::PathBuf;

use url::Url;

use crate::error::{InstallError, InstallResult};

/// Branch cloned when a shorthand does not name one.
pub const DEFAULT_BRANCH: &str = "master";

const PROVIDERS: [(&str, &str); 3] = [
    ("github@", "https://github.com"),
    ("gitlab@", "https://gitlab.com"),
    ("bitbucket@", "https://bitbucket.org"),
];

const FILE_PREFIX: &str = "file@";

/// A parsed install source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSource {
    /// A zip archive, downloaded over HTTP(S) or read from a `file:` URL.
    Zip {
        /// Archive location.
        url: Url,
    },
    /// A git repository cloned with `git clone`.
    Git {
        /// Clone URL.
        url: String,
        /// Branch to check out, if any.
        branch: Option<String>,
    },
    /// A local directory bound in place.
    Local {
        /// Absolute directory path.
        path: PathBuf,
    },
}

impl RemoteSource {
    /// Parse a source specifier.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::UnsupportedSource`] for an unrecognized form
    /// and [`InstallError::InvalidSource`] when a shorthand component or
    /// branch is malformed.
    pub fn parse(source: &str) -> InstallResult<Self> {
        let source = source.trim();
        for (prefix, host) in PROVIDERS {
            if let Some(rest) = source.strip_prefix(prefix) {
                return parse_hosted(source, rest, host);
            }
        }
        if let Some(path) = source.strip_prefix(FILE_PREFIX) {
            return parse_file(source, path);
        }

        let unsupported = || InstallError::UnsupportedSource {
            url: source.to_owned(),
        };
        if source.starts_with('-') {
            return Err(unsupported());
        }
        let trimmed = source.trim_end_matches('/');
        if has_suffix(trimmed, ".zip") {
            let url = Url::parse(trimmed).map_err(|_| unsupported())?;
            if !matches!(url.scheme(), "http" | "https" | "file") {
                return Err(unsupported());
            }
            return Ok(Self::Zip { url });
        }
        if has_suffix(trimmed, ".git") && is_git_remote(trimmed) {
            return Ok(Self::Git {
                url: trimmed.to_owned(),
                branch: None,
            });
        }
        Err(unsupported())
    }

    /// Directory name a clone of this source gets: the last URL segment
    /// without `.git`.
    #[must_use]
    pub fn checkout_name(&self) -> Option<String> {
        match self {
            Self::Git { url, .. } => {
                let last = url.rsplit(['/', ':']).next()?;
                let name = last.strip_suffix(".git").unwrap_or(last);
                (!name.is_empty()).then(|| name.to_owned())
            },
            Self::Zip { .. } | Self::Local { .. } => None,
        }
    }
}

impl fmt::Display for RemoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zip { url } => write!(f, "{url}"),
            Self::Git {
                url,
                branch: Some(branch),
            } => write!(f, "{url} ({branch})"),
            Self::Git { url, branch: None } => f.write_str(url),
            Self::Local { path } => write!(f, "{}", path.display()),
        }
    }
}

fn parse_hosted(source: &str, rest: &str, host: &str) -> InstallResult<RemoteSource> {
    let (repo_path, branch) = match rest.split_once(':') {
        Some((repo_path, branch)) => (repo_path, branch),
        None => (rest, DEFAULT_BRANCH),
    };
    let Some((org, repo)) = repo_path.split_once('/') else {
        return Err(InstallError::UnsupportedSource {
            url: source.to_owned(),
        });
    };
    validate_component(source, org, "organization")?;
    validate_component(source, repo, "repository")?;
    validate_branch(source, branch)?;

    Ok(RemoteSource::Git {
        url: format!("{host}/{org}/{repo}.git"),
        branch: Some(branch.to_owned()),
    })
}

fn parse_file(source: &str, path: &str) -> InstallResult<RemoteSource> {
    if path.is_empty() {
        return Err(InstallError::UnsupportedSource {
            url: source.to_owned(),
        });
    }
    let path = std::path::absolute(path)?;
    let to_url = |path: &PathBuf| {
        Url::from_file_path(path).map_err(|()| InstallError::InvalidSource {
            url: source.to_owned(),
            label: "path",
            message: "cannot be expressed as a file URL".to_owned(),
        })
    };

    let extension = path.extension().and_then(|e| e.to_str());
    match extension {
        Some(ext) if ext.eq_ignore_ascii_case("zip") => Ok(RemoteSource::Zip { url: to_url(&path)? }),
        Some(ext) if ext.eq_ignore_ascii_case("git") => Ok(RemoteSource::Git {
            url: to_url(&path)?.to_string(),
            branch: None,
        }),
        _ => Ok(RemoteSource::Local { path }),
    }
}

fn has_suffix(s: &str, suffix: &str) -> bool {
    s.len() > suffix.len()
        && s.get(s.len().saturating_sub(suffix.len())..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
}

/// `scheme://…` with a scheme git can clone over, or scp-style `user@host:path`.
fn is_git_remote(url: &str) -> bool {
    if let Ok(parsed) = Url::parse(url)
        && parsed.scheme().len() > 1
    {
        return matches!(parsed.scheme(), "https" | "http" | "ssh" | "git" | "file");
    }
    url.split_once(':')
        .is_some_and(|(host, path)| host.contains('@') && !host.contains('/') && !path.is_empty())
}

/// Org and repo names: alphanumerics plus `-`, `_` and `.`, no leading
/// `.`/`-` and no `..`.
fn validate_component(source: &str, value: &str, label: &'static str) -> InstallResult<()> {
    let invalid = |message: &str| InstallError::InvalidSource {
        url: source.to_owned(),
        label,
        message: message.to_owned(),
    };
    if value.is_empty() || value.len() > 100 {
        return Err(invalid("must be 1-100 characters"));
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
    {
        return Err(invalid("contains invalid characters"));
    }
    if value.starts_with(['.', '-']) || value.ends_with('.') || value.contains("..") {
        return Err(invalid("has an invalid format"));
    }
    Ok(())
}

fn validate_branch(source: &str, branch: &str) -> InstallResult<()> {
    let invalid = |message: &str| InstallError::InvalidSource {
        url: source.to_owned(),
        label: "branch",
        message: message.to_owned(),
    };
    if branch.is_empty() || branch.len() > 256 {
        return Err(invalid("must be 1-256 characters"));
    }
    if !branch
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'/'))
    {
        return Err(invalid("contains invalid characters"));
    }
    if branch.starts_with(['-', '.', '/'])
        || branch.ends_with(['.', '/'])
        || branch.contains("..")
        || branch.contains("//")
        || branch.ends_with(".lock")
    {
        return Err(invalid("has an invalid format"));
    }
    Ok(())
}
