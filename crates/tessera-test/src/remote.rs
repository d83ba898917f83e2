//! Local stand-ins for remote sources: zip archives and git repositories.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use zip::write::SimpleFileOptions;

/// Write a deflate zip at `path` holding `(member name, content)` pairs.
/// Names ending in `/` become directory members.
///
/// # Panics
///
/// Panics on any filesystem or archive error.
pub fn write_zip(path: &Path, members: &[(&str, &str)]) {
    let file = File::create(path).expect("create archive");
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, content) in members {
        if name.ends_with('/') {
            writer.add_directory(*name, options).expect("add directory");
        } else {
            writer.start_file(*name, options).expect("start member");
            writer.write_all(content.as_bytes()).expect("write member");
        }
    }
    writer.finish().expect("finish archive");
}

/// Whether a `git` executable is on `PATH`.
#[must_use]
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

/// Create a git repository at `dir` with one commit holding `files`.
///
/// # Panics
///
/// Panics if any git command fails.
pub fn init_git_repo(dir: &Path, files: &[(&str, &str)]) {
    std::fs::create_dir_all(dir).expect("create repo dir");
    for (name, content) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, content).expect("write repo file");
    }
    for args in [
        &["init", "--quiet"][..],
        &["add", "--all"][..],
        &[
            "-c",
            "user.name=tessera",
            "-c",
            "user.email=tessera@localhost",
            "commit",
            "--quiet",
            "-m",
            "initial",
        ][..],
    ] {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .stdout(Stdio::null())
            .status()
            .expect("run git");
        assert!(status.success(), "git {args:?} failed");
    }
}
