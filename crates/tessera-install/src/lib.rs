//! Namespace installation for the Tessera component registry.
//!
//! An [`Installer`] binds namespace roots in the settings store the
//! catalog reads:
//!
//! - [`Installer::install_from_path`] binds a local directory
//! - [`Installer::install_from_url`] fetches a zip archive or git remote
//!   (see [`RemoteSource`]) and binds each top-level directory
//! - [`Installer::uninstall`] removes a binding by name or path
//!
//! [`pack`] produces the zip layout `install_from_url` expects.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
mod fetch;
pub mod install;
pub mod pack;
pub mod source;

pub use error::{DependencyError, FetchError, InstallError, InstallResult, InstallWarning};
pub use fetch::Progress;
pub use install::{CommandInstaller, DependencyInstaller, Installer, is_installable};
pub use pack::{PACKED_EXTENSIONS, pack};
pub use source::{DEFAULT_BRANCH, RemoteSource};
