//! Shared test utilities for the Tessera component registry.
//!
//! Add to a crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! tessera-test.workspace = true
//! ```
//!
//! and use from integration tests:
//!
//! ```rust,ignore
//! use tessera_test::{TestWorkspace, test_library};
//!
//! let mut ws = TestWorkspace::new();
//! ws.write_unit("vision", "models", tessera_test::ADD_UNIT);
//! let mut catalog = ws.catalog(test_library());
//! assert!(catalog.get("add").is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod remote;
pub mod workspace;

pub use fixtures::*;
pub use remote::*;
pub use workspace::*;
