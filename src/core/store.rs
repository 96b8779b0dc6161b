//! Store abstraction for Rudder's durable client-local state.
//!
//! A store is a `.rudder/` directory holding the governance database and
//! the mutation audit log. Only a whitelisted subset of session state is
//! durable; everything else lives and dies with the session.

use std::path::{Path, PathBuf};

pub const STORE_DIR_NAME: &str = ".rudder";

/// Handle to a Rudder state workspace.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory
    pub root: PathBuf,
}

impl Store {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Store { root: root.into() }
    }

    /// Store rooted at `<dir>/.rudder/`.
    pub fn in_dir(dir: &Path) -> Self {
        Store {
            root: dir.join(STORE_DIR_NAME),
        }
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }
}
