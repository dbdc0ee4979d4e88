//! Suite discovery
//!
//! A suite is an immediate subdirectory of the test root. Selection is a plain,
//! case-sensitive substring match on the directory name, so `task-0.1` also
//! selects `task-0.10`.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// A discovered suite directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteDescriptor {
    /// Directory name
    pub name: String,

    /// Path of the directory, relative when the root is relative
    pub path: PathBuf,
}

impl SuiteDescriptor {
    fn new(root: &Path, name: String) -> Self {
        let path = root.join(&name);
        Self { name, path }
    }

    /// Name of the cargo test target for this suite.
    ///
    /// Cargo target names may only hold ASCII alphanumerics, `-` and `_`, so
    /// every other character becomes `_`: `tests/task-0.1/main.rs` is
    /// registered as `[[test]] name = "task-0_1"`.
    pub fn target_name(&self) -> String {
        self.name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl std::fmt::Display for SuiteDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Return the subdirectories of `root` whose name contains `filter`.
///
/// Order is the directory's enumeration order. An empty filter selects every
/// subdirectory. Files and symlinks are never suites.
pub fn discover(root: &Path, filter: &str) -> E2eResult<Vec<SuiteDescriptor>> {
    let entries = std::fs::read_dir(root).map_err(|source| E2eError::Discovery {
        root: root.to_path_buf(),
        source,
    })?;

    let mut suites = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| E2eError::Discovery {
            root: root.to_path_buf(),
            source,
        })?;

        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if name.contains(filter) {
            suites.push(SuiteDescriptor::new(root, name));
        }
    }

    debug!(
        "Discovered {} suite(s) in {} for {:?}",
        suites.len(),
        root.display(),
        filter
    );
    Ok(suites)
}

/// Every suite under `root`, or an empty list when the root is unreadable
pub fn discover_all(root: &Path) -> Vec<SuiteDescriptor> {
    discover(root, "").unwrap_or_default()
}
