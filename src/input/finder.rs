// SPDX-License-Identifier: Apache-2.0

use glob::glob;
use std::collections::HashSet;
use std::path::PathBuf;

use tracing::warn;

use crate::error::{Error, Result};

/// Expands the configured globs into the current set of files.
#[derive(Debug, Clone)]
pub struct FileFinder {
    globs: Vec<String>,
}

impl FileFinder {
    /// Fails on the first glob with invalid syntax. Globs that match nothing
    /// yet are fine.
    pub fn new(globs: Vec<String>) -> Result<Self> {
        for pattern in &globs {
            glob::Pattern::new(pattern)
                .map_err(|e| Error::InvalidGlob(format!("{}: {}", pattern, e)))?;
        }
        Ok(Self { globs })
    }

    /// Matching files in glob order, directories skipped and duplicates removed.
    /// Paths that cannot be read while expanding are logged and skipped.
    pub fn find_files(&self) -> Result<Vec<PathBuf>> {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();

        for pattern in &self.globs {
            let matches =
                glob(pattern).map_err(|e| Error::InvalidGlob(format!("{}: {}", pattern, e)))?;

            for entry in matches {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(
                            path = ?e.path(),
                            error = %e.error(),
                            "Skipping unreadable path while expanding glob"
                        );
                        continue;
                    }
                };

                if path.is_dir() {
                    continue;
                }

                if seen.insert(path.clone()) {
                    paths.push(path);
                }
            }
        }

        Ok(paths)
    }
}
