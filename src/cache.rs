//! The wpt cache directory `mach` leaves behind, and what to do when it
//! cannot be removed.
use directories_next::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{fs, io};
use tracing::{debug, warn};

use crate::error::CommandError;
use crate::output::Output;

/// Directory removed after every `mach` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WptCache {
    path: PathBuf,
}

impl WptCache {
    /// Cache living at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<home>/.mozbuild/cache/wpt`, or `None` when no home directory is known.
    pub fn user_default() -> Option<Self> {
        BaseDirs::new().map(|dirs| {
            Self::new(
                dirs.home_dir()
                    .join(".mozbuild")
                    .join("cache")
                    .join("wpt"),
            )
        })
    }

    /// Cache location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory and its content if it exists.
    ///
    /// Returns whether something was removed; a missing directory is not an error.
    pub fn clear(&self) -> io::Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&self.path)?;
        debug!("Removed wpt cache {:?}", self.path);
        Ok(true)
    }
}

/// Behaviour when the cache directory cannot be removed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    /// Log at debug level and carry on.
    Ignore,
    /// Log a warning and carry on.
    #[default]
    Warn,
    /// Turn a successful invocation into [`CommandError::Cleanup`].
    Fail,
}

impl std::str::FromStr for CleanupPolicy {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_ref() {
            "ignore" => Ok(CleanupPolicy::Ignore),
            "warn" => Ok(CleanupPolicy::Warn),
            "fail" => Ok(CleanupPolicy::Fail),
            _ => anyhow::bail!("Expect one of ignore, warn or fail (got '{}')", s),
        }
    }
}

impl CleanupPolicy {
    /// Combine the invocation result with the outcome of the cleanup.
    ///
    /// An invocation error always wins over a cleanup error.
    pub fn settle(
        self,
        path: &Path,
        result: Result<Output, CommandError>,
        cleanup: io::Result<bool>,
    ) -> Result<Output, CommandError> {
        let source = match cleanup {
            Ok(_) => return result,
            Err(source) => source,
        };
        match (self, result) {
            (_, Err(e)) => {
                warn!("Unable to remove {:?} after failed command: {}", path, source);
                Err(e)
            }
            (CleanupPolicy::Fail, Ok(_)) => Err(CommandError::Cleanup {
                path: path.to_owned(),
                source,
            }),
            (CleanupPolicy::Warn, ok) => {
                warn!("Unable to remove {:?}: {}", path, source);
                ok
            }
            (CleanupPolicy::Ignore, ok) => {
                debug!("Ignoring failure to remove {:?}: {}", path, source);
                ok
            }
        }
    }
}
