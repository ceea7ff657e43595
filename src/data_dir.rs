//! On-disk layout of an archindex installation.
//!
//! ```text
//! <root>/
//!   config.redb    settings
//!   objects.redb   file content fetched for metadata extraction
//!   index/         tantivy document store
//! ```

use std::{
    ffi::OsStr,
    fmt,
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Environment variable overriding the default location.
pub const ENV_VAR: &str = "ARCHINDEX_DATA_DIR";

const CONFIG_DB: &str = "config.redb";
const OBJECTS_DB: &str = "objects.redb";
const INDEX_DIR: &str = "index";

/// Where the data directory location came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Flag,
    Env,
    Xdg,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Flag => "--data-dir",
            Source::Env => ENV_VAR,
            Source::Xdg => "xdg",
        })
    }
}

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
    source: Source,
}

impl DataDir {
    /// Resolve and create the data directory.
    ///
    /// `--data-dir` wins over [`ENV_VAR`], which wins over
    /// `$XDG_DATA_HOME/archindex`. An empty variable counts as unset.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let env = std::env::var_os(ENV_VAR);
        let (root, source) = locate(explicit, env.as_deref())?;
        ensure_dir(&root)?;
        Ok(Self { root, source })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn config_db(&self) -> PathBuf {
        self.root.join(CONFIG_DB)
    }

    pub fn objects_db(&self) -> PathBuf {
        self.root.join(OBJECTS_DB)
    }

    pub fn index_dir(&self) -> Result<PathBuf> {
        let path = self.root.join(INDEX_DIR);
        ensure_dir(&path)?;
        Ok(path)
    }
}

fn locate(explicit: Option<&Path>, env: Option<&OsStr>) -> Result<(PathBuf, Source)> {
    if let Some(path) = explicit {
        return Ok((path.to_path_buf(), Source::Flag));
    }
    if let Some(value) = env.filter(|v| !v.is_empty()) {
        return Ok((PathBuf::from(value), Source::Env));
    }
    xdg::BaseDirectories::with_prefix("archindex")
        .get_data_home()
        .map(|home| (home, Source::Xdg))
        .ok_or_else(|| Error::Config("could not determine XDG data home directory".into()))
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|_| Error::DataDir(path.to_path_buf()))
}
