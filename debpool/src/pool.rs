use crate::{arch::DpkgArch, error::DebPoolError};
use anyhow::Result;
use log::{debug, info, warn};
use std::{
    collections::HashSet,
    fmt, fs,
    path::{Path, PathBuf},
};

/// A package file in the pool, named `{package}_{version}_{package_version}_{arch}.deb`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolEntry<'a> {
    pub package: &'a str,
    pub version: &'a str,
    pub package_version: &'a str,
    pub arch: DpkgArch,
}

impl fmt::Display for PoolEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}.deb",
            self.package, self.version, self.package_version, self.arch,
        )
    }
}

/// The `pool/{component}` directory of a repository.
#[derive(Debug)]
pub struct Pool {
    dir: PathBuf,
}

impl Pool {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Pool { dir }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// # Errors
    ///
    /// Returns a [`DebPoolError::Io`] if the directory cannot be created.
    pub fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| DebPoolError::io("failed to create directory", &self.dir, e).into())
    }

    /// Deletes every file in the pool whose name is not in `keep` and returns the deleted names,
    /// sorted. Subdirectories are not touched.
    ///
    /// # Errors
    ///
    /// Returns a [`DebPoolError::Io`] if the directory cannot be read or a file cannot be removed.
    pub fn remove_files_except(&self, keep: &HashSet<String>) -> Result<Vec<String>> {
        let read_error = |e| DebPoolError::io("failed to read directory", &self.dir, e);

        let mut removed = vec![];
        for entry in fs::read_dir(&self.dir).map_err(read_error)? {
            let entry = entry.map_err(read_error)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if keep.contains(&name) {
                debug!("keeping {name}");
                continue;
            }

            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|e| DebPoolError::io("failed to stat", &path, e))?;
            if file_type.is_dir() {
                warn!(
                    "Leaving directory {} in the pool alone",
                    path.display(),
                );
                continue;
            }

            info!("Removing extra file: {name}");
            fs::remove_file(&path).map_err(|e| DebPoolError::io("failed to remove", &path, e))?;
            removed.push(name);
        }

        removed.sort();
        Ok(removed)
    }
}
