//! Generation of the `Release` file describing a distribution. See
//! <https://wiki.debian.org/DebianRepository/Format#A.22Release.22_files> for the format.

use crate::{
    arch::DpkgArch,
    checksums::{hash_reader, Digests},
    config::Config,
    error::DebPoolError,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::{debug, info};
use std::{
    fmt::Write as _,
    fs::{self, File},
    path::Path,
};
use strum::IntoEnumIterator;
use walkdir::WalkDir;

// Anything else in the tree, such as Release, Release.gpg, or InRelease, must not be listed in the
// Release file.
const INDEX_FILE_NAMES: [&str; 2] = ["Packages", "Packages.gz"];

const RELEASE_VERSION: &str = "1.0";

/// An index file as listed in a Release file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    /// The path relative to the distribution root, always using `/` as the separator.
    pub name: String,
    pub size: u64,
    pub digests: Digests,
}

/// The header fields of a Release file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseMetadata {
    /// Used for `Origin`, `Label`, and `Description`.
    pub label: String,
    /// Used for `Suite` and `Codename`.
    pub branch: String,
    pub version: String,
    pub architectures: Vec<String>,
    pub components: Vec<String>,
    pub date: DateTime<Utc>,
}

impl ReleaseMetadata {
    #[must_use]
    pub fn from_config(config: &Config, date: DateTime<Utc>) -> Self {
        ReleaseMetadata {
            label: config.label.clone(),
            branch: config.branch.clone(),
            version: RELEASE_VERSION.to_string(),
            architectures: DpkgArch::iter().map(|a| a.to_string()).collect(),
            components: vec![config.component.clone()],
            date,
        }
    }
}

/// Formats a date the way `date -Ru` does, e.g. `Tue, 05 Mar 2024 07:08:09 +0000`. Day and month
/// names are always English.
#[must_use]
pub fn format_release_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S +0000").to_string()
}

/// Finds every `Packages` and `Packages.gz` file under `dist_root` and hashes it. Entries are
/// visited in file name order, so the result does not depend on the filesystem.
///
/// # Errors
///
/// Returns a [`DebPoolError::Io`] if the tree cannot be walked or a file cannot be read.
pub fn collect_index_files(dist_root: &Path) -> Result<Vec<FileInfo>> {
    let mut files = vec![];
    for entry in WalkDir::new(dist_root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dist_root).to_path_buf();
            DebPoolError::io("failed to walk", path, e.into())
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if !INDEX_FILE_NAMES.iter().any(|n| *n == file_name) {
            debug!("ignoring {}", entry.path().display());
            continue;
        }

        let path = entry.path();
        let file = File::open(path).map_err(|e| DebPoolError::io("failed to open", path, e))?;
        let (size, digests) =
            hash_reader(file).map_err(|e| DebPoolError::io("failed to read", path, e))?;
        let name = relative_name(dist_root, path)?;
        debug!("hashed {name} ({size} bytes)");

        files.push(FileInfo {
            name,
            size,
            digests,
        });
    }

    Ok(files)
}

fn relative_name(dist_root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(dist_root)?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .join("/"))
}

/// Renders the complete Release file text.
#[must_use]
pub fn render_release(metadata: &ReleaseMetadata, files: &[FileInfo]) -> String {
    let mut release = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(release, "Origin: {}", metadata.label);
    let _ = writeln!(release, "Label: {}", metadata.label);
    let _ = writeln!(release, "Description: {}", metadata.label);
    let _ = writeln!(release, "Suite: {}", metadata.branch);
    let _ = writeln!(release, "Codename: {}", metadata.branch);
    let _ = writeln!(release, "Version: {}", metadata.version);
    let _ = writeln!(
        release,
        "Architectures: {}",
        metadata.architectures.join(" "),
    );
    let _ = writeln!(release, "Components: {}", metadata.components.join(" "));
    let _ = writeln!(release, "Date: {}", format_release_date(&metadata.date));

    let sections: [(&str, fn(&Digests) -> &str); 3] = [
        ("MD5Sum", |d| d.md5.as_str()),
        ("SHA1", |d| d.sha1.as_str()),
        ("SHA256", |d| d.sha256.as_str()),
    ];
    for (field, digest_of) in sections {
        let _ = writeln!(release, "{field}:");
        for file in files {
            let _ = writeln!(
                release,
                "  {} {} {}",
                digest_of(&file.digests),
                file.size,
                file.name,
            );
        }
    }

    release
}

/// Writes `text` to `{repo_root}/dists/{branch}/Release`, replacing any existing file. The write
/// is not atomic.
///
/// # Errors
///
/// Returns a [`DebPoolError::Io`] if the file cannot be written.
pub fn write_release(repo_root: &Path, branch: &str, text: &str) -> Result<()> {
    let path = repo_root.join("dists").join(branch).join("Release");
    info!("Writing to: {}", path.display());
    fs::write(&path, text).map_err(|e| DebPoolError::io("failed to write", &path, e))?;
    Ok(())
}

/// Describes the distribution of a repository with a Release file. The date in the file is fixed
/// when the generator is created.
#[derive(Debug)]
pub struct ReleaseGenerator {
    config: Config,
    date: DateTime<Utc>,
}

impl ReleaseGenerator {
    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_date(config, Utc::now())
    }

    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub fn with_date(config: Config, date: DateTime<Utc>) -> Result<Self> {
        config.validate()?;
        Ok(ReleaseGenerator { config, date })
    }

    /// Hashes the index files of the distribution and renders the Release text.
    ///
    /// # Errors
    ///
    /// Returns a [`DebPoolError::Io`] if the distribution tree cannot be read.
    pub fn generate(&self) -> Result<String> {
        let dist_root = self.config.dist_root();
        info!(
            "Creating Release for repository: {} ({})",
            self.config.repo_root.display(),
            self.config.branch,
        );
        let files = collect_index_files(&dist_root)?;
        Ok(render_release(
            &ReleaseMetadata::from_config(&self.config, self.date),
            &files,
        ))
    }

    /// Writes previously generated text to the distribution's Release file.
    ///
    /// # Errors
    ///
    /// Returns a [`DebPoolError::Io`] if the file cannot be written.
    pub fn write(&self, text: &str) -> Result<()> {
        write_release(&self.config.repo_root, &self.config.branch, text)
    }
}
