use crate::{
    arch::resolve_arch,
    config::Config,
    download::{download, DownloadOutcome, NoProgress, Progress},
    error::DebPoolError,
    github::GitHub,
    pool::{Pool, PoolEntry},
};
use anyhow::Result;
use log::{debug, info};
use reqwest::{
    header::{HeaderMap, HeaderValue, USER_AGENT},
    Client,
};
use std::collections::HashSet;

/// `Syncer` makes a repository's pool directory mirror the `.deb` assets of the latest release of
/// a GitHub project.
#[derive(Debug)]
pub struct Syncer {
    config: Config,
    github: GitHub,
    pool: Pool,
    reqwest_client: Client,
    progress: Box<dyn Progress>,
}

/// What a [`Syncer::sync`] run did. All file names are pool file names, except for
/// `skipped_assets`, which holds release asset names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub tag: String,
    pub version: String,
    pub downloaded: Vec<String>,
    pub already_present: Vec<String>,
    pub skipped_assets: Vec<String>,
    pub removed: Vec<String>,
}

impl Syncer {
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Syncer {
            github: GitHub::from_config(&config)?,
            pool: Pool::new(config.pool_dir()),
            reqwest_client: reqwest_client()?,
            progress: Box::new(NoProgress),
            config,
        })
    }

    /// Replaces the default, silent progress reporter.
    #[must_use]
    pub fn with_progress(mut self, progress: Box<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Downloads every `.deb` asset of the latest release into the pool under its pool name, then
    /// removes every other file from the pool.
    ///
    /// The latest release is the first non-prerelease the API returns. Publish dates are not
    /// compared.
    ///
    /// # Errors
    ///
    /// Any failure aborts the sync. Files downloaded before the failure stay in the pool and stale
    /// files are only removed once every download has succeeded.
    ///
    /// * Network errors on requests to the API or while downloading an asset.
    /// * The API response is not a list of releases.
    /// * There are no releases that are not prereleases.
    /// * The latest release's tag does not give a version usable in a pool file name. Nothing is
    ///   downloaded or removed in this case.
    /// * A `.deb` asset name does not contain a known architecture.
    /// * A file in the pool cannot be written, renamed, or removed.
    pub async fn sync(&self) -> Result<SyncReport> {
        let release = self
            .github
            .list_releases(&self.reqwest_client)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DebPoolError::NoRelease {
                owner: self.config.owner.clone(),
                repo: self.config.repo.clone(),
            })?;
        let version = version_from_tag(&release.tag)?;
        info!("Latest release is {} (version {version})", release.tag);

        self.pool.ensure_exists()?;

        let mut report = SyncReport {
            tag: release.tag.clone(),
            version: version.to_string(),
            ..SyncReport::default()
        };
        let mut keep = HashSet::new();
        for asset in &release.assets {
            if !is_debian_package(&asset.name) {
                debug!("Skipping {}, which is not a Debian package", asset.name);
                report.skipped_assets.push(asset.name.clone());
                continue;
            }

            let file_name = PoolEntry {
                package: &self.config.package_name,
                version,
                package_version: &self.config.package_version,
                arch: resolve_arch(&asset.name)?,
            }
            .to_string();
            let dest = self.pool.path_for(&file_name);

            let request = self
                .github
                .maybe_add_token_header(self.reqwest_client.get(asset.url.clone()))?;
            match download(request, &asset.url, &dest, self.progress.as_ref()).await? {
                DownloadOutcome::Downloaded { .. } => report.downloaded.push(file_name.clone()),
                DownloadOutcome::AlreadyPresent => report.already_present.push(file_name.clone()),
            }
            keep.insert(file_name);
        }

        report.removed = self.pool.remove_files_except(&keep)?;

        Ok(report)
    }
}

// The version is one `_`-separated field of a file name directly in the pool.
fn version_from_tag(tag: &str) -> Result<&str> {
    let version = tag.strip_prefix('v').unwrap_or(tag);
    let reason = if version.is_empty() {
        Some("is empty")
    } else if version.contains(['/', '\\']) {
        Some("contains a path separator")
    } else if version.contains('_') {
        Some("contains an underscore")
    } else if version.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("contains whitespace or control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(DebPoolError::UnusableTag {
            tag: tag.to_string(),
            version: version.to_string(),
            reason,
        }
        .into()),
        None => Ok(version),
    }
}

fn is_debian_package(name: &str) -> bool {
    name.ends_with(".deb")
}

fn reqwest_client() -> Result<Client> {
    let builder = Client::builder().gzip(true);

    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("debpool version {}", super::VERSION))?,
    );
    Ok(builder.default_headers(headers).build()?)
}
