//! A library for maintaining a small APT repository that mirrors the Debian packages a project
//! publishes as GitHub release assets.
//!
//! This project also ships a CLI tool named `debpool`. Its two subcommands map onto the two
//! halves of this library, which are meant to be run one after the other with an indexer such as
//! `dpkg-scanpackages` in between:
//!
//! 1. [`Syncer`] makes `{repo_root}/pool/{component}` contain exactly the `.deb` assets of the
//!    latest non-prerelease release, renamed to `{package}_{version}_{package_version}_{arch}.deb`.
//!    Files that are already present are not downloaded again and every other file in the pool
//!    is deleted.
//! 2. [`ReleaseGenerator`] hashes every `Packages` and `Packages.gz` file under
//!    `{repo_root}/dists/{branch}` and writes the `Release` file for that distribution.
//!
//! ```ignore
//! use debpool::{Config, ReleaseGenerator, Syncer};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config {
//!         repo_root: "/srv/apt".into(),
//!         ..Config::default()
//!     };
//!
//!     Syncer::new(config.clone())?.sync().await?;
//!     // ... run dpkg-scanpackages here ...
//!     let generator = ReleaseGenerator::new(config)?;
//!     generator.write(&generator.generate()?)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architectures
//!
//! Each `.deb` asset's architecture is taken from its name. Names containing `amd64`, `arm64`, or
//! `armv7l` go into the pool as `amd64`, `arm64`, and `armhf` respectively. Any other `.deb` asset
//! is an error. Assets that do not end in `.deb` are ignored.
//!
//! ## Errors
//!
//! Every fallible function returns an [`anyhow::Result`]. When the failure is one `debpool`
//! distinguishes, the root of the error chain is a [`DebPoolError`], which you can get with
//! [`anyhow::Error::downcast_ref`].
//!
//! ## Features
//!
//! This crate offers several features to control the TLS dependency used by `reqwest`:
//!
#![doc = document_features::document_features!()]

mod arch;
mod checksums;
mod config;
mod download;
mod error;
mod github;
mod pool;
mod release;
mod syncer;

pub use crate::{
    arch::{resolve_arch, DpkgArch},
    checksums::{hash_bytes, hash_reader, Digests},
    config::{
        Config, DEFAULT_BRANCH, DEFAULT_COMPONENT, DEFAULT_HOST, DEFAULT_LABEL, DEFAULT_OWNER,
        DEFAULT_PACKAGE_NAME, DEFAULT_PACKAGE_VERSION, DEFAULT_REPO, DEFAULT_REPO_ROOT,
    },
    download::{download, DownloadOutcome, NoProgress, Progress, TerminalProgress},
    error::DebPoolError,
    github::{Asset, GitHub, Release},
    pool::{Pool, PoolEntry},
    release::{
        collect_index_files, format_release_date, render_release, write_release, FileInfo,
        ReleaseGenerator, ReleaseMetadata,
    },
    syncer::{SyncReport, Syncer},
};

// The version of the `debpool` crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(feature = "logging")]
use fern::{
    colors::{Color, ColoredLevelConfig},
    Dispatch,
};

/// This function initializes logging for the application. It's public for the sake of the
/// `debpool` binary, but it lives in the library crate so that test code can also enable logging.
///
/// # Errors
///
/// This can return a `log::SetLoggerError` error.
#[cfg(feature = "logging")]
pub fn init_logger(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    let line_colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::BrightBlack)
        .debug(Color::BrightBlack)
        .trace(Color::BrightBlack);
    let level_colors = line_colors.info(Color::Green).debug(Color::Black);

    Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{color_line}[{target}][{level}{color_line}] {message}\x1B[0m",
                color_line = format_args!(
                    "\x1B[{}m",
                    line_colors.get_color(&record.level()).to_fg_str()
                ),
                target = record.target(),
                level = level_colors.color(record.level()),
                message = message,
            ));
        })
        .level(level)
        // These are very noisy.
        .level_for("hyper", log::LevelFilter::Error)
        .level_for("hyper_util", log::LevelFilter::Error)
        .level_for("reqwest", log::LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()
}
