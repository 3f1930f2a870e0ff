use crate::error::DebPoolError;
use anyhow::Result;
use log::debug;
use std::{env, path::PathBuf};
use url::Url;

pub const DEFAULT_PACKAGE_NAME: &str = "turbowarp-desktop";
pub const DEFAULT_HOST: &str = "api.github.com";
pub const DEFAULT_OWNER: &str = "TurboWarp";
pub const DEFAULT_REPO: &str = "desktop";
pub const DEFAULT_COMPONENT: &str = "main";
pub const DEFAULT_REPO_ROOT: &str = "deb";
pub const DEFAULT_BRANCH: &str = "stable";
pub const DEFAULT_LABEL: &str = "TurboWarp";
// This should always be 1 unless a broken package was published and has to be superseded for the
// same upstream version.
pub const DEFAULT_PACKAGE_VERSION: &str = "1";

const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Everything the syncer and the release generator need to know about the repository they operate
/// on. [`Config::default`] returns the values for the TurboWarp desktop repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// The Debian package name used as the first part of each pool file name.
    pub package_name: String,
    /// The release API host, used as `https://{host}` unless `api_base_url` is set.
    pub host: String,
    pub owner: String,
    pub repo: String,
    /// The repository component, e.g. `main`. Pool files go in `pool/{component}`.
    pub component: String,
    pub repo_root: PathBuf,
    /// The distribution whose `dists/{branch}/Release` file is generated.
    pub branch: String,
    /// Used for the `Origin`, `Label`, and `Description` fields of the Release file.
    pub label: String,
    /// The Debian revision appended to the upstream version in pool file names.
    pub package_version: String,
    /// Overrides `https://{host}`. This is useful for testing or for GitHub Enterprise, where it
    /// looks something like `https://github.my-corp.example.com/api/v3`.
    pub api_base_url: Option<String>,
    /// A token for API and download requests. If this is not set, the `GITHUB_TOKEN` env var is
    /// used when present.
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            package_name: DEFAULT_PACKAGE_NAME.to_string(),
            host: DEFAULT_HOST.to_string(),
            owner: DEFAULT_OWNER.to_string(),
            repo: DEFAULT_REPO.to_string(),
            component: DEFAULT_COMPONENT.to_string(),
            repo_root: PathBuf::from(DEFAULT_REPO_ROOT),
            branch: DEFAULT_BRANCH.to_string(),
            label: DEFAULT_LABEL.to_string(),
            package_version: DEFAULT_PACKAGE_VERSION.to_string(),
            api_base_url: None,
            token: None,
        }
    }
}

impl Config {
    /// Checks that every field can be used to build URLs and file names.
    ///
    /// # Errors
    ///
    /// Returns a [`DebPoolError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("package name", &self.package_name),
            ("host", &self.host),
            ("owner", &self.owner),
            ("repo", &self.repo),
            ("component", &self.component),
            ("branch", &self.branch),
            ("label", &self.label),
            ("package version", &self.package_version),
        ];
        for (what, value) in required {
            if value.trim().is_empty() {
                return Err(invalid(format!("The {what} cannot be empty")));
            }
            // A newline in the label or branch would start a new Release field.
            if value.chars().any(char::is_control) {
                return Err(invalid(format!(
                    "The {what} {value:?} cannot contain control characters"
                )));
            }
        }
        if self.repo_root.as_os_str().is_empty() {
            return Err(invalid("The repository root cannot be empty".to_string()));
        }

        for (what, value) in [
            ("owner", &self.owner),
            ("repo", &self.repo),
            ("component", &self.component),
        ] {
            if value.contains('/') {
                return Err(invalid(format!(
                    "The {what} `{value}` cannot contain a slash"
                )));
            }
        }

        // Both of these end up in a pool file name, where `_` separates the fields.
        for (what, value) in [
            ("package name", &self.package_name),
            ("package version", &self.package_version),
        ] {
            if value.contains(['_', '/']) {
                return Err(invalid(format!(
                    "The {what} `{value}` cannot contain an underscore or a slash"
                )));
            }
        }

        self.api_base_url()?;

        Ok(())
    }

    /// Returns the base URL for the release API.
    ///
    /// # Errors
    ///
    /// Returns a [`DebPoolError::InvalidConfig`] if the URL cannot be parsed or cannot have path
    /// segments appended to it.
    pub fn api_base_url(&self) -> Result<Url> {
        let raw = self
            .api_base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}", self.host));
        let url = Url::parse(&raw)
            .map_err(|e| invalid(format!("The API base URL `{raw}` is not valid: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(invalid(format!(
                "The API base URL `{raw}` cannot be used as a base for API paths"
            )));
        }
        Ok(url)
    }

    /// The explicitly configured token or, failing that, the one from the `GITHUB_TOKEN` env var.
    pub(crate) fn resolved_token(&self) -> Option<String> {
        if self.token.is_some() {
            return self.token.clone();
        }
        let token = env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty());
        if token.is_some() {
            debug!("Using GitHub token from the {TOKEN_ENV_VAR} environment variable.");
        }
        token
    }

    /// `{repo_root}/pool/{component}`
    #[must_use]
    pub fn pool_dir(&self) -> PathBuf {
        self.repo_root.join("pool").join(&self.component)
    }

    /// `{repo_root}/dists/{branch}`
    #[must_use]
    pub fn dist_root(&self) -> PathBuf {
        self.repo_root.join("dists").join(&self.branch)
    }
}

fn invalid(msg: String) -> anyhow::Error {
    DebPoolError::InvalidConfig(msg).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serial_test::serial;
    use std::path::Path;

    #[test]
    fn defaults_are_valid() -> Result<()> {
        let config = Config::default();
        config.validate()?;
        assert_eq!(
            config.api_base_url()?.as_str(),
            "https://api.github.com/",
        );
        assert_eq!(config.pool_dir(), Path::new("deb/pool/main"));
        assert_eq!(config.dist_root(), Path::new("deb/dists/stable"));
        Ok(())
    }

    #[test]
    fn api_base_url_override() -> Result<()> {
        let config = Config {
            api_base_url: Some("http://127.0.0.1:1234".to_string()),
            ..Config::default()
        };
        assert_eq!(config.api_base_url()?.as_str(), "http://127.0.0.1:1234/");
        Ok(())
    }

    #[rstest]
    #[case::empty_owner(Config { owner: String::new(), ..Config::default() }, "owner cannot be empty")]
    #[case::blank_branch(Config { branch: "  ".to_string(), ..Config::default() }, "branch cannot be empty")]
    #[case::newline_in_label(
        Config { label: "TurboWarp\nSuite: evil".to_string(), ..Config::default() },
        "cannot contain control characters",
    )]
    #[case::carriage_return_in_branch(
        Config { branch: "stable\r".to_string(), ..Config::default() },
        "cannot contain control characters",
    )]
    #[case::empty_repo_root(Config { repo_root: PathBuf::new(), ..Config::default() }, "repository root")]
    #[case::slash_in_repo(Config { repo: "a/b".to_string(), ..Config::default() }, "cannot contain a slash")]
    #[case::underscore_in_package(
        Config { package_name: "turbo_warp".to_string(), ..Config::default() },
        "underscore",
    )]
    #[case::underscore_in_package_version(
        Config { package_version: "1_1".to_string(), ..Config::default() },
        "underscore",
    )]
    #[case::unparseable_api_base(
        Config { api_base_url: Some("not a url".to_string()), ..Config::default() },
        "is not valid",
    )]
    #[case::api_base_without_path(
        Config { api_base_url: Some("mailto:someone@example.com".to_string()), ..Config::default() },
        "cannot be used as a base",
    )]
    fn invalid_configs(#[case] config: Config, #[case] expect: &str) {
        let err = config.validate().expect_err("config should be invalid");
        assert!(
            matches!(
                err.downcast_ref::<DebPoolError>(),
                Some(DebPoolError::InvalidConfig(_))
            ),
            "got an InvalidConfig error",
        );
        assert!(
            err.to_string().contains(expect),
            "error `{err}` contains `{expect}`",
        );
    }

    #[test]
    #[serial]
    fn token_falls_back_to_env_var() {
        let saved = env::var(TOKEN_ENV_VAR).ok();

        env::set_var(TOKEN_ENV_VAR, "from-env");
        let config = Config::default();
        assert_eq!(config.resolved_token().as_deref(), Some("from-env"));

        let config = Config {
            token: Some("explicit".to_string()),
            ..Config::default()
        };
        assert_eq!(config.resolved_token().as_deref(), Some("explicit"));

        env::remove_var(TOKEN_ENV_VAR);
        assert_eq!(Config::default().resolved_token(), None);

        if let Some(v) = saved {
            env::set_var(TOKEN_ENV_VAR, v);
        }
    }
}
