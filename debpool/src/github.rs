use crate::{config::Config, error::DebPoolError};
use anyhow::Result;
use log::debug;
use reqwest::{
    header::{HeaderValue, ACCEPT, AUTHORIZATION},
    Client, RequestBuilder,
};
use serde::{Deserialize, Serialize};
use url::Url;

/// One downloadable file attached to a release.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Asset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub url: Url,
}

/// A published, non-prerelease release and its assets, in the order the API listed them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Release {
    pub tag: String,
    pub assets: Vec<Asset>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ApiRelease {
    tag_name: String,
    prerelease: bool,
    assets: Vec<Asset>,
}

/// A client for the releases of one GitHub repository.
#[derive(Debug)]
pub struct GitHub {
    owner: String,
    repo: String,
    api_base_url: Url,
    token: Option<String>,
}

impl GitHub {
    #[must_use]
    pub fn new(owner: String, repo: String, api_base_url: Url, token: Option<String>) -> Self {
        GitHub {
            owner,
            repo,
            api_base_url,
            token,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the configured API base URL is not usable.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.owner.clone(),
            config.repo.clone(),
            config.api_base_url()?,
            config.resolved_token(),
        ))
    }

    /// `{api_base}/repos/{owner}/{repo}/releases`
    ///
    /// # Errors
    ///
    /// Returns an error if the API base URL cannot have path segments appended to it.
    pub fn releases_url(&self) -> Result<Url> {
        let mut url = self.api_base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                DebPoolError::InvalidConfig(format!(
                    "could not get path segments for {}",
                    self.api_base_url,
                ))
            })?
            .pop_if_empty()
            .push("repos")
            .push(&self.owner)
            .push(&self.repo)
            .push("releases");
        Ok(url)
    }

    /// Fetches every release of the repository and drops the prereleases. The API's order is kept
    /// as-is, which GitHub documents as newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`DebPoolError::Network`] if the request fails or the API answers with an error
    /// status and a [`DebPoolError::Format`] if the body is not a list of releases.
    pub async fn list_releases(&self, client: &Client) -> Result<Vec<Release>> {
        let url = self.releases_url()?;
        debug!("Getting release info from `{url}`");

        let network = |source: reqwest::Error| DebPoolError::Network {
            url: url.clone(),
            source,
        };

        let mut req_builder = client
            .get(url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        req_builder = self.maybe_add_token_header(req_builder)?;
        let body = req_builder
            .send()
            .await
            .map_err(network)?
            .error_for_status()
            .map_err(network)?
            .bytes()
            .await
            .map_err(network)?;

        let api_releases: Vec<ApiRelease> =
            serde_json::from_slice(&body).map_err(|source| DebPoolError::Format {
                url: url.clone(),
                source,
            })?;

        Ok(api_releases
            .into_iter()
            .filter_map(|r| {
                if r.prerelease {
                    debug!("Ignoring prerelease {}", r.tag_name);
                    return None;
                }
                Some(Release {
                    tag: r.tag_name,
                    assets: r.assets,
                })
            })
            .collect())
    }

    pub(crate) fn maybe_add_token_header(
        &self,
        mut req_builder: RequestBuilder,
    ) -> Result<RequestBuilder> {
        if let Some(token) = self.token.as_deref() {
            debug!("Adding GitHub token to GitHub request.");
            let bearer = format!("Bearer {token}");
            let mut auth_val = HeaderValue::from_str(&bearer)?;
            auth_val.set_sensitive(true);
            req_builder = req_builder.header(AUTHORIZATION, auth_val);
        } else {
            debug!("No token given.");
        }
        Ok(req_builder)
    }
}
