use crate::error::DebPoolError;
use anyhow::{Context, Result};
use log::{debug, info};
use reqwest::{
    header::{HeaderValue, ACCEPT},
    RequestBuilder,
};
use std::{
    ffi::OsString,
    fmt::Debug,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};
use url::Url;

// ANSI escape code to clear the line and move the cursor back to the start.
const CLEAR_LINE: &str = "\x1B[2K\r";

/// Receives cumulative byte counts while a download is streaming.
pub trait Progress: Debug {
    /// `total` is the response's `Content-Length`, if it sent one.
    fn update(&self, read: u64, total: Option<u64>);
    fn finish(&self);
}

/// Rewrites a single stderr line with the percentage downloaded so far.
#[derive(Debug, Default)]
pub struct TerminalProgress;

impl Progress for TerminalProgress {
    #[allow(clippy::cast_precision_loss)]
    fn update(&self, read: u64, total: Option<u64>) {
        let mut stderr = io::stderr().lock();
        // Progress output is best effort.
        let _ = match total {
            Some(total) if total > 0 => write!(
                stderr,
                "{CLEAR_LINE}{:.1}%",
                read as f64 / total as f64 * 100.0,
            ),
            Some(_) | None => write!(stderr, "{CLEAR_LINE}{read} bytes"),
        };
        let _ = stderr.flush();
    }

    fn finish(&self) {
        let mut stderr = io::stderr().lock();
        let _ = write!(stderr, "{CLEAR_LINE}");
        let _ = stderr.flush();
    }
}

#[derive(Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&self, _read: u64, _total: Option<u64>) {}

    fn finish(&self) {}
}

/// What [`download`] did for a destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded { bytes: u64 },
    /// A file was already at the destination. It is trusted as-is; its size and content are not
    /// checked.
    AlreadyPresent,
}

/// Downloads `url` to `dest` unless something already exists there.
///
/// The `request` is built by the caller for `url` so that it can carry auth headers. The body is
/// streamed into `{dest}.tmp`, which is renamed to `dest` once the body is complete, so an
/// interrupted download never leaves a file at `dest`.
///
/// # Errors
///
/// Returns a [`DebPoolError::Network`] if the request fails, the server answers with an error
/// status, or the body stream breaks, and a [`DebPoolError::Io`] if the file cannot be written or
/// renamed. A partial temp file may be left behind on error.
pub async fn download(
    request: RequestBuilder,
    url: &Url,
    dest: &Path,
    progress: &dyn Progress,
) -> Result<DownloadOutcome> {
    if dest.exists() {
        info!(
            "{} already exists, not downloading again",
            file_name_of(dest),
        );
        return Ok(DownloadOutcome::AlreadyPresent);
    }

    info!("Downloading {url} to {}", dest.display());

    let network = |source: reqwest::Error| DebPoolError::Network {
        url: url.clone(),
        source,
    };

    let mut resp = request
        .header(ACCEPT, HeaderValue::from_static("application/octet-stream"))
        .send()
        .await
        .map_err(network)?
        .error_for_status()
        .map_err(network)?;

    let total = resp.content_length();
    if total.is_none() {
        debug!("Content-Length not provided for {url}");
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| DebPoolError::io("failed to create directory", parent, e))?;
    }

    let temp_path = temp_path_for(dest);
    debug!("writing download to {}", temp_path.display());

    let mut read = 0;
    {
        let mut file = File::create(&temp_path)
            .map_err(|e| DebPoolError::io("failed to create", &temp_path, e))?;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(network)
            .with_context(|| format!("failed to read chunk while downloading {url}"))?
        {
            file.write_all(&chunk)
                .map_err(|e| DebPoolError::io("failed to write to", &temp_path, e))?;
            read += chunk.len() as u64;
            progress.update(read, total);
        }
        file.sync_all()
            .map_err(|e| DebPoolError::io("failed to flush", &temp_path, e))?;
    }
    progress.finish();

    fs::rename(&temp_path, dest)
        .map_err(|e| DebPoolError::io("failed to rename download into", dest, e))?;

    Ok(DownloadOutcome::Downloaded { bytes: read })
}

fn temp_path_for(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    dest.with_file_name(name)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use reqwest::Client;
    use std::sync::Mutex;
    use tempfile::tempdir;
    use test_log::test;

    #[derive(Debug, Default)]
    struct RecordingProgress {
        updates: Mutex<Vec<(u64, Option<u64>)>>,
        finished: Mutex<bool>,
    }

    impl Progress for RecordingProgress {
        fn update(&self, read: u64, total: Option<u64>) {
            self.updates.lock().unwrap().push((read, total));
        }

        fn finish(&self) {
            *self.finished.lock().unwrap() = true;
        }
    }

    const BODY: &[u8] = b"!<arch>\ndebian-binary   pretend this is a package";

    #[test(tokio::test)]
    async fn downloads_into_place() -> Result<()> {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/download/app_amd64.deb")
            .match_header("Accept", "application/octet-stream")
            .with_status(200)
            .with_body(BODY)
            .create_async()
            .await;

        let td = tempdir()?;
        let dest = td.path().join("pool").join("main").join("app_1.2.3_1_amd64.deb");
        let url = Url::parse(&format!("{}/download/app_amd64.deb", server.url()))?;
        let progress = RecordingProgress::default();

        let client = Client::new();
        let outcome = download(client.get(url.clone()), &url, &dest, &progress).await?;
        assert_eq!(
            outcome,
            DownloadOutcome::Downloaded {
                bytes: BODY.len() as u64
            },
        );
        assert_eq!(fs::read(&dest)?, BODY);
        assert!(!temp_path_for(&dest).exists(), "temp file was renamed");

        let updates = progress.updates.lock().unwrap();
        let last = updates.last().expect("got at least one progress update");
        assert_eq!(*last, (BODY.len() as u64, Some(BODY.len() as u64)));
        assert!(*progress.finished.lock().unwrap());

        m.assert_async().await;

        Ok(())
    }

    #[test(tokio::test)]
    async fn second_download_makes_no_request() -> Result<()> {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/download/app_arm64.deb")
            .with_status(200)
            .with_body(BODY)
            .expect(1)
            .create_async()
            .await;

        let td = tempdir()?;
        let dest = td.path().join("app_1.2.3_1_arm64.deb");
        let url = Url::parse(&format!("{}/download/app_arm64.deb", server.url()))?;

        let client = Client::new();
        let first = download(client.get(url.clone()), &url, &dest, &NoProgress).await?;
        assert!(matches!(first, DownloadOutcome::Downloaded { .. }));
        let after_first = fs::read(&dest)?;

        let second = download(client.get(url.clone()), &url, &dest, &NoProgress).await?;
        assert_eq!(second, DownloadOutcome::AlreadyPresent);
        assert_eq!(fs::read(&dest)?, after_first);

        m.assert_async().await;

        Ok(())
    }

    #[test(tokio::test)]
    async fn existing_file_is_trusted() -> Result<()> {
        let td = tempdir()?;
        let dest = td.path().join("app_1.2.3_1_amd64.deb");
        fs::write(&dest, b"truncated")?;

        // Nothing listens on port 1, so any request would fail.
        let url = Url::parse("http://127.0.0.1:1/download/app_amd64.deb")?;
        let outcome =
            download(Client::new().get(url.clone()), &url, &dest, &NoProgress).await?;
        assert_eq!(outcome, DownloadOutcome::AlreadyPresent);
        assert_eq!(fs::read(&dest)?, b"truncated");

        Ok(())
    }

    #[test(tokio::test)]
    async fn chunked_body_without_content_length() -> Result<()> {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/download/app_amd64.deb")
            .with_status(200)
            .with_chunked_body(|w| w.write_all(BODY))
            .create_async()
            .await;

        let td = tempdir()?;
        let dest = td.path().join("app.deb");
        let url = Url::parse(&format!("{}/download/app_amd64.deb", server.url()))?;
        let progress = RecordingProgress::default();

        download(Client::new().get(url.clone()), &url, &dest, &progress).await?;
        assert_eq!(fs::read(&dest)?, BODY);
        assert!(progress
            .updates
            .lock()
            .unwrap()
            .iter()
            .all(|(_, total)| total.is_none()));

        Ok(())
    }

    #[test(tokio::test)]
    async fn error_status_leaves_nothing_behind() -> Result<()> {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/download/missing.deb")
            .with_status(404)
            .create_async()
            .await;

        let td = tempdir()?;
        let dest = td.path().join("missing.deb");
        let url = Url::parse(&format!("{}/download/missing.deb", server.url()))?;

        let err = download(Client::new().get(url.clone()), &url, &dest, &NoProgress)
            .await
            .expect_err("a 404 is an error");
        assert!(
            matches!(
                err.downcast_ref::<DebPoolError>(),
                Some(DebPoolError::Network { .. })
            ),
            "got a Network error: {err:?}",
        );
        assert!(!dest.exists());
        assert!(!temp_path_for(&dest).exists());

        Ok(())
    }

    #[test(tokio::test)]
    async fn broken_body_stream_leaves_no_dest() -> Result<()> {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/download/app_amd64.deb")
            .with_status(200)
            .with_chunked_body(|w| {
                w.write_all(BODY)?;
                Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection dropped",
                ))
            })
            .create_async()
            .await;

        let td = tempdir()?;
        let dest = td.path().join("app_1.2.3_1_amd64.deb");
        let url = Url::parse(&format!("{}/download/app_amd64.deb", server.url()))?;

        let err = download(Client::new().get(url.clone()), &url, &dest, &NoProgress)
            .await
            .expect_err("the body stream broke");
        assert!(
            matches!(
                err.downcast_ref::<DebPoolError>(),
                Some(DebPoolError::Network { .. })
            ),
            "got a Network error: {err:?}",
        );
        assert!(!dest.exists(), "nothing was renamed into place");

        Ok(())
    }

    #[test(tokio::test)]
    async fn parent_is_a_file() -> Result<()> {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/download/app_amd64.deb")
            .with_status(200)
            .with_body(BODY)
            .create_async()
            .await;

        let td = tempdir()?;
        let not_a_dir = td.path().join("pool");
        fs::write(&not_a_dir, "I am a file")?;
        let dest = not_a_dir.join("app_1.2.3_1_amd64.deb");
        let url = Url::parse(&format!("{}/download/app_amd64.deb", server.url()))?;

        let err = download(Client::new().get(url.clone()), &url, &dest, &NoProgress)
            .await
            .expect_err("the parent of dest is a file");
        let Some(DebPoolError::Io { path, .. }) = err.downcast_ref::<DebPoolError>() else {
            panic!("expected an Io error, got {err:?}");
        };
        assert_eq!(path, &not_a_dir);
        assert!(!dest.exists());
        assert_eq!(fs::read_to_string(&not_a_dir)?, "I am a file");

        Ok(())
    }

    #[test(tokio::test)]
    async fn temp_path_cannot_be_created() -> Result<()> {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/download/app_amd64.deb")
            .with_status(200)
            .with_body(BODY)
            .create_async()
            .await;

        let td = tempdir()?;
        let dest = td.path().join("app_1.2.3_1_amd64.deb");
        let temp_path = temp_path_for(&dest);
        fs::create_dir(&temp_path)?;
        let url = Url::parse(&format!("{}/download/app_amd64.deb", server.url()))?;

        let err = download(Client::new().get(url.clone()), &url, &dest, &NoProgress)
            .await
            .expect_err("the temp path is a directory");
        let Some(DebPoolError::Io { path, .. }) = err.downcast_ref::<DebPoolError>() else {
            panic!("expected an Io error, got {err:?}");
        };
        assert_eq!(path, &temp_path);
        assert!(!dest.exists());

        Ok(())
    }

    #[test]
    fn temp_path_is_a_sibling() {
        assert_eq!(
            temp_path_for(Path::new("deb/pool/main/app_1_1_amd64.deb")),
            Path::new("deb/pool/main/app_1_1_amd64.deb.tmp"),
        );
    }
}
