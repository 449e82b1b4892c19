use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderValue, USER_AGENT};

use crate::config::ProviderDescriptor;
use crate::domain::DatasetName;
use crate::error::VgdError;
use crate::fs_util;
use crate::providers::{DatasetInfo, FileShare, METADATA_FILE, RemoteMetadata};

pub const KIND: &str = "nextcloud";

const DEFAULT_TIMEOUT_SECS: u64 = 300;
const LOG_STEP_BYTES: u64 = 10 * 1024 * 1024;

/// Public Nextcloud share of a folder holding `metadata.json` and the bundle
/// archives. Files are fetched through the share's `download` endpoint.
#[derive(Debug, Clone)]
pub struct NextcloudFileShare {
    client: Client,
    url: String,
    credentials: Option<(String, Option<String>)>,
}

impl NextcloudFileShare {
    pub fn new(url: &str) -> Result<Self, VgdError> {
        Self::with_options(url, None, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn from_descriptor(name: &str, descriptor: &ProviderDescriptor) -> Result<Self, VgdError> {
        let url = descriptor.require_str(name, "url")?;
        let credentials = descriptor.optional_str("username").map(|user| {
            (
                user.to_string(),
                descriptor.optional_str("password").map(str::to_string),
            )
        });
        let timeout = descriptor
            .optional_u64(name, "timeout_secs")?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::with_options(url, credentials, Duration::from_secs(timeout))
    }

    fn with_options(
        url: &str,
        credentials: Option<(String, Option<String>)>,
        timeout: Duration,
    ) -> Result<Self, VgdError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("vgd/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| VgdError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| VgdError::Http(err.to_string()))?;
        Ok(Self {
            client,
            url: url.trim().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn download_url(&self) -> String {
        format!("{}/download", self.url)
    }

    fn request(&self, file_name: &str) -> RequestBuilder {
        let request = self
            .client
            .get(self.download_url())
            .query(&[("path", "/"), ("files", file_name)]);
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_ref()),
            None => request,
        }
    }

    fn handle_status(response: Response) -> Result<Response, VgdError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "file share request failed".to_string());
        Err(VgdError::HttpStatus { status, message })
    }

    /// Streams one file of the share into `destination`. Returns the number of
    /// bytes written.
    pub fn download_file(&self, file_name: &str, destination: &Path) -> Result<u64, VgdError> {
        tracing::debug!(file = file_name, url = %self.url, "requesting file");
        let response = self
            .request(file_name)
            .send()
            .map_err(|err| VgdError::Http(err.to_string()))?;
        let mut response = Self::handle_status(response)?;
        let total = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());

        let file =
            File::create(destination).map_err(|err| VgdError::Filesystem(err.to_string()))?;
        let mut writer = ProgressWriter::new(file, file_name, total);
        io::copy(&mut response, &mut writer).map_err(|err| VgdError::Http(err.to_string()))?;
        writer
            .flush()
            .map_err(|err| VgdError::Filesystem(err.to_string()))?;
        Ok(writer.written)
    }

    pub fn download_metadata(&self) -> Result<RemoteMetadata, VgdError> {
        let response = self
            .request(METADATA_FILE)
            .send()
            .map_err(|err| VgdError::Http(err.to_string()))?;
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| VgdError::RemoteMetadata(err.to_string()))
    }
}

impl FileShare for NextcloudFileShare {
    fn list_datasets(&self) -> Result<Vec<(String, DatasetInfo)>, VgdError> {
        Ok(self.download_metadata()?.into_listing())
    }

    fn fetch_dataset(&self, name: &DatasetName, destination: &Utf8Path) -> Result<(), VgdError> {
        let staging = fs_util::staging_dir(destination.as_std_path())?;
        let archive_name = name.archive_file_name();
        let archive_path = staging.path().join(&archive_name);

        let start = Instant::now();
        let bytes = self.download_file(&archive_name, &archive_path)?;
        tracing::info!(
            dataset = %name,
            bytes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "downloaded bundle archive"
        );

        fs_util::install_archive(&archive_path, destination.as_std_path())
    }
}

impl fmt::Display for NextcloudFileShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NextcloudFileShare(url=\"{}\")", self.url)
    }
}

struct ProgressWriter<W: Write> {
    inner: W,
    file_name: String,
    total: Option<u64>,
    written: u64,
    logged: u64,
    start: Instant,
}

impl<W: Write> ProgressWriter<W> {
    fn new(inner: W, file_name: &str, total: Option<u64>) -> Self {
        Self {
            inner,
            file_name: file_name.to_string(),
            total,
            written: 0,
            logged: 0,
            start: Instant::now(),
        }
    }
}

impl<W: Write> Write for ProgressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let count = self.inner.write(buf)?;
        self.written += count as u64;
        if let Some(total) = self.total {
            if self.written >= self.logged + LOG_STEP_BYTES {
                let elapsed = self.start.elapsed().as_secs_f64().max(f64::EPSILON);
                let rate = self.written as f64 / elapsed;
                tracing::info!(
                    file = %self.file_name,
                    mib = self.written as f64 / 1024f64.powi(2),
                    total_mib = total as f64 / 1024f64.powi(2),
                    mib_per_sec = rate / 1024f64.powi(2),
                    remaining_secs = total.saturating_sub(self.written) as f64 / rate,
                    "download progress"
                );
                self.logged = self.written;
            }
        }
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
