//! [`ContainerLogSource`] backed by the Docker Engine API.
//!
//! The daemon is reached over its Unix socket with a pooled HTTP/1 client. The
//! client is created once and shared by all collection cycles; connections are
//! kept alive between requests and only re-established when the pool finds
//! them closed.
//!
//! Whether a log stream is multiplexed is taken from its content type on
//! daemons speaking API 1.42 or later. Older daemons label every log stream
//! as raw, so there the TTY mode of the container decides.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http_body_util::{BodyExt, Empty};
use hyper::body::{Bytes, Incoming};
use hyper::{Response, StatusCode, Uri, header};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use super::{ContainerLogSource, Error, LogStream, Result, UnixConnector};
use crate::container::{ContainerID, ContainerIdentity};

/// Socket of a default Docker installation.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";

/// Content type of log streams of containers with a TTY, which are not multiplexed.
const RAW_STREAM_CONTENT_TYPE: &str = "application/vnd.docker.raw-stream";

/// First API version that labels multiplexed log streams as such.
const LABELLED_FRAMING_VERSION: ApiVersion = ApiVersion {
    major: 1,
    minor: 42,
};

/// How long an unused pooled connection to the daemon is kept open.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Failure of a single Docker Engine API call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request uri for `{path}`: {source}")]
    InvalidUri {
        path: String,
        #[source]
        source: hyper::http::uri::InvalidUri,
    },
    #[error("request `{path}` failed: {source}")]
    Request {
        path: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },
    #[error("request `{path}` returned {status}: {message}")]
    Status {
        path: String,
        status: StatusCode,
        message: String,
    },
    #[error("failed to read response body of `{path}`: {source}")]
    Body {
        path: String,
        #[source]
        source: hyper::Error,
    },
    #[error("failed to decode response of `{path}`: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("daemon reported an invalid API version `{0}`")]
    InvalidApiVersion(String),
}

/// Version of the Engine API spoken by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiVersion {
    major: u32,
    minor: u32,
}

impl ApiVersion {
    /// Parses versions like `1.43`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (major, minor) = raw.trim().split_once('.')?;
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }

    fn labels_log_framing(self) -> bool {
        self >= LABELLED_FRAMING_VERSION
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Entry of `GET /containers/json`, reduced to what is needed.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerSummary {
    id: String,
    #[serde(default)]
    names: Option<Vec<String>>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VersionResponse {
    api_version: String,
}

/// Response of `GET /containers/{id}/json`, reduced to the TTY mode.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerInspect {
    config: ContainerConfig,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerConfig {
    #[serde(default)]
    tty: bool,
}

/// Body of an error response of the daemon.
#[derive(Debug, serde::Deserialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Debug, Clone)]
pub struct DockerClient {
    socket_path: PathBuf,
    client: Client<UnixConnector, Empty<Bytes>>,
    api_version: OnceCell<ApiVersion>,
}

impl DockerClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        let socket_path = socket_path.into();
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build(UnixConnector::new(&socket_path));
        Self {
            socket_path,
            client,
            api_version: OnceCell::new(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Checks that the daemon answers on its socket.
    pub async fn ping(&self) -> std::result::Result<(), ApiError> {
        self.get("/_ping").await.map(|_| ())
    }

    /// API version of the daemon, queried once and cached afterwards.
    pub async fn api_version(&self) -> std::result::Result<ApiVersion, ApiError> {
        self.api_version
            .get_or_try_init(|| async {
                let version: VersionResponse = self.get_json("/version").await?;
                log::debug!("Docker daemon speaks API {}", version.api_version);
                ApiVersion::parse(&version.api_version)
                    .ok_or(ApiError::InvalidApiVersion(version.api_version))
            })
            .await
            .copied()
    }

    async fn get(&self, path: &str) -> std::result::Result<Response<Incoming>, ApiError> {
        let uri: Uri =
            format!("http://docker{path}")
                .parse()
                .map_err(|source| ApiError::InvalidUri {
                    path: path.to_owned(),
                    source,
                })?;
        log::trace!("GET {}", path);
        let response = self
            .client
            .get(uri)
            .await
            .map_err(|source| ApiError::Request {
                path: path.to_owned(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.into_body().collect().await {
                Ok(body) => error_message(&body.to_bytes()),
                Err(err) => format!("<unreadable body: {err}>"),
            };
            return Err(ApiError::Status {
                path: path.to_owned(),
                status,
                message,
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> std::result::Result<T, ApiError> {
        let body = self
            .get(path)
            .await?
            .into_body()
            .collect()
            .await
            .map_err(|source| ApiError::Body {
                path: path.to_owned(),
                source,
            })?
            .to_bytes();

        serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
            path: path.to_owned(),
            source,
        })
    }

    async fn list_containers(&self) -> std::result::Result<Vec<ContainerSummary>, ApiError> {
        self.get_json("/containers/json").await
    }

    async fn has_tty(&self, id: &ContainerID) -> std::result::Result<bool, ApiError> {
        let inspect: ContainerInspect = self.get_json(&format!("/containers/{id}/json")).await?;
        Ok(inspect.config.tty)
    }

    /// Whether the content type of a log response can be trusted to tell raw
    /// streams from multiplexed ones.
    async fn labels_log_framing(&self) -> bool {
        match self.api_version().await {
            Ok(version) => version.labels_log_framing(),
            Err(err) => {
                log::debug!("failed to determine Docker API version: {}", err);
                false
            }
        }
    }
}

impl ContainerLogSource for DockerClient {
    type Logs = LogStream;

    async fn list_active_containers(&self) -> Result<Vec<ContainerIdentity>> {
        let containers = self
            .list_containers()
            .await
            .map_err(|err| Error::RuntimeUnavailable(Box::new(err)))?;

        let mut out = Vec::with_capacity(containers.len());
        for container in containers {
            match ContainerID::new(&container.id) {
                Ok(id) => out.push(ContainerIdentity::from_names(
                    id,
                    container.names.as_deref().unwrap_or_default(),
                )),
                Err(err) => log::warn!("failed to parse ContainerID: {}", err),
            }
        }
        log::trace!("Found {} running containers", out.len());

        Ok(out)
    }

    async fn fetch_recent_logs(&self, id: &ContainerID, window: Duration) -> Result<LogStream> {
        let path = format!(
            "/containers/{id}/logs?stdout=true&stderr=true&since={}",
            since_timestamp(SystemTime::now(), window)
        );
        let fetch_error = |err: ApiError| Error::LogFetch {
            id: id.clone(),
            source: Box::new(err),
        };

        let tty = if self.labels_log_framing().await {
            None
        } else {
            Some(self.has_tty(id).await.map_err(fetch_error)?)
        };
        let response = self.get(&path).await.map_err(fetch_error)?;

        let raw = tty.unwrap_or_else(|| {
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .is_some_and(|value| value.as_bytes() == RAW_STREAM_CONTENT_TYPE.as_bytes())
        });
        let body = response.into_body();

        Ok(if raw {
            LogStream::raw(body)
        } else {
            LogStream::multiplexed(body)
        })
    }
}

/// Start of the trailing window in UNIX seconds, as expected by the `since` parameter.
///
/// Windows reaching back before the epoch start at the epoch.
fn since_timestamp(now: SystemTime, window: Duration) -> u64 {
    now.checked_sub(window)
        .and_then(|start| start.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |start| start.as_secs())
}

/// Extracts the daemon's error message, falling back to the raw body.
fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(err) => err.message,
        Err(_) => String::from_utf8_lossy(body).trim().to_owned(),
    }
}
