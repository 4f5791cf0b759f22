//! Process configuration, read from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::collector::CycleOptions;
use crate::runtime::docker::DEFAULT_SOCKET_PATH;

const DOCKER_HOST: &str = "DOCKER_HOST";
const LOG_WINDOW_SECS: &str = "DOCKERX_LOG_WINDOW_SECS";
const CYCLE_DELAY_SECS: &str = "DOCKERX_CYCLE_DELAY_SECS";
const FETCH_TIMEOUT_SECS: &str = "DOCKERX_FETCH_TIMEOUT_SECS";
const MAX_CONCURRENT_FETCHES: &str = "DOCKERX_MAX_CONCURRENT_FETCHES";
const LISTEN_ADDR: &str = "DOCKERX_LISTEN_ADDR";
const METRICS_NAMESPACE: &str = "DOCKERX_METRICS_NAMESPACE";

const UNIX_SCHEME: &str = "unix://";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value `{value}` for `{key}`: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("unsupported docker host `{0}`, only `unix://` sockets are supported")]
    UnsupportedDockerHost(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Unix socket of the Docker daemon.
    pub docker_socket: PathBuf,
    /// Trailing window of logs counted per container.
    pub log_window: Duration,
    /// Pause between the end of one cycle and the start of the next.
    pub cycle_delay: Duration,
    /// Deadline for fetching and counting the logs of one container.
    pub fetch_timeout: Duration,
    /// Upper bound of containers measured in parallel.
    pub max_concurrent_fetches: usize,
    /// Address the metrics endpoint listens on.
    pub listen_addr: SocketAddr,
    /// Prefix of the exported metric names.
    pub metrics_namespace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_socket: PathBuf::from(DEFAULT_SOCKET_PATH),
            log_window: Duration::from_secs(12 * 60 * 60),
            cycle_delay: Duration::from_secs(3),
            fetch_timeout: Duration::from_secs(30),
            max_concurrent_fetches: 4,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 2112)),
            metrics_namespace: "dockerx".to_owned(),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that cannot be used.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, falling back to the defaults
    /// for unset or empty variables.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::time::Duration;
    /// # use dockerx::config::Config;
    /// let config = Config::from_lookup(|key| match key {
    ///     "DOCKERX_LOG_WINDOW_SECS" => Some("3600".to_owned()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.log_window, Duration::from_secs(3600));
    /// assert_eq!(config.cycle_delay, Duration::from_secs(3));
    /// ```
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let docker_socket = match lookup(DOCKER_HOST) {
            Some(host) => parse_docker_host(&host)?,
            None => defaults.docker_socket,
        };
        let log_window = match lookup(LOG_WINDOW_SECS) {
            Some(value) => parse_secs(LOG_WINDOW_SECS, &value, false)?,
            None => defaults.log_window,
        };
        let cycle_delay = match lookup(CYCLE_DELAY_SECS) {
            Some(value) => parse_secs(CYCLE_DELAY_SECS, &value, true)?,
            None => defaults.cycle_delay,
        };
        let fetch_timeout = match lookup(FETCH_TIMEOUT_SECS) {
            Some(value) => parse_secs(FETCH_TIMEOUT_SECS, &value, false)?,
            None => defaults.fetch_timeout,
        };
        let max_concurrent_fetches = match lookup(MAX_CONCURRENT_FETCHES) {
            Some(value) => parse_positive(MAX_CONCURRENT_FETCHES, &value)?,
            None => defaults.max_concurrent_fetches,
        };
        let listen_addr = match lookup(LISTEN_ADDR) {
            Some(value) => {
                value
                    .trim()
                    .parse()
                    .map_err(|err: std::net::AddrParseError| Error::InvalidValue {
                        key: LISTEN_ADDR,
                        value: value.clone(),
                        reason: err.to_string(),
                    })?
            }
            None => defaults.listen_addr,
        };
        let metrics_namespace = lookup(METRICS_NAMESPACE)
            .map(|value| value.trim().to_owned())
            .unwrap_or(defaults.metrics_namespace);

        Ok(Self {
            docker_socket,
            log_window,
            cycle_delay,
            fetch_timeout,
            max_concurrent_fetches,
            listen_addr,
            metrics_namespace,
        })
    }

    pub fn cycle_options(&self) -> CycleOptions {
        CycleOptions {
            window: self.log_window,
            fetch_timeout: self.fetch_timeout,
            max_concurrent_fetches: self.max_concurrent_fetches,
        }
    }
}

fn parse_docker_host(host: &str) -> Result<PathBuf> {
    match host.trim().strip_prefix(UNIX_SCHEME) {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Err(Error::UnsupportedDockerHost(host.to_owned())),
    }
}

fn parse_secs(key: &'static str, value: &str, allow_zero: bool) -> Result<Duration> {
    let secs = parse_u64(key, value)?;
    if secs == 0 && !allow_zero {
        return Err(Error::InvalidValue {
            key,
            value: value.to_owned(),
            reason: "must be greater than zero".to_owned(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_positive(key: &'static str, value: &str) -> Result<usize> {
    match usize::try_from(parse_u64(key, value)?) {
        Ok(0) | Err(_) => Err(Error::InvalidValue {
            key,
            value: value.to_owned(),
            reason: "must be a positive integer".to_owned(),
        }),
        Ok(n) => Ok(n),
    }
}

fn parse_u64(key: &'static str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|err| Error::InvalidValue {
            key,
            value: value.to_owned(),
            reason: err.to_string(),
        })
}
