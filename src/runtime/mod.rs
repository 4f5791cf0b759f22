//! Access to the container runtime.
//!
//! The collection cycle only needs two calls from the runtime: listing the
//! currently running containers and streaming the recent logs of one of them.
//! [`ContainerLogSource`] captures exactly that; [`docker::DockerClient`] implements
//! it against the Docker Engine API.
//!
//! The two calls fail in different domains. A failed listing means the runtime
//! cannot be used at all ([`Error::RuntimeUnavailable`]), a failed log fetch
//! only concerns a single container ([`Error::LogFetch`]).

use std::future::Future;
use std::time::Duration;

use tokio::io::AsyncRead;

use crate::container::{ContainerID, ContainerIdentity};

pub mod docker;
mod error;
mod stream;
mod unix;

pub use error::{BoxError, Error, Result};
pub use stream::LogStream;
pub use unix::UnixConnector;

pub trait ContainerLogSource {
    /// Raw log bytes of a single container.
    type Logs: AsyncRead + Send + Unpin + 'static;

    /// Lists the containers that are currently running.
    fn list_active_containers(
        &self,
    ) -> impl Future<Output = Result<Vec<ContainerIdentity>>> + Send;

    /// Opens the log stream (stdout and stderr) of `id`, starting `window` before now.
    fn fetch_recent_logs(
        &self,
        id: &ContainerID,
        window: Duration,
    ) -> impl Future<Output = Result<Self::Logs>> + Send;
}
