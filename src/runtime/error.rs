use crate::container::ContainerID;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(#[source] BoxError),
    #[error("failed to fetch logs for container `{id}`: {source}")]
    LogFetch {
        id: ContainerID,
        #[source]
        source: BoxError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
