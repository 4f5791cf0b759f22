#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create metric `{name}`: {source}")]
    Create {
        name: String,
        #[source]
        source: prometheus::Error,
    },
    #[error("failed to register metric `{name}`: {source}")]
    Register {
        name: String,
        #[source]
        source: prometheus::Error,
    },
    #[error("failed to encode metrics: {0}")]
    Encode(#[source] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
