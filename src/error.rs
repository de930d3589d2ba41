use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Coordinator unreachable: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("RPC failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("Malformed reply from coordinator: {0}")]
    Protocol(String),

    #[error("Storage error on {name}: {source}")]
    Storage {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt intermediate data: {0}")]
    Codec(String),

    #[error("Workload failed: {0}")]
    Workload(#[from] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Task execution aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether this error means the coordinator could not be reached.
    ///
    /// Such errors end the worker process; everything else only ends the
    /// current task attempt.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Rpc(_) | Error::Protocol(_))
    }

    pub(crate) fn storage(name: impl Into<String>, source: std::io::Error) -> Self {
        Error::Storage {
            name: name.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
