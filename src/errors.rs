use crate::semantic::{SearchError, StoreError};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("failed to reload style index: {0}")]
    Reload(#[from] StoreError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
