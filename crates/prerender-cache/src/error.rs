//! Cache errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LZMA error: {0}")]
    Lzma(String),

    #[error("S3 error: {0}")]
    S3(#[from] ::s3::error::S3Error),

    #[error("S3 credentials error: {0}")]
    Credentials(#[from] ::s3::creds::error::CredentialsError),

    #[error("Join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<lzma_rs::error::Error> for CacheError {
    fn from(e: lzma_rs::error::Error) -> Self {
        match e {
            lzma_rs::error::Error::IoError(io) => CacheError::Io(io),
            other => CacheError::Lzma(format!("{other:?}")),
        }
    }
}
