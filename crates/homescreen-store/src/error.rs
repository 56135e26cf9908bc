use homescreen_types::ValidationError;

/// Failures surfaced by KeyedStore backends and the record layer built on them.
///
/// A missing key is never an error at the KeyedStore level (`get` returns
/// `Ok(None)`); `NotFound` is reserved for lifecycle operations that need an
/// existing record.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{backend} backend error: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    #[error("{backend} backend returned HTTP {status} for {url}")]
    Status {
        backend: &'static str,
        status: u16,
        url: String,
    },

    #[error("malformed record at {key}: {reason}")]
    Malformed { key: String, reason: String },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl StoreError {
    pub(crate) fn sqlite(err: rusqlite::Error) -> Self {
        Self::Backend {
            backend: "local",
            message: err.to_string(),
        }
    }

    pub(crate) fn http(err: reqwest::Error) -> Self {
        Self::Backend {
            backend: "document",
            message: err.to_string(),
        }
    }

    /// True for transport or service faults, as opposed to data or caller errors.
    pub fn is_backend_fault(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::Status { .. })
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
