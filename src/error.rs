//! Error taxonomy shared by the gateway, the query cache and the stores.

use thiserror::Error;

/// Categorized failure of a sync operation.
///
/// The gateway never swallows errors: every failure reaching a caller is one
/// of these variants. `Clone` lets a single in-flight fetch hand the same
/// error to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
  /// Entity absent on the server
  #[error("{entity} '{id}' not found")]
  NotFound { entity: &'static str, id: String },

  /// Session missing, expired or revoked
  #[error("Unauthorized: {0}")]
  Unauthorized(String),

  /// Transport failure (DNS, connect, timeout)
  #[error("Network error: {0}")]
  Network(String),

  /// 5xx-class response
  #[error("Server error ({status}): {message}")]
  Server { status: u16, message: String },

  /// Any other 4xx response; retrying will not help
  #[error("Request rejected ({status}): {message}")]
  Rejected { status: u16, message: String },

  /// Client-side schema rejection, raised before any network call
  #[error("Invalid {field}: {message}")]
  Validation { field: &'static str, message: String },

  /// Response body did not match the expected shape
  #[error("Failed to decode {what}: {message}")]
  Decode { what: &'static str, message: String },

  /// Operation needs a signed-in session
  #[error("Not signed in")]
  NoSession,
}

impl SyncError {
  pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
    Self::NotFound {
      entity,
      id: id.into(),
    }
  }

  pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
    Self::Validation {
      field,
      message: message.into(),
    }
  }

  pub fn decode(what: &'static str, err: impl std::fmt::Display) -> Self {
    Self::Decode {
      what,
      message: err.to_string(),
    }
  }

  /// Map an HTTP status class onto the taxonomy.
  pub fn from_status(status: u16, message: impl Into<String>) -> Self {
    let message = message.into();
    match status {
      401 | 403 => Self::Unauthorized(message),
      404 => Self::NotFound {
        entity: "resource",
        id: message,
      },
      429 | 500..=599 => Self::Server { status, message },
      _ => Self::Rejected { status, message },
    }
  }

  /// Transient failures the query cache may retry.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Network(_) | Self::Server { .. })
  }

  pub fn is_unauthorized(&self) -> bool {
    matches!(self, Self::Unauthorized(_))
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::NotFound { .. })
  }
}

impl From<reqwest::Error> for SyncError {
  fn from(err: reqwest::Error) -> Self {
    if let Some(status) = err.status() {
      return Self::from_status(status.as_u16(), err.to_string());
    }
    if err.is_decode() {
      return Self::decode("response body", err);
    }
    Self::Network(err.to_string())
  }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
