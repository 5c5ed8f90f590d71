//! Provider adapters
//!
//! Each adapter wraps a host-supplied vendor transport and translates its
//! native events, device lists, statistics and error codes into the
//! provider-neutral model:
//!
//! - [`zoom`] - numeric user ids, self events included, signature auth with
//!   automatic token fetch, audio bring-up step, failover reason code
//! - [`agora`] - string uids, published/unpublished media events, combined
//!   device enumeration, file audio source
//! - [`trtc`] - enter/exit room events, per-kind device lists, pushed
//!   statistics, local file stream
//!
//! The transports themselves are traits: the host application binds them to
//! the real vendor SDKs, tests bind them to mocks.

pub(crate) mod common;
pub mod agora;
pub mod trtc;
pub mod zoom;

use thiserror::Error;

use crate::error::SessionError;
use crate::types::ProviderKind;

pub use agora::{AgoraAdapter, AgoraTransport};
pub use trtc::{TrtcAdapter, TrtcTransport};
pub use zoom::{ZoomAdapter, ZoomTransport};

/// Failure reported by a vendor transport call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("code {code}: {reason}")]
pub struct TransportError {
    pub code: i32,
    pub reason: String,
}

impl TransportError {
    pub fn new(code: i32, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Attach the provider and the operation that failed
    pub fn into_session(self, provider: ProviderKind, operation: &str) -> SessionError {
        SessionError::provider_error(provider, operation, self.code, self.reason)
    }
}

/// Result of a vendor transport call
pub type TransportResult<T> = Result<T, TransportError>;
