//! Error types and handling for the conference session layer
//!
//! Every fallible operation in this crate returns [`SessionResult`]. The
//! variants are grouped into the categories the session layer reasons about:
//!
//! - **Configuration** - a join was attempted with missing or malformed fields,
//!   including a failed automatic token fetch. Not recoverable without fixing
//!   the request.
//! - **Provider** - the vendor transport rejected an operation (bad credentials,
//!   room full, transport-specific failure codes).
//! - **Device** - enumeration or switching failed. Recoverable: the previous
//!   device stays active.
//! - **Connectivity** - surfaced through the connection-state and failover
//!   path rather than thrown from an operation.
//! - **Attach race** - a remote video attach/detach collided with one already
//!   in flight. Handled by state guarding and only ever logged.
//!
//! # Propagation
//!
//! Errors raised while constructing an adapter or joining reject the call after
//! the facade has torn down the partial adapter. Errors that occur after a
//! successful join are delivered as [`SessionEvent::Error`](crate::events::SessionEvent)
//! so the UI can decide how to present them without unwinding the session.
//!
//! ```rust
//! use confbench_conference_core::SessionError;
//!
//! let err = SessionError::device_error("camera busy");
//! assert_eq!(err.category(), "device");
//! assert!(err.is_recoverable());
//!
//! let err = SessionError::missing_configuration("topic");
//! assert_eq!(err.category(), "configuration");
//! assert!(!err.is_recoverable());
//! ```

use thiserror::Error;

use crate::types::{DeviceKind, ProviderKind};

/// Result type alias for session-layer operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors produced by the session abstraction layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Configuration errors
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Missing required configuration: {field}")]
    MissingConfiguration { field: String },

    #[error("Automatic token acquisition failed: {reason}")]
    TokenAcquisitionFailed { reason: String },

    #[error("Provider not registered: {provider}")]
    ProviderNotRegistered { provider: String },

    /// Vendor transport rejected the operation
    #[error("{provider} rejected {operation} (code {code}): {reason}")]
    ProviderError {
        provider: ProviderKind,
        operation: String,
        code: i32,
        reason: String,
    },

    /// Device errors
    #[error("Device error: {reason}")]
    DeviceError { reason: String },

    #[error("A {kind} switch is already in progress")]
    DeviceSwitchInProgress { kind: DeviceKind },

    #[error("{provider} does not support {kind} devices")]
    UnsupportedDevice { provider: ProviderKind, kind: DeviceKind },

    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    /// Connectivity errors
    #[error("Connectivity error: {reason}")]
    ConnectivityError { reason: String },

    /// Remote video attach/detach collision
    #[error("Video attach/detach already in flight for participant {participant}")]
    AttachRace { participant: String },

    /// State errors
    #[error("Invalid adapter state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("No active session")]
    NotJoined,

    #[error("Operation already in progress: {operation}")]
    OperationInProgress { operation: String },

    #[error("{provider} does not support {capability}")]
    CapabilityUnavailable { provider: ProviderKind, capability: String },

    /// Persistence errors
    #[error("Preference storage error: {reason}")]
    PreferenceError { reason: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl SessionError {
    /// Create an invalid configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing configuration error
    pub fn missing_configuration(field: impl Into<String>) -> Self {
        Self::MissingConfiguration { field: field.into() }
    }

    /// Create a token acquisition error
    pub fn token_acquisition_failed(reason: impl Into<String>) -> Self {
        Self::TokenAcquisitionFailed { reason: reason.into() }
    }

    /// Create a provider error
    pub fn provider_error(
        provider: ProviderKind,
        operation: impl Into<String>,
        code: i32,
        reason: impl Into<String>,
    ) -> Self {
        Self::ProviderError {
            provider,
            operation: operation.into(),
            code,
            reason: reason.into(),
        }
    }

    /// Create a device error
    pub fn device_error(reason: impl Into<String>) -> Self {
        Self::DeviceError { reason: reason.into() }
    }

    /// Create a connectivity error
    pub fn connectivity_error(reason: impl Into<String>) -> Self {
        Self::ConnectivityError { reason: reason.into() }
    }

    /// Create an invalid state error
    pub fn invalid_state(expected: impl Into<String>, actual: impl std::fmt::Debug) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: format!("{:?}", actual),
        }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Check if this error is recoverable without tearing the session down
    pub fn is_recoverable(&self) -> bool {
        match self {
            SessionError::DeviceError { .. }
            | SessionError::DeviceSwitchInProgress { .. }
            | SessionError::DeviceNotFound { .. }
            | SessionError::ConnectivityError { .. }
            | SessionError::AttachRace { .. }
            | SessionError::OperationInProgress { .. } => true,

            SessionError::InvalidConfiguration { .. }
            | SessionError::MissingConfiguration { .. }
            | SessionError::TokenAcquisitionFailed { .. }
            | SessionError::ProviderNotRegistered { .. }
            | SessionError::UnsupportedDevice { .. }
            | SessionError::CapabilityUnavailable { .. } => false,

            _ => false,
        }
    }

    /// Check if error came from the vendor transport
    pub fn is_provider_error(&self) -> bool {
        matches!(self, SessionError::ProviderError { .. })
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            SessionError::InvalidConfiguration { .. }
            | SessionError::MissingConfiguration { .. }
            | SessionError::TokenAcquisitionFailed { .. }
            | SessionError::ProviderNotRegistered { .. } => "configuration",

            SessionError::ProviderError { .. } | SessionError::CapabilityUnavailable { .. } => {
                "provider"
            }

            SessionError::DeviceError { .. }
            | SessionError::DeviceSwitchInProgress { .. }
            | SessionError::UnsupportedDevice { .. }
            | SessionError::DeviceNotFound { .. } => "device",

            SessionError::ConnectivityError { .. } => "connectivity",

            SessionError::AttachRace { .. } => "attach",

            SessionError::InvalidState { .. }
            | SessionError::NotJoined
            | SessionError::OperationInProgress { .. } => "state",

            SessionError::PreferenceError { .. } | SessionError::InternalError { .. } => "system",
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::PreferenceError { reason: err.to_string() }
    }
}

impl From<url::ParseError> for SessionError {
    fn from(err: url::ParseError) -> Self {
        SessionError::invalid_configuration("origin", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failure_names_automatic_acquisition() {
        let err = SessionError::token_acquisition_failed("connection refused");
        let message = err.to_string();
        assert!(message.contains("Automatic token acquisition"));
        assert!(message.contains("connection refused"));
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn provider_error_formats_vendor_code() {
        let err = SessionError::provider_error(ProviderKind::Agora, "join", 17, "invalid token");
        assert_eq!(err.to_string(), "agora rejected join (code 17): invalid token");
        assert!(err.is_provider_error());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn device_errors_are_recoverable() {
        assert!(SessionError::DeviceSwitchInProgress { kind: DeviceKind::Camera }.is_recoverable());
        assert!(!SessionError::UnsupportedDevice {
            provider: ProviderKind::Zoom,
            kind: DeviceKind::File
        }
        .is_recoverable());
    }
}
