// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost - Error types

use core::fmt;

/// Why a submission was rejected by the portal's security checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityReason {
    /// The submitted setup password did not match the device secret.
    SetupSecret,

    /// The submitted CSRF token did not match the outstanding one.
    Csrf,

    /// Too many submission attempts within the rate-limit window.
    RateLimited,
}

/// Gatepost firmware error type
#[allow(unused)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupError {
    /// A required input was missing or empty.
    InvalidArgument,

    /// No stored credentials.
    NotFound,

    /// The operation is not legal in the current session state, e.g.
    /// connect while already connected.
    InvalidState,

    /// The persistence subsystem failed.
    Storage,

    /// A security check rejected the request.  Makes no state changes.
    Security(SecurityReason),

    /// Radio or network bring-up failed.
    Infrastructure,

    /// A network transport error.
    Network,
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::InvalidArgument => write!(f, "invalid argument"),
            SetupError::NotFound => write!(f, "no stored credentials"),
            SetupError::InvalidState => write!(f, "invalid state"),
            SetupError::Storage => write!(f, "storage error"),
            SetupError::Security(reason) => write!(f, "rejected: {reason}"),
            SetupError::Infrastructure => write!(f, "network bring-up failed"),
            SetupError::Network => write!(f, "network error"),
        }
    }
}

impl fmt::Display for SecurityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityReason::SetupSecret => write!(f, "bad setup password"),
            SecurityReason::Csrf => write!(f, "bad csrf token"),
            SecurityReason::RateLimited => write!(f, "too many attempts"),
        }
    }
}

impl SetupError {
    /// HTTP status code this error surfaces as on the portal.
    pub fn status_code(&self) -> u16 {
        match self {
            SetupError::InvalidArgument => 400, // Bad Request
            SetupError::NotFound => 404,        // Not Found
            SetupError::InvalidState => 409,    // Conflict
            SetupError::Storage => 500,         // Internal Server Error
            SetupError::Security(SecurityReason::SetupSecret) => 403, // Forbidden
            SetupError::Security(SecurityReason::Csrf) => 403, // Forbidden
            SetupError::Security(SecurityReason::RateLimited) => 503, // Service Unavailable
            SetupError::Infrastructure => 500,  // Internal Server Error
            SetupError::Network => 503,         // Service Unavailable
        }
    }
}

impl From<embassy_net::tcp::Error> for SetupError {
    fn from(_error: embassy_net::tcp::Error) -> Self {
        SetupError::Network
    }
}
