use thiserror::Error;

/// Client-side input failures. Each variant blocks the attempted action
/// before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("a delivery photo is required before the order can be completed")]
    MissingPhoto,

    #[error("delivered quantity must be a positive whole number, got {0:?}")]
    InvalidQuantity(String),

    #[error("username and password are required")]
    MissingCredentials,

    #[error("order id is missing")]
    MissingOrderId,
}

/// Coarse classification exposed to callers that only need to decide how to
/// present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoResponse,
    Unauthorized,
    Application,
    Validation,
    Permission,
    Unknown,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("no response from server: {0}")]
    NoResponse(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("request rejected: {message}")]
    Application { message: String },

    #[error("server error (HTTP {status})")]
    Server { status: u16 },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("location permission denied")]
    PermissionDenied,

    #[error("photo library permission denied")]
    GalleryPermissionDenied,

    #[error("unrecognized user role: {0:?}")]
    UnrecognizedRole(String),

    #[error("cannot {action} while {stage}")]
    InvalidTransition {
        action: &'static str,
        stage: &'static str,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("realtime store error: {0}")]
    Realtime(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NoResponse(_) => ErrorKind::NoResponse,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Application { .. } => ErrorKind::Application,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::PermissionDenied | AppError::GalleryPermissionDenied => {
                ErrorKind::Permission
            }
            AppError::Server { .. }
            | AppError::Decode(_)
            | AppError::MalformedPayload(_)
            | AppError::UnrecognizedRole(_)
            | AppError::InvalidTransition { .. }
            | AppError::Storage(_)
            | AppError::Realtime(_)
            | AppError::Config(_)
            | AppError::Internal(_) => ErrorKind::Unknown,
        }
    }

    /// Message suitable for an alert shown to the driver.
    pub fn user_message(&self) -> String {
        match self {
            AppError::NoResponse(detail) => {
                format!("Could not reach the server. Check your connection. ({detail})")
            }
            AppError::Unauthorized(message) => message.clone(),
            AppError::Application { message } => message.clone(),
            AppError::Server { status } => {
                format!("The server had a problem (HTTP {status}). Try again later.")
            }
            AppError::Validation(err) => err.to_string(),
            AppError::PermissionDenied => "GPS must be enabled for drivers.".to_string(),
            AppError::GalleryPermissionDenied => "Allow gallery access first.".to_string(),
            AppError::UnrecognizedRole(_) => "User role not recognized.".to_string(),
            AppError::MalformedPayload(_) => "Order data is not valid.".to_string(),
            other => format!("Something went wrong: {other}"),
        }
    }
}
