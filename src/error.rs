use serde_json::Value;
use thiserror::Error;

/// Shown when the backend failed without telling us why.
pub const GENERIC_FAILURE: &str = "Request failed. Please try again.";

/// Shown when the backend could not be reached at all.
pub const UNREACHABLE: &str = "Could not reach the server.";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Rejected before any request was made.
    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx response. The body text is kept for diagnostics.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx response whose body carried `"ok": false`.
    #[error("Rejected by backend: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// The text a toast should show for this error.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Invalid(msg) | ApiError::Rejected(msg) => msg.clone(),
            ApiError::Status { body, .. } => {
                backend_message(body).unwrap_or_else(|| GENERIC_FAILURE.to_string())
            }
            ApiError::Transport(_) => UNREACHABLE.to_string(),
            ApiError::Decode(_) => GENERIC_FAILURE.to_string(),
        }
    }
}

#[cfg(feature = "ssr")]
impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// Pulls `error` or `message` out of a JSON error body, if there is one.
pub fn backend_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    message_field(&value)
}

pub(crate) fn message_field(value: &Value) -> Option<String> {
    ["error", "message"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|msg| !msg.is_empty())
        .map(str::to_string)
}

/// Server function errors arrive in the browser as "error running server function: <msg>".
/// Strips that prefix so only the message reaches the user.
pub fn error_text(raw: &str) -> String {
    match raw.split_once(": ") {
        Some((prefix, rest)) if prefix.starts_with("error running server function") => {
            rest.to_string()
        }
        _ => raw.to_string(),
    }
}
