//! Response envelope normalization
//!
//! The backend wraps responses in `{ success, data, message, timestamp?,
//! path? }`. Not every deployment is consistent about it, so the client
//! tolerates bare payloads by wrapping them transparently: callers always
//! see an [`Envelope`].

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::HttpError;

/// The uniform response shape callers receive
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    /// Whether the server reported success (always true for bare payloads)
    pub success: bool,
    /// The response payload
    pub data: T,
    /// Server-provided message, empty when absent
    pub message: String,
    /// Server timestamp, when the envelope carries one
    pub timestamp: Option<String>,
    /// Request path echo, when the envelope carries one
    pub path: Option<String>,
}

/// Normalizes a response body into an [`Envelope`]
///
/// A JSON object carrying a `success` key is treated as enveloped (a
/// missing `data` reads as `null`); anything else is wrapped as a
/// successful bare payload.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<Envelope<T>, HttpError> {
    if let Some(object) = value.as_object() {
        if object.contains_key("success") {
            let success = object
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            let message = object
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let timestamp = object
                .get("timestamp")
                .and_then(Value::as_str)
                .map(str::to_string);
            let path = object
                .get("path")
                .and_then(Value::as_str)
                .map(str::to_string);
            let data_value = object.get("data").cloned().unwrap_or(Value::Null);

            let data: T = serde_json::from_value(data_value).map_err(|e| {
                HttpError::InvalidResponse(format!("Envelope data failed to decode: {}", e))
            })?;

            return Ok(Envelope {
                success,
                data,
                message,
                timestamp,
                path,
            });
        }
    }

    let data: T = serde_json::from_value(value)
        .map_err(|e| HttpError::InvalidResponse(format!("Bare payload failed to decode: {}", e)))?;

    Ok(Envelope {
        success: true,
        data,
        message: String::new(),
        timestamp: None,
        path: None,
    })
}

/// Rate-limit and message details extracted from an error response body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ErrorDetails {
    pub message: Option<String>,
    pub wait_minutes: Option<u32>,
    pub remaining_attempts: Option<u32>,
}

/// Pulls error details out of a failure body
///
/// Looks at the top level and, for enveloped errors, inside `data`.
/// Accepts both snake_case and camelCase field names.
pub(crate) fn error_details(value: &Value) -> ErrorDetails {
    fn from_object(object: &serde_json::Map<String, Value>) -> ErrorDetails {
        let int_field = |snake: &str, camel: &str| {
            object
                .get(snake)
                .or_else(|| object.get(camel))
                .and_then(Value::as_u64)
                .map(|v| v as u32)
        };

        ErrorDetails {
            message: object
                .get("message")
                .or_else(|| object.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string),
            wait_minutes: int_field("wait_minutes", "waitMinutes"),
            remaining_attempts: int_field("remaining_attempts", "remainingAttempts"),
        }
    }

    let Some(object) = value.as_object() else {
        return ErrorDetails::default();
    };

    let top = from_object(object);

    // Enveloped errors may carry the interesting fields under `data`.
    let nested = object
        .get("data")
        .and_then(Value::as_object)
        .map(from_object)
        .unwrap_or_default();

    ErrorDetails {
        message: top.message.or(nested.message),
        wait_minutes: top.wait_minutes.or(nested.wait_minutes),
        remaining_attempts: top.remaining_attempts.or(nested.remaining_attempts),
    }
}
