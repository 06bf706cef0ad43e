//! From implementations for standard library types

use super::DazError;

impl From<std::io::Error> for DazError {
    fn from(err: std::io::Error) -> Self {
        DazError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for DazError {
    fn from(err: serde_json::Error) -> Self {
        DazError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}
