use thiserror::Error;

pub type ShelfResult<T> = Result<T, ShelfError>;

#[derive(Error, Debug)]
pub enum ShelfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Operation error: {0}")]
    Operation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Decode error: missing {missing:?}, mismatched {mismatched:?}")]
    Decode {
        missing: Vec<String>,
        mismatched: Vec<String>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ShelfError {
    /// Short error kind name, stable across message changes.
    pub fn kind(&self) -> &'static str {
        match self {
            ShelfError::Io(_) => "io_error",
            ShelfError::Connection(_) => "connection_error",
            ShelfError::Operation(_) => "operation_error",
            ShelfError::InvalidInput(_) => "invalid_input",
            ShelfError::Decode { .. } => "decode_error",
            ShelfError::Serialization(_) => "serialization_error",
            ShelfError::Config(_) => "config_error",
        }
    }

    /// Connection errors abort the run; everything else is the caller's call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShelfError::Connection(_))
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        ShelfError::InvalidInput(msg.into())
    }
}

impl From<bson::ser::Error> for ShelfError {
    fn from(err: bson::ser::Error) -> Self {
        ShelfError::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for ShelfError {
    fn from(err: bson::de::Error) -> Self {
        ShelfError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ShelfError {
    fn from(err: serde_json::Error) -> Self {
        ShelfError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_errors_are_fatal() {
        assert!(ShelfError::Connection("refused".into()).is_fatal());
        assert!(!ShelfError::Operation("socket closed".into()).is_fatal());
        assert!(!ShelfError::invalid("bad filter").is_fatal());
    }

    #[test]
    fn decode_error_names_fields() {
        let err = ShelfError::Decode {
            missing: vec!["author".into()],
            mismatched: vec!["price".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("author"));
        assert!(msg.contains("price"));
        assert_eq!(err.kind(), "decode_error");
    }
}
