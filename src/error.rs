use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl EvalcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures surfaced by the classifier client. Each variant maps to one
/// distinct failure mode of the remote endpoint.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("request could not be built: {details}")]
    Request { details: String },

    #[error("network error: {details}")]
    Transport { details: String },

    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("response is not JSON: {raw}")]
    NonJson { raw: String },

    #[error("HTTP error {status}: {detail}")]
    Http { status: u16, detail: String },

    #[error("'prediction' field missing from response: {body}")]
    MissingPrediction { body: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid session directory name: {name}")]
    InvalidSessionName { name: String },
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("frame {frame_id} has {actual} bytes, expected {expected}")]
    SizeMismatch {
        frame_id: u64,
        expected: usize,
        actual: usize,
    },

    #[error("JPEG encoding failed: {details}")]
    Jpeg { details: String },

    #[error("format {format} cannot be encoded without the jpeg feature")]
    Unsupported { format: String },
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source configuration failed: {details}")]
    Configuration { details: String },

    #[error("capture stream failed: {details}")]
    CaptureStream { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("receiver lagged behind by {count} events")]
    Lagged { count: u64 },

    #[error("event bus channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, EvalcamError>;
