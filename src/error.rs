use crate::status::ServiceState;
use thiserror::Error;

/// Generic OS failure code used when an error carries no code of its own.
pub const ERROR_GEN_FAILURE: u32 = 31;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("control handler registration failed with OS error {code}")]
    Registration { code: u32 },

    #[error("status report for {state:?} rejected with OS error {code}")]
    Report { state: ServiceState, code: u32 },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("system error: {message}")]
    System { message: String },
}

impl BridgeError {
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// The OS error code carried by this error, if any.
    ///
    /// Registration and report failures carry the code the control manager
    /// returned; everything else maps to the generic failure code.
    pub fn os_code(&self) -> u32 {
        match self {
            Self::Registration { code } => *code,
            Self::Report { code, .. } => *code,
            _ => ERROR_GEN_FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
