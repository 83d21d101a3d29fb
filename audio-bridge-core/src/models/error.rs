use thiserror::Error;

/// Errors surfaced by the bridge to the multimedia library.
///
/// `open`/`start` failures roll back whatever was acquired before returning.
/// `close` never fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("allocation of {0} bytes failed")]
    Allocation(usize),

    #[error("no compatible sample format: {0}")]
    UnsupportedFormat(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("invalid audio spec: {0}")]
    InvalidSpec(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("transfer of {requested} bytes can never fit a ring of {capacity} bytes")]
    Oversized { requested: usize, capacity: usize },

    #[error("timeout")]
    Timeout,

    #[error("device is shutting down")]
    ShutDown,
}

/// Failure reported by a platform stream API call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The platform cannot represent the requested parameter.
    #[error("{operation} unsupported: {detail}")]
    Unsupported { operation: &'static str, detail: String },

    /// The call failed with a platform result code.
    #[error("{operation} failed with code {code}")]
    Failed { operation: &'static str, code: i32 },

    /// The stream object is not in a state that allows the call.
    #[error("{operation} not allowed in state {state}")]
    IllegalState { operation: &'static str, state: String },
}

impl PlatformError {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Unsupported { operation, .. }
            | Self::Failed { operation, .. }
            | Self::IllegalState { operation, .. } => operation,
        }
    }
}

impl From<PlatformError> for BridgeError {
    fn from(err: PlatformError) -> Self {
        BridgeError::Device(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_error_maps_to_device_error() {
        let err: BridgeError = PlatformError::Failed {
            operation: "start",
            code: 201,
        }
        .into();
        assert_eq!(err, BridgeError::Device("start failed with code 201".into()));
    }

    #[test]
    fn oversized_message_names_both_sizes() {
        let err = BridgeError::Oversized {
            requested: 40,
            capacity: 16,
        };
        assert_eq!(
            err.to_string(),
            "transfer of 40 bytes can never fit a ring of 16 bytes"
        );
    }
}
