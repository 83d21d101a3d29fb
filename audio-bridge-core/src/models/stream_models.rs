use serde::{Deserialize, Serialize};

/// State reported by a platform stream object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StreamState {
    New,
    Prepared,
    Running,
    Stopped,
    Paused,
    Released,
    Invalid,
}

/// Latency scenario requested from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyMode {
    #[default]
    Normal,
    Fast,
}

/// Payload encoding of the stream. Only raw PCM is produced by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingType {
    Raw,
}

/// What a render stream is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamUsage {
    Music,
    Game,
}

/// Where a capture stream records from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    Mic,
    VoiceCommunication,
}

/// Scenario information attached to the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamInfo {
    Renderer(StreamUsage),
    Capturer(SourceType),
}

/// Focus interruption hints delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptHint {
    None,
    Resume,
    Pause,
    Stop,
    Duck,
    Unduck,
}

/// Asynchronous stream notifications other than data and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEvent {
    RoutingChanged,
    Interrupt(InterruptHint),
}
