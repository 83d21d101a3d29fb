use super::error::BridgeError;

/// Per-direction device lifecycle.
///
/// State transitions:
/// ```text
/// uninitialized → building → configuring → prepared → started ⇄ stopped
///                                                        ↕
///                                                      paused
/// any step ──error──▶ failed ──release partial resources──▶ closed
/// started/stopped/paused/prepared ──close──▶ closed
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceState {
    Uninitialized,
    Building,
    Configuring,
    Prepared,
    Started,
    /// Paused because the hosting process was suspended.
    Paused,
    Stopped,
    Closed,
    Failed(BridgeError),
}

impl DeviceState {
    /// Whether `open` may be called from this state.
    pub fn can_open(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Closed)
    }

    /// Whether a stream object is held.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Self::Prepared | Self::Started | Self::Paused | Self::Stopped
        )
    }

    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Building => "building",
            Self::Configuring => "configuring",
            Self::Prepared => "prepared",
            Self::Started => "started",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Closed => "closed",
            Self::Failed(_) => "failed",
        }
    }
}
