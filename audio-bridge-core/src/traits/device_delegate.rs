use crate::models::audio_format::Direction;
use crate::models::error::PlatformError;
use crate::models::state::DeviceState;
use crate::models::stream_models::StreamEvent;

/// Event delegate for device session notifications.
///
/// `on_state_changed` is called from the control thread. `on_stream_event`
/// and `on_stream_error` are called from platform threads; implementations
/// should hand work off rather than block.
pub trait DeviceDelegate: Send + Sync {
    /// Called when a session's lifecycle state changes.
    fn on_state_changed(&self, direction: Direction, state: &DeviceState);

    /// Called when the platform reports a stream event or interrupt.
    fn on_stream_event(&self, direction: Direction, event: StreamEvent) {
        let _ = (direction, event);
    }

    /// Called when the platform reports an asynchronous stream error.
    fn on_stream_error(&self, direction: Direction, error: &PlatformError);
}
