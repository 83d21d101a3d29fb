/// Runtime permission collaborator.
///
/// `request_permission` looks synchronous to the caller but usually blocks
/// on a round trip to another thread (a UI prompt). Called by the control
/// thread while opening a capture stream.
pub trait PermissionBroker: Send + Sync {
    /// Returns `true` when `name` is granted.
    fn request_permission(&self, name: &str) -> bool;
}
