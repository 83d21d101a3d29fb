pub mod device_delegate;
pub mod permission;
pub mod platform;
