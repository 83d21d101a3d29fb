pub mod bridge;
pub mod device_session;
pub mod handles;
