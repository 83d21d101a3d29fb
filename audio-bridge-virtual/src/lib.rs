//! # audio-bridge-virtual
//!
//! Software platform backend for audio-bridge.
//!
//! Provides:
//! - `VirtualPlatform`: stream builders and streams implementing the core
//!   platform traits, with configurable device capabilities and failure
//!   injection
//! - `VirtualStream`/`StreamDriver`: streams paced by a clock thread or
//!   pumped by hand
//! - `ToneGenerator`: sine source for capture streams
//! - `permissions`: immediate and round-trip permission brokers
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use audio_bridge_core::{AudioBridge, AudioSpec, BridgeConfig, Direction, SampleFormat};
//! use audio_bridge_virtual::{StaticPermissions, VirtualPlatform};
//!
//! let platform = Arc::new(VirtualPlatform::default());
//! let permissions = Arc::new(StaticPermissions::granted());
//! let mut bridge = AudioBridge::new(platform, permissions, BridgeConfig::default())?;
//! let spec = bridge.open_device(Direction::Playback, &AudioSpec::new(48000, SampleFormat::S16, 2, 512))?;
//! bridge.start(Direction::Playback)?;
//! ```

pub mod permissions;
pub mod tone;
pub mod virtual_platform;
pub mod virtual_stream;

pub use permissions::{DeferredPermissions, StaticPermissions};
pub use tone::{decode_samples, ToneGenerator};
pub use virtual_platform::{
    ClockMode, DeviceProfile, FailPoint, PlatformCounters, VirtualPlatform, VirtualStreamBuilder,
};
pub use virtual_stream::{DriverError, StreamConfig, StreamDriver, StreamParams, VirtualStream};
