pub mod capture_ring;
pub mod playback_handoff;
