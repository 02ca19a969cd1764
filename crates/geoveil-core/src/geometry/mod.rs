//! Local-projection geometry: obfuscated sample points and circular buffers.
//!
//! All metric work happens in the point's own UTM zone (see
//! [`LocalFrame`]); results are returned in WGS84 degrees.

pub mod circle;
pub mod obfuscate;
pub mod projection;

pub use circle::{DEFAULT_RESOLUTION, MIN_RADIUS_FEET, build_circle};
pub use obfuscate::ObfuscationEngine;
pub use projection::{LocalFrame, Projected};
