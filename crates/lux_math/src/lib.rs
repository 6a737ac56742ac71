// Re-export glam for convenience
pub use glam::*;

// Shading math
pub mod frame;
pub mod sampling;
pub mod spectrum;
pub mod util;

pub use frame::{make_orthonormals, Frame};
pub use util::*;

/// RGB color / spectral weight used throughout the shading kernel.
pub type Spectrum = Vec3;
