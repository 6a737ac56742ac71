//! Per-path state supplied by the integrator.

use bitflags::bitflags;

bitflags! {
    /// Path classification bits read by closure filtering.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PathFlags: u32 {
        /// The current ray left the camera directly.
        const CAMERA = 1 << 0;
        /// A diffuse bounce happened earlier on this path.
        const DIFFUSE_ANCESTOR = 1 << 1;
        const SHADOW = 1 << 2;
    }
}

/// Read-only description of where the current path stands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathState {
    pub bounce: u32,
    pub transparent_bounce: u32,
    pub flags: PathFlags,
    /// Smallest pdf of any scattering event so far, used by filter-glossy.
    pub min_ray_pdf: f32,
}

impl Default for PathState {
    fn default() -> Self {
        Self {
            bounce: 0,
            transparent_bounce: 0,
            flags: PathFlags::CAMERA,
            min_ray_pdf: f32::MAX,
        }
    }
}

impl PathState {
    /// State of a path that already scattered `bounce` times.
    pub fn at_bounce(bounce: u32) -> Self {
        Self {
            bounce,
            flags: if bounce == 0 {
                PathFlags::CAMERA
            } else {
                PathFlags::empty()
            },
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_camera_ray(&self) -> bool {
        self.flags.contains(PathFlags::CAMERA)
    }

    /// First hit of the path, before any scattering or transparency.
    #[inline]
    pub fn is_first_bounce(&self) -> bool {
        self.bounce == 0 && self.transparent_bounce == 0
    }
}
