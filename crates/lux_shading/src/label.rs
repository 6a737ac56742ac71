//! Scattering labels and closure capability flags.

use bitflags::bitflags;

bitflags! {
    /// Classification of a sampled scattering event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Label: u32 {
        const TRANSMIT = 1 << 0;
        const REFLECT = 1 << 1;
        const DIFFUSE = 1 << 2;
        const GLOSSY = 1 << 3;
        const SINGULAR = 1 << 4;
        const TRANSPARENT = 1 << 5;
        /// Transmission the integrator may treat as pass-through for background visibility.
        const TRANSMIT_TRANSPARENT = 1 << 6;
    }
}

impl Label {
    pub const NONE: Label = Label::empty();
}

bitflags! {
    /// Capabilities reported by a model's setup.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClosureFlags: u32 {
        const BSDF = 1 << 0;
        const HAS_EVAL = 1 << 1;
        const NEEDS_RANDOM = 1 << 2;
        const HAS_TRANSMISSION = 1 << 3;
        const TRANSPARENT = 1 << 4;
    }
}

bitflags! {
    /// Categories skipped by [`crate::surface::eval_all`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ExcludeFlags: u32 {
        const DIFFUSE = 1 << 0;
        const GLOSSY = 1 << 1;
        const TRANSMIT = 1 << 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_composition() {
        let label = Label::TRANSMIT | Label::GLOSSY;
        assert!(label.contains(Label::TRANSMIT));
        assert!(!label.contains(Label::REFLECT));
        assert!(Label::NONE.is_empty());
    }
}
