//! Rendering intents (`spec.md` §3 "Rendering Intent", §6 "Rendering
//! intents 0..3 ... 20 is the custom K-only-GCR").

/// One of the five rendering intents this system understands, including the
/// engine-custom K-only-GCR extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingIntent {
    Perceptual,
    RelativeColorimetric,
    Saturation,
    AbsoluteColorimetric,
    /// Gray Component Replacement preserving black ink only; only meaningful
    /// for a CMYK destination (`spec.md` §3, §4.4 "K-only-GCR variant").
    KOnlyGcr,
}

impl RenderingIntent {
    /// The ICC/LittleCMS intent constant this intent maps to.
    pub fn engine_constant(self) -> u32 {
        match self {
            RenderingIntent::Perceptual => 0,
            RenderingIntent::RelativeColorimetric => 1,
            RenderingIntent::Saturation => 2,
            RenderingIntent::AbsoluteColorimetric => 3,
            RenderingIntent::KOnlyGcr => 20,
        }
    }

    /// True if this is the custom K-only-GCR intent.
    pub fn is_k_only_gcr(self) -> bool {
        matches!(self, RenderingIntent::KOnlyGcr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_constants_match_published_layout() {
        assert_eq!(RenderingIntent::Perceptual.engine_constant(), 0);
        assert_eq!(RenderingIntent::AbsoluteColorimetric.engine_constant(), 3);
        assert_eq!(RenderingIntent::KOnlyGcr.engine_constant(), 20);
    }
}
