//! Document- and reference-level configuration (`spec.md` §3 "Color
//! Conversion Config", §6 "Configuration").

use crate::color::DestinationColorSpace;
use crate::engine::intent::RenderingIntent;

/// The frozen configuration a converter is constructed with.
///
/// Every field is fixed once the owning converter exists (`spec.md` §3:
/// "Every field is frozen after converter construction"); per-reference
/// deviations are expressed separately as a [`ConfigOverride`] and merged in
/// at lookup time, never by mutating a `Configuration` in place.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Destination ICC profile bytes, or `None` for the built-in Lab D50
    /// profile (only valid when `destination_color_space` is `Lab`).
    pub destination_profile: Option<Vec<u8>>,
    pub destination_color_space: DestinationColorSpace,
    pub rendering_intent: RenderingIntent,
    pub black_point_compensation: bool,
    pub black_point_compensation_clamping: bool,
    /// Embedded profile bytes to treat `DeviceRGB` operators/images as,
    /// instead of leaving them as untouched device color (§9 Open Question:
    /// "Device color passthrough").
    pub source_rgb_profile: Option<Vec<u8>>,
    /// Same as `source_rgb_profile`, for `DeviceGray`.
    pub source_gray_profile: Option<Vec<u8>>,
    pub convert_images: bool,
    pub convert_content_streams: bool,
    pub use_workers: bool,
    pub worker_count: Option<usize>,
    /// Adaptive clamping of the blackpoint-compensation round-trip; left as
    /// a tunable rather than hardwired since the composite-LUT builder's
    /// pure-black pretest (§4.4 step 6) depends on it.
    pub use_adaptive_bpc_clamping: bool,
    /// Force any Lab pixel whose components are exactly at the achromatic
    /// extremes to the neutral axis before conversion, mirroring the
    /// CLUT builder's own achromatic coercion (§4.4 step 5) at the
    /// image-pipeline boundary.
    pub coerce_lab_absolute_zero_pixels: bool,
    pub verbose: bool,
}

impl Configuration {
    /// A configuration targeting CMYK via an embedded destination profile,
    /// with the common defaults (relative-colorimetric, BPC on, sequential).
    pub fn new_cmyk(destination_profile: Vec<u8>) -> Self {
        Self {
            destination_profile: Some(destination_profile),
            destination_color_space: DestinationColorSpace::Cmyk,
            rendering_intent: RenderingIntent::RelativeColorimetric,
            black_point_compensation: true,
            black_point_compensation_clamping: false,
            source_rgb_profile: None,
            source_gray_profile: None,
            convert_images: true,
            convert_content_streams: true,
            use_workers: false,
            worker_count: None,
            use_adaptive_bpc_clamping: true,
            coerce_lab_absolute_zero_pixels: true,
            verbose: false,
        }
    }

    /// A configuration targeting the built-in Lab D50 profile.
    pub fn new_lab() -> Self {
        Self {
            destination_profile: None,
            destination_color_space: DestinationColorSpace::Lab,
            ..Self::new_cmyk(Vec::new())
        }
    }

    pub fn with_rendering_intent(mut self, intent: RenderingIntent) -> Self {
        self.rendering_intent = intent;
        self
    }

    pub fn with_black_point_compensation(mut self, on: bool) -> Self {
        self.black_point_compensation = on;
        self
    }

    pub fn with_use_workers(mut self, on: bool) -> Self {
        self.use_workers = on;
        self
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    pub fn with_source_rgb_profile(mut self, profile: Vec<u8>) -> Self {
        self.source_rgb_profile = Some(profile);
        self
    }

    pub fn with_source_gray_profile(mut self, profile: Vec<u8>) -> Self {
        self.source_gray_profile = Some(profile);
        self
    }

    pub fn with_verbose(mut self, on: bool) -> Self {
        self.verbose = on;
        self
    }

    /// Applies a partial override on top of this configuration, returning a
    /// new, fully-resolved `Configuration`. Used by
    /// [`crate::converter::BaseConverter::configuration_for`].
    pub fn merged_with(&self, over: &ConfigOverride) -> Configuration {
        let mut out = self.clone();
        if let Some(v) = &over.destination_profile {
            out.destination_profile = Some(v.clone());
        }
        if let Some(v) = over.destination_color_space {
            out.destination_color_space = v;
        }
        if let Some(v) = over.rendering_intent {
            out.rendering_intent = v;
        }
        if let Some(v) = over.black_point_compensation {
            out.black_point_compensation = v;
        }
        if let Some(v) = over.black_point_compensation_clamping {
            out.black_point_compensation_clamping = v;
        }
        if let Some(v) = &over.source_rgb_profile {
            out.source_rgb_profile = Some(v.clone());
        }
        if let Some(v) = &over.source_gray_profile {
            out.source_gray_profile = Some(v.clone());
        }
        if let Some(v) = over.convert_images {
            out.convert_images = v;
        }
        if let Some(v) = over.convert_content_streams {
            out.convert_content_streams = v;
        }
        out
    }
}

/// A partial configuration applied to one reference key (`spec.md` §3
/// "Per-Reference Override").
#[derive(Debug, Clone, Default)]
pub struct ConfigOverride {
    pub destination_profile: Option<Vec<u8>>,
    pub destination_color_space: Option<DestinationColorSpace>,
    pub rendering_intent: Option<RenderingIntent>,
    pub black_point_compensation: Option<bool>,
    pub black_point_compensation_clamping: Option<bool>,
    pub source_rgb_profile: Option<Vec<u8>>,
    pub source_gray_profile: Option<Vec<u8>>,
    pub convert_images: Option<bool>,
    pub convert_content_streams: Option<bool>,
}

impl ConfigOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rendering_intent(mut self, intent: RenderingIntent) -> Self {
        self.rendering_intent = Some(intent);
        self
    }

    pub fn with_destination_color_space(mut self, space: DestinationColorSpace) -> Self {
        self.destination_color_space = Some(space);
        self
    }
}

/// Normalizes a PDF reference (object number, generation number) into the
/// string key used by the per-reference override map (`spec.md` §3).
pub fn reference_key(object_number: u32, generation_number: u16) -> String {
    format!("{object_number}-{generation_number}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_merges_only_set_fields() {
        let base = Configuration::new_cmyk(vec![1, 2, 3]);
        let over = ConfigOverride::new().with_rendering_intent(RenderingIntent::Saturation);
        let merged = base.merged_with(&over);
        assert_eq!(merged.rendering_intent, RenderingIntent::Saturation);
        assert_eq!(merged.destination_profile, Some(vec![1, 2, 3]));
    }

    #[test]
    fn reference_key_format() {
        assert_eq!(reference_key(12, 0), "12-0");
    }
}
