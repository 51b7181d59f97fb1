//! The Conversion Policy (`spec.md` §4.1 "Conversion Policy (C1)").
//!
//! Resolves pixel formats, rendering-intent overrides, endianness, and the
//! need for a multi-profile pipeline from the shapes of the source and
//! destination color spaces alone — it never touches the engine or the
//! caches, which keeps it trivially unit-testable.

use crate::color::DestinationColorSpace;
use crate::engine::format::{FormatColorSpace, PixelFormat};
use crate::engine::intent::RenderingIntent;
use crate::error::{Error, Result};

/// A source/destination description the policy reasons about
/// (`spec.md` §4.1 "a conversion descriptor").
#[derive(Debug, Clone)]
pub struct ConversionDescriptor {
    pub source_space: FormatColorSpace,
    /// Whether the source carries an embedded ICC profile. Only Lab may
    /// omit one (`spec.md` §3: "The Lab color space is the only one that
    /// may be used without an embedded profile").
    pub source_has_profile: bool,
    pub destination_space: DestinationColorSpace,
    pub requested_intent: RenderingIntent,
    pub black_point_compensation: bool,
}

/// The policy's resolved overrides for one conversion job
/// (`spec.md` §4.1 `evaluateConversion`).
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDecision {
    /// The intent actually given to the engine; may differ from
    /// `requested_intent` (K-only-GCR's Lab/RGB-destination fallbacks,
    /// §9 Open Question "K-only GCR + Lab destination").
    pub effective_intent: RenderingIntent,
    pub requested_intent: RenderingIntent,
    pub requires_multiprofile_transform: bool,
    /// Intermediate profile fingerprints to splice into the chain, in
    /// order (e.g. `["sRGB"]`).
    pub intermediate_profiles: Vec<&'static str>,
    pub multiprofile_black_point_scaling: bool,
}

/// Format descriptors a caller can turn into packed [`PixelFormat`]s
/// (`spec.md` §4.1 `getInputFormat`/`getOutputFormat`).
#[derive(Debug, Clone, Copy)]
pub struct FormatRequest {
    pub space: FormatColorSpace,
    pub channels: u32,
    pub bits_per_component: Option<u32>,
    pub is_16_bit_input: bool,
    /// `None` means "use the policy default" (`spec.md` §4.1: "Input
    /// endianness for 16-bit data defaults to big; output endianness
    /// defaults to native").
    pub swap_endian: Option<bool>,
    /// Whether this endpoint (input or output) is 32-bit float, shared by
    /// `getInputFormat` and `getOutputFormat` alike.
    pub is_float: bool,
}

/// Resolves pixel formats, rendering intent, and multi-profile need for one
/// conversion job.
pub struct ConversionPolicy;

impl ConversionPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn bytes_per_sample(bits_per_component: u32) -> u32 {
        match bits_per_component {
            1..=8 => 1,
            9..=16 => 2,
            _ => 4,
        }
    }

    /// `spec.md` §4.1 `getInputFormat`.
    pub fn get_input_format(&self, req: FormatRequest) -> PixelFormat {
        let bits = req.bits_per_component.unwrap_or(8);
        let bytes = if req.is_float { 4 } else { Self::bytes_per_sample(bits) };
        let mut fmt = PixelFormat::new(req.space, req.channels, bytes).with_float(req.is_float);
        if bytes == 2 {
            // Input endianness for 16-bit data defaults to big.
            let swap = req.swap_endian.unwrap_or(true);
            fmt = fmt.with_endian16(swap);
        }
        fmt
    }

    /// `spec.md` §4.1 `getOutputFormat`.
    pub fn get_output_format(&self, req: FormatRequest) -> PixelFormat {
        let bits = req.bits_per_component.unwrap_or(8);
        let bytes = if req.is_float { 4 } else { Self::bytes_per_sample(bits) };
        let mut fmt = PixelFormat::new(req.space, req.channels, bytes).with_float(req.is_float);
        if bytes == 2 {
            // Output endianness defaults to native: no swap requested.
            let swap = req.swap_endian.unwrap_or(false);
            fmt = fmt.with_endian16(swap);
        }
        fmt
    }

    pub fn get_rendering_intent_constant(&self, intent: RenderingIntent) -> u32 {
        intent.engine_constant()
    }

    /// `spec.md` §4.1 `evaluateConversion`.
    pub fn evaluate_conversion(&self, desc: &ConversionDescriptor) -> Result<PolicyDecision> {
        if !desc.source_has_profile && desc.source_space != FormatColorSpace::Lab {
            return Err(Error::MissingProfile {
                context: "source color space has no embedded ICC profile".to_string(),
            });
        }

        let mut effective_intent = desc.requested_intent;
        let mut requires_multiprofile_transform = false;
        let mut intermediate_profiles = Vec::new();

        if desc.requested_intent.is_k_only_gcr() {
            let lab_source = desc.source_space == FormatColorSpace::Lab;
            let rgb_destination = desc.destination_space == DestinationColorSpace::Rgb;
            if lab_source || rgb_destination {
                // For Lab inputs, output intent defaults back to
                // relative-colorimetric when the requested intent is
                // K-only-GCR (preserves numerical invariants).
                effective_intent = RenderingIntent::RelativeColorimetric;
            } else if desc.destination_space == DestinationColorSpace::Cmyk
                && desc.source_space != FormatColorSpace::Rgb
            {
                requires_multiprofile_transform = true;
                intermediate_profiles.push("sRGB");
            }
        }

        let multiprofile_black_point_scaling =
            requires_multiprofile_transform && desc.black_point_compensation;

        Ok(PolicyDecision {
            effective_intent,
            requested_intent: desc.requested_intent,
            requires_multiprofile_transform,
            intermediate_profiles,
            multiprofile_black_point_scaling,
        })
    }

    /// `spec.md` §4.1 "Float output (32-bit) is allowed only for Lab
    /// destination and is marked analysis-only."
    pub fn float_output_allowed(destination: DestinationColorSpace) -> bool {
        destination == DestinationColorSpace::Lab
    }

    /// `spec.md` §4.1 `createOutputBuffer`.
    ///
    /// Bytes-per-sample is read straight back off the packed format's own
    /// low three bits (the same bits [`PixelFormat::new`] wrote them into),
    /// rather than re-derived from `is_float`/`is_endian16` — a format with
    /// a non-{1,2} byte width (e.g. 4-byte float) would otherwise silently
    /// collapse to 1.
    pub fn create_output_buffer(format: PixelFormat, pixel_count: usize, channels: u32) -> Vec<u8> {
        let bytes_per_sample = (format.bits() & 0b111).max(1) as usize;
        vec![0u8; pixel_count * channels as usize * bytes_per_sample]
    }
}

impl Default for ConversionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(
        source_space: FormatColorSpace,
        destination_space: DestinationColorSpace,
        intent: RenderingIntent,
    ) -> ConversionDescriptor {
        ConversionDescriptor {
            source_space,
            source_has_profile: true,
            destination_space,
            requested_intent: intent,
            black_point_compensation: true,
        }
    }

    #[test]
    fn missing_profile_rejected_for_non_lab() {
        let policy = ConversionPolicy::new();
        let mut desc = descriptor(
            FormatColorSpace::Rgb,
            DestinationColorSpace::Cmyk,
            RenderingIntent::RelativeColorimetric,
        );
        desc.source_has_profile = false;
        assert!(matches!(
            policy.evaluate_conversion(&desc),
            Err(Error::MissingProfile { .. })
        ));
    }

    #[test]
    fn lab_without_profile_is_allowed() {
        let policy = ConversionPolicy::new();
        let mut desc = descriptor(
            FormatColorSpace::Lab,
            DestinationColorSpace::Cmyk,
            RenderingIntent::RelativeColorimetric,
        );
        desc.source_has_profile = false;
        assert!(policy.evaluate_conversion(&desc).is_ok());
    }

    #[test]
    fn k_only_gcr_with_lab_source_falls_back() {
        let policy = ConversionPolicy::new();
        let desc = descriptor(
            FormatColorSpace::Lab,
            DestinationColorSpace::Cmyk,
            RenderingIntent::KOnlyGcr,
        );
        let decision = policy.evaluate_conversion(&desc).unwrap();
        assert_eq!(decision.effective_intent, RenderingIntent::RelativeColorimetric);
        assert_eq!(decision.requested_intent, RenderingIntent::KOnlyGcr);
    }

    #[test]
    fn k_only_gcr_with_gray_source_requires_multiprofile() {
        let policy = ConversionPolicy::new();
        let desc = descriptor(
            FormatColorSpace::Gray,
            DestinationColorSpace::Cmyk,
            RenderingIntent::KOnlyGcr,
        );
        let decision = policy.evaluate_conversion(&desc).unwrap();
        assert!(decision.requires_multiprofile_transform);
        assert_eq!(decision.intermediate_profiles, vec!["sRGB"]);
    }

    #[test]
    fn float_output_only_for_lab() {
        assert!(ConversionPolicy::float_output_allowed(DestinationColorSpace::Lab));
        assert!(!ConversionPolicy::float_output_allowed(DestinationColorSpace::Cmyk));
    }

    #[test]
    fn input_format_defaults_to_big_endian_for_16_bit() {
        let policy = ConversionPolicy::new();
        let fmt = policy.get_input_format(FormatRequest {
            space: FormatColorSpace::Rgb,
            channels: 3,
            bits_per_component: Some(16),
            is_16_bit_input: true,
            swap_endian: None,
            is_float: false,
        });
        assert!(fmt.is_endian16());
    }

    #[test]
    fn input_format_float_forces_four_byte_width() {
        let policy = ConversionPolicy::new();
        let fmt = policy.get_input_format(FormatRequest {
            space: FormatColorSpace::Lab,
            channels: 3,
            bits_per_component: Some(32),
            is_16_bit_input: false,
            swap_endian: Some(false),
            is_float: true,
        });
        assert!(fmt.is_float());
        assert!(!fmt.is_endian16());
        assert_eq!(fmt.bits() & 0b111, 4);
    }

    #[test]
    fn create_output_buffer_sizes_four_byte_float_samples() {
        let fmt = PixelFormat::new(FormatColorSpace::Lab, 3, 4).with_float(true);
        let buf = ConversionPolicy::create_output_buffer(fmt, 2, 3);
        assert_eq!(buf.len(), 2 * 3 * 4);
    }
}
