//! The Image Converter (`spec.md` §4.7 "Image Converter (C7)").
//!
//! Grounded on the teacher's `object/image.rs` bit-depth/channel handling
//! (the original only ever dealt with 8-bit RGB/Luma samples); generalized
//! here to the full `spec.md` §4.7 procedure: bit-depth normalization for
//! 1/2/4-bit images, Indexed palette conversion, and CMYK/Lab destinations.

use crate::color::PdfColorSpaceKind;
use crate::config::Configuration;
use crate::engine::format::FormatColorSpace;
use crate::engine::ColorEngine;
use crate::error::{Error, Result};

use super::{BaseConverter, ConvertBufferOptions};

/// Resolves the embedded profile bytes a declared color space should be
/// interpreted through before conversion.
///
/// `ICCBased` carries its own profile; bare `DeviceRGB`/`DeviceGray` (and
/// their `CalRGB`/`CalGray` aliases, normalized to the same
/// [`PdfColorSpaceKind`] variants by [`crate::page`]) carry none by PDF
/// definition, so an image in one of those spaces can only be converted if
/// the caller has told this converter which profile to treat it as
/// (`spec.md` §6 `sourceRGBProfile`/`sourceGrayProfile`) — the same fallback
/// [`super::content_stream::convert_and_batch`] applies to device color
/// operators (`spec.md` §9 "Device color passthrough"). Unlike content
/// streams, an image's declared `/ColorSpace` is authoritative rather than
/// ambiguous device color, so this fallback is the image pipeline's way of
/// giving that declared space an actual profile to convert through.
fn resolve_source_profile(
    config: &Configuration,
    kind: &PdfColorSpaceKind,
    declared: Option<Vec<u8>>,
) -> Option<Vec<u8>> {
    if declared.is_some() {
        return declared;
    }
    match kind {
        PdfColorSpaceKind::DeviceRgb | PdfColorSpaceKind::Srgb => config.source_rgb_profile.clone(),
        PdfColorSpaceKind::DeviceGray | PdfColorSpaceKind::SGray => config.source_gray_profile.clone(),
        _ => None,
    }
}

/// Input to the Image Converter (`spec.md` §4.7).
pub struct ImageInput {
    pub stream_ref_key: String,
    pub stream_data: Vec<u8>,
    pub is_compressed: bool,
    pub width: u32,
    pub height: u32,
    pub color_space: PdfColorSpaceKind,
    pub bits_per_component: u32,
    pub source_profile: Option<Vec<u8>>,
}

/// Output from the Image Converter, ready to write back into the PDF
/// (`spec.md` §4.7).
pub struct ImageOutput {
    pub stream_ref_key: String,
    pub stream_data: Vec<u8>,
    pub is_compressed: bool,
    pub width: u32,
    pub height: u32,
    pub color_space: PdfColorSpaceKind,
    pub bits_per_component: u32,
    pub pixel_count: usize,
}

/// `spec.md` §4.7 step 2: "Normalize non-standard bit depths (1, 2, 4) to 8
/// bits by bit-extraction (multiplicative scale factors 255, 85, 17;
/// big-endian bit order)."
pub fn normalize_bit_depth(data: &[u8], width: u32, height: u32, channels: u32, bits_per_component: u32) -> Vec<u8> {
    if bits_per_component == 8 {
        return data.to_vec();
    }

    let scale: u32 = match bits_per_component {
        1 => 255,
        2 => 85,
        4 => 17,
        other => {
            debug_assert!(other == 8 || other == 16, "unexpected bit depth");
            return data.to_vec();
        }
    };

    let samples_per_row = width as usize * channels as usize;
    let bytes_per_row = (samples_per_row * bits_per_component as usize + 7) / 8;
    let mut out = Vec::with_capacity(samples_per_row * height as usize);

    for row in 0..height as usize {
        let row_start = row * bytes_per_row;
        let row_bytes = &data[row_start..(row_start + bytes_per_row).min(data.len())];
        let mut bit_pos = 0usize;
        for _ in 0..samples_per_row {
            let byte_index = bit_pos / 8;
            let bit_offset = bit_pos % 8;
            let byte = row_bytes.get(byte_index).copied().unwrap_or(0);
            // Big-endian bit order: the most-significant unconsumed bits come first.
            let shift = 8 - bit_offset as u32 - bits_per_component;
            let mask = (1u32 << bits_per_component) - 1;
            let sample = (byte as u32 >> shift) & mask;
            out.push((sample * scale) as u8);
            bit_pos += bits_per_component as usize;
        }
    }

    out
}

/// `spec.md` §4.7 step 4: "Indexed images ... Convert each palette entry
/// (not the pixels) via the shared color-engine service."
pub fn convert_indexed_palette(
    converter: &mut BaseConverter,
    engine: &mut dyn ColorEngine,
    base: &PdfColorSpaceKind,
    hival: u32,
    lookup: &[u8],
    source_profile: Option<Vec<u8>>,
) -> Result<Vec<u8>> {
    let base_channels = base.channel_count();
    let entry_count = hival as usize + 1;
    let expected_len = entry_count * base_channels as usize;
    if lookup.len() < expected_len {
        return Err(Error::BadInput(format!(
            "indexed palette: expected at least {expected_len} bytes, found {}",
            lookup.len()
        )));
    }

    let source_space = match base {
        PdfColorSpaceKind::DeviceRgb | PdfColorSpaceKind::Srgb => FormatColorSpace::Rgb,
        PdfColorSpaceKind::DeviceGray | PdfColorSpaceKind::SGray => FormatColorSpace::Gray,
        PdfColorSpaceKind::DeviceCmyk | PdfColorSpaceKind::Cmyk => FormatColorSpace::Cmyk,
        PdfColorSpaceKind::Lab { .. } => FormatColorSpace::Lab,
        PdfColorSpaceKind::IccBased { header_color_space, .. } => match header_color_space {
            crate::color::IccHeaderColorSpace::Gray => FormatColorSpace::Gray,
            crate::color::IccHeaderColorSpace::Rgb => FormatColorSpace::Rgb,
            crate::color::IccHeaderColorSpace::Cmyk => FormatColorSpace::Cmyk,
            crate::color::IccHeaderColorSpace::Lab => FormatColorSpace::Lab,
        },
        PdfColorSpaceKind::Indexed { .. } => {
            return Err(Error::BadInput("nested Indexed base color space".to_string()))
        }
    };

    let options = ConvertBufferOptions {
        source_space,
        source_profile,
        source_channels: base_channels,
        // Palette entries are always byte-packed regardless of the image's
        // own `bitsPerComponent` (`spec.md` §4.7 step 4).
        bits_per_component: Some(8),
        swap_endian: Some(false),
        float_input: false,
        float_output: false,
    };

    let converted = converter.convert_colors_buffer(engine, &lookup[..expected_len], &options)?;
    Ok(converted.output_pixels)
}

/// Runs the full `spec.md` §4.7 procedure for one image.
pub fn convert_image(
    converter: &mut BaseConverter,
    engine: &mut dyn ColorEngine,
    input: ImageInput,
    compress_output: bool,
) -> Result<ImageOutput> {
    let raw = if input.is_compressed {
        crate::util::inflate(&input.stream_data)?
    } else {
        input.stream_data.clone()
    };

    let pixel_count = input.width as usize * input.height as usize;

    let (new_color_space, output_bytes) = match &input.color_space {
        PdfColorSpaceKind::Indexed { base, hival, lookup } => {
            let source_profile = resolve_source_profile(converter.base_configuration(), base, input.source_profile.clone());
            let new_palette = convert_indexed_palette(converter, engine, base, *hival, lookup, source_profile)?;
            let new_base = destination_kind(converter.base_configuration().destination_color_space);
            (
                PdfColorSpaceKind::Indexed {
                    base: Box::new(new_base),
                    hival: *hival,
                    lookup: new_palette,
                },
                raw,
            )
        }
        other => {
            let channels = other.channel_count();
            let normalized = normalize_bit_depth(&raw, input.width, input.height, channels, input.bits_per_component);

            // `normalize_bit_depth` only expands 1/2/4-bit samples up to
            // 8-bit; 8- and 16-bit samples pass through unchanged, so a
            // 16-bit image's buffer is still 2 bytes per sample here
            // (`spec.md` §4.7 step 2, §2(f)).
            let declared_bits = if input.bits_per_component <= 4 { 8 } else { input.bits_per_component };
            let sample_bytes = crate::policy::ConversionPolicy::bytes_per_sample(declared_bits) as usize;
            let expected_len = pixel_count * channels as usize * sample_bytes;
            if normalized.len() < expected_len {
                return Err(Error::BadInput(format!(
                    "image {}: expected {expected_len} bytes after normalization, found {}",
                    input.stream_ref_key,
                    normalized.len()
                )));
            }

            let source_space = match other {
                PdfColorSpaceKind::DeviceRgb | PdfColorSpaceKind::Srgb => FormatColorSpace::Rgb,
                PdfColorSpaceKind::DeviceGray | PdfColorSpaceKind::SGray => FormatColorSpace::Gray,
                PdfColorSpaceKind::DeviceCmyk | PdfColorSpaceKind::Cmyk => FormatColorSpace::Cmyk,
                PdfColorSpaceKind::Lab { .. } => FormatColorSpace::Lab,
                PdfColorSpaceKind::IccBased { header_color_space, .. } => match header_color_space {
                    crate::color::IccHeaderColorSpace::Gray => FormatColorSpace::Gray,
                    crate::color::IccHeaderColorSpace::Rgb => FormatColorSpace::Rgb,
                    crate::color::IccHeaderColorSpace::Cmyk => FormatColorSpace::Cmyk,
                    crate::color::IccHeaderColorSpace::Lab => FormatColorSpace::Lab,
                },
                PdfColorSpaceKind::Indexed { .. } => unreachable!("handled above"),
            };

            let source_profile = resolve_source_profile(converter.base_configuration(), other, input.source_profile.clone());
            let options = ConvertBufferOptions {
                source_space,
                source_profile,
                source_channels: channels,
                bits_per_component: Some(declared_bits),
                swap_endian: Some(false),
                float_input: false,
                float_output: false,
            };
            let converted = converter.convert_colors_buffer(engine, &normalized[..expected_len], &options)?;
            let new_space = destination_kind(converter.base_configuration().destination_color_space);
            (new_space, converted.output_pixels)
        }
    };

    let (final_bytes, is_compressed) = if compress_output {
        (crate::util::deflate(&output_bytes), true)
    } else {
        (output_bytes, false)
    };

    Ok(ImageOutput {
        stream_ref_key: input.stream_ref_key,
        stream_data: final_bytes,
        is_compressed,
        width: input.width,
        height: input.height,
        color_space: new_color_space,
        bits_per_component: 8,
        pixel_count,
    })
}

fn destination_kind(space: crate::color::DestinationColorSpace) -> PdfColorSpaceKind {
    match space {
        crate::color::DestinationColorSpace::Cmyk => PdfColorSpaceKind::DeviceCmyk,
        crate::color::DestinationColorSpace::Rgb => PdfColorSpaceKind::DeviceRgb,
        crate::color::DestinationColorSpace::Gray => PdfColorSpaceKind::DeviceGray,
        crate::color::DestinationColorSpace::Lab => PdfColorSpaceKind::Lab {
            range: [-128.0, 127.0, -128.0, 127.0],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_depth_1_expands_with_scale_255() {
        // Width 17 (not byte-aligned), 1 channel, 1 bit per component.
        // Row: 0b10110100 0b1XXXXXXX (3 bytes to cover 17 bits -> 24 bits).
        let row = [0b1011_0100u8, 0b1000_0000u8, 0u8];
        let out = normalize_bit_depth(&row, 17, 1, 1, 1);
        assert_eq!(out.len(), 17);
        assert_eq!(out[0], 255); // 1
        assert_eq!(out[1], 0); // 0
        assert_eq!(out[2], 255); // 1
        assert_eq!(out[3], 255); // 1
        assert_eq!(out[16], 255); // bit 16 = the leading 1 of the second byte
    }

    #[test]
    fn bit_depth_8_is_a_no_op() {
        let data = vec![1u8, 2, 3, 4];
        assert_eq!(normalize_bit_depth(&data, 2, 2, 1, 8), data);
    }

    #[test]
    fn device_rgb_falls_back_to_configured_source_profile() {
        let config = crate::config::Configuration::new_cmyk(vec![1, 2, 3]).with_source_rgb_profile(vec![4, 5, 6]);
        let resolved = resolve_source_profile(&config, &PdfColorSpaceKind::DeviceRgb, None);
        assert_eq!(resolved, Some(vec![4, 5, 6]));
    }

    #[test]
    fn icc_based_profile_is_never_overridden_by_the_fallback() {
        let config = crate::config::Configuration::new_cmyk(vec![1, 2, 3]).with_source_rgb_profile(vec![4, 5, 6]);
        let resolved = resolve_source_profile(
            &config,
            &PdfColorSpaceKind::IccBased {
                profile: vec![7, 8, 9],
                header_color_space: crate::color::IccHeaderColorSpace::Rgb,
            },
            Some(vec![7, 8, 9]),
        );
        assert_eq!(resolved, Some(vec![7, 8, 9]));
    }

    #[test]
    fn device_gray_without_fallback_profile_stays_none() {
        let config = crate::config::Configuration::new_cmyk(vec![1, 2, 3]);
        let resolved = resolve_source_profile(&config, &PdfColorSpaceKind::DeviceGray, None);
        assert_eq!(resolved, None);
    }

    #[test]
    fn sixteen_bit_image_expects_two_bytes_per_sample() {
        // 2x2 DeviceGray at 16 bits per component needs 8 bytes
        // (pixelCount * channels * 2), not 4 — a caller that mislabels this
        // as 8-bit would silently read only the first half of the image.
        let mut converter = BaseConverter::new(
            super::super::ConverterRole::Image,
            crate::config::Configuration::new_cmyk(vec![1, 2, 3]).with_source_gray_profile(vec![4, 5, 6]),
        );
        let mut engine = crate::engine::lcms_engine::LcmsEngine::new();
        let input = ImageInput {
            stream_ref_key: "1-0".to_string(),
            stream_data: vec![0u8; 4],
            is_compressed: false,
            width: 2,
            height: 2,
            color_space: PdfColorSpaceKind::DeviceGray,
            bits_per_component: 16,
            source_profile: None,
        };
        let result = convert_image(&mut converter, &mut engine, input, false);
        assert!(matches!(result, Err(Error::BadInput(_))));
    }

    #[test]
    fn indexed_palette_rejects_short_lookup() {
        let mut converter = BaseConverter::new(
            super::super::ConverterRole::Image,
            crate::config::Configuration::new_cmyk(vec![1, 2, 3]),
        );
        let mut engine = crate::engine::lcms_engine::LcmsEngine::new();
        let result = convert_indexed_palette(
            &mut converter,
            &mut engine,
            &PdfColorSpaceKind::DeviceRgb,
            2,
            &[0xFF, 0x00],
            None,
        );
        assert!(result.is_err());
    }
}
