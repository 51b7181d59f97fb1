//! The Base Converter (`spec.md` §4.6 "Base Converter (C6)") and the
//! converter-role hierarchy (`spec.md` §9 "Dynamic dispatch over converter
//! classes").
//!
//! Converter classes become a tagged enum rather than a trait-object
//! hierarchy: [`ConverterRole`] names the five roles (Document/Page/Image/
//! ContentStream/Sampler — here, Document/Page/Image/ContentStream, since
//! the sampler role is folded into [`crate::lut`]'s free functions), and
//! [`BaseConverter`] holds everything every role needs (config, overrides,
//! parent back-reference, caches). Child creation
//! ([`BaseConverter::create_child`]) is a plain method rather than a
//! generic factory trait, following the teacher's `GraphicsStates::cur`/
//! `cur_mut` style of one concrete state-holder type reused at every level.

pub mod content_stream;
pub mod image;

use std::collections::HashMap;

use crate::cache::{ColorLookupCache, ProfileTransformCache};
use crate::color::DestinationColorSpace;
use crate::config::{ConfigOverride, Configuration};
use crate::diagnostics::Diagnostics;
use crate::engine::flags::EngineFlags;
use crate::engine::format::{FormatColorSpace, PixelFormat};
use crate::engine::{ColorEngine, ProfileHandle};
use crate::error::{Error, Result};
use crate::policy::{ConversionDescriptor, ConversionPolicy};

/// Which role in the converter hierarchy a [`BaseConverter`] is playing
/// (`spec.md` §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterRole {
    Document,
    Page,
    Image,
    ContentStream,
}

/// The result of [`BaseConverter::convert_colors_buffer`]
/// (`spec.md` §4.6 step 8).
pub struct ConvertedBuffer {
    pub output_pixels: Vec<u8>,
    pub pixel_count: usize,
    pub input_channels: u32,
    pub output_channels: u32,
}

/// Options for one `convertColorsBuffer` call (`spec.md` §4.6).
pub struct ConvertBufferOptions {
    pub source_space: FormatColorSpace,
    pub source_profile: Option<Vec<u8>>,
    pub source_channels: u32,
    /// The source buffer's declared bits per component (`spec.md` §4.6 step
    /// 2: "Late-default bits-per-component (if unset, 8)"). Governs the
    /// *input* format only — the output format always defaults to 8-bit
    /// unless `float_output` asks for 32-bit float instead.
    pub bits_per_component: Option<u32>,
    pub swap_endian: Option<bool>,
    /// Whether the source buffer holds 32-bit float samples rather than
    /// packed integers (`spec.md` §4.8: Content-Stream Converter batches
    /// operands as floats).
    pub float_input: bool,
    pub float_output: bool,
}

/// Configuration, per-reference overrides, parent back-reference, caches:
/// everything a converter role needs (`spec.md` §4.6).
///
/// The parent link is a weak back-reference by design (`spec.md` §9
/// "Cyclic ownership"): a child never outlives the call that created it in
/// this crate's synchronous pipeline, so an index into a `Vec` owned by the
/// caller is enough — there is no Rc/Weak cycle to break.
pub struct BaseConverter {
    pub role: ConverterRole,
    config: Configuration,
    overrides: HashMap<String, ConfigOverride>,
    pub policy: ConversionPolicy,
    pub profile_cache: ProfileTransformCache,
    pub lookup_cache: ColorLookupCache,
    pub diagnostics: Diagnostics,
}

impl BaseConverter {
    pub fn new(role: ConverterRole, config: Configuration) -> Self {
        Self {
            role,
            config,
            overrides: HashMap::new(),
            policy: ConversionPolicy::new(),
            profile_cache: ProfileTransformCache::new(),
            lookup_cache: ColorLookupCache::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// `spec.md` §4.6 `configurationFor(reference)`.
    pub fn configuration_for(&self, reference_key: &str) -> Configuration {
        match self.overrides.get(reference_key) {
            Some(over) => self.config.merged_with(over),
            None => self.config.clone(),
        }
    }

    /// `spec.md` §4.6 `setConfigurationFor(reference, partialConfig)`.
    pub fn set_configuration_for(&mut self, reference_key: impl Into<String>, partial: ConfigOverride) {
        self.overrides.insert(reference_key.into(), partial);
    }

    /// `spec.md` §4.6 `createChildConverter(class, partialConfig)`: merges
    /// configs, and shares the policy and engine-provider *shape* (a fresh
    /// child gets its own profile/transform cache per `spec.md` §3
    /// "Ownership": "child converters borrow the parent's engine provider
    /// but cache their own transforms").
    pub fn create_child(&self, role: ConverterRole, partial: Option<&ConfigOverride>) -> BaseConverter {
        let config = match partial {
            Some(over) => self.config.merged_with(over),
            None => self.config.clone(),
        };
        BaseConverter::new(role, config)
    }

    pub fn base_configuration(&self) -> &Configuration {
        &self.config
    }

    /// The cache's `ConfigFingerprint` for this converter's current
    /// destination configuration (`spec.md` §4.5 "Configuration
    /// Fingerprint": `<destinationProfileKey>|<intent>|<bpc>`).
    pub fn destination_config_fingerprint(&self) -> crate::cache::ConfigFingerprint {
        let key = destination_profile_fingerprint(&self.config).key();
        crate::cache::ConfigFingerprint::new(&key, self.config.rendering_intent, self.config.black_point_compensation)
    }

    /// `spec.md` §4.6 `convertColorsBuffer`.
    pub fn convert_colors_buffer(
        &mut self,
        engine: &mut dyn ColorEngine,
        input: &[u8],
        options: &ConvertBufferOptions,
    ) -> Result<ConvertedBuffer> {
        // Step 1: validate source profile.
        let source_is_lab = options.source_space == FormatColorSpace::Lab;
        if !source_is_lab && options.source_profile.is_none() {
            return Err(Error::MissingProfile {
                context: "convertColorsBuffer: non-Lab source without embedded profile".to_string(),
            });
        }

        let destination_channels = self.config.destination_color_space.channel_count();

        // Step 2: build pixel-format descriptors via the Policy.
        let in_req = crate::policy::FormatRequest {
            space: options.source_space,
            channels: options.source_channels,
            bits_per_component: options.bits_per_component,
            is_16_bit_input: matches!(options.bits_per_component, Some(9..=16)),
            swap_endian: options.swap_endian,
            is_float: options.float_input,
        };
        let mut in_format = self.policy.get_input_format(in_req);

        let dest_format_space = destination_format_space(self.config.destination_color_space);
        let out_req = crate::policy::FormatRequest {
            space: dest_format_space,
            channels: destination_channels,
            // The output format is independent of the source's declared bit
            // depth: images always normalize their destination samples to
            // 8-bit (the `8` here is inert once `is_float` forces 4 bytes).
            bits_per_component: Some(8),
            is_16_bit_input: false,
            swap_endian: Some(false),
            is_float: options.float_output,
        };
        let out_format = self.policy.get_output_format(out_req);

        // Step 3: detect swap-endian + float; pre-swap and clear the flag.
        let mut input_buf = input.to_vec();
        if in_format.is_endian16() && out_format.is_float() {
            crate::util::byte_swap_16(&mut input_buf);
            in_format = in_format.without_endian16();
        }

        // Step 4: pixel count from buffer length.
        let bytes_per_sample = ConversionPolicy::bytes_per_sample(options.bits_per_component.unwrap_or(8));
        let pixel_count = if bytes_per_sample == 1 {
            input_buf.len() / options.source_channels.max(1) as usize
        } else {
            (input_buf.len() / bytes_per_sample as usize) / options.source_channels.max(1) as usize
        };

        // Step 5: rendering intent + engine flags.
        let descriptor = ConversionDescriptor {
            source_space: options.source_space,
            source_has_profile: options.source_profile.is_some() || source_is_lab,
            destination_space: self.config.destination_color_space,
            requested_intent: self.config.rendering_intent,
            black_point_compensation: self.config.black_point_compensation,
        };
        let decision = self.policy.evaluate_conversion(&descriptor)?;
        let flags = EngineFlags::none()
            .with_black_point_compensation(self.config.black_point_compensation)
            .with_black_point_compensation_clamping(self.config.black_point_compensation_clamping)
            .with_multiprofile_black_point_scaling(decision.multiprofile_black_point_scaling);

        // Step 6: obtain or create the transform via the cache (C3).
        let src_fingerprint = source_profile_fingerprint(options.source_profile.as_deref(), source_is_lab);
        let dst_fingerprint = destination_profile_fingerprint(&self.config);
        let src_profile = self.profile_cache.get_or_open_profile(
            engine,
            &src_fingerprint,
            options.source_profile.as_deref(),
        )?;
        let dst_profile = self.profile_cache.get_or_open_profile(
            engine,
            &dst_fingerprint,
            self.config.destination_profile.as_deref(),
        )?;

        let transform = if decision.requires_multiprofile_transform {
            let mut profiles = vec![src_profile];
            let mut fingerprints = vec![src_fingerprint.key()];
            for intermediate in &decision.intermediate_profiles {
                let fp = match *intermediate {
                    "sRGB" => crate::cache::ProfileFingerprint::Srgb,
                    other => crate::cache::ProfileFingerprint::for_embedded(other.as_bytes()),
                };
                let handle = self.profile_cache.get_or_open_profile(engine, &fp, None)?;
                fingerprints.push(fp.key());
                profiles.push(handle);
            }
            profiles.push(dst_profile);
            fingerprints.push(dst_fingerprint.key());
            self.profile_cache.get_or_create_multiprofile_transform(
                engine,
                &fingerprints,
                &profiles,
                in_format,
                out_format,
                decision.effective_intent,
                flags,
            )?
        } else {
            let fingerprint = crate::cache::TransformFingerprint {
                source: src_fingerprint.key(),
                destination: dst_fingerprint.key(),
                in_format: in_format.bits(),
                out_format: out_format.bits(),
                intent: decision.effective_intent.engine_constant(),
                flags: flags.bits(),
            };
            self.profile_cache.get_or_create_transform(
                engine,
                &fingerprint,
                src_profile,
                in_format,
                dst_profile,
                out_format,
                decision.effective_intent,
                flags,
            )?
        };

        // Step 7: allocate output buffer and run the transform.
        let mut output_pixels =
            ConversionPolicy::create_output_buffer(out_format, pixel_count, destination_channels);
        engine.transform_array(transform, &input_buf, &mut output_pixels, pixel_count)?;

        Ok(ConvertedBuffer {
            output_pixels,
            pixel_count,
            input_channels: options.source_channels,
            output_channels: destination_channels,
        })
    }

    /// `spec.md` §4.6 `dispose()`.
    pub fn dispose(&mut self, engine: &mut dyn ColorEngine) {
        self.profile_cache.dispose(engine);
        self.overrides.clear();
    }
}

fn destination_format_space(space: DestinationColorSpace) -> FormatColorSpace {
    match space {
        DestinationColorSpace::Cmyk => FormatColorSpace::Cmyk,
        DestinationColorSpace::Rgb => FormatColorSpace::Rgb,
        DestinationColorSpace::Gray => FormatColorSpace::Gray,
        DestinationColorSpace::Lab => FormatColorSpace::Lab,
    }
}

fn source_profile_fingerprint(bytes: Option<&[u8]>, is_lab: bool) -> crate::cache::ProfileFingerprint {
    if is_lab {
        crate::cache::ProfileFingerprint::Lab
    } else {
        crate::cache::ProfileFingerprint::for_embedded(bytes.unwrap_or(&[]))
    }
}

fn destination_profile_fingerprint(config: &Configuration) -> crate::cache::ProfileFingerprint {
    match &config.destination_profile {
        Some(bytes) => crate::cache::ProfileFingerprint::for_embedded(bytes),
        None => crate::cache::ProfileFingerprint::Lab,
    }
}
