//! Profile & Transform Cache (`spec.md` §4.3 "Profile & Transform Cache
//! (C3)"), owned by the Base Converter.
//!
//! Fingerprinting follows `spec.md` §3 exactly: profiles fingerprint to
//! `"Lab"`, `"sRGB"`, or `buf:<byteLength>:<firstByte>:<lastByte>`; single-
//! profile transforms concatenate source/destination fingerprints with
//! format/intent/flags; multi-profile transforms prefix with `multi:` and
//! use a separate map so the two fingerprint spaces can never collide.

use std::collections::HashMap;

use crate::engine::flags::EngineFlags;
use crate::engine::format::PixelFormat;
use crate::engine::intent::RenderingIntent;
use crate::engine::{ColorEngine, ProfileHandle, TransformHandle};
use crate::error::Result;

/// A profile's cache fingerprint (`spec.md` §3 "Profile").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProfileFingerprint {
    Lab,
    Srgb,
    Embedded { len: usize, first: u8, last: u8 },
}

impl ProfileFingerprint {
    pub fn for_embedded(bytes: &[u8]) -> Self {
        ProfileFingerprint::Embedded {
            len: bytes.len(),
            first: *bytes.first().unwrap_or(&0),
            last: *bytes.last().unwrap_or(&0),
        }
    }

    pub fn key(&self) -> String {
        match self {
            ProfileFingerprint::Lab => "Lab".to_string(),
            ProfileFingerprint::Srgb => "sRGB".to_string(),
            ProfileFingerprint::Embedded { len, first, last } => {
                format!("buf:{len}:{first}:{last}")
            }
        }
    }
}

/// A single-profile transform's fingerprint (`spec.md` §3 "Transform").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransformFingerprint {
    pub source: String,
    pub destination: String,
    pub in_format: u32,
    pub out_format: u32,
    pub intent: u32,
    pub flags: u32,
}

impl TransformFingerprint {
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.source, self.destination, self.in_format, self.out_format, self.intent, self.flags
        )
    }
}

/// Owns the profile-handle and (single- and multi-profile) transform-handle
/// maps for one converter.
pub struct ProfileTransformCache {
    profiles: HashMap<String, ProfileHandle>,
    transforms: HashMap<String, TransformHandle>,
    multi_transforms: HashMap<String, TransformHandle>,
}

impl ProfileTransformCache {
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
            transforms: HashMap::new(),
            multi_transforms: HashMap::new(),
        }
    }

    pub fn get_or_open_profile(
        &mut self,
        engine: &mut dyn ColorEngine,
        fingerprint: &ProfileFingerprint,
        bytes: Option<&[u8]>,
    ) -> Result<ProfileHandle> {
        let key = fingerprint.key();
        if let Some(handle) = self.profiles.get(&key) {
            return Ok(*handle);
        }
        let handle = match fingerprint {
            ProfileFingerprint::Lab => engine.create_lab_d50_profile()?,
            ProfileFingerprint::Srgb => engine.create_srgb_profile()?,
            ProfileFingerprint::Embedded { .. } => {
                engine.open_profile_from_mem(bytes.unwrap_or_default())?
            }
        };
        self.profiles.insert(key, handle);
        Ok(handle)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get_or_create_transform(
        &mut self,
        engine: &mut dyn ColorEngine,
        fingerprint: &TransformFingerprint,
        src: ProfileHandle,
        in_format: PixelFormat,
        dst: ProfileHandle,
        out_format: PixelFormat,
        intent: RenderingIntent,
        flags: EngineFlags,
    ) -> Result<TransformHandle> {
        let key = fingerprint.key();
        if let Some(handle) = self.transforms.get(&key) {
            return Ok(*handle);
        }
        let handle = engine.create_transform(src, in_format, dst, out_format, intent, flags)?;
        self.transforms.insert(key, handle);
        Ok(handle)
    }

    /// `spec.md` §3: "Multi-profile transform fingerprint prefixes with
    /// `multi:` and joins all profile fingerprints in order."
    #[allow(clippy::too_many_arguments)]
    pub fn get_or_create_multiprofile_transform(
        &mut self,
        engine: &mut dyn ColorEngine,
        profile_fingerprints: &[String],
        profiles: &[ProfileHandle],
        in_format: PixelFormat,
        out_format: PixelFormat,
        intent: RenderingIntent,
        flags: EngineFlags,
    ) -> Result<TransformHandle> {
        let key = format!("multi:{}", profile_fingerprints.join(":"));
        if let Some(handle) = self.multi_transforms.get(&key) {
            return Ok(*handle);
        }
        let handle =
            engine.create_multiprofile_transform(profiles, in_format, out_format, intent, flags)?;
        self.multi_transforms.insert(key, handle);
        Ok(handle)
    }

    /// `dispose()`-style teardown (`spec.md` §4.6): delete every transform
    /// first (any order), then close every profile.
    pub fn dispose(&mut self, engine: &mut dyn ColorEngine) {
        for handle in self.transforms.values().chain(self.multi_transforms.values()) {
            engine.delete_transform(*handle);
        }
        self.transforms.clear();
        self.multi_transforms.clear();

        for handle in self.profiles.values() {
            engine.close_profile(*handle);
        }
        self.profiles.clear();
    }
}

impl Default for ProfileTransformCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_fingerprint_format() {
        let bytes = [0xAAu8, 1, 2, 0xBB];
        let fp = ProfileFingerprint::for_embedded(&bytes);
        assert_eq!(fp.key(), "buf:4:170:187");
    }

    #[test]
    fn built_in_fingerprints() {
        assert_eq!(ProfileFingerprint::Lab.key(), "Lab");
        assert_eq!(ProfileFingerprint::Srgb.key(), "sRGB");
    }

    #[test]
    fn transform_fingerprint_key_is_pipe_joined() {
        let fp = TransformFingerprint {
            source: "sRGB".to_string(),
            destination: "buf:128:0:1".to_string(),
            in_format: 1,
            out_format: 2,
            intent: 1,
            flags: 0,
        };
        assert_eq!(fp.key(), "sRGB|buf:128:0:1|1|2|1|0");
    }
}
