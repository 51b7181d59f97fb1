//! The color engine boundary (`spec.md` §4.2 "Engine Provider (C2)").
//!
//! Everything above this module talks in terms of packed [`format::PixelFormat`]
//! integers, [`intent::RenderingIntent`], and [`flags::EngineFlags`] — plain
//! data, never the underlying engine's own types. [`lcms_engine::LcmsEngine`]
//! is the one place that actually calls into `lcms2`; this is the system's
//! one deliberately-opaque external collaborator (`spec.md` §6).

pub mod flags;
pub mod format;
pub mod intent;
pub mod lcms_engine;
pub mod version;

use crate::error::Result;
use format::PixelFormat;
use intent::RenderingIntent;
use version::EngineVersion;

/// Opaque profile handle, engine-assigned (`spec.md` §3 "Profile").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProfileHandle(pub u32);

/// Opaque transform handle (`spec.md` §3 "Transform").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransformHandle(pub u32);

/// A thin wrapper over the external color engine (`spec.md` §4.2).
///
/// `initialize()` is idempotent: implementations must return the same
/// completed state on every call after the first, and do any one-time
/// runtime setup (endianness probe) lazily on first call.
pub trait ColorEngine {
    fn initialize(&mut self) -> Result<()>;

    fn engine_version(&self) -> EngineVersion;

    /// True if 16-bit samples need byte-swapping before this engine can
    /// consume a big-endian-sourced buffer natively (`spec.md` §4.2
    /// "Endianness detection").
    fn engine_memory_is_little_endian(&self) -> bool;

    fn open_profile_from_mem(&mut self, bytes: &[u8]) -> Result<ProfileHandle>;
    fn create_lab_d50_profile(&mut self) -> Result<ProfileHandle>;
    fn create_srgb_profile(&mut self) -> Result<ProfileHandle>;
    fn close_profile(&mut self, handle: ProfileHandle);

    #[allow(clippy::too_many_arguments)]
    fn create_transform(
        &mut self,
        src_profile: ProfileHandle,
        in_format: PixelFormat,
        dst_profile: ProfileHandle,
        out_format: PixelFormat,
        intent: RenderingIntent,
        flags: flags::EngineFlags,
    ) -> Result<TransformHandle>;

    fn create_multiprofile_transform(
        &mut self,
        profiles: &[ProfileHandle],
        in_format: PixelFormat,
        out_format: PixelFormat,
        intent: RenderingIntent,
        flags: flags::EngineFlags,
    ) -> Result<TransformHandle>;

    fn delete_transform(&mut self, handle: TransformHandle);

    fn transform_array(
        &self,
        transform: TransformHandle,
        in_buf: &[u8],
        out_buf: &mut [u8],
        pixel_count: usize,
    ) -> Result<()>;
}

/// Runtime byte-order of this process, detected once (`spec.md` §9 "Global
/// endianness detection"). Backed by [`once_cell::sync::Lazy`], the same
/// lazy-singleton idiom the teacher uses for its static deflated resources.
pub static RUNTIME_ENDIANNESS: once_cell::sync::Lazy<Endianness> =
    once_cell::sync::Lazy::new(detect_runtime_endianness);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

fn detect_runtime_endianness() -> Endianness {
    let probe: u32 = 1;
    let bytes = probe.to_ne_bytes();
    if bytes[0] == 1 {
        Endianness::Little
    } else {
        Endianness::Big
    }
}
