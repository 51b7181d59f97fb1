//! Engine transform flags (`spec.md` §6 "Flags").

/// Packed transform-creation flags, matching the published bit layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineFlags(u32);

pub const BLACKPOINT_COMPENSATION: u32 = 0x2000;
pub const NO_CACHE: u32 = 0x40;
pub const NO_OPTIMIZE: u32 = 0x100;
pub const MULTIPROFILE_BLACKPOINT_SCALING: u32 = 0x2000_0000;
pub const BLACKPOINT_COMPENSATION_CLAMPING: u32 = 0x8000_0000;

impl EngineFlags {
    pub fn none() -> Self {
        Self(0)
    }

    pub fn with_black_point_compensation(mut self, on: bool) -> Self {
        self.set(BLACKPOINT_COMPENSATION, on);
        self
    }

    pub fn with_no_cache(mut self, on: bool) -> Self {
        self.set(NO_CACHE, on);
        self
    }

    pub fn with_no_optimize(mut self, on: bool) -> Self {
        self.set(NO_OPTIMIZE, on);
        self
    }

    pub fn with_multiprofile_black_point_scaling(mut self, on: bool) -> Self {
        self.set(MULTIPROFILE_BLACKPOINT_SCALING, on);
        self
    }

    pub fn with_black_point_compensation_clamping(mut self, on: bool) -> Self {
        self.set(BLACKPOINT_COMPENSATION_CLAMPING, on);
        self
    }

    fn set(&mut self, bit: u32, on: bool) {
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    /// Strips the clamping flag, for use on every transform in a chain
    /// except the final one returned to the caller (`spec.md` §6: "The
    /// clamping flag is stripped from intermediates and only carried on the
    /// final returned transform").
    pub fn without_clamping(self) -> Self {
        Self(self.0 & !BLACKPOINT_COMPENSATION_CLAMPING)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Converts to the concrete `lcms2` flags type. `lcms2::Flags`'s inner
    /// field is public specifically so callers can carry bit patterns the
    /// high-level constructors don't name (like the two engine-custom
    /// blackpoint-scaling/clamping bits here).
    pub fn to_lcms(self) -> lcms2::Flags {
        lcms2::Flags(self.0, lcms2::AllowCache)
    }
}
