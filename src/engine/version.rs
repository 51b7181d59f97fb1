//! Engine version introspection (`spec.md` §4.2 "Version check").
//!
//! `lcms2::version()` returns LittleCMS's own encoded version integer (e.g.
//! `2160` for 2.16), not the `YYYYMMDD` scheme `spec.md` §4.2 describes in
//! prose. There is no 1:1 mapping between the two, so `pdf-recolor` resolves
//! this directly in terms of the encoding the engine actually reports:
//! `EngineVersion` wraps the LittleCMS-encoded integer, and every
//! `minimum_engine_version()` a converter role advertises is expressed in
//! that same encoding (see `DESIGN.md`).

/// The color engine's reported version, LittleCMS-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EngineVersion(u32);

impl EngineVersion {
    pub const fn from_lcms_encoded(value: u32) -> Self {
        Self(value)
    }

    pub fn encoded(self) -> u32 {
        self.0
    }
}

/// Converter roles advertise a minimum supported engine version
/// (`spec.md` §4.2); construction fails with
/// [`crate::error::Error::UnsupportedEngineVersion`] below this floor.
pub trait RequiresEngineVersion {
    /// A short, human-readable name used in the error message
    /// (e.g. `"ImageConverter"`).
    const CONVERTER_NAME: &'static str;
    /// Minimum LittleCMS-encoded version this role requires.
    const MINIMUM_ENGINE_VERSION: EngineVersion;

    fn check_engine_version(found: EngineVersion) -> crate::error::Result<()> {
        if found < Self::MINIMUM_ENGINE_VERSION {
            return Err(crate::error::Error::UnsupportedEngineVersion {
                converter: Self::CONVERTER_NAME,
                required: Self::MINIMUM_ENGINE_VERSION.encoded(),
                found: found.encoded(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering() {
        let old = EngineVersion::from_lcms_encoded(2120);
        let new = EngineVersion::from_lcms_encoded(2160);
        assert!(old < new);
    }
}
