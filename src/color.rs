//! Color values and normalized PDF color-space tags (`spec.md` §3).
//!
//! These are plain value types: they carry no profile and do no conversion
//! themselves. Profiles and transforms live in [`crate::engine`]; the
//! conversion pipeline lives in [`crate::converter`].

/// An RGB color with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn black() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn white() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }

    pub fn is_neutral_gray(&self) -> bool {
        (self.r - self.g).abs() < f32::EPSILON && (self.g - self.b).abs() < f32::EPSILON
    }
}

/// A gray value in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gray(pub f32);

/// A device CMYK color with components in `0.0..=1.0`.
///
/// The engine's internal convention for CMYK is `0..100`; converters
/// translate at the boundary (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cmyk {
    pub c: f32,
    pub m: f32,
    pub y: f32,
    pub k: f32,
}

impl Cmyk {
    pub fn new(c: f32, m: f32, y: f32, k: f32) -> Self {
        Self { c, m, y, k }
    }

    /// Converts to the engine's internal `0..100` convention.
    pub fn to_engine_range(self) -> [f32; 4] {
        [self.c * 100.0, self.m * 100.0, self.y * 100.0, self.k * 100.0]
    }

    /// Builds a CMYK color from the engine's internal `0..100` convention.
    pub fn from_engine_range(v: [f32; 4]) -> Self {
        Self::new(v[0] / 100.0, v[1] / 100.0, v[2] / 100.0, v[3] / 100.0)
    }
}

/// A CIE L*a*b* color. `l` in `0..=100`, `a`/`b` in `-128..=127` (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lab {
    pub l: f32,
    pub a: f32,
    pub b: f32,
}

impl Lab {
    pub fn new(l: f32, a: f32, b: f32) -> Self {
        Self { l, a, b }
    }

    pub fn is_black(&self) -> bool {
        self.l <= f32::EPSILON
    }

    pub fn is_white(&self) -> bool {
        (self.l - 100.0).abs() < f32::EPSILON
    }
}

/// A CIE XYZ color, used internally by the composite-LUT blackpoint-scaling
/// path (`spec.md` §4.4 step 6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Xyz {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Xyz {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The D65 whitepoint, used as the scaling target in the blackpoint
    /// round-trip (`spec.md` §4.4 step 6).
    pub const D65: Xyz = Xyz {
        x: 0.9505,
        y: 1.0,
        z: 1.089,
    };
}

/// The normalized color-space type of a named PDF color-space resource
/// (`spec.md` §3 "PDF Color-Space Definition").
#[derive(Debug, Clone, PartialEq)]
pub enum PdfColorSpaceKind {
    DeviceGray,
    DeviceRgb,
    DeviceCmyk,
    SGray,
    Srgb,
    Lab {
        /// `[a_min, a_max, b_min, b_max]`.
        range: [f32; 4],
    },
    Cmyk,
    IccBased {
        /// The raw (already-inflated) ICC profile bytes.
        profile: Vec<u8>,
        /// The ICC header's own declared color space, used to pick the
        /// channel count when the profile can't be opened speculatively.
        header_color_space: IccHeaderColorSpace,
    },
    Indexed {
        base: Box<PdfColorSpaceKind>,
        /// Maximum palette index (`hival`).
        hival: u32,
        /// Raw palette bytes, `base`'s channel count per entry.
        lookup: Vec<u8>,
    },
}

impl PdfColorSpaceKind {
    /// Number of channels a value in this color space carries.
    pub fn channel_count(&self) -> u32 {
        match self {
            PdfColorSpaceKind::DeviceGray | PdfColorSpaceKind::SGray => 1,
            PdfColorSpaceKind::DeviceRgb | PdfColorSpaceKind::Srgb => 3,
            PdfColorSpaceKind::DeviceCmyk | PdfColorSpaceKind::Cmyk => 4,
            PdfColorSpaceKind::Lab { .. } => 3,
            PdfColorSpaceKind::IccBased {
                header_color_space, ..
            } => header_color_space.channel_count(),
            PdfColorSpaceKind::Indexed { .. } => 1,
        }
    }
}

/// The ICC header's declared color space signature, used only to size
/// channel counts for `ICCBased` entries (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IccHeaderColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Lab,
}

impl IccHeaderColorSpace {
    pub fn channel_count(self) -> u32 {
        match self {
            IccHeaderColorSpace::Gray => 1,
            IccHeaderColorSpace::Rgb => 3,
            IccHeaderColorSpace::Cmyk => 4,
            IccHeaderColorSpace::Lab => 3,
        }
    }
}

/// The destination color space a conversion job targets (`spec.md` §3/§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationColorSpace {
    Cmyk,
    Rgb,
    Gray,
    Lab,
}

impl DestinationColorSpace {
    pub fn channel_count(self) -> u32 {
        match self {
            DestinationColorSpace::Cmyk => 4,
            DestinationColorSpace::Rgb | DestinationColorSpace::Lab => 3,
            DestinationColorSpace::Gray => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_gray_detection() {
        assert!(Rgb::new(0.5, 0.5, 0.5).is_neutral_gray());
        assert!(!Rgb::new(0.5, 0.4, 0.5).is_neutral_gray());
    }

    #[test]
    fn cmyk_engine_range_round_trip() {
        let c = Cmyk::new(0.1, 0.2, 0.3, 0.4);
        let engine = c.to_engine_range();
        let back = Cmyk::from_engine_range(engine);
        assert!((back.c - c.c).abs() < 1e-5);
        assert!((back.k - c.k).abs() < 1e-5);
    }

    #[test]
    fn lab_black_and_white() {
        assert!(Lab::new(0.0, 0.0, 0.0).is_black());
        assert!(Lab::new(100.0, 0.0, 0.0).is_white());
        assert!(!Lab::new(50.0, 0.0, 0.0).is_black());
    }
}
