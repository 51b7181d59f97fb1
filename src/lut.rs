//! The Composite-LUT Builder (`spec.md` §4.4 "Composite-LUT Builder (C4) —
//! the hard part").
//!
//! Builds a single lookup table spanning a *chain* of two-profile
//! transforms (e.g. Gray → sRGB → CMYK), something no single `lcms2`
//! transform can represent directly ("three-or-more-profile native paths
//! are known to have inconsistent behavior across engine builds", §4.4
//! step 1). Rather than round-tripping the sampled table back through
//! `lcms2`'s native `Pipeline`/devicelink machinery — whose exact stage-
//! wiring differs across `lcms2`/`lcms2-sys` releases — the sampled grid is
//! kept as this crate's own [`Clut`] value and evaluated by multilinear
//! interpolation. This reaches the same observable contract the spec asks
//! for (a lookup reachable through the ordinary transform/`transformArray`
//! path, §4.4 step 7) without depending on unstable low-level wiring; see
//! `DESIGN.md`.

use crate::cache::profile_cache::ProfileTransformCache;
use crate::color::Xyz;
use crate::engine::flags::EngineFlags;
use crate::engine::format::{FormatColorSpace, PixelFormat};
use crate::engine::intent::RenderingIntent;
use crate::engine::{ColorEngine, ProfileHandle};
use crate::error::{Error, Result};

/// Sentinel for "a" and "b" in 16-bit Lab encoding representing zero chroma
/// (`spec.md` §4.4 step 5: "32896 in 16-bit Lab encoding").
const LAB16_NEUTRAL: u16 = 32896;

/// A sampled, multilinear-interpolated composite lookup table
/// (`spec.md` §3/§4.4).
#[derive(Debug, Clone)]
pub struct Clut {
    pub input_channels: u32,
    pub output_channels: u32,
    pub grid_points: usize,
    /// Row-major table: `grid_points^input_channels` cells, each
    /// `output_channels` floats in `0.0..=1.0`.
    table: Vec<f32>,
    /// Cached evaluation of the all-zero input vector (§4.4 step 7:
    /// "Initialize the zero-input cache ... else cached single-pixel calls
    /// return stale zero output").
    zero_input_cache: Option<Vec<f32>>,
}

impl Clut {
    fn cell_index(&self, coords: &[usize]) -> usize {
        let mut index = 0usize;
        for &c in coords {
            index = index * self.grid_points + c;
        }
        index * self.output_channels as usize
    }

    fn set_cell(&mut self, coords: &[usize], values: &[f32]) {
        let idx = self.cell_index(coords);
        self.table[idx..idx + self.output_channels as usize].copy_from_slice(values);
    }

    fn get_cell(&self, coords: &[usize]) -> &[f32] {
        let idx = self.cell_index(coords);
        &self.table[idx..idx + self.output_channels as usize]
    }

    /// Samples the table at an arbitrary input point in `0.0..=1.0` per
    /// channel via multilinear interpolation.
    pub fn sample(&self, input: &[f32]) -> Vec<f32> {
        debug_assert_eq!(input.len(), self.input_channels as usize);

        if input.iter().all(|v| *v == 0.0) {
            if let Some(cached) = &self.zero_input_cache {
                return cached.clone();
            }
        }

        let n = self.input_channels as usize;
        let max_index = self.grid_points - 1;
        let mut lo = vec![0usize; n];
        let mut frac = vec![0f32; n];
        for i in 0..n {
            let scaled = input[i].clamp(0.0, 1.0) * max_index as f32;
            lo[i] = (scaled.floor() as usize).min(max_index.saturating_sub(1).max(0));
            frac[i] = scaled - lo[i] as f32;
        }

        let mut out = vec![0f32; self.output_channels as usize];
        // Iterate all 2^n corners of the enclosing cell.
        for corner in 0..(1usize << n) {
            let mut weight = 1f32;
            let mut coords = vec![0usize; n];
            for i in 0..n {
                let bit = (corner >> i) & 1;
                coords[i] = (lo[i] + bit).min(max_index);
                weight *= if bit == 1 { frac[i] } else { 1.0 - frac[i] };
            }
            if weight == 0.0 {
                continue;
            }
            let cell = self.get_cell(&coords);
            for (o, c) in out.iter_mut().zip(cell.iter()) {
                *o += weight * c;
            }
        }
        out
    }
}

/// `spec.md` §4.4 step 2: "higher for Lab (perceptual uniformity), lower for
/// Gray (dimensionally small)".
pub fn grid_resolution_for(input_space: FormatColorSpace) -> usize {
    match input_space {
        FormatColorSpace::Lab => 33,
        FormatColorSpace::Gray => 9,
        _ => 17,
    }
}

/// One hop of the chain: the transform connecting `profiles[i]` to
/// `profiles[i + 1]`.
pub struct ChainHop {
    pub src: ProfileHandle,
    pub dst: ProfileHandle,
}

/// Builds a chain of two-profile transforms (`spec.md` §4.4 step 1) at
/// 32-bit float precision, so the sampler can feed raw float triples
/// through each hop without a pixel-format dance.
pub fn build_chain(
    engine: &mut dyn ColorEngine,
    hops: &[ChainHop],
    channels_per_hop: &[(u32, u32)],
    intent: RenderingIntent,
    black_point_compensation: bool,
) -> Result<Vec<crate::engine::TransformHandle>> {
    let mut handles = Vec::with_capacity(hops.len());
    for (hop, &(in_ch, out_ch)) in hops.iter().zip(channels_per_hop) {
        let in_fmt = float_format(in_ch);
        let out_fmt = float_format(out_ch);
        // BPC on where applicable; the clamping flag never belongs on an
        // intermediate hop (§6: "stripped from intermediates").
        let flags = EngineFlags::none()
            .with_black_point_compensation(black_point_compensation)
            .without_clamping();
        let handle = engine.create_transform(hop.src, in_fmt, hop.dst, out_fmt, intent, flags)?;
        handles.push(handle);
    }
    Ok(handles)
}

fn float_format(channels: u32) -> PixelFormat {
    PixelFormat::new(FormatColorSpace::Rgb, channels, 4).with_float(true)
}

/// Runs one float triple/quad through every hop in sequence.
fn run_chain(engine: &dyn ColorEngine, chain: &[crate::engine::TransformHandle], input: &[f32]) -> Result<Vec<f32>> {
    let mut current = input.to_vec();
    for &hop in chain {
        let in_bytes: Vec<u8> = current.iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut out_bytes = vec![0u8; in_bytes.len()];
        engine.transform_array(hop, &in_bytes, &mut out_bytes, 1)?;
        current = out_bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
    }
    Ok(current)
}

/// `spec.md` §4.4 steps 3–4: allocates and samples the CLUT by feeding every
/// grid point through `chain`.
pub fn sample_clut(
    engine: &dyn ColorEngine,
    chain: &[crate::engine::TransformHandle],
    input_channels: u32,
    output_channels: u32,
    grid_points: usize,
) -> Result<Clut> {
    let total_cells = grid_points.pow(input_channels);
    let mut table = vec![0f32; total_cells * output_channels as usize];

    let mut coords = vec![0usize; input_channels as usize];
    for cell in 0..total_cells {
        let mut rem = cell;
        for i in (0..input_channels as usize).rev() {
            coords[i] = rem % grid_points;
            rem /= grid_points;
        }
        let input: Vec<f32> = coords
            .iter()
            .map(|&c| c as f32 / (grid_points - 1).max(1) as f32)
            .collect();
        let output = run_chain(engine, chain, &input)?;
        let idx = cell * output_channels as usize;
        table[idx..idx + output_channels as usize].copy_from_slice(&output[..output_channels as usize]);
    }

    let mut clut = Clut {
        input_channels,
        output_channels,
        grid_points,
        table,
        zero_input_cache: None,
    };
    let zero = vec![0f32; input_channels as usize];
    clut.zero_input_cache = Some(clut.sample(&zero));
    Ok(clut)
}

/// `spec.md` §4.4 step 5: "if the final color space is Lab, any cell whose L
/// is exactly 0 or its 16-bit maximum must have a = b = neutral".
pub fn coerce_achromatic_lab(clut: &mut Clut, final_space_is_lab: bool) {
    if !final_space_is_lab || clut.output_channels != 3 {
        return;
    }
    let cells = clut.table.len() / 3;
    for cell in 0..cells {
        let base = cell * 3;
        let l16 = (clut.table[base].clamp(0.0, 1.0) * 65535.0).round() as u16;
        if l16 == 0 || l16 == u16::MAX {
            let neutral = LAB16_NEUTRAL as f32 / 65535.0;
            clut.table[base + 1] = neutral;
            clut.table[base + 2] = neutral;
        }
    }
}

/// `spec.md` §4.4 step 6: "Pure-black pretest" — if pure black through the
/// chain already lands within tolerance of the destination black, blackpoint
/// XYZ scaling is skipped entirely.
pub fn pure_black_pretest_passes(residual: &[f32]) -> bool {
    let all_below = residual.iter().all(|c| c.abs() < 0.001);
    let any_tiny = residual.iter().any(|c| c.abs() <= 0.000_01);
    all_below && any_tiny
}

/// `spec.md` §4.4 step 6: scales XYZ to undo the engine's blackpoint-
/// compensation "lifted black". `lifted_black` is the Y channel the chain
/// produced for pure-black input; `wanted_black` is the true destination
/// black Y (usually 0).
pub fn blackpoint_scale(xyz: Xyz, lifted_black_y: f32, wanted_black_y: f32) -> Xyz {
    let denom = (1.0 - lifted_black_y).max(1e-6);
    let scale = (1.0 - wanted_black_y) / denom;
    let offset = 1.0 - scale;
    Xyz::new(
        xyz.x * scale + offset * Xyz::D65.x,
        xyz.y * scale + offset * Xyz::D65.y,
        xyz.z * scale + offset * Xyz::D65.z,
    )
}

/// `spec.md` §4.4 "K-only-GCR variant": if the penultimate color space is
/// not RGB, a synthesized sRGB intermediate profile must be inserted so the
/// final K-only stage always receives RGB input.
pub fn ensure_rgb_penultimate(
    engine: &mut dyn ColorEngine,
    cache: &mut ProfileTransformCache,
    penultimate_is_rgb: bool,
) -> Result<Option<ProfileHandle>> {
    if penultimate_is_rgb {
        return Ok(None);
    }
    let fingerprint = crate::cache::profile_cache::ProfileFingerprint::Srgb;
    let handle = cache.get_or_open_profile(engine, &fingerprint, None)?;
    Ok(Some(handle))
}

pub fn check_chain_nonempty(hops: &[ChainHop]) -> Result<()> {
    if hops.is_empty() {
        return Err(Error::EngineError(
            "composite LUT chain requires at least one hop".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_resolution_matches_color_space() {
        assert!(grid_resolution_for(FormatColorSpace::Lab) > grid_resolution_for(FormatColorSpace::Gray));
    }

    #[test]
    fn achromatic_coercion_forces_neutral_at_black() {
        let mut clut = Clut {
            input_channels: 1,
            output_channels: 3,
            grid_points: 2,
            table: vec![0.0, 0.3, 0.7, 1.0, 0.1, 0.2],
            zero_input_cache: None,
        };
        coerce_achromatic_lab(&mut clut, true);
        let neutral = LAB16_NEUTRAL as f32 / 65535.0;
        assert!((clut.table[1] - neutral).abs() < 1e-6);
        assert!((clut.table[2] - neutral).abs() < 1e-6);
    }

    #[test]
    fn pure_black_pretest() {
        assert!(pure_black_pretest_passes(&[0.0, 0.0001, 0.0]));
        assert!(!pure_black_pretest_passes(&[0.005, 0.0001, 0.0]));
        assert!(!pure_black_pretest_passes(&[0.0005, 0.0005, 0.0005]));
    }

    #[test]
    fn blackpoint_scale_is_identity_when_already_black() {
        let xyz = Xyz::new(0.0, 0.0, 0.0);
        let scaled = blackpoint_scale(xyz, 0.0, 0.0);
        assert!((scaled.x).abs() < 1e-6);
        assert!((scaled.y).abs() < 1e-6);
        assert!((scaled.z).abs() < 1e-6);
    }

    #[test]
    fn clut_sample_interpolates_linearly() {
        let clut = Clut {
            input_channels: 1,
            output_channels: 1,
            grid_points: 2,
            table: vec![0.0, 1.0],
            zero_input_cache: Some(vec![0.0]),
        };
        let mid = clut.sample(&[0.5]);
        assert!((mid[0] - 0.5).abs() < 1e-6);
    }
}
