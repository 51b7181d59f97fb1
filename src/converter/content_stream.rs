//! The Content-Stream Converter (`spec.md` §4.8 "Content-Stream Converter
//! (C8)").
//!
//! Parses a PDF content stream's color operators with a hand-written
//! tokenizer rather than a regular expression (`spec.md` §9: "re-implement
//! as a hand-written tokenizer with a small operator-keyword table; the
//! regex is a readable specification but not a portable implementation
//! strategy"). Graphics-state continuity across a page's streams follows
//! the teacher's `GraphicsStates` save/restore stack idiom, generalized
//! here from a single current-state slot to the stroke/fill color-space
//! pair this system tracks.

use std::collections::HashMap;

use crate::cache::PendingColor;
use crate::color::{Cmyk, DestinationColorSpace, Gray, Lab, PdfColorSpaceKind, Rgb};
use crate::converter::{BaseConverter, ConvertBufferOptions};
use crate::engine::format::FormatColorSpace;
use crate::engine::ColorEngine;
use crate::error::ParseWarning;

/// The normalized color space an operation's numeric values are in, once a
/// named space has been resolved (`spec.md` §4.8 "Conversion selection").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertibleSpace {
    Rgb,
    Gray,
    Lab,
}

/// One parsed color operation (`spec.md` §3 "Content-Stream Operation").
#[derive(Debug, Clone, PartialEq)]
pub struct ContentStreamOperation {
    pub operator: String,
    pub is_stroke: bool,
    pub operands: Vec<f32>,
    /// The named color space this operation was written in, if any
    /// (`CS`/`cs`, or carried over from the last `cs` for `SC`/`SCN`).
    pub named_space: Option<String>,
    /// A leading pattern/reference name for `SCN`/`scn` (`spec.md` §4.8:
    /// "SCN/scn preceded by a name").
    pub pattern_name: Option<String>,
    pub byte_offset: usize,
    pub byte_length: usize,
}

/// `spec.md` §3 "Color-Space State".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorSpaceState {
    pub stroke: Option<String>,
    pub fill: Option<String>,
}

const OPERATOR_KEYWORDS: &[&str] = &[
    "CS", "cs", "G", "g", "RG", "rg", "K", "k", "SC", "sc", "SCN", "scn",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f32),
    Name(String),
    Operator(String),
    Other,
}

struct Lexeme {
    token: Token,
    start: usize,
    end: usize,
}

/// Hand-written tokenizer: scans whitespace/delimiter-separated lexemes,
/// classifying numbers, `/Name` tokens, and operator keywords.
fn tokenize(data: &str) -> Vec<Lexeme> {
    let bytes = data.as_bytes();
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        if c == b'/' {
            i += 1;
            while i < bytes.len() && is_regular(bytes[i]) {
                i += 1;
            }
            out.push(Lexeme {
                token: Token::Name(data[start + 1..i].to_string()),
                start,
                end: i,
            });
            continue;
        }
        if c == b'(' {
            // Literal string: skip to matching unescaped close paren,
            // respecting nesting, without interpreting contents (color
            // operators never take literal strings as operands).
            let mut depth = 1i32;
            i += 1;
            while i < bytes.len() && depth > 0 {
                match bytes[i] {
                    b'\\' => i += 1,
                    b'(' => depth += 1,
                    b')' => depth -= 1,
                    _ => {}
                }
                i += 1;
            }
            out.push(Lexeme {
                token: Token::Other,
                start,
                end: i,
            });
            continue;
        }
        if c == b'-' || c == b'+' || c == b'.' || c.is_ascii_digit() {
            i += 1;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.' || bytes[i] == b'e' || bytes[i] == b'E' || bytes[i] == b'-' || bytes[i] == b'+')
            {
                i += 1;
            }
            let slice = &data[start..i];
            match slice.parse::<f32>() {
                Ok(n) => out.push(Lexeme {
                    token: Token::Number(n),
                    start,
                    end: i,
                }),
                Err(_) => out.push(Lexeme {
                    token: Token::Other,
                    start,
                    end: i,
                }),
            }
            continue;
        }
        if c.is_ascii_alphabetic() || c == b'\'' || c == b'"' {
            while i < bytes.len() && (bytes[i].is_ascii_alphabetic() || bytes[i] == b'\'' || bytes[i] == b'"') {
                i += 1;
            }
            let word = &data[start..i];
            if OPERATOR_KEYWORDS.contains(&word) {
                out.push(Lexeme {
                    token: Token::Operator(word.to_string()),
                    start,
                    end: i,
                });
            } else {
                out.push(Lexeme {
                    token: Token::Operator(word.to_string()),
                    start,
                    end: i,
                });
            }
            continue;
        }
        // Any other single-character delimiter (arrays, dicts, etc.).
        i += 1;
        out.push(Lexeme {
            token: Token::Other,
            start,
            end: i,
        });
    }
    out
}

fn is_regular(b: u8) -> bool {
    !b.is_ascii_whitespace() && !matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Parses a content stream's color operators, threading `initial_state`
/// across `SC`/`SCN` resolution. Returns the parsed operations and the
/// final color-space state (`spec.md` §4.8 "Parsing").
pub fn parse(data: &[u8], initial_state: ColorSpaceState) -> (Vec<ContentStreamOperation>, ColorSpaceState, Vec<ParseWarning>) {
    // PDF content streams are Latin-1: every byte is a valid code point.
    let text: String = data.iter().map(|&b| b as char).collect();
    let lexemes = tokenize(&text);

    let mut state = initial_state;
    let mut pending_numbers: Vec<f32> = Vec::new();
    let mut pending_name: Option<String> = None;
    let mut ops = Vec::new();
    let mut warnings = Vec::new();
    let mut op_start: Option<usize> = None;

    for lex in &lexemes {
        match &lex.token {
            Token::Number(n) => {
                if op_start.is_none() {
                    op_start = Some(lex.start);
                }
                pending_numbers.push(*n);
            }
            Token::Name(name) => {
                if op_start.is_none() {
                    op_start = Some(lex.start);
                }
                pending_name = Some(name.clone());
            }
            Token::Operator(op) => {
                let start = op_start.unwrap_or(lex.start);
                match op.as_str() {
                    "CS" | "cs" => {
                        let is_stroke = op == "CS";
                        if let Some(name) = pending_name.take() {
                            if is_stroke {
                                state.stroke = Some(name.clone());
                            } else {
                                state.fill = Some(name.clone());
                            }
                            ops.push(ContentStreamOperation {
                                operator: op.clone(),
                                is_stroke,
                                operands: Vec::new(),
                                named_space: Some(name),
                                pattern_name: None,
                                byte_offset: start,
                                byte_length: lex.end - start,
                            });
                        } else {
                            warnings.push(ParseWarning {
                                offset: start,
                                message: format!("{op} with no preceding color-space name"),
                            });
                        }
                    }
                    "G" | "g" | "RG" | "rg" | "K" | "k" => {
                        let is_stroke = op.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
                        let expected = match op.to_ascii_uppercase().as_str() {
                            "G" => 1,
                            "RG" => 3,
                            "K" => 4,
                            _ => 0,
                        };
                        if pending_numbers.len() != expected {
                            warnings.push(ParseWarning {
                                offset: start,
                                message: format!("{op}: expected {expected} operands, found {}", pending_numbers.len()),
                            });
                        } else {
                            ops.push(ContentStreamOperation {
                                operator: op.clone(),
                                is_stroke,
                                operands: pending_numbers.clone(),
                                named_space: None,
                                pattern_name: None,
                                byte_offset: start,
                                byte_length: lex.end - start,
                            });
                        }
                    }
                    "SC" | "sc" | "SCN" | "scn" => {
                        let is_stroke = op.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
                        let named_space = if is_stroke { state.stroke.clone() } else { state.fill.clone() };
                        ops.push(ContentStreamOperation {
                            operator: op.clone(),
                            is_stroke,
                            operands: pending_numbers.clone(),
                            named_space,
                            pattern_name: pending_name.clone(),
                            byte_offset: start,
                            byte_length: lex.end - start,
                        });
                    }
                    _ => {}
                }
                pending_numbers.clear();
                pending_name = None;
                op_start = None;
            }
            Token::Other => {
                pending_numbers.clear();
                pending_name = None;
                op_start = None;
            }
        }
    }

    (ops, state, warnings)
}

/// Resolves an operation's convertible space, if any
/// (`spec.md` §4.8 "Conversion selection").
///
/// `DeviceRGB`/`DeviceGray` operators are device colors by PDF semantics and
/// are left unchanged unless the caller has supplied an explicit source
/// profile to treat them as (`spec.md` §9 Open Question: "Device color
/// passthrough" — "Do not silently infer sRGB").
pub fn resolve_convertible_space(
    op: &ContentStreamOperation,
    color_spaces: &HashMap<String, PdfColorSpaceKind>,
    has_source_rgb_profile: bool,
    has_source_gray_profile: bool,
) -> Option<(ConvertibleSpace, Option<PdfColorSpaceKind>)> {
    match op.operator.as_str() {
        "G" | "g" => has_source_gray_profile.then_some((ConvertibleSpace::Gray, None)),
        "RG" | "rg" => has_source_rgb_profile.then_some((ConvertibleSpace::Rgb, None)),
        "K" | "k" => None, // DeviceCMYK passes through unchanged.
        "SC" | "sc" | "SCN" | "scn" => {
            let name = op.named_space.as_ref()?;
            let kind = color_spaces.get(name)?;
            match kind {
                PdfColorSpaceKind::Srgb | PdfColorSpaceKind::DeviceRgb => None,
                PdfColorSpaceKind::SGray | PdfColorSpaceKind::DeviceGray => None,
                PdfColorSpaceKind::Lab { .. } => Some((ConvertibleSpace::Lab, Some(kind.clone()))),
                PdfColorSpaceKind::IccBased { header_color_space, .. } => match header_color_space {
                    crate::color::IccHeaderColorSpace::Rgb => Some((ConvertibleSpace::Rgb, Some(kind.clone()))),
                    crate::color::IccHeaderColorSpace::Gray => Some((ConvertibleSpace::Gray, Some(kind.clone()))),
                    crate::color::IccHeaderColorSpace::Lab => Some((ConvertibleSpace::Lab, Some(kind.clone()))),
                    crate::color::IccHeaderColorSpace::Cmyk => None,
                },
                _ => None,
            }
        }
        _ => None,
    }
}

/// Builds the `ColorLookupCache` key for one convertible-space value
/// (`spec.md` §3 "Pending Color Entry").
fn pending_color_for(space: ConvertibleSpace, values: &[f32]) -> PendingColor {
    match space {
        ConvertibleSpace::Rgb => PendingColor::Rgb(Rgb::new(values[0], values[1], values[2])),
        ConvertibleSpace::Gray => PendingColor::Gray(Gray(values[0])),
        ConvertibleSpace::Lab => PendingColor::Lab(Lab::new(values[0], values[1], values[2])),
    }
}

/// `spec.md` §4.8 "Deduplication and batching": groups every unique
/// convertible color by space, calls `convertColorsBuffer` once per space,
/// and stores results in the per-stream lookup map.
///
/// Before converting, each unique color is checked against the shared
/// `ColorLookupCache` (`spec.md` §4.5 `storeColor`: "used by the
/// Content-Stream Converter to populate the cache after it has built a
/// lookup table directly") so repeated colors across a page's streams are
/// converted once.
pub fn convert_and_batch(
    converter: &mut BaseConverter,
    engine: &mut dyn ColorEngine,
    ops: &[ContentStreamOperation],
    color_spaces: &HashMap<String, PdfColorSpaceKind>,
) -> crate::error::Result<HashMap<String, Vec<f32>>> {
    let mut by_space: HashMap<ConvertibleSpace, Vec<(Vec<f32>, Option<PdfColorSpaceKind>)>> = HashMap::new();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

    let has_source_rgb_profile = converter.base_configuration().source_rgb_profile.is_some();
    let has_source_gray_profile = converter.base_configuration().source_gray_profile.is_some();

    for op in ops {
        if let Some((space, kind)) =
            resolve_convertible_space(op, color_spaces, has_source_rgb_profile, has_source_gray_profile)
        {
            let key = format!("{:?}:{:?}", space, op.operands);
            if seen.insert(key) {
                by_space.entry(space).or_default().push((op.operands.clone(), kind));
            }
        }
    }

    let config_fingerprint = converter.destination_config_fingerprint();
    let mut results = HashMap::new();
    for (space, entries) in by_space {
        let (format_space, channels) = match space {
            ConvertibleSpace::Rgb => (FormatColorSpace::Rgb, 3u32),
            ConvertibleSpace::Gray => (FormatColorSpace::Gray, 1u32),
            ConvertibleSpace::Lab => (FormatColorSpace::Lab, 3u32),
        };

        // Entries already in the cross-stream cache are resolved directly;
        // only the rest need a real engine call.
        let mut uncached_indices = Vec::new();
        for (i, (values, _)) in entries.iter().enumerate() {
            let pending = pending_color_for(space, values);
            match converter.lookup_cache.lookup_color(&config_fingerprint, &pending) {
                Some(cached) => {
                    results.insert(format!("{space:?}:{values:?}"), cached);
                }
                None => uncached_indices.push(i),
            }
        }
        if uncached_indices.is_empty() {
            continue;
        }

        let profile = entries
            .iter()
            .find_map(|(_, kind)| match kind {
                Some(PdfColorSpaceKind::IccBased { profile, .. }) => Some(profile.clone()),
                _ => None,
            })
            .or_else(|| match space {
                ConvertibleSpace::Rgb => converter.base_configuration().source_rgb_profile.clone(),
                ConvertibleSpace::Gray => converter.base_configuration().source_gray_profile.clone(),
                ConvertibleSpace::Lab => None,
            });

        // Rendering intent for Lab inputs is forced to relative-colorimetric
        // if the config was K-only-GCR (spec.md §4.5 `convertPending`).
        let mut input_buf: Vec<u8> = Vec::with_capacity(uncached_indices.len() * channels as usize * 4);
        for &i in &uncached_indices {
            for v in &entries[i].0 {
                input_buf.extend_from_slice(&v.to_le_bytes());
            }
        }

        let options = ConvertBufferOptions {
            source_space: format_space,
            source_profile: profile,
            source_channels: channels,
            bits_per_component: Some(32),
            swap_endian: Some(false),
            float_input: true,
            float_output: true,
        };

        let converted = converter.convert_colors_buffer(engine, &input_buf, &options)?;
        let destination_space = converter.base_configuration().destination_color_space;
        let dest_channels = destination_space.channel_count() as usize;
        for (out_i, &entry_i) in uncached_indices.iter().enumerate() {
            let values = &entries[entry_i].0;
            let start = out_i * dest_channels * 4;
            let decoded: Vec<f32> = converted.output_pixels[start..start + dest_channels * 4]
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            let scaled = if destination_space == DestinationColorSpace::Cmyk {
                // The engine's float CMYK samples come back in its internal
                // 0..100 convention; content-stream operands are PDF's 0..1
                // (spec.md §3).
                let cmyk = Cmyk::from_engine_range([decoded[0], decoded[1], decoded[2], decoded[3]]);
                vec![cmyk.c, cmyk.m, cmyk.y, cmyk.k]
            } else {
                decoded
            };

            let pending = pending_color_for(space, values);
            converter.lookup_cache.store_color(&config_fingerprint, &pending, scaled.clone());
            results.insert(format!("{space:?}:{values:?}"), scaled);
        }
    }

    Ok(results)
}

/// `spec.md` §4.8 "Rebuilding": operator mapping by destination color space.
fn destination_operator(space: DestinationColorSpace, is_stroke: bool) -> &'static str {
    match (space, is_stroke) {
        (DestinationColorSpace::Cmyk, true) => "K",
        (DestinationColorSpace::Cmyk, false) => "k",
        (DestinationColorSpace::Rgb, true) => "RG",
        (DestinationColorSpace::Rgb, false) => "rg",
        (DestinationColorSpace::Gray, true) => "G",
        (DestinationColorSpace::Gray, false) => "g",
        (DestinationColorSpace::Lab, true) => "SCN",
        (DestinationColorSpace::Lab, false) => "scn",
    }
}

/// Rebuilds the stream: walks operations in ascending byte order, builds a
/// list of `(index, length, replacement)` triples, then applies them
/// end-to-beginning to preserve earlier byte offsets (`spec.md` §4.8
/// "Rebuilding").
#[allow(clippy::too_many_arguments)]
pub fn rebuild_stream(
    data: &[u8],
    ops: &[ContentStreamOperation],
    color_spaces: &HashMap<String, PdfColorSpaceKind>,
    converted: &HashMap<String, Vec<f32>>,
    destination_space: DestinationColorSpace,
    lab_resource_name: &str,
    has_source_rgb_profile: bool,
    has_source_gray_profile: bool,
) -> (Vec<u8>, usize) {
    let mut replacements: Vec<(usize, usize, String)> = Vec::new();
    let mut replacement_count = 0usize;

    for op in ops {
        let Some((space, _)) =
            resolve_convertible_space(op, color_spaces, has_source_rgb_profile, has_source_gray_profile)
        else {
            continue;
        };
        let key = format!("{space:?}:{:?}", op.operands);
        let Some(values) = converted.get(&key) else {
            continue;
        };

        let operator = destination_operator(destination_space, op.is_stroke);
        let operand_text: Vec<String> = values.iter().map(|v| crate::util::format_operand(*v)).collect();

        let replacement = if destination_space == DestinationColorSpace::Lab {
            let cs_op = if op.is_stroke { "CS" } else { "cs" };
            format!("/{lab_resource_name} {cs_op} {} {operator}", operand_text.join(" "))
        } else {
            format!("{} {operator}", operand_text.join(" "))
        };

        replacements.push((op.byte_offset, op.byte_length, replacement));
        replacement_count += 1;
    }

    replacements.sort_by_key(|(offset, _, _)| *offset);

    let mut out = data.to_vec();
    for (offset, length, replacement) in replacements.into_iter().rev() {
        out.splice(offset..(offset + length).min(out.len()), replacement.into_bytes());
    }

    (out, replacement_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::converter::ConverterRole;

    fn srgb_icc_bytes() -> Vec<u8> {
        lcms2::Profile::new_srgb()
            .icc()
            .expect("lcms2 can always serialize its own synthetic sRGB profile")
    }

    #[test]
    fn converted_rgb_fill_lands_in_lab_native_range() {
        let mut converter = BaseConverter::new(ConverterRole::ContentStream, Configuration::new_lab());
        let mut engine = crate::engine::lcms_engine::LcmsEngine::new();

        let mut color_spaces = HashMap::new();
        color_spaces.insert(
            "CS0".to_string(),
            PdfColorSpaceKind::IccBased {
                profile: srgb_icc_bytes(),
                header_color_space: crate::color::IccHeaderColorSpace::Rgb,
            },
        );
        let (ops, _state, _) = parse(b"/CS0 cs 1 1 1 scn", ColorSpaceState::default());

        let converted = convert_and_batch(&mut converter, &mut engine, &ops, &color_spaces).unwrap();
        let (_, values) = converted.iter().next().expect("one converted color");
        assert_eq!(values.len(), 3);
        // White through to Lab: L close to 100, a/b close to neutral — the
        // sign this is a native Lab float readout and not an 8-bit/255
        // readout (which would land near 1.0, not 100.0).
        assert!(values[0] > 90.0, "L* should be near white: {values:?}");
    }

    #[test]
    fn repeated_color_across_streams_is_served_from_the_lookup_cache() {
        let mut converter = BaseConverter::new(ConverterRole::ContentStream, Configuration::new_lab());
        let mut engine = crate::engine::lcms_engine::LcmsEngine::new();

        let mut color_spaces = HashMap::new();
        color_spaces.insert(
            "CS0".to_string(),
            PdfColorSpaceKind::IccBased {
                profile: srgb_icc_bytes(),
                header_color_space: crate::color::IccHeaderColorSpace::Rgb,
            },
        );

        let (ops_a, _, _) = parse(b"/CS0 cs 0.2 0.4 0.6 scn", ColorSpaceState::default());
        let first = convert_and_batch(&mut converter, &mut engine, &ops_a, &color_spaces).unwrap();
        assert_eq!(converter.lookup_cache.entry_count(), 1);

        let (ops_b, _, _) = parse(b"/CS0 cs 0.2 0.4 0.6 scn", ColorSpaceState::default());
        let second = convert_and_batch(&mut converter, &mut engine, &ops_b, &color_spaces).unwrap();
        assert_eq!(first, second);
        assert_eq!(converter.lookup_cache.entry_count(), 1, "no new entry for a repeated color");
        assert_eq!(converter.lookup_cache.stats().hits, 1);
    }

    #[test]
    fn device_rgb_passes_through_unchanged() {
        let data = b"1 1 1 rg 0 0 0 rg 0.5 0.5 0.5 rg";
        let (ops, _state, warnings) = parse(data, ColorSpaceState::default());
        assert!(warnings.is_empty());
        assert_eq!(ops.len(), 3);
        for op in &ops {
            assert_eq!(op.operator, "rg");
            // Without a configured source RGB profile, `rg` is left as a
            // device color (`spec.md` §4.8, §9 "Device color passthrough").
            assert!(resolve_convertible_space(op, &HashMap::new(), false, false).is_none());
        }
    }

    #[test]
    fn device_rgb_is_convertible_when_source_profile_configured() {
        let data = b"1 0.5 0 rg";
        let (ops, _state, _) = parse(data, ColorSpaceState::default());
        assert_eq!(
            resolve_convertible_space(&ops[0], &HashMap::new(), true, false),
            Some((ConvertibleSpace::Rgb, None))
        );
    }

    #[test]
    fn named_color_space_selection_is_tracked() {
        let data = b"/CS0 cs 1 0.5 0 scn";
        let (ops, state, _warnings) = parse(data, ColorSpaceState::default());
        assert_eq!(ops.len(), 2);
        assert_eq!(state.fill.as_deref(), Some("CS0"));
        assert_eq!(ops[1].named_space.as_deref(), Some("CS0"));
        assert_eq!(ops[1].operands, vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn cross_stream_state_carries_forward() {
        let stream_a = b"/CS1 cs 0.2 0.3 0.4 scn";
        let (_ops_a, state_after_a, _) = parse(stream_a, ColorSpaceState::default());
        assert_eq!(state_after_a.fill.as_deref(), Some("CS1"));

        let stream_b = b"0.5 0.5 0.5 scn";
        let (ops_b, state_after_b, _) = parse(stream_b, state_after_a.clone());
        assert_eq!(ops_b[0].named_space.as_deref(), Some("CS1"));
        assert_eq!(state_after_b, state_after_a);
    }

    #[test]
    fn rebuild_is_byte_identical_with_no_replacements() {
        let data = b"1 1 1 rg".to_vec();
        let (ops, _state, _) = parse(&data, ColorSpaceState::default());
        let color_spaces = HashMap::new();
        let converted = HashMap::new();
        let (out, count) = rebuild_stream(
            &data,
            &ops,
            &color_spaces,
            &converted,
            DestinationColorSpace::Cmyk,
            "Lab",
            false,
            false,
        );
        assert_eq!(out, data);
        assert_eq!(count, 0);
    }

    #[test]
    fn malformed_operand_count_is_a_warning_not_fatal() {
        let data = b"1 0 g";
        let (ops, _state, warnings) = parse(data, ColorSpaceState::default());
        assert!(ops.is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
