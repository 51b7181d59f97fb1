//! The Page Coordinator (`spec.md` §4.9 "Page Coordinator (C9)").
//!
//! Walks one page's resources and content, fans image work out to the
//! worker pool (or runs it on-thread), then rewrites content streams
//! sequentially so their graphics state can carry over — grounded on the
//! teacher's own page-iteration shape in its top-level `Document`, where
//! per-page work is driven from a single coordinating loop rather than
//! each page managing its own lifecycle.

use crate::color::{DestinationColorSpace, IccHeaderColorSpace, PdfColorSpaceKind};
use crate::converter::content_stream::{self, ColorSpaceState};
use crate::converter::image::{self, ImageInput, ImageOutput};
use crate::converter::{BaseConverter, ConverterRole};
use crate::document::LabColorSpaceCache;
use crate::engine::ColorEngine;
use crate::error::Result;
use crate::pdf_model::{PdfContext, PdfDict, PdfObject, PdfRef, PdfStream};
use crate::worker::WorkerPool;

/// `spec.md` §4.9 step 7: "Aggregate totals: images converted, streams
/// converted, color operations."
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageConversionTotals {
    pub images_converted: usize,
    pub images_skipped_cmyk: usize,
    pub streams_converted: usize,
    pub color_operations: usize,
}

struct ImageEntry {
    xobject_ref: PdfRef,
    input: ImageInput,
}

/// Extracts the normalized [`PdfColorSpaceKind`] for one image XObject's
/// `/ColorSpace` entry (`spec.md` §4.9 step 1: "extract color-space info:
/// profile bytes ..., channel count, bit format, Indexed metadata").
fn resolve_image_color_space(ctx: &dyn PdfContext, value: &PdfObject) -> Option<PdfColorSpaceKind> {
    match value {
        PdfObject::Name(name) => match name.as_str() {
            "DeviceGray" | "CalGray" => Some(PdfColorSpaceKind::DeviceGray),
            "DeviceRGB" | "CalRGB" => Some(PdfColorSpaceKind::DeviceRgb),
            "DeviceCMYK" => Some(PdfColorSpaceKind::DeviceCmyk),
            _ => None,
        },
        PdfObject::Array(items) => {
            let tag = items.first()?.as_name()?;
            match tag {
                "ICCBased" => {
                    let stream_ref = match items.get(1)? {
                        PdfObject::Reference(r) => *r,
                        _ => return None,
                    };
                    let stream = ctx.lookup_stream(stream_ref)?;
                    let n = stream.dict.get("N").and_then(PdfObject::as_number).unwrap_or(3.0) as u32;
                    let header_color_space = match n {
                        1 => IccHeaderColorSpace::Gray,
                        4 => IccHeaderColorSpace::Cmyk,
                        _ => IccHeaderColorSpace::Rgb,
                    };
                    let profile = decode_stream(&stream);
                    Some(PdfColorSpaceKind::IccBased {
                        profile,
                        header_color_space,
                    })
                }
                "Lab" => {
                    let dict = items.get(1).and_then(PdfObject::as_dict);
                    let range = dict
                        .and_then(|d| d.get("Range"))
                        .and_then(PdfObject::as_array)
                        .map(|a| {
                            let mut r = [-100.0, 100.0, -100.0, 100.0];
                            for (i, v) in a.iter().take(4).enumerate() {
                                if let Some(n) = v.as_number() {
                                    r[i] = n as f32;
                                }
                            }
                            r
                        })
                        .unwrap_or([-100.0, 100.0, -100.0, 100.0]);
                    Some(PdfColorSpaceKind::Lab { range })
                }
                "Indexed" => {
                    let base = resolve_image_color_space(ctx, items.get(1)?)?;
                    let hival = items.get(2)?.as_number()? as u32;
                    let lookup = match items.get(3)? {
                        PdfObject::String(bytes) => bytes.clone(),
                        PdfObject::Reference(r) => decode_stream(&ctx.lookup_stream(*r)?),
                        _ => return None,
                    };
                    Some(PdfColorSpaceKind::Indexed {
                        base: Box::new(base),
                        hival,
                        lookup,
                    })
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn decode_stream(stream: &PdfStream) -> Vec<u8> {
    match stream.dict.get("Filter") {
        Some(PdfObject::Name(n)) if n == "FlateDecode" => {
            crate::util::inflate(&stream.contents).unwrap_or_default()
        }
        _ => stream.contents.clone(),
    }
}

fn is_device_cmyk(space: &PdfColorSpaceKind) -> bool {
    matches!(space, PdfColorSpaceKind::DeviceCmyk)
        || matches!(space, PdfColorSpaceKind::IccBased { header_color_space, .. } if *header_color_space == IccHeaderColorSpace::Cmyk)
}

/// `spec.md` §4.9 step 1: collects every `Image`-subtype XObject, skipping
/// ones already in CMYK.
fn collect_images(ctx: &dyn PdfContext, xobjects: &PdfDict) -> (Vec<ImageEntry>, usize) {
    let mut entries = Vec::new();
    let mut skipped = 0usize;

    for (_name, value) in xobjects.entries() {
        let PdfObject::Reference(xobject_ref) = value else {
            continue;
        };
        let Some(stream) = ctx.lookup_stream(*xobject_ref) else {
            continue;
        };
        if stream.dict.get("Subtype").and_then(PdfObject::as_name) != Some("Image") {
            continue;
        }
        let Some(color_space_obj) = stream.dict.get("ColorSpace") else {
            continue;
        };
        let Some(color_space) = resolve_image_color_space(ctx, color_space_obj) else {
            continue;
        };
        if is_device_cmyk(&color_space) {
            skipped += 1;
            continue;
        }

        let width = stream.dict.get("Width").and_then(PdfObject::as_number).unwrap_or(0.0) as u32;
        let height = stream.dict.get("Height").and_then(PdfObject::as_number).unwrap_or(0.0) as u32;
        let bits_per_component = stream
            .dict
            .get("BitsPerComponent")
            .and_then(PdfObject::as_number)
            .unwrap_or(8.0) as u32;
        let is_compressed = matches!(stream.dict.get("Filter"), Some(PdfObject::Name(n)) if n == "FlateDecode");
        let source_profile = match &color_space {
            PdfColorSpaceKind::IccBased { profile, .. } => Some(profile.clone()),
            _ => None,
        };

        entries.push(ImageEntry {
            xobject_ref: *xobject_ref,
            input: ImageInput {
                stream_ref_key: xobject_ref.key(),
                stream_data: stream.contents.clone(),
                is_compressed,
                width,
                height,
                color_space,
                bits_per_component,
                source_profile,
            },
        });
    }

    (entries, skipped)
}

/// `spec.md` §4.9 step 2: "Collect every referenced content stream in
/// `Contents` (array or single)."
fn collect_content_stream_refs(contents: &PdfObject) -> Vec<PdfRef> {
    match contents {
        PdfObject::Reference(r) => vec![*r],
        PdfObject::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                PdfObject::Reference(r) => Some(*r),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn image_output_to_stream(output: ImageOutput, original_dict: &PdfDict) -> (PdfDict, Vec<u8>) {
    let mut dict = original_dict.clone();
    let color_space_name = match output.color_space {
        PdfColorSpaceKind::DeviceCmyk => PdfObject::Name("DeviceCMYK".to_string()),
        PdfColorSpaceKind::DeviceRgb => PdfObject::Name("DeviceRGB".to_string()),
        PdfColorSpaceKind::DeviceGray => PdfObject::Name("DeviceGray".to_string()),
        PdfColorSpaceKind::Indexed { ref base, hival, ref lookup } => PdfObject::Array(vec![
            PdfObject::Name("Indexed".to_string()),
            match **base {
                PdfColorSpaceKind::DeviceCmyk => PdfObject::Name("DeviceCMYK".to_string()),
                PdfColorSpaceKind::DeviceRgb => PdfObject::Name("DeviceRGB".to_string()),
                PdfColorSpaceKind::DeviceGray => PdfObject::Name("DeviceGray".to_string()),
                PdfColorSpaceKind::Lab { .. } => crate::document::normalized_lab_color_space_array(),
                ref other => unreachable!("destination_kind never produces {other:?} as an Indexed base"),
            },
            PdfObject::Number(hival as f64),
            PdfObject::String(lookup.clone()),
        ]),
        PdfColorSpaceKind::Lab { .. } => crate::document::normalized_lab_color_space_array(),
        ref other => unreachable!("destination_kind never produces {other:?} as an image's own color space"),
    };
    dict.set("ColorSpace", color_space_name);
    dict.set("BitsPerComponent", PdfObject::Number(output.bits_per_component as f64));
    if output.is_compressed {
        dict.set("Filter", PdfObject::Name("FlateDecode".to_string()));
    } else {
        dict.delete("Filter");
    }
    dict.set("Length", PdfObject::Number(output.stream_data.len() as f64));
    (dict, output.stream_data)
}

/// Runs the full `spec.md` §4.9 procedure for one page.
///
/// `resources_xobject` and `resources_color_space` are the page's already
/// -resolved `Resources.XObject`/`Resources.ColorSpace` dictionaries;
/// `color_space_definitions` maps every named color-space resource visible
/// to this page's content streams to its normalized
/// [`PdfColorSpaceKind`] (`spec.md` §4.9 step 2: "Attach the page's
/// extracted color-space definitions").
#[allow(clippy::too_many_arguments)]
pub fn convert_page(
    converter: &mut BaseConverter,
    engine: &mut dyn ColorEngine,
    ctx: &mut dyn PdfContext,
    resources_xobject: &PdfDict,
    resources_color_space: &mut PdfDict,
    color_space_definitions: &std::collections::HashMap<String, PdfColorSpaceKind>,
    contents: &PdfObject,
    initial_stroke_fill_state: ColorSpaceState,
    lab_cache: &mut LabColorSpaceCache,
    worker_pool: Option<&WorkerPool>,
) -> Result<(PageConversionTotals, ColorSpaceState)> {
    assert_eq!(converter.role, ConverterRole::Page);
    let mut totals = PageConversionTotals::default();

    // Step 3: Lab destination needs the shared normalized resource registered.
    let lab_resource_name = if converter.base_configuration().destination_color_space == DestinationColorSpace::Lab {
        let (_resource_ref, name) = crate::document::get_or_create_normalized_lab_color_space(ctx, lab_cache);
        if resources_color_space.get(&name).is_none() {
            resources_color_space.set(name.clone(), PdfObject::Reference(lab_cache.resource_ref().unwrap()));
        }
        name
    } else {
        String::new()
    };

    // Step 1: collect images.
    let (image_entries, skipped) = collect_images(ctx, resources_xobject);
    totals.images_skipped_cmyk = skipped;

    if converter.base_configuration().convert_images {
        let (indexed, normal): (Vec<ImageEntry>, Vec<ImageEntry>) = image_entries
            .into_iter()
            .partition(|e| matches!(e.input.color_space, PdfColorSpaceKind::Indexed { .. }));

        // Indexed images are always processed on-thread (§4.9 step 4).
        let mut converted_images: Vec<(PdfRef, ImageOutput)> = Vec::new();
        for entry in indexed {
            let output = image::convert_image(converter, engine, entry.input, true)?;
            converted_images.push((entry.xobject_ref, output));
        }

        if converter.base_configuration().use_workers {
            if let Some(pool) = worker_pool {
                let refs: Vec<PdfRef> = normal.iter().map(|e| e.xobject_ref).collect();
                let inputs: Vec<ImageInput> = normal.into_iter().map(|e| e.input).collect();
                let config_snapshot = converter.base_configuration().clone();
                let results = pool.submit_image_tasks(inputs, move |input| {
                    // Each worker owns its own engine and transform cache
                    // (`spec.md` §4.11): a fresh `BaseConverter`/engine pair
                    // per task keeps this closure's state local to whichever
                    // pool thread runs it.
                    let mut local = BaseConverter::new(ConverterRole::Image, config_snapshot.clone());
                    let mut engine = crate::engine::lcms_engine::LcmsEngine::new();
                    image::convert_image(&mut local, &mut engine, input, true)
                });
                for (pdf_ref, result) in refs.into_iter().zip(results) {
                    if let Some(crate::worker::TaskOutput::Image(output)) = result.output {
                        converted_images.push((pdf_ref, output));
                    }
                }
            }
        } else {
            for entry in normal {
                let output = image::convert_image(converter, engine, entry.input, true)?;
                converted_images.push((entry.xobject_ref, output));
            }
        }

        for (pdf_ref, output) in converted_images {
            if let Some(original) = ctx.lookup_stream(pdf_ref) {
                let (new_dict, new_data) = image_output_to_stream(output, &original.dict);
                ctx.update_stream(pdf_ref, new_dict, new_data);
                totals.images_converted += 1;
            }
        }
    }

    // Step 5: content-stream phase, strictly sequential.
    let mut state = initial_stroke_fill_state;
    if converter.base_configuration().convert_content_streams {
        for stream_ref in collect_content_stream_refs(contents) {
            let Some(stream) = ctx.lookup_stream(stream_ref) else {
                continue;
            };
            let raw = decode_stream(&stream);
            let (ops, new_state, _warnings) = content_stream::parse(&raw, state.clone());
            let converted = content_stream::convert_and_batch(converter, engine, &ops, color_space_definitions)?;
            let has_source_rgb_profile = converter.base_configuration().source_rgb_profile.is_some();
            let has_source_gray_profile = converter.base_configuration().source_gray_profile.is_some();
            let (rebuilt, count) = content_stream::rebuild_stream(
                &raw,
                &ops,
                color_space_definitions,
                &converted,
                converter.base_configuration().destination_color_space,
                &lab_resource_name,
                has_source_rgb_profile,
                has_source_gray_profile,
            );
            let mut dict = stream.dict.clone();
            dict.delete("Filter");
            dict.set("Length", PdfObject::Number(rebuilt.len() as f64));
            ctx.update_stream(stream_ref, dict, rebuilt);

            totals.streams_converted += 1;
            totals.color_operations += count;
            state = new_state;
        }
    }

    Ok((totals, state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_content_stream_refs_handles_array_and_single() {
        let single = PdfObject::Reference(PdfRef::new(5, 0));
        assert_eq!(collect_content_stream_refs(&single), vec![PdfRef::new(5, 0)]);

        let array = PdfObject::Array(vec![
            PdfObject::Reference(PdfRef::new(5, 0)),
            PdfObject::Reference(PdfRef::new(6, 0)),
        ]);
        assert_eq!(
            collect_content_stream_refs(&array),
            vec![PdfRef::new(5, 0), PdfRef::new(6, 0)]
        );
    }

    #[test]
    fn resolve_device_color_space_names() {
        struct NoopCtx;
        impl PdfContext for NoopCtx {
            fn lookup(&self, _r: PdfRef) -> Option<PdfObject> {
                None
            }
            fn lookup_stream(&self, _r: PdfRef) -> Option<PdfStream> {
                None
            }
            fn add_object(&mut self, _o: PdfObject) -> PdfRef {
                PdfRef::new(0, 0)
            }
            fn update_stream(&mut self, _r: PdfRef, _d: PdfDict, _c: Vec<u8>) {}
        }
        let ctx = NoopCtx;
        assert_eq!(
            resolve_image_color_space(&ctx, &PdfObject::Name("DeviceGray".to_string())),
            Some(PdfColorSpaceKind::DeviceGray)
        );
        assert_eq!(
            resolve_image_color_space(&ctx, &PdfObject::Name("DeviceCMYK".to_string())),
            Some(PdfColorSpaceKind::DeviceCmyk)
        );
    }
}
