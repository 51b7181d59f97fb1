//! End-to-end scenarios from `spec.md` §8, run against the full pipeline
//! (`Document`/`page::convert_page`) rather than a single module's unit
//! tests, mirroring the teacher's root-level `tests/` integration directory
//! (`SPEC_FULL.md` §1.4).
//!
//! A few scenarios ask for a CMYK *destination* profile (S1, S2, S4, S5).
//! This crate's one deliberately-opaque external collaborator, `lcms2`, can
//! only open a CMYK profile from real ICC bytes (there is no built-in
//! synthetic CMYK profile the way there is for sRGB/Lab/Gray), and no such
//! file ships in this offline environment. Fabricating placeholder bytes
//! for `Profile::new_icc` would make the engine call fail at a different
//! point than the one the scenario is testing. Where the scenario's point
//! doesn't actually require the engine to run (S1: device colors pass
//! through untouched, so the destination profile is never opened), the test
//! below keeps CMYK as written in `spec.md`. Where it does (S2, S4, S5), the
//! destination is swapped to the built-in Lab D50 profile and the source
//! ICCBased profile is a real, in-process-synthesized sRGB profile
//! (`lcms2::Profile::new_srgb().icc()`) so the real conversion pipeline
//! actually runs; the assertions check the same structural invariants the
//! spec's literal scenario checks (replacement counts, rewritten operator
//! shape, dictionary updates, image/work distribution) rather than the
//! CMYK-specific numeric literals.

use std::collections::HashMap;

use pdf_recolor::color::{DestinationColorSpace, PdfColorSpaceKind};
use pdf_recolor::converter::content_stream::{self, ColorSpaceState};
use pdf_recolor::converter::image::ImageInput;
use pdf_recolor::converter::{BaseConverter, ConverterRole};
use pdf_recolor::document::{Document, PageDescriptor};
use pdf_recolor::engine::lcms_engine::LcmsEngine;
use pdf_recolor::pdf_model::{PdfContext, PdfDict, PdfObject, PdfRef, PdfStream};
use pdf_recolor::Configuration;

/// A real, in-process-synthesized sRGB ICC profile, used wherever a scenario
/// needs actual embedded profile bytes an `ICCBased` color space could carry.
fn srgb_icc_bytes() -> Vec<u8> {
    lcms2::Profile::new_srgb()
        .icc()
        .expect("lcms2 can always serialize its own synthetic sRGB profile")
}

/// A minimal in-memory [`PdfContext`]: new indirect objects are appended,
/// existing streams are looked up and overwritten by key.
#[derive(Default)]
struct InMemoryPdf {
    next_object_number: u32,
    objects: HashMap<u32, PdfObject>,
    streams: HashMap<(u32, u16), PdfStream>,
}

impl InMemoryPdf {
    fn new() -> Self {
        Self {
            next_object_number: 1,
            ..Self::default()
        }
    }

    fn add_stream(&mut self, dict: PdfDict, contents: Vec<u8>) -> PdfRef {
        let r = PdfRef::new(self.next_object_number, 0);
        self.next_object_number += 1;
        self.streams.insert((r.object_number, r.generation_number), PdfStream { dict, contents });
        r
    }
}

impl PdfContext for InMemoryPdf {
    fn lookup(&self, reference: PdfRef) -> Option<PdfObject> {
        self.objects.get(&reference.object_number).cloned()
    }

    fn lookup_stream(&self, reference: PdfRef) -> Option<PdfStream> {
        self.streams.get(&(reference.object_number, reference.generation_number)).cloned()
    }

    fn add_object(&mut self, object: PdfObject) -> PdfRef {
        let object_number = self.next_object_number;
        self.next_object_number += 1;
        self.objects.insert(object_number, object);
        PdfRef::new(object_number, 0)
    }

    fn update_stream(&mut self, reference: PdfRef, dict: PdfDict, contents: Vec<u8>) {
        self.streams
            .insert((reference.object_number, reference.generation_number), PdfStream { dict, contents });
    }
}

/// S1: "RGB page, K-only-GCR to CMYK". `1 1 1 rg 0 0 0 rg 0.5 0.5 0.5 rg`
/// against a CMYK destination, K-only-GCR intent: device RGB has no source
/// profile and is left untouched — the engine is never invoked, so the
/// (unparsable) placeholder destination profile below is never opened.
#[test]
fn s1_device_rgb_passes_through_for_k_only_gcr_cmyk_destination() {
    let config = Configuration::new_cmyk(vec![1, 2, 3])
        .with_rendering_intent(pdf_recolor::engine::intent::RenderingIntent::KOnlyGcr);
    let mut converter = BaseConverter::new(ConverterRole::ContentStream, config);
    let mut engine = LcmsEngine::new();

    let data = b"1 1 1 rg 0 0 0 rg 0.5 0.5 0.5 rg";
    let (ops, _state, warnings) = content_stream::parse(data, ColorSpaceState::default());
    assert!(warnings.is_empty());
    assert_eq!(ops.len(), 3);

    let color_spaces = HashMap::new();
    let converted = content_stream::convert_and_batch(&mut converter, &mut engine, &ops, &color_spaces).unwrap();
    assert!(converted.is_empty(), "no convertible colors: device RGB stays untouched");

    let has_rgb = false;
    let has_gray = false;
    let (rebuilt, replacement_count) = content_stream::rebuild_stream(
        data,
        &ops,
        &color_spaces,
        &converted,
        DestinationColorSpace::Cmyk,
        "Lab",
        has_rgb,
        has_gray,
    );
    assert_eq!(replacement_count, 0);
    assert_eq!(rebuilt, data);
}

/// S2 (adapted to a Lab destination, see module docs): a named `ICCBased`
/// sRGB space converts through the real engine, and the fill operator is
/// rewritten to the Lab-reselecting `scn` form.
#[test]
fn s2_named_icc_rgb_color_space_is_converted() {
    let config = Configuration::new_lab();
    let mut converter = BaseConverter::new(ConverterRole::ContentStream, config);
    let mut engine = LcmsEngine::new();

    let mut color_spaces = HashMap::new();
    color_spaces.insert(
        "CS0".to_string(),
        PdfColorSpaceKind::IccBased {
            profile: srgb_icc_bytes(),
            header_color_space: pdf_recolor::color::IccHeaderColorSpace::Rgb,
        },
    );

    let data = b"/CS0 cs 1 0.5 0 scn";
    let (ops, _state, warnings) = content_stream::parse(data, ColorSpaceState::default());
    assert!(warnings.is_empty());

    let converted = content_stream::convert_and_batch(&mut converter, &mut engine, &ops, &color_spaces).unwrap();
    assert_eq!(converted.len(), 1, "exactly one unique RGB color to convert");

    let (rebuilt, replacement_count) = content_stream::rebuild_stream(
        data,
        &ops,
        &color_spaces,
        &converted,
        DestinationColorSpace::Lab,
        "CSLabD50",
        false,
        false,
    );
    assert_eq!(replacement_count, 1);
    let rebuilt_text = String::from_utf8(rebuilt).unwrap();
    assert!(rebuilt_text.starts_with("/CSLabD50 cs "));
    assert!(rebuilt_text.trim_end().ends_with("scn"));
}

/// S3: "Lab destination, cross-stream state carry". Two content streams on
/// one page: stream A selects a named space and sets a fill color; stream
/// B's fill operator carries no `cs` of its own and must still resolve
/// against `CS1`. Both streams get the Lab-reselection prefix; the
/// document-level state handed to the *next* page stays in the source
/// space, not Lab.
#[test]
fn s3_lab_destination_cross_stream_state_carry() {
    let mut doc = Document::new(Configuration::new_lab()).unwrap();
    let mut ctx = InMemoryPdf::new();

    let mut color_spaces = HashMap::new();
    color_spaces.insert(
        "CS1".to_string(),
        PdfColorSpaceKind::IccBased {
            profile: srgb_icc_bytes(),
            header_color_space: pdf_recolor::color::IccHeaderColorSpace::Rgb,
        },
    );

    let stream_a = ctx.add_stream(PdfDict::new(), b"/CS1 cs 0.2 0.3 0.4 scn".to_vec());
    let stream_b = ctx.add_stream(PdfDict::new(), b"0.5 0.5 0.5 scn".to_vec());

    let page = PageDescriptor {
        resources_xobject: PdfDict::new(),
        resources_color_space: PdfDict::new(),
        color_space_definitions: color_spaces,
        contents: PdfObject::Array(vec![PdfObject::Reference(stream_a), PdfObject::Reference(stream_b)]),
    };

    let totals = doc.convert_pages(&mut ctx, vec![page]).unwrap();
    assert!(totals.errors.is_empty(), "errors: {:?}", totals.errors);
    assert_eq!(totals.streams_converted, 2);
    assert_eq!(totals.color_operations, 2);

    let rewritten_b = ctx.lookup_stream(stream_b).unwrap();
    let text_b = String::from_utf8(rewritten_b.contents).unwrap();
    assert!(
        text_b.starts_with("/CSLabD50 cs "),
        "stream B re-selects Lab before its converted fill: {text_b}"
    );
}

/// S3's "final state carries the source space forward" half, exercised
/// directly against the content-stream state threaded between two calls to
/// `page::convert_page` (one page's trailing state feeding the next's
/// initial state, `spec.md` §8 invariant 8).
#[test]
fn s3_final_state_returned_in_source_space_not_lab() {
    let (_ops_a, state_after_a, _) = content_stream::parse(b"/CS1 cs 0.2 0.3 0.4 scn", ColorSpaceState::default());
    assert_eq!(state_after_a.fill.as_deref(), Some("CS1"));

    let (ops_b, state_after_b, _) = content_stream::parse(b"0.5 0.5 0.5 scn", state_after_a.clone());
    assert_eq!(ops_b[0].named_space.as_deref(), Some("CS1"));
    assert_eq!(state_after_b.fill.as_deref(), Some("CS1"), "source-space name, not Lab");
}

/// S4 (adapted to a Lab destination, see module docs): an 8-bit Indexed
/// image with a `DeviceRGB` base, `hival = 2`, and a 3-entry (red/green/
/// blue) lookup table. The palette is converted; pixel bytes are untouched.
#[test]
fn s4_indexed_palette_image_converts_palette_not_pixels() {
    let config = Configuration::new_lab();
    let mut converter = BaseConverter::new(ConverterRole::Image, config);
    let mut engine = LcmsEngine::new();

    let lookup = vec![0xFF, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00, 0x00, 0xFF];
    let pixels = vec![0u8, 1, 2, 0, 1, 2]; // unchanged regardless of conversion
    let input = ImageInput {
        stream_ref_key: "5-0".to_string(),
        stream_data: pixels.clone(),
        is_compressed: false,
        width: 6,
        height: 1,
        color_space: PdfColorSpaceKind::Indexed {
            base: Box::new(PdfColorSpaceKind::DeviceRgb),
            hival: 2,
            lookup: lookup.clone(),
        },
        bits_per_component: 8,
        source_profile: None,
    };

    let output = pdf_recolor::converter::image::convert_image(&mut converter, &mut engine, input, false).unwrap();
    assert_eq!(output.stream_data, pixels, "pixel indices are never touched");
    match output.color_space {
        PdfColorSpaceKind::Indexed { hival, lookup: new_lookup, .. } => {
            assert_eq!(hival, 2);
            assert_eq!(new_lookup.len(), 3 * 3, "3 palette entries, 3 Lab8 channels each");
            assert_ne!(new_lookup, lookup, "palette bytes are actually converted");
        }
        other => panic!("expected an Indexed color space, got {other:?}"),
    }
}

/// An indexed image whose base is bare `DeviceRGB` and whose config carries
/// no `source_rgb_profile` override has no profile to interpret it through;
/// this is `MissingProfile`, not a silent passthrough (`spec.md` §4.1).
#[test]
fn indexed_device_rgb_base_without_any_profile_is_missing_profile() {
    let config = Configuration::new_lab();
    let mut converter = BaseConverter::new(ConverterRole::Image, config);
    let mut engine = LcmsEngine::new();

    let result = pdf_recolor::converter::image::convert_indexed_palette(
        &mut converter,
        &mut engine,
        &PdfColorSpaceKind::DeviceRgb,
        1,
        &[0xFF, 0x00, 0x00, 0x00, 0xFF, 0x00],
        None,
    );
    assert!(matches!(result, Err(pdf_recolor::Error::MissingProfile { .. })));
}

/// A plain `DeviceRGB` image (no embedded ICC profile) is only convertible
/// once the document configuration supplies a `source_rgb_profile` to
/// interpret it through.
#[test]
fn device_rgb_image_converts_once_source_profile_is_configured() {
    let config = Configuration::new_lab().with_source_rgb_profile(srgb_icc_bytes());
    let mut converter = BaseConverter::new(ConverterRole::Image, config);
    let mut engine = LcmsEngine::new();

    let input = ImageInput {
        stream_ref_key: "9-0".to_string(),
        stream_data: vec![255, 128, 0, 0, 0, 0],
        is_compressed: false,
        width: 2,
        height: 1,
        color_space: PdfColorSpaceKind::DeviceRgb,
        bits_per_component: 8,
        source_profile: None,
    };

    let output = pdf_recolor::converter::image::convert_image(&mut converter, &mut engine, input, false).unwrap();
    assert_eq!(output.pixel_count, 2);
    assert_eq!(output.color_space, PdfColorSpaceKind::Lab { range: [-128.0, 127.0, -128.0, 127.0] });
}

/// S5 (adapted to a Lab destination, see module docs): a page with five
/// `DeviceRGB` images (converted on the worker pool, via a configured
/// `source_rgb_profile`) and one Indexed image (always on-thread). All six
/// end up converted, and the dictionaries are rewritten.
#[test]
fn s5_worker_mode_image_fan_out() {
    let config = Configuration::new_lab()
        .with_source_rgb_profile(srgb_icc_bytes())
        .with_use_workers(true)
        .with_worker_count(4);
    let mut doc = Document::new(config).unwrap();
    let mut ctx = InMemoryPdf::new();

    let mut xobjects = PdfDict::new();
    let mut plain_refs = Vec::new();
    for i in 0..5 {
        let mut dict = PdfDict::new();
        dict.set("Subtype", PdfObject::Name("Image".to_string()));
        dict.set("ColorSpace", PdfObject::Name("DeviceRGB".to_string()));
        dict.set("Width", PdfObject::Number(1.0));
        dict.set("Height", PdfObject::Number(1.0));
        dict.set("BitsPerComponent", PdfObject::Number(8.0));
        let stream_ref = ctx.add_stream(dict, vec![10, 20, 30]);
        xobjects.set(format!("Im{i}"), PdfObject::Reference(stream_ref));
        plain_refs.push(stream_ref);
    }

    let mut indexed_dict = PdfDict::new();
    indexed_dict.set("Subtype", PdfObject::Name("Image".to_string()));
    indexed_dict.set(
        "ColorSpace",
        PdfObject::Array(vec![
            PdfObject::Name("Indexed".to_string()),
            PdfObject::Name("DeviceRGB".to_string()),
            PdfObject::Number(1.0),
            PdfObject::String(vec![0xFF, 0x00, 0x00, 0x00, 0xFF, 0x00]),
        ]),
    );
    indexed_dict.set("Width", PdfObject::Number(1.0));
    indexed_dict.set("Height", PdfObject::Number(1.0));
    indexed_dict.set("BitsPerComponent", PdfObject::Number(8.0));
    let indexed_ref = ctx.add_stream(indexed_dict, vec![0]);
    xobjects.set("ImIndexed", PdfObject::Reference(indexed_ref));

    let page = PageDescriptor {
        resources_xobject: xobjects,
        resources_color_space: PdfDict::new(),
        color_space_definitions: HashMap::new(),
        contents: PdfObject::Array(vec![]),
    };

    let totals = doc.convert_pages(&mut ctx, vec![page]).unwrap();
    assert!(totals.errors.is_empty(), "errors: {:?}", totals.errors);
    assert_eq!(totals.images_converted, 6);

    for stream_ref in plain_refs {
        let stream = ctx.lookup_stream(stream_ref).unwrap();
        match stream.dict.get("ColorSpace") {
            Some(PdfObject::Array(items)) => assert_eq!(items[0], PdfObject::Name("Lab".to_string())),
            other => panic!("expected the inline Lab color-space array, got {other:?}"),
        }
    }

    let indexed_stream = ctx.lookup_stream(indexed_ref).unwrap();
    match indexed_stream.dict.get("ColorSpace") {
        Some(PdfObject::Array(items)) => {
            assert_eq!(items[0], PdfObject::Name("Indexed".to_string()));
            assert!(
                matches!(items[1], PdfObject::Array(_)),
                "Indexed base is now the inline Lab array, not a bare device name: {:?}",
                items[1]
            );
            assert_eq!(items[2], PdfObject::Number(1.0), "hival is preserved");
        }
        other => panic!("expected an Indexed ColorSpace array, got {other:?}"),
    }
}
