//! The Document Orchestrator (`spec.md` §4.10 "Document Orchestrator
//! (C10)").
//!
//! Walks a document's pages in order, owning everything a page needs but
//! doesn't own itself: the top-level converter (and through it the engine,
//! the profile/transform cache, and diagnostics), the shared buffer
//! registry, the worker pool, and the one normalized Lab color-space
//! resource every Lab-destination page shares — grounded on the teacher's
//! own [`Document`]/`start_page` driving shape, where a single top-level
//! object owns the state every page borrows from in turn, generalized here
//! from "accumulate pages to serialize" to "walk pages and rewrite their
//! colors in place".

use std::collections::HashMap;

use crate::cache::SharedBufferRegistry;
use crate::color::PdfColorSpaceKind;
use crate::config::Configuration;
use crate::converter::content_stream::ColorSpaceState;
use crate::converter::{BaseConverter, ConverterRole};
use crate::engine::lcms_engine::LcmsEngine;
use crate::engine::version::{EngineVersion, RequiresEngineVersion};
use crate::engine::ColorEngine;
use crate::error::{Error, Result};
use crate::page::{self, PageConversionTotals};
use crate::pdf_model::{PdfContext, PdfDict, PdfObject, PdfRef};
use crate::worker::WorkerPool;

/// D50 whitepoint and `-128..127` range `spec.md` §4.10 requires for the
/// shared normalized Lab color-space resource.
const LAB_D50_WHITEPOINT: [f64; 3] = [0.964_22, 1.0, 0.825_21];
const LAB_RANGE: [f64; 4] = [-128.0, 127.0, -128.0, 127.0];
const LAB_WHITEPOINT_TOLERANCE: f64 = 1e-5;
const NORMALIZED_LAB_RESOURCE_NAME: &str = "CSLabD50";

/// Caches the one document-wide normalized Lab color-space resource
/// (`spec.md` §4.10: "cache per-document").
#[derive(Debug, Clone, Default)]
pub struct LabColorSpaceCache {
    resource: Option<(PdfRef, String)>,
}

impl LabColorSpaceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached resource's indirect reference, once created.
    pub fn resource_ref(&self) -> Option<PdfRef> {
        self.resource.as_ref().map(|(r, _)| *r)
    }
}

fn matches_normalized_lab(dict: &PdfDict) -> bool {
    let Some(PdfObject::Array(whitepoint)) = dict.get("WhitePoint") else {
        return false;
    };
    if whitepoint.len() != 3 {
        return false;
    }
    for (component, expected) in whitepoint.iter().zip(LAB_D50_WHITEPOINT) {
        let Some(value) = component.as_number() else {
            return false;
        };
        if (value - expected).abs() > LAB_WHITEPOINT_TOLERANCE {
            return false;
        }
    }
    let Some(PdfObject::Array(range)) = dict.get("Range") else {
        return false;
    };
    if range.len() != 4 {
        return false;
    }
    for (component, expected) in range.iter().zip(LAB_RANGE) {
        if component.as_number() != Some(expected) {
            return false;
        }
    }
    true
}

/// `spec.md` §4.10: "`getOrCreateNormalizedLabColorSpace(doc)` searches the
/// existing document for a Lab color space whose whitepoint is D50 ... if
/// found, reuse. Otherwise create the resource ... register it as an
/// indirect object, cache per-document."
///
/// The consumer-facing [`PdfContext`] this crate reads through exposes
/// reference resolution and indirect-object creation, not a full-document
/// object enumeration, so "searches the existing document" narrows to
/// "searches what this orchestrator has already created or been told
/// about": the cache lives for the lifetime of one [`Document`] and is
/// consulted before ever registering a new resource. A caller that already
/// knows of a pre-existing matching resource in the source PDF can seed the
/// cache directly via [`LabColorSpaceCache`]'s fields instead of letting
/// this function create a redundant one.
pub fn get_or_create_normalized_lab_color_space(
    ctx: &mut dyn PdfContext,
    cache: &mut LabColorSpaceCache,
) -> (PdfRef, String) {
    if let Some(existing) = &cache.resource {
        return existing.clone();
    }

    let array = normalized_lab_color_space_array();
    let object_ref = ctx.add_object(array);
    let name = NORMALIZED_LAB_RESOURCE_NAME.to_string();
    cache.resource = Some((object_ref, name.clone()));
    (object_ref, name)
}

/// The inline `[/Lab << ... >>]` array for the shared normalized Lab color
/// space, without registering it as an indirect object. Used by the Image
/// Converter to declare an `Indexed` image's Lab base inline, since a
/// palette's base color space is never itself an indirect reference
/// (`spec.md` §3 "Indexed").
pub fn normalized_lab_color_space_array() -> PdfObject {
    let mut dict = PdfDict::new();
    dict.set(
        "WhitePoint",
        PdfObject::Array(LAB_D50_WHITEPOINT.iter().map(|v| PdfObject::Number(*v)).collect()),
    );
    dict.set(
        "Range",
        PdfObject::Array(LAB_RANGE.iter().map(|v| PdfObject::Number(*v)).collect()),
    );
    debug_assert!(matches_normalized_lab(&dict));
    PdfObject::Array(vec![PdfObject::Name("Lab".to_string()), PdfObject::Dict(dict)])
}

/// One page's already-resolved inputs to the Page Coordinator
/// (`spec.md` §4.9 step 2).
pub struct PageDescriptor {
    pub resources_xobject: PdfDict,
    pub resources_color_space: PdfDict,
    pub color_space_definitions: HashMap<String, PdfColorSpaceKind>,
    pub contents: PdfObject,
}

/// `spec.md` §7 "User-visible behavior": "the Orchestrator returns
/// `{pagesProcessed, imagesConverted, contentStreamsConverted,
/// totalColorOperationsConverted, errors[], pageResults[]}`".
#[derive(Debug, Default)]
pub struct DocumentConversionTotals {
    pub pages_processed: usize,
    pub images_converted: usize,
    pub images_skipped_cmyk: usize,
    pub streams_converted: usize,
    pub color_operations: usize,
    /// One entry per page whose conversion failed; the page index and the
    /// error are both kept (`spec.md` §7: "errors include the offending
    /// reference string").
    pub errors: Vec<(usize, String)>,
    pub page_results: Vec<PageConversionTotals>,
}

impl DocumentConversionTotals {
    fn record(&mut self, page_totals: PageConversionTotals) {
        self.pages_processed += 1;
        self.images_converted += page_totals.images_converted;
        self.images_skipped_cmyk += page_totals.images_skipped_cmyk;
        self.streams_converted += page_totals.streams_converted;
        self.color_operations += page_totals.color_operations;
        self.page_results.push(page_totals);
    }
}

/// `spec.md` §4.2: "each converter class advertises a minimum engine
/// version ... Constructing a converter with an older engine version fails
/// with `UnsupportedEngineVersion`." The Document Orchestrator is the
/// outermost converter and so is where this check actually runs, once, at
/// construction.
impl RequiresEngineVersion for Document {
    const CONVERTER_NAME: &'static str = "Document";
    const MINIMUM_ENGINE_VERSION: EngineVersion = EngineVersion::from_lcms_encoded(2120);
}

/// Owns and disposes the profile pool, buffer registry, and worker pool
/// (`spec.md` §4.10).
pub struct Document {
    converter: BaseConverter,
    engine: Box<dyn ColorEngine>,
    worker_pool: Option<WorkerPool>,
    buffer_registry: SharedBufferRegistry,
    lab_cache: LabColorSpaceCache,
}

impl Document {
    /// Constructs the Document Orchestrator, initializing the color engine
    /// and checking it against `Document`'s minimum supported version
    /// (`spec.md` §4.2).
    pub fn new(config: Configuration) -> Result<Self> {
        let mut engine: Box<dyn ColorEngine> = Box::new(LcmsEngine::new());
        engine.initialize()?;
        Self::check_engine_version(engine.engine_version())?;

        let worker_pool = if config.use_workers {
            Some(WorkerPool::new(config.worker_count.unwrap_or(1))?)
        } else {
            None
        };

        Ok(Self {
            converter: BaseConverter::new(ConverterRole::Document, config),
            engine,
            worker_pool,
            buffer_registry: SharedBufferRegistry::new(),
            lab_cache: LabColorSpaceCache::new(),
        })
    }

    pub fn configuration(&self) -> &Configuration {
        self.converter.base_configuration()
    }

    pub fn buffer_registry(&mut self) -> &mut SharedBufferRegistry {
        &mut self.buffer_registry
    }

    pub fn engine_version(&self) -> EngineVersion {
        self.engine.engine_version()
    }

    /// `spec.md` §4.10: "Walks pages in order." Color-space state threads
    /// from each page's last content stream into the next page's first
    /// (`spec.md` §8 invariant 8 extends across the whole document, not
    /// just within one page, since content streams never reset graphics
    /// state at a page boundary).
    ///
    /// A single page's conversion failing does not abort the rest of the
    /// document (`spec.md` §7 "Propagation": "one failing item does not
    /// abort the rest"); the failure is recorded in
    /// [`DocumentConversionTotals::errors`] instead.
    pub fn convert_pages(
        &mut self,
        ctx: &mut dyn PdfContext,
        pages: Vec<PageDescriptor>,
    ) -> Result<DocumentConversionTotals> {
        let verbose = self.converter.base_configuration().verbose;
        let root_span = self
            .converter
            .diagnostics
            .start_span("document_conversion", HashMap::new());

        let mut totals = DocumentConversionTotals::default();
        let mut state = ColorSpaceState::default();

        for (index, mut descriptor) in pages.into_iter().enumerate() {
            if verbose {
                log::info!("converting page {index}");
            }

            let mut page_converter = self.converter.create_child(ConverterRole::Page, None);
            let result = page::convert_page(
                &mut page_converter,
                self.engine.as_mut(),
                ctx,
                &descriptor.resources_xobject,
                &mut descriptor.resources_color_space,
                &descriptor.color_space_definitions,
                &descriptor.contents,
                state.clone(),
                &mut self.lab_cache,
                self.worker_pool.as_ref(),
            );
            page_converter.dispose(self.engine.as_mut());

            match result {
                Ok((page_totals, new_state)) => {
                    state = new_state;
                    totals.record(page_totals);
                }
                Err(err) => {
                    if verbose {
                        log::warn!("page {index} failed: {err}");
                    }
                    totals.errors.push((index, err.to_string()));
                }
            }
        }

        self.converter.diagnostics.end_span(&root_span, HashMap::new());
        Ok(totals)
    }

    /// `spec.md` §4.10: "Updates the PDF `Producer` metadata with a suffix
    /// noting the color engine version."
    ///
    /// This crate never writes PDF structure itself (`spec.md` §1/§6: the
    /// object model is a consumer interface only), so rather than mutating
    /// an `Info` dictionary directly, this returns the new `Producer`
    /// string for the host to write back through its own serializer.
    pub fn producer_metadata(&self, existing_producer: &str) -> String {
        format!(
            "{existing_producer} (color-converted, engine {})",
            self.engine.engine_version().encoded()
        )
    }

    /// `spec.md` §4.10: "Owns and disposes the profile pool, buffer
    /// registry, and worker pool." Disposal runs child-before-parent
    /// (`spec.md` §5 "Discipline"): per-page converters are already disposed
    /// by the time [`Document::convert_pages`] returns, so only the
    /// document-level converter and the worker pool remain here.
    pub fn dispose(mut self) {
        self.converter.dispose(self.engine.as_mut());
        self.buffer_registry = SharedBufferRegistry::new();
        if let Some(pool) = self.worker_pool.take() {
            pool.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf_model::PdfStream;

    struct InMemoryCtx {
        next_object_number: u32,
        objects: HashMap<u32, PdfObject>,
    }

    impl InMemoryCtx {
        fn new() -> Self {
            Self {
                next_object_number: 1,
                objects: HashMap::new(),
            }
        }
    }

    impl PdfContext for InMemoryCtx {
        fn lookup(&self, reference: PdfRef) -> Option<PdfObject> {
            self.objects.get(&reference.object_number).cloned()
        }

        fn lookup_stream(&self, _reference: PdfRef) -> Option<PdfStream> {
            None
        }

        fn add_object(&mut self, object: PdfObject) -> PdfRef {
            let object_number = self.next_object_number;
            self.next_object_number += 1;
            self.objects.insert(object_number, object);
            PdfRef::new(object_number, 0)
        }

        fn update_stream(&mut self, _reference: PdfRef, _dict: PdfDict, _contents: Vec<u8>) {}
    }

    #[test]
    fn lab_color_space_resource_is_cached_across_calls() {
        let mut ctx = InMemoryCtx::new();
        let mut cache = LabColorSpaceCache::new();

        let (first_ref, first_name) = get_or_create_normalized_lab_color_space(&mut ctx, &mut cache);
        let (second_ref, second_name) = get_or_create_normalized_lab_color_space(&mut ctx, &mut cache);

        assert_eq!(first_ref, second_ref);
        assert_eq!(first_name, second_name);
        assert_eq!(ctx.objects.len(), 1);
        assert_eq!(cache.resource_ref(), Some(first_ref));
    }

    #[test]
    fn lab_color_space_resource_has_d50_whitepoint_and_range() {
        let mut ctx = InMemoryCtx::new();
        let mut cache = LabColorSpaceCache::new();
        let (object_ref, _) = get_or_create_normalized_lab_color_space(&mut ctx, &mut cache);

        let PdfObject::Array(items) = ctx.lookup(object_ref).unwrap() else {
            panic!("expected array");
        };
        assert_eq!(items[0], PdfObject::Name("Lab".to_string()));
        let dict = items[1].as_dict().unwrap();
        assert!(matches_normalized_lab(dict));
    }

    #[test]
    fn document_construction_checks_minimum_engine_version() {
        let doc = Document::new(Configuration::new_lab());
        assert!(doc.is_ok());
    }

    #[test]
    fn convert_pages_records_page_count() {
        let mut doc = Document::new(Configuration::new_lab()).unwrap();
        let mut ctx = InMemoryCtx::new();
        let pages = vec![PageDescriptor {
            resources_xobject: PdfDict::new(),
            resources_color_space: PdfDict::new(),
            color_space_definitions: HashMap::new(),
            contents: PdfObject::Array(vec![]),
        }];

        let totals = doc.convert_pages(&mut ctx, pages).unwrap();
        assert_eq!(totals.pages_processed, 1);
        assert!(totals.errors.is_empty());
    }

    #[test]
    fn producer_metadata_carries_engine_version_suffix() {
        let doc = Document::new(Configuration::new_lab()).unwrap();
        let suffix = doc.producer_metadata("Acme Writer 1.0");
        assert!(suffix.starts_with("Acme Writer 1.0"));
        assert!(suffix.contains("engine"));
    }
}
