//! Buffer/Color Lookup Registry (`spec.md` §4.5 "Buffer/Color Lookup
//! Registry (C5)").
//!
//! This module implements the color-lookup-cache half; the shared-buffer-
//! view half (weak-mapped stream → process-shared byte buffer) is expressed
//! as [`SharedBufferRegistry`] below, following `spec.md` §9's guidance to
//! replace a language-level weak map with an explicit invalidate-on-dispose
//! hash map keyed by the interned object-number/generation pair.

use std::collections::HashMap;

use crate::color::{Gray, Lab, Rgb};
use crate::engine::intent::RenderingIntent;
use crate::pdf_model::PdfRef;

/// The color space a pending/cached color entry is expressed in
/// (`spec.md` §3 "Pending Color Entry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupColorSpace {
    Rgb,
    Gray,
    Lab,
}

/// A color value pending conversion (`spec.md` §3 "Pending Color Entry").
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PendingColor {
    Rgb(Rgb),
    Gray(Gray),
    Lab(Lab),
}

impl PendingColor {
    pub fn space(&self) -> LookupColorSpace {
        match self {
            PendingColor::Rgb(_) => LookupColorSpace::Rgb,
            PendingColor::Gray(_) => LookupColorSpace::Gray,
            PendingColor::Lab(_) => LookupColorSpace::Lab,
        }
    }

    /// `spec.md` §3: `"<space>:<v1,v2,…>"`.
    pub fn color_key(&self) -> String {
        match self {
            PendingColor::Rgb(c) => format!("rgb:{},{},{}", fmt(c.r), fmt(c.g), fmt(c.b)),
            PendingColor::Gray(c) => format!("gray:{}", fmt(c.0)),
            PendingColor::Lab(c) => format!("lab:{},{},{}", fmt(c.l), fmt(c.a), fmt(c.b)),
        }
    }
}

fn fmt(v: f32) -> String {
    format!("{v:.6}")
}

/// `spec.md` §3 "Configuration Fingerprint": `<destinationProfileKey>|<intent>|<bpc>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigFingerprint(pub String);

impl ConfigFingerprint {
    pub fn new(destination_profile_key: &str, intent: RenderingIntent, bpc: bool) -> Self {
        Self(format!(
            "{destination_profile_key}|{}|{bpc}",
            intent.engine_constant()
        ))
    }
}

const DEFAULT_MAX_ENTRIES: usize = 50_000;

/// Snapshot counters a diagnostics collector reads (`spec.md` §4.12
/// `incrementCounter`; supplemented per `SPEC_FULL.md` §2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

/// The deduplicating, FIFO-evicting color lookup cache
/// (`spec.md` §4.5 "Color lookup cache").
pub struct ColorLookupCache {
    max_entries: usize,
    /// config fingerprint → (color key → converted values), insertion order
    /// preserved per bucket for FIFO eviction.
    entries: HashMap<ConfigFingerprint, IndexedMap>,
    /// Global FIFO order across all config buckets, as (config, color key).
    order: Vec<(ConfigFingerprint, String)>,
    pending: HashMap<ConfigFingerprint, Vec<PendingColor>>,
    pending_keys: HashMap<ConfigFingerprint, std::collections::HashSet<String>>,
    stats: CacheStats,
}

/// A small ordered map so `storeColor`/`lookupColor` stay O(1) while
/// `entries()` can still be walked in insertion order for diagnostics.
#[derive(Default)]
struct IndexedMap {
    map: HashMap<String, Vec<f32>>,
}

impl ColorLookupCache {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: HashMap::new(),
            order: Vec::new(),
            pending: HashMap::new(),
            pending_keys: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats;
        stats.size = self.order.len();
        stats
    }

    /// `spec.md` §4.5 `lookupColor`.
    pub fn lookup_color(&mut self, config: &ConfigFingerprint, color: &PendingColor) -> Option<Vec<f32>> {
        let key = color.color_key();
        let result = self.entries.get(config).and_then(|m| m.map.get(&key)).cloned();
        if result.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        result
    }

    /// `spec.md` §4.5 `registerColor`. Returns whether it was newly queued.
    pub fn register_color(&mut self, config: &ConfigFingerprint, color: PendingColor) -> bool {
        let key = color.color_key();
        if self.entries.get(config).map(|m| m.map.contains_key(&key)).unwrap_or(false) {
            return false;
        }
        let keys = self.pending_keys.entry(config.clone()).or_default();
        if keys.contains(&key) {
            return false;
        }
        keys.insert(key);
        self.pending.entry(config.clone()).or_default().push(color);
        true
    }

    /// Returns the pending entries grouped by color space for one config,
    /// draining them (`spec.md` §4.5 `convertPending`: "groups pending
    /// entries by color space ... store each result ... clear pending").
    /// The actual engine call is made by the caller (the Base Converter),
    /// which has access to the color engine; this just manages queue state.
    pub fn take_pending(&mut self, config: &ConfigFingerprint) -> Vec<PendingColor> {
        self.pending_keys.remove(config);
        self.pending.remove(config).unwrap_or_default()
    }

    /// `spec.md` §4.5 `storeColor`.
    pub fn store_color(&mut self, config: &ConfigFingerprint, color: &PendingColor, converted: Vec<f32>) {
        let key = color.color_key();
        let bucket = self.entries.entry(config.clone()).or_default();
        let is_new = !bucket.map.contains_key(&key);
        bucket.map.insert(key.clone(), converted);
        if is_new {
            self.order.push((config.clone(), key));
        }

        if self.order.len() > self.max_entries {
            self.evict_oldest_10_percent();
        }
    }

    fn evict_oldest_10_percent(&mut self) {
        let evict_count = (self.max_entries / 10).max(1);
        let to_evict: Vec<(ConfigFingerprint, String)> =
            self.order.drain(..evict_count.min(self.order.len())).collect();
        for (config, key) in &to_evict {
            if let Some(bucket) = self.entries.get_mut(config) {
                bucket.map.remove(key);
                if bucket.map.is_empty() {
                    self.entries.remove(config);
                }
            }
        }
        self.stats.evictions += to_evict.len() as u64;
    }

    pub fn entry_count(&self) -> usize {
        self.order.len()
    }
}

impl Default for ColorLookupCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-shared byte-buffer views over PDF stream contents
/// (`spec.md` §4.5 "Shared buffer views", §9 "Weak-map stream → shared
/// buffer").
#[derive(Default)]
pub struct SharedBufferRegistry {
    buffers: HashMap<PdfRef, Vec<u8>>,
    total_bytes: usize,
}

impl SharedBufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or returns the existing) shared view for `stream_ref`'s
    /// contents. Shared memory is not actually available across an
    /// in-process Rust crate boundary the way it is across a JS worker
    /// transport, so this is a reference-counted copy keyed by the PDF
    /// reference, invalidated explicitly via [`Self::invalidate`].
    pub fn get_or_insert(&mut self, stream_ref: PdfRef, contents: &[u8]) -> &[u8] {
        if !self.buffers.contains_key(&stream_ref) {
            self.total_bytes += contents.len();
            self.buffers.insert(stream_ref, contents.to_vec());
        }
        &self.buffers[&stream_ref]
    }

    pub fn invalidate(&mut self, stream_ref: PdfRef) {
        if let Some(buf) = self.buffers.remove(&stream_ref) {
            self.total_bytes = self.total_bytes.saturating_sub(buf.len());
        }
    }

    pub fn total_allocated_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ConfigFingerprint {
        ConfigFingerprint::new("buf:128", RenderingIntent::RelativeColorimetric, true)
    }

    #[test]
    fn register_then_lookup_after_store() {
        let mut cache = ColorLookupCache::new();
        let config = cfg();
        let color = PendingColor::Rgb(Rgb::new(1.0, 0.5, 0.0));
        assert!(cache.register_color(&config, color));
        assert!(!cache.register_color(&config, color), "duplicate registration is a no-op");
        assert!(cache.lookup_color(&config, &color).is_none());

        let pending = cache.take_pending(&config);
        assert_eq!(pending.len(), 1);

        cache.store_color(&config, &color, vec![0.0, 0.5, 1.0, 0.0]);
        assert_eq!(
            cache.lookup_color(&config, &color),
            Some(vec![0.0, 0.5, 1.0, 0.0])
        );
    }

    #[test]
    fn eviction_keeps_size_within_overshoot_window() {
        let mut cache = ColorLookupCache::with_max_entries(100);
        let config = cfg();
        for i in 0..120 {
            let color = PendingColor::Gray(Gray(i as f32));
            cache.store_color(&config, &color, vec![i as f32]);
        }
        assert!(cache.entry_count() <= 110);
    }

    #[test]
    fn config_fingerprint_format() {
        let fp = ConfigFingerprint::new("sRGB", RenderingIntent::Perceptual, false);
        assert_eq!(fp.0, "sRGB|0|false");
    }
}
