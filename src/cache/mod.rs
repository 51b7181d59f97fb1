//! Caching layer: profile/transform handles (C3) and the color lookup
//! registry (C5).

pub mod lookup_cache;
pub mod profile_cache;

pub use lookup_cache::{CacheStats, ColorLookupCache, ConfigFingerprint, PendingColor, SharedBufferRegistry};
pub use profile_cache::{ProfileFingerprint, ProfileTransformCache, TransformFingerprint};
