//! Minimal consumer-interface traits for the external PDF object model
//! (`spec.md` §6: "PDF object model (consumer interface only)").
//!
//! This crate never constructs or serializes a PDF document itself — that
//! remains the host application's concern. These traits describe only the
//! shape the orchestrator needs in order to read and rewrite colors: page
//! iteration, reference resolution, and the handful of dict/array/stream
//! operations named in §6.

/// An opaque indirect-object reference.
///
/// `object_number`/`generation_number` are exactly the pair the per-reference
/// override map keys on after normalization (`spec.md` §3,
/// [`crate::config::reference_key`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PdfRef {
    pub object_number: u32,
    pub generation_number: u16,
}

impl PdfRef {
    pub fn new(object_number: u32, generation_number: u16) -> Self {
        Self {
            object_number,
            generation_number,
        }
    }

    pub fn key(&self) -> String {
        crate::config::reference_key(self.object_number, self.generation_number)
    }
}

/// A PDF object value as seen through the consumer interface, flattened
/// enough for this crate's own reads/writes without re-implementing a full
/// object model.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Bool(bool),
    Number(f64),
    Name(String),
    /// Literal or hex string bytes (the two forms named in §6 are
    /// indistinguishable once decoded).
    String(Vec<u8>),
    Array(Vec<PdfObject>),
    Dict(PdfDict),
    Reference(PdfRef),
}

impl PdfObject {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PdfObject::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            PdfObject::Name(n) => Some(n.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PdfObject]> {
        match self {
            PdfObject::Array(a) => Some(a.as_slice()),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&PdfDict> {
        match self {
            PdfObject::Dict(d) => Some(d),
            _ => None,
        }
    }
}

/// A PDF dictionary, exposing exactly the operations §6 names:
/// `get`, `set`, `delete`, `entries`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfDict {
    entries: Vec<(String, PdfObject)>,
}

impl PdfDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&PdfObject> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn set(&mut self, name: impl Into<String>, value: PdfObject) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    pub fn delete(&mut self, name: &str) {
        self.entries.retain(|(k, _)| k != name);
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &PdfObject)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A raw stream object: a dict plus its (possibly still-encoded) byte
/// contents (`spec.md` §6).
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub dict: PdfDict,
    pub contents: Vec<u8>,
}

/// Resolves indirect references, standing in for the host's
/// `context.lookup(ref)` (`spec.md` §6).
pub trait PdfContext {
    fn lookup(&self, reference: PdfRef) -> Option<PdfObject>;
    fn lookup_stream(&self, reference: PdfRef) -> Option<PdfStream>;

    /// Registers a new indirect object, returning its reference. Used by the
    /// Document Orchestrator to add the normalized Lab color-space resource
    /// (`spec.md` §4.10).
    fn add_object(&mut self, object: PdfObject) -> PdfRef;

    /// Overwrites an existing stream's dict and contents in place.
    fn update_stream(&mut self, reference: PdfRef, dict: PdfDict, contents: Vec<u8>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dict_set_overwrites_existing_key() {
        let mut dict = PdfDict::new();
        dict.set("Foo", PdfObject::Number(1.0));
        dict.set("Foo", PdfObject::Number(2.0));
        assert_eq!(dict.entries().count(), 1);
        assert_eq!(dict.get("Foo"), Some(&PdfObject::Number(2.0)));
    }

    #[test]
    fn dict_delete_removes_key() {
        let mut dict = PdfDict::new();
        dict.set("Foo", PdfObject::Bool(true));
        dict.delete("Foo");
        assert_eq!(dict.get("Foo"), None);
    }

    #[test]
    fn reference_key_roundtrip() {
        let r = PdfRef::new(7, 0);
        assert_eq!(r.key(), "7-0");
    }
}
