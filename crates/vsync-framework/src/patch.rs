//! Lazily allocated patches.

use crate::kind::ResourceKind;
use crate::object::Object;

/// Accumulates changes against a borrowed base object.
///
/// Nothing is cloned until the first [`PatchBuilder::stage`]; a builder that never
/// stages anything builds to `None`, which is how a pass without drift ends up
/// writing nothing.
#[derive(Debug)]
pub struct PatchBuilder<'a, K: ResourceKind> {
    base: &'a Object<K>,
    patched: Option<Object<K>>,
    fields: Vec<&'static str>,
}

impl<'a, K: ResourceKind> PatchBuilder<'a, K> {
    pub fn new(base: &'a Object<K>) -> Self {
        Self {
            base,
            patched: None,
            fields: Vec::new(),
        }
    }

    /// Applies a change to the working copy and records `field` as changed.
    pub fn stage(&mut self, field: &'static str, apply: impl FnOnce(&mut Object<K>)) {
        let base = self.base;
        let patched = self.patched.get_or_insert_with(|| base.clone());
        apply(patched);
        self.fields.push(field);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn build(self) -> Option<Patch<K>> {
        let object = self.patched?;
        Some(Patch {
            object,
            fields: self.fields,
        })
    }
}

/// A full object to write, plus the fields that made it differ from what was read.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch<K: ResourceKind> {
    pub object: Object<K>,
    pub fields: Vec<&'static str>,
}
