//! Revision names embedded in specs and statuses.
//!
//! Revisions are named after their configuration (`hello-00001`), which is named
//! after its service. Physical revisions follow the physical service name instead
//! (`hello-x-default-x-vsync-00001`), so every embedded revision name is translated
//! on the way down and back on the way up.

use vsync_framework::{IdentityTranslator, ObjectKey};

/// Physical form of a revision name owned by `parent`.
///
/// Names that are not derived from the parent name are kept as they are.
pub fn physical_revision_name(name: &str, parent: &ObjectKey, translator: &IdentityTranslator) -> String {
    match name.strip_prefix(parent.name.as_str()) {
        Some(rest) if rest.starts_with('-') => translator.to_physical_child(parent, name).name,
        _ => name.to_string(),
    }
}

/// Inverse of [`physical_revision_name`].
pub fn virtual_revision_name(name: &str, parent: &ObjectKey, translator: &IdentityTranslator) -> String {
    if name.is_empty() {
        return String::new();
    }
    translator.virtual_child_name(parent, name)
}
