//! # Translators
//!
//! Name and metadata translation between the virtual and the physical store.
//!
//! - [`IdentityTranslator`] maps identities both ways and owns the mapping cache.
//! - [`MetadataTranslator`] builds the metadata of physical counterparts and detects
//!   when it drifted.

mod identity;
mod metadata;
mod name_cache;

pub use identity::*;
pub use metadata::*;
pub use name_cache::NameCache;
