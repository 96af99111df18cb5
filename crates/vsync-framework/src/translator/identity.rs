use crate::error::SyncError;
use crate::object::{ObjectKey, ObjectMeta};
use crate::translator::NameCache;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Label written on every physical object the syncer creates. Its value is the
/// syncer suffix, so two syncer instances sharing a physical store never claim each
/// other's objects.
pub const MANAGED_BY_LABEL: &str = "vsync.loft.sh/managed-by";
/// Virtual name of the object a physical object was translated from.
pub const OBJECT_NAME_ANNOTATION: &str = "vsync.loft.sh/object-name";
/// Virtual namespace of the object a physical object was translated from.
pub const OBJECT_NAMESPACE_ANNOTATION: &str = "vsync.loft.sh/object-namespace";

const SEPARATOR: &str = "-x-";
const MAX_NAME_LENGTH: usize = 63;
const TRUNCATED_LENGTH: usize = 52;
const DIGEST_LENGTH: usize = 10;
const CHILD_PREFIX_LENGTH: usize = 20;

/// Maps virtual identities to physical ones and back.
///
/// All virtual namespaces collapse into one physical target namespace, so the
/// virtual namespace is folded into the physical name:
///
/// ```text
/// default/hello  ->  vsync-host/hello-x-default-x-<suffix>
/// ```
///
/// Names that would exceed 63 characters, or whose parts contain the `-x-`
/// separator (which would make the plain form ambiguous), are truncated and
/// suffixed with a digest of `namespace/name` instead.
///
/// One translator exists per kind; its [`NameCache`] never mixes identities of
/// different kinds.
#[derive(Debug)]
pub struct IdentityTranslator {
    suffix: String,
    target_namespace: String,
    cache: NameCache,
}

impl IdentityTranslator {
    pub fn new(suffix: impl Into<String>, target_namespace: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            target_namespace: target_namespace.into(),
            cache: NameCache::new(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    pub fn cache(&self) -> &NameCache {
        &self.cache
    }

    /// Pure, total translation of a virtual identity.
    pub fn to_physical(&self, vkey: &ObjectKey) -> ObjectKey {
        ObjectKey::new(
            self.target_namespace.clone(),
            self.physical_name(&vkey.name, &vkey.namespace),
        )
    }

    /// Translation for children named after their parent (`svc` -> `svc-00001`).
    ///
    /// The physical child keeps the same relation to the physical parent, which is how
    /// physical-side controllers name the children they generate. See [`child_name`]
    /// for children that would not fit.
    pub fn to_physical_child(&self, parent: &ObjectKey, child: &str) -> ObjectKey {
        match child.strip_prefix(parent.name.as_str()) {
            Some(rest) if !rest.is_empty() => ObjectKey::new(
                self.target_namespace.clone(),
                child_name(&self.physical_name(&parent.name, &parent.namespace), rest),
            ),
            _ => self.to_physical(&ObjectKey::new(parent.namespace.clone(), child)),
        }
    }

    /// Inverse of [`IdentityTranslator::to_physical_child`] for names embedded in specs.
    ///
    /// Names that were not derived from the parent are returned unchanged.
    pub fn virtual_child_name(&self, parent: &ObjectKey, physical_name: &str) -> String {
        let base = self.physical_name(&parent.name, &parent.namespace);
        if physical_name == base {
            return parent.name.clone();
        }
        match strip_parent(&base, physical_name) {
            Some(rest) => format!("{}{rest}", parent.name),
            None => physical_name.to_string(),
        }
    }

    /// Physical name of a virtual `namespace/name`.
    pub fn physical_name(&self, name: &str, namespace: &str) -> String {
        let joined = format!("{name}{SEPARATOR}{namespace}");
        let plain = format!("{joined}{SEPARATOR}{}", self.suffix);
        if plain.len() <= MAX_NAME_LENGTH && separator_count(&joined) == 1 {
            return plain;
        }

        truncate_with_digest(&plain, &format!("{namespace}/{name}"))
    }

    /// Whether this syncer created `physical`.
    pub fn is_managed(&self, physical: &ObjectMeta) -> bool {
        physical.labels.get(MANAGED_BY_LABEL) == Some(&self.suffix)
    }

    /// Maps a physical object back to its virtual identity and caches the result.
    ///
    /// Cached mappings win. Otherwise the name annotations the syncer stamps on its
    /// objects are used; physical-side controllers copy them onto the children they
    /// generate, which is how those children are traced back to a virtual parent.
    /// Anything else is [`SyncError::UnmappedIdentity`]: not ours.
    pub fn to_virtual(&self, physical: &ObjectMeta) -> Result<ObjectKey, SyncError> {
        let pkey = physical.key();
        if let Some(vkey) = self.cache.find_reverse(&pkey) {
            return Ok(vkey);
        }

        let vkey = self.derive_virtual_key(&pkey, physical)?;
        self.cache.add(vkey.clone(), pkey)?;
        Ok(vkey)
    }

    /// Cache-free variant of [`IdentityTranslator::to_virtual`] for a physical key whose
    /// object is not at hand, using the name annotations of a related object.
    pub fn derive_virtual_key(
        &self,
        pkey: &ObjectKey,
        annotated: &ObjectMeta,
    ) -> Result<ObjectKey, SyncError> {
        let unmapped = || SyncError::UnmappedIdentity(pkey.clone());
        if pkey.namespace != self.target_namespace {
            return Err(unmapped());
        }

        let name = annotated
            .annotations
            .get(OBJECT_NAME_ANNOTATION)
            .ok_or_else(unmapped)?;
        let namespace = annotated
            .annotations
            .get(OBJECT_NAMESPACE_ANNOTATION)
            .ok_or_else(unmapped)?;

        let base = self.physical_name(name, namespace);
        let virtual_name = match strip_parent(&base, &pkey.name) {
            Some("") => name.clone(),
            Some(rest) => format!("{name}{rest}"),
            None => {
                debug!(%pkey, %base, "Annotated name does not match physical name");
                return Err(unmapped());
            }
        };
        Ok(ObjectKey::new(namespace.clone(), virtual_name))
    }

    /// Records a pair after a successful create or adoption.
    pub fn remember(&self, vkey: ObjectKey, pkey: ObjectKey) -> Result<(), SyncError> {
        self.cache.add(vkey, pkey)
    }

    /// Drops the mapping of a deleted pair.
    pub fn forget(&self, vkey: &ObjectKey) {
        if let Some(pkey) = self.cache.remove(vkey) {
            debug!(%vkey, %pkey, "Forgot identity mapping");
        }
    }
}

/// Name of the child `{parent}{rest}` of a physical object, bounded to 63
/// characters.
///
/// A child that would not fit keeps a shortened parent name ending in a digest of
/// the full one, so the parent stays recognisable. Suffixes too long even for that
/// are hashed as a whole and can only be mapped back through the cache.
pub fn child_name(parent: &str, rest: &str) -> String {
    if parent.len() + rest.len() <= MAX_NAME_LENGTH {
        return format!("{parent}{rest}");
    }
    let short = shortened_parent(parent);
    if short.len() + rest.len() <= MAX_NAME_LENGTH {
        return format!("{short}{rest}");
    }
    truncate_with_digest(&format!("{parent}{rest}"), &format!("{parent}{rest}"))
}

fn shortened_parent(parent: &str) -> String {
    let mut prefix: String = parent.chars().take(CHILD_PREFIX_LENGTH).collect();
    while prefix.ends_with('-') {
        prefix.pop();
    }
    format!("{prefix}-{}", digest(parent))
}

/// Suffix of `child` after either form of `parent` a child can start with.
fn strip_parent<'a>(parent: &str, child: &'a str) -> Option<&'a str> {
    child
        .strip_prefix(parent)
        .or_else(|| child.strip_prefix(shortened_parent(parent).as_str()))
}

fn truncate_with_digest(name: &str, digested: &str) -> String {
    let mut truncated: String = name.chars().take(TRUNCATED_LENGTH).collect();
    while truncated.ends_with('-') {
        truncated.pop();
    }
    format!("{truncated}-{}", digest(digested))
}

fn digest(value: &str) -> String {
    let mut hex = hex::encode(Sha256::digest(value.as_bytes()));
    hex.truncate(DIGEST_LENGTH);
    hex
}

fn separator_count(value: &str) -> usize {
    value
        .as_bytes()
        .windows(SEPARATOR.len())
        .filter(|window| *window == SEPARATOR.as_bytes())
        .count()
}
