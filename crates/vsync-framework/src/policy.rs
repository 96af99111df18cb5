//! # Field Merge Policy
//!
//! A kind-scoped table of rules that decides, field by field, which store owns a
//! value. Each rule names a field, a [`Direction`] and an [`Equality`]:
//!
//! * [`Direction::Down`]: the virtual value is written to the physical object.
//! * [`Direction::Up`]: the physical value is written to the virtual object.
//! * [`Direction::Bidirectional`]: the physical value flows up only while the
//!   virtual field is unset. This is how defaults a physical controller fills in
//!   become visible to users without ever overriding what they set.
//!
//! The policy is pure: [`FieldMergePolicy::diff`] compares two objects and stages
//! the differences into lazily built patches. Rule order only affects the order of
//! the recorded field names.

use crate::kind::ResourceKind;
use crate::object::Object;
use crate::patch::{Patch, PatchBuilder};
use std::collections::BTreeMap;
use std::fmt;

/// A value the policy can compare and copy.
pub trait FieldValue: Clone + PartialEq + Send + Sync + 'static {
    /// Absent or zero. Unset virtual values yield to physical defaults on
    /// bidirectional fields.
    fn is_unset(&self) -> bool;
}

/// Implements [`FieldValue`] for types whose unset value is their `Default`.
#[macro_export]
macro_rules! impl_field_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::FieldValue for $ty {
                fn is_unset(&self) -> bool {
                    *self == <$ty as ::std::default::Default>::default()
                }
            }
        )+
    };
}

impl_field_value!(String, bool, i32, i64, u32, u64);

impl<T: Clone + PartialEq + Send + Sync + 'static> FieldValue for Option<T> {
    fn is_unset(&self) -> bool {
        self.is_none()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> FieldValue for Vec<T> {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> FieldValue for BTreeMap<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Down,
    Up,
    Bidirectional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equality {
    /// Plain `==`.
    Exact,
    /// `==`, and any two unset values are equal (`None`, `Some(vec![])` style noise
    /// never counts as drift).
    Semantic,
}

impl Equality {
    pub fn equal<V: FieldValue>(self, a: &V, b: &V) -> bool {
        match self {
            Equality::Exact => a == b,
            Equality::Semantic => a == b || (a.is_unset() && b.is_unset()),
        }
    }
}

/// Which part of the virtual object an upward change is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Spec,
    Status,
}

trait FieldAccess<K: ResourceKind>: Send + Sync {
    fn equal(&self, a: &Object<K>, b: &Object<K>, equality: Equality) -> bool;
    fn is_unset(&self, object: &Object<K>) -> bool;
    fn copy(&self, from: &Object<K>, to: &mut Object<K>);
}

struct Accessor<K: ResourceKind, V> {
    get: fn(&Object<K>) -> V,
    set: fn(&mut Object<K>, V),
}

impl<K: ResourceKind, V: FieldValue> FieldAccess<K> for Accessor<K, V> {
    fn equal(&self, a: &Object<K>, b: &Object<K>, equality: Equality) -> bool {
        equality.equal(&(self.get)(a), &(self.get)(b))
    }

    fn is_unset(&self, object: &Object<K>) -> bool {
        (self.get)(object).is_unset()
    }

    fn copy(&self, from: &Object<K>, to: &mut Object<K>) {
        (self.set)(to, (self.get)(from));
    }
}

/// One row of the policy table.
pub struct FieldRule<K: ResourceKind> {
    path: &'static str,
    direction: Direction,
    equality: Equality,
    section: Section,
    access: Box<dyn FieldAccess<K>>,
}

impl<K: ResourceKind> FieldRule<K> {
    pub fn new<V: FieldValue>(
        path: &'static str,
        direction: Direction,
        equality: Equality,
        get: fn(&Object<K>) -> V,
        set: fn(&mut Object<K>, V),
    ) -> Self {
        Self {
            path,
            direction,
            equality,
            section: Section::Spec,
            access: Box::new(Accessor { get, set }),
        }
    }

    pub fn path(&self) -> &'static str {
        self.path
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl<K: ResourceKind> fmt::Debug for FieldRule<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRule")
            .field("path", &self.path)
            .field("direction", &self.direction)
            .field("equality", &self.equality)
            .field("section", &self.section)
            .finish()
    }
}

/// The merge table of a kind.
#[derive(Debug)]
pub struct FieldMergePolicy<K: ResourceKind> {
    rules: Vec<FieldRule<K>>,
}

/// Patches computed for one pair. Each is `None` when that side has no drift.
#[derive(Debug)]
pub struct MergePlan<K: ResourceKind> {
    pub physical: Option<Patch<K>>,
    pub virtual_spec: Option<Patch<K>>,
    pub virtual_status: Option<Patch<K>>,
}

impl<K: ResourceKind> MergePlan<K> {
    pub fn is_empty(&self) -> bool {
        self.physical.is_none() && self.virtual_spec.is_none() && self.virtual_status.is_none()
    }
}

impl<K: ResourceKind> FieldMergePolicy<K> {
    pub fn builder() -> FieldMergePolicyBuilder<K> {
        FieldMergePolicyBuilder { rules: Vec::new() }
    }

    pub fn rules(&self) -> &[FieldRule<K>] {
        &self.rules
    }

    /// Compares `virtual_obj` with `physical_view` and returns the patches that bring
    /// them into agreement.
    ///
    /// `physical_view` must already be expressed in virtual coordinates (names the
    /// physical object embeds translated back), so translation never shows up as
    /// drift. The physical patch is built on top of `physical_view`.
    pub fn diff(&self, virtual_obj: &Object<K>, physical_view: &Object<K>) -> MergePlan<K> {
        let mut down = PatchBuilder::new(physical_view);
        let mut up = PatchBuilder::new(virtual_obj);
        let mut up_status = PatchBuilder::new(virtual_obj);
        self.stage(virtual_obj, physical_view, &mut down, &mut up, &mut up_status);
        MergePlan {
            physical: down.build(),
            virtual_spec: up.build(),
            virtual_status: up_status.build(),
        }
    }

    /// Lower-level form of [`FieldMergePolicy::diff`] for callers that stage their own
    /// changes (metadata) into the same builders.
    pub fn stage<'u>(
        &self,
        virtual_obj: &Object<K>,
        physical_view: &Object<K>,
        down: &mut PatchBuilder<'_, K>,
        up: &mut PatchBuilder<'u, K>,
        up_status: &mut PatchBuilder<'u, K>,
    ) {
        for rule in &self.rules {
            if rule.access.equal(virtual_obj, physical_view, rule.equality) {
                continue;
            }

            let flows_up = match rule.direction {
                Direction::Down => false,
                Direction::Up => true,
                Direction::Bidirectional => {
                    rule.access.is_unset(virtual_obj) && !rule.access.is_unset(physical_view)
                }
            };

            if flows_up {
                let target = match rule.section {
                    Section::Spec => &mut *up,
                    Section::Status => &mut *up_status,
                };
                target.stage(rule.path, |object| rule.access.copy(physical_view, object));
            } else {
                down.stage(rule.path, |object| rule.access.copy(virtual_obj, object));
            }
        }
    }
}

/// Fluent construction of a [`FieldMergePolicy`].
pub struct FieldMergePolicyBuilder<K: ResourceKind> {
    rules: Vec<FieldRule<K>>,
}

impl<K: ResourceKind> FieldMergePolicyBuilder<K> {
    /// A spec field owned by the virtual side.
    pub fn down<V: FieldValue>(
        self,
        path: &'static str,
        get: fn(&Object<K>) -> V,
        set: fn(&mut Object<K>, V),
    ) -> Self {
        self.rule(FieldRule::new(path, Direction::Down, Equality::Exact, get, set))
    }

    /// A spec field owned by the physical side.
    pub fn up<V: FieldValue>(
        self,
        path: &'static str,
        get: fn(&Object<K>) -> V,
        set: fn(&mut Object<K>, V),
    ) -> Self {
        self.rule(FieldRule::new(path, Direction::Up, Equality::Semantic, get, set))
    }

    /// A spec field set by users, defaulted by the physical side while unset.
    pub fn bidirectional<V: FieldValue>(
        self,
        path: &'static str,
        get: fn(&Object<K>) -> V,
        set: fn(&mut Object<K>, V),
    ) -> Self {
        self.rule(FieldRule::new(
            path,
            Direction::Bidirectional,
            Equality::Semantic,
            get,
            set,
        ))
    }

    /// A status field; status only ever flows up and is written with a status update.
    pub fn status<V: FieldValue>(
        self,
        path: &'static str,
        get: fn(&Object<K>) -> V,
        set: fn(&mut Object<K>, V),
    ) -> Self {
        let mut rule = FieldRule::new(path, Direction::Up, Equality::Exact, get, set);
        rule.section = Section::Status;
        self.rule(rule)
    }

    pub fn rule(mut self, rule: FieldRule<K>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn build(self) -> FieldMergePolicy<K> {
        FieldMergePolicy { rules: self.rules }
    }
}
