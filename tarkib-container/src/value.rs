//! Raw configuration values and bean handles.
//!
//! A [`Value`] is what a definition carries before wiring: scalars, named
//! references, pre-built instances, or the distinguished [`Value::Autowired`]
//! marker that stands in for a slot the resolver fills by type. Values are
//! converted to a declared [`TypeSpec`](crate::descriptor::TypeSpec) by the
//! type converter and handed to descriptor closures.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::descriptor::TypeSpec;
use crate::error::Result;

/// A type-erased, shared bean instance.
///
/// Everything the container manages is one of these. Identity (singleton
/// guarantees, early references) is `Arc` pointer identity.
pub type BeanHandle = Arc<dyn Any + Send + Sync>;

/// A deferred lookup installed through a method-override record.
pub type ProviderFn = Arc<dyn Fn() -> Result<BeanHandle> + Send + Sync>;

/// Wraps a value as a [`BeanHandle`].
pub fn handle<T: Send + Sync + 'static>(value: T) -> BeanHandle {
    Arc::new(value)
}

/// Downcasts a handle to a concrete component type.
pub fn typed<T: Send + Sync + 'static>(h: &BeanHandle) -> Option<Arc<T>> {
    h.clone().downcast::<T>().ok()
}

/// The [`TypeId`] of the value behind a handle (not of the `Arc` itself).
pub fn handle_type_id(h: &BeanHandle) -> TypeId {
    (**h).type_id()
}

/// A raw value as declared on a bean definition.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent / deliberately nil.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A reference to another bean by name, resolved at wiring time.
    Ref(String),
    /// An already-resolved instance.
    Instance(BeanHandle),
    /// All candidates of an element type, gathered for a list dependency.
    InstanceList(Vec<BeanHandle>),
    /// All candidates of an element type, keyed by bean name.
    InstanceMap(Vec<(String, BeanHandle)>),
    /// A deferred producer (lookup-override injection).
    Provider(ProviderFn),
    /// Marker for a prepared-argument slot the resolver autowires on use.
    Autowired,
}

impl Value {
    /// A short tag for diagnostics and error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Ref(_) => "ref",
            Value::Instance(_) => "instance",
            Value::InstanceList(_) => "instance-list",
            Value::InstanceMap(_) => "instance-map",
            Value::Provider(_) => "provider",
            Value::Autowired => "autowired",
        }
    }

    pub fn is_autowired_marker(&self) -> bool {
        matches!(self, Value::Autowired)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&BeanHandle> {
        match self {
            Value::Instance(h) => Some(h),
            _ => None,
        }
    }

    /// Downcasts an instance value to a concrete component type.
    pub fn instance_as<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.as_instance().and_then(typed::<T>)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Ref(name) => write!(f, "Ref({name:?})"),
            Value::Instance(_) => write!(f, "Instance(..)"),
            Value::InstanceList(v) => write!(f, "InstanceList(len={})", v.len()),
            Value::InstanceMap(v) => write!(f, "InstanceMap(len={})", v.len()),
            Value::Provider(_) => write!(f, "Provider(..)"),
            Value::Autowired => write!(f, "Autowired"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// A named property value on a definition.
#[derive(Clone, Debug)]
pub struct PropertyValue {
    pub name: String,
    pub value: Value,
}

impl PropertyValue {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        PropertyValue { name: name.into(), value }
    }
}

/// Insertion-ordered list of property values; adding an existing name
/// replaces it in place.
#[derive(Clone, Debug, Default)]
pub struct PropertyValues {
    items: Vec<PropertyValue>,
}

impl PropertyValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        let name = name.into();
        if let Some(existing) = self.items.iter_mut().find(|pv| pv.name == name) {
            existing.value = value;
        } else {
            self.items.push(PropertyValue { name, value });
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|pv| pv.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.items.iter().find(|pv| pv.name == name).map(|pv| &pv.value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.items.iter().position(|pv| pv.name == name)?;
        Some(self.items.remove(pos).value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyValue> {
        self.items.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|pv| pv.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Merges `other` over `self`: later names win.
    pub fn merge_from(&mut self, other: &PropertyValues) {
        for pv in other.iter() {
            self.add(pv.name.clone(), pv.value.clone());
        }
    }
}

/// A declared constructor argument: the raw value plus the optional declared
/// type and parameter name used for matching.
#[derive(Clone, Debug)]
pub struct ValueHolder {
    pub value: Value,
    pub declared_type: Option<TypeSpec>,
    pub name: Option<String>,
}

impl ValueHolder {
    pub fn new(value: Value) -> Self {
        ValueHolder { value, declared_type: None, name: None }
    }

    pub fn with_type(mut self, ty: TypeSpec) -> Self {
        self.declared_type = Some(ty);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Declared constructor arguments: indexed entries plus generic (unindexed)
/// entries matched by type and name during resolution.
#[derive(Clone, Debug, Default)]
pub struct ConstructorArgumentValues {
    indexed: BTreeMap<usize, ValueHolder>,
    generic: Vec<ValueHolder>,
}

impl ConstructorArgumentValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_indexed(&mut self, index: usize, holder: ValueHolder) -> &mut Self {
        self.indexed.insert(index, holder);
        self
    }

    pub fn add_generic(&mut self, holder: ValueHolder) -> &mut Self {
        self.generic.push(holder);
        self
    }

    pub fn get_indexed(&self, index: usize) -> Option<&ValueHolder> {
        self.indexed.get(&index)
    }

    /// Finds a generic argument for a parameter, preferring a name match,
    /// then a declared-type match, then any untyped unnamed holder. Holders
    /// already claimed by another parameter (`used`) are skipped.
    pub fn get_generic(
        &self,
        param_name: &str,
        param_type: &TypeSpec,
        used: &[usize],
    ) -> Option<(usize, &ValueHolder)> {
        let available = |i: &usize| !used.contains(i);

        if let Some(found) = self
            .generic
            .iter()
            .enumerate()
            .find(|(i, h)| available(i) && h.name.as_deref() == Some(param_name))
        {
            return Some(found);
        }

        if let Some(found) = self.generic.iter().enumerate().find(|(i, h)| {
            available(i)
                && h.name.is_none()
                && h.declared_type.as_ref().is_some_and(|t| t == param_type)
        }) {
            return Some(found);
        }

        self.generic
            .iter()
            .enumerate()
            .find(|(i, h)| available(i) && h.name.is_none() && h.declared_type.is_none())
    }

    /// Total number of declared argument values (indexed plus generic).
    pub fn count(&self) -> usize {
        self.indexed.len() + self.generic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexed.is_empty() && self.generic.is_empty()
    }

    /// Merges `other` over `self`: indexed slots override, generics append.
    pub fn merge_from(&mut self, other: &ConstructorArgumentValues) {
        for (idx, holder) in &other.indexed {
            self.indexed.insert(*idx, holder.clone());
        }
        for holder in &other.generic {
            self.generic.push(holder.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeSpec;

    #[test]
    fn property_values_replace_in_place() {
        let mut pvs = PropertyValues::new();
        pvs.add("url", Value::from("first"));
        pvs.add("port", Value::Int(5432));
        pvs.add("url", Value::from("second"));

        assert_eq!(pvs.len(), 2);
        assert_eq!(pvs.names(), vec!["url", "port"]);
        assert_eq!(pvs.get("url").and_then(Value::as_str), Some("second"));
    }

    #[test]
    fn instance_downcast_round_trip() {
        struct Widget {
            id: u32,
        }

        let v = Value::Instance(handle(Widget { id: 7 }));
        let w = v.instance_as::<Widget>().unwrap();
        assert_eq!(w.id, 7);
        assert!(v.instance_as::<String>().is_none());
    }

    #[test]
    fn handle_type_id_sees_concrete_type() {
        let h = handle(42i64);
        assert_eq!(handle_type_id(&h), std::any::TypeId::of::<i64>());
        assert_ne!(handle_type_id(&h), std::any::TypeId::of::<BeanHandle>());
    }

    #[test]
    fn generic_argument_prefers_name_match() {
        let mut args = ConstructorArgumentValues::new();
        args.add_generic(ValueHolder::new(Value::Int(1)));
        args.add_generic(ValueHolder::new(Value::Int(2)).with_name("port"));

        let (idx, holder) = args.get_generic("port", &TypeSpec::int(), &[]).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(holder.value.as_int(), Some(2));
    }

    #[test]
    fn generic_argument_falls_back_to_untyped() {
        let mut args = ConstructorArgumentValues::new();
        args.add_generic(ValueHolder::new(Value::from("x")));

        let (idx, _) = args.get_generic("whatever", &TypeSpec::str(), &[]).unwrap();
        assert_eq!(idx, 0);
        assert!(args.get_generic("other", &TypeSpec::str(), &[0]).is_none());
    }

    #[test]
    fn indexed_merge_overrides() {
        let mut base = ConstructorArgumentValues::new();
        base.add_indexed(0, ValueHolder::new(Value::Int(1)));

        let mut child = ConstructorArgumentValues::new();
        child.add_indexed(0, ValueHolder::new(Value::Int(9)));

        base.merge_from(&child);
        assert_eq!(base.count(), 1);
        assert_eq!(base.get_indexed(0).unwrap().value.as_int(), Some(9));
    }
}
