//! Type descriptors — the container's substitute for runtime reflection.
//!
//! Rust has no reflective member access, so the parser layer registers a
//! [`TypeDescriptor`] per component type: constructors, settable properties,
//! methods, trait casts, lifecycle callbacks, and (optionally) a factory-bean
//! adapter. Every "reflective" invocation the container performs is a stored
//! closure over a type-erased [`BeanHandle`].
//!
//! Property setters take `&self`: component types use interior mutability
//! for settable fields, which is also what lets two beans in a setter cycle
//! observe each other once wiring completes.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{Result, TarkibError};
use crate::factory::BeanFactory;
use crate::value::{BeanHandle, Value};

/// Declared type of a parameter, property, or dependency.
#[derive(Clone, Debug)]
pub struct TypeSpec {
    id: TypeId,
    name: &'static str,
    kind: TypeKind,
}

/// The conversion-relevant shape of a [`TypeSpec`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Bool,
    Int,
    Float,
    Str,
    /// A managed component (concrete type or trait object).
    Component,
    /// A list of all candidates of the element type.
    List(Box<TypeSpec>),
    /// A name-keyed map of all candidates of the element type.
    Map(Box<TypeSpec>),
    /// A deferred producer slot (lookup-override injection).
    Provider,
}

impl TypeSpec {
    /// Spec for a component type (use with `dyn Trait` for trait targets).
    pub fn component<T: ?Sized + Send + Sync + 'static>() -> Self {
        TypeSpec {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            kind: TypeKind::Component,
        }
    }

    pub fn bool() -> Self {
        TypeSpec { id: TypeId::of::<bool>(), name: "bool", kind: TypeKind::Bool }
    }

    pub fn int() -> Self {
        TypeSpec { id: TypeId::of::<i64>(), name: "i64", kind: TypeKind::Int }
    }

    pub fn float() -> Self {
        TypeSpec { id: TypeId::of::<f64>(), name: "f64", kind: TypeKind::Float }
    }

    pub fn str() -> Self {
        TypeSpec { id: TypeId::of::<String>(), name: "String", kind: TypeKind::Str }
    }

    /// A list of every candidate assignable to `element`.
    pub fn list_of(element: TypeSpec) -> Self {
        TypeSpec {
            id: element.id,
            name: element.name,
            kind: TypeKind::List(Box::new(element)),
        }
    }

    /// A bean-name-keyed map of every candidate assignable to `element`.
    pub fn map_of(element: TypeSpec) -> Self {
        TypeSpec {
            id: element.id,
            name: element.name,
            kind: TypeKind::Map(Box::new(element)),
        }
    }

    /// A deferred-producer slot for lookup-override injection.
    pub fn provider() -> Self {
        TypeSpec {
            id: TypeId::of::<crate::value::ProviderFn>(),
            name: "Provider",
            kind: TypeKind::Provider,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// The element spec for list/map kinds, `self` otherwise.
    pub fn element(&self) -> &TypeSpec {
        match &self.kind {
            TypeKind::List(e) | TypeKind::Map(e) => e,
            _ => self,
        }
    }

    /// Scalars are "simple": they never participate in by-name/by-type
    /// property autowiring.
    pub fn is_simple(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Bool | TypeKind::Int | TypeKind::Float | TypeKind::Str
        )
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.kind, TypeKind::List(_) | TypeKind::Map(_))
    }
}

// Equality is structural on (id, kind); the display name never discriminates.
impl PartialEq for TypeSpec {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.kind == other.kind
    }
}

impl Eq for TypeSpec {}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::List(e) => write!(f, "List<{e}>"),
            TypeKind::Map(e) => write!(f, "Map<String, {e}>"),
            TypeKind::Provider => write!(f, "Provider"),
            _ => write!(f, "{}", tarkib_support::rendering::shorten_type_name(self.name)),
        }
    }
}

/// A declared parameter of a constructor, factory method, or config method.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: TypeSpec,
    pub required: bool,
}

impl ParamSpec {
    pub fn new(name: &'static str, ty: TypeSpec) -> Self {
        ParamSpec { name, ty, required: true }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

pub type CtorInvokeFn = Arc<dyn Fn(&[Value]) -> Result<BeanHandle> + Send + Sync>;
pub type FactoryInvokeFn =
    Arc<dyn Fn(Option<&BeanHandle>, &[Value]) -> Result<BeanHandle> + Send + Sync>;
pub type MethodInvokeFn = Arc<dyn Fn(&BeanHandle, &[Value]) -> Result<()> + Send + Sync>;
pub type SetterFn = Arc<dyn Fn(&BeanHandle, Value) -> Result<()> + Send + Sync>;
pub type CastFn = Arc<dyn Fn(&BeanHandle) -> Option<BeanHandle> + Send + Sync>;
pub type LifecycleFn = Arc<dyn Fn(&BeanHandle) -> Result<()> + Send + Sync>;
pub type AwareFn = Arc<dyn Fn(&BeanHandle, &AwareContext<'_>) -> Result<()> + Send + Sync>;

/// What an awareness callback receives before initialization.
pub struct AwareContext<'a> {
    pub bean_name: &'a str,
    pub factory: &'a BeanFactory,
}

/// One constructor of a component type.
#[derive(Clone)]
pub struct ConstructorDescriptor {
    pub(crate) params: Vec<ParamSpec>,
    pub(crate) public: bool,
    /// `Some(required)` when the constructor carries an autowire marker.
    pub(crate) autowired: Option<bool>,
    pub(crate) invoke: CtorInvokeFn,
}

impl ConstructorDescriptor {
    pub fn new(
        params: Vec<ParamSpec>,
        invoke: impl Fn(&[Value]) -> Result<BeanHandle> + Send + Sync + 'static,
    ) -> Self {
        ConstructorDescriptor {
            params,
            public: true,
            autowired: None,
            invoke: Arc::new(invoke),
        }
    }

    pub fn non_public(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn autowired(mut self, required: bool) -> Self {
        self.autowired = Some(required);
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }
}

impl fmt::Debug for ConstructorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDescriptor")
            .field("params", &self.params.len())
            .field("public", &self.public)
            .field("autowired", &self.autowired)
            .finish()
    }
}

/// A named producer method: static, or an instance method on a factory bean.
#[derive(Clone)]
pub struct FactoryMethodDescriptor {
    pub(crate) name: &'static str,
    pub(crate) params: Vec<ParamSpec>,
    pub(crate) is_static: bool,
    pub(crate) public: bool,
    pub(crate) return_type: TypeSpec,
    pub(crate) invoke: FactoryInvokeFn,
}

impl FactoryMethodDescriptor {
    pub fn new(
        name: &'static str,
        params: Vec<ParamSpec>,
        return_type: TypeSpec,
        invoke: impl Fn(Option<&BeanHandle>, &[Value]) -> Result<BeanHandle> + Send + Sync + 'static,
    ) -> Self {
        FactoryMethodDescriptor {
            name,
            params,
            is_static: true,
            public: true,
            return_type,
            invoke: Arc::new(invoke),
        }
    }

    /// Marks this as an instance method, dispatched on a factory bean.
    pub fn on_instance(mut self) -> Self {
        self.is_static = false;
        self
    }

    pub fn non_public(mut self) -> Self {
        self.public = false;
        self
    }
}

impl fmt::Debug for FactoryMethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryMethodDescriptor")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .field("is_static", &self.is_static)
            .finish()
    }
}

/// A settable property of a component type.
#[derive(Clone)]
pub struct PropertyDescriptor {
    pub(crate) name: &'static str,
    pub(crate) ty: TypeSpec,
    /// `Some(required)` when the field carries an autowire marker.
    pub(crate) autowired: Option<bool>,
    pub(crate) set: SetterFn,
}

impl PropertyDescriptor {
    pub fn new(
        name: &'static str,
        ty: TypeSpec,
        set: impl Fn(&BeanHandle, Value) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        PropertyDescriptor { name, ty, autowired: None, set: Arc::new(set) }
    }

    pub fn autowired(mut self, required: bool) -> Self {
        self.autowired = Some(required);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ty(&self) -> &TypeSpec {
        &self.ty
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("autowired", &self.autowired)
            .finish()
    }
}

/// A callable method of a component type, with its lifecycle markers.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub(crate) name: &'static str,
    /// Qualified identifier; differs from `name` only for private methods,
    /// so a private parent callback coexists with a same-named child method.
    pub(crate) qualified: String,
    pub(crate) private: bool,
    pub(crate) params: Vec<ParamSpec>,
    pub(crate) autowired: Option<bool>,
    pub(crate) init: bool,
    pub(crate) destroy: bool,
    pub(crate) invoke: MethodInvokeFn,
}

impl MethodDescriptor {
    pub fn new(
        name: &'static str,
        params: Vec<ParamSpec>,
        invoke: impl Fn(&BeanHandle, &[Value]) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        MethodDescriptor {
            name,
            qualified: name.to_owned(),
            private: false,
            params,
            autowired: None,
            init: false,
            destroy: false,
            invoke: Arc::new(invoke),
        }
    }

    /// Marks the method private to `owner`; its identifier becomes
    /// `owner::name`.
    pub fn private_in(mut self, owner: &'static str) -> Self {
        self.private = true;
        self.qualified = format!("{owner}::{}", self.name);
        self
    }

    pub fn autowired(mut self, required: bool) -> Self {
        self.autowired = Some(required);
        self
    }

    /// Marks this as an annotated init callback.
    pub fn init(mut self) -> Self {
        self.init = true;
        self
    }

    /// Marks this as an annotated destroy callback.
    pub fn destroy(mut self) -> Self {
        self.destroy = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn qualified(&self) -> &str {
        &self.qualified
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("qualified", &self.qualified)
            .field("params", &self.params.len())
            .field("init", &self.init)
            .field("destroy", &self.destroy)
            .finish()
    }
}

/// Adapter for a component that acts as a factory bean: the container
/// exposes its product under the bean name and the factory itself under the
/// `&`-prefixed name.
#[derive(Clone)]
pub struct FactoryBeanAdapter {
    pub(crate) object_type: TypeSpec,
    pub(crate) is_singleton: Arc<dyn Fn(&BeanHandle) -> bool + Send + Sync>,
    pub(crate) get_object: Arc<dyn Fn(&BeanHandle) -> Result<BeanHandle> + Send + Sync>,
}

impl FactoryBeanAdapter {
    pub fn new(
        object_type: TypeSpec,
        get_object: impl Fn(&BeanHandle) -> Result<BeanHandle> + Send + Sync + 'static,
    ) -> Self {
        FactoryBeanAdapter {
            object_type,
            is_singleton: Arc::new(|_| true),
            get_object: Arc::new(get_object),
        }
    }

    /// Overrides the singleton-product decision (default: singleton).
    pub fn singleton_when(
        mut self,
        f: impl Fn(&BeanHandle) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_singleton = Arc::new(f);
        self
    }
}

impl fmt::Debug for FactoryBeanAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryBeanAdapter")
            .field("object_type", &self.object_type)
            .finish()
    }
}

pub(crate) struct CastEntry {
    pub(crate) target: TypeId,
    pub(crate) cast: CastFn,
}

/// Everything the container knows about one component type.
pub struct TypeDescriptor {
    pub(crate) spec: TypeSpec,
    pub(crate) parent: Option<TypeId>,
    pub(crate) constructors: Vec<ConstructorDescriptor>,
    pub(crate) factory_methods: Vec<FactoryMethodDescriptor>,
    pub(crate) properties: Vec<PropertyDescriptor>,
    pub(crate) methods: Vec<MethodDescriptor>,
    pub(crate) casts: Vec<CastEntry>,
    pub(crate) aware: Option<AwareFn>,
    pub(crate) initializing: Option<LifecycleFn>,
    pub(crate) disposing: Option<LifecycleFn>,
    pub(crate) factory_bean: Option<FactoryBeanAdapter>,
}

impl TypeDescriptor {
    pub fn new<T: ?Sized + Send + Sync + 'static>() -> Self {
        TypeDescriptor {
            spec: TypeSpec::component::<T>(),
            parent: None,
            constructors: Vec::new(),
            factory_methods: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            casts: Vec::new(),
            aware: None,
            initializing: None,
            disposing: None,
            factory_bean: None,
        }
    }

    /// Declares `P` as the composition parent; the metadata scanner walks
    /// parents first so their injection points run before this type's.
    pub fn with_parent<P: ?Sized + Send + Sync + 'static>(mut self) -> Self {
        self.parent = Some(TypeId::of::<P>());
        self
    }

    pub fn with_constructor(mut self, ctor: ConstructorDescriptor) -> Self {
        self.constructors.push(ctor);
        self
    }

    pub fn with_factory_method(mut self, method: FactoryMethodDescriptor) -> Self {
        self.factory_methods.push(method);
        self
    }

    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    /// Registers an assignability cast to `Target` (typically `dyn Trait`).
    /// The cast wraps the handle's value as the target representation, e.g.
    /// `Arc<dyn Trait>` stored back inside a fresh handle.
    pub fn with_cast<Target: ?Sized + 'static>(
        mut self,
        cast: impl Fn(&BeanHandle) -> Option<BeanHandle> + Send + Sync + 'static,
    ) -> Self {
        self.casts.push(CastEntry { target: TypeId::of::<Target>(), cast: Arc::new(cast) });
        self
    }

    pub fn with_aware(
        mut self,
        f: impl Fn(&BeanHandle, &AwareContext<'_>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.aware = Some(Arc::new(f));
        self
    }

    /// Declares the "initializing" capability (no-arg init, runs before any
    /// named init method).
    pub fn with_initializing(
        mut self,
        f: impl Fn(&BeanHandle) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.initializing = Some(Arc::new(f));
        self
    }

    /// Declares the "disposing" capability (no-arg destroy, runs before any
    /// named destroy method).
    pub fn with_disposing(
        mut self,
        f: impl Fn(&BeanHandle) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.disposing = Some(Arc::new(f));
        self
    }

    pub fn with_factory_bean(mut self, adapter: FactoryBeanAdapter) -> Self {
        self.factory_bean = Some(adapter);
        self
    }

    pub fn spec(&self) -> &TypeSpec {
        &self.spec
    }

    pub fn type_id(&self) -> TypeId {
        self.spec.id()
    }

    pub(crate) fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub(crate) fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub(crate) fn is_factory_bean(&self) -> bool {
        self.factory_bean.is_some()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type", &self.spec)
            .field("constructors", &self.constructors.len())
            .field("properties", &self.properties.len())
            .field("methods", &self.methods.len())
            .field("factory_bean", &self.factory_bean.is_some())
            .finish()
    }
}

/// Registry of all type descriptors known to the container, keyed by
/// [`TypeId`]. Reads are lock-free; registration is put-once.
#[derive(Default)]
pub struct DescriptorRegistry {
    items: DashMap<TypeId, Arc<TypeDescriptor>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: TypeDescriptor) -> Result<()> {
        let id = descriptor.type_id();
        let name = descriptor.spec.type_name();
        if self.items.contains_key(&id) {
            return Err(TarkibError::definition(
                name,
                "a type descriptor for this type is already registered",
            ));
        }
        tracing::debug!(ty = %descriptor.spec, "registered type descriptor");
        self.items.insert(id, Arc::new(descriptor));
        Ok(())
    }

    pub fn get(&self, id: TypeId) -> Option<Arc<TypeDescriptor>> {
        self.items.get(&id).map(|e| e.value().clone())
    }

    pub fn contains(&self, id: TypeId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.items.iter().map(|e| e.value().spec.type_name()).collect()
    }

    /// The descriptor chain for `id`, composition parents first.
    pub(crate) fn chain(&self, id: TypeId) -> Vec<Arc<TypeDescriptor>> {
        let mut reversed = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(desc) = self.get(current) else { break };
            cursor = desc.parent;
            reversed.push(desc);
            if reversed.len() > 64 {
                // Defend against a parent loop in registered metadata.
                tracing::warn!("type descriptor parent chain exceeds 64 entries; truncating");
                break;
            }
        }
        reversed.reverse();
        reversed
    }

    /// Whether a value of `source` satisfies the declared `target`, either
    /// exactly or through a registered cast anywhere in the chain.
    pub(crate) fn assignable(&self, source: TypeId, target: &TypeSpec) -> bool {
        if source == target.id() {
            return true;
        }
        self.chain(source)
            .iter()
            .any(|d| d.casts.iter().any(|c| c.target == target.id()))
    }

    /// Re-wraps `handle` as the declared `target` via a registered cast.
    /// Returns the handle unchanged when the types already match.
    pub(crate) fn cast(&self, handle: &BeanHandle, target: &TypeSpec) -> Option<BeanHandle> {
        let source = crate::value::handle_type_id(handle);
        if source == target.id() {
            return Some(handle.clone());
        }
        for desc in self.chain(source) {
            if let Some(entry) = desc.casts.iter().find(|c| c.target == target.id()) {
                return (entry.cast)(handle);
            }
        }
        None
    }

    /// Looks a settable property up across the descriptor chain; the most
    /// derived declaration wins.
    pub(crate) fn property_in_chain(&self, id: TypeId, name: &str) -> Option<PropertyDescriptor> {
        self.chain(id)
            .iter()
            .rev()
            .find_map(|d| d.property(name).cloned())
    }

    /// Looks a method up across the descriptor chain; the most derived
    /// declaration wins.
    pub(crate) fn method_in_chain(&self, id: TypeId, name: &str) -> Option<MethodDescriptor> {
        self.chain(id)
            .iter()
            .rev()
            .find_map(|d| d.method(name).cloned())
    }

    /// Best-effort display name for the concrete type behind a handle.
    pub(crate) fn name_of_handle(&self, handle: &BeanHandle) -> String {
        let id = crate::value::handle_type_id(handle);
        match self.get(id) {
            Some(desc) => desc.spec.to_string(),
            None => format!("{id:?}"),
        }
    }
}

impl fmt::Debug for DescriptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorRegistry")
            .field("registered", &self.items.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{handle, typed};

    struct Engine {
        cylinders: u32,
    }

    trait Powered: Send + Sync {
        fn power(&self) -> u32;
    }

    impl Powered for Engine {
        fn power(&self) -> u32 {
            self.cylinders * 100
        }
    }

    fn engine_descriptor() -> TypeDescriptor {
        TypeDescriptor::new::<Engine>()
            .with_constructor(ConstructorDescriptor::new(
                vec![ParamSpec::new("cylinders", TypeSpec::int())],
                |args| {
                    let cylinders = args[0].as_int().unwrap_or(4) as u32;
                    Ok(handle(Engine { cylinders }))
                },
            ))
            .with_cast::<dyn Powered>(|h| {
                let concrete = typed::<Engine>(h)?;
                Some(handle(concrete as Arc<dyn Powered>))
            })
    }

    #[test]
    fn register_and_get() {
        let registry = DescriptorRegistry::new();
        registry.register(engine_descriptor()).unwrap();

        let desc = registry.get(TypeId::of::<Engine>()).unwrap();
        assert_eq!(desc.constructors.len(), 1);
        assert!(registry.contains(TypeId::of::<Engine>()));
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = DescriptorRegistry::new();
        registry.register(engine_descriptor()).unwrap();
        assert!(registry.register(engine_descriptor()).is_err());
    }

    #[test]
    fn assignability_through_cast() {
        let registry = DescriptorRegistry::new();
        registry.register(engine_descriptor()).unwrap();

        let target = TypeSpec::component::<dyn Powered>();
        assert!(registry.assignable(TypeId::of::<Engine>(), &target));
        assert!(!registry.assignable(TypeId::of::<String>(), &target));
    }

    #[test]
    fn cast_produces_trait_handle() {
        let registry = DescriptorRegistry::new();
        registry.register(engine_descriptor()).unwrap();

        let raw = handle(Engine { cylinders: 6 });
        let target = TypeSpec::component::<dyn Powered>();
        let cast = registry.cast(&raw, &target).unwrap();

        let powered = typed::<Arc<dyn Powered>>(&cast).unwrap();
        assert_eq!(powered.power(), 600);
    }

    #[test]
    fn parent_chain_is_parent_first() {
        struct Base;
        struct Derived;

        let registry = DescriptorRegistry::new();
        registry.register(TypeDescriptor::new::<Base>()).unwrap();
        registry
            .register(TypeDescriptor::new::<Derived>().with_parent::<Base>())
            .unwrap();

        let chain = registry.chain(TypeId::of::<Derived>());
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].type_id(), TypeId::of::<Base>());
        assert_eq!(chain[1].type_id(), TypeId::of::<Derived>());
    }

    #[test]
    fn type_spec_simple_and_collection() {
        assert!(TypeSpec::int().is_simple());
        assert!(!TypeSpec::component::<Engine>().is_simple());

        let list = TypeSpec::list_of(TypeSpec::component::<Engine>());
        assert!(list.is_collection());
        assert_eq!(list.element(), &TypeSpec::component::<Engine>());
        assert_ne!(list, TypeSpec::component::<Engine>());
    }
}
