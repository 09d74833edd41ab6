//! Bean definitions and their merged form.
//!
//! A [`BeanDefinition`] is the declarative record the parser layer hands to
//! the container: which type (or factory method) to use, scope, declared
//! constructor arguments and property values, lifecycle method names, and
//! the wiring flags. Definitions may name a parent; the first lookup merges
//! the chain into a [`MergedDefinition`], which additionally carries the
//! mutable resolution slots the creation engine fills under a per-definition
//! lock.

use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::Result;
use crate::value::{BeanHandle, ConstructorArgumentValues, PropertyValues, Value, ValueHolder};

/// Identity and lifetime policy of a bean.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BeanScope {
    /// One shared instance per container.
    Singleton,
    /// A fresh instance per lookup, never cached.
    Prototype,
    /// Delegated to a registered [`CustomScope`](crate::scope::CustomScope).
    Custom(String),
}

impl BeanScope {
    pub fn is_singleton(&self) -> bool {
        matches!(self, BeanScope::Singleton)
    }

    pub fn is_prototype(&self) -> bool {
        matches!(self, BeanScope::Prototype)
    }
}

impl fmt::Display for BeanScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeanScope::Singleton => write!(f, "singleton"),
            BeanScope::Prototype => write!(f, "prototype"),
            BeanScope::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// How unfilled dependencies of a bean are wired automatically.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AutowireMode {
    #[default]
    No,
    /// Each unfulfilled non-simple property is looked up by its own name.
    ByName,
    /// Each unfulfilled non-simple property is resolved by declared type.
    ByType,
    /// Constructor arguments without declared values are resolved by type.
    Constructor,
}

/// Declared destroy-method policy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DestroyMethod {
    /// Nothing declared; only capability callbacks apply.
    #[default]
    Default,
    /// Probe the descriptor for a zero-arg `close`, then `shutdown`.
    Inferred,
    Named(String),
}

/// A lookup-override record: after instantiation, the named property
/// receives a provider that delegates to `get_bean(bean_name)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodOverride {
    pub property: String,
    pub bean_name: String,
}

/// A user-supplied instance producer, taking precedence over constructor
/// resolution.
pub type SupplierFn = Arc<dyn Fn() -> Result<BeanHandle> + Send + Sync>;

/// Declarative description of one bean.
#[derive(Clone)]
pub struct BeanDefinition {
    pub(crate) type_id: Option<TypeId>,
    pub(crate) type_name: Option<&'static str>,
    pub(crate) factory_bean_name: Option<String>,
    pub(crate) factory_method_name: Option<String>,
    pub(crate) scope: Option<BeanScope>,
    pub(crate) abstract_definition: bool,
    pub(crate) lazy_init: Option<bool>,
    pub(crate) primary: bool,
    pub(crate) priority: Option<i32>,
    pub(crate) autowire_candidate: bool,
    pub(crate) lenient_constructor_resolution: bool,
    pub(crate) non_public_access_allowed: bool,
    pub(crate) autowire: AutowireMode,
    pub(crate) dependency_check: bool,
    pub(crate) depends_on: Vec<String>,
    pub(crate) constructor_args: ConstructorArgumentValues,
    pub(crate) property_values: PropertyValues,
    pub(crate) init_method_name: Option<String>,
    pub(crate) destroy_method: DestroyMethod,
    pub(crate) parent_name: Option<String>,
    pub(crate) supplier: Option<SupplierFn>,
    pub(crate) method_overrides: Vec<MethodOverride>,
}

impl Default for BeanDefinition {
    fn default() -> Self {
        BeanDefinition {
            type_id: None,
            type_name: None,
            factory_bean_name: None,
            factory_method_name: None,
            scope: None,
            abstract_definition: false,
            lazy_init: None,
            primary: false,
            priority: None,
            autowire_candidate: true,
            lenient_constructor_resolution: true,
            non_public_access_allowed: true,
            autowire: AutowireMode::No,
            dependency_check: false,
            depends_on: Vec::new(),
            constructor_args: ConstructorArgumentValues::new(),
            property_values: PropertyValues::new(),
            init_method_name: None,
            destroy_method: DestroyMethod::Default,
            parent_name: None,
            supplier: None,
            method_overrides: Vec::new(),
        }
    }
}

impl BeanDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a definition of component type `T`.
    pub fn of<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self::new().with_type::<T>()
    }

    pub fn with_type<T: ?Sized + Send + Sync + 'static>(mut self) -> Self {
        self.type_id = Some(TypeId::of::<T>());
        self.type_name = Some(std::any::type_name::<T>());
        self
    }

    pub fn with_scope(mut self, scope: BeanScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn prototype(self) -> Self {
        self.with_scope(BeanScope::Prototype)
    }

    /// Produce this bean through `method` on the bean named `factory`.
    pub fn with_factory(mut self, factory: impl Into<String>, method: impl Into<String>) -> Self {
        self.factory_bean_name = Some(factory.into());
        self.factory_method_name = Some(method.into());
        self
    }

    /// Produce this bean through a static factory method of its own type.
    pub fn with_factory_method(mut self, method: impl Into<String>) -> Self {
        self.factory_method_name = Some(method.into());
        self
    }

    /// Adds a generic (unindexed) constructor argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.constructor_args.add_generic(ValueHolder::new(value.into()));
        self
    }

    /// Adds a constructor argument at an explicit index.
    pub fn arg_indexed(mut self, index: usize, value: impl Into<Value>) -> Self {
        self.constructor_args.add_indexed(index, ValueHolder::new(value.into()));
        self
    }

    /// Adds a generic constructor argument with declared type or name.
    pub fn arg_holder(mut self, holder: ValueHolder) -> Self {
        self.constructor_args.add_generic(holder);
        self
    }

    /// Adds a named constructor-argument reference to another bean.
    pub fn arg_ref(self, bean_name: impl Into<String>) -> Self {
        self.arg(Value::Ref(bean_name.into()))
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.property_values.add(name, value.into());
        self
    }

    /// Adds a property referencing another bean by name.
    pub fn property_ref(mut self, name: impl Into<String>, bean_name: impl Into<String>) -> Self {
        self.property_values.add(name, Value::Ref(bean_name.into()));
        self
    }

    pub fn with_init_method(mut self, name: impl Into<String>) -> Self {
        self.init_method_name = Some(name.into());
        self
    }

    pub fn with_destroy_method(mut self, destroy: DestroyMethod) -> Self {
        self.destroy_method = destroy;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_name = Some(parent.into());
        self
    }

    pub fn depends_on(mut self, names: &[&str]) -> Self {
        self.depends_on = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_autowire(mut self, mode: AutowireMode) -> Self {
        self.autowire = mode;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy_init = Some(true);
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn abstract_definition(mut self) -> Self {
        self.abstract_definition = true;
        self
    }

    /// Excludes this bean from by-type autowire candidate enumeration.
    pub fn not_autowire_candidate(mut self) -> Self {
        self.autowire_candidate = false;
        self
    }

    /// Ambiguous constructor matches become errors instead of first-wins.
    pub fn strict_constructor_resolution(mut self) -> Self {
        self.lenient_constructor_resolution = false;
        self
    }

    /// Restricts constructor selection to public constructors.
    pub fn public_access_only(mut self) -> Self {
        self.non_public_access_allowed = false;
        self
    }

    /// Requires every writable non-simple property to be provided.
    pub fn with_dependency_check(mut self) -> Self {
        self.dependency_check = true;
        self
    }

    pub fn with_supplier(
        mut self,
        supplier: impl Fn() -> Result<BeanHandle> + Send + Sync + 'static,
    ) -> Self {
        self.supplier = Some(Arc::new(supplier));
        self
    }

    /// Registers a lookup override: `property` receives a provider that
    /// resolves `bean_name` on demand.
    pub fn with_lookup(mut self, property: impl Into<String>, bean_name: impl Into<String>) -> Self {
        self.method_overrides.push(MethodOverride {
            property: property.into(),
            bean_name: bean_name.into(),
        });
        self
    }

    // ── Read accessors ──

    pub fn scope(&self) -> BeanScope {
        self.scope.clone().unwrap_or(BeanScope::Singleton)
    }

    pub fn is_abstract(&self) -> bool {
        self.abstract_definition
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy_init.unwrap_or(false)
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_autowire_candidate(&self) -> bool {
        self.autowire_candidate
    }

    pub fn is_lenient(&self) -> bool {
        self.lenient_constructor_resolution
    }

    pub fn allows_non_public(&self) -> bool {
        self.non_public_access_allowed
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    /// Display name of the declared type, for error messages.
    pub fn declared_type_name(&self) -> &str {
        self.type_name.unwrap_or("<undeclared>")
    }

    /// Flattens this definition over `parent`, child attributes winning.
    pub(crate) fn merged_over(&self, parent: &BeanDefinition) -> BeanDefinition {
        let mut merged = parent.clone();

        if self.type_id.is_some() {
            merged.type_id = self.type_id;
            merged.type_name = self.type_name;
        }
        if self.factory_bean_name.is_some() {
            merged.factory_bean_name = self.factory_bean_name.clone();
        }
        if self.factory_method_name.is_some() {
            merged.factory_method_name = self.factory_method_name.clone();
        }
        if self.scope.is_some() {
            merged.scope = self.scope.clone();
        }
        if self.lazy_init.is_some() {
            merged.lazy_init = self.lazy_init;
        }
        if self.init_method_name.is_some() {
            merged.init_method_name = self.init_method_name.clone();
        }
        if self.destroy_method != DestroyMethod::Default {
            merged.destroy_method = self.destroy_method.clone();
        }
        if !self.depends_on.is_empty() {
            merged.depends_on = self.depends_on.clone();
        }
        if self.supplier.is_some() {
            merged.supplier = self.supplier.clone();
        }
        if self.priority.is_some() {
            merged.priority = self.priority;
        }
        if self.autowire != AutowireMode::No {
            merged.autowire = self.autowire;
        }

        merged.abstract_definition = self.abstract_definition;
        merged.primary = self.primary;
        merged.autowire_candidate = self.autowire_candidate;
        merged.lenient_constructor_resolution = self.lenient_constructor_resolution;
        merged.non_public_access_allowed = self.non_public_access_allowed;
        merged.dependency_check = self.dependency_check || parent.dependency_check;

        merged.constructor_args.merge_from(&self.constructor_args);
        merged.property_values.merge_from(&self.property_values);
        merged.method_overrides.extend(self.method_overrides.iter().cloned());

        merged.parent_name = None;
        merged
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("type", &self.type_name)
            .field("scope", &self.scope)
            .field("factory_method", &self.factory_method_name)
            .field("args", &self.constructor_args.count())
            .field("properties", &self.property_values.len())
            .field("parent", &self.parent_name)
            .field("supplier", &self.supplier.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Which creation target constructor resolution settled on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ResolvedTarget {
    Constructor(usize),
    FactoryMethod(usize),
}

/// Mutable resolution state of a merged definition. Read and written only
/// through the owning [`MergedDefinition`]'s lock.
#[derive(Default)]
pub(crate) struct ResolvedSlots {
    pub constructor: Option<ResolvedTarget>,
    pub arguments_resolved: bool,
    /// Fully converted arguments, cached when no slot needs re-autowiring.
    pub resolved_args: Option<Vec<Value>>,
    /// Partially resolved arguments; autowired slots hold `Value::Autowired`.
    pub prepared_args: Option<Vec<Value>>,
    pub post_processed: bool,
    /// `Some(applied)` once the pre-instantiation short-circuit was probed.
    pub before_instantiation_resolved: Option<bool>,
    pub overrides_validated: bool,
    pub externally_managed: HashSet<String>,
}

/// A definition flattened against its ancestors, plus the resolution slots
/// the creation engine fills during the first instantiation.
pub struct MergedDefinition {
    name: String,
    definition: BeanDefinition,
    slots: Mutex<ResolvedSlots>,
    stale: AtomicBool,
}

impl MergedDefinition {
    pub(crate) fn new(name: impl Into<String>, definition: BeanDefinition) -> Self {
        MergedDefinition {
            name: name.into(),
            definition,
            slots: Mutex::new(ResolvedSlots::default()),
            stale: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &BeanDefinition {
        &self.definition
    }

    pub fn scope(&self) -> BeanScope {
        self.definition.scope()
    }

    pub fn is_singleton(&self) -> bool {
        self.scope().is_singleton()
    }

    pub fn is_prototype(&self) -> bool {
        self.scope().is_prototype()
    }

    /// The per-definition lock guarding all resolution slots.
    pub(crate) fn slots(&self) -> MutexGuard<'_, ResolvedSlots> {
        self.slots.lock()
    }

    /// Records a config member (injection point or lifecycle callback) as
    /// externally managed. Returns `false` when it was already claimed, in
    /// which case the caller must not invoke it a second time.
    pub fn register_external_member(&self, identifier: &str) -> bool {
        self.slots.lock().externally_managed.insert(identifier.to_owned())
    }

    pub fn is_externally_managed(&self, identifier: &str) -> bool {
        self.slots.lock().externally_managed.contains(identifier)
    }

    pub(crate) fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    pub(crate) fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }
}

impl fmt::Debug for MergedDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedDefinition")
            .field("name", &self.name)
            .field("definition", &self.definition)
            .finish()
    }
}

/// The definition surface the parser layer populates and the container
/// consumes.
pub trait DefinitionRegistry {
    fn register_definition(&self, name: &str, definition: BeanDefinition) -> Result<()>;
    fn remove_definition(&self, name: &str) -> Result<()>;
    fn definition(&self, name: &str) -> Option<Arc<BeanDefinition>>;
    fn contains_definition(&self, name: &str) -> bool;
    fn definition_names(&self) -> Vec<String>;
    fn definition_count(&self) -> usize;
    /// Registers `alias` as an alternative name for `canonical`.
    fn register_alias(&self, canonical: &str, alias: &str) -> Result<()>;
}
