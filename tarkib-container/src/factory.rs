//! The bean factory — public lookup surface and lifecycle driver.
//!
//! A [`BeanFactory`] owns the definition registry, the descriptor registry,
//! the singleton registry, and the processor pipeline. Lookups normalize the
//! bean name (factory-dereference prefix, aliases), consult the singleton
//! caches, delegate to a parent factory for unknown names, preflight
//! `depends_on`, and branch on scope. Factory-bean instances are
//! dereferenced to their product unless the caller asked for the factory
//! itself with the `&` prefix.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, trace};

use crate::autowire::QualifierResolver;
use crate::convert::TypeConverter;
use crate::definition::{
    AutowireMode, BeanDefinition, BeanScope, DefinitionRegistry, MergedDefinition,
};
use crate::descriptor::{DescriptorRegistry, FactoryBeanAdapter, TypeDescriptor, TypeSpec};
use crate::disposal::DisposableAdapter;
use crate::error::{
    CycleError, NotFoundError, Result, TarkibError, WrongTypeError,
};
use crate::metadata::{AutowiredProcessor, InitDestroyProcessor, MetadataScanner};
use crate::processor::{BeanProcessor, ProcessorRegistry};
use crate::scope::CustomScope;
use crate::singleton::SingletonRegistry;
use crate::value::{handle_type_id, typed, BeanHandle, Value};

/// Prefix requesting the factory bean itself rather than its product.
pub const FACTORY_BEAN_PREFIX: char = '&';

thread_local! {
    /// Prototype names currently being created on this thread, for
    /// re-entry detection.
    static PROTOTYPES_IN_CREATION: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

/// RAII guard marking a prototype as in creation on this thread.
struct PrototypeGuard {
    name: String,
}

impl PrototypeGuard {
    fn enter(name: &str) -> Result<Self> {
        let fresh = PROTOTYPES_IN_CREATION.with(|set| set.borrow_mut().insert(name.to_owned()));
        if !fresh {
            return Err(TarkibError::Cycle(CycleError::new(
                vec![name.to_owned(), name.to_owned()],
                "prototype is already in creation on this thread",
            )));
        }
        Ok(PrototypeGuard { name: name.to_owned() })
    }
}

impl Drop for PrototypeGuard {
    fn drop(&mut self) {
        PROTOTYPES_IN_CREATION.with(|set| {
            set.borrow_mut().remove(&self.name);
        });
    }
}

/// The container core.
///
/// Create one with [`BeanFactory::new`]; it is always handled through an
/// `Arc` so deferred lookups (providers, scopes) can hold weak references
/// back into the container.
pub struct BeanFactory {
    weak_self: Weak<BeanFactory>,
    parent: Option<Arc<BeanFactory>>,

    descriptors: Arc<DescriptorRegistry>,
    converter: TypeConverter,
    scanner: Arc<MetadataScanner>,

    definitions: DashMap<String, Arc<BeanDefinition>>,
    definition_order: Mutex<Vec<String>>,
    merged: DashMap<String, Arc<MergedDefinition>>,
    aliases: DashMap<String, String>,

    singletons: SingletonRegistry,
    processors: ProcessorRegistry,
    scopes: DashMap<String, Arc<dyn CustomScope>>,
    factory_products: DashMap<String, BeanHandle>,
    already_created: DashMap<String, ()>,
    qualifier_resolvers: RwLock<Vec<Arc<dyn QualifierResolver>>>,

    allow_circular_references: AtomicBool,
    allow_raw_injection: AtomicBool,
}

impl BeanFactory {
    /// Creates a root factory with the built-in marker processors
    /// registered.
    pub fn new() -> Arc<BeanFactory> {
        Self::build(None)
    }

    /// Creates a factory that delegates unknown names to `parent`. The
    /// descriptor registry is shared with the parent.
    pub fn with_parent(parent: Arc<BeanFactory>) -> Arc<BeanFactory> {
        Self::build(Some(parent))
    }

    fn build(parent: Option<Arc<BeanFactory>>) -> Arc<BeanFactory> {
        let descriptors = match &parent {
            Some(p) => p.descriptors.clone(),
            None => Arc::new(DescriptorRegistry::new()),
        };
        let scanner = Arc::new(MetadataScanner::new(descriptors.clone()));

        let factory = Arc::new_cyclic(|weak| BeanFactory {
            weak_self: weak.clone(),
            parent,
            converter: TypeConverter::new(descriptors.clone()),
            scanner: scanner.clone(),
            descriptors,
            definitions: DashMap::new(),
            definition_order: Mutex::new(Vec::new()),
            merged: DashMap::new(),
            aliases: DashMap::new(),
            singletons: SingletonRegistry::new(),
            processors: ProcessorRegistry::new(),
            scopes: DashMap::new(),
            factory_products: DashMap::new(),
            already_created: DashMap::new(),
            qualifier_resolvers: RwLock::new(Vec::new()),
            allow_circular_references: AtomicBool::new(true),
            allow_raw_injection: AtomicBool::new(false),
        });

        factory.processors.add(Arc::new(AutowiredProcessor::new(scanner.clone())));
        factory.processors.add(Arc::new(InitDestroyProcessor::new(scanner)));
        info!("bean factory created");
        factory
    }

    // ── Configuration surface ──

    pub fn descriptors(&self) -> &DescriptorRegistry {
        &self.descriptors
    }

    pub fn register_descriptor(&self, descriptor: TypeDescriptor) -> Result<()> {
        self.descriptors.register(descriptor)
    }

    pub fn add_processor(&self, processor: Arc<dyn BeanProcessor>) {
        self.processors.add(processor);
    }

    pub fn add_qualifier_resolver(&self, resolver: Arc<dyn QualifierResolver>) {
        self.qualifier_resolvers.write().push(resolver);
    }

    pub fn register_scope(&self, name: impl Into<String>, scope: Arc<dyn CustomScope>) {
        self.scopes.insert(name.into(), scope);
    }

    pub fn registered_scope_names(&self) -> Vec<String> {
        self.scopes.iter().map(|e| e.key().clone()).collect()
    }

    pub(crate) fn registered_scope(&self, name: &str) -> Option<Arc<dyn CustomScope>> {
        self.scopes.get(name).map(|e| e.value().clone())
    }

    /// Whether setter cycles between singletons may be resolved through
    /// early references (default: yes).
    pub fn set_allow_circular_references(&self, allow: bool) {
        self.allow_circular_references.store(allow, Ordering::Relaxed);
    }

    /// Whether to tolerate a bean being wrapped during initialization after
    /// its raw early reference was injected elsewhere (default: no).
    pub fn set_allow_raw_injection_despite_wrapping(&self, allow: bool) {
        self.allow_raw_injection.store(allow, Ordering::Relaxed);
    }

    pub(crate) fn allows_circular_references(&self) -> bool {
        self.allow_circular_references.load(Ordering::Relaxed)
    }

    pub(crate) fn allows_raw_injection(&self) -> bool {
        self.allow_raw_injection.load(Ordering::Relaxed)
    }

    pub(crate) fn singletons(&self) -> &SingletonRegistry {
        &self.singletons
    }

    pub(crate) fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    pub fn converter(&self) -> &TypeConverter {
        &self.converter
    }

    pub(crate) fn weak_handle(&self) -> Weak<BeanFactory> {
        self.weak_self.clone()
    }

    pub(crate) fn qualifier_resolvers(&self) -> Vec<Arc<dyn QualifierResolver>> {
        self.qualifier_resolvers.read().clone()
    }

    pub fn parent_factory(&self) -> Option<&Arc<BeanFactory>> {
        self.parent.as_ref()
    }

    /// Registers an externally constructed singleton under `name`.
    pub fn register_singleton_instance(&self, name: &str, bean: BeanHandle) -> Result<()> {
        self.singletons.register_singleton(name, bean)
    }

    // ── Name handling ──

    /// Strips the factory-dereference prefix and resolves aliases.
    fn transformed_name(&self, name: &str) -> (String, bool) {
        let mut stripped = name;
        let mut wants_factory = false;
        while let Some(rest) = stripped.strip_prefix(FACTORY_BEAN_PREFIX) {
            wants_factory = true;
            stripped = rest;
        }
        (self.canonical_name(stripped), wants_factory)
    }

    fn canonical_name(&self, name: &str) -> String {
        let mut current = name.to_owned();
        for _ in 0..16 {
            match self.aliases.get(&current) {
                Some(target) => current = target.value().clone(),
                None => break,
            }
        }
        current
    }

    /// All aliases that resolve to the same canonical name as `name`.
    pub fn get_aliases(&self, name: &str) -> Vec<String> {
        let canonical = self.canonical_name(name.trim_start_matches(FACTORY_BEAN_PREFIX));
        self.aliases
            .iter()
            .filter(|e| self.canonical_name(e.key()) == canonical && *e.key() != canonical)
            .map(|e| e.key().clone())
            .collect()
    }

    // ── Lookup surface ──

    /// Looks up a bean and downcasts it to a concrete component type.
    pub fn get_bean<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        let handle = self.do_get_bean(name, Some(&TypeSpec::component::<T>()), None)?;
        typed::<T>(&handle).ok_or_else(|| self.wrong_type_error::<T>(name, &handle))
    }

    /// Looks up a bean as a trait object registered through a cast.
    pub fn get_bean_trait<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        let handle = self.do_get_bean(name, Some(&TypeSpec::component::<T>()), None)?;
        typed::<Arc<T>>(&handle)
            .map(|wrapped| (*wrapped).clone())
            .ok_or_else(|| self.wrong_type_error::<T>(name, &handle))
    }

    /// Looks up a bean without type coercion.
    pub fn get_bean_handle(&self, name: &str) -> Result<BeanHandle> {
        self.do_get_bean(name, None, None)
    }

    /// Looks up a bean, passing explicit constructor arguments (prototype
    /// and supplier paths; cached singletons ignore them).
    pub fn get_bean_with_args(&self, name: &str, args: &[Value]) -> Result<BeanHandle> {
        self.do_get_bean(name, None, Some(args))
    }

    /// Resolves the unique bean of component type `T`.
    pub fn get_bean_by_type<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let handle = self.bean_handle_by_type(&TypeSpec::component::<T>())?;
        typed::<T>(&handle).ok_or_else(|| self.wrong_type_error::<T>("<by type>", &handle))
    }

    /// Resolves the unique bean assignable to `ty`.
    pub fn bean_handle_by_type(&self, ty: &TypeSpec) -> Result<BeanHandle> {
        let descriptor = crate::autowire::DependencyDescriptor::new(ty.clone())
            .at(format!("by-type lookup of '{ty}'"));
        let mut names = Vec::new();
        match self.resolve_dependency(&descriptor, None, &mut names)? {
            Some(Value::Instance(handle)) => Ok(handle),
            _ => Err(TarkibError::NotFound(NotFoundError::typed(ty.to_string()))),
        }
    }

    /// Names of all beans assignable to `ty`, in definition order, followed
    /// by manually registered singletons.
    pub fn get_bean_names_for_type(&self, ty: &TypeSpec) -> Vec<String> {
        self.bean_names_assignable_to(ty, true)
    }

    #[instrument(level = "trace", skip(self, required_type, args))]
    fn do_get_bean(
        &self,
        name: &str,
        required_type: Option<&TypeSpec>,
        args: Option<&[Value]>,
    ) -> Result<BeanHandle> {
        let (canonical, wants_factory) = self.transformed_name(name);

        // Fast path: published singleton, or an early reference for a
        // singleton currently in creation on this call stack.
        if args.is_none() {
            if let Some(shared) = self.singletons.get_singleton(&canonical, true) {
                if self.singletons.is_in_creation(&canonical) {
                    trace!(bean = %canonical, "returning early reference");
                }
                self.register_supplied_dependency(&canonical);
                let result = self.object_for_instance(shared, name, &canonical, wants_factory)?;
                return self.coerce(result, required_type, name);
            }
        }

        if self.is_prototype_in_creation(&canonical) {
            return Err(TarkibError::Cycle(CycleError::new(
                vec![canonical.clone(), canonical],
                "prototype requested again while it is being created on this thread",
            )));
        }

        // Unknown here: delegate to the parent container.
        if !self.definitions.contains_key(&canonical) && !self.singletons.contains(&canonical) {
            if let Some(parent) = &self.parent {
                return parent.do_get_bean(name, required_type, args);
            }
        }

        let merged = self.merged_definition(&canonical)?;
        if merged.definition().is_abstract() {
            return Err(TarkibError::definition(
                &canonical,
                "abstract definitions cannot be instantiated",
            ));
        }

        self.mark_created(&canonical);
        self.register_supplied_dependency(&canonical);

        for dep in &merged.definition().depends_on {
            if self.singletons.is_dependent(&canonical, dep) {
                return Err(TarkibError::Cycle(CycleError::new(
                    vec![canonical.clone(), dep.clone(), canonical.clone()],
                    "circular depends-on relationship between beans",
                )));
            }
            self.singletons.register_dependent(dep, &canonical);
            self.get_bean_handle(dep)?;
        }

        let instance = match merged.scope() {
            BeanScope::Singleton => self
                .singletons
                .get_or_create(&canonical, || self.create_bean_internal(&merged, args))?,
            BeanScope::Prototype => {
                let _guard = PrototypeGuard::enter(&canonical)?;
                self.create_bean_internal(&merged, args)?
            }
            BeanScope::Custom(scope_name) => {
                let scope = self.registered_scope(&scope_name).ok_or_else(|| {
                    TarkibError::definition(
                        &canonical,
                        format!("scope '{scope_name}' is not registered"),
                    )
                })?;
                let producer = || {
                    let _guard = PrototypeGuard::enter(&canonical)?;
                    self.create_bean_internal(&merged, args)
                };
                scope.get(&canonical, &producer)?
            }
        };

        let result = self.object_for_instance(instance, name, &canonical, wants_factory)?;
        self.coerce(result, required_type, name)
    }

    fn coerce(
        &self,
        handle: BeanHandle,
        required_type: Option<&TypeSpec>,
        name: &str,
    ) -> Result<BeanHandle> {
        let Some(ty) = required_type else { return Ok(handle) };
        match self.descriptors.cast(&handle, ty) {
            Some(cast) => Ok(cast),
            None => Err(TarkibError::WrongType(WrongTypeError {
                name: name.to_owned(),
                expected: ty.to_string(),
                actual: self.descriptors.name_of_handle(&handle),
            })),
        }
    }

    /// Factory-bean dereferencing: plain names resolve to the product
    /// (cached for singleton products), `&`-prefixed names to the factory.
    fn object_for_instance(
        &self,
        instance: BeanHandle,
        original_name: &str,
        canonical: &str,
        wants_factory: bool,
    ) -> Result<BeanHandle> {
        let adapter = self.factory_adapter_of(&instance);

        if wants_factory {
            return match adapter {
                Some(_) => Ok(instance),
                None => Err(TarkibError::WrongType(WrongTypeError {
                    name: original_name.to_owned(),
                    expected: String::from("a factory bean"),
                    actual: self.descriptors.name_of_handle(&instance),
                })),
            };
        }

        let Some(adapter) = adapter else { return Ok(instance) };

        let singleton_product =
            (adapter.is_singleton)(&instance) && self.singletons.contains(canonical);
        if singleton_product {
            if let Some(cached) = self.factory_products.get(canonical) {
                return Ok(cached.value().clone());
            }
            let product = (adapter.get_object)(&instance)
                .map_err(|e| TarkibError::creation(canonical, "factory-bean product", e))?;
            let product =
                self.apply_processors_after_initialization_internal(product, canonical)?;
            let entry = self
                .factory_products
                .entry(canonical.to_owned())
                .or_insert(product);
            Ok(entry.value().clone())
        } else {
            let product = (adapter.get_object)(&instance)
                .map_err(|e| TarkibError::creation(canonical, "factory-bean product", e))?;
            self.apply_processors_after_initialization_internal(product, canonical)
        }
    }

    fn factory_adapter_of(&self, instance: &BeanHandle) -> Option<FactoryBeanAdapter> {
        self.descriptors
            .get(handle_type_id(instance))
            .and_then(|d| d.factory_bean.clone())
    }

    fn wrong_type_error<T: ?Sized>(&self, name: &str, actual: &BeanHandle) -> TarkibError {
        TarkibError::WrongType(WrongTypeError {
            name: name.to_owned(),
            expected: tarkib_support::rendering::shorten_type_name(std::any::type_name::<T>()),
            actual: self.descriptors.name_of_handle(actual),
        })
    }

    // ── Introspection ──

    pub fn contains_bean(&self, name: &str) -> bool {
        let (canonical, _) = self.transformed_name(name);
        if self.singletons.contains(&canonical) || self.definitions.contains_key(&canonical) {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.contains_bean(name))
    }

    pub fn contains_local_bean(&self, name: &str) -> bool {
        let (canonical, _) = self.transformed_name(name);
        self.singletons.contains(&canonical) || self.definitions.contains_key(&canonical)
    }

    pub fn is_singleton(&self, name: &str) -> Result<bool> {
        let (canonical, wants_factory) = self.transformed_name(name);

        if let Some(instance) = self.singletons.get(&canonical) {
            return Ok(match self.factory_adapter_of(&instance) {
                Some(adapter) if !wants_factory => (adapter.is_singleton)(&instance),
                _ => true,
            });
        }
        if let Some(def) = self.definition_of(&canonical) {
            return Ok(def.scope().is_singleton());
        }
        if let Some(parent) = &self.parent {
            return parent.is_singleton(name);
        }
        Err(self.not_found(&canonical))
    }

    pub fn is_prototype(&self, name: &str) -> Result<bool> {
        let (canonical, _) = self.transformed_name(name);
        if let Some(def) = self.definition_of(&canonical) {
            return Ok(def.scope().is_prototype());
        }
        if self.singletons.contains(&canonical) {
            return Ok(false);
        }
        if let Some(parent) = &self.parent {
            return parent.is_prototype(name);
        }
        Err(self.not_found(&canonical))
    }

    /// The exposed type of the bean: the factory-bean product type for plain
    /// names, the factory type itself for `&`-prefixed names.
    pub fn get_type(&self, name: &str) -> Result<TypeSpec> {
        let (canonical, wants_factory) = self.transformed_name(name);

        if let Some(instance) = self.singletons.get(&canonical) {
            let descriptor = self.descriptors.get(handle_type_id(&instance));
            if let Some(descriptor) = &descriptor {
                if let (Some(adapter), false) = (&descriptor.factory_bean, wants_factory) {
                    return Ok(adapter.object_type.clone());
                }
                return Ok(descriptor.spec().clone());
            }
            return Err(self.not_found(&canonical));
        }

        if let Some(predicted) = self.predicted_type(&canonical)? {
            if let Some(descriptor) = self.descriptors.get(predicted.id()) {
                if let (Some(adapter), false) = (&descriptor.factory_bean, wants_factory) {
                    return Ok(adapter.object_type.clone());
                }
            }
            return Ok(predicted);
        }

        if let Some(parent) = &self.parent {
            return parent.get_type(name);
        }
        Err(self.not_found(&canonical))
    }

    pub fn is_type_match(&self, name: &str, ty: &TypeSpec) -> Result<bool> {
        let exposed = self.get_type(name)?;
        Ok(exposed == *ty || self.descriptors.assignable(exposed.id(), ty))
    }

    /// The declared or processor-predicted type of a definition, without
    /// factory-bean dereferencing.
    fn predicted_type(&self, canonical: &str) -> Result<Option<TypeSpec>> {
        let Some(definition) = self.definition_of(canonical) else { return Ok(None) };

        if let Some(type_id) = definition.type_id() {
            if let Some(descriptor) = self.descriptors.get(type_id) {
                for processor in self.processors.snapshot() {
                    if let Some(smart) = processor.as_smart_instantiation() {
                        if let Some(predicted) = smart.predict_type(&descriptor, canonical) {
                            return Ok(Some(predicted));
                        }
                    }
                }
                return Ok(Some(descriptor.spec().clone()));
            }
        }
        Ok(None)
    }

    /// Candidate names whose exposed type satisfies `ty`.
    pub(crate) fn bean_names_assignable_to(&self, ty: &TypeSpec, allow_eager: bool) -> Vec<String> {
        let mut names = Vec::new();

        for name in self.definition_order.lock().clone() {
            let Some(definition) = self.definition_of(&name) else { continue };
            if definition.is_abstract() {
                continue;
            }
            if self.name_matches_type(&name, ty, allow_eager) {
                names.push(name);
            }
        }

        for name in self.singletons.singleton_names() {
            if self.definitions.contains_key(&name) || names.contains(&name) {
                continue;
            }
            if self.name_matches_type(&name, ty, allow_eager) {
                names.push(name);
            }
        }
        names
    }

    fn name_matches_type(&self, canonical: &str, ty: &TypeSpec, _allow_eager: bool) -> bool {
        if let Some(instance) = self.singletons.get(canonical) {
            if let Some(adapter) = self.factory_adapter_of(&instance) {
                let object = &adapter.object_type;
                return *object == *ty || self.descriptors.assignable(object.id(), ty);
            }
            let id = handle_type_id(&instance);
            return id == ty.id() || self.descriptors.assignable(id, ty);
        }

        let Ok(Some(predicted)) = self.predicted_type(canonical) else { return false };
        if let Some(descriptor) = self.descriptors.get(predicted.id()) {
            if let Some(adapter) = &descriptor.factory_bean {
                // The declared product type answers without instantiation.
                let object = &adapter.object_type;
                return *object == *ty || self.descriptors.assignable(object.id(), ty);
            }
        }
        predicted == *ty || self.descriptors.assignable(predicted.id(), ty)
    }

    // ── Definition access ──

    pub(crate) fn definition_of(&self, name: &str) -> Option<Arc<BeanDefinition>> {
        self.definitions.get(name).map(|e| e.value().clone())
    }

    /// Merges the definition chain for `name`, caching the result until the
    /// underlying definitions change.
    pub fn merged_definition(&self, name: &str) -> Result<Arc<MergedDefinition>> {
        if let Some(existing) = self.merged.get(name) {
            if !existing.is_stale() {
                return Ok(existing.value().clone());
            }
        }

        let definition = self
            .definition_of(name)
            .ok_or_else(|| self.not_found(name))?;
        let flattened = self.flatten_definition(name, &definition)?;
        let merged = Arc::new(MergedDefinition::new(name, flattened));
        self.merged.insert(name.to_owned(), merged.clone());
        debug!(bean = name, "merged definition");
        Ok(merged)
    }

    fn flatten_definition(
        &self,
        name: &str,
        definition: &BeanDefinition,
    ) -> Result<BeanDefinition> {
        let Some(parent_name) = definition.parent_name.clone() else {
            return Ok(definition.clone());
        };
        if parent_name == name {
            return Err(TarkibError::definition(name, "definition names itself as parent"));
        }

        let parent = match self.definition_of(&parent_name) {
            Some(parent) => self.flatten_definition(&parent_name, &parent)?,
            None => match &self.parent {
                Some(factory) => factory
                    .merged_definition(&parent_name)
                    .map(|m| m.definition().clone())
                    .map_err(|_| self.missing_parent(name, &parent_name))?,
                None => return Err(self.missing_parent(name, &parent_name)),
            },
        };
        Ok(definition.merged_over(&parent))
    }

    fn missing_parent(&self, name: &str, parent: &str) -> TarkibError {
        TarkibError::definition(name, format!("parent definition '{parent}' does not exist"))
    }

    fn not_found(&self, name: &str) -> TarkibError {
        let mut known: Vec<String> = self.definition_order.lock().clone();
        known.extend(self.singletons.singleton_names());
        let mut error = NotFoundError::named(name);
        error.suggestions = tarkib_support::rendering::suggest_similar(name, &known, 3);
        TarkibError::NotFound(error)
    }

    fn mark_created(&self, name: &str) {
        self.already_created.insert(name.to_owned(), ());
    }

    pub(crate) fn was_created(&self, name: &str) -> bool {
        self.already_created.contains_key(name)
    }

    fn is_prototype_in_creation(&self, name: &str) -> bool {
        PROTOTYPES_IN_CREATION.with(|set| set.borrow().contains(name))
    }

    /// Inside a supplier, transitively requested beans become dependencies
    /// of the supplied bean.
    fn register_supplied_dependency(&self, canonical: &str) {
        if let Some(outer) = crate::creation::currently_supplied_bean() {
            if outer != canonical {
                self.singletons.register_dependent(canonical, &outer);
            }
        }
    }

    pub fn register_dependent_bean(&self, name: &str, dependent: &str) {
        let canonical = self.canonical_name(name);
        self.singletons.register_dependent(&canonical, dependent);
    }

    // ── Instance-level operations ──

    /// Creates a bean of `T` from an ad-hoc prototype definition with
    /// constructor autowiring, without registering anything.
    pub fn create_bean<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let definition = BeanDefinition::of::<T>()
            .prototype()
            .with_autowire(AutowireMode::Constructor);
        let merged = Arc::new(MergedDefinition::new(
            std::any::type_name::<T>(),
            definition,
        ));
        let handle = self.create_bean_internal(&merged, None)?;
        typed::<T>(&handle).ok_or_else(|| self.wrong_type_error::<T>("<created>", &handle))
    }

    /// Runs marker-driven injection over an existing instance.
    pub fn autowire_bean(&self, instance: &BeanHandle) -> Result<()> {
        let type_id = handle_type_id(instance);
        let Some(descriptor) = self.descriptors.get(type_id) else {
            return Err(TarkibError::definition(
                self.descriptors.name_of_handle(instance),
                "no type descriptor registered for the instance",
            ));
        };
        let name = descriptor.spec().type_name();
        let mut pvs = crate::value::PropertyValues::new();
        for processor in self.processors.snapshot() {
            if let Some(aware) = processor.as_instantiation_aware() {
                aware.post_process_properties(&mut pvs, instance, name, self)?;
            }
        }
        self.apply_property_values_to(name, instance, Some(&descriptor), &pvs)
    }

    /// Populates and initializes an existing instance as if it were the
    /// bean `name`.
    pub fn configure_bean(&self, instance: &BeanHandle, name: &str) -> Result<BeanHandle> {
        let merged = self.merged_definition(name)?;
        self.mark_created(name);
        let descriptor = self.descriptors.get(handle_type_id(instance));
        self.populate_properties(&merged, instance, descriptor.as_ref())?;
        self.initialize_bean_with(name, instance.clone(), Some(merged.as_ref()), descriptor.as_ref())
    }

    /// Applies the definition's declared property values to an instance.
    pub fn apply_bean_property_values(&self, instance: &BeanHandle, name: &str) -> Result<()> {
        let merged = self.merged_definition(name)?;
        let descriptor = self.descriptors.get(handle_type_id(instance));
        self.apply_property_values_to(
            name,
            instance,
            descriptor.as_ref(),
            &merged.definition().property_values,
        )
    }

    /// Runs the full initialization sequence over an existing instance.
    pub fn initialize_bean(&self, instance: BeanHandle, name: &str) -> Result<BeanHandle> {
        let descriptor = self.descriptors.get(handle_type_id(&instance));
        self.initialize_bean_with(name, instance, None, descriptor.as_ref())
    }

    pub fn apply_processors_before_initialization(
        &self,
        bean: BeanHandle,
        name: &str,
    ) -> Result<BeanHandle> {
        let mut current = bean;
        for processor in self.processors.snapshot() {
            let Some(hook) = processor.as_before_initialization() else { continue };
            match hook.before_initialization(current.clone(), name, self)? {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(current)
    }

    pub fn apply_processors_after_initialization(
        &self,
        bean: BeanHandle,
        name: &str,
    ) -> Result<BeanHandle> {
        self.apply_processors_after_initialization_internal(bean, name)
    }

    /// Runs destruction callbacks over an externally held instance.
    pub fn destroy_bean(&self, name: &str, instance: BeanHandle) {
        let descriptor = self.descriptors.get(handle_type_id(&instance));
        let adapter = DisposableAdapter::for_instance(
            name,
            instance,
            descriptor.as_deref(),
            &self.processors,
        );
        adapter.destroy();
    }

    /// Destroys the named singleton (dependents first).
    pub fn destroy_singleton(&self, name: &str) {
        let (canonical, _) = self.transformed_name(name);
        self.factory_products.remove(&canonical);
        self.singletons.destroy_singleton(&canonical);
    }

    /// Destroys every singleton in reverse registration order.
    pub fn destroy_singletons(&self) {
        self.factory_products.clear();
        self.singletons.destroy_singletons();
    }

    /// Eagerly creates every non-lazy singleton, in definition order.
    pub fn pre_instantiate_singletons(&self) -> Result<()> {
        let names = self.definition_order.lock().clone();
        for name in names {
            let merged = self.merged_definition(&name)?;
            if merged.definition().is_abstract()
                || !merged.is_singleton()
                || merged.definition().is_lazy()
            {
                continue;
            }
            self.get_bean_handle(&name)?;
        }
        Ok(())
    }
}

impl DefinitionRegistry for BeanFactory {
    fn register_definition(&self, name: &str, definition: BeanDefinition) -> Result<()> {
        if name.is_empty() || name.starts_with(FACTORY_BEAN_PREFIX) {
            return Err(TarkibError::definition(name, "bean names must not be empty or start with '&'"));
        }

        let replaced = self.definitions.insert(name.to_owned(), Arc::new(definition));
        if replaced.is_some() {
            // Re-registration invalidates everything derived from the old
            // definition, including a live singleton.
            if let Some((_, old_merged)) = self.merged.remove(name) {
                old_merged.mark_stale();
            }
            self.scanner.invalidate(name);
            self.factory_products.remove(name);
            self.singletons.destroy_singleton(name);
            self.already_created.remove(name);
        } else {
            self.definition_order.lock().push(name.to_owned());
        }
        debug!(bean = name, replaced = replaced.is_some(), "registered definition");
        Ok(())
    }

    fn remove_definition(&self, name: &str) -> Result<()> {
        if self.definitions.remove(name).is_none() {
            return Err(self.not_found(name));
        }
        self.definition_order.lock().retain(|n| n != name);
        if let Some((_, old_merged)) = self.merged.remove(name) {
            old_merged.mark_stale();
        }
        self.scanner.invalidate(name);
        self.factory_products.remove(name);
        self.singletons.destroy_singleton(name);
        self.already_created.remove(name);
        Ok(())
    }

    fn definition(&self, name: &str) -> Option<Arc<BeanDefinition>> {
        self.definition_of(name)
    }

    fn contains_definition(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    fn definition_names(&self) -> Vec<String> {
        self.definition_order.lock().clone()
    }

    fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    fn register_alias(&self, canonical: &str, alias: &str) -> Result<()> {
        if alias == canonical {
            return Ok(());
        }
        if self.canonical_name(canonical) == alias {
            return Err(TarkibError::definition(
                canonical,
                format!("registering alias '{alias}' would create an alias cycle"),
            ));
        }
        self.aliases.insert(alias.to_owned(), canonical.to_owned());
        Ok(())
    }
}

impl fmt::Debug for BeanFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanFactory")
            .field("definitions", &self.definitions.len())
            .field("singletons", &self.singletons.singleton_count())
            .field("processors", &self.processors.len())
            .field("parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DestroyMethod;
    use crate::descriptor::{
        ConstructorDescriptor, MethodDescriptor, ParamSpec, PropertyDescriptor,
    };
    use crate::value::handle;
    use parking_lot::RwLock as PlRwLock;
    use std::sync::atomic::{AtomicU32, Ordering as AtOrdering};

    // === Fixtures ===

    #[derive(Debug)]
    struct Counter {
        count: AtomicU32,
    }

    fn counter_descriptor() -> TypeDescriptor {
        TypeDescriptor::new::<Counter>()
            .with_constructor(ConstructorDescriptor::new(vec![], |_| {
                Ok(handle(Counter { count: AtomicU32::new(0) }))
            }))
            .with_method(MethodDescriptor::new("bump", vec![], |bean, _| {
                let counter = typed::<Counter>(bean).expect("counter bean");
                counter.count.fetch_add(1, AtOrdering::SeqCst);
                Ok(())
            }))
    }

    #[derive(Debug)]
    struct Wheel {
        spokes: PlRwLock<Option<Arc<Frame>>>,
    }

    #[derive(Debug)]
    struct Frame {
        wheel: PlRwLock<Option<Arc<Wheel>>>,
    }

    fn cycle_pair_descriptors(factory: &BeanFactory) {
        factory
            .register_descriptor(
                TypeDescriptor::new::<Wheel>()
                    .with_constructor(ConstructorDescriptor::new(vec![], |_| {
                        Ok(handle(Wheel { spokes: PlRwLock::new(None) }))
                    }))
                    .with_property(PropertyDescriptor::new(
                        "frame",
                        TypeSpec::component::<Frame>(),
                        |bean, value| {
                            let wheel = typed::<Wheel>(bean).expect("wheel bean");
                            *wheel.spokes.write() = value.instance_as::<Frame>();
                            Ok(())
                        },
                    )),
            )
            .unwrap();
        factory
            .register_descriptor(
                TypeDescriptor::new::<Frame>()
                    .with_constructor(ConstructorDescriptor::new(vec![], |_| {
                        Ok(handle(Frame { wheel: PlRwLock::new(None) }))
                    }))
                    .with_property(PropertyDescriptor::new(
                        "wheel",
                        TypeSpec::component::<Wheel>(),
                        |bean, value| {
                            let frame = typed::<Frame>(bean).expect("frame bean");
                            *frame.wheel.write() = value.instance_as::<Wheel>();
                            Ok(())
                        },
                    )),
            )
            .unwrap();
    }

    // === Scenario 1: simple singleton with init method ===

    #[test]
    fn singleton_identity_and_init_once() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        factory
            .register_definition(
                "counter",
                BeanDefinition::of::<Counter>().with_init_method("bump"),
            )
            .unwrap();

        let first: Arc<Counter> = factory.get_bean("counter").unwrap();
        assert_eq!(first.count.load(AtOrdering::SeqCst), 1);

        let second: Arc<Counter> = factory.get_bean("counter").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.count.load(AtOrdering::SeqCst), 1);
    }

    // === Scenario 2: setter cycle resolves with mutual observation ===

    #[test]
    fn setter_cycle_resolves() {
        let factory = BeanFactory::new();
        cycle_pair_descriptors(&factory);
        factory
            .register_definition(
                "wheel",
                BeanDefinition::of::<Wheel>().property_ref("frame", "frame"),
            )
            .unwrap();
        factory
            .register_definition(
                "frame",
                BeanDefinition::of::<Frame>().property_ref("wheel", "wheel"),
            )
            .unwrap();

        let wheel: Arc<Wheel> = factory.get_bean("wheel").unwrap();
        let frame: Arc<Frame> = factory.get_bean("frame").unwrap();

        let wheels_frame = wheel.spokes.read().clone().expect("frame wired");
        let frames_wheel = frame.wheel.read().clone().expect("wheel wired");
        assert!(Arc::ptr_eq(&wheels_frame, &frame));
        assert!(Arc::ptr_eq(&frames_wheel, &wheel));
    }

    #[test]
    fn setter_cycle_fails_when_circular_disallowed() {
        let factory = BeanFactory::new();
        cycle_pair_descriptors(&factory);
        factory.set_allow_circular_references(false);
        factory
            .register_definition(
                "wheel",
                BeanDefinition::of::<Wheel>().property_ref("frame", "frame"),
            )
            .unwrap();
        factory
            .register_definition(
                "frame",
                BeanDefinition::of::<Frame>().property_ref("wheel", "wheel"),
            )
            .unwrap();

        let err = factory.get_bean::<Wheel>("wheel").unwrap_err();
        assert!(matches!(err, TarkibError::Cycle(_)), "got: {err}");
    }

    // === Scenario 3: constructor cycle fails fast ===

    #[derive(Debug)]
    struct Gear {
        _axle: Arc<Axle>,
    }
    #[derive(Debug)]
    struct Axle {
        _gear: Arc<Gear>,
    }

    #[test]
    fn constructor_cycle_fails_without_publishing() {
        let factory = BeanFactory::new();
        factory
            .register_descriptor(TypeDescriptor::new::<Gear>().with_constructor(
                ConstructorDescriptor::new(
                    vec![ParamSpec::new("axle", TypeSpec::component::<Axle>())],
                    |args| {
                        let axle = args[0].instance_as::<Axle>().expect("axle argument");
                        Ok(handle(Gear { _axle: axle }))
                    },
                ),
            ))
            .unwrap();
        factory
            .register_descriptor(TypeDescriptor::new::<Axle>().with_constructor(
                ConstructorDescriptor::new(
                    vec![ParamSpec::new("gear", TypeSpec::component::<Gear>())],
                    |args| {
                        let gear = args[0].instance_as::<Gear>().expect("gear argument");
                        Ok(handle(Axle { _gear: gear }))
                    },
                ),
            ))
            .unwrap();
        factory
            .register_definition(
                "gear",
                BeanDefinition::of::<Gear>().with_autowire(AutowireMode::Constructor),
            )
            .unwrap();
        factory
            .register_definition(
                "axle",
                BeanDefinition::of::<Axle>().with_autowire(AutowireMode::Constructor),
            )
            .unwrap();

        let err = factory.get_bean::<Gear>("gear").unwrap_err();
        assert!(matches!(err, TarkibError::Cycle(_)), "got: {err}");
        assert!(!factory.singletons.contains("gear"));
        assert!(!factory.singletons.contains("axle"));
    }

    // === Scenario 4: ambiguous constructors, lenient vs strict ===

    #[derive(Debug)]
    struct Pair {
        shape: &'static str,
        number: i64,
        text: String,
    }

    fn pair_descriptor() -> TypeDescriptor {
        TypeDescriptor::new::<Pair>()
            .with_constructor(ConstructorDescriptor::new(
                vec![
                    ParamSpec::new("number", TypeSpec::int()),
                    ParamSpec::new("text", TypeSpec::str()),
                ],
                |args| {
                    Ok(handle(Pair {
                        shape: "int-str",
                        number: args[0].as_int().unwrap_or_default(),
                        text: args[1].as_str().unwrap_or_default().to_owned(),
                    }))
                },
            ))
            .with_constructor(ConstructorDescriptor::new(
                vec![
                    ParamSpec::new("text", TypeSpec::str()),
                    ParamSpec::new("number", TypeSpec::int()),
                ],
                |args| {
                    Ok(handle(Pair {
                        shape: "str-int",
                        number: args[1].as_int().unwrap_or_default(),
                        text: args[0].as_str().unwrap_or_default().to_owned(),
                    }))
                },
            ))
    }

    #[test]
    fn lenient_resolution_prefers_lowest_weight() {
        let factory = BeanFactory::new();
        factory.register_descriptor(pair_descriptor()).unwrap();
        factory
            .register_definition(
                "pair",
                BeanDefinition::of::<Pair>().arg("1").arg(2i64),
            )
            .unwrap();

        let pair: Arc<Pair> = factory.get_bean("pair").unwrap();
        assert_eq!(pair.shape, "str-int");
        assert_eq!(pair.text, "1");
        assert_eq!(pair.number, 2);
    }

    #[test]
    fn strict_resolution_rejects_ambiguity() {
        let factory = BeanFactory::new();
        factory.register_descriptor(pair_descriptor()).unwrap();
        factory
            .register_definition(
                "pair",
                BeanDefinition::of::<Pair>()
                    .arg("1")
                    .arg(2i64)
                    .strict_constructor_resolution(),
            )
            .unwrap();

        let err = factory.get_bean::<Pair>("pair").unwrap_err();
        assert!(matches!(err, TarkibError::Definition(_)), "got: {err}");
        assert!(format!("{err}").contains("ambiguous"));
    }

    // === Scenario 5: by-type autowiring with a primary candidate ===

    #[derive(Debug)]
    struct Store;

    #[derive(Debug)]
    struct StoreUser {
        store: PlRwLock<Option<Arc<Store>>>,
    }

    #[test]
    fn by_type_autowiring_picks_primary() {
        let factory = BeanFactory::new();
        factory
            .register_descriptor(TypeDescriptor::new::<Store>().with_constructor(
                ConstructorDescriptor::new(vec![], |_| Ok(handle(Store))),
            ))
            .unwrap();
        factory
            .register_descriptor(
                TypeDescriptor::new::<StoreUser>()
                    .with_constructor(ConstructorDescriptor::new(vec![], |_| {
                        Ok(handle(StoreUser { store: PlRwLock::new(None) }))
                    }))
                    .with_property(PropertyDescriptor::new(
                        "store",
                        TypeSpec::component::<Store>(),
                        |bean, value| {
                            let user = typed::<StoreUser>(bean).expect("store user");
                            *user.store.write() = value.instance_as::<Store>();
                            Ok(())
                        },
                    )),
            )
            .unwrap();

        factory
            .register_definition("primaryStore", BeanDefinition::of::<Store>().primary())
            .unwrap();
        factory
            .register_definition("backupStore", BeanDefinition::of::<Store>())
            .unwrap();
        factory
            .register_definition(
                "user",
                BeanDefinition::of::<StoreUser>().with_autowire(AutowireMode::ByType),
            )
            .unwrap();

        let user: Arc<StoreUser> = factory.get_bean("user").unwrap();
        let primary: Arc<Store> = factory.get_bean("primaryStore").unwrap();
        let wired = user.store.read().clone().expect("store wired");
        assert!(Arc::ptr_eq(&wired, &primary));
    }

    #[test]
    fn by_type_without_primary_is_not_unique() {
        let factory = BeanFactory::new();
        factory
            .register_descriptor(TypeDescriptor::new::<Store>().with_constructor(
                ConstructorDescriptor::new(vec![], |_| Ok(handle(Store))),
            ))
            .unwrap();
        factory
            .register_definition("first", BeanDefinition::of::<Store>())
            .unwrap();
        factory
            .register_definition("second", BeanDefinition::of::<Store>())
            .unwrap();

        let err = factory.get_bean_by_type::<Store>().unwrap_err();
        assert!(matches!(err, TarkibError::NotUnique(_)), "got: {err}");
    }

    // === Scenario 6: factory-bean product caching and dereference ===

    struct Widget;

    struct WidgetFactory {
        calls: AtomicU32,
        singleton: bool,
    }

    fn widget_factory_descriptor() -> TypeDescriptor {
        TypeDescriptor::new::<WidgetFactory>()
            .with_constructor(ConstructorDescriptor::new(
                vec![ParamSpec::new("singleton", TypeSpec::bool())],
                |args| {
                    Ok(handle(WidgetFactory {
                        calls: AtomicU32::new(0),
                        singleton: args[0].as_bool().unwrap_or(true),
                    }))
                },
            ))
            .with_factory_bean(
                FactoryBeanAdapter::new(TypeSpec::component::<Widget>(), |factory| {
                    let fb = typed::<WidgetFactory>(factory).expect("widget factory");
                    fb.calls.fetch_add(1, AtOrdering::SeqCst);
                    Ok(handle(Widget))
                })
                .singleton_when(|factory| {
                    typed::<WidgetFactory>(factory).map(|f| f.singleton).unwrap_or(true)
                }),
            )
    }

    #[test]
    fn factory_bean_product_is_cached_for_singletons() {
        let factory = BeanFactory::new();
        factory.register_descriptor(widget_factory_descriptor()).unwrap();
        factory
            .register_definition(
                "widget",
                BeanDefinition::of::<WidgetFactory>().arg(true),
            )
            .unwrap();

        let product: Arc<Widget> = factory.get_bean("widget").unwrap();
        let again: Arc<Widget> = factory.get_bean("widget").unwrap();
        assert!(Arc::ptr_eq(&product, &again));

        let the_factory: Arc<WidgetFactory> = factory.get_bean("&widget").unwrap();
        assert_eq!(the_factory.calls.load(AtOrdering::SeqCst), 1);
    }

    #[test]
    fn factory_bean_prototype_product_reinvokes() {
        let factory = BeanFactory::new();
        factory.register_descriptor(widget_factory_descriptor()).unwrap();
        factory
            .register_definition(
                "widget",
                BeanDefinition::of::<WidgetFactory>().arg(false),
            )
            .unwrap();

        let first: Arc<Widget> = factory.get_bean("widget").unwrap();
        let second: Arc<Widget> = factory.get_bean("widget").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        let the_factory: Arc<WidgetFactory> = factory.get_bean("&widget").unwrap();
        assert_eq!(the_factory.calls.load(AtOrdering::SeqCst), 2);
    }

    #[test]
    fn plain_bean_rejects_factory_dereference() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        factory
            .register_definition("counter", BeanDefinition::of::<Counter>())
            .unwrap();

        let err = factory.get_bean::<Counter>("&counter").unwrap_err();
        assert!(matches!(err, TarkibError::WrongType(_)), "got: {err}");
    }

    // === Prototypes ===

    #[test]
    fn prototypes_are_distinct() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        factory
            .register_definition("proto", BeanDefinition::of::<Counter>().prototype())
            .unwrap();

        let a: Arc<Counter> = factory.get_bean("proto").unwrap();
        let b: Arc<Counter> = factory.get_bean("proto").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn prototype_cycle_fails() {
        let factory = BeanFactory::new();
        cycle_pair_descriptors(&factory);
        factory
            .register_definition(
                "wheel",
                BeanDefinition::of::<Wheel>()
                    .prototype()
                    .property_ref("frame", "frame"),
            )
            .unwrap();
        factory
            .register_definition(
                "frame",
                BeanDefinition::of::<Frame>()
                    .prototype()
                    .property_ref("wheel", "wheel"),
            )
            .unwrap();

        let err = factory.get_bean::<Wheel>("wheel").unwrap_err();
        assert!(matches!(err, TarkibError::Cycle(_)), "got: {err}");
    }

    // === Aliases and names ===

    #[test]
    fn aliases_resolve_to_canonical() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        factory
            .register_definition("counter", BeanDefinition::of::<Counter>())
            .unwrap();
        factory.register_alias("counter", "tally").unwrap();

        let by_name: Arc<Counter> = factory.get_bean("counter").unwrap();
        let by_alias: Arc<Counter> = factory.get_bean("tally").unwrap();
        assert!(Arc::ptr_eq(&by_name, &by_alias));
        assert_eq!(factory.get_aliases("counter"), vec!["tally"]);
        assert!(factory.contains_bean("tally"));
    }

    // === Parent delegation ===

    #[test]
    fn unknown_names_delegate_to_parent() {
        let parent = BeanFactory::new();
        parent.register_descriptor(counter_descriptor()).unwrap();
        parent
            .register_definition("counter", BeanDefinition::of::<Counter>())
            .unwrap();

        let child = BeanFactory::with_parent(parent.clone());
        let from_child: Arc<Counter> = child.get_bean("counter").unwrap();
        let from_parent: Arc<Counter> = parent.get_bean("counter").unwrap();
        assert!(Arc::ptr_eq(&from_child, &from_parent));
        assert!(child.contains_bean("counter"));
        assert!(!child.contains_local_bean("counter"));
    }

    // === depends_on ===

    #[test]
    fn depends_on_creates_dependency_first_and_detects_cycles() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        factory
            .register_definition(
                "first",
                BeanDefinition::of::<Counter>().depends_on(&["second"]),
            )
            .unwrap();
        factory
            .register_definition("second", BeanDefinition::of::<Counter>())
            .unwrap();

        factory.get_bean::<Counter>("first").unwrap();
        // "second" was created as part of the preflight.
        assert!(factory.singletons.contains("second"));

        factory
            .register_definition(
                "left",
                BeanDefinition::of::<Counter>().depends_on(&["right"]),
            )
            .unwrap();
        factory
            .register_definition(
                "right",
                BeanDefinition::of::<Counter>().depends_on(&["left"]),
            )
            .unwrap();
        let err = factory.get_bean::<Counter>("left").unwrap_err();
        assert!(matches!(err, TarkibError::Cycle(_)), "got: {err}");
    }

    // === Destruction order ===

    #[test]
    fn destruction_runs_dependents_before_dependencies() {
        let order: Arc<PlRwLock<Vec<String>>> = Arc::new(PlRwLock::new(Vec::new()));

        struct Tracked {
            tag: String,
            order: Arc<PlRwLock<Vec<String>>>,
            next: PlRwLock<Option<Arc<Tracked>>>,
        }

        let factory = BeanFactory::new();
        let order_for_ctor = order.clone();
        factory
            .register_descriptor(
                TypeDescriptor::new::<Tracked>()
                    .with_constructor(ConstructorDescriptor::new(
                        vec![ParamSpec::new("tag", TypeSpec::str())],
                        move |args| {
                            Ok(handle(Tracked {
                                tag: args[0].as_str().unwrap_or_default().to_owned(),
                                order: order_for_ctor.clone(),
                                next: PlRwLock::new(None),
                            }))
                        },
                    ))
                    .with_property(PropertyDescriptor::new(
                        "next",
                        TypeSpec::component::<Tracked>(),
                        |bean, value| {
                            let tracked = typed::<Tracked>(bean).expect("tracked bean");
                            *tracked.next.write() = value.instance_as::<Tracked>();
                            Ok(())
                        },
                    ))
                    .with_disposing(|bean| {
                        let tracked = typed::<Tracked>(bean).expect("tracked bean");
                        tracked.order.write().push(tracked.tag.clone());
                        Ok(())
                    }),
            )
            .unwrap();

        factory
            .register_definition(
                "service",
                BeanDefinition::of::<Tracked>()
                    .arg("service")
                    .property_ref("next", "repository"),
            )
            .unwrap();
        factory
            .register_definition(
                "repository",
                BeanDefinition::of::<Tracked>().arg("repository"),
            )
            .unwrap();

        factory.get_bean::<Tracked>("service").unwrap();
        factory.destroy_singletons();

        let recorded = order.read().clone();
        assert_eq!(recorded, vec!["service", "repository"]);
    }

    #[test]
    fn destroy_callbacks_run_once_with_named_method() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        factory
            .register_definition(
                "counter",
                BeanDefinition::of::<Counter>()
                    .with_destroy_method(DestroyMethod::Named("bump".into())),
            )
            .unwrap();

        let counter: Arc<Counter> = factory.get_bean("counter").unwrap();
        factory.destroy_singletons();
        factory.destroy_singletons();
        assert_eq!(counter.count.load(AtOrdering::SeqCst), 1);
    }

    // === Merged-definition processors run exactly once ===

    struct MergeCounter {
        runs: AtomicU32,
    }

    impl BeanProcessor for MergeCounter {
        fn processor_name(&self) -> &str {
            "MergeCounter"
        }

        fn as_merged_definition(&self) -> Option<&dyn crate::processor::MergedDefinitionProcessor> {
            Some(self)
        }
    }

    impl crate::processor::MergedDefinitionProcessor for MergeCounter {
        fn post_process_merged_definition(
            &self,
            _merged: &MergedDefinition,
            _factory: &BeanFactory,
        ) -> Result<()> {
            self.runs.fetch_add(1, AtOrdering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn merged_definition_processors_run_once_per_definition() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        let probe = Arc::new(MergeCounter { runs: AtomicU32::new(0) });
        factory.add_processor(probe.clone());

        factory
            .register_definition("proto", BeanDefinition::of::<Counter>().prototype())
            .unwrap();

        factory.get_bean::<Counter>("proto").unwrap();
        factory.get_bean::<Counter>("proto").unwrap();
        factory.get_bean::<Counter>("proto").unwrap();
        assert_eq!(probe.runs.load(AtOrdering::SeqCst), 1);
    }

    // === Marker-driven injection with explicit init dedup ===

    #[derive(Debug)]
    struct MarkedService {
        store: PlRwLock<Option<Arc<Store>>>,
        inits: AtomicU32,
    }

    #[test]
    fn marker_injection_and_init_deduplication() {
        let factory = BeanFactory::new();
        factory
            .register_descriptor(TypeDescriptor::new::<Store>().with_constructor(
                ConstructorDescriptor::new(vec![], |_| Ok(handle(Store))),
            ))
            .unwrap();
        factory
            .register_descriptor(
                TypeDescriptor::new::<MarkedService>()
                    .with_constructor(ConstructorDescriptor::new(vec![], |_| {
                        Ok(handle(MarkedService {
                            store: PlRwLock::new(None),
                            inits: AtomicU32::new(0),
                        }))
                    }))
                    .with_property(
                        PropertyDescriptor::new(
                            "store",
                            TypeSpec::component::<Store>(),
                            |bean, value| {
                                let svc = typed::<MarkedService>(bean).expect("marked service");
                                *svc.store.write() = value.instance_as::<Store>();
                                Ok(())
                            },
                        )
                        .autowired(true),
                    )
                    .with_method(
                        MethodDescriptor::new("warm_up", vec![], |bean, _| {
                            let svc = typed::<MarkedService>(bean).expect("marked service");
                            svc.inits.fetch_add(1, AtOrdering::SeqCst);
                            Ok(())
                        })
                        .init(),
                    ),
            )
            .unwrap();

        factory
            .register_definition("store", BeanDefinition::of::<Store>())
            .unwrap();
        // The declared init method names the same callback the marker
        // already claims; it must run exactly once.
        factory
            .register_definition(
                "service",
                BeanDefinition::of::<MarkedService>().with_init_method("warm_up"),
            )
            .unwrap();

        let service: Arc<MarkedService> = factory.get_bean("service").unwrap();
        assert!(service.store.read().is_some());
        assert_eq!(service.inits.load(AtOrdering::SeqCst), 1);
    }

    #[test]
    fn required_marker_without_candidate_fails() {
        let factory = BeanFactory::new();
        factory
            .register_descriptor(
                TypeDescriptor::new::<MarkedService>()
                    .with_constructor(ConstructorDescriptor::new(vec![], |_| {
                        Ok(handle(MarkedService {
                            store: PlRwLock::new(None),
                            inits: AtomicU32::new(0),
                        }))
                    }))
                    .with_property(
                        PropertyDescriptor::new(
                            "store",
                            TypeSpec::component::<Store>(),
                            |_, _| Ok(()),
                        )
                        .autowired(true),
                    ),
            )
            .unwrap();
        factory
            .register_definition("service", BeanDefinition::of::<MarkedService>())
            .unwrap();

        let err = factory.get_bean::<MarkedService>("service").unwrap_err();
        assert!(
            matches!(err, TarkibError::UnsatisfiedDependency(_)),
            "got: {err}"
        );
    }

    // === Lookup overrides ===

    struct Dispatcher {
        command: PlRwLock<Option<crate::value::ProviderFn>>,
    }

    #[test]
    fn lookup_override_installs_provider() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        factory
            .register_descriptor(
                TypeDescriptor::new::<Dispatcher>()
                    .with_constructor(ConstructorDescriptor::new(vec![], |_| {
                        Ok(handle(Dispatcher { command: PlRwLock::new(None) }))
                    }))
                    .with_property(PropertyDescriptor::new(
                        "command",
                        TypeSpec::provider(),
                        |bean, value| {
                            let dispatcher = typed::<Dispatcher>(bean).expect("dispatcher");
                            if let Value::Provider(provider) = value {
                                *dispatcher.command.write() = Some(provider);
                            }
                            Ok(())
                        },
                    )),
            )
            .unwrap();

        factory
            .register_definition(
                "command",
                BeanDefinition::of::<Counter>().prototype(),
            )
            .unwrap();
        factory
            .register_definition(
                "dispatcher",
                BeanDefinition::of::<Dispatcher>().with_lookup("command", "command"),
            )
            .unwrap();

        let dispatcher: Arc<Dispatcher> = factory.get_bean("dispatcher").unwrap();
        let provider = dispatcher.command.read().clone().expect("provider installed");
        let one = provider().unwrap();
        let two = provider().unwrap();
        assert!(!Arc::ptr_eq(&one, &two));
        assert!(typed::<Counter>(&one).is_some());
    }

    #[test]
    fn lookup_override_on_unknown_property_is_rejected() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        factory
            .register_definition(
                "broken",
                BeanDefinition::of::<Counter>().with_lookup("missing", "whatever"),
            )
            .unwrap();

        let err = factory.get_bean::<Counter>("broken").unwrap_err();
        assert!(matches!(err, TarkibError::Definition(_)), "got: {err}");
    }

    // === Custom scopes ===

    struct CachingScope {
        cache: PlRwLock<Option<(String, BeanHandle)>>,
    }

    impl CustomScope for CachingScope {
        fn get(
            &self,
            name: &str,
            producer: &dyn Fn() -> Result<BeanHandle>,
        ) -> Result<BeanHandle> {
            if let Some((cached_name, cached)) = &*self.cache.read() {
                if cached_name == name {
                    return Ok(cached.clone());
                }
            }
            let created = producer()?;
            *self.cache.write() = Some((name.to_owned(), created.clone()));
            Ok(created)
        }

        fn remove(&self, name: &str) -> Option<BeanHandle> {
            let mut cache = self.cache.write();
            match cache.take() {
                Some((cached_name, handle)) if cached_name == name => Some(handle),
                other => {
                    *cache = other;
                    None
                }
            }
        }

        fn register_destruction_callback(&self, _name: &str, _callback: Box<dyn FnOnce() + Send>) {}
    }

    #[test]
    fn custom_scope_controls_identity() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        let scope = Arc::new(CachingScope { cache: PlRwLock::new(None) });
        factory.register_scope("window", scope.clone());
        factory
            .register_definition(
                "scoped",
                BeanDefinition::of::<Counter>().with_scope(BeanScope::Custom("window".into())),
            )
            .unwrap();

        let first: Arc<Counter> = factory.get_bean("scoped").unwrap();
        let second: Arc<Counter> = factory.get_bean("scoped").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        scope.remove("scoped").unwrap();
        let third: Arc<Counter> = factory.get_bean("scoped").unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn unregistered_scope_is_a_definition_error() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        factory
            .register_definition(
                "scoped",
                BeanDefinition::of::<Counter>().with_scope(BeanScope::Custom("missing".into())),
            )
            .unwrap();

        let err = factory.get_bean::<Counter>("scoped").unwrap_err();
        assert!(matches!(err, TarkibError::Definition(_)), "got: {err}");
    }

    // === Parent definitions and merging ===

    #[test]
    fn child_definition_inherits_and_overrides_parent() {
        let factory = BeanFactory::new();
        factory.register_descriptor(pair_descriptor()).unwrap();
        factory
            .register_definition(
                "base",
                BeanDefinition::new()
                    .abstract_definition()
                    .arg_indexed(0, "base-text")
                    .arg_indexed(1, 7i64),
            )
            .unwrap();
        factory
            .register_definition(
                "child",
                BeanDefinition::of::<Pair>()
                    .with_parent("base")
                    .arg_indexed(0, "child-text"),
            )
            .unwrap();

        let pair: Arc<Pair> = factory.get_bean("child").unwrap();
        assert_eq!(pair.text, "child-text");
        assert_eq!(pair.number, 7);

        let err = factory.get_bean::<Pair>("base").unwrap_err();
        assert!(matches!(err, TarkibError::Definition(_)), "got: {err}");
    }

    #[test]
    fn missing_parent_definition_fails() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        factory
            .register_definition(
                "orphan",
                BeanDefinition::of::<Counter>().with_parent("ghost"),
            )
            .unwrap();

        let err = factory.get_bean::<Counter>("orphan").unwrap_err();
        assert!(matches!(err, TarkibError::Definition(_)), "got: {err}");
    }

    // === Pre-instantiation and laziness ===

    #[test]
    fn pre_instantiate_skips_lazy_and_prototypes() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        factory
            .register_definition("eager", BeanDefinition::of::<Counter>())
            .unwrap();
        factory
            .register_definition("lazy", BeanDefinition::of::<Counter>().lazy())
            .unwrap();
        factory
            .register_definition("proto", BeanDefinition::of::<Counter>().prototype())
            .unwrap();

        factory.pre_instantiate_singletons().unwrap();
        assert!(factory.singletons.contains("eager"));
        assert!(!factory.singletons.contains("lazy"));
        assert!(!factory.singletons.contains("proto"));
    }

    // === Lookup errors ===

    #[test]
    fn unknown_bean_suggests_similar_names() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        factory
            .register_definition("counter", BeanDefinition::of::<Counter>())
            .unwrap();

        let err = factory.get_bean::<Counter>("countr").unwrap_err();
        match err {
            TarkibError::NotFound(not_found) => {
                assert_eq!(not_found.suggestions, vec!["counter".to_owned()]);
            }
            other => panic!("expected NotFound, got: {other}"),
        }
    }

    #[test]
    fn wrong_type_request_is_reported() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();
        factory
            .register_definition("counter", BeanDefinition::of::<Counter>())
            .unwrap();

        let err = factory.get_bean::<Store>("counter").unwrap_err();
        assert!(matches!(err, TarkibError::WrongType(_)), "got: {err}");
    }

    // === Instance-level operations ===

    #[test]
    fn initialize_bean_runs_lifecycle_over_existing_instance() {
        let factory = BeanFactory::new();
        factory.register_descriptor(counter_descriptor()).unwrap();

        let instance = handle(Counter { count: AtomicU32::new(0) });
        let initialized = factory.initialize_bean(instance.clone(), "external").unwrap();
        assert!(Arc::ptr_eq(&instance, &initialized));
    }

    #[test]
    fn explicit_args_bypass_declared_values() {
        let factory = BeanFactory::new();
        factory.register_descriptor(pair_descriptor()).unwrap();
        factory
            .register_definition(
                "pair",
                BeanDefinition::of::<Pair>().prototype().arg("one").arg(1i64),
            )
            .unwrap();

        let handle = factory
            .get_bean_with_args("pair", &[Value::from("two"), Value::Int(2)])
            .unwrap();
        let pair = typed::<Pair>(&handle).unwrap();
        assert_eq!(pair.text, "two");
        assert_eq!(pair.number, 2);
    }
}
