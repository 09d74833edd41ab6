//! Marker-driven injection metadata.
//!
//! The scanner walks a type's descriptor chain (composition parents first)
//! and extracts the injection points (autowire-marked properties and
//! methods) plus the init/destroy lifecycle callbacks. Results are cached
//! and replayed deterministically. Two built-in processors consume the
//! metadata:
//!
//! - [`AutowiredProcessor`] nominates constructors and injects marked
//!   properties/methods during property population;
//! - [`InitDestroyProcessor`] runs marked init callbacks before declared
//!   init methods and marked destroy callbacks during destruction.
//!
//! Each injection point caches a shortcut after its first successful
//! resolution: singleton targets resolve once, prototype targets re-resolve
//! by name without re-running candidate selection.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::autowire::DependencyDescriptor;
use crate::definition::MergedDefinition;
use crate::descriptor::{
    DescriptorRegistry, MethodInvokeFn, ParamSpec, SetterFn, TypeDescriptor, TypeSpec,
};
use crate::error::{Result, TarkibError, UnsatisfiedDependencyError};
use crate::factory::BeanFactory;
use crate::processor::{
    BeanProcessor, BeforeInitializationProcessor, DestructionAwareProcessor,
    InstantiationAwareProcessor, MergedDefinitionProcessor, ProcessorPriority,
    SmartInstantiationProcessor,
};
use crate::value::{handle_type_id, BeanHandle, PropertyValues, Value};

/// A cached resolution target for fast re-resolution.
#[derive(Clone, Debug)]
pub(crate) struct Shortcut {
    pub bean_name: String,
    pub ty: TypeSpec,
}

/// An autowire-marked field (settable property).
pub(crate) struct InjectedField {
    pub name: &'static str,
    pub ty: TypeSpec,
    pub required: bool,
    pub set: SetterFn,
}

/// An autowire-marked method; every parameter is resolved by type.
pub(crate) struct InjectedMethod {
    pub name: &'static str,
    pub qualified: String,
    pub params: Vec<ParamSpec>,
    pub required: bool,
    pub invoke: MethodInvokeFn,
}

pub(crate) enum InjectedMember {
    Field(InjectedField),
    Method(InjectedMethod),
}

/// One injection point plus its cached shortcut.
pub(crate) struct InjectedElement {
    pub member: InjectedMember,
    shortcut: OnceCell<Shortcut>,
}

impl InjectedElement {
    fn new(member: InjectedMember) -> Self {
        InjectedElement { member, shortcut: OnceCell::new() }
    }

    pub(crate) fn identifier(&self) -> &str {
        match &self.member {
            InjectedMember::Field(f) => f.name,
            InjectedMember::Method(m) => &m.qualified,
        }
    }

    fn description(&self) -> String {
        match &self.member {
            InjectedMember::Field(f) => format!("field '{}'", f.name),
            InjectedMember::Method(m) => format!("method '{}'", m.name),
        }
    }

    fn inject(&self, bean: &BeanHandle, bean_name: &str, pvs: &PropertyValues, factory: &BeanFactory) -> Result<()> {
        match &self.member {
            InjectedMember::Field(field) => {
                // An explicitly declared property value wins over the marker.
                if pvs.contains(field.name) {
                    return Ok(());
                }
                match self.resolve_one(field.name, &field.ty, field.required, bean_name, factory)? {
                    Some(value) => (field.set)(bean, value),
                    None => Ok(()),
                }
            }
            InjectedMember::Method(method) => {
                if method.params.iter().any(|p| pvs.contains(p.name)) {
                    return Ok(());
                }
                let mut args = Vec::with_capacity(method.params.len());
                for param in &method.params {
                    match self.resolve_one(param.name, &param.ty, method.required, bean_name, factory)? {
                        Some(value) => args.push(value),
                        // A non-required method with an unresolvable
                        // parameter is skipped entirely.
                        None => return Ok(()),
                    }
                }
                (method.invoke)(bean, &args)
            }
        }
    }

    fn resolve_one(
        &self,
        member_name: &str,
        ty: &TypeSpec,
        required: bool,
        bean_name: &str,
        factory: &BeanFactory,
    ) -> Result<Option<Value>> {
        if let Some(shortcut) = self.shortcut.get() {
            let bean = factory.get_bean_handle(&shortcut.bean_name)?;
            let value = factory.converter().convert(&Value::Instance(bean), &shortcut.ty)?;
            return Ok(Some(value));
        }

        let descriptor = DependencyDescriptor::new(ty.clone())
            .at(format!("{} of bean '{}'", self.description(), bean_name))
            .hint(member_name);
        let descriptor = if required { descriptor } else { descriptor.optional() };

        let mut autowired_names = Vec::new();
        let resolved =
            match factory.resolve_dependency(&descriptor, Some(bean_name), &mut autowired_names) {
                Ok(value) => value,
                Err(TarkibError::NotFound(cause)) if required => {
                    return Err(TarkibError::UnsatisfiedDependency(UnsatisfiedDependencyError {
                        bean: bean_name.to_owned(),
                        injection_point: self.description(),
                        reason: cause.to_string(),
                    }))
                }
                Err(other) => return Err(other),
            };

        match resolved {
            Some(value) => {
                for dep in &autowired_names {
                    factory.register_dependent_bean(dep, bean_name);
                }
                if autowired_names.len() == 1 && factory.contains_bean(&autowired_names[0]) {
                    let _ = self.shortcut.set(Shortcut {
                        bean_name: autowired_names[0].clone(),
                        ty: ty.clone(),
                    });
                }
                Ok(Some(value))
            }
            None if required => Err(TarkibError::UnsatisfiedDependency(
                UnsatisfiedDependencyError {
                    bean: bean_name.to_owned(),
                    injection_point: self.description(),
                    reason: format!("no candidate of type '{ty}'"),
                },
            )),
            None => Ok(None),
        }
    }
}

/// All injection points of one target type, in replay order.
pub(crate) struct InjectionMetadata {
    pub target: TypeId,
    pub elements: Vec<Arc<InjectedElement>>,
}

impl InjectionMetadata {
    /// Registers every element against the definition's externally managed
    /// members, dropping the ones another layer already claimed.
    pub(crate) fn check_config_members(&self, merged: &MergedDefinition) -> InjectionMetadata {
        let elements = self
            .elements
            .iter()
            .filter(|e| merged.register_external_member(e.identifier()))
            .cloned()
            .collect();
        InjectionMetadata { target: self.target, elements }
    }

    pub(crate) fn inject(
        &self,
        bean: &BeanHandle,
        bean_name: &str,
        pvs: &PropertyValues,
        factory: &BeanFactory,
    ) -> Result<()> {
        for element in &self.elements {
            element.inject(bean, bean_name, pvs, factory)?;
        }
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// A marked lifecycle callback, identified by its qualified method name.
#[derive(Clone)]
pub(crate) struct LifecycleCallback {
    pub identifier: String,
    pub invoke: MethodInvokeFn,
}

/// Init and destroy callbacks of one target type.
///
/// Init callbacks run composition parents first; destroy callbacks run the
/// most-derived type first.
#[derive(Clone, Default)]
pub(crate) struct LifecycleMetadata {
    pub init: Vec<LifecycleCallback>,
    pub destroy: Vec<LifecycleCallback>,
}

impl LifecycleMetadata {
    pub(crate) fn check_config_members(&self, merged: &MergedDefinition) -> LifecycleMetadata {
        LifecycleMetadata {
            init: self
                .init
                .iter()
                .filter(|c| merged.register_external_member(&c.identifier))
                .cloned()
                .collect(),
            destroy: self
                .destroy
                .iter()
                .filter(|c| merged.register_external_member(&c.identifier))
                .cloned()
                .collect(),
        }
    }
}

/// Builds and caches per-type injection and lifecycle metadata.
pub struct MetadataScanner {
    descriptors: Arc<DescriptorRegistry>,
    injection_cache: DashMap<String, Arc<InjectionMetadata>>,
    lifecycle_cache: DashMap<TypeId, Arc<LifecycleMetadata>>,
    constructor_cache: DashMap<TypeId, Option<Vec<usize>>>,
}

impl MetadataScanner {
    pub fn new(descriptors: Arc<DescriptorRegistry>) -> Self {
        MetadataScanner {
            descriptors,
            injection_cache: DashMap::new(),
            lifecycle_cache: DashMap::new(),
            constructor_cache: DashMap::new(),
        }
    }

    /// Injection metadata for `target`, cached under `cache_key` (the bean
    /// name, or the type name when no bean name applies). The cache entry is
    /// rebuilt when the target type changed underneath the key.
    pub(crate) fn injection_metadata(
        &self,
        cache_key: &str,
        target: TypeId,
    ) -> Arc<InjectionMetadata> {
        if let Some(cached) = self.injection_cache.get(cache_key) {
            if cached.target == target {
                return cached.clone();
            }
        }
        let built = Arc::new(self.build_injection_metadata(target));
        self.injection_cache.insert(cache_key.to_owned(), built.clone());
        built
    }

    fn build_injection_metadata(&self, target: TypeId) -> InjectionMetadata {
        let chain = self.descriptors.chain(target);
        let mut elements: Vec<Arc<InjectedElement>> = Vec::new();

        for descriptor in &chain {
            for property in &descriptor.properties {
                let Some(required) = property.autowired else { continue };
                elements.push(Arc::new(InjectedElement::new(InjectedMember::Field(
                    InjectedField {
                        name: property.name,
                        ty: property.ty.clone(),
                        required,
                        set: property.set.clone(),
                    },
                ))));
            }

            for method in &descriptor.methods {
                let Some(required) = method.autowired else { continue };
                if method.params.is_empty() {
                    warn!(
                        method = method.name,
                        "autowire marker on a method without parameters is ignored"
                    );
                    continue;
                }
                // A same-named non-private method in a more-derived type
                // overrides the earlier declaration: drop the parent entry.
                if !method.private {
                    elements.retain(|e| match &e.member {
                        InjectedMember::Method(m) => {
                            !(m.qualified == m.name && m.name == method.name)
                        }
                        InjectedMember::Field(_) => true,
                    });
                }
                elements.push(Arc::new(InjectedElement::new(InjectedMember::Method(
                    InjectedMethod {
                        name: method.name,
                        qualified: method.qualified.clone(),
                        params: method.params.clone(),
                        required,
                        invoke: method.invoke.clone(),
                    },
                ))));
            }
        }

        debug!(elements = elements.len(), "built injection metadata");
        InjectionMetadata { target, elements }
    }

    /// Lifecycle metadata for `target`, cached by type identity.
    pub(crate) fn lifecycle_metadata(&self, target: TypeId) -> Arc<LifecycleMetadata> {
        if let Some(cached) = self.lifecycle_cache.get(&target) {
            return cached.clone();
        }
        let built = Arc::new(self.build_lifecycle_metadata(target));
        self.lifecycle_cache.insert(target, built.clone());
        built
    }

    fn build_lifecycle_metadata(&self, target: TypeId) -> LifecycleMetadata {
        let chain = self.descriptors.chain(target);
        let mut metadata = LifecycleMetadata::default();

        for descriptor in &chain {
            for method in &descriptor.methods {
                if !method.init && !method.destroy {
                    continue;
                }
                if !method.params.is_empty() {
                    warn!(
                        method = method.name,
                        "lifecycle markers require a zero-argument method; ignored"
                    );
                    continue;
                }
                let callback = LifecycleCallback {
                    identifier: method.qualified.clone(),
                    invoke: method.invoke.clone(),
                };
                if method.init {
                    metadata.init.push(callback.clone());
                }
                if method.destroy {
                    // Most-derived destroy callbacks run first.
                    metadata.destroy.insert(0, callback);
                }
            }
        }
        metadata
    }

    /// Constructor candidates for autowiring, per the marker rules:
    /// a single required-marked constructor wins; otherwise all non-required
    /// marked ones plus the default constructor; otherwise a sole declared
    /// constructor with parameters.
    pub(crate) fn candidate_constructors(
        &self,
        bean_name: &str,
        descriptor: &TypeDescriptor,
    ) -> Result<Option<Vec<usize>>> {
        let target = descriptor.type_id();
        if let Some(cached) = self.constructor_cache.get(&target) {
            return Ok(cached.clone());
        }

        let marked: Vec<usize> = descriptor
            .constructors
            .iter()
            .enumerate()
            .filter(|(_, c)| c.autowired.is_some())
            .map(|(i, _)| i)
            .collect();
        let required: Vec<usize> = marked
            .iter()
            .copied()
            .filter(|&i| descriptor.constructors[i].autowired == Some(true))
            .collect();

        let candidates = if !marked.is_empty() {
            if required.len() > 1 {
                return Err(TarkibError::definition(
                    bean_name,
                    "multiple constructors are marked autowire-required",
                ));
            }
            if required.len() == 1 && marked.len() > 1 {
                return Err(TarkibError::definition(
                    bean_name,
                    "an autowire-required constructor cannot coexist with other marked constructors",
                ));
            }
            if required.len() == 1 {
                Some(required)
            } else {
                let mut candidates = marked;
                if let Some(default_idx) =
                    descriptor.constructors.iter().position(|c| c.params.is_empty())
                {
                    if !candidates.contains(&default_idx) {
                        candidates.push(default_idx);
                    }
                }
                Some(candidates)
            }
        } else if descriptor.constructors.len() == 1
            && !descriptor.constructors[0].params.is_empty()
        {
            Some(vec![0])
        } else {
            None
        };

        self.constructor_cache.insert(target, candidates.clone());
        Ok(candidates)
    }

    /// Drops cached metadata for a bean name (definition re-registered).
    pub(crate) fn invalidate(&self, cache_key: &str) {
        self.injection_cache.remove(cache_key);
    }
}

impl fmt::Debug for MetadataScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataScanner")
            .field("injection_entries", &self.injection_cache.len())
            .field("lifecycle_entries", &self.lifecycle_cache.len())
            .finish()
    }
}

/// Built-in processor: marker-driven constructor nomination and
/// field/method injection.
pub struct AutowiredProcessor {
    scanner: Arc<MetadataScanner>,
    checked: DashMap<String, Arc<InjectionMetadata>>,
}

impl AutowiredProcessor {
    pub fn new(scanner: Arc<MetadataScanner>) -> Self {
        AutowiredProcessor { scanner, checked: DashMap::new() }
    }

    fn metadata_for(&self, bean_name: &str, bean: &BeanHandle) -> Arc<InjectionMetadata> {
        if let Some(checked) = self.checked.get(bean_name) {
            return checked.clone();
        }
        self.scanner.injection_metadata(bean_name, handle_type_id(bean))
    }
}

impl BeanProcessor for AutowiredProcessor {
    fn processor_name(&self) -> &str {
        "AutowiredProcessor"
    }

    fn priority(&self) -> ProcessorPriority {
        ProcessorPriority::Ordered
    }

    fn order(&self) -> i32 {
        i32::MAX - 2
    }

    fn as_merged_definition(&self) -> Option<&dyn MergedDefinitionProcessor> {
        Some(self)
    }

    fn as_smart_instantiation(&self) -> Option<&dyn SmartInstantiationProcessor> {
        Some(self)
    }

    fn as_instantiation_aware(&self) -> Option<&dyn InstantiationAwareProcessor> {
        Some(self)
    }
}

impl MergedDefinitionProcessor for AutowiredProcessor {
    fn post_process_merged_definition(
        &self,
        merged: &MergedDefinition,
        _factory: &BeanFactory,
    ) -> Result<()> {
        let Some(target) = merged.definition().type_id() else { return Ok(()) };
        let metadata = self.scanner.injection_metadata(merged.name(), target);
        let checked = metadata.check_config_members(merged);
        self.checked.insert(merged.name().to_owned(), Arc::new(checked));
        Ok(())
    }
}

impl SmartInstantiationProcessor for AutowiredProcessor {
    fn determine_candidate_constructors(
        &self,
        descriptor: &TypeDescriptor,
        bean_name: &str,
    ) -> Result<Option<Vec<usize>>> {
        self.scanner.candidate_constructors(bean_name, descriptor)
    }
}

impl InstantiationAwareProcessor for AutowiredProcessor {
    fn post_process_properties(
        &self,
        pvs: &mut PropertyValues,
        bean: &BeanHandle,
        bean_name: &str,
        factory: &BeanFactory,
    ) -> Result<()> {
        let metadata = self.metadata_for(bean_name, bean);
        if metadata.is_empty() {
            return Ok(());
        }
        metadata.inject(bean, bean_name, pvs, factory)
    }
}

/// Built-in processor: marker-driven init and destroy callbacks.
pub struct InitDestroyProcessor {
    scanner: Arc<MetadataScanner>,
    checked: DashMap<String, Arc<LifecycleMetadata>>,
}

impl InitDestroyProcessor {
    pub fn new(scanner: Arc<MetadataScanner>) -> Self {
        InitDestroyProcessor { scanner, checked: DashMap::new() }
    }

    fn metadata_for(&self, bean_name: &str, bean: &BeanHandle) -> Arc<LifecycleMetadata> {
        if let Some(checked) = self.checked.get(bean_name) {
            return checked.clone();
        }
        self.scanner.lifecycle_metadata(handle_type_id(bean))
    }
}

impl BeanProcessor for InitDestroyProcessor {
    fn processor_name(&self) -> &str {
        "InitDestroyProcessor"
    }

    fn priority(&self) -> ProcessorPriority {
        ProcessorPriority::Ordered
    }

    fn order(&self) -> i32 {
        i32::MAX - 3
    }

    fn as_merged_definition(&self) -> Option<&dyn MergedDefinitionProcessor> {
        Some(self)
    }

    fn as_before_initialization(&self) -> Option<&dyn BeforeInitializationProcessor> {
        Some(self)
    }

    fn as_destruction_aware(&self) -> Option<&dyn DestructionAwareProcessor> {
        Some(self)
    }
}

impl MergedDefinitionProcessor for InitDestroyProcessor {
    fn post_process_merged_definition(
        &self,
        merged: &MergedDefinition,
        _factory: &BeanFactory,
    ) -> Result<()> {
        let Some(target) = merged.definition().type_id() else { return Ok(()) };
        let metadata = self.scanner.lifecycle_metadata(target);
        let checked = metadata.check_config_members(merged);
        self.checked.insert(merged.name().to_owned(), Arc::new(checked));
        Ok(())
    }
}

impl BeforeInitializationProcessor for InitDestroyProcessor {
    fn before_initialization(
        &self,
        bean: BeanHandle,
        bean_name: &str,
        _factory: &BeanFactory,
    ) -> Result<Option<BeanHandle>> {
        let metadata = self.metadata_for(bean_name, &bean);
        for callback in &metadata.init {
            debug!(bean = bean_name, callback = %callback.identifier, "running init callback");
            (callback.invoke)(&bean, &[]).map_err(|err| {
                TarkibError::creation(bean_name, "marked init callback", err)
            })?;
        }
        Ok(Some(bean))
    }
}

impl DestructionAwareProcessor for InitDestroyProcessor {
    fn before_destruction(&self, bean: &BeanHandle, bean_name: &str) -> Result<()> {
        let metadata = self.metadata_for(bean_name, bean);
        for callback in &metadata.destroy {
            if let Err(err) = (callback.invoke)(bean, &[]) {
                warn!(
                    bean = bean_name,
                    callback = %callback.identifier,
                    %err,
                    "destroy callback failed; continuing"
                );
            }
        }
        Ok(())
    }

    fn requires_destruction(&self, bean: &BeanHandle) -> bool {
        !self.scanner.lifecycle_metadata(handle_type_id(bean)).destroy.is_empty()
    }
}
