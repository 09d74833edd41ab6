//! The creation engine.
//!
//! Turns a merged definition into a live instance:
//!
//! 1. validate and freeze method-override records
//! 2. give instantiation-aware processors a pre-instantiation short-circuit
//! 3. instantiate (supplier, factory method, or constructor resolution)
//! 4. run merged-definition processors exactly once per definition
//! 5. expose an early reference for cyclic singletons
//! 6. populate properties (by-name/by-type autowiring, processor injection,
//!    declared values)
//! 7. initialize (awareness, before-init processors, declared init,
//!    after-init processors)
//! 8. verify the wrapped-vs-raw-reference invariant and register the bean
//!    for destruction

use std::cell::RefCell;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::autowire::DependencyDescriptor;
use crate::definition::{AutowireMode, BeanScope, MergedDefinition, SupplierFn};
use crate::descriptor::{AwareContext, TypeDescriptor, TypeKind};
use crate::disposal::{self, DisposableAdapter};
use crate::error::{CycleError, Result, TarkibError, UnsatisfiedDependencyError};
use crate::factory::BeanFactory;
use crate::value::{BeanHandle, PropertyValues, Value};

thread_local! {
    /// Stack of beans whose suppliers are running on this thread, so beans
    /// requested from inside a supplier register as its dependencies.
    static SUPPLIED_BEANS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// The bean whose supplier is currently executing on this thread, if any.
pub(crate) fn currently_supplied_bean() -> Option<String> {
    SUPPLIED_BEANS.with(|stack| stack.borrow().last().cloned())
}

struct SuppliedBeanGuard;

impl SuppliedBeanGuard {
    fn new(name: &str) -> Self {
        SUPPLIED_BEANS.with(|stack| stack.borrow_mut().push(name.to_owned()));
        SuppliedBeanGuard
    }
}

impl Drop for SuppliedBeanGuard {
    fn drop(&mut self) {
        SUPPLIED_BEANS.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl BeanFactory {
    /// Creation entry point: override validation, the pre-instantiation
    /// short-circuit, then the full creation path.
    #[instrument(level = "debug", skip(self, merged, explicit_args), fields(bean = merged.name()))]
    pub(crate) fn create_bean_internal(
        &self,
        merged: &Arc<MergedDefinition>,
        explicit_args: Option<&[Value]>,
    ) -> Result<BeanHandle> {
        self.validate_method_overrides(merged)?;

        if let Some(short_circuit) = self.resolve_before_instantiation(merged)? {
            debug!(bean = merged.name(), "pre-instantiation short-circuit");
            return Ok(short_circuit);
        }

        self.do_create_bean(merged, explicit_args)
    }

    /// Ensures every lookup-override record targets an existing property.
    /// Runs once per merged definition.
    fn validate_method_overrides(&self, merged: &MergedDefinition) -> Result<()> {
        if merged.slots().overrides_validated {
            return Ok(());
        }
        let overrides = &merged.definition().method_overrides;
        if !overrides.is_empty() {
            let descriptor = self.required_descriptor(merged)?;
            for record in overrides {
                let found = self
                    .descriptors()
                    .property_in_chain(descriptor.type_id(), &record.property);
                match found {
                    Some(prop) if *prop.ty().kind() == TypeKind::Provider => {}
                    Some(_) => {
                        return Err(TarkibError::definition(
                            merged.name(),
                            format!(
                                "lookup override targets property '{}' which is not a provider slot",
                                record.property
                            ),
                        ))
                    }
                    None => {
                        return Err(TarkibError::definition(
                            merged.name(),
                            format!("lookup override targets unknown property '{}'", record.property),
                        ))
                    }
                }
            }
        }
        merged.slots().overrides_validated = true;
        Ok(())
    }

    /// Gives instantiation-aware processors the chance to return a
    /// substitute instance. A substitute still runs the after-initialization
    /// chain. The probe outcome is cached per definition.
    fn resolve_before_instantiation(
        &self,
        merged: &MergedDefinition,
    ) -> Result<Option<BeanHandle>> {
        if merged.slots().before_instantiation_resolved == Some(false) {
            return Ok(None);
        }
        if !self.processors().has_instantiation_aware() {
            merged.slots().before_instantiation_resolved = Some(false);
            return Ok(None);
        }
        let Some(descriptor) = self.descriptor_for(merged) else {
            merged.slots().before_instantiation_resolved = Some(false);
            return Ok(None);
        };

        let bean_name = merged.name();
        for processor in self.processors().snapshot() {
            let Some(aware) = processor.as_instantiation_aware() else { continue };
            let substitute = aware
                .before_instantiation(descriptor.spec(), bean_name, self)
                .map_err(|e| {
                    TarkibError::post_processing(
                        bean_name,
                        processor.processor_name(),
                        "before instantiation",
                        e,
                    )
                })?;
            if let Some(instance) = substitute {
                let finished =
                    self.apply_processors_after_initialization_internal(instance, bean_name)?;
                merged.slots().before_instantiation_resolved = Some(true);
                return Ok(Some(finished));
            }
        }
        merged.slots().before_instantiation_resolved = Some(false);
        Ok(None)
    }

    fn do_create_bean(
        &self,
        merged: &Arc<MergedDefinition>,
        explicit_args: Option<&[Value]>,
    ) -> Result<BeanHandle> {
        let bean_name = merged.name();

        let (instance, descriptor) = self.create_instance(merged, explicit_args)?;

        // Merged-definition processors run exactly once per definition; the
        // flag flips under the definition lock before the hooks run.
        let run_merged_processors = {
            let mut slots = merged.slots();
            if slots.post_processed {
                false
            } else {
                slots.post_processed = true;
                true
            }
        };
        if run_merged_processors {
            for processor in self.processors().snapshot() {
                let Some(hook) = processor.as_merged_definition() else { continue };
                hook.post_process_merged_definition(merged, self).map_err(|e| {
                    TarkibError::post_processing(
                        bean_name,
                        processor.processor_name(),
                        "merged definition",
                        e,
                    )
                })?;
            }
        }

        self.apply_lookup_overrides(merged, &instance, descriptor.as_ref())?;

        let early_exposure = merged.is_singleton()
            && self.allows_circular_references()
            && self.singletons().is_in_creation(bean_name);
        if early_exposure {
            debug!(bean = bean_name, "exposing early reference");
            let processors = self.processors().snapshot();
            let raw = instance.clone();
            let owner = bean_name.to_owned();
            self.singletons().add_singleton_factory(
                bean_name,
                Box::new(move || {
                    let mut exposed = raw;
                    for processor in &processors {
                        if let Some(smart) = processor.as_smart_instantiation() {
                            exposed = smart.early_reference(exposed, &owner);
                        }
                    }
                    exposed
                }),
            );
        }

        self.populate_properties(merged, &instance, descriptor.as_ref())?;
        let exposed =
            self.initialize_bean_with(bean_name, instance.clone(), Some(merged.as_ref()), descriptor.as_ref())?;

        let mut published = exposed;
        if early_exposure {
            if let Some(early) = self.singletons().get_singleton(bean_name, false) {
                if Arc::ptr_eq(&published, &instance) {
                    // Initialization kept the raw object; expose the early
                    // reference for identity.
                    published = early;
                } else {
                    let injected_into: Vec<String> = self
                        .singletons()
                        .dependents_of(bean_name)
                        .into_iter()
                        .filter(|dependent| self.was_created(dependent))
                        .collect();
                    if !injected_into.is_empty() {
                        if self.allows_raw_injection() {
                            warn!(
                                bean = bean_name,
                                dependents = ?injected_into,
                                "bean was wrapped during initialization after its raw \
                                 reference had been injected; continuing as configured"
                            );
                        } else {
                            return Err(TarkibError::Cycle(CycleError::new(
                                injected_into,
                                format!(
                                    "bean '{bean_name}' was wrapped during initialization, \
                                     but other beans already hold its raw early reference"
                                ),
                            )));
                        }
                    }
                }
            }
        }

        self.register_disposable_if_necessary(merged, &published, descriptor.as_ref());
        Ok(published)
    }

    /// Instantiation strategy: supplier, then factory method, then cached
    /// or resolved constructor.
    fn create_instance(
        &self,
        merged: &Arc<MergedDefinition>,
        explicit_args: Option<&[Value]>,
    ) -> Result<(BeanHandle, Option<Arc<TypeDescriptor>>)> {
        let definition = merged.definition();
        let bean_name = merged.name();

        if let Some(supplier) = &definition.supplier {
            let instance = self.obtain_from_supplier(bean_name, supplier)?;
            return Ok((instance, self.descriptor_for(merged)));
        }

        if definition.factory_method_name.is_some() {
            let instance = self.instantiate_from_factory_method(merged, explicit_args)?;
            let descriptor = self.descriptors().get(crate::value::handle_type_id(&instance));
            return Ok((instance, descriptor));
        }

        let descriptor = self.required_descriptor(merged)?;

        // Re-creation shortcut: a previous run already picked the target.
        if explicit_args.is_none() && merged.slots().constructor.is_some() {
            let instance = self.autowire_constructor(merged, &descriptor, None, None)?;
            return Ok((instance, Some(descriptor)));
        }

        let mut nominated: Option<Vec<usize>> = None;
        for processor in self.processors().snapshot() {
            let Some(smart) = processor.as_smart_instantiation() else { continue };
            let candidates = smart
                .determine_candidate_constructors(&descriptor, bean_name)
                .map_err(|e| {
                    TarkibError::post_processing(
                        bean_name,
                        processor.processor_name(),
                        "constructor nomination",
                        e,
                    )
                })?;
            if let Some(candidates) = candidates {
                nominated = Some(candidates);
                break;
            }
        }

        // Sole no-arg constructor with nothing declared: skip resolution.
        if nominated.is_none()
            && explicit_args.is_none()
            && definition.autowire != AutowireMode::Constructor
            && definition.constructor_args.is_empty()
            && descriptor.constructors.len() == 1
            && descriptor.constructors[0].params().is_empty()
        {
            let ctor = &descriptor.constructors[0];
            let instance = (ctor.invoke)(&[])
                .map_err(|e| TarkibError::creation(bean_name, "instantiation", e))?;
            let mut slots = merged.slots();
            slots.constructor = Some(crate::definition::ResolvedTarget::Constructor(0));
            slots.arguments_resolved = true;
            slots.resolved_args = Some(Vec::new());
            drop(slots);
            return Ok((instance, Some(descriptor)));
        }

        let instance = self.autowire_constructor(merged, &descriptor, nominated, explicit_args)?;
        Ok((instance, Some(descriptor)))
    }

    fn obtain_from_supplier(&self, bean_name: &str, supplier: &SupplierFn) -> Result<BeanHandle> {
        let _guard = SuppliedBeanGuard::new(bean_name);
        supplier().map_err(|e| TarkibError::creation(bean_name, "instance supplier", e))
    }

    /// Writes a deferred `get_bean` provider through every lookup-override
    /// property.
    fn apply_lookup_overrides(
        &self,
        merged: &MergedDefinition,
        instance: &BeanHandle,
        descriptor: Option<&Arc<TypeDescriptor>>,
    ) -> Result<()> {
        let overrides = &merged.definition().method_overrides;
        if overrides.is_empty() {
            return Ok(());
        }
        let descriptor = descriptor.ok_or_else(|| {
            TarkibError::definition(merged.name(), "lookup overrides need a type descriptor")
        })?;

        for record in overrides {
            let Some(property) = self
                .descriptors()
                .property_in_chain(descriptor.type_id(), &record.property)
            else {
                return Err(TarkibError::definition(
                    merged.name(),
                    format!("lookup override targets unknown property '{}'", record.property),
                ));
            };
            let weak = self.weak_handle();
            let target = record.bean_name.clone();
            let provider: crate::value::ProviderFn = Arc::new(move || {
                let factory = weak.upgrade().ok_or_else(|| {
                    TarkibError::definition(&target, "container dropped before lookup ran")
                })?;
                factory.get_bean_handle(&target)
            });
            (property.set)(instance, Value::Provider(provider)).map_err(|e| {
                TarkibError::creation(merged.name(), "lookup override installation", e)
            })?;
        }
        Ok(())
    }

    /// Property population: the post-instantiation gate, by-name/by-type
    /// autowiring, processor-driven injection, the dependency check, then
    /// declared values.
    pub(crate) fn populate_properties(
        &self,
        merged: &MergedDefinition,
        instance: &BeanHandle,
        descriptor: Option<&Arc<TypeDescriptor>>,
    ) -> Result<()> {
        let bean_name = merged.name();
        let definition = merged.definition();

        if self.processors().has_instantiation_aware() {
            for processor in self.processors().snapshot() {
                let Some(aware) = processor.as_instantiation_aware() else { continue };
                let proceed =
                    aware.after_instantiation(instance, bean_name, self).map_err(|e| {
                        TarkibError::post_processing(
                            bean_name,
                            processor.processor_name(),
                            "after instantiation",
                            e,
                        )
                    })?;
                if !proceed {
                    debug!(bean = bean_name, "property population skipped by processor");
                    return Ok(());
                }
            }
        }

        let mut pvs = definition.property_values.clone();

        if definition.autowire == AutowireMode::ByName {
            self.autowire_by_name(merged, descriptor, &mut pvs)?;
        }
        if definition.autowire == AutowireMode::ByType {
            self.autowire_by_type(merged, descriptor, &mut pvs)?;
        }

        for processor in self.processors().snapshot() {
            let Some(aware) = processor.as_instantiation_aware() else { continue };
            aware
                .post_process_properties(&mut pvs, instance, bean_name, self)
                .map_err(|e| match e {
                    err @ TarkibError::UnsatisfiedDependency(_) => err,
                    other => TarkibError::post_processing(
                        bean_name,
                        processor.processor_name(),
                        "property injection",
                        other,
                    ),
                })?;
        }

        if definition.dependency_check {
            self.check_dependencies(merged, descriptor, &pvs)?;
        }

        self.apply_property_values_to(bean_name, instance, descriptor, &pvs)
    }

    fn autowire_by_name(
        &self,
        merged: &MergedDefinition,
        descriptor: Option<&Arc<TypeDescriptor>>,
        pvs: &mut PropertyValues,
    ) -> Result<()> {
        let Some(descriptor) = descriptor else { return Ok(()) };
        let bean_name = merged.name();

        for desc in self.descriptors().chain(descriptor.type_id()) {
            for property in &desc.properties {
                if property.ty().is_simple()
                    || pvs.contains(property.name())
                    || !self.contains_bean(property.name())
                {
                    continue;
                }
                let bean = self.get_bean_handle(property.name())?;
                self.register_dependent_bean(property.name(), bean_name);
                pvs.add(property.name(), Value::Instance(bean));
                debug!(bean = bean_name, property = property.name(), "autowired by name");
            }
        }
        Ok(())
    }

    fn autowire_by_type(
        &self,
        merged: &MergedDefinition,
        descriptor: Option<&Arc<TypeDescriptor>>,
        pvs: &mut PropertyValues,
    ) -> Result<()> {
        let Some(descriptor) = descriptor else { return Ok(()) };
        let bean_name = merged.name();

        for desc in self.descriptors().chain(descriptor.type_id()) {
            for property in &desc.properties {
                if property.ty().is_simple()
                    || *property.ty().kind() == TypeKind::Provider
                    || pvs.contains(property.name())
                {
                    continue;
                }
                // Non-eager so a factory bean is not instantiated just to
                // answer the type question.
                let dependency = DependencyDescriptor::new(property.ty().clone())
                    .at(format!("property '{}' of bean '{}'", property.name(), bean_name))
                    .hint(property.name())
                    .optional()
                    .non_eager()
                    .no_fallback();
                let mut autowired_names = Vec::new();
                let resolved =
                    self.resolve_dependency(&dependency, Some(bean_name), &mut autowired_names)?;
                if let Some(value) = resolved {
                    for dep in &autowired_names {
                        self.register_dependent_bean(dep, bean_name);
                    }
                    pvs.add(property.name(), value);
                    debug!(bean = bean_name, property = property.name(), "autowired by type");
                }
            }
        }
        Ok(())
    }

    /// With dependency checking on, every writable non-simple property must
    /// have a value by now.
    fn check_dependencies(
        &self,
        merged: &MergedDefinition,
        descriptor: Option<&Arc<TypeDescriptor>>,
        pvs: &PropertyValues,
    ) -> Result<()> {
        let Some(descriptor) = descriptor else { return Ok(()) };
        for desc in self.descriptors().chain(descriptor.type_id()) {
            for property in &desc.properties {
                if property.ty().is_simple() || *property.ty().kind() == TypeKind::Provider {
                    continue;
                }
                if !pvs.contains(property.name()) && property.autowired.is_none() {
                    return Err(TarkibError::UnsatisfiedDependency(
                        UnsatisfiedDependencyError {
                            bean: merged.name().to_owned(),
                            injection_point: format!("property '{}'", property.name()),
                            reason: "dependency checking requires a value for every \
                                     non-simple property"
                                .to_owned(),
                        },
                    ));
                }
            }
        }
        Ok(())
    }

    /// Resolves references, converts, and writes the final property values.
    pub(crate) fn apply_property_values_to(
        &self,
        bean_name: &str,
        instance: &BeanHandle,
        descriptor: Option<&Arc<TypeDescriptor>>,
        pvs: &PropertyValues,
    ) -> Result<()> {
        if pvs.is_empty() {
            return Ok(());
        }
        let descriptor = descriptor.ok_or_else(|| {
            TarkibError::definition(bean_name, "property values declared but no type descriptor")
        })?;

        for pv in pvs.iter() {
            let property = self
                .descriptors()
                .property_in_chain(descriptor.type_id(), &pv.name)
                .ok_or_else(|| {
                    TarkibError::definition(
                        bean_name,
                        format!("unknown property '{}'", pv.name),
                    )
                })?;
            let resolved = self.resolve_value(bean_name, &pv.value)?;
            let converted = self.converter().convert(&resolved, property.ty())?;
            (property.set)(instance, converted)
                .map_err(|e| TarkibError::creation(bean_name, "property population", e))?;
        }
        Ok(())
    }

    /// Resolves a raw definition value: bean references become instances
    /// (and register a dependency edge); everything else passes through.
    pub(crate) fn resolve_value(&self, requesting_bean: &str, value: &Value) -> Result<Value> {
        match value {
            Value::Ref(name) => {
                let bean = self.get_bean_handle(name)?;
                self.register_dependent_bean(name, requesting_bean);
                Ok(Value::Instance(bean))
            }
            other => Ok(other.clone()),
        }
    }

    /// Initialization: awareness, before-init processors, the initializing
    /// capability, the named init method, then after-init processors.
    pub(crate) fn initialize_bean_with(
        &self,
        bean_name: &str,
        bean: BeanHandle,
        merged: Option<&MergedDefinition>,
        descriptor: Option<&Arc<TypeDescriptor>>,
    ) -> Result<BeanHandle> {
        if let Some(descriptor) = descriptor {
            if let Some(aware) = &descriptor.aware {
                let context = AwareContext { bean_name, factory: self };
                aware(&bean, &context)
                    .map_err(|e| TarkibError::creation(bean_name, "awareness callbacks", e))?;
            }
        }

        let mut current = bean;
        for processor in self.processors().snapshot() {
            let Some(hook) = processor.as_before_initialization() else { continue };
            let outcome =
                hook.before_initialization(current.clone(), bean_name, self).map_err(|e| {
                    match e {
                        err @ TarkibError::Creation { .. } => err,
                        other => TarkibError::post_processing(
                            bean_name,
                            processor.processor_name(),
                            "before initialization",
                            other,
                        ),
                    }
                })?;
            match outcome {
                Some(next) => current = next,
                None => break,
            }
        }

        if let Some(descriptor) = descriptor {
            if let Some(initializing) = &descriptor.initializing {
                initializing(&current)
                    .map_err(|e| TarkibError::creation(bean_name, "initialization", e))?;
            }
            if let Some(merged) = merged {
                if let Some(init_name) = merged.definition().init_method_name.clone() {
                    self.invoke_named_init(merged, descriptor, &current, &init_name)?;
                }
            }
        }

        self.apply_processors_after_initialization_internal(current, bean_name)
    }

    pub(crate) fn apply_processors_after_initialization_internal(
        &self,
        bean: BeanHandle,
        bean_name: &str,
    ) -> Result<BeanHandle> {
        let mut current = bean;
        for processor in self.processors().snapshot() {
            let Some(hook) = processor.as_after_initialization() else { continue };
            let outcome =
                hook.after_initialization(current.clone(), bean_name, self).map_err(|e| {
                    TarkibError::post_processing(
                        bean_name,
                        processor.processor_name(),
                        "after initialization",
                        e,
                    )
                })?;
            match outcome {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(current)
    }

    /// Invokes the declared init method: zero args, or one bool passed
    /// `true`. Skipped when a marker processor already owns the method.
    fn invoke_named_init(
        &self,
        merged: &MergedDefinition,
        descriptor: &Arc<TypeDescriptor>,
        bean: &BeanHandle,
        init_name: &str,
    ) -> Result<()> {
        let method = self
            .descriptors()
            .method_in_chain(descriptor.type_id(), init_name)
            .ok_or_else(|| {
                TarkibError::definition(
                    merged.name(),
                    format!("declared init method '{init_name}' does not exist"),
                )
            })?;

        if merged.is_externally_managed(method.qualified()) {
            return Ok(());
        }

        let args = match method.params.len() {
            0 => Vec::new(),
            1 if *method.params[0].ty.kind() == TypeKind::Bool => vec![Value::Bool(true)],
            n => {
                return Err(TarkibError::definition(
                    merged.name(),
                    format!("init method '{init_name}' must take 0 arguments or a single bool, has {n}"),
                ))
            }
        };

        debug!(bean = merged.name(), method = init_name, "invoking declared init method");
        (method.invoke)(bean, &args)
            .map_err(|e| TarkibError::creation(merged.name(), "init method", e))
    }

    fn register_disposable_if_necessary(
        &self,
        merged: &MergedDefinition,
        bean: &BeanHandle,
        descriptor: Option<&Arc<TypeDescriptor>>,
    ) {
        let descriptor_ref = descriptor.map(|d| d.as_ref());
        match merged.scope() {
            BeanScope::Prototype => {}
            BeanScope::Singleton => {
                if disposal::requires_destruction(bean, merged, descriptor_ref, self.processors()) {
                    let adapter = DisposableAdapter::new(
                        merged.name(),
                        bean.clone(),
                        merged,
                        descriptor_ref,
                        self.processors(),
                    );
                    self.singletons().register_disposable(adapter);
                }
            }
            BeanScope::Custom(scope_name) => {
                if disposal::requires_destruction(bean, merged, descriptor_ref, self.processors()) {
                    let Some(scope) = self.registered_scope(&scope_name) else {
                        warn!(
                            bean = merged.name(),
                            scope = %scope_name,
                            "cannot register destruction callback: scope not registered"
                        );
                        return;
                    };
                    let adapter = DisposableAdapter::new(
                        merged.name(),
                        bean.clone(),
                        merged,
                        descriptor_ref,
                        self.processors(),
                    );
                    scope.register_destruction_callback(
                        merged.name(),
                        Box::new(move || adapter.destroy()),
                    );
                }
            }
        }
    }

    /// Descriptor for the definition's declared type, if any.
    pub(crate) fn descriptor_for(&self, merged: &MergedDefinition) -> Option<Arc<TypeDescriptor>> {
        merged.definition().type_id().and_then(|id| self.descriptors().get(id))
    }

    /// Descriptor for the definition's declared type, or a definition error
    /// naming what is missing.
    pub(crate) fn required_descriptor(
        &self,
        merged: &MergedDefinition,
    ) -> Result<Arc<TypeDescriptor>> {
        let definition = merged.definition();
        let Some(type_id) = definition.type_id() else {
            return Err(TarkibError::definition(
                merged.name(),
                "definition declares neither a type, a factory method, nor a supplier",
            ));
        };
        self.descriptors().get(type_id).ok_or_else(|| {
            TarkibError::definition(
                merged.name(),
                format!(
                    "no type descriptor registered for '{}'",
                    definition.declared_type_name()
                ),
            )
        })
    }
}
