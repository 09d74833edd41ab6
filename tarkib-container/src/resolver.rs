//! Constructor and factory-method resolution.
//!
//! Given a merged definition and the declared argument values, resolution
//! picks the best callable: candidates are sorted public-first then by
//! descending parameter count, an argument array is built per candidate
//! (declared values matched by index, then declared type, then name;
//! remaining slots autowired by type), and candidates are ranked by
//! type-difference weight. In lenient mode the first lowest-weight candidate
//! wins; in strict mode a tie at the minimum is an error.
//!
//! The winner, its converted arguments, and a prepared-argument array (with
//! [`Value::Autowired`] markers in autowired slots) are cached under the
//! definition lock, so later creations of the same definition skip the
//! search.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::autowire::DependencyDescriptor;
use crate::convert::{RAW_WEIGHT_BIAS, UNASSIGNABLE};
use crate::definition::{AutowireMode, MergedDefinition, ResolvedTarget};
use crate::descriptor::{ParamSpec, TypeDescriptor};
use crate::error::{Result, TarkibError, UnsatisfiedDependencyError};
use crate::factory::BeanFactory;
use crate::value::{ConstructorArgumentValues, Value};

/// The argument arrays built for one candidate.
pub(crate) struct ArgsHolder {
    /// Fully converted arguments, ready to invoke with.
    pub converted: Vec<Value>,
    /// Reference-resolved but unconverted arguments, for raw weighting.
    pub raw: Vec<Value>,
    /// Cacheable array: declared slots keep their original value, autowired
    /// slots carry the marker.
    pub prepared: Vec<Value>,
    /// Whether any slot must be re-resolved on replay.
    pub resolve_necessary: bool,
    /// Names this candidate pulled in through autowiring.
    pub autowired_names: Vec<String>,
}

impl ArgsHolder {
    fn lenient_weight(&self, factory: &BeanFactory, params: &[ParamSpec]) -> i64 {
        let converter = factory.converter();
        let converted = converter.arguments_weight(params, &self.converted);
        let raw = converter.arguments_weight(params, &self.raw);
        let raw = if raw >= UNASSIGNABLE { raw } else { raw - RAW_WEIGHT_BIAS };
        converted.min(raw)
    }

    fn strict_weight(&self, factory: &BeanFactory, params: &[ParamSpec]) -> i64 {
        let converter = factory.converter();
        if converter.arguments_weight(params, &self.converted) >= UNASSIGNABLE {
            return UNASSIGNABLE;
        }
        if converter.arguments_weight(params, &self.raw) >= UNASSIGNABLE {
            return UNASSIGNABLE - 512;
        }
        UNASSIGNABLE - 1024
    }
}

/// One callable candidate under consideration.
struct Candidate<'a> {
    index: usize,
    params: &'a [ParamSpec],
    public: bool,
}

impl BeanFactory {
    /// Resolves and invokes a constructor for `merged`.
    ///
    /// `nominated` carries processor-nominated candidate indices; `None`
    /// means all constructors (subject to the non-public-access flag) are in
    /// play.
    pub(crate) fn autowire_constructor(
        &self,
        merged: &MergedDefinition,
        descriptor: &Arc<TypeDescriptor>,
        nominated: Option<Vec<usize>>,
        explicit_args: Option<&[Value]>,
    ) -> Result<crate::value::BeanHandle> {
        let bean_name = merged.name();

        // Replay a cached resolution when no explicit arguments override it.
        if explicit_args.is_none() {
            let cached = {
                let slots = merged.slots();
                match (slots.constructor, slots.arguments_resolved) {
                    (Some(ResolvedTarget::Constructor(index)), true) => Some((
                        index,
                        slots.resolved_args.clone(),
                        slots.prepared_args.clone(),
                    )),
                    _ => None,
                }
            };
            if let Some((index, resolved, prepared)) = cached {
                let ctor = descriptor.constructors.get(index).ok_or_else(|| {
                    TarkibError::definition(bean_name, "cached constructor index is stale")
                })?;
                let args = match resolved {
                    Some(args) => args,
                    None => self.replay_prepared_arguments(
                        bean_name,
                        ctor.params(),
                        prepared.as_deref().unwrap_or(&[]),
                    )?,
                };
                trace!(bean = bean_name, "replaying cached constructor");
                return (ctor.invoke)(&args)
                    .map_err(|e| TarkibError::creation(bean_name, "instantiation", e));
            }
        }

        let allow_non_public = merged.definition().allows_non_public();
        // Nominated candidates imply constructor autowiring, as does the
        // definition's own autowire mode.
        let autowiring =
            nominated.is_some() || merged.definition().autowire == AutowireMode::Constructor;
        let indices: Vec<usize> = match nominated {
            Some(indices) => indices,
            None => (0..descriptor.constructors.len()).collect(),
        };
        let candidates: Vec<Candidate<'_>> = indices
            .into_iter()
            .filter_map(|index| {
                let ctor = descriptor.constructors.get(index)?;
                if !ctor.public && !allow_non_public {
                    return None;
                }
                Some(Candidate { index, params: ctor.params(), public: ctor.public })
            })
            .collect();
        if candidates.is_empty() {
            return Err(TarkibError::definition(
                bean_name,
                "no accessible constructor is declared on the type descriptor",
            ));
        }

        let (index, holder) =
            self.select_callable(merged, candidates, explicit_args, autowiring, "constructor")?;
        let ctor = &descriptor.constructors[index];

        for dep in &holder.autowired_names {
            self.register_dependent_bean(dep, bean_name);
        }

        if explicit_args.is_none() {
            let mut slots = merged.slots();
            slots.constructor = Some(ResolvedTarget::Constructor(index));
            slots.arguments_resolved = true;
            if holder.resolve_necessary {
                slots.prepared_args = Some(holder.prepared.clone());
                slots.resolved_args = None;
            } else {
                slots.resolved_args = Some(holder.converted.clone());
                slots.prepared_args = None;
            }
        }

        debug!(bean = bean_name, constructor = index, "constructor resolved");
        (ctor.invoke)(&holder.converted)
            .map_err(|e| TarkibError::creation(bean_name, "instantiation", e))
    }

    /// Resolves and invokes the definition's factory method: static on the
    /// declared type, or an instance method on the named factory bean.
    pub(crate) fn instantiate_from_factory_method(
        &self,
        merged: &MergedDefinition,
        explicit_args: Option<&[Value]>,
    ) -> Result<crate::value::BeanHandle> {
        let bean_name = merged.name();
        let definition = merged.definition();
        let method_name = definition
            .factory_method_name
            .clone()
            .ok_or_else(|| TarkibError::definition(bean_name, "no factory method declared"))?;

        let (factory_instance, holder_descriptor) = match &definition.factory_bean_name {
            Some(factory_bean) => {
                if factory_bean == bean_name {
                    return Err(TarkibError::definition(
                        bean_name,
                        "factory-bean reference points back at the same definition",
                    ));
                }
                let instance = self.get_bean_handle(factory_bean)?;
                self.register_dependent_bean(factory_bean, bean_name);
                let id = crate::value::handle_type_id(&instance);
                let descriptor = self.descriptors().get(id).ok_or_else(|| {
                    TarkibError::definition(
                        bean_name,
                        format!("factory bean '{factory_bean}' has no type descriptor"),
                    )
                })?;
                (Some(instance), descriptor)
            }
            None => {
                let descriptor = self.required_descriptor(merged)?;
                (None, descriptor)
            }
        };

        let wants_static = factory_instance.is_none();
        let allow_non_public = definition.allows_non_public();
        let candidates: Vec<Candidate<'_>> = holder_descriptor
            .factory_methods
            .iter()
            .enumerate()
            .filter(|(_, m)| {
                m.name == method_name
                    && m.is_static == wants_static
                    && (m.public || allow_non_public)
            })
            .map(|(index, m)| Candidate { index, params: &m.params, public: m.public })
            .collect();
        if candidates.is_empty() {
            return Err(TarkibError::definition(
                bean_name,
                format!("no matching factory method '{method_name}' found"),
            ));
        }

        // Replay a cached selection; the argument arrays are still rebuilt
        // against the cached method's parameters.
        if explicit_args.is_none() {
            let cached = {
                let slots = merged.slots();
                match (slots.constructor, slots.arguments_resolved) {
                    (Some(ResolvedTarget::FactoryMethod(index)), true) => Some((
                        index,
                        slots.resolved_args.clone(),
                        slots.prepared_args.clone(),
                    )),
                    _ => None,
                }
            };
            if let Some((index, resolved, prepared)) = cached {
                let method = holder_descriptor.factory_methods.get(index).ok_or_else(|| {
                    TarkibError::definition(bean_name, "cached factory-method index is stale")
                })?;
                let args = match resolved {
                    Some(args) => args,
                    None => self.replay_prepared_arguments(
                        bean_name,
                        &method.params,
                        prepared.as_deref().unwrap_or(&[]),
                    )?,
                };
                return (method.invoke)(factory_instance.as_ref(), &args)
                    .map_err(|e| TarkibError::creation(bean_name, "factory method", e));
            }
        }

        let (index, holder) =
            self.select_callable(merged, candidates, explicit_args, true, "factory method")?;
        let method = &holder_descriptor.factory_methods[index];

        for dep in &holder.autowired_names {
            self.register_dependent_bean(dep, bean_name);
        }

        if explicit_args.is_none() {
            let mut slots = merged.slots();
            slots.constructor = Some(ResolvedTarget::FactoryMethod(index));
            slots.arguments_resolved = true;
            if holder.resolve_necessary {
                slots.prepared_args = Some(holder.prepared.clone());
                slots.resolved_args = None;
            } else {
                slots.resolved_args = Some(holder.converted.clone());
                slots.prepared_args = None;
            }
        }

        debug!(bean = bean_name, method = %method_name, "factory method resolved");
        (method.invoke)(factory_instance.as_ref(), &holder.converted)
            .map_err(|e| TarkibError::creation(bean_name, "factory method", e))
    }

    /// Ranks candidates and returns the winner with its argument arrays.
    fn select_callable(
        &self,
        merged: &MergedDefinition,
        mut candidates: Vec<Candidate<'_>>,
        explicit_args: Option<&[Value]>,
        autowiring: bool,
        kind: &'static str,
    ) -> Result<(usize, ArgsHolder)> {
        let bean_name = merged.name();
        let declared = &merged.definition().constructor_args;
        let lenient = merged.definition().is_lenient();

        // Public candidates first, then more parameters first.
        candidates.sort_by(|a, b| {
            b.public
                .cmp(&a.public)
                .then_with(|| b.params.len().cmp(&a.params.len()))
        });

        let min_args = match explicit_args {
            Some(args) => args.len(),
            None => declared.count(),
        };

        let mut best: Option<(usize, ArgsHolder, i64)> = None;
        let mut ambiguous: Vec<usize> = Vec::new();
        let mut first_failure: Option<TarkibError> = None;

        for candidate in &candidates {
            if candidate.params.len() < min_args {
                continue;
            }

            let built = self.build_arguments(
                bean_name,
                candidate.params,
                declared,
                explicit_args,
                autowiring,
            );
            let holder = match built {
                Ok(holder) => holder,
                Err(err) => {
                    trace!(bean = bean_name, index = candidate.index, %err, "candidate rejected");
                    first_failure.get_or_insert(err);
                    continue;
                }
            };

            let weight = if lenient {
                holder.lenient_weight(self, candidate.params)
            } else {
                holder.strict_weight(self, candidate.params)
            };
            if weight >= UNASSIGNABLE {
                continue;
            }

            let improves = best.as_ref().map_or(true, |(_, _, current)| weight < *current);
            let ties = best.as_ref().is_some_and(|(_, _, current)| weight == *current);
            if improves {
                best = Some((candidate.index, holder, weight));
                ambiguous.clear();
            } else if ties {
                ambiguous.push(candidate.index);
            }
        }

        let Some((index, holder, _)) = best else {
            return Err(first_failure.unwrap_or_else(|| {
                TarkibError::definition(
                    bean_name,
                    format!("no matching {kind} found for the declared arguments"),
                )
            }));
        };

        if !lenient && !ambiguous.is_empty() {
            let mut all = vec![index];
            all.extend(&ambiguous);
            return Err(TarkibError::definition(
                bean_name,
                format!("ambiguous {kind} matches in strict mode (candidates {all:?})"),
            ));
        }

        Ok((index, holder))
    }

    /// Builds the argument arrays for one candidate's parameter list.
    fn build_arguments(
        &self,
        bean_name: &str,
        params: &[ParamSpec],
        declared: &ConstructorArgumentValues,
        explicit_args: Option<&[Value]>,
        autowiring: bool,
    ) -> Result<ArgsHolder> {
        let converter = self.converter();

        if let Some(explicit) = explicit_args {
            if explicit.len() != params.len() {
                return Err(TarkibError::definition(
                    bean_name,
                    "explicit arguments do not match the parameter count",
                ));
            }
            let mut converted = Vec::with_capacity(params.len());
            for (param, value) in params.iter().zip(explicit) {
                converted.push(converter.convert(value, &param.ty)?);
            }
            return Ok(ArgsHolder {
                converted,
                raw: explicit.to_vec(),
                prepared: explicit.to_vec(),
                resolve_necessary: false,
                autowired_names: Vec::new(),
            });
        }

        let mut converted = Vec::with_capacity(params.len());
        let mut raw = Vec::with_capacity(params.len());
        let mut prepared = Vec::with_capacity(params.len());
        let mut resolve_necessary = false;
        let mut autowired_names = Vec::new();
        let mut used_generic: Vec<usize> = Vec::new();

        for (position, param) in params.iter().enumerate() {
            let declared_value = match declared.get_indexed(position) {
                Some(holder)
                    if holder
                        .declared_type
                        .as_ref()
                        .map_or(true, |t| t == &param.ty) =>
                {
                    Some(holder.value.clone())
                }
                Some(_) => None,
                None => declared
                    .get_generic(param.name, &param.ty, &used_generic)
                    .map(|(i, holder)| {
                        used_generic.push(i);
                        holder.value.clone()
                    }),
            };

            match declared_value {
                Some(original) => {
                    let resolved = self.resolve_value(bean_name, &original)?;
                    converted.push(converter.convert(&resolved, &param.ty)?);
                    raw.push(resolved);
                    prepared.push(original);
                }
                None if autowiring => {
                    let descriptor = DependencyDescriptor::new(param.ty.clone())
                        .at(format!(
                            "constructor parameter '{}' of bean '{}'",
                            param.name, bean_name
                        ))
                        .hint(param.name);
                    let descriptor =
                        if param.required { descriptor } else { descriptor.optional() };

                    let resolved =
                        self.resolve_dependency(&descriptor, Some(bean_name), &mut autowired_names);
                    let value = match resolved {
                        Ok(Some(v)) => v,
                        Ok(None) => Value::Null,
                        Err(TarkibError::NotFound(cause)) if param.required => {
                            return Err(TarkibError::UnsatisfiedDependency(
                                UnsatisfiedDependencyError {
                                    bean: bean_name.to_owned(),
                                    injection_point: format!(
                                        "constructor parameter '{}'",
                                        param.name
                                    ),
                                    reason: cause.to_string(),
                                },
                            ))
                        }
                        Err(other) => return Err(other),
                    };
                    converted.push(value.clone());
                    raw.push(value);
                    prepared.push(Value::Autowired);
                    resolve_necessary = true;
                }
                None => {
                    return Err(TarkibError::definition(
                        bean_name,
                        format!(
                            "no declared value for parameter '{}' at position {position} \
                             and constructor autowiring is off",
                            param.name
                        ),
                    ));
                }
            }
        }

        Ok(ArgsHolder { converted, raw, prepared, resolve_necessary, autowired_names })
    }

    /// Re-resolves a cached prepared-argument array: autowired markers go
    /// back through dependency resolution, declared values are re-resolved
    /// and converted against the winning parameter list.
    pub(crate) fn replay_prepared_arguments(
        &self,
        bean_name: &str,
        params: &[ParamSpec],
        prepared: &[Value],
    ) -> Result<Vec<Value>> {
        let converter = self.converter();
        let mut out = Vec::with_capacity(prepared.len());
        for (param, value) in params.iter().zip(prepared) {
            if value.is_autowired_marker() {
                let descriptor = DependencyDescriptor::new(param.ty.clone())
                    .at(format!(
                        "constructor parameter '{}' of bean '{}'",
                        param.name, bean_name
                    ))
                    .hint(param.name);
                let descriptor = if param.required { descriptor } else { descriptor.optional() };
                let mut names = Vec::new();
                let resolved = self.resolve_dependency(&descriptor, Some(bean_name), &mut names)?;
                for dep in &names {
                    self.register_dependent_bean(dep, bean_name);
                }
                out.push(resolved.unwrap_or(Value::Null));
            } else {
                let resolved = self.resolve_value(bean_name, value)?;
                out.push(converter.convert(&resolved, &param.ty)?);
            }
        }
        Ok(out)
    }
}
