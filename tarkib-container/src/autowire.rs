//! Dependency resolution by type.
//!
//! A [`DependencyDescriptor`] describes one injection point: the declared
//! type (possibly a collection of an element type), whether the dependency
//! is required, and whether resolution may eagerly instantiate factory
//! beans. Resolution follows a fixed ladder: collection gathering, candidate
//! enumeration, qualifier filtering, then primary flag, declared priority,
//! and parameter-name match as tie-breaks.
//!
//! The injection point currently being resolved is tracked in a thread-local
//! stack so deeply nested resolutions can report where they happen.

use std::cell::RefCell;

use tracing::trace;

use crate::definition::BeanDefinition;
use crate::descriptor::{TypeKind, TypeSpec};
use crate::error::{NotFoundError, NotUniqueError, Result, TarkibError};
use crate::factory::BeanFactory;
use crate::value::Value;

/// Description of one injection point for by-type resolution.
#[derive(Clone, Debug)]
pub struct DependencyDescriptor {
    pub ty: TypeSpec,
    pub required: bool,
    /// Whether factory beans may be fully instantiated to answer type
    /// questions during candidate matching.
    pub eager: bool,
    /// Collection targets: produce an empty collection instead of failing
    /// when no candidate exists.
    pub fallback: bool,
    pub injection_point: String,
    /// The parameter or field name, used as the last tie-break.
    pub name_hint: Option<String>,
}

impl DependencyDescriptor {
    pub fn new(ty: TypeSpec) -> Self {
        DependencyDescriptor {
            ty,
            required: true,
            eager: true,
            fallback: true,
            injection_point: String::from("<dependency>"),
            name_hint: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Marks the descriptor non-eager: factory beans are only consulted for
    /// their declared product type, never instantiated during matching.
    pub fn non_eager(mut self) -> Self {
        self.eager = false;
        self
    }

    pub fn no_fallback(mut self) -> Self {
        self.fallback = false;
        self
    }

    pub fn at(mut self, injection_point: impl Into<String>) -> Self {
        self.injection_point = injection_point.into();
        self
    }

    pub fn hint(mut self, name: impl Into<String>) -> Self {
        self.name_hint = Some(name.into());
        self
    }
}

/// Hook for qualifier-style candidate filtering. Every registered resolver
/// must accept a candidate for it to stay in the running.
pub trait QualifierResolver: Send + Sync {
    fn accepts(
        &self,
        candidate: &str,
        definition: Option<&BeanDefinition>,
        descriptor: &DependencyDescriptor,
    ) -> bool;
}

thread_local! {
    static INJECTION_POINTS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// RAII marker for the injection point a resolution runs under.
pub(crate) struct InjectionPointGuard;

impl InjectionPointGuard {
    pub(crate) fn new(point: String) -> Self {
        INJECTION_POINTS.with(|stack| stack.borrow_mut().push(point));
        InjectionPointGuard
    }
}

impl Drop for InjectionPointGuard {
    fn drop(&mut self) {
        INJECTION_POINTS.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// The innermost injection point being resolved on this thread, if any.
pub fn current_injection_point() -> Option<String> {
    INJECTION_POINTS.with(|stack| stack.borrow().last().cloned())
}

impl BeanFactory {
    /// Resolves one dependency by type.
    ///
    /// Returns `Ok(None)` for an optional dependency without candidates.
    /// Every chosen bean name is appended to `autowired_names` so the caller
    /// can register dependency-graph edges.
    pub fn resolve_dependency(
        &self,
        descriptor: &DependencyDescriptor,
        requesting_bean: Option<&str>,
        autowired_names: &mut Vec<String>,
    ) -> Result<Option<Value>> {
        let _guard = InjectionPointGuard::new(descriptor.injection_point.clone());
        trace!(ty = %descriptor.ty, point = %descriptor.injection_point, "resolving dependency");

        match descriptor.ty.kind() {
            TypeKind::List(element) => {
                let names = self.autowire_candidates(element, descriptor, requesting_bean)?;
                if names.is_empty() {
                    return self.empty_collection(descriptor, Value::InstanceList(Vec::new()));
                }
                let mut items = Vec::with_capacity(names.len());
                for name in &names {
                    let bean = self.get_bean_handle(name)?;
                    let cast = match self.converter().convert(&Value::Instance(bean), element)? {
                        Value::Instance(h) => h,
                        _ => unreachable!("component conversion yields an instance"),
                    };
                    items.push(cast);
                }
                autowired_names.extend(names);
                Ok(Some(Value::InstanceList(items)))
            }
            TypeKind::Map(element) => {
                let names = self.autowire_candidates(element, descriptor, requesting_bean)?;
                if names.is_empty() {
                    return self.empty_collection(descriptor, Value::InstanceMap(Vec::new()));
                }
                let mut items = Vec::with_capacity(names.len());
                for name in &names {
                    let bean = self.get_bean_handle(name)?;
                    let cast = match self.converter().convert(&Value::Instance(bean), element)? {
                        Value::Instance(h) => h,
                        _ => unreachable!("component conversion yields an instance"),
                    };
                    items.push((name.clone(), cast));
                }
                autowired_names.extend(names);
                Ok(Some(Value::InstanceMap(items)))
            }
            _ => {
                let candidates =
                    self.autowire_candidates(&descriptor.ty, descriptor, requesting_bean)?;
                let chosen = match candidates.len() {
                    0 => None,
                    1 => candidates.into_iter().next(),
                    _ => Some(self.determine_unique_candidate(candidates, descriptor)?),
                };

                let Some(chosen) = chosen else {
                    if descriptor.required {
                        let mut not_found = NotFoundError::typed(descriptor.ty.to_string());
                        not_found.required_by = requesting_bean.map(str::to_owned);
                        return Err(TarkibError::NotFound(not_found));
                    }
                    return Ok(None);
                };

                let bean = self.get_bean_handle(&chosen)?;
                let value = self.converter().convert(&Value::Instance(bean), &descriptor.ty)?;
                autowired_names.push(chosen);
                Ok(Some(value))
            }
        }
    }

    fn empty_collection(
        &self,
        descriptor: &DependencyDescriptor,
        empty: Value,
    ) -> Result<Option<Value>> {
        if descriptor.fallback {
            return Ok(Some(empty));
        }
        if descriptor.required {
            return Err(TarkibError::NotFound(NotFoundError::typed(
                descriptor.ty.to_string(),
            )));
        }
        Ok(None)
    }

    /// Candidate bean names assignable to `ty`, after qualifier filtering
    /// and self-reference exclusion.
    fn autowire_candidates(
        &self,
        ty: &TypeSpec,
        descriptor: &DependencyDescriptor,
        requesting_bean: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for name in self.bean_names_assignable_to(ty, descriptor.eager) {
            if requesting_bean == Some(name.as_str()) {
                continue;
            }
            let definition = self.definition_of(&name);
            if definition.as_deref().is_some_and(|d| !d.is_autowire_candidate()) {
                continue;
            }
            let accepted = self
                .qualifier_resolvers()
                .iter()
                .all(|q| q.accepts(&name, definition.as_deref(), descriptor));
            if accepted {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Applies the tie-break ladder: unique primary, then best declared
    /// priority, then parameter-name match.
    fn determine_unique_candidate(
        &self,
        candidates: Vec<String>,
        descriptor: &DependencyDescriptor,
    ) -> Result<String> {
        let primaries: Vec<&String> = candidates
            .iter()
            .filter(|n| self.definition_of(n).is_some_and(|d| d.is_primary()))
            .collect();
        match primaries.len() {
            1 => return Ok(primaries[0].clone()),
            n if n > 1 => {
                return Err(TarkibError::NotUnique(NotUniqueError {
                    type_name: descriptor.ty.to_string(),
                    candidates: primaries.into_iter().cloned().collect(),
                }))
            }
            _ => {}
        }

        let mut best: Option<(i32, Vec<String>)> = None;
        for name in &candidates {
            let Some(priority) = self.definition_of(name).and_then(|d| d.priority) else { continue };
            match &mut best {
                None => best = Some((priority, vec![name.clone()])),
                Some((current, holders)) => {
                    // Lower values win, mirroring processor ordering.
                    if priority < *current {
                        *current = priority;
                        holders.clear();
                        holders.push(name.clone());
                    } else if priority == *current {
                        holders.push(name.clone());
                    }
                }
            }
        }
        match best {
            Some((_, mut holders)) if holders.len() == 1 => return Ok(holders.remove(0)),
            Some((_, holders)) if holders.len() > 1 => {
                return Err(TarkibError::NotUnique(NotUniqueError {
                    type_name: descriptor.ty.to_string(),
                    candidates: holders,
                }))
            }
            _ => {}
        }

        if let Some(hint) = &descriptor.name_hint {
            for name in &candidates {
                if name == hint || self.get_aliases(name).iter().any(|a| a == hint) {
                    return Ok(name.clone());
                }
            }
        }

        Err(TarkibError::NotUnique(NotUniqueError {
            type_name: descriptor.ty.to_string(),
            candidates,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_builder_defaults() {
        let d = DependencyDescriptor::new(TypeSpec::component::<String>());
        assert!(d.required);
        assert!(d.eager);
        assert!(d.fallback);
        assert!(d.name_hint.is_none());

        let d = d.optional().non_eager().no_fallback().hint("repo").at("field 'repo'");
        assert!(!d.required);
        assert!(!d.eager);
        assert!(!d.fallback);
        assert_eq!(d.name_hint.as_deref(), Some("repo"));
        assert_eq!(d.injection_point, "field 'repo'");
    }

    #[test]
    fn injection_point_stack_nests() {
        assert!(current_injection_point().is_none());
        {
            let _outer = InjectionPointGuard::new("outer".into());
            assert_eq!(current_injection_point().as_deref(), Some("outer"));
            {
                let _inner = InjectionPointGuard::new("inner".into());
                assert_eq!(current_injection_point().as_deref(), Some("inner"));
            }
            assert_eq!(current_injection_point().as_deref(), Some("outer"));
        }
        assert!(current_injection_point().is_none());
    }
}
