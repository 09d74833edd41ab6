//! Bean destruction.
//!
//! A [`DisposableAdapter`] is built when a bean that needs teardown is
//! registered for destruction. It snapshots the applicable destruction-aware
//! processors at registration time and resolves the declared destroy method
//! once, so destruction later runs without consulting live configuration.
//!
//! Destruction is best-effort by contract: every callback error is logged
//! and swallowed so teardown proceeds across beans.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::definition::{DestroyMethod, MergedDefinition};
use crate::descriptor::{LifecycleFn, MethodInvokeFn, TypeDescriptor, TypeKind};
use crate::processor::{BeanProcessor, ProcessorRegistry};
use crate::value::{BeanHandle, Value};

/// Names probed, in order, for [`DestroyMethod::Inferred`].
const INFERRED_NAMES: [&str; 2] = ["close", "shutdown"];

/// A resolved destroy method: identifier plus invocation shape.
#[derive(Clone)]
pub(crate) struct ResolvedDestroyMethod {
    pub identifier: String,
    pub takes_flag: bool,
    pub invoke: MethodInvokeFn,
}

/// Resolves the declared destroy method of a definition against the
/// descriptor. Returns `None` when nothing is declared, nothing matches, or
/// the matched method is already externally managed.
pub(crate) fn resolve_destroy_method(
    merged: &MergedDefinition,
    descriptor: Option<&TypeDescriptor>,
) -> Option<ResolvedDestroyMethod> {
    let descriptor = descriptor?;
    let candidates: Vec<&str> = match &merged.definition().destroy_method {
        DestroyMethod::Default => return None,
        DestroyMethod::Inferred => INFERRED_NAMES.to_vec(),
        DestroyMethod::Named(name) => vec![name.as_str()],
    };
    let explicit = matches!(merged.definition().destroy_method, DestroyMethod::Named(_));

    for name in candidates {
        let Some(method) = descriptor.method(name) else { continue };

        if merged.is_externally_managed(method.qualified()) {
            return None;
        }

        let takes_flag = match method.params.len() {
            0 => false,
            1 if *method.params[0].ty.kind() == TypeKind::Bool => true,
            _ => {
                warn!(
                    bean = merged.name(),
                    method = name,
                    "destroy method must take no arguments or a single bool; skipping"
                );
                return None;
            }
        };

        return Some(ResolvedDestroyMethod {
            identifier: method.qualified().to_owned(),
            takes_flag,
            invoke: method.invoke.clone(),
        });
    }

    if explicit {
        warn!(
            bean = merged.name(),
            "declared destroy method not found on descriptor; skipping"
        );
    }
    None
}

/// Whether the bean needs a destruction registration at all.
pub(crate) fn requires_destruction(
    bean: &BeanHandle,
    merged: &MergedDefinition,
    descriptor: Option<&TypeDescriptor>,
    processors: &ProcessorRegistry,
) -> bool {
    if descriptor.is_some_and(|d| d.disposing.is_some()) {
        return true;
    }
    if resolve_destroy_method(merged, descriptor).is_some() {
        return true;
    }
    processors.has_destruction_aware() && !processors.destruction_snapshot(bean).is_empty()
}

/// Everything needed to tear one bean down, captured at registration time.
pub struct DisposableAdapter {
    bean_name: String,
    bean: BeanHandle,
    processors: Vec<Arc<dyn BeanProcessor>>,
    disposing: Option<LifecycleFn>,
    destroy_method: Option<ResolvedDestroyMethod>,
}

impl DisposableAdapter {
    pub(crate) fn new(
        bean_name: impl Into<String>,
        bean: BeanHandle,
        merged: &MergedDefinition,
        descriptor: Option<&TypeDescriptor>,
        processors: &ProcessorRegistry,
    ) -> Self {
        DisposableAdapter {
            bean_name: bean_name.into(),
            processors: processors.destruction_snapshot(&bean),
            disposing: descriptor.and_then(|d| d.disposing.clone()),
            destroy_method: resolve_destroy_method(merged, descriptor),
            bean,
        }
    }

    /// Builds an adapter for an externally supplied instance (used by the
    /// public `destroy_bean` operation). Only processor callbacks and the
    /// disposing capability apply.
    pub(crate) fn for_instance(
        bean_name: impl Into<String>,
        bean: BeanHandle,
        descriptor: Option<&TypeDescriptor>,
        processors: &ProcessorRegistry,
    ) -> Self {
        DisposableAdapter {
            bean_name: bean_name.into(),
            processors: processors.destruction_snapshot(&bean),
            disposing: descriptor.and_then(|d| d.disposing.clone()),
            destroy_method: None,
            bean,
        }
    }

    pub fn bean_name(&self) -> &str {
        &self.bean_name
    }

    /// Runs destruction callbacks in order: destruction-aware processors,
    /// the disposing capability, then the declared destroy method. Errors
    /// are logged and swallowed.
    pub fn destroy(&self) {
        for processor in &self.processors {
            let Some(aware) = processor.as_destruction_aware() else { continue };
            if let Err(err) = aware.before_destruction(&self.bean, &self.bean_name) {
                warn!(
                    bean = %self.bean_name,
                    processor = processor.processor_name(),
                    %err,
                    "destruction processor failed; continuing"
                );
            }
        }

        if let Some(disposing) = &self.disposing {
            if let Err(err) = disposing(&self.bean) {
                warn!(bean = %self.bean_name, %err, "disposing callback failed; continuing");
            }
        }

        if let Some(method) = &self.destroy_method {
            let args = if method.takes_flag { vec![Value::Bool(true)] } else { Vec::new() };
            if let Err(err) = (method.invoke)(&self.bean, &args) {
                warn!(
                    bean = %self.bean_name,
                    method = %method.identifier,
                    %err,
                    "destroy method failed; continuing"
                );
            }
        }
    }
}

impl fmt::Debug for DisposableAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposableAdapter")
            .field("bean", &self.bean_name)
            .field("processors", &self.processors.len())
            .field("disposing", &self.disposing.is_some())
            .field(
                "destroy_method",
                &self.destroy_method.as_ref().map(|m| m.identifier.clone()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{BeanDefinition, DestroyMethod, MergedDefinition};
    use crate::descriptor::{MethodDescriptor, ParamSpec, TypeDescriptor, TypeSpec};
    use crate::value::handle;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Connection {
        closed: AtomicU32,
    }

    fn connection_descriptor() -> TypeDescriptor {
        TypeDescriptor::new::<Connection>()
            .with_method(MethodDescriptor::new("close", vec![], |h, _| {
                let conn = crate::value::typed::<Connection>(h).unwrap();
                conn.closed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .with_method(MethodDescriptor::new(
                "shutdown",
                vec![ParamSpec::new("force", TypeSpec::bool())],
                |h, args| {
                    assert_eq!(args[0].as_bool(), Some(true));
                    let conn = crate::value::typed::<Connection>(h).unwrap();
                    conn.closed.fetch_add(10, Ordering::SeqCst);
                    Ok(())
                },
            ))
    }

    fn merged(destroy: DestroyMethod) -> MergedDefinition {
        MergedDefinition::new(
            "conn",
            BeanDefinition::of::<Connection>().with_destroy_method(destroy),
        )
    }

    #[test]
    fn inferred_probes_close_first() {
        let desc = connection_descriptor();
        let merged = merged(DestroyMethod::Inferred);
        let resolved = resolve_destroy_method(&merged, Some(&desc)).unwrap();
        assert_eq!(resolved.identifier, "close");
        assert!(!resolved.takes_flag);
    }

    #[test]
    fn named_with_bool_flag() {
        let desc = connection_descriptor();
        let merged = merged(DestroyMethod::Named("shutdown".into()));
        let resolved = resolve_destroy_method(&merged, Some(&desc)).unwrap();
        assert!(resolved.takes_flag);
    }

    #[test]
    fn externally_managed_destroy_is_suppressed() {
        let desc = connection_descriptor();
        let merged = merged(DestroyMethod::Named("close".into()));
        merged.register_external_member("close");
        assert!(resolve_destroy_method(&merged, Some(&desc)).is_none());
    }

    #[test]
    fn default_resolves_to_nothing() {
        let desc = connection_descriptor();
        let merged = merged(DestroyMethod::Default);
        assert!(resolve_destroy_method(&merged, Some(&desc)).is_none());
        assert!(!requires_destruction(
            &handle(Connection { closed: AtomicU32::new(0) }),
            &merged,
            Some(&desc),
            &ProcessorRegistry::new(),
        ));
    }

    #[test]
    fn destroy_runs_method_and_swallows_errors() {
        let desc = connection_descriptor()
            .with_disposing(|_| Err(crate::error::TarkibError::definition("conn", "boom")));
        let merged = merged(DestroyMethod::Named("close".into()));
        let bean = handle(Connection { closed: AtomicU32::new(0) });

        let adapter = DisposableAdapter::new(
            "conn",
            bean.clone(),
            &merged,
            Some(&desc),
            &ProcessorRegistry::new(),
        );
        // The disposing error is swallowed; the destroy method still runs.
        adapter.destroy();

        let conn = crate::value::typed::<Connection>(&bean).unwrap();
        assert_eq!(conn.closed.load(Ordering::SeqCst), 1);
    }
}
