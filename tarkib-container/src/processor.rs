//! The post-processor pipeline.
//!
//! Post-processors are capability-typed: one registration trait,
//! [`BeanProcessor`], with `as_*` accessors for each capability a processor
//! chooses to implement. The container invokes each capability at a fixed
//! phase of the bean lifecycle:
//!
//! 1. merged-definition rewrite (once per definition)
//! 2. pre-instantiation short-circuit
//! 3. constructor nomination / early-reference wrapping (smart hooks)
//! 4. post-instantiation + property injection
//! 5. before / after initialization
//! 6. before destruction
//!
//! Processors run in configured order: priority class first, then numeric
//! order value, then registration order.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::definition::MergedDefinition;
use crate::descriptor::{TypeDescriptor, TypeSpec};
use crate::error::Result;
use crate::factory::BeanFactory;
use crate::value::{BeanHandle, PropertyValues};

/// Primary ordering class of a processor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessorPriority {
    /// Runs before all ordered processors.
    PriorityOrdered,
    /// Runs after priority-ordered, before unordered.
    Ordered,
    /// Runs last, in registration order.
    Unordered,
}

/// A registered container extension. Implement the capability traits you
/// need and surface them through the matching `as_*` accessor.
pub trait BeanProcessor: Send + Sync {
    /// Human-readable name for error messages and logs.
    fn processor_name(&self) -> &str {
        "BeanProcessor"
    }

    fn priority(&self) -> ProcessorPriority {
        ProcessorPriority::Unordered
    }

    /// Numeric order within the priority class; lower runs first.
    fn order(&self) -> i32 {
        0
    }

    fn as_merged_definition(&self) -> Option<&dyn MergedDefinitionProcessor> {
        None
    }

    fn as_instantiation_aware(&self) -> Option<&dyn InstantiationAwareProcessor> {
        None
    }

    fn as_smart_instantiation(&self) -> Option<&dyn SmartInstantiationProcessor> {
        None
    }

    fn as_before_initialization(&self) -> Option<&dyn BeforeInitializationProcessor> {
        None
    }

    fn as_after_initialization(&self) -> Option<&dyn AfterInitializationProcessor> {
        None
    }

    fn as_destruction_aware(&self) -> Option<&dyn DestructionAwareProcessor> {
        None
    }
}

/// Rewrites a merged definition; invoked exactly once per definition.
pub trait MergedDefinitionProcessor {
    fn post_process_merged_definition(
        &self,
        merged: &MergedDefinition,
        factory: &BeanFactory,
    ) -> Result<()>;
}

/// Hooks around raw instantiation and property population.
pub trait InstantiationAwareProcessor {
    /// May return a substitute instance, short-circuiting creation.
    fn before_instantiation(
        &self,
        _ty: &TypeSpec,
        _bean_name: &str,
        _factory: &BeanFactory,
    ) -> Result<Option<BeanHandle>> {
        Ok(None)
    }

    /// Returning `false` skips property population entirely.
    fn after_instantiation(
        &self,
        _bean: &BeanHandle,
        _bean_name: &str,
        _factory: &BeanFactory,
    ) -> Result<bool> {
        Ok(true)
    }

    /// Adjusts the property values about to be applied. This is the hook
    /// through which marker-driven field and method injection runs.
    fn post_process_properties(
        &self,
        _pvs: &mut PropertyValues,
        _bean: &BeanHandle,
        _bean_name: &str,
        _factory: &BeanFactory,
    ) -> Result<()> {
        Ok(())
    }
}

/// Deeper instantiation hooks: constructor nomination, early-reference
/// wrapping, and type prediction.
pub trait SmartInstantiationProcessor {
    /// Nominates constructor candidates (indices into the descriptor's
    /// constructor list).
    fn determine_candidate_constructors(
        &self,
        _descriptor: &TypeDescriptor,
        _bean_name: &str,
    ) -> Result<Option<Vec<usize>>> {
        Ok(None)
    }

    /// Wraps the early reference exposed to break a singleton cycle.
    /// Must not re-enter the container.
    fn early_reference(&self, bean: BeanHandle, _bean_name: &str) -> BeanHandle {
        bean
    }

    /// Predicts the exposed type of the bean, if this processor will
    /// eventually replace it.
    fn predict_type(&self, _descriptor: &TypeDescriptor, _bean_name: &str) -> Option<TypeSpec> {
        None
    }
}

/// Runs before declared init callbacks. Returning `Ok(None)` short-circuits
/// the remaining chain, keeping the current instance.
pub trait BeforeInitializationProcessor {
    fn before_initialization(
        &self,
        bean: BeanHandle,
        bean_name: &str,
        factory: &BeanFactory,
    ) -> Result<Option<BeanHandle>>;
}

/// Runs after declared init callbacks (and over factory-bean products).
/// Returning `Ok(None)` short-circuits the remaining chain.
pub trait AfterInitializationProcessor {
    fn after_initialization(
        &self,
        bean: BeanHandle,
        bean_name: &str,
        factory: &BeanFactory,
    ) -> Result<Option<BeanHandle>>;
}

/// Participates in bean destruction.
pub trait DestructionAwareProcessor {
    fn before_destruction(&self, bean: &BeanHandle, bean_name: &str) -> Result<()>;

    /// Whether this processor has work to do for the given bean.
    fn requires_destruction(&self, _bean: &BeanHandle) -> bool {
        true
    }
}

struct Registered {
    processor: Arc<dyn BeanProcessor>,
    seq: u64,
}

/// Holds all registered processors in configured order.
#[derive(Default)]
pub struct ProcessorRegistry {
    items: RwLock<Vec<Registered>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, processor: Arc<dyn BeanProcessor>) {
        let mut items = self.items.write();
        let seq = items.len() as u64;
        items.push(Registered { processor, seq });
        items.sort_by(|a, b| {
            (a.processor.priority(), a.processor.order(), a.seq).cmp(&(
                b.processor.priority(),
                b.processor.order(),
                b.seq,
            ))
        });
    }

    /// Stable snapshot for iteration during a lifecycle phase.
    pub fn snapshot(&self) -> Vec<Arc<dyn BeanProcessor>> {
        self.items.read().iter().map(|r| r.processor.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn has_instantiation_aware(&self) -> bool {
        self.items
            .read()
            .iter()
            .any(|r| r.processor.as_instantiation_aware().is_some())
    }

    pub fn has_destruction_aware(&self) -> bool {
        self.items
            .read()
            .iter()
            .any(|r| r.processor.as_destruction_aware().is_some())
    }

    /// The destruction-aware subset that claims work for `bean`, snapshotted
    /// at disposable-registration time.
    pub(crate) fn destruction_snapshot(&self, bean: &BeanHandle) -> Vec<Arc<dyn BeanProcessor>> {
        self.items
            .read()
            .iter()
            .filter(|r| {
                r.processor
                    .as_destruction_aware()
                    .is_some_and(|d| d.requires_destruction(bean))
            })
            .map(|r| r.processor.clone())
            .collect()
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("registered", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tagged {
        tag: &'static str,
        priority: ProcessorPriority,
        order: i32,
    }

    impl BeanProcessor for Tagged {
        fn processor_name(&self) -> &str {
            self.tag
        }

        fn priority(&self) -> ProcessorPriority {
            self.priority
        }

        fn order(&self) -> i32 {
            self.order
        }
    }

    fn names(registry: &ProcessorRegistry) -> Vec<String> {
        registry
            .snapshot()
            .iter()
            .map(|p| p.processor_name().to_owned())
            .collect()
    }

    #[test]
    fn priority_class_dominates_order_value() {
        let registry = ProcessorRegistry::new();
        registry.add(Arc::new(Tagged {
            tag: "unordered",
            priority: ProcessorPriority::Unordered,
            order: -100,
        }));
        registry.add(Arc::new(Tagged {
            tag: "ordered",
            priority: ProcessorPriority::Ordered,
            order: 50,
        }));
        registry.add(Arc::new(Tagged {
            tag: "priority",
            priority: ProcessorPriority::PriorityOrdered,
            order: 99,
        }));

        assert_eq!(names(&registry), vec!["priority", "ordered", "unordered"]);
    }

    #[test]
    fn order_value_then_registration_order() {
        let registry = ProcessorRegistry::new();
        registry.add(Arc::new(Tagged {
            tag: "b",
            priority: ProcessorPriority::Ordered,
            order: 10,
        }));
        registry.add(Arc::new(Tagged {
            tag: "a",
            priority: ProcessorPriority::Ordered,
            order: 1,
        }));
        registry.add(Arc::new(Tagged {
            tag: "b2",
            priority: ProcessorPriority::Ordered,
            order: 10,
        }));

        assert_eq!(names(&registry), vec!["a", "b", "b2"]);
    }

    #[test]
    fn capability_accessors_default_to_none() {
        let p = Tagged {
            tag: "plain",
            priority: ProcessorPriority::Unordered,
            order: 0,
        };
        assert!(p.as_merged_definition().is_none());
        assert!(p.as_instantiation_aware().is_none());
        assert!(p.as_smart_instantiation().is_none());
        assert!(p.as_before_initialization().is_none());
        assert!(p.as_after_initialization().is_none());
        assert!(p.as_destruction_aware().is_none());
    }
}
