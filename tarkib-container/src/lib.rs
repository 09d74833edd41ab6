//! Core container implementation for Tarkib.
//!
//! The container turns declarative [`BeanDefinition`](definition::BeanDefinition)s
//! into a live, wired object graph: a recursive creation engine with
//! constructor resolution and type conversion, a three-level singleton cache
//! that resolves setter cycles, a capability-typed post-processor pipeline,
//! and a marker-driven injection-metadata layer over explicitly registered
//! type descriptors.

pub mod autowire;
pub mod convert;
mod creation;
pub mod definition;
pub mod descriptor;
pub mod disposal;
pub mod error;
pub mod factory;
pub mod metadata;
pub mod processor;
mod resolver;
pub mod scope;
pub mod singleton;
pub mod value;

pub use error::{Result, TarkibError};
pub use factory::{BeanFactory, FACTORY_BEAN_PREFIX};
pub use value::{handle, typed, BeanHandle, Value};

/// The types most registrations and lookups need.
pub mod prelude {
    pub use crate::autowire::{DependencyDescriptor, QualifierResolver};
    pub use crate::definition::{
        AutowireMode, BeanDefinition, BeanScope, DefinitionRegistry, DestroyMethod,
        MergedDefinition,
    };
    pub use crate::descriptor::{
        ConstructorDescriptor, FactoryBeanAdapter, FactoryMethodDescriptor, MethodDescriptor,
        ParamSpec, PropertyDescriptor, TypeDescriptor, TypeSpec,
    };
    pub use crate::error::{Result, TarkibError};
    pub use crate::factory::BeanFactory;
    pub use crate::processor::{
        AfterInitializationProcessor, BeanProcessor, BeforeInitializationProcessor,
        DestructionAwareProcessor, InstantiationAwareProcessor, MergedDefinitionProcessor,
        ProcessorPriority, SmartInstantiationProcessor,
    };
    pub use crate::scope::CustomScope;
    pub use crate::value::{handle, typed, BeanHandle, PropertyValues, Value, ValueHolder};
}
