//! # Tarkib — a name-based dependency-injection container for Rust
//!
//! تركيب — "assembly".
//!
//! Tarkib wires object graphs from declarative bean definitions: named
//! components with scopes, constructor arguments, property values, and
//! lifecycle callbacks, resolved at runtime through explicitly registered
//! type descriptors.
//!
//! # Quick Start
//! ```rust,ignore
//! use tarkib::prelude::*;
//! use std::sync::Arc;
//!
//! let factory = BeanFactory::new();
//!
//! struct Greeter { greeting: String }
//!
//! factory.register_descriptor(
//!     TypeDescriptor::new::<Greeter>().with_constructor(ConstructorDescriptor::new(
//!         vec![ParamSpec::new("greeting", TypeSpec::str())],
//!         |args| Ok(handle(Greeter { greeting: args[0].as_str().unwrap().to_owned() })),
//!     )),
//! )?;
//! factory.register_definition("greeter", BeanDefinition::of::<Greeter>().arg("hello"))?;
//!
//! let greeter: Arc<Greeter> = factory.get_bean("greeter")?;
//! assert_eq!(greeter.greeting, "hello");
//! ```

pub use tarkib_container::*;
pub use tarkib_container::prelude;
pub use tarkib_support::rendering;
