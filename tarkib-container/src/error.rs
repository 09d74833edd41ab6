//! Error types for container operations.
//!
//! Tarkib reports structured, actionable errors: every failure carries the
//! bean name it happened on, and the Display output ends with a hint where
//! one exists.

use std::fmt;

use tarkib_support::rendering::{render_chain, render_name_list};

/// Main error type for all container operations.
#[derive(Debug, thiserror::Error)]
pub enum TarkibError {
    /// A bean definition is invalid: abstract, missing parent, bad method
    /// override, wrong init/destroy arity, and similar declaration problems.
    #[error("{}", .0)]
    Definition(DefinitionError),

    /// No bean matches the requested name or type.
    #[error("{}", .0)]
    NotFound(NotFoundError),

    /// Multiple candidates matched and none of the tie-breaks produced a
    /// unique winner.
    #[error("{}", .0)]
    NotUnique(NotUniqueError),

    /// A bean was found but cannot be coerced to the requested type.
    #[error("{}", .0)]
    WrongType(WrongTypeError),

    /// Instantiation, property population, or initialization failed.
    #[error("Failed to create bean '{bean}' during {phase}: {source}")]
    Creation {
        bean: String,
        phase: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Circular dependency that cannot be resolved: constructor cycles,
    /// prototype re-entry, or direct singleton recursion.
    #[error("{}", .0)]
    Cycle(CycleError),

    /// A required dependency could not be resolved at an injection point.
    #[error("{}", .0)]
    UnsatisfiedDependency(UnsatisfiedDependencyError),

    /// A post-processor raised during one of its phases.
    #[error("Post-processor '{processor}' failed in {phase} for bean '{bean}': {source}")]
    PostProcessing {
        bean: String,
        processor: String,
        phase: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl TarkibError {
    /// Wraps an underlying failure as a creation error for `bean`.
    pub fn creation(
        bean: impl Into<String>,
        phase: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        TarkibError::Creation {
            bean: bean.into(),
            phase,
            source: source.into(),
        }
    }

    /// Shorthand for a definition error on `bean`.
    pub fn definition(bean: impl Into<String>, detail: impl Into<String>) -> Self {
        TarkibError::Definition(DefinitionError {
            bean: bean.into(),
            detail: detail.into(),
        })
    }

    pub fn post_processing(
        bean: impl Into<String>,
        processor: impl Into<String>,
        phase: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        TarkibError::PostProcessing {
            bean: bean.into(),
            processor: processor.into(),
            phase,
            source: source.into(),
        }
    }

    /// Returns the bean name this error is about, where one applies.
    pub fn bean_name(&self) -> Option<&str> {
        match self {
            TarkibError::Definition(e) => Some(&e.bean),
            TarkibError::NotFound(e) => e.name.as_deref(),
            TarkibError::WrongType(e) => Some(&e.name),
            TarkibError::Creation { bean, .. } => Some(bean),
            TarkibError::UnsatisfiedDependency(e) => Some(&e.bean),
            TarkibError::PostProcessing { bean, .. } => Some(bean),
            TarkibError::NotUnique(_) | TarkibError::Cycle(_) => None,
        }
    }
}

/// A declaration-level problem with a bean definition.
#[derive(Debug)]
pub struct DefinitionError {
    /// The bean whose definition is invalid.
    pub bean: String,
    /// What is wrong with it.
    pub detail: String,
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid definition for bean '{}': {}", self.bean, self.detail)
    }
}

/// No bean matched the requested name or type.
#[derive(Debug)]
pub struct NotFoundError {
    /// The name that was looked up, if the lookup was by name.
    pub name: Option<String>,
    /// The type that was looked up, if the lookup was by type.
    pub type_name: Option<String>,
    /// What required this bean (if known).
    pub required_by: Option<String>,
    /// Registered names that look similar (for "did you mean?" output).
    pub suggestions: Vec<String>,
}

impl NotFoundError {
    pub fn named(name: impl Into<String>) -> Self {
        NotFoundError {
            name: Some(name.into()),
            type_name: None,
            required_by: None,
            suggestions: Vec::new(),
        }
    }

    pub fn typed(type_name: impl Into<String>) -> Self {
        NotFoundError {
            name: None,
            type_name: Some(type_name.into()),
            required_by: None,
            suggestions: Vec::new(),
        }
    }
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.type_name) {
            (Some(name), _) => write!(f, "No bean named '{name}' is defined")?,
            (None, Some(ty)) => write!(f, "No bean of type '{ty}' is defined")?,
            (None, None) => write!(f, "No matching bean is defined")?,
        }

        if let Some(ref parent) = self.required_by {
            write!(f, "\n  Required by: {parent}")?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:{}", render_name_list(&self.suggestions))?;
        }

        if let Some(ref name) = self.name {
            write!(f, "\n  Hint: register a definition or singleton under '{name}'")?;
        }
        Ok(())
    }
}

/// Multiple candidates matched a by-type request.
#[derive(Debug)]
pub struct NotUniqueError {
    /// The requested type.
    pub type_name: String,
    /// All candidate bean names that matched.
    pub candidates: Vec<String>,
}

impl fmt::Display for NotUniqueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Expected a single bean of type '{}' but found {}:{}",
            self.type_name,
            self.candidates.len(),
            render_name_list(&self.candidates),
        )?;
        write!(f, "\n  Hint: mark one definition as primary, or inject by name")
    }
}

/// A bean exists but has the wrong type for the request.
#[derive(Debug)]
pub struct WrongTypeError {
    pub name: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for WrongTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bean '{}' is of type '{}' but '{}' was requested",
            self.name, self.actual, self.expected,
        )
    }
}

/// An unresolvable circular dependency.
#[derive(Debug)]
pub struct CycleError {
    /// The chain of bean names that forms the cycle.
    pub chain: Vec<String>,
    /// What kind of cycle this is, for the message.
    pub detail: String,
}

impl CycleError {
    pub fn new(chain: Vec<String>, detail: impl Into<String>) -> Self {
        CycleError { chain, detail: detail.into() }
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Circular dependency: {}", self.detail)?;
        if !self.chain.is_empty() {
            write!(f, "\n  {}", render_chain(&self.chain))?;
        }
        write!(f, "\n  Hint: break the cycle with setter injection or a provider lookup")
    }
}

/// A required dependency could not be resolved at an injection point.
#[derive(Debug)]
pub struct UnsatisfiedDependencyError {
    /// The bean being wired.
    pub bean: String,
    /// Human-readable description of the injection point.
    pub injection_point: String,
    /// Why resolution failed.
    pub reason: String,
}

impl fmt::Display for UnsatisfiedDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unsatisfied dependency in bean '{}' at {}: {}",
            self.bean, self.injection_point, self.reason,
        )
    }
}

/// Convenient Result type for container operations.
pub type Result<T> = std::result::Result<T, TarkibError>;
