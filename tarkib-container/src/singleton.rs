//! The singleton registry.
//!
//! Holds the three-level cache that gives singletons their identity and
//! breaks setter cycles:
//!
//! - level 1: fully constructed instances, read lock-free
//! - level 2: early references already handed out mid-creation
//! - level 3: producers that synthesize an early reference on demand,
//!   giving smart processors a chance to wrap it; each runs at most once
//!
//! All mutations happen under one mutex (the singleton mutex). A name lives
//! in at most one level at a time and only ever moves upward within one
//! creation. The registry also owns the creation-in-progress set (with the
//! owning thread, so same-thread re-entry is distinguishable from
//! cross-thread contention), the disposable-bean list in registration
//! order, and both directions of the inter-bean dependency graph.

use std::collections::HashMap;
use std::fmt;
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::disposal::DisposableAdapter;
use crate::error::{CycleError, Result, TarkibError};
use crate::value::BeanHandle;

/// A level-3 entry: produces the early reference for a bean in creation.
/// Runs at most once, under the singleton mutex; must not re-enter the
/// registry.
pub(crate) type EarlyProducer = Box<dyn FnOnce() -> BeanHandle + Send>;

#[derive(Default)]
struct RegistryState {
    /// Level 2: early references already exposed.
    early: HashMap<String, BeanHandle>,
    /// Level 3: early-reference producers, pending first access.
    factories: HashMap<String, EarlyProducer>,
    /// Every published singleton name, in registration order.
    registered: Vec<String>,
    /// Names currently being created, with the creating thread.
    in_creation: HashMap<String, ThreadId>,
    /// Beans awaiting destruction callbacks, in registration order.
    disposables: Vec<DisposableAdapter>,
    /// name -> beans that depend on it.
    dependents: HashMap<String, Vec<String>>,
    /// name -> what it depends on.
    dependencies: HashMap<String, Vec<String>>,
}

/// Process-wide singleton state for one container.
pub struct SingletonRegistry {
    /// Level 1: fully constructed singletons; hot reads skip the mutex.
    singletons: DashMap<String, BeanHandle>,
    state: Mutex<RegistryState>,
    creation_done: Condvar,
}

impl Default for SingletonRegistry {
    fn default() -> Self {
        SingletonRegistry {
            singletons: DashMap::new(),
            state: Mutex::new(RegistryState::default()),
            creation_done: Condvar::new(),
        }
    }
}

impl SingletonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an externally constructed singleton.
    pub fn register_singleton(&self, name: &str, bean: BeanHandle) -> Result<()> {
        let mut state = self.state.lock();
        if self.singletons.contains_key(name) {
            return Err(TarkibError::definition(
                name,
                "a singleton under this name is already registered",
            ));
        }
        self.singletons.insert(name.to_owned(), bean);
        state.registered.push(name.to_owned());
        Ok(())
    }

    /// Fully constructed instance, or `None`. Never returns early references.
    pub fn get(&self, name: &str) -> Option<BeanHandle> {
        self.singletons.get(name).map(|e| e.value().clone())
    }

    /// Looks a singleton up, optionally following the early-reference path
    /// for a name that is mid-creation. The first early access promotes the
    /// level-3 producer to level 2, so the producer runs at most once.
    pub fn get_singleton(&self, name: &str, allow_early: bool) -> Option<BeanHandle> {
        if let Some(hit) = self.get(name) {
            return Some(hit);
        }
        if !self.is_in_creation(name) {
            return None;
        }

        let mut state = self.state.lock();
        if let Some(hit) = self.get(name) {
            return Some(hit);
        }
        if let Some(early) = state.early.get(name) {
            return Some(early.clone());
        }
        if !allow_early {
            return None;
        }
        let producer = state.factories.remove(name)?;
        let early = producer();
        debug!(bean = name, "promoted early-reference producer");
        state.early.insert(name.to_owned(), early.clone());
        Some(early)
    }

    /// Double-checked create: returns the cached instance or runs `producer`
    /// under a creation-in-progress marker. A second thread asking for the
    /// same name waits; the same thread re-entering without an early
    /// reference fails with a cycle error.
    pub fn get_or_create(
        &self,
        name: &str,
        producer: impl FnOnce() -> Result<BeanHandle>,
    ) -> Result<BeanHandle> {
        if let Some(hit) = self.get(name) {
            return Ok(hit);
        }

        let current = thread::current().id();
        let mut producer = Some(producer);
        let mut state = self.state.lock();
        loop {
            if let Some(hit) = self.get(name) {
                return Ok(hit);
            }
            let owner = state.in_creation.get(name).copied();
            match owner {
                Some(owner) if owner == current => {
                    return Err(TarkibError::Cycle(CycleError::new(
                        vec![name.to_owned(), name.to_owned()],
                        "singleton is already in creation on this thread \
                         (direct recursion without early exposure)",
                    )));
                }
                Some(_) => {
                    self.creation_done.wait(&mut state);
                }
                None => {
                    state.in_creation.insert(name.to_owned(), current);
                    break;
                }
            }
        }
        drop(state);

        debug!(bean = name, "creating singleton");
        let outcome = (producer.take().expect("producer consumed once"))();

        let mut state = self.state.lock();
        state.in_creation.remove(name);
        state.early.remove(name);
        state.factories.remove(name);
        let result = match outcome {
            Ok(bean) => {
                // The producer may have registered the singleton itself;
                // keep that instance for identity.
                let published = match self.get(name) {
                    Some(existing) => existing,
                    None => {
                        self.singletons.insert(name.to_owned(), bean.clone());
                        state.registered.push(name.to_owned());
                        bean
                    }
                };
                Ok(published)
            }
            Err(err) => {
                debug!(bean = name, %err, "singleton creation failed; state cleaned");
                Err(err)
            }
        };
        self.creation_done.notify_all();
        result
    }

    /// Installs a level-3 early-reference producer. Only legal while the
    /// name is in creation; clears any stale level-2 entry for the name.
    pub(crate) fn add_singleton_factory(&self, name: &str, producer: EarlyProducer) {
        let mut state = self.state.lock();
        if !state.in_creation.contains_key(name) {
            warn!(bean = name, "ignoring early-reference producer for a bean not in creation");
            return;
        }
        if self.singletons.contains_key(name) {
            return;
        }
        state.early.remove(name);
        state.factories.insert(name.to_owned(), producer);
    }

    pub fn is_in_creation(&self, name: &str) -> bool {
        self.state.lock().in_creation.contains_key(name)
    }

    /// Whether the current thread is the one creating `name`.
    pub fn is_in_creation_here(&self, name: &str) -> bool {
        self.state.lock().in_creation.get(name) == Some(&thread::current().id())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.singletons.contains_key(name)
    }

    /// Published singleton names, in registration order.
    pub fn singleton_names(&self) -> Vec<String> {
        self.state.lock().registered.clone()
    }

    pub fn singleton_count(&self) -> usize {
        self.singletons.len()
    }

    pub fn register_disposable(&self, adapter: DisposableAdapter) {
        let mut state = self.state.lock();
        state.disposables.push(adapter);
    }

    /// Records that `dependent` depends on `name`; both graph directions
    /// are maintained.
    pub fn register_dependent(&self, name: &str, dependent: &str) {
        let mut state = self.state.lock();
        let dependents = state.dependents.entry(name.to_owned()).or_default();
        if !dependents.iter().any(|d| d == dependent) {
            dependents.push(dependent.to_owned());
        }
        let dependencies = state.dependencies.entry(dependent.to_owned()).or_default();
        if !dependencies.iter().any(|d| d == name) {
            dependencies.push(name.to_owned());
        }
    }

    /// Beans that (directly) depend on `name`.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.state.lock().dependents.get(name).cloned().unwrap_or_default()
    }

    /// What `name` (directly) depends on.
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.state.lock().dependencies.get(name).cloned().unwrap_or_default()
    }

    /// Whether `candidate` transitively depends on `name`.
    pub fn is_dependent(&self, name: &str, candidate: &str) -> bool {
        let state = self.state.lock();
        let mut seen = Vec::new();
        Self::is_dependent_inner(&state, name, candidate, &mut seen)
    }

    fn is_dependent_inner(
        state: &RegistryState,
        name: &str,
        candidate: &str,
        seen: &mut Vec<String>,
    ) -> bool {
        if seen.iter().any(|s| s == name) {
            return false;
        }
        seen.push(name.to_owned());
        let Some(dependents) = state.dependents.get(name) else { return false };
        if dependents.iter().any(|d| d == candidate) {
            return true;
        }
        dependents
            .iter()
            .any(|d| Self::is_dependent_inner(state, d, candidate, seen))
    }

    /// Destroys one singleton: its dependents first (per the dependency
    /// graph), then its own callbacks. Errors inside callbacks are logged
    /// and swallowed by the adapter.
    pub fn destroy_singleton(&self, name: &str) {
        let adapter = {
            let mut state = self.state.lock();
            self.singletons.remove(name);
            state.early.remove(name);
            state.factories.remove(name);
            state.registered.retain(|n| n != name);
            let position = state.disposables.iter().position(|d| d.bean_name() == name);
            position.map(|i| state.disposables.remove(i))
        };

        let dependents = {
            let mut state = self.state.lock();
            state.dependents.remove(name).unwrap_or_default()
        };
        for dependent in dependents.iter().rev() {
            self.destroy_singleton(dependent);
        }

        if let Some(adapter) = adapter {
            debug!(bean = name, "destroying singleton");
            adapter.destroy();
        }

        let mut state = self.state.lock();
        for dependents in state.dependents.values_mut() {
            dependents.retain(|d| d != name);
        }
        state.dependencies.remove(name);
    }

    /// Destroys every registered disposable in reverse registration order,
    /// then clears all singleton state.
    pub fn destroy_singletons(&self) {
        debug!(count = self.singleton_count(), "destroying singletons");
        loop {
            let next = {
                let state = self.state.lock();
                state.disposables.last().map(|d| d.bean_name().to_owned())
            };
            match next {
                Some(name) => self.destroy_singleton(&name),
                None => break,
            }
        }

        let mut state = self.state.lock();
        self.singletons.clear();
        state.early.clear();
        state.factories.clear();
        state.registered.clear();
        state.dependents.clear();
        state.dependencies.clear();
    }
}

impl fmt::Debug for SingletonRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SingletonRegistry")
            .field("singletons", &self.singletons.len())
            .field("early", &state.early.len())
            .field("factories", &state.factories.len())
            .field("in_creation", &state.in_creation.len())
            .field("disposables", &state.disposables.len())
            .finish()
    }
}
