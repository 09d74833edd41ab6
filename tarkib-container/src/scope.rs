//! Custom scopes.
//!
//! Beyond the built-in singleton and prototype scopes, a definition may name
//! a custom scope registered on the factory. The scope owns instance
//! identity and lifetime: the container hands it a producer and lets the
//! scope decide whether to reuse a cached instance or create a fresh one.

use crate::error::Result;
use crate::value::BeanHandle;

/// A pluggable identity/lifetime policy.
pub trait CustomScope: Send + Sync {
    /// Returns the scoped instance for `name`, creating it through
    /// `producer` if this scope has none.
    fn get(&self, name: &str, producer: &dyn Fn() -> Result<BeanHandle>) -> Result<BeanHandle>;

    /// Removes and returns the scoped instance, if present.
    fn remove(&self, name: &str) -> Option<BeanHandle>;

    /// Registers a callback the scope should run when it ends the bean's
    /// lifetime.
    fn register_destruction_callback(&self, name: &str, callback: Box<dyn FnOnce() + Send>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::handle;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// A scope that caches per name until `end()` is called.
    #[derive(Default)]
    struct WindowScope {
        instances: Mutex<HashMap<String, BeanHandle>>,
        callbacks: Mutex<Vec<(String, Box<dyn FnOnce() + Send>)>>,
    }

    impl WindowScope {
        fn end(&self) {
            self.instances.lock().clear();
            let callbacks = std::mem::take(&mut *self.callbacks.lock());
            for (_, callback) in callbacks {
                callback();
            }
        }
    }

    impl CustomScope for WindowScope {
        fn get(
            &self,
            name: &str,
            producer: &dyn Fn() -> Result<BeanHandle>,
        ) -> Result<BeanHandle> {
            if let Some(existing) = self.instances.lock().get(name) {
                return Ok(existing.clone());
            }
            let created = producer()?;
            self.instances.lock().insert(name.to_owned(), created.clone());
            Ok(created)
        }

        fn remove(&self, name: &str) -> Option<BeanHandle> {
            self.instances.lock().remove(name)
        }

        fn register_destruction_callback(&self, name: &str, callback: Box<dyn FnOnce() + Send>) {
            self.callbacks.lock().push((name.to_owned(), callback));
        }
    }

    #[test]
    fn scope_caches_until_ended() {
        let scope = WindowScope::default();
        let first = scope.get("session", &|| Ok(handle(String::from("s1")))).unwrap();
        let second = scope.get("session", &|| panic!("cached")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        scope.end();
        let third = scope.get("session", &|| Ok(handle(String::from("s2")))).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn destruction_callbacks_run_on_end() {
        let scope = WindowScope::default();
        let fired = Arc::new(Mutex::new(false));
        let fired_in = fired.clone();
        scope.register_destruction_callback(
            "session",
            Box::new(move || *fired_in.lock() = true),
        );

        scope.end();
        assert!(*fired.lock());
    }

    #[test]
    fn remove_returns_instance() {
        let scope = WindowScope::default();
        scope.get("a", &|| Ok(handle(1i64))).unwrap();
        assert!(scope.remove("a").is_some());
        assert!(scope.remove("a").is_none());
    }
}
