//! The dependency container

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::entry::{Entry, Provider, Registration};
use crate::error::{ContainerError, Result};

static GLOBAL: Lazy<Container> = Lazy::new(Container::new);

#[derive(Default)]
struct Registry {
    by_type: HashMap<TypeId, Vec<Arc<Registration>>>,
    by_name: HashMap<String, Arc<Registration>>,
    len: usize,
}

/// Type- and name-indexed registry of providers.
///
/// Entries are only ever appended, so an entry's index under its capability
/// never changes until [`Container::clear`]. Lookups take a read lock;
/// factories run after it is released and may resolve from the same
/// container.
#[derive(Default)]
pub struct Container {
    registry: RwLock<Registry>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide container
    pub fn global() -> &'static Container {
        &GLOBAL
    }

    /// Register one entry
    pub fn provide<I>(&self, entry: Entry<I>) -> Result<()>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.provide_all([Registration::from(entry)])
    }

    /// Register a batch of entries atomically.
    ///
    /// Either every entry becomes visible or, on error, none does.
    pub fn provide_all<R>(&self, registrations: R) -> Result<()>
    where
        R: IntoIterator<Item = Registration>,
    {
        let batch: Vec<Registration> = registrations.into_iter().collect();

        for registration in &batch {
            validate_name(registration)?;
        }

        let mut registry = self.registry.write();

        let mut batch_names: HashMap<&str, &'static str> = HashMap::new();
        for registration in &batch {
            let Some(name) = registration.name.as_deref() else {
                continue;
            };

            let existing = registry
                .by_name
                .get(name)
                .map(|existing| existing.capability)
                .or_else(|| batch_names.get(name).copied());

            if let Some(existing) = existing {
                return Err(ContainerError::DuplicateName {
                    name: name.to_string(),
                    existing: existing.to_string(),
                });
            }
            batch_names.insert(name, registration.capability);
        }

        for registration in batch {
            let registration = Arc::new(registration);
            let entries = registry.by_type.entry(registration.type_id).or_default();
            entries.push(registration.clone());

            info!(
                capability = registration.capability,
                name = registration.name.as_deref().unwrap_or("-"),
                lifetime = %registration.lifetime,
                index = entries.len() - 1,
                "Registered entry"
            );

            if let Some(name) = &registration.name {
                registry.by_name.insert(name.clone(), registration.clone());
            }
            registry.len += 1;
        }

        Ok(())
    }

    /// Resolve the first entry registered for `I`
    pub fn resolve<I>(&self) -> Result<Arc<I>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.resolve_at::<I>(0)
    }

    /// Resolve the `index`-th entry registered for `I`, in insertion order
    pub fn resolve_at<I>(&self, index: usize) -> Result<Arc<I>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let registration = self
            .registry
            .read()
            .by_type
            .get(&TypeId::of::<I>())
            .and_then(|entries| entries.get(index))
            .cloned()
            .ok_or_else(|| ContainerError::NotFound(format!("{}[{}]", type_name::<I>(), index)))?;

        self.instantiate::<I>(&registration)
    }

    /// Resolve the entry registered under `name`
    pub fn resolve_named<I>(&self, name: &str) -> Result<Arc<I>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let registration = self
            .registry
            .read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::NotFound(format!("'{}'", name)))?;

        if registration.type_id != TypeId::of::<I>() {
            return Err(ContainerError::TypeMismatch {
                name: name.to_string(),
                requested: type_name::<I>().to_string(),
                registered: registration.capability.to_string(),
            });
        }

        self.instantiate::<I>(&registration)
    }

    /// Resolve every entry registered for `I`, in insertion order
    pub fn resolve_all<I>(&self) -> Result<Vec<Arc<I>>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let registrations = self
            .registry
            .read()
            .by_type
            .get(&TypeId::of::<I>())
            .cloned()
            .unwrap_or_default();

        registrations
            .iter()
            .map(|registration| self.instantiate::<I>(registration))
            .collect()
    }

    /// Number of entries registered for `I`
    pub fn count<I>(&self) -> usize
    where
        I: ?Sized + 'static,
    {
        self.registry
            .read()
            .by_type
            .get(&TypeId::of::<I>())
            .map_or(0, Vec::len)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.registry.read().by_name.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.read().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.registry.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry
    pub fn clear(&self) {
        *self.registry.write() = Registry::default();
        debug!("Container cleared");
    }

    fn instantiate<I>(&self, registration: &Registration) -> Result<Arc<I>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        match registration.provider::<I>() {
            Some(Provider::Instance(instance)) => Ok(instance.clone()),
            Some(Provider::Factory(factory)) => {
                factory(self).map_err(|error| ContainerError::FactoryFailed {
                    capability: registration.capability.to_string(),
                    source: error.into(),
                })
            }
            None => Err(ContainerError::TypeMismatch {
                name: registration.name.clone().unwrap_or_default(),
                requested: type_name::<I>().to_string(),
                registered: registration.capability.to_string(),
            }),
        }
    }
}

fn validate_name(registration: &Registration) -> Result<()> {
    let Some(name) = registration.name.as_deref() else {
        return Ok(());
    };

    let reason = if name.is_empty() {
        "name must not be empty"
    } else if name.chars().any(char::is_whitespace) {
        "name must not contain whitespace"
    } else {
        return Ok(());
    };

    Err(ContainerError::InvalidEntry {
        capability: registration.capability.to_string(),
        reason: reason.to_string(),
    })
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("entries", &self.len())
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    impl std::fmt::Debug for dyn Greeter {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("dyn Greeter")
        }
    }

    struct Fixed(&'static str);

    impl Greeter for Fixed {
        fn greet(&self) -> String {
            self.0.to_string()
        }
    }

    trait Counter: Send + Sync {
        fn value(&self) -> usize;
    }

    impl std::fmt::Debug for dyn Counter {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("dyn Counter")
        }
    }

    struct Snapshot(usize);

    impl Counter for Snapshot {
        fn value(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn test_singleton_resolves_to_same_instance() {
        let container = Container::new();
        container
            .provide(Entry::<dyn Greeter>::singleton(Arc::new(Fixed("hello"))))
            .unwrap();

        let first = container.resolve::<dyn Greeter>().unwrap();
        let second = container.resolve::<dyn Greeter>().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.greet(), "hello");
    }

    #[test]
    fn test_factory_resolves_to_fresh_values() {
        let container = Container::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        container
            .provide(Entry::<dyn Counter>::factory(move |_| {
                Arc::new(Snapshot(counter.fetch_add(1, Ordering::SeqCst))) as Arc<dyn Counter>
            }))
            .unwrap();

        let first = container.resolve::<dyn Counter>().unwrap();
        let second = container.resolve::<dyn Counter>().unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!((first.value(), second.value()), (0, 1));
    }

    #[test]
    fn test_unknown_type_and_name_are_not_found() {
        let container = Container::new();

        assert!(matches!(
            container.resolve::<dyn Greeter>(),
            Err(ContainerError::NotFound(_))
        ));
        assert!(matches!(
            container.resolve_named::<dyn Greeter>("missing"),
            Err(ContainerError::NotFound(_))
        ));

        container
            .provide(Entry::<dyn Greeter>::singleton(Arc::new(Fixed("a"))))
            .unwrap();
        assert!(matches!(
            container.resolve_at::<dyn Greeter>(1),
            Err(ContainerError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_name_rejected_across_types() {
        let container = Container::new();
        container
            .provide(Entry::<dyn Greeter>::singleton(Arc::new(Fixed("a"))).named("primary"))
            .unwrap();

        let error = container
            .provide(Entry::<dyn Counter>::singleton(Arc::new(Snapshot(1))).named("primary"))
            .unwrap_err();

        assert!(matches!(error, ContainerError::DuplicateName { ref name, .. } if name == "primary"));
        assert_eq!(container.count::<dyn Counter>(), 0);
    }

    #[test]
    fn test_failed_batch_leaves_no_trace() {
        let container = Container::new();
        container
            .provide(Entry::<dyn Greeter>::singleton(Arc::new(Fixed("a"))).named("taken"))
            .unwrap();

        let result = container.provide_all([
            Registration::from(Entry::<dyn Greeter>::singleton(Arc::new(Fixed("b")))),
            Registration::from(
                Entry::<dyn Counter>::singleton(Arc::new(Snapshot(2))).named("fresh"),
            ),
            Registration::from(
                Entry::<dyn Greeter>::singleton(Arc::new(Fixed("c"))).named("taken"),
            ),
        ]);

        assert!(matches!(result, Err(ContainerError::DuplicateName { .. })));
        assert_eq!(container.len(), 1);
        assert_eq!(container.count::<dyn Greeter>(), 1);
        assert!(!container.contains_name("fresh"));
    }

    #[test]
    fn test_duplicate_within_batch_is_rejected() {
        let container = Container::new();

        let result = container.provide_all([
            Registration::from(Entry::<dyn Greeter>::singleton(Arc::new(Fixed("a"))).named("x")),
            Registration::from(Entry::<dyn Counter>::singleton(Arc::new(Snapshot(0))).named("x")),
        ]);

        assert!(matches!(result, Err(ContainerError::DuplicateName { .. })));
        assert!(container.is_empty());
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let container = Container::new();

        for name in ["", "two words", "tab\there"] {
            let result =
                container.provide(Entry::<dyn Greeter>::singleton(Arc::new(Fixed("a"))).named(name));
            assert!(matches!(result, Err(ContainerError::InvalidEntry { .. })));
        }
        assert!(container.is_empty());
    }

    #[test]
    fn test_named_lookup_checks_capability() {
        let container = Container::new();
        container
            .provide(Entry::<dyn Greeter>::singleton(Arc::new(Fixed("a"))).named("greeter"))
            .unwrap();

        let error = container.resolve_named::<dyn Counter>("greeter").unwrap_err();

        assert!(matches!(error, ContainerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_factory_can_resolve_dependencies() {
        let container = Container::new();
        container
            .provide(Entry::<dyn Counter>::singleton(Arc::new(Snapshot(41))))
            .unwrap();
        container
            .provide(Entry::<dyn Greeter>::try_factory(|c: &Container| {
                let counter = c.resolve::<dyn Counter>()?;
                let greeting: &'static str = if counter.value() == 41 { "41" } else { "?" };
                Ok(Arc::new(Fixed(greeting)) as Arc<dyn Greeter>)
            }))
            .unwrap();

        assert_eq!(container.resolve::<dyn Greeter>().unwrap().greet(), "41");
    }

    #[test]
    fn test_factory_failure_is_reported() {
        let container = Container::new();
        container
            .provide(Entry::<dyn Greeter>::try_factory(|_| {
                Err(anyhow::anyhow!("backend offline"))
            }))
            .unwrap();

        let error = container.resolve::<dyn Greeter>().unwrap_err();

        assert!(matches!(error, ContainerError::FactoryFailed { .. }));
        assert!(error.to_string().contains("backend offline"));
    }

    #[test]
    fn test_resolve_all_and_clear() {
        let container = Container::new();
        container
            .provide_all([
                Registration::from(Entry::<dyn Greeter>::singleton(Arc::new(Fixed("a")))),
                Registration::from(Entry::<dyn Greeter>::singleton(Arc::new(Fixed("b"))).named("b")),
            ])
            .unwrap();

        let greetings: Vec<String> = container
            .resolve_all::<dyn Greeter>()
            .unwrap()
            .iter()
            .map(|greeter| greeter.greet())
            .collect();
        assert_eq!(greetings, vec!["a", "b"]);
        assert_eq!(container.names(), vec!["b".to_string()]);

        container.clear();
        assert!(container.is_empty());
        assert!(container.resolve_all::<dyn Greeter>().unwrap().is_empty());
    }
}
