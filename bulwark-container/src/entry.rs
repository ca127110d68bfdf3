//! Registry entries

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::container::Container;

/// How resolution produces a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// One instance, captured at registration and shared by every resolution
    Singleton,
    /// A fresh instance from the constructor on every resolution
    Factory,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Singleton => write!(f, "singleton"),
            Lifetime::Factory => write!(f, "factory"),
        }
    }
}

type FactoryFn<I> = dyn Fn(&Container) -> anyhow::Result<Arc<I>> + Send + Sync;

pub(crate) enum Provider<I: ?Sized> {
    Instance(Arc<I>),
    Factory(Arc<FactoryFn<I>>),
}

/// A provider bound to capability `I`.
///
/// `I` is typically a trait object. An `Entry<dyn Store>` can only be built
/// from an `Arc<T>` where `T: Store`, so the compiler checks that the payload
/// implements the capability.
pub struct Entry<I: ?Sized + Send + Sync + 'static> {
    name: Option<String>,
    provider: Provider<I>,
}

impl<I: ?Sized + Send + Sync + 'static> Entry<I> {
    /// Share `instance` with every resolution
    pub fn singleton(instance: Arc<I>) -> Self {
        Self {
            name: None,
            provider: Provider::Instance(instance),
        }
    }

    /// Build a new value on every resolution
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&Container) -> Arc<I> + Send + Sync + 'static,
    {
        Self::try_factory(move |container| Ok(factory(container)))
    }

    /// Build a new value on every resolution with a constructor that may fail
    pub fn try_factory<F>(factory: F) -> Self
    where
        F: Fn(&Container) -> anyhow::Result<Arc<I>> + Send + Sync + 'static,
    {
        Self {
            name: None,
            provider: Provider::Factory(Arc::new(factory)),
        }
    }

    /// Make the entry addressable by `name`
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn lifetime(&self) -> Lifetime {
        match self.provider {
            Provider::Instance(_) => Lifetime::Singleton,
            Provider::Factory(_) => Lifetime::Factory,
        }
    }
}

impl<I: ?Sized + Send + Sync + 'static> fmt::Debug for Entry<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("capability", &type_name::<I>())
            .field("name", &self.name)
            .field("lifetime", &self.lifetime())
            .finish()
    }
}

/// An [`Entry`] with its capability type erased, ready for
/// [`Container::provide_all`]
pub struct Registration {
    pub(crate) type_id: TypeId,
    pub(crate) capability: &'static str,
    pub(crate) name: Option<String>,
    pub(crate) lifetime: Lifetime,
    pub(crate) provider: Box<dyn Any + Send + Sync>,
}

impl Registration {
    /// Type name of the capability
    pub fn capability(&self) -> &'static str {
        self.capability
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub(crate) fn provider<I: ?Sized + Send + Sync + 'static>(&self) -> Option<&Provider<I>> {
        self.provider.downcast_ref::<Provider<I>>()
    }
}

impl<I: ?Sized + Send + Sync + 'static> From<Entry<I>> for Registration {
    fn from(entry: Entry<I>) -> Self {
        let lifetime = entry.lifetime();
        Self {
            type_id: TypeId::of::<I>(),
            capability: type_name::<I>(),
            name: entry.name,
            lifetime,
            provider: Box::new(entry.provider),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("capability", &self.capability)
            .field("name", &self.name)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}
