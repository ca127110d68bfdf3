//! Dependency container for Bulwark
//!
//! Implementations are registered under a capability type, usually a
//! `dyn Trait`, either as a shared instance (singleton) or as a constructor
//! run on every resolution (factory). Several entries may share a capability;
//! they are addressed by insertion index or by a container-wide unique name.
//!
//! ```ignore
//! let container = Container::new();
//! container.provide(Entry::<dyn Clock>::singleton(Arc::new(SystemClock)))?;
//! let clock = container.resolve::<dyn Clock>()?;
//! ```

pub mod container;
pub mod entry;
pub mod error;

pub use container::Container;
pub use entry::{Entry, Lifetime, Registration};
pub use error::{ContainerError, Result};
