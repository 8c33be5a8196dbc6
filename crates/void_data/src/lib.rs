//! # void_data - Property Containers
//!
//! The loosely-typed property model every other system reads from:
//! - `Value`: a named property's payload
//! - `PropertyStore`: providers (name→value maps) layered into containers
//! - `PropertyEvent` / `PropertySignal`: container-level change notifications
//! - `ContainerProperty` / `DataLayers`: names resolved across the
//!   target → renderer → root precedence used by draw calls
//!
//! ## Example
//!
//! ```
//! use void_data::{PropertyStore, PropertyChange};
//!
//! let mut store = PropertyStore::new();
//! let node = store.create_container("node");
//! let material = store.create_provider("material");
//! store.add_provider(node, material).unwrap();
//!
//! store.set(material, "diffuseMap", void_data::Value::Resource(7)).unwrap();
//! let event = store.pop_event().unwrap();
//! assert_eq!(event.change, PropertyChange::Added);
//! ```

pub mod property;
pub mod signal;
pub mod store;
pub mod value;

pub use property::{ContainerProperty, DataLayers};
pub use signal::{PropertyChange, PropertyEvent, PropertySignal};
pub use store::{Container, ContainerHandle, PropertyStore, Provider, ProviderHandle};
pub use value::Value;

use thiserror::Error;

/// Errors from the property store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("Provider not found: {0:?}")]
    ProviderNotFound(ProviderHandle),

    #[error("Container not found: {0:?}")]
    ContainerNotFound(ContainerHandle),

    #[error("Provider {provider:?} is already layered into {container:?}")]
    AlreadyLayered {
        provider: ProviderHandle,
        container: ContainerHandle,
    },

    #[error("Provider {provider:?} is not layered into {container:?}")]
    NotLayered {
        provider: ProviderHandle,
        container: ContainerHandle,
    },
}

/// Result alias for property store operations
pub type Result<T> = std::result::Result<T, DataError>;

/// Prelude
pub mod prelude {
    pub use crate::{
        ContainerHandle, ContainerProperty, DataError, DataLayers, PropertyChange, PropertyEvent,
        PropertySignal, PropertyStore, ProviderHandle, Value,
    };
}
