//! # void_core - Void Engine Core
//!
//! Zero-dependency primitives shared by every other crate:
//! - **Handles**: generational arena handles (`Handle`, `HandleMap`)
//! - **Ids**: process-unique identity for immutable shared descriptors
//!
//! Nothing here knows about properties, passes or draw calls; the arenas are
//! what lets those crates replace pointer-keyed observer graphs with owned
//! registries that tear down deterministically.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std as alloc;

pub mod handle;
pub mod id;

pub use handle::*;
pub use id::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::handle::{Handle, HandleMap};
    pub use crate::id::{Id, IdGenerator};
}
