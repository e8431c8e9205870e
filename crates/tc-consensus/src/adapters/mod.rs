//! Adapters layer (Hexagonal Architecture)
//!
//! Default implementations of the outbound ports.

mod broadcaster;
mod execution;
mod serializer;
mod signature;
mod validators;

pub use broadcaster::*;
pub use execution::*;
pub use serializer::*;
pub use signature::*;
pub use validators::*;
