//! Lazily evaluated functions with recorded provenance.
//!
//! Callables are bound argument by argument into immutable nodes, each one
//! remembering how it was built. A [`Dispatcher`] reduces nodes to values
//! through the first registered strategy that fits, caching results under
//! identifiers derived from that history.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod function;
pub mod identifier;
mod paths;
pub mod provenance;
pub mod remote;

pub use catalog::Catalog;
pub use config::Config;
pub use dispatch::{Dispatcher, Selector};
pub use error::{Error, Result};
pub use function::{Argument, Node, NodeKind, Payload, Value, ValueKind};
pub use identifier::Identifier;
pub use remote::Loader;
