//! # domains
//!
//! Entities, invariants, error taxonomy and the storage port of the forum
//! content layer. Nothing in this crate performs I/O.

pub mod errors;
pub mod models;
pub mod paths;
pub mod policy;
pub mod ports;

pub use errors::*;
pub use models::*;
pub use policy::*;
pub use ports::*;
