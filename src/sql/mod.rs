//! SQL statements handed to the executor: identifiers from mappings only, values as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
