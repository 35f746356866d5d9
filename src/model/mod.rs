pub mod common;
pub mod schema;
pub mod value;
pub mod version;

pub use common::*;
pub use schema::*;
pub use value::*;
pub use version::*;
