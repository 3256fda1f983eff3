pub mod config;
pub mod discovery;
pub mod errors;
pub mod facade;
pub mod models;
pub mod traits;
pub mod validation;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use config::*;
pub use discovery::*;
pub use errors::*;
pub use facade::*;
pub use models::*;
pub use traits::*;
pub use validation::*;
