pub mod bounds;
pub mod config;
pub mod errors;
pub mod record;

pub use bounds::*;
pub use config::*;
pub use errors::*;
pub use record::*;
