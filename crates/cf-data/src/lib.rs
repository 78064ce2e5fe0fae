//! Files that surround a run: the JSON run configuration going in, and the
//! CSV table plus JSON summary coming out.

pub mod config_file;
pub mod export;

pub use config_file::*;
pub use export::*;
