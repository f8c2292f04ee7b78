//! Configuration source implementations.

mod config_source;
mod file;

pub use config_source::KeyValueSource;
pub use file::FileSource;
