pub mod config;
pub mod defaults;
pub mod discovery;
pub mod error;
pub mod run;
pub mod serve;
pub mod target;
pub mod validation;
pub mod watch;

// Re-export main types
pub use config::*;
pub use error::*;
pub use run::*;
pub use serve::*;
pub use target::*;
pub use watch::*;

// Re-export discovery and validation
pub use discovery::{
    discover, load_file, read_value, ConfigDiscovery, CONFIG_FILE_NAME, PACKAGE_JSON_FIELD,
};
pub use validation::{validate, validate_fs, validate_run, validate_serve, validate_target};
