// Configuration loading

pub mod error;
pub mod settings;

pub use error::ConfigError;
pub use settings::{
    ConnectionConfig, ExportConfig, ExporterConfig, MatchingConfig, PathsConfig, ReferenceConfig,
    Settings, REFERENCE_ENTITIES,
};
