//! Helpers shared by the scopeflow engine: template formatting, value
//! coercion, sensitive-key masking, configuration loading, logging setup, and
//! the blocking bridge into Tokio used by the parallel worker pool.

pub mod async_runtime;
pub mod config;
pub mod logging;
pub mod text_processing;

pub use async_runtime::block_on_future;
pub use config::{CONFIG_PATH_ENV, ConfigError, EngineConfig, FatalPolicy};
pub use logging::init_tracing;
pub use text_processing::{TemplateError, display_value, format_template, human_join, is_truthy, mask_sensitive};
