//! Configuration system: schema, loading, and env var overrides.
//!
//! # Usage
//! ```no_run
//! use modelkit_core::config;
//!
//! let cfg = config::load_config(None);
//! println!("timeout: {}s", cfg.http.timeout_secs);
//! ```

pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::{
    DiagnosticsConfig, HttpConfig, ModelKitConfig, ProbeConfig, ProviderOverride,
    ProvidersConfig,
};
