//! Insight Client - Main Library
//!
//! Resilient request/response client for the insight analysis backend.
//!
//! ## Architecture
//!
//! - **insight_socket**: messaging layer (re-exported from workspace)
//! - **config**: YAML settings with environment overrides
//! - **logging**: tracing initialisation for binaries
//! - **bin_common**: Common utilities for binary executables (CLI)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use insight_client::bin_common::{load_config_from_env, ConfigType};
//! use insight_client::config::ClientSettings;
//!
//! let settings = ClientSettings::load(load_config_from_env(ConfigType::Client))?;
//! let client = settings.builder().build()?;
//! ```

// Re-export workspace libraries for convenience
pub use insight_socket;

pub mod config;
pub mod logging;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
}
