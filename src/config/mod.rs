//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → GuardChain::from_config
//!
//! On file change (--watch):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new GuardChain built and swapped in atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - An invalid reload is logged and ignored; the running chain stays

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BlacklistGuardConfig, CacheBackend, CacheConfig, ClientIpConfig, GatewayConfig,
    GuardsConfig, HeaderGuardConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    RateLimitConfig, TimeoutConfig,
};
pub use watcher::ConfigWatcher;
