//! # gatewayd-config
//!
//! Configuration parsing and validation for the gatewayd protocol gateway.
//!
//! A gateway config is a single JSON document declaring the gateway's
//! host/port, static bearer tokens and OAuth2 clients, the list of backend
//! descriptors to spawn, and rate-limit parameters. Schema validation runs
//! at startup; any violation aborts startup with a structured error.
//!
//! ## Quick Start
//!
//! ```rust
//! use gatewayd_config::{parse_config_from_str, validate_config};
//!
//! let json = r#"{
//!     "gateway": {"name": "my-gateway", "host": "0.0.0.0", "port": 8080},
//!     "backends": [
//!         {"id": "echo", "command": "echo-backend", "args": []}
//!     ]
//! }"#;
//!
//! let config = parse_config_from_str(json).expect("valid config");
//! validate_config(&config).expect("validation passes");
//!
//! assert_eq!(config.gateway.name, "my-gateway");
//! assert_eq!(config.backends.len(), 1);
//! ```

pub mod error;
pub mod parser;
pub mod types;
pub mod validator;

pub use error::{ConfigError, Result};
pub use parser::{parse_config, parse_config_from_str};
pub use types::*;
pub use validator::validate_config;
