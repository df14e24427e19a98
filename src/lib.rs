#![allow(clippy::manual_unwrap_or_default)]
#![allow(clippy::manual_unwrap_or)]

pub mod cli;
pub mod client;
pub mod constants;
pub mod db;
pub mod health;
pub mod ingress;
pub mod logging;
pub mod main_helper;
pub mod ndjson_layer;
pub mod permissions;
pub mod prefs;
pub mod redaction_layer;
pub mod relay;
pub mod server;
pub mod specs;
pub mod str_utils;
pub mod streaming;
pub mod tool_schema;
pub mod types;
pub mod wallet;

pub use types::*;

pub use main_helper::{AppState, Credentials, ServeArgs};
