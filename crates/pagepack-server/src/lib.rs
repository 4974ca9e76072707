//! Development server with live reload for pagepack.
//!
//! Serves the build from memory, watches the context directory and pushes
//! reload messages to connected pages over a WebSocket.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{DevServer, DevServerConfig, ServerError};
pub use watcher::{FileWatcher, WatchEvent};
pub use websocket::{HmrHub, HmrMessage};
