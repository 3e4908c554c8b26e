//! # Punchcard WebSocket transport
//!
//! A [`PushTransport`](punchcard_core::PushTransport) over a native (non-browser) WebSocket.
//!
//! ## Lazy connection
//!
//! Nothing happens until the first listener registers or `connect` is called. From then on
//! the transport keeps a connection open, reconnecting with exponential backoff whenever it
//! is lost.
//!
//! ## Registration
//!
//! The identity set with `set_user_id` is sent as a `register_user` frame right after every
//! successful connection, so a reconnect never leaves the server without it.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! # use punchcard_core::{config::WalletConfig, WalletRuntime};
//! # use punchcard_websocket_client::{TransportConfig, WebsocketTransport};
//! # use std::sync::Arc;
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = Arc::new(WebsocketTransport::new("ws://localhost:8080/ws", TransportConfig::default())?);
//!     let runtime = WalletRuntime::new(transport.clone(), WalletConfig::default());
//!
//!     runtime.login("user-1".into());
//!     transport.wait_connected().await;
//!
//!     // render runtime.presentation().cards() ...
//!
//!     runtime.shutdown().await;
//!     transport.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod client;

pub use client::{TransportError, WebsocketTransport};
pub use punchcard_core::config::TransportConfig;

pub use tokio_tungstenite::tungstenite::Error as TungsteniteError;
