//! OKX integration for the position guard.
//!
//! This crate provides:
//! - Private positions feed and public candle feed over websocket, with login,
//!   heartbeat and fixed-delay reconnect
//! - Signed REST reads (positions, latest candle, last price) for tick evaluation
//! - HMAC-SHA256 request signing
//!
//! # Example
//!
//! ```no_run
//! use position_guard_core::OkxConfig;
//! use position_guard_okx::{FeedConnection, FeedEvent, FeedSettings};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = OkxConfig::default();
//!     let (tx, mut rx) = mpsc::channel(256);
//!     let feed = FeedConnection::spawn_public(
//!         FeedSettings::public(&config),
//!         &["BTC-USDT-SWAP".to_string()],
//!         tx,
//!     );
//!
//!     while let Some(FeedEvent::Candle(candle)) = rx.recv().await {
//!         println!("{} {:?}", candle.inst_id, candle.direction());
//!     }
//!     feed.shutdown();
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod feed;
pub mod messages;

pub use client::OkxRestClient;
pub use error::OkxError;
pub use feed::{FeedConnection, FeedEvent, FeedHandle, FeedKind, FeedSettings};
pub use messages::{parse_frame, subscribe_frame, FeedFrame, SubscriptionArg};
