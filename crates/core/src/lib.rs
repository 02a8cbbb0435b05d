//! RTSP control plane of a Wi-Fi Display (Miracast) source.
//!
//! The source listens for one sink, negotiates capabilities with it
//! (M1 to M5), serves its session requests (SETUP, PLAY, PAUSE, TEARDOWN)
//! and keeps the connection alive. Media capture and encoding stay behind
//! the [`PlaybackFactory`] seam; the host application hears about the sink
//! through a [`DisplayClientListener`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use wfd::{LoggingPlayback, SourceConfig, TracingListener, WifiDisplaySource};
//!
//! # async fn run() -> wfd::Result<()> {
//! let source = WifiDisplaySource::new(
//!     SourceConfig::default(),
//!     Arc::new(LoggingPlayback::new(15550)),
//!     Arc::new(TracingListener),
//! );
//! let addr = source.start("192.168.49.1").await?;
//! println!("listening on {addr}");
//! source.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod listener;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod source;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use error::{Result, WfdError};
pub use listener::{DisconnectReason, DisplayClientListener, DisplayInfo, TracingListener};
pub use playback::{
    LoggingPlayback, PipelineError, PlaybackFactory, PlaybackNotifier, PlaybackRequest,
    PlaybackSession,
};
pub use source::{SourceConfig, WIFI_DISPLAY_DEFAULT_PORT, WifiDisplaySource};
