//! Clients for the scan backend.
//!
//! - [`api`]: the remote functions (compile, dispatch, check, feedback,
//!   recalibrate) over HTTP.
//! - [`session`]: an auth session that refreshes its access token.
//! - [`realtime`]: the change feed over the realtime WebSocket.

pub mod api;
pub mod config;
pub mod messages;
pub mod realtime;
pub mod session;

pub use api::EdgeFunctionsClient;
pub use config::ClientConfig;
pub use realtime::RealtimeFeed;
pub use session::RefreshingSession;
