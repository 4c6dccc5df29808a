//! # taskboard
//!
//! Session-aware client for the taskboard REST API.
//!
//! SYSTEM CONTEXT
//! ==============
//! `client` wraps the HTTP transport with typed auth/task calls and the 401
//! interceptor, `refresh` is the single-flight token-refresh coordinator,
//! `session` caches the signed-in user for a UI layer, and `routes` is the
//! one public/protected route policy shared by all of them.

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod navigation;
pub mod notify;
pub mod refresh;
pub mod routes;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use client::ApiClient;
pub use config::{ClientConfig, ConfigError};
pub use error::ApiError;
pub use models::{Credentials, Message, NewTask, Registration, Task, TaskFilter, TaskPatch, TokenPair, User};
pub use navigation::{MemoryNavigator, Navigator};
pub use notify::{Notification, NotificationLevel, Notifier, TracingNotifier};
pub use routes::{GateDecision, RoutePolicy};
pub use session::{Session, SessionContext};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
