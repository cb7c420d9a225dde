pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod ipc;
pub mod models;
pub mod notify;

pub use api::{ApiError, HackHourClient, RawResponse, SessionApi};
pub use config::{AttdConfig, OverlapPolicy};
pub use error::AttdError;
pub use ipc::{Command, ProtocolError, Reply};
pub use models::SessionTimes;
pub use notify::{NotificationSink, Notifier};
