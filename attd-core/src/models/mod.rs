pub mod session;

pub use session::{ApiEnvelope, SessionData, SessionTimes};
