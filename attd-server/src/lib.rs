pub mod router;
pub mod server;
pub mod subsystems;
