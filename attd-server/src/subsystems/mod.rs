pub mod registry;
pub mod reminder;
