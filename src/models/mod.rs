pub mod error;
pub mod events;
