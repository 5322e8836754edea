pub mod cors;
pub mod env;
pub mod extract;
