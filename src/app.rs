pub mod config;
pub mod identity;
pub mod presenter;
pub mod roster;
