//! The overlay page side of the process: surface operations, the
//! notification sound and the HTTP server that feeds attached pages.

pub mod server;
pub mod sound;
pub mod surface;
