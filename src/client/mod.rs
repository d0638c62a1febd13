//! Async client driver.

mod connection;

pub use connection::*;
