//! Client core of the marketplace messenger: paginated transcript assembly,
//! live message merging and local read state.

pub mod common;
pub mod config;
pub mod error;
pub mod network;
pub mod notifications;
pub mod storage;
pub mod transcript;
pub mod ui;

pub use error::{ChatError, Result};
