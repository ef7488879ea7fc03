pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod feed;
pub mod market;
pub mod monitor;
pub mod notify;

pub use error::CryptoWatchError;
