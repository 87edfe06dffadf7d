#![deny(clippy::style)]
#![deny(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod compat;
pub mod config;
pub mod stream;

pub use config::Config;
