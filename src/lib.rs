pub mod commands;
pub mod driver;
pub mod error;
pub mod model;
pub mod output;
pub mod phase;
pub mod service;
pub mod store;
