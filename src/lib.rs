pub mod config;
pub mod db;
pub mod error;
pub mod eval;
pub mod features;
pub mod model;
pub mod pipeline;

pub use error::Error;
