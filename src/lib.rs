pub mod catalog;
pub mod clock;
pub mod config;
pub mod domain;
pub mod epoch;
pub mod error;
pub mod output;
pub mod session;
pub mod store;
pub mod sync;
pub mod tle;
