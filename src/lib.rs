#[macro_use]
mod macros;

pub mod config;
pub mod debugger;
pub mod error;
pub mod mirror;
pub mod rcbm;
pub mod rte;
pub mod session;
pub mod signal;
pub mod socket;
pub mod tmg;
pub mod transcript;
