pub mod catalog;
pub mod clean;
pub mod config;
pub mod data_io;
pub mod extract;
pub mod interp;
pub mod math;
pub mod sample;
pub mod time_utils;
pub mod tracks;

pub use time_utils::*;
