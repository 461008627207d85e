pub mod cli;
pub mod client;
pub mod config;
pub mod display;
pub mod error;
pub mod live;
pub mod location;
pub mod pager;
pub mod scanner;
pub mod upload;
