pub mod cache;
pub mod completions;
pub mod config;
pub mod replay;
