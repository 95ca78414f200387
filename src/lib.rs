pub mod catalog;
pub mod config;
pub mod memory;
pub mod storage;
