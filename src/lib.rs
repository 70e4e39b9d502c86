pub mod browser;
pub mod cache;
pub mod cli;
pub mod config;
pub mod display;
pub mod models;
pub mod providers;
pub mod ui;
pub mod worker;
