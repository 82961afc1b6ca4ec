pub mod app;
pub mod audio;
pub mod catalog;
pub mod config;
pub mod core;
pub mod logging;
pub mod model;
pub mod store;
pub mod suggest;
pub mod ui;
