pub mod app;
pub mod clipboard;
pub mod config;
pub mod event;
pub mod freeze;
pub mod host;
pub mod model;
pub mod popup;
pub mod restore;
pub mod snapshot;
pub mod store;
pub mod tui;
