pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod dashboard;
pub mod directory;
pub mod embedded_ui;
pub mod main_module;
pub mod projects;
pub mod security;
pub mod session;
pub mod shared;
pub mod tasks;
pub mod tests;
