pub mod auth;
pub mod backend;
pub mod comfydeploy;
pub mod extract;
pub mod lifecycle;
pub mod registry;
pub mod runpod;
pub mod webhook_store;
