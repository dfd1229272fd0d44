pub mod auth;
pub mod client;
pub mod events;
pub mod media;
pub mod webhook;
