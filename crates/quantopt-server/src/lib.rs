pub mod api;
pub mod config;
pub mod router;
pub mod static_assets;
pub mod ws;
