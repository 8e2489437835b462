pub mod client_secret;
pub mod oauth;
pub mod token_cache;
pub mod token_manager;
