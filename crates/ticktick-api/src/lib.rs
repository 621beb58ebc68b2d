//! HTTP client for the TickTick Open API, plus OAuth2 token handling.

pub mod client;
pub mod oauth;

pub use client::TickTickClient;
pub use oauth::{AccessToken, CredentialProvider, OAuthClient};
