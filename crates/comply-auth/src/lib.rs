//! Comply Auth: password login, EdDSA session tokens and resolution of
//! inbound credentials into an [`AccessContext`](comply_core::context::AccessContext).

pub mod config;
pub mod error;
pub mod password;
pub mod resolver;
pub mod service;
pub mod token;

pub use config::{AuthConfig, DevBypassConfig, Environment};
pub use error::AuthError;
pub use resolver::{AccessContextResolver, InboundCredentials};
pub use service::{AuthService, LoginInput, LoginOutput};
pub use token::SessionClaims;
