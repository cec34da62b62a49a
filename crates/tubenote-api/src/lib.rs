pub mod auth;
pub mod config;
pub mod cookies;
pub mod error;
pub mod extract;
pub mod mail;
pub mod middleware;
pub mod notes;
pub mod passwords;
pub mod ratelimit;
pub mod router;
pub mod session;
pub mod state;
pub mod tokens;
pub mod users;
pub mod validate;
pub mod videos;
pub mod youtube;

pub use router::router;
