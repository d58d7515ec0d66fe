pub mod auth;
pub mod chat;
pub mod conversations;
pub mod error;
pub mod generate;
pub mod google;
pub mod middleware;
pub mod state;
