// Accounts: password hashing, session and verification tokens, the user
// lifecycle service, request guards, and the auth/admin route handlers.

pub mod admin;
pub mod extractors;
pub mod handlers;
pub mod password;
pub mod service;
pub mod tokens;
