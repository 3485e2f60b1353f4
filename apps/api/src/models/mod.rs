pub mod analytics;
pub mod resume;
pub mod user;
