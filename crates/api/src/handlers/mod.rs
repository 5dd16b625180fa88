pub mod annotation;
pub mod auth;
pub mod project;
