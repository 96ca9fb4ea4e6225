pub mod activity;
pub mod project;
pub mod request;
pub mod user;
