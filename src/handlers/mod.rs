pub mod applications;
pub mod audit;
pub mod auth;
pub mod deployments;
pub mod health;
pub mod platform;
pub mod users;
pub mod images;
