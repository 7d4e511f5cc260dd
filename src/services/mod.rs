pub mod applications;
pub mod deployments;
pub mod images;
pub mod platform;
pub mod users;
