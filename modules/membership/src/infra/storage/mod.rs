pub mod entity;
pub mod mapper;
pub mod sqlx_repo;

pub use sqlx_repo::{migrate, SqlxMembershipRepository, SqlxNotificationSink};
