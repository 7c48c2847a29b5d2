pub mod client;
pub mod error;
pub mod model;

pub use client::MembershipApi;
pub use error::MembershipError;
pub use model::*;
