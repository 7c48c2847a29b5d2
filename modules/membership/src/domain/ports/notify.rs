use async_trait::async_trait;

use crate::contract::model::Notification;
use crate::domain::error::DomainError;

/// Transport-agnostic outbound notification port.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<(), DomainError>;
}
