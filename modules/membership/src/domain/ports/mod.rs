pub mod clock;
pub mod notify;

pub use clock::{Clock, SystemClock};
pub use notify::NotificationPort;
