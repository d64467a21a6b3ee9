pub mod dispatcher;
pub mod models;
pub mod senders;

pub use dispatcher::{NotificationDispatcher, NotificationError};
