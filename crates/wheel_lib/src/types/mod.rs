pub mod account;
pub mod enums;
pub mod events;
pub mod round;
pub mod transaction;

pub use account::*;
pub use enums::*;
pub use events::*;
pub use round::*;
pub use transaction::*;

/// Unix milliseconds, the timestamp unit used across the store.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
