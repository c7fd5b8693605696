//! Schema types shared across the sync engine

pub mod event;
pub mod record;
pub mod session;

pub use event::{CATEGORY_QUEUE, CATEGORY_REFRESH, CATEGORY_SESSION, ChangeEvent, ChangeReason};
pub use record::{
    CanonicalRecord, CanonicalSet, EntityKey, PaymentState, QueueStatus, RawSourceRecord,
};
pub use session::{Principal, Role, Session};
