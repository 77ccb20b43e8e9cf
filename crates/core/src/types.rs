/// Every accepted batch is identified by a random UUID.
pub type BatchId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Allocate a fresh batch id.
pub fn new_batch_id() -> BatchId {
    uuid::Uuid::new_v4()
}
