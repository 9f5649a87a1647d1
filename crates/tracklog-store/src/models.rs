//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One location update stored in the database.
///
/// Records are immutable once written. The payload is kept verbatim as the
/// bytes that arrived on the wire; no parsing or validation happens here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// MQTT topic the update arrived on.
    pub topic: String,
    /// When the store accepted the update (assigned at insert, not by the
    /// publisher).
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    /// Raw message payload.
    pub payload: Vec<u8>,
}
