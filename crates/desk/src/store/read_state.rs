//! Unread computation

use chrono::{DateTime, Utc};

use crate::models::ReadMarker;

/// Whether a ticket modified at `modified_time` is unread given the agent's marker.
///
/// Unread when there is no marker, the marker has never been stamped, or the
/// ticket changed after it was last read.
pub fn is_unread(modified_time: DateTime<Utc>, marker: Option<&ReadMarker>) -> bool {
    match marker.and_then(|m| m.last_read) {
        Some(last_read) => modified_time > last_read,
        None => true,
    }
}
