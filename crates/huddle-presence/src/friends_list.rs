//! Rows for the friends list panel

use huddle_core::{Coordinate, FriendIdentity, FriendRecord, distance_meters, format_distance};

/// One row of the friends list
#[derive(Debug, Clone, PartialEq)]
pub struct FriendSummary {
    pub identity: FriendIdentity,
    /// Distance from the local user, when both positions are known
    pub distance_meters: Option<f64>,
    /// "120m away", "3.4km away", "Last seen 14:05:09" or "Last seen Unknown"
    pub status_text: String,
}

/// Summarize the roster relative to the local position
///
/// Friends with a distance come first, nearest first; the rest follow by
/// display name.
pub fn summarize<'a>(
    friends: impl IntoIterator<Item = &'a FriendRecord>,
    local: Option<&Coordinate>,
) -> Vec<FriendSummary> {
    let mut rows: Vec<FriendSummary> = friends
        .into_iter()
        .map(|record| {
            let distance = local.zip(record.location.as_ref()).map(|(local, location)| {
                distance_meters(local, &location.coordinate)
            });
            let status_text = match (distance, record.identity.last_seen_at) {
                (Some(d), _) => format_distance(d),
                (None, Some(seen)) => format!("Last seen {}", seen.format("%H:%M:%S")),
                (None, None) => "Last seen Unknown".to_string(),
            };
            FriendSummary {
                identity: record.identity.clone(),
                distance_meters: distance,
                status_text,
            }
        })
        .collect();

    rows.sort_by(|a, b| match (a.distance_meters, b.distance_meters) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.identity.display_name.cmp(&b.identity.display_name),
    });
    rows
}
