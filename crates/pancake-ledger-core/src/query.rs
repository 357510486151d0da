//! Query descriptors for the secondary index.
//!
//! A [`PacketQuery`] is a conjunctive filter plus a page request. Stores
//! execute it; this module owns the parts every backend must agree on:
//! validation, the per-packet predicate, ordering and the cursor rule.
//!
//! Results are ordered newest first by `(timestamp, id)`. The cursor is the
//! id of the last item of a page, and the next page holds the items strictly
//! after it in that order.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::packet::Packet;
use crate::types::{GeoId, PacketId};

/// Page size used when the caller does not pick one.
pub const DEFAULT_LIMIT: i64 = 50;

/// Filters and paging for a packet scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketQuery {
    /// Match the primary geoid or any secondary index row.
    pub geoid: Option<GeoId>,
    pub packet_type: Option<String>,
    /// Inclusive lower bound on the header timestamp.
    pub time_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the header timestamp.
    pub time_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the packet's search text.
    pub keyword: Option<String>,
    /// Restrict to packets posted in one of these threads.
    pub thread_ids: Option<Vec<String>>,
    /// Signed so that a bad request can be represented and rejected.
    pub limit: i64,
    pub cursor: Option<PacketId>,
}

impl Default for PacketQuery {
    fn default() -> Self {
        Self {
            geoid: None,
            packet_type: None,
            time_from: None,
            time_to: None,
            keyword: None,
            thread_ids: None,
            limit: DEFAULT_LIMIT,
            cursor: None,
        }
    }
}

impl PacketQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geoid(mut self, geoid: impl Into<GeoId>) -> Self {
        self.geoid = Some(geoid.into());
        self
    }

    pub fn packet_type(mut self, packet_type: impl Into<String>) -> Self {
        self.packet_type = Some(packet_type.into());
        self
    }

    pub fn time_from(mut self, from: DateTime<Utc>) -> Self {
        self.time_from = Some(from);
        self
    }

    pub fn time_to(mut self, to: DateTime<Utc>) -> Self {
        self.time_to = Some(to);
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn thread_ids<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.thread_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn cursor(mut self, cursor: PacketId) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Check the request and return the page size.
    pub fn validate(&self) -> Result<usize, ValidationError> {
        if self.limit <= 0 {
            return Err(ValidationError::BadRequest(format!(
                "limit must be positive, got {}",
                self.limit
            )));
        }
        if let (Some(from), Some(to)) = (self.time_from, self.time_to) {
            if from > to {
                return Err(ValidationError::BadRequest(
                    "time_from is after time_to".into(),
                ));
            }
        }
        usize::try_from(self.limit)
            .map_err(|_| ValidationError::BadRequest("limit out of range".into()))
    }

    /// Lowercased keyword, if a non-empty one was given.
    pub fn normalized_keyword(&self) -> Option<String> {
        self.keyword
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase)
    }

    /// Whether `packet` passes every filter. Cursor position is not
    /// considered here; see [`SortKey::is_after`].
    ///
    /// `secondary_geoids` are the packet's extra index rows.
    pub fn matches(&self, packet: &Packet, secondary_geoids: &[GeoId]) -> bool {
        if let Some(geoid) = &self.geoid {
            if packet.geoid() != geoid && !secondary_geoids.contains(geoid) {
                return false;
            }
        }

        if let Some(packet_type) = &self.packet_type {
            if packet.packet_type() != packet_type {
                return false;
            }
        }

        // Compared at millisecond resolution, like the stored index.
        if self.time_from.is_some() || self.time_to.is_some() {
            let Some(observed) = packet.observed_at().map(|t| t.timestamp_millis()) else {
                return false;
            };
            if self
                .time_from
                .is_some_and(|from| observed < from.timestamp_millis())
            {
                return false;
            }
            if self.time_to.is_some_and(|to| observed > to.timestamp_millis()) {
                return false;
            }
        }

        if let Some(keyword) = self.normalized_keyword() {
            let hit = packet
                .search_text()
                .is_some_and(|text| text.to_lowercase().contains(&keyword));
            if !hit {
                return false;
            }
        }

        if let Some(threads) = &self.thread_ids {
            match packet.thread_id() {
                Some(thread) if threads.iter().any(|t| t == thread) => {}
                _ => return false,
            }
        }

        true
    }
}

/// Position of a packet in result order.
///
/// Packets with an unparseable timestamp sort as the oldest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub timestamp_ms: i64,
    pub id: PacketId,
}

impl SortKey {
    pub fn of(packet: &Packet) -> Self {
        Self {
            timestamp_ms: timestamp_millis(packet),
            id: packet.id(),
        }
    }

    /// `true` if `self` comes strictly after `cursor` in result order.
    pub fn is_after(&self, cursor: &SortKey) -> bool {
        self.result_order(cursor) == Ordering::Greater
    }

    /// Newest first, ties broken by id descending.
    pub fn result_order(&self, other: &SortKey) -> Ordering {
        other
            .timestamp_ms
            .cmp(&self.timestamp_ms)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Header timestamp in epoch milliseconds, `i64::MIN` when unparseable.
pub fn timestamp_millis(packet: &Packet) -> i64 {
    packet
        .observed_at()
        .map(|t| t.timestamp_millis())
        .unwrap_or(i64::MIN)
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Pass back to fetch the next page. `None` on the last page.
    pub next_cursor: Option<PacketId>,
}

impl<T> Page<T> {
    /// Build a page from up to `limit + 1` ordered rows. The extra row, if
    /// present, only signals that another page exists.
    pub fn from_probe(mut rows: Vec<T>, limit: usize, id_of: impl Fn(&T) -> PacketId) -> Self {
        let next_cursor = if rows.len() > limit {
            rows.truncate(limit);
            rows.last().map(&id_of)
        } else {
            None
        };
        Self {
            items: rows,
            next_cursor,
        }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketBuilder;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn chat(text: &str, thread: &str, at: DateTime<Utc>) -> Packet {
        PacketBuilder::new(
            "chat_message",
            GeoId::new("geo-a"),
            json!({"text": text, "thread_id": thread, "attachments": []}),
        )
        .now(at)
        .build()
    }

    #[test]
    fn test_limit_validation() {
        assert_eq!(PacketQuery::new().validate(), Ok(50));
        assert_eq!(PacketQuery::new().limit(2).validate(), Ok(2));
        assert!(matches!(
            PacketQuery::new().limit(0).validate(),
            Err(ValidationError::BadRequest(_))
        ));
        assert!(matches!(
            PacketQuery::new().limit(-5).validate(),
            Err(ValidationError::BadRequest(_))
        ));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let q = PacketQuery::new()
            .time_from(t0())
            .time_to(t0() - Duration::seconds(1));
        assert!(matches!(q.validate(), Err(ValidationError::BadRequest(_))));
    }

    #[test]
    fn test_geoid_matches_primary_or_secondary() {
        let packet = chat("hi", "t-1", t0());
        let q = PacketQuery::new().geoid("geo-b");
        assert!(!q.matches(&packet, &[]));
        assert!(q.matches(&packet, &[GeoId::new("geo-b")]));
        assert!(PacketQuery::new().geoid("geo-a").matches(&packet, &[]));
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let packet = chat("hi", "t-1", t0());
        assert!(PacketQuery::new()
            .geoid("geo-a")
            .packet_type("chat_message")
            .matches(&packet, &[]));
        assert!(!PacketQuery::new()
            .geoid("geo-a")
            .packet_type("note")
            .matches(&packet, &[]));
    }

    #[test]
    fn test_time_window_inclusive() {
        let packet = chat("hi", "t-1", t0());
        assert!(PacketQuery::new().time_from(t0()).time_to(t0()).matches(&packet, &[]));
        assert!(!PacketQuery::new()
            .time_from(t0() + Duration::milliseconds(1))
            .matches(&packet, &[]));
        assert!(!PacketQuery::new()
            .time_to(t0() - Duration::milliseconds(1))
            .matches(&packet, &[]));
    }

    #[test]
    fn test_keyword_case_insensitive_substring() {
        let packet = chat("Found APHIDS near the gate", "t-1", t0());
        assert!(PacketQuery::new().keyword("aphid").matches(&packet, &[]));
        assert!(PacketQuery::new().keyword("PHIDS NE").matches(&packet, &[]));
        assert!(!PacketQuery::new().keyword("beetle").matches(&packet, &[]));
        // Empty keyword filters nothing.
        assert!(PacketQuery::new().keyword("").matches(&packet, &[]));
    }

    #[test]
    fn test_thread_filter() {
        let packet = chat("hi", "t-1", t0());
        assert!(PacketQuery::new().thread_ids(["t-0", "t-1"]).matches(&packet, &[]));
        assert!(!PacketQuery::new().thread_ids(["t-2"]).matches(&packet, &[]));
        assert!(!PacketQuery::new()
            .thread_ids(Vec::<String>::new())
            .matches(&packet, &[]));
    }

    #[test]
    fn test_result_order_newest_first() {
        let older = SortKey::of(&chat("a", "t", t0()));
        let newer = SortKey::of(&chat("b", "t", t0() + Duration::seconds(1)));
        assert_eq!(newer.result_order(&older), Ordering::Less);
        assert!(older.is_after(&newer));
        assert!(!newer.is_after(&older));
        assert!(!older.is_after(&older));
    }

    #[test]
    fn test_ties_broken_by_id() {
        let a = PacketId::from_string("01J9Z8Y7X6W5V4T3S2R1Q0P9N8").unwrap();
        let b = PacketId::from_string("01J9Z8Y7X6W5V4T3S2R1Q0P9N9").unwrap();
        let ka = SortKey { timestamp_ms: 0, id: a };
        let kb = SortKey { timestamp_ms: 0, id: b };
        assert!(ka.is_after(&kb));
    }

    #[test]
    fn test_page_from_probe() {
        let ids: Vec<PacketId> = (0..3).map(|_| PacketId::new()).collect();

        let page = Page::from_probe(ids.clone(), 2, |id| *id);
        assert_eq!(page.len(), 2);
        assert_eq!(page.next_cursor, Some(ids[1]));

        let page = Page::from_probe(ids[..2].to_vec(), 2, |id| *id);
        assert_eq!(page.len(), 2);
        assert_eq!(page.next_cursor, None);

        let page: Page<PacketId> = Page::from_probe(Vec::new(), 2, |id| *id);
        assert!(page.is_empty());
        assert_eq!(page.next_cursor, None);
    }
}
