//! Voice presence bookkeeping.
//!
//! One record per user, replaced on every fresh connect and kept for a
//! retention window measured from the connect time.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceRecord {
    pub user_id: u64,
    pub display_name: String,
    pub connect_time: DateTime<Utc>,
    pub disconnect_time: Option<DateTime<Utc>>,
    pub last_disconnect_time: Option<DateTime<Utc>>,
    /// Order in which the connect was observed; breaks disconnect-time ties.
    pub seq: u64,
}

#[derive(Debug, Default)]
struct PresenceInner {
    records: HashMap<u64, PresenceRecord>,
    next_seq: u64,
}

#[derive(Debug)]
pub struct PresenceStore {
    retention: Duration,
    inner: RwLock<PresenceInner>,
}

impl PresenceStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            inner: RwLock::new(PresenceInner::default()),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub async fn record_connect(&self, user_id: u64, display_name: String, now: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let last_disconnect_time = inner
            .records
            .get(&user_id)
            .and_then(|previous| previous.disconnect_time);

        inner.records.insert(
            user_id,
            PresenceRecord {
                user_id,
                display_name,
                connect_time: now,
                disconnect_time: None,
                last_disconnect_time,
                seq,
            },
        );
    }

    /// No-op for users without a record.
    pub async fn record_disconnect(&self, user_id: u64, now: DateTime<Utc>) {
        if let Some(record) = self.inner.write().await.records.get_mut(&user_id) {
            record.disconnect_time = Some(now);
        }
    }

    /// Drops every record connected before `now - retention`. Returns how many
    /// were removed.
    pub async fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let mut inner = self.inner.write().await;
        let before = inner.records.len();
        inner.records.retain(|_, record| record.connect_time >= cutoff);

        let removed = before - inner.records.len();
        if removed > 0 {
            debug!("Pruned {} stale presence records", removed);
        }
        removed
    }

    pub async fn most_recently_disconnected(&self) -> Option<PresenceRecord> {
        let inner = self.inner.read().await;
        inner
            .records
            .values()
            .filter_map(|record| record.disconnect_time.map(|at| (at, record)))
            .max_by(|(a_time, a), (b_time, b)| a_time.cmp(b_time).then(b.seq.cmp(&a.seq)))
            .map(|(_, record)| record.clone())
    }

    /// Point-in-time copy, ordered by first observed connect.
    pub async fn all(&self) -> Vec<PresenceRecord> {
        let mut records: Vec<PresenceRecord> =
            self.inner.read().await.records.values().cloned().collect();
        records.sort_by_key(|record| record.seq);
        records
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
    }

    fn store() -> PresenceStore {
        PresenceStore::new(Duration::hours(12))
    }

    #[tokio::test]
    async fn reconnect_carries_previous_disconnect_forward() {
        let store = store();
        store.record_connect(1, "alice".into(), at(8, 0)).await;
        store.record_disconnect(1, at(9, 0)).await;
        store.record_connect(1, "alice2".into(), at(10, 0)).await;

        let records = store.all().await;
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.display_name, "alice2");
        assert_eq!(record.connect_time, at(10, 0));
        assert_eq!(record.disconnect_time, None);
        assert_eq!(record.last_disconnect_time, Some(at(9, 0)));
    }

    #[tokio::test]
    async fn reconnect_while_connected_clears_last_disconnect() {
        let store = store();
        store.record_connect(1, "alice".into(), at(8, 0)).await;
        store.record_disconnect(1, at(9, 0)).await;
        store.record_connect(1, "alice".into(), at(10, 0)).await;
        store.record_connect(1, "alice".into(), at(11, 0)).await;

        assert_eq!(store.all().await[0].last_disconnect_time, None);
    }

    #[tokio::test]
    async fn disconnect_without_record_is_ignored() {
        let store = store();
        store.record_disconnect(1, at(9, 0)).await;
        assert!(store.all().await.is_empty());
    }

    #[tokio::test]
    async fn prune_keeps_only_records_inside_retention() {
        let store = store();
        store.record_connect(1, "old".into(), at(0, 0)).await;
        store.record_connect(2, "edge".into(), at(1, 0)).await;
        store.record_connect(3, "fresh".into(), at(12, 0)).await;

        let now = at(13, 0);
        assert_eq!(store.prune(now).await, 1);

        let cutoff = now - Duration::hours(12);
        let remaining = store.all().await;
        assert_eq!(remaining.iter().map(|r| r.user_id).collect::<Vec<_>>(), vec![2, 3]);
        assert!(remaining.iter().all(|r| r.connect_time >= cutoff));
    }

    #[tokio::test]
    async fn most_recent_disconnect_picks_latest_time() {
        let store = store();
        store.record_connect(1, "A".into(), at(9, 0)).await;
        store.record_connect(2, "B".into(), at(9, 0)).await;
        store.record_connect(3, "C".into(), at(9, 0)).await;
        store.record_disconnect(1, at(10, 0)).await;
        store.record_disconnect(2, at(10, 5)).await;

        let latest = store.most_recently_disconnected().await.unwrap();
        assert_eq!(latest.display_name, "B");
    }

    #[tokio::test]
    async fn most_recent_disconnect_tie_goes_to_earliest_connect() {
        let store = store();
        store.record_connect(2, "first".into(), at(9, 0)).await;
        store.record_connect(1, "second".into(), at(9, 1)).await;
        store.record_disconnect(1, at(10, 0)).await;
        store.record_disconnect(2, at(10, 0)).await;

        let latest = store.most_recently_disconnected().await.unwrap();
        assert_eq!(latest.display_name, "first");
    }

    #[tokio::test]
    async fn most_recent_disconnect_none_when_everyone_connected() {
        let store = store();
        store.record_connect(1, "A".into(), at(9, 0)).await;
        assert!(store.most_recently_disconnected().await.is_none());
    }
}
