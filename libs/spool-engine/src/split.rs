use spool_api::record::TopicRecord;

/// Thresholds that make a writer roll over to the next container on its own.
///
/// `None` disables a threshold. With all three `None` the writer never
/// splits unless `SequentialWriter::split` is called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitPolicy {
    pub max_records: Option<u64>,
    /// Compared against `StorageBackend::size_bytes`.
    pub max_bytes: Option<u64>,
    /// Span between earliest and latest `recv_timestamp`, in nanoseconds.
    pub max_duration: Option<i64>,
}

impl SplitPolicy {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_disabled(&self) -> bool {
        self.max_records.is_none() && self.max_bytes.is_none() && self.max_duration.is_none()
    }

    pub fn should_split(&self, stats: &ContainerStats, size_bytes: u64) -> bool {
        self.max_records.is_some_and(|max| stats.records >= max)
            || self.max_bytes.is_some_and(|max| size_bytes >= max)
            || self.max_duration.is_some_and(|max| stats.duration() >= max)
    }
}

/// Running counters for the container a writer currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStats {
    pub records: u64,
    pub payload_bytes: u64,
    pub earliest_timestamp: Option<i64>,
    pub latest_timestamp: Option<i64>,
}

impl ContainerStats {
    pub(crate) fn observe(&mut self, record: &TopicRecord) {
        self.records += 1;
        self.payload_bytes += record.data.len() as u64;
        let ts = record.recv_timestamp;
        self.earliest_timestamp = Some(self.earliest_timestamp.map_or(ts, |t| t.min(ts)));
        self.latest_timestamp = Some(self.latest_timestamp.map_or(ts, |t| t.max(ts)));
    }

    pub fn duration(&self) -> i64 {
        match (self.earliest_timestamp, self.latest_timestamp) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => 0,
        }
    }
}

/// Reported to the split callback each time a writer moves to the next
/// container of the same recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitEvent {
    pub closed_uri: String,
    pub opened_uri: String,
    /// Records written to the closed container.
    pub records: u64,
}

/// URI of the `index`-th split container derived from the first one.
pub fn split_uri(base_uri: &str, index: u32) -> String {
    format!("{base_uri}_{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: i64, len: usize) -> TopicRecord {
        TopicRecord::new("/t", vec![0u8; len], ts)
    }

    #[test]
    fn stats_track_count_bytes_and_span() {
        let mut stats = ContainerStats::default();
        stats.observe(&record(200, 3));
        stats.observe(&record(100, 2));
        stats.observe(&record(250, 0));
        assert_eq!(stats.records, 3);
        assert_eq!(stats.payload_bytes, 5);
        assert_eq!(stats.earliest_timestamp, Some(100));
        assert_eq!(stats.latest_timestamp, Some(250));
        assert_eq!(stats.duration(), 150);
    }

    #[test]
    fn disabled_policy_never_splits() {
        let policy = SplitPolicy::never();
        let mut stats = ContainerStats::default();
        for ts in 0..1000 {
            stats.observe(&record(ts, 10));
        }
        assert!(policy.is_disabled());
        assert!(!policy.should_split(&stats, u64::MAX));
    }

    #[test]
    fn each_threshold_triggers() {
        let mut stats = ContainerStats::default();
        stats.observe(&record(0, 1));
        stats.observe(&record(50, 1));

        let by_records = SplitPolicy { max_records: Some(2), ..Default::default() };
        assert!(by_records.should_split(&stats, 0));

        let by_bytes = SplitPolicy { max_bytes: Some(1024), ..Default::default() };
        assert!(!by_bytes.should_split(&stats, 1023));
        assert!(by_bytes.should_split(&stats, 1024));

        let by_duration = SplitPolicy { max_duration: Some(50), ..Default::default() };
        assert!(by_duration.should_split(&stats, 0));
        let longer = SplitPolicy { max_duration: Some(51), ..Default::default() };
        assert!(!longer.should_split(&stats, 0));
    }

    #[test]
    fn span_of_extreme_timestamps_saturates() {
        let mut stats = ContainerStats::default();
        stats.observe(&record(i64::MIN, 0));
        stats.observe(&record(1, 0));
        assert_eq!(stats.duration(), i64::MAX);

        let policy = SplitPolicy { max_duration: Some(1000), ..Default::default() };
        assert!(policy.should_split(&stats, 0));
    }

    #[test]
    fn split_uri_appends_index() {
        assert_eq!(split_uri("/data/bag", 1), "/data/bag_1");
        assert_eq!(split_uri("mem://run", 12), "mem://run_12");
    }
}
