//! Cross-source and cross-run duplicate removal.
//!
//! Single pass over the input. Each incoming item is compared with the
//! uniques kept so far, in order; the cheap title ratio gates the expensive
//! oracle call, and the first confirmed match ends the scan. Of the two
//! duplicates the earlier-published one survives: if the incoming item is
//! older, the stored one is removed and the incoming item is appended.
//!
//! The result depends on input order. Callers feed items in feed-list order,
//! then entry order within each feed; on merge, new items come before stored
//! ones.

use std::sync::Arc;

use tracing::{debug, info};

use crate::item::Item;
use crate::oracle::DuplicateOracle;
use crate::similarity::{self, CANDIDATE_THRESHOLD};

pub struct Deduplicator {
    oracle: Arc<dyn DuplicateOracle>,
    threshold: f64,
}

impl Deduplicator {
    pub fn new(oracle: Arc<dyn DuplicateOracle>) -> Self {
        Self {
            oracle,
            threshold: CANDIDATE_THRESHOLD,
        }
    }

    pub async fn deduplicate(&self, items: Vec<Item>) -> Vec<Item> {
        let input_len = items.len();
        let mut unique: Vec<Item> = Vec::with_capacity(input_len);

        for item in items {
            let mut duplicate_of = None;
            for (idx, kept) in unique.iter().enumerate() {
                if similarity::ratio(&item.title, &kept.title) < self.threshold {
                    continue;
                }
                if self.oracle.same_event(&item, kept).await {
                    duplicate_of = Some(idx);
                    break;
                }
            }

            match duplicate_of {
                Some(idx) if item.published < unique[idx].published => {
                    let dropped = unique.remove(idx);
                    debug!(
                        "Replacing '{}' with earlier report '{}'",
                        dropped.title, item.title
                    );
                    unique.push(item);
                }
                Some(idx) => {
                    debug!(
                        "Dropping '{}', already covered by '{}'",
                        item.title, unique[idx].title
                    );
                }
                None => unique.push(item),
            }
        }

        info!(
            "Deduplicated {} items down to {}",
            input_len,
            unique.len()
        );
        unique
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use std::sync::Mutex;

    fn base_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    /// `event` goes in the summary; the oracle treats equal summaries as
    /// the same event.
    fn item(title: &str, event: &str, hours_ago: i64) -> Item {
        Item::new(
            "Test",
            title,
            format!("https://example.com/{}", title.len()),
            event,
            base_time() - Duration::hours(hours_ago),
        )
    }

    #[derive(Default)]
    struct RecordingOracle {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl RecordingOracle {
        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DuplicateOracle for RecordingOracle {
        async fn same_event(&self, a: &Item, b: &Item) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push((a.title.clone(), b.title.clone()));
            a.summary == b.summary
        }
    }

    fn titles(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_dissimilar_titles_never_reach_oracle() {
        let oracle = Arc::new(RecordingOracle::default());
        let dedup = Deduplicator::new(oracle.clone());

        let items = vec![
            item("Harvard raises tuition", "same", 1),
            item("Flooding closes Venice schools", "same", 2),
            item("Robotics league crowns champion", "same", 3),
        ];
        let unique = dedup.deduplicate(items).await;

        assert_eq!(unique.len(), 3);
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_similar_titles_confirmed_keep_earliest() {
        let oracle = Arc::new(RecordingOracle::default());
        let dedup = Deduplicator::new(oracle.clone());

        let items = vec![
            item("Oxford announces tuition cut for 2026", "oxford-fees", 1),
            item("Oxford announces tuition cuts for 2026", "oxford-fees", 3),
        ];
        let unique = dedup.deduplicate(items).await;

        assert_eq!(titles(&unique), vec!["Oxford announces tuition cuts for 2026"]);
        assert_eq!(oracle.call_count(), 1);
    }

    #[tokio::test]
    async fn test_later_duplicate_is_dropped() {
        let oracle = Arc::new(RecordingOracle::default());
        let dedup = Deduplicator::new(oracle.clone());

        let items = vec![
            item("Oxford announces tuition cut for 2026", "oxford-fees", 3),
            item("Oxford announces tuition cuts for 2026", "oxford-fees", 1),
        ];
        let unique = dedup.deduplicate(items).await;

        assert_eq!(titles(&unique), vec!["Oxford announces tuition cut for 2026"]);
    }

    #[tokio::test]
    async fn test_equal_timestamps_keep_stored() {
        let oracle = Arc::new(RecordingOracle::default());
        let dedup = Deduplicator::new(oracle);

        let items = vec![
            item("Oxford announces tuition cut", "oxford-fees", 2),
            item("Oxford announces tuition cuts", "oxford-fees", 2),
        ];
        let unique = dedup.deduplicate(items).await;

        assert_eq!(titles(&unique), vec!["Oxford announces tuition cut"]);
    }

    #[tokio::test]
    async fn test_similar_titles_rejected_by_oracle_are_kept() {
        let oracle = Arc::new(RecordingOracle::default());
        let dedup = Deduplicator::new(oracle.clone());

        let items = vec![
            item("MIT opens new AI lab", "mit-lab", 1),
            item("MIT opens new AI lab in Boston", "different-event", 2),
        ];
        let unique = dedup.deduplicate(items).await;

        assert_eq!(unique.len(), 2);
        assert_eq!(oracle.call_count(), 1);
    }

    #[tokio::test]
    async fn test_replacement_moves_to_end() {
        let oracle = Arc::new(RecordingOracle::default());
        let dedup = Deduplicator::new(oracle);

        let items = vec![
            item("Yale expands scholarship program", "yale", 1),
            item("Kyoto University opens campus", "kyoto", 1),
            item("Yale expands scholarship programs", "yale", 5),
        ];
        let unique = dedup.deduplicate(items).await;

        assert_eq!(
            titles(&unique),
            vec!["Kyoto University opens campus", "Yale expands scholarship programs"]
        );
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        // Both uniques are candidates for the third item; only the first
        // is asked.
        let oracle = Arc::new(RecordingOracle::default());
        let dedup = Deduplicator::new(oracle.clone());

        let items = vec![
            item("Exam results released today", "exam-a", 1),
            item("Exam results released tonight", "exam-b", 1),
            item("Exam results released today!", "exam-a", 2),
        ];
        let unique = dedup.deduplicate(items).await;

        assert_eq!(unique.len(), 2);
        let calls = oracle.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1],
            (
                "Exam results released today!".to_string(),
                "Exam results released today".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_output_depends_on_input_order() {
        // A~B and B~C are the same event per oracle, A and C are lexically far
        // apart. Which items survive depends on which arrives first.
        let oracle = Arc::new(RecordingOracle::default());
        let dedup = Deduplicator::new(oracle);

        let a = item("Cambridge wins boat race", "race", 3);
        let b = item("Cambridge wins the boat race again", "race", 2);
        let c = item("Fans watch the boat race again this spring", "race", 1);

        let forward = dedup
            .deduplicate(vec![a.clone(), b.clone(), c.clone()])
            .await;
        let reversed = dedup.deduplicate(vec![c, b, a]).await;

        assert_ne!(titles(&forward), titles(&reversed));
    }

    #[tokio::test]
    async fn test_idempotent() {
        let oracle = Arc::new(RecordingOracle::default());
        let dedup = Deduplicator::new(oracle);

        let items = vec![
            item("Oxford announces tuition cut for 2026", "oxford-fees", 1),
            item("Oxford announces tuition cuts for 2026", "oxford-fees", 3),
            item("MIT opens new AI lab", "mit-lab", 2),
            item("MIT opens new AI lab in Boston", "mit-lab-2", 2),
            item("Harvard raises tuition", "harvard", 4),
        ];
        let once = dedup.deduplicate(items).await;
        let twice = dedup.deduplicate(once.clone()).await;

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let dedup = Deduplicator::new(Arc::new(RecordingOracle::default()));
        assert!(dedup.deduplicate(Vec::new()).await.is_empty());
    }
}
