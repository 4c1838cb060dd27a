use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{error, info, warn};

use crate::config::{Config, FeedConfig};
use crate::db::ResultStore;
use crate::dedup::Deduplicator;
use crate::error::RunError;
use crate::fetcher::FeedCollector;
use crate::item::Item;
use crate::llm::LlmClient;
use crate::oracle::LlmDuplicateOracle;
use crate::scorer::{LlmEvaluator, ScoreOutcome, Scorer};
use crate::whitelist::Whitelist;
use crate::window::{self, TimeWindow};

/// Steps of one run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Collect,
    DedupNew,
    Score,
    MergeWithStore,
    DedupMerged,
    WindowFilter,
    Persist,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Collect => "collect",
            Stage::DedupNew => "dedup-new",
            Stage::Score => "score",
            Stage::MergeWithStore => "merge-with-store",
            Stage::DedupMerged => "dedup-merged",
            Stage::WindowFilter => "window-filter",
            Stage::Persist => "persist",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Counts for one completed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub feeds_failed: usize,
    pub items_collected: usize,
    pub defaulted_timestamps: usize,
    pub unique_new: usize,
    pub scored: usize,
    pub rejected: usize,
    pub score_failures: usize,
    pub kept: usize,
    /// Failed writes to the rejected-items audit table or the run log
    pub audit_failures: usize,
}

pub struct Pipeline {
    collector: FeedCollector,
    dedup: Deduplicator,
    scorer: Scorer,
    store: ResultStore,
    feeds: Vec<FeedConfig>,
    whitelist: Option<Whitelist>,
    retain_rejected: bool,
}

impl Pipeline {
    pub fn new(
        collector: FeedCollector,
        dedup: Deduplicator,
        scorer: Scorer,
        store: ResultStore,
        feeds: Vec<FeedConfig>,
    ) -> Self {
        Self {
            collector,
            dedup,
            scorer,
            store,
            feeds,
            whitelist: None,
            retain_rejected: false,
        }
    }

    pub fn with_whitelist(mut self, whitelist: Option<Whitelist>) -> Self {
        self.whitelist = whitelist;
        self
    }

    pub fn with_retain_rejected(mut self, retain: bool) -> Self {
        self.retain_rejected = retain;
        self
    }

    /// Wire the LLM-backed scorer and oracle from configuration. Both share
    /// one client, and with it one rate floor.
    pub fn from_config(config: &Config, store: ResultStore) -> anyhow::Result<Self> {
        let client = Arc::new(LlmClient::new(&config.llm)?);
        Self::with_llm_client(config, store, client)
    }

    pub fn with_llm_client(
        config: &Config,
        store: ResultStore,
        client: Arc<LlmClient>,
    ) -> anyhow::Result<Self> {
        let window = TimeWindow::from_hours(config.hours_window);
        let collector = FeedCollector::new(window)?;
        let oracle = LlmDuplicateOracle::new(client.clone(), config.llm.dedup_timeout());
        let evaluator = LlmEvaluator::new(client, config.llm.score_timeout());

        let pipeline = Self::new(
            collector,
            Deduplicator::new(Arc::new(oracle)),
            Scorer::new(Arc::new(evaluator)),
            store,
            config.feeds.clone(),
        )
        .with_whitelist(config.load_whitelist()?)
        .with_retain_rejected(config.retain_rejected);

        Ok(pipeline)
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// One full run against the wall clock. Collection filters at the start
    /// time, the final window filter at the time of the save.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        self.execute(window::now_naive(), window::now_naive).await
    }

    /// One full run with the clock frozen at `now`.
    pub async fn run_at(&self, now: NaiveDateTime) -> Result<RunReport, RunError> {
        self.execute(now, move || now).await
    }

    /// Feed and scoring failures are counted and skipped. Only a failure to
    /// read or save the rolling set ends the run early.
    async fn execute<F>(&self, now: NaiveDateTime, clock: F) -> Result<RunReport, RunError>
    where
        F: Fn() -> NaiveDateTime + Send + Sync,
    {
        let mut report = RunReport {
            started_at: now,
            ..RunReport::default()
        };

        info!("Pipeline stage: {}", Stage::Load);
        let stored = self.store.load().await?;
        info!("Loaded {} stored items", stored.len());

        info!("Pipeline stage: {}", Stage::Collect);
        let collection = self
            .collector
            .collect(&self.feeds, self.whitelist.as_ref(), now)
            .await;
        report.feeds_failed = collection.feeds_failed;
        report.items_collected = collection.items.len();
        report.defaulted_timestamps = collection.defaulted_timestamps;
        if collection.defaulted_timestamps > 0 {
            warn!(
                "{} entries had no usable timestamp and were dated now",
                collection.defaulted_timestamps
            );
        }

        info!("Pipeline stage: {}", Stage::DedupNew);
        let unique_new = self.dedup.deduplicate(collection.items).await;
        report.unique_new = unique_new.len();

        info!("Pipeline stage: {}", Stage::Score);
        let scored = self.score_all(unique_new, &clock, &mut report).await;

        info!("Pipeline stage: {}", Stage::MergeWithStore);
        let merged: Vec<Item> = scored.into_iter().chain(stored).collect();

        info!("Pipeline stage: {}", Stage::DedupMerged);
        let merged = self.dedup.deduplicate(merged).await;

        info!("Pipeline stage: {}", Stage::WindowFilter);
        let save_now = clock();
        let before = merged.len();
        let merged = self.store.window().retain(merged, save_now);
        if merged.len() < before {
            info!("{} items fell outside the window", before - merged.len());
        }

        info!("Pipeline stage: {}", Stage::Persist);
        let kept = self.store.save(merged, save_now).await?;
        report.kept = kept.len();

        report.finished_at = clock();
        if let Err(e) = self.store.record_run(&report).await {
            report.audit_failures += 1;
            error!("Failed to record run: {}", e);
        }

        info!(
            "Pipeline stage: {} ({} kept, {} scored, {} rejected, {} failed to score, {} feeds failed, {} audit writes failed)",
            Stage::Done,
            report.kept,
            report.scored,
            report.rejected,
            report.score_failures,
            report.feeds_failed,
            report.audit_failures
        );
        Ok(report)
    }

    async fn score_all<F>(&self, items: Vec<Item>, clock: &F, report: &mut RunReport) -> Vec<Item>
    where
        F: Fn() -> NaiveDateTime + Send + Sync,
    {
        let mut scored = Vec::with_capacity(items.len());

        for item in items {
            match self.scorer.score(item).await {
                ScoreOutcome::Scored(item) => {
                    report.scored += 1;
                    scored.push(item);
                }
                ScoreOutcome::Rejected { item, relevance } => {
                    report.rejected += 1;
                    if self.retain_rejected {
                        if let Err(e) = self.store.record_rejected(&item, relevance, clock()).await {
                            report.audit_failures += 1;
                            warn!("Failed to audit rejected item '{}': {}", item.title, e);
                        }
                    }
                }
                ScoreOutcome::Failed { .. } => {
                    report.score_failures += 1;
                }
            }
        }

        scored
    }
}

/// Run once immediately, then once per interval until the process exits.
pub async fn run_forever(pipeline: Arc<Pipeline>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes.saturating_mul(60));

    info!("Starting initial pipeline run");
    if let Err(e) = pipeline.run().await {
        error!("Initial pipeline run failed: {}", e);
    }

    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled pipeline run");
        if let Err(e) = pipeline.run().await {
            error!("Scheduled pipeline run failed: {}", e);
        }
    }
}
