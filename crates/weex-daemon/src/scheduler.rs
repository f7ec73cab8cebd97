//! Summary maintenance scheduler

use anyhow::{anyhow, Context, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info};
use weex_aggregate::{AggregateOptions, AggregateResolver, ProviderRegistry, ResolverConfig};
use weex_core::{AggregateType, Timespan, Timestamp};
use weex_daysum::{BackfillEngine, CatchUp, DailySummaryStore};

/// Keeps the daily summaries in step with an archive written by another
/// process: rebuilds them once if no backfill ever completed, then folds
/// newly appended records every poll interval.
pub struct Scheduler {
    store: Arc<Mutex<DailySummaryStore>>,
    resolver_config: ResolverConfig,
    trans_days: usize,
    poll_interval: Duration,
    /// Start of the oldest day not yet reported
    reported_through: Option<Timestamp>,
    running: bool,
}

impl Scheduler {
    pub fn new(
        store: DailySummaryStore,
        resolver_config: ResolverConfig,
        trans_days: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            resolver_config,
            trans_days,
            poll_interval,
            reported_through: None,
            running: false,
        }
    }

    /// Run store work on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut DailySummaryStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let mut guard = store.lock().map_err(|_| anyhow!("Store lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .context("Store task failed")?
    }

    /// Rebuild the summaries unless a completed backfill is recorded.
    /// Returns the number of records folded when a rebuild ran.
    pub async fn prepare(&self) -> Result<Option<u64>> {
        let trans_days = self.trans_days;
        self.blocking(move |store| {
            if let Some(watermark) = store.last_backfill()? {
                debug!("Summaries backfilled through {}", watermark);
                return Ok(None);
            }
            info!("No completed backfill recorded, rebuilding daily summaries");
            let records = BackfillEngine::new(store)
                .trans_days(trans_days)
                .on_progress(|progress| {
                    debug!(
                        records = progress.records,
                        days = progress.days,
                        "Backfill progress"
                    )
                })
                .run()
                .context("Backfill failed")?;
            Ok(Some(records))
        })
        .await
    }

    /// Fold records appended since the last pass and report days that closed
    pub async fn tick(&mut self) -> Result<CatchUp> {
        let reported = self.reported_through;
        let resolver_config = self.resolver_config.clone();
        let (outcome, reported) = self
            .blocking(move |store| {
                let outcome = store.catch_up().context("Catch-up failed")?;
                let reported = report_closed_days(store, &resolver_config, reported)?;
                Ok((outcome, reported))
            })
            .await?;
        self.reported_through = reported;
        Ok(outcome)
    }

    /// Run the main maintenance loop
    pub async fn run(&mut self) -> Result<()> {
        self.running = true;
        info!("Scheduler started");
        info!("Poll interval: {}s", self.poll_interval.as_secs());

        if let Some(records) = self.prepare().await? {
            info!("Backfill complete: {} records", records);
        }

        let mut interval = tokio::time::interval(self.poll_interval);
        while self.running {
            interval.tick().await;
            match self.tick().await {
                Ok(outcome) if outcome.folded > 0 || outcome.skipped > 0 => {
                    info!(
                        "Folded {} new records ({} skipped)",
                        outcome.folded, outcome.skipped
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    // Retried on the next pass
                    error!("Error updating summaries: {:#}", e);
                }
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }

    /// Stop the scheduler, logging how far the summaries got
    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping scheduler...");
        self.running = false;
        let last_update = self.blocking(|store| Ok(store.last_update()?)).await?;
        info!("Summaries current through {:?}", last_update);
        Ok(())
    }
}

/// Log a short report for every day that closed since `reported_through`.
/// The first call only records where reporting starts.
fn report_closed_days(
    store: &DailySummaryStore,
    resolver_config: &ResolverConfig,
    reported_through: Option<Timestamp>,
) -> Result<Option<Timestamp>> {
    let Some(last) = store.last_timestamp()? else {
        return Ok(reported_through);
    };
    let open_day = store.clock().archive_day_start(last);
    let from = match reported_through {
        Some(from) if from < open_day => from,
        Some(from) => return Ok(Some(from)),
        None => return Ok(Some(open_day)),
    };

    let registry = ProviderRegistry::standard(resolver_config);
    let resolver = AggregateResolver::new(store, &registry);
    let opts = AggregateOptions::default();
    for day in store.clock().day_spans(Timespan::new(from, open_day)?) {
        let high = resolver.get_aggregate("outTemp", day, AggregateType::Max, &opts)?;
        let low = resolver.get_aggregate("outTemp", day, AggregateType::Min, &opts)?;
        let rain = resolver.get_aggregate("rain", day, AggregateType::Sum, &opts)?;
        info!(
            day = day.start,
            high = ?high.value,
            low = ?low.value,
            temperature_unit = ?high.unit,
            rain = ?rain.value,
            rain_unit = ?rain.unit,
            "Day closed"
        );
    }
    Ok(Some(open_day))
}
