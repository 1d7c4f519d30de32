//! Cycle Orchestrator
//!
//! Runs the repost pipeline for one platform:
//!
//! 1. **Trigger Gate** (gated mode only): stop unless enough new
//!    publications appeared since the last trigger
//! 2. **Eligibility Selector**: fetch ranked candidates, keep the count the
//!    average score allows
//! 3. **Slot Allocator**: place them on free future slots under the daily cap
//! 4. **Repost Queue**: persist each entry with its generated caption
//! 5. Advance the trigger window
//!
//! A single `running` flag guards the pipeline: a cycle requested while
//! another is executing is skipped. The trigger window only advances at the
//! last step, so a cycle that fails part way re-evaluates the same items on
//! the next tick. Entries persisted before the failure stay queued.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::services::collaborators::{
    caption_with_fallback, slots_with_fallback, CaptionGenerator, FallbackCaptionGenerator,
    FixedGridAdvisor, PostingTimeAdvisor,
};
use crate::services::eligibility_selector::EligibilitySelector;
use crate::services::repost_queue::RepostQueue;
use crate::services::slot_allocator::SlotAllocator;
use crate::services::trigger_gate::TriggerGate;
use crate::types::{CycleMode, CycleOutcome, CycleReport, FailedEntrySummary, PlatformStatus};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use repost_common::events::{CycleSource, EventBus, RepostEvent};
use repost_common::Platform;
use sqlx::{Pool, Sqlite};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Releases the running flag when dropped
struct RunningGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct CycleOrchestrator {
    db: Pool<Sqlite>,
    config: EngineConfig,
    gate: TriggerGate,
    selector: EligibilitySelector,
    allocator: SlotAllocator,
    queue: RepostQueue,
    captions: Arc<dyn CaptionGenerator>,
    advisor: Arc<dyn PostingTimeAdvisor>,
    events: EventBus,
    running: AtomicBool,
    last_errors: RwLock<HashMap<Platform, String>>,
}

impl CycleOrchestrator {
    /// Orchestrator with the fallback caption generator and the fixed slot grid
    pub fn new(db: Pool<Sqlite>, config: EngineConfig, events: EventBus) -> Self {
        Self {
            gate: TriggerGate::new(db.clone(), config.trigger.clone()),
            selector: EligibilitySelector::new(db.clone(), config.selector.clone()),
            allocator: SlotAllocator::new(config.slots.clone()),
            queue: RepostQueue::new(db.clone(), config.db_max_lock_wait_ms),
            captions: Arc::new(FallbackCaptionGenerator),
            advisor: Arc::new(FixedGridAdvisor::new(config.slots.clone())),
            events,
            running: AtomicBool::new(false),
            last_errors: RwLock::new(HashMap::new()),
            db,
            config,
        }
    }

    pub fn with_caption_generator(mut self, generator: Arc<dyn CaptionGenerator>) -> Self {
        self.captions = generator;
        self
    }

    pub fn with_posting_time_advisor(mut self, advisor: Arc<dyn PostingTimeAdvisor>) -> Self {
        self.advisor = advisor;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn queue(&self) -> &RepostQueue {
        &self.queue
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_acquire(&self) -> Option<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard {
                flag: &self.running,
            })
    }

    /// Run one cycle for a platform, unless another cycle is executing
    ///
    /// Storage errors are recorded for `status()` and returned; collaborator
    /// and trigger-count failures are degraded inside the pipeline.
    pub async fn run_cycle(
        &self,
        platform: Platform,
        mode: CycleMode,
        source: CycleSource,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome> {
        let Some(_guard) = self.try_acquire() else {
            info!(platform = %platform, ?source, "Cycle already running, skipping");
            self.events.emit_lossy(RepostEvent::CycleSkipped {
                platform,
                source,
                timestamp: now,
            });
            return Ok(CycleOutcome::Skipped);
        };

        self.events.emit_lossy(RepostEvent::CycleStarted {
            platform,
            source,
            timestamp: now,
        });

        match self.execute(platform, mode, now).await {
            Ok(outcome) => {
                let (new_qualifying, queued) = match &outcome {
                    CycleOutcome::Completed(report) => {
                        self.last_errors.write().await.remove(&platform);
                        (report.new_qualifying, report.queued.len())
                    }
                    CycleOutcome::Idle { new_qualifying } => (*new_qualifying, 0),
                    CycleOutcome::Skipped => (0, 0),
                };
                self.events.emit_lossy(RepostEvent::CycleCompleted {
                    platform,
                    source,
                    new_qualifying,
                    queued,
                    timestamp: now,
                });
                Ok(outcome)
            }
            Err(e) => {
                error!(platform = %platform, ?source, error = %e, "Repost cycle failed");
                self.last_errors
                    .write()
                    .await
                    .insert(platform, e.to_string());
                self.events.emit_lossy(RepostEvent::CycleFailed {
                    platform,
                    source,
                    error: e.to_string(),
                    timestamp: now,
                });
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        platform: Platform,
        mode: CycleMode,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome> {
        let new_qualifying = match mode {
            CycleMode::Gated => {
                let decision = self.gate.evaluate(platform, now).await;
                if !decision.is_ready() {
                    return Ok(CycleOutcome::Idle {
                        new_qualifying: decision.new_qualifying(),
                    });
                }
                decision.new_qualifying()
            }
            CycleMode::Forced => match self.gate.count_new(platform, now).await {
                Ok(count) => count,
                Err(e) => {
                    warn!(platform = %platform, error = %e, "Trigger count failed during forced cycle");
                    0
                }
            },
        };

        info!(platform = %platform, ?mode, new_qualifying, "Repost cycle running");

        let selection = self.selector.select_for_cycle(platform, now).await?;

        let mut report = CycleReport {
            platform,
            new_qualifying,
            fetched: selection.fetched,
            selected: selection.chosen.len(),
            queued: Vec::new(),
            deferred: 0,
        };

        if !selection.chosen.is_empty() {
            let preferred = slots_with_fallback(
                self.advisor.as_ref(),
                platform,
                self.config.slots.preferred_slot_count,
                self.config.collaborator_timeout,
                &self.config.slots,
            )
            .await;

            let occupied = self
                .queue
                .occupied_slots(platform, now - ChronoDuration::days(1))
                .await?;

            let allocation = self.allocator.allocate(
                &selection.chosen,
                platform,
                self.config.slots.max_per_day(platform),
                &preferred,
                &occupied,
                now,
            );
            report.deferred = allocation.deferred.len();

            let captions: HashMap<_, _> = selection
                .chosen
                .iter()
                .map(|c| (c.content_item_id, c.source_caption.as_deref()))
                .collect();

            for mut entry in allocation.entries {
                let source_caption = captions
                    .get(&entry.source_content_item_id)
                    .copied()
                    .flatten();
                entry.generated_caption = Some(
                    caption_with_fallback(
                        self.captions.as_ref(),
                        source_caption,
                        platform,
                        self.config.collaborator_timeout,
                    )
                    .await,
                );

                self.queue.enqueue(&entry).await?;
                debug!(
                    platform = %platform,
                    entry_id = %entry.id,
                    content_item_id = %entry.source_content_item_id,
                    scheduled_for = %entry.scheduled_for,
                    "Repost allocated"
                );
                report.queued.push(entry);
            }
        } else {
            info!(platform = %platform, "No eligible candidates, closing trigger window");
        }

        self.gate.advance(platform, now).await?;

        info!(
            platform = %platform,
            fetched = report.fetched,
            selected = report.selected,
            queued = report.queued.len(),
            deferred = report.deferred,
            "Repost cycle completed"
        );

        Ok(CycleOutcome::Completed(report))
    }

    /// Gated evaluation of every platform (hourly task)
    pub async fn run_scheduled(&self, now: DateTime<Utc>) {
        self.run_all(CycleMode::Gated, CycleSource::Scheduled, now).await;
    }

    /// Daily pass over every platform
    ///
    /// Goes through the Trigger Gate like the hourly task; only the manual
    /// trigger bypasses the threshold.
    pub async fn run_daily_pass(&self, now: DateTime<Utc>) {
        self.run_all(CycleMode::Gated, CycleSource::DailyPass, now).await;
    }

    async fn run_all(&self, mode: CycleMode, source: CycleSource, now: DateTime<Utc>) {
        for platform in Platform::ALL {
            // Failures are already recorded and logged by run_cycle
            let _ = self.run_cycle(platform, mode, source, now).await;
        }
    }

    /// Operator status for every platform
    pub async fn status(&self) -> Result<Vec<PlatformStatus>> {
        let last_errors = self.last_errors.read().await.clone();
        let mut statuses = Vec::with_capacity(Platform::ALL.len());

        for platform in Platform::ALL {
            let queue_counts: BTreeMap<String, i64> = self
                .queue
                .count_by_status(platform)
                .await?
                .into_iter()
                .map(|(status, count)| (status.as_str().to_string(), count))
                .collect();

            let trigger = crate::db::trigger_state::get_state(&self.db, platform).await?;

            statuses.push(PlatformStatus {
                platform,
                queue_counts,
                next_due: self.queue.next_due(platform).await?,
                last_trigger_at: trigger.as_ref().map(|t| t.last_trigger_at),
                new_qualifying_count: trigger.as_ref().map(|t| t.new_qualifying_count),
                last_cycle_error: last_errors.get(&platform).cloned(),
                last_failed_entry: self.queue.last_failed(platform).await?.map(|entry| {
                    FailedEntrySummary {
                        entry_id: entry.id,
                        error_message: entry.error_message,
                    }
                }),
            });
        }

        Ok(statuses)
    }

    /// Delete every queue entry not currently being processed
    pub async fn clear_queue(&self, now: DateTime<Utc>) -> Result<u64> {
        let removed = self.queue.clear().await?;
        self.events.emit_lossy(RepostEvent::QueueCleared {
            removed,
            timestamp: now,
        });
        Ok(removed)
    }
}

impl std::fmt::Debug for CycleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleOrchestrator")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
