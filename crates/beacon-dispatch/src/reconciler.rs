//! # Staleness Reconciler
//!
//! Background sweep that repairs tickets and counters left behind by
//! crashes, closed browser tabs and forgotten customers.
//!
//! ## Sweep Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Reconciler Tick (every 60s)                        │
//! │                                                                         │
//! │  one write transaction:                                                │
//! │                                                                         │
//! │  1. Stuck serving   status = serving AND called_at < now - 11h         │
//! │                     → waiting, counter + called_at cleared             │
//! │                     → queue_status_changed (requeued)                  │
//! │                                                                         │
//! │  2. Stale waiting   status = waiting AND created_at < local midnight   │
//! │                     → cancelled, completed_at = now                    │
//! │                     → queue_status_changed (expired)                   │
//! │                                                                         │
//! │  3. Dangling        counter.current_ticket_id not serving there        │
//! │                     → counter cleared (no event)                       │
//! │                                                                         │
//! │  COMMIT, then publish, then release the write lease.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A sweep only touches rows that match its predicates, so running it again
//! right away changes nothing.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use beacon_core::lifecycle::operating_day_start;
use beacon_core::{QueueEvent, StatusChangeReason, TicketChange, TicketStatus};
use beacon_db::{Database, DbError, StoreTx};

use crate::broadcast::EventBroadcaster;
use crate::config::ReconcilerSettings;
use crate::error::{DispatchError, DispatchResult};

// =============================================================================
// Sweep Report
// =============================================================================

/// Counts of what one sweep changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stuck serving tickets put back in the queue.
    pub requeued: usize,
    /// Waiting tickets from a previous operating day cancelled.
    pub expired: usize,
    /// Counters freed from tickets they no longer serve.
    pub cleared: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.requeued == 0 && self.expired == 0 && self.cleared == 0
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Periodic staleness sweeper.
pub struct StalenessReconciler {
    db: Database,
    broadcaster: EventBroadcaster,
    settings: ReconcilerSettings,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ReconcilerHandle {
    /// Asks the reconciler loop to exit after its current sweep.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("Reconciler already stopped");
        }
    }
}

impl StalenessReconciler {
    /// Creates a reconciler and its shutdown handle.
    pub fn new(
        db: Database,
        broadcaster: EventBroadcaster,
        settings: ReconcilerSettings,
    ) -> (Self, ReconcilerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let reconciler = StalenessReconciler {
            db,
            broadcaster,
            settings,
            shutdown_rx,
        };

        (reconciler, ReconcilerHandle { shutdown_tx })
    }

    /// Runs the sweep loop until shut down.
    ///
    /// This should be spawned as a background task. The first sweep runs
    /// immediately.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.settings.interval_secs,
            stuck_serving_secs = self.settings.stuck_serving_secs,
            "Staleness reconciler starting"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(self.settings.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(?e, "Staleness sweep failed");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Staleness reconciler shutting down");
                    break;
                }
            }
        }

        info!("Staleness reconciler stopped");
    }

    /// Sweeps against the current time.
    pub async fn sweep(&self) -> DispatchResult<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Sweeps as if the clock read `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> DispatchResult<SweepReport> {
        let stuck_before = stuck_cutoff(now, self.settings.stuck_serving_secs)?;
        let day_start = operating_day_start(now, self.settings.utc_offset_minutes);

        let mut report = SweepReport::default();
        let mut events = Vec::new();

        let mut lease = self.db.write().await?;
        let mut tx = lease.begin().await?;

        // 1. Stuck serving
        for stuck in tx.stuck_serving(stuck_before).await? {
            let requeued = match skip_lost_race(
                tx.transition(&stuck.id, TicketStatus::Serving, &TicketChange::Requeue)
                    .await,
            )? {
                Some(ticket) => ticket,
                None => continue,
            };
            let counter = tx.release_ticket(&stuck.id).await?;

            debug!(ticket = %requeued.number, "Requeued stuck ticket");
            events.push(QueueEvent::status_changed(
                &requeued,
                counter.as_ref(),
                StatusChangeReason::Requeued,
                now,
            ));
            report.requeued += 1;
        }

        // 2. Stale waiting
        for stale in tx.stale_waiting(day_start).await? {
            let change = TicketChange::Cancel { at: now };
            let expired = match skip_lost_race(
                tx.transition(&stale.id, TicketStatus::Waiting, &change).await,
            )? {
                Some(ticket) => ticket,
                None => continue,
            };

            debug!(ticket = %expired.number, "Expired stale ticket");
            events.push(QueueEvent::status_changed(
                &expired,
                None,
                StatusChangeReason::Expired,
                now,
            ));
            report.expired += 1;
        }

        // 3. Dangling assignments
        report.cleared = clear_dangling(&mut tx).await?;

        tx.commit().await?;

        for event in events {
            self.broadcaster.publish(event);
        }
        drop(lease);

        if report.is_empty() {
            debug!("Staleness sweep found nothing");
        } else {
            info!(
                requeued = report.requeued,
                expired = report.expired,
                cleared = report.cleared,
                "Staleness sweep complete"
            );
        }
        Ok(report)
    }
}

/// `now` minus the stuck-serving timeout, or an error when it leaves the
/// representable range.
fn stuck_cutoff(now: DateTime<Utc>, stuck_serving_secs: u64) -> DispatchResult<DateTime<Utc>> {
    i64::try_from(stuck_serving_secs)
        .ok()
        .and_then(ChronoDuration::try_seconds)
        .and_then(|timeout| now.checked_sub_signed(timeout))
        .ok_or_else(|| {
            DispatchError::InvalidConfig(format!(
                "reconciler.stuck_serving_secs out of range: {stuck_serving_secs}"
            ))
        })
}

/// Turns a rule violation on a single row into a skip.
fn skip_lost_race<T>(result: Result<T, DbError>) -> Result<Option<T>, DbError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(DbError::Domain(e)) => {
            warn!(%e, "Skipping ticket during sweep");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn clear_dangling(tx: &mut StoreTx<'_>) -> Result<usize, DbError> {
    let dangling = tx.dangling_counters().await?;
    for counter in &dangling {
        tx.clear_ticket(&counter.id).await?;
        warn!(
            counter = counter.number,
            ticket_id = ?counter.current_ticket_id,
            "Cleared dangling counter assignment"
        );
    }
    Ok(dangling.len())
}

// =============================================================================
// Unit Tests
// =============================================================================
