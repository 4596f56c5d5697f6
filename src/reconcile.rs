//! Incremental reconciliation of live listings against the stored snapshot.
//!
//! One pass walks the subscriptions in configuration order:
//!
//! 1. **Scan** the listing (the scanner is expected to retry; see [`crate::retry`])
//! 2. **Partition** scanned items into known titles and unknown titles
//! 3. **Reuse** stored records for known titles verbatim, with no page fetch
//! 4. **Fetch** detail for unknown titles, one at a time, pausing between fetches
//! 5. **Merge** the new records into the subscription's collection and the delta
//!
//! A subscription whose scan fails is skipped and its stored records are left
//! exactly as they were. Records are never removed, even when a model drops off
//! the live listing.
//!
//! [`run_pass`] wraps a pass with snapshot load, a single save, and the
//! notification hand-off.

use crate::errors::PersistenceError;
use crate::models::{ListingItem, ModelRecord, RecordCollection, Snapshot, Subscription};
use crate::notify::Notifier;
use crate::scrapers::{DetailExtractor, ListingScanner};
use crate::store::SnapshotStore;
use itertools::Itertools;
use rand::{Rng, rng};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Pacing between detail fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Shortest pause before each detail fetch after the first.
    pub item_delay_min: Duration,
    /// Longest pause; the actual pause is drawn uniformly between the bounds.
    pub item_delay_max: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            item_delay_min: Duration::from_secs(1),
            item_delay_max: Duration::from_secs(3),
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassOutcome {
    /// The input snapshot with newly fetched records merged in.
    pub snapshot: Snapshot,
    /// Newly discovered records, in configuration then scan order.
    pub delta: Vec<ModelRecord>,
    /// Subscriptions whose scan failed and were left untouched.
    pub skipped: Vec<String>,
}

/// Drives scanners and the detail extractor over a snapshot.
#[derive(Debug)]
pub struct Reconciler<S, D> {
    scanner: S,
    extractor: D,
    settings: ReconcileSettings,
}

impl<S, D> Reconciler<S, D>
where
    S: ListingScanner,
    D: DetailExtractor,
{
    pub fn new(scanner: S, extractor: D, settings: ReconcileSettings) -> Self {
        Self {
            scanner,
            extractor,
            settings,
        }
    }

    #[cfg(test)]
    pub fn scanner(&self) -> &S {
        &self.scanner
    }

    #[cfg(test)]
    pub fn extractor(&self) -> &D {
        &self.extractor
    }

    /// Reconcile every subscription against `snapshot`.
    ///
    /// # Arguments
    ///
    /// * `subscriptions` - Subscriptions in configuration order
    /// * `snapshot` - Records known before this pass
    ///
    /// # Returns
    ///
    /// The updated snapshot, the delta, and the names of skipped subscriptions.
    /// Scan failures never abort the pass.
    #[instrument(level = "info", skip_all, fields(subscriptions = subscriptions.len()))]
    pub async fn run_once(&self, subscriptions: &[Subscription], mut snapshot: Snapshot) -> PassOutcome {
        let mut delta = Vec::new();
        let mut skipped = Vec::new();

        for subscription in subscriptions {
            let items = match self.scanner.scan(subscription).await {
                Ok(items) => items,
                Err(e) => {
                    error!(
                        subscription = %subscription.name,
                        url = %subscription.source_url,
                        error = %e,
                        "Skipping subscription for this pass"
                    );
                    skipped.push(subscription.name.clone());
                    continue;
                }
            };

            // A subscription only gets an entry once it has something to store.
            let added = match snapshot.subscriptions.get_mut(&subscription.name) {
                Some(records) => self.merge_listing(subscription, items, records).await,
                None => {
                    let mut records = RecordCollection::new();
                    let added = self.merge_listing(subscription, items, &mut records).await;
                    if !records.is_empty() {
                        snapshot.subscriptions.insert(subscription.name.clone(), records);
                    }
                    added
                }
            };
            delta.extend(added);
        }

        info!(
            new = delta.len(),
            skipped = skipped.len(),
            records = snapshot.len(),
            "Reconciliation pass complete"
        );
        PassOutcome {
            snapshot,
            delta,
            skipped,
        }
    }

    /// Merge one subscription's scanned items into its stored records.
    ///
    /// Returns the records that were not stored before, in scan order.
    #[instrument(level = "info", skip_all, fields(subscription = %subscription.name))]
    async fn merge_listing(
        &self,
        subscription: &Subscription,
        items: Vec<ListingItem>,
        records: &mut RecordCollection,
    ) -> Vec<ModelRecord> {
        let scanned = items.len();
        let (known, unknown): (Vec<ListingItem>, Vec<ListingItem>) = items
            .into_iter()
            .unique_by(|item| item.title.clone())
            .partition(|item| records.contains_key(&item.title));

        info!(
            scanned,
            known = known.len(),
            unknown = unknown.len(),
            "Partitioned listing"
        );
        for item in &known {
            debug!(title = %item.title, "Known model; reusing stored record");
        }

        let mut added = Vec::with_capacity(unknown.len());
        for (index, item) in unknown.into_iter().enumerate() {
            if index > 0 {
                self.pause_between_items().await;
            }
            let t0 = Instant::now();
            let detail = self.extractor.extract(&item.link, true).await;
            if detail.is_failure() {
                warn!(
                    subscription = %subscription.name,
                    title = %item.title,
                    url = %item.link,
                    "Detail fetch failed; storing partial record"
                );
            }
            let record = ModelRecord::from_listing(subscription, item, detail);
            info!(
                title = %record.title,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "New model recorded"
            );
            records.insert(record.title.clone(), record.clone());
            added.push(record);
        }
        added
    }

    async fn pause_between_items(&self) {
        let min = self.settings.item_delay_min.as_millis() as u64;
        let max = self.settings.item_delay_max.as_millis() as u64;
        let ms = if max > min {
            rng().random_range(min..=max)
        } else {
            min
        };
        if ms > 0 {
            debug!(delay_ms = ms, "Pausing before next detail fetch");
            sleep(Duration::from_millis(ms)).await;
        }
    }
}

/// Run one full monitoring pass: load, reconcile, save once, notify.
///
/// The snapshot is saved even when some subscriptions were skipped so the
/// progress made on the others is kept. Notification failures are logged and
/// do not fail the pass.
///
/// # Errors
///
/// [`PersistenceError`] when the snapshot cannot be loaded or saved. On a
/// failed save the previous snapshot file is left in place.
#[instrument(level = "info", skip_all, fields(path = %store.path().display()))]
pub async fn run_pass<S, D, N>(
    reconciler: &Reconciler<S, D>,
    store: &SnapshotStore,
    subscriptions: &[Subscription],
    notifier: &N,
) -> Result<PassOutcome, PersistenceError>
where
    S: ListingScanner,
    D: DetailExtractor,
    N: Notifier,
{
    let t0 = Instant::now();
    let snapshot = store.load().await?;
    if snapshot.is_empty() {
        info!("No stored models yet; every listed model counts as new");
    }
    let outcome = reconciler.run_once(subscriptions, snapshot).await;

    if let Err(e) = store.save(&outcome.snapshot).await {
        error!(error = %e, "Failed to persist snapshot; previous snapshot kept");
        return Err(e);
    }

    if let Err(e) = notifier.notify(&outcome.delta).await {
        warn!(error = %e, new = outcome.delta.len(), "Notification failed");
    }

    info!(
        elapsed_ms = t0.elapsed().as_millis() as u64,
        new = outcome.delta.len(),
        skipped = ?outcome.skipped,
        "Monitoring pass finished"
    );
    Ok(outcome)
}
