//! Behavioral profile aggregation.
//!
//! The aggregator is the sole writer of `UserBehavior`. It recomputes a
//! user's profile wholesale from their accepted transaction history and runs
//! off the request path on a background worker fed by a bounded queue.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::Arc;

use chrono::Duration;
use statrs::statistics::Statistics;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use payguard_common::{
    clamp01, now_utc, CONSISTENCY_MIN_SAMPLES, DIVERSITY_CATEGORY_SCALE, DIVERSITY_MERCHANT_SCALE,
    SECONDS_PER_WEEK, TOP_CATEGORIES, TOP_CITIES, TOP_HOURS, TOP_MERCHANTS, TOP_WEEKDAYS,
};
use payguard_errors::Result;

use crate::models::{Transaction, UserBehavior};
use crate::store::Store;

/// Recomputes user behavior profiles from accepted transaction history
pub struct BehaviorAggregator {
    store: Arc<dyn Store>,
}

impl BehaviorAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Rebuild the profile for `user_id` from the latest committed history.
    ///
    /// Idempotent: running twice over the same history produces the same
    /// profile (modulo `last_updated`). With no accepted transactions the
    /// existing profile is left untouched.
    pub async fn update_profile(&self, user_id: Uuid) -> Result<()> {
        let history = self
            .store
            .find_by_user_id_order_by_time_desc(user_id)
            .await?;
        let accepted: Vec<&Transaction> = history.iter().filter(|t| t.is_accepted()).collect();

        if accepted.is_empty() {
            debug!("No accepted transactions for user {}, keeping profile", user_id);
            return Ok(());
        }

        let mut profile = self
            .store
            .find_behavior_by_user_id(user_id)
            .await?
            .unwrap_or_else(|| UserBehavior::neutral(user_id));

        let amounts: Vec<f64> = accepted.iter().map(|t| t.amount).collect();
        profile.avg_transaction_amount = amounts.iter().mean();
        profile.max_transaction_amount = amounts.iter().fold(f64::MIN, |a, &b| a.max(b));
        profile.min_transaction_amount = amounts.iter().fold(f64::MAX, |a, &b| a.min(b));
        profile.std_dev_transaction_amount = if amounts.len() >= 2 {
            amounts.iter().std_dev()
        } else {
            0.0
        };

        let now = now_utc();
        profile.transactions_per_day = count_since(&accepted, now - Duration::days(1));
        profile.transactions_per_week = count_since(&accepted, now - Duration::days(7));
        profile.transactions_per_month = count_since(&accepted, now - Duration::days(30));

        profile.preferred_hours = top_k_by_frequency(
            accepted.iter().map(|t| hour_of(t.transaction_time)),
            TOP_HOURS,
        );
        profile.preferred_days = top_k_by_frequency(
            accepted
                .iter()
                .map(|t| weekday_index(t.transaction_time)),
            TOP_WEEKDAYS,
        );
        profile.frequent_cities = top_k_by_frequency(
            accepted.iter().filter_map(|t| t.city.clone()),
            TOP_CITIES,
        );
        profile.frequent_merchants = top_k_by_frequency(
            accepted.iter().filter_map(|t| t.merchant_name.clone()),
            TOP_MERCHANTS,
        );
        profile.frequent_categories = top_k_by_frequency(
            accepted.iter().filter_map(|t| t.merchant_category.clone()),
            TOP_CATEGORIES,
        );

        profile.frequent_countries = distinct_sorted(accepted.iter().filter_map(|t| t.country.clone()));
        profile.known_devices = distinct_sorted(accepted.iter().filter_map(|t| t.device_id.clone()));
        profile.known_ips = distinct_sorted(accepted.iter().filter_map(|t| t.ip_address.clone()));

        profile.consistency_score = consistency_score(
            profile.avg_transaction_amount,
            profile.std_dev_transaction_amount,
            accepted.len(),
        );
        profile.diversity_score = diversity_score(
            distinct_count(accepted.iter().filter_map(|t| t.merchant_name.as_deref())),
            distinct_count(accepted.iter().filter_map(|t| t.merchant_category.as_deref())),
        );
        profile.velocity_pattern = velocity_pattern(&accepted);

        profile.data_points_count = accepted.len() as u64;
        profile.last_updated = now;

        self.store.save_behavior(&profile).await?;
        info!(
            "Behavior profile updated for user {} from {} accepted transactions",
            user_id,
            profile.data_points_count
        );
        Ok(())
    }
}

fn count_since(accepted: &[&Transaction], since: chrono::DateTime<chrono::Utc>) -> u64 {
    accepted
        .iter()
        .filter(|t| t.transaction_time >= since)
        .count() as u64
}

fn hour_of(time: chrono::DateTime<chrono::Utc>) -> u32 {
    use chrono::Timelike;
    time.hour()
}

/// Weekday as 0..=6 with Monday first
fn weekday_index(time: chrono::DateTime<chrono::Utc>) -> u32 {
    use chrono::Datelike;
    time.weekday().num_days_from_monday()
}

/// Most frequent keys, ties broken by the natural order of the key so the
/// result is deterministic across runs.
fn top_k_by_frequency<T: Ord + Hash + Clone>(items: impl Iterator<Item = T>, k: usize) -> Vec<T> {
    let mut counts: HashMap<T, u64> = HashMap::new();
    for item in items {
        *counts.entry(item).or_default() += 1;
    }
    let mut entries: Vec<(T, u64)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(k);
    entries.into_iter().map(|(key, _)| key).collect()
}

fn distinct_sorted(items: impl Iterator<Item = String>) -> Vec<String> {
    let set: BTreeSet<String> = items.collect();
    set.into_iter().collect()
}

fn distinct_count<'a>(items: impl Iterator<Item = &'a str>) -> usize {
    items.collect::<BTreeSet<&str>>().len()
}

fn consistency_score(mean: f64, std_dev: f64, samples: usize) -> f64 {
    if samples < CONSISTENCY_MIN_SAMPLES || mean <= 0.0 {
        return 0.5;
    }
    (1.0 - (std_dev / mean).min(1.0)).max(0.0)
}

fn diversity_score(unique_merchants: usize, unique_categories: usize) -> f64 {
    let merchant_part = (unique_merchants as f64 / DIVERSITY_MERCHANT_SCALE).min(1.0);
    let category_part = (unique_categories as f64 / DIVERSITY_CATEGORY_SCALE).min(1.0);
    (merchant_part + category_part) / 2.0
}

/// Mean absolute inter-arrival gap over the time-descending history,
/// normalized by a week and clamped to [0, 1]. Below two samples there is no
/// interval to measure, so the neutral 0.5 is kept.
fn velocity_pattern(accepted: &[&Transaction]) -> f64 {
    if accepted.len() < 2 {
        return 0.5;
    }
    let intervals: Vec<f64> = accepted
        .windows(2)
        .map(|pair| {
            (pair[0].transaction_time - pair[1].transaction_time)
                .num_seconds()
                .abs() as f64
        })
        .collect();
    clamp01(intervals.iter().mean() / SECONDS_PER_WEEK)
}

// =============================================================================
// BACKGROUND UPDATE QUEUE
// =============================================================================

/// Bounded queue feeding the background aggregation worker. Scheduling is an
/// explicit call; the request path never waits on the refresh. A full queue
/// drops the refresh — the next transaction re-enqueues the user.
pub struct BehaviorUpdateQueue {
    sender: mpsc::Sender<Uuid>,
}

impl BehaviorUpdateQueue {
    /// Spawn the worker task and return the queue handle
    pub fn start(aggregator: Arc<BehaviorAggregator>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Uuid>(capacity);
        tokio::spawn(async move {
            while let Some(user_id) = receiver.recv().await {
                if let Err(e) = aggregator.update_profile(user_id).await {
                    warn!("Behavior aggregation failed for user {}: {}", user_id, e);
                }
            }
        });
        Self { sender }
    }

    /// Schedule an asynchronous profile refresh for the user
    pub fn enqueue(&self, user_id: Uuid) {
        if let Err(e) = self.sender.try_send(user_id) {
            warn!("Behavior update queue rejected refresh: {}", e);
        }
    }
}
