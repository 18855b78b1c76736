//! Persistence abstraction for the fraud scoring service.
//!
//! The `Store` trait is the only seam the pipeline touches for durable state.
//! Lookups return `Ok(None)` for missing records; errors are reserved for the
//! backing engine failing. `MemoryStore` is the reference implementation used
//! for wiring and tests; production deployments plug a database-backed store
//! into the same trait.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use payguard_errors::Result;

use crate::models::{FraudAlert, FraudStatus, Transaction, User, UserBehavior};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<User>>;
    async fn save_user(&self, user: &User) -> Result<()>;
    async fn exists_by_email(&self, email: &str) -> Result<bool>;
    async fn exists_by_phone(&self, phone_number: &str) -> Result<bool>;

    // Transactions
    async fn find_transaction_by_id(&self, transaction_id: Uuid) -> Result<Option<Transaction>>;
    async fn find_by_user_id_order_by_time_desc(&self, user_id: Uuid) -> Result<Vec<Transaction>>;
    async fn count_transactions_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<u64>;
    async fn find_distinct_devices_by_user_id(&self, user_id: Uuid) -> Result<Vec<String>>;
    async fn find_distinct_countries_by_user_id(&self, user_id: Uuid) -> Result<Vec<String>>;
    async fn count_fraudulent_transactions(&self, user_id: Uuid) -> Result<u64>;
    async fn save_transaction(&self, transaction: &Transaction) -> Result<()>;

    // Behavior profiles
    async fn find_behavior_by_user_id(&self, user_id: Uuid) -> Result<Option<UserBehavior>>;
    async fn save_behavior(&self, behavior: &UserBehavior) -> Result<()>;

    // Fraud alerts
    async fn save_fraud_alert(&self, alert: &FraudAlert) -> Result<()>;
    async fn find_alert_by_id(&self, alert_id: Uuid) -> Result<Option<FraudAlert>>;
    async fn find_alert_by_transaction_id(&self, transaction_id: Uuid)
        -> Result<Option<FraudAlert>>;
    async fn find_alerts_by_user_id(&self, user_id: Uuid) -> Result<Vec<FraudAlert>>;
    async fn find_unreviewed_alerts(&self) -> Result<Vec<FraudAlert>>;
}

/// In-memory store keyed the same way the persisted layout is (primary id,
/// with scans standing in for the secondary indices).
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    transactions: RwLock<HashMap<Uuid, Transaction>>,
    behaviors: RwLock<HashMap<Uuid, UserBehavior>>,
    alerts: RwLock<HashMap<Uuid, FraudAlert>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.phone_number == phone_number)
            .cloned())
    }

    async fn save_user(&self, user: &User) -> Result<()> {
        self.users.write().await.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool> {
        Ok(self.users.read().await.values().any(|u| u.email == email))
    }

    async fn exists_by_phone(&self, phone_number: &str) -> Result<bool> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .any(|u| u.phone_number == phone_number))
    }

    async fn find_transaction_by_id(&self, transaction_id: Uuid) -> Result<Option<Transaction>> {
        Ok(self.transactions.read().await.get(&transaction_id).cloned())
    }

    async fn find_by_user_id_order_by_time_desc(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| {
            b.transaction_time
                .cmp(&a.transaction_time)
                .then(b.transaction_id.cmp(&a.transaction_id))
        });
        Ok(transactions)
    }

    async fn count_transactions_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.user_id == user_id && t.transaction_time >= since)
            .count() as u64)
    }

    async fn find_distinct_devices_by_user_id(&self, user_id: Uuid) -> Result<Vec<String>> {
        let devices: BTreeSet<String> = self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.user_id == user_id)
            .filter_map(|t| t.device_id.clone())
            .collect();
        Ok(devices.into_iter().collect())
    }

    async fn find_distinct_countries_by_user_id(&self, user_id: Uuid) -> Result<Vec<String>> {
        let countries: BTreeSet<String> = self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.user_id == user_id)
            .filter_map(|t| t.country.clone())
            .collect();
        Ok(countries.into_iter().collect())
    }

    async fn count_fraudulent_transactions(&self, user_id: Uuid) -> Result<u64> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.user_id == user_id && t.fraud_status == FraudStatus::Fraud)
            .count() as u64)
    }

    async fn save_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.transactions
            .write()
            .await
            .insert(transaction.transaction_id, transaction.clone());
        Ok(())
    }

    async fn find_behavior_by_user_id(&self, user_id: Uuid) -> Result<Option<UserBehavior>> {
        Ok(self.behaviors.read().await.get(&user_id).cloned())
    }

    async fn save_behavior(&self, behavior: &UserBehavior) -> Result<()> {
        self.behaviors
            .write()
            .await
            .insert(behavior.user_id, behavior.clone());
        Ok(())
    }

    async fn save_fraud_alert(&self, alert: &FraudAlert) -> Result<()> {
        let mut alerts = self.alerts.write().await;
        // Alerts are keyed by transaction: a re-evaluation replaces rather
        // than duplicates.
        alerts.retain(|_, existing| existing.transaction_id != alert.transaction_id);
        alerts.insert(alert.alert_id, alert.clone());
        Ok(())
    }

    async fn find_alert_by_id(&self, alert_id: Uuid) -> Result<Option<FraudAlert>> {
        Ok(self.alerts.read().await.get(&alert_id).cloned())
    }

    async fn find_alert_by_transaction_id(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<FraudAlert>> {
        Ok(self
            .alerts
            .read()
            .await
            .values()
            .find(|a| a.transaction_id == transaction_id)
            .cloned())
    }

    async fn find_alerts_by_user_id(&self, user_id: Uuid) -> Result<Vec<FraudAlert>> {
        let mut alerts: Vec<FraudAlert> = self
            .alerts
            .read()
            .await
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(alerts)
    }

    async fn find_unreviewed_alerts(&self) -> Result<Vec<FraudAlert>> {
        let mut alerts: Vec<FraudAlert> = self
            .alerts
            .read()
            .await
            .values()
            .filter(|a| !a.reviewed)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(alerts)
    }
}
