// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::{RoutingConfig, RoutingConfigStore};
use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

/// Config held in process memory. The mutex makes each increment a single step.
pub struct InMemoryRoutingConfigStore {
    config: Mutex<RoutingConfig>,
}

impl InMemoryRoutingConfigStore {
    pub fn new(config: RoutingConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    /// Operator-side edit.
    pub async fn update<F: FnOnce(&mut RoutingConfig)>(&self, edit: F) {
        edit(&mut *self.config.lock().await);
    }
}

#[async_trait]
impl RoutingConfigStore for InMemoryRoutingConfigStore {
    async fn load(&self) -> Result<RoutingConfig, StoreError> {
        Ok(self.config.lock().await.clone())
    }

    async fn increment_spend(
        &self,
        cost_cents: i64,
        month: NaiveDate,
    ) -> Result<i64, StoreError> {
        let mut config = self.config.lock().await;

        if config.spend_month >= month {
            config.current_month_spend_cents += cost_cents;
        } else {
            config.current_month_spend_cents = cost_cents;
            config.spend_month = month;
        }

        Ok(config.current_month_spend_cents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, 1).unwrap()
    }

    #[tokio::test]
    async fn late_charge_for_previous_month_keeps_new_month_spend() {
        let store = InMemoryRoutingConfigStore::new(RoutingConfig {
            spend_month: month(10),
            current_month_spend_cents: 300,
            ..RoutingConfig::default()
        });

        let total = store.increment_spend(1, month(9)).await.unwrap();

        let config = store.load().await.unwrap();
        assert_eq!(total, 301);
        assert_eq!(config.spend_month, month(10));
        assert_eq!(config.spend_for_month(month(10)), 301);
    }

    #[tokio::test]
    async fn first_charge_of_a_month_restarts_the_counter() {
        let store = InMemoryRoutingConfigStore::new(RoutingConfig {
            spend_month: month(9),
            current_month_spend_cents: 900,
            ..RoutingConfig::default()
        });

        assert_eq!(store.increment_spend(5, month(10)).await.unwrap(), 5);
        assert_eq!(store.load().await.unwrap().spend_month, month(10));
    }
}
