// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Monthly ceiling on paid routing spend.

use crate::errors::StoreError;
use crate::routing_config::{RoutingConfig, RoutingConfigStore};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// A zero budget means paid routing is off, not unlimited.
pub fn budget_allows(config: &RoutingConfig, month: NaiveDate) -> bool {
    budget_allows_pending(config, month, 0)
}

/// Same gate, counting cents already promised to calls that have not settled yet.
pub fn budget_allows_pending(config: &RoutingConfig, month: NaiveDate, pending_cents: i64) -> bool {
    if config.monthly_budget_cents == 0 {
        return false;
    }

    config.spend_for_month(month) + pending_cents < config.monthly_budget_cents
}

#[derive(Clone)]
pub struct BudgetGovernor {
    config: Arc<dyn RoutingConfigStore>,
    // held only while a reservation is checked and taken, never across a paid call
    reservation_lock: Arc<Mutex<()>>,
    in_flight_cents: Arc<AtomicI64>,
}

/// Cents set aside for one paid call. Spends nothing unless committed; dropping it hands the
/// reservation back.
pub struct EscalationPermit<'a> {
    governor: &'a BudgetGovernor,
    reserved_cents: i64,
}

impl BudgetGovernor {
    pub fn new(config: Arc<dyn RoutingConfigStore>) -> Self {
        Self {
            config,
            reservation_lock: Arc::new(Mutex::new(())),
            in_flight_cents: Arc::new(AtomicI64::new(0)),
        }
    }

    pub async fn check_budget(&self) -> Result<bool, StoreError> {
        self.check_budget_at(Utc::now()).await
    }

    pub async fn check_budget_at(&self, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let config = self.config.load().await?;
        Ok(budget_allows(&config, crate::billing_month(now)))
    }

    /// Records spend for a paid call that has already succeeded.
    pub async fn increment_spend(&self, cost_cents: i64) -> Result<i64, StoreError> {
        self.increment_spend_at(cost_cents, Utc::now()).await
    }

    pub async fn increment_spend_at(
        &self,
        cost_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let month = crate::billing_month(now);
        let total = self.config.increment_spend(cost_cents, month).await?;

        info!(cost_cents, month_total_cents = total, %month, "paid routing spend recorded");

        Ok(total)
    }

    pub fn in_flight_cents(&self) -> i64 {
        self.in_flight_cents.load(Ordering::SeqCst)
    }

    /// Sets `cost_cents` aside if the budget, less what other calls in this process already
    /// hold, still has room. `None` when it does not or cannot be read.
    pub async fn reserve(&self, cost_cents: i64) -> Option<EscalationPermit<'_>> {
        let _turn = self.reservation_lock.lock().await;
        let month = crate::billing_month(Utc::now());

        let config = match self.config.load().await {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "could not read routing budget, not escalating");
                return None;
            }
        };

        if !budget_allows_pending(&config, month, self.in_flight_cents()) {
            return None;
        }

        self.in_flight_cents.fetch_add(cost_cents, Ordering::SeqCst);

        Some(EscalationPermit {
            governor: self,
            reserved_cents: cost_cents,
        })
    }
}

impl EscalationPermit<'_> {
    /// Charges the call to the current month, then releases the reservation.
    pub async fn commit(self, cost_cents: i64) -> Result<i64, StoreError> {
        self.governor.increment_spend(cost_cents).await
    }
}

impl Drop for EscalationPermit<'_> {
    fn drop(&mut self) {
        self.governor
            .in_flight_cents
            .fetch_sub(self.reserved_cents, Ordering::SeqCst);
    }
}
