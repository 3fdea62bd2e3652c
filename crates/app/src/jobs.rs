//! Demo sync jobs
//!
//! Stand-ins for real integrations. Each reports progress in a few steps,
//! pauses between them, and hands back the finish time as its high-water
//! mark.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use tidemark_core::{
    AlwaysEligible, EntitySync, IntervalEligibility, JobError, JobRegistry, ProgressReporter,
    SyncEntityOptions, SyncEntityType,
};
use tidemark_domain::{SyncResult, SyncTrigger};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const ORDERS_JOB: &str = "orders";
pub const INVOICES_JOB: &str = "invoices";
pub const CUSTOMERS_JOB: &str = "customers";

const STEPS: i64 = 4;

pub struct Orders;

impl SyncEntityType for Orders {
    const NAME: &'static str = "Orders";
}

pub struct Invoices;

impl SyncEntityType for Invoices {
    const NAME: &'static str = "Invoices";
    const SCHEMA_VERSION: Option<i32> = Some(2);
}

pub struct Customers;

impl SyncEntityType for Customers {
    const NAME: &'static str = "Customers";
}

/// Entities the demo host keeps in sync.
pub fn demo_entities() -> Vec<SyncEntityOptions> {
    vec![
        SyncEntityOptions::for_entity::<Orders>(ORDERS_JOB).with_eligibility(AlwaysEligible),
        SyncEntityOptions::for_entity::<Invoices>(INVOICES_JOB)
            .with_eligibility(IntervalEligibility::new(ChronoDuration::hours(1))),
        SyncEntityOptions::for_entity::<Customers>(CUSTOMERS_JOB)
            .with_parameter("region", "eu")
            .with_lease_expiration(ChronoDuration::minutes(10)),
    ]
}

/// Registry with one job per demo entity.
///
/// Customers gets a fresh job per run, the others share an instance.
pub fn demo_registry(step_delay: Duration) -> JobRegistry {
    let mut registry = JobRegistry::new()
        .with_job(ORDERS_JOB, Arc::new(DemoJob::new(step_delay)))
        .with_job(INVOICES_JOB, Arc::new(DemoJob::new(step_delay)));

    registry.register(CUSTOMERS_JOB, move || -> Arc<dyn EntitySync> {
        Arc::new(DemoJob::new(step_delay))
    });

    registry
}

pub struct DemoJob {
    step_delay: Duration,
}

impl DemoJob {
    pub const fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

#[async_trait]
impl EntitySync for DemoJob {
    async fn run(
        &self,
        trigger: &SyncTrigger,
        entity: &SyncEntityOptions,
        progress: &ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<SyncResult, JobError> {
        debug!(
            entity = %entity.entity(),
            since = ?trigger.prior_sync_info.high_water_mark,
            "Fetching changes"
        );

        for step in 0..=STEPS {
            if cancel.is_cancelled() {
                bail!("stopped at step {step} of {STEPS}");
            }
            progress.report(step, STEPS).await?;
            tokio::time::sleep(self.step_delay).await;
        }

        let mark = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        Ok(SyncResult::success(entity.entity()).with_high_water_mark(mark).with_record_count(STEPS))
    }
}
