use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::catalog::CatalogClient;
use crate::clock::Clock;
use crate::domain::{CatalogId, ElementSets, OrbitRegime, OwnerId, RawElementSet, TrackedObject};
use crate::epoch::resolve_epoch;
use crate::error::TleError;
use crate::session::SessionManager;
use crate::store::{ElementRepository, HistoryRecord, InsertOutcome, Snapshot};
use crate::tle::derive;

#[derive(Debug, Clone, Copy)]
pub struct SyncPolicy {
    pub pacing: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            pacing: Duration::from_secs(1),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Stored,
    Duplicate,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncItemResult {
    pub catalog_id: CatalogId,
    pub owner_id: OwnerId,
    pub action: SyncAction,
    pub epoch: Option<DateTime<Utc>>,
    pub regime: Option<OrbitRegime>,
    pub error: Option<String>,
}

impl SyncItemResult {
    fn stored(record: &HistoryRecord, outcome: InsertOutcome) -> Self {
        Self {
            catalog_id: record.catalog_id,
            owner_id: record.owner_id.clone(),
            action: match outcome {
                InsertOutcome::Inserted => SyncAction::Stored,
                InsertOutcome::Duplicate => SyncAction::Duplicate,
            },
            epoch: Some(record.epoch),
            regime: Some(record.derived.regime()),
            error: None,
        }
    }

    fn skipped(object: &TrackedObject, err: &TleError) -> Self {
        Self {
            catalog_id: object.catalog_id,
            owner_id: object.owner_id.clone(),
            action: SyncAction::Skipped,
            epoch: None,
            regime: None,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub items: Vec<SyncItemResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<String>,
}

impl SyncReport {
    pub fn count(&self, action: SyncAction) -> usize {
        self.items.iter().filter(|item| item.action == action).count()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncOutcome {
    Completed { attempts: u32, report: SyncReport },
    Exhausted { attempts: u32, error: String },
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed { .. })
    }
}

pub struct SyncOrchestrator<C: CatalogClient, R: ElementRepository> {
    session: SessionManager<C>,
    repository: R,
    policy: SyncPolicy,
    clock: Arc<dyn Clock>,
}

impl<C: CatalogClient, R: ElementRepository> SyncOrchestrator<C, R> {
    pub fn new(
        session: SessionManager<C>,
        repository: R,
        policy: SyncPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session,
            repository,
            policy,
            clock,
        }
    }

    pub fn session(&self) -> &SessionManager<C> {
        &self.session
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn run_sync(&mut self) -> SyncOutcome {
        let mut last_error = None;
        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                self.clock.sleep(self.policy.retry_backoff);
            }
            match self.run_pass() {
                Ok(report) => {
                    info!(
                        attempt,
                        stored = report.count(SyncAction::Stored),
                        duplicates = report.count(SyncAction::Duplicate),
                        skipped = report.count(SyncAction::Skipped),
                        "sync completed"
                    );
                    return SyncOutcome::Completed {
                        attempts: attempt,
                        report,
                    };
                }
                Err(err) => {
                    self.session.invalidate();
                    warn!(attempt, max_attempts = self.policy.max_attempts, error = %err, "sync pass failed");
                    last_error = Some(err);
                }
            }
        }

        let error = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no sync attempts configured".to_string());
        error!(attempts = self.policy.max_attempts, %error, "sync abandoned");
        SyncOutcome::Exhausted {
            attempts: self.policy.max_attempts,
            error,
        }
    }

    pub fn run_pass(&mut self) -> Result<SyncReport, TleError> {
        self.session.ensure_session()?;
        let objects = self.repository.tracked_objects()?;
        info!(objects = objects.len(), "sync pass started");

        let mut report = SyncReport::default();
        for (index, object) in objects.iter().enumerate() {
            if index > 0 {
                self.clock.sleep(self.policy.pacing);
            }
            let item = match self.sync_object(object) {
                Ok(item) => item,
                Err(err) => {
                    warn!(%object, error = %err, "skipping object");
                    SyncItemResult::skipped(object, &err)
                }
            };
            report.items.push(item);
        }
        Ok(report)
    }

    pub fn lookup(&mut self, object: &TrackedObject) -> Result<Snapshot, TleError> {
        if let Some(snapshot) = self.repository.snapshot(object)? {
            return Ok(snapshot);
        }
        debug!(%object, "no snapshot stored; fetching on demand");
        self.fetch_on_demand(object).map_err(|err| {
            warn!(%object, error = %err, "on-demand fetch failed");
            TleError::ObjectNotFound(object.to_string())
        })
    }

    fn fetch_on_demand(&mut self, object: &TrackedObject) -> Result<Snapshot, TleError> {
        self.sync_object(object)?;
        self.repository.track(object)?;
        self.repository
            .snapshot(object)?
            .ok_or_else(|| TleError::ObjectNotFound(object.to_string()))
    }

    fn sync_object(&mut self, object: &TrackedObject) -> Result<SyncItemResult, TleError> {
        let elements = self.session.fetch_latest(object.catalog_id)?;
        let record = build_record(object, elements, self.clock.now())?;
        let outcome = store_record(&self.repository, &record, self.clock.now())?;
        Ok(SyncItemResult::stored(&record, outcome))
    }
}

pub fn import<R: ElementRepository>(
    repository: &R,
    clock: &dyn Clock,
    owner: &OwnerId,
    text: &str,
) -> SyncReport {
    let mut report = SyncReport::default();
    for parsed in ElementSets::new(text) {
        let (catalog_id, elements) = match parsed.and_then(|elements| {
            let catalog_id = elements.catalog_id()?;
            Ok((catalog_id, elements))
        }) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "rejecting element set");
                report.rejected.push(err.to_string());
                continue;
            }
        };
        let object = TrackedObject::new(catalog_id, owner.clone());
        let item = build_record(&object, elements, clock.now())
            .and_then(|record| {
                let outcome = store_record(repository, &record, clock.now())?;
                repository.track(&object)?;
                Ok(SyncItemResult::stored(&record, outcome))
            })
            .unwrap_or_else(|err| {
                warn!(%object, error = %err, "skipping imported element set");
                SyncItemResult::skipped(&object, &err)
            });
        report.items.push(item);
    }
    report
}

fn build_record(
    object: &TrackedObject,
    elements: RawElementSet,
    recorded_at: DateTime<Utc>,
) -> Result<HistoryRecord, TleError> {
    let derived = derive(&elements.line1, &elements.line2)
        .ok_or_else(|| TleError::DerivationFailed(object.catalog_id.to_string()))?;
    let epoch = resolve_epoch(&elements.line1)?;
    Ok(HistoryRecord {
        catalog_id: object.catalog_id,
        owner_id: object.owner_id.clone(),
        epoch,
        elements,
        derived,
        recorded_at,
    })
}

// Snapshot tracks the newest epoch in history, duplicates included.
fn store_record<R: ElementRepository>(
    repository: &R,
    record: &HistoryRecord,
    now: DateTime<Utc>,
) -> Result<InsertOutcome, TleError> {
    let outcome = repository.insert_history(record)?;
    let object = record.object();
    let refresh = repository
        .snapshot(&object)?
        .is_none_or(|current| record.epoch > current.epoch);
    if refresh {
        repository.upsert_snapshot(&Snapshot::from_record(record, now))?;
    }
    match outcome {
        InsertOutcome::Inserted => {
            info!(%object, epoch = %record.epoch, regime = %record.derived.regime(), "stored element set")
        }
        InsertOutcome::Duplicate => debug!(%object, epoch = %record.epoch, "element set already stored"),
    }
    Ok(outcome)
}
