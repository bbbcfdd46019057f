use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{OrbitRegime, RawElementSet};
use crate::store::{HistoryRecord, Snapshot};
use crate::sync::{SyncOutcome, SyncReport};
use crate::tle::DerivedOrbitalParameters;

#[derive(Debug, Clone, Serialize)]
pub struct DerivationResult {
    pub name: String,
    pub catalog_id: Option<u32>,
    pub epoch: Option<DateTime<Utc>>,
    pub derived: Option<DerivedOrbitalParameters>,
    pub regime: Option<OrbitRegime>,
}

impl DerivationResult {
    pub fn from_elements(elements: &RawElementSet) -> Self {
        let derived = crate::tle::derive(&elements.line1, &elements.line2);
        Self {
            name: elements.name.clone(),
            catalog_id: elements.catalog_id().ok().map(|id| id.get()),
            epoch: crate::epoch::resolve_epoch(&elements.line1).ok(),
            regime: derived.as_ref().map(DerivedOrbitalParameters::regime),
            derived,
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_outcome(outcome: &SyncOutcome) -> io::Result<()> {
        Self::print_json(outcome)
    }

    pub fn print_report(report: &SyncReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_snapshot(snapshot: &Snapshot) -> io::Result<()> {
        Self::print_json(snapshot)
    }

    pub fn print_history(history: &[HistoryRecord]) -> io::Result<()> {
        Self::print_json(&history)
    }

    pub fn print_derivations(results: &[DerivationResult]) -> io::Result<()> {
        Self::print_json(&results)
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
