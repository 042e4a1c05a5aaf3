//! Registry of known plates and their compliance status.
//!
//! The pipeline only ever reads snapshots; the registry owns the rows.

use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use tracing::debug;
use tracing::warn;

use crate::PlateError;
use crate::Result;

/// A yes/no registry flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compliance {
    Yes,
    No,
}

impl FromStr for Compliance {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" => Ok(Compliance::Yes),
            "no" | "n" => Ok(Compliance::No),
            other => Err(format!("expected Yes or No, got {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlateRecord {
    pub plate: String,
    pub puc: Compliance,
    pub challan: Compliance,
    pub insurance_valid: Compliance,
    pub contact_number: String,
}

impl PlateRecord {
    /// True when any of PUC, challan or insurance is outstanding.
    pub fn has_pending_compliance(&self) -> bool {
        [self.puc, self.challan, self.insurance_valid].contains(&Compliance::No)
    }
}

/// Source of registry snapshots. Implementations must return fresh data on
/// every call so external edits show up on the next frame.
pub trait PlateRegistry {
    fn snapshot(&self) -> Result<Vec<PlateRecord>>;
}

/// Fixed set of rows, handy for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    records: Vec<PlateRecord>,
}

impl InMemoryRegistry {
    pub fn new(records: Vec<PlateRecord>) -> Self {
        Self { records }
    }
}

impl PlateRegistry for InMemoryRegistry {
    fn snapshot(&self) -> Result<Vec<PlateRecord>> {
        Ok(self.records.clone())
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Number_Plate")]
    plate: Option<String>,
    #[serde(rename = "PUC")]
    puc: Option<String>,
    #[serde(rename = "Challan")]
    challan: Option<String>,
    #[serde(rename = "Insurance_Valid")]
    insurance_valid: Option<String>,
    #[serde(rename = "Contact_Number")]
    contact_number: Option<String>,
}

fn required(field: Option<String>, name: &str) -> std::result::Result<String, String> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(format!("missing {name}")),
    }
}

impl TryFrom<CsvRow> for PlateRecord {
    type Error = String;

    fn try_from(row: CsvRow) -> std::result::Result<Self, Self::Error> {
        Ok(PlateRecord {
            plate: required(row.plate, "Number_Plate")?,
            puc: required(row.puc, "PUC")?.parse()?,
            challan: required(row.challan, "Challan")?.parse()?,
            insurance_valid: required(row.insurance_valid, "Insurance_Valid")?.parse()?,
            contact_number: required(row.contact_number, "Contact_Number")?,
        })
    }
}

/// CSV file with `Number_Plate, PUC, Challan, Insurance_Valid, Contact_Number`
/// columns, re-read on every snapshot.
pub struct CsvRegistry {
    path: PathBuf,
    reported_malformed: AtomicBool,
}

impl CsvRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reported_malformed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PlateRegistry for CsvRegistry {
    fn snapshot(&self) -> Result<Vec<PlateRecord>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| PlateError::Registry(format!("{}: {e}", self.path.display())))?;

        let mut records = Vec::new();
        let mut malformed = Vec::new();
        for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
            // Header is line 1.
            let line = index + 2;
            match row.map_err(|e| e.to_string()).and_then(PlateRecord::try_from) {
                Ok(record) => records.push(record),
                Err(reason) => malformed.push((line, reason)),
            }
        }

        if !malformed.is_empty() && !self.reported_malformed.swap(true, Ordering::Relaxed) {
            for (line, reason) in &malformed {
                warn!(path = %self.path.display(), line, %reason, "skipping malformed registry row");
            }
        }
        debug!(rows = records.len(), skipped = malformed.len(), "registry snapshot");

        Ok(records)
    }
}
