//! Metadata table ingestion and per-battery cycle numbering.

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::record::{BatteryHistory, CycleRecord, TestId};

/// Row type that counts as one capacity measurement.
pub const DISCHARGE_TYPE: &str = "discharge";

const REQUIRED_COLUMNS: [&str; 4] = ["battery_id", "test_id", "type", "Capacity"];

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("metadata file not found: {}", .path.display())]
    Configuration { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("metadata table is missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("metadata table contains no discharge cycles with a valid capacity")]
    NoDischargeCycles,

    #[error("no discharge cycles with a valid capacity for battery {battery_id}")]
    Data { battery_id: String },
}

/// One raw row of the metadata table, of any test type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetadataRow {
    pub battery_id: String,
    pub test_id: String,
    #[serde(rename = "type")]
    pub test_type: String,
    #[serde(rename = "Capacity", default)]
    pub capacity: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub ambient_temperature: String,
}

impl MetadataRow {
    pub fn test_id(&self) -> TestId {
        TestId::new(self.test_id.as_str())
    }

    pub fn is_discharge(&self) -> bool {
        self.test_type.trim() == DISCHARGE_TYPE
    }

    /// Capacity coerced to a number; `None` for blank or malformed cells.
    pub fn capacity(&self) -> Option<f64> {
        parse_number(&self.capacity)
    }

    pub fn ambient_temperature(&self) -> Option<f64> {
        parse_number(&self.ambient_temperature)
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// The loaded metadata table and the discharge histories derived from it.
#[derive(Debug, Clone)]
pub struct Fleet {
    rows: Vec<MetadataRow>,
    histories: BTreeMap<String, BatteryHistory>,
}

impl Fleet {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoadError::Configuration {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let fleet = Self::from_reader(file)?;

        info!(
            path = %path.display(),
            rows = fleet.rows.len(),
            batteries = fleet.histories.len(),
            "Loaded metadata table"
        );
        Ok(fleet)
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, LoadError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(LoadError::MissingColumn(column));
            }
        }

        let rows = csv_reader
            .deserialize::<MetadataRow>()
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_rows(rows)
    }

    pub fn from_rows(rows: Vec<MetadataRow>) -> Result<Self, LoadError> {
        let histories = build_histories(&rows);
        if histories.is_empty() {
            return Err(LoadError::NoDischargeCycles);
        }
        Ok(Self { rows, histories })
    }

    pub fn rows(&self) -> &[MetadataRow] {
        &self.rows
    }

    pub fn histories(&self) -> impl Iterator<Item = &BatteryHistory> {
        self.histories.values()
    }

    /// Battery ids with at least one valid discharge cycle, sorted.
    pub fn battery_ids(&self) -> Vec<&str> {
        self.histories.keys().map(|k| k.as_str()).collect()
    }

    pub fn history(&self, battery_id: &str) -> Result<&BatteryHistory, LoadError> {
        self.histories
            .get(battery_id)
            .ok_or_else(|| LoadError::Data {
                battery_id: battery_id.to_string(),
            })
    }

    /// Every log row for a battery, newest test first.
    pub fn logs_for(&self, battery_id: &str) -> Vec<&MetadataRow> {
        let mut logs: Vec<(TestId, &MetadataRow)> = self
            .rows
            .iter()
            .filter(|r| r.battery_id == battery_id)
            .map(|r| (r.test_id(), r))
            .collect();
        logs.sort_by(|a, b| b.0.cmp(&a.0));
        logs.into_iter().map(|(_, r)| r).collect()
    }
}

/// Groups valid discharge rows by battery and numbers them by test order.
///
/// Rows with a blank or malformed capacity are dropped, never defaulted.
/// Batteries with no remaining rows get no history.
pub fn build_histories(rows: &[MetadataRow]) -> BTreeMap<String, BatteryHistory> {
    let mut grouped: BTreeMap<&str, Vec<(TestId, f64, &MetadataRow)>> = BTreeMap::new();
    let mut dropped = 0usize;

    for row in rows.iter().filter(|r| r.is_discharge()) {
        match row.capacity() {
            Some(capacity) => grouped
                .entry(row.battery_id.as_str())
                .or_default()
                .push((row.test_id(), capacity, row)),
            None => {
                dropped += 1;
                debug!(
                    battery_id = %row.battery_id,
                    test_id = %row.test_id,
                    capacity = %row.capacity,
                    "Dropping discharge row with invalid capacity"
                );
            }
        }
    }

    if dropped > 0 {
        debug!(dropped, "Dropped discharge rows");
    }

    grouped
        .into_iter()
        .filter_map(|(battery_id, mut entries)| {
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let records = entries
                .into_iter()
                .enumerate()
                .map(|(i, (test_id, capacity, row))| CycleRecord {
                    battery_id: battery_id.to_string(),
                    cycle: i as u32 + 1,
                    capacity,
                    ambient_temperature: row.ambient_temperature(),
                    test_id,
                    filename: row.filename.clone(),
                })
                .collect();
            BatteryHistory::new(battery_id, records).map(|h| (battery_id.to_string(), h))
        })
        .collect()
}
