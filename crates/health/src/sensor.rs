//! Per-cycle sensor logs.
//!
//! Each metadata row references a detail file holding the time series
//! recorded during that test. Column names vary between datasets, so the
//! voltage and temperature channels are located through a [`ColumnMapping`]
//! of candidate names. A file that matches none of the candidates for a
//! required channel is rejected rather than guessed at.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("sensor log not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("no {field} column in {filename} (tried: {})", .candidates.join(", "))]
    MissingColumn {
        filename: String,
        field: &'static str,
        candidates: Vec<String>,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorChannel {
    Voltage,
    Temperature,
    Current,
}

impl SensorChannel {
    pub fn field_name(&self) -> &'static str {
        match self {
            SensorChannel::Voltage => "voltage",
            SensorChannel::Temperature => "temperature",
            SensorChannel::Current => "current",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            SensorChannel::Voltage => "V",
            SensorChannel::Temperature => "°C",
            SensorChannel::Current => "A",
        }
    }
}

/// Candidate column names per sensor channel, tried in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub voltage: Vec<String>,
    pub temperature: Vec<String>,
    /// Optional channel; logs without a match simply have no current series.
    pub current: Vec<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            voltage: vec!["Voltage_measured".to_string(), "voltage".to_string()],
            temperature: vec![
                "Temperature_measured".to_string(),
                "temperature".to_string(),
            ],
            current: vec!["Current_measured".to_string(), "current".to_string()],
        }
    }
}

impl ColumnMapping {
    fn candidates(&self, channel: SensorChannel) -> &[String] {
        match channel {
            SensorChannel::Voltage => &self.voltage,
            SensorChannel::Temperature => &self.temperature,
            SensorChannel::Current => &self.current,
        }
    }

    fn find(&self, channel: SensorChannel, headers: &csv::StringRecord) -> Option<usize> {
        self.candidates(channel)
            .iter()
            .find_map(|name| headers.iter().position(|h| h == name))
    }

    fn require(
        &self,
        channel: SensorChannel,
        headers: &csv::StringRecord,
        filename: &str,
    ) -> Result<usize, SensorError> {
        self.find(channel, headers)
            .ok_or_else(|| SensorError::MissingColumn {
                filename: filename.to_string(),
                field: channel.field_name(),
                candidates: self.candidates(channel).to_vec(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub first: f64,
    pub last: f64,
}

impl ChannelSummary {
    fn from_values(values: &[f64]) -> Option<Self> {
        let (&first, &last) = (values.first()?, values.last()?);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(Self {
            count: values.len(),
            min,
            max,
            mean,
            first,
            last,
        })
    }
}

#[derive(Debug, Clone)]
struct Series {
    column: String,
    values: Vec<f64>,
}

/// A loaded detail file with its resolved sensor channels.
#[derive(Debug, Clone)]
pub struct SensorLog {
    filename: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    voltage: Series,
    temperature: Series,
    current: Option<Series>,
}

impl SensorLog {
    pub fn load(dir: &Path, filename: &str, mapping: &ColumnMapping) -> Result<Self, SensorError> {
        let path = dir.join(filename);
        if !path.is_file() {
            return Err(SensorError::NotFound { path });
        }

        let file = File::open(&path).map_err(|source| SensorError::Io {
            path: path.clone(),
            source,
        })?;
        let log = Self::from_reader(filename, file, mapping)?;

        debug!(
            path = %path.display(),
            rows = log.rows.len(),
            voltage = %log.voltage.column,
            temperature = %log.temperature.column,
            "Loaded sensor log"
        );
        Ok(log)
    }

    pub fn from_reader<R: io::Read>(
        filename: &str,
        reader: R,
        mapping: &ColumnMapping,
    ) -> Result<Self, SensorError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let voltage_idx = mapping.require(SensorChannel::Voltage, &headers, filename)?;
        let temperature_idx = mapping.require(SensorChannel::Temperature, &headers, filename)?;
        let current_idx = mapping.find(SensorChannel::Current, &headers);

        let mut voltage = Vec::new();
        let mut temperature = Vec::new();
        let mut current = Vec::new();
        let mut rows = Vec::new();

        for record in csv_reader.records() {
            let record = record?;
            push_numeric(&mut voltage, &record, voltage_idx);
            push_numeric(&mut temperature, &record, temperature_idx);
            if let Some(idx) = current_idx {
                push_numeric(&mut current, &record, idx);
            }
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self {
            filename: filename.to_string(),
            headers: headers.iter().map(str::to_string).collect(),
            rows,
            voltage: Series {
                column: headers[voltage_idx].to_string(),
                values: voltage,
            },
            temperature: Series {
                column: headers[temperature_idx].to_string(),
                values: temperature,
            },
            current: current_idx.map(|idx| Series {
                column: headers[idx].to_string(),
                values: current,
            }),
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Raw trimmed cells of each row. Short rows are kept as read.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    fn series(&self, channel: SensorChannel) -> Option<&Series> {
        match channel {
            SensorChannel::Voltage => Some(&self.voltage),
            SensorChannel::Temperature => Some(&self.temperature),
            SensorChannel::Current => self.current.as_ref(),
        }
    }

    /// Source column the channel was resolved to.
    pub fn column(&self, channel: SensorChannel) -> Option<&str> {
        self.series(channel).map(|s| s.column.as_str())
    }

    pub fn values(&self, channel: SensorChannel) -> &[f64] {
        self.series(channel)
            .map(|s| s.values.as_slice())
            .unwrap_or(&[])
    }

    pub fn summary(&self, channel: SensorChannel) -> Option<ChannelSummary> {
        ChannelSummary::from_values(self.values(channel))
    }
}

fn push_numeric(values: &mut Vec<f64>, record: &csv::StringRecord, idx: usize) {
    if let Some(v) = record
        .get(idx)
        .and_then(|cell| cell.parse::<f64>().ok())
        .filter(|v| v.is_finite())
    {
        values.push(v);
    }
}
