//! Cycle records and per-battery histories.

use std::cmp::Ordering;
use std::fmt;

/// Test sequence key from the metadata table.
///
/// Integer ids compare numerically so `"10"` sorts after `"9"`. Anything
/// else compares as text, and numeric ids sort before text ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestId(String);

impl TestId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl Ord for TestId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for TestId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One numbered discharge cycle of a battery.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleRecord {
    pub battery_id: String,
    /// 1-based rank within the battery's discharge rows.
    pub cycle: u32,
    /// Measured capacity in amp-hours.
    pub capacity: f64,
    /// Ambient temperature in Celsius, if the source cell was numeric.
    pub ambient_temperature: Option<f64>,
    pub test_id: TestId,
    pub filename: String,
}

/// Discharge cycles of a single battery, ordered by cycle ascending.
///
/// Never empty: the first record is the baseline (fresh) capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryHistory {
    battery_id: String,
    records: Vec<CycleRecord>,
}

impl BatteryHistory {
    /// Builds a history, returning `None` for an empty record set.
    pub fn new(battery_id: impl Into<String>, records: Vec<CycleRecord>) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        Some(Self {
            battery_id: battery_id.into(),
            records,
        })
    }

    /// Builds a history from raw capacities, numbering cycles from 1.
    pub fn from_capacities(battery_id: &str, capacities: &[f64]) -> Option<Self> {
        let records = capacities
            .iter()
            .enumerate()
            .map(|(i, &capacity)| CycleRecord {
                battery_id: battery_id.to_string(),
                cycle: i as u32 + 1,
                capacity,
                ambient_temperature: None,
                test_id: TestId::new((i + 1).to_string()),
                filename: String::new(),
            })
            .collect();
        Self::new(battery_id, records)
    }

    pub fn battery_id(&self) -> &str {
        &self.battery_id
    }

    pub fn records(&self) -> &[CycleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn latest(&self) -> &CycleRecord {
        &self.records[self.records.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_orders_numerically() {
        let mut ids = vec![TestId::new("10"), TestId::new("9"), TestId::new("100")];
        ids.sort();
        let ordered: Vec<&str> = ids.iter().map(|t| t.as_str()).collect();
        assert_eq!(ordered, vec!["9", "10", "100"]);
    }

    #[test]
    fn test_id_text_after_numbers() {
        let mut ids = vec![
            TestId::new("2008-07-02T15:00"),
            TestId::new("3"),
            TestId::new("2008-04-02T13:08"),
        ];
        ids.sort();
        let ordered: Vec<&str> = ids.iter().map(|t| t.as_str()).collect();
        assert_eq!(ordered, vec!["3", "2008-04-02T13:08", "2008-07-02T15:00"]);
    }

    #[test]
    fn test_empty_history_rejected() {
        assert!(BatteryHistory::new("B0005", Vec::new()).is_none());
        assert!(BatteryHistory::from_capacities("B0005", &[]).is_none());
    }

    #[test]
    fn test_first_record_and_latest() {
        let history = BatteryHistory::from_capacities("B0005", &[2.0, 1.9, 1.7]).unwrap();
        assert_eq!(history.records()[0].capacity, 2.0);
        assert_eq!(history.latest().capacity, 1.7);
        assert_eq!(history.latest().cycle, 3);
        assert_eq!(history.len(), 3);
    }
}
