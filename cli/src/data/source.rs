use std::path::PathBuf;

use sentinel_health::{
    ColumnMapping, EstimationError, Fleet, HealthEstimator, LoadError, SensorError, SensorLog,
};
use sentinel_protocol::{
    BatterySummary, EstimatorParams, FleetReport, HealthSnapshot, LogEntry, SensorLogSnapshot,
    TrendSnapshot,
};

use crate::config::UserConfig;
use crate::daemon::{ClientError, DaemonClient};
use crate::data::snapshot;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Estimation(#[from] EstimationError),

    #[error(transparent)]
    Sensor(SensorError),

    /// A referenced sensor log is absent. Callers warn and carry on.
    #[error("sensor log not found: {0}")]
    DataNotFound(String),

    #[error(transparent)]
    Client(ClientError),
}

impl SourceError {
    pub fn is_data_not_found(&self) -> bool {
        matches!(self, SourceError::DataNotFound(_))
    }
}

impl From<SensorError> for SourceError {
    fn from(e: SensorError) -> Self {
        match e {
            SensorError::NotFound { path } => SourceError::DataNotFound(path.display().to_string()),
            other => SourceError::Sensor(other),
        }
    }
}

impl From<ClientError> for SourceError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::DataNotFound(path) => SourceError::DataNotFound(path),
            other => SourceError::Client(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// Where commands read battery health from: the local table or a running daemon.
pub trait HealthSource {
    fn batteries(&mut self) -> Result<Vec<BatterySummary>>;
    fn health(&mut self, battery_id: &str) -> Result<HealthSnapshot>;
    fn trend(&mut self, battery_id: &str) -> Result<TrendSnapshot>;
    fn fleet_report(&mut self) -> Result<FleetReport>;
    fn logs(&mut self, battery_id: &str) -> Result<Vec<LogEntry>>;
    fn sensor_log(&mut self, filename: &str) -> Result<SensorLogSnapshot>;
}

pub struct LocalSource {
    fleet: &'static Fleet,
    estimator: HealthEstimator,
    data_dir: PathBuf,
    columns: ColumnMapping,
}

impl LocalSource {
    pub fn new(fleet: &'static Fleet, config: &UserConfig) -> Self {
        Self {
            fleet,
            estimator: HealthEstimator::new(config.estimator_config()),
            data_dir: config.data_dir.clone(),
            columns: config.sensor_columns.clone(),
        }
    }

    pub fn fleet(&self) -> &'static Fleet {
        self.fleet
    }

    pub fn health_with(
        &self,
        battery_id: &str,
        estimator: &HealthEstimator,
    ) -> Result<HealthSnapshot> {
        let history = self.fleet.history(battery_id)?;
        let estimate = estimator.estimate(history)?;
        Ok(snapshot::health_snapshot(&estimate, estimator.config()))
    }

    pub fn trend_with(
        &self,
        battery_id: &str,
        estimator: &HealthEstimator,
    ) -> Result<TrendSnapshot> {
        let history = self.fleet.history(battery_id)?;
        let estimate = estimator.estimate(history)?;
        Ok(snapshot::trend_snapshot(
            history,
            &estimate,
            estimator.config(),
        ))
    }

    pub fn fleet_report_with(&self, estimator: &HealthEstimator) -> FleetReport {
        snapshot::fleet_report(self.fleet, estimator)
    }

    pub fn battery_summaries(&self) -> Vec<BatterySummary> {
        snapshot::battery_summaries(self.fleet)
    }

    pub fn log_entries(&self, battery_id: &str) -> Result<Vec<LogEntry>> {
        let entries: Vec<LogEntry> = self
            .fleet
            .logs_for(battery_id)
            .into_iter()
            .map(snapshot::log_entry)
            .collect();
        if entries.is_empty() {
            return Err(LoadError::Data {
                battery_id: battery_id.to_string(),
            }
            .into());
        }
        Ok(entries)
    }

    pub fn load_sensor_log(&self, filename: &str) -> Result<SensorLogSnapshot> {
        let log = SensorLog::load(&self.data_dir, filename, &self.columns)?;
        Ok(snapshot::sensor_snapshot(&log))
    }
}

impl HealthSource for LocalSource {
    fn batteries(&mut self) -> Result<Vec<BatterySummary>> {
        Ok(self.battery_summaries())
    }

    fn health(&mut self, battery_id: &str) -> Result<HealthSnapshot> {
        self.health_with(battery_id, &self.estimator)
    }

    fn trend(&mut self, battery_id: &str) -> Result<TrendSnapshot> {
        self.trend_with(battery_id, &self.estimator)
    }

    fn fleet_report(&mut self) -> Result<FleetReport> {
        Ok(self.fleet_report_with(&self.estimator))
    }

    fn logs(&mut self, battery_id: &str) -> Result<Vec<LogEntry>> {
        self.log_entries(battery_id)
    }

    fn sensor_log(&mut self, filename: &str) -> Result<SensorLogSnapshot> {
        self.load_sensor_log(filename)
    }
}

/// Forwards every query to the daemon, carrying this invocation's estimator settings.
pub struct RemoteSource {
    client: DaemonClient,
    params: EstimatorParams,
}

impl RemoteSource {
    pub fn new(client: DaemonClient, params: EstimatorParams) -> Self {
        Self { client, params }
    }
}

impl HealthSource for RemoteSource {
    fn batteries(&mut self) -> Result<Vec<BatterySummary>> {
        Ok(self.client.list_batteries()?)
    }

    fn health(&mut self, battery_id: &str) -> Result<HealthSnapshot> {
        Ok(self.client.get_health(battery_id, self.params.clone())?)
    }

    fn trend(&mut self, battery_id: &str) -> Result<TrendSnapshot> {
        Ok(self.client.get_trend(battery_id, self.params.clone())?)
    }

    fn fleet_report(&mut self) -> Result<FleetReport> {
        Ok(self.client.get_fleet_report(self.params.clone())?)
    }

    fn logs(&mut self, battery_id: &str) -> Result<Vec<LogEntry>> {
        Ok(self.client.list_logs(battery_id)?)
    }

    fn sensor_log(&mut self, filename: &str) -> Result<SensorLogSnapshot> {
        Ok(self.client.get_sensor_log(filename)?)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use sentinel_health::FitWindow;

    use super::*;

    const TABLE: &str = "\
battery_id,test_id,type,Capacity,filename,ambient_temperature
B0005,1,discharge,2.0,00001.csv,24
B0005,2,discharge,1.8,00002.csv,24
B0005,3,discharge,1.6,00003.csv,24
B0006,1,discharge,2.0,00004.csv,24
B0006,2,discharge,1.98,00005.csv,24
";

    fn source(dir: &Path) -> LocalSource {
        let fleet = Box::leak(Box::new(Fleet::from_reader(TABLE.as_bytes()).unwrap()));
        let config = UserConfig {
            data_dir: dir.to_path_buf(),
            ..UserConfig::default()
        };
        LocalSource::new(fleet, &config)
    }

    #[test]
    fn test_health_for_known_battery() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = source(dir.path());

        let health = source.health("B0005").unwrap();
        assert_eq!(health.remaining_cycles, Some(1));
        assert_eq!(health.current_cycle, 3);
    }

    #[test]
    fn test_unknown_battery_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = source(dir.path());

        let err = source.health("B9999").unwrap_err();
        assert!(matches!(err, SourceError::Load(LoadError::Data { .. })));
        assert!(!err.is_data_not_found());
        assert!(source.logs("B9999").is_err());
    }

    #[test]
    fn test_explicit_estimator_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(dir.path());
        let estimator = HealthEstimator::new(sentinel_health::EstimatorConfig {
            fit_window: FitWindow::Recent(2),
            alert_threshold_cycles: 0,
            ..Default::default()
        });

        let trend = source.trend_with("B0005", &estimator).unwrap();
        assert_eq!(trend.fit_window, "recent:2");
        let health = source.health_with("B0005", &estimator).unwrap();
        assert_eq!(health.alert_threshold_cycles, 0);
    }

    #[test]
    fn test_missing_sensor_log_is_data_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = source(dir.path());

        let err = source.sensor_log("00001.csv").unwrap_err();
        assert!(err.is_data_not_found());
    }

    #[test]
    fn test_sensor_log_summary() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("00001.csv"),
            "Voltage_measured,Current_measured,Temperature_measured,Time\n\
             4.19,-0.004,24.3,0.0\n\
             3.97,-2.01,24.9,16.8\n\
             3.20,-2.01,38.1,3690.2\n",
        )
        .unwrap();
        let mut source = source(dir.path());

        let snapshot = source.sensor_log("00001.csv").unwrap();
        assert_eq!(snapshot.row_count, 3);
        let voltage = snapshot.voltage.unwrap();
        assert_eq!(voltage.column, "Voltage_measured");
        assert_eq!(voltage.unit, "V");
        assert_eq!(voltage.first, 4.19);
        assert_eq!(voltage.values, vec![4.19, 3.97, 3.20]);
        let temperature = snapshot.temperature.unwrap();
        assert_eq!(temperature.max, 38.1);
        assert_eq!(temperature.values, vec![24.3, 24.9, 38.1]);
        assert_eq!(snapshot.rows.len(), 3);
        assert_eq!(snapshot.rows[2], vec!["3.20", "-2.01", "38.1", "3690.2"]);
    }
}
