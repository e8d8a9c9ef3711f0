use std::collections::HashMap;
use std::fs;
use std::time::Instant;

use sentinel_health::{HealthEstimator, LoadError};
use sentinel_protocol::{DaemonRequest, DaemonResponse, DaemonStatus, EstimatorParams};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{estimator_config_from_params, runtime_dir, LogLevel, UserConfig};
use crate::daemon::socket_path;
use crate::data::{dataset, LocalSource, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load dataset: {0}")]
    Load(#[from] LoadError),

    #[error("Already running")]
    AlreadyRunning,

    #[error("Failed to daemonize: {0}")]
    Daemonize(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

/// Which process `run_daemon` returned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonExit {
    /// The launching process, once the detached daemon has forked off.
    Detached,
    /// The daemon itself, after its server loop stopped.
    Stopped,
}

type ClientId = u64;

enum ClientMessage {
    Request { request: DaemonRequest },
    Disconnect,
}

struct DaemonState {
    source: LocalSource,
    metadata_path: String,
    start_time: Instant,
    loaded_at: i64,
    requests_served: u64,
}

impl DaemonState {
    fn new(source: LocalSource, config: &UserConfig) -> Self {
        Self {
            source,
            metadata_path: config.metadata_path.display().to_string(),
            start_time: Instant::now(),
            loaded_at: chrono::Utc::now().timestamp(),
            requests_served: 0,
        }
    }

    fn get_status(&self) -> DaemonStatus {
        let fleet = self.source.fleet();
        DaemonStatus {
            running: true,
            uptime_secs: self.start_time.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            metadata_path: self.metadata_path.clone(),
            battery_count: fleet.battery_ids().len(),
            row_count: fleet.rows().len(),
            loaded_at: self.loaded_at,
            requests_served: self.requests_served,
            protocol_version: sentinel_protocol::PROTOCOL_VERSION,
            min_supported_version: sentinel_protocol::MIN_SUPPORTED_VERSION,
        }
    }

    fn handle_request(&mut self, request: &DaemonRequest) -> DaemonResponse {
        self.requests_served += 1;

        match request {
            DaemonRequest::GetStatus => DaemonResponse::Status(self.get_status()),
            DaemonRequest::ListBatteries => {
                DaemonResponse::Batteries(self.source.battery_summaries())
            }
            DaemonRequest::GetHealth { battery_id, params } => match estimator_for(params) {
                Ok(estimator) => match self.source.health_with(battery_id, &estimator) {
                    Ok(health) => DaemonResponse::Health(health),
                    Err(e) => error_response(e),
                },
                Err(response) => response,
            },
            DaemonRequest::GetTrend { battery_id, params } => match estimator_for(params) {
                Ok(estimator) => match self.source.trend_with(battery_id, &estimator) {
                    Ok(trend) => DaemonResponse::Trend(trend),
                    Err(e) => error_response(e),
                },
                Err(response) => response,
            },
            DaemonRequest::GetFleetReport { params } => match estimator_for(params) {
                Ok(estimator) => {
                    DaemonResponse::FleetReport(self.source.fleet_report_with(&estimator))
                }
                Err(response) => response,
            },
            DaemonRequest::ListLogs { battery_id } => match self.source.log_entries(battery_id) {
                Ok(logs) => DaemonResponse::Logs(logs),
                Err(e) => error_response(e),
            },
            DaemonRequest::GetSensorLog { filename } => {
                match self.source.load_sensor_log(filename) {
                    Ok(log) => DaemonResponse::SensorLog(log),
                    Err(e) => error_response(e),
                }
            }
            DaemonRequest::Shutdown => DaemonResponse::Ok,
        }
    }
}

fn estimator_for(params: &EstimatorParams) -> std::result::Result<HealthEstimator, DaemonResponse> {
    estimator_config_from_params(params)
        .map(HealthEstimator::new)
        .map_err(DaemonResponse::Error)
}

fn error_response(e: SourceError) -> DaemonResponse {
    match e {
        SourceError::DataNotFound(path) => {
            warn!(path = %path, "Requested sensor log is missing");
            DaemonResponse::DataNotFound(path)
        }
        other => DaemonResponse::Error(other.to_string()),
    }
}

async fn client_reader_task(
    mut reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    msg_tx: mpsc::Sender<(ClientId, ClientMessage)>,
    client_id: ClientId,
) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                let _ = msg_tx.send((client_id, ClientMessage::Disconnect)).await;
                break;
            }
            Ok(_) => match DaemonRequest::from_json(line.trim()) {
                Ok(request) => {
                    if msg_tx
                        .send((client_id, ClientMessage::Request { request }))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    warn!(client_id, error = %e, "Invalid request from client");
                }
            },
            Err(e) => {
                debug!(client_id, error = %e, "Client read error");
                let _ = msg_tx.send((client_id, ClientMessage::Disconnect)).await;
                break;
            }
        }
    }
}

async fn client_writer_task(
    mut writer: tokio::net::unix::OwnedWriteHalf,
    mut response_rx: mpsc::Receiver<DaemonResponse>,
) {
    while let Some(response) = response_rx.recv().await {
        let json = match response.to_json() {
            Ok(j) => j,
            Err(_) => continue,
        };
        if writer
            .write_all(format!("{}\n", json).as_bytes())
            .await
            .is_err()
        {
            break;
        }
    }
}

pub fn run_daemon(
    config: &UserConfig,
    foreground: bool,
    log_level: LogLevel,
    log_level_override: Option<LogLevel>,
) -> Result<DaemonExit> {
    let socket = socket_path();

    if socket.exists() {
        if crate::daemon::is_daemon_running() {
            return Err(DaemonError::AlreadyRunning);
        }
        fs::remove_file(&socket)?;
    }

    fs::create_dir_all(runtime_dir())?;

    // Load before detaching so a bad table is reported to the caller.
    let fleet = dataset::init(config)?;
    let source = LocalSource::new(fleet, config);

    if !foreground {
        match daemonize::Daemonize::new()
            .working_directory(std::env::current_dir()?)
            .execute()
        {
            daemonize::Outcome::Parent(Ok(parent)) if parent.first_child_exit_code == 0 => {
                return Ok(DaemonExit::Detached);
            }
            daemonize::Outcome::Parent(Ok(parent)) => {
                return Err(DaemonError::Daemonize(format!(
                    "daemon process exited with code {}",
                    parent.first_child_exit_code
                )));
            }
            daemonize::Outcome::Parent(Err(e)) | daemonize::Outcome::Child(Err(e)) => {
                return Err(DaemonError::Daemonize(e.to_string()));
            }
            daemonize::Outcome::Child(Ok(_)) => {}
        }
        let _guard =
            crate::logging::init(log_level, crate::logging::LogMode::File, log_level_override);
        std::mem::forget(_guard);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        batteries = fleet.battery_ids().len(),
        "Daemon starting"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let state = DaemonState::new(source, config);
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run_daemon_async(socket, state))?;
    Ok(DaemonExit::Stopped)
}

async fn run_daemon_async(socket: std::path::PathBuf, mut state: DaemonState) -> Result<()> {
    let listener = UnixListener::bind(&socket)?;
    info!(socket = ?socket, "Listening for connections");

    let (msg_tx, mut msg_rx) = mpsc::channel::<(ClientId, ClientMessage)>(256);
    let mut clients: HashMap<ClientId, mpsc::Sender<DaemonResponse>> = HashMap::new();
    let mut next_client_id: ClientId = 1;

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let client_id = next_client_id;
                        next_client_id += 1;
                        debug!(client_id, "Client connected");

                        let (reader, writer) = stream.into_split();
                        let (response_tx, response_rx) = mpsc::channel::<DaemonResponse>(64);
                        clients.insert(client_id, response_tx);

                        tokio::task::spawn_local(client_reader_task(
                            BufReader::new(reader),
                            msg_tx.clone(),
                            client_id,
                        ));
                        tokio::task::spawn_local(client_writer_task(writer, response_rx));
                    }
                    Err(e) => {
                        error!(error = %e, "Socket accept error");
                    }
                }
            }
            Some((client_id, msg)) = msg_rx.recv() => {
                match msg {
                    ClientMessage::Disconnect => {
                        if clients.remove(&client_id).is_some() {
                            debug!(client_id, count = clients.len(), "Client disconnected");
                        }
                    }
                    ClientMessage::Request { request } => {
                        debug!(client_id, request = ?request, "Handling request");

                        let shutdown_requested = matches!(request, DaemonRequest::Shutdown);
                        if shutdown_requested {
                            info!("Shutdown requested by client");
                        }
                        let response = state.handle_request(&request);

                        if let Some(tx) = clients.get(&client_id) {
                            let _ = tx.send(response).await;
                        }

                        if shutdown_requested {
                            // Let the writer flush the acknowledgement.
                            tokio::task::yield_now().await;
                            break;
                        }
                    }
                }
            }
        }
    }

    info!(requests = state.requests_served, "Daemon shutting down");
    fs::remove_file(&socket).ok();

    Ok(())
}

#[cfg(test)]
mod tests {
    use sentinel_health::Fleet;
    use sentinel_protocol::AlertLevel;

    use super::*;

    const TABLE: &str = "\
battery_id,test_id,type,Capacity,filename,ambient_temperature
B0005,1,discharge,2.0,00001.csv,24
B0005,2,discharge,1.8,00002.csv,24
B0005,3,discharge,1.6,00003.csv,24
";

    fn state() -> DaemonState {
        let fleet = Box::leak(Box::new(Fleet::from_reader(TABLE.as_bytes()).unwrap()));
        let config = UserConfig {
            data_dir: std::env::temp_dir().join("sentinel-missing-data"),
            ..UserConfig::default()
        };
        DaemonState::new(LocalSource::new(fleet, &config), &config)
    }

    #[test]
    fn test_health_request_uses_request_params() {
        let mut state = state();
        let params = EstimatorParams {
            alert_threshold_cycles: 1,
            ..UserConfig::default().estimator_params()
        };

        match state.handle_request(&DaemonRequest::GetHealth {
            battery_id: "B0005".into(),
            params,
        }) {
            DaemonResponse::Health(health) => {
                assert_eq!(health.remaining_cycles, Some(1));
                assert_eq!(health.alert, AlertLevel::Healthy);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_bad_params_are_rejected() {
        let mut state = state();
        for window in ["recent:0", "recent:1"] {
            let params = EstimatorParams {
                fit_window: window.into(),
                ..UserConfig::default().estimator_params()
            };

            let response = state.handle_request(&DaemonRequest::GetFleetReport { params });
            assert!(matches!(response, DaemonResponse::Error(_)));
        }
    }

    #[test]
    fn test_unknown_battery_and_missing_log() {
        let mut state = state();

        let response = state.handle_request(&DaemonRequest::ListLogs {
            battery_id: "B9999".into(),
        });
        assert!(matches!(response, DaemonResponse::Error(_)));

        let response = state.handle_request(&DaemonRequest::GetSensorLog {
            filename: "00001.csv".into(),
        });
        assert!(matches!(response, DaemonResponse::DataNotFound(_)));
    }

    #[test]
    fn test_status_counts_requests() {
        let mut state = state();
        state.handle_request(&DaemonRequest::ListBatteries);

        match state.handle_request(&DaemonRequest::GetStatus) {
            DaemonResponse::Status(status) => {
                assert_eq!(status.requests_served, 2);
                assert_eq!(status.battery_count, 1);
                assert_eq!(status.row_count, 3);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
