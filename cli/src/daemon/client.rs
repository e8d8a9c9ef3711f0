use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use sentinel_protocol::{
    BatterySummary, DaemonRequest, DaemonResponse, DaemonStatus, EstimatorParams, FleetReport,
    HealthSnapshot, LogEntry, SensorLogSnapshot, TrendSnapshot, MIN_SUPPORTED_VERSION,
    PROTOCOL_VERSION,
};

use crate::daemon::socket_path;

#[derive(Debug, Clone)]
pub struct VersionMismatchError {
    pub client_protocol_version: u32,
    pub client_min_supported: u32,
    pub daemon_protocol_version: u32,
    pub daemon_min_supported: u32,
    pub daemon_binary_version: String,
    pub kind: VersionMismatchKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionMismatchKind {
    ClientTooOld,
    DaemonTooOld,
}

impl std::fmt::Display for VersionMismatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            VersionMismatchKind::ClientTooOld => {
                write!(
                    f,
                    "Protocol version mismatch: client uses protocol v{}, but daemon (v{}) requires v{}+.\n\n\
                    Please update sentinel:\n  \
                    cargo install sentinel-cli",
                    self.client_protocol_version,
                    self.daemon_binary_version,
                    self.daemon_min_supported
                )
            }
            VersionMismatchKind::DaemonTooOld => {
                write!(
                    f,
                    "Protocol version mismatch: daemon (v{}) uses protocol v{}, but this client requires v{}+.\n\n\
                    Please restart the daemon:\n  \
                    sentinel daemon stop && sentinel daemon start",
                    self.daemon_binary_version,
                    self.daemon_protocol_version,
                    self.client_min_supported
                )
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("sensor log not found: {0}")]
    DataNotFound(String),

    #[error("{0}")]
    VersionMismatch(VersionMismatchError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Checks if the client and daemon protocol versions are compatible.
pub fn check_version_compatibility(status: &DaemonStatus) -> Result<()> {
    // Can the daemon understand our requests?
    if PROTOCOL_VERSION < status.min_supported_version {
        return Err(ClientError::VersionMismatch(VersionMismatchError {
            client_protocol_version: PROTOCOL_VERSION,
            client_min_supported: MIN_SUPPORTED_VERSION,
            daemon_protocol_version: status.protocol_version,
            daemon_min_supported: status.min_supported_version,
            daemon_binary_version: status.version.clone(),
            kind: VersionMismatchKind::ClientTooOld,
        }));
    }

    // Can we understand the daemon's responses?
    if status.protocol_version < MIN_SUPPORTED_VERSION {
        return Err(ClientError::VersionMismatch(VersionMismatchError {
            client_protocol_version: PROTOCOL_VERSION,
            client_min_supported: MIN_SUPPORTED_VERSION,
            daemon_protocol_version: status.protocol_version,
            daemon_min_supported: status.min_supported_version,
            daemon_binary_version: status.version.clone(),
            kind: VersionMismatchKind::DaemonTooOld,
        }));
    }

    Ok(())
}

fn unexpected<T>(response: DaemonResponse) -> Result<T> {
    match response {
        DaemonResponse::Error(e) => Err(ClientError::Daemon(e)),
        DaemonResponse::DataNotFound(path) => Err(ClientError::DataNotFound(path)),
        _ => Err(ClientError::Protocol("Unexpected response".into())),
    }
}

pub struct DaemonClient {
    stream: UnixStream,
    read_buffer: Vec<u8>,
}

impl DaemonClient {
    pub fn connect() -> Result<Self> {
        let path = socket_path();
        let stream = UnixStream::connect(&path)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        stream.set_write_timeout(Some(Duration::from_secs(5)))?;
        Ok(Self {
            stream,
            read_buffer: Vec::with_capacity(64 * 1024),
        })
    }

    /// Connects and validates protocol compatibility before any query.
    pub fn connect_with_version_check() -> Result<Self> {
        let mut client = Self::connect()?;
        let status = client.get_status()?;
        check_version_compatibility(&status)?;
        Ok(client)
    }

    fn read_line_blocking(&mut self) -> Result<String> {
        let mut temp_buf = [0u8; 8192];
        loop {
            if let Some(pos) = self.read_buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = self.read_buffer.drain(..=pos).collect();
                return Ok(String::from_utf8_lossy(&line_bytes).to_string());
            }
            let n = self.stream.read(&mut temp_buf)?;
            if n == 0 {
                return Err(ClientError::Protocol("Connection closed".into()));
            }
            self.read_buffer.extend_from_slice(&temp_buf[..n]);
        }
    }

    fn send_request(&mut self, request: DaemonRequest) -> Result<DaemonResponse> {
        let json = request
            .to_json()
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        writeln!(self.stream, "{}", json)?;
        self.stream.flush()?;

        let line = self.read_line_blocking()?;
        tracing::debug!(line_len = line.len(), "send_request read response");

        DaemonResponse::from_json(&line).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    pub fn get_status(&mut self) -> Result<DaemonStatus> {
        match self.send_request(DaemonRequest::GetStatus)? {
            DaemonResponse::Status(status) => Ok(status),
            other => unexpected(other),
        }
    }

    pub fn list_batteries(&mut self) -> Result<Vec<BatterySummary>> {
        match self.send_request(DaemonRequest::ListBatteries)? {
            DaemonResponse::Batteries(batteries) => Ok(batteries),
            other => unexpected(other),
        }
    }

    pub fn get_health(
        &mut self,
        battery_id: &str,
        params: EstimatorParams,
    ) -> Result<HealthSnapshot> {
        match self.send_request(DaemonRequest::GetHealth {
            battery_id: battery_id.to_string(),
            params,
        })? {
            DaemonResponse::Health(health) => Ok(health),
            other => unexpected(other),
        }
    }

    pub fn get_trend(&mut self, battery_id: &str, params: EstimatorParams) -> Result<TrendSnapshot> {
        match self.send_request(DaemonRequest::GetTrend {
            battery_id: battery_id.to_string(),
            params,
        })? {
            DaemonResponse::Trend(trend) => Ok(trend),
            other => unexpected(other),
        }
    }

    pub fn get_fleet_report(&mut self, params: EstimatorParams) -> Result<FleetReport> {
        match self.send_request(DaemonRequest::GetFleetReport { params })? {
            DaemonResponse::FleetReport(report) => Ok(report),
            other => unexpected(other),
        }
    }

    pub fn list_logs(&mut self, battery_id: &str) -> Result<Vec<LogEntry>> {
        match self.send_request(DaemonRequest::ListLogs {
            battery_id: battery_id.to_string(),
        })? {
            DaemonResponse::Logs(logs) => Ok(logs),
            other => unexpected(other),
        }
    }

    pub fn get_sensor_log(&mut self, filename: &str) -> Result<SensorLogSnapshot> {
        match self.send_request(DaemonRequest::GetSensorLog {
            filename: filename.to_string(),
        })? {
            DaemonResponse::SensorLog(log) => Ok(log),
            other => unexpected(other),
        }
    }

    pub fn shutdown(&mut self) -> Result<()> {
        match self.send_request(DaemonRequest::Shutdown)? {
            DaemonResponse::Ok => Ok(()),
            other => unexpected(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_status(
        protocol_version: u32,
        min_supported_version: u32,
        version: &str,
    ) -> DaemonStatus {
        DaemonStatus {
            running: true,
            uptime_secs: 0,
            version: version.to_string(),
            metadata_path: "metadata.csv".to_string(),
            battery_count: 0,
            row_count: 0,
            loaded_at: 0,
            requests_served: 0,
            protocol_version,
            min_supported_version,
        }
    }

    #[test]
    fn test_version_compatible_same_version() {
        let status = make_status(PROTOCOL_VERSION, MIN_SUPPORTED_VERSION, "1.0.0");
        assert!(check_version_compatibility(&status).is_ok());
    }

    #[test]
    fn test_version_compatible_daemon_newer() {
        let status = make_status(PROTOCOL_VERSION + 1, MIN_SUPPORTED_VERSION, "2.0.0");
        assert!(check_version_compatibility(&status).is_ok());
    }

    #[test]
    fn test_version_compatible_at_min_boundary() {
        let status = make_status(MIN_SUPPORTED_VERSION, MIN_SUPPORTED_VERSION, "0.2.0");
        assert!(check_version_compatibility(&status).is_ok());
    }

    #[test]
    fn test_version_client_too_old() {
        let status = make_status(10, PROTOCOL_VERSION + 1, "3.0.0");
        match check_version_compatibility(&status) {
            Err(ClientError::VersionMismatch(e)) => {
                assert_eq!(e.kind, VersionMismatchKind::ClientTooOld);
                assert_eq!(e.client_protocol_version, PROTOCOL_VERSION);
                assert_eq!(e.daemon_min_supported, PROTOCOL_VERSION + 1);
                assert!(e.to_string().contains("update sentinel"));
            }
            other => panic!("Expected VersionMismatch error, got {:?}", other),
        }
    }

    #[test]
    fn test_version_daemon_too_old() {
        let status = make_status(0, 0, "0.1.0");
        match check_version_compatibility(&status) {
            Err(ClientError::VersionMismatch(e)) => {
                assert_eq!(e.kind, VersionMismatchKind::DaemonTooOld);
                assert_eq!(e.daemon_protocol_version, 0);
                assert_eq!(e.client_min_supported, MIN_SUPPORTED_VERSION);
                assert!(e.to_string().contains("restart the daemon"));
            }
            other => panic!("Expected VersionMismatch error, got {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_maps_daemon_errors() {
        let err = unexpected::<()>(DaemonResponse::DataNotFound("x.csv".into())).unwrap_err();
        assert!(matches!(err, ClientError::DataNotFound(ref p) if p == "x.csv"));

        let err = unexpected::<()>(DaemonResponse::Error("boom".into())).unwrap_err();
        assert!(matches!(err, ClientError::Daemon(ref m) if m == "boom"));

        let err = unexpected::<()>(DaemonResponse::Ok).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}
