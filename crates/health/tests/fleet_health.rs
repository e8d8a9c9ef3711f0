use std::fs;
use std::path::Path;

use sentinel_health::*;

fn write_metadata(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("metadata.csv");
    fs::write(&path, content).unwrap();
    path
}

const METADATA: &str = "\
type,ambient_temperature,battery_id,test_id,filename,Capacity
charge,24,B0005,0,00001.csv,
discharge,24,B0005,1,00002.csv,2.0
impedance,24,B0005,2,00003.csv,
discharge,24,B0005,3,00004.csv,1.8
charge,24,B0005,4,00005.csv,
discharge,24,B0005,5,00006.csv,1.6
discharge,4,B0047,0,00007.csv,1.9
discharge,4,B0047,1,00008.csv,1.9
discharge,4,B0047,2,00009.csv,1.9
discharge,43,B0055,0,00010.csv,1.75
";

#[test]
fn fleet_from_disk_matches_scenarios() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = Fleet::load(write_metadata(dir.path(), METADATA)).unwrap();
    let estimator = HealthEstimator::default();

    assert_eq!(fleet.battery_ids(), vec!["B0005", "B0047", "B0055"]);

    let declining = estimator.estimate(fleet.history("B0005").unwrap()).unwrap();
    assert_eq!(declining.remaining, RemainingLife::Cycles(1));
    assert_eq!(declining.alert, AlertLevel::Urgent);
    assert_eq!(declining.ambient_temperature, Some(24.0));

    let flat = estimator.estimate(fleet.history("B0047").unwrap()).unwrap();
    assert_eq!(flat.remaining, RemainingLife::Unbounded);
    assert_eq!(flat.alert, AlertLevel::Healthy);

    let single = estimator.estimate(fleet.history("B0055").unwrap()).unwrap();
    assert_eq!(single.state_of_health_pct, 100.0);
    assert_eq!(single.remaining, RemainingLife::Unbounded);
}

#[test]
fn discharge_cycles_are_contiguous() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = Fleet::load(write_metadata(dir.path(), METADATA)).unwrap();

    for history in fleet.histories() {
        for (i, record) in history.records().iter().enumerate() {
            assert_eq!(record.cycle as usize, i + 1);
            assert_eq!(record.battery_id, history.battery_id());
        }
    }
}

#[test]
fn strictly_decreasing_capacity_has_finite_rul() {
    let estimator = HealthEstimator::default();

    for len in 2..40usize {
        for step in [0.001, 0.01, 0.05, 0.2] {
            let capacities: Vec<f64> = (0..len).map(|i| 2.0 - step * i as f64).collect();
            let history = BatteryHistory::from_capacities("B0006", &capacities).unwrap();
            let estimate = estimator.estimate(&history).unwrap();

            assert!(
                estimate.remaining.cycles().is_some(),
                "len={} step={} gave {:?}",
                len,
                step,
                estimate.remaining
            );
            assert!(estimate.predicted_end_cycle.unwrap().is_finite());
        }
    }
}

#[test]
fn estimator_is_idempotent_over_loaded_fleet() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = Fleet::load(write_metadata(dir.path(), METADATA)).unwrap();
    let estimator = HealthEstimator::default();

    for history in fleet.histories() {
        assert_eq!(
            estimator.estimate(history).unwrap(),
            estimator.estimate(history).unwrap()
        );
    }
}

#[test]
fn sensor_logs_resolve_from_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("00002.csv"),
        "Voltage_measured,Current_measured,Temperature_measured,Time\n\
         4.19,-0.004,24.3,0.0\n\
         3.97,-2.01,24.9,35.7\n\
         3.55,-2.01,31.2,2800.1\n",
    )
    .unwrap();

    let log = SensorLog::load(dir.path(), "00002.csv", &ColumnMapping::default()).unwrap();
    let voltage = log.summary(SensorChannel::Voltage).unwrap();
    assert_eq!(voltage.first, 4.19);
    assert_eq!(voltage.last, 3.55);
    assert_eq!(log.summary(SensorChannel::Temperature).unwrap().max, 31.2);

    let missing = SensorLog::load(dir.path(), "00004.csv", &ColumnMapping::default());
    assert!(matches!(missing, Err(SensorError::NotFound { .. })));
}
