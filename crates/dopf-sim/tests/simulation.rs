//! End-to-end runs over a small on-disk data set

use std::fs;
use std::path::Path;

use dopf_algo::opf::ControlMode;
use dopf_sim::{EventOutcome, SimulationConfig, Simulator};
use tempfile::TempDir;

const NETWORK: &str = r#"<network>
  <substation> <name> sub </name> <phase> abc </phase> </substation>
  <bus> <name> n1 </name> <phase> abc </phase> </bus>
  <house> <name> h1 </name> <phase> a </phase> </house>
  <house> <name> h2 </name> <phase> b </phase> </house>
  <line>
    <name> main </name> <phase> abc </phase>
    <fromBusName> sub </fromBusName> <toBusName> n1 </toBusName>
    <r> 0.005 0 0 0 0.005 0 0 0 0.005 </r>
    <x> 0.01 0 0 0 0.01 0 0 0 0.01 </x>
  </line>
  <line>
    <name> drop1 </name> <phase> a </phase>
    <fromBusName> n1 </fromBusName> <toBusName> h1 </toBusName>
    <r> 0.005 </r> <x> 0.005 </x>
  </line>
  <line>
    <name> drop2 </name> <phase> b </phase>
    <fromBusName> n1 </fromBusName> <toBusName> h2 </toBusName>
    <r> 0.005 </r> <x> 0.005 </x>
  </line>
</network>
"#;

const INFO: &str =
    "<info> <numSlotPerFile> 24 </numSlotPerFile> <numMinutePerSlot> 60 </numMinutePerSlot> </info>";

/// Hourly samples for one day: a base load on each house, a panel on h1 and
/// one vehicle on h2 from 6:00 to 9:00.
fn day_file() -> String {
    let mut base1 = String::new();
    let mut base2 = String::new();
    let mut pv = String::new();
    for hour in 0..24 {
        let time = hour * 60;
        let p = 0.1 + 0.05 * ((hour as f64) / 24.0 * std::f64::consts::PI).sin();
        let sun = if (7..18).contains(&hour) { 0.05 } else { 0.0 };
        base1.push_str(&format!(
            "<LoadData> <time> {} </time> <p> {} </p> <q> 0.02 </q> </LoadData>\n",
            time, p
        ));
        base2.push_str(&format!(
            "<LoadData> <time> {} </time> <p> {} </p> <q> 0.01 </q> </LoadData>\n",
            time,
            p * 0.8
        ));
        pv.push_str(&format!(
            "<LoadData> <time> {} </time> <p> {} </p> </LoadData>\n",
            time, sun
        ));
    }
    format!(
        r#"<LoadFile>
<baseLoad> <name> base1 </name> <phase> a </phase> <locationBusName> h1 </locationBusName>
{base1}</baseLoad>
<baseLoad> <name> base2 </name> <phase> b </phase> <locationBusName> h2 </locationBusName>
{base2}</baseLoad>
<photovoltaic> <name> pv1 </name> <phase> a </phase> <locationBusName> h1 </locationBusName>
<nameplate> 0.08 </nameplate>
{pv}</photovoltaic>
<electricVehicle> <name> ev1 </name> <phase> b </phase> <locationBusName> h2 </locationBusName>
<maxRate> 0.1 </maxRate> <capacity> 0.15 </capacity>
<arrivalTime> 6:00 </arrivalTime> <duration> 3:00 </duration>
</electricVehicle>
</LoadFile>
"#
    )
}

fn write_data_set(dir: &Path) {
    fs::write(dir.join("network.txt"), NETWORK).unwrap();
    fs::write(dir.join("info.txt"), INFO).unwrap();
    let day = day_file();
    for k in 1..=3 {
        fs::write(dir.join(format!("loadOnDay{}.txt", k)), &day).unwrap();
    }
}

fn config(dir: &Path) -> SimulationConfig {
    let mut config = SimulationConfig {
        input_dir: dir.to_path_buf(),
        horizon_days: 1,
        ..SimulationConfig::default()
    };
    config.fast.period_seconds = 600.0;
    config.slow.period_minutes = 60.0;
    config.slow.prediction_window_hours = 2.0;
    config
}

fn run_until(simulator: &mut Simulator, time: f64) {
    while simulator
        .events()
        .peek()
        .map_or(false, |event| event.time <= time)
    {
        simulator.execute_event().unwrap();
    }
}

#[test]
fn test_full_day_run() {
    let dir = TempDir::new().unwrap();
    write_data_set(dir.path());
    let mut simulator = Simulator::initialize(config(dir.path())).unwrap();
    assert_eq!(simulator.control().num_slots(), 2);

    let summary = simulator.run().unwrap();
    assert_eq!(summary.fast_controls, 144);
    assert_eq!(summary.slow_controls, 24);
    assert_eq!(summary.infeasible, 0);
    assert!(summary.end_time < 1440.0);
    assert!(summary.objective > 0.0);
    assert!((summary.objective - simulator.objective_value()).abs() < 1e-15);

    // draining the queue releases the remaining samples
    assert!(simulator.future_data().num_series() == 0);
    assert_eq!(simulator.execute_event().unwrap(), EventOutcome::QueueEmpty);
}

#[test]
fn test_slow_control_runs_first() {
    let dir = TempDir::new().unwrap();
    write_data_set(dir.path());
    let mut simulator = Simulator::initialize(config(dir.path())).unwrap();
    assert_eq!(simulator.execute_event().unwrap(), EventOutcome::NeedsRefresh);
    assert_eq!(simulator.last_report().unwrap().mode, ControlMode::Slow);
    simulator.execute_event().unwrap();
    assert_eq!(simulator.last_report().unwrap().mode, ControlMode::Fast);
}

#[test]
fn test_vehicle_plugs_in_charges_and_leaves() {
    let dir = TempDir::new().unwrap();
    write_data_set(dir.path());
    let mut simulator = Simulator::initialize(config(dir.path())).unwrap();

    run_until(&mut simulator, 359.0);
    assert!(simulator.model().load_id("ev1").is_none());

    run_until(&mut simulator, 360.0);
    let id = simulator.model().load_id("ev1").unwrap();
    assert!(simulator.control().load_controller(id).is_some());

    run_until(&mut simulator, 530.0);
    let ev = simulator.model().load(id).unwrap().electric_vehicle().unwrap();
    assert!(ev.future_energy_request < 0.15, "request {}", ev.future_energy_request);

    run_until(&mut simulator, 540.0);
    assert!(simulator.model().load_id("ev1").is_none());
    assert!(simulator.control().load_controller(id).is_none());
}

#[test]
fn test_missing_day_file_is_reported() {
    let dir = TempDir::new().unwrap();
    write_data_set(dir.path());
    fs::remove_file(dir.path().join("loadOnDay1.txt")).unwrap();
    let err = Simulator::initialize(config(dir.path())).err().unwrap();
    assert!(format!("{:#}", err).contains("loadOnDay1.txt"));
}
