//! A run interrupted at a frame and restarted from it reproduces the
//! continuous run bit-for-bit.

#![cfg(not(feature = "three_d"))]

use std::time::Instant;

use tectosim::mesh::StructuredGenerator;
use tectosim::{output, simulation, Param};

fn run_dir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("tectosim_restart_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn config(modelname: &str) -> Param {
    let mut param: Param = toml::from_str(&format!(
        r#"
        [sim]
        modelname = "{}"
        max_steps = 40
        output_step_interval = 10

        [mesh]
        xlength = 1000.0
        zlength = 1000.0
        resolution = 250.0
        restoring_bottom = true

        [control]
        gravity = 10.0

        [bc]
        max_vbc_val = 1e-9

        [mat]
        rheology_type = "elastic"
        "#,
        modelname
    ))
    .unwrap();
    param.validate().unwrap();
    param
}

#[test]
fn restart_reproduces_continuous_run_exactly() {
    let dir = run_dir();
    let modelname = dir.join("roundtrip").to_str().unwrap().to_string();
    let param = config(&modelname);
    let start = Instant::now();
    let source = StructuredGenerator;

    // Continuous run: frames 0..=4 (one per 10 steps).
    let mut var = simulation::init(&param, &source).unwrap();
    output::output(&param, &var, &start);
    var.frame += 1;
    simulation::run(&param, &mut var, &source, &start).unwrap();
    assert_eq!(var.steps, 40);
    assert_eq!(var.frame, 5);

    let final_coord = std::fs::read(format!("{}.coord.000004", modelname)).unwrap();
    let final_stress = std::fs::read(format!("{}.stress.000004", modelname)).unwrap();
    let final_temp = std::fs::read(format!("{}.temperature.000004", modelname)).unwrap();

    // Restart from frame 2 (steps = 20) and run to the end again.
    let mut param2 = config(&modelname);
    param2.sim.is_restarting = true;
    param2.sim.restarting_from_frame = 2;
    let mut var2 = simulation::restart(&param2).unwrap();
    assert_eq!(var2.steps, 20);
    assert_eq!(var2.frame, 3);
    simulation::run(&param2, &mut var2, &source, &start).unwrap();
    assert_eq!(var2.steps, 40);

    let redo_coord = std::fs::read(format!("{}.coord.000004", modelname)).unwrap();
    let redo_stress = std::fs::read(format!("{}.stress.000004", modelname)).unwrap();
    let redo_temp = std::fs::read(format!("{}.temperature.000004", modelname)).unwrap();

    assert_eq!(final_coord, redo_coord, "coord frame 4 differs after restart");
    assert_eq!(final_stress, redo_stress, "stress frame 4 differs after restart");
    assert_eq!(final_temp, redo_temp, "temperature frame 4 differs after restart");

    // The info log ends with the same number of rows as the continuous run.
    let info = std::fs::read_to_string(format!("{}.info", modelname)).unwrap();
    assert_eq!(info.lines().count(), 5, "info: {}", info);

    std::fs::remove_dir_all(&dir).ok();
}
