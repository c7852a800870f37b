//! Steady-state conduction in a pinned column relaxes to the linear
//! profile.

#![cfg(not(feature = "three_d"))]

use tectosim::constants::NDIMS;
use tectosim::mesh::StructuredGenerator;
use tectosim::{simulation, Param};

#[test]
fn column_reaches_linear_steady_state() {
    let mut param: Param = toml::from_str(
        r#"
        [sim]
        modelname = "column"
        max_steps = 6000
        output_step_interval = 1000000

        [mesh]
        xlength = 200.0
        zlength = 1000.0
        resolution = 100.0
        restoring_bottom = false

        [control]
        gravity = 0.0
        damping_factor = 0.0
        fixed_dt = 2.0e8

        [bc]
        surface_temperature = 273.0
        mantle_temperature = 1600.0
        has_bottom_temperature_bc = true
        max_vbc_val = 0.0

        [mat]
        rheology_type = "elastic"
        rho0 = [3000.0]
        alpha = [0.0]
        heat_capacity = [1000.0]
        therm_cond = [3.0]
        "#,
    )
    .unwrap();
    param.validate().unwrap();

    let mut var = simulation::init(&param, &StructuredGenerator).unwrap();
    for _ in 0..6000 {
        simulation::step(&param, &mut var);
    }

    // T(z) = 273 + 1327 * depth / 1000, within 0.5 K everywhere.
    for n in 0..var.nnode {
        let depth = -var.coord[n][NDIMS - 1];
        let expect = 273.0 + (1600.0 - 273.0) * depth / 1000.0;
        let got = var.temperature[n];
        assert!(
            (got - expect).abs() < 0.5,
            "node {} at depth {}: T = {}, expected {}",
            n,
            depth,
            got,
            expect
        );
    }
}

#[test]
fn column_stays_static_without_forcing() {
    let mut param: Param = toml::from_str(
        r#"
        [sim]
        modelname = "column_static"
        max_steps = 10
        output_step_interval = 1000000

        [mesh]
        xlength = 200.0
        zlength = 1000.0
        resolution = 100.0
        restoring_bottom = false

        [control]
        gravity = 0.0
        fixed_dt = 1.0e6

        [bc]
        max_vbc_val = 0.0

        [mat]
        rheology_type = "elastic"
        "#,
    )
    .unwrap();
    param.validate().unwrap();

    let mut var = simulation::init(&param, &StructuredGenerator).unwrap();
    let coord0: Vec<_> = var.coord.iter().copied().collect();
    for _ in 0..10 {
        simulation::step(&param, &mut var);
    }

    // No gravity, no boundary velocity, zero initial stress: nothing moves.
    for n in 0..var.nnode {
        for d in 0..NDIMS {
            assert_eq!(var.coord[n][d], coord0[n][d]);
            assert_eq!(var.vel[n][d], 0.0);
        }
    }
}
