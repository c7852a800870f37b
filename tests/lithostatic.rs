//! Lithostatic initialization of a 2D elastic box under gravity.

#![cfg(not(feature = "three_d"))]

use approx::assert_relative_eq;
use tectosim::constants::{NDIMS, NODES_PER_ELEM};
use tectosim::mesh::StructuredGenerator;
use tectosim::{simulation, Param};

fn box_config() -> Param {
    let mut param: Param = toml::from_str(
        r#"
        [sim]
        modelname = "lithostatic"
        max_steps = 1
        output_step_interval = 1

        [mesh]
        xlength = 4000.0
        zlength = 1000.0
        resolution = 100.0
        restoring_bottom = true

        [control]
        gravity = 10.0

        [bc]
        max_vbc_val = 0.0

        [mat]
        rheology_type = "elastic"
        rho0 = [3000.0]
        alpha = [0.0]
        bulk_modulus = [50e9]
        shear_modulus = [30e9]
        "#,
    )
    .unwrap();
    param.validate().unwrap();
    param
}

#[test]
fn lithostatic_stress_matches_overburden() {
    let param = box_config();
    let var = simulation::init(&param, &StructuredGenerator).unwrap();

    // Every element carries sigma_xx = sigma_zz = -rho g |z_center|.
    for e in 0..var.nelem {
        let conn = &var.connectivity[e];
        let mut zc = 0.0;
        for &n in conn.iter() {
            zc += var.coord[n][NDIMS - 1];
        }
        zc /= NODES_PER_ELEM as f64;

        let p = 3000.0 * 10.0 * (-zc);
        assert_relative_eq!(var.stress[e][0], -p, max_relative = 1e-12);
        assert_relative_eq!(var.stress[e][1], -p, max_relative = 1e-12);
        assert_relative_eq!(var.stress[e][2], 0.0, epsilon = 1e-6);
    }

    // The top element row sits at z_center ~ -100/3 m, so the magnitude
    // there is about 1e6 Pa; deeper rows grow linearly to 3e7 at bottom.
    let max_p = var
        .stress
        .iter()
        .map(|s| -s[0])
        .fold(f64::NEG_INFINITY, f64::max);
    assert!(max_p > 2.9e7 && max_p < 3.0e7, "bottom row pressure: {}", max_p);
}

#[test]
fn lumped_mass_sums_to_total_mass() {
    let param = box_config();
    let var = simulation::init(&param, &StructuredGenerator).unwrap();

    let total_mass: f64 = var.mass.iter().sum();
    let expected: f64 = var.volume.iter().map(|&v| 3000.0 * v).sum();
    // Exact up to accumulated rounding: one ULP per element.
    assert_relative_eq!(total_mass, expected, max_relative = 1e-12);

    // And the physical total is the domain mass.
    assert_relative_eq!(expected, 3000.0 * 4000.0 * 1000.0, max_relative = 1e-12);
}

#[test]
fn first_step_keeps_volumes_positive() {
    let param = box_config();
    let mut var = simulation::init(&param, &StructuredGenerator).unwrap();
    simulation::step(&param, &mut var);
    assert!(var.volume.iter().all(|&v| v > 0.0));
    assert_eq!(var.steps, 1);
    assert!(var.dt > 0.0);
}

#[test]
fn boundary_velocities_are_bit_equal_after_step() {
    let mut param = box_config();
    param.bc.max_vbc_val = 1e-9;
    let mut var = simulation::init(&param, &StructuredGenerator).unwrap();
    simulation::step(&param, &mut var);

    use tectosim::constants::{BOUNDX0, BOUNDX1};
    for n in 0..var.nnode {
        if var.bcflag[n] & BOUNDX0 != 0 {
            assert_eq!(var.vel[n][0], -1e-9);
        } else if var.bcflag[n] & BOUNDX1 != 0 {
            assert_eq!(var.vel[n][0], 1e-9);
        }
    }
}
