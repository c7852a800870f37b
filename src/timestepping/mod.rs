//! Mass lumping, the inertially-scaled explicit update and the stable
//! time-step controller.
//!
//! The nodal mass is the physical lumped mass; the inertial scaling that
//! makes the explicit step tractable multiplies it only inside the velocity
//! update, so quasi-static solutions are unaffected.

use rayon::prelude::*;

use crate::config::ControlParam;
use crate::constants::{NDIMS, NODES_PER_ELEM};
use crate::mechanics::material::MatProps;
use crate::mesh::fields::{ScalarField, VectorField};
use crate::mesh::geometry::characteristic_length;

/// Stable time step with the per-limit diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct DtLimits {
    /// Chosen step (seconds), dt_fraction already applied.
    pub dt: f64,
    /// P-wave limit with inertially scaled density (seconds).
    pub elastic_dt: f64,
    /// Boundary-advection limit (seconds).
    pub advective_dt: f64,
    /// Maxwell relaxation limit (seconds).
    pub maxwell_dt: f64,
    /// Thermal diffusion limit (seconds).
    pub thermal_dt: f64,
}

impl DtLimits {
    /// Name of the constraint that set the step.
    pub fn limiting_constraint(&self) -> &'static str {
        let min = self
            .elastic_dt
            .min(self.advective_dt)
            .min(self.maxwell_dt)
            .min(self.thermal_dt);
        if min == self.elastic_dt {
            "elastic"
        } else if min == self.advective_dt {
            "advective"
        } else if min == self.maxwell_dt {
            "maxwell"
        } else {
            "thermal"
        }
    }
}

/// Lump element masses onto the nodes.
///
/// mass[n] = sum over the node's support of rho * vol / NODES_PER_ELEM;
/// tmass uses rho * cp. The sums reproduce the total element mass exactly.
pub fn compute_mass(
    mat: &MatProps,
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
    volume: &ScalarField<f64>,
    mattype: &ScalarField<i32>,
    temperature: &ScalarField<f64>,
    mass: &mut ScalarField<f64>,
    tmass: &mut ScalarField<f64>,
) {
    mass.resize(temperature.len());
    tmass.resize(temperature.len());
    mass.fill(0.0);
    tmass.fill(0.0);

    for (e, conn) in connectivity.iter().enumerate() {
        let m = mattype[e] as usize;
        let mut t_elem = 0.0;
        for &n in conn.iter() {
            t_elem += temperature[n];
        }
        t_elem /= NODES_PER_ELEM as f64;

        let rho = mat.rho(m, t_elem);
        let share = rho * volume[e] / NODES_PER_ELEM as f64;
        let tshare = share * mat.cp(m);
        for &n in conn.iter() {
            mass[n] += share;
            tmass[n] += tshare;
        }
    }
}

/// Advance nodal velocities: v += dt * f / (m * inertial_scaling).
pub fn update_velocity(
    inertial_scaling: f64,
    dt: f64,
    mass: &ScalarField<f64>,
    force: &VectorField<f64, NDIMS>,
    vel: &mut VectorField<f64, NDIMS>,
) {
    vel.as_mut_slice()
        .par_iter_mut()
        .enumerate()
        .for_each(|(n, v)| {
            let m_scaled = mass[n] * inertial_scaling;
            for d in 0..NDIMS {
                v[d] += dt * force[n][d] / m_scaled;
            }
        });
}

/// Advance nodal coordinates: x += dt * v.
pub fn update_coordinate(
    dt: f64,
    vel: &VectorField<f64, NDIMS>,
    coord: &mut VectorField<f64, NDIMS>,
) {
    coord
        .as_mut_slice()
        .par_iter_mut()
        .zip(vel.as_slice().par_iter())
        .for_each(|(x, v)| {
            for d in 0..NDIMS {
                x[d] += dt * v[d];
            }
        });
}

/// Stable time step from the elastic, advective, Maxwell and thermal
/// limits, scaled by dt_fraction. `fixed_dt > 0` overrides everything.
pub fn compute_dt(
    control: &ControlParam,
    mat: &MatProps,
    volume: &ScalarField<f64>,
    mattype: &ScalarField<i32>,
    max_vbc_val: f64,
) -> DtLimits {
    let vmax = max_vbc_val.max(control.characteristic_speed);

    let (mut elastic_dt, mut advective_dt, mut thermal_dt) =
        (f64::INFINITY, f64::INFINITY, f64::INFINITY);
    for (e, &vol) in volume.iter().enumerate() {
        if vol <= 0.0 {
            continue;
        }
        let m = mattype[e] as usize;
        let length = characteristic_length(vol);

        let pwave_modulus = mat.bulkm(m) + 4.0 / 3.0 * mat.shearm(m);
        let rho_scaled = mat.rho0[m] * control.inertial_scaling;
        elastic_dt = elastic_dt.min(length * (rho_scaled / pwave_modulus).sqrt());

        if vmax > 0.0 {
            advective_dt = advective_dt.min(0.5 * length / vmax);
        }

        let kappa = mat.k(m, 273.0) / (mat.rho0[m] * mat.cp(m));
        thermal_dt =
            thermal_dt.min(length * length / (2.0 * NDIMS as f64 * kappa));
    }

    let maxwell_dt = if mat.rheology.has_viscosity() {
        mat.min_maxwell_time()
    } else {
        f64::INFINITY
    };

    let mut dt = control.dt_fraction
        * elastic_dt.min(advective_dt).min(maxwell_dt).min(thermal_dt);
    if control.fixed_dt > 0.0 {
        dt = control.fixed_dt;
    }

    DtLimits {
        dt,
        elastic_dt,
        advective_dt,
        maxwell_dt,
        thermal_dt,
    }
}
