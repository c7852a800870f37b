//! Material properties and rheology selection.
//!
//! Every physical property is a per-material vector indexed by the element's
//! material tag. The strain-weakened plastic parameters interpolate linearly
//! on accumulated plastic strain between the `(pls0, *0)` and `(pls1, *1)`
//! anchors.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::constants::{DEG2RAD, GAS_CONSTANT};

/// Selectable constitutive behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rheology {
    Elastic,
    Viscous,
    Maxwell,
    ElastoPlastic,
    ElastoViscousPlastic,
}

impl Rheology {
    /// Parse the config-file spelling of the rheology name.
    pub fn from_name(name: &str) -> Result<Self, String> {
        match name {
            "elastic" => Ok(Rheology::Elastic),
            "viscous" => Ok(Rheology::Viscous),
            "maxwell" => Ok(Rheology::Maxwell),
            "elasto-plastic" => Ok(Rheology::ElastoPlastic),
            "elasto-viscous-plastic" => Ok(Rheology::ElastoViscousPlastic),
            _ => Err(format!("unknown rheology: '{}'", name)),
        }
    }

    pub fn has_viscosity(&self) -> bool {
        matches!(
            self,
            Rheology::Viscous | Rheology::Maxwell | Rheology::ElastoViscousPlastic
        )
    }

    pub fn has_plasticity(&self) -> bool {
        matches!(
            self,
            Rheology::ElastoPlastic | Rheology::ElastoViscousPlastic
        )
    }
}

/// Strain-weakened plastic parameters of one material at one plastic strain.
#[derive(Debug, Clone, Copy)]
pub struct PlasticProps {
    /// Cohesion (Pa).
    pub cohesion: f64,
    /// Friction angle (radians).
    pub friction_angle: f64,
    /// Dilation angle (radians).
    pub dilation_angle: f64,
    /// Tension cutoff (Pa).
    pub tension_max: f64,
}

/// Per-material property tables.
#[derive(Debug, Clone)]
pub struct MatProps {
    pub rheology: Rheology,
    pub nmat: usize,

    pub visc_min: f64,
    pub visc_max: f64,
    pub tension_max: f64,
    pub therm_diff_max: f64,

    pub rho0: Vec<f64>,
    pub alpha: Vec<f64>,
    pub bulk_modulus: Vec<f64>,
    pub shear_modulus: Vec<f64>,
    pub visc_exponent: Vec<f64>,
    pub visc_coefficient: Vec<f64>,
    pub visc_activation_energy: Vec<f64>,
    pub heat_capacity: Vec<f64>,
    pub therm_cond: Vec<f64>,
    pub pls0: Vec<f64>,
    pub pls1: Vec<f64>,
    pub cohesion0: Vec<f64>,
    pub cohesion1: Vec<f64>,
    pub friction_angle0: Vec<f64>,
    pub friction_angle1: Vec<f64>,
    pub dilation_angle0: Vec<f64>,
    pub dilation_angle1: Vec<f64>,
}

static VISC_CLAMP_WARNED: AtomicBool = AtomicBool::new(false);

impl MatProps {
    /// Density with volumetric thermal expansion about the 273 K reference.
    #[inline]
    pub fn rho(&self, m: usize, temperature: f64) -> f64 {
        self.rho0[m] * (1.0 - self.alpha[m] * (temperature - 273.0))
    }

    #[inline]
    pub fn bulkm(&self, m: usize) -> f64 {
        self.bulk_modulus[m]
    }

    #[inline]
    pub fn shearm(&self, m: usize) -> f64 {
        self.shear_modulus[m]
    }

    #[inline]
    pub fn cp(&self, m: usize) -> f64 {
        self.heat_capacity[m]
    }

    /// Thermal conductivity, capped so the diffusivity k/(rho*cp) never
    /// exceeds `therm_diff_max`.
    pub fn k(&self, m: usize, temperature: f64) -> f64 {
        let cap = self.therm_diff_max * self.rho(m, temperature) * self.cp(m);
        self.therm_cond[m].min(cap)
    }

    /// Effective creep viscosity from the power-law Arrhenius flow law,
    /// clamped to `[visc_min, visc_max]`.
    ///
    /// eta = 0.25 * edot^(1/n - 1) * (0.75 A)^(-1/n) * exp(E / (n R T)) * 1e6
    ///
    /// where `edot` is the square root of the strain-rate second invariant.
    pub fn visc(&self, m: usize, temperature: f64, strain_rate_ii: f64) -> f64 {
        let n = self.visc_exponent[m];
        let a = self.visc_coefficient[m];
        let e = self.visc_activation_energy[m];
        let edot = strain_rate_ii.max(1e-30);

        let pow = edot.powf(1.0 / n - 1.0) * (0.75 * a).powf(-1.0 / n);
        let eta = 0.25 * pow * (e / (n * GAS_CONSTANT * temperature)).exp() * 1e6;

        if (eta < self.visc_min || eta > self.visc_max)
            && !VISC_CLAMP_WARNED.swap(true, Ordering::Relaxed)
        {
            eprintln!(
                "Warning: viscosity {:.3e} Pa.s hits clamp [{:.1e}, {:.1e}]",
                eta, self.visc_min, self.visc_max
            );
        }
        eta.clamp(self.visc_min, self.visc_max)
    }

    /// Plastic parameters weakened by accumulated plastic strain.
    pub fn plastic_props(&self, m: usize, plstrain: f64) -> PlasticProps {
        let x0 = self.pls0[m];
        let x1 = self.pls1[m];
        let ratio = if x1 > x0 {
            ((plstrain - x0) / (x1 - x0)).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let lerp = |v0: f64, v1: f64| v0 + (v1 - v0) * ratio;

        let cohesion = lerp(self.cohesion0[m], self.cohesion1[m]);
        let friction_angle = lerp(self.friction_angle0[m], self.friction_angle1[m]) * DEG2RAD;
        let dilation_angle = lerp(self.dilation_angle0[m], self.dilation_angle1[m]) * DEG2RAD;

        // The tension cutoff cannot exceed the apex of the yield envelope.
        let tension_max = if friction_angle > 0.0 {
            self.tension_max.min(cohesion / friction_angle.tan())
        } else {
            self.tension_max
        };

        PlasticProps {
            cohesion,
            friction_angle,
            dilation_angle,
            tension_max,
        }
    }

    /// Shortest Maxwell relaxation time over all materials, with the
    /// viscosity floored at the global clamp.
    pub fn min_maxwell_time(&self) -> f64 {
        (0..self.nmat)
            .map(|m| self.visc_min / self.shearm(m))
            .fold(f64::INFINITY, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    pub fn single_material(rheology: Rheology) -> MatProps {
        MatProps {
            rheology,
            nmat: 1,
            visc_min: 1e18,
            visc_max: 1e24,
            tension_max: 1e9,
            therm_diff_max: 5e-6,
            rho0: vec![3000.0],
            alpha: vec![0.0],
            bulk_modulus: vec![50e9],
            shear_modulus: vec![30e9],
            visc_exponent: vec![3.0],
            visc_coefficient: vec![1e3],
            visc_activation_energy: vec![350e3],
            heat_capacity: vec![1000.0],
            therm_cond: vec![3.0],
            pls0: vec![0.0],
            pls1: vec![0.5],
            cohesion0: vec![44e6],
            cohesion1: vec![4e6],
            friction_angle0: vec![30.0],
            friction_angle1: vec![5.0],
            dilation_angle0: vec![0.0],
            dilation_angle1: vec![0.0],
        }
    }

    #[test]
    fn test_rheology_names() {
        assert_eq!(Rheology::from_name("elastic").unwrap(), Rheology::Elastic);
        assert_eq!(
            Rheology::from_name("elasto-viscous-plastic").unwrap(),
            Rheology::ElastoViscousPlastic
        );
        assert!(Rheology::from_name("plastic").is_err());
    }

    #[test]
    fn test_weakening_interpolates() {
        let mat = single_material(Rheology::ElastoPlastic);

        let fresh = mat.plastic_props(0, 0.0);
        assert_relative_eq!(fresh.cohesion, 44e6);
        assert_relative_eq!(fresh.friction_angle, 30.0 * DEG2RAD);

        let half = mat.plastic_props(0, 0.25);
        assert_relative_eq!(half.cohesion, 24e6);

        let saturated = mat.plastic_props(0, 2.0);
        assert_relative_eq!(saturated.cohesion, 4e6);
        assert_relative_eq!(saturated.friction_angle, 5.0 * DEG2RAD);
    }

    #[test]
    fn test_tension_cutoff_capped_at_apex() {
        let mat = single_material(Rheology::ElastoPlastic);
        let props = mat.plastic_props(0, 0.0);
        let apex = props.cohesion / props.friction_angle.tan();
        assert!(props.tension_max <= apex + 1.0);
    }

    #[test]
    fn test_viscosity_clamped() {
        let mat = single_material(Rheology::Viscous);
        // A hot, fast element would fall below the floor.
        let eta = mat.visc(0, 1800.0, 1e-12);
        assert!(eta >= mat.visc_min && eta <= mat.visc_max);
        // A cold, slow element saturates the ceiling.
        let eta = mat.visc(0, 300.0, 1e-20);
        assert_relative_eq!(eta, mat.visc_max);
    }

    #[test]
    fn test_density_thermal_expansion() {
        let mut mat = single_material(Rheology::Elastic);
        mat.alpha = vec![3e-5];
        assert_relative_eq!(mat.rho(0, 273.0), 3000.0);
        assert!(mat.rho(0, 1273.0) < 3000.0);
    }
}
