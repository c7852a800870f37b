//! Configuration management.
//!
//! Reads a TOML file with tables `[sim] [mesh] [control] [bc] [ic] [mat]`
//! and validates it into the `Param` tree threaded through the solver.
//! Per-material quantities are arrays indexed by material tag. Validation
//! failures name the offending field and abort before any mesh is built.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::constants::NDIMS;
use crate::mechanics::material::{MatProps, Rheology};
use crate::physics::thermal::RadiogenicHeating;

/// Full parameter tree.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Param {
    #[serde(default)]
    pub sim: SimParam,
    #[serde(default)]
    pub mesh: MeshParam,
    #[serde(default)]
    pub control: ControlParam,
    #[serde(default)]
    pub bc: BcParam,
    #[serde(default)]
    pub ic: IcParam,
    #[serde(default)]
    pub mat: MatParam,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimParam {
    /// Prefix for the output files.
    pub modelname: String,
    /// Max. number of time steps.
    pub max_steps: Option<u64>,
    /// Max. time (in years).
    pub max_time_in_yr: Option<f64>,
    /// Output every so many steps.
    pub output_step_interval: Option<u64>,
    /// Output every so many years.
    pub output_time_interval_in_yr: Option<f64>,
    /// Restarting from a previous save?
    pub is_restarting: bool,
    /// Frame to restart from.
    pub restarting_from_frame: u32,
}

impl Default for SimParam {
    fn default() -> Self {
        Self {
            modelname: "output".to_string(),
            max_steps: None,
            max_time_in_yr: None,
            output_step_interval: None,
            output_time_interval_in_yr: None,
            is_restarting: false,
            restarting_from_frame: 0,
        }
    }
}

impl SimParam {
    pub fn max_steps(&self) -> u64 {
        self.max_steps.unwrap_or(u64::MAX)
    }

    pub fn max_time_in_yr(&self) -> f64 {
        self.max_time_in_yr.unwrap_or(f64::MAX)
    }

    pub fn output_step_interval(&self) -> u64 {
        self.output_step_interval.unwrap_or(u64::MAX)
    }

    pub fn output_time_interval_in_yr(&self) -> f64 {
        self.output_time_interval_in_yr.unwrap_or(f64::MAX)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MeshParam {
    /// How to create the initial mesh: 1 uniform, 2 with a refined zone.
    pub meshing_option: i32,
    /// Length of x (in meters).
    pub xlength: f64,
    /// Length of y (in meters), 3D only.
    pub ylength: f64,
    /// Length of z (in meters).
    pub zlength: f64,
    /// Spatial resolution (in meters).
    pub resolution: f64,
    /// Min. angle of all triangles (in degrees), 2D only.
    pub min_angle: f64,
    /// Min. dihedral angle of all tetrahedra (in degrees), 3D only.
    pub min_tet_angle: f64,
    /// Max. radius / length ratio of all tetrahedra, 3D only.
    pub max_ratio: f64,
    /// Remeshing trigger threshold on the worst element quality.
    pub min_quality: f64,
    /// Smallest tolerated element volume, as a fraction of resolution^NDIMS.
    pub smallest_size: f64,
    /// Restore drifting bottom nodes to the nominal depth when remeshing?
    pub restoring_bottom: bool,
    /// Refined portion of each axis ([d0, d1]; 0 <= d0 <= d1 <= 1),
    /// meshing_option 2 only.
    pub refined_zonex: (f64, f64),
    pub refined_zoney: (f64, f64),
    pub refined_zonez: (f64, f64),
    /// Check the mesh quality every so many steps.
    pub quality_check_step_interval: u64,
}

impl Default for MeshParam {
    fn default() -> Self {
        Self {
            meshing_option: 1,
            xlength: 0.0,
            ylength: 0.0,
            zlength: 0.0,
            resolution: 0.0,
            min_angle: 32.0,
            min_tet_angle: 22.0,
            max_ratio: 2.0,
            min_quality: 0.3,
            smallest_size: 1e-3,
            restoring_bottom: true,
            refined_zonex: (0.0, 1.0),
            refined_zoney: (0.0, 1.0),
            refined_zonez: (0.0, 1.0),
            quality_check_step_interval: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlParam {
    /// Magnitude of gravity (in m/s^2).
    pub gravity: f64,
    /// Scaling factor for inertia (a large number).
    pub inertial_scaling: f64,
    /// Force damping factor (0-1).
    pub damping_factor: f64,
    /// Reference pressure: 0 uses the 0-th material everywhere, 1 and 2
    /// press with each element's own material.
    pub ref_pressure_option: i32,
    /// Fraction of the stability limit used as the time step.
    pub dt_fraction: f64,
    /// Fixed time step (in seconds); 0 means automatic.
    pub fixed_dt: f64,
    /// Expected advection speed entering the dt limit (in m/s).
    pub characteristic_speed: f64,
}

impl Default for ControlParam {
    fn default() -> Self {
        Self {
            gravity: 10.0,
            inertial_scaling: 1e5,
            damping_factor: 0.8,
            ref_pressure_option: 0,
            dt_fraction: 0.5,
            fixed_dt: 0.0,
            characteristic_speed: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BcParam {
    /// Surface temperature (in Kelvin).
    pub surface_temperature: f64,
    /// Mantle temperature (in Kelvin).
    pub mantle_temperature: f64,
    /// Pin the bottom temperature to the mantle temperature?
    pub has_bottom_temperature_bc: bool,
    /// Magnitude of boundary velocity (in m/s).
    pub max_vbc_val: f64,
    /// Winkler foundation on the bottom boundary?
    pub has_winkler_foundation: bool,
    /// Excess density of the Winkler foundation (in kg/m^3).
    pub winkler_delta_rho: f64,

    pub vbc_x0: i32,
    pub vbc_x1: i32,
    pub vbc_y0: i32,
    pub vbc_y1: i32,
    pub vbc_z0: i32,
    pub vbc_z1: i32,

    pub vbc_val_x0: Option<f64>,
    pub vbc_val_x1: Option<f64>,
    pub vbc_val_y0: Option<f64>,
    pub vbc_val_y1: Option<f64>,
    pub vbc_val_z0: Option<f64>,
    pub vbc_val_z1: Option<f64>,

    pub vbc_period_x0_time_in_yr: Vec<f64>,
    pub vbc_period_x0_ratio: Vec<f64>,
    pub vbc_period_x1_time_in_yr: Vec<f64>,
    pub vbc_period_x1_ratio: Vec<f64>,
}

impl Default for BcParam {
    fn default() -> Self {
        Self {
            surface_temperature: 273.0,
            mantle_temperature: 1600.0,
            has_bottom_temperature_bc: false,
            max_vbc_val: 1e-9,
            has_winkler_foundation: true,
            winkler_delta_rho: 0.0,
            vbc_x0: 1,
            vbc_x1: 1,
            vbc_y0: 1,
            vbc_y1: 1,
            vbc_z0: 0,
            vbc_z1: 0,
            vbc_val_x0: None,
            vbc_val_x1: None,
            vbc_val_y0: None,
            vbc_val_y1: None,
            vbc_val_z0: None,
            vbc_val_z1: None,
            vbc_period_x0_time_in_yr: Vec::new(),
            vbc_period_x0_ratio: Vec::new(),
            vbc_period_x1_time_in_yr: Vec::new(),
            vbc_period_x1_ratio: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IcParam {
    /// Material tag per layer, top down.
    pub layer_mattypes: Vec<i32>,
    /// Depth (in meters) of each interface between consecutive layers.
    pub mattype_layer_depths: Vec<f64>,

    /// 0 none, 1 planar, 2 ellipsoidal, 3 Gaussian point.
    pub weakzone_option: i32,
    /// Plastic strain seeded inside the weak zone.
    pub weakzone_plstrain: f64,
    /// Azimuth of the planar zone (in degrees).
    pub weakzone_azimuth: f64,
    /// Inclination of the planar zone (in degrees).
    pub weakzone_inclination: f64,
    /// Half-width of the planar zone (in multiples of the resolution).
    pub weakzone_halfwidth: f64,
    /// y extent of the planar zone (as fractions of ylength), 3D only.
    pub weakzone_y_min: f64,
    pub weakzone_y_max: f64,
    /// Depth extent of the planar zone (as fractions of zlength).
    pub weakzone_depth_min: f64,
    pub weakzone_depth_max: f64,
    /// Zone center (as fractions of the domain lengths).
    pub weakzone_xcenter: f64,
    pub weakzone_ycenter: f64,
    pub weakzone_zcenter: f64,
    /// Semi-axes of the ellipsoidal zone (in meters).
    pub weakzone_xsemi_axis: f64,
    pub weakzone_ysemi_axis: f64,
    pub weakzone_zsemi_axis: f64,
    /// Standard deviation of the Gaussian zone (in meters).
    pub weakzone_standard_deviation: f64,

    /// 0 half-space oceanic, 1 continental geotherm, 90 external file.
    pub temperature_option: i32,
    /// Raw binary file of nnode doubles, temperature_option 90.
    pub temperature_filename: String,
    pub oceanic_plate_age_in_yr: f64,
    pub continental_plate_age_in_yr: f64,
    pub radiogenic_crustal_thickness: f64,
    pub radiogenic_folding_depth: f64,
    /// Radiogenic heat production at the surface (in W/kg); 0 disables
    /// the heat source.
    pub radiogenic_heating_of_crust: f64,
    pub lithospheric_thickness: f64,
}

impl Default for IcParam {
    fn default() -> Self {
        Self {
            layer_mattypes: Vec::new(),
            mattype_layer_depths: Vec::new(),
            weakzone_option: 0,
            weakzone_plstrain: 0.1,
            weakzone_azimuth: 0.0,
            weakzone_inclination: 90.0,
            weakzone_halfwidth: 1.6,
            weakzone_y_min: 0.0,
            weakzone_y_max: 1.0,
            weakzone_depth_min: 0.0,
            weakzone_depth_max: 0.5,
            weakzone_xcenter: 0.5,
            weakzone_ycenter: 0.5,
            weakzone_zcenter: 0.5,
            weakzone_xsemi_axis: 1e3,
            weakzone_ysemi_axis: 1e3,
            weakzone_zsemi_axis: 1e3,
            weakzone_standard_deviation: 1e3,
            temperature_option: 0,
            temperature_filename: String::new(),
            oceanic_plate_age_in_yr: 60e6,
            continental_plate_age_in_yr: 100e6,
            radiogenic_crustal_thickness: 30e3,
            radiogenic_folding_depth: 10e3,
            radiogenic_heating_of_crust: 0.0,
            lithospheric_thickness: 100e3,
        }
    }
}

impl IcParam {
    /// The radiogenic heat source, when enabled.
    pub fn radiogenic(&self) -> Option<RadiogenicHeating> {
        if self.radiogenic_heating_of_crust > 0.0 {
            Some(RadiogenicHeating {
                heat_rate: self.radiogenic_heating_of_crust,
                folding_depth: self.radiogenic_folding_depth,
                crustal_thickness: self.radiogenic_crustal_thickness,
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatParam {
    /// 'elastic', 'viscous', 'maxwell', 'elasto-plastic' or
    /// 'elasto-viscous-plastic'.
    pub rheology_type: String,
    /// Number of material types.
    pub num_material: usize,
    pub mattype_crust: i32,
    pub mattype_mantle: i32,

    pub max_viscosity: f64,
    pub min_viscosity: f64,
    pub max_tension: f64,
    pub max_thermal_diffusivity: f64,

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

impl Default for MatParam {
    fn default() -> Self {
        Self {
            rheology_type: "elastic".to_string(),
            num_material: 1,
            mattype_crust: 0,
            mattype_mantle: 0,
            max_viscosity: 1e24,
            min_viscosity: 1e18,
            max_tension: 1e9,
            max_thermal_diffusivity: 5e-6,
            rho0: vec![3210.0],
            alpha: vec![3e-5],
            bulk_modulus: vec![128.2e9],
            shear_modulus: vec![80.5e9],
            visc_exponent: vec![3.05],
            visc_coefficient: vec![1.25e9],
            visc_activation_energy: vec![3.76e5],
            heat_capacity: vec![1000.0],
            therm_cond: vec![3.3],
            pls0: vec![0.0],
            pls1: vec![0.1],
            cohesion0: vec![44e6],
            cohesion1: vec![4e6],
            friction_angle0: vec![30.0],
            friction_angle1: vec![5.0],
            dilation_angle0: vec![0.0],
            dilation_angle1: vec![0.0],
        }
    }
}

impl MatParam {
    /// Build the material property tables, checking every vector covers
    /// all materials.
    pub fn build_props(&self) -> Result<MatProps, String> {
        let rheology = Rheology::from_name(&self.rheology_type)?;
        let nmat = self.num_material;
        if nmat == 0 {
            return Err("mat.num_material must be at least 1".to_string());
        }

        let check = |name: &str, v: &Vec<f64>| -> Result<Vec<f64>, String> {
            if v.len() != nmat {
                Err(format!(
                    "mat.{} has {} entries, expected num_material = {}",
                    name,
                    v.len(),
                    nmat
                ))
            } else {
                Ok(v.clone())
            }
        };

        Ok(MatProps {
            rheology,
            nmat,
            visc_min: self.min_viscosity,
            visc_max: self.max_viscosity,
            tension_max: self.max_tension,
            therm_diff_max: self.max_thermal_diffusivity,
            rho0: check("rho0", &self.rho0)?,
            alpha: check("alpha", &self.alpha)?,
            bulk_modulus: check("bulk_modulus", &self.bulk_modulus)?,
            shear_modulus: check("shear_modulus", &self.shear_modulus)?,
            visc_exponent: check("visc_exponent", &self.visc_exponent)?,
            visc_coefficient: check("visc_coefficient", &self.visc_coefficient)?,
            visc_activation_energy: check(
                "visc_activation_energy",
                &self.visc_activation_energy,
            )?,
            heat_capacity: check("heat_capacity", &self.heat_capacity)?,
            therm_cond: check("therm_cond", &self.therm_cond)?,
            pls0: check("pls0", &self.pls0)?,
            pls1: check("pls1", &self.pls1)?,
            cohesion0: check("cohesion0", &self.cohesion0)?,
            cohesion1: check("cohesion1", &self.cohesion1)?,
            friction_angle0: check("friction_angle0", &self.friction_angle0)?,
            friction_angle1: check("friction_angle1", &self.friction_angle1)?,
            dilation_angle0: check("dilation_angle0", &self.dilation_angle0)?,
            dilation_angle1: check("dilation_angle1", &self.dilation_angle1)?,
        })
    }
}

impl Param {
    /// Load and validate a configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("failed to read config file: {}", e))?;
        let mut param: Param =
            toml::from_str(&contents).map_err(|e| format!("failed to parse config file: {}", e))?;
        param.validate()?;
        Ok(param)
    }

    /// Cross-field validation, mirroring the fail-fast rules of the
    /// configuration reader.
    pub fn validate(&mut self) -> Result<(), String> {
        if self.sim.max_steps.is_none() && self.sim.max_time_in_yr.is_none() {
            return Err("must provide either sim.max_steps or sim.max_time_in_yr".to_string());
        }
        if self.sim.output_step_interval.is_none()
            && self.sim.output_time_interval_in_yr.is_none()
        {
            return Err(
                "must provide either sim.output_step_interval or sim.output_time_interval_in_yr"
                    .to_string(),
            );
        }

        if self.mesh.xlength <= 0.0 || self.mesh.zlength <= 0.0 {
            return Err("mesh.xlength and mesh.zlength must be positive".to_string());
        }
        if NDIMS == 3 && self.mesh.ylength <= 0.0 {
            return Err("mesh.ylength must be positive in 3D".to_string());
        }
        if self.mesh.resolution <= 0.0 {
            return Err("mesh.resolution must be positive".to_string());
        }
        if self.mesh.meshing_option == 2 {
            for (name, zone) in [
                ("refined_zonex", self.mesh.refined_zonex),
                ("refined_zoney", self.mesh.refined_zoney),
                ("refined_zonez", self.mesh.refined_zonez),
            ] {
                if !(0.0 <= zone.0 && zone.0 <= zone.1 && zone.1 <= 1.0) {
                    return Err(format!(
                        "mesh.{}: must be [d0, d1] with 0 <= d0 <= d1 <= 1",
                        name
                    ));
                }
            }
        }

        if !(0.0..=1.0).contains(&self.control.damping_factor) {
            return Err("control.damping_factor must be between 0 and 1".to_string());
        }

        if self.bc.has_winkler_foundation && self.control.gravity == 0.0 {
            self.bc.has_winkler_foundation = false;
            eprintln!("Warning: no gravity, Winkler foundation is turned off.");
        }

        if self.mat.min_viscosity > self.mat.max_viscosity {
            return Err("mat.min_viscosity exceeds mat.max_viscosity".to_string());
        }
        self.mat.build_props()?;

        if !matches!(self.ic.weakzone_option, 0..=3) {
            return Err(format!(
                "unknown ic.weakzone_option: {}",
                self.ic.weakzone_option
            ));
        }
        if !matches!(self.ic.temperature_option, 0 | 1 | 90) {
            return Err(format!(
                "unknown ic.temperature_option: {}",
                self.ic.temperature_option
            ));
        }
        if !self.ic.layer_mattypes.is_empty()
            && self.ic.mattype_layer_depths.len() + 1 != self.ic.layer_mattypes.len()
        {
            return Err(
                "ic.mattype_layer_depths must have one entry fewer than ic.layer_mattypes"
                    .to_string(),
            );
        }

        Ok(())
    }

    /// One-line-per-group help text for `-h`.
    pub fn help() -> String {
        let mut s = String::new();
        s.push_str("Usage: tectosim CONFIG_FILE\n\n");
        s.push_str("The config file is TOML with these tables:\n");
        s.push_str("  [sim]      modelname, max_steps, max_time_in_yr,\n");
        s.push_str("             output_step_interval, output_time_interval_in_yr,\n");
        s.push_str("             is_restarting, restarting_from_frame\n");
        s.push_str("  [mesh]     meshing_option, xlength, ylength, zlength, resolution,\n");
        s.push_str("             min_angle, min_tet_angle, max_ratio, min_quality,\n");
        s.push_str("             smallest_size, restoring_bottom, refined_zone{x,y,z},\n");
        s.push_str("             quality_check_step_interval\n");
        s.push_str("  [control]  gravity, inertial_scaling, damping_factor,\n");
        s.push_str("             ref_pressure_option, dt_fraction, fixed_dt,\n");
        s.push_str("             characteristic_speed\n");
        s.push_str("  [bc]       surface_temperature, mantle_temperature, max_vbc_val,\n");
        s.push_str("             has_winkler_foundation, winkler_delta_rho,\n");
        s.push_str("             vbc_{x0,x1,y0,y1,z0,z1}, vbc_val_*, vbc_period_*\n");
        s.push_str("  [ic]       temperature_option, weakzone_option and geometry,\n");
        s.push_str("             layer_mattypes, mattype_layer_depths\n");
        s.push_str("  [mat]      rheology_type, num_material, per-material vectors\n");
        s
    }

    /// Print a banner summarizing the run configuration.
    pub fn print_summary(&self) {
        println!("=========================================================");
        println!("  {}", self.sim.modelname);
        println!("=========================================================");
        if NDIMS == 3 {
            println!(
                "Domain: {:.1} x {:.1} x {:.1} km, resolution {:.2} km",
                self.mesh.xlength / 1e3,
                self.mesh.ylength / 1e3,
                self.mesh.zlength / 1e3,
                self.mesh.resolution / 1e3
            );
        } else {
            println!(
                "Domain: {:.1} x {:.1} km, resolution {:.2} km",
                self.mesh.xlength / 1e3,
                self.mesh.zlength / 1e3,
                self.mesh.resolution / 1e3
            );
        }
        println!(
            "Rheology: {}, {} material(s)",
            self.mat.rheology_type, self.mat.num_material
        );
        println!(
            "Gravity {} m/s^2, inertial scaling {:.1e}, damping {}",
            self.control.gravity, self.control.inertial_scaling, self.control.damping_factor
        );
        println!("=========================================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
        [sim]
        modelname = "test"
        max_steps = 100
        output_step_interval = 10

        [mesh]
        xlength = 4000.0
        zlength = 1000.0
        resolution = 250.0

        [mat]
        rheology_type = "elastic"
        "#
    }

    #[test]
    fn test_parse_minimal_config() {
        let mut param: Param = toml::from_str(minimal_toml()).unwrap();
        param.validate().unwrap();
        assert_eq!(param.sim.modelname, "test");
        assert_eq!(param.sim.max_steps(), 100);
        assert_eq!(param.mesh.resolution, 250.0);
        // Defaults fill the rest.
        assert_eq!(param.control.gravity, 10.0);
        assert_eq!(param.bc.surface_temperature, 273.0);
        assert_eq!(param.mesh.min_quality, 0.3);
    }

    #[test]
    fn test_missing_stop_condition_rejected() {
        let mut param: Param = toml::from_str(
            r#"
            [mesh]
            xlength = 1000.0
            zlength = 1000.0
            resolution = 100.0
            [mat]
            rheology_type = "elastic"
            "#,
        )
        .unwrap();
        let err = param.validate().unwrap_err();
        assert!(err.contains("max_steps"), "got: {}", err);
    }

    #[test]
    fn test_bad_rheology_rejected() {
        let mut param: Param = toml::from_str(minimal_toml()).unwrap();
        param.mat.rheology_type = "plastic-fantastic".to_string();
        assert!(param.validate().is_err());
    }

    #[test]
    fn test_damping_range_enforced() {
        let mut param: Param = toml::from_str(minimal_toml()).unwrap();
        param.control.damping_factor = 1.5;
        assert!(param.validate().is_err());
    }

    #[test]
    fn test_material_vector_length_checked() {
        let mut param: Param = toml::from_str(minimal_toml()).unwrap();
        param.mat.num_material = 2;
        let err = param.validate().unwrap_err();
        assert!(err.contains("rho0"), "got: {}", err);
    }

    #[test]
    fn test_winkler_disabled_without_gravity() {
        let mut param: Param = toml::from_str(minimal_toml()).unwrap();
        param.control.gravity = 0.0;
        assert!(param.bc.has_winkler_foundation);
        param.validate().unwrap();
        assert!(!param.bc.has_winkler_foundation);
    }

    #[test]
    fn test_refined_zone_validation() {
        let mut param: Param = toml::from_str(minimal_toml()).unwrap();
        param.mesh.meshing_option = 2;
        param.mesh.refined_zonex = (0.7, 0.3);
        assert!(param.validate().is_err());
    }
}
