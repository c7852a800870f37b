//! The long-lived solver context and the time-stepping driver.
//!
//! `Variables` owns every field array and is threaded explicitly into each
//! core routine; there is no hidden global state. The step order is fixed:
//! thermal, kinematics, stress, forces, velocity, velocity BCs, coordinate,
//! geometry recompute, dt every few steps, stress rotation. Remeshing runs
//! between steps when the quality check trips.

use std::time::Instant;

use crate::bc::VbcSpec;
use crate::config::Param;
use crate::constants::{
    IBOUNDZ0, NBDRYTYPES, NDIMS, NODES_PER_ELEM, NODES_PER_FACET, NSTR, YEAR2SEC,
};
use crate::mechanics::force::{apply_damping, apply_winkler_foundation, update_force};
use crate::mechanics::material::MatProps;
use crate::mechanics::strain::update_strain_rate;
use crate::mechanics::stress::{rotate_stress, update_stress};
use crate::mesh::fields::{ScalarField, VectorField};
use crate::mesh::generator::{MeshBuffers, MeshSource};
use crate::mesh::geometry::{compute_shape_fn, compute_volume, ShapeGrad};
use crate::mesh::topology::{
    create_boundary_facets, create_boundary_flags, create_boundary_nodes, create_support,
};
use crate::output;
use crate::physics::thermal::update_temperature;
use crate::remesh::{bad_mesh_quality, remesh};
use crate::timestepping::{compute_dt, compute_mass, update_coordinate, update_velocity};
use crate::{ic, utils};

/// All solver state: mesh arrays, field arrays, derived tables and the
/// step counters.
pub struct Variables {
    pub time: f64,
    pub dt: f64,
    pub steps: u64,
    pub frame: u32,

    pub nnode: usize,
    pub nelem: usize,
    pub nseg: usize,

    // Mesh arrays (adopted from the generator).
    pub coord: VectorField<f64, NDIMS>,
    pub connectivity: VectorField<usize, NODES_PER_ELEM>,
    pub segment: VectorField<usize, NODES_PER_FACET>,
    pub segflag: ScalarField<u32>,

    // Derived boundary and adjacency tables.
    pub bcflag: ScalarField<u32>,
    pub bnodes: [Vec<usize>; NBDRYTYPES],
    pub bfacets: [Vec<(usize, usize)>; NBDRYTYPES],
    pub support: Vec<Vec<usize>>,

    // Geometry.
    pub volume: ScalarField<f64>,
    pub volume_old: ScalarField<f64>,
    pub shpgrad: ScalarField<ShapeGrad>,

    // Node fields.
    pub mass: ScalarField<f64>,
    pub tmass: ScalarField<f64>,
    pub temperature: ScalarField<f64>,
    pub tdot: ScalarField<f64>,
    pub vel: VectorField<f64, NDIMS>,
    pub force: VectorField<f64, NDIMS>,

    // Element fields.
    pub strain_rate: VectorField<f64, NSTR>,
    pub strain: VectorField<f64, NSTR>,
    pub stress: VectorField<f64, NSTR>,
    pub plstrain: ScalarField<f64>,
    pub delta_plstrain: ScalarField<f64>,
    pub mattype: ScalarField<i32>,

    pub mat: MatProps,
    pub vbc: VbcSpec,
    pub max_vbc_val: f64,
    pub compensation_pressure: f64,
}

impl Variables {
    /// Allocate an empty context around adopted mesh buffers.
    fn from_buffers(param: &Param, buffers: MeshBuffers) -> Result<Self, String> {
        let mat = param.mat.build_props()?;
        let vbc = VbcSpec::from_config(&param.bc)?;
        let max_vbc_val = vbc.max_vbc_val();

        let nnode = buffers.nnode();
        let nelem = buffers.nelem();
        let nseg = buffers.nseg();
        if nelem == 0 {
            return Err("mesh generator returned zero elements".to_string());
        }

        Ok(Self {
            time: 0.0,
            dt: 0.0,
            steps: 0,
            frame: 0,
            nnode,
            nelem,
            nseg,
            coord: VectorField::from_vec(buffers.coord),
            connectivity: VectorField::from_vec(buffers.connectivity),
            segment: VectorField::from_vec(buffers.segment),
            segflag: ScalarField::from_vec(buffers.segflag),
            bcflag: ScalarField::zeros(0),
            bnodes: std::array::from_fn(|_| Vec::new()),
            bfacets: std::array::from_fn(|_| Vec::new()),
            support: Vec::new(),
            volume: ScalarField::zeros(0),
            volume_old: ScalarField::zeros(0),
            shpgrad: ScalarField::zeros(0),
            mass: ScalarField::zeros(nnode),
            tmass: ScalarField::zeros(nnode),
            temperature: ScalarField::zeros(nnode),
            tdot: ScalarField::zeros(nnode),
            vel: VectorField::zeros(nnode),
            force: VectorField::zeros(nnode),
            strain_rate: VectorField::zeros(nelem),
            strain: VectorField::zeros(nelem),
            stress: VectorField::zeros(nelem),
            plstrain: ScalarField::zeros(nelem),
            delta_plstrain: ScalarField::zeros(nelem),
            mattype: ScalarField::zeros(nelem),
            mat,
            vbc,
            max_vbc_val,
            compensation_pressure: 0.0,
        })
    }

    /// Rebuild every derived array after the mesh arrays changed: boundary
    /// tables, support, geometry, lumped masses, strain rate and forces.
    pub fn rehydrate_derived(&mut self, param: &Param) -> Result<(), String> {
        self.bcflag = create_boundary_flags(self.nnode, &self.segment, &self.segflag);
        self.bnodes = create_boundary_nodes(&self.bcflag);
        self.bfacets = create_boundary_facets(&self.connectivity, &self.bcflag);
        self.support = create_support(self.nnode, &self.connectivity);

        let n_bad = compute_volume(&self.coord, &self.connectivity, &mut self.volume);
        if n_bad > 0 {
            return Err(format!("{} non-positive element(s) in a fresh mesh", n_bad));
        }
        self.volume_old = self.volume.clone();

        compute_mass(
            &self.mat,
            &self.connectivity,
            &self.volume,
            &self.mattype,
            &self.temperature,
            &mut self.mass,
            &mut self.tmass,
        );
        compute_shape_fn(&self.coord, &self.connectivity, &self.volume, &mut self.shpgrad);

        self.tdot.resize(self.nnode);
        self.force.resize(self.nnode);
        update_strain_rate(
            &self.connectivity,
            &self.vel,
            &self.shpgrad,
            &mut self.strain_rate,
        );
        assemble_forces(param, self);
        Ok(())
    }
}

/// Assemble the full nodal force: internal + gravity, Winkler foundation,
/// then damping.
pub fn assemble_forces(param: &Param, var: &mut Variables) {
    update_force(
        &var.mat,
        param.control.gravity,
        &var.connectivity,
        &var.mattype,
        &var.temperature,
        &var.stress,
        &var.volume,
        &var.shpgrad,
        &mut var.force,
    );
    if param.bc.has_winkler_foundation {
        apply_winkler_foundation(
            &var.mat,
            param.control.gravity,
            param.bc.winkler_delta_rho,
            var.compensation_pressure,
            param.mesh.zlength,
            &var.coord,
            &var.connectivity,
            &var.mattype,
            &var.bfacets[IBOUNDZ0],
            &mut var.force,
        );
    }
    apply_damping(param.control.damping_factor, &var.vel, &mut var.force);
}

/// Build the initial state: mesh, boundary tables, material layout,
/// initial fields and the first stable dt.
pub fn init(param: &Param, source: &dyn MeshSource) -> Result<Variables, String> {
    let buffers = source.initial_mesh(&param.mesh)?;
    let mut var = Variables::from_buffers(param, buffers)?;

    var.mattype = ic::initial_material(param, &var.coord, &var.connectivity);
    ic::initial_temperature(param, &var.mat, &var.coord, &mut var.temperature)?;
    ic::initial_weakzone(param, &var.coord, &var.connectivity, &mut var.plstrain)?;
    var.compensation_pressure = ic::initial_stress_state(
        param,
        &var.mat,
        &var.coord,
        &var.connectivity,
        &var.mattype,
        &mut var.stress,
        &mut var.strain,
    );

    var.rehydrate_derived(param)?;
    var.vbc.apply_vbcs(var.time, &var.bcflag, &mut var.vel);

    var.dt = compute_dt(
        &param.control,
        &var.mat,
        &var.volume,
        &var.mattype,
        var.max_vbc_val,
    )
    .dt;
    Ok(var)
}

/// Resume from a saved frame. The restored state reproduces a continuous
/// run bit-for-bit.
pub fn restart(param: &Param) -> Result<Variables, String> {
    let frame = param.sim.restarting_from_frame;
    let data = output::read_frame(param, frame)?;

    let buffers = MeshBuffers {
        coord: data.coord,
        connectivity: data.connectivity,
        segment: data.segment,
        segflag: data.segflag,
    };
    let mut var = Variables::from_buffers(param, buffers)?;

    var.time = data.time;
    var.dt = data.dt;
    var.steps = data.steps;
    var.frame = frame + 1;
    var.temperature = ScalarField::from_vec(data.temperature);
    var.vel = VectorField::from_vec(data.vel);
    var.stress = VectorField::from_vec(data.stress);
    var.strain = VectorField::from_vec(data.strain);
    var.plstrain = ScalarField::from_vec(data.plstrain);
    var.delta_plstrain = ScalarField::zeros(var.nelem);
    var.mattype = ScalarField::from_vec(data.mattype);

    if param.control.gravity != 0.0 {
        var.compensation_pressure = ic::ref_pressure(param, &var.mat, -param.mesh.zlength);
    }
    var.rehydrate_derived(param)?;
    output::truncate_info(param, frame)?;
    Ok(var)
}

/// Advance the solution by one explicit step.
pub fn step(param: &Param, var: &mut Variables) {
    var.steps += 1;
    var.time += var.dt;

    update_temperature(
        &var.mat,
        param.bc.surface_temperature,
        param
            .bc
            .has_bottom_temperature_bc
            .then_some(param.bc.mantle_temperature),
        param.ic.radiogenic().as_ref(),
        var.dt,
        &var.coord,
        &var.connectivity,
        &var.mattype,
        &var.volume,
        &var.shpgrad,
        &var.tmass,
        &var.bcflag,
        &mut var.temperature,
        &mut var.tdot,
    );

    update_strain_rate(
        &var.connectivity,
        &var.vel,
        &var.shpgrad,
        &mut var.strain_rate,
    );

    update_stress(
        &var.mat,
        var.dt,
        &var.connectivity,
        &var.temperature,
        &var.mattype,
        &var.strain_rate,
        &mut var.strain,
        &mut var.stress,
        &mut var.plstrain,
        &mut var.delta_plstrain,
    );

    assemble_forces(param, var);

    update_velocity(
        param.control.inertial_scaling,
        var.dt,
        &var.mass,
        &var.force,
        &mut var.vel,
    );
    var.vbc.apply_vbcs(var.time, &var.bcflag, &mut var.vel);

    update_coordinate(var.dt, &var.vel, &mut var.coord);

    // Geometry follows the moved nodes. Inverted elements are reported
    // here and resolved by the quality check right after the step.
    var.volume.swap(&mut var.volume_old);
    compute_volume(&var.coord, &var.connectivity, &mut var.volume);
    compute_mass(
        &var.mat,
        &var.connectivity,
        &var.volume,
        &var.mattype,
        &var.temperature,
        &mut var.mass,
        &mut var.tmass,
    );
    compute_shape_fn(&var.coord, &var.connectivity, &var.volume, &mut var.shpgrad);

    // dt computation is expensive and dt changes slowly.
    if var.steps % 10 == 0 {
        var.dt = compute_dt(
            &param.control,
            &var.mat,
            &var.volume,
            &var.mattype,
            var.max_vbc_val,
        )
        .dt;
    }

    rotate_stress(
        &var.connectivity,
        &var.vel,
        &var.shpgrad,
        var.dt,
        &mut var.stress,
    );
}

/// Drive the simulation until a terminal condition, writing frames and
/// remeshing as needed.
pub fn run(
    param: &Param,
    var: &mut Variables,
    source: &dyn MeshSource,
    start: &Instant,
) -> Result<(), String> {
    loop {
        step(param, var);

        if var.steps % param.mesh.quality_check_step_interval == 0
            && bad_mesh_quality(param, var).code() != 0
        {
            remesh(param, var, source)?;
        }

        let step_hit = param
            .sim
            .output_step_interval
            .map_or(false, |k| var.steps == var.frame as u64 * k);
        let time_hit = param
            .sim
            .output_time_interval_in_yr
            .map_or(false, |t| var.time > var.frame as f64 * t * YEAR2SEC);
        if step_hit || time_hit {
            output::output(param, var, start);
            println!(
                "  Output # {}, step = {}, time = {:.6e} yr, dt = {:.4e} yr.",
                var.frame,
                var.steps,
                utils::seconds_to_years(var.time),
                utils::seconds_to_years(var.dt)
            );
            var.frame += 1;
        }

        if var.steps >= param.sim.max_steps()
            || var.time > param.sim.max_time_in_yr() * YEAR2SEC
        {
            return Ok(());
        }
    }
}
