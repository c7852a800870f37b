//! Remeshing: quality detection, bottom restoration, tiny-element removal,
//! topology rebuild and field transfer.
//!
//! The remesher runs between solver steps. It copies the node cloud and
//! boundary segments out of the field store, repairs the bottom boundary if
//! configured, asks the mesh source for a new topology, purges nodes caught
//! inside tiny elements, interpolates every field onto the new mesh and
//! rebuilds all derived arrays.

pub mod interpolation;

use crate::config::Param;
use crate::constants::{
    BOUNDX0, BOUNDX1, BOUNDY0, BOUNDY1, BOUNDZ0, BOUNDZ1, NDIMS, NODES_PER_ELEM,
    NODES_PER_FACET,
};
use crate::mesh::fields::{ScalarField, VectorField};
use crate::mesh::generator::MeshSource;
use crate::mesh::geometry;
use crate::mesh::quality::worst_quality;
use crate::simulation::Variables;
use self::interpolation::FieldTransfer;

/// Marker for a segment slot whose facet has been deleted.
pub const DELETED_FACET: usize = usize::MAX;

/// Why (if at all) the mesh must be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BadMesh {
    None,
    /// Worst element quality fell below `mesh.min_quality`.
    WorstQuality { elem: usize, q: f64 },
    /// A bottom node drifted too far from the nominal bottom depth.
    BottomDrift { node: usize, z: f64 },
}

impl BadMesh {
    pub fn code(&self) -> i32 {
        match self {
            BadMesh::None => 0,
            BadMesh::WorstQuality { .. } => 1,
            BadMesh::BottomDrift { .. } => 2,
        }
    }
}

/// Check whether the mesh needs remeshing.
pub fn bad_mesh_quality(param: &Param, var: &Variables) -> BadMesh {
    if param.mesh.restoring_bottom {
        let bottom = -param.mesh.zlength;
        let dist_ratio = 0.25;
        for n in 0..var.nnode {
            if var.bcflag[n] & BOUNDZ0 != 0 {
                let z = var.coord[n][NDIMS - 1];
                if (z - bottom).abs() > dist_ratio * param.mesh.resolution {
                    println!("Node {} is too far from the bottom: z = {}", n, z);
                    return BadMesh::BottomDrift { node: n, z };
                }
            }
        }
    }

    let (q, elem) = worst_quality(&var.coord, &var.connectivity);
    if q < param.mesh.min_quality {
        println!("Worst mesh quality = {} at element #{}.", q, elem);
        return BadMesh::WorstQuality { elem, q };
    }
    BadMesh::None
}

/// Is this node a bottom corner (on the bottom and on the side walls)?
fn is_bottom_corner(flag: u32) -> bool {
    if flag & BOUNDZ0 == 0 {
        return false;
    }
    let on_x = flag & (BOUNDX0 | BOUNDX1) != 0;
    if NDIMS == 3 {
        let on_y = flag & (BOUNDY0 | BOUNDY1) != 0;
        on_x && on_y
    } else {
        on_x
    }
}

/// Snap the bottom corners back to the nominal depth, mark every other
/// bottom node (and near-bottom interior node) for deletion, and replace
/// the bottom facets with fresh ones spanning the corners.
fn new_bottom(
    qflags: &[u32],
    qcoord: &mut [[f64; NDIMS]],
    bottom_depth: f64,
    points_to_delete: &mut Vec<usize>,
    min_dist: f64,
    qsegment: &mut [[usize; NODES_PER_FACET]],
    qsegflag: &mut [u32],
) -> Result<(), String> {
    const OTHER_BDRY: u32 = BOUNDX0 | BOUNDX1 | BOUNDY0 | BOUNDY1 | BOUNDZ1;

    let mut corners = Vec::new();
    for (i, &flag) in qflags.iter().enumerate() {
        if flag & BOUNDZ0 != 0 {
            if is_bottom_corner(flag) {
                corners.push(i);
            } else {
                points_to_delete.push(i);
            }
        } else if flag & OTHER_BDRY == 0
            && (qcoord[i][NDIMS - 1] - bottom_depth).abs() < min_dist
        {
            points_to_delete.push(i);
        }
    }

    // Must have 2 corners in 2D, 4 in 3D.
    if corners.len() != (2 << (NDIMS - 2)) {
        return Err(format!(
            "cannot find all bottom corners before remeshing, n_bottom_corners = {}",
            corners.len()
        ));
    }

    for &n in &corners {
        qcoord[n][NDIMS - 1] = bottom_depth;
    }

    // Order the corners around the bottom: by x in 2D, as a ring in 3D.
    corners.sort_by(|&a, &b| {
        qcoord[a][0]
            .partial_cmp(&qcoord[b][0])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    #[cfg(feature = "three_d")]
    let corners = order_ring(&corners, qcoord);

    for (s, seg) in qsegment.iter_mut().enumerate() {
        if qsegflag[s] == BOUNDZ0 {
            *seg = [DELETED_FACET; NODES_PER_FACET];
        }
    }

    // Synthesize the new bottom facets in the first deleted slots:
    // one segment in 2D, two triangles sharing the diagonal in 3D.
    let new_facets: Vec<[usize; NODES_PER_FACET]> = bottom_facets(&corners);
    let mut it = new_facets.into_iter();
    for (s, seg) in qsegment.iter_mut().enumerate() {
        if seg[0] == DELETED_FACET {
            match it.next() {
                Some(facet) => {
                    *seg = facet;
                    qsegflag[s] = BOUNDZ0;
                }
                None => break,
            }
        }
    }
    if it.next().is_some() {
        return Err("not enough bottom facet slots to rebuild the bottom".to_string());
    }
    Ok(())
}

#[cfg(not(feature = "three_d"))]
fn bottom_facets(corners: &[usize]) -> Vec<[usize; NODES_PER_FACET]> {
    vec![[corners[0], corners[1]]]
}

#[cfg(feature = "three_d")]
fn bottom_facets(corners: &[usize]) -> Vec<[usize; NODES_PER_FACET]> {
    vec![
        [corners[0], corners[1], corners[2]],
        [corners[0], corners[2], corners[3]],
    ]
}

/// Order 4 corner nodes as a ring around the bottom rectangle.
#[cfg(feature = "three_d")]
fn order_ring(corners: &[usize], qcoord: &[[f64; NDIMS]]) -> Vec<usize> {
    let mut cx = 0.0;
    let mut cy = 0.0;
    for &n in corners {
        cx += qcoord[n][0];
        cy += qcoord[n][1];
    }
    cx /= corners.len() as f64;
    cy /= corners.len() as f64;
    let mut ring: Vec<usize> = corners.to_vec();
    ring.sort_by(|&a, &b| {
        let ta = (qcoord[a][1] - cy).atan2(qcoord[a][0] - cx);
        let tb = (qcoord[b][1] - cy).atan2(qcoord[b][0] - cx);
        ta.partial_cmp(&tb).unwrap_or(std::cmp::Ordering::Equal)
    });
    ring
}

/// Delete points by swapping each with the current last point, patching
/// segment references to the moved point. `points_to_delete` must be
/// sorted ascending.
fn delete_points(
    points_to_delete: &[usize],
    qcoord: &mut Vec<[f64; NDIMS]>,
    qflags: &mut Vec<u32>,
    qsegment: &mut [[usize; NODES_PER_FACET]],
) {
    let mut end = qcoord.len() - 1;
    for &i in points_to_delete.iter().rev() {
        qcoord[i] = qcoord[end];
        qflags[i] = qflags[end];
        // The moved last point may be referenced by segments.
        for seg in qsegment.iter_mut() {
            for v in seg.iter_mut() {
                if *v == end {
                    *v = i;
                }
            }
        }
        end = end.saturating_sub(1);
    }
    let keep = qcoord.len() - points_to_delete.len();
    qcoord.truncate(keep);
    qflags.truncate(keep);
}

/// Compact away segments whose facet was deleted, swapping from the end.
/// A partially deleted row means the array is corrupted.
fn delete_facets(
    qsegment: &mut Vec<[usize; NODES_PER_FACET]>,
    qsegflag: &mut Vec<u32>,
) -> Result<(), String> {
    let mut nseg = qsegment.len();
    for i in (0..nseg).rev() {
        if qsegment[i][0] == DELETED_FACET {
            if qsegment[i].iter().any(|&v| v != DELETED_FACET) {
                return Err("segment array is corrupted".to_string());
            }
            qsegment[i] = qsegment[nseg - 1];
            qsegflag[i] = qsegflag[nseg - 1];
            nseg -= 1;
        }
    }
    qsegment.truncate(nseg);
    qsegflag.truncate(nseg);
    Ok(())
}

/// Elements smaller than `smallest_size * resolution^NDIMS`.
fn find_tiny_elements(param: &Param, volume: &ScalarField<f64>) -> Vec<usize> {
    let smallest_vol = param.mesh.smallest_size * param.mesh.resolution.powi(NDIMS as i32);
    (0..volume.len()).filter(|&e| volume[e] < smallest_vol).collect()
}

/// Old interior points caught inside any tiny element of the new mesh.
///
/// The containment test runs against the tiny elements' own geometry, not
/// a general point-in-mesh search: the offending old nodes are exactly the
/// ones squeezing those elements flat.
fn find_points_of_tiny_elem(
    new_coord: &VectorField<f64, NDIMS>,
    new_connectivity: &VectorField<usize, NODES_PER_ELEM>,
    tiny_elems: &[usize],
    qcoord: &[[f64; NDIMS]],
    qflags: &[u32],
) -> Vec<usize> {
    use self::interpolation::BarycentricTransform;

    let mut t_coord = Vec::with_capacity(tiny_elems.len() * NODES_PER_ELEM);
    let mut t_conn = Vec::with_capacity(tiny_elems.len());
    for &e in tiny_elems {
        let conn = &new_connectivity[e];
        let mut local = [0usize; NODES_PER_ELEM];
        for (j, &n) in conn.iter().enumerate() {
            local[j] = t_coord.len();
            t_coord.push(new_coord[n]);
        }
        t_conn.push(local);
    }
    let t_coord = VectorField::from_vec(t_coord);
    let t_conn = VectorField::from_vec(t_conn);
    let bary = BarycentricTransform::build(&t_coord, &t_conn);

    const BOUND: u32 = BOUNDX0 | BOUNDX1 | BOUNDY0 | BOUNDY1 | BOUNDZ0 | BOUNDZ1;
    let mut out = Vec::new();
    for (i, p) in qcoord.iter().enumerate() {
        // Boundary nodes cannot be deleted.
        if qflags[i] & BOUND != 0 {
            continue;
        }
        for ee in 0..tiny_elems.len() {
            let bc = bary.coordinates(ee, p);
            if BarycentricTransform::is_inside(&bc, 1e-10) {
                out.push(i);
                break;
            }
        }
    }
    out
}

/// Rebuild the mesh and rehydrate every field on the new topology.
pub fn remesh(
    param: &Param,
    var: &mut Variables,
    source: &dyn MeshSource,
) -> Result<(), String> {
    println!("  Remeshing starts...");

    // Move the old mesh and the fields to be transferred out of the store.
    let mut old_coord = VectorField::zeros(0);
    let mut old_connectivity = VectorField::zeros(0);
    let mut old_segment = VectorField::zeros(0);
    let mut old_segflag = ScalarField::zeros(0);
    let mut old_bcflag = ScalarField::zeros(0);
    old_coord.steal(&mut var.coord);
    old_connectivity.steal(&mut var.connectivity);
    old_segment.steal(&mut var.segment);
    old_segflag.steal(&mut var.segflag);
    old_bcflag.steal(&mut var.bcflag);

    let mut old_temperature = ScalarField::zeros(0);
    let mut old_vel = VectorField::zeros(0);
    let mut old_stress = VectorField::zeros(0);
    let mut old_strain = VectorField::zeros(0);
    let mut old_plstrain = ScalarField::zeros(0);
    let mut old_mattype = ScalarField::zeros(0);
    old_temperature.steal(&mut var.temperature);
    old_vel.steal(&mut var.vel);
    old_stress.steal(&mut var.stress);
    old_strain.steal(&mut var.strain);
    old_plstrain.steal(&mut var.plstrain);
    old_mattype.steal(&mut var.mattype);

    // Working copies of the point cloud and boundary segments.
    let mut qcoord: Vec<[f64; NDIMS]> = old_coord.as_slice().to_vec();
    let mut qflags: Vec<u32> = old_bcflag.as_slice().to_vec();
    let mut qsegment: Vec<[usize; NODES_PER_FACET]> = old_segment.as_slice().to_vec();
    let mut qsegflag: Vec<u32> = old_segflag.as_slice().to_vec();

    if param.mesh.restoring_bottom {
        let min_dist =
            param.mesh.smallest_size.powf(1.0 / NDIMS as f64) * param.mesh.resolution;
        let mut points_to_delete = Vec::new();
        new_bottom(
            &qflags,
            &mut qcoord,
            -param.mesh.zlength,
            &mut points_to_delete,
            min_dist,
            &mut qsegment,
            &mut qsegflag,
        )?;
        delete_points(&points_to_delete, &mut qcoord, &mut qflags, &mut qsegment);
        delete_facets(&mut qsegment, &mut qsegflag)?;
    }

    // Do not refine large elements during remeshing: the domain measure
    // caps the element size.
    let max_elem_size = if NDIMS == 3 {
        param.mesh.xlength * param.mesh.ylength * param.mesh.zlength
    } else {
        param.mesh.xlength * param.mesh.zlength
    };

    let buffers = source.rebuild(
        &param.mesh,
        &qcoord,
        &qflags,
        &qsegment,
        &qsegflag,
        max_elem_size,
    )?;
    adopt(var, buffers);
    geometry::compute_volume(&var.coord, &var.connectivity, &mut var.volume);

    // Purge interior nodes caught inside tiny elements, then rebuild once.
    let tiny = find_tiny_elements(param, &var.volume);
    if !tiny.is_empty() {
        let points_to_delete =
            find_points_of_tiny_elem(&var.coord, &var.connectivity, &tiny, &qcoord, &qflags);
        if !points_to_delete.is_empty() {
            delete_points(&points_to_delete, &mut qcoord, &mut qflags, &mut qsegment);
            let buffers = source.rebuild(
                &param.mesh,
                &qcoord,
                &qflags,
                &qsegment,
                &qsegflag,
                max_elem_size,
            )?;
            adopt(var, buffers);
            geometry::compute_volume(&var.coord, &var.connectivity, &mut var.volume);
        }
        let still_tiny = find_tiny_elements(param, &var.volume);
        if !still_tiny.is_empty() {
            eprintln!(
                "Warning: {} tiny element(s) remain after remeshing",
                still_tiny.len()
            );
        }
    }

    // Interpolate fields old -> new.
    let transfer = FieldTransfer::new(old_coord, old_connectivity);

    let elem_src = transfer.map_element_sources(&var.coord, &var.connectivity);
    var.stress = VectorField::from_vec(elem_src.iter().map(|&s| old_stress[s]).collect());
    var.strain = VectorField::from_vec(elem_src.iter().map(|&s| old_strain[s]).collect());
    var.plstrain = ScalarField::from_vec(elem_src.iter().map(|&s| old_plstrain[s]).collect());
    var.mattype = ScalarField::from_vec(elem_src.iter().map(|&s| old_mattype[s]).collect());
    var.delta_plstrain = ScalarField::zeros(var.nelem);

    let node_src = transfer.map_node_sources(&var.coord);
    var.temperature = ScalarField::from_vec(
        transfer.interpolate_node_scalar(&node_src, old_temperature.as_slice()),
    );
    var.vel = VectorField::from_vec(transfer.interpolate_node_vector(&node_src, &old_vel));

    // Rebuild every derived array on the new topology.
    var.rehydrate_derived(param)?;

    println!("  Remeshing finished.");
    Ok(())
}

/// Adopt generator buffers into the field store (ownership transfer, no
/// copies) and update the entity counts.
fn adopt(var: &mut Variables, buffers: crate::mesh::generator::MeshBuffers) {
    var.nnode = buffers.nnode();
    var.nelem = buffers.nelem();
    var.nseg = buffers.nseg();
    var.coord.steal_vec(buffers.coord);
    var.connectivity.steal_vec(buffers.connectivity);
    var.segment.steal_vec(buffers.segment);
    var.segflag = ScalarField::from_vec(buffers.segflag);
}
