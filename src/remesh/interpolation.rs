//! Old-to-new mesh field transfer.
//!
//! Element-centered fields (stress, strain, plastic strain, material tag)
//! move by nearest neighbor: each new element centroid takes the value of
//! the old element containing it. Nodal fields (temperature, velocity) move
//! by barycentric interpolation inside the containing old element. Both
//! searches run through a bucket grid keyed by old-element bounding boxes.
//!
//! Containment candidates are scanned in ascending old-element index, so a
//! centroid sitting exactly on a shared facet resolves deterministically to
//! the lowest index. Points outside the old domain fall back to the nearest
//! old centroid (element fields) or the nearest old node (nodal fields);
//! neither fallback can invent new extrema.

use rayon::prelude::*;

use crate::constants::{NDIMS, NODES_PER_ELEM};
use crate::mesh::fields::VectorField;
use crate::mesh::geometry::element_center;

/// Per-element affine transform from a point to its barycentric
/// coordinates.
pub struct BarycentricTransform {
    /// Rows map [p, 1] to the barycentric coordinates of nodes 1..NDIMS;
    /// the 0-th coordinate is one minus their sum.
    coeff: Vec<[[f64; NDIMS + 1]; NDIMS]>,
}

#[cfg(not(feature = "three_d"))]
fn invert(j: [[f64; NDIMS]; NDIMS]) -> Option<[[f64; NDIMS]; NDIMS]> {
    let det = j[0][0] * j[1][1] - j[0][1] * j[1][0];
    if det.abs() < 1e-300 {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [j[1][1] * inv_det, -j[0][1] * inv_det],
        [-j[1][0] * inv_det, j[0][0] * inv_det],
    ])
}

#[cfg(feature = "three_d")]
fn invert(j: [[f64; NDIMS]; NDIMS]) -> Option<[[f64; NDIMS]; NDIMS]> {
    let cof = |r1: usize, r2: usize, c1: usize, c2: usize| {
        j[r1][c1] * j[r2][c2] - j[r1][c2] * j[r2][c1]
    };
    let det = j[0][0] * cof(1, 2, 1, 2) - j[0][1] * cof(1, 2, 0, 2) + j[0][2] * cof(1, 2, 0, 1);
    if det.abs() < 1e-300 {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [
            cof(1, 2, 1, 2) * inv_det,
            -cof(0, 2, 1, 2) * inv_det,
            cof(0, 1, 1, 2) * inv_det,
        ],
        [
            -cof(1, 2, 0, 2) * inv_det,
            cof(0, 2, 0, 2) * inv_det,
            -cof(0, 1, 0, 2) * inv_det,
        ],
        [
            cof(1, 2, 0, 1) * inv_det,
            -cof(0, 2, 0, 1) * inv_det,
            cof(0, 1, 0, 1) * inv_det,
        ],
    ])
}

impl BarycentricTransform {
    pub fn build(
        coord: &VectorField<f64, NDIMS>,
        connectivity: &VectorField<usize, NODES_PER_ELEM>,
    ) -> Self {
        let coeff = connectivity
            .as_slice()
            .par_iter()
            .map(|conn| {
                let p0 = coord[conn[0]];
                // Jacobian columns are the edge vectors from node 0.
                let mut j = [[0.0; NDIMS]; NDIMS];
                for col in 0..NDIMS {
                    let p = coord[conn[col + 1]];
                    for row in 0..NDIMS {
                        j[row][col] = p[row] - p0[row];
                    }
                }
                let mut rows = [[0.0; NDIMS + 1]; NDIMS];
                if let Some(inv) = invert(j) {
                    for i in 0..NDIMS {
                        let mut c = 0.0;
                        for d in 0..NDIMS {
                            rows[i][d] = inv[i][d];
                            c -= inv[i][d] * p0[d];
                        }
                        rows[i][NDIMS] = c;
                    }
                } else {
                    // Degenerate element: coordinates evaluate far outside
                    // [0, 1] so no point tests as contained.
                    for row in rows.iter_mut() {
                        row[NDIMS] = f64::NEG_INFINITY;
                    }
                }
                rows
            })
            .collect();
        Self { coeff }
    }

    /// Barycentric coordinates of `p` in element `e`.
    pub fn coordinates(&self, e: usize, p: &[f64; NDIMS]) -> [f64; NODES_PER_ELEM] {
        let rows = &self.coeff[e];
        let mut bc = [0.0; NODES_PER_ELEM];
        let mut sum = 0.0;
        for i in 0..NDIMS {
            let mut v = rows[i][NDIMS];
            for d in 0..NDIMS {
                v += rows[i][d] * p[d];
            }
            bc[i + 1] = v;
            sum += v;
        }
        bc[0] = 1.0 - sum;
        bc
    }

    pub fn is_inside(bc: &[f64; NODES_PER_ELEM], tol: f64) -> bool {
        bc.iter().all(|&l| l >= -tol && l <= 1.0 + tol)
    }
}

/// Uniform bucket grid over old-element bounding boxes.
pub struct SearchGrid {
    min: [f64; NDIMS],
    cell: [f64; NDIMS],
    ncell: [usize; NDIMS],
    cells: Vec<Vec<usize>>,
}

impl SearchGrid {
    pub fn build(
        coord: &VectorField<f64, NDIMS>,
        connectivity: &VectorField<usize, NODES_PER_ELEM>,
    ) -> Self {
        let mut min = [f64::INFINITY; NDIMS];
        let mut max = [f64::NEG_INFINITY; NDIMS];
        for p in coord.iter() {
            for d in 0..NDIMS {
                min[d] = min[d].min(p[d]);
                max[d] = max[d].max(p[d]);
            }
        }
        // Pad so points on the hull index into a valid cell.
        let mut extent = [0.0; NDIMS];
        let mut largest = 0.0f64;
        for d in 0..NDIMS {
            extent[d] = max[d] - min[d];
            largest = largest.max(extent[d]);
        }
        let pad = 1e-6 * largest.max(1.0);
        for d in 0..NDIMS {
            min[d] -= pad;
            extent[d] += 2.0 * pad;
        }

        let per_dim = (connectivity.len() as f64).powf(1.0 / NDIMS as f64);
        let mut ncell = [1usize; NDIMS];
        let mut cell = [0.0; NDIMS];
        let mut total = 1usize;
        for d in 0..NDIMS {
            ncell[d] = (per_dim * extent[d] / largest).ceil().max(1.0) as usize;
            ncell[d] = ncell[d].min(256);
            cell[d] = extent[d] / ncell[d] as f64;
            total *= ncell[d];
        }

        let mut cells = vec![Vec::new(); total];
        for (e, conn) in connectivity.iter().enumerate() {
            let mut lo = [usize::MAX; NDIMS];
            let mut hi = [0usize; NDIMS];
            for &n in conn.iter() {
                for d in 0..NDIMS {
                    let i = (((coord[n][d] - min[d]) / cell[d]).floor() as usize)
                        .min(ncell[d] - 1);
                    lo[d] = lo[d].min(i);
                    hi[d] = hi[d].max(i);
                }
            }
            let mut idx = lo;
            loop {
                let mut flat = 0;
                for d in (0..NDIMS).rev() {
                    flat = flat * ncell[d] + idx[d];
                }
                cells[flat].push(e);
                // Advance the multi-index through the bounding-box range.
                let mut d = 0;
                loop {
                    idx[d] += 1;
                    if idx[d] <= hi[d] {
                        break;
                    }
                    idx[d] = lo[d];
                    d += 1;
                    if d == NDIMS {
                        break;
                    }
                }
                if d == NDIMS {
                    break;
                }
            }
        }
        // Elements are inserted in ascending order, which keeps each cell
        // list sorted: candidate scans resolve ties to the lowest index.

        Self {
            min,
            cell,
            ncell,
            cells,
        }
    }

    /// Old elements whose bounding box covers the point's cell.
    pub fn candidates(&self, p: &[f64; NDIMS]) -> &[usize] {
        let mut flat = 0;
        for d in (0..NDIMS).rev() {
            let x = p[d] - self.min[d];
            if x < 0.0 || x > self.cell[d] * self.ncell[d] as f64 {
                return &[];
            }
            let i = ((x / self.cell[d]).floor() as usize).min(self.ncell[d] - 1);
            flat = flat * self.ncell[d] + i;
        }
        &self.cells[flat]
    }
}

/// Search structure bundling the old mesh for both interpolators.
pub struct FieldTransfer {
    old_coord: VectorField<f64, NDIMS>,
    old_connectivity: VectorField<usize, NODES_PER_ELEM>,
    grid: SearchGrid,
    bary: BarycentricTransform,
    centroids: Vec<[f64; NDIMS]>,
}

const CONTAIN_TOL: f64 = 1e-10;

impl FieldTransfer {
    /// Takes ownership of the old mesh arrays (they have already been
    /// stolen out of the field store by the remesher).
    pub fn new(
        old_coord: VectorField<f64, NDIMS>,
        old_connectivity: VectorField<usize, NODES_PER_ELEM>,
    ) -> Self {
        let grid = SearchGrid::build(&old_coord, &old_connectivity);
        let bary = BarycentricTransform::build(&old_coord, &old_connectivity);
        let centroids = old_connectivity
            .iter()
            .map(|conn| element_center(&old_coord, conn))
            .collect();
        Self {
            old_coord,
            old_connectivity,
            grid,
            bary,
            centroids,
        }
    }

    pub fn old_connectivity(&self) -> &VectorField<usize, NODES_PER_ELEM> {
        &self.old_connectivity
    }

    /// Old element containing the point; ties resolve to the lowest index.
    pub fn containing_element(&self, p: &[f64; NDIMS]) -> Option<usize> {
        for &e in self.grid.candidates(p) {
            let bc = self.bary.coordinates(e, p);
            if BarycentricTransform::is_inside(&bc, CONTAIN_TOL) {
                return Some(e);
            }
        }
        None
    }

    fn nearest_centroid(&self, p: &[f64; NDIMS]) -> usize {
        let mut best = (f64::INFINITY, 0usize);
        for (e, c) in self.centroids.iter().enumerate() {
            let mut d2 = 0.0;
            for d in 0..NDIMS {
                d2 += (c[d] - p[d]) * (c[d] - p[d]);
            }
            if d2 < best.0 {
                best = (d2, e);
            }
        }
        best.1
    }

    fn nearest_node(&self, p: &[f64; NDIMS]) -> usize {
        let mut best = (f64::INFINITY, 0usize);
        for (n, c) in self.old_coord.iter().enumerate() {
            let mut d2 = 0.0;
            for d in 0..NDIMS {
                d2 += (c[d] - p[d]) * (c[d] - p[d]);
            }
            if d2 < best.0 {
                best = (d2, n);
            }
        }
        best.1
    }

    /// Source old element per new element centroid (nearest-neighbor rule).
    pub fn map_element_sources(
        &self,
        new_coord: &VectorField<f64, NDIMS>,
        new_connectivity: &VectorField<usize, NODES_PER_ELEM>,
    ) -> Vec<usize> {
        new_connectivity
            .as_slice()
            .par_iter()
            .map(|conn| {
                let c = element_center(new_coord, conn);
                self.containing_element(&c)
                    .unwrap_or_else(|| self.nearest_centroid(&c))
            })
            .collect()
    }

    /// Barycentric source per new node: the containing old element and the
    /// nodal weights, or the nearest old node when outside the old domain.
    pub fn map_node_sources(
        &self,
        new_coord: &VectorField<f64, NDIMS>,
    ) -> Vec<NodeSource> {
        new_coord
            .as_slice()
            .par_iter()
            .map(|p| match self.containing_element(p) {
                Some(e) => NodeSource::Interpolated {
                    elem: e,
                    weights: self.bary.coordinates(e, p),
                },
                None => NodeSource::Clamped {
                    node: self.nearest_node(p),
                },
            })
            .collect()
    }

    /// Interpolate a nodal scalar field through precomputed sources.
    pub fn interpolate_node_scalar(&self, sources: &[NodeSource], old: &[f64]) -> Vec<f64> {
        sources
            .iter()
            .map(|src| match src {
                NodeSource::Interpolated { elem, weights } => {
                    let conn = &self.old_connectivity[*elem];
                    let mut v = 0.0;
                    for i in 0..NODES_PER_ELEM {
                        v += weights[i] * old[conn[i]];
                    }
                    v
                }
                NodeSource::Clamped { node } => old[*node],
            })
            .collect()
    }

    /// Interpolate a nodal vector field through precomputed sources.
    pub fn interpolate_node_vector(
        &self,
        sources: &[NodeSource],
        old: &VectorField<f64, NDIMS>,
    ) -> Vec<[f64; NDIMS]> {
        sources
            .iter()
            .map(|src| match src {
                NodeSource::Interpolated { elem, weights } => {
                    let conn = &self.old_connectivity[*elem];
                    let mut v = [0.0; NDIMS];
                    for i in 0..NODES_PER_ELEM {
                        for d in 0..NDIMS {
                            v[d] += weights[i] * old[conn[i]][d];
                        }
                    }
                    v
                }
                NodeSource::Clamped { node } => old[*node],
            })
            .collect()
    }
}

/// How one new node draws its value from the old mesh.
pub enum NodeSource {
    Interpolated {
        elem: usize,
        weights: [f64; NODES_PER_ELEM],
    },
    Clamped {
        node: usize,
    },
}

#[cfg(test)]
#[cfg(not(feature = "three_d"))]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Unit square as two triangles.
    fn old_mesh() -> (VectorField<f64, NDIMS>, VectorField<usize, NODES_PER_ELEM>) {
        let coord = VectorField::from_vec(vec![
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [1.0, 1.0],
        ]);
        let conn = VectorField::from_vec(vec![[0, 1, 3], [0, 3, 2]]);
        (coord, conn)
    }

    #[test]
    fn test_barycentric_coordinates_sum_to_one() {
        let (coord, conn) = old_mesh();
        let bary = BarycentricTransform::build(&coord, &conn);
        let bc = bary.coordinates(0, &[0.5, 0.25]);
        let sum: f64 = bc.iter().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
        assert!(BarycentricTransform::is_inside(&bc, 1e-12));
    }

    #[test]
    fn test_containing_element_found() {
        let (coord, conn) = old_mesh();
        let transfer = FieldTransfer::new(coord, conn);
        // Below the diagonal z = x lies element 0, above lies element 1.
        assert_eq!(transfer.containing_element(&[0.7, 0.2]), Some(0));
        assert_eq!(transfer.containing_element(&[0.2, 0.7]), Some(1));
        assert_eq!(transfer.containing_element(&[2.0, 2.0]), None);
    }

    #[test]
    fn test_tie_on_shared_facet_takes_lowest_index() {
        let (coord, conn) = old_mesh();
        let transfer = FieldTransfer::new(coord, conn);
        // A point exactly on the diagonal is inside both triangles.
        assert_eq!(transfer.containing_element(&[0.5, 0.5]), Some(0));
    }

    #[test]
    fn test_linear_field_is_reproduced_exactly() {
        let (coord, conn) = old_mesh();
        let old_t: Vec<f64> = coord.iter().map(|p| 10.0 + 3.0 * p[0] - 7.0 * p[1]).collect();
        let transfer = FieldTransfer::new(coord, conn);

        let new_coord = VectorField::from_vec(vec![[0.3, 0.4], [0.9, 0.1], [0.5, 0.5]]);
        let sources = transfer.map_node_sources(&new_coord);
        let new_t = transfer.interpolate_node_scalar(&sources, &old_t);

        for (n, p) in new_coord.iter().enumerate() {
            assert_relative_eq!(new_t[n], 10.0 + 3.0 * p[0] - 7.0 * p[1], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_no_new_extrema() {
        let (coord, conn) = old_mesh();
        let old_t = vec![280.0, 300.0, 320.0, 360.0];
        let transfer = FieldTransfer::new(coord, conn);

        // Mix of interior and far-outside points.
        let new_coord = VectorField::from_vec(vec![
            [0.1, 0.1],
            [0.9, 0.9],
            [5.0, 5.0],
            [-3.0, 0.5],
        ]);
        let sources = transfer.map_node_sources(&new_coord);
        let new_t = transfer.interpolate_node_scalar(&sources, &old_t);
        for &t in &new_t {
            assert!((280.0 - 1e-9..=360.0 + 1e-9).contains(&t), "extremum created: {}", t);
        }
    }

    #[test]
    fn test_element_sources_pick_containing_element() {
        let (coord, conn) = old_mesh();
        let transfer = FieldTransfer::new(coord, conn);

        // New mesh: same square, one triangle entirely below the diagonal.
        let new_coord = VectorField::from_vec(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 0.5]]);
        let new_conn = VectorField::from_vec(vec![[0, 1, 2]]);
        let sources = transfer.map_element_sources(&new_coord, &new_conn);
        assert_eq!(sources, vec![0]);
    }

    #[test]
    fn test_outside_centroid_falls_back_to_nearest() {
        let (coord, conn) = old_mesh();
        let transfer = FieldTransfer::new(coord, conn);
        let new_coord =
            VectorField::from_vec(vec![[10.0, 0.0], [11.0, 0.0], [10.5, 0.2]]);
        let new_conn = VectorField::from_vec(vec![[0, 1, 2]]);
        let sources = transfer.map_element_sources(&new_coord, &new_conn);
        // Nearest old centroid to x ~ 10 is element 0's (2/3, 1/3).
        assert_eq!(sources, vec![0]);
    }
}
