//! Mesh generation adapter.
//!
//! [`MeshSource`] is the seam between the solver and whatever produces mesh
//! arrays: it consumes a point cloud with boundary data and hands back plain
//! buffers that the field store adopts without copying. An adapter around an
//! external mesher (Triangle/TetGen) would implement the same trait; the
//! built-in [`StructuredGenerator`] covers box domains, splitting quads into
//! two triangles (2D) or hexes into six tetrahedra (3D), and rebuilds a 2D
//! mesh from an arbitrary point cloud with the in-crate Delaunay
//! triangulation.

use crate::config::MeshParam;
use crate::constants::{NDIMS, NODES_PER_ELEM, NODES_PER_FACET};
#[cfg(not(feature = "three_d"))]
use crate::constants::{BOUNDX0, BOUNDX1, BOUNDZ0, BOUNDZ1};

/// Raw mesh arrays produced by a generator, ready to be adopted by the
/// field store via `steal_vec`.
#[derive(Debug, Clone, Default)]
pub struct MeshBuffers {
    pub coord: Vec<[f64; NDIMS]>,
    pub connectivity: Vec<[usize; NODES_PER_ELEM]>,
    pub segment: Vec<[usize; NODES_PER_FACET]>,
    pub segflag: Vec<u32>,
}

impl MeshBuffers {
    pub fn nnode(&self) -> usize {
        self.coord.len()
    }
    pub fn nelem(&self) -> usize {
        self.connectivity.len()
    }
    pub fn nseg(&self) -> usize {
        self.segment.len()
    }
}

/// Producer of mesh arrays for the initial mesh and for remeshing rebuilds.
pub trait MeshSource {
    /// Mesh the pristine box domain.
    fn initial_mesh(&self, mesh: &MeshParam) -> Result<MeshBuffers, String>;

    /// Re-mesh a point cloud, keeping point order and the given boundary
    /// segments. `max_elem_size` caps refinement for sources that insert
    /// points; the built-in source inserts none.
    fn rebuild(
        &self,
        mesh: &MeshParam,
        points: &[[f64; NDIMS]],
        point_flags: &[u32],
        segments: &[[usize; NODES_PER_FACET]],
        segflags: &[u32],
        max_elem_size: f64,
    ) -> Result<MeshBuffers, String>;
}

/// Built-in mesher for rectangular/box domains.
pub struct StructuredGenerator;

/// Tick positions along one axis, refined to half spacing inside the
/// `[d0, d1]` fraction of the axis (meshing_option 2).
fn graded_ticks(length: f64, resolution: f64, zone: Option<(f64, f64)>) -> Vec<f64> {
    let mut ticks = vec![0.0];
    let mut x = 0.0f64;
    while x < length - 1e-9 * length {
        let frac = x / length;
        let step = match zone {
            Some((d0, d1)) if frac >= d0 && frac < d1 => 0.5 * resolution,
            _ => resolution,
        };
        let next = x + step;
        // Snap the last tick onto the boundary instead of leaving a sliver.
        x = if next > length - 0.3 * step { length } else { next };
        ticks.push(x);
    }
    ticks
}

#[cfg(not(feature = "three_d"))]
impl MeshSource for StructuredGenerator {
    fn initial_mesh(&self, mesh: &MeshParam) -> Result<MeshBuffers, String> {
        let zonex = (mesh.meshing_option == 2).then_some(mesh.refined_zonex);
        let zonez = (mesh.meshing_option == 2).then_some(mesh.refined_zonez);
        let xs = graded_ticks(mesh.xlength, mesh.resolution, zonex);
        let zs = graded_ticks(mesh.zlength, mesh.resolution, zonez);
        let nx = xs.len() - 1;
        let nz = zs.len() - 1;

        let mut coord = Vec::with_capacity((nx + 1) * (nz + 1));
        for iz in 0..=nz {
            for ix in 0..=nx {
                coord.push([xs[ix], zs[iz] - mesh.zlength]);
            }
        }
        let node = |ix: usize, iz: usize| iz * (nx + 1) + ix;

        // Two counter-clockwise triangles per quad, alternating diagonals so
        // the mesh has no preferred shear direction.
        let mut connectivity = Vec::with_capacity(2 * nx * nz);
        for iz in 0..nz {
            for ix in 0..nx {
                let n00 = node(ix, iz);
                let n10 = node(ix + 1, iz);
                let n01 = node(ix, iz + 1);
                let n11 = node(ix + 1, iz + 1);
                if (ix + iz) % 2 == 0 {
                    connectivity.push([n00, n10, n11]);
                    connectivity.push([n00, n11, n01]);
                } else {
                    connectivity.push([n00, n10, n01]);
                    connectivity.push([n10, n11, n01]);
                }
            }
        }

        let mut segment = Vec::new();
        let mut segflag = Vec::new();
        for ix in 0..nx {
            segment.push([node(ix, 0), node(ix + 1, 0)]);
            segflag.push(BOUNDZ0);
            segment.push([node(ix, nz), node(ix + 1, nz)]);
            segflag.push(BOUNDZ1);
        }
        for iz in 0..nz {
            segment.push([node(0, iz), node(0, iz + 1)]);
            segflag.push(BOUNDX0);
            segment.push([node(nx, iz), node(nx, iz + 1)]);
            segflag.push(BOUNDX1);
        }

        let buffers = MeshBuffers {
            coord,
            connectivity,
            segment,
            segflag,
        };
        if buffers.nelem() == 0 {
            return Err("mesh generator returned zero elements".to_string());
        }
        Ok(buffers)
    }

    fn rebuild(
        &self,
        _mesh: &MeshParam,
        points: &[[f64; NDIMS]],
        _point_flags: &[u32],
        segments: &[[usize; NODES_PER_FACET]],
        segflags: &[u32],
        _max_elem_size: f64,
    ) -> Result<MeshBuffers, String> {
        let triangles = crate::mesh::triangulate::delaunay(points)?;

        // The Delaunay triangulation tiles the convex hull; when the free
        // surface has deformed into a concave shape, hull triangles outside
        // the boundary polygon must be discarded.
        let connectivity: Vec<[usize; NODES_PER_ELEM]> = triangles
            .into_iter()
            .filter(|tri| {
                let mut c = [0.0; 2];
                for &v in tri.iter() {
                    c[0] += points[v][0];
                    c[1] += points[v][1];
                }
                c[0] /= 3.0;
                c[1] /= 3.0;
                point_in_boundary(&c, points, segments)
            })
            .collect();

        if connectivity.is_empty() {
            return Err("mesh generator returned zero elements".to_string());
        }
        Ok(MeshBuffers {
            coord: points.to_vec(),
            connectivity,
            segment: segments.to_vec(),
            segflag: segflags.to_vec(),
        })
    }
}

/// Even-odd ray-casting test against the boundary segment soup.
#[cfg(not(feature = "three_d"))]
fn point_in_boundary(
    p: &[f64; 2],
    points: &[[f64; NDIMS]],
    segments: &[[usize; NODES_PER_FACET]],
) -> bool {
    let mut inside = false;
    for seg in segments {
        let a = points[seg[0]];
        let b = points[seg[1]];
        if (a[1] > p[1]) != (b[1] > p[1]) {
            let t = (p[1] - a[1]) / (b[1] - a[1]);
            let x = a[0] + t * (b[0] - a[0]);
            if x > p[0] {
                inside = !inside;
            }
        }
    }
    inside
}

#[cfg(feature = "three_d")]
impl MeshSource for StructuredGenerator {
    fn initial_mesh(&self, mesh: &MeshParam) -> Result<MeshBuffers, String> {
        let zonex = (mesh.meshing_option == 2).then_some(mesh.refined_zonex);
        let zoney = (mesh.meshing_option == 2).then_some(mesh.refined_zoney);
        let zonez = (mesh.meshing_option == 2).then_some(mesh.refined_zonez);
        let xs = graded_ticks(mesh.xlength, mesh.resolution, zonex);
        let ys = graded_ticks(mesh.ylength, mesh.resolution, zoney);
        let zs = graded_ticks(mesh.zlength, mesh.resolution, zonez);
        let (nx, ny, nz) = (xs.len() - 1, ys.len() - 1, zs.len() - 1);

        let mut coord = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
        for iz in 0..=nz {
            for iy in 0..=ny {
                for ix in 0..=nx {
                    coord.push([xs[ix], ys[iy], zs[iz] - mesh.zlength]);
                }
            }
        }
        let node = |ix: usize, iy: usize, iz: usize| {
            (iz * (ny + 1) + iy) * (nx + 1) + ix
        };

        // Six tetrahedra around the main diagonal of each hex; inverted
        // orientations are fixed by swapping two nodes.
        let mut connectivity = Vec::with_capacity(6 * nx * ny * nz);
        for iz in 0..nz {
            for iy in 0..ny {
                for ix in 0..nx {
                    let v000 = node(ix, iy, iz);
                    let v100 = node(ix + 1, iy, iz);
                    let v010 = node(ix, iy + 1, iz);
                    let v110 = node(ix + 1, iy + 1, iz);
                    let v001 = node(ix, iy, iz + 1);
                    let v101 = node(ix + 1, iy, iz + 1);
                    let v011 = node(ix, iy + 1, iz + 1);
                    let v111 = node(ix + 1, iy + 1, iz + 1);

                    let tets = [
                        [v000, v100, v110, v111],
                        [v000, v100, v111, v101],
                        [v000, v010, v110, v111],
                        [v000, v010, v111, v011],
                        [v000, v001, v111, v101],
                        [v000, v001, v111, v011],
                    ];
                    for &[a, b, c, d] in &tets {
                        let mut tet = [a, b, c, d];
                        if tet_volume6(&coord, &tet) < 0.0 {
                            tet.swap(2, 3);
                        }
                        connectivity.push(tet);
                    }
                }
            }
        }

        let (segment, segflag) =
            derive_box_segments(&coord, &connectivity, mesh.xlength, mesh.ylength, mesh.zlength);

        let buffers = MeshBuffers {
            coord,
            connectivity,
            segment,
            segflag,
        };
        if buffers.nelem() == 0 {
            return Err("mesh generator returned zero elements".to_string());
        }
        Ok(buffers)
    }

    fn rebuild(
        &self,
        mesh: &MeshParam,
        _points: &[[f64; NDIMS]],
        _point_flags: &[u32],
        _segments: &[[usize; NODES_PER_FACET]],
        _segflags: &[u32],
        _max_elem_size: f64,
    ) -> Result<MeshBuffers, String> {
        // A 3D point-cloud rebuild needs an external tetrahedralizer; the
        // built-in source regenerates the structured mesh instead.
        eprintln!("Warning: 3D rebuild regenerates a structured mesh");
        self.initial_mesh(mesh)
    }
}

#[cfg(feature = "three_d")]
fn tet_volume6(coord: &[[f64; NDIMS]], tet: &[usize; NODES_PER_ELEM]) -> f64 {
    let p0 = coord[tet[0]];
    let mut e = [[0.0; 3]; 3];
    for k in 0..3 {
        for d in 0..3 {
            e[k][d] = coord[tet[k + 1]][d] - p0[d];
        }
    }
    e[0][0] * (e[1][1] * e[2][2] - e[1][2] * e[2][1])
        + e[0][1] * (e[1][2] * e[2][0] - e[1][0] * e[2][2])
        + e[0][2] * (e[1][0] * e[2][1] - e[1][1] * e[2][0])
}

/// Boundary facets of a box mesh, classified by the plane all their nodes
/// lie on. Facets appearing in exactly one element are on the boundary.
#[cfg(feature = "three_d")]
fn derive_box_segments(
    coord: &[[f64; NDIMS]],
    connectivity: &[[usize; NODES_PER_ELEM]],
    xlength: f64,
    ylength: f64,
    zlength: f64,
) -> (Vec<[usize; NODES_PER_FACET]>, Vec<u32>) {
    use crate::constants::{
        BOUNDX0, BOUNDX1, BOUNDY0, BOUNDY1, BOUNDZ0, BOUNDZ1, NODE_OF_FACET,
    };
    use std::collections::HashMap;

    let tol = 1e-6 * xlength.max(ylength).max(zlength);
    let mut occurrence: HashMap<[usize; NODES_PER_FACET], ([usize; NODES_PER_FACET], usize)> =
        HashMap::new();
    for conn in connectivity {
        for local in NODE_OF_FACET.iter() {
            let mut facet = [0usize; NODES_PER_FACET];
            for (j, &i) in local.iter().enumerate() {
                facet[j] = conn[i];
            }
            let mut key = facet;
            key.sort_unstable();
            let entry = occurrence.entry(key).or_insert((facet, 0));
            entry.1 += 1;
        }
    }

    let mut segment = Vec::new();
    let mut segflag = Vec::new();
    for (facet, count) in occurrence.into_values() {
        if count != 1 {
            continue;
        }
        let on_plane = |d: usize, value: f64| {
            facet.iter().all(|&n| (coord[n][d] - value).abs() < tol)
        };
        let flag = if on_plane(0, 0.0) {
            BOUNDX0
        } else if on_plane(0, xlength) {
            BOUNDX1
        } else if on_plane(1, 0.0) {
            BOUNDY0
        } else if on_plane(1, ylength) {
            BOUNDY1
        } else if on_plane(2, -zlength) {
            BOUNDZ0
        } else if on_plane(2, 0.0) {
            BOUNDZ1
        } else {
            crate::constants::BOUNDN0
        };
        segment.push(facet);
        segflag.push(flag);
    }
    (segment, segflag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshParam;

    fn box_param(resolution: f64) -> MeshParam {
        MeshParam {
            xlength: 4000.0,
            ylength: 1000.0,
            zlength: 1000.0,
            resolution,
            ..MeshParam::default()
        }
    }

    #[test]
    fn test_graded_ticks_cover_axis() {
        let ticks = graded_ticks(1000.0, 110.0, None);
        assert_eq!(ticks[0], 0.0);
        assert_eq!(*ticks.last().unwrap(), 1000.0);
        assert!(ticks.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_refined_zone_halves_spacing() {
        let uniform = graded_ticks(1000.0, 100.0, None);
        let refined = graded_ticks(1000.0, 100.0, Some((0.4, 0.6)));
        assert!(refined.len() > uniform.len());
    }

    #[cfg(not(feature = "three_d"))]
    #[test]
    fn test_initial_mesh_counts() {
        let buffers = StructuredGenerator.initial_mesh(&box_param(250.0)).unwrap();
        // 16 x 4 quads, two triangles each.
        assert_eq!(buffers.nnode(), 17 * 5);
        assert_eq!(buffers.nelem(), 2 * 16 * 4);
        assert_eq!(buffers.nseg(), 2 * 16 + 2 * 4);
    }

    #[cfg(not(feature = "three_d"))]
    #[test]
    fn test_initial_mesh_positive_areas() {
        let buffers = StructuredGenerator.initial_mesh(&box_param(250.0)).unwrap();
        for conn in &buffers.connectivity {
            let p0 = buffers.coord[conn[0]];
            let p1 = buffers.coord[conn[1]];
            let p2 = buffers.coord[conn[2]];
            let area2 = (p1[0] - p0[0]) * (p2[1] - p0[1]) - (p2[0] - p0[0]) * (p1[1] - p0[1]);
            assert!(area2 > 0.0, "Element {:?} is not counter-clockwise", conn);
        }
    }

    #[cfg(not(feature = "three_d"))]
    #[test]
    fn test_rebuild_preserves_points_and_segments() {
        let initial = StructuredGenerator.initial_mesh(&box_param(250.0)).unwrap();
        let flags = vec![0u32; initial.nnode()];
        let rebuilt = StructuredGenerator
            .rebuild(
                &box_param(250.0),
                &initial.coord,
                &flags,
                &initial.segment,
                &initial.segflag,
                1e12,
            )
            .unwrap();
        assert_eq!(rebuilt.nnode(), initial.nnode());
        assert_eq!(rebuilt.nseg(), initial.nseg());
        assert!(rebuilt.nelem() > 0);

        // The rebuilt triangulation tiles the same domain.
        let area = |buffers: &MeshBuffers| -> f64 {
            buffers
                .connectivity
                .iter()
                .map(|conn| {
                    let p0 = buffers.coord[conn[0]];
                    let p1 = buffers.coord[conn[1]];
                    let p2 = buffers.coord[conn[2]];
                    0.5 * ((p1[0] - p0[0]) * (p2[1] - p0[1])
                        - (p2[0] - p0[0]) * (p1[1] - p0[1]))
                        .abs()
                })
                .sum()
        };
        let total_old = area(&initial);
        let total_new = area(&rebuilt);
        assert!(
            (total_old - total_new).abs() < 1e-6 * total_old,
            "domain area changed: {} vs {}",
            total_old,
            total_new
        );
    }

    #[cfg(feature = "three_d")]
    #[test]
    fn test_initial_mesh_3d_counts() {
        let buffers = StructuredGenerator.initial_mesh(&box_param(500.0)).unwrap();
        // 8 x 2 x 2 hexes, six tets each.
        assert_eq!(buffers.nelem(), 6 * 8 * 2 * 2);
        assert!(buffers.nseg() > 0);
    }
}
