//! Compile-time mesh constants.
//!
//! The spatial dimension is fixed at build time: the default build solves on
//! triangles (2D, coordinates x and z); enabling the `three_d` feature
//! switches every count below to the tetrahedral (3D) values.

/// Number of spatial dimensions.
#[cfg(not(feature = "three_d"))]
pub const NDIMS: usize = 2;
#[cfg(feature = "three_d")]
pub const NDIMS: usize = 3;

/// Nodes per simplex element: triangle (3) in 2D, tetrahedron (4) in 3D.
pub const NODES_PER_ELEM: usize = NDIMS + 1;

/// Independent components of a symmetric tensor: 3 in 2D, 6 in 3D.
pub const NSTR: usize = NDIMS * (NDIMS + 1) / 2;

/// Facets (edges in 2D, faces in 3D) per element.
pub const FACETS_PER_ELEM: usize = NDIMS + 1;

/// Nodes per facet: 2 in 2D, 3 in 3D.
pub const NODES_PER_FACET: usize = NDIMS;

// Bit positions of the boundary classes.
pub const IBOUNDX0: usize = 0;
pub const IBOUNDX1: usize = 1;
pub const IBOUNDY0: usize = 2;
pub const IBOUNDY1: usize = 3;
pub const IBOUNDZ0: usize = 4;
pub const IBOUNDZ1: usize = 5;
pub const IBOUNDN0: usize = 6;
pub const NBDRYTYPES: usize = 7;

pub const BOUNDX0: u32 = 1 << IBOUNDX0; //  1, western (left in 2D)
pub const BOUNDX1: u32 = 1 << IBOUNDX1; //  2, eastern (right in 2D)
pub const BOUNDY0: u32 = 1 << IBOUNDY0; //  4, southern
pub const BOUNDY1: u32 = 1 << IBOUNDY1; //  8, northern
pub const BOUNDZ0: u32 = 1 << IBOUNDZ0; // 16, bottom
pub const BOUNDZ1: u32 = 1 << IBOUNDZ1; // 32, top
pub const BOUNDN0: u32 = 1 << IBOUNDN0; // 64, arbitrary (not parallel to x,y,z)

pub const BOUND_ANY: u32 =
    BOUNDX0 | BOUNDX1 | BOUNDY0 | BOUNDY1 | BOUNDZ0 | BOUNDZ1 | BOUNDN0;

/// Local node numbers of each facet. Facet `i` is opposite node `i`; the
/// nodes are ordered counter-clockwise when viewed from outside, which makes
/// the facet normal computed from them point outward.
#[cfg(not(feature = "three_d"))]
pub const NODE_OF_FACET: [[usize; NODES_PER_FACET]; FACETS_PER_ELEM] =
    [[1, 2], [2, 0], [0, 1]];
#[cfg(feature = "three_d")]
pub const NODE_OF_FACET: [[usize; NODES_PER_FACET]; FACETS_PER_ELEM] =
    [[1, 2, 3], [0, 3, 2], [0, 1, 3], [0, 2, 1]];

/// Packed storage order of the off-diagonal tensor components, after the
/// NDIMS diagonal entries: (xz) in 2D; (xy, xz, yz) in 3D.
#[cfg(not(feature = "three_d"))]
pub const STR_OFFDIAG: [(usize, usize); NSTR - NDIMS] = [(0, 1)];
#[cfg(feature = "three_d")]
pub const STR_OFFDIAG: [(usize, usize); NSTR - NDIMS] = [(0, 1), (0, 2), (1, 2)];

pub const YEAR2SEC: f64 = 365.2422 * 86400.0;
pub const DEG2RAD: f64 = std::f64::consts::PI / 180.0;

/// Universal gas constant (J/mol/K), used by the creep law.
pub const GAS_CONSTANT: f64 = 8.31446;
