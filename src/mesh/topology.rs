//! Boundary book-keeping derived from the segment arrays.
//!
//! The segment list (boundary facets with a flag naming their boundary) is
//! the source of truth. From it we derive:
//! - `bcflag`: per-node OR-bitset of every boundary the node touches,
//! - `bnodes[k]`: sorted node lists per boundary class,
//! - `bfacets[k]`: (element, local facet) pairs per boundary class,
//! - `support[n]`: elements touching node n.
//!
//! All of these are invalidated by remeshing and rebuilt from scratch.

use std::collections::HashMap;

use crate::constants::{
    NBDRYTYPES, NDIMS, NODES_PER_ELEM, NODES_PER_FACET, NODE_OF_FACET,
};
use crate::mesh::fields::{ScalarField, VectorField};

/// OR together the flags of every segment touching each node.
pub fn create_boundary_flags(
    nnode: usize,
    segment: &VectorField<usize, NODES_PER_FACET>,
    segflag: &ScalarField<u32>,
) -> ScalarField<u32> {
    let mut bcflag = ScalarField::zeros(nnode);
    for (s, seg) in segment.iter().enumerate() {
        for &n in seg.iter() {
            bcflag[n] |= segflag[s];
        }
    }
    bcflag
}

/// Sorted node lists, one per boundary class.
pub fn create_boundary_nodes(bcflag: &ScalarField<u32>) -> [Vec<usize>; NBDRYTYPES] {
    let mut bnodes: [Vec<usize>; NBDRYTYPES] = std::array::from_fn(|_| Vec::new());
    for (n, &flag) in bcflag.iter().enumerate() {
        for (k, nodes) in bnodes.iter_mut().enumerate() {
            if flag & (1 << k) != 0 {
                nodes.push(n);
            }
        }
    }
    // Ascending node iteration keeps each list sorted.
    bnodes
}

/// (element, local facet) pairs per boundary class.
///
/// A facet is on the boundary iff it belongs to exactly one element; its
/// class is read off the AND of its nodes' flags (a facet in a domain
/// corner can belong to more than one class).
pub fn create_boundary_facets(
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
    bcflag: &ScalarField<u32>,
) -> [Vec<(usize, usize)>; NBDRYTYPES] {
    let mut occurrence: HashMap<[usize; NODES_PER_FACET], (usize, usize, usize)> =
        HashMap::new();
    for (e, conn) in connectivity.iter().enumerate() {
        for (f, local) in NODE_OF_FACET.iter().enumerate() {
            let mut key = [0usize; NODES_PER_FACET];
            for (j, &i) in local.iter().enumerate() {
                key[j] = conn[i];
            }
            key.sort_unstable();
            let entry = occurrence.entry(key).or_insert((0, e, f));
            entry.0 += 1;
        }
    }

    let mut bfacets: [Vec<(usize, usize)>; NBDRYTYPES] = std::array::from_fn(|_| Vec::new());
    for (key, &(count, e, f)) in occurrence.iter() {
        if count != 1 {
            continue;
        }
        let mut flags = u32::MAX;
        for &n in key.iter() {
            flags &= bcflag[n];
        }
        for (k, facets) in bfacets.iter_mut().enumerate() {
            if flags & (1 << k) != 0 {
                facets.push((e, f));
            }
        }
    }
    for facets in bfacets.iter_mut() {
        facets.sort_unstable();
    }
    bfacets
}

/// Elements touching each node.
pub fn create_support(
    nnode: usize,
    connectivity: &VectorField<usize, NODES_PER_ELEM>,
) -> Vec<Vec<usize>> {
    let mut support = vec![Vec::new(); nnode];
    for (e, conn) in connectivity.iter().enumerate() {
        for &n in conn.iter() {
            support[n].push(e);
        }
    }
    support
}

/// Dimension index of the outward normal of an axis-aligned boundary class
/// (x boundaries: 0, y boundaries: 1, z boundaries: NDIMS-1).
pub fn boundary_normal_dim(k: usize) -> usize {
    match k {
        crate::constants::IBOUNDX0 | crate::constants::IBOUNDX1 => 0,
        crate::constants::IBOUNDY0 | crate::constants::IBOUNDY1 => 1,
        _ => NDIMS - 1,
    }
}

#[cfg(test)]
#[cfg(not(feature = "three_d"))]
mod tests {
    use super::*;
    use crate::constants::{BOUNDX0, BOUNDX1, BOUNDZ0, BOUNDZ1, IBOUNDX0, IBOUNDZ0};

    /// Unit square split along the main diagonal:
    ///   2 --- 3
    ///   |  \  |
    ///   0 --- 1
    fn square() -> (
        VectorField<usize, NODES_PER_ELEM>,
        VectorField<usize, NODES_PER_FACET>,
        ScalarField<u32>,
    ) {
        let conn = VectorField::from_vec(vec![[0, 1, 3], [0, 3, 2]]);
        let segment = VectorField::from_vec(vec![[0, 1], [1, 3], [3, 2], [2, 0]]);
        let segflag = ScalarField::from_vec(vec![BOUNDZ0, BOUNDX1, BOUNDZ1, BOUNDX0]);
        (conn, segment, segflag)
    }

    #[test]
    fn test_bcflag_or_semantics() {
        let (_, segment, segflag) = square();
        let bcflag = create_boundary_flags(4, &segment, &segflag);

        assert_eq!(bcflag[0], BOUNDZ0 | BOUNDX0);
        assert_eq!(bcflag[1], BOUNDZ0 | BOUNDX1);
        assert_eq!(bcflag[2], BOUNDZ1 | BOUNDX0);
        assert_eq!(bcflag[3], BOUNDZ1 | BOUNDX1);

        // Every node's flag is exactly the OR of its segments' flags.
        let mut expect = vec![0u32; 4];
        for (s, seg) in segment.iter().enumerate() {
            for &n in seg.iter() {
                expect[n] |= segflag[s];
            }
        }
        for n in 0..4 {
            assert_eq!(bcflag[n], expect[n]);
        }
    }

    #[test]
    fn test_boundary_nodes_sorted() {
        let (_, segment, segflag) = square();
        let bcflag = create_boundary_flags(4, &segment, &segflag);
        let bnodes = create_boundary_nodes(&bcflag);

        assert_eq!(bnodes[IBOUNDX0], vec![0, 2]);
        assert_eq!(bnodes[IBOUNDZ0], vec![0, 1]);
        for nodes in bnodes.iter() {
            assert!(nodes.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_boundary_facets_found() {
        let (conn, segment, segflag) = square();
        let bcflag = create_boundary_flags(4, &segment, &segflag);
        let bfacets = create_boundary_facets(&conn, &bcflag);

        // One facet per side; the diagonal is interior.
        assert_eq!(bfacets[IBOUNDZ0].len(), 1);
        assert_eq!(bfacets[IBOUNDX0].len(), 1);
        let (e, f) = bfacets[IBOUNDZ0][0];
        // The bottom facet of element 0 is its local facet opposite node 3.
        assert_eq!(e, 0);
        let nodes = NODE_OF_FACET[f];
        let facet_nodes = [conn[e][nodes[0]], conn[e][nodes[1]]];
        assert!(facet_nodes.contains(&0) && facet_nodes.contains(&1));
    }

    #[test]
    fn test_support_lists() {
        let (conn, _, _) = square();
        let support = create_support(4, &conn);
        assert_eq!(support[0], vec![0, 1]);
        assert_eq!(support[1], vec![0]);
        assert_eq!(support[2], vec![1]);
        assert_eq!(support[3], vec![0, 1]);
    }
}
