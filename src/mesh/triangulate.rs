//! Incremental Delaunay triangulation of a 2D point set (Bowyer-Watson).
//!
//! Used by the remesher to rebuild the triangulation of the (possibly
//! trimmed) node cloud; the boundary segments are carried through unchanged
//! and triangles falling outside the boundary polygon are discarded by the
//! caller. Input point order is preserved: triangle indices refer to the
//! input slice directly.

#[cfg(not(feature = "three_d"))]
pub fn delaunay(points: &[[f64; 2]]) -> Result<Vec<[usize; 3]>, String> {
    let n = points.len();
    if n < 3 {
        return Err(format!("cannot triangulate {} points", n));
    }

    // Bounding box and a super-triangle comfortably containing it.
    let mut min = [f64::INFINITY; 2];
    let mut max = [f64::NEG_INFINITY; 2];
    for p in points {
        for d in 0..2 {
            min[d] = min[d].min(p[d]);
            max[d] = max[d].max(p[d]);
        }
    }
    let span = (max[0] - min[0]).max(max[1] - min[1]).max(1.0);
    let cx = 0.5 * (min[0] + max[0]);
    let cy = 0.5 * (min[1] + max[1]);

    let mut verts: Vec<[f64; 2]> = points.to_vec();
    verts.push([cx - 20.0 * span, cy - 10.0 * span]);
    verts.push([cx + 20.0 * span, cy - 10.0 * span]);
    verts.push([cx, cy + 20.0 * span]);
    let sv = [n, n + 1, n + 2];

    // Counter-clockwise by construction; kept that way throughout.
    let mut triangles: Vec<[usize; 3]> = vec![[sv[0], sv[1], sv[2]]];

    for p in 0..n {
        // Triangles whose circumcircle contains the new point die.
        let mut bad = Vec::new();
        for (t, tri) in triangles.iter().enumerate() {
            if in_circumcircle(&verts, tri, p) {
                bad.push(t);
            }
        }
        if bad.is_empty() {
            // Exact cocircular ties can leave the point outside every
            // circumcircle by rounding; fall back to the triangle that
            // geometrically contains it.
            let t = match triangles.iter().position(|tri| contains(&verts, tri, p)) {
                Some(t) => t,
                None => {
                    return Err(format!(
                        "triangulation failed: point {} is in no circumcircle",
                        p
                    ))
                }
            };
            bad.push(t);
            // A point sitting on one of the triangle's edges would leave a
            // zero-area triangle behind; grow the cavity across that edge.
            let tri = triangles[t];
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                let (pa, pb, pp) = (verts[a], verts[b], verts[p]);
                let cross = (pb[0] - pa[0]) * (pp[1] - pa[1])
                    - (pb[1] - pa[1]) * (pp[0] - pa[0]);
                let scale = ((pb[0] - pa[0]).powi(2) + (pb[1] - pa[1]).powi(2))
                    .max(f64::MIN_POSITIVE);
                if cross.abs() < 1e-12 * scale {
                    if let Some(u) = triangles.iter().position(|other| {
                        let o = *other;
                        (0..3).any(|j| o[j] == b && o[(j + 1) % 3] == a)
                    }) {
                        bad.push(u);
                    }
                }
            }
            bad.sort_unstable();
            bad.dedup();
        }

        // Edges of the cavity: edges of dead triangles not shared by two of
        // them, kept in the dead triangle's (ccw) orientation.
        let mut edges: Vec<(usize, usize)> = Vec::with_capacity(bad.len() * 3);
        for &t in &bad {
            let tri = triangles[t];
            for k in 0..3 {
                edges.push((tri[k], tri[(k + 1) % 3]));
            }
        }
        let boundary: Vec<(usize, usize)> = edges
            .iter()
            .filter(|&&(a, b)| !edges.contains(&(b, a)))
            .copied()
            .collect();

        for &t in bad.iter().rev() {
            triangles.swap_remove(t);
        }
        for (a, b) in boundary {
            triangles.push([a, b, p]);
        }
    }

    let result: Vec<[usize; 3]> = triangles
        .into_iter()
        .filter(|tri| tri.iter().all(|&v| v < n))
        .collect();

    if result.is_empty() {
        return Err("triangulation produced no triangles".to_string());
    }
    Ok(result)
}

/// Does ccw triangle `tri` contain point `p` (boundary included)?
#[cfg(not(feature = "three_d"))]
fn contains(verts: &[[f64; 2]], tri: &[usize; 3], p: usize) -> bool {
    let q = verts[p];
    (0..3).all(|k| {
        let a = verts[tri[k]];
        let b = verts[tri[(k + 1) % 3]];
        (b[0] - a[0]) * (q[1] - a[1]) - (b[1] - a[1]) * (q[0] - a[0]) >= 0.0
    })
}

/// Is point `p` strictly inside the circumcircle of ccw triangle `tri`?
#[cfg(not(feature = "three_d"))]
fn in_circumcircle(verts: &[[f64; 2]], tri: &[usize; 3], p: usize) -> bool {
    let [a, b, c] = *tri;
    let (px, py) = (verts[p][0], verts[p][1]);
    let (ax, ay) = (verts[a][0] - px, verts[a][1] - py);
    let (bx, by) = (verts[b][0] - px, verts[b][1] - py);
    let (cx, cy) = (verts[c][0] - px, verts[c][1] - py);

    let det = (ax * ax + ay * ay) * (bx * cy - cx * by)
        - (bx * bx + by * by) * (ax * cy - cx * ay)
        + (cx * cx + cy * cy) * (ax * by - bx * ay);
    det > 0.0
}
