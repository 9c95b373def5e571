// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of this software
// and associated documentation files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all copies or
// substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Grid subdivision of sky and liquid surfaces.

use crate::common::{
    bsp::{BspError, BspErrorKind},
    math,
};

use cgmath::Vector3;

/// The largest polygon the subdivider accepts.
pub const MAX_SUBDIVIDE_VERTS: usize = 64;

/// Polygons are never split closer than this to their own edge.
const MIN_SPLIT_DIST: f32 = 8.0;

/// Subdivide the given polygon on a grid.
///
/// For each axis in turn, the split point is the grid line of spacing `size` nearest the middle
/// of the polygon's bounds. An axis is skipped if the split would leave either side thinner than
/// 8 units. Otherwise every edge crossing the split is cut at its intercept, the polygon is
/// divided into front and back halves, and each half is subdivided again. Polygons that need no
/// further splitting on any axis are returned.
///
/// Fails with `SubdivisionOverflow` if any polygon produced along the way has more than
/// `MAX_SUBDIVIDE_VERTS` vertices.
pub fn subdivide(
    verts: &[Vector3<f32>],
    size: f32,
) -> Result<Vec<Vec<Vector3<f32>>>, BspError> {
    let mut out = Vec::new();
    subdivide_impl(verts, size, &mut out)?;
    Ok(out)
}

fn subdivide_impl(
    verts: &[Vector3<f32>],
    size: f32,
    output: &mut Vec<Vec<Vector3<f32>>>,
) -> Result<(), BspError> {
    if verts.len() > MAX_SUBDIVIDE_VERTS {
        return Err(BspErrorKind::SubdivisionOverflow { count: verts.len() }.into());
    }

    if verts.len() < 3 {
        return Ok(());
    }

    let (min, max) = math::bounds(verts);

    for ax in 0..3 {
        // snap the midpoint of the bounds to the grid
        let mid = size * ((min[ax] + max[ax]) / 2.0 / size + 0.5).floor();

        if max[ax] - mid < MIN_SPLIT_DIST || mid - min[ax] < MIN_SPLIT_DIST {
            continue;
        }

        let dist: Vec<f32> = verts.iter().map(|v| v[ax] - mid).collect();

        let mut front = Vec::new();
        let mut back = Vec::new();
        for (vi, v) in verts.iter().enumerate() {
            let next = (vi + 1) % verts.len();

            if dist[vi] >= 0.0 {
                front.push(*v);
            }
            if dist[vi] <= 0.0 {
                back.push(*v);
            }

            if dist[vi] == 0.0 || dist[next] == 0.0 {
                continue;
            }

            if (dist[vi] > 0.0) != (dist[next] > 0.0) {
                // edge crosses the split, cut it at the intercept
                let frac = dist[vi] / (dist[vi] - dist[next]);
                let intercept = v + frac * (verts[next] - v);
                front.push(intercept);
                back.push(intercept);
            }
        }

        subdivide_impl(&front, size, output)?;
        subdivide_impl(&back, size, output)?;
        return Ok(());
    }

    output.push(verts.to_vec());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn square(size: f32) -> Vec<Vector3<f32>> {
        vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(size, 0.0, 0.0),
            Vector3::new(size, size, 0.0),
            Vector3::new(0.0, size, 0.0),
        ]
    }

    // shoelace formula in the xy plane
    fn area(poly: &[Vector3<f32>]) -> f32 {
        let mut sum = 0.0;
        for i in 0..poly.len() {
            let a = poly[i];
            let b = poly[(i + 1) % poly.len()];
            sum += a.x * b.y - b.x * a.y;
        }
        sum.abs() / 2.0
    }

    #[test]
    fn test_subdivide_small_polygon_unchanged() {
        let polys = subdivide(&square(64.0), 128.0).unwrap();
        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0], square(64.0));
    }

    #[test]
    fn test_subdivide_grid() {
        let polys = subdivide(&square(512.0), 128.0).unwrap();
        assert_eq!(polys.len(), 16);

        let total: f32 = polys.iter().map(|p| area(p)).sum();
        assert!((total - 512.0 * 512.0).abs() < 1.0);

        for poly in polys.iter() {
            let (min, max) = math::bounds(poly);
            assert!(max.x - min.x <= 128.0 + 0.001);
            assert!(max.y - min.y <= 128.0 + 0.001);
            assert!(poly.len() <= MAX_SUBDIVIDE_VERTS);
        }
    }

    #[test]
    fn test_subdivide_skips_thin_slivers() {
        // 132 units wide: splitting at 128 would leave a 4-unit sliver
        let verts = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(132.0, 0.0, 0.0),
            Vector3::new(132.0, 32.0, 0.0),
            Vector3::new(0.0, 32.0, 0.0),
        ];
        assert_eq!(subdivide(&verts, 128.0).unwrap().len(), 1);
    }

    #[test]
    fn test_subdivide_overflow() {
        let verts: Vec<_> = (0..65)
            .map(|i| {
                let a = i as f32 / 65.0 * std::f32::consts::PI * 2.0;
                Vector3::new(a.cos() * 16.0, a.sin() * 16.0, 0.0)
            })
            .collect();

        let err = subdivide(&verts, 128.0).unwrap_err();
        assert_eq!(
            err.kind(),
            &BspErrorKind::SubdivisionOverflow { count: 65 }
        );
    }
}
