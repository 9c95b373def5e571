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

use cgmath::{InnerSpace, Vector3, Zero};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum HyperplaneSide {
    Positive = 0,
    Negative = 1,
}

impl HyperplaneSide {
    pub fn from_dist(dist: f32) -> HyperplaneSide {
        if dist >= 0.0 {
            HyperplaneSide::Positive
        } else {
            HyperplaneSide::Negative
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

#[derive(Clone, Debug, PartialEq)]
enum Alignment {
    Axis(Axis),
    Normal(Vector3<f32>),
}

/// Computes the sign bits of a plane normal.
///
/// Bit `i` is set if and only if component `i` of the normal is negative.
pub fn sign_bits(normal: Vector3<f32>) -> u8 {
    let mut bits = 0;
    for i in 0..3 {
        if normal[i] < 0.0 {
            bits |= 1 << i;
        }
    }
    bits
}

#[derive(Clone, Debug, PartialEq)]
pub struct Hyperplane {
    alignment: Alignment,
    dist: f32,
    sign_bits: u8,
}

impl Hyperplane {
    /// Creates a new hyperplane with the given normal, `dist` units away from the origin.
    ///
    /// If the given normal is equivalent to one of the axis normals, the hyperplane will be
    /// optimized to only consider that axis when performing point comparisons. The normal is
    /// assumed to have unit length and is stored as given.
    pub fn new(normal: Vector3<f32>, dist: f32) -> Hyperplane {
        match normal {
            n if n == Vector3::unit_x() => Self::axis(Axis::X, dist),
            n if n == Vector3::unit_y() => Self::axis(Axis::Y, dist),
            n if n == Vector3::unit_z() => Self::axis(Axis::Z, dist),
            _ => Hyperplane {
                alignment: Alignment::Normal(normal),
                dist,
                sign_bits: sign_bits(normal),
            },
        }
    }

    /// Creates a new hyperplane aligned along `axis`, `dist` units away from the origin.
    pub fn axis(axis: Axis, dist: f32) -> Hyperplane {
        Hyperplane {
            alignment: Alignment::Axis(axis),
            dist,
            sign_bits: 0,
        }
    }

    /// Returns the surface normal of this plane.
    pub fn normal(&self) -> Vector3<f32> {
        match self.alignment {
            Alignment::Axis(ax) => match ax {
                Axis::X => Vector3::unit_x(),
                Axis::Y => Vector3::unit_y(),
                Axis::Z => Vector3::unit_z(),
            },
            Alignment::Normal(normal) => normal,
        }
    }

    pub fn dist(&self) -> f32 {
        self.dist
    }

    /// Returns the axis this plane is aligned with, if any.
    pub fn axis_alignment(&self) -> Option<Axis> {
        match self.alignment {
            Alignment::Axis(a) => Some(a),
            Alignment::Normal(_) => None,
        }
    }

    /// Bit `i` is set if component `i` of the normal is negative.
    pub fn sign_bits(&self) -> u8 {
        self.sign_bits
    }

    /// Calculates the shortest distance between this hyperplane and the given point.
    pub fn point_dist(&self, point: Vector3<f32>) -> f32 {
        match self.alignment {
            Alignment::Axis(a) => point[a as usize] - self.dist,
            Alignment::Normal(n) => point.dot(n) - self.dist,
        }
    }

    /// Calculates which side of this hyperplane the given point belongs to.
    ///
    /// Points with a distance of 0.0 are considered to be on the positive side.
    pub fn point_side(&self, point: Vector3<f32>) -> HyperplaneSide {
        HyperplaneSide::from_dist(self.point_dist(point))
    }
}

// see https://github.com/id-Software/Quake/blob/master/WinQuake/gl_rsurf.c#L1544
pub const COLLINEAR_EPSILON: f32 = 0.001;

/// Determines if the given points are collinear.
///
/// A set of points V is considered collinear if
/// norm(V<sub>1</sub> &minus; V<sub>0</sub>) &equals;
/// norm(V<sub>2</sub> &minus; V<sub>1</sub>) &equals;
/// .&nbsp;.&nbsp;. &equals;
/// norm(V<sub>k &minus; 1</sub> &minus; V<sub>k</sub>).
///
/// Special cases:
/// - If `vs.len() < 2`, always returns `false`.
/// - If `vs.len() == 2`, always returns `true`.
pub fn collinear(vs: &[Vector3<f32>]) -> bool {
    match vs.len() {
        l if l < 2 => false,
        2 => true,
        _ => {
            let init = (vs[1] - vs[0]).normalize();
            for i in 2..vs.len() {
                let norm = (vs[i] - vs[i - 1]).normalize();
                if !((norm[0] - init[0]).abs() <= COLLINEAR_EPSILON
                    && (norm[1] - init[1]).abs() <= COLLINEAR_EPSILON
                    && (norm[2] - init[2]).abs() <= COLLINEAR_EPSILON)
                {
                    return false;
                }
            }

            true
        }
    }
}

/// Removes vertices lying on the segment between their neighbours from a closed loop.
///
/// Each vertex is checked once against its current predecessor and successor. The loop is never
/// reduced below three vertices.
pub fn remove_collinear<T, F>(verts: &mut Vec<T>, position: F)
where
    F: Fn(&T) -> Vector3<f32>,
{
    let mut i = 0;
    while i < verts.len() && verts.len() > 3 {
        let len = verts.len();
        let prev = position(&verts[(i + len - 1) % len]);
        let this = position(&verts[i]);
        let next = position(&verts[(i + 1) % len]);

        if collinear(&[prev, this, next]) {
            verts.remove(i);
        } else {
            i += 1;
        }
    }
}

/// Returns the component-wise minimum and maximum of a set of points.
pub fn bounds<'a, I>(points: I) -> (Vector3<f32>, Vector3<f32>)
where
    I: IntoIterator<Item = &'a Vector3<f32>>,
{
    let mut min = Vector3::new(std::f32::INFINITY, std::f32::INFINITY, std::f32::INFINITY);
    let mut max = -min;
    for p in points.into_iter() {
        for c in 0..3 {
            min[c] = p[c].min(min[c]);
            max[c] = p[c].max(max[c]);
        }
    }
    (min, max)
}

/// Returns the radius of the smallest origin-centered sphere enclosing the given bounds.
pub fn radius_from_bounds(mins: Vector3<f32>, maxs: Vector3<f32>) -> f32 {
    let mut corner = Vector3::zero();
    for i in 0..3 {
        corner[i] = mins[i].abs().max(maxs[i].abs());
    }
    corner.magnitude()
}
