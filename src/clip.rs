//! Clipping scene nodes with boxes and fractional prisms

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scene::{CsgOp, Node, Primitive};

/// How far a limit sitting exactly on 0 or 1 is pushed past the grid
const OVERSHOOT: f64 = 0.001;

/// Clip region, either absolute corners or fractions of the grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SliceSpec {
    Box {
        corner1: [f64; 3],
        corner2: [f64; 3],
        #[serde(default)]
        subtract: bool,
    },
    Fraction {
        #[serde(default = "default_cut")]
        cut_at: [[f64; 2]; 3],
        #[serde(default)]
        subtract: bool,
    },
}

/// Quadrant nearest the default camera
pub fn default_cut() -> [[f64; 2]; 3] {
    [[0.5, 1.0], [0.5, 1.0], [0.0, 1.0]]
}

impl Default for SliceSpec {
    fn default() -> Self {
        SliceSpec::Fraction { cut_at: default_cut(), subtract: true }
    }
}

impl SliceSpec {
    /// Clip `node`; `n` is the grid size used by fractional regions.
    pub fn apply(&self, node: Node, n: [usize; 3]) -> Result<Node> {
        match self {
            SliceSpec::Box { corner1, corner2, subtract } => {
                Ok(slice_box(node, *corner1, *corner2, *subtract))
            }
            SliceSpec::Fraction { cut_at, subtract } => slice_fraction(node, n, *cut_at, *subtract),
        }
    }
}

/// Keep what lies inside the box, or remove it when `subtract` is set.
pub fn slice_box(node: Node, corner1: [f64; 3], corner2: [f64; 3], subtract: bool) -> Node {
    let clip = Node::primitive(Primitive::Box {
        corner1: Vector3::from(corner1),
        corner2: Vector3::from(corner2),
    })
    .inverted(subtract);
    Node::csg(CsgOp::Intersection, vec![node, clip])
}

/// Clip with a prism given as fractions of the grid size `n`.
///
/// Each axis range is put in `[min, max]` order and must lie within
/// `[0, 1]`. Limits on exactly 0 or 1 overshoot slightly. The prism is
/// swept along y over the first axis range, with its outline taken from
/// the second and third axis ranges.
pub fn slice_fraction(node: Node, n: [usize; 3], cut_at: [[f64; 2]; 3], subtract: bool) -> Result<Node> {
    let mut limits = [[0.0; 2]; 3];
    for (axis, range) in cut_at.iter().enumerate() {
        let (lo, hi) = if range[0] > range[1] { (range[1], range[0]) } else { (range[0], range[1]) };
        if lo < 0.0 || hi > 1.0 || lo.is_nan() || hi.is_nan() {
            return Err(Error::SliceRegion { axis, min: lo, max: hi });
        }
        let nudge = |v: f64| match v {
            v if v == 0.0 => -OVERSHOOT,
            v if v == 1.0 => 1.0 + OVERSHOOT,
            v => v,
        };
        let size = n[axis] as f64;
        limits[axis] = [nudge(lo) * size, nudge(hi) * size];
    }

    let [_, y, z] = limits;
    let prism = Node::primitive(Primitive::Prism {
        height1: limits[0][0],
        height2: limits[0][1],
        points: vec![[y[0], z[0]], [y[1], z[0]], [y[1], z[1]], [y[0], z[1]]],
    })
    .inverted(subtract);
    Ok(Node::csg(CsgOp::Intersection, vec![node, prism]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::NodeKind;

    fn sphere() -> Node {
        Node::primitive(Primitive::Sphere { center: Vector3::zeros(), radius: 1.0 })
    }

    #[test]
    fn test_slice_box_inverse() {
        let node = slice_box(sphere(), [0.0; 3], [1.0, 2.0, 3.0], true);
        let mut out = String::new();
        node.write(&mut out, 0).unwrap();
        assert!(out.starts_with("intersection {\n\tsphere {"));
        assert!(out.contains("\tbox {\n\t\t<0, 0, 0>, <1, 2, 3>\n\t\tinverse\n\t}"));
    }

    #[test]
    fn test_slice_fraction_default_region() {
        let node = slice_fraction(sphere(), [10, 20, 30], default_cut(), false).unwrap();
        let NodeKind::Csg(CsgOp::Intersection, children) = &node.kind else {
            panic!("Expected intersection");
        };
        match &children[1].kind {
            NodeKind::Primitive(Primitive::Prism { height1, height2, points }) => {
                assert!((height1 - 5.0).abs() < 1e-10);
                assert!((height2 - 10.01).abs() < 1e-10);
                assert!((points[0][0] - 10.0).abs() < 1e-10);
                assert!((points[0][1] + 0.03).abs() < 1e-10);
                assert!((points[2][0] - 20.02).abs() < 1e-10);
                assert!((points[2][1] - 30.03).abs() < 1e-10);
            }
            other => panic!("Expected prism, got {other:?}"),
        }
        assert!(!children[1].inverse);
    }

    #[test]
    fn test_slice_fraction_reorders_range() {
        let cut = [[1.0, 0.5], [0.25, 0.75], [0.2, 0.4]];
        let node = slice_fraction(sphere(), [4, 4, 10], cut, true).unwrap();
        let NodeKind::Csg(_, children) = &node.kind else {
            panic!("Expected intersection");
        };
        assert!(children[1].inverse);
        if let NodeKind::Primitive(Primitive::Prism { height1, height2, .. }) = &children[1].kind {
            assert!((height1 - 2.0).abs() < 1e-10);
            assert!((height2 - 4.004).abs() < 1e-10);
        }
    }

    #[test]
    fn test_slice_fraction_rejects_out_of_range() {
        let cut = [[0.0, 1.0], [0.0, 1.5], [0.0, 1.0]];
        let err = slice_fraction(sphere(), [4, 4, 4], cut, false).unwrap_err();
        assert!(matches!(err, Error::SliceRegion { axis: 1, .. }));
    }
}
