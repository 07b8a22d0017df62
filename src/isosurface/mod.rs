//! Isosurface extraction and `mesh2` markup

pub mod colormap;
pub mod marching_cubes;

use std::fmt::{self, Write};

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dims::DeviceDims;
use crate::error::{Error, Result};
use crate::scene::{CsgOp, Node, Primitive};

pub use colormap::Colormap;
pub use marching_cubes::{marching_cubes, SurfaceMesh};

/// Factor pulling a cutoff at the field minimum inside the range
pub const LOWER_NUDGE: f64 = 1.0001;
/// Factor pulling a cutoff at the field maximum inside the range
pub const UPPER_NUDGE: f64 = 0.9999;

/// Isosurface styling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsosurfaceConfig {
    /// Colormap name (viridis, plasma, inferno, magma, cividis, turbo, hot, gray)
    pub colormap: String,
    /// Transmit channel of every surface
    pub transmit: f64,
    /// Colour by value within these limits instead of by rank
    pub cmap_limits: Option<[f64; 2]>,
}

impl Default for IsosurfaceConfig {
    fn default() -> Self {
        Self {
            colormap: "viridis".to_string(),
            transmit: 0.4,
            cmap_limits: None,
        }
    }
}

/// A triangle mesh ready for `mesh2` output
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh2 {
    pub surface: SurfaceMesh,
    pub color: [f64; 3],
    pub transmit: f64,
}

impl Mesh2 {
    pub(crate) fn write_body(&self, out: &mut impl Write, depth: usize) -> fmt::Result {
        let pad = "\t".repeat(depth);
        let vec5 = |v: &[f64; 3]| format!("<{:.5}, {:.5}, {:.5}>", v[0], v[1], v[2]);

        let vertices: Vec<String> = self.surface.vertices.iter().map(vec5).collect();
        let normals: Vec<String> = self.surface.normals.iter().map(vec5).collect();
        let faces: Vec<String> = self
            .surface
            .faces
            .iter()
            .map(|f| format!("<{}, {}, {}>", f[0], f[1], f[2]))
            .collect();

        writeln!(out, "{pad}// Vertex vectors")?;
        write_mesh2_params(out, depth, "vertex_vectors", &vertices)?;
        writeln!(out, "{pad}// Normal vectors")?;
        write_mesh2_params(out, depth, "normal_vectors", &normals)?;
        writeln!(out, "{pad}// Face indices")?;
        write_mesh2_params(out, depth, "face_indices", &faces)?;
        let [r, g, b] = self.color;
        writeln!(
            out,
            "{pad}pigment {{ rgbt <{r:.4}, {g:.4}, {b:.4}, {}> }}",
            crate::scene::num(self.transmit)
        )
    }
}

/// Write a `mesh2` parameter block: its name, the item count, then the
/// items two per line.
pub fn write_mesh2_params(out: &mut impl Write, depth: usize, name: &str, values: &[String]) -> fmt::Result {
    let pad = "\t".repeat(depth);
    let inner = "\t".repeat(depth + 1);
    writeln!(out, "{pad}{name} {{")?;
    write!(out, "{inner}{}", values.len())?;
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.write_char(',')?;
        }
        if i % 2 == 0 {
            write!(out, "\n{inner}")?;
        } else {
            out.write_char(' ')?;
        }
        out.write_str(value)?;
    }
    writeln!(out, "\n{pad}}}")
}

/// Pull cutoffs at or beyond the field extrema just inside the range,
/// then sort and drop duplicates.
///
/// The nudged bound is `min * 1.0001` / `max * 0.9999`; when that would
/// not land strictly inside `(min, max)` (non-positive extrema) a 1e-4
/// fraction of the range is used instead.
pub fn clamp_cutoffs(cutoffs: &[f64], min: f64, max: f64) -> Vec<f64> {
    let span = max - min;
    let lower = match min * LOWER_NUDGE {
        v if v > min && v < max => v,
        _ => min + 1e-4 * span,
    };
    let upper = match max * UPPER_NUDGE {
        v if v < max && v > min => v,
        _ => max - 1e-4 * span,
    };

    let mut levels: Vec<f64> = cutoffs
        .iter()
        .map(|&c| {
            if c <= min {
                warn!("Cutoff {} is at or below the field minimum {}, using {}", c, min, lower);
                lower
            } else if c >= max {
                warn!("Cutoff {} is at or above the field maximum {}, using {}", c, max, upper);
                upper
            } else {
                c
            }
        })
        .collect();
    levels.sort_by(f64::total_cmp);
    levels.dedup();
    levels
}

/// Surfaces built by [`create_mesh2`]
#[derive(Debug, Clone)]
pub struct MeshScene {
    /// A single `mesh2`, a `union` of them, or nothing when every surface was empty
    pub node: Option<Node>,
    /// Levels actually used, ascending
    pub levels: Vec<f64>,
    /// Largest vertex coordinate per axis
    pub dims: DeviceDims,
}

/// Build one coloured `mesh2` per surviving cutoff of `field`.
pub fn create_mesh2(field: &Array3<f64>, cutoffs: &[f64], config: &IsosurfaceConfig) -> Result<MeshScene> {
    if cutoffs.is_empty() {
        return Err(Error::NoCutoffs);
    }
    let colormap: Colormap = config.colormap.parse()?;

    let (min, max) = field
        .iter()
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    info!("Field range [{}, {}]", min, max);

    let levels = clamp_cutoffs(cutoffs, min, max);
    let count = levels.len() as f64;
    let mut dims = DeviceDims::ZERO;
    let mut meshes = Vec::with_capacity(levels.len());

    for (i, &level) in levels.iter().enumerate() {
        let t = match config.cmap_limits {
            Some([lo, hi]) if hi > lo => (level - lo) / (hi - lo),
            _ => i as f64 / count,
        };
        let color = colormap.sample(t);
        info!(
            "Isosurface {} at {:.4}, colour <{:.3}, {:.3}, {:.3}>",
            i, level, color[0], color[1], color[2]
        );

        let surface = marching_cubes(field, level);
        let Some(upper) = surface.upper_bound().filter(|_| !surface.is_empty()) else {
            warn!("Isosurface at {} is empty, skipping", level);
            continue;
        };
        dims = dims.update(upper[0], upper[1], 0.0);
        dims.z = dims.z.max(upper[2]);

        meshes.push(
            Node::primitive(Primitive::Mesh2(Mesh2 {
                surface,
                color,
                transmit: config.transmit,
            }))
            .commented(format!("Isosurface {level}")),
        );
    }

    let node = match meshes.len() {
        0 => None,
        1 => meshes.pop(),
        _ => Some(Node::csg(CsgOp::Union, meshes)),
    };

    Ok(MeshScene { node, levels, dims })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Linear ramp from 0 to 3 along the first axis
    fn ramp() -> Array3<f64> {
        Array3::from_shape_fn((4, 4, 4), |(i, _, _)| i as f64)
    }

    #[test]
    fn test_cutoffs_inside_range_unchanged() {
        let cutoffs = [0.15, 0.5, 1.0, 1.5, 2.0, 2.5];
        assert_eq!(clamp_cutoffs(&cutoffs, 0.0, 3.0), cutoffs.to_vec());
    }

    #[test]
    fn test_cutoffs_clamped_at_extrema() {
        let levels = clamp_cutoffs(&[0.5, 1.0, 3.0, 5.0], 1.0, 3.0);
        assert_eq!(levels.len(), 2);
        assert!((levels[0] - 1.0001).abs() < 1e-12);
        assert!((levels[1] - 2.9997).abs() < 1e-12);
        assert!(levels[0] > 1.0 && levels[1] < 3.0);
    }

    #[test]
    fn test_cutoffs_clamped_for_non_positive_minimum() {
        let levels = clamp_cutoffs(&[-2.0, 0.0], -1.0, 0.0);
        assert!(levels.iter().all(|&l| l > -1.0 && l < 0.0));
    }

    #[test]
    fn test_cutoffs_sorted_and_deduplicated() {
        let levels = clamp_cutoffs(&[2.0, 0.5, 2.0, 1.0], 0.0, 3.0);
        assert_eq!(levels, vec![0.5, 1.0, 2.0]);
    }

    #[test]
    fn test_mesh2_params_layout() {
        let mut out = String::new();
        let values: Vec<String> = ["<a>", "<b>", "<c>"].iter().map(|s| s.to_string()).collect();
        write_mesh2_params(&mut out, 1, "vertex_vectors", &values).unwrap();
        assert_eq!(out, "\tvertex_vectors {\n\t\t3\n\t\t<a>, <b>,\n\t\t<c>\n\t}\n");
    }

    #[test]
    fn test_single_cutoff_is_bare_mesh() {
        let scene = create_mesh2(&ramp(), &[1.5], &IsosurfaceConfig::default()).unwrap();
        let node = scene.node.unwrap();
        assert!(matches!(node.kind, crate::scene::NodeKind::Primitive(Primitive::Mesh2(_))));
        assert!((scene.dims.x - 1.5).abs() < 1e-10);
        assert!((scene.dims.y - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_several_cutoffs_are_unioned() {
        let config = IsosurfaceConfig {
            colormap: "hot".to_string(),
            transmit: 0.0,
            cmap_limits: None,
        };
        let scene = create_mesh2(&ramp(), &[0.5, 1.5, 2.5], &config).unwrap();
        let node = scene.node.unwrap();
        assert_eq!(node.child_count(), 3);

        let mut out = String::new();
        node.write(&mut out, 0).unwrap();
        assert!(out.starts_with("union {\n"));
        assert_eq!(out.matches("mesh2 {").count(), 3);
        assert!(out.contains("pigment { rgbt <0.0416, 0.0000, 0.0000, 0> }"));
        assert!(out.contains("<0.50000, 0.00000, 0.00000>"));
    }

    #[test]
    fn test_unknown_colormap() {
        let config = IsosurfaceConfig {
            colormap: "rainbow-ish".to_string(),
            ..Default::default()
        };
        assert!(matches!(create_mesh2(&ramp(), &[1.0], &config), Err(Error::Colormap(_))));
    }

    #[test]
    fn test_empty_cutoffs() {
        assert!(matches!(
            create_mesh2(&ramp(), &[], &IsosurfaceConfig::default()),
            Err(Error::NoCutoffs)
        ));
    }
}
