//! Device records: serialized statepoint format and the typed device model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A stored device document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Store identifier
    #[serde(rename = "_id", default)]
    pub id: String,
    pub statepoint: Statepoint,
}

/// Device parameters as written by the simulation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statepoint {
    pub num_layers: usize,
    pub lattice_vecs: LatticeRecord,
    /// Layers keyed by their stringified index ("0", "1", ...)
    #[serde(default)]
    pub dev_layers: BTreeMap<String, LayerRecord>,
    #[serde(default)]
    pub sub_layer: Option<SubLayerRecord>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatticeRecord {
    pub a: XyRecord,
    pub b: XyRecord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct XyRecord {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerRecord {
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub thickness: f64,
    /// Features keyed by stringified index
    #[serde(default)]
    pub shapes: Option<BTreeMap<String, ShapeRecord>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubLayerRecord {
    #[serde(default)]
    pub thickness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub material: String,
    /// "circle", "ellipse", "rectangle" or "polygon"
    pub shape: String,
    #[serde(default)]
    pub shape_vars: ShapeVars,
}

/// Shape parameters; which fields are present depends on the shape kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShapeVars {
    #[serde(default)]
    pub center: Option<PointRecord>,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub halfwidths: Option<XyRecord>,
    #[serde(default)]
    pub angle: Option<f64>,
    #[serde(default)]
    pub vertices: Option<VertexRecord>,
}

/// A 2-D point written either as `[x, y]` or `{"x": .., "y": ..}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointRecord {
    Pair([f64; 2]),
    Xy(XyRecord),
}

impl PointRecord {
    pub fn to_array(self) -> [f64; 2] {
        match self {
            PointRecord::Pair(p) => p,
            PointRecord::Xy(p) => [p.x, p.y],
        }
    }
}

/// Polygon vertices, index-keyed or as a plain list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VertexRecord {
    Keyed(BTreeMap<String, PointRecord>),
    List(Vec<PointRecord>),
}

/// Typed device description used by the scene builders
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: String,
    pub lattice: Lattice,
    pub layers: Vec<Layer>,
    pub substrate_thickness: f64,
}

/// Primitive lattice vectors of the unit cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lattice {
    pub a: [f64; 2],
    pub b: [f64; 2],
}

impl Lattice {
    /// Grow every component by `delta`
    pub fn padded(&self, delta: f64) -> Self {
        Self {
            a: [self.a[0] + delta, self.a[1] + delta],
            b: [self.b[0] + delta, self.b[1] + delta],
        }
    }

    /// Lattice of an `nx` by `ny` block of cells
    pub fn tiled(&self, nx: usize, ny: usize) -> Self {
        let (sx, sy) = (nx as f64, ny as f64);
        Self {
            a: [self.a[0] * sx, self.a[1] * sx],
            b: [self.b[0] * sy, self.b[1] * sy],
        }
    }

    /// The point `i * a + j * b`
    pub fn at(&self, i: f64, j: f64) -> [f64; 2] {
        [i * self.a[0] + j * self.b[0], i * self.a[1] + j * self.b[1]]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub background: String,
    pub thickness: f64,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub material: String,
    pub shape: Shape,
}

impl Feature {
    pub fn is_vacuum(&self) -> bool {
        matches!(self.material.as_str(), "Vacuum" | "vacuum")
    }
}

/// Feature geometry in the device plane
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle {
        center: [f64; 2],
        radius: f64,
    },
    Ellipse {
        center: [f64; 2],
        halfwidths: [f64; 2],
        angle: f64,
    },
    Rectangle {
        center: [f64; 2],
        halfwidths: [f64; 2],
        angle: f64,
    },
    Polygon {
        center: [f64; 2],
        angle: f64,
        vertices: Vec<[f64; 2]>,
    },
}

impl Shape {
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Circle { .. } => "circle",
            Shape::Ellipse { .. } => "ellipse",
            Shape::Rectangle { .. } => "rectangle",
            Shape::Polygon { .. } => "polygon",
        }
    }

    pub fn center(&self) -> [f64; 2] {
        match self {
            Shape::Circle { center, .. }
            | Shape::Ellipse { center, .. }
            | Shape::Rectangle { center, .. }
            | Shape::Polygon { center, .. } => *center,
        }
    }

    /// A shape with zero extent, which the renderer cannot subtract
    pub fn is_degenerate(&self) -> bool {
        match self {
            Shape::Circle { radius, .. } => *radius == 0.0,
            Shape::Ellipse { halfwidths, .. } | Shape::Rectangle { halfwidths, .. } => {
                halfwidths[0] == 0.0 && halfwidths[1] == 0.0
            }
            Shape::Polygon { vertices, .. } => vertices.len() < 3,
        }
    }

    /// Lateral half-extent used for the running device dimensions
    pub fn footprint(&self) -> [f64; 2] {
        match self {
            Shape::Circle { radius, .. } => [*radius, *radius],
            Shape::Ellipse { halfwidths, .. } | Shape::Rectangle { halfwidths, .. } => *halfwidths,
            Shape::Polygon { vertices, .. } => vertices.iter().fold([0.0, 0.0], |acc, v| {
                [acc[0].max(v[0].abs()), acc[1].max(v[1].abs())]
            }),
        }
    }
}

impl Device {
    pub fn from_json(json: &str) -> Result<Self> {
        let record: DeviceRecord = serde_json::from_str(json)?;
        Self::from_record(&record)
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let record = DeviceRecord::deserialize(value)?;
        Self::from_record(&record)
    }

    /// Convert a stored record into the typed model.
    ///
    /// Layers are read in index order `0..num_layers`; a layer without a
    /// `shapes` entry contributes nothing and is skipped.
    pub fn from_record(record: &DeviceRecord) -> Result<Self> {
        let sp = &record.statepoint;
        let lattice = Lattice {
            a: [sp.lattice_vecs.a.x, sp.lattice_vecs.a.y],
            b: [sp.lattice_vecs.b.x, sp.lattice_vecs.b.y],
        };

        let mut layers = Vec::with_capacity(sp.num_layers);
        for i in 0..sp.num_layers {
            let raw = sp
                .dev_layers
                .get(&i.to_string())
                .ok_or_else(|| Error::Device(format!("missing layer {i} of {}", sp.num_layers)))?;
            let Some(shapes) = &raw.shapes else {
                continue;
            };
            let features = ordered(shapes, "shape")?
                .into_iter()
                .map(Feature::from_record)
                .collect::<Result<Vec<_>>>()?;
            layers.push(Layer {
                background: raw.background.clone().unwrap_or_else(|| "Vacuum".to_string()),
                thickness: raw.thickness,
                features,
            });
        }

        Ok(Self {
            id: record.id.clone(),
            lattice,
            layers,
            substrate_thickness: sp.sub_layer.as_ref().map_or(0.0, |s| s.thickness),
        })
    }
}

impl Feature {
    fn from_record(record: &ShapeRecord) -> Result<Self> {
        let vars = &record.shape_vars;
        let center = vars.center.map_or([0.0, 0.0], PointRecord::to_array);
        let angle = vars.angle.unwrap_or(0.0);
        let halfwidths = || {
            vars.halfwidths
                .map(|h| [h.x, h.y])
                .ok_or_else(|| Error::Device(format!("{} without halfwidths", record.shape)))
        };

        let shape = match record.shape.as_str() {
            "circle" => Shape::Circle {
                center,
                radius: vars
                    .radius
                    .ok_or_else(|| Error::Device("circle without radius".to_string()))?,
            },
            "ellipse" => Shape::Ellipse { center, halfwidths: halfwidths()?, angle },
            "rectangle" => Shape::Rectangle { center, halfwidths: halfwidths()?, angle },
            "polygon" => {
                let vertices = match &vars.vertices {
                    Some(VertexRecord::Keyed(map)) => ordered(map, "vertex")?
                        .into_iter()
                        .map(|p| p.to_array())
                        .collect(),
                    Some(VertexRecord::List(list)) => list.iter().map(|p| p.to_array()).collect(),
                    None => Vec::new(),
                };
                Shape::Polygon { center, angle, vertices }
            }
            other => return Err(Error::Device(format!("unsupported shape kind `{other}`"))),
        };

        Ok(Self {
            material: record.material.clone(),
            shape,
        })
    }
}

/// Entries of an index-keyed map in numeric key order ("10" after "9")
fn ordered<'a, T>(map: &'a BTreeMap<String, T>, what: &str) -> Result<Vec<&'a T>> {
    let mut entries = map
        .iter()
        .map(|(k, v)| {
            k.parse::<usize>()
                .map(|i| (i, v))
                .map_err(|_| Error::Device(format!("{what} key `{k}` is not an index")))
        })
        .collect::<Result<Vec<_>>>()?;
    entries.sort_by_key(|(i, _)| *i);
    Ok(entries.into_iter().map(|(_, v)| v).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PILLAR_DEVICE: &str = r#"{
        "_id": "pillar",
        "statepoint": {
            "num_layers": 2,
            "lattice_vecs": {"a": {"x": 1.0, "y": 0.0}, "b": {"x": 0.0, "y": 1.0}},
            "dev_layers": {
                "0": {"background": "Vacuum", "thickness": 0.0},
                "1": {
                    "background": "Vacuum",
                    "thickness": 0.5,
                    "shapes": {
                        "0": {"material": "Si", "shape": "circle",
                              "shape_vars": {"center": [0.0, 0.0], "radius": 0.3}},
                        "1": {"material": "Vacuum", "shape": "circle",
                              "shape_vars": {"center": {"x": 0.0, "y": 0.0}, "radius": 0.1}}
                    }
                }
            },
            "sub_layer": {"thickness": 0.8}
        }
    }"#;

    #[test]
    fn test_parse_device() {
        let device = Device::from_json(PILLAR_DEVICE).unwrap();
        assert_eq!(device.id, "pillar");
        assert_eq!(device.lattice.a, [1.0, 0.0]);
        // Layer 0 has no shapes
        assert_eq!(device.layers.len(), 1);
        let layer = &device.layers[0];
        assert!((layer.thickness - 0.5).abs() < 1e-10);
        assert_eq!(layer.features.len(), 2);
        assert!(!layer.features[0].is_vacuum());
        assert!(layer.features[1].is_vacuum());
        assert_eq!(layer.features[1].shape.center(), [0.0, 0.0]);
        assert!((device.substrate_thickness - 0.8).abs() < 1e-10);
    }

    #[test]
    fn test_polygon_vertices_numeric_order() {
        let mut verts = serde_json::Map::new();
        for i in 0..11 {
            verts.insert(i.to_string(), serde_json::json!({"x": i as f64, "y": 0.0}));
        }
        let json = serde_json::json!({
            "statepoint": {
                "num_layers": 1,
                "lattice_vecs": {"a": {"x": 1.0, "y": 0.0}, "b": {"x": 0.0, "y": 1.0}},
                "dev_layers": {"0": {"background": "Vacuum", "thickness": 0.2, "shapes": {
                    "0": {"material": "Si", "shape": "polygon",
                          "shape_vars": {"center": [0.0, 0.0], "vertices": verts}}
                }}}
            }
        });

        let device = Device::from_value(&json).unwrap();
        match &device.layers[0].features[0].shape {
            Shape::Polygon { vertices, .. } => {
                let xs: Vec<f64> = vertices.iter().map(|v| v[0]).collect();
                assert_eq!(xs, (0..11).map(|i| i as f64).collect::<Vec<_>>());
            }
            other => panic!("Expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_shape_is_error() {
        let json = serde_json::json!({
            "statepoint": {
                "num_layers": 1,
                "lattice_vecs": {"a": {"x": 1.0, "y": 0.0}, "b": {"x": 0.0, "y": 1.0}},
                "dev_layers": {"0": {"thickness": 0.2, "shapes": {
                    "0": {"material": "Si", "shape": "star", "shape_vars": {}}
                }}}
            }
        });
        assert!(matches!(Device::from_value(&json), Err(Error::Device(_))));
    }

    #[test]
    fn test_degenerate_shapes() {
        assert!(Shape::Circle { center: [0.0, 0.0], radius: 0.0 }.is_degenerate());
        assert!(Shape::Rectangle { center: [0.0, 0.0], halfwidths: [0.0, 0.0], angle: 0.0 }
            .is_degenerate());
        assert!(Shape::Polygon { center: [0.0, 0.0], angle: 0.0, vertices: vec![[0.0, 0.0]; 2] }
            .is_degenerate());
        assert!(!Shape::Ellipse { center: [0.0, 0.0], halfwidths: [0.1, 0.0], angle: 0.0 }
            .is_degenerate());
    }

    #[test]
    fn test_tiled_lattice() {
        let lattice = Lattice { a: [1.0, 0.5], b: [0.2, 1.0] };
        let tiled = lattice.tiled(3, 2);
        assert_eq!(tiled.a, [3.0, 1.5]);
        assert!((tiled.b[0] - 0.4).abs() < 1e-10);
        assert!((tiled.b[1] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_lattice_point() {
        let lattice = Lattice { a: [1.0, 0.0], b: [0.3, 1.0] };
        let p = lattice.at(2.0, -1.0);
        assert!((p[0] - 1.7).abs() < 1e-10);
        assert!((p[1] + 1.0).abs() < 1e-10);
    }
}
