//! Device geometry: feature primitives, accent lines, layers and the
//! replicated unit cell.
//!
//! Layers stack downward from `z = 0`; each layer's z-extent is passed
//! around as `[top, bottom]`. Every builder returns the running
//! [`DeviceDims`] alongside the nodes it produced.

use std::collections::BTreeMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clip::SliceSpec;
use crate::device::{Device, Feature, Lattice, Shape};
use crate::dims::DeviceDims;
use crate::error::{Error, Result};
use crate::finish::{ColorScheme, Finish, Painter, Rgbft, Texture};
use crate::scene::{CsgOp, Node, Primitive, Scene};

/// Shift of a layer's features below its background slab
const BACKGROUND_GAP: f64 = 0.0001;
/// Growth of background slabs that hides seams between unit cells
const BACKGROUND_PAD: f64 = 0.0002;
/// How far silo holes poke through the outer feature
const HOLE_OVERSHOOT: f64 = 0.001;
/// Unit cells counted in the final footprint, per axis
const FOOTPRINT_CELLS: usize = 5;

pub const SUBSTRATE_COLOR: Rgbft = Rgbft::new(0.15, 0.15, 0.15, 0.0, 0.0);

/// Appearance of a device scene
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Unit cells along the first lattice vector
    pub num_uc_x: usize,
    /// Unit cells along the second lattice vector
    pub num_uc_y: usize,
    /// Slabs stacked on top of the device, first one lowest
    pub coating_layers: Vec<CoatingLayer>,
    /// Colours of coating and layer-background materials
    pub coating_colors: BTreeMap<String, Rgbft>,
    /// Index of refraction of coating and layer-background materials
    pub coating_ior: BTreeMap<String, f64>,
    /// Colour features by material instead of cycling `custom_colors`
    pub use_default_colors: bool,
    pub custom_colors: Vec<Rgbft>,
    /// Finish name: material, Si, SiO2, translucent, glass, dull_metal,
    /// bright_metal, irid, billiard, dull or custom
    pub finish: String,
    /// Markup used when `finish` is "custom"
    pub custom_finish: String,
    /// Outline feature edges
    pub add_lines: bool,
    pub line_thickness: f64,
    pub line_color: Rgbft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoatingLayer {
    pub material: String,
    pub thickness: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            num_uc_x: 2,
            num_uc_y: 2,
            coating_layers: Vec::new(),
            coating_colors: BTreeMap::from([("background".to_string(), Rgbft::rgb(1.0, 0.0, 0.0))]),
            coating_ior: BTreeMap::from([("background".to_string(), 1.0)]),
            use_default_colors: true,
            custom_colors: vec![Rgbft::FALLBACK],
            finish: String::new(),
            custom_finish: String::new(),
            add_lines: false,
            line_thickness: 0.002,
            line_color: Rgbft::BLACK,
        }
    }
}

/// Where a lattice-shaped slab sits relative to the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlabKind {
    /// Above the top of the coating stack
    Coating,
    /// Filling the current layer
    Background,
    /// Centred on a field grid
    Isosurface,
    /// Below the bottom of the device
    Substrate,
}

/// Colouring, finish and outline settings shared by a layer's features
#[derive(Debug, Clone)]
pub struct FeatureStyle {
    pub painter: Painter,
    pub finish: Finish,
    pub lines: Option<LineStyle>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineStyle {
    pub thickness: f64,
    pub color: Rgbft,
}

impl FeatureStyle {
    pub fn from_config(config: &DeviceConfig) -> Self {
        let scheme = if config.use_default_colors {
            ColorScheme::device_defaults()
        } else {
            ColorScheme::Palette(config.custom_colors.clone())
        };
        Self {
            painter: Painter::new(scheme),
            finish: Finish::select(&config.finish, &config.custom_finish),
            lines: config.add_lines.then_some(LineStyle {
                thickness: config.line_thickness,
                color: config.line_color,
            }),
        }
    }

    fn texture(&mut self, material: &str) -> Texture {
        let color = self.painter.next_color(material);
        Texture::new(material, color, &self.finish, 1.0)
    }
}

/// Rotate about the z axis by `angle` degrees, then move to `center`
fn place(mut node: Node, center: [f64; 2], angle: f64) -> Node {
    if angle != 0.0 {
        node = node.rotate(Vector3::new(0.0, 0.0, angle));
    }
    if center != [0.0, 0.0] {
        node = node.translate(Vector3::new(center[0], center[1], 0.0));
    }
    node
}

/// Rotate `p` about `center` by `angle` degrees in the xy-plane
fn rotate_about(p: [f64; 2], center: [f64; 2], angle: f64) -> [f64; 2] {
    let (sin, cos) = angle.to_radians().sin_cos();
    let (dx, dy) = (p[0] - center[0], p[1] - center[1]);
    [center[0] + dx * cos - dy * sin, center[1] + dx * sin + dy * cos]
}

pub fn create_cylinder(center: [f64; 2], end: [f64; 2], radius: f64) -> Node {
    Node::primitive(Primitive::Cylinder {
        base: Vector3::new(center[0], center[1], end[0]),
        cap: Vector3::new(center[0], center[1], end[1]),
        radius,
    })
}

/// Unit cylinder stretched to the halfwidths
pub fn create_ellipse(center: [f64; 2], end: [f64; 2], halfwidths: [f64; 2], angle: f64) -> Node {
    let cylinder = create_cylinder([0.0, 0.0], end, 1.0)
        .scale(Vector3::new(halfwidths[0], halfwidths[1], 1.0));
    place(cylinder, center, angle)
}

pub fn create_rectangle(center: [f64; 2], end: [f64; 2], halfwidths: [f64; 2], angle: f64) -> Node {
    let block = Node::primitive(Primitive::Box {
        corner1: Vector3::new(-halfwidths[0], -halfwidths[1], end[1]),
        corner2: Vector3::new(halfwidths[0], halfwidths[1], end[0]),
    });
    place(block, center, angle)
}

/// Prism built around the origin and stood upright; `vertices` are
/// absolute device-plane coordinates.
pub fn create_polygon(center: [f64; 2], end: [f64; 2], vertices: &[[f64; 2]], angle: f64) -> Node {
    // Standing the prism up maps its outline's second coordinate to -y.
    let points = vertices
        .iter()
        .map(|v| [v[0] - center[0], -(v[1] - center[1])])
        .collect();
    let prism = Node::primitive(Primitive::Prism {
        height1: end[1],
        height2: end[0],
        points,
    })
    .rotate(Vector3::new(90.0, 0.0, 0.0));
    place(prism, center, angle)
}

/// Solid body of a feature between `end = [top, bottom]`
pub fn feature_solid(shape: &Shape, end: [f64; 2]) -> Node {
    match shape {
        Shape::Circle { center, radius } => create_cylinder(*center, end, *radius),
        Shape::Ellipse { center, halfwidths, angle } => create_ellipse(*center, end, *halfwidths, *angle),
        Shape::Rectangle { center, halfwidths, angle } => {
            create_rectangle(*center, end, *halfwidths, *angle)
        }
        Shape::Polygon { center, angle, vertices } => create_polygon(*center, end, vertices, *angle),
    }
}

/// Parallelogram slab spanned by the lattice vectors, `thickness` tall.
///
/// Returns the slab and its halfwidth, half the sum of both lattice
/// vectors' components.
pub fn add_slab(lattice: &Lattice, thickness: f64, dims: DeviceDims, kind: SlabKind) -> (Node, [f64; 2]) {
    let [ax, ay] = lattice.a;
    let [bx, by] = lattice.b;
    let halfwidth = [0.5 * (ax + bx), 0.5 * (ay + by)];
    let end = [-0.5 * thickness, 0.5 * thickness];

    let points = [[0.0, 0.0], [ax, ay], [ax + bx, ay + by], [bx, by]]
        .iter()
        .map(|p| [p[0] - halfwidth[0], -(p[1] - halfwidth[1])])
        .collect();

    let offset = match kind {
        SlabKind::Coating => Vector3::new(dims.x, dims.y, end[1] + dims.z),
        SlabKind::Background => Vector3::new(0.0, 0.0, end[0] - dims.z),
        SlabKind::Isosurface => Vector3::new(0.5 * dims.x, 0.5 * dims.y, -0.5 * thickness),
        SlabKind::Substrate => Vector3::new(dims.x, dims.y, end[0] - dims.z),
    };

    let slab = Node::primitive(Primitive::Prism {
        height1: end[0],
        height2: end[1] * 1.000001,
        points,
    })
    .rotate(Vector3::new(90.0, 0.0, 0.0))
    .translate(offset);

    (slab, halfwidth)
}

/// Ring lying in the xy-plane at height `z`; an ellipse's ring is built
/// from its smaller halfwidth and stretched along the other axis.
pub fn create_torus(halfwidths: [f64; 2], minor: f64, center: [f64; 2], z: f64, angle: f64, color: Rgbft) -> Node {
    let smaller = halfwidths[0].min(halfwidths[1]);
    let mut torus = Node::primitive(Primitive::Torus { major: smaller, minor })
        .textured(Texture::plain(color))
        .rotate(Vector3::new(90.0, 0.0, 0.0));
    if halfwidths[0] != halfwidths[1] && smaller > 0.0 {
        torus = torus.scale(Vector3::new(halfwidths[0] / smaller, halfwidths[1] / smaller, 1.0));
    }
    if angle != 0.0 {
        torus = torus.rotate(Vector3::new(0.0, 0.0, angle));
    }
    torus.translate(Vector3::new(center[0], center[1], z)).shadowless()
}

fn line_sphere(p: [f64; 2], z: f64, style: LineStyle) -> Node {
    Node::primitive(Primitive::Sphere {
        center: Vector3::new(p[0], p[1], z),
        radius: style.thickness,
    })
    .textured(Texture::plain(style.color))
    .shadowless()
}

fn line_segment(from: Vector3<f64>, to: Vector3<f64>, style: LineStyle) -> Node {
    Node::primitive(Primitive::Cylinder { base: from, cap: to, radius: style.thickness })
        .textured(Texture::plain(style.color))
        .shadowless()
}

/// Outline of a feature whose top face sits at `z_top`.
///
/// Circles and ellipses get a ring on each face, rectangles a full edge
/// frame with corner spheres, polygons a closed polyline on each face.
pub fn add_accent_lines(shape: &Shape, z_top: f64, height: f64, style: LineStyle) -> Vec<Node> {
    let height = height.abs();
    let faces = [z_top, z_top - height];
    match shape {
        Shape::Circle { center, radius } => faces
            .iter()
            .map(|&z| create_torus([*radius; 2], style.thickness, *center, z, 0.0, style.color))
            .collect(),
        Shape::Ellipse { center, halfwidths, angle } => faces
            .iter()
            .map(|&z| create_torus(*halfwidths, style.thickness, *center, z, *angle, style.color))
            .collect(),
        Shape::Rectangle { center, halfwidths, angle } => {
            let [hx, hy] = *halfwidths;
            let corners: Vec<[f64; 2]> = [[-hx, -hy], [hx, -hy], [hx, hy], [-hx, hy]]
                .iter()
                .map(|c| rotate_about([c[0] + center[0], c[1] + center[1]], *center, *angle))
                .collect();
            let mut lines = Vec::with_capacity(20);
            for (i, c) in corners.iter().enumerate() {
                let next = corners[(i + 1) % corners.len()];
                for &z in &faces {
                    lines.push(line_segment(
                        Vector3::new(c[0], c[1], z),
                        Vector3::new(next[0], next[1], z),
                        style,
                    ));
                    lines.push(line_sphere(*c, z, style));
                }
                lines.push(line_segment(
                    Vector3::new(c[0], c[1], faces[1]),
                    Vector3::new(c[0], c[1], faces[0]),
                    style,
                ));
            }
            lines
        }
        Shape::Polygon { center, angle, vertices } => {
            let points: Vec<[f64; 2]> = vertices.iter().map(|v| rotate_about(*v, *center, *angle)).collect();
            let mut lines = Vec::new();
            for (i, p) in points.iter().enumerate() {
                let next = points[(i + 1) % points.len()];
                for &z in &faces {
                    lines.push(line_sphere(*p, z, style));
                    // Segments shorter than the line radius upset the renderer
                    if (p[0] - next[0]).hypot(p[1] - next[1]) > style.thickness {
                        lines.push(line_segment(
                            Vector3::new(p[0], p[1], z),
                            Vector3::new(next[0], next[1], z),
                            style,
                        ));
                    }
                }
            }
            lines
        }
    }
}

/// How a feature is drawn within its layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureRole {
    Solid,
    /// Solid with the following vacuum features cut out of it
    Silo,
    /// Vacuum, drawn only as part of a silo
    Hole,
}

/// Decide the role of every feature in a layer.
///
/// A solid immediately followed by a vacuum becomes a silo, unless that
/// vacuum has zero extent (a false silo), in which case it stays solid.
pub fn classify_layer(features: &[Feature]) -> Vec<FeatureRole> {
    let mut roles: Vec<FeatureRole> = features
        .iter()
        .map(|f| if f.is_vacuum() { FeatureRole::Hole } else { FeatureRole::Solid })
        .collect();

    for (i, pair) in features.windows(2).enumerate() {
        if roles[i] != FeatureRole::Solid || !pair[1].is_vacuum() {
            continue;
        }
        if pair[1].shape.is_degenerate() {
            warn!("Ignoring zero-size vacuum {} after feature {}", pair[1].shape.kind(), i);
        } else {
            roles[i] = FeatureRole::Silo;
        }
    }
    roles
}

/// The solid at `k` with every directly following vacuum cut out
pub fn write_silo_feature(
    features: &[Feature],
    k: usize,
    end: [f64; 2],
    z_top: f64,
    style: &mut FeatureStyle,
) -> Vec<Node> {
    let outer = &features[k];
    if !matches!(outer.shape, Shape::Circle { .. }) {
        warn!("Silo with {} outer shape is untested", outer.shape.kind());
    }
    let hole_end = [end[0] + HOLE_OVERSHOOT, end[1] - HOLE_OVERSHOOT];
    let height = end[1] - end[0];

    let mut parts = vec![feature_solid(&outer.shape, end)];
    let mut lines = Vec::new();
    if let Some(line_style) = style.lines {
        lines.extend(add_accent_lines(&outer.shape, z_top, height, line_style));
    }

    for hole in features[k + 1..].iter().take_while(|f| f.is_vacuum()) {
        if hole.shape.is_degenerate() {
            debug!("Skipping zero-size hole {}", hole.shape.kind());
            continue;
        }
        parts.push(feature_solid(&hole.shape, hole_end));
        if let Some(line_style) = style.lines {
            lines.extend(add_accent_lines(&hole.shape, z_top, height, line_style));
        }
    }

    let silo = Node::csg(CsgOp::Difference, parts)
        .commented("Silo")
        .textured(style.texture(&outer.material));

    let mut nodes = vec![silo];
    nodes.extend(lines);
    nodes
}

/// Every feature of one layer spanning `end = [top, bottom]`.
///
/// Returns the feature nodes and `dims` grown by the footprints and the
/// layer thickness.
pub fn create_device_layer(
    features: &[Feature],
    dims: DeviceDims,
    end: [f64; 2],
    thickness: f64,
    style: &mut FeatureStyle,
) -> (Vec<Node>, DeviceDims) {
    let z_top = -dims.z;
    let mut dims = dims;
    let mut nodes = Vec::new();

    for (k, role) in classify_layer(features).into_iter().enumerate() {
        let feature = &features[k];
        match role {
            FeatureRole::Hole => continue,
            FeatureRole::Silo => nodes.extend(write_silo_feature(features, k, end, z_top, style)),
            FeatureRole::Solid => {
                let node = feature_solid(&feature.shape, end)
                    .commented(format!("{} {}", feature.material, feature.shape.kind()))
                    .textured(style.texture(&feature.material));
                nodes.push(node);
                if let Some(line_style) = style.lines {
                    nodes.extend(add_accent_lines(&feature.shape, z_top, end[1] - end[0], line_style));
                }
            }
        }
        dims = dims.with_footprint(feature.shape.footprint());
    }

    (nodes, dims.update(0.0, 0.0, thickness))
}

/// A complete device scene with the dimensions used to place the camera
#[derive(Debug, Clone)]
pub struct DeviceScene {
    pub scene: Scene,
    pub dims: DeviceDims,
    pub coating_dims: DeviceDims,
}

/// Shift that keeps an `n`-cell row roughly centred on the origin
fn centering_offset(n: usize) -> usize {
    let n = n.max(1);
    (n - 1 - (n - 1) % 2) / 2
}

/// Build the unit cell, replicate it, and add coatings and substrate.
pub fn create_device(device: &Device, config: &DeviceConfig) -> DeviceScene {
    let mut style = FeatureStyle::from_config(config);
    let lattice = device.lattice;
    let mut dims = DeviceDims::ZERO;
    let mut layers = Vec::with_capacity(device.layers.len());

    for layer in &device.layers {
        let mut end = [-dims.z, -dims.z - layer.thickness];
        let mut children = Vec::new();

        if let Some(color) = config.coating_colors.get(&layer.background) {
            let ior = config.coating_ior.get(&layer.background).copied().unwrap_or(1.0);
            let (slab, _) = add_slab(&lattice.padded(BACKGROUND_PAD), layer.thickness, dims, SlabKind::Background);
            children.push(
                slab.commented("Layer background")
                    .textured(Texture::new(&layer.background, *color, &Finish::Translucent, ior)),
            );
            end = [end[0] - BACKGROUND_GAP, end[1] - BACKGROUND_GAP];
        }

        let (features, next) = create_device_layer(&layer.features, dims, end, layer.thickness, &mut style);
        children.extend(features);
        dims = next;
        if !children.is_empty() {
            layers.push(Node::csg(CsgOp::Union, children));
        }
    }

    let mut scene = Scene::new();
    scene.declare(
        "UnitCell",
        Node::csg(CsgOp::Merge, layers).commented(format!("Unit cell of device {}", device.id)),
    );

    let (nx, ny) = (config.num_uc_x.max(1), config.num_uc_y.max(1));
    let (adj_x, adj_y) = (centering_offset(nx) as f64, centering_offset(ny) as f64);
    let mut body = Vec::with_capacity(nx * ny + config.coating_layers.len());
    for i in 0..nx {
        for j in 0..ny {
            let (di, dj) = (i as f64 - adj_x, j as f64 - adj_y);
            let [x, y] = lattice.at(di, dj);
            body.push(Node::object("UnitCell").translate(Vector3::new(x, y, 0.0)));
        }
    }

    // Slabs stay centred for odd counts and shift by half a cell for even ones
    let tiled = lattice.tiled(nx, ny);
    let half = |n: usize| if n % 2 == 0 { 0.5 } else { 0.0 };
    let [shift_x, shift_y] = lattice.at(half(nx), half(ny));
    let mut coating_dims = DeviceDims::new(shift_x, shift_y, 0.0);
    let substrate_dims = DeviceDims::new(coating_dims.x, coating_dims.y, dims.z);

    for (j, coating) in config.coating_layers.iter().enumerate() {
        let color = config.coating_colors.get(&coating.material).copied().unwrap_or_else(|| {
            warn!("No colour for coating {}, using #00aaaa", coating.material);
            Rgbft::FALLBACK
        });
        let ior = config.coating_ior.get(&coating.material).copied().unwrap_or(1.0);
        let (slab, _) = add_slab(&tiled, coating.thickness, coating_dims, SlabKind::Coating);
        body.push(
            slab.commented(format!("Coating layer {}", j + 1))
                .textured(Texture::new(&coating.material, color, &Finish::Translucent, ior)),
        );
        coating_dims.z += coating.thickness;
    }
    scene.push(Node::csg(CsgOp::Merge, body));

    let substrate_thickness = device.substrate_thickness.max(1.0);
    let (substrate, _) = add_slab(&tiled, substrate_thickness, substrate_dims, SlabKind::Substrate);
    scene.push(
        substrate
            .commented("Substrate")
            .textured(Texture::new("subst", SUBSTRATE_COLOR, &Finish::Dull, 1.0)),
    );

    let dims = dims.update(0.0, 0.0, substrate_thickness);
    let dims = dims.update(
        nx.min(FOOTPRINT_CELLS) as f64 * dims.x,
        ny.min(FOOTPRINT_CELLS) as f64 * dims.y,
        dims.z,
    );

    DeviceScene { scene, dims, coating_dims }
}

/// Unit cell drawn over an isosurface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitCellConfig {
    /// Transmit channel of the grey unit cell
    pub transmit: f64,
    /// Region cut away so the field inside stays visible
    pub slice: Option<SliceSpec>,
}

impl Default for UnitCellConfig {
    fn default() -> Self {
        Self {
            transmit: 0.0,
            slice: Some(SliceSpec::default()),
        }
    }
}

/// Unit cell scaled and moved onto a field grid of size `n`.
pub fn isosurface_unit_cell(device: &Device, n: [usize; 3], config: &UnitCellConfig) -> Result<Scene> {
    let a_x = device.lattice.a[0];
    if a_x == 0.0 {
        return Err(Error::Device("lattice vector a has no x component".to_string()));
    }

    let mut style = FeatureStyle {
        painter: Painter::new(ColorScheme::isosurface_defaults(config.transmit)),
        finish: Finish::Dull,
        lines: None,
    };
    let mut dims = DeviceDims::ZERO;
    let mut layers = Vec::new();
    for layer in &device.layers {
        let end = [-dims.z, -dims.z - layer.thickness];
        let (features, next) = create_device_layer(&layer.features, dims, end, layer.thickness, &mut style);
        dims = next;
        if !features.is_empty() {
            layers.push(Node::csg(CsgOp::Union, features));
        }
    }

    let mut scene = Scene::new();
    scene.declare("UnitCell", Node::csg(CsgOp::Merge, layers).commented("Unit cell"));

    let [n0, n1, n2] = n.map(|v| v as f64);
    let scale = n0 / a_x;
    let mut cell = Node::object("UnitCell")
        .scale(Vector3::new(scale, scale, scale))
        .translate(Vector3::new(0.5 * (dims.x + n0), 0.5 * (dims.y + n1), n2 - dims.z));
    if let Some(slice) = &config.slice {
        cell = slice.apply(cell, n)?;
    }
    scene.push(cell);
    Ok(scene)
}
