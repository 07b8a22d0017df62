//! Scene graph and POV-Ray markup serialization
//!
//! Builders assemble a tree of [`Node`]s; the text is produced once by
//! [`Scene::to_pov`]. Every block is tab-indented by nesting depth.

use std::fmt::{self, Write};

use nalgebra::Vector3;

use crate::finish::Texture;
use crate::isosurface::Mesh2;

/// CSG combinators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsgOp {
    Union,
    Merge,
    Difference,
    Intersection,
}

impl CsgOp {
    fn keyword(self) -> &'static str {
        match self {
            CsgOp::Union => "union",
            CsgOp::Merge => "merge",
            CsgOp::Difference => "difference",
            CsgOp::Intersection => "intersection",
        }
    }
}

/// Renderer primitives
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Cylinder {
        base: Vector3<f64>,
        cap: Vector3<f64>,
        radius: f64,
    },
    Box {
        corner1: Vector3<f64>,
        corner2: Vector3<f64>,
    },
    /// Linear-sweep, linear-spline prism along y; the outline is closed
    /// on output by repeating the first point.
    Prism {
        height1: f64,
        height2: f64,
        points: Vec<[f64; 2]>,
    },
    /// Torus in the x-z plane
    Torus {
        major: f64,
        minor: f64,
    },
    Sphere {
        center: Vector3<f64>,
        radius: f64,
    },
    Mesh2(Mesh2),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Scale(Vector3<f64>),
    Rotate(Vector3<f64>),
    Translate(Vector3<f64>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Primitive(Primitive),
    Csg(CsgOp, Vec<Node>),
    /// Reference to a `#declare`d object
    Object(String),
}

/// A primitive, CSG group or object reference plus its modifiers
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub comment: Option<String>,
    pub transforms: Vec<Transform>,
    pub texture: Option<Texture>,
    pub inverse: bool,
    pub no_shadow: bool,
}

impl Node {
    fn with_kind(kind: NodeKind) -> Self {
        Self {
            kind,
            comment: None,
            transforms: Vec::new(),
            texture: None,
            inverse: false,
            no_shadow: false,
        }
    }

    pub fn primitive(primitive: Primitive) -> Self {
        Self::with_kind(NodeKind::Primitive(primitive))
    }

    pub fn csg(op: CsgOp, children: Vec<Node>) -> Self {
        Self::with_kind(NodeKind::Csg(op, children))
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Object(name.into()))
    }

    pub fn commented(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn scale(mut self, v: Vector3<f64>) -> Self {
        self.transforms.push(Transform::Scale(v));
        self
    }

    pub fn rotate(mut self, v: Vector3<f64>) -> Self {
        self.transforms.push(Transform::Rotate(v));
        self
    }

    pub fn translate(mut self, v: Vector3<f64>) -> Self {
        self.transforms.push(Transform::Translate(v));
        self
    }

    pub fn textured(mut self, texture: Texture) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn inverted(mut self, inverse: bool) -> Self {
        self.inverse = inverse;
        self
    }

    pub fn shadowless(mut self) -> Self {
        self.no_shadow = true;
        self
    }

    /// Number of CSG children, 0 for leaves
    pub fn child_count(&self) -> usize {
        match &self.kind {
            NodeKind::Csg(_, children) => children.len(),
            _ => 0,
        }
    }

    pub fn write(&self, out: &mut impl Write, depth: usize) -> fmt::Result {
        let pad = "\t".repeat(depth);
        if let Some(comment) = &self.comment {
            writeln!(out, "{pad}// {comment}")?;
        }
        self.write_block(out, depth, &pad)
    }

    /// Write the block without its comment; `lead` replaces the indent of
    /// the opening line.
    fn write_block(&self, out: &mut impl Write, depth: usize, lead: &str) -> fmt::Result {
        let pad = "\t".repeat(depth);
        let inner = "\t".repeat(depth + 1);
        match &self.kind {
            NodeKind::Object(name) => {
                writeln!(out, "{lead}object {{")?;
                writeln!(out, "{inner}{name}")?;
            }
            NodeKind::Csg(op, children) => {
                writeln!(out, "{lead}{} {{", op.keyword())?;
                for child in children {
                    child.write(out, depth + 1)?;
                }
            }
            NodeKind::Primitive(primitive) => write_primitive(primitive, out, depth, lead)?,
        }

        self.write_modifiers(out, depth + 1)?;
        writeln!(out, "{pad}}}")
    }

    fn write_modifiers(&self, out: &mut impl Write, depth: usize) -> fmt::Result {
        let pad = "\t".repeat(depth);
        if self.inverse {
            writeln!(out, "{pad}inverse")?;
        }
        if let Some(texture) = &self.texture {
            write_texture(texture, out, depth)?;
        }
        for t in &self.transforms {
            let (keyword, v) = match t {
                Transform::Scale(v) => ("scale", v),
                Transform::Rotate(v) => ("rotate", v),
                Transform::Translate(v) => ("translate", v),
            };
            writeln!(out, "{pad}{keyword} {}", vec3(v))?;
        }
        if self.no_shadow {
            writeln!(out, "{pad}no_shadow")?;
        }
        Ok(())
    }
}

fn write_primitive(primitive: &Primitive, out: &mut impl Write, depth: usize, pad: &str) -> fmt::Result {
    let inner = "\t".repeat(depth + 1);
    match primitive {
        Primitive::Cylinder { base, cap, radius } => {
            writeln!(out, "{pad}cylinder {{")?;
            writeln!(out, "{inner}{}, {}, {}", vec3(base), vec3(cap), num(*radius))?;
        }
        Primitive::Box { corner1, corner2 } => {
            writeln!(out, "{pad}box {{")?;
            writeln!(out, "{inner}{}, {}", vec3(corner1), vec3(corner2))?;
        }
        Primitive::Prism { height1, height2, points } => {
            writeln!(out, "{pad}prism {{")?;
            writeln!(out, "{inner}linear_sweep")?;
            writeln!(out, "{inner}linear_spline")?;
            let closed = points.len() + usize::from(!points.is_empty());
            writeln!(out, "{inner}{}, {}, {}", num(*height1), num(*height2), closed)?;
            let outline: Vec<String> = points
                .iter()
                .chain(points.first())
                .map(|p| format!("<{}, {}>", num(p[0]), num(p[1])))
                .collect();
            writeln!(out, "{inner}{}", outline.join(", "))?;
        }
        Primitive::Torus { major, minor } => {
            writeln!(out, "{pad}torus {{")?;
            writeln!(out, "{inner}{}, {}", num(*major), num(*minor))?;
        }
        Primitive::Sphere { center, radius } => {
            writeln!(out, "{pad}sphere {{")?;
            writeln!(out, "{inner}{}, {}", vec3(center), num(*radius))?;
        }
        Primitive::Mesh2(mesh) => {
            writeln!(out, "{pad}mesh2 {{")?;
            mesh.write_body(out, depth + 1)?;
        }
    }
    Ok(())
}

fn write_texture(texture: &Texture, out: &mut impl Write, depth: usize) -> fmt::Result {
    let pad = "\t".repeat(depth);
    let inner = "\t".repeat(depth + 1);
    writeln!(out, "{pad}pigment {{ color rgbft {} }}", texture.color)?;
    if !texture.finish.is_empty() {
        writeln!(out, "{pad}finish {{")?;
        for statement in &texture.finish {
            writeln!(out, "{inner}{statement}")?;
        }
        writeln!(out, "{pad}}}")?;
    }
    if let Some(ior) = texture.ior {
        writeln!(out, "{pad}interior {{ ior {} }}", num(ior))?;
    }
    if let Some(raw) = &texture.raw {
        writeln!(out, "{pad}{raw}")?;
    }
    Ok(())
}

/// Top-level scene statements
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Comment(String),
    Declare(String, Node),
    Node(Node),
}

/// Ordered list of top-level statements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub items: Vec<Item>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comment(&mut self, text: impl Into<String>) {
        self.items.push(Item::Comment(text.into()));
    }

    pub fn declare(&mut self, name: impl Into<String>, node: Node) {
        self.items.push(Item::Declare(name.into(), node));
    }

    pub fn push(&mut self, node: Node) {
        self.items.push(Item::Node(node));
    }

    pub fn extend(&mut self, other: Scene) {
        self.items.extend(other.items);
    }

    pub fn to_pov(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            match item {
                Item::Comment(text) => writeln!(f, "// {text}")?,
                Item::Declare(name, node) => {
                    if let Some(comment) = &node.comment {
                        writeln!(f, "// {comment}")?;
                    }
                    node.write_block(f, 0, &format!("#declare {name} = "))?;
                }
                Item::Node(node) => node.write(f, 0)?,
            }
            f.write_char('\n')?;
        }
        Ok(())
    }
}

/// Shortest fixed-point rendering with at most six decimals
pub fn num(v: f64) -> String {
    let s = format!("{v:.6}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    match s {
        "-0" | "" => "0".to_string(),
        s => s.to_string(),
    }
}

pub fn vec3(v: &Vector3<f64>) -> String {
    format!("<{}, {}, {}>", num(v.x), num(v.y), num(v.z))
}
