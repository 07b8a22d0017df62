//! Colours, named finishes and material textures

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// RGB colour with filter and transmit channels.
///
/// Serialized as a 3 to 5 element array; missing channels are 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Rgbft {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub filter: f64,
    pub transmit: f64,
}

impl Rgbft {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    /// #00aaaa, used when a custom palette is empty
    pub const FALLBACK: Self = Self::rgb(0.0, 0.667, 0.667);

    pub const fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b, filter: 0.0, transmit: 0.0 }
    }

    pub const fn new(r: f64, g: f64, b: f64, filter: f64, transmit: f64) -> Self {
        Self { r, g, b, filter, transmit }
    }

    pub fn grey(level: f64, transmit: f64) -> Self {
        Self::new(level, level, level, 0.0, transmit)
    }
}

impl TryFrom<Vec<f64>> for Rgbft {
    type Error = String;

    fn try_from(v: Vec<f64>) -> Result<Self, Self::Error> {
        if !(3..=5).contains(&v.len()) {
            return Err(format!("colour needs 3 to 5 components, got {}", v.len()));
        }
        let at = |i: usize| v.get(i).copied().unwrap_or(0.0);
        Ok(Self::new(at(0), at(1), at(2), at(3), at(4)))
    }
}

impl From<Rgbft> for Vec<f64> {
    fn from(c: Rgbft) -> Self {
        vec![c.r, c.g, c.b, c.filter, c.transmit]
    }
}

/// Named surface finishes
#[derive(Debug, Clone, PartialEq)]
pub enum Finish {
    /// Resolve by the feature's material name
    Material,
    Silicon,
    SiO2,
    Translucent,
    Glass,
    DullMetal,
    BrightMetal,
    Irid,
    Billiard,
    /// No finish block
    Dull,
    /// Literal finish markup
    Custom(String),
}

impl Finish {
    /// Select a finish by name; `custom` uses the supplied markup and
    /// anything unrecognised falls back to [`Finish::Dull`].
    pub fn select(name: &str, custom: &str) -> Self {
        match name {
            "material" => Finish::Material,
            "custom" => Finish::Custom(custom.to_string()),
            other => Self::named(other),
        }
    }

    fn named(name: &str) -> Self {
        match name {
            "Si" | "silicon" => Finish::Silicon,
            "SiO2" => Finish::SiO2,
            "translucent" => Finish::Translucent,
            "glass" => Finish::Glass,
            "dull_metal" => Finish::DullMetal,
            "bright_metal" => Finish::BrightMetal,
            "irid" => Finish::Irid,
            "billiard" => Finish::Billiard,
            _ => Finish::Dull,
        }
    }

    /// Replace [`Finish::Material`] with the finish named after `material`
    pub fn resolve(&self, material: &str) -> Finish {
        match self {
            Finish::Material => Self::named(material),
            other => other.clone(),
        }
    }

    /// Forced `(filter, transmit)` for see-through finishes
    pub fn channel_override(&self) -> Option<(f64, f64)> {
        match self {
            Finish::SiO2 => Some((0.0, 0.98)),
            Finish::Translucent => Some((0.02, 0.5)),
            Finish::Glass => Some((0.0, 0.95)),
            Finish::Irid => Some((0.0, 0.7)),
            _ => None,
        }
    }

    fn statements(&self) -> &'static [&'static str] {
        match self {
            Finish::Silicon => &[
                "diffuse 0.2",
                "brilliance 5",
                "phong 1",
                "phong_size 250",
                "roughness 0.01",
                "reflection <0.10, 0.10, 0.5> metallic",
                "metallic",
            ],
            Finish::SiO2 => &[
                "specular 0.6",
                "brilliance 5",
                "roughness 0.001",
                "reflection { 0.0, 1.0 fresnel on }",
            ],
            Finish::Translucent => &[
                "emission 0.25",
                "diffuse 0.75",
                "specular 0.4",
                "brilliance 4",
                "reflection { 0.5 fresnel on }",
            ],
            Finish::Glass => &[
                "specular 0.6",
                "phong 0.8",
                "brilliance 5",
                "reflection { 0.2, 1.0 fresnel on }",
            ],
            Finish::DullMetal => &[
                "emission 0.1",
                "diffuse 0.1",
                "specular 1.0",
                "roughness 0.001",
                "reflection 0.5 metallic",
                "metallic",
            ],
            Finish::BrightMetal => &[
                "emission 0.2",
                "diffuse 0.3",
                "specular 0.8",
                "roughness 0.01",
                "reflection 0.5 metallic",
                "metallic",
            ],
            Finish::Irid => &[
                "phong 0.5",
                "reflection { 0.2 metallic }",
                "diffuse 0.3",
                "irid { 0.75 thickness 0.5 turbulence 0.5 }",
            ],
            Finish::Billiard => &[
                "ambient 0.3",
                "diffuse 0.8",
                "specular 0.2",
                "roughness 0.005",
                "metallic 0.5",
            ],
            Finish::Material | Finish::Dull | Finish::Custom(_) => &[],
        }
    }

    /// Index of refraction of the interior, `ior` only applies to translucent
    fn interior_ior(&self, ior: f64) -> Option<f64> {
        match self {
            Finish::Silicon => Some(4.24),
            Finish::SiO2 => Some(1.45),
            Finish::Translucent => Some(ior),
            Finish::Glass | Finish::Irid => Some(1.5),
            _ => None,
        }
    }
}

/// Pigment, finish and interior attached to a scene node
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub color: Rgbft,
    pub finish: Vec<String>,
    pub ior: Option<f64>,
    /// Raw markup appended verbatim (custom finishes)
    pub raw: Option<String>,
}

impl Texture {
    pub fn plain(color: Rgbft) -> Self {
        Self { color, finish: Vec::new(), ior: None, raw: None }
    }

    /// Build the texture for `material` painted `color` with `finish`.
    ///
    /// See-through finishes force the filter and transmit channels.
    pub fn new(material: &str, mut color: Rgbft, finish: &Finish, ior: f64) -> Self {
        let finish = finish.resolve(material);
        if let Some((filter, transmit)) = finish.channel_override() {
            warn!("{:?} finish overrides filter/transmit of {}", finish, material);
            color.filter = filter;
            color.transmit = transmit;
        }
        Self {
            color,
            finish: finish.statements().iter().map(|s| s.to_string()).collect(),
            ior: finish.interior_ior(ior),
            raw: match finish {
                Finish::Custom(markup) if !markup.is_empty() => Some(markup),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Rgbft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}, {}, {}, {}, {}>",
            crate::scene::num(self.r),
            crate::scene::num(self.g),
            crate::scene::num(self.b),
            crate::scene::num(self.filter),
            crate::scene::num(self.transmit)
        )
    }
}

/// Where feature colours come from
#[derive(Debug, Clone, PartialEq)]
pub enum ColorScheme {
    /// Look colours up by material name
    Material(BTreeMap<String, Rgbft>),
    /// Cycle through a palette, one colour per feature
    Palette(Vec<Rgbft>),
}

impl ColorScheme {
    /// Device defaults: substrate, silicon and oxide
    pub fn device_defaults() -> Self {
        ColorScheme::Material(BTreeMap::from([
            ("subst".to_string(), Rgbft::new(0.15, 0.15, 0.15, 0.0, 0.0)),
            ("Si".to_string(), Rgbft::new(0.2, 0.2, 0.2, 0.0, 0.0)),
            ("SiO2".to_string(), Rgbft::new(0.99, 0.99, 0.96, 0.0, 0.1)),
        ]))
    }

    /// Uniform grey for unit cells drawn over field isosurfaces
    pub fn isosurface_defaults(transmit: f64) -> Self {
        let grey = Rgbft::grey(0.25, transmit);
        ColorScheme::Material(
            ["subst", "Si", "SiO2"]
                .into_iter()
                .map(|m| (m.to_string(), grey))
                .collect(),
        )
    }
}

/// Hands out feature colours in build order
#[derive(Debug, Clone)]
pub struct Painter {
    scheme: ColorScheme,
    next: usize,
}

impl Painter {
    pub fn new(scheme: ColorScheme) -> Self {
        Self { scheme, next: 0 }
    }

    /// Colour for the next feature made of `material`
    pub fn next_color(&mut self, material: &str) -> Rgbft {
        match &self.scheme {
            ColorScheme::Material(table) => table.get(material).copied().unwrap_or_else(|| {
                warn!("No default colour for material {}, using #00aaaa", material);
                Rgbft::FALLBACK
            }),
            ColorScheme::Palette(colors) => {
                let color = if colors.is_empty() {
                    Rgbft::FALLBACK
                } else {
                    colors[self.next % colors.len()]
                };
                self.next += 1;
                color
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgbft_from_three_components() {
        let c: Rgbft = serde_json::from_str("[0.1, 0.2, 0.3]").unwrap();
        assert_eq!(c, Rgbft::new(0.1, 0.2, 0.3, 0.0, 0.0));
        assert!(serde_json::from_str::<Rgbft>("[0.1, 0.2]").is_err());
    }

    #[test]
    fn test_material_finish_resolves_by_name() {
        let finish = Finish::select("material", "");
        assert_eq!(finish.resolve("SiO2"), Finish::SiO2);
        assert_eq!(finish.resolve("subst"), Finish::Dull);
    }

    #[test]
    fn test_see_through_finish_overrides_channels() {
        let tex = Texture::new("SiO2", Rgbft::rgb(1.0, 1.0, 1.0), &Finish::Glass, 1.0);
        assert_eq!(tex.color.filter, 0.0);
        assert_eq!(tex.color.transmit, 0.95);
        assert_eq!(tex.ior, Some(1.5));

        let tex = Texture::new("bg", Rgbft::rgb(1.0, 0.0, 0.0), &Finish::Translucent, 1.33);
        assert_eq!((tex.color.filter, tex.color.transmit), (0.02, 0.5));
        assert_eq!(tex.ior, Some(1.33));
    }

    #[test]
    fn test_opaque_finish_keeps_channels() {
        let color = Rgbft::new(0.2, 0.2, 0.2, 0.1, 0.3);
        let tex = Texture::new("Si", color, &Finish::Billiard, 1.0);
        assert_eq!(tex.color, color);
        assert!(tex.ior.is_none());
        assert!(tex.finish.contains(&"metallic 0.5".to_string()));
    }

    #[test]
    fn test_custom_finish_is_raw() {
        let finish = Finish::select("custom", "finish { ambient 1 }");
        let tex = Texture::new("Si", Rgbft::BLACK, &finish, 1.0);
        assert!(tex.finish.is_empty());
        assert_eq!(tex.raw.as_deref(), Some("finish { ambient 1 }"));
    }

    #[test]
    fn test_palette_cycles() {
        let mut painter = Painter::new(ColorScheme::Palette(vec![
            Rgbft::rgb(1.0, 0.0, 0.0),
            Rgbft::rgb(0.0, 1.0, 0.0),
        ]));
        let picks: Vec<f64> = (0..3).map(|_| painter.next_color("Si").r).collect();
        assert_eq!(picks, vec![1.0, 0.0, 1.0]);
    }
}
