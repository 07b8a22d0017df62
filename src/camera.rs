//! Camera placement heuristics and the scene header

use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dims::DeviceDims;
use crate::error::Result;
use crate::scene::num;

const HEADER_TEMPLATE: &str = r#"#version 3.7;
// Generated by device-to-pov on {{ timestamp }}
global_settings { assumed_gamma 1.0 }

{% if includes %}
{% for file in includes %}
#include "{{ file }}"
{% endfor %}

{% endif %}
{% if background %}
background { color rgb {{ background }} }

{% endif %}
camera {
	{{ style }}
{% if angle %}
	angle {{ angle }}
{% endif %}
	location {{ location }}
	look_at {{ look_at }}
	up {{ up }}
	right {{ right }}
	sky {{ sky }}
}

light_source {
	{{ light }}
	color rgb <1.0,1.0,1.0>
{% if shadowless %}
	shadowless
{% endif %}
}

"#;

/// Include files added when a scene uses their identifiers
pub const DEFAULT_INCLUDES: [&str; 4] = ["colors.inc", "finish.inc", "glass.inc", "metals.inc"];

/// Field of view used by orthographic cameras when none is given
const ORTHOGRAPHIC_ANGLE: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraStyle {
    Perspective,
    Orthographic,
    /// Any other renderer camera; placement is not tuned for it
    Other(String),
}

impl CameraStyle {
    pub fn parse(name: &str) -> Self {
        match name {
            "" | "perspective" => CameraStyle::Perspective,
            "orthographic" => CameraStyle::Orthographic,
            other => CameraStyle::Other(other.to_string()),
        }
    }

    pub fn keyword(&self) -> &str {
        match self {
            CameraStyle::Perspective => "perspective",
            CameraStyle::Orthographic => "orthographic",
            CameraStyle::Other(name) => name,
        }
    }
}

/// Camera location, look-at point and light position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPlacement {
    pub location: [f64; 3],
    pub look_at: [f64; 3],
    pub light: [f64; 3],
}

/// Place camera and light around a device or an isosurface grid.
///
/// `rotate_deg` turns the camera about the z axis; 0 looks at the side of
/// the device along the x axis. Device scenes have their top at `z = 0`
/// and are centred on the origin; isosurface grids sit on `z = 0` with a
/// corner at the origin, so `center` is replaced by the grid centre.
pub fn guess_camera(
    dims: DeviceDims,
    coating: DeviceDims,
    style: &CameraStyle,
    rotate_deg: f64,
    center: [f64; 2],
    isosurface: bool,
) -> CameraPlacement {
    if let CameraStyle::Other(name) = style {
        warn!("Camera placement is not tuned for {} cameras", name);
    }
    let x_offset = 1.2;
    let z_scale = 1.0;
    let rotate = rotate_deg.to_radians();

    let mut camera_offset = x_offset * (dims.max_component() + 0.8 * coating.max_component());
    let light_offset = camera_offset * 1.25;

    let mut dims = dims;
    let mut center = center;
    let z_look_at = if isosurface {
        dims.z *= 1.75;
        center = [0.5 * dims.x, 0.5 * dims.y];
        camera_offset *= 0.75;
        0.25
    } else {
        -0.66
    };

    let location = [
        (camera_offset + dims.x + center[0]) * rotate.cos(),
        (camera_offset + dims.x + center[1]) * rotate.sin(),
        z_scale * (dims.z + 0.5 * coating.z),
    ];
    let look_at = [center[0], center[1], z_look_at * dims.z + 0.5 * coating.z];

    let light_angle = rotate - 12f64.to_radians();
    let mut light = [
        (dims.x + light_offset) * light_angle.cos(),
        (dims.y + light_offset) * light_angle.sin(),
        location[2] + light_offset / 3.0,
    ];
    if isosurface {
        light[0] = light[0].max(light[1]);
        light[1] = light[0];
    }

    debug!("Camera at {:?} looking at {:?}, light at {:?}", location, look_at, light);
    CameraPlacement { location, look_at, light }
}

/// Header, camera and light settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    /// perspective, orthographic or another renderer camera keyword
    pub camera_style: String,
    /// Camera rotation about the z axis, degrees
    pub camera_rotate: f64,
    /// Field of view in degrees; 0 omits it (orthographic uses 60)
    pub viewing_angle: f64,
    pub camera_loc: Option<[f64; 3]>,
    pub look_at: Option<[f64; 3]>,
    pub light_loc: Option<[f64; 3]>,
    pub up_dir: [f64; 3],
    pub right_dir: [f64; 3],
    pub sky: [f64; 3],
    /// Background colour; none keeps the background transparent
    pub bg_color: Option<[f64; 3]>,
    pub shadowless: bool,
    /// Place the camera for an isosurface grid instead of a device
    pub isosurface: bool,
    pub use_include_files: bool,
    /// Listing anything but the defaults turns includes on
    pub include_files: Vec<String>,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            camera_style: "perspective".to_string(),
            camera_rotate: 60.0,
            viewing_angle: 0.0,
            camera_loc: None,
            look_at: None,
            light_loc: None,
            up_dir: [0.0, 0.0, 1.0],
            right_dir: [0.0, -1.0, 0.0],
            sky: [0.0, 0.0, 1.33],
            bg_color: None,
            shadowless: false,
            isosurface: false,
            use_include_files: false,
            include_files: DEFAULT_INCLUDES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl HeaderConfig {
    /// Camera placement from the explicit settings, guessing everything
    /// when any of them is missing.
    ///
    /// A missing look-at point alone is filled in directly, assuming a
    /// device centred on the origin.
    pub fn placement(&self, dims: DeviceDims, coating: DeviceDims) -> CameraPlacement {
        let look_at = self.look_at.or_else(|| {
            (self.camera_loc.is_some() && self.light_loc.is_some())
                .then(|| [0.0, 0.0, -0.66 * dims.z + 0.5 * coating.z])
        });
        match (self.camera_loc, look_at, self.light_loc) {
            (Some(location), Some(look_at), Some(light)) => CameraPlacement { location, look_at, light },
            _ => guess_camera(
                dims,
                coating,
                &CameraStyle::parse(&self.camera_style),
                self.camera_rotate,
                [0.0, 0.0],
                self.isosurface,
            ),
        }
    }

    fn includes(&self) -> Vec<&str> {
        let custom = self.include_files.iter().map(String::as_str).ne(DEFAULT_INCLUDES);
        if self.use_include_files || custom {
            self.include_files.iter().map(String::as_str).collect()
        } else {
            Vec::new()
        }
    }
}

fn vec_text(v: [f64; 3]) -> String {
    format!("<{}, {}, {}>", num(v[0]), num(v[1]), num(v[2]))
}

/// Render the `#version` header, optional includes and background, the
/// camera and the light source.
pub fn write_header_and_camera(dims: DeviceDims, coating: DeviceDims, config: &HeaderConfig) -> Result<String> {
    let placement = config.placement(dims, coating);
    let style = CameraStyle::parse(&config.camera_style);
    let angle = match (&style, config.viewing_angle) {
        (CameraStyle::Orthographic, a) if a == 0.0 => Some(ORTHOGRAPHIC_ANGLE),
        (_, a) if a != 0.0 => Some(a),
        _ => None,
    };

    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.add_template("header", HEADER_TEMPLATE)?;
    let template = env.get_template("header")?;

    let header = template.render(context! {
        timestamp => chrono::Utc::now().to_rfc3339(),
        includes => config.includes(),
        background => config.bg_color.map(|c| format!("<{}, {}, {}>", num(c[0]), num(c[1]), num(c[2]))),
        style => style.keyword(),
        angle => angle.map(num),
        location => vec_text(placement.location),
        look_at => vec_text(placement.look_at),
        up => vec_text(config.up_dir),
        right => vec_text(config.right_dir),
        sky => vec_text(config.sky),
        light => vec_text(placement.light),
        shadowless => config.shadowless,
    })?;

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> DeviceDims {
        DeviceDims::new(1.0, 1.0, 1.0)
    }

    #[test]
    fn test_guess_camera_side_view() {
        let p = guess_camera(unit(), DeviceDims::ZERO, &CameraStyle::Perspective, 0.0, [0.0, 0.0], false);
        assert!((p.location[0] - 2.2).abs() < 1e-10);
        assert!(p.location[1].abs() < 1e-10);
        assert!((p.location[2] - 1.0).abs() < 1e-10);
        assert_eq!(p.look_at, [0.0, 0.0, -0.66]);

        let light_angle = (-12f64).to_radians();
        assert!((p.light[0] - 2.5 * light_angle.cos()).abs() < 1e-10);
        assert!((p.light[1] - 2.5 * light_angle.sin()).abs() < 1e-10);
        assert!((p.light[2] - 1.5).abs() < 1e-10);
    }

    #[test]
    fn test_guess_camera_isosurface() {
        let dims = DeviceDims::new(20.0, 20.0, 40.0);
        let p = guess_camera(dims, DeviceDims::ZERO, &CameraStyle::Perspective, 35.0, [5.0, 5.0], true);
        assert_eq!(p.look_at, [10.0, 10.0, 0.25 * 70.0]);
        assert!((p.location[2] - 70.0).abs() < 1e-10);
        let offset = 0.75 * 1.2 * 40.0;
        assert!((p.location[0] - (offset + 30.0) * 35f64.to_radians().cos()).abs() < 1e-10);
        assert_eq!(p.light[0], p.light[1]);
    }

    #[test]
    fn test_coating_raises_camera() {
        let coating = DeviceDims::new(0.0, 0.0, 2.0);
        let p = guess_camera(unit(), coating, &CameraStyle::Perspective, 0.0, [0.0, 0.0], false);
        assert!((p.location[2] - 2.0).abs() < 1e-10);
        assert!((p.look_at[2] - 0.34).abs() < 1e-10);
    }

    #[test]
    fn test_default_header() {
        let header = write_header_and_camera(unit(), DeviceDims::ZERO, &HeaderConfig::default()).unwrap();
        assert!(header.starts_with("#version 3.7;\n"));
        assert!(header.contains("global_settings { assumed_gamma 1.0 }\n"));
        assert!(header.contains("camera {\n\tperspective\n\tlocation <"));
        assert!(header.contains("\tup <0, 0, 1>\n\tright <0, -1, 0>\n\tsky <0, 0, 1.33>\n}"));
        assert!(header.contains("\tcolor rgb <1.0,1.0,1.0>\n}"));
        assert!(!header.contains("#include"));
        assert!(!header.contains("background"));
        assert!(!header.contains("angle"));
        assert!(!header.contains("shadowless"));
    }

    #[test]
    fn test_orthographic_default_angle() {
        let config = HeaderConfig {
            camera_style: "orthographic".to_string(),
            ..Default::default()
        };
        let header = write_header_and_camera(unit(), DeviceDims::ZERO, &config).unwrap();
        assert!(header.contains("\torthographic\n\tangle 60\n"));
    }

    #[test]
    fn test_custom_includes_and_background() {
        let config = HeaderConfig {
            include_files: vec!["textures.inc".to_string()],
            bg_color: Some([1.0, 1.0, 1.0]),
            shadowless: true,
            ..Default::default()
        };
        let header = write_header_and_camera(unit(), DeviceDims::ZERO, &config).unwrap();
        assert!(header.contains("#include \"textures.inc\"\n\n"));
        assert!(header.contains("background { color rgb <1, 1, 1> }"));
        assert!(header.contains("\tshadowless\n}"));
    }

    #[test]
    fn test_explicit_placement_fills_look_at() {
        let config = HeaderConfig {
            camera_loc: Some([5.0, 0.0, 2.0]),
            light_loc: Some([6.0, 1.0, 3.0]),
            ..Default::default()
        };
        let p = config.placement(DeviceDims::new(1.0, 1.0, 2.0), DeviceDims::ZERO);
        assert_eq!(p.location, [5.0, 0.0, 2.0]);
        assert_eq!(p.light, [6.0, 1.0, 3.0]);
        assert!((p.look_at[2] + 1.32).abs() < 1e-10);
    }
}
