//! Scene files, render settings and the renderer invocation

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::camera::DEFAULT_INCLUDES;
use crate::error::Result;

const INI_TEMPLATE: &str = r#"; POV-Ray version 3.7 INI file
; Generated by device-to-pov for {{ pov }} on {{ timestamp }}

+I{{ pov }}
+O{{ image }}
+H{{ height }}
+W{{ width }}
{{ "+D" if display else "-D" }}
{% if transparent %}
+UA
{% endif %}
{% if antialias %}
+A
{% endif %}
{% if threads %}
+WT{{ threads }}
{% endif %}
{% if format %}
+F{{ format }}
{% endif %}
{% if quality is not none %}
+Q{{ quality }}
{% endif %}
"#;

/// Renderer output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Bmp,
    Rle,
    Exr,
    Hdr,
    Jpeg,
    Ppm,
    Targa,
}

impl ImageFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "bmp" => Some(ImageFormat::Bmp),
            "rle" => Some(ImageFormat::Rle),
            "exr" => Some(ImageFormat::Exr),
            "hdr" => Some(ImageFormat::Hdr),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "ppm" => Some(ImageFormat::Ppm),
            "tga" | "targa" => Some(ImageFormat::Targa),
            _ => None,
        }
    }

    /// Format for an image file name and the name to render to.
    ///
    /// Unsupported or missing extensions fall back to PNG with `.png`
    /// appended.
    pub fn from_file_name(name: &str) -> (Self, String) {
        let ext = Path::new(name).extension().and_then(|e| e.to_str());
        match ext.and_then(Self::from_extension) {
            Some(format) => (format, name.to_string()),
            None => {
                warn!("Image format of {} is not supported, using .png", name);
                (ImageFormat::Png, format!("{name}.png"))
            }
        }
    }

    /// Letter passed to the renderer's `+F` option
    pub fn flag(self) -> char {
        match self {
            ImageFormat::Png => 'N',
            ImageFormat::Bmp => 'B',
            ImageFormat::Rle => 'C',
            ImageFormat::Exr => 'E',
            ImageFormat::Hdr => 'H',
            ImageFormat::Jpeg => 'J',
            ImageFormat::Ppm => 'P',
            ImageFormat::Targa => 'T',
        }
    }
}

/// Render settings written to the `.ini` file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub height: u32,
    pub width: u32,
    /// Show the image while it renders
    pub display: bool,
    /// Transparent background (alpha channel)
    pub transparent: bool,
    pub antialias: bool,
    /// Render threads, 0 lets the renderer decide
    pub num_threads: u32,
    /// Open the image in `viewer` after a successful render
    pub open_image: bool,
    /// Run the renderer; otherwise only write files and log the command
    pub render: bool,
    /// 0 to 11, 9 is the renderer default
    pub render_quality: u8,
    pub renderer: String,
    pub viewer: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            height: 800,
            width: 800,
            display: false,
            transparent: true,
            antialias: true,
            num_threads: 0,
            open_image: true,
            render: true,
            render_quality: 9,
            renderer: "povray".to_string(),
            viewer: "eog".to_string(),
        }
    }
}

/// Quality written to the `.ini`, if any; out-of-range values reset to 9
fn quality_flag(quality: u8) -> Option<u8> {
    match quality {
        9 => None,
        q if q <= 11 => Some(q),
        q => {
            warn!("Render quality {} is outside 0..=11, using 9", q);
            Some(9)
        }
    }
}

/// `.ini` text rendering `pov` to `image`
pub fn ini_text(pov: &str, image: &str, format: ImageFormat, options: &RenderOptions) -> Result<String> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.add_template("ini", INI_TEMPLATE)?;
    let template = env.get_template("ini")?;

    let text = template.render(context! {
        timestamp => chrono::Utc::now().to_rfc3339(),
        pov => pov,
        image => image,
        height => options.height,
        width => options.width,
        display => options.display,
        transparent => options.transparent,
        antialias => options.antialias,
        threads => options.num_threads,
        format => (format != ImageFormat::Png).then(|| format.flag().to_string()),
        quality => quality_flag(options.render_quality),
    })?;
    Ok(text)
}

/// What [`render_pov`] wrote and ran
#[derive(Debug, Clone, PartialEq)]
pub struct RenderInvocation {
    pub ini_path: PathBuf,
    pub image: String,
    /// Shell equivalent of the commands run
    pub command: String,
    /// Whether the renderer ran and exited successfully
    pub rendered: bool,
    /// Process id of the image viewer, if one was started
    pub viewer_pid: Option<u32>,
}

/// Write the `.ini` next to `pov_path` and run the renderer when
/// `options.render` is set. The command line is always logged.
///
/// The renderer is waited on. The viewer is started and left running
/// without being waited on.
pub fn render_pov(pov_path: &Path, image_name: &str, options: &RenderOptions) -> Result<RenderInvocation> {
    let (format, image) = ImageFormat::from_file_name(image_name);
    let ini_path = pov_path.with_extension("ini");
    let ini = ini_text(&pov_path.to_string_lossy(), &image, format, options)?;
    fs::write(&ini_path, ini)?;

    let mut command = format!("{} {}", options.renderer, ini_path.display());
    if options.open_image {
        command.push_str(&format!(" && {} {}", options.viewer, image));
    }
    info!("Render with: {}", command);
    info!("See the POV-Ray reference on file output and tracing options for more settings");

    let mut rendered = false;
    let mut viewer_pid = None;
    if options.render {
        let status = Command::new(&options.renderer).arg(&ini_path).status()?;
        rendered = status.success();
        if !rendered {
            warn!("{} exited with {}", options.renderer, status);
        } else if options.open_image {
            viewer_pid = Some(open_viewer(&options.viewer, Path::new(&image))?);
        }
    }

    Ok(RenderInvocation { ini_path, image, command, rendered, viewer_pid })
}

/// Start `viewer` on `file` and return its pid; the child is detached,
/// never waited on.
pub(crate) fn open_viewer(viewer: &str, file: &Path) -> Result<u32> {
    let child = Command::new(viewer).arg(file).spawn()?;
    let pid = child.id();
    info!("Opened {} in {} (pid {})", file.display(), viewer, pid);
    Ok(pid)
}

/// True when `text` has `keyword {Word}` with only letters and spaces
/// between the braces, the form include-file identifiers take.
fn references_include(text: &str, keyword: &str) -> bool {
    let opener = format!("{keyword} {{");
    text.match_indices(&opener).any(|(at, _)| {
        let rest = &text[at + opener.len()..];
        let word_len = rest
            .find(|c: char| !(c.is_ascii_alphabetic() || c == ' '))
            .unwrap_or(rest.len());
        word_len > 0 && rest[word_len..].starts_with('}')
    })
}

/// Insert the default `#include` lines before the camera when the scene
/// uses include-file identifiers without including anything.
pub fn add_missing_includes(text: &str) -> Option<String> {
    let uses_includes = references_include(text, "finish") || references_include(text, "pigment");
    if !uses_includes || text.lines().any(|l| l.starts_with("#include")) {
        return None;
    }
    warn!("Scene uses include-file identifiers without #include, adding the defaults");

    let includes: String = DEFAULT_INCLUDES.iter().map(|f| format!("#include \"{f}\"\n")).collect();
    let at = text
        .match_indices('\n')
        .map(|(i, _)| i + 1)
        .find(|&i| text[i..].starts_with("camera"))
        .or_else(|| text.starts_with("camera").then_some(0))
        .unwrap_or(0);

    let mut fixed = String::with_capacity(text.len() + includes.len());
    fixed.push_str(&text[..at]);
    fixed.push_str(&includes);
    fixed.push_str(&text[at..]);
    Some(fixed)
}

/// Write a complete scene, adding missing default includes. Returns
/// whether includes were added.
pub fn write_pov_file(path: &Path, scene: &str) -> Result<bool> {
    match add_missing_includes(scene) {
        Some(fixed) => {
            fs::write(path, fixed)?;
            Ok(true)
        }
        None => {
            fs::write(path, scene)?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_image_format_inference() {
        assert_eq!(ImageFormat::from_file_name("a.png"), (ImageFormat::Png, "a.png".to_string()));
        assert_eq!(ImageFormat::from_file_name("a.JPEG").0, ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_file_name("out/a.tga").0.flag(), 'T');
        assert_eq!(ImageFormat::from_file_name("a.gif"), (ImageFormat::Png, "a.gif.png".to_string()));
        assert_eq!(ImageFormat::from_file_name("noext"), (ImageFormat::Png, "noext.png".to_string()));
    }

    #[test]
    fn test_default_ini() {
        let ini = ini_text("scene.pov", "scene.png", ImageFormat::Png, &RenderOptions::default()).unwrap();
        let body: Vec<&str> = ini.lines().skip(3).collect();
        assert_eq!(body, vec!["+Iscene.pov", "+Oscene.png", "+H800", "+W800", "-D", "+UA", "+A"]);
        assert!(ini.starts_with("; POV-Ray version 3.7 INI file\n"));
    }

    #[test]
    fn test_ini_options() {
        let options = RenderOptions {
            height: 300,
            width: 400,
            display: true,
            transparent: false,
            antialias: false,
            num_threads: 3,
            render_quality: 4,
            ..Default::default()
        };
        let ini = ini_text("a.pov", "a.jpg", ImageFormat::Jpeg, &options).unwrap();
        let body: Vec<&str> = ini.lines().skip(3).collect();
        assert_eq!(body, vec!["+Ia.pov", "+Oa.jpg", "+H300", "+W400", "+D", "+WT3", "+FJ", "+Q4"]);
    }

    #[test]
    fn test_invalid_quality_resets() {
        assert_eq!(quality_flag(9), None);
        assert_eq!(quality_flag(0), Some(0));
        assert_eq!(quality_flag(42), Some(9));
    }

    #[test]
    fn test_include_detection() {
        assert!(references_include("texture { finish {Shiny} }", "finish"));
        assert!(references_include("pigment { Red }", "pigment"));
        assert!(!references_include("pigment { color rgbft <1, 0, 0, 0, 0> }", "pigment"));
        assert!(!references_include("finish {\n\tdiffuse 0.2\n}", "finish"));
    }

    #[test]
    fn test_includes_inserted_before_camera() {
        let scene = "#version 3.7;\n\ncamera {\n}\nsphere { 0, 1 finish { Shiny } }\n";
        let fixed = add_missing_includes(scene).unwrap();
        assert!(fixed.starts_with("#version 3.7;\n\n#include \"colors.inc\"\n"));
        assert!(fixed.contains("#include \"metals.inc\"\ncamera {"));

        let included = format!("#include \"finish.inc\"\n{scene}");
        assert_eq!(add_missing_includes(&included), None);
    }

    #[test]
    fn test_render_without_running() {
        let dir = tempfile::tempdir().unwrap();
        let pov = dir.path().join("device.pov");
        write_pov_file(&pov, "#version 3.7;\n").unwrap();
        let options = RenderOptions { render: false, ..Default::default() };
        let run = render_pov(&pov, "device.bmp", &options).unwrap();

        assert!(!run.rendered);
        assert!(run.viewer_pid.is_none());
        assert_eq!(run.ini_path, dir.path().join("device.ini"));
        assert!(run.command.starts_with("povray "));
        assert!(run.command.ends_with(" && eog device.bmp"));
        let ini = fs::read_to_string(&run.ini_path).unwrap();
        assert!(ini.contains("+FB\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_render_starts_viewer() {
        let dir = tempfile::tempdir().unwrap();
        let pov = dir.path().join("device.pov");
        write_pov_file(&pov, "#version 3.7;\n").unwrap();
        let options = RenderOptions {
            renderer: "true".to_string(),
            viewer: "true".to_string(),
            ..Default::default()
        };
        let run = render_pov(&pov, "device.png", &options).unwrap();
        assert!(run.rendered);
        assert!(run.viewer_pid.is_some_and(|pid| pid > 0));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_render_skips_viewer() {
        let dir = tempfile::tempdir().unwrap();
        let pov = dir.path().join("device.pov");
        write_pov_file(&pov, "#version 3.7;\n").unwrap();
        let options = RenderOptions {
            renderer: "false".to_string(),
            viewer: "true".to_string(),
            ..Default::default()
        };
        let run = render_pov(&pov, "device.png", &options).unwrap();
        assert!(!run.rendered);
        assert!(run.viewer_pid.is_none());
    }
}
