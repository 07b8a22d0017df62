//! pov-export: POV-Ray scenes for periodic photonic devices
//!
//! This crate provides:
//! - Typed device records loaded from JSON document stores
//! - Unit-cell geometry (layers, silos, coatings, substrate) as POV-Ray CSG
//! - Isosurfaces of simulated fields as coloured `mesh2` objects
//! - Camera placement, header and `.ini` generation, renderer invocation
//!
//! Device scenes have the top of the stack at `z = 0` and grow downward;
//! isosurface scenes use field grid coordinates with the grid corner at
//! the origin.

pub mod camera;
pub mod clip;
pub mod device;
pub mod dims;
pub mod error;
pub mod field;
pub mod finish;
pub mod gif;
pub mod isosurface;
pub mod render;
pub mod scene;
pub mod shapes;
pub mod store;

pub use camera::{guess_camera, write_header_and_camera, CameraPlacement, CameraStyle, HeaderConfig};
pub use clip::SliceSpec;
pub use device::{Device, Feature, Lattice, Layer, Shape};
pub use dims::DeviceDims;
pub use error::Error;
pub use field::{load_field_array, process_field_array, ProcessedField, Quantity};
pub use finish::{Finish, Rgbft};
pub use gif::{assemble_gif, GifConfig};
pub use isosurface::{create_mesh2, IsosurfaceConfig};
pub use render::{render_pov, write_pov_file, ImageFormat, RenderOptions};
pub use scene::{Node, Scene};
pub use shapes::{create_device, isosurface_unit_cell, DeviceConfig, UnitCellConfig};
pub use store::DeviceStore;

use anyhow::Result;
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Main entry point for devices: header, camera and replicated geometry
pub fn device_scene(device: &Device, config: &DeviceSceneConfig) -> Result<String> {
    let built = create_device(device, &config.device);
    info!(
        "Device {} spans {:.3} x {:.3} x {:.3}",
        device.id, built.dims.x, built.dims.y, built.dims.z
    );
    let header = write_header_and_camera(built.dims, built.coating_dims, &config.header)?;
    Ok(header + &built.scene.to_pov())
}

/// Main entry point for fields: isosurfaces of `field`, optionally clipped,
/// with an optional unit cell drawn over them.
pub fn isosurface_scene(
    field: &Array3<f64>,
    cutoffs: &[f64],
    device: Option<&Device>,
    config: &IsosurfaceSceneConfig,
) -> Result<String> {
    let (nx, ny, nz) = field.dim();
    let n = [nx, ny, nz];
    let meshes = create_mesh2(field, cutoffs, &config.isosurface)?;

    let mut scene = Scene::new();
    match meshes.node {
        Some(node) => {
            let node = match &config.slice {
                Some(slice) => slice.apply(node, n)?,
                None => node,
            };
            scene.push(node);
        }
        None => warn!("Every isosurface was empty"),
    }
    if let Some(device) = device {
        scene.extend(isosurface_unit_cell(device, n, &config.unit_cell)?);
    }

    let grid = DeviceDims::new(nx as f64, ny as f64, nz as f64);
    let header = write_header_and_camera(grid, DeviceDims::ZERO, &config.header)?;
    Ok(header + &scene.to_pov())
}

/// Everything needed to write and render a device scene
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSceneConfig {
    pub device: DeviceConfig,
    pub header: HeaderConfig,
    pub render: RenderOptions,
}

/// Everything needed to write and render an isosurface scene
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsosurfaceSceneConfig {
    pub isosurface: IsosurfaceConfig,
    /// Region clipped from the isosurfaces
    pub slice: Option<SliceSpec>,
    pub unit_cell: UnitCellConfig,
    pub header: HeaderConfig,
    pub render: RenderOptions,
}

impl Default for IsosurfaceSceneConfig {
    fn default() -> Self {
        Self {
            isosurface: IsosurfaceConfig::default(),
            slice: None,
            unit_cell: UnitCellConfig::default(),
            header: HeaderConfig {
                camera_rotate: 35.0,
                isosurface: true,
                ..Default::default()
            },
            render: RenderOptions::default(),
        }
    }
}
