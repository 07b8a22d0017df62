//! Named colormaps for isosurface colouring

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    Viridis,
    Plasma,
    Inferno,
    Magma,
    Cividis,
    Turbo,
    Hot,
    Gray,
}

impl Colormap {
    /// RGB in `[0, 1]` at position `t`, clamped to `[0, 1]`
    pub fn sample(self, t: f64) -> [f64; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let gradient = match self {
            Colormap::Viridis => colorous::VIRIDIS,
            Colormap::Plasma => colorous::PLASMA,
            Colormap::Inferno => colorous::INFERNO,
            Colormap::Magma => colorous::MAGMA,
            Colormap::Cividis => colorous::CIVIDIS,
            Colormap::Turbo => colorous::TURBO,
            Colormap::Hot => return hot(t),
            Colormap::Gray => return [t, t, t],
        };
        let c = gradient.eval_continuous(t);
        [c.r as f64 / 255.0, c.g as f64 / 255.0, c.b as f64 / 255.0]
    }
}

/// Black, red, yellow, white ramp
fn hot(t: f64) -> [f64; 3] {
    const RED_FULL: f64 = 0.365079;
    const GREEN_FULL: f64 = 0.746032;
    let r = 0.0416 + (1.0 - 0.0416) * (t / RED_FULL).min(1.0);
    let g = ((t - RED_FULL) / (GREEN_FULL - RED_FULL)).clamp(0.0, 1.0);
    let b = ((t - GREEN_FULL) / (1.0 - GREEN_FULL)).clamp(0.0, 1.0);
    [r, g, b]
}

impl FromStr for Colormap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "viridis" => Ok(Colormap::Viridis),
            "plasma" => Ok(Colormap::Plasma),
            "inferno" => Ok(Colormap::Inferno),
            "magma" => Ok(Colormap::Magma),
            "cividis" => Ok(Colormap::Cividis),
            "turbo" => Ok(Colormap::Turbo),
            "hot" => Ok(Colormap::Hot),
            "gray" | "grey" => Ok(Colormap::Gray),
            _ => Err(Error::Colormap(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("Hot".parse::<Colormap>().unwrap(), Colormap::Hot);
        assert_eq!("grey".parse::<Colormap>().unwrap(), Colormap::Gray);
        assert!(matches!("jet".parse::<Colormap>(), Err(Error::Colormap(_))));
    }

    #[test]
    fn test_hot_endpoints() {
        let lo = Colormap::Hot.sample(0.0);
        assert!((lo[0] - 0.0416).abs() < 1e-10);
        assert_eq!(&lo[1..], &[0.0, 0.0]);
        let hi = Colormap::Hot.sample(1.0);
        assert!(hi.iter().all(|c| (c - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_viridis_is_dark_to_bright() {
        let lo = Colormap::Viridis.sample(0.0);
        let hi = Colormap::Viridis.sample(1.0);
        assert!(lo.iter().sum::<f64>() < hi.iter().sum::<f64>());
        assert!(hi.iter().all(|c| (0.0..=1.0).contains(c)));
    }

    #[test]
    fn test_sample_clamps() {
        assert_eq!(Colormap::Gray.sample(2.0), [1.0, 1.0, 1.0]);
        assert_eq!(Colormap::Gray.sample(-1.0), [0.0, 0.0, 0.0]);
    }
}
