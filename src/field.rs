//! Loading simulated fields and reducing them to scalar grids.
//!
//! Field arrays arrive indexed `[z, y, x, E/H, component]`; after
//! [`process_field_array`] they are indexed `[x, y, z, E/H, component]`
//! with the top of the stack at the highest z.

use std::path::Path;
use std::str::FromStr;

use ndarray::{Array, Array3, Array4, Array5, ArrayD, Axis, Ix5, RemoveAxis};
use ndarray_npy::read_npy;
use num_complex::Complex64;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Which half of the field array to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Electric,
    Magnetic,
}

impl FieldKind {
    fn index(self) -> usize {
        match self {
            FieldKind::Electric => 0,
            FieldKind::Magnetic => 1,
        }
    }
}

/// Scalar quantity meshed into isosurfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    /// |E|
    Electric,
    /// |H|
    Magnetic,
    /// Energy density with a uniform permittivity
    Energy,
    /// Magnitude of one component of E or H
    Component(FieldKind, usize),
}

impl FromStr for Quantity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let unknown = || Error::Quantity(s.to_string());
        match s.to_lowercase().as_str() {
            "e" | "emag" => Ok(Quantity::Electric),
            "h" | "hmag" => Ok(Quantity::Magnetic),
            "energy" => Ok(Quantity::Energy),
            name => {
                let mut chars = name.chars();
                let kind = match chars.next() {
                    Some('e') => FieldKind::Electric,
                    Some('h') => FieldKind::Magnetic,
                    _ => return Err(unknown()),
                };
                let axis = match (chars.next(), chars.next()) {
                    (Some('x'), None) => 0,
                    (Some('y'), None) => 1,
                    (Some('z'), None) => 2,
                    _ => return Err(unknown()),
                };
                Ok(Quantity::Component(kind, axis))
            }
        }
    }
}

impl Quantity {
    /// Reduce a processed field to this quantity; `eps` is only used for
    /// the energy density.
    pub fn reduce(self, field: &ProcessedField, eps: f64) -> Result<Array3<f64>> {
        match self {
            Quantity::Electric => Ok(field_magnitude(&extract_e_field(&field.field).field)),
            Quantity::Magnetic => Ok(field_magnitude(&extract_h_field(&field.field).field)),
            Quantity::Energy => {
                let e = extract_e_field(&field.field);
                let h = extract_h_field(&field.field);
                let eps = Array3::from_elem(field.grid(), eps);
                energy_density(&e.field, &h.field, &eps)
            }
            Quantity::Component(kind, i) => extract_field(&field.field, kind)
                .components
                .into_iter()
                .nth(i)
                .ok_or_else(|| Error::Quantity(format!("{kind:?} component {i}"))),
        }
    }
}

/// Field array reoriented for meshing, plus its grid size
#[derive(Debug, Clone)]
pub struct ProcessedField {
    pub field: Array5<Complex64>,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl ProcessedField {
    pub fn grid(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }
}

/// A complex vector field `[x, y, z, component]` and the magnitude of
/// each component
#[derive(Debug, Clone)]
pub struct VectorField {
    pub field: Array4<Complex64>,
    pub components: [Array3<f64>; 3],
}

/// Read a field from `.npy`, complex128 or float64.
///
/// A 6-D file holds a stack of simulations; `sim_index` picks one.
pub fn load_field_array(path: impl AsRef<Path>, sim_index: usize) -> Result<ArrayD<Complex64>> {
    let path = path.as_ref();
    let array = match read_npy::<_, ArrayD<Complex64>>(path) {
        Ok(array) => array,
        Err(complex_err) => {
            debug!("{} is not complex128 ({}), trying float64", path.display(), complex_err);
            match read_npy::<_, ArrayD<f64>>(path) {
                Ok(real) => real.mapv(|re| Complex64::new(re, 0.0)),
                Err(_) => return Err(complex_err.into()),
            }
        }
    };
    info!("Loaded {} with shape {:?}", path.display(), array.shape());

    match array.ndim() {
        6 => {
            let count = array.len_of(Axis(0));
            if sim_index >= count {
                return Err(Error::SimulationIndex { index: sim_index, count });
            }
            Ok(array.index_axis_move(Axis(0), sim_index))
        }
        _ => {
            if sim_index != 0 {
                warn!("{} holds a single simulation, ignoring index {}", path.display(), sim_index);
            }
            Ok(array)
        }
    }
}

/// Reorient a `[z, y, x, E/H, component]` array to `[x, y, z, ...]` with
/// z flipped so the top of the device ends up on top. With `center` the
/// lateral axes are rolled by half their length.
pub fn process_field_array(array: ArrayD<Complex64>, center: bool) -> Result<ProcessedField> {
    if array.ndim() != 5 {
        return Err(Error::FieldRank(array.ndim()));
    }
    let mut field = array.into_dimensionality::<Ix5>()?;
    field.invert_axis(Axis(0));
    field.swap_axes(0, 2);
    let (nx, ny, nz, _, _) = field.dim();

    let field = if center {
        double_roll(&field, nx / 2, ny / 2)?
    } else {
        field.as_standard_layout().into_owned()
    };
    Ok(ProcessedField { field, nx, ny, nz })
}

/// Shift elements `shift` places along `axis`, wrapping around the end.
pub fn roll<A: Clone, D: RemoveAxis>(array: &Array<A, D>, shift: usize, axis: Axis) -> Result<Array<A, D>> {
    let len = array.len_of(axis);
    if len == 0 {
        return Ok(array.clone());
    }
    let (head, tail) = array.view().split_at(axis, len - shift % len);
    Ok(ndarray::concatenate(axis, &[tail, head])?)
}

/// Roll along the first two axes
pub fn double_roll<A: Clone, D: RemoveAxis>(array: &Array<A, D>, n0: usize, n1: usize) -> Result<Array<A, D>> {
    roll(&roll(array, n0, Axis(0))?, n1, Axis(1))
}

fn extract_field(field: &Array5<Complex64>, kind: FieldKind) -> VectorField {
    let vector = field.index_axis(Axis(3), kind.index()).to_owned();
    let components = extract_components(&vector);
    VectorField { field: vector, components }
}

pub fn extract_e_field(field: &Array5<Complex64>) -> VectorField {
    extract_field(field, FieldKind::Electric)
}

pub fn extract_h_field(field: &Array5<Complex64>) -> VectorField {
    extract_field(field, FieldKind::Magnetic)
}

/// Absolute value of each vector component
pub fn extract_components(field: &Array4<Complex64>) -> [Array3<f64>; 3] {
    [0, 1, 2].map(|i| field.index_axis(Axis(3), i).mapv(|c| c.norm()))
}

/// Real part of each vector component
pub fn extract_real_components(field: &Array4<Complex64>) -> [Array3<f64>; 3] {
    [0, 1, 2].map(|i| field.index_axis(Axis(3), i).mapv(|c| c.re))
}

/// `sqrt(sum(re(v * conj(v))))` over the component axis
pub fn field_magnitude(field: &Array4<Complex64>) -> Array3<f64> {
    field.map_axis(Axis(3), |v| v.iter().map(|c| (c * c.conj()).re).sum::<f64>().sqrt())
}

/// Local energy density `0.5 * (|E| / eps + |H|)`
pub fn energy_density(e: &Array4<Complex64>, h: &Array4<Complex64>, eps: &Array3<f64>) -> Result<Array3<f64>> {
    let e_mag = field_magnitude(e);
    let h_mag = field_magnitude(h);
    if e_mag.shape() != h_mag.shape() || e_mag.shape() != eps.shape() {
        return Err(ndarray::ShapeError::from_kind(ndarray::ErrorKind::IncompatibleShape).into());
    }
    Ok(0.5 * (e_mag / eps + h_mag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array1};
    use ndarray_npy::write_npy;

    /// `[z, y, x, kind, component]` array whose real part encodes its index
    fn indexed(nz: usize, ny: usize, nx: usize) -> ArrayD<Complex64> {
        Array5::from_shape_fn((nz, ny, nx, 2, 3), |(z, y, x, k, c)| {
            Complex64::new((z * 10000 + y * 1000 + x * 100 + k * 10 + c) as f64, 0.0)
        })
        .into_dyn()
    }

    #[test]
    fn test_roll_wraps() {
        let a: Array1<i32> = arr1(&[1, 2, 3, 4, 5]);
        assert_eq!(roll(&a, 2, Axis(0)).unwrap(), arr1(&[4, 5, 1, 2, 3]));
        assert_eq!(roll(&a, 5, Axis(0)).unwrap(), a);
        assert_eq!(roll(&a, 0, Axis(0)).unwrap(), a);
    }

    #[test]
    fn test_process_rejects_wrong_rank() {
        let flat = ArrayD::<Complex64>::zeros(vec![2, 2, 2]);
        assert!(matches!(process_field_array(flat, true), Err(Error::FieldRank(3))));
    }

    #[test]
    fn test_process_reorients_axes() {
        let processed = process_field_array(indexed(2, 3, 4), false).unwrap();
        assert_eq!(processed.grid(), [4, 3, 2]);
        // x=1, y=2, z=0 comes from source z=1 (flipped), y=2, x=1
        let v = processed.field[[1, 2, 0, 1, 2]].re;
        assert_eq!(v, 10000.0 + 2000.0 + 100.0 + 10.0 + 2.0);
    }

    #[test]
    fn test_process_centers_lateral_axes() {
        let plain = process_field_array(indexed(2, 3, 4), false).unwrap();
        let centered = process_field_array(indexed(2, 3, 4), true).unwrap();
        // Rolled by nx/2 = 2 and ny/2 = 1
        assert_eq!(centered.field[[2, 1, 0, 0, 0]], plain.field[[0, 0, 0, 0, 0]]);
        assert_eq!(centered.field[[0, 0, 1, 1, 1]], plain.field[[2, 2, 1, 1, 1]]);
    }

    #[test]
    fn test_magnitude_and_components() {
        let mut field = Array4::<Complex64>::zeros((1, 1, 1, 3));
        field[[0, 0, 0, 0]] = Complex64::new(3.0, 0.0);
        field[[0, 0, 0, 1]] = Complex64::new(0.0, 4.0);
        let mag = field_magnitude(&field);
        assert!((mag[[0, 0, 0]] - 5.0).abs() < 1e-10);

        let [x, y, z] = extract_components(&field);
        assert!((x[[0, 0, 0]] - 3.0).abs() < 1e-10);
        assert!((y[[0, 0, 0]] - 4.0).abs() < 1e-10);
        assert_eq!(z[[0, 0, 0]], 0.0);
        let [_, y_re, _] = extract_real_components(&field);
        assert_eq!(y_re[[0, 0, 0]], 0.0);
    }

    #[test]
    fn test_energy_density() {
        let e = Array4::from_elem((2, 1, 1, 3), Complex64::new(2.0, 0.0));
        let h = Array4::from_elem((2, 1, 1, 3), Complex64::new(0.0, 1.0));
        let eps = Array3::from_elem((2, 1, 1), 4.0);
        let u = energy_density(&e, &h, &eps).unwrap();
        let expected = 0.5 * ((12.0f64).sqrt() / 4.0 + (3.0f64).sqrt());
        assert!(u.iter().all(|v| (v - expected).abs() < 1e-10));

        let bad_eps = Array3::from_elem((1, 1, 1), 1.0);
        assert!(matches!(energy_density(&e, &h, &bad_eps), Err(Error::Shape(_))));
    }

    #[test]
    fn test_extract_kinds() {
        let processed = process_field_array(indexed(1, 1, 1), false).unwrap();
        let e = extract_e_field(&processed.field);
        let h = extract_h_field(&processed.field);
        assert_eq!(e.field[[0, 0, 0, 2]].re, 2.0);
        assert_eq!(h.field[[0, 0, 0, 2]].re, 12.0);
        assert_eq!(h.components[0][[0, 0, 0]], 10.0);
    }

    #[test]
    fn test_load_stack_selects_simulation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fields.npy");
        let stack = ndarray::Array6::from_shape_fn((3, 1, 1, 1, 2, 3), |(s, _, _, _, k, c)| {
            Complex64::new(s as f64, (k * 3 + c) as f64)
        });
        write_npy(&path, &stack).unwrap();

        let sim = load_field_array(&path, 2).unwrap();
        assert_eq!(sim.shape(), &[1, 1, 1, 2, 3]);
        assert_eq!(sim[[0, 0, 0, 1, 0]], Complex64::new(2.0, 3.0));

        assert!(matches!(
            load_field_array(&path, 3),
            Err(Error::SimulationIndex { index: 3, count: 3 })
        ));
    }

    #[test]
    fn test_quantity_names() {
        assert_eq!("E".parse::<Quantity>().unwrap(), Quantity::Electric);
        assert_eq!("energy".parse::<Quantity>().unwrap(), Quantity::Energy);
        assert_eq!("hz".parse::<Quantity>().unwrap(), Quantity::Component(FieldKind::Magnetic, 2));
        assert!(matches!("ew".parse::<Quantity>(), Err(Error::Quantity(_))));
    }

    #[test]
    fn test_reduce_component() {
        let processed = process_field_array(indexed(1, 2, 2), false).unwrap();
        let ey = Quantity::Component(FieldKind::Electric, 1).reduce(&processed, 1.0).unwrap();
        assert_eq!(ey.dim(), (2, 2, 1));
        assert_eq!(ey[[1, 0, 0]], 101.0);

        let missing = Quantity::Component(FieldKind::Magnetic, 3).reduce(&processed, 1.0);
        assert!(matches!(missing, Err(Error::Quantity(name)) if name == "Magnetic component 3"));
    }

    #[test]
    fn test_load_real_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("real.npy");
        write_npy(&path, &Array5::<f64>::from_elem((1, 1, 2, 2, 3), 1.5)).unwrap();
        let field = load_field_array(&path, 0).unwrap();
        assert_eq!(field.ndim(), 5);
        assert!(field.iter().all(|c| *c == Complex64::new(1.5, 0.0)));
    }
}
