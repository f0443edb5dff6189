//! Homogeneous transforms from Metashape's textual matrix format.
//!
//! Metashape stores the chunk transform as three text fields: a row-major
//! rotation (9 numbers), a translation (3 numbers) and a uniform scale. Each
//! number is separated by whitespace.

use nalgebra::{Matrix3, Matrix4, Point3, RowVector4, Vector3};

use serde::Serialize;

use crate::{MetashapeMvgError, Result};

/// Allowed absolute deviation of a rotation's determinant from 1.
///
/// Absolute only, with no relative component.
pub const ROTATION_DET_TOLERANCE: f64 = 1e-8;

/// Allowed Frobenius norm of `RᵀR - I` for the rotation block of a camera
/// transform once its scale is divided out.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-6;

/// Scale used when a transform has no explicit scale.
pub const DEFAULT_SCALE_TEXT: &str = "1";

/// Parse exactly `N` whitespace-separated real numbers.
fn parse_reals<const N: usize>(field: &str, text: &str) -> Result<[f64; N]> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() != N {
        return Err(MetashapeMvgError::malformed(
            field,
            format!("expected {N} numbers, found {}", tokens.len()),
        ));
    }
    let mut result = [0.0; N];
    for (el, token) in result.iter_mut().zip(tokens) {
        *el = token
            .parse::<f64>()
            .map_err(|e| MetashapeMvgError::malformed(field, format!("{token:?}: {e}")))?;
    }
    Ok(result)
}

fn check_determinant(m: &Matrix3<f64>) -> Result<()> {
    let determinant = m.determinant();
    // NaN fails the comparison, so test for acceptance.
    if !((determinant - 1.0).abs() <= ROTATION_DET_TOLERANCE) {
        return Err(MetashapeMvgError::InvalidRotation { determinant });
    }
    Ok(())
}

/// A proper rotation: a 3x3 matrix with determinant 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RotationMatrix(Matrix3<f64>);

impl RotationMatrix {
    /// Parse nine row-major numbers and check the determinant.
    pub fn from_row_major_text(text: &str) -> Result<Self> {
        let vals: [f64; 9] = parse_reals("rotation", text)?;
        Self::new(Matrix3::from_row_slice(&vals))
    }

    pub fn new(m: Matrix3<f64>) -> Result<Self> {
        check_determinant(&m)?;
        Ok(Self(m))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }
}

/// A 4x4 transform made of a rotation scaled uniformly and a translation.
///
/// The bottom row is always exactly `[0, 0, 0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HomogeneousTransform {
    matrix: Matrix4<f64>,
    scale: f64,
}

impl HomogeneousTransform {
    pub fn new(rotation: &RotationMatrix, translation: Vector3<f64>, scale: f64) -> Self {
        let mut matrix = Matrix4::identity();
        matrix
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(rotation.matrix() * scale));
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
        Self { matrix, scale }
    }

    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
            scale: 1.0,
        }
    }

    /// Parse a 4x4 matrix written as 16 row-major numbers.
    ///
    /// This is the format Metashape uses for per-camera transforms. The upper
    /// left block may carry a uniform positive scale, which is factored out
    /// before checking the rotation. What remains must be orthonormal.
    pub fn from_row_major_text(text: &str) -> Result<Self> {
        let vals: [f64; 16] = parse_reals("transform", text)?;
        let matrix = Matrix4::from_row_slice(&vals);
        if matrix.row(3) != RowVector4::new(0.0, 0.0, 0.0, 1.0) {
            return Err(MetashapeMvgError::malformed(
                "transform",
                "bottom row is not [0 0 0 1]",
            ));
        }
        let block: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let scale = block.determinant().cbrt();
        if scale <= 0.0 || !scale.is_finite() {
            return Err(MetashapeMvgError::InvalidRotation {
                determinant: block.determinant(),
            });
        }
        let unscaled = block / scale;
        let deviation = (unscaled.transpose() * unscaled - Matrix3::identity()).norm();
        if !(deviation <= ORTHONORMAL_TOLERANCE) {
            return Err(MetashapeMvgError::NonOrthonormalRotation { deviation });
        }
        let rotation = RotationMatrix::new(unscaled)?;
        let translation = matrix.fixed_view::<3, 1>(0, 3).into_owned();
        Ok(Self::new(&rotation, translation, scale))
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.matrix.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// The upper left block with the scale divided out.
    pub fn rotation(&self) -> Matrix3<f64> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned() / self.scale
    }

    pub fn transform_point(&self, pt: &Point3<f64>) -> Point3<f64> {
        let block = self.matrix.fixed_view::<3, 3>(0, 0);
        Point3::from(block * pt.coords + self.translation())
    }

    /// `self * other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &HomogeneousTransform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
            scale: self.scale * other.scale,
        }
    }
}

/// Build the 4x4 transform from Metashape's rotation, translation and scale
/// text fields.
///
/// All three fields are parsed before the rotation is checked to be proper.
/// Scale multiplies only the rotation block, never the translation.
pub fn build_transform(
    rotation_text: &str,
    translation_text: &str,
    scale_text: &str,
) -> Result<HomogeneousTransform> {
    let rot: [f64; 9] = parse_reals("rotation", rotation_text)?;
    let [tx, ty, tz]: [f64; 3] = parse_reals("translation", translation_text)?;
    let [scale]: [f64; 1] = parse_reals("scale", scale_text)?;
    let rotation = RotationMatrix::new(Matrix3::from_row_slice(&rot))?;
    Ok(HomogeneousTransform::new(
        &rotation,
        Vector3::new(tx, ty, tz),
        scale,
    ))
}
