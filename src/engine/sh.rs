// Fixed band-2 real spherical harmonics (9 terms).
//
// Sign convention and term order follow the probe file format:
//   Y0 = f0
//   Y1 = -f1 x    Y2 = f1 y    Y3 = -f1 z
//   Y4 = f2 xz    Y5 = -f2 xy  Y6 = f3 (3y² - 1)
//   Y7 = -f2 zy   Y8 = f2/2 (z² - x²)
// with f0 = 1/(2√π), f1 = √3 f0, f2 = √15 f0, f3 = f2 / (2√3).

use glam::{DVec3, Vec3, Vec4};
use std::f32::consts::PI;

// ============================================================================
// CONSTANTS
// ============================================================================

pub const SH_COEFF_COUNT: usize = 9;

pub const F0: f64 = 0.282_094_791_773_878_14;
pub const F1: f64 = 0.488_602_511_902_919_87;
pub const F2: f64 = 1.092_548_430_592_079_2;
pub const F3: f64 = 0.315_391_565_252_520_05;

/// 1 / f0 = 2√π. A band-0 coefficient of this value evaluates to 1 everywhere.
pub const INV_F0: f32 = 3.544_907_7;

/// Band index of each coefficient.
pub const BAND_OF: [usize; SH_COEFF_COUNT] = [0, 1, 1, 1, 2, 2, 2, 2, 2];

/// Clamped-cosine convolution factors per band (π, 2π/3, π/4).
pub const COSINE_LOBE: [f32; 3] = [PI, 2.0 * PI / 3.0, PI / 4.0];

/// Monochrome SH vector (direct-occlusion channel).
pub type ShScalar9 = [f32; SH_COEFF_COUNT];
/// RGB SH vector (indirect-bounce channel).
pub type ShColor9 = [Vec3; SH_COEFF_COUNT];
/// Packed probe coefficients: xyz = indirect bounce, w = direct occlusion.
pub type ShCoefficients = [Vec4; SH_COEFF_COUNT];

// ============================================================================
// BASIS
// ============================================================================

/// Evaluate the 9 basis terms for a unit direction, in double precision.
#[inline]
pub fn basis(d: DVec3) -> [f64; SH_COEFF_COUNT] {
    [
        F0,
        -F1 * d.x,
        F1 * d.y,
        -F1 * d.z,
        F2 * d.x * d.z,
        -F2 * d.x * d.y,
        F3 * (3.0 * d.y * d.y - 1.0),
        -F2 * d.z * d.y,
        F2 * 0.5 * (d.z * d.z - d.x * d.x),
    ]
}

/// Single-precision convenience wrapper around [`basis`].
#[inline]
pub fn basis_f32(d: Vec3) -> ShScalar9 {
    basis(d.as_dvec3()).map(|y| y as f32)
}

/// Reconstruct a monochrome SH function in a direction.
pub fn evaluate(coeffs: &ShScalar9, direction: Vec3) -> f32 {
    let y = basis_f32(direction);
    coeffs.iter().zip(y.iter()).map(|(c, y)| c * y).sum()
}

/// Reconstruct an RGB SH function in a direction.
pub fn evaluate_color(coeffs: &ShColor9, direction: Vec3) -> Vec3 {
    let y = basis_f32(direction);
    coeffs.iter().zip(y.iter()).map(|(c, y)| *c * *y).sum()
}

/// Irradiance around `normal` from an RGB radiance SH (clamped-cosine convolution).
pub fn irradiance(radiance: &ShColor9, normal: Vec3) -> Vec3 {
    let y = basis_f32(normal);
    let mut e = Vec3::ZERO;
    for k in 0..SH_COEFF_COUNT {
        e += radiance[k] * (COSINE_LOBE[BAND_OF[k]] * y[k]);
    }
    e.max(Vec3::ZERO)
}

/// SH projection of a clamped cosine lobe centred on `direction`.
pub fn cosine_lobe(direction: Vec3) -> ShScalar9 {
    let y = basis_f32(direction.normalize_or_zero());
    let mut out = [0.0; SH_COEFF_COUNT];
    for k in 0..SH_COEFF_COUNT {
        out[k] = COSINE_LOBE[BAND_OF[k]] * y[k];
    }
    out
}

// ============================================================================
// CHANNEL HELPERS
// ============================================================================

/// First-order SH product of an RGB function with a monochrome one:
///   (a·b)_0 = f0 a0 b0,   (a·b)_k = f0 (a0 b_k + a_k b0)
/// Exact when either factor is constant.
pub fn product_first_order(a: &ShColor9, b: &ShScalar9) -> ShColor9 {
    let f0 = F0 as f32;
    let mut out = [Vec3::ZERO; SH_COEFF_COUNT];
    out[0] = a[0] * b[0] * f0;
    for k in 1..SH_COEFF_COUNT {
        out[k] = (a[0] * b[k] + a[k] * b[0]) * f0;
    }
    out
}

/// Direct-occlusion channel (w) of packed coefficients.
pub fn occlusion_channel(coeffs: &ShCoefficients) -> ShScalar9 {
    coeffs.map(|c| c.w)
}

/// Indirect-bounce channel (xyz) of packed coefficients.
pub fn bounce_channel(coeffs: &ShCoefficients) -> ShColor9 {
    coeffs.map(|c| c.truncate())
}

/// Mirror a bounce vector through the origin: odd band 1 flips sign.
pub fn reflect(coeffs: &ShColor9) -> ShColor9 {
    let mut out = *coeffs;
    for c in &mut out[1..4] {
        *c = -*c;
    }
    out
}
