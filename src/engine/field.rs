// Ambient field: the triangulated probe SH evaluated anywhere on the ground.
//
// A probe mesh is the GPU's lookup texture during rendering. During a bake
// the same field is evaluated on the CPU so indirect bounces can read back
// the light gathered by the previous bounce.
//
// The environment light is itself packed like probe coefficients:
//   rgb = ambient sky radiance SH, modulated by each probe's occlusion
//   w   = band 0 gain applied to each probe's bounce channel

use glam::{Vec2, Vec3, Vec4};
use std::f32::consts::PI;

use super::camera::Camera;
use super::cubemap::{RadianceSource, SurfaceHit};
use super::error::GeometryError;
use super::mesh::ProbeMesh;
use super::sh::{self, ShCoefficients, ShColor9, F0, INV_F0, SH_COEFF_COUNT};

/// Which terms of the ambient field are lit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbientToggles {
    /// Sky light through each probe's occlusion.
    pub ambient: bool,
    /// Light bounced off nearby surfaces.
    pub indirect: bool,
}

impl Default for AmbientToggles {
    fn default() -> Self {
        Self { ambient: true, indirect: true }
    }
}

/// Uniform white sky, no bounce term.
pub fn white_sky_environment() -> ShCoefficients {
    let mut env = [Vec4::ZERO; SH_COEFF_COUNT];
    env[0] = Vec4::new(INV_F0, INV_F0, INV_F0, 0.0);
    env
}

/// No sky, bounce term at unit gain.
pub fn bounce_only_environment() -> ShCoefficients {
    let mut env = [Vec4::ZERO; SH_COEFF_COUNT];
    env[0] = Vec4::new(0.0, 0.0, 0.0, INV_F0);
    env
}

// ============================================================================
// FIELD
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct AmbientField<'m> {
    mesh: &'m ProbeMesh,
    environment: ShCoefficients,
    toggles: AmbientToggles,
}

impl<'m> AmbientField<'m> {
    pub fn new(mesh: &'m ProbeMesh, environment: ShCoefficients, toggles: AmbientToggles) -> Self {
        Self { mesh, environment, toggles }
    }

    /// Interpolated probe coefficients; zero outside the mesh.
    pub fn coefficients(&self, ground: Vec2) -> ShCoefficients {
        self.mesh.sample(ground).unwrap_or([Vec4::ZERO; SH_COEFF_COUNT])
    }

    /// RGB radiance SH arriving at a world position.
    pub fn radiance(&self, position: Vec3) -> ShColor9 {
        let c = self.coefficients(Vec2::new(position.x, position.z));
        let mut out = [Vec3::ZERO; SH_COEFF_COUNT];

        if self.toggles.ambient {
            let sky = sh::bounce_channel(&self.environment);
            let lit = sh::product_first_order(&sky, &sh::occlusion_channel(&c));
            for (o, l) in out.iter_mut().zip(lit) {
                *o += l;
            }
        }
        if self.toggles.indirect {
            let gain = self.environment[0].w * F0 as f32;
            for (o, b) in out.iter_mut().zip(sh::bounce_channel(&c)) {
                *o += b * gain;
            }
        }
        out
    }

    /// Cosine-weighted irradiance at a world position around `normal`.
    pub fn irradiance(&self, position: Vec3, normal: Vec3) -> Vec3 {
        sh::irradiance(&self.radiance(position), normal)
    }
}

/// Diffuse surfaces lit by an ambient field:
///   L = boost · albedo / π · E(normal)
#[derive(Debug, Clone, Copy)]
pub struct LambertRadiance<'m> {
    pub field: AmbientField<'m>,
    pub boost: f32,
}

impl RadianceSource for LambertRadiance<'_> {
    fn radiance(&self, hit: &SurfaceHit) -> Vec3 {
        let e = self.field.irradiance(hit.position, hit.normal.normalize_or_zero());
        self.boost * hit.albedo * e / PI
    }
}

// ============================================================================
// AMBIENT MAP PASS
// ============================================================================

/// Uniform block of the ambient map pass. 176 bytes, std140-compatible.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AmbientMapUniforms {
    /// Ground position mapped to texture (0, 0).
    pub offset: [f32; 2],
    /// World-to-texture scale on X/Z.
    pub scale: [f32; 2],
    /// (size, 1 / size) of the lookup texture.
    pub map_size: [f32; 2],
    pub enable_ambient: u32,
    pub enable_indirect: u32,
    /// Additive sky SH.
    pub sky_sh: [[f32; 4]; SH_COEFF_COUNT],
}

impl AmbientMapUniforms {
    /// Uniforms covering the ground footprint of `camera`'s frustum.
    pub fn for_camera(
        camera: &Camera,
        map_size: u32,
        toggles: AmbientToggles,
        sky_sh: &ShCoefficients,
    ) -> Result<Self, GeometryError> {
        let (min, max) = ground_footprint(&camera.frustum_corners());
        let extent = max - min;
        if !(extent.x > 0.0 && extent.y > 0.0) || !extent.is_finite() {
            return Err(GeometryError::DegenerateFootprint(format!(
                "frustum footprint {min} .. {max} has no area"
            )));
        }
        if map_size == 0 {
            return Err(GeometryError::DegenerateFootprint("ambient map size is zero".into()));
        }
        let size = map_size as f32;
        Ok(Self {
            offset: min.to_array(),
            scale: extent.recip().to_array(),
            map_size: [size, 1.0 / size],
            enable_ambient: toggles.ambient as u32,
            enable_indirect: toggles.indirect as u32,
            sky_sh: sky_sh.map(|c| c.to_array()),
        })
    }

    /// Texture coordinate of a ground position.
    pub fn uv(&self, ground: Vec2) -> Vec2 {
        (ground - Vec2::from_array(self.offset)) * Vec2::from_array(self.scale)
    }
}

/// X/Z bounding box of a set of world points.
pub fn ground_footprint(points: &[Vec3]) -> (Vec2, Vec2) {
    points.iter().fold(
        (Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)),
        |(min, max), p| {
            let g = Vec2::new(p.x, p.z);
            (min.min(g), max.max(g))
        },
    )
}

/// Rendering backend that rasterizes the probe mesh into the ambient map.
pub trait AmbientMapTarget {
    fn draw_ambient_map(&mut self, mesh: &ProbeMesh, uniforms: &AmbientMapUniforms);
}
