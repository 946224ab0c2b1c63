// Cube-map capture and SH projection.
//
// A probe sees its surroundings through six 90° faces rendered by an
// external renderer. Each face pixel carries (albedo, world normal, hit
// distance); a distance at the renderer's "infinity" means the ray escaped.
//
//   direct occlusion:  Σ_escaped   dω · Y_k(dir)
//   indirect bounce:   Σ_hit       dω · Y_k(dir) · L_out(hit)
//
// Pixel (x, y) samples the face-local direction
//   ((2x+1)/R - 1, 1 - (2y+1)/R, 1)
// with solid angle dω = (4/R²) / |d|³.

use glam::{DMat3, DVec3, Mat3, Vec3};
use log::debug;
use std::fmt;

use super::camera::Camera;
use super::error::{ProbeError, Result};
use super::sh::{self, ShColor9, ShScalar9, SH_COEFF_COUNT};

/// Fraction of the renderer's infinity above which a ray counts as escaped.
pub const ESCAPE_THRESHOLD: f32 = 0.99;

// ============================================================================
// FACES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl CubeFace {
    /// Render and read-back order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Rotation from face-local space (+Z through the face center) into
    /// probe space.
    pub fn side_rotation(self) -> Mat3 {
        use std::f32::consts::{FRAC_PI_2, PI};
        match self {
            CubeFace::PosX => Mat3::from_rotation_y(FRAC_PI_2),
            CubeFace::NegX => Mat3::from_rotation_y(-FRAC_PI_2),
            CubeFace::PosY => Mat3::from_rotation_x(-FRAC_PI_2),
            CubeFace::NegY => Mat3::from_rotation_x(FRAC_PI_2),
            CubeFace::PosZ => Mat3::IDENTITY,
            CubeFace::NegZ => Mat3::from_rotation_y(PI),
        }
    }
}

/// One read-back pixel of a cube face.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CubeFaceSample {
    pub albedo: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

// ============================================================================
// EXTERNAL RENDERER
// ============================================================================

/// Off-screen renderer producing probe cube maps.
///
/// Call sequence per bake:
///   begin_render
///   { begin_render_cube_map, render_cube_map_face ×6, end_render_cube_map,
///     { begin_read_cube_map_face, read_pixel ×R², end_read_cube_map_face } ×6 }*
///   end_render
pub trait CubeMapRenderer {
    fn begin_render(&mut self, face_size: usize);
    /// Returns the distance value written for rays that hit nothing.
    fn begin_render_cube_map(&mut self) -> f32;
    fn render_cube_map_face(&mut self, camera: &Camera, face: CubeFace);
    fn end_render_cube_map(&mut self);
    fn begin_read_cube_map_face(&mut self, face: CubeFace);
    /// Next pixel of the face being read, row-major from the top-left.
    fn read_pixel(&mut self) -> CubeFaceSample;
    fn end_read_cube_map_face(&mut self, face: CubeFace);
    fn end_render(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    CubeReady { next_face: usize },
    Reading { face: CubeFace, remaining: usize },
    Closed,
}

/// Contract guard around a [`CubeMapRenderer`].
///
/// Tracks the Begin/Render/Read/End sequence and rejects out-of-order calls
/// with [`ProbeError::RendererContract`] before they reach the renderer.
#[derive(Debug, Clone)]
pub struct RendererSession {
    face_size: usize,
    state: SessionState,
    infinity: f32,
    position: Vec3,
    rotation: Mat3,
}

fn contract(msg: impl Into<String>) -> ProbeError {
    ProbeError::RendererContract(msg.into())
}

impl RendererSession {
    pub fn begin<R: CubeMapRenderer + ?Sized>(renderer: &mut R, face_size: usize) -> Result<Self> {
        if face_size == 0 {
            return Err(contract("cube face size must be at least 1"));
        }
        renderer.begin_render(face_size);
        Ok(Self {
            face_size,
            state: SessionState::Open,
            infinity: f32::INFINITY,
            position: Vec3::ZERO,
            rotation: Mat3::IDENTITY,
        })
    }

    pub fn face_size(&self) -> usize { self.face_size }
    pub fn is_closed(&self) -> bool { self.state == SessionState::Closed }
    pub fn has_cube_map(&self) -> bool { matches!(self.state, SessionState::CubeReady { .. }) }

    /// Render all six faces around `position`.
    pub fn render_cube_map<R: CubeMapRenderer + ?Sized>(
        &mut self,
        renderer: &mut R,
        position: Vec3,
        rotation: Mat3,
        near: f32,
        far: f32,
    ) -> Result<()> {
        match self.state {
            SessionState::Open | SessionState::CubeReady { .. } => {}
            SessionState::Reading { face, .. } => {
                return Err(contract(format!("cannot render a cube map while face {face:?} is being read")));
            }
            SessionState::Closed => return Err(contract("session already ended")),
        }

        self.infinity = renderer.begin_render_cube_map();
        for face in CubeFace::ALL {
            let camera = Camera::cube_face(position, rotation, face, near, far);
            renderer.render_cube_map_face(&camera, face);
        }
        renderer.end_render_cube_map();

        self.position = position;
        self.rotation = rotation;
        self.state = SessionState::CubeReady { next_face: 0 };
        Ok(())
    }

    /// Start reading `face`. Faces must be read in [`CubeFace::ALL`] order.
    pub fn begin_face<R: CubeMapRenderer + ?Sized>(&mut self, renderer: &mut R, face: CubeFace) -> Result<()> {
        let SessionState::CubeReady { next_face } = self.state else {
            return Err(contract(format!("cannot read face {face:?}: no cube map ready ({:?})", self.state)));
        };
        if face.index() != next_face {
            return Err(contract(format!(
                "face {face:?} read out of order, expected {:?}",
                CubeFace::ALL[next_face]
            )));
        }
        renderer.begin_read_cube_map_face(face);
        self.state = SessionState::Reading { face, remaining: self.face_size * self.face_size };
        Ok(())
    }

    pub fn read_pixel<R: CubeMapRenderer + ?Sized>(&mut self, renderer: &mut R) -> Result<CubeFaceSample> {
        match &mut self.state {
            SessionState::Reading { remaining, .. } if *remaining > 0 => {
                *remaining -= 1;
                Ok(renderer.read_pixel())
            }
            SessionState::Reading { face, .. } => {
                Err(contract(format!("read past the last pixel of face {face:?}")))
            }
            other => Err(contract(format!("read_pixel outside a face read ({other:?})"))),
        }
    }

    pub fn end_face<R: CubeMapRenderer + ?Sized>(&mut self, renderer: &mut R, face: CubeFace) -> Result<()> {
        match self.state {
            SessionState::Reading { face: reading, remaining: 0 } if reading == face => {
                renderer.end_read_cube_map_face(face);
                self.state = SessionState::CubeReady { next_face: (face.index() + 1) % 6 };
                Ok(())
            }
            SessionState::Reading { face: reading, remaining } if reading == face => Err(contract(format!(
                "face {face:?} read ended early with {remaining} pixels unread"
            ))),
            other => Err(contract(format!("end of face {face:?} without matching begin ({other:?})"))),
        }
    }

    /// End the session. A session can be ended once.
    pub fn end<R: CubeMapRenderer + ?Sized>(&mut self, renderer: &mut R) -> Result<()> {
        match self.state {
            SessionState::Closed => Err(contract("session already ended")),
            SessionState::Reading { face, .. } => {
                Err(contract(format!("cannot end the session while face {face:?} is being read")))
            }
            _ => {
                renderer.end_render();
                self.state = SessionState::Closed;
                Ok(())
            }
        }
    }

    /// Face access to the current cube map.
    pub fn faces<'a, R: CubeMapRenderer + ?Sized>(&'a mut self, renderer: &'a mut R) -> Result<FaceReader<'a, R>> {
        if !self.has_cube_map() {
            return Err(contract("no cube map has been rendered"));
        }
        Ok(FaceReader { session: self, renderer })
    }
}

// ============================================================================
// FACE SOURCES
// ============================================================================

/// The six faces of one probe's cube map.
pub trait FaceSource {
    fn face_size(&self) -> usize;
    /// Distance value of escaped rays.
    fn infinity(&self) -> f32;
    fn position(&self) -> Vec3;
    /// Probe-to-world rotation; faces add their side rotation on top.
    fn rotation(&self) -> Mat3;
    /// Visit every pixel of `face` in row-major order as (x, y, sample).
    fn read_face(&mut self, face: CubeFace, visit: &mut dyn FnMut(usize, usize, &CubeFaceSample)) -> Result<()>;
}

/// Reads faces back from a live renderer through its session.
pub struct FaceReader<'a, R: CubeMapRenderer + ?Sized> {
    session: &'a mut RendererSession,
    renderer: &'a mut R,
}

impl<R: CubeMapRenderer + ?Sized> FaceSource for FaceReader<'_, R> {
    fn face_size(&self) -> usize { self.session.face_size }
    fn infinity(&self) -> f32 { self.session.infinity }
    fn position(&self) -> Vec3 { self.session.position }
    fn rotation(&self) -> Mat3 { self.session.rotation }

    fn read_face(&mut self, face: CubeFace, visit: &mut dyn FnMut(usize, usize, &CubeFaceSample)) -> Result<()> {
        self.session.begin_face(&mut *self.renderer, face)?;
        let size = self.session.face_size;
        for y in 0..size {
            for x in 0..size {
                let sample = self.session.read_pixel(&mut *self.renderer)?;
                visit(x, y, &sample);
            }
        }
        self.session.end_face(&mut *self.renderer, face)
    }
}

/// A cube map held in memory.
#[derive(Debug, Clone)]
pub struct CubeMapFaces {
    pub face_size: usize,
    pub infinity: f32,
    pub position: Vec3,
    pub rotation: Mat3,
    /// Row-major pixels per face, in [`CubeFace::ALL`] order.
    pub faces: [Vec<CubeFaceSample>; 6],
}

impl CubeMapFaces {
    /// Every pixel of every face set to `sample`.
    pub fn uniform(face_size: usize, infinity: f32, sample: CubeFaceSample) -> Self {
        Self {
            face_size,
            infinity,
            position: Vec3::ZERO,
            rotation: Mat3::IDENTITY,
            faces: std::array::from_fn(|_| vec![sample; face_size * face_size]),
        }
    }
}

impl FaceSource for CubeMapFaces {
    fn face_size(&self) -> usize { self.face_size }
    fn infinity(&self) -> f32 { self.infinity }
    fn position(&self) -> Vec3 { self.position }
    fn rotation(&self) -> Mat3 { self.rotation }

    fn read_face(&mut self, face: CubeFace, visit: &mut dyn FnMut(usize, usize, &CubeFaceSample)) -> Result<()> {
        let pixels = &self.faces[face.index()];
        if pixels.len() != self.face_size * self.face_size {
            return Err(contract(format!(
                "face {face:?} holds {} pixels, expected {}",
                pixels.len(),
                self.face_size * self.face_size
            )));
        }
        for (i, sample) in pixels.iter().enumerate() {
            visit(i % self.face_size, i / self.face_size, sample);
        }
        Ok(())
    }
}

// ============================================================================
// OUTGOING RADIANCE
// ============================================================================

/// A surface seen by a probe ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    pub position: Vec3,
    pub normal: Vec3,
    pub albedo: Vec3,
    /// Unit direction from the probe toward the hit.
    pub direction: Vec3,
}

/// Radiance leaving a surface hit back toward the probe.
pub trait RadianceSource {
    fn radiance(&self, hit: &SurfaceHit) -> Vec3;
}

impl<F: Fn(&SurfaceHit) -> Vec3> RadianceSource for F {
    fn radiance(&self, hit: &SurfaceHit) -> Vec3 {
        self(hit)
    }
}

// ============================================================================
// PROJECTOR
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RayStats {
    escaped: usize,
    hit: usize,
}

impl fmt::Display for RayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} escaped / {} hit", self.escaped, self.hit)
    }
}

/// Integrates cube faces into SH vectors.
///
/// Per-texel directions and solid angles are precomputed for one face size
/// and shared by all faces.
#[derive(Debug, Clone)]
pub struct CubemapShProjector {
    face_size: usize,
    /// (unit face-local direction, solid angle), row-major.
    texels: Vec<(DVec3, f64)>,
}

impl CubemapShProjector {
    pub fn new(face_size: usize) -> Self {
        let r = face_size as f64;
        let d_area = 4.0 / (r * r);
        let texels = (0..face_size * face_size)
            .map(|i| {
                let (x, y) = ((i % face_size) as f64, (i / face_size) as f64);
                let local = DVec3::new((2.0 * x + 1.0) / r - 1.0, 1.0 - (2.0 * y + 1.0) / r, 1.0);
                let len = local.length();
                (local / len, d_area / (len * len * len))
            })
            .collect();
        Self { face_size, texels }
    }

    pub fn face_size(&self) -> usize { self.face_size }

    /// Total solid angle covered by the six faces (≈ 4π).
    pub fn total_solid_angle(&self) -> f64 {
        6.0 * self.texels.iter().map(|(_, w)| w).sum::<f64>()
    }

    fn check_size(&self, faces: &dyn FaceSource) -> Result<()> {
        if faces.face_size() != self.face_size {
            return Err(contract(format!(
                "projector built for {0}×{0} faces, source has {1}×{1}",
                self.face_size,
                faces.face_size()
            )));
        }
        Ok(())
    }

    /// SH visibility of the sky: escaped rays only.
    pub fn direct_occlusion(&self, faces: &mut dyn FaceSource) -> Result<ShScalar9> {
        self.check_size(faces)?;
        let escape = ESCAPE_THRESHOLD * faces.infinity();
        let probe = faces.rotation().as_dmat3();
        let mut acc = [0.0f64; SH_COEFF_COUNT];
        let mut total = RayStats::default();

        for face in CubeFace::ALL {
            let to_world: DMat3 = probe * face.side_rotation().as_dmat3();
            let mut stats = RayStats::default();
            faces.read_face(face, &mut |x, y, sample| {
                if sample.distance < escape {
                    stats.hit += 1;
                    return;
                }
                stats.escaped += 1;
                let (local, weight) = self.texels[y * self.face_size + x];
                for (a, y_k) in acc.iter_mut().zip(sh::basis(to_world * local)) {
                    *a += weight * y_k;
                }
            })?;
            debug!("Face {face:?}: {stats}");
            total.escaped += stats.escaped;
            total.hit += stats.hit;
        }

        debug!("Direct occlusion rays: {total}");
        Ok(acc.map(|a| a as f32))
    }

    /// SH radiance reflected toward the probe: hit rays only.
    pub fn indirect_bounce(&self, faces: &mut dyn FaceSource, radiance: &dyn RadianceSource) -> Result<ShColor9> {
        self.check_size(faces)?;
        let escape = ESCAPE_THRESHOLD * faces.infinity();
        let probe = faces.rotation().as_dmat3();
        let origin = faces.position();
        let mut acc = [DVec3::ZERO; SH_COEFF_COUNT];
        let mut total = RayStats::default();

        for face in CubeFace::ALL {
            let to_world: DMat3 = probe * face.side_rotation().as_dmat3();
            faces.read_face(face, &mut |x, y, sample| {
                if sample.distance >= escape {
                    total.escaped += 1;
                    return;
                }
                total.hit += 1;
                let (local, weight) = self.texels[y * self.face_size + x];
                let direction = to_world * local;
                let hit = SurfaceHit {
                    position: origin + direction.as_vec3() * sample.distance,
                    normal: sample.normal,
                    albedo: sample.albedo,
                    direction: direction.as_vec3(),
                };
                let l = radiance.radiance(&hit).as_dvec3() * weight;
                for (a, y_k) in acc.iter_mut().zip(sh::basis(direction)) {
                    *a += l * y_k;
                }
            })?;
        }

        debug!("Indirect bounce rays: {total}");
        Ok(acc.map(|a| a.as_vec3()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sh::F0;
    use std::f64::consts::PI;

    const SIZE: usize = 16;
    const INF: f32 = 1000.0;

    fn open_sky() -> CubeMapFaces {
        CubeMapFaces::uniform(SIZE, INF, CubeFaceSample { distance: INF, ..Default::default() })
    }

    fn walls(albedo: Vec3) -> CubeMapFaces {
        CubeMapFaces::uniform(SIZE, INF, CubeFaceSample { albedo, normal: Vec3::Y, distance: 2.0 })
    }

    #[test]
    fn test_side_rotations_are_proper() {
        for face in CubeFace::ALL {
            assert!((face.side_rotation().determinant() - 1.0).abs() < 1e-6);
            assert_eq!(CubeFace::from_index(face.index()), Some(face));
        }
        assert_eq!(CubeFace::from_index(6), None);
    }

    #[test]
    fn test_solid_angles_cover_sphere() {
        let projector = CubemapShProjector::new(SIZE);
        let total = projector.total_solid_angle();
        assert!((total - 4.0 * PI).abs() < 0.02, "total solid angle {total}");
    }

    #[test]
    fn test_unoccluded_cube_projects_to_band_zero() {
        let projector = CubemapShProjector::new(SIZE);
        let occ = projector.direct_occlusion(&mut open_sky()).unwrap();
        let expected = (4.0 * PI * F0) as f32;
        assert!((occ[0] - expected).abs() < 1e-2, "band 0 = {}, expected {expected}", occ[0]);
        for (k, c) in occ.iter().enumerate().skip(1) {
            assert!(c.abs() < 1e-4, "band {k} = {c}");
        }
    }

    #[test]
    fn test_occluded_cube_projects_to_zero() {
        let projector = CubemapShProjector::new(SIZE);
        let occ = projector.direct_occlusion(&mut walls(Vec3::ONE)).unwrap();
        assert!(occ.iter().all(|c| *c == 0.0));

        let bounce = projector
            .indirect_bounce(&mut open_sky(), &|_: &SurfaceHit| Vec3::ONE)
            .unwrap();
        assert!(bounce.iter().all(|c| *c == Vec3::ZERO));
    }

    #[test]
    fn test_constant_radiance_bounce() {
        let projector = CubemapShProjector::new(SIZE);
        let l = Vec3::new(0.5, 1.0, 2.0);
        let bounce = projector.indirect_bounce(&mut walls(Vec3::ONE), &move |_: &SurfaceHit| l).unwrap();
        let expected = l * (4.0 * PI * F0) as f32;
        assert!((bounce[0] - expected).abs().max_element() < 1e-2, "got {}", bounce[0]);
        for c in &bounce[1..] {
            assert!(c.abs().max_element() < 1e-4);
        }
    }

    #[test]
    fn test_half_occluded_points_up() {
        // lower hemisphere faces blocked, sky above
        let mut faces = open_sky();
        faces.faces[CubeFace::NegY.index()] = vec![CubeFaceSample { distance: 1.0, ..Default::default() }; SIZE * SIZE];
        let projector = CubemapShProjector::new(SIZE);
        let occ = projector.direct_occlusion(&mut faces).unwrap();
        assert!(occ[2] > 0.0, "Y band should point up: {}", occ[2]);
        assert!(occ[1].abs() < 1e-4 && occ[3].abs() < 1e-4);
    }

    #[test]
    fn test_hit_positions_follow_ray() {
        let mut faces = walls(Vec3::ONE);
        faces.position = Vec3::new(1.0, 2.0, 3.0);
        let projector = CubemapShProjector::new(SIZE);
        let check = |hit: &SurfaceHit| {
            let d = (hit.position - Vec3::new(1.0, 2.0, 3.0)).length();
            assert!((d - 2.0).abs() < 1e-4);
            assert!((hit.direction.length() - 1.0).abs() < 1e-5);
            Vec3::ZERO
        };
        projector.indirect_bounce(&mut faces, &check).unwrap();
    }

    #[test]
    fn test_face_size_mismatch() {
        let projector = CubemapShProjector::new(8);
        assert!(matches!(
            projector.direct_occlusion(&mut open_sky()),
            Err(ProbeError::RendererContract(_))
        ));
    }

    #[derive(Default)]
    struct CountingRenderer {
        pixels_read: usize,
        ended: usize,
    }

    impl CubeMapRenderer for CountingRenderer {
        fn begin_render(&mut self, _face_size: usize) {}
        fn begin_render_cube_map(&mut self) -> f32 { INF }
        fn render_cube_map_face(&mut self, _camera: &Camera, _face: CubeFace) {}
        fn end_render_cube_map(&mut self) {}
        fn begin_read_cube_map_face(&mut self, _face: CubeFace) {}
        fn read_pixel(&mut self) -> CubeFaceSample {
            self.pixels_read += 1;
            CubeFaceSample { distance: INF, ..Default::default() }
        }
        fn end_read_cube_map_face(&mut self, _face: CubeFace) {}
        fn end_render(&mut self) { self.ended += 1; }
    }

    #[test]
    fn test_session_rejects_out_of_order_faces() {
        let mut renderer = CountingRenderer::default();
        let mut session = RendererSession::begin(&mut renderer, 2).unwrap();
        assert!(session.begin_face(&mut renderer, CubeFace::PosX).is_err());

        session.render_cube_map(&mut renderer, Vec3::ZERO, Mat3::IDENTITY, 0.01, 10.0).unwrap();
        assert!(session.begin_face(&mut renderer, CubeFace::NegX).is_err());

        session.begin_face(&mut renderer, CubeFace::PosX).unwrap();
        session.read_pixel(&mut renderer).unwrap();
        assert!(session.end_face(&mut renderer, CubeFace::PosX).is_err());
        for _ in 0..3 {
            session.read_pixel(&mut renderer).unwrap();
        }
        assert!(session.read_pixel(&mut renderer).is_err());
        session.end_face(&mut renderer, CubeFace::PosX).unwrap();
        assert_eq!(renderer.pixels_read, 4);
    }

    #[test]
    fn test_session_projection_and_single_end() {
        let mut renderer = CountingRenderer::default();
        let mut session = RendererSession::begin(&mut renderer, SIZE).unwrap();
        session.render_cube_map(&mut renderer, Vec3::ZERO, Mat3::IDENTITY, 0.01, 10.0).unwrap();

        let projector = CubemapShProjector::new(SIZE);
        let mut faces = session.faces(&mut renderer).unwrap();
        let occ = projector.direct_occlusion(&mut faces).unwrap();
        assert!(occ[0] > 3.0);
        assert_eq!(renderer.pixels_read, 6 * SIZE * SIZE);

        session.end(&mut renderer).unwrap();
        assert!(session.end(&mut renderer).is_err());
        assert_eq!(renderer.ended, 1);
        assert!(session.is_closed());
    }
}
