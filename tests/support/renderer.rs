#![allow(dead_code)]

use glam::Vec3;
use sh_envmap::{Camera, CubeFace, CubeFaceSample, CubeMapRenderer};

pub const INFINITY: f32 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Call {
    BeginRender(usize),
    BeginCubeMap,
    RenderFace(CubeFace),
    EndCubeMap,
    BeginRead(CubeFace),
    EndRead { face: CubeFace, pixels: usize },
    EndRender,
}

/// Procedural scene: an infinite ground plane at `ground` (or nothing) under
/// an open sky. Records every call and any sequencing mistakes it sees.
pub struct GroundRenderer {
    pub ground: Option<f32>,
    pub albedo: Vec3,
    pub calls: Vec<Call>,
    pub violations: Vec<String>,
    pub pixels_read: usize,
    rendering: bool,
    face_size: usize,
    cameras: [Option<Camera>; 6],
    reading: Option<(CubeFace, usize)>,
}

impl GroundRenderer {
    pub fn new(ground: Option<f32>, albedo: Vec3) -> Self {
        Self {
            ground,
            albedo,
            calls: Vec::new(),
            violations: Vec::new(),
            pixels_read: 0,
            rendering: false,
            face_size: 0,
            cameras: [None; 6],
            reading: None,
        }
    }

    pub fn open_sky() -> Self {
        Self::new(None, Vec3::ZERO)
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    pub fn cube_maps_rendered(&self) -> usize {
        self.count(Call::BeginCubeMap)
    }

    fn trace(&self, camera: &Camera, x: usize, y: usize) -> CubeFaceSample {
        let r = self.face_size as f32;
        let local = Vec3::new((2.0 * x as f32 + 1.0) / r - 1.0, 1.0 - (2.0 * y as f32 + 1.0) / r, 1.0);
        let dir = (camera.rotation * local).normalize();
        match self.ground {
            Some(h) if dir.y < 0.0 && camera.position.y > h => {
                let t = (camera.position.y - h) / -dir.y;
                CubeFaceSample { albedo: self.albedo, normal: Vec3::Y, distance: t.min(INFINITY) }
            }
            _ => CubeFaceSample { albedo: Vec3::ZERO, normal: Vec3::ZERO, distance: INFINITY },
        }
    }
}

impl CubeMapRenderer for GroundRenderer {
    fn begin_render(&mut self, face_size: usize) {
        if self.rendering {
            self.violations.push("begin_render while rendering".into());
        }
        self.rendering = true;
        self.face_size = face_size;
        self.calls.push(Call::BeginRender(face_size));
    }

    fn begin_render_cube_map(&mut self) -> f32 {
        self.cameras = [None; 6];
        self.calls.push(Call::BeginCubeMap);
        INFINITY
    }

    fn render_cube_map_face(&mut self, camera: &Camera, face: CubeFace) {
        self.cameras[face.index()] = Some(*camera);
        self.calls.push(Call::RenderFace(face));
    }

    fn end_render_cube_map(&mut self) {
        if self.cameras.iter().any(Option::is_none) {
            self.violations.push("cube map ended with faces missing".into());
        }
        self.calls.push(Call::EndCubeMap);
    }

    fn begin_read_cube_map_face(&mut self, face: CubeFace) {
        if self.reading.is_some() {
            self.violations.push(format!("begin read {face:?} while another face is open"));
        }
        self.reading = Some((face, 0));
        self.calls.push(Call::BeginRead(face));
    }

    fn read_pixel(&mut self) -> CubeFaceSample {
        let Some((face, i)) = self.reading else {
            self.violations.push("read_pixel outside a face read".into());
            return CubeFaceSample::default();
        };
        self.reading = Some((face, i + 1));
        self.pixels_read += 1;
        match self.cameras[face.index()] {
            Some(camera) => self.trace(&camera, i % self.face_size, i / self.face_size),
            None => {
                self.violations.push(format!("face {face:?} read before it was rendered"));
                CubeFaceSample::default()
            }
        }
    }

    fn end_read_cube_map_face(&mut self, face: CubeFace) {
        let pixels = match self.reading.take() {
            Some((open, pixels)) if open == face => pixels,
            _ => {
                self.violations.push(format!("end read {face:?} without matching begin"));
                0
            }
        };
        if pixels != self.face_size * self.face_size {
            self.violations.push(format!("face {face:?} read {pixels} pixels"));
        }
        self.calls.push(Call::EndRead { face, pixels });
    }

    fn end_render(&mut self) {
        if !self.rendering {
            self.violations.push("end_render without begin_render".into());
        }
        self.rendering = false;
        self.calls.push(Call::EndRender);
    }
}
