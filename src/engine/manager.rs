// Probe network manager: owns the probes and their mesh, drives the bake.
//
// Bake passes:
//   bounce 0      direct occlusion per probe          → update_coefficients
//   bounce 1..K   indirect light off nearby surfaces  → update_bounce (between bounces)
//                 summed per probe                    → update_coefficients_reflected (once, at the end)
//
// Bounce 1 lights the field with a uniform white sky through the baked
// occlusion; later bounces light it with the previous bounce only.

use std::io::{Read, Write};
use std::path::Path;

use glam::{Vec3, Vec4};
use log::{info, warn};

use super::camera::{self, Camera};
use super::cubemap::{CubeMapRenderer, CubemapShProjector, RendererSession};
use super::error::{ProbeError, Result};
use super::field::{
    bounce_only_environment, white_sky_environment, AmbientField, AmbientMapTarget, AmbientMapUniforms,
    AmbientToggles, LambertRadiance,
};
use super::mesh::{MeshBuilder, MeshState, ProbeMesh};
use super::probe::{Probe, ProbeStore};
use super::sh::{ShCoefficients, ShColor9, ShScalar9, SH_COEFF_COUNT};
use super::validation::TriangulationReport;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BakeConfig {
    /// Cube face resolution in pixels.
    pub cube_map_size: usize,
    pub near_clip: f32,
    pub far_clip: f32,
    /// Multiplier on light leaving surfaces during indirect bounces.
    pub indirect_boost: f32,
    /// Indirect bounces after the direct pass.
    pub bounce_count: usize,
    /// Probe camera orientation.
    pub forward: Vec3,
    pub up: Vec3,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            cube_map_size: 64,
            near_clip: 0.01,
            far_clip: 100.0,
            indirect_boost: 1.0,
            bounce_count: 3,
            forward: Vec3::Z,
            up: Vec3::Y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbientMapConfig {
    /// Lookup texture size in texels.
    pub map_size: u32,
}

impl Default for AmbientMapConfig {
    fn default() -> Self {
        Self { map_size: 256 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BakeState {
    Idle,
    Baking { bounce: usize },
}

/// Environment rendering in progress.
struct BakeSession {
    renderer: RendererSession,
    projector: CubemapShProjector,
    config: BakeConfig,
}

// ============================================================================
// MANAGER
// ============================================================================

pub struct ProbeNetworkManager {
    store: ProbeStore,
    builder: MeshBuilder,
    toggles: AmbientToggles,
    map_config: AmbientMapConfig,
    state: BakeState,
    session: Option<BakeSession>,
}

impl Default for ProbeNetworkManager {
    fn default() -> Self {
        Self::new(AmbientMapConfig::default())
    }
}

impl ProbeNetworkManager {
    pub fn new(map_config: AmbientMapConfig) -> Self {
        Self {
            store: ProbeStore::new(),
            builder: MeshBuilder::new(),
            toggles: AmbientToggles::default(),
            map_config,
            state: BakeState::Idle,
            session: None,
        }
    }

    // ---- Probes --------------------------------------------------------------

    pub fn add_probe(&mut self, position: Vec3) -> usize {
        self.store.add_probe(position)
    }

    pub fn add_probe_with(&mut self, position: Vec3, coefficients: ShCoefficients) -> usize {
        self.store.add_probe_with(position, coefficients)
    }

    pub fn clear_probes(&mut self) {
        self.store.clear();
    }

    pub fn probe_count(&self) -> usize { self.store.len() }
    pub fn probes(&self) -> &[Probe] { self.store.probes() }
    pub fn store(&self) -> &ProbeStore { &self.store }

    pub fn update_coefficients(&mut self, index: usize, direct: &ShScalar9) -> Result<()> {
        self.store.update_coefficients(index, direct)
    }

    pub fn update_coefficients_reflected(&mut self, index: usize, indirect: &ShColor9) -> Result<()> {
        self.store.update_coefficients_reflected(index, indirect)
    }

    pub fn update_bounce(&mut self, index: usize, indirect: &ShColor9) -> Result<()> {
        self.store.update_bounce(index, indirect)
    }

    pub fn set_coefficients(&mut self, index: usize, coefficients: [Vec4; SH_COEFF_COUNT]) -> Result<()> {
        self.store.set_coefficients(index, coefficients)
    }

    pub fn make_cosine_lobe(&mut self, index: usize, direction: Vec3) -> Result<()> {
        self.store.make_cosine_lobe(index, direction)
    }

    pub fn make_ambient(&mut self, index: usize) -> Result<()> {
        self.store.make_ambient(index)
    }

    pub fn load_probes(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        self.store.load(path)
    }

    pub fn save_probes(&self, path: impl AsRef<Path>) -> Result<()> {
        self.store.save(path)
    }

    pub fn load_probes_from<R: Read>(&mut self, reader: R) -> Result<usize> {
        self.store.load_from(reader)
    }

    pub fn save_probes_to<W: Write>(&self, writer: W) -> Result<()> {
        self.store.save_to(writer)
    }

    // ---- Mesh ----------------------------------------------------------------

    /// Current probe mesh, rebuilt if the probes changed since the last call.
    pub fn mesh(&mut self) -> Result<&ProbeMesh> {
        self.builder.build_or_refresh(&self.store)
    }

    pub fn mesh_state(&self) -> MeshState {
        self.builder.state(&self.store)
    }

    pub fn triangulation_report(&self) -> Option<&TriangulationReport> {
        self.builder.report()
    }

    pub fn toggles(&self) -> AmbientToggles { self.toggles }
    pub fn set_toggles(&mut self, toggles: AmbientToggles) { self.toggles = toggles; }
    pub fn bake_state(&self) -> BakeState { self.state }
    pub fn is_baking(&self) -> bool { self.state != BakeState::Idle }

    // ---- Bake ----------------------------------------------------------------

    /// Run the full bake: direct pass, then `config.bounce_count` indirect
    /// bounces. Does nothing without probes.
    pub fn bake<R: CubeMapRenderer + ?Sized>(&mut self, renderer: &mut R, config: &BakeConfig) -> Result<()> {
        let count = self.store.len();
        if count == 0 {
            info!("No probes to bake");
            return Ok(());
        }
        if count < 3 && config.bounce_count > 0 {
            warn!("Indirect bake needs at least 3 probes, got {count}");
            return Err(ProbeError::InsufficientProbes { count });
        }

        info!("Baking {} probes ({} indirect bounces)", count, config.bounce_count);
        self.begin_environment_rendering(renderer, config)?;
        match self.run_bake(renderer, config) {
            Ok(()) => {
                self.end_environment_rendering(renderer)?;
                info!("Bake finished");
                Ok(())
            }
            Err(e) => {
                warn!("Bake failed: {e}");
                if let Err(end) = self.end_environment_rendering(renderer) {
                    warn!("Could not end environment rendering after failed bake: {end}");
                }
                Err(e)
            }
        }
    }

    fn run_bake<R: CubeMapRenderer + ?Sized>(&mut self, renderer: &mut R, config: &BakeConfig) -> Result<()> {
        let positions: Vec<Vec3> = self.store.probes().iter().map(|p| p.position).collect();

        for (i, &position) in positions.iter().enumerate() {
            self.render_cube_map(renderer, position, config.forward, config.up)?;
            let direct = self.encode_direct(renderer)?;
            self.store.update_coefficients(i, &direct)?;
        }

        let mut accumulated = vec![[Vec3::ZERO; SH_COEFF_COUNT]; positions.len()];
        for bounce in 1..=config.bounce_count {
            info!("Bake bounce {}/{}", bounce, config.bounce_count);
            self.builder.mark_attributes_dirty();

            // all probes read the previous bounce before any of them is updated
            let mut gathered = Vec::with_capacity(positions.len());
            for &position in &positions {
                self.render_cube_map(renderer, position, config.forward, config.up)?;
                gathered.push(self.encode_indirect(renderer, bounce)?);
            }
            for (i, light) in gathered.iter().enumerate() {
                self.store.update_bounce(i, light)?;
                for (sum, l) in accumulated[i].iter_mut().zip(light) {
                    *sum += *l;
                }
            }
        }

        if config.bounce_count > 0 {
            for (i, sum) in accumulated.iter().enumerate() {
                self.store.update_coefficients_reflected(i, sum)?;
            }
        }
        Ok(())
    }

    // ---- Step-wise environment rendering -------------------------------------

    pub fn begin_environment_rendering<R: CubeMapRenderer + ?Sized>(
        &mut self,
        renderer: &mut R,
        config: &BakeConfig,
    ) -> Result<()> {
        if self.session.is_some() {
            return Err(ProbeError::RendererContract("environment rendering already started".into()));
        }
        self.session = Some(BakeSession {
            renderer: RendererSession::begin(renderer, config.cube_map_size)?,
            projector: CubemapShProjector::new(config.cube_map_size),
            config: *config,
        });
        self.state = BakeState::Baking { bounce: 0 };
        Ok(())
    }

    fn session_mut(&mut self) -> Result<&mut BakeSession> {
        self.session
            .as_mut()
            .ok_or_else(|| ProbeError::RendererContract("environment rendering not started".into()))
    }

    /// Render the six faces around `position`.
    pub fn render_cube_map<R: CubeMapRenderer + ?Sized>(
        &mut self,
        renderer: &mut R,
        position: Vec3,
        forward: Vec3,
        up: Vec3,
    ) -> Result<()> {
        let session = self.session_mut()?;
        let (near, far) = (session.config.near_clip, session.config.far_clip);
        session
            .renderer
            .render_cube_map(renderer, position, camera::orientation(forward, up), near, far)
    }

    /// Project the current cube map onto direct-occlusion SH.
    pub fn encode_direct<R: CubeMapRenderer + ?Sized>(&mut self, renderer: &mut R) -> Result<ShScalar9> {
        let session = self.session_mut()?;
        let mut faces = session.renderer.faces(renderer)?;
        session.projector.direct_occlusion(&mut faces)
    }

    /// Project the current cube map onto indirect-bounce SH, with surfaces
    /// lit by the field of the previous bounce.
    pub fn encode_indirect<R: CubeMapRenderer + ?Sized>(&mut self, renderer: &mut R, bounce: usize) -> Result<ShColor9> {
        let Self { store, builder, session, state, .. } = self;
        let session = session
            .as_mut()
            .ok_or_else(|| ProbeError::RendererContract("environment rendering not started".into()))?;
        if !session.renderer.has_cube_map() {
            return Err(ProbeError::RendererContract("no cube map has been rendered".into()));
        }
        *state = BakeState::Baking { bounce };

        let environment = if bounce <= 1 { white_sky_environment() } else { bounce_only_environment() };
        let mesh = builder.build_or_refresh(store)?;
        let radiance = LambertRadiance {
            field: AmbientField::new(mesh, environment, AmbientToggles::default()),
            boost: session.config.indirect_boost,
        };
        let mut faces = session.renderer.faces(renderer)?;
        session.projector.indirect_bounce(&mut faces, &radiance)
    }

    pub fn end_environment_rendering<R: CubeMapRenderer + ?Sized>(&mut self, renderer: &mut R) -> Result<()> {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| ProbeError::RendererContract("environment rendering not started".into()))?;
        self.state = BakeState::Idle;
        session.renderer.end(renderer)
    }

    // ---- Render ----------------------------------------------------------------

    /// Draw the probe mesh into the ambient map covering `camera`'s view.
    pub fn render<T: AmbientMapTarget + ?Sized>(
        &mut self,
        camera: &Camera,
        sky_sh: &ShCoefficients,
        target: &mut T,
    ) -> Result<()> {
        if self.is_baking() {
            return Err(ProbeError::RendererContract("cannot render the ambient map while baking".into()));
        }
        let uniforms = AmbientMapUniforms::for_camera(camera, self.map_config.map_size, self.toggles, sky_sh)?;
        let mesh = self.builder.build_or_refresh(&self.store)?;
        target.draw_ambient_map(mesh, &uniforms);
        Ok(())
    }
}
