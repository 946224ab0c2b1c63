//! Multi-bounce bake against a procedural cube-map renderer.

mod support;

use glam::Vec3;
use sh_envmap::field::white_sky_environment;
use sh_envmap::sh::F0;
use sh_envmap::{
    AmbientMapTarget, AmbientMapUniforms, BakeConfig, BakeState, Camera, CubeFace, GeometryError, MeshState, ProbeError,
    ProbeMesh, ProbeNetworkManager, RendererSession,
};
use std::f32::consts::PI;
use support::renderer::{Call, GroundRenderer};

const FACE: usize = 8;

fn config(bounce_count: usize) -> BakeConfig {
    BakeConfig { cube_map_size: FACE, bounce_count, ..Default::default() }
}

fn triangle_network() -> ProbeNetworkManager {
    let mut manager = ProbeNetworkManager::default();
    manager.add_probe(Vec3::new(0.0, 1.0, 0.0));
    manager.add_probe(Vec3::new(10.0, 1.0, 0.0));
    manager.add_probe(Vec3::new(5.0, 1.0, 8.66));
    manager
}

#[derive(Default)]
struct RecordingTarget {
    draws: Vec<(ProbeMesh, AmbientMapUniforms)>,
}

impl AmbientMapTarget for RecordingTarget {
    fn draw_ambient_map(&mut self, mesh: &ProbeMesh, uniforms: &AmbientMapUniforms) {
        self.draws.push((mesh.clone(), *uniforms));
    }
}

#[test]
fn test_open_sky_bake() {
    support::init_logging();
    let mut manager = triangle_network();
    let mut renderer = GroundRenderer::open_sky();
    manager.bake(&mut renderer, &config(2)).unwrap();

    assert!(renderer.violations.is_empty(), "{:?}", renderer.violations);
    let full_sky = 4.0 * PI * F0 as f32;
    for (i, probe) in manager.probes().iter().enumerate() {
        let occ = probe.occlusion();
        assert!((occ[0] - full_sky).abs() < 0.05, "probe {i}: band 0 = {}", occ[0]);
        for (k, c) in occ.iter().enumerate().skip(1) {
            assert!(c.abs() < 1e-3, "probe {i}: band {k} = {c}");
        }
        assert!(probe.bounce().iter().all(|c| c.abs().max_element() == 0.0));
    }
}

#[test]
fn test_ground_bake_gathers_bounce_light() {
    support::init_logging();
    let mut manager = triangle_network();
    let mut renderer = GroundRenderer::new(Some(0.0), Vec3::new(0.8, 0.4, 0.2));
    manager.bake(&mut renderer, &config(2)).unwrap();

    assert!(renderer.violations.is_empty(), "{:?}", renderer.violations);
    assert_eq!(manager.bake_state(), BakeState::Idle);
    assert_eq!(renderer.count(Call::BeginRender(FACE)), 1);
    assert_eq!(renderer.count(Call::EndRender), 1);
    assert_eq!(renderer.cube_maps_rendered(), 3 * 3);
    assert_eq!(renderer.pixels_read, 3 * 3 * 6 * FACE * FACE);
    assert_eq!(renderer.count(Call::EndRead { face: CubeFace::NegZ, pixels: FACE * FACE }), 9);

    let half_sky = 2.0 * PI * F0 as f32;
    for (i, probe) in manager.probes().iter().enumerate() {
        let occ = probe.occlusion();
        assert!((occ[0] - half_sky).abs() < 0.15, "probe {i}: band 0 = {}", occ[0]);
        assert!(occ[2] > 0.0, "probe {i}: sky should be above, Y band = {}", occ[2]);

        let bounce = probe.bounce();
        assert!(bounce[0].min_element() > 0.0, "probe {i}: no bounce light {}", bounce[0]);
        assert!(bounce[0].x > bounce[0].y && bounce[0].y > bounce[0].z, "probe {i}: {}", bounce[0]);
        // gathered from below, stored mirrored
        assert!(bounce[2].x > 0.0, "probe {i}: Y band = {}", bounce[2]);
    }
}

#[test]
fn test_more_bounces_add_light() {
    let albedo = Vec3::splat(0.9);
    let mut one = triangle_network();
    one.bake(&mut GroundRenderer::new(Some(0.0), albedo), &config(1)).unwrap();
    let mut three = triangle_network();
    three.bake(&mut GroundRenderer::new(Some(0.0), albedo), &config(3)).unwrap();

    for (a, b) in one.probes().iter().zip(three.probes()) {
        assert_eq!(a.occlusion(), b.occlusion());
        assert!(b.bounce()[0].x >= a.bounce()[0].x);
    }
}

#[test]
fn test_bake_preconditions() {
    let mut empty = ProbeNetworkManager::default();
    let mut renderer = GroundRenderer::open_sky();
    empty.bake(&mut renderer, &config(3)).unwrap();
    assert!(renderer.calls.is_empty());

    let mut pair = ProbeNetworkManager::default();
    pair.add_probe(Vec3::ZERO);
    pair.add_probe(Vec3::X);
    assert!(matches!(
        pair.bake(&mut renderer, &config(3)),
        Err(ProbeError::InsufficientProbes { count: 2 })
    ));
    assert!(renderer.calls.is_empty());

    pair.bake(&mut renderer, &config(0)).unwrap();
    assert_eq!(renderer.cube_maps_rendered(), 2);
    assert!(renderer.violations.is_empty(), "{:?}", renderer.violations);
}

#[test]
fn test_failed_bake_ends_rendering() {
    support::init_logging();
    let mut manager = triangle_network();
    manager.add_probe(Vec3::new(10.0, 1.0, 0.0));
    let mut renderer = GroundRenderer::open_sky();

    let result = manager.bake(&mut renderer, &config(1));
    assert!(
        matches!(result, Err(ProbeError::Geometry(GeometryError::DuplicatePoint { index: 3, of: 1 }))),
        "{result:?}"
    );
    assert_eq!(renderer.count(Call::BeginRender(FACE)), 1);
    assert_eq!(renderer.count(Call::EndRender), 1);
    assert!(!manager.is_baking());
    assert!(renderer.violations.is_empty(), "{:?}", renderer.violations);

    // the renderer is free again for the next bake
    manager.clear_probes();
    for p in [Vec3::new(0.0, 1.0, 0.0), Vec3::new(10.0, 1.0, 0.0), Vec3::new(5.0, 1.0, 8.66)] {
        manager.add_probe(p);
    }
    manager.bake(&mut renderer, &config(1)).unwrap();
    assert_eq!(renderer.count(Call::EndRender), 2);
    assert!(renderer.violations.is_empty(), "{:?}", renderer.violations);
}

#[test]
fn test_session_stops_bad_reads_before_renderer() {
    let mut renderer = GroundRenderer::open_sky();
    let mut session = RendererSession::begin(&mut renderer, FACE).unwrap();
    session.render_cube_map(&mut renderer, Vec3::Y, glam::Mat3::IDENTITY, 0.01, 100.0).unwrap();

    assert!(matches!(
        session.begin_face(&mut renderer, CubeFace::NegY),
        Err(ProbeError::RendererContract(_))
    ));
    assert_eq!(renderer.count(Call::BeginRead(CubeFace::NegY)), 0);

    session.begin_face(&mut renderer, CubeFace::PosX).unwrap();
    for _ in 0..3 {
        session.read_pixel(&mut renderer).unwrap();
    }
    assert!(matches!(
        session.end_face(&mut renderer, CubeFace::PosX),
        Err(ProbeError::RendererContract(_))
    ));
    assert!(session.end(&mut renderer).is_err());
    assert!(renderer.violations.is_empty(), "{:?}", renderer.violations);
}

#[test]
fn test_step_wise_rendering() {
    let mut manager = triangle_network();
    let mut renderer = GroundRenderer::new(Some(0.0), Vec3::ONE);
    let cfg = config(1);

    manager.begin_environment_rendering(&mut renderer, &cfg).unwrap();
    assert!(manager.is_baking());
    manager.render_cube_map(&mut renderer, Vec3::new(5.0, 1.0, 3.0), Vec3::Z, Vec3::Y).unwrap();
    let direct = manager.encode_direct(&mut renderer).unwrap();
    let indirect = manager.encode_indirect(&mut renderer, 1).unwrap();
    assert_eq!(manager.bake_state(), BakeState::Baking { bounce: 1 });
    manager.end_environment_rendering(&mut renderer).unwrap();

    assert!(direct[0] > 0.0);
    // un-baked probes have no occlusion, so the first bounce is dark
    assert_eq!(indirect[0], Vec3::ZERO);
    assert_eq!(renderer.cube_maps_rendered(), 1);
    assert_eq!(renderer.count(Call::BeginRead(CubeFace::PosX)), 2);
    assert!(renderer.violations.is_empty(), "{:?}", renderer.violations);
}

#[test]
fn test_render_after_bake_uses_cached_mesh() {
    let mut manager = triangle_network();
    manager.bake(&mut GroundRenderer::new(Some(0.0), Vec3::ONE), &config(1)).unwrap();

    let first = manager.mesh().unwrap().clone();
    assert_eq!(manager.mesh_state(), MeshState::Clean);
    assert_eq!(&first, manager.mesh().unwrap());

    let camera = Camera::look_at(Vec3::new(5.0, 30.0, -20.0), Vec3::new(5.0, 0.0, 4.0), Vec3::Y);
    let mut target = RecordingTarget::default();
    manager.render(&camera, &white_sky_environment(), &mut target).unwrap();
    assert_eq!(target.draws.len(), 1);
    let (mesh, uniforms) = &target.draws[0];
    assert_eq!(mesh, &first);
    assert_eq!(uniforms.enable_ambient, 1);
    assert_eq!(uniforms.enable_indirect, 1);
    assert!(uniforms.scale[0] > 0.0 && uniforms.scale[1] > 0.0);
    assert_eq!(mesh.vertices[0].coefficients(), manager.probes()[0].coefficients);
}
