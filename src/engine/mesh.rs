// Probe mesh: triangulated probe network ready for GPU upload.
//
//   ProbeStore → triangulate() → index buffer ┐
//   ProbeStore coefficients  → vertex buffer ┴→ ProbeMesh → ambient map pass
//
// Topology and attributes are rebuilt independently: the triangulation only
// reruns when the point set changed, the vertex block is re-copied whenever
// any coefficient changed.

use glam::{DVec2, Vec2, Vec4};
use log::debug;

use super::delaunay;
use super::error::{ProbeError, Result};
use super::probe::ProbeStore;
use super::sh::{ShCoefficients, SH_COEFF_COUNT};
use super::validation::TriangulationReport;

// ============================================================================
// GPU VERTEX
// ============================================================================

/// One vertex per probe:
///   @location(0)    position: vec3<f32>
///   @location(1..9) sh0..sh8: vec4<f32>   (xyz = bounce, w = occlusion)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ProbeVertex {
    pub position: [f32; 3],
    pub sh: [[f32; 4]; SH_COEFF_COUNT],
}

impl ProbeVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 1 + SH_COEFF_COUNT] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x4,
        2 => Float32x4,
        3 => Float32x4,
        4 => Float32x4,
        5 => Float32x4,
        6 => Float32x4,
        7 => Float32x4,
        8 => Float32x4,
        9 => Float32x4,
    ];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ProbeVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }

    pub fn coefficients(&self) -> ShCoefficients {
        self.sh.map(Vec4::from_array)
    }
}

// ============================================================================
// PROBE MESH
// ============================================================================

/// Upload vertex_bytes() to a VERTEX buffer, index_bytes() to an INDEX buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeMesh {
    pub vertices: Vec<ProbeVertex>,
    pub indices: Vec<u32>,
}

impl ProbeMesh {
    /// Cast vertex slice to raw bytes for wgpu buffer upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Cast index slice to raw bytes for wgpu buffer upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn index_count(&self) -> usize { self.indices.len() }
    pub fn triangle_count(&self) -> usize { self.indices.len() / 3 }

    /// Barycentric interpolation of the coefficients at a ground (X, Z)
    /// position. `None` outside every triangle.
    pub fn sample(&self, ground: Vec2) -> Option<ShCoefficients> {
        let p = ground.as_dvec2();
        let ground_of = |i: u32| -> DVec2 {
            let v = &self.vertices[i as usize].position;
            DVec2::new(v[0] as f64, v[2] as f64)
        };

        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(ground_of);
            let Some([wa, wb, wc]) = barycentric(p, a, b, c) else {
                continue;
            };
            let [va, vb, vc] = [tri[0], tri[1], tri[2]].map(|i| self.vertices[i as usize].coefficients());
            return Some(std::array::from_fn(|k| {
                va[k] * wa as f32 + vb[k] * wb as f32 + vc[k] * wc as f32
            }));
        }
        None
    }
}

/// Barycentric weights of `p` in triangle (a, b, c), or `None` when `p` lies
/// outside it (with a small tolerance) or the triangle is degenerate.
fn barycentric(p: DVec2, a: DVec2, b: DVec2, c: DVec2) -> Option<[f64; 3]> {
    let area = (b - a).perp_dot(c - a);
    if area.abs() <= f64::EPSILON {
        return None;
    }
    let wa = (b - p).perp_dot(c - p) / area;
    let wb = (c - p).perp_dot(a - p) / area;
    let wc = 1.0 - wa - wb;
    const SLACK: f64 = -1e-9;
    (wa >= SLACK && wb >= SLACK && wc >= SLACK).then_some([wa, wb, wc])
}

// ============================================================================
// MESH BUILDER
// ============================================================================

/// What the next `build_or_refresh` has to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshState {
    Clean,
    AttributesDirty,
    TopologyDirty,
}

/// Lazily rebuilt probe mesh, keyed on the store's revision counters.
#[derive(Debug, Default)]
pub struct MeshBuilder {
    mesh: ProbeMesh,
    topology_revision: Option<u64>,
    coefficients_revision: Option<u64>,
    report: Option<TriangulationReport>,
    topology_builds: usize,
    attribute_builds: usize,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, store: &ProbeStore) -> MeshState {
        if self.topology_revision != Some(store.topology_revision()) {
            MeshState::TopologyDirty
        } else if self.coefficients_revision != Some(store.coefficients_revision()) {
            MeshState::AttributesDirty
        } else {
            MeshState::Clean
        }
    }

    /// Force the next build to re-copy the vertex block.
    pub fn mark_attributes_dirty(&mut self) {
        self.coefficients_revision = None;
    }

    /// Bring the mesh up to date with `store` and return it.
    pub fn build_or_refresh(&mut self, store: &ProbeStore) -> Result<&ProbeMesh> {
        let state = self.state(store);
        if state == MeshState::Clean {
            return Ok(&self.mesh);
        }
        if store.len() < 3 {
            return Err(ProbeError::InsufficientProbes { count: store.len() });
        }

        if state == MeshState::TopologyDirty {
            let ground = store.ground_positions();
            let triangulation = delaunay::triangulate(&ground)?;
            let report = TriangulationReport::build(&ground, &triangulation.indices);
            report.log_illegal_edges();
            self.mesh.indices = triangulation.indices;
            self.report = Some(report);
            self.topology_revision = Some(store.topology_revision());
            self.topology_builds += 1;
            debug!(
                "Rebuilt probe mesh topology: {} probes, {} triangles",
                store.len(),
                self.mesh.triangle_count()
            );
        } else {
            debug!("Refreshed probe mesh attributes for {} probes", store.len());
        }

        self.mesh.vertices = store
            .probes()
            .iter()
            .map(|p| ProbeVertex {
                position: p.position.to_array(),
                sh: p.coefficients.map(|c| c.to_array()),
            })
            .collect();
        self.coefficients_revision = Some(store.coefficients_revision());
        self.attribute_builds += 1;

        Ok(&self.mesh)
    }

    /// The last built mesh (possibly stale).
    pub fn mesh(&self) -> &ProbeMesh { &self.mesh }

    /// Legality audit of the last triangulation.
    pub fn report(&self) -> Option<&TriangulationReport> { self.report.as_ref() }

    pub fn topology_builds(&self) -> usize { self.topology_builds }
    pub fn attribute_builds(&self) -> usize { self.attribute_builds }
}
