// Engine module - SH probe network components
// Leaf-first: sh → probe → delaunay/validation → mesh → camera/cubemap → field → manager

pub mod camera;
pub mod cubemap;
pub mod delaunay;
pub mod error;
pub mod field;
pub mod manager;
pub mod mesh;
pub mod probe;
pub mod sh;
pub mod validation;

// Re-export commonly used items
pub use camera::Camera;
pub use cubemap::{
    CubeFace, CubeFaceSample, CubeMapFaces, CubeMapRenderer, CubemapShProjector, FaceSource, RadianceSource,
    RendererSession, SurfaceHit,
};
pub use delaunay::{triangulate, Triangulation};
pub use error::{GeometryError, ProbeError, Result};
pub use field::{AmbientField, AmbientMapTarget, AmbientMapUniforms, AmbientToggles, LambertRadiance};
pub use manager::{AmbientMapConfig, BakeConfig, BakeState, ProbeNetworkManager};
pub use mesh::{MeshBuilder, MeshState, ProbeMesh, ProbeVertex};
pub use probe::{Probe, ProbeStore};
pub use sh::{ShCoefficients, ShColor9, ShScalar9};
pub use validation::{IllegalEdge, TriangulationReport};
