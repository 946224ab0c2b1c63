// Error taxonomy for the probe network.
// Every variant is a broken caller precondition; nothing here is retried.

use thiserror::Error;

/// Failures of the incremental triangulator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Fewer than 3 points were handed to the triangulator.
    #[error("triangulation needs at least 3 points, got {0}")]
    InsufficientPoints(usize),

    /// The first three points are collinear or coincident.
    #[error("seed points 0, 1, 2 are collinear")]
    DegenerateSeed,

    /// The point coincides with an already inserted point.
    #[error("point {index} duplicates point {of}")]
    DuplicatePoint {
        index: usize,
        of: usize,
    },

    /// No triangle contains the point and no boundary edge faces it.
    #[error("no candidate triangle found for point {0}")]
    NoCandidateTriangle(usize),

    /// Two neighbouring triangles disagree about their shared edge.
    #[error("triangle {triangle} has no edge matching neighbour {neighbour}")]
    BrokenAdjacency {
        triangle: usize,
        neighbour: usize,
    },

    /// A camera footprint or other 2D extent collapsed to zero area.
    #[error("degenerate footprint: {0}")]
    DegenerateFootprint(String),
}

/// Crate-wide error.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Mesh build requested with fewer than 3 probes.
    #[error("at least 3 probes are needed to build the environment mesh, got {count}")]
    InsufficientProbes { count: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed probe file (negative count, truncated record).
    #[error("invalid probe file: {0}")]
    InvalidProbeFile(String),

    /// The cube-face renderer's Begin/Render/Read/End sequence was violated.
    #[error("cube map renderer contract violated: {0}")]
    RendererContract(String),

    #[error("probe index {index} out of range ({count} probes)")]
    ProbeIndexOutOfRange { index: usize, count: usize },
}

pub type Result<T> = std::result::Result<T, ProbeError>;
