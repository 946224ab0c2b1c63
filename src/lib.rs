//! Spherical-harmonics light probe network.
//!
//! Probes scattered over a level store 9 SH coefficients of ambient light
//! (direct sky occlusion plus bounced indirect color). Their ground
//! positions are triangulated into a mesh that the renderer rasterizes into
//! an ambient lookup texture. Baking drives an external cube-map renderer
//! through a direct pass and a fixed number of indirect bounces.

pub mod engine;

pub use engine::*;
