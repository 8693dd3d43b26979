//! SIMD ray-tracing and path-tracing rendering backend core.
//!
//! `simd` supplies the lane-packed primitives everything else is built on;
//! `scene` is the caller-populated data model; `context` holds one thread's
//! recursion-frame stack; `solver` resolves ray/surface hits into it;
//! `shade` turns a resolved hit into a color; `recurse` drives the
//! intersect/shade/bounce loop; `schedule` is the optional SIMD-buffer
//! reordering layer; `pathtrace` is the Monte-Carlo alternative to
//! `recurse`'s recursive ray tree; `frame` ties it all to a framebuffer.

pub mod context;
pub mod error;
pub mod frame;
pub mod math;
pub mod pathtrace;
pub mod recurse;
pub mod scene;
pub mod schedule;
pub mod shade;
pub mod simd;
pub mod solver;

pub use error::Error;
