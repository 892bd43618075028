//! Kernel sources.
//!
//! The shipped kernels live next to this file as WGSL bodies. Their parameter
//! structs are not written by hand: the derived `WGSL_STRUCT` of
//! [`UpdateParams`] / [`RenderParams`] is prepended, so the names the host
//! writes and the names the kernel reads come from one place.

use crate::uniforms::{RenderParams, UpdateParams};
use crate::ParamContract;

const UPDATE_BODY: &str = include_str!("shaders/update.wgsl");
const RENDER_BODY: &str = include_str!("shaders/render.wgsl");

/// Which pass a kernel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelStage {
    /// Compute kernel advancing every particle in place.
    Update,
    /// Vertex + fragment program drawing every particle.
    Render,
}

impl KernelStage {
    pub const UPDATE_ENTRY: &'static str = "main";
    pub const VERTEX_ENTRY: &'static str = "vs_main";
    pub const FRAGMENT_ENTRY: &'static str = "fs_main";
}

/// WGSL source for one kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSource {
    pub label: String,
    pub stage: KernelStage,
    pub wgsl: String,
}

impl KernelSource {
    /// The shipped update kernel with `@workgroup_size(workgroup_size)`.
    ///
    /// The kernel reads and writes each particle's own slots only; nothing in
    /// it may depend on another particle, since updates happen in place.
    pub fn update(workgroup_size: u32) -> Self {
        Self {
            label: "Update Kernel".to_string(),
            stage: KernelStage::Update,
            wgsl: format!(
                "const WORKGROUP_SIZE: u32 = {}u;\n\n{}\n{}",
                workgroup_size,
                UpdateParams::WGSL_STRUCT,
                UPDATE_BODY
            ),
        }
    }

    /// The shipped render kernel.
    pub fn render() -> Self {
        Self {
            label: "Render Kernel".to_string(),
            stage: KernelStage::Render,
            wgsl: format!("{}\n{}", RenderParams::WGSL_STRUCT, RENDER_BODY),
        }
    }

    /// Caller-supplied WGSL, used verbatim.
    pub fn custom(label: impl Into<String>, stage: KernelStage, wgsl: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            stage,
            wgsl: wgsl.into(),
        }
    }
}
