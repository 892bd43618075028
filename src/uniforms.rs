//! Kernel parameter contracts.
//!
//! Each kernel consumes one `var<uniform>` struct. Rather than trusting a
//! hand-maintained Rust mirror of that struct, the layout is reflected from
//! the kernel's WGSL with naga, and values are written by logical name:
//!
//! ```ignore
//! let layout = ParamLayout::reflect(&source)?;
//! let mut block = ParamBlock::new("update", layout);
//! block.set("deltaTime", 0.016f32);
//! block.set("attractor1Position", Vec3::new(3.0, 1.0, 0.0));
//! device.upload_params(&kernel, block.bytes());
//! ```
//!
//! A name the kernel does not declare is a configuration mismatch: it is
//! logged once and the write becomes a no-op, so the value silently stops
//! reaching the GPU. [`ParamBlock::mismatches`] exposes these for tests and
//! the control panel.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use glam::{Mat4, Vec2, Vec3, Vec4};
use naga::{ScalarKind, TypeInner, VectorSize};

use crate::ParamContract;

/// Host-shareable types a contract member can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    F32,
    U32,
    I32,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl ParamKind {
    /// Get the WGSL type name for this kind.
    pub fn wgsl_type(&self) -> &'static str {
        match self {
            ParamKind::F32 => "f32",
            ParamKind::U32 => "u32",
            ParamKind::I32 => "i32",
            ParamKind::Vec2 => "vec2<f32>",
            ParamKind::Vec3 => "vec3<f32>",
            ParamKind::Vec4 => "vec4<f32>",
            ParamKind::Mat4 => "mat4x4<f32>",
        }
    }

    /// Get the byte size of this kind (without trailing padding).
    pub fn byte_size(&self) -> usize {
        match self {
            ParamKind::F32 | ParamKind::U32 | ParamKind::I32 => 4,
            ParamKind::Vec2 => 8,
            ParamKind::Vec3 => 12,
            ParamKind::Vec4 => 16,
            ParamKind::Mat4 => 64,
        }
    }

    fn from_naga(inner: &TypeInner) -> Option<Self> {
        match *inner {
            TypeInner::Scalar(scalar) if scalar.width == 4 => match scalar.kind {
                ScalarKind::Float => Some(ParamKind::F32),
                ScalarKind::Uint => Some(ParamKind::U32),
                ScalarKind::Sint => Some(ParamKind::I32),
                _ => None,
            },
            TypeInner::Vector { size, scalar }
                if scalar.kind == ScalarKind::Float && scalar.width == 4 =>
            {
                match size {
                    VectorSize::Bi => Some(ParamKind::Vec2),
                    VectorSize::Tri => Some(ParamKind::Vec3),
                    VectorSize::Quad => Some(ParamKind::Vec4),
                }
            }
            TypeInner::Matrix {
                columns: VectorSize::Quad,
                rows: VectorSize::Quad,
                scalar,
            } if scalar.kind == ScalarKind::Float && scalar.width == 4 => Some(ParamKind::Mat4),
            _ => None,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wgsl_type())
    }
}

/// A value written into a parameter block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamValue {
    F32(f32),
    U32(u32),
    I32(i32),
    /// Travels as a `u32` (0 or 1); WGSL uniforms cannot hold `bool`.
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl ParamValue {
    /// The member kind this value is written as.
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::F32(_) => ParamKind::F32,
            ParamValue::U32(_) | ParamValue::Bool(_) => ParamKind::U32,
            ParamValue::I32(_) => ParamKind::I32,
            ParamValue::Vec2(_) => ParamKind::Vec2,
            ParamValue::Vec3(_) => ParamKind::Vec3,
            ParamValue::Vec4(_) => ParamKind::Vec4,
            ParamValue::Mat4(_) => ParamKind::Mat4,
        }
    }

    fn write_into(&self, dst: &mut [u8]) {
        match self {
            ParamValue::F32(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            ParamValue::U32(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            ParamValue::I32(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            ParamValue::Bool(v) => dst.copy_from_slice(bytemuck::bytes_of(&u32::from(*v))),
            ParamValue::Vec2(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            ParamValue::Vec3(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            ParamValue::Vec4(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            ParamValue::Mat4(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
        }
    }
}

// Conversion traits for ergonomic API
impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::F32(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::U32(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::I32(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<Vec2> for ParamValue {
    fn from(v: Vec2) -> Self {
        ParamValue::Vec2(v)
    }
}

impl From<Vec3> for ParamValue {
    fn from(v: Vec3) -> Self {
        ParamValue::Vec3(v)
    }
}

impl From<Vec4> for ParamValue {
    fn from(v: Vec4) -> Self {
        ParamValue::Vec4(v)
    }
}

impl From<Mat4> for ParamValue {
    fn from(v: Mat4) -> Self {
        ParamValue::Mat4(v)
    }
}

/// One member of a reflected uniform struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSlot {
    pub offset: u32,
    pub kind: ParamKind,
}

/// Byte layout of a kernel's uniform struct, keyed by member name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamLayout {
    slots: BTreeMap<String, ParamSlot>,
    size: u32,
}

impl ParamLayout {
    /// Parse WGSL and reflect its first uniform struct.
    ///
    /// A kernel without a uniform struct yields an empty layout.
    pub fn reflect(wgsl: &str) -> Result<Self, naga::front::wgsl::ParseError> {
        let module = naga::front::wgsl::parse_str(wgsl)?;
        Ok(Self::from_module(&module))
    }

    /// Reflect the first uniform struct of an already-parsed module.
    pub fn from_module(module: &naga::Module) -> Self {
        let uniform_struct = module
            .global_variables
            .iter()
            .filter(|(_, var)| var.space == naga::AddressSpace::Uniform)
            .find_map(|(_, var)| match &module.types[var.ty].inner {
                TypeInner::Struct { members, span } => Some((members, *span)),
                _ => None,
            });

        let Some((members, span)) = uniform_struct else {
            return Self::default();
        };

        let mut slots = BTreeMap::new();
        for member in members {
            let Some(name) = member.name.as_ref() else {
                continue;
            };
            match ParamKind::from_naga(&module.types[member.ty].inner) {
                Some(kind) => {
                    slots.insert(
                        name.clone(),
                        ParamSlot {
                            offset: member.offset,
                            kind,
                        },
                    );
                }
                None => log::debug!("uniform member '{}' has an unsupported type, skipped", name),
            }
        }

        Self { slots, size: span }
    }

    /// Look up a member by name.
    pub fn slot(&self, name: &str) -> Option<ParamSlot> {
        self.slots.get(name).copied()
    }

    /// Size of the struct in bytes, as WGSL lays it out.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Size rounded up to 16 bytes (and never zero), for the uniform buffer.
    pub fn buffer_size(&self) -> u64 {
        ((self.size as u64).max(16) + 15) & !15
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate over member names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Names of a contract this layout does not declare.
    pub fn missing<C: ParamContract>(&self) -> Vec<&'static str> {
        C::NAMES
            .iter()
            .copied()
            .filter(|name| !self.slots.contains_key(*name))
            .collect()
    }
}

/// Outcome of a single [`ParamBlock::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamWrite {
    Written,
    /// The kernel declares no member with this name.
    Missing,
    /// The member exists with a different type.
    KindMismatch { expected: ParamKind, found: ParamKind },
}

/// A contract name that did not reach the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamMismatch {
    pub name: String,
    pub write: ParamWrite,
}

impl fmt::Display for ParamMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.write {
            ParamWrite::Missing => write!(f, "'{}' is not declared by the kernel", self.name),
            ParamWrite::KindMismatch { expected, found } => write!(
                f,
                "'{}' is declared as {} but written as {}",
                self.name, expected, found
            ),
            ParamWrite::Written => write!(f, "'{}' ok", self.name),
        }
    }
}

/// The byte image of one kernel's uniform struct.
#[derive(Debug, Clone)]
pub struct ParamBlock {
    kernel: String,
    layout: ParamLayout,
    bytes: Vec<u8>,
    mismatches: Vec<ParamMismatch>,
    warned: HashSet<String>,
}

impl ParamBlock {
    /// Create a zeroed block for the kernel labelled `kernel`.
    pub fn new(kernel: impl Into<String>, layout: ParamLayout) -> Self {
        let bytes = vec![0; layout.buffer_size() as usize];
        Self {
            kernel: kernel.into(),
            layout,
            bytes,
            mismatches: Vec::new(),
            warned: HashSet::new(),
        }
    }

    /// Write a value by logical name.
    ///
    /// Unknown names and type mismatches are logged once per name and leave
    /// the block untouched.
    pub fn set<V: Into<ParamValue>>(&mut self, name: &str, value: V) -> ParamWrite {
        let value = value.into();
        let outcome = match self.layout.slot(name) {
            None => ParamWrite::Missing,
            Some(slot) if slot.kind != value.kind() => ParamWrite::KindMismatch {
                expected: slot.kind,
                found: value.kind(),
            },
            Some(slot) => {
                let start = slot.offset as usize;
                let end = start + slot.kind.byte_size();
                value.write_into(&mut self.bytes[start..end]);
                ParamWrite::Written
            }
        };

        if outcome != ParamWrite::Written && self.warned.insert(name.to_string()) {
            let mismatch = ParamMismatch {
                name: name.to_string(),
                write: outcome,
            };
            log::warn!(
                "{} kernel parameter mismatch: {}; the upload is a no-op",
                self.kernel,
                mismatch
            );
            self.mismatches.push(mismatch);
        }

        outcome
    }

    /// Write every member of a contract.
    pub fn write<C: ParamContract>(&mut self, contract: &C) {
        contract.write_params(self);
    }

    /// Read back a member as raw bytes (test and inspection helper).
    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        let slot = self.layout.slot(name)?;
        let start = slot.offset as usize;
        Some(&self.bytes[start..start + slot.kind.byte_size()])
    }

    /// Read back an `f32` member.
    pub fn get_f32(&self, name: &str) -> Option<f32> {
        let slot = self.layout.slot(name)?;
        if slot.kind != ParamKind::F32 {
            return None;
        }
        self.get_bytes(name).map(bytemuck::pod_read_unaligned)
    }

    /// Read back a `vec3<f32>` member.
    pub fn get_vec3(&self, name: &str) -> Option<Vec3> {
        let slot = self.layout.slot(name)?;
        if slot.kind != ParamKind::Vec3 {
            return None;
        }
        self.get_bytes(name).map(bytemuck::pod_read_unaligned)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    /// Every name that failed to reach the kernel so far.
    pub fn mismatches(&self) -> &[ParamMismatch] {
        &self.mismatches
    }
}

/// Parameters consumed by the update kernel each tick.
#[derive(Debug, Clone, Copy, PartialEq, ParamContract)]
pub struct UpdateParams {
    /// Simulated-time delta: real delta times `sim_speed`.
    pub delta_time: f32,
    pub sphere_enabled: bool,
    pub attractor1_position: Vec3,
    pub attractor2_position: Vec3,
    pub attractor_gravity: f32,
    /// `center.xyz` + `radius`.
    pub bounding_sphere: Vec4,
    pub floor_y: f32,
    pub floor_enabled: bool,
    pub gradient_start_color: Vec3,
    pub gradient_end_color: Vec3,
    pub color_scale: f32,
}

/// Parameters consumed by the render kernel each draw.
#[derive(Debug, Clone, Copy, PartialEq, ParamContract)]
pub struct RenderParams {
    pub view_matrix: Mat4,
    pub projection_matrix: Mat4,
    pub particle_size: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    const WGSL: &str = r#"
struct Params {
    deltaTime: f32,
    origin: vec3<f32>,
    enabled: u32,
    tint: vec4<f32>,
    transform: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> params: Params;

@compute @workgroup_size(1)
fn main() {
    let x = params.deltaTime;
}
"#;

    #[test]
    fn test_reflect_offsets_follow_wgsl_alignment() {
        let layout = ParamLayout::reflect(WGSL).unwrap();
        assert_eq!(layout.slot("deltaTime").unwrap().offset, 0);
        // vec3 aligns to 16
        assert_eq!(layout.slot("origin").unwrap().offset, 16);
        // a scalar fits in the vec3's trailing bytes
        assert_eq!(layout.slot("enabled").unwrap().offset, 28);
        assert_eq!(layout.slot("tint").unwrap().offset, 32);
        assert_eq!(layout.slot("transform").unwrap(), ParamSlot { offset: 48, kind: ParamKind::Mat4 });
        assert_eq!(layout.size(), 112);
    }

    #[test]
    fn test_reflect_without_uniform_is_empty() {
        let layout = ParamLayout::reflect("@compute @workgroup_size(1) fn main() {}").unwrap();
        assert!(layout.is_empty());
        assert_eq!(layout.buffer_size(), 16);
    }

    #[test]
    fn test_set_writes_at_reflected_offset() {
        let mut block = ParamBlock::new("test", ParamLayout::reflect(WGSL).unwrap());
        assert_eq!(block.set("origin", Vec3::new(1.0, 2.0, 3.0)), ParamWrite::Written);
        assert_eq!(block.set("enabled", true), ParamWrite::Written);
        assert_eq!(block.get_vec3("origin"), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(&block.bytes()[28..32], &1u32.to_le_bytes());
        assert!(block.mismatches().is_empty());
    }

    #[test]
    fn test_missing_name_is_a_recorded_no_op() {
        let mut block = ParamBlock::new("test", ParamLayout::reflect(WGSL).unwrap());
        let before = block.bytes().to_vec();

        assert_eq!(block.set("deltaTme", 0.5f32), ParamWrite::Missing);
        assert_eq!(block.set("deltaTme", 0.7f32), ParamWrite::Missing);

        assert_eq!(block.bytes(), &before[..]);
        assert_eq!(block.mismatches().len(), 1);
        assert_eq!(block.mismatches()[0].name, "deltaTme");
    }

    #[test]
    fn test_kind_mismatch_is_a_no_op() {
        let mut block = ParamBlock::new("test", ParamLayout::reflect(WGSL).unwrap());
        let outcome = block.set("deltaTime", Vec3::ONE);
        assert_eq!(
            outcome,
            ParamWrite::KindMismatch {
                expected: ParamKind::F32,
                found: ParamKind::Vec3
            }
        );
        assert_eq!(block.get_f32("deltaTime"), Some(0.0));
    }

    #[test]
    fn test_missing_contract_names() {
        let layout = ParamLayout::reflect(WGSL).unwrap();
        let missing = layout.missing::<RenderParams>();
        assert_eq!(missing, vec!["viewMatrix", "projectionMatrix", "particleSize"]);
    }
}
