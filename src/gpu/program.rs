//! Owned kernel programs.

use naga::front::wgsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};

use super::GpuDevice;
use crate::error::{KernelError, SimulationError};
use crate::shader::{KernelSource, KernelStage};
use crate::uniforms::ParamLayout;

/// A compiled kernel and its reflected parameter layout, or the diagnostics
/// explaining why there is none.
///
/// An invalid program is kept rather than retried: using it is fatal for the
/// run, and the operator fixes the source and restarts.
#[derive(Debug)]
pub enum Program<K> {
    Ready {
        label: String,
        kernel: K,
        layout: ParamLayout,
    },
    Invalid {
        label: String,
        diagnostics: String,
    },
}

impl<K> Program<K> {
    /// Validate, reflect and build `source` on `device`.
    ///
    /// Failures are logged with their diagnostics and yield an invalid handle.
    pub fn compile<D>(device: &mut D, source: &KernelSource) -> Self
    where
        D: GpuDevice<Kernel = K>,
    {
        match Self::try_compile(device, source) {
            Ok(program) => program,
            Err(e) => {
                log::error!("{}", e);
                Program::Invalid {
                    label: e.label().to_string(),
                    diagnostics: e.diagnostics().to_string(),
                }
            }
        }
    }

    fn try_compile<D>(device: &mut D, source: &KernelSource) -> Result<Self, KernelError>
    where
        D: GpuDevice<Kernel = K>,
    {
        let module = validate_wgsl(source)?;
        let layout = ParamLayout::from_module(&module);
        log::debug!(
            "{}: {} parameter(s), {} bytes",
            source.label,
            layout.names().count(),
            layout.size()
        );
        let kernel = device.compile(source, &layout)?;
        Ok(Program::Ready {
            label: source.label.clone(),
            kernel,
            layout,
        })
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Program::Ready { .. })
    }

    pub fn label(&self) -> &str {
        match self {
            Program::Ready { label, .. } | Program::Invalid { label, .. } => label,
        }
    }

    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Program::Ready { .. } => None,
            Program::Invalid { diagnostics, .. } => Some(diagnostics),
        }
    }

    /// The kernel and layout, or the fatal error for using an invalid handle.
    pub fn ready(&self) -> Result<(&K, &ParamLayout), SimulationError> {
        match self {
            Program::Ready { kernel, layout, .. } => Ok((kernel, layout)),
            Program::Invalid { label, diagnostics } => Err(SimulationError::InvalidProgram {
                label: label.clone(),
                diagnostics: diagnostics.clone(),
            }),
        }
    }
}

/// Parse and validate WGSL, and check the entry points its stage requires.
fn validate_wgsl(source: &KernelSource) -> Result<naga::Module, KernelError> {
    let module = wgsl::parse_str(&source.wgsl).map_err(|err| KernelError::Parse {
        label: source.label.clone(),
        diagnostics: err.emit_to_string(&source.wgsl),
    })?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator
        .validate(&module)
        .map_err(|err| KernelError::Validation {
            label: source.label.clone(),
            diagnostics: err.emit_to_string(&source.wgsl),
        })?;

    let required: &[(&str, naga::ShaderStage)] = match source.stage {
        KernelStage::Update => &[(KernelStage::UPDATE_ENTRY, naga::ShaderStage::Compute)],
        KernelStage::Render => &[
            (KernelStage::VERTEX_ENTRY, naga::ShaderStage::Vertex),
            (KernelStage::FRAGMENT_ENTRY, naga::ShaderStage::Fragment),
        ],
    };
    for (name, stage) in required {
        let found = module
            .entry_points
            .iter()
            .any(|ep| ep.name == *name && ep.stage == *stage);
        if !found {
            return Err(KernelError::Validation {
                label: source.label.clone(),
                diagnostics: format!("missing {:?} entry point '{}'", stage, name),
            });
        }
    }

    Ok(module)
}
