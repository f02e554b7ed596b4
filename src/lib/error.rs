use thiserror::Error;

use crate::accel;

// Every variant is fatal for the run that produced it.
// Batches submitted before the failure are not rolled back
#[derive(Error, Debug)]
pub enum Error {
    #[error("Batch size {0} is not a perfect square")]
    NotSquare(usize),

    #[error("Tracer dimension `{0}` must be at least 1")]
    ZeroDimension(&'static str),

    #[error("Run of {0} rays does not fit the kernels' 32-bit offsets")]
    TooManyRays(u128),

    #[error("Scene holds {count} primitives, at most {max} can be indexed")]
    TooManyPrimitives { count: usize, max: u32 },

    #[error("No compatible accelerator device is available")]
    DeviceUnavailable,

    #[error("Kernel `{0}` is missing from the shader library")]
    KernelMissing(&'static str),

    #[error("Failed to compile pipeline for kernel `{kernel}`: {reason}")]
    PipelineCompilation { kernel: &'static str, reason: String },

    #[error("Failed to allocate {size} bytes for buffer `{label}`")]
    Allocation { label: String, size: u64 },

    #[error("Accelerator lacks a required capability: {0}")]
    Unsupported(accel::Capability),

    #[error("Failed to encode command sequence `{label}`: {reason}")]
    CommandSequence { label: String, reason: String },

    #[error("Submission was lost before it completed")]
    SubmissionLost,

    #[error("Failed to read back buffer `{label}`: {reason}")]
    Readback { label: String, reason: String },
}

impl Error {
    pub(crate) fn sequence(label: &str, reason: impl Into<String>) -> Self {
        Self::CommandSequence {
            label: label.to_owned(),
            reason: reason.into(),
        }
    }
}
