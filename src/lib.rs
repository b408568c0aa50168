//! q8-kernels: lifecycle and packing contracts for 8-bit quantized
//! fully-connected operators.
//!
//! This crate is the control layer of a quantized (u8, affine) matrix-multiply
//! operator for CPU inference:
//! - **Parameter validation**: quantization scales, shapes, batch size
//! - **Requantization derivation**: one fused Q31 rescale factor plus the
//!   output zero point and clamp bounds
//! - **Weight packing**: tile-aligned layout matched to the integer GEMM
//!   microkernel geometry of the detected CPU
//! - **Runtime binding**: attaching caller-owned buffers per inference call
//!   without repacking
//!
//! The vectorized GEMM microkernel and the thread-pool scheduler are external
//! collaborators; this crate defines the memory-layout and numeric contracts
//! they consume.
//!
//! # Quick Start
//!
//! ```ignore
//! use q8_kernels::{kernel_context, QuantizationParams, QuantizedFullyConnected};
//!
//! let ctx = kernel_context();
//! let op = QuantizedFullyConnected::new(
//!     ctx, input_channels, output_channels,
//!     QuantizationParams::new(0.5, 0),
//!     QuantizationParams::new(0.25, 128),
//!     QuantizationParams::new(0.5, 0),
//!     0, 255, &kernel, &bias,
//! )?;
//! let binding = op.bind(ctx, batch, &input, in_stride, &mut output, out_stride, None)?;
//! // hand the binding to the executor
//! ```

pub mod error;
pub mod microarch;
pub mod ops;
pub mod packing;
pub mod requantization;
pub mod validation;

pub use error::{OperatorError, OperatorResult};
pub use microarch::{kernel_context, KernelContext, MicroArch};
pub use ops::fully_connected::{
    GemmBinding, OperatorFormat, OperatorKind, QuantizationParams, QuantizedFullyConnected,
};
pub use packing::{PackedWeights, ReferencePacker, WeightPacker};
pub use requantization::RequantizationParams;
