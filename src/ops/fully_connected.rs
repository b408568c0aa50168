//! 8-bit quantized fully-connected operator: creation and runtime binding.
//!
//! An operator is compiled once — parameters validated, requantization
//! derived, weights packed — and then bound to fresh input/output buffers
//! for every inference call. Creation is the expensive step; binding is a
//! handful of checks and borrows.
//!
//! The actual tiled integer GEMM is external: an executor walks the
//! [`GemmBinding`], streams the packed weights, and applies the fused
//! requantization into the output buffer.

use std::fmt;

use rayon::ThreadPool;

use crate::error::{OperatorError, OperatorResult};
use crate::microarch::KernelContext;
use crate::packing::{PackedWeights, ReferencePacker, WeightPacker};
use crate::requantization::RequantizationParams;
use crate::validation;

/// Affine quantization parameters for one tensor:
/// `real = scale * (quantized - zero_point)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizationParams {
    pub scale: f32,
    pub zero_point: u8,
}

impl QuantizationParams {
    pub fn new(scale: f32, zero_point: u8) -> Self {
        Self { scale, zero_point }
    }
}

/// Storage format tag carried by compiled operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorFormat {
    /// 8-bit unsigned affine quantization.
    Quint8,
}

/// Execution class of a compiled operator.
///
/// Fully-connected operators are pure matrix multiplies: the executor reads
/// batch rows directly and skips all patch-gathering logic a convolution
/// would need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Gemm,
}

/// A compiled fully-connected operator: packed weights plus fused
/// requantization parameters and shape metadata.
///
/// Immutable once created. [`bind`](Self::bind) borrows it per inference
/// call; dropping it releases the packed buffer. The packed buffer and
/// requantization parameters are read-only after creation and safe to share
/// across concurrently executing threads.
#[derive(Debug)]
pub struct QuantizedFullyConnected {
    packed: PackedWeights,
    requantization: RequantizationParams,
    input_channels: usize,
    output_channels: usize,
    groups: usize,
    format: OperatorFormat,
    kind: OperatorKind,
}

impl QuantizedFullyConnected {
    /// Validate parameters, derive the fused requantization, and pack the
    /// row-major `[output_channels, input_channels]` kernel with its bias
    /// into the tile layout of `ctx`.
    ///
    /// On any failure nothing partially constructed escapes; the error names
    /// the offending parameter and a matching diagnostic is logged first.
    ///
    /// # Errors
    ///
    /// - [`OperatorError::Uninitialized`] — `ctx` has no geometry.
    /// - [`OperatorError::InvalidParameter`] — zero channel count, slice
    ///   length mismatch, out-of-domain scale, or empty clamp range.
    /// - [`OperatorError::UnsupportedParameter`] — the fused scale leaves
    ///   the (0, 1) window the fixed-point requantization path supports.
    /// - [`OperatorError::OutOfMemory`] — packed buffer allocation failed.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &KernelContext,
        input_channels: usize,
        output_channels: usize,
        input: QuantizationParams,
        kernel_params: QuantizationParams,
        output: QuantizationParams,
        output_min: u8,
        output_max: u8,
        kernel: &[u8],
        bias: &[i32],
    ) -> OperatorResult<Self> {
        Self::with_packer(
            ctx,
            input_channels,
            output_channels,
            input,
            kernel_params,
            output,
            output_min,
            output_max,
            kernel,
            bias,
            &ReferencePacker,
        )
    }

    /// [`new`](Self::new) with an explicit packing routine, for targets
    /// whose vectorized kernels want their own streaming order.
    #[allow(clippy::too_many_arguments)]
    pub fn with_packer(
        ctx: &KernelContext,
        input_channels: usize,
        output_channels: usize,
        input: QuantizationParams,
        kernel_params: QuantizationParams,
        output: QuantizationParams,
        output_min: u8,
        output_max: u8,
        kernel: &[u8],
        bias: &[i32],
        packer: &dyn WeightPacker,
    ) -> OperatorResult<Self> {
        let invalid = |message: String| {
            log::error!("cannot create fully connected operator: {message}");
            OperatorError::InvalidParameter(message)
        };

        if !ctx.is_initialized() {
            log::error!("cannot create fully connected operator: kernel context is not initialized");
            return Err(OperatorError::Uninitialized);
        }
        validation::validate_channels(input_channels, output_channels).map_err(invalid)?;
        validation::validate_len("kernel", kernel.len(), output_channels * input_channels)
            .map_err(invalid)?;
        validation::validate_len("bias", bias.len(), output_channels).map_err(invalid)?;
        validation::validate_scale("input", input.scale).map_err(invalid)?;
        validation::validate_scale("kernel", kernel_params.scale).map_err(invalid)?;
        validation::validate_scale("output", output.scale).map_err(invalid)?;
        validation::validate_clamp_range(output_min, output_max).map_err(invalid)?;

        let requantization_scale = input.scale * kernel_params.scale / output.scale;
        if requantization_scale >= 1.0 {
            let message = format!(
                "{:.7e} input scale, {:.7e} kernel scale, and {:.7e} output scale produce \
                 requantization scale {:.7e}; the fixed-point path only scales down",
                input.scale, kernel_params.scale, output.scale, requantization_scale
            );
            log::error!("cannot create fully connected operator: {message}");
            return Err(OperatorError::UnsupportedParameter(message));
        }
        let requantization = RequantizationParams::try_from_scale(
            requantization_scale,
            input.zero_point,
            kernel_params.zero_point,
            output.zero_point,
            output_min,
            output_max,
        )
        .map_err(|message| {
            log::error!("cannot create fully connected operator: {message}");
            OperatorError::UnsupportedParameter(message)
        })?;

        let mut packed = PackedWeights::allocate(
            ctx.nr,
            ctx.kr,
            output_channels,
            input_channels,
            kernel_params.zero_point,
        )
        .map_err(|message| {
            log::error!("cannot create fully connected operator: {message}");
            OperatorError::OutOfMemory(message)
        })?;
        packer.pack(output_channels, input_channels, kernel, bias, &mut packed);

        log::debug!(
            "created fully connected operator: {output_channels}x{input_channels} channels \
             packed to {}x{} ({} bytes) on {}",
            packed.n_stride(),
            packed.k_stride(),
            packed.as_bytes().len(),
            ctx.arch,
        );
        Ok(Self {
            packed,
            requantization,
            input_channels,
            output_channels,
            groups: 1,
            format: OperatorFormat::Quint8,
            kind: OperatorKind::Gemm,
        })
    }

    /// Bind caller buffers and a batch size for one execution.
    ///
    /// Batch rows map directly to GEMM rows: `batch_size` becomes M, with
    /// one row of `input_stride` / `output_stride` elements per sample. The
    /// returned binding is an independent value; binding again with
    /// different buffers or batch sizes is the intended way to reuse one
    /// packed operator across many inference calls, and a failed bind
    /// leaves nothing modified. The packed weights and requantization
    /// parameters are never touched.
    ///
    /// `threadpool` is handed through to the executor untouched.
    ///
    /// # Errors
    ///
    /// - [`OperatorError::Uninitialized`] — `ctx` has no geometry.
    /// - [`OperatorError::InvalidParameter`] — zero batch size, stride
    ///   smaller than the channel count, or a buffer that does not cover
    ///   `batch_size` rows.
    pub fn bind<'a>(
        &'a self,
        ctx: &KernelContext,
        batch_size: usize,
        input: &'a [u8],
        input_stride: usize,
        output: &'a mut [u8],
        output_stride: usize,
        threadpool: Option<&'a ThreadPool>,
    ) -> OperatorResult<GemmBinding<'a>> {
        let invalid = |message: String| {
            log::error!("cannot bind fully connected operator: {message}");
            OperatorError::InvalidParameter(message)
        };

        if !ctx.is_initialized() {
            log::error!("cannot bind fully connected operator: kernel context is not initialized");
            return Err(OperatorError::Uninitialized);
        }
        validation::validate_batch_size(batch_size).map_err(invalid)?;
        validation::validate_row_buffer(
            "input",
            input.len(),
            batch_size,
            input_stride,
            self.input_channels,
        )
        .map_err(invalid)?;
        validation::validate_row_buffer(
            "output",
            output.len(),
            batch_size,
            output_stride,
            self.output_channels,
        )
        .map_err(invalid)?;

        Ok(GemmBinding {
            op: self,
            batch_size,
            input,
            input_stride,
            output,
            output_stride,
            threadpool,
        })
    }

    /// Packed weight-and-bias buffer in kernel consumption order.
    #[inline]
    pub fn packed_weights(&self) -> &PackedWeights {
        &self.packed
    }

    /// Fused requantization parameters, fixed at creation.
    #[inline]
    pub fn requantization(&self) -> &RequantizationParams {
        &self.requantization
    }

    #[inline]
    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    #[inline]
    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    /// Channel groups; always 1 for fully-connected operators.
    #[inline]
    pub fn groups(&self) -> usize {
        self.groups
    }

    #[inline]
    pub fn format(&self) -> OperatorFormat {
        self.format
    }

    #[inline]
    pub fn kind(&self) -> OperatorKind {
        self.kind
    }
}

/// One inference call's runtime state: the operator, the batch size, and
/// borrowed input/output rows.
///
/// Produced fresh by every [`QuantizedFullyConnected::bind`]; the borrow
/// rules guarantee the buffers outlive the execution call and that no two
/// executions mutate the same output concurrently. The external executor
/// reads everything here, streams the packed weights tile by tile, and
/// requantizes into the output rows.
pub struct GemmBinding<'a> {
    op: &'a QuantizedFullyConnected,
    batch_size: usize,
    input: &'a [u8],
    input_stride: usize,
    output: &'a mut [u8],
    output_stride: usize,
    threadpool: Option<&'a ThreadPool>,
}

impl<'a> GemmBinding<'a> {
    /// The compiled operator this binding executes.
    #[inline]
    pub fn operator(&self) -> &'a QuantizedFullyConnected {
        self.op
    }

    /// GEMM row count for this call.
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    pub fn input_stride(&self) -> usize {
        self.input_stride
    }

    #[inline]
    pub fn output_stride(&self) -> usize {
        self.output_stride
    }

    /// One sample's quantized activations.
    #[inline]
    pub fn input_row(&self, row: usize) -> &[u8] {
        let start = row * self.input_stride;
        &self.input[start..start + self.op.input_channels]
    }

    /// One sample's output slot.
    #[inline]
    pub fn output_row_mut(&mut self, row: usize) -> &mut [u8] {
        let start = row * self.output_stride;
        &mut self.output[start..start + self.op.output_channels]
    }

    /// Thread pool for the executor; `None` runs on the calling thread.
    #[inline]
    pub fn threadpool(&self) -> Option<&'a ThreadPool> {
        self.threadpool
    }
}

impl fmt::Debug for GemmBinding<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GemmBinding")
            .field("batch_size", &self.batch_size)
            .field("input_channels", &self.op.input_channels)
            .field("output_channels", &self.op.output_channels)
            .field("input_stride", &self.input_stride)
            .field("output_stride", &self.output_stride)
            .field("threadpool", &self.threadpool.is_some())
            .finish()
    }
}
