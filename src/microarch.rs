//! CPU microarchitecture detection and Q8 GEMM tile geometry.
//!
//! Detects the CPU's integer-SIMD tier once at startup and derives the tile
//! geometry the quantized matrix-multiply microkernel operates on: `mr` batch
//! rows, `nr` output channels, and `kr` input-depth elements per inner-loop
//! step. Weight packing must align to `nr`/`kr` so the microkernel streams
//! full tiles without bounds checks.
//!
//! The geometry is exposed two ways:
//! - [`kernel_context()`] — detected once, cached for the process lifetime.
//! - [`KernelContext::with_geometry`] — an explicit context for embedders and
//!   tests that pin a layout.
//!
//! Every operator entry point takes a `&KernelContext`; a default-constructed
//! context carries no geometry and is rejected as uninitialized.

use std::fmt;
use std::sync::OnceLock;

/// Integer-SIMD tiers with distinct Q8 microkernel geometries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MicroArch {
    /// AVX-512 VNNI: `vpdpbusd` folds a 4-deep u8·i8 dot product per lane.
    Avx512Vnni,
    /// AVX2: `vpmaddubsw` processes input-depth pairs.
    Avx2,
    /// Baseline x86-64: SSE2 `pmaddwd` after widening, depth pairs.
    Sse2,
    /// AArch64 with the dot-product extension (`udot`), 4-deep.
    NeonDot,
    /// AArch64 baseline: `umull`/`usubl` widening accumulation, depth 1.
    Neon,
    /// Portable fallback.
    #[default]
    Scalar,
}

impl MicroArch {
    /// Q8 microkernel geometry `(mr, nr, kr)`: batch rows per invocation,
    /// output-channel tile width, input-depth tile.
    pub fn q8_geometry(self) -> (usize, usize, usize) {
        match self {
            // 16 i32 accumulator lanes per zmm, 4-deep dot instruction
            Self::Avx512Vnni => (8, 16, 4),
            // 8 i32 lanes per ymm, maddubsw pairs
            Self::Avx2 => (4, 8, 2),
            // 4 i32 lanes per xmm, widening madd pairs
            Self::Sse2 => (4, 4, 2),
            // udot: 4 lanes x 4-deep per instruction, two accumulator quads
            Self::NeonDot => (8, 8, 4),
            // widening multiply-accumulate, one depth element per step
            Self::Neon => (8, 8, 1),
            Self::Scalar => (4, 4, 1),
        }
    }

    /// Whether the tier has a fused multi-element integer dot instruction.
    pub fn has_dot_product(self) -> bool {
        matches!(self, Self::Avx512Vnni | Self::NeonDot)
    }
}

impl fmt::Display for MicroArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Avx512Vnni => "x86-64 AVX-512 VNNI",
            Self::Avx2 => "x86-64 AVX2",
            Self::Sse2 => "x86-64 SSE2",
            Self::NeonDot => "AArch64 NEON+DOT",
            Self::Neon => "AArch64 NEON",
            Self::Scalar => "Scalar",
        };
        write!(f, "{name}")
    }
}

/// Detect the integer-SIMD tier of the running CPU.
pub fn detect() -> MicroArch {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512vnni") {
            MicroArch::Avx512Vnni
        } else if is_x86_feature_detected!("avx2") {
            MicroArch::Avx2
        } else {
            MicroArch::Sse2
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        if std::arch::is_aarch64_feature_detected!("dotprod") {
            MicroArch::NeonDot
        } else {
            MicroArch::Neon
        }
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        MicroArch::Scalar
    }
}

/// Execution-capability context consumed by operator creation and binding.
///
/// Produced by one-time capability discovery ([`KernelContext::detect`] or
/// the cached [`kernel_context()`]) and read-only thereafter. The default
/// value carries no geometry and fails every entry point with
/// `Uninitialized`.
#[derive(Debug, Clone, Default)]
pub struct KernelContext {
    /// Detected (or declared) microarchitecture, informational.
    pub arch: MicroArch,
    /// Batch rows the executor blocks on per microkernel invocation.
    pub mr: usize,
    /// Output-channel tile width; packed rows pad to a multiple of this.
    pub nr: usize,
    /// Input-depth tile; packed columns pad to a multiple of this.
    pub kr: usize,
}

impl KernelContext {
    /// Run capability discovery and derive the geometry for this CPU.
    pub fn detect() -> Self {
        Self::from_arch(detect())
    }

    /// Context for a specific microarchitecture tier.
    pub fn from_arch(arch: MicroArch) -> Self {
        let (mr, nr, kr) = arch.q8_geometry();
        Self { arch, mr, nr, kr }
    }

    /// Context with an explicitly pinned geometry, bypassing detection.
    /// Intended for embedders that fix a layout and for tests.
    pub fn with_geometry(mr: usize, nr: usize, kr: usize) -> Self {
        Self {
            arch: MicroArch::Scalar,
            mr,
            nr,
            kr,
        }
    }

    /// Whether capability discovery has populated a usable geometry.
    pub fn is_initialized(&self) -> bool {
        self.mr != 0 && self.nr != 0 && self.kr != 0
    }
}

impl fmt::Display for KernelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | MR={} NR={} KR={}",
            self.arch, self.mr, self.nr, self.kr
        )
    }
}

static CONTEXT: OnceLock<KernelContext> = OnceLock::new();

/// Get the process-wide kernel context, detected once on first call.
pub fn kernel_context() -> &'static KernelContext {
    CONTEXT.get_or_init(KernelContext::detect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detected_context_is_initialized() {
        let ctx = kernel_context();
        eprintln!("KernelContext: {ctx}");
        assert!(ctx.is_initialized());
        assert!(ctx.nr >= 4);
        assert!(ctx.kr >= 1);
    }

    #[test]
    fn test_default_context_is_uninitialized() {
        assert!(!KernelContext::default().is_initialized());
    }

    #[test]
    fn test_geometry_avx512_vnni() {
        let (mr, nr, kr) = MicroArch::Avx512Vnni.q8_geometry();
        assert_eq!((mr, nr, kr), (8, 16, 4));
        assert!(MicroArch::Avx512Vnni.has_dot_product());
    }

    #[test]
    fn test_geometry_sse2_matches_pair_kernels() {
        // Baseline x86-64 kernels process depth pairs
        let (_, _, kr) = MicroArch::Sse2.q8_geometry();
        assert_eq!(kr, 2);
    }

    #[test]
    fn test_with_geometry_overrides_detection() {
        let ctx = KernelContext::with_geometry(4, 4, 8);
        assert!(ctx.is_initialized());
        assert_eq!(ctx.nr, 4);
        assert_eq!(ctx.kr, 8);
    }

    #[test]
    fn test_singleton_consistency() {
        let c1 = kernel_context();
        let c2 = kernel_context();
        assert_eq!(c1.arch, c2.arch);
        assert_eq!((c1.mr, c1.nr, c1.kr), (c2.mr, c2.nr, c2.kr));
    }
}
