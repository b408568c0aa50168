//! Tile-aligned packing of quantized weights and bias.
//!
//! The integer GEMM microkernel consumes weights one output tile at a time:
//! for each `kr`-deep block of the padded input dimension it streams `kr`
//! contiguous bytes for each of the tile's `nr` output rows, and after the
//! tile's weight bytes it loads the `nr` 32-bit bias accumulator seeds. Rows
//! and columns beyond the true channel counts are padded with the kernel
//! zero point; the kernel's zero-point subtraction turns those cells into an
//! exact zero contribution, so every tile is full and the inner loop never
//! bounds-checks.
//!
//! Layout, with `N = n_stride = round_up(output_channels, nr)` and
//! `K = k_stride = round_up(input_channels, kr)`:
//!
//! ```text
//! tile t (t = 0 .. N/nr):
//!   for kb in 0 .. K/kr:            | nr * kr weight bytes per block,
//!     for row in 0 .. nr:           | rows interleaved depth-tile-major
//!       kernel[t*nr + row][kb*kr ..][0 .. kr]
//!   for row in 0 .. nr:             | nr bias slots, little-endian i32
//!     bias[t*nr + row]
//! ```
//!
//! Total size: `N * (K + 4)` bytes. The buffer is written once at operator
//! creation and never mutated afterwards.

use std::mem;

/// Owned, padded, tile-ordered weight-and-bias buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedWeights {
    data: Vec<u8>,
    n_stride: usize,
    k_stride: usize,
    nr: usize,
    kr: usize,
}

impl PackedWeights {
    /// Allocate the padded buffer, prefilled with the kernel zero point.
    ///
    /// Prefilling covers every byte the packer does not overwrite: weight
    /// padding rows and columns, and the bias slots of padded rows (the
    /// executor computes padded rows into a full tile but never stores
    /// them). Fails with a message rather than aborting if the allocation
    /// cannot be satisfied.
    pub fn allocate(
        nr: usize,
        kr: usize,
        output_channels: usize,
        input_channels: usize,
        kernel_zero_point: u8,
    ) -> Result<Self, String> {
        let n_stride = round_up(output_channels, nr);
        let k_stride = round_up(input_channels, kr);
        let size = n_stride
            .checked_mul(k_stride + mem::size_of::<i32>())
            .ok_or_else(|| "packed buffer size overflows".to_string())?;
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| format!("failed to allocate {size} bytes for packed weights"))?;
        data.resize(size, kernel_zero_point);
        Ok(Self {
            data,
            n_stride,
            k_stride,
            nr,
            kr,
        })
    }

    /// Entire buffer, in kernel consumption order.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Output-channel count padded up to the tile width.
    #[inline]
    pub fn n_stride(&self) -> usize {
        self.n_stride
    }

    /// Input-channel count padded up to the depth tile.
    #[inline]
    pub fn k_stride(&self) -> usize {
        self.k_stride
    }

    /// Output-channel tile width the buffer is laid out for.
    #[inline]
    pub fn nr(&self) -> usize {
        self.nr
    }

    /// Input-depth tile the buffer is laid out for.
    #[inline]
    pub fn kr(&self) -> usize {
        self.kr
    }

    /// Number of output tiles.
    #[inline]
    pub fn tile_count(&self) -> usize {
        self.n_stride / self.nr
    }

    /// Bytes from one tile's start to the next: weights plus bias slots.
    #[inline]
    pub fn tile_stride(&self) -> usize {
        self.nr * (self.k_stride + mem::size_of::<i32>())
    }

    /// One tile's weight bytes, in microkernel streaming order.
    #[inline]
    pub fn tile_weights(&self, tile: usize) -> &[u8] {
        let base = tile * self.tile_stride();
        &self.data[base..base + self.nr * self.k_stride]
    }

    /// Weight byte for a (possibly padded) output channel and depth index.
    /// Follows the tile layout; padded positions read the kernel zero point.
    #[inline]
    pub fn weight(&self, channel: usize, k: usize) -> u8 {
        debug_assert!(channel < self.n_stride && k < self.k_stride);
        let base = (channel / self.nr) * self.tile_stride();
        let row = channel % self.nr;
        let offset = (k / self.kr * self.nr + row) * self.kr + k % self.kr;
        self.data[base + offset]
    }

    /// Bias accumulator seed for a (possibly padded) output channel.
    #[inline]
    pub fn bias(&self, channel: usize) -> i32 {
        debug_assert!(channel < self.n_stride);
        let base = (channel / self.nr) * self.tile_stride() + self.nr * self.k_stride;
        let offset = base + (channel % self.nr) * mem::size_of::<i32>();
        i32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap())
    }
}

#[inline]
fn round_up(value: usize, multiple: usize) -> usize {
    (value + multiple - 1) / multiple * multiple
}

/// Capability interface for weight repacking.
///
/// One operation: fill an allocated, zero-point-prefilled [`PackedWeights`]
/// from a row-major `[output_channels, input_channels]` kernel matrix and an
/// `[output_channels]` bias vector. Target-specific packers (matching a
/// vectorized kernel's exact streaming pattern) plug in through this trait;
/// [`ReferencePacker`] is the portable implementation.
pub trait WeightPacker {
    fn pack(
        &self,
        output_channels: usize,
        input_channels: usize,
        kernel: &[u8],
        bias: &[i32],
        packed: &mut PackedWeights,
    );
}

/// Portable packer implementing the canonical tile layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferencePacker;

impl WeightPacker for ReferencePacker {
    fn pack(
        &self,
        output_channels: usize,
        input_channels: usize,
        kernel: &[u8],
        bias: &[i32],
        packed: &mut PackedWeights,
    ) {
        debug_assert_eq!(kernel.len(), output_channels * input_channels);
        debug_assert_eq!(bias.len(), output_channels);
        let nr = packed.nr;
        let kr = packed.kr;
        let k_stride = packed.k_stride;
        let tile_stride = packed.tile_stride();

        for (tile, tile_start) in (0..output_channels).step_by(nr).enumerate() {
            let tile_rows = nr.min(output_channels - tile_start);
            let tile_base = tile * tile_stride;

            for (kb, k_start) in (0..input_channels).step_by(kr).enumerate() {
                let block_cols = kr.min(input_channels - k_start);
                for row in 0..tile_rows {
                    let src = (tile_start + row) * input_channels + k_start;
                    let dst = tile_base + (kb * nr + row) * kr;
                    packed.data[dst..dst + block_cols]
                        .copy_from_slice(&kernel[src..src + block_cols]);
                }
            }

            let bias_base = tile_base + nr * k_stride;
            for row in 0..tile_rows {
                let dst = bias_base + row * mem::size_of::<i32>();
                packed.data[dst..dst + 4]
                    .copy_from_slice(&bias[tile_start + row].to_le_bytes());
            }
        }
    }
}
