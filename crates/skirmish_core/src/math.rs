//! Deterministic math utilities: fixed-point numbers, tile geometry and the
//! synchronized random stream.
//!
//! All simulation math is integer or fixed-point so every peer computes the
//! same results. Floating-point operations can differ between CPUs.

use fixed::types::I32F32;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for sub-tile simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for `Option<Fixed>`.
pub mod option_fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize an optional fixed-point number.
    pub fn serialize<S>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(Fixed::to_bits).serialize(serializer)
    }

    /// Deserialize an optional fixed-point number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<i64>::deserialize(deserializer)?;
        Ok(opt.map(Fixed::from_bits))
    }
}

/// Integer tile coordinate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TilePos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl TilePos {
    /// Create a tile position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance (8-directional step count).
    #[must_use]
    pub const fn chebyshev(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        if dx > dy {
            dx
        } else {
            dy
        }
    }

    /// Offset by a delta.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl std::fmt::Display for TilePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis-aligned tile rectangle, the footprint a unit covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    /// Top-left tile.
    pub origin: TilePos,
    /// Width in tiles (at least 1).
    pub width: u32,
    /// Height in tiles (at least 1).
    pub height: u32,
}

impl Footprint {
    /// Create a footprint.
    #[must_use]
    pub const fn new(origin: TilePos, width: u32, height: u32) -> Self {
        Self {
            origin,
            width,
            height,
        }
    }

    /// Single-tile footprint.
    #[must_use]
    pub const fn tile(pos: TilePos) -> Self {
        Self::new(pos, 1, 1)
    }

    /// Inclusive bottom-right tile.
    #[must_use]
    pub const fn far_corner(self) -> TilePos {
        TilePos::new(
            self.origin.x + self.width as i32 - 1,
            self.origin.y + self.height as i32 - 1,
        )
    }

    /// Whether `pos` lies inside.
    #[must_use]
    pub const fn contains(self, pos: TilePos) -> bool {
        let far = self.far_corner();
        pos.x >= self.origin.x && pos.x <= far.x && pos.y >= self.origin.y && pos.y <= far.y
    }

    /// Chebyshev distance from a tile to the nearest tile of this footprint.
    /// Zero when inside.
    #[must_use]
    pub fn distance_to_tile(self, pos: TilePos) -> u32 {
        let far = self.far_corner();
        let dx = axis_gap(pos.x, self.origin.x, far.x);
        let dy = axis_gap(pos.y, self.origin.y, far.y);
        dx.max(dy)
    }

    /// Chebyshev gap between two footprints. Zero when they overlap.
    #[must_use]
    pub fn distance_to(self, other: Self) -> u32 {
        let a_far = self.far_corner();
        let b_far = other.far_corner();
        let dx = span_gap(self.origin.x, a_far.x, other.origin.x, b_far.x);
        let dy = span_gap(self.origin.y, a_far.y, other.origin.y, b_far.y);
        dx.max(dy)
    }

    /// Iterate all covered tiles in row-major order.
    pub fn tiles(self) -> impl Iterator<Item = TilePos> {
        let origin = self.origin;
        (0..self.height as i32)
            .flat_map(move |dy| (0..self.width as i32).map(move |dx| origin.offset(dx, dy)))
    }

    /// Center tile (rounded towards the origin).
    #[must_use]
    pub const fn center(self) -> TilePos {
        TilePos::new(
            self.origin.x + (self.width as i32 - 1) / 2,
            self.origin.y + (self.height as i32 - 1) / 2,
        )
    }
}

fn axis_gap(v: i32, lo: i32, hi: i32) -> u32 {
    if v < lo {
        lo.abs_diff(v)
    } else if v > hi {
        v.abs_diff(hi)
    } else {
        0
    }
}

fn span_gap(a_lo: i32, a_hi: i32, b_lo: i32, b_hi: i32) -> u32 {
    if a_hi < b_lo {
        b_lo.abs_diff(a_hi)
    } else if b_hi < a_lo {
        a_lo.abs_diff(b_hi)
    } else {
        0
    }
}

/// Multiplier of the synchronized linear congruential generator.
const SYNC_RNG_MULTIPLIER: u32 = 0x1234_5678_u32.wrapping_mul(4).wrapping_add(1);

/// The synchronized pseudo-random stream shared by all peers.
///
/// Its whole state is a single 32-bit seed, which is what the command log
/// records and replay compares. Every draw advances the seed; each
/// [`RngCore::next_u32`] consumes two 16-bit steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRng {
    seed: u32,
}

impl SyncRng {
    /// Start the stream from a seed.
    #[must_use]
    pub const fn new(seed: u32) -> Self {
        Self { seed }
    }

    /// Current seed (the complete generator state).
    #[must_use]
    pub const fn seed(&self) -> u32 {
        self.seed
    }

    /// Advance one step and return the high 16 bits.
    fn step(&mut self) -> u32 {
        self.seed = self
            .seed
            .wrapping_mul(SYNC_RNG_MULTIPLIER)
            .wrapping_add(1);
        self.seed >> 16
    }
}

impl RngCore for SyncRng {
    fn next_u32(&mut self) -> u32 {
        let high = self.step();
        let low = self.step();
        (high << 16) | low
    }

    fn next_u64(&mut self) -> u64 {
        let high = u64::from(self.next_u32());
        let low = u64::from(self.next_u32());
        (high << 32) | low
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
