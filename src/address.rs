//! # Addresses and the Prefix-Distance Metric
//!
//! Every simulated node is identified by an [`Address`]: a fixed-length string of
//! [`ADDRESS_LENGTH`] bits, stored packed most-significant-bit first.
//!
//! ## Distance
//!
//! The distance between two addresses is `L` minus the length of their longest
//! shared bit prefix:
//!
//! ```text
//! a     = 1011 0110 ...
//! b     = 1010 0001 ...
//! a^b   = 0001 0111 ...
//!            ^ first differing bit at position 3  =>  distance = L - 3
//! ```
//!
//! Identical addresses have distance `0`; addresses that differ in the very first
//! bit have distance `L`. The distance is the bucket index used by the routing
//! table, so it always lies in `0..=L`.
//!
//! ## Invariants
//!
//! - `distance(a, a) == 0`
//! - `distance(a, b) == distance(b, a)`
//! - `0 <= distance(a, b) <= ADDRESS_LENGTH`
//! - Construction from a bit slice of the wrong length fails; bits are never
//!   truncated or padded.

use rand::{Rng, RngCore};

/// Number of bits in every address (L).
pub const ADDRESS_LENGTH: usize = 40;

/// Number of bytes used to store an address.
pub const ADDRESS_BYTES: usize = ADDRESS_LENGTH / 8;

const _: () = assert!(ADDRESS_LENGTH % 8 == 0 && ADDRESS_LENGTH > 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    /// The supplied bit sequence does not have exactly `ADDRESS_LENGTH` bits.
    InvalidLength { expected: usize, actual: usize },
    /// A bit value other than 0 or 1 was supplied.
    InvalidBit { position: usize, value: u8 },
}

impl std::fmt::Display for AddressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLength { expected, actual } => {
                write!(f, "invalid address length: expected {expected} bits, got {actual}")
            }
            Self::InvalidBit { position, value } => {
                write!(f, "invalid bit value {value} at position {position}")
            }
        }
    }
}

impl std::error::Error for AddressError {}

/// Fixed-length binary node identifier.
///
/// Equality, ordering and hashing all derive from the bit sequence, so an
/// `Address` can be used directly as a map key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_BYTES]);

impl Address {
    /// Build an address from its packed representation. Always `ADDRESS_LENGTH`
    /// bits, so this cannot fail.
    pub const fn from_bytes(bytes: [u8; ADDRESS_BYTES]) -> Self {
        Self(bytes)
    }

    /// Build an address from one `0`/`1` value per bit, most significant first.
    pub fn from_bits(bits: &[u8]) -> Result<Self, AddressError> {
        if bits.len() != ADDRESS_LENGTH {
            return Err(AddressError::InvalidLength {
                expected: ADDRESS_LENGTH,
                actual: bits.len(),
            });
        }

        let mut bytes = [0u8; ADDRESS_BYTES];
        for (position, &value) in bits.iter().enumerate() {
            match value {
                0 => {}
                1 => bytes[position / 8] |= 0x80 >> (position % 8),
                _ => return Err(AddressError::InvalidBit { position, value }),
            }
        }
        Ok(Self(bytes))
    }

    /// The all-zero address.
    pub const fn zero() -> Self {
        Self([0u8; ADDRESS_BYTES])
    }

    /// A uniformly random address.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; ADDRESS_BYTES];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; ADDRESS_BYTES] {
        &self.0
    }

    /// Value of the bit at `position` (0 is the most significant bit).
    ///
    /// # Panics
    /// Panics if `position >= ADDRESS_LENGTH`.
    #[inline]
    pub fn bit(&self, position: usize) -> bool {
        self.0[position / 8] & (0x80 >> (position % 8)) != 0
    }

    /// Bits as `0`/`1` values, most significant first.
    pub fn bits(&self) -> Vec<u8> {
        (0..ADDRESS_LENGTH).map(|i| self.bit(i) as u8).collect()
    }

    /// Position of the first bit where `self` and `other` differ, if any.
    fn first_difference(&self, other: &Address) -> Option<usize> {
        for (byte_idx, (a, b)) in self.0.iter().zip(other.0.iter()).enumerate() {
            let xor = a ^ b;
            if xor != 0 {
                return Some(byte_idx * 8 + xor.leading_zeros() as usize);
            }
        }
        None
    }

    /// Prefix distance to `other`, in `0..=ADDRESS_LENGTH`.
    pub fn distance(&self, other: &Address) -> usize {
        match self.first_difference(other) {
            Some(position) => ADDRESS_LENGTH - position,
            None => 0,
        }
    }

    /// Random address at exactly `distance` from `self`, or `None` if
    /// `distance > ADDRESS_LENGTH`.
    ///
    /// The first `L - distance` bits are copied from `self`, the next bit is
    /// flipped and the remaining bits are random. `distance == 0` yields `self`.
    pub fn random_at_distance<R: RngCore + ?Sized>(
        &self,
        distance: usize,
        rng: &mut R,
    ) -> Option<Address> {
        if distance > ADDRESS_LENGTH {
            return None;
        }
        if distance == 0 {
            return Some(*self);
        }

        let split = ADDRESS_LENGTH - distance;
        let mut mask = [0u8; ADDRESS_BYTES];
        rng.fill_bytes(&mut mask);

        let byte_idx = split / 8;
        for byte in mask.iter_mut().take(byte_idx) {
            *byte = 0;
        }
        let target_bit = 0x80u8 >> (split % 8);
        let random_mask = target_bit.wrapping_sub(1);
        mask[byte_idx] = target_bit | (mask[byte_idx] & random_mask);

        let mut bytes = self.0;
        for (byte, m) in bytes.iter_mut().zip(mask.iter()) {
            *byte ^= m;
        }
        Some(Address(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex prefix for log fields.
    pub(crate) fn short(&self) -> String {
        hex::encode(&self.0[..ADDRESS_BYTES.min(4)])
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

/// Renders the bit string, e.g. `0110...`.
impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..ADDRESS_LENGTH {
            f.write_str(if self.bit(i) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl From<[u8; ADDRESS_BYTES]> for Address {
    fn from(bytes: [u8; ADDRESS_BYTES]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = AddressError;

    /// Interprets the slice as one `0`/`1` value per bit.
    fn try_from(bits: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bits(bits)
    }
}
