use tracing::trace;

use crate::utils::codec::{Decoder, Encoder, STATE_VERSION};
use crate::{StatsError, StatsResult};

/// Tag identifying the aggregate kind at the head of every persisted blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StateKind {
    /// [`crate::Minimum`]
    Minimum = 1,
    /// [`crate::Maximum`]
    Maximum = 2,
    /// [`crate::Sum`]
    Sum = 3,
    /// [`crate::Mean`]
    Mean = 4,
    /// [`crate::Variance`]
    Variance = 5,
    /// [`crate::Covariance`]
    Covariance = 6,
    /// [`crate::Ema`]
    Ema = 7,
    /// [`crate::SparseEma`]
    SparseEma = 8,
    /// [`crate::Interpolator`]
    Interpolator = 9,
    /// [`crate::OnlineHistogram`]
    Histogram = 10,
    /// [`crate::SlottedHistogram`]
    SlottedHistogram = 11,
    /// [`crate::TDigest`]
    TDigest = 12,
    /// [`crate::SparseSum`]
    SparseSum = 13,
    /// [`crate::RecLinReg`]
    RecLinReg = 14,
    /// [`crate::NeuralNet`]
    NeuralNet = 15,
    /// [`crate::ChiSquare`]
    ChiSquare = 16,
}

/// Save/Load contract shared by every aggregate
///
/// A saved blob is `[kind tag: u8][version: u8][body]`, where the body is the ordered
/// concatenation of fixed-width fields and length-prefixed sequences written by [`Persist::encode`].
/// Restoring a blob and replaying the same updates gives bit-identical results to the
/// original instance.
pub trait Persist: Sized {
    /// Tag written at the head of the blob
    const KIND: StateKind;

    /// Writes the state body
    fn encode(&self, enc: &mut Encoder);

    /// Reads a state body written by [`Persist::encode`]
    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self>;

    /// Serializes the full state into an opaque, versioned byte sequence
    fn save(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.put_u8(Self::KIND as u8);
        enc.put_u8(STATE_VERSION);
        self.encode(&mut enc);
        enc.into_bytes()
    }

    /// Rebuilds an aggregate from bytes produced by [`Persist::save`]
    fn restore(bytes: &[u8]) -> StatsResult<Self> {
        let mut dec = Decoder::new(bytes);
        let kind = dec.get_u8()?;
        if kind != Self::KIND as u8 {
            return Err(StatsError::KindMismatch {
                expected: Self::KIND as u8,
                found: kind,
            });
        }
        let version = dec.get_u8()?;
        if version != STATE_VERSION {
            return Err(StatsError::UnsupportedVersion(version));
        }
        let state = Self::decode(&mut dec)?;
        dec.finish()?;
        trace!(kind = ?Self::KIND, bytes = bytes.len(), "restored state");
        Ok(state)
    }

    /// Replaces the in-memory state with the one in `bytes`
    ///
    /// On error `self` is left unchanged.
    fn load(&mut self, bytes: &[u8]) -> StatsResult<()> {
        *self = Self::restore(bytes)?;
        Ok(())
    }
}
