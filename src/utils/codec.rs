use integer_encoding::FixedInt;

use crate::{StatsError, StatsResult};

/// Format version written into every persisted blob
pub const STATE_VERSION: u8 = 1;

/// Appends fixed-width little-endian fields to a byte buffer
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Creates an empty encoder
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn put_fixed<T: FixedInt>(&mut self, v: T) {
        self.buf.extend_from_slice(v.encode_fixed_light().as_ref());
    }

    /// Appends a single byte
    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Appends a bool as one byte
    pub fn put_bool(&mut self, v: bool) {
        self.put_u8(u8::from(v));
    }

    /// Appends a `u32`
    pub fn put_u32(&mut self, v: u32) {
        self.put_fixed(v);
    }

    /// Appends a `u64`
    pub fn put_u64(&mut self, v: u64) {
        self.put_fixed(v);
    }

    /// Appends an `f64` as its IEEE-754 bit pattern
    pub fn put_f64(&mut self, v: f64) {
        self.put_fixed(v.to_bits());
    }

    /// Appends a sequence length
    pub fn put_len(&mut self, len: usize) {
        self.put_u64(len as u64);
    }

    /// Appends a length-prefixed sequence of `f64`
    pub fn put_f64s(&mut self, values: &[f64]) {
        self.put_len(values.len());
        values.iter().for_each(|&v| self.put_f64(v));
    }

    /// Appends a length-prefixed sequence of `u64`
    pub fn put_u64s(&mut self, values: &[u64]) {
        self.put_len(values.len());
        values.iter().for_each(|&v| self.put_u64(v));
    }

    /// Consumes the encoder, returning the bytes written
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads fields written by [`Encoder`] back, in the same order
#[derive(Debug)]
pub struct Decoder<'a> {
    src: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over `src`
    pub fn new(src: &'a [u8]) -> Self {
        Self { src }
    }

    fn take(&mut self, n: usize) -> StatsResult<&'a [u8]> {
        if self.src.len() < n {
            return Err(StatsError::Decode(format!(
                "at least {n} bytes required, got {}",
                self.src.len()
            )));
        }
        let (head, tail) = self.src.split_at(n);
        self.src = tail;
        Ok(head)
    }

    #[inline]
    fn get_fixed<T: FixedInt>(&mut self) -> StatsResult<T> {
        let bytes = self.take(T::ENCODED_SIZE)?;
        T::decode_fixed(bytes)
            .ok_or_else(|| StatsError::Decode("malformed fixed-width integer".to_string()))
    }

    /// Reads a single byte
    pub fn get_u8(&mut self) -> StatsResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a bool written by [`Encoder::put_bool`]
    pub fn get_bool(&mut self) -> StatsResult<bool> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StatsError::Decode(format!("invalid bool byte {other}"))),
        }
    }

    /// Reads a `u32`
    pub fn get_u32(&mut self) -> StatsResult<u32> {
        self.get_fixed()
    }

    /// Reads a `u64`
    pub fn get_u64(&mut self) -> StatsResult<u64> {
        self.get_fixed()
    }

    /// Reads an `f64`
    pub fn get_f64(&mut self) -> StatsResult<f64> {
        self.get_fixed::<u64>().map(f64::from_bits)
    }

    /// Reads a sequence length, rejecting lengths the remaining input cannot hold
    pub fn get_len(&mut self, elem_size: usize) -> StatsResult<usize> {
        let len = self.get_u64()?;
        let len = usize::try_from(len)
            .map_err(|_| StatsError::Decode(format!("sequence length {len} overflows")))?;
        if len.saturating_mul(elem_size) > self.src.len() {
            return Err(StatsError::Decode(format!(
                "sequence of {len} elements exceeds remaining {} bytes",
                self.src.len()
            )));
        }
        Ok(len)
    }

    /// Reads a length-prefixed sequence of `f64`
    pub fn get_f64s(&mut self) -> StatsResult<Vec<f64>> {
        let len = self.get_len(8)?;
        (0..len).map(|_| self.get_f64()).collect()
    }

    /// Reads a length-prefixed sequence of `u64`
    pub fn get_u64s(&mut self) -> StatsResult<Vec<u64>> {
        let len = self.get_len(8)?;
        (0..len).map(|_| self.get_u64()).collect()
    }

    /// Fails if any input is left unread
    pub fn finish(self) -> StatsResult<()> {
        if self.src.is_empty() {
            Ok(())
        } else {
            Err(StatsError::Decode(format!(
                "{} trailing bytes",
                self.src.len()
            )))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn fields_read_back_in_order() {
        let mut enc = Encoder::new();
        enc.put_u8(7);
        enc.put_bool(true);
        enc.put_u64(u64::MAX - 3);
        enc.put_f64(-0.0);
        enc.put_f64s(&[1.5, f64::INFINITY]);
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), 1 + 1 + 8 + 8 + 8 + 16);

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.get_u8().unwrap(), 7);
        assert!(dec.get_bool().unwrap());
        assert_eq!(dec.get_u64().unwrap(), u64::MAX - 3);
        assert_eq!(dec.get_f64().unwrap().to_bits(), (-0.0f64).to_bits());
        assert_eq!(dec.get_f64s().unwrap(), vec![1.5, f64::INFINITY]);
        dec.finish().unwrap();
    }

    #[test]
    fn nan_bit_pattern_survives() {
        let mut enc = Encoder::new();
        enc.put_f64(f64::NAN);
        let bytes = enc.into_bytes();
        let v = Decoder::new(&bytes).get_f64().unwrap();
        assert_eq!(v.to_bits(), f64::NAN.to_bits());
    }

    #[test]
    fn truncated_input_is_rejected() {
        let mut enc = Encoder::new();
        enc.put_u64(42);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes[..5]);
        assert!(matches!(dec.get_u64(), Err(StatsError::Decode(_))));
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut enc = Encoder::new();
        enc.put_len(1 << 40);
        let bytes = enc.into_bytes();
        assert!(Decoder::new(&bytes).get_f64s().is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let bytes = [1u8, 2];
        let mut dec = Decoder::new(&bytes);
        dec.get_u8().unwrap();
        assert!(dec.finish().is_err());
    }

    #[test]
    fn invalid_bool_is_rejected() {
        let bytes = [2u8];
        assert!(Decoder::new(&bytes).get_bool().is_err());
    }
}
