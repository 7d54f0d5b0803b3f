//! Byte placement for transmit telegrams.
//!
//! In a two-controller safety design neither controller may hold a complete
//! transmit telegram in its own memory. Every byte of a telegram is therefore
//! written to a scattered position and the combining layer outside the stack
//! restores the wire order. Both controllers must scatter identically.

use super::SfaError;

/// Placement method of the mixing copy.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MixMethod {
    /// Odd source bytes fill the lower half in reverse, even source bytes the
    /// upper half in order.
    #[default]
    OddEvenSort,
}

impl MixMethod {
    /// Destination index of telegram byte `idx` in a telegram of `total_len` bytes.
    pub const fn scatter_index(self, idx: usize, total_len: usize) -> usize {
        match self {
            MixMethod::OddEvenSort => {
                if idx % 2 == 1 {
                    total_len / 2 - idx / 2 - 1
                } else {
                    total_len / 2 + idx / 2
                }
            }
        }
    }
}

/// Write `src` as telegram bytes `idx..idx + src.len()` of a telegram of
/// `total_len` bytes into the mixed buffer `dst`.
///
/// # Errors
/// - if the bytes do not fit into the telegram or the telegram into `dst`
pub fn scatter_write(
    method: MixMethod,
    dst: &mut [u8],
    src: &[u8],
    idx: usize,
    total_len: usize,
) -> Result<(), SfaError> {
    if idx + src.len() > total_len {
        return Err(SfaError::MixOutOfRange {
            index: idx,
            len: src.len(),
            total: total_len,
        });
    }
    if dst.len() < total_len {
        return Err(SfaError::BufferTooSmall {
            needed: total_len,
            available: dst.len(),
        });
    }
    for (offset, byte) in src.iter().enumerate() {
        dst[method.scatter_index(idx + offset, total_len)] = *byte;
    }
    Ok(())
}

/// Restore wire order from a mixed buffer. This is the job of the combining
/// layer; the stack itself only ever scatters.
///
/// # Errors
/// - if `out` is shorter than `mixed`
pub fn unmix(method: MixMethod, mixed: &[u8], out: &mut [u8]) -> Result<(), SfaError> {
    let total_len = mixed.len();
    if out.len() < total_len {
        return Err(SfaError::BufferTooSmall {
            needed: total_len,
            available: out.len(),
        });
    }
    for (idx, byte) in out.iter_mut().take(total_len).enumerate() {
        *byte = mixed[method.scatter_index(idx, total_len)];
    }
    Ok(())
}

/// Sequential writer over a telegram that places every byte through
/// [`scatter_write`].
#[derive(Debug)]
pub struct MixedWriter<'a> {
    dst: &'a mut [u8],
    total_len: usize,
    pos: usize,
    method: MixMethod,
}

impl<'a> MixedWriter<'a> {
    /// # Errors
    /// - if `dst` cannot hold `total_len` bytes
    pub fn new(dst: &'a mut [u8], total_len: usize, method: MixMethod) -> Result<Self, SfaError> {
        if dst.len() < total_len {
            return Err(SfaError::BufferTooSmall {
                needed: total_len,
                available: dst.len(),
            });
        }
        Ok(Self {
            dst,
            total_len,
            pos: 0,
            method,
        })
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), SfaError> {
        scatter_write(self.method, self.dst, bytes, self.pos, self.total_len)?;
        self.pos += bytes.len();
        Ok(())
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), SfaError> {
        self.put_bytes(&[value])
    }

    pub fn put_u16(&mut self, value: u16) -> Result<(), SfaError> {
        self.put_bytes(&value.to_le_bytes())
    }

    /// Low 24 bits of `value`, little-endian.
    pub fn put_u24(&mut self, value: u32) -> Result<(), SfaError> {
        let bytes = value.to_le_bytes();
        self.put_bytes(&bytes[..3])
    }

    /// Bitwise complement of every byte of `bytes`.
    pub fn put_complement(&mut self, bytes: &[u8]) -> Result<(), SfaError> {
        for byte in bytes {
            self.put_u8(!byte)?;
        }
        Ok(())
    }

    /// Number of bytes written.
    ///
    /// # Errors
    /// - if the telegram was not written completely
    pub fn finish(self) -> Result<usize, SfaError> {
        if self.pos != self.total_len {
            return Err(SfaError::IncompleteWrite {
                written: self.pos,
                expected: self.total_len,
            });
        }
        Ok(self.pos)
    }
}
