//! Little-endian cursor over a received buffer. Reads never panic; running out of
//! bytes yields `None` and the caller turns that into its own unit error.

#[derive(Debug, Clone)]
pub(crate) struct WireReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    #[cfg(test)]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[cfg(test)]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn read_bytes(&mut self, count: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(count)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Some(array)
    }

    pub fn skip(&mut self, count: usize) -> Option<()> {
        self.read_bytes(count).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.read_array::<1>().map(|b| b[0])
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        self.read_array::<2>().map(u16::from_le_bytes)
    }

    /// 24-bit value, returned in the low bits of a `u32`.
    pub fn read_u24(&mut self) -> Option<u32> {
        self.read_array::<3>()
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.read_array::<4>().map(u32::from_le_bytes)
    }
}
