use heapless::Vec;

use super::{
    MAX_DATA_LEN, MixedWriter, MsgLength, SafetyFormat, SfaError, data_frame_size, expect_len,
};
use crate::traits::WireFormat;
use crate::wire::WireReader;

const RUN_IDLE: u8 = 0x80;
const TBD: u8 = 0x40;
const TBD2: u8 = 0x20;
const REDUNDANT_MASK: u8 = 0xE0;
const COMPLEMENT_MASK: u8 = 0x1C;
const COMPLEMENT_SHIFT: u8 = 3;
const PING_COUNT_MASK: u8 = 0x03;

/// Mode byte of a data message.
///
/// Bits 7..5 carry Run/Idle and two reserved flags, bits 4..2 their
/// complements and bits 1..0 the ping count.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ModeByte(u8);

impl ModeByte {
    pub const fn new(run: bool, ping_count: u8) -> Self {
        let flags = if run { RUN_IDLE } else { 0 };
        ModeByte(flags | (!flags & REDUNDANT_MASK) >> COMPLEMENT_SHIFT | ping_count & PING_COUNT_MASK)
    }

    pub const fn from_raw(raw: u8) -> Self {
        ModeByte(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn is_run(self) -> bool {
        self.0 & RUN_IDLE != 0
    }

    pub const fn tbd(self) -> bool {
        self.0 & TBD != 0
    }

    pub const fn tbd2(self) -> bool {
        self.0 & TBD2 != 0
    }

    pub const fn ping_count(self) -> u8 {
        self.0 & PING_COUNT_MASK
    }

    /// Every redundant flag is accompanied by its complement.
    pub const fn is_consistent(self) -> bool {
        (self.0 & REDUNDANT_MASK) >> COMPLEMENT_SHIFT == !self.0 & COMPLEMENT_MASK
    }
}

/// Shape of a data message: format plus payload length.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DataLayout {
    pub format: SafetyFormat,
    pub data_len: usize,
}

/// Safety data message in any of the three layouts.
///
/// `actual_crc` and `complement_crc` hold CRC-S1/CRC-S2 for short Base
/// messages and both CRC-S3 values for long ones. Extended messages only use
/// `crc_s5`. `complement` is filled by decoding a Base Long message; encoding
/// always derives it from `data`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DataMsg {
    pub data: Vec<u8, MAX_DATA_LEN>,
    pub complement: Vec<u8, MAX_DATA_LEN>,
    pub mode: ModeByte,
    pub actual_crc: u16,
    pub complement_crc: u16,
    pub time_stamp: u16,
    pub time_stamp_crc: u8,
    pub crc_s5: u32,
}

impl DataMsg {
    /// # Errors
    /// - if `data` is empty or longer than 250 bytes
    pub fn with_data(data: &[u8]) -> Result<Self, SfaError> {
        MsgLength::for_data_len(data.len())?;
        let data = Vec::from_slice(data).map_err(|_| SfaError::DataLength(data.len()))?;
        Ok(Self {
            data,
            ..Self::default()
        })
    }

    pub fn length(&self) -> Result<MsgLength, SfaError> {
        MsgLength::for_data_len(self.data.len())
    }
}

fn truncated(expected: usize, actual: usize) -> SfaError {
    SfaError::LengthMismatch { expected, actual }
}

impl WireFormat for DataMsg {
    type Layout = DataLayout;

    fn decode(layout: DataLayout, bytes: &[u8]) -> Result<Self, SfaError> {
        let size = data_frame_size(layout.format, layout.data_len)?;
        expect_len(bytes, size)?;
        let short = || truncated(size, bytes.len());
        let mut reader = WireReader::new(bytes);

        let data = reader.read_bytes(layout.data_len).ok_or_else(short)?;
        let mut msg = DataMsg::with_data(data)?;
        msg.mode = ModeByte::from_raw(reader.read_u8().ok_or_else(short)?);

        match (layout.format, MsgLength::for_data_len(layout.data_len)?) {
            (SafetyFormat::Base, MsgLength::Short) => {
                msg.actual_crc = reader.read_u8().ok_or_else(short)?.into();
                msg.complement_crc = reader.read_u8().ok_or_else(short)?.into();
                msg.time_stamp = reader.read_u16().ok_or_else(short)?;
                msg.time_stamp_crc = reader.read_u8().ok_or_else(short)?;
            }
            (SafetyFormat::Base, MsgLength::Long) => {
                msg.actual_crc = reader.read_u16().ok_or_else(short)?;
                let complement = reader.read_bytes(layout.data_len).ok_or_else(short)?;
                msg.complement =
                    Vec::from_slice(complement).map_err(|_| SfaError::DataLength(complement.len()))?;
                msg.complement_crc = reader.read_u16().ok_or_else(short)?;
                msg.time_stamp = reader.read_u16().ok_or_else(short)?;
                msg.time_stamp_crc = reader.read_u8().ok_or_else(short)?;
            }
            (SafetyFormat::Extended, _) => {
                let low = reader.read_u16().ok_or_else(short)?;
                msg.time_stamp = reader.read_u16().ok_or_else(short)?;
                let high = reader.read_u8().ok_or_else(short)?;
                msg.crc_s5 = (u32::from(high) << 16 | u32::from(low)) & 0x00FF_FFFF;
            }
        }
        Ok(msg)
    }

    fn required_size(&self, layout: DataLayout) -> Result<usize, SfaError> {
        if self.data.len() != layout.data_len {
            return Err(SfaError::LengthMismatch {
                expected: layout.data_len,
                actual: self.data.len(),
            });
        }
        data_frame_size(layout.format, layout.data_len)
    }

    fn encode(&self, layout: DataLayout, writer: &mut MixedWriter<'_>) -> Result<(), SfaError> {
        writer.put_bytes(&self.data)?;
        writer.put_u8(self.mode.raw())?;
        match (layout.format, self.length()?) {
            (SafetyFormat::Base, MsgLength::Short) => {
                writer.put_u8(self.actual_crc as u8)?;
                writer.put_u8(self.complement_crc as u8)?;
                writer.put_u16(self.time_stamp)?;
                writer.put_u8(self.time_stamp_crc)?;
            }
            (SafetyFormat::Base, MsgLength::Long) => {
                writer.put_u16(self.actual_crc)?;
                writer.put_complement(&self.data)?;
                writer.put_u16(self.complement_crc)?;
                writer.put_u16(self.time_stamp)?;
                writer.put_u8(self.time_stamp_crc)?;
            }
            (SafetyFormat::Extended, _) => {
                writer.put_u16(self.crc_s5 as u16)?;
                writer.put_u16(self.time_stamp)?;
                writer.put_u8((self.crc_s5 >> 16) as u8)?;
            }
        }
        Ok(())
    }
}
