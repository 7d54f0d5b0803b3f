use super::{MixedWriter, SafetyFormat, SfaError, TCOO_SIZE, TCORR_SIZE, expect_len};
use crate::traits::WireFormat;
use crate::wire::WireReader;

const PARITY: u8 = 0x80;

/// Parity bit value that makes the population count of `byte` even.
const fn even_parity(byte: u8) -> u8 {
    if (byte & !PARITY).count_ones() % 2 == 1 {
        PARITY
    } else {
        0
    }
}

const PING_COUNT_REPLY_MASK: u8 = 0x03;
const PING_RESPONSE: u8 = 0x04;

/// Ack byte of a time coordination message.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AckByte(u8);

impl AckByte {
    pub const fn new(ping_count_reply: u8, ping_response: bool) -> Self {
        let mut raw = ping_count_reply & PING_COUNT_REPLY_MASK;
        if ping_response {
            raw |= PING_RESPONSE;
        }
        AckByte(raw | even_parity(raw))
    }

    pub const fn from_raw(raw: u8) -> Self {
        AckByte(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn ping_count_reply(self) -> u8 {
        self.0 & PING_COUNT_REPLY_MASK
    }

    pub const fn ping_response(self) -> bool {
        self.0 & PING_RESPONSE != 0
    }

    pub const fn parity_ok(self) -> bool {
        self.0.count_ones() % 2 == 0
    }
}

const CONSUMER_NUM_MASK: u8 = 0x0F;

/// Multicast byte of a time correction message.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct McastByte(u8);

impl McastByte {
    pub const fn new(consumer_num: u8) -> Self {
        let raw = consumer_num & CONSUMER_NUM_MASK;
        McastByte(raw | even_parity(raw))
    }

    pub const fn from_raw(raw: u8) -> Self {
        McastByte(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn consumer_num(self) -> u8 {
        self.0 & CONSUMER_NUM_MASK
    }

    pub const fn parity_ok(self) -> bool {
        self.0.count_ones() % 2 == 0
    }
}

/// Time coordination message, sent by a consumer in reply to a new ping count.
///
/// `ack2` and `crc_s3` are only carried by the Base format, `crc_s5` only by
/// the Extended format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TcooMsg {
    pub ack: AckByte,
    pub consumer_time: u16,
    pub ack2: u8,
    pub crc_s3: u16,
    pub crc_s5: u32,
}

impl TcooMsg {
    /// Base redundancy: the second ack byte is the complement of the first.
    pub const fn ack_redundancy_ok(&self) -> bool {
        self.ack2 == !self.ack.raw()
    }
}

/// Time correction message, sent by a multicast producer to one consumer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TcorrMsg {
    pub mcast: McastByte,
    pub correction: u16,
    pub mcast2: u8,
    pub crc_s3: u16,
    pub crc_s5: u32,
}

impl TcorrMsg {
    pub const fn mcast_redundancy_ok(&self) -> bool {
        self.mcast2 == !self.mcast.raw()
    }
}

/// Shared layout of both time messages: lead byte, 16-bit value, then either
/// the complemented lead byte plus CRC-S3 or a 24-bit CRC-S5.
struct TimeFrame {
    lead: u8,
    value: u16,
    lead2: u8,
    crc_s3: u16,
    crc_s5: u32,
}

impl TimeFrame {
    fn decode(format: SafetyFormat, bytes: &[u8], size: usize) -> Result<Self, SfaError> {
        expect_len(bytes, size)?;
        let short = || SfaError::LengthMismatch {
            expected: size,
            actual: bytes.len(),
        };
        let mut reader = WireReader::new(bytes);
        let lead = reader.read_u8().ok_or_else(short)?;
        let value = reader.read_u16().ok_or_else(short)?;
        let mut frame = TimeFrame {
            lead,
            value,
            lead2: 0,
            crc_s3: 0,
            crc_s5: 0,
        };
        match format {
            SafetyFormat::Base => {
                frame.lead2 = reader.read_u8().ok_or_else(short)?;
                frame.crc_s3 = reader.read_u16().ok_or_else(short)?;
            }
            SafetyFormat::Extended => {
                frame.crc_s5 = reader.read_u24().ok_or_else(short)?;
            }
        }
        Ok(frame)
    }

    fn encode(&self, format: SafetyFormat, writer: &mut MixedWriter<'_>) -> Result<(), SfaError> {
        writer.put_u8(self.lead)?;
        writer.put_u16(self.value)?;
        match format {
            SafetyFormat::Base => {
                writer.put_u8(self.lead2)?;
                writer.put_u16(self.crc_s3)
            }
            SafetyFormat::Extended => writer.put_u24(self.crc_s5),
        }
    }
}

impl WireFormat for TcooMsg {
    type Layout = SafetyFormat;

    fn decode(format: SafetyFormat, bytes: &[u8]) -> Result<Self, SfaError> {
        let frame = TimeFrame::decode(format, bytes, TCOO_SIZE)?;
        Ok(TcooMsg {
            ack: AckByte::from_raw(frame.lead),
            consumer_time: frame.value,
            ack2: frame.lead2,
            crc_s3: frame.crc_s3,
            crc_s5: frame.crc_s5,
        })
    }

    fn required_size(&self, _format: SafetyFormat) -> Result<usize, SfaError> {
        Ok(TCOO_SIZE)
    }

    fn encode(&self, format: SafetyFormat, writer: &mut MixedWriter<'_>) -> Result<(), SfaError> {
        TimeFrame {
            lead: self.ack.raw(),
            value: self.consumer_time,
            lead2: self.ack2,
            crc_s3: self.crc_s3,
            crc_s5: self.crc_s5,
        }
        .encode(format, writer)
    }
}

impl WireFormat for TcorrMsg {
    type Layout = SafetyFormat;

    fn decode(format: SafetyFormat, bytes: &[u8]) -> Result<Self, SfaError> {
        let frame = TimeFrame::decode(format, bytes, TCORR_SIZE)?;
        Ok(TcorrMsg {
            mcast: McastByte::from_raw(frame.lead),
            correction: frame.value,
            mcast2: frame.lead2,
            crc_s3: frame.crc_s3,
            crc_s5: frame.crc_s5,
        })
    }

    fn required_size(&self, _format: SafetyFormat) -> Result<usize, SfaError> {
        Ok(TCORR_SIZE)
    }

    fn encode(&self, format: SafetyFormat, writer: &mut MixedWriter<'_>) -> Result<(), SfaError> {
        TimeFrame {
            lead: self.mcast.raw(),
            value: self.correction,
            lead2: self.mcast2,
            crc_s3: self.crc_s3,
            crc_s5: self.crc_s5,
        }
        .encode(format, writer)
    }
}
