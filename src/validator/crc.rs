//! Safety CRC computation for data, time coordination and time correction messages.

use crc::{Algorithm, Crc};

use crate::sce::ConnectionTriad;
use crate::sfa::{AckByte, DataMsg, MAX_SHORT_DATA_LEN, McastByte, SafetyFormat};

/// CRC-S1: 8 bit, polynomial 0x37.
pub const CRC_S1: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x37,
    init: 0x00,
    refin: true,
    refout: true,
    xorout: 0x00,
    check: 0x07,
    residue: 0x00,
};

/// CRC-S2: 8 bit, polynomial 0x3B. Covers the complemented data of short
/// Base messages.
pub const CRC_S2: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x3B,
    init: 0x00,
    refin: true,
    refout: true,
    xorout: 0x00,
    check: 0xFE,
    residue: 0x00,
};

/// CRC-S3: 16 bit, polynomial 0x080F.
pub const CRC_S3: Algorithm<u16> = Algorithm {
    width: 16,
    poly: 0x080F,
    init: 0x0000,
    refin: true,
    refout: true,
    xorout: 0x0000,
    check: 0x09A4,
    residue: 0x0000,
};

/// CRC-S5: 24 bit, polynomial 0x5D6DCB, carried in a `u32`.
pub const CRC_S5: Algorithm<u32> = Algorithm {
    width: 24,
    poly: 0x005D_6DCB,
    init: 0x0000_0000,
    refin: true,
    refout: true,
    xorout: 0x0000_0000,
    check: 0x0034_7C4F,
    residue: 0x0000_0000,
};

const S1: Crc<u8> = Crc::<u8>::new(&CRC_S1);
const S2: Crc<u8> = Crc::<u8>::new(&CRC_S2);
const S3: Crc<u16> = Crc::<u16>::new(&CRC_S3);
const S5: Crc<u32> = Crc::<u32>::new(&CRC_S5);

/// Per-connection CRC seeds derived from the Connection Triad.
///
/// CRC-S2 is seeded with the CRC-S1 seed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CrcSeeds {
    pub s1: u8,
    pub s3: u16,
    pub s5: u32,
}

impl CrcSeeds {
    pub fn from_triad(triad: &ConnectionTriad) -> Self {
        let bytes = triad.to_bytes();
        let seeds = Self {
            s1: S1.checksum(&bytes),
            s3: S3.checksum(&bytes),
            s5: S5.checksum(&bytes),
        };
        tracing::trace!(
            "CRC seeds for {:?}: s1=0x{:02X} s3=0x{:04X} s5=0x{:06X}",
            triad,
            seeds.s1,
            seeds.s3,
            seeds.s5
        );
        seeds
    }
}

/// CRC-S1 over `data` followed by the mode byte.
pub fn data_crc_s1(seed: u8, data: &[u8], mode: u8) -> u8 {
    let mut digest = S1.digest_with_initial(seed);
    digest.update(data);
    digest.update(&[mode]);
    digest.finalize()
}

/// CRC-S2 over the complement of `data` followed by the mode byte.
pub fn data_crc_s2(seed: u8, data: &[u8], mode: u8) -> u8 {
    let mut digest = S2.digest_with_initial(seed);
    for byte in data {
        digest.update(&[!byte]);
    }
    digest.update(&[mode]);
    digest.finalize()
}

/// CRC-S3 over `data` followed by the mode byte. Long Base messages run this
/// once over the actual and once over the complemented data.
pub fn data_crc_s3(seed: u16, data: &[u8], mode: u8) -> u16 {
    let mut digest = S3.digest_with_initial(seed);
    digest.update(data);
    digest.update(&[mode]);
    digest.finalize()
}

/// CRC-S3 over the complement of `data` followed by the mode byte.
pub fn complement_crc_s3(seed: u16, data: &[u8], mode: u8) -> u16 {
    let mut digest = S3.digest_with_initial(seed);
    for byte in data {
        digest.update(&[!byte]);
    }
    digest.update(&[mode]);
    digest.finalize()
}

/// CRC-S1 over a Base time stamp.
pub fn time_stamp_crc_s1(seed: u8, time_stamp: u16) -> u8 {
    let mut digest = S1.digest_with_initial(seed);
    digest.update(&time_stamp.to_le_bytes());
    digest.finalize()
}

/// CRC-S5 over data, mode byte and time stamp of an Extended message.
pub fn data_crc_s5(seed: u32, data: &[u8], mode: u8, time_stamp: u16) -> u32 {
    let mut digest = S5.digest_with_initial(seed);
    digest.update(data);
    digest.update(&[mode]);
    digest.update(&time_stamp.to_le_bytes());
    digest.finalize()
}

/// CRC-S3 over the lead byte and 16-bit value of a time message.
pub fn time_msg_crc_s3(seed: u16, lead: u8, value: u16) -> u16 {
    let mut digest = S3.digest_with_initial(seed);
    digest.update(&[lead]);
    digest.update(&value.to_le_bytes());
    digest.finalize()
}

/// CRC-S5 over the lead byte and 16-bit value of a time message.
pub fn time_msg_crc_s5(seed: u32, lead: u8, value: u16) -> u32 {
    let mut digest = S5.digest_with_initial(seed);
    digest.update(&[lead]);
    digest.update(&value.to_le_bytes());
    digest.finalize()
}

/// Fill every CRC field of `msg` for the given format.
pub fn protect_data(seeds: &CrcSeeds, format: SafetyFormat, msg: &mut DataMsg) {
    let mode = msg.mode.raw();
    match format {
        SafetyFormat::Base => {
            if msg.data.len() <= MAX_SHORT_DATA_LEN {
                msg.actual_crc = data_crc_s1(seeds.s1, &msg.data, mode).into();
                msg.complement_crc = data_crc_s2(seeds.s1, &msg.data, mode).into();
            } else {
                msg.actual_crc = data_crc_s3(seeds.s3, &msg.data, mode);
                msg.complement_crc = complement_crc_s3(seeds.s3, &msg.data, mode);
            }
            msg.time_stamp_crc = time_stamp_crc_s1(seeds.s1, msg.time_stamp);
        }
        SafetyFormat::Extended => {
            msg.crc_s5 = data_crc_s5(seeds.s5, &msg.data, mode, msg.time_stamp);
        }
    }
}

/// Which CRC of a received data message failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataCrcFailure {
    Actual,
    Complement,
    ComplementData,
    TimeStamp,
}

/// Check every CRC of a received data message.
pub fn check_data(
    seeds: &CrcSeeds,
    format: SafetyFormat,
    msg: &DataMsg,
) -> Result<(), DataCrcFailure> {
    let mode = msg.mode.raw();
    match format {
        SafetyFormat::Base => {
            if msg.data.len() <= MAX_SHORT_DATA_LEN {
                if msg.actual_crc != u16::from(data_crc_s1(seeds.s1, &msg.data, mode)) {
                    return Err(DataCrcFailure::Actual);
                }
                if msg.complement_crc != u16::from(data_crc_s2(seeds.s1, &msg.data, mode)) {
                    return Err(DataCrcFailure::Complement);
                }
            } else {
                if msg.actual_crc != data_crc_s3(seeds.s3, &msg.data, mode) {
                    return Err(DataCrcFailure::Actual);
                }
                // the complemented copy must mirror the actual data bit for bit
                if msg.complement.len() != msg.data.len()
                    || msg.complement.iter().zip(&msg.data).any(|(c, d)| *c != !d)
                {
                    return Err(DataCrcFailure::ComplementData);
                }
                if msg.complement_crc != complement_crc_s3(seeds.s3, &msg.data, mode) {
                    return Err(DataCrcFailure::Complement);
                }
            }
            if msg.time_stamp_crc != time_stamp_crc_s1(seeds.s1, msg.time_stamp) {
                return Err(DataCrcFailure::TimeStamp);
            }
            Ok(())
        }
        SafetyFormat::Extended => {
            if msg.crc_s5 != data_crc_s5(seeds.s5, &msg.data, mode, msg.time_stamp) {
                return Err(DataCrcFailure::Actual);
            }
            Ok(())
        }
    }
}

/// CRC of a time coordination message in the given format.
pub fn tcoo_crc(seeds: &CrcSeeds, format: SafetyFormat, ack: AckByte, value: u16) -> u32 {
    match format {
        SafetyFormat::Base => time_msg_crc_s3(seeds.s3, ack.raw(), value).into(),
        SafetyFormat::Extended => time_msg_crc_s5(seeds.s5, ack.raw(), value),
    }
}

/// CRC of a time correction message in the given format.
pub fn tcorr_crc(seeds: &CrcSeeds, format: SafetyFormat, mcast: McastByte, value: u16) -> u32 {
    match format {
        SafetyFormat::Base => time_msg_crc_s3(seeds.s3, mcast.raw(), value).into(),
        SafetyFormat::Extended => time_msg_crc_s5(seeds.s5, mcast.raw(), value),
    }
}
