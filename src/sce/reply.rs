//! Connection manager replies to SafetyOpen and SafetyClose.
//!
//! Replies are plain CIP messages and are written with `std::io::Write`; only
//! safety telegrams go through the mixing writer.

use std::io::{self, Read, Write};

use super::ConnectionTriad;
use crate::cip::{
    CipStatus, ExtendedStatus, GeneralStatus, SERVICE_FORWARD_CLOSE, SERVICE_FORWARD_OPEN,
    SERVICE_REPLY_FLAG,
};

/// Largest reply the stack sends.
pub const MAX_REPLY_SIZE: usize = 64;

fn read_array<const N: usize, R: Read>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut bytes = [0u8; N];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn write_triad<W: Write>(writer: &mut W, triad: &ConnectionTriad) -> io::Result<usize> {
    writer.write_all(&triad.connection_serial.to_le_bytes())?;
    writer.write_all(&triad.vendor_id.to_le_bytes())?;
    writer.write_all(&triad.originator_serial.to_le_bytes())?;
    Ok(8)
}

fn read_triad<R: Read>(reader: &mut R) -> io::Result<ConnectionTriad> {
    let [s0, s1, v0, v1, o0, o1, o2, o3] = read_array::<8, R>(reader)?;
    Ok(ConnectionTriad {
        connection_serial: u16::from_le_bytes([s0, s1]),
        vendor_id: u16::from_le_bytes([v0, v1]),
        originator_serial: u32::from_le_bytes([o0, o1, o2, o3]),
    })
}

/// Message router reply header: reply service, general status and the
/// optional extended status word.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReplyHeader {
    pub service: u8,
    pub status: CipStatus,
}

impl ReplyHeader {
    pub fn to_writer<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        let general: u8 = self.status.general.into();
        match self.status.extended {
            Some(extended) => {
                writer.write_all(&[self.service | SERVICE_REPLY_FLAG, 0x00, general, 0x01])?;
                writer.write_all(&u16::from(extended).to_le_bytes())?;
                Ok(6)
            }
            None => {
                writer.write_all(&[self.service | SERVICE_REPLY_FLAG, 0x00, general, 0x00])?;
                Ok(4)
            }
        }
    }

    /// # Errors
    /// - if the reply is truncated or carries an unknown extended status
    pub fn from_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let [service, _, general, words] = read_array::<4, R>(reader)?;
        let mut extended = None;
        for word in 0..words {
            let value = u16::from_le_bytes(read_array::<2, R>(reader)?);
            if word == 0 {
                extended = Some(ExtendedStatus::try_from(value).map_err(|raw| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("unknown extended status 0x{raw:04X}"),
                    )
                })?);
            }
        }
        Ok(Self {
            service: service & !SERVICE_REPLY_FLAG,
            status: CipStatus::new(GeneralStatus::from(general), extended),
        })
    }
}

/// Application reply of a successful SafetyOpen.
///
/// Joining multicast consumers learn the Connection Triad the producer seeds
/// its data CRCs with from `opener`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SafetyAppReply {
    pub consumer_number: u16,
    pub opener: ConnectionTriad,
}

impl SafetyAppReply {
    pub const WORDS: u8 = 5;
}

/// Successful SafetyOpen reply.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ForwardOpenSuccess {
    pub ot_connection_id: u32,
    pub to_connection_id: u32,
    pub triad: ConnectionTriad,
    /// Actual packet intervals, in microseconds.
    pub ot_api: u32,
    pub to_api: u32,
    pub app_reply: SafetyAppReply,
}

impl ForwardOpenSuccess {
    pub fn to_writer<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut written = ReplyHeader {
            service: SERVICE_FORWARD_OPEN,
            status: CipStatus::general_only(GeneralStatus::Success),
        }
        .to_writer(writer)?;
        writer.write_all(&self.ot_connection_id.to_le_bytes())?;
        writer.write_all(&self.to_connection_id.to_le_bytes())?;
        written += 8;
        written += write_triad(writer, &self.triad)?;
        writer.write_all(&self.ot_api.to_le_bytes())?;
        writer.write_all(&self.to_api.to_le_bytes())?;
        writer.write_all(&[SafetyAppReply::WORDS, 0x00])?;
        writer.write_all(&self.app_reply.consumer_number.to_le_bytes())?;
        written += 12;
        written += write_triad(writer, &self.app_reply.opener)?;
        Ok(written)
    }

    /// Reads the reply body after a successful [`ReplyHeader`].
    pub fn from_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let ot_connection_id = u32::from_le_bytes(read_array::<4, R>(reader)?);
        let to_connection_id = u32::from_le_bytes(read_array::<4, R>(reader)?);
        let triad = read_triad(reader)?;
        let ot_api = u32::from_le_bytes(read_array::<4, R>(reader)?);
        let to_api = u32::from_le_bytes(read_array::<4, R>(reader)?);
        let [words, _] = read_array::<2, R>(reader)?;
        if words != SafetyAppReply::WORDS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("application reply of {words} words"),
            ));
        }
        let consumer_number = u16::from_le_bytes(read_array::<2, R>(reader)?);
        let opener = read_triad(reader)?;
        Ok(Self {
            ot_connection_id,
            to_connection_id,
            triad,
            ot_api,
            to_api,
            app_reply: SafetyAppReply {
                consumer_number,
                opener,
            },
        })
    }
}

/// Unsuccessful SafetyOpen reply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ForwardOpenFailure {
    pub triad: ConnectionTriad,
    pub status: CipStatus,
    pub remaining_path_words: u8,
}

impl ForwardOpenFailure {
    pub fn to_writer<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut written = ReplyHeader {
            service: SERVICE_FORWARD_OPEN,
            status: self.status,
        }
        .to_writer(writer)?;
        written += write_triad(writer, &self.triad)?;
        writer.write_all(&[self.remaining_path_words, 0x00])?;
        Ok(written + 2)
    }
}

/// SafetyClose reply, successful or not. Both carry the triad and two more
/// bytes: application reply size (always 0) or remaining path size.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ForwardCloseReply {
    pub triad: ConnectionTriad,
    pub status: CipStatus,
}

impl ForwardCloseReply {
    pub fn to_writer<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut written = ReplyHeader {
            service: SERVICE_FORWARD_CLOSE,
            status: self.status,
        }
        .to_writer(writer)?;
        written += write_triad(writer, &self.triad)?;
        writer.write_all(&[0x00, 0x00])?;
        Ok(written + 2)
    }

    /// Reads a complete reply, header included.
    pub fn from_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let header = ReplyHeader::from_reader(reader)?;
        let triad = read_triad(reader)?;
        let _ = read_array::<2, R>(reader)?;
        Ok(Self {
            triad,
            status: header.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triad() -> ConnectionTriad {
        ConnectionTriad {
            connection_serial: 0x0102,
            vendor_id: 0x1234,
            originator_serial: 0xDEAD_BEEF,
        }
    }

    #[test]
    fn test_success_reply_layout() {
        let reply = ForwardOpenSuccess {
            ot_connection_id: 0x1111_0001,
            to_connection_id: 0x2222_0002,
            triad: triad(),
            ot_api: 10_000,
            to_api: 20_000,
            app_reply: SafetyAppReply {
                consumer_number: 1,
                opener: triad(),
            },
        };
        let mut buffer = Vec::new();
        let written = reply.to_writer(&mut buffer).unwrap();
        assert_eq!(written, buffer.len());
        assert_eq!(buffer.len(), 40);
        assert!(buffer.len() <= MAX_REPLY_SIZE);
        assert_eq!(&buffer[..4], &[0xD4, 0x00, 0x00, 0x00]);
        assert_eq!(buffer[28], SafetyAppReply::WORDS);

        let mut reader = buffer.as_slice();
        let header = ReplyHeader::from_reader(&mut reader).unwrap();
        assert_eq!(header.service, SERVICE_FORWARD_OPEN);
        assert_eq!(header.status.general, GeneralStatus::Success);
        assert_eq!(ForwardOpenSuccess::from_reader(&mut reader).unwrap(), reply);
    }

    #[test]
    fn test_failure_reply_layout() {
        let reply = ForwardOpenFailure {
            triad: triad(),
            status: CipStatus::connection_failure(ExtendedStatus::TunidMismatch),
            remaining_path_words: 0,
        };
        let mut buffer = Vec::new();
        assert_eq!(reply.to_writer(&mut buffer).unwrap(), 16);
        assert_eq!(
            buffer,
            [
                0xD4, 0x00, 0x01, 0x01, 0x0D, 0x08, 0x02, 0x01, 0x34, 0x12, 0xEF, 0xBE, 0xAD,
                0xDE, 0x00, 0x00
            ]
        );
        let header = ReplyHeader::from_reader(&mut buffer.as_slice()).unwrap();
        assert_eq!(header.status, reply.status);
    }

    #[test]
    fn test_close_reply_round_trip() {
        let reply = ForwardCloseReply {
            triad: triad(),
            status: CipStatus::connection_failure(ExtendedStatus::ConnectionNotFound),
        };
        let mut buffer = Vec::new();
        reply.to_writer(&mut buffer).unwrap();
        assert_eq!(buffer[0], 0xCE);
        assert_eq!(ForwardCloseReply::from_reader(&mut buffer.as_slice()).unwrap(), reply);
    }

    #[test]
    fn test_unknown_extended_status_is_rejected() {
        let bytes = [0xD4, 0x00, 0x01, 0x01, 0x01, 0x01];
        assert_eq!(
            ReplyHeader::from_reader(&mut &bytes[..]).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
    }
}
