#![allow(dead_code)]

use cip_safety::cip::{CipStatus, ConnectionType, GeneralStatus, NetConnParams};
use cip_safety::sce::{ConnectionTriad, ForwardOpenSuccess, ReplyHeader};
use cip_safety::sfa::{MixMethod, SafetyFormat, data_frame_size, unmix};
use cip_safety::validator::build_tcoo;
use cip_safety::validator::crc::CrcSeeds;
use cip_safety::{DeviceIdentity, ErrorCode, SafetyApplication, Stack, StackConfig, Transport};

#[derive(Debug, Default)]
pub struct Recorder {
    pub errors: Vec<(ErrorCode, u16, u32)>,
    pub data: Vec<(u16, Vec<u8>, bool)>,
}

impl SafetyApplication for Recorder {
    fn report_error(&mut self, code: ErrorCode, instance_id: u16, add_info: u32) {
        self.errors.push((code, instance_id, add_info));
    }

    fn data_received(&mut self, instance_id: u16, data: &[u8], run: bool) {
        self.data.push((instance_id, data.to_vec(), run));
    }
}

#[derive(Debug, Default)]
pub struct Outbox {
    pub sent: Vec<(u16, Vec<u8>)>,
}

impl Transport for Outbox {
    fn tx_data_put(&mut self, command: u16, data: &[u8]) {
        self.sent.push((command, data.to_vec()));
    }
}

impl Outbox {
    /// Drain every telegram sent with `command`.
    pub fn take(&mut self, command: u16) -> Vec<Vec<u8>> {
        let (taken, kept) = std::mem::take(&mut self.sent)
            .into_iter()
            .partition(|(cmd, _)| *cmd == command);
        self.sent = kept;
        taken.into_iter().map(|(_, bytes)| bytes).collect()
    }
}

pub fn stack(max_instances: usize) -> Stack<Recorder, Outbox> {
    let identity = DeviceIdentity::new(0x1234, 0x0023, 0x0042, 1, 3);
    let config = StackConfig::new(identity, max_instances);
    Stack::new(config, Recorder::default(), Outbox::default()).unwrap()
}

pub fn triad(connection_serial: u16) -> ConnectionTriad {
    ConnectionTriad {
        connection_serial,
        vendor_id: 0x1234,
        originator_serial: 0xDEAD_BEEF,
    }
}

/// Which validator the request opens at the target.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    Producer,
    Consumer,
}

/// Parameters of a SafetyOpen request with a long application path.
#[derive(Clone, Copy, Debug)]
pub struct OpenRequest {
    pub triad: ConnectionTriad,
    pub kind: Kind,
    pub format: SafetyFormat,
    pub data_len: usize,
    pub multicast: bool,
    pub epi_us: u32,
    pub ping_interval_multiplier: u16,
    pub tcoo_min_multiplier: u16,
    pub net_time_expectation: u16,
    pub timeout_multiplier: u8,
    pub max_consumer_number: u8,
    pub max_fault_number: u16,
    pub producing_instance: u8,
}

impl OpenRequest {
    pub fn new(kind: Kind, format: SafetyFormat) -> Self {
        Self {
            triad: triad(0x0102),
            kind,
            format,
            data_len: 4,
            multicast: false,
            epi_us: 10_000,
            ping_interval_multiplier: 2,
            tcoo_min_multiplier: 10,
            net_time_expectation: 400,
            timeout_multiplier: 2,
            max_consumer_number: 1,
            max_fault_number: 3,
            producing_instance: 0x65,
        }
    }

    pub fn multicast(mut self, max_consumer_number: u8) -> Self {
        self.multicast = true;
        self.max_consumer_number = max_consumer_number;
        self
    }

    pub fn with_serial(mut self, connection_serial: u16) -> Self {
        self.triad = triad(connection_serial);
        self
    }

    fn safety_segment(&self) -> Vec<u8> {
        let (words, code) = match self.format {
            SafetyFormat::Base => (27, 0x00),
            SafetyFormat::Extended => (30, 0x02),
        };
        let tcorr_epi = if self.multicast { self.epi_us } else { 0 };
        let mut bytes = vec![0x50, words, code, 0x00];
        bytes.extend_from_slice(&0x1122_3344u32.to_le_bytes());
        bytes.extend_from_slice(&0x0A0B_0C0Du32.to_le_bytes());
        bytes.extend_from_slice(&0x0E0Fu16.to_le_bytes());
        bytes.extend_from_slice(&tcorr_epi.to_le_bytes());
        bytes.extend_from_slice(&u16::from(NetConnParams::new(ConnectionType::Multicast, 6)).to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6, 0x11, 0, 0, 0]);
        bytes.extend_from_slice(&[6, 5, 4, 3, 2, 1, 0x22, 0, 0, 0]);
        bytes.extend_from_slice(&self.ping_interval_multiplier.to_le_bytes());
        bytes.extend_from_slice(&self.tcoo_min_multiplier.to_le_bytes());
        bytes.extend_from_slice(&self.net_time_expectation.to_le_bytes());
        bytes.push(self.timeout_multiplier);
        bytes.push(self.max_consumer_number);
        match self.format {
            SafetyFormat::Base => {
                bytes.extend_from_slice(&0xCAFE_F00Du32.to_le_bytes());
                bytes.extend_from_slice(&0u32.to_le_bytes());
            }
            SafetyFormat::Extended => {
                bytes.extend_from_slice(&self.max_fault_number.to_le_bytes());
                bytes.extend_from_slice(&0xCAFE_F00Du32.to_le_bytes());
                bytes.extend_from_slice(&0u32.to_le_bytes());
                bytes.extend_from_slice(&0u16.to_le_bytes());
                bytes.extend_from_slice(&0u16.to_le_bytes());
            }
        }
        bytes
    }

    pub fn bytes(&self) -> Vec<u8> {
        let frame = data_frame_size(self.format, self.data_len).unwrap() as u16;
        let tcoo_rpi = self.epi_us * u32::from(self.ping_interval_multiplier);
        let data_type = if self.multicast {
            ConnectionType::Multicast
        } else {
            ConnectionType::PointToPoint
        };
        let (ot_rpi, ot_params, to_rpi, to_params) = match self.kind {
            Kind::Producer => (
                tcoo_rpi,
                NetConnParams::new(ConnectionType::PointToPoint, 6),
                self.epi_us,
                NetConnParams::new(data_type, frame),
            ),
            Kind::Consumer => (
                self.epi_us,
                NetConnParams::new(ConnectionType::PointToPoint, frame),
                tcoo_rpi,
                NetConnParams::new(ConnectionType::PointToPoint, 6),
            ),
        };
        let mut path = vec![
            0x20, 0x04, 0x24, 0x01, 0x20, 0x04, 0x24, 0x02, 0x20, 0x04, 0x24,
            self.producing_instance,
        ];
        path.extend_from_slice(&self.safety_segment());

        let mut bytes = vec![0x0A, 0xF0];
        bytes.extend_from_slice(&0x1111_0001u32.to_le_bytes());
        bytes.extend_from_slice(&0x2222_0002u32.to_le_bytes());
        bytes.extend_from_slice(&self.triad.connection_serial.to_le_bytes());
        bytes.extend_from_slice(&self.triad.vendor_id.to_le_bytes());
        bytes.extend_from_slice(&self.triad.originator_serial.to_le_bytes());
        bytes.extend_from_slice(&[0x01, 0, 0, 0]);
        bytes.extend_from_slice(&ot_rpi.to_le_bytes());
        bytes.extend_from_slice(&u16::from(ot_params).to_le_bytes());
        bytes.extend_from_slice(&to_rpi.to_le_bytes());
        bytes.extend_from_slice(&u16::from(to_params).to_le_bytes());
        bytes.push(0x00);
        bytes.push((path.len() / 2) as u8);
        bytes.extend_from_slice(&path);
        bytes
    }
}

pub fn close_request(triad: ConnectionTriad) -> Vec<u8> {
    let mut bytes = vec![0x0A, 0xF0];
    bytes.extend_from_slice(&triad.connection_serial.to_le_bytes());
    bytes.extend_from_slice(&triad.vendor_id.to_le_bytes());
    bytes.extend_from_slice(&triad.originator_serial.to_le_bytes());
    bytes.extend_from_slice(&[0x00, 0x00]);
    bytes
}

/// Parse a SafetyOpen reply: its status and, when successful, its body.
pub fn open_reply(reply: &[u8]) -> (CipStatus, Option<ForwardOpenSuccess>) {
    let mut reader = reply;
    let header = ReplyHeader::from_reader(&mut reader).unwrap();
    let success = (header.status == CipStatus::general_only(GeneralStatus::Success))
        .then(|| ForwardOpenSuccess::from_reader(&mut reader).unwrap());
    (header.status, success)
}

/// Wire order of a telegram the stack handed to the transport, without the
/// `prefix` bytes of instance ID and consumer number.
pub fn wire_frame(telegram: &[u8], prefix: usize) -> Vec<u8> {
    let mixed = &telegram[prefix..];
    let mut frame = vec![0u8; mixed.len()];
    unmix(MixMethod::OddEvenSort, mixed, &mut frame).unwrap();
    frame
}

/// Time coordination message in wire order, as a consumer with `triad` would
/// send it.
pub fn tcoo_frame(
    format: SafetyFormat,
    triad: ConnectionTriad,
    ping_count: u8,
    consumer_time: u16,
) -> Vec<u8> {
    let msg = build_tcoo(&CrcSeeds::from_triad(&triad), format, ping_count, consumer_time);
    let mut bytes = vec![msg.ack.raw()];
    bytes.extend_from_slice(&msg.consumer_time.to_le_bytes());
    match format {
        SafetyFormat::Base => {
            bytes.push(msg.ack2);
            bytes.extend_from_slice(&msg.crc_s3.to_le_bytes());
        }
        SafetyFormat::Extended => bytes.extend_from_slice(&msg.crc_s5.to_le_bytes()[..3]),
    }
    bytes
}

/// Command payload: little-endian instance ID, optional consumer number, frame.
pub fn addressed(instance_id: u16, consumer: Option<u8>, frame: &[u8]) -> Vec<u8> {
    let mut bytes = instance_id.to_le_bytes().to_vec();
    bytes.extend(consumer);
    bytes.extend_from_slice(frame);
    bytes
}
