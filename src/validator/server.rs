//! Safety validator server: the consuming end of a safety connection.

use heapless::Vec;
use tracing::{debug, info, trace, warn};

use super::ValidatorError;
use super::crc::{CrcSeeds, check_data, tcorr_crc};
use super::tcoo::build_tcoo;
use crate::sce::{ConnectionTriad, OpenPlan};
use crate::sfa::{DataLayout, DataMsg, MAX_DATA_LEN, MixMethod, SafetyFormat, TcorrMsg, encode_mixed};
use crate::traits::WireFormat;

/// A data message that passed every check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Consumed {
    pub data: Vec<u8, MAX_DATA_LEN>,
    pub run: bool,
    /// Length of the time coordination reply written to the caller's buffer,
    /// when the message carried a new ping count.
    pub tcoo_len: Option<usize>,
}

/// Consuming validator instance.
#[derive(Debug, Clone)]
pub struct SafetyValidatorServer {
    instance_id: u16,
    triad: ConnectionTriad,
    seeds: CrcSeeds,
    format: SafetyFormat,
    data_len: usize,
    epi_us: u32,
    consumer_number: u8,
    /// Network time expectation in ticks.
    age_limit: u16,
    last_ping_count: Option<u8>,
    tcoo_sent: bool,
    time_coordinated: bool,
    /// Correction received in the last time correction message.
    correction: u16,
    mix_method: MixMethod,
}

impl SafetyValidatorServer {
    pub fn open(
        instance_id: u16,
        triad: ConnectionTriad,
        plan: &OpenPlan,
        mix_method: MixMethod,
    ) -> Self {
        info!(
            "Consumer instance {} open: {:?}, {} bytes, EPI {} us",
            instance_id, plan.format, plan.data_len, plan.epi_us
        );
        Self {
            instance_id,
            triad,
            seeds: CrcSeeds::from_triad(&triad),
            format: plan.format,
            data_len: plan.data_len,
            epi_us: plan.epi_us,
            consumer_number: 1,
            age_limit: plan.net_time_expectation_multiplier,
            last_ping_count: None,
            tcoo_sent: false,
            time_coordinated: false,
            correction: 0,
            mix_method,
        }
    }

    pub fn instance_id(&self) -> u16 {
        self.instance_id
    }

    pub fn triad(&self) -> ConnectionTriad {
        self.triad
    }

    pub fn format(&self) -> SafetyFormat {
        self.format
    }

    pub fn data_len(&self) -> usize {
        self.data_len
    }

    pub fn epi_us(&self) -> u32 {
        self.epi_us
    }

    /// Data time stamps are checked against the network time expectation
    /// once this is set.
    pub fn is_time_coordinated(&self) -> bool {
        self.time_coordinated
    }

    /// Check a received data frame and answer a new ping count with a time
    /// coordination message written into `tcoo_out`.
    ///
    /// # Errors
    /// - frame errors (fail-safe) for a frame of the wrong size
    /// - CRC, mode byte and data age errors (not fail-safe); the data is discarded
    pub fn on_data(
        &mut self,
        bytes: &[u8],
        now: u16,
        tcoo_out: &mut [u8],
    ) -> Result<Consumed, ValidatorError> {
        let layout = DataLayout {
            format: self.format,
            data_len: self.data_len,
        };
        let msg = DataMsg::decode(layout, bytes)?;
        check_data(&self.seeds, self.format, &msg).map_err(ValidatorError::DataCrc)?;
        if !msg.mode.is_consistent() {
            return Err(ValidatorError::ModeRedundancy(msg.mode.raw()));
        }
        if self.time_coordinated {
            let corrected = msg.time_stamp.wrapping_add(self.correction);
            // a time stamp slightly ahead of the local clock counts as fresh
            let age = now.wrapping_sub(corrected) as i16;
            let age = age.max(0) as u16;
            if age > self.age_limit {
                warn!(
                    "Consumer instance {}: data aged {} ticks",
                    self.instance_id, age
                );
                return Err(ValidatorError::DataAge {
                    age,
                    limit: self.age_limit,
                });
            }
        }

        let ping_count = msg.mode.ping_count();
        let tcoo_len = if self.last_ping_count != Some(ping_count) {
            self.last_ping_count = Some(ping_count);
            if self.tcoo_sent && !self.time_coordinated {
                debug!("Consumer instance {} time coordinated", self.instance_id);
                self.time_coordinated = true;
            }
            let tcoo = build_tcoo(&self.seeds, self.format, ping_count, now);
            let len = encode_mixed(&tcoo, self.format, self.mix_method, tcoo_out)?;
            self.tcoo_sent = true;
            trace!(
                "Consumer instance {}: time coordination for ping count {}",
                self.instance_id, ping_count
            );
            Some(len)
        } else {
            None
        };

        Ok(Consumed {
            data: msg.data,
            run: msg.mode.is_run(),
            tcoo_len,
        })
    }

    /// Apply a time correction message of a multicast producer.
    ///
    /// # Errors
    /// - frame errors (fail-safe) for a message of the wrong size
    /// - parity, redundancy, consumer number and CRC errors (not fail-safe)
    pub fn on_time_correction(&mut self, bytes: &[u8]) -> Result<(), ValidatorError> {
        let msg = TcorrMsg::decode(self.format, bytes)?;
        if !msg.mcast.parity_ok() {
            return Err(ValidatorError::TcorrParity(msg.mcast.raw()));
        }
        if self.format == SafetyFormat::Base && !msg.mcast_redundancy_ok() {
            return Err(ValidatorError::TcorrRedundancy(msg.mcast.raw()));
        }
        if msg.mcast.consumer_num() != self.consumer_number {
            return Err(ValidatorError::TcorrConsumer {
                expected: self.consumer_number,
                actual: msg.mcast.consumer_num(),
            });
        }
        let received = match self.format {
            SafetyFormat::Base => u32::from(msg.crc_s3),
            SafetyFormat::Extended => msg.crc_s5,
        };
        if tcorr_crc(&self.seeds, self.format, msg.mcast, msg.correction) != received {
            return Err(ValidatorError::TcorrCrc);
        }
        self.correction = msg.correction;
        self.time_coordinated = true;
        debug!(
            "Consumer instance {}: time correction {}",
            self.instance_id, msg.correction as i16
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Classify;
    use crate::sce::ValidatorKind;
    use crate::sfa::{McastByte, ModeByte, TCOO_SIZE, TcooMsg, unmix};
    use crate::validator::crc::protect_data;

    fn triad() -> ConnectionTriad {
        ConnectionTriad {
            connection_serial: 0x0102,
            vendor_id: 0x1234,
            originator_serial: 0xDEAD_BEEF,
        }
    }

    fn server(format: SafetyFormat, data_len: usize) -> SafetyValidatorServer {
        let plan = OpenPlan {
            kind: ValidatorKind::Consumer,
            format,
            data_len,
            multicast: false,
            epi_us: 10_000,
            tcoo_rpi_us: 20_000,
            tcorr_epi_us: 0,
            ping_interval_multiplier: 2,
            tcoo_min_multiplier: 10,
            net_time_expectation_multiplier: 400,
            timeout_multiplier: 2,
            max_consumer_number: 1,
            max_fault_number: None,
            consuming_instance: 2,
            producing_instance: 3,
        };
        SafetyValidatorServer::open(5, triad(), &plan, MixMethod::OddEvenSort)
    }

    /// Data frame in wire order, as the producer would send it.
    fn frame(format: SafetyFormat, data: &[u8], ping_count: u8, time_stamp: u16) -> std::vec::Vec<u8> {
        let mut msg = DataMsg::with_data(data).unwrap();
        msg.mode = ModeByte::new(true, ping_count);
        msg.time_stamp = time_stamp;
        protect_data(&CrcSeeds::from_triad(&triad()), format, &mut msg);
        let layout = DataLayout {
            format,
            data_len: data.len(),
        };
        let mut mixed = [0u8; 512];
        let len = encode_mixed(&msg, layout, MixMethod::OddEvenSort, &mut mixed).unwrap();
        let mut wire = vec![0u8; len];
        unmix(MixMethod::OddEvenSort, &mixed[..len], &mut wire).unwrap();
        wire
    }

    #[test]
    fn test_new_ping_count_is_answered() {
        let mut server = server(SafetyFormat::Base, 4);
        let mut tcoo = [0u8; TCOO_SIZE];
        let consumed = server
            .on_data(&frame(SafetyFormat::Base, &[1, 2, 3, 4], 0, 10), 1_000, &mut tcoo)
            .unwrap();
        assert_eq!(&consumed.data[..], &[1, 2, 3, 4]);
        assert!(consumed.run);
        assert_eq!(consumed.tcoo_len, Some(TCOO_SIZE));

        let mut wire = [0u8; TCOO_SIZE];
        unmix(MixMethod::OddEvenSort, &tcoo, &mut wire).unwrap();
        let msg = TcooMsg::decode(SafetyFormat::Base, &wire).unwrap();
        assert!(msg.ack.ping_response());
        assert_eq!(msg.ack.ping_count_reply(), 0);
        assert_eq!(msg.consumer_time, 1_000);
        assert!(msg.ack_redundancy_ok());

        let consumed = server
            .on_data(&frame(SafetyFormat::Base, &[1, 2, 3, 4], 0, 20), 1_010, &mut tcoo)
            .unwrap();
        assert_eq!(consumed.tcoo_len, None);
        assert!(!server.is_time_coordinated());
    }

    #[test]
    fn test_corrupted_data_is_rejected() {
        let mut server = server(SafetyFormat::Extended, 2);
        let mut bytes = frame(SafetyFormat::Extended, &[7, 8], 1, 0);
        bytes[0] ^= 0x01;
        let mut tcoo = [0u8; TCOO_SIZE];
        assert!(matches!(
            server.on_data(&bytes, 0, &mut tcoo),
            Err(ValidatorError::DataCrc(_))
        ));
        assert!(server.on_data(&bytes[..7], 0, &mut tcoo).unwrap_err().is_fail_safe());
    }

    #[test]
    fn test_data_age_after_time_coordination() {
        let mut server = server(SafetyFormat::Base, 2);
        let mut tcoo = [0u8; TCOO_SIZE];
        server
            .on_data(&frame(SafetyFormat::Base, &[0, 0], 0, 0), 100, &mut tcoo)
            .unwrap();
        server
            .on_data(&frame(SafetyFormat::Base, &[0, 0], 1, 150), 200, &mut tcoo)
            .unwrap();
        assert!(server.is_time_coordinated());
        server
            .on_data(&frame(SafetyFormat::Base, &[0, 0], 1, 300), 700, &mut tcoo)
            .unwrap();
        assert_eq!(
            server.on_data(&frame(SafetyFormat::Base, &[0, 0], 1, 300), 701, &mut tcoo),
            Err(ValidatorError::DataAge {
                age: 401,
                limit: 400
            })
        );
        // slightly ahead of the local clock
        assert!(
            server
                .on_data(&frame(SafetyFormat::Base, &[0, 0], 1, 710), 701, &mut tcoo)
                .is_ok()
        );
    }

    #[test]
    fn test_time_correction_checks() {
        let mut server = server(SafetyFormat::Base, 2);
        let seeds = CrcSeeds::from_triad(&triad());
        let mcast = McastByte::new(1);
        let correction = 0xFFF8;
        let crc = tcorr_crc(&seeds, SafetyFormat::Base, mcast, correction) as u16;
        let mut bytes = [0u8; 6];
        bytes[0] = mcast.raw();
        bytes[1..3].copy_from_slice(&correction.to_le_bytes());
        bytes[3] = !mcast.raw();
        bytes[4..6].copy_from_slice(&crc.to_le_bytes());

        let mut wrong_consumer = bytes;
        wrong_consumer[0] = McastByte::new(2).raw();
        wrong_consumer[3] = !wrong_consumer[0];
        assert_eq!(
            server.on_time_correction(&wrong_consumer),
            Err(ValidatorError::TcorrConsumer {
                expected: 1,
                actual: 2
            })
        );
        let mut broken = bytes;
        broken[3] ^= 0x01;
        assert!(matches!(
            server.on_time_correction(&broken),
            Err(ValidatorError::TcorrRedundancy(_))
        ));
        let mut bad_crc = bytes;
        bad_crc[5] ^= 0x01;
        assert_eq!(server.on_time_correction(&bad_crc), Err(ValidatorError::TcorrCrc));

        server.on_time_correction(&bytes).unwrap();
        assert!(server.is_time_coordinated());
    }
}
