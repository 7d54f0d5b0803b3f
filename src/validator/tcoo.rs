//! Time coordination: cold start constants and the per-consumer checks a
//! producer applies to every received time coordination message.
//!
//! Times are 16-bit counters in 128 us ticks. EPI counts come from the
//! producing validator, which advances its counter once per produced frame.

use tracing::{debug, trace};

use super::ValidatorError;
use super::crc::{CrcSeeds, tcoo_crc};
use crate::sce::ConnectionTriad;
use crate::sfa::{AckByte, SafetyFormat, TcooMsg};

/// Length of one time tick in microseconds.
pub const TICK_US: u32 = 128;

const DRIFT_DIVISOR: u64 = 320_000;
const RESPONSE_WINDOW_US: u64 = 5_000_000;

/// Smallest legal time coordination response limit, in EPIs.
pub const MIN_RESPONSE_LIMIT: u32 = 5;
/// Largest legal time coordination response limit, in EPIs.
pub const MAX_RESPONSE_LIMIT: u32 = 1_000;

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Worst case drift between two clocks over one ping interval, in ticks.
/// Never less than 1.
pub fn time_drift_per_ping_interval(epi_us: u32, ping_interval_multiplier: u16) -> u32 {
    let drift = (u64::from(epi_us) * u64::from(ping_interval_multiplier)).div_ceil(DRIFT_DIVISOR);
    saturate_u32(drift.max(1))
}

/// Drift accumulated over the timeout multiplier plus one ping intervals.
pub fn time_drift_constant(
    timeout_multiplier: u8,
    epi_us: u32,
    ping_interval_multiplier: u16,
) -> u32 {
    let span = (u64::from(timeout_multiplier) + 1)
        * u64::from(epi_us)
        * u64::from(ping_interval_multiplier);
    saturate_u32(span.div_ceil(DRIFT_DIVISOR))
}

pub fn connection_correction_constant(drift_constant: u32, tcoo_min_multiplier: u16) -> i32 {
    let value = i64::from(drift_constant) + 1 - i64::from(tcoo_min_multiplier);
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Five seconds expressed in EPIs, rounded up.
///
/// # Errors
/// - [`ValidatorError::ResponseLimitRange`] (fail-safe) when the result falls
///   outside 5..=1000. Such an EPI must never have passed connection
///   validation.
pub fn response_epi_limit(epi_us: u32) -> Result<u32, ValidatorError> {
    let out_of_range = ValidatorError::ResponseLimitRange { epi_us };
    if epi_us == 0 {
        return Err(out_of_range);
    }
    let limit = saturate_u32(RESPONSE_WINDOW_US.div_ceil(u64::from(epi_us)));
    if !(MIN_RESPONSE_LIMIT..=MAX_RESPONSE_LIMIT).contains(&limit) {
        return Err(out_of_range);
    }
    Ok(limit)
}

/// Per-consumer constants computed by the cold start logic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimeConstants {
    pub drift_constant: u32,
    pub correction_constant: i32,
    pub response_limit: u32,
}

impl TimeConstants {
    /// # Errors
    /// - [`ValidatorError::ResponseLimitRange`] (fail-safe)
    pub fn cold_start(
        epi_us: u32,
        ping_interval_multiplier: u16,
        timeout_multiplier: u8,
        tcoo_min_multiplier: u16,
    ) -> Result<Self, ValidatorError> {
        let drift_constant = time_drift_constant(timeout_multiplier, epi_us, ping_interval_multiplier);
        Ok(Self {
            drift_constant,
            correction_constant: connection_correction_constant(drift_constant, tcoo_min_multiplier),
            response_limit: response_epi_limit(epi_us)?,
        })
    }
}

/// Time coordination state of one consumer slot.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConsumerState {
    /// Slot free for a joining consumer.
    #[default]
    Closed,
    /// Cold started, waiting for the first valid time coordination message.
    Open,
    Active,
    /// Faulted. While `quarantine` runs the consumer number cannot be reused.
    Faulted,
}

/// Result of checking one time coordination message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TcooCheck {
    /// Not a ping response, or the slot is not open.
    Ignored,
    /// Same consumer time value as the last accepted message. Processing
    /// stops; the consumer stays active.
    Duplicate(u16),
    Accepted { correction: i32 },
    Failed(ValidatorError),
}

/// Time locals of one consumer of a producing validator.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsumerTime {
    pub consumer_number: u8,
    pub triad: ConnectionTriad,
    pub(crate) seeds: CrcSeeds,
    pub state: ConsumerState,
    pub constants: Option<TimeConstants>,
    /// `None` for Base format: the first failure faults the consumer.
    pub max_fault_number: Option<u16>,
    pub fault_counter: u16,
    pub consumer_time: u16,
    pub producer_received_time: u16,
    /// Worst case consumer time correction value of the last accepted message.
    pub correction: i32,
    pub(crate) last_tcoo_epi: u32,
    /// EPI count at which the current response window started.
    pub(crate) response_window_epi: u32,
    /// EPIs left before a faulted slot is released.
    pub quarantine: u32,
    /// A new correction has not been sent in a time correction message yet.
    pub(crate) correction_pending: bool,
}

impl ConsumerTime {
    /// An unused slot.
    pub fn closed(consumer_number: u8) -> Self {
        Self {
            consumer_number,
            ..Self::default()
        }
    }

    /// Cold start this slot for the consumer identified by `triad`. Every
    /// time local is reset.
    pub fn cold_start(
        &mut self,
        triad: ConnectionTriad,
        constants: TimeConstants,
        max_fault_number: Option<u16>,
        epi_count: u32,
    ) {
        *self = Self {
            consumer_number: self.consumer_number,
            triad,
            seeds: CrcSeeds::from_triad(&triad),
            state: ConsumerState::Open,
            constants: Some(constants),
            max_fault_number,
            last_tcoo_epi: epi_count,
            response_window_epi: epi_count,
            ..Self::default()
        };
        debug!(
            "Consumer {} cold start: {:?}",
            self.consumer_number, constants
        );
    }

    /// Release the slot.
    pub fn close(&mut self) {
        *self = Self::closed(self.consumer_number);
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state, ConsumerState::Open | ConsumerState::Active)
    }

    /// Free for a joining consumer.
    pub fn is_free(&self) -> bool {
        self.state == ConsumerState::Closed
    }

    fn response_limit(&self) -> u32 {
        self.constants.map_or(MIN_RESPONSE_LIMIT, |c| c.response_limit)
    }

    /// Run the time coordination checks in order and update the time locals
    /// when all pass.
    ///
    /// `ping_count` is the producer's current ping count, `epi_count` its EPI
    /// counter and `now` its clock when the message was received.
    pub fn check(
        &mut self,
        msg: &TcooMsg,
        format: SafetyFormat,
        ping_count: u8,
        epi_count: u32,
        now: u16,
    ) -> TcooCheck {
        if !msg.ack.ping_response() || !self.is_live() {
            return TcooCheck::Ignored;
        }
        if self.state == ConsumerState::Active && msg.consumer_time == self.consumer_time {
            return TcooCheck::Duplicate(msg.consumer_time);
        }
        if !msg.ack.parity_ok() {
            return TcooCheck::Failed(ValidatorError::AckParity(msg.ack.raw()));
        }
        if format == SafetyFormat::Base && !msg.ack_redundancy_ok() {
            return TcooCheck::Failed(ValidatorError::AckRedundancy(msg.ack.raw()));
        }
        if self.state == ConsumerState::Active {
            if let Some(err) = self.overdue(epi_count) {
                return TcooCheck::Failed(err);
            }
        }
        let reply = msg.ack.ping_count_reply();
        let previous = ping_count.wrapping_sub(1) & 0x03;
        if reply != ping_count && reply != previous {
            return TcooCheck::Failed(ValidatorError::PingCountReply { reply, ping_count });
        }
        let received = match format {
            SafetyFormat::Base => u32::from(msg.crc_s3),
            SafetyFormat::Extended => msg.crc_s5,
        };
        if tcoo_crc(&self.seeds, format, msg.ack, msg.consumer_time) != received {
            return TcooCheck::Failed(ValidatorError::TcooCrc);
        }

        let correction_constant = self.constants.map_or(0, |c| c.correction_constant);
        self.consumer_time = msg.consumer_time;
        self.producer_received_time = now;
        self.correction =
            i32::from(msg.consumer_time.wrapping_sub(now) as i16) - correction_constant;
        self.state = ConsumerState::Active;
        self.last_tcoo_epi = epi_count;
        self.response_window_epi = epi_count;
        self.correction_pending = true;
        trace!(
            "Consumer {} time coordination accepted, correction {}",
            self.consumer_number, self.correction
        );
        TcooCheck::Accepted {
            correction: self.correction,
        }
    }

    /// Timeout error when more EPIs than the response limit passed since the
    /// last accepted message of an active consumer. A timeout starts a new
    /// response window, so one missed reply counts as one failure.
    pub fn overdue(&mut self, epi_count: u32) -> Option<ValidatorError> {
        if self.state != ConsumerState::Active {
            return None;
        }
        let elapsed = epi_count.wrapping_sub(self.response_window_epi);
        let limit = self.response_limit();
        if elapsed <= limit {
            return None;
        }
        self.response_window_epi = epi_count;
        Some(ValidatorError::ResponseTimeout { elapsed, limit })
    }

    /// Count a failed check. Returns `true` when the consumer must be faulted.
    pub fn record_failure(&mut self) -> bool {
        match self.max_fault_number {
            None => true,
            Some(max) => {
                self.fault_counter = self.fault_counter.saturating_add(1);
                self.fault_counter >= max
            }
        }
    }

    /// Fault the consumer. `quarantine` is the number of EPIs the slot stays
    /// blocked; 0 keeps it faulted until closed.
    pub fn fault(&mut self, quarantine: u32) {
        self.state = ConsumerState::Faulted;
        self.quarantine = quarantine;
        self.correction_pending = false;
    }

    /// Advance the quarantine timer by one EPI.
    pub fn tick_quarantine(&mut self) {
        if self.state == ConsumerState::Faulted && self.quarantine > 0 {
            self.quarantine -= 1;
            if self.quarantine == 0 {
                debug!("Consumer {} quarantine over", self.consumer_number);
                self.close();
            }
        }
    }

    /// Correction widened by the drift of the ping intervals since the last
    /// accepted time coordination message.
    pub fn worst_case_correction(
        &self,
        epi_count: u32,
        ping_interval_multiplier: u16,
        drift_per_ping_interval: u32,
    ) -> i32 {
        let intervals =
            epi_count.wrapping_sub(self.last_tcoo_epi) / u32::from(ping_interval_multiplier.max(1));
        let drift = i64::from(intervals) * i64::from(drift_per_ping_interval);
        i32::try_from(i64::from(self.correction) - drift).unwrap_or(i32::MIN)
    }
}

/// Time coordination message answering `ping_count`, stamped with the
/// consumer's clock.
pub fn build_tcoo(
    seeds: &CrcSeeds,
    format: SafetyFormat,
    ping_count: u8,
    consumer_time: u16,
) -> TcooMsg {
    let ack = AckByte::new(ping_count, true);
    let crc = tcoo_crc(seeds, format, ack, consumer_time);
    match format {
        SafetyFormat::Base => TcooMsg {
            ack,
            consumer_time,
            ack2: !ack.raw(),
            crc_s3: crc as u16,
            crc_s5: 0,
        },
        SafetyFormat::Extended => TcooMsg {
            ack,
            consumer_time,
            ack2: 0,
            crc_s3: 0,
            crc_s5: crc,
        },
    }
}
