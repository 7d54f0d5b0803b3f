//! Safety validator client: the producing end of a safety connection.

use heapless::Vec;
use tracing::{debug, info, warn};

use super::ValidatorError;
use super::crc::{CrcSeeds, protect_data, tcorr_crc};
use super::tcoo::{
    ConsumerState, ConsumerTime, TICK_US, TcooCheck, TimeConstants, time_drift_per_ping_interval,
};
use crate::config::MAX_CONSUMERS;
use crate::sce::{ConnectionTriad, OpenPlan};
use crate::sfa::{
    DataLayout, DataMsg, McastByte, MixMethod, ModeByte, SafetyFormat, TcooMsg, TcorrMsg,
    encode_mixed,
};
use crate::traits::WireFormat;

const MAX_SLOTS: usize = MAX_CONSUMERS as usize;

/// What a received time coordination message did to its consumer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TcooOutcome {
    Ignored,
    /// Duplicate consumer time value, dropped without closing the consumer.
    Duplicate { consumer: u8, consumer_time: u16 },
    Accepted { consumer: u8, correction: i32 },
    /// A check failed. `faulted` when the consumer has been faulted by it,
    /// `all_faulted` when it was the last live consumer.
    Fault {
        consumer: u8,
        reason: ValidatorError,
        faulted: bool,
        all_faulted: bool,
    },
}

/// Producing validator instance with up to 15 consumers.
#[derive(Debug, Clone)]
pub struct SafetyValidatorClient {
    instance_id: u16,
    opener: ConnectionTriad,
    /// Assembly instance the data is produced from.
    producing_instance: u16,
    data_seeds: CrcSeeds,
    format: SafetyFormat,
    data_len: usize,
    multicast: bool,
    epi_us: u32,
    ping_interval_multiplier: u16,
    timeout_multiplier: u8,
    tcoo_min_multiplier: u16,
    net_time_expectation_multiplier: u16,
    max_fault_number: Option<u16>,
    drift_per_ping_interval: u32,
    epi_count: u32,
    ping_count: u8,
    consumers: Vec<ConsumerTime, MAX_SLOTS>,
    all_faulted: bool,
    tcorr_cursor: usize,
    mix_method: MixMethod,
}

impl SafetyValidatorClient {
    /// Create the producer for an accepted SafetyOpen. The opener becomes
    /// consumer 1 and its triad seeds the data CRCs for every consumer.
    ///
    /// # Errors
    /// - [`ValidatorError::ResponseLimitRange`] (fail-safe) if cold start
    ///   fails for the plan's EPI
    pub fn open(
        instance_id: u16,
        opener: ConnectionTriad,
        plan: &OpenPlan,
        mix_method: MixMethod,
    ) -> Result<Self, ValidatorError> {
        let slots = plan.max_consumer_number.clamp(1, MAX_CONSUMERS);
        let mut consumers = Vec::new();
        for number in 1..=slots {
            // slots <= MAX_SLOTS, so the push cannot fail
            let _ = consumers.push(ConsumerTime::closed(number));
        }
        let mut client = Self {
            instance_id,
            opener,
            producing_instance: plan.producing_instance,
            data_seeds: CrcSeeds::from_triad(&opener),
            format: plan.format,
            data_len: plan.data_len,
            multicast: plan.multicast,
            epi_us: plan.epi_us,
            ping_interval_multiplier: plan.ping_interval_multiplier,
            timeout_multiplier: plan.timeout_multiplier,
            tcoo_min_multiplier: plan.tcoo_min_multiplier,
            net_time_expectation_multiplier: plan.net_time_expectation_multiplier,
            max_fault_number: plan.max_fault_number,
            drift_per_ping_interval: time_drift_per_ping_interval(
                plan.epi_us,
                plan.ping_interval_multiplier,
            ),
            epi_count: 0,
            ping_count: 0,
            consumers,
            all_faulted: false,
            tcorr_cursor: 0,
            mix_method,
        };
        client.join(opener)?;
        info!(
            "Producer instance {} open: {:?}, {} bytes, EPI {} us, {} consumer slots",
            instance_id, plan.format, plan.data_len, plan.epi_us, slots
        );
        Ok(client)
    }

    pub fn instance_id(&self) -> u16 {
        self.instance_id
    }

    pub fn opener(&self) -> ConnectionTriad {
        self.opener
    }

    pub fn producing_instance(&self) -> u16 {
        self.producing_instance
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

    pub fn is_multicast(&self) -> bool {
        self.multicast
    }

    pub fn ping_count(&self) -> u8 {
        self.ping_count
    }

    pub fn epi_count(&self) -> u32 {
        self.epi_count
    }

    pub fn drift_per_ping_interval(&self) -> u32 {
        self.drift_per_ping_interval
    }

    pub fn is_all_faulted(&self) -> bool {
        self.all_faulted
    }

    pub fn consumers(&self) -> &[ConsumerTime] {
        &self.consumers
    }

    /// Consumer slot by consumer number.
    pub fn consumer(&self, consumer: u8) -> Option<&ConsumerTime> {
        self.consumers.get(usize::from(consumer).checked_sub(1)?)
    }

    /// Consumer number of the live consumer with this triad.
    pub fn consumer_of(&self, triad: &ConnectionTriad) -> Option<u8> {
        self.consumers
            .iter()
            .find(|slot| slot.state != ConsumerState::Closed && slot.triad == *triad)
            .map(|slot| slot.consumer_number)
    }

    /// Whether a multicast SafetyOpen for this producer can join it.
    pub fn accepts(&self, plan: &OpenPlan) -> bool {
        self.multicast
            && plan.multicast
            && plan.producing_instance == self.producing_instance
            && plan.format == self.format
            && plan.data_len == self.data_len
            && plan.epi_us == self.epi_us
    }

    /// Cold start the first free consumer slot for `triad`. Returns the
    /// assigned consumer number, `Ok(None)` when every slot is live or
    /// quarantined.
    ///
    /// # Errors
    /// - [`ValidatorError::ResponseLimitRange`] (fail-safe)
    pub fn join(&mut self, triad: ConnectionTriad) -> Result<Option<u8>, ValidatorError> {
        let constants = TimeConstants::cold_start(
            self.epi_us,
            self.ping_interval_multiplier,
            self.timeout_multiplier,
            self.tcoo_min_multiplier,
        )?;
        let epi_count = self.epi_count;
        let max_fault_number = self.max_fault_number;
        let Some(slot) = self.consumers.iter_mut().find(|slot| slot.is_free()) else {
            warn!("Producer instance {}: no free consumer slot", self.instance_id);
            return Ok(None);
        };
        slot.cold_start(triad, constants, max_fault_number, epi_count);
        self.all_faulted = false;
        Ok(Some(slot.consumer_number))
    }

    /// Close the consumer with this triad. Returns its consumer number.
    pub fn leave(&mut self, triad: &ConnectionTriad) -> Option<u8> {
        let slot = self
            .consumers
            .iter_mut()
            .find(|slot| slot.state != ConsumerState::Closed && slot.triad == *triad)?;
        slot.close();
        debug!(
            "Producer instance {}: consumer {} left",
            self.instance_id, slot.consumer_number
        );
        Some(slot.consumer_number)
    }

    /// No consumer left that is live or faulted without quarantine. Such a
    /// consumer keeps the instance until its SafetyClose arrives; quarantined
    /// slots go with the instance.
    pub fn is_idle(&self) -> bool {
        self.consumers.iter().all(|slot| match slot.state {
            ConsumerState::Closed => true,
            ConsumerState::Faulted => slot.quarantine > 0,
            ConsumerState::Open | ConsumerState::Active => false,
        })
    }

    /// EPIs a faulted consumer number stays blocked: twice the network time
    /// expectation, at least one EPI.
    pub fn quarantine_epis(&self) -> u32 {
        let window_us =
            2 * u64::from(self.net_time_expectation_multiplier) * u64::from(TICK_US);
        let epis = window_us.div_ceil(u64::from(self.epi_us.max(1)));
        u32::try_from(epis).unwrap_or(u32::MAX).max(1)
    }

    /// Build the next data frame into `out` and advance the EPI counter, the
    /// ping count and every quarantine timer. Returns the telegram length.
    ///
    /// # Errors
    /// - [`ValidatorError::InstanceFaulted`] once every consumer faulted
    /// - frame errors (fail-safe) if `data` does not have the connection's length
    pub fn produce(
        &mut self,
        data: &[u8],
        run: bool,
        now: u16,
        out: &mut [u8],
    ) -> Result<usize, ValidatorError> {
        if self.all_faulted {
            return Err(ValidatorError::InstanceFaulted);
        }
        for slot in self.consumers.iter_mut() {
            slot.tick_quarantine();
        }
        self.epi_count = self.epi_count.wrapping_add(1);
        if self.epi_count % u32::from(self.ping_interval_multiplier.max(1)) == 0 {
            self.ping_count = (self.ping_count + 1) & 0x03;
        }

        let mut msg = DataMsg::with_data(data)?;
        msg.mode = ModeByte::new(run, self.ping_count);
        msg.time_stamp = if self.multicast {
            now
        } else {
            now.wrapping_add(self.worst_case_correction(0) as u16)
        };
        protect_data(&self.data_seeds, self.format, &mut msg);
        let layout = DataLayout {
            format: self.format,
            data_len: self.data_len,
        };
        Ok(encode_mixed(&msg, layout, self.mix_method, out)?)
    }

    /// Worst case correction of the consumer in `slot`, 0 until it is active.
    fn worst_case_correction(&self, slot: usize) -> i32 {
        match self.consumers.get(slot) {
            Some(consumer) if consumer.state == ConsumerState::Active => consumer
                .worst_case_correction(
                    self.epi_count,
                    self.ping_interval_multiplier,
                    self.drift_per_ping_interval,
                ),
            _ => 0,
        }
    }

    /// Process a time coordination message received from `consumer` at `now`.
    ///
    /// # Errors
    /// - [`ValidatorError::UnknownConsumer`] for a consumer number without a slot
    /// - frame errors (fail-safe) for a message of the wrong size
    pub fn on_tcoo(
        &mut self,
        consumer: u8,
        bytes: &[u8],
        now: u16,
    ) -> Result<TcooOutcome, ValidatorError> {
        let msg = TcooMsg::decode(self.format, bytes)?;
        let index = usize::from(consumer)
            .checked_sub(1)
            .filter(|index| *index < self.consumers.len())
            .ok_or(ValidatorError::UnknownConsumer(consumer))?;
        let (format, ping_count, epi_count) = (self.format, self.ping_count, self.epi_count);
        let check = self.consumers[index].check(&msg, format, ping_count, epi_count, now);
        Ok(match check {
            TcooCheck::Ignored => TcooOutcome::Ignored,
            TcooCheck::Duplicate(consumer_time) => TcooOutcome::Duplicate {
                consumer,
                consumer_time,
            },
            TcooCheck::Accepted { correction } => TcooOutcome::Accepted {
                consumer,
                correction,
            },
            TcooCheck::Failed(reason) => self.fail(index, reason),
        })
    }

    /// Count a failed check against the consumer in `index` and fault it when
    /// its format demands.
    fn fail(&mut self, index: usize, reason: ValidatorError) -> TcooOutcome {
        let quarantine = self.quarantine_epis();
        let others_live = self
            .consumers
            .iter()
            .enumerate()
            .any(|(i, slot)| i != index && slot.is_live());
        let slot = &mut self.consumers[index];
        let consumer = slot.consumer_number;
        warn!(
            "Producer instance {}: consumer {} time coordination failed: {}",
            self.instance_id, consumer, reason
        );
        let faulted = slot.record_failure();
        let mut all_faulted = false;
        if faulted {
            if others_live {
                slot.fault(quarantine);
            } else {
                slot.fault(0);
                self.all_faulted = true;
                all_faulted = true;
                warn!("Producer instance {}: all consumers faulted", self.instance_id);
            }
        }
        TcooOutcome::Fault {
            consumer,
            reason,
            faulted,
            all_faulted,
        }
    }

    /// Fault every active consumer whose time coordination reply is overdue.
    pub fn check_overdue(&mut self) -> Vec<TcooOutcome, MAX_SLOTS> {
        let mut outcomes = Vec::new();
        for index in 0..self.consumers.len() {
            if let Some(reason) = self.consumers[index].overdue(self.epi_count) {
                let outcome = self.fail(index, reason);
                // at most one outcome per slot
                let _ = outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Next time correction message of a multicast producer, for the next
    /// consumer with an unsent correction. Returns the consumer number and the
    /// telegram length.
    ///
    /// # Errors
    /// - frame errors (fail-safe) if `out` is too small
    pub fn time_correction_msg(
        &mut self,
        out: &mut [u8],
    ) -> Result<Option<(u8, usize)>, ValidatorError> {
        if !self.multicast {
            return Ok(None);
        }
        let count = self.consumers.len();
        let Some(index) = (0..count)
            .map(|offset| (self.tcorr_cursor + offset) % count)
            .find(|&i| {
                let slot = &self.consumers[i];
                slot.state == ConsumerState::Active && slot.correction_pending
            })
        else {
            return Ok(None);
        };
        let correction = self.worst_case_correction(index) as u16;
        let slot = &mut self.consumers[index];
        let mcast = McastByte::new(slot.consumer_number);
        let crc = tcorr_crc(&slot.seeds, self.format, mcast, correction);
        let msg = match self.format {
            SafetyFormat::Base => TcorrMsg {
                mcast,
                correction,
                mcast2: !mcast.raw(),
                crc_s3: crc as u16,
                crc_s5: 0,
            },
            SafetyFormat::Extended => TcorrMsg {
                mcast,
                correction,
                mcast2: 0,
                crc_s3: 0,
                crc_s5: crc,
            },
        };
        let len = encode_mixed(&msg, self.format, self.mix_method, out)?;
        slot.correction_pending = false;
        let consumer = slot.consumer_number;
        self.tcorr_cursor = (index + 1) % count;
        Ok(Some((consumer, len)))
    }
}
