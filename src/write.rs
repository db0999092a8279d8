//! Encoding of pending channel writes into SET data, and command items.
//!
//! A [`WriteItem`] can do both GET and SET. Since its data only changes when
//! a SET is executed, a GET is only needed once at startup and then after
//! every SET; the `execute_get` flag tracks that for the external worker.

use crate::channel::{Channel, PumpContext};
use crate::item::{
    Decodable, Encodable, GenibusItem, InfoHead, ItemDescriptor, ItemId, Priority,
    ScaleFactors, ScaleFormat, HEAD_CLASS_COMMANDS,
};
use crate::read::{conversion_warning, ReadItem};
use crate::units;
use tracing::warn;

/// ref_rem, the remote reference setpoint. Its INFO appears to always be the
/// same for this device family (unit %, range [0, 100]), so it is filled in
/// at construction and no INFO round trip is needed.
const REF_REM: ItemId = ItemId::new(5, 1);

pub struct WriteItem {
    read: ReadItem,
    execute_get: bool,
}

impl WriteItem {
    pub fn new(
        head_class: u32,
        address: u8,
        byte_width: usize,
        channel: Channel<f64>,
        priority: Priority,
    ) -> Self {
        let mut read = ReadItem::new(head_class, address, byte_width, channel, priority);
        if read.descriptor().id() == REF_REM {
            let head = InfoHead { vi: false, bo: false, sif: ScaleFormat::Scaled };
            read.descriptor_mut().set_four_byte_info(head, 30, 0, 100);
        }
        Self { read, execute_get: true }
    }

    pub fn channel(&self) -> &Channel<f64> {
        self.read.channel()
    }

    pub fn channel_mut(&mut self) -> &mut Channel<f64> {
        self.read.channel_mut()
    }

    /// Whether the external worker should execute this item as GET in the
    /// next cycle. Raised at startup and after every consumed SET so the
    /// channel resynchronises with the device.
    pub fn execute_get(&self) -> bool {
        self.execute_get
    }

    pub fn set_execute_get(&mut self, value: bool) {
        self.execute_get = value;
    }

    /// Convert a channel value (multiplier already divided away) to device
    /// units. Falls back to dividing by the legacy unit factor, with a
    /// warning, when family-aware conversion is unavailable.
    fn scale_from_channel(&self, value: f64, ctx: &mut dyn PumpContext) -> f64 {
        let desc = self.read.descriptor();
        match units::target_to_device(value, self.read.channel().unit(), desc.unit_index()) {
            Some(converted) => converted,
            None => {
                let message = conversion_warning(desc, self.read.channel(), true);
                warn!(message = message.as_str(), item = %desc.id());
                ctx.set_warning_message(&message);
                value / desc.unit_factor()
            }
        }
    }
}

impl GenibusItem for WriteItem {
    fn descriptor(&self) -> &ItemDescriptor {
        self.read.descriptor()
    }

    fn descriptor_mut(&mut self) -> &mut ItemDescriptor {
        self.read.descriptor_mut()
    }

    fn priority(&self) -> Priority {
        self.read.priority()
    }
}

impl Decodable for WriteItem {
    fn process_response_byte(&mut self, byte: u8, ctx: &mut dyn PumpContext) {
        self.read.process_response_byte(byte, ctx);
    }
}

impl Encodable for WriteItem {
    fn is_write_available(&self) -> bool {
        // INFO is a requirement: without it the write value cannot be
        // converted into the correct bytes.
        self.read.descriptor().information_available()
            && self.read.channel().next_write_value().is_some()
    }

    fn byte_at(&self, index: usize, ctx: &mut dyn PumpContext) -> Option<u8> {
        let desc = self.read.descriptor();
        if index >= desc.byte_width() || !desc.information_available() {
            return None;
        }
        let pending = *self.read.channel().next_write_value()?;
        let value = pending / self.read.channel().multiplier();
        let combined = match desc.sif() {
            ScaleFormat::Scaled => {
                let (zero, scale_range) = match desc.scale_factors() {
                    ScaleFactors::Linear { zero, range } => (zero, range),
                    _ => (0, 0),
                };
                let converted = self.scale_from_channel(value, ctx);
                let width_weight = 256f64.powi(desc.byte_width() as i32 - 1);
                ((converted - f64::from(zero)) * (254.0 * width_weight)
                    / f64::from(scale_range))
                .round() as i64
            }
            ScaleFormat::Extended => {
                let (zero_hi, zero_lo) = match desc.scale_factors() {
                    ScaleFactors::Wide { zero_hi, zero_lo } => (zero_hi, zero_lo),
                    _ => (0, 0),
                };
                let converted = self.scale_from_channel(value, ctx);
                converted.round() as i64 - (256 * i64::from(zero_hi) + i64::from(zero_lo))
            }
            ScaleFormat::None | ScaleFormat::Bitwise => value.round() as i64,
        };
        Some(extract_byte(combined, index, desc.byte_width()))
    }

    fn consume_next_write(&mut self) {
        self.read.channel_mut().consume_next_write_value();
        // Do a GET in the next cycle to update the channel to the new value.
        self.execute_get = true;
    }
}

/// Segment the combined SET value into bytes, 0 being hi. Out of range
/// results are saturated to the unsigned byte range, never rejected.
fn extract_byte(combined: i64, index: usize, width: usize) -> u8 {
    let value = if index == 0 {
        combined / 256i64.pow(width as u32 - 1)
    } else {
        (combined % 256i64.pow(index as u32)) / 256i64.pow((width - 1 - index) as u32)
    };
    value.clamp(0, 255) as u8
}

/// A head class 3, SET-only item. Commands are boolean: `true` in the write
/// slot means "send the command", anything else means "do not send". The
/// pending value is consumed when the command is scheduled so it fires at
/// most once per assertion.
pub struct CommandItem {
    desc: ItemDescriptor,
    channel: Channel<bool>,
}

impl CommandItem {
    pub fn new(address: u8, channel: Channel<bool>) -> Self {
        Self { desc: ItemDescriptor::new(HEAD_CLASS_COMMANDS, address, 1), channel }
    }

    pub fn channel(&self) -> &Channel<bool> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel<bool> {
        &mut self.channel
    }
}

impl GenibusItem for CommandItem {
    fn descriptor(&self) -> &ItemDescriptor {
        &self.desc
    }

    fn descriptor_mut(&mut self) -> &mut ItemDescriptor {
        &mut self.desc
    }

    fn priority(&self) -> Priority {
        // Pushing a physical button is not idempotent and must not be
        // delayed.
        Priority::High
    }
}

impl Encodable for CommandItem {
    fn is_write_available(&self) -> bool {
        self.channel.next_write_value() == Some(&true)
    }

    fn byte_at(&self, _index: usize, _ctx: &mut dyn PumpContext) -> Option<u8> {
        // Commands carry no data bytes; the address alone fires them.
        None
    }

    fn consume_next_write(&mut self) {
        self.channel.consume_next_write_value();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RecordingContext;
    use crate::units::TargetUnit;

    fn percent_write_item(byte_width: usize, zero: u8, scale_range: u8) -> WriteItem {
        let channel = Channel::new("test", TargetUnit::Percent);
        let mut item = WriteItem::new(4, 30, byte_width, channel, Priority::High);
        let head = InfoHead { vi: false, bo: false, sif: ScaleFormat::Scaled };
        item.descriptor_mut().set_four_byte_info(head, 30, zero, scale_range);
        item
    }

    #[test]
    fn ref_rem_info_is_hard_coded() {
        let channel = Channel::new("setpoint", TargetUnit::Percent);
        let item = WriteItem::new(5, 1, 1, channel, Priority::High);
        let desc = item.descriptor();
        assert!(desc.information_available());
        assert_eq!(desc.sif(), ScaleFormat::Scaled);
        assert_eq!(desc.unit_index(), 30);
        assert_eq!(desc.scale_factors(), ScaleFactors::Linear { zero: 0, range: 100 });
    }

    #[test]
    fn ref_rem_percent_encode() {
        let channel = Channel::new("setpoint", TargetUnit::Percent);
        let mut item = WriteItem::new(5, 1, 1, channel, Priority::High);
        item.channel_mut().set_next_write_value(50.0);
        let mut ctx = RecordingContext::default();
        // round(50 * 254 / 100) = 127.
        assert_eq!(item.byte_at(0, &mut ctx), Some(127));
        assert!(ctx.warnings.is_empty());
    }

    #[test]
    fn scaled_16_bit_byte_extraction() {
        let mut item = percent_write_item(2, 0, 100);
        item.channel_mut().set_next_write_value(40.0);
        let mut ctx = RecordingContext::default();
        // round(40 * 254 * 256 / 100) = 26010 = 101 * 256 + 154.
        assert_eq!(item.byte_at(0, &mut ctx), Some(101));
        assert_eq!(item.byte_at(1, &mut ctx), Some(154));
        assert_eq!(item.byte_at(2, &mut ctx), None);
    }

    #[test]
    fn scaled_8_bit_round_trips_within_one_quantum() {
        let quantum = 100.0 / 254.0;
        for value in [0.0, 12.5, 40.0, 87.3, 100.0] {
            let mut item = percent_write_item(1, 0, 100);
            item.channel_mut().set_next_write_value(value);
            let mut ctx = RecordingContext::default();
            let byte = item.byte_at(0, &mut ctx).unwrap();
            item.process_response_byte(byte, &mut ctx);
            let decoded = *item.channel().value().unwrap();
            assert!(
                (decoded - value).abs() <= quantum,
                "{value} encoded to {byte} decoded to {decoded}",
            );
        }
    }

    #[test]
    fn extended_8_bit_encode() {
        let channel = Channel::new("test", TargetUnit::Percent);
        let mut item = WriteItem::new(4, 24, 1, channel, Priority::High);
        let head = InfoHead { vi: false, bo: false, sif: ScaleFormat::Extended };
        item.descriptor_mut().set_four_byte_info(head, 30, 0, 100);
        item.channel_mut().set_next_write_value(105.0);
        let mut ctx = RecordingContext::default();
        // 105 - (256 * 0 + 100) = 5, the inverse of the extended decode.
        assert_eq!(item.byte_at(0, &mut ctx), Some(5));
    }

    #[test]
    fn bitwise_write_is_plain_big_endian() {
        let channel = Channel::new("test", TargetUnit::None);
        let mut item = WriteItem::new(4, 40, 2, channel, Priority::High);
        item.descriptor_mut().set_one_byte_info(InfoHead {
            vi: false,
            bo: false,
            sif: ScaleFormat::Bitwise,
        });
        item.channel_mut().set_next_write_value(258.0);
        let mut ctx = RecordingContext::default();
        assert_eq!(item.byte_at(0, &mut ctx), Some(1));
        assert_eq!(item.byte_at(1, &mut ctx), Some(2));
    }

    #[test]
    fn out_of_range_values_are_clamped_not_rejected() {
        let mut item = percent_write_item(1, 0, 100);
        item.channel_mut().set_next_write_value(200.0);
        let mut ctx = RecordingContext::default();
        assert_eq!(item.byte_at(0, &mut ctx), Some(255));
        item.channel_mut().set_next_write_value(-50.0);
        assert_eq!(item.byte_at(0, &mut ctx), Some(0));
    }

    #[test]
    fn no_write_available_without_pending_value_or_info() {
        let mut item = percent_write_item(1, 0, 100);
        let mut ctx = RecordingContext::default();
        assert!(!item.is_write_available());
        assert_eq!(item.byte_at(0, &mut ctx), None);

        let channel = Channel::new("test", TargetUnit::Percent);
        let mut no_info = WriteItem::new(4, 31, 1, channel, Priority::High);
        no_info.channel_mut().set_next_write_value(10.0);
        assert!(!no_info.is_write_available());
        assert_eq!(no_info.byte_at(0, &mut ctx), None);
    }

    #[test]
    fn consume_clears_pending_and_requests_get() {
        let mut item = percent_write_item(1, 0, 100);
        item.set_execute_get(false);
        item.channel_mut().set_next_write_value(10.0);
        assert!(item.is_write_available());
        item.consume_next_write();
        assert!(!item.is_write_available());
        assert!(item.execute_get());
    }

    #[test]
    fn conversion_fallback_divides_by_unit_factor() {
        // Unit 20 is "Celsius/10" (factor 0.1) but the channel declares bar.
        let channel = Channel::new("test", TargetUnit::Bar);
        let mut item = WriteItem::new(4, 42, 1, channel, Priority::High);
        let head = InfoHead { vi: false, bo: false, sif: ScaleFormat::Extended };
        item.descriptor_mut().set_four_byte_info(head, 20, 0, 0);
        item.channel_mut().set_next_write_value(10.0);
        let mut ctx = RecordingContext::default();
        // 10 / 0.1 = 100, minus a zero constant of 0.
        assert_eq!(item.byte_at(0, &mut ctx), Some(100));
        assert_eq!(ctx.warnings.len(), 1);
        assert!(ctx.warnings[0].contains("unit mismatch"), "{}", ctx.warnings[0]);
    }

    #[test]
    fn command_fires_at_most_once_per_assertion() {
        let mut command = CommandItem::new(121, Channel::new("wink", TargetUnit::None));
        assert!(!command.is_write_available());
        command.channel_mut().set_next_write_value(true);
        assert!(command.is_write_available());
        command.consume_next_write();
        assert!(!command.is_write_available());
        // `false` means "do not send", it never fires.
        command.channel_mut().set_next_write_value(false);
        assert!(!command.is_write_available());
    }

    #[test]
    fn commands_carry_no_data_bytes() {
        let mut command = CommandItem::new(121, Channel::new("wink", TargetUnit::None));
        command.channel_mut().set_next_write_value(true);
        let mut ctx = RecordingContext::default();
        assert_eq!(command.byte_at(0, &mut ctx), None);
        assert_eq!(command.priority(), Priority::High);
    }
}
