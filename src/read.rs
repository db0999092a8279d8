//! Decoding of GET response data into channel values.
//!
//! A [`ReadItem`] links one supervisory channel to one GENIbus data item.
//! The transport layer pushes response bytes one call at a time, in the
//! order hi to lo. Once all bytes of the item are collected the combined
//! value is decoded according to the INFO metadata and put in the channel.

use crate::channel::{Channel, PumpContext};
use crate::item::{
    Decodable, GenibusItem, ItemDescriptor, ItemId, Priority, ScaleFactors, ScaleFormat,
};
use crate::units::{self, TargetUnit};
use tracing::warn;

/// ref_norm. Its INFO changes when the pump control mode is changed, so the
/// cached metadata is discarded after every few decodes.
const REF_NORM: ItemId = ItemId::new(2, 49);
const REFRESH_INFO_INTERVAL: u8 = 5;

/// The data item carrying the pressure sensor interval of the pump.
const PRESSURE_SENSOR: ItemId = ItemId::new(2, 37);

pub struct ReadItem {
    desc: ItemDescriptor,
    channel: Channel<f64>,
    priority: Priority,
    buffer: [u8; 4],
    cursor: usize,
    refresh_info_counter: u8,
}

impl ReadItem {
    pub fn new(
        head_class: u32,
        address: u8,
        byte_width: usize,
        channel: Channel<f64>,
        priority: Priority,
    ) -> Self {
        Self {
            desc: ItemDescriptor::new(head_class, address, byte_width),
            channel,
            priority,
            buffer: [0; 4],
            cursor: 0,
            refresh_info_counter: 0,
        }
    }

    pub fn channel(&self) -> &Channel<f64> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel<f64> {
        &mut self.channel
    }

    fn decode(&mut self, ctx: &mut dyn PumpContext) {
        if self.desc.id() == REF_NORM {
            self.refresh_info_counter += 1;
            if self.refresh_info_counter >= REFRESH_INFO_INTERVAL {
                self.desc.reset_info();
                self.refresh_info_counter = 0;
            }
        }

        // With vi == false, 0xFF in the first byte means "data not available".
        if !self.desc.vi() && self.buffer[0] == 0xFF {
            self.channel.set_next_value(None);
            return;
        }

        let width = self.desc.byte_width();
        let bytes = &self.buffer[..width];
        let range = if self.desc.vi() { 255.0 } else { 254.0 };
        match self.desc.sif() {
            ScaleFormat::Scaled => {
                let (zero, scale_range) = match self.desc.scale_factors() {
                    ScaleFactors::Linear { zero, range } => (zero, range),
                    _ => (0, 0),
                };
                // The smallest power of 256 lands on the first received byte
                // here, unlike the hi-to-lo weighting of the other formats.
                // Kept exactly as observed on the wire.
                let mut sum = 0.0;
                for (index, byte) in bytes.iter().enumerate() {
                    sum += f64::from(*byte)
                        * (f64::from(scale_range) / range)
                        * 256f64.powi(index as i32);
                }
                let raw = f64::from(zero) + sum;
                self.scale_to_channel(raw, ctx);
                if self.desc.id() == PRESSURE_SENSOR {
                    // Zero and range of this item describe the sensor
                    // interval; the unit factor expresses them in bar.
                    ctx.set_pressure_sensor_min_bar(f64::from(zero) * self.desc.unit_factor());
                    ctx.set_pressure_sensor_range_bar(
                        f64::from(scale_range) * self.desc.unit_factor(),
                    );
                }
            }
            ScaleFormat::Extended => {
                let (zero_hi, zero_lo) = match self.desc.scale_factors() {
                    ScaleFactors::Wide { zero_hi, zero_lo } => (zero_hi, zero_lo),
                    _ => (0, 0),
                };
                let mut high_precision = 0.0;
                for (index, byte) in bytes.iter().enumerate() {
                    high_precision +=
                        f64::from(*byte) * 256f64.powi((width - 1 - index) as i32);
                }
                let exponent = width.saturating_sub(2) as i32;
                let raw = 256f64.powi(exponent)
                    * f64::from(256 * u16::from(zero_hi) + u16::from(zero_lo))
                    + high_precision;
                self.scale_to_channel(raw, ctx);
            }
            ScaleFormat::None | ScaleFormat::Bitwise => {
                let mut value = 0.0;
                for (index, byte) in bytes.iter().enumerate() {
                    value += f64::from(*byte) * 256f64.powi((width - 1 - index) as i32);
                }
                self.channel.set_next_value(Some(value * self.channel.multiplier()));
            }
        }
    }

    /// Convert `raw` to the unit of the channel and store it there. When the
    /// units are incompatible or unsupported, only the legacy unit factor and
    /// the channel multiplier are applied and a warning is raised.
    fn scale_to_channel(&mut self, raw: f64, ctx: &mut dyn PumpContext) {
        let converted = units::device_to_target(raw, self.desc.unit_index(), self.channel.unit());
        match converted {
            Some(value) => {
                self.channel.set_next_value(Some(value * self.channel.multiplier()));
            }
            None => {
                let message = conversion_warning(&self.desc, &self.channel, false);
                warn!(message = message.as_str(), item = %self.desc.id());
                ctx.set_warning_message(&message);
                let fallback = raw * self.desc.unit_factor() * self.channel.multiplier();
                self.channel.set_next_value(Some(fallback));
            }
        }
    }
}

impl GenibusItem for ReadItem {
    fn descriptor(&self) -> &ItemDescriptor {
        &self.desc
    }

    fn descriptor_mut(&mut self) -> &mut ItemDescriptor {
        &mut self.desc
    }

    fn priority(&self) -> Priority {
        self.priority
    }
}

impl Decodable for ReadItem {
    fn process_response_byte(&mut self, byte: u8, ctx: &mut dyn PumpContext) {
        if !self.desc.information_available() {
            return;
        }
        self.buffer[self.cursor] = byte;
        if self.cursor < self.desc.byte_width() - 1 {
            self.cursor += 1;
            return;
        }
        self.cursor = 0;
        self.decode(ctx);
    }
}

/// The warning raised when family-aware unit conversion is unavailable and
/// the value degrades to the legacy single-factor fallback.
pub(crate) fn conversion_warning(
    desc: &ItemDescriptor,
    channel: &Channel<f64>,
    writing: bool,
) -> String {
    let factor = desc.unit_factor() * channel.multiplier();
    let direction = if writing { "written with" } else { "scaled by" };
    match (desc.unit_label(), channel.unit()) {
        (None, _) => format!(
            "data item {} of channel {} uses a unit (index {}) that is not in the unit table, \
             cannot apply correct scaling",
            desc.id(),
            channel.id(),
            desc.unit_index(),
        ),
        (Some(label), TargetUnit::None) => format!(
            "channel {} has no unit; device data has unit '{label}', {direction} fallback \
             factor {factor}",
            channel.id(),
        ),
        (Some(label), unit) => format!(
            "unit mismatch: channel {} has unit '{unit}', device data has unit '{label}', \
             {direction} fallback factor {factor}",
            channel.id(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RecordingContext;
    use crate::item::InfoHead;

    fn scaled_item(
        id: ItemId,
        width: usize,
        unit_byte: u8,
        zero: u8,
        scale_range: u8,
        channel_unit: TargetUnit,
    ) -> ReadItem {
        let channel = Channel::new("test", channel_unit);
        let mut item = ReadItem::new(id.head_class, id.address, width, channel, Priority::High);
        let head = InfoHead { vi: false, bo: false, sif: ScaleFormat::Scaled };
        item.descriptor_mut().set_four_byte_info(head, unit_byte, zero, scale_range);
        item
    }

    fn feed(item: &mut ReadItem, bytes: &[u8], ctx: &mut RecordingContext) {
        for byte in bytes {
            item.process_response_byte(*byte, ctx);
        }
    }

    #[test]
    fn scaled_16_bit_decode() {
        // zero = 0, range factor = 100, vi = false so range = 254. The first
        // received byte carries the smallest power of 256.
        let mut item = scaled_item(ItemId::new(2, 23), 2, 30, 0, 100, TargetUnit::Percent);
        let mut ctx = RecordingContext::default();
        feed(&mut item, &[0x00, 0xFF], &mut ctx);
        let expected = 255.0 * (100.0 / 254.0) * 256.0;
        assert!((*item.channel().value().unwrap() - expected).abs() < 1e-9);
        assert!(ctx.warnings.is_empty());
    }

    #[test]
    fn scaled_decode_applies_unit_conversion() {
        // Unit 20 is "Celsius/10"; a deci-degree channel receives the raw
        // tenths unchanged, a degree channel a tenth of them.
        let mut item = scaled_item(ItemId::new(2, 23), 1, 20, 0, 254, TargetUnit::DegreeCelsius);
        let mut ctx = RecordingContext::default();
        feed(&mut item, &[235], &mut ctx);
        assert!((*item.channel().value().unwrap() - 23.5).abs() < 1e-9);
    }

    #[test]
    fn extended_8_bit_decode() {
        let channel = Channel::new("test", TargetUnit::Percent);
        let mut item = ReadItem::new(2, 24, 1, channel, Priority::Low);
        let head = InfoHead { vi: false, bo: false, sif: ScaleFormat::Extended };
        item.descriptor_mut().set_four_byte_info(head, 30, 0, 100);
        let mut ctx = RecordingContext::default();
        feed(&mut item, &[5], &mut ctx);
        // 256^0 * (256 * 0 + 100) + 5 = 105.
        assert_eq!(item.channel().value(), Some(&105.0));
    }

    #[test]
    fn extended_24_bit_decode_shifts_the_zero_constant() {
        let channel = Channel::new("test", TargetUnit::Percent);
        let mut item = ReadItem::new(2, 24, 3, channel, Priority::Low);
        let head = InfoHead { vi: false, bo: false, sif: ScaleFormat::Extended };
        item.descriptor_mut().set_four_byte_info(head, 30, 0, 1);
        let mut ctx = RecordingContext::default();
        feed(&mut item, &[0x01, 0x00, 0x02], &mut ctx);
        // 256^1 * 1 + (0x010002 as hi-to-lo) = 256 + 65538.
        assert_eq!(item.channel().value(), Some(&(256.0 + 65538.0)));
    }

    #[test]
    fn sentinel_byte_yields_unavailable_for_every_sif() {
        for sif in [
            ScaleFormat::None,
            ScaleFormat::Bitwise,
            ScaleFormat::Scaled,
            ScaleFormat::Extended,
        ] {
            let channel = Channel::new("test", TargetUnit::Percent);
            let mut item = ReadItem::new(2, 23, 2, channel, Priority::High);
            item.descriptor_mut().set_four_byte_info(
                InfoHead { vi: false, bo: false, sif },
                30,
                0,
                100,
            );
            item.channel_mut().set_next_value(Some(1.0));
            let mut ctx = RecordingContext::default();
            feed(&mut item, &[0xFF, 0x00], &mut ctx);
            assert_eq!(item.channel().value(), None, "sif {sif:?}");
        }
    }

    #[test]
    fn sentinel_is_a_legal_value_when_vi_is_set() {
        let channel = Channel::new("test", TargetUnit::Percent);
        let mut item = ReadItem::new(2, 23, 1, channel, Priority::High);
        item.descriptor_mut().set_one_byte_info(InfoHead {
            vi: true,
            bo: false,
            sif: ScaleFormat::Bitwise,
        });
        let mut ctx = RecordingContext::default();
        feed(&mut item, &[0xFF], &mut ctx);
        assert_eq!(item.channel().value(), Some(&255.0));
    }

    #[test]
    fn bitwise_multi_byte_is_plain_big_endian() {
        let channel = Channel::with_multiplier("test", TargetUnit::None, 2.0);
        let mut item = ReadItem::new(2, 23, 2, channel, Priority::High);
        item.descriptor_mut().set_one_byte_info(InfoHead {
            vi: false,
            bo: false,
            sif: ScaleFormat::Bitwise,
        });
        let mut ctx = RecordingContext::default();
        feed(&mut item, &[0x01, 0x02], &mut ctx);
        // No unit conversion on the bitwise path, only the multiplier.
        assert_eq!(item.channel().value(), Some(&516.0));
        assert!(ctx.warnings.is_empty());
    }

    #[test]
    fn value_updates_only_after_all_bytes_arrived() {
        let mut item = scaled_item(ItemId::new(2, 23), 2, 30, 0, 100, TargetUnit::Percent);
        let mut ctx = RecordingContext::default();
        item.process_response_byte(0x00, &mut ctx);
        assert_eq!(item.channel().value(), None);
        item.process_response_byte(0x10, &mut ctx);
        assert!(item.channel().value().is_some());
    }

    #[test]
    fn bytes_are_ignored_without_info() {
        let channel = Channel::new("test", TargetUnit::Percent);
        let mut item = ReadItem::new(2, 23, 1, channel, Priority::High);
        let mut ctx = RecordingContext::default();
        feed(&mut item, &[0x12], &mut ctx);
        assert_eq!(item.channel().value(), None);
    }

    #[test]
    fn incompatible_unit_degrades_to_fallback_with_warning() {
        // Unit 20 is "Celsius/10" but the channel wants bar.
        let mut item = scaled_item(ItemId::new(2, 23), 1, 20, 0, 254, TargetUnit::Bar);
        let mut ctx = RecordingContext::default();
        feed(&mut item, &[100], &mut ctx);
        assert!((*item.channel().value().unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(ctx.warnings.len(), 1);
        assert!(ctx.warnings[0].contains("unit mismatch"), "{}", ctx.warnings[0]);
    }

    #[test]
    fn unknown_unit_index_degrades_to_factor_one() {
        // Unit index 2 is not in the table; legacy multiplier is 1.0.
        let mut item = scaled_item(ItemId::new(2, 23), 1, 2, 0, 254, TargetUnit::Bar);
        let mut ctx = RecordingContext::default();
        feed(&mut item, &[100], &mut ctx);
        assert_eq!(item.channel().value(), Some(&100.0));
        assert_eq!(ctx.warnings.len(), 1);
        assert!(ctx.warnings[0].contains("not in the unit table"), "{}", ctx.warnings[0]);
    }

    #[test]
    fn ref_norm_info_is_refreshed_every_fifth_decode() {
        let mut item = scaled_item(REF_NORM, 1, 30, 0, 100, TargetUnit::Percent);
        let mut ctx = RecordingContext::default();
        for _ in 0..4 {
            feed(&mut item, &[10], &mut ctx);
            assert!(item.descriptor().information_available());
        }
        feed(&mut item, &[10], &mut ctx);
        assert!(!item.descriptor().information_available());
    }

    #[test]
    fn pressure_sensor_item_reports_calibration() {
        // Unit 29 is bar with factor 1.0: zero and range pass through.
        let mut item = scaled_item(PRESSURE_SENSOR, 1, 29, 2, 12, TargetUnit::Bar);
        let mut ctx = RecordingContext::default();
        feed(&mut item, &[0], &mut ctx);
        assert_eq!(ctx.pressure_sensor_min_bar, Some(2.0));
        assert_eq!(ctx.pressure_sensor_range_bar, Some(12.0));
    }

    #[test]
    fn pressure_sensor_calibration_converts_to_bar() {
        // Unit 24 is "m/10" with factor 0.01 towards bar.
        let mut item = scaled_item(PRESSURE_SENSOR, 1, 24, 50, 200, TargetUnit::Bar);
        let mut ctx = RecordingContext::default();
        feed(&mut item, &[0], &mut ctx);
        assert!((ctx.pressure_sensor_min_bar.unwrap() - 0.5).abs() < 1e-9);
        assert!((ctx.pressure_sensor_range_bar.unwrap() - 2.0).abs() < 1e-9);
    }
}
