//! Data-item identity and INFO metadata.
//!
//! A GENIbus data item is identified by two numbers, `(head_class, address)`.
//! Example: ref_rem is (5, 1). Before GET or SET data of an item can be
//! interpreted, the INFO block of the item has to be fetched from the device;
//! its contents determine the numeric encoding of the data bytes.

use crate::channel::PumpContext;
use crate::units;
use num_traits::FromPrimitive as _;

pub const HEAD_CLASS_MEASURED_DATA: u32 = 2;
pub const HEAD_CLASS_COMMANDS: u32 = 3;
pub const HEAD_CLASS_CONFIGURATION: u32 = 4;
pub const HEAD_CLASS_REFERENCE_VALUES: u32 = 5;
pub const HEAD_CLASS_CHARACTER_STRINGS: u32 = 7;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ItemId {
    pub head_class: u32,
    pub address: u8,
}

impl ItemId {
    pub const fn new(head_class: u32, address: u8) -> Self {
        Self { head_class, address }
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.head_class, self.address)
    }
}

/// Scheduling priority of an item, consumed by the external bus worker.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Priority {
    High,
    Low,
    Once,
}

/// Scale information format. Selects the numeric encoding of the data bytes.
///
/// The variant set is fixed by the protocol specification; the two bits
/// reserved for it in the INFO head byte cannot express anything else.
#[derive(Clone, Copy, PartialEq, Eq, Debug, num_derive::FromPrimitive)]
pub enum ScaleFormat {
    /// Scale information not available.
    None = 0,
    /// Bit wise interpreted value.
    Bitwise = 1,
    /// Scaled 8/16 bit value with zero and range factors.
    Scaled = 2,
    /// Extended precision, scaled 8/16/24/32 bit value with a hi/lo zero.
    Extended = 3,
}

/// The head byte of an INFO reply: bit 5 = vi, bit 4 = bo, bits 0-1 = sif.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct InfoHead {
    /// Value interpretation. false: only 0-254 are legal values and 255
    /// means "data not available". true: all of 0-255 are legal.
    pub vi: bool,
    /// Byte order. false: high order byte, the default for 8 bit values.
    /// true: low order byte of a 16/24/32 bit value.
    pub bo: bool,
    pub sif: ScaleFormat,
}

impl InfoHead {
    pub fn parse(byte: u8) -> InfoHead {
        InfoHead {
            vi: byte & 0x20 != 0,
            bo: byte & 0x10 != 0,
            sif: ScaleFormat::from_u8(byte & 0x03).expect("two bits cover all sif variants"),
        }
    }

    /// Scaled and extended items reply with a four byte INFO block carrying
    /// unit and scale factors; the other formats reply with the head byte
    /// alone.
    pub fn has_scale_info(&self) -> bool {
        matches!(self.sif, ScaleFormat::Scaled | ScaleFormat::Extended)
    }
}

/// Scale factors from a four byte INFO block.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ScaleFactors {
    #[default]
    Unavailable,
    /// Zero and range of the scaled format.
    Linear { zero: u8, range: u8 },
    /// Hi and lo order byte of the extended precision zero constant.
    Wide { zero_hi: u8, zero_lo: u8 },
}

/// Identity and decoded INFO metadata of one data item.
///
/// Identity is fixed at construction. The metadata fields are populated when
/// an INFO response arrives and are discarded with [`ItemDescriptor::reset_info`]
/// when the owning protocol layer decides they may be stale (for example
/// after a device control mode change).
#[derive(Debug, Clone)]
pub struct ItemDescriptor {
    id: ItemId,
    byte_width: usize,
    vi: bool,
    bo: bool,
    sif: ScaleFormat,
    unit_index: u8,
    sign: bool,
    unit_factor: f64,
    scale_factors: ScaleFactors,
    info_available: bool,
    apdu_identifier: u16,
}

impl ItemDescriptor {
    pub fn new(head_class: u32, address: u8, byte_width: usize) -> Self {
        assert!(matches!(byte_width, 1..=4), "items are 1 to 4 bytes wide");
        Self {
            id: ItemId::new(head_class, address),
            byte_width,
            vi: false,
            bo: false,
            sif: ScaleFormat::None,
            unit_index: 0,
            sign: false,
            unit_factor: 1.0,
            scale_factors: ScaleFactors::default(),
            info_available: false,
            apdu_identifier: 0,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn byte_width(&self) -> usize {
        self.byte_width
    }

    pub fn vi(&self) -> bool {
        self.vi
    }

    pub fn bo(&self) -> bool {
        self.bo
    }

    pub fn sif(&self) -> ScaleFormat {
        self.sif
    }

    pub fn unit_index(&self) -> u8 {
        self.unit_index
    }

    pub fn sign(&self) -> bool {
        self.sign
    }

    /// The legacy per-unit multiplier captured at INFO time. `1.0` unless a
    /// known unit index arrived through a four byte INFO block.
    pub fn unit_factor(&self) -> f64 {
        self.unit_factor
    }

    pub fn scale_factors(&self) -> ScaleFactors {
        self.scale_factors
    }

    pub fn unit_label(&self) -> Option<&'static str> {
        units::label(self.unit_index)
    }

    /// Store the contents of a one byte INFO reply.
    pub fn set_one_byte_info(&mut self, head: InfoHead) {
        self.vi = head.vi;
        self.bo = head.bo;
        self.sif = head.sif;
        self.info_available = true;
    }

    /// Store the contents of a four byte INFO reply.
    ///
    /// `unit_byte` carries the unit index in bits 0-6 and the scale factor
    /// sign in bit 7. For the extended format `(scale_a, scale_b)` are the hi
    /// and lo order bytes of the zero constant, otherwise they are the zero
    /// and range factors.
    pub fn set_four_byte_info(&mut self, head: InfoHead, unit_byte: u8, scale_a: u8, scale_b: u8) {
        self.set_one_byte_info(head);
        self.unit_index = unit_byte & 0x7F;
        self.sign = unit_byte & 0x80 != 0;
        self.scale_factors = match head.sif {
            ScaleFormat::Extended => ScaleFactors::Wide { zero_hi: scale_a, zero_lo: scale_b },
            _ => ScaleFactors::Linear { zero: scale_a, range: scale_b },
        };
        if self.unit_index > 0 {
            let factor = units::legacy_multiplier(self.unit_index);
            self.unit_factor = if self.sign { -factor } else { factor };
        }
    }

    /// Discard the cached INFO, causing the external worker to request INFO
    /// again for this item.
    pub fn reset_info(&mut self) {
        self.info_available = false;
    }

    pub fn information_available(&self) -> bool {
        self.info_available
    }

    pub fn set_apdu_identifier(&mut self, identifier: u16) {
        self.apdu_identifier = identifier;
    }

    pub fn apdu_identifier(&self) -> u16 {
        self.apdu_identifier
    }

    /// Diagnostic rendering of the parsed INFO contents for logs.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for ItemDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "item {} - ", self.id)?;
        if self.id.head_class == HEAD_CLASS_CHARACTER_STRINGS {
            return f.write_str("ASCII");
        }
        if !self.info_available {
            return f.write_str("no INFO yet");
        }
        let unit = self.unit_label().unwrap_or("not yet supported");
        write!(f, "unit: {}, format: {} bit ", unit, self.byte_width * 8)?;
        match (self.sif, self.scale_factors) {
            (ScaleFormat::Bitwise, _) => f.write_str("bit wise interpreted value"),
            (ScaleFormat::Scaled, ScaleFactors::Linear { zero, range }) => {
                write!(f, "scaled value, min: {zero}, range: {range}")
            }
            (ScaleFormat::Extended, ScaleFactors::Wide { zero_hi, zero_lo }) => {
                let exponent = self.byte_width.saturating_sub(2) as i32;
                let min = 256f64.powi(exponent)
                    * f64::from(256 * u16::from(zero_hi) + u16::from(zero_lo));
                write!(f, "extended precision, min: {min}")
            }
            _ => f.write_str("no scale info available"),
        }
    }
}

/// Accessors every item kind exposes to the external bus worker.
pub trait GenibusItem {
    fn descriptor(&self) -> &ItemDescriptor;
    fn descriptor_mut(&mut self) -> &mut ItemDescriptor;
    fn priority(&self) -> Priority;
}

/// Items that consume GET response bytes, one call per received byte in the
/// order hi to lo.
pub trait Decodable {
    fn process_response_byte(&mut self, byte: u8, ctx: &mut dyn PumpContext);
}

/// Items that can produce SET data.
pub trait Encodable {
    /// Whether a SET is currently available for this item.
    fn is_write_available(&self) -> bool;

    /// The SET byte at `index` (0 is hi), or `None` when no write is
    /// available, metadata is missing or the index is out of range. Does not
    /// consume the pending write; the caller clears it with
    /// [`Encodable::consume_next_write`] once all bytes have been collected.
    fn byte_at(&self, index: usize, ctx: &mut dyn PumpContext) -> Option<u8>;

    /// Clear the pending write so the SET is executed just once.
    fn consume_next_write(&mut self);
}
