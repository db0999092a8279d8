//! APDU identity bookkeeping.
//!
//! A telegram is composed of APDUs, each addressed to one head class and
//! requesting one operation. The bus worker tells its APDUs apart with a
//! three digit decimal identifier: the 100 digit is the head class, the 10
//! digit the operation, the 1 digit a counter starting at 0. Example: 230 is
//! head class 2, INFO, first APDU of this type. The counter exists because an
//! APDU (request and answer) is limited to 63 bytes, so several APDUs of the
//! same type may be needed to fit all items.

use num_traits::FromPrimitive as _;

/// Data byte capacity of a single APDU.
pub const APDU_DATA_CAPACITY: usize = 63;

/// The operation an APDU requests on its data items.
#[derive(Clone, Copy, PartialEq, Eq, Debug, num_derive::FromPrimitive, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Operation {
    Get = 0,
    Set = 2,
    Info = 3,
}

pub fn identifier(head_class: u32, operation: Operation, sequence: u8) -> u16 {
    head_class as u16 * 100 + operation as u16 * 10 + u16::from(sequence)
}

pub fn head_class(identifier: u16) -> u32 {
    u32::from(identifier / 100)
}

pub fn operation(identifier: u16) -> Option<Operation> {
    Operation::from_u16(identifier / 10 % 10)
}

pub fn sequence(identifier: u16) -> u8 {
    (identifier % 10) as u8
}
