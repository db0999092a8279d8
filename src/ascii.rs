//! Character string items (head class 7).
//!
//! ASCII items such as the product or serial number reply with a null
//! terminated byte stream. Bytes are accumulated until a `0x00` arrives,
//! at which point the collected string is put in the channel.

use crate::channel::{Channel, PumpContext};
use crate::item::{
    Decodable, GenibusItem, ItemDescriptor, Priority, HEAD_CLASS_CHARACTER_STRINGS,
};

pub struct AsciiItem {
    desc: ItemDescriptor,
    channel: Channel<String>,
    priority: Priority,
    buffer: Vec<u8>,
}

impl AsciiItem {
    pub fn new(address: u8, channel: Channel<String>, priority: Priority) -> Self {
        Self {
            desc: ItemDescriptor::new(HEAD_CLASS_CHARACTER_STRINGS, address, 1),
            channel,
            priority,
            buffer: Vec::new(),
        }
    }

    pub fn channel(&self) -> &Channel<String> {
        &self.channel
    }
}

impl GenibusItem for AsciiItem {
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

impl Decodable for AsciiItem {
    fn process_response_byte(&mut self, byte: u8, _ctx: &mut dyn PumpContext) {
        if byte != 0x00 {
            self.buffer.push(byte);
            return;
        }
        let text = String::from_utf8_lossy(&self.buffer).into_owned();
        self.channel.set_next_value(Some(text));
        // Clear every accumulated byte. Leaving any behind would prepend the
        // tail of this string to the next one.
        self.buffer.clear();
    }
}
