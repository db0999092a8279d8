//! Offline diagnostic subcommands. None of these talk to a bus; they operate
//! on the static unit table and on bytes captured elsewhere.

pub(crate) fn parse_hex_byte(input: &str) -> Result<u8, std::num::ParseIntError> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    u8::from_str_radix(digits, 16)
}

pub mod units {
    use crate::output;
    use crate::units::{Quantity, UnitIndex, CODES};

    /// Search and output the known GENIbus device unit codes.
    #[derive(clap::Parser)]
    pub struct Args {
        #[clap(flatten)]
        output: output::Args,
        /// Show only units whose label, quantity or code contains this
        /// pattern.
        filter: Option<String>,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not produce output")]
        Output(#[from] output::Error),
    }

    #[derive(serde::Serialize)]
    pub struct UnitSchema {
        pub code: u8,
        pub quantity: Quantity,
        pub factor: f64,
        pub label: &'static str,
    }

    impl UnitSchema {
        pub fn all_units() -> impl Iterator<Item = Self> {
            CODES.iter().map(|&code| {
                let unit = UnitIndex::from_code(code).expect("CODES only contains known codes");
                UnitSchema {
                    code,
                    quantity: unit.quantity(),
                    factor: unit.factor(),
                    label: unit.label(),
                }
            })
        }

        pub fn is_match(&self, pattern: &str) -> bool {
            let pattern = pattern.to_lowercase();
            if self.label.to_lowercase().contains(&pattern) {
                return true;
            }
            if self.quantity.to_string().contains(&pattern) {
                return true;
            }
            return self.code.to_string().contains(&pattern);
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let mut output = args.output.to_output()?;
        output.headers(&["Code", "Quantity", "Factor", "Label"])?;
        for unit in UnitSchema::all_units() {
            if let Some(pattern) = &args.filter {
                if !unit.is_match(pattern) {
                    continue;
                }
            }
            output.record(
                vec![
                    unit.code.to_string(),
                    unit.quantity.to_string(),
                    unit.factor.to_string(),
                    unit.label.to_string(),
                ],
                &unit,
            )?;
        }
        output.finish()?;
        Ok(())
    }

}

pub mod info {
    use crate::item::{InfoHead, ItemDescriptor};

    /// Parse a captured INFO reply block and describe the item encoding.
    #[derive(clap::Parser)]
    pub struct Args {
        /// Head class of the data item.
        #[arg(long, default_value_t = 2)]
        head_class: u32,
        /// Address of the data item.
        #[arg(long, short = 'a')]
        address: u8,
        /// Number of data bytes of the item.
        #[arg(long, short = 'w', default_value_t = 1)]
        width: usize,
        /// The INFO reply bytes as hex. One byte for items without scale
        /// information, four bytes for scaled and extended precision items.
        #[arg(required = true)]
        bytes: Vec<String>,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not parse {1:?} as a hex byte")]
        ParseByte(#[source] std::num::ParseIntError, String),
        #[error("data items are 1 to 4 bytes wide, not {0}")]
        Width(usize),
        #[error("expected {0} INFO bytes for this scale format, got {1}")]
        BlockLength(usize, usize),
    }

    pub(super) fn apply_info(desc: &mut ItemDescriptor, bytes: &[String]) -> Result<(), Error> {
        let bytes = bytes
            .iter()
            .map(|input| {
                super::parse_hex_byte(input).map_err(|e| Error::ParseByte(e, input.clone()))
            })
            .collect::<Result<Vec<u8>, Error>>()?;
        let head = InfoHead::parse(bytes[0]);
        match (head.has_scale_info(), &bytes[1..]) {
            (false, []) => desc.set_one_byte_info(head),
            (true, [unit_byte, scale_a, scale_b]) => {
                desc.set_four_byte_info(head, *unit_byte, *scale_a, *scale_b);
            }
            (false, rest) => return Err(Error::BlockLength(1, 1 + rest.len())),
            (true, rest) => return Err(Error::BlockLength(4, 1 + rest.len())),
        }
        Ok(())
    }

    pub fn run(args: Args) -> Result<(), Error> {
        if !matches!(args.width, 1..=4) {
            return Err(Error::Width(args.width));
        }
        let mut desc = ItemDescriptor::new(args.head_class, args.address, args.width);
        apply_info(&mut desc, &args.bytes)?;
        println!("{}", desc.describe());
        Ok(())
    }

}

pub mod decode {
    use crate::channel::{Channel, RecordingContext};
    use crate::item::{Decodable as _, GenibusItem as _, Priority};
    use crate::read::ReadItem;
    use crate::units::TargetUnit;

    /// Run captured GET data bytes through the decoder and print the values.
    #[derive(clap::Parser)]
    pub struct Args {
        /// Head class of the data item.
        #[arg(long, default_value_t = 2)]
        head_class: u32,
        /// Address of the data item.
        #[arg(long, short = 'a')]
        address: u8,
        /// Number of data bytes of the item.
        #[arg(long, short = 'w', default_value_t = 1)]
        width: usize,
        /// The INFO reply bytes of the item as hex, comma separated (one or
        /// four bytes).
        #[arg(long, short = 'i', value_delimiter = ',', required = true)]
        info: Vec<String>,
        /// Unit the decoded value should be expressed in.
        #[arg(long, short = 'u', value_enum, default_value_t = TargetUnit::None)]
        unit: TargetUnit,
        /// Additional multiplier applied to the decoded value.
        #[arg(long, short = 'm', default_value_t = 1.0)]
        multiplier: f64,
        /// The data bytes as hex, hi to lo, a multiple of the item width.
        #[arg(required = true)]
        data: Vec<String>,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not parse {1:?} as a hex byte")]
        ParseByte(#[source] std::num::ParseIntError, String),
        #[error("data items are 1 to 4 bytes wide, not {0}")]
        Width(usize),
        #[error("could not apply the INFO block")]
        Info(#[from] super::info::Error),
        #[error("got {0} data bytes, expected a multiple of the item width {1}")]
        DataLength(usize, usize),
    }

    pub fn run(args: Args) -> Result<(), Error> {
        if !matches!(args.width, 1..=4) {
            return Err(Error::Width(args.width));
        }
        let channel = Channel::with_multiplier("decode", args.unit, args.multiplier);
        let mut item =
            ReadItem::new(args.head_class, args.address, args.width, channel, Priority::Once);
        super::info::apply_info(item.descriptor_mut(), &args.info)?;
        let data = args
            .data
            .iter()
            .map(|input| {
                super::parse_hex_byte(input).map_err(|e| Error::ParseByte(e, input.clone()))
            })
            .collect::<Result<Vec<u8>, Error>>()?;
        if data.len() % args.width != 0 {
            return Err(Error::DataLength(data.len(), args.width));
        }
        let mut ctx = RecordingContext::default();
        for chunk in data.chunks(args.width) {
            for byte in chunk {
                item.process_response_byte(*byte, &mut ctx);
            }
            match item.channel().value() {
                Some(value) => println!("{value}"),
                None => println!("unavailable"),
            }
        }
        for warning in &ctx.warnings {
            eprintln!("warning: {warning}");
        }
        Ok(())
    }
}
