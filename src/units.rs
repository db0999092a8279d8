//! The standard GENIbus unit table for Grundfos pumps.
//!
//! Values on the wire are expressed in one of roughly forty device units,
//! identified by a unit index transmitted in the INFO reply of a data item.
//! Each unit belongs to a physical-quantity family and carries a multiplier
//! towards the family base unit (bar for pressure, °C for temperature, W for
//! power and so on). The water-head unit "m" is a pressure unit, m = bar/10.

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Quantity {
    Celsius,
    Kelvin,
    Fahrenheit,
    /// Temperature difference, as opposed to the absolute [`Quantity::Kelvin`].
    KelvinDiff,
    Pressure,
    Current,
    Frequency,
    Power,
    Percentage,
    Flow,
}

/// A unit of the supervisory system, declared per channel.
///
/// Each target unit has a base family and a decimal exponent relative to the
/// family base. Conversion routines scale their result by
/// `10^-decimal_exponent`, so a deci-°C channel receives `235` for 23.5 °C.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Debug,
    serde::Serialize,
    strum::Display,
    strum::EnumString,
    clap::ValueEnum,
)]
#[strum(serialize_all = "kebab-case")]
pub enum TargetUnit {
    None,
    DegreeCelsius,
    DeciDegreeCelsius,
    /// Reserved for temperature differences; absolute device Kelvin converts
    /// towards Celsius targets only.
    Kelvin,
    Bar,
    Millibar,
    Pascal,
    Ampere,
    Milliampere,
    Hertz,
    Watt,
    Kilowatt,
    Percent,
    CubicMeterPerHour,
    CubicMeterPerSecond,
    LiterPerMinute,
}

impl TargetUnit {
    pub fn base(&self) -> TargetUnit {
        match self {
            Self::DeciDegreeCelsius => Self::DegreeCelsius,
            Self::Millibar => Self::Bar,
            Self::Milliampere => Self::Ampere,
            Self::Kilowatt => Self::Watt,
            other => *other,
        }
    }

    pub fn decimal_exponent(&self) -> i32 {
        match self {
            Self::DeciDegreeCelsius => -1,
            Self::Millibar | Self::Milliampere => -3,
            Self::Kilowatt => 3,
            _ => 0,
        }
    }
}

macro_rules! for_each_unit {
    ($m:ident) => {
        $m! {
            1: Current, 0.1, "Ampere*0.1";
            7: Power, 1.0, "Watt";
            8: Power, 10.0, "Watt*10";
            9: Power, 100.0, "Watt*100";
            11: Frequency, 1.0, "0.5*Hz";
            12: Percentage, 0.1, "0.1%";
            16: Frequency, 1.0, "Hz";
            17: Frequency, 2.5, "2.5*Hz";
            20: Celsius, 0.1, "Celsius/10";
            21: Celsius, 1.0, "Celsius";
            22: Flow, 0.1, "0.1*m³/h";
            23: Flow, 1.0, "m³/h";
            24: Pressure, 0.01, "m/10";
            25: Pressure, 0.1, "m";
            26: Pressure, 1.0, "m*10";
            27: Pressure, 0.01, "bar/100";
            28: Pressure, 0.1, "bar/10";
            29: Pressure, 1.0, "bar";
            30: Percentage, 1.0, "1%";
            38: Frequency, 2.0, "2*Hz";
            41: Flow, 5.0, "5*m³/h";
            44: Power, 1000.0, "kW";
            45: Power, 10000.0, "kW*10";
            51: Pressure, 0.001, "bar/1000";
            55: Pressure, 0.06895, "psi";
            57: Fahrenheit, 1.0, "Fahrenheit";
            60: Pressure, 0.6895, "psi*10";
            61: Pressure, 0.01, "kPa";
            76: Percentage, 10.0, "10%";
            83: Pressure, 0.001, "m/100";
            84: Kelvin, 0.01, "Kelvin/100";
            91: Pressure, 0.000001, "m/10000";
            92: Flow, 10.0, "10*m³/h";
            105: Frequency, 0.01, "0.01*Hz";
            107: Percentage, 0.01, "0.01%";
            110: KelvinDiff, 0.01, "diff-Kelvin/100";
            111: KelvinDiff, 1.0, "diff-Kelvin";
            113: Percentage, 0.000001, "ppm";
        }
    };
}

macro_rules! make_lists {
    ($($code: literal: $quantity: ident, $factor: literal, $label: literal;)+) => {
        pub static CODES: &[u8] = &[$($code),*];
        pub static QUANTITIES: &[Quantity] = &[$(Quantity::$quantity),*];
        pub static FACTORS: &[f64] = &[$($factor),*];
        pub static LABELS: &[&str] = &[$($label),*];
    };
}

for_each_unit!(make_lists);

const _: () = {
    let mut index = 1;
    while index < CODES.len() {
        if CODES[index - 1] >= CODES[index] {
            panic!("CODES is not sorted (or has duplicate values)!");
        }
        index += 1;
    }
};

#[derive(Clone, Copy)]
pub struct UnitIndex(usize);

impl UnitIndex {
    pub fn from_code(code: u8) -> Option<UnitIndex> {
        let index = CODES.partition_point(|v| *v < code);
        (index < CODES.len() && CODES[index] == code).then_some(Self(index))
    }

    pub fn code(&self) -> u8 {
        CODES[self.0]
    }

    pub fn quantity(&self) -> Quantity {
        QUANTITIES[self.0]
    }

    pub fn factor(&self) -> f64 {
        FACTORS[self.0]
    }

    pub fn label(&self) -> &'static str {
        LABELS[self.0]
    }
}

/// The single-factor fallback applied when family-aware conversion is not
/// possible. Unknown codes get `1.0`.
pub fn legacy_multiplier(code: u8) -> f64 {
    UnitIndex::from_code(code).map_or(1.0, |unit| unit.factor())
}

/// The human-readable label of a device unit, if the code is known.
pub fn label(code: u8) -> Option<&'static str> {
    UnitIndex::from_code(code).map(|unit| unit.label())
}

/// Convert a raw device value into the given target unit.
///
/// Returns `None` when the unit code is unknown or its quantity family does
/// not match the family of the target unit. Device Kelvin is absolute
/// temperature and converts only towards Celsius targets; Kelvin targets are
/// served by the `diff-Kelvin*` device units.
pub fn device_to_target(raw: f64, unit_code: u8, target: TargetUnit) -> Option<f64> {
    let unit = UnitIndex::from_code(unit_code)?;
    let factor = unit.factor();
    let descale = 10f64.powi(-target.decimal_exponent());
    Some(match (target.base(), unit.quantity()) {
        (TargetUnit::DegreeCelsius, Quantity::Celsius) => factor * raw * descale,
        (TargetUnit::DegreeCelsius, Quantity::Kelvin) => (factor * raw - 273.15) * descale,
        (TargetUnit::DegreeCelsius, Quantity::Fahrenheit) => {
            (factor * raw - 32.0) * (5.0 / 9.0) * descale
        }
        (TargetUnit::Kelvin, Quantity::KelvinDiff) => factor * raw * descale,
        (TargetUnit::Bar, Quantity::Pressure) => factor * raw * descale,
        // The pressure family is normalised to bar, 1 bar = 10^5 Pa.
        (TargetUnit::Pascal, Quantity::Pressure) => factor * raw * descale * 1e5,
        (TargetUnit::Ampere, Quantity::Current) => factor * raw * descale,
        (TargetUnit::Hertz, Quantity::Frequency) => factor * raw * descale,
        (TargetUnit::Watt, Quantity::Power) => factor * raw * descale,
        (TargetUnit::Percent, Quantity::Percentage) => factor * raw * descale,
        (TargetUnit::CubicMeterPerHour, Quantity::Flow) => factor * raw * descale,
        (TargetUnit::CubicMeterPerSecond, Quantity::Flow) => factor * raw * descale / 3600.0,
        (TargetUnit::LiterPerMinute, Quantity::Flow) => {
            factor * raw * descale * (1000.0 / 60.0)
        }
        _ => return None,
    })
}

/// Convert a value in the given source unit into raw device units.
///
/// The exact algebraic inverse of [`device_to_target`].
pub fn target_to_device(value: f64, source: TargetUnit, unit_code: u8) -> Option<f64> {
    let unit = UnitIndex::from_code(unit_code)?;
    let factor = unit.factor();
    let scale = 10f64.powi(source.decimal_exponent());
    Some(match (source.base(), unit.quantity()) {
        (TargetUnit::DegreeCelsius, Quantity::Celsius) => value * scale / factor,
        (TargetUnit::DegreeCelsius, Quantity::Kelvin) => (value * scale + 273.15) / factor,
        (TargetUnit::DegreeCelsius, Quantity::Fahrenheit) => {
            (value * scale * (9.0 / 5.0) + 32.0) / factor
        }
        (TargetUnit::Kelvin, Quantity::KelvinDiff) => value * scale / factor,
        (TargetUnit::Bar, Quantity::Pressure) => value * scale / factor,
        (TargetUnit::Pascal, Quantity::Pressure) => value * scale * 1e-5 / factor,
        (TargetUnit::Ampere, Quantity::Current) => value * scale / factor,
        (TargetUnit::Hertz, Quantity::Frequency) => value * scale / factor,
        (TargetUnit::Watt, Quantity::Power) => value * scale / factor,
        (TargetUnit::Percent, Quantity::Percentage) => value * scale / factor,
        (TargetUnit::CubicMeterPerHour, Quantity::Flow) => value * scale / factor,
        (TargetUnit::CubicMeterPerSecond, Quantity::Flow) => value * scale * 3600.0 / factor,
        (TargetUnit::LiterPerMinute, Quantity::Flow) => {
            value * scale * (60.0 / 1000.0) / factor
        }
        _ => return None,
    })
}
