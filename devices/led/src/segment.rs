//! Segment digit displays on digital coolers.
//!
//! Most LED styles arrange part of their LEDs as seven segment numerals (thirteen for the
//! LF10 hundreds) next to unit and source indicators. A [`Layout`] turns a [`Readout`] into
//! an on/off mask in the logical index space the wire tables read from, and
//! [`DigitDisplay`] rotates through the layout's phases every [`PHASE_TICKS`] ticks.

use std::fmt;
use std::iter;
use std::str::FromStr;

use trcc_core::Rgb;

use crate::remap;

/// Ticks spent on one phase before rotating to the next
pub const PHASE_TICKS: u32 = 100;

/// LEDs on the HR10 2280 Pro board, in wire order
pub const HR10_LEDS: usize = 31;

const A: u16 = 1 << 0;
const B: u16 = 1 << 1;
const C: u16 = 1 << 2;
const D: u16 = 1 << 3;
const E: u16 = 1 << 4;
const F: u16 = 1 << 5;
const G: u16 = 1 << 6;
const H: u16 = 1 << 7;
const I: u16 = 1 << 8;
const J: u16 = 1 << 9;
const K: u16 = 1 << 10;
const L: u16 = 1 << 11;
const M: u16 = 1 << 12;

/// Segment order of a digit's LEDs on most boards
const ORDER_7: [u16; 7] = [A, B, C, D, E, F, G];
const ORDER_13: [u16; 13] = [A, B, C, D, E, F, G, H, I, J, K, L, M];
/// HR10 digits are wired c, d, e, g, b, a, f
const ORDER_HR10: [u16; 7] = [C, D, E, G, B, A, F];

fn glyph(ch: char) -> u16 {
    match ch {
        '0' => A | B | C | D | E | F,
        '1' => B | C,
        '2' => A | B | D | E | G,
        '3' => A | B | C | D | G,
        '4' => B | C | F | G,
        '5' | 'S' => A | C | D | F | G,
        '6' => A | C | D | E | F | G,
        '7' => A | B | C,
        '8' => A | B | C | D | E | F | G,
        '9' | 'G' => A | B | C | D | F | G,
        'C' => A | D | E | F,
        'F' => A | E | F | G,
        'H' => B | C | E | F | G,
        '-' => G,
        'A' => A | B | C | E | F | G,
        'b' => C | D | E | F | G,
        'L' => D | E | F,
        'P' => A | B | E | F | G,
        'E' => A | D | E | F | G,
        'r' => E | G,
        'n' => C | E | G,
        'o' => C | D | E | G,
        _ => 0,
    }
}

/// Thirteen segment hundreds digit of the LF10; zero is blank
fn glyph_13(digit: i32) -> u16 {
    match digit {
        1 => C | D | E | F | G,
        2 => A | B | C | D | E | G | H | I | J | K | M,
        3 => A | B | C | D | E | F | G | H | I | K | M,
        4 => A | C | D | E | F | G | K | L | M,
        5 => A | B | C | E | F | G | H | I | K | L | M,
        6 => A | B | C | E | F | G | H | I | J | K | L | M,
        7 => A | B | C | D | E | F | G,
        8 => A | B | C | D | E | F | G | H | I | J | K | L | M,
        9 => A | B | C | D | E | F | G | H | I | K | L | M,
        _ => 0,
    }
}

fn digit_char(digit: i32) -> char {
    char::from_digit(digit.unsigned_abs(), 10).unwrap_or(' ')
}

type Digit = [usize; 7];

/// Seven consecutive LEDs in a..g order
const fn digit(first: usize) -> Digit {
    [first, first + 1, first + 2, first + 3, first + 4, first + 5, first + 6]
}

fn light(mask: &mut [bool], segments: u16, leds: &[usize], order: &[u16]) {
    for (&led, &segment) in leds.iter().zip(order) {
        if segments & segment != 0 {
            mask[led] = true;
        }
    }
}

fn light_all(mask: &mut [bool], leds: impl IntoIterator<Item = usize>) {
    for led in leds {
        mask[led] = true;
    }
}

fn show(mask: &mut [bool], ch: char, leds: &Digit) {
    light(mask, glyph(ch), leds, &ORDER_7);
}

/// 0..=999 with leading zeros blanked
fn three_digits(mask: &mut [bool], value: i32, digits: [Digit; 3]) {
    let v = value.clamp(0, 999);
    let (hundreds, tens, ones) = (v / 100, v % 100 / 10, v % 10);
    let hundreds_ch = if hundreds == 0 { ' ' } else { digit_char(hundreds) };
    let tens_ch = if hundreds == 0 && tens == 0 { ' ' } else { digit_char(tens) };
    show(mask, hundreds_ch, &digits[0]);
    show(mask, tens_ch, &digits[1]);
    show(mask, digit_char(ones), &digits[2]);
}

/// Lit `partial` pair for 100, leaving 0..=99 for the two full digits
fn hundred_partial(mask: &mut [bool], value: i32, partial: (usize, usize)) -> i32 {
    let v = value.clamp(0, 199);
    if v >= 100 {
        mask[partial.0] = true;
        mask[partial.1] = true;
        v - 100
    } else {
        v
    }
}

fn two_digits(mask: &mut [bool], value: i32, digits: [Digit; 2]) {
    let v = value.clamp(0, 99);
    let tens = if v / 10 == 0 { ' ' } else { digit_char(v / 10) };
    show(mask, tens, &digits[0]);
    show(mask, digit_char(v % 10), &digits[1]);
}

/// Ones digit of which only the b and c segments exist
fn ones_bc(mask: &mut [bool], value: i32, bc: (usize, usize)) {
    let segments = glyph(digit_char(value % 10));
    mask[bc.0] |= segments & B != 0;
    mask[bc.1] |= segments & C != 0;
}

/// Thirteen LED digits from `first` on; tens and ones use their first seven LEDs
fn three_digits_13(mask: &mut [bool], value: i32, first: usize) {
    let v = value.clamp(0, 999);
    let (hundreds, tens, ones) = (v / 100, v % 100 / 10, v % 10);
    let leds: Vec<usize> = (first..first + 13).collect();
    light(mask, glyph_13(hundreds), &leds, &ORDER_13);
    if hundreds != 0 || tens != 0 {
        show(mask, digit_char(tens), &digit(first + 13));
    }
    show(mask, digit_char(ones), &digit(first + 26));
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TempUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TempUnit {
    pub const fn letter(&self) -> char {
        match self {
            Self::Celsius => 'C',
            Self::Fahrenheit => 'F',
        }
    }

    /// Whole degrees as the panel shows them
    pub fn display(&self, celsius: f32) -> i32 {
        let v = celsius as i32;
        match self {
            Self::Celsius => v,
            Self::Fahrenheit => (v * 9).div_euclid(5) + 32,
        }
    }
}

impl FromStr for TempUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "c" | "celsius" => Ok(Self::Celsius),
            "f" | "fahrenheit" => Ok(Self::Fahrenheit),
            _ => Err(format!("unknown temperature unit: {s}. Available: C, F")),
        }
    }
}

impl fmt::Display for TempUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A value a digit display can show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    CpuTemp,
    /// Percent
    CpuLoad,
    /// Watts
    CpuPower,
    /// MHz
    CpuClock,
    GpuTemp,
    GpuLoad,
    GpuPower,
    GpuClock,
    MemTemp,
    MemClock,
    /// GB
    MemUsed,
    DiskTemp,
    DiskLoad,
}

impl Sensor {
    pub const ALL: [Sensor; 13] = [
        Self::CpuTemp,
        Self::CpuLoad,
        Self::CpuPower,
        Self::CpuClock,
        Self::GpuTemp,
        Self::GpuLoad,
        Self::GpuPower,
        Self::GpuClock,
        Self::MemTemp,
        Self::MemClock,
        Self::MemUsed,
        Self::DiskTemp,
        Self::DiskLoad,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::CpuTemp => "cpu_temp",
            Self::CpuLoad => "cpu_load",
            Self::CpuPower => "cpu_power",
            Self::CpuClock => "cpu_clock",
            Self::GpuTemp => "gpu_temp",
            Self::GpuLoad => "gpu_load",
            Self::GpuPower => "gpu_power",
            Self::GpuClock => "gpu_clock",
            Self::MemTemp => "mem_temp",
            Self::MemClock => "mem_clock",
            Self::MemUsed => "mem_used",
            Self::DiskTemp => "disk_temp",
            Self::DiskLoad => "disk_load",
        }
    }

    pub const fn is_temperature(&self) -> bool {
        matches!(
            self,
            Self::CpuTemp | Self::GpuTemp | Self::MemTemp | Self::DiskTemp
        )
    }
}

impl FromStr for Sensor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_lowercase();
        match s.as_str() {
            "cpu_percent" => Ok(Self::CpuLoad),
            "gpu_usage" => Ok(Self::GpuLoad),
            _ => Self::ALL
                .into_iter()
                .find(|sensor| sensor.name() == s)
                .ok_or_else(|| format!("unknown sensor: {s}")),
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Latest value of every sensor, zero until set
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Metrics([f32; Sensor::ALL.len()]);

impl Metrics {
    pub fn get(&self, sensor: Sensor) -> f32 {
        self.0[sensor as usize]
    }

    pub fn set(&mut self, sensor: Sensor, value: f32) {
        self.0[sensor as usize] = value;
    }

    pub fn with(mut self, sensor: Sensor, value: f32) -> Self {
        self.set(sensor, value);
        self
    }
}

/// `sensor=value`, as given on the command line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub sensor: Sensor,
    pub value: f32,
}

impl FromStr for Reading {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sensor, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected SENSOR=VALUE, got {s}"))?;
        Ok(Self {
            sensor: sensor.trim().parse()?,
            value: value
                .trim()
                .parse()
                .map_err(|_| format!("invalid sensor value: {value}"))?,
        })
    }
}

/// Wall clock fields shown by the LC2
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Clock {
    /// 0..=23
    pub hour: u32,
    pub minute: u32,
    pub month: u32,
    pub day: u32,
}

/// Everything a layout may show
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readout {
    pub metrics: Metrics,
    pub clock: Clock,
    pub unit: TempUnit,
    pub clock_24h: bool,
}

impl Default for Readout {
    fn default() -> Self {
        Self {
            metrics: Metrics::default(),
            clock: Clock::default(),
            unit: TempUnit::Celsius,
            clock_24h: true,
        }
    }
}

impl Readout {
    /// Whole number shown for `sensor`, temperatures in the display unit
    pub fn value(&self, sensor: Sensor) -> i32 {
        let raw = self.metrics.get(sensor);
        if sensor.is_temperature() {
            self.unit.display(raw)
        } else {
            raw as i32
        }
    }
}

/// HR10 indicator LEDs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Indicators {
    pub mbs: bool,
    pub percent: bool,
    pub degree: bool,
}

/// Four right-aligned characters and the indicators, in HR10 wire order.
/// Longer text is cut to its first four characters.
pub fn hr10_wire_mask(text: &str, indicators: Indicators) -> [bool; HR10_LEDS] {
    const DIGITS: [[usize; 7]; 4] = [
        [2, 3, 4, 5, 6, 7, 9],
        [10, 11, 12, 13, 14, 15, 16],
        [17, 18, 19, 20, 21, 22, 23],
        [24, 25, 26, 27, 28, 29, 30],
    ];
    let mut mask = [false; HR10_LEDS];
    mask[0] = indicators.mbs;
    mask[1] = indicators.percent;
    mask[8] = indicators.degree;

    let chars: Vec<char> = text.chars().collect();
    let padded = iter::repeat(' ')
        .take(4usize.saturating_sub(chars.len()))
        .chain(chars)
        .take(4);
    for (pos, ch) in padded.enumerate() {
        light(&mut mask, glyph(ch), &DIGITS[3 - pos], &ORDER_HR10);
    }
    mask
}

/// Digit arrangement of one LED style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Style 1, one value at a time
    Ax120,
    /// Style 2, four values at once
    Pa120,
    /// Style 3, power, temperature and load of one source
    Ak120,
    /// Style 4, memory temperature, clock and usage with a unit digit
    Lc1,
    /// Styles 5 and 11
    Lf8,
    /// Style 6, the LF8 plus a decoration ring
    Lf12,
    /// Style 7, thirteen segment hundreds
    Lf10,
    /// Style 8, two digits
    Cz1,
    /// Style 9, time and date
    Lc2,
    /// Style 10
    Lf11,
    /// Style 13, NVMe heatsink
    Hr10,
}

impl Layout {
    pub const fn for_style(style_id: u8) -> Option<Self> {
        Some(match style_id {
            1 => Self::Ax120,
            2 => Self::Pa120,
            3 => Self::Ak120,
            4 => Self::Lc1,
            5 | 11 => Self::Lf8,
            6 => Self::Lf12,
            7 => Self::Lf10,
            8 => Self::Cz1,
            9 => Self::Lc2,
            10 => Self::Lf11,
            13 => Self::Hr10,
            _ => return None,
        })
    }

    /// Logical LEDs covered by a mask
    pub const fn mask_len(&self) -> usize {
        match self {
            Self::Ax120 => 30,
            Self::Pa120 => 84,
            Self::Ak120 => 69,
            Self::Lc1 | Self::Lf11 | Self::Hr10 => 38,
            Self::Lf8 => 93,
            Self::Lf12 => 124,
            Self::Lf10 => 116,
            Self::Cz1 => 18,
            Self::Lc2 => 61,
        }
    }

    pub const fn phase_count(&self) -> usize {
        match self {
            Self::Ax120 | Self::Cz1 | Self::Lf11 => 4,
            Self::Lc1 => 3,
            Self::Ak120 | Self::Lf8 | Self::Lf12 | Self::Hr10 => 2,
            Self::Pa120 | Self::Lf10 | Self::Lc2 => 1,
        }
    }

    /// Lit LEDs for `phase` (taken modulo the phase count)
    pub fn mask(&self, readout: &Readout, phase: usize) -> Vec<bool> {
        use Sensor::*;

        let phase = phase % self.phase_count();
        let celsius = readout.unit == TempUnit::Celsius;
        let mut mask = vec![false; self.mask_len()];
        let m = &mut mask;
        match self {
            Self::Ax120 => {
                const PHASES: [(Sensor, [usize; 2]); 4] = [
                    (CpuTemp, [2, 3]),
                    (CpuLoad, [2, 3]),
                    (GpuTemp, [4, 5]),
                    (GpuLoad, [4, 5]),
                ];
                let (sensor, source) = PHASES[phase];
                light_all(m, [0, 1]);
                light_all(m, source);
                m[match (sensor.is_temperature(), celsius) {
                    (true, true) => 6,
                    (true, false) => 7,
                    (false, _) => 8,
                }] = true;
                three_digits(m, readout.value(sensor), [digit(9), digit(16), digit(23)]);
            },
            Self::Pa120 => {
                light_all(m, [0, 1, 2, 3, 6, 9]);
                light_all(m, if celsius { [4, 7] } else { [5, 8] });
                three_digits(m, readout.value(CpuTemp), [digit(10), digit(17), digit(24)]);
                let load = hundred_partial(m, readout.value(CpuLoad), (46, 47));
                two_digits(m, load, [digit(31), digit(38)]);
                three_digits(m, readout.value(GpuTemp), [digit(52), digit(59), digit(66)]);
                let load = hundred_partial(m, readout.value(GpuLoad), (82, 83));
                if load >= 10 {
                    show(m, digit_char(load / 10), &digit(73));
                }
                ones_bc(m, load, (80, 81));
            },
            Self::Ak120 => {
                let (temp, load, power, source) = if phase == 0 {
                    (CpuTemp, CpuLoad, CpuPower, 0)
                } else {
                    (GpuTemp, GpuLoad, GpuPower, 5)
                };
                light_all(m, [1, 4, source, if celsius { 2 } else { 3 }]);
                three_digits(m, readout.value(power), [digit(6), digit(13), digit(20)]);
                three_digits(m, readout.value(temp), [digit(27), digit(34), digit(41)]);
                let load = hundred_partial(m, readout.value(load), (62, 63));
                two_digits(m, load, [digit(48), digit(55)]);
            },
            Self::Lc1 => {
                let (sensor, unit) = [
                    (MemTemp, readout.unit.letter()),
                    (MemClock, 'H'),
                    (MemUsed, 'G'),
                ][phase];
                m[phase] = true;
                three_digits(m, readout.value(sensor), [digit(3), digit(10), digit(17)]);
                show(m, unit, &digit(24));
            },
            Self::Lf8 | Self::Lf12 => {
                let (temp, power, clock, load, source) = if phase == 0 {
                    (CpuTemp, CpuPower, CpuClock, CpuLoad, 0)
                } else {
                    (GpuTemp, GpuPower, GpuClock, GpuLoad, 1)
                };
                light_all(m, [4, 5, 6, source, if celsius { 2 } else { 3 }]);
                three_digits(m, readout.value(temp), [digit(7), digit(14), digit(21)]);
                three_digits(m, readout.value(power), [digit(28), digit(35), digit(42)]);
                three_digits(m, readout.value(clock), [digit(49), digit(56), digit(63)]);
                let load = hundred_partial(m, readout.value(load), (91, 92));
                two_digits(m, load, [digit(70), digit(77)]);
                if *self == Self::Lf12 {
                    light_all(m, 93..124);
                }
            },
            Self::Lf10 => {
                light_all(m, [0, 3]);
                light_all(m, if celsius { [1, 4] } else { [2, 5] });
                three_digits_13(m, readout.value(CpuTemp), 6);
                three_digits_13(m, readout.value(GpuTemp), 45);
                light_all(m, 84..116);
            },
            Self::Cz1 => {
                const PHASES: [(Sensor, usize); 4] =
                    [(CpuTemp, 0), (CpuLoad, 2), (GpuTemp, 1), (GpuLoad, 3)];
                let (sensor, indicator) = PHASES[phase];
                m[indicator] = true;
                two_digits(m, readout.value(sensor), [digit(4), digit(11)]);
            },
            Self::Lc2 => {
                let Clock {
                    hour,
                    minute,
                    month,
                    day,
                } = readout.clock;
                let hour = match (readout.clock_24h, hour % 12) {
                    (true, _) => hour,
                    (false, 0) => 12,
                    (false, h) => h,
                };
                if readout.clock_24h || hour >= 10 {
                    show(m, digit_char(hour as i32 / 10), &digit(3));
                }
                let fields = [hour % 10, minute / 10, minute % 10, month / 10, month % 10, day / 10];
                for (value, first) in fields.into_iter().zip((10..).step_by(7)) {
                    show(m, digit_char(value as i32), &digit(first));
                }
                ones_bc(m, day as i32, (52, 53));
                light_all(m, 54..61);
            },
            Self::Lf11 => {
                const PHASES: [Sensor; 4] = [CpuTemp, CpuLoad, GpuTemp, GpuLoad];
                let sensor = PHASES[phase];
                let temperature = sensor.is_temperature();
                m[if temperature { 0 } else { 1 }] = true;
                three_digits(m, readout.value(sensor), [digit(3), digit(10), digit(17)]);
                if temperature {
                    show(m, readout.unit.letter(), &digit(24));
                }
            },
            Self::Hr10 => {
                let raw = if phase == 0 {
                    readout.metrics.get(DiskTemp)
                } else {
                    readout.metrics.get(DiskLoad)
                };
                let wire = if phase == 0 {
                    let value = if celsius { raw } else { raw * 9.0 / 5.0 + 32.0 };
                    let text = format!("{value:.0}{}", readout.unit.letter());
                    hr10_wire_mask(&text, Indicators { degree: true, ..Default::default() })
                } else {
                    let text = format!("{raw:.0}");
                    hr10_wire_mask(&text, Indicators { percent: true, ..Default::default() })
                };
                // Invert the board's wire table so the send path lands each LED in place
                let table = remap::table(13).unwrap_or_default();
                for (&lit, &logical) in wire.iter().zip(table) {
                    m[logical] = lit;
                }
            },
        }
        mask
    }
}

/// Phase rotation over one layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitDisplay {
    layout: Layout,
    phase: usize,
    ticks: u32,
}

impl DigitDisplay {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            phase: 0,
            ticks: 0,
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn phase(&self) -> usize {
        self.phase
    }

    /// Count one tick, rotating after [`PHASE_TICKS`], and return the current mask
    pub fn step(&mut self, readout: &Readout) -> Vec<bool> {
        self.ticks += 1;
        if self.ticks >= PHASE_TICKS {
            self.ticks = 0;
            self.phase = (self.phase + 1) % self.layout.phase_count();
        }
        self.layout.mask(readout, self.phase)
    }
}

/// `color` on lit LEDs, black elsewhere
pub fn apply(mask: &[bool], color: Rgb) -> Vec<Rgb> {
    mask.iter()
        .map(|&lit| if lit { color } else { [0, 0, 0] })
        .collect()
}
