//! LED effect engine.
//!
//! Every mode is a pure function of `(tick, base colour, metric)`; [`LedEngine`] only keeps
//! the per-zone tick counters and, when digits are shown, the segment display state. Ticks
//! are meant to run every [`TICK`].

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use trcc_core::{LedTopology, Rgb};

use crate::segment::{self, Clock, DigitDisplay, Layout, Readout, Sensor, TempUnit};

/// Nominal animation period
pub const TICK: Duration = Duration::from_millis(30);

pub const BREATHING_PERIOD: u32 = 66;
pub const COLORFUL_PERIOD: u32 = 168;
pub const COLORFUL_PHASE: u32 = 28;
pub const RAINBOW_LEN: u32 = 768;
pub const RAINBOW_STEP: u32 = 4;
/// Share of the base colour that stays lit at the bottom of a breath
const BREATHING_FLOOR: f64 = 0.2;
const BREATHING_AMPLITUDE: f64 = 0.8;

/// Swatches offered by the vendor software
pub const PRESET_COLORS: [Rgb; 8] = [
    [255, 0, 42],
    [255, 110, 0],
    [255, 255, 0],
    [0, 255, 0],
    [0, 255, 255],
    [0, 91, 255],
    [214, 0, 255],
    [255, 255, 255],
];

/// Temperature (°C) or load (%) band upper bounds and their colours; above the last is red
///
/// Bands are discrete steps. Vendor firmware tools blend linearly between them; that
/// gradient is intentionally not reproduced.
const BANDS: [(f32, Rgb); 4] = [
    (30.0, [0, 255, 255]),
    (50.0, [0, 255, 0]),
    (70.0, [255, 255, 0]),
    (90.0, [255, 110, 0]),
];
const BAND_HIGH: Rgb = [255, 0, 0];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    #[default]
    Static,
    Breathing,
    /// Whole-device hue sweep
    Colorful,
    /// Hue offset per segment
    Rainbow,
    Temperature,
    Load,
}

impl LedMode {
    pub const ALL: [LedMode; 6] = [
        Self::Static,
        Self::Breathing,
        Self::Colorful,
        Self::Rainbow,
        Self::Temperature,
        Self::Load,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Breathing => "breathing",
            Self::Colorful => "colorful",
            Self::Rainbow => "rainbow",
            Self::Temperature => "temperature",
            Self::Load => "load",
        }
    }

    /// Counter value after `tick`
    pub const fn advance(&self, tick: u32) -> u32 {
        match self {
            Self::Breathing => (tick + 1) % BREATHING_PERIOD,
            Self::Colorful => (tick + 1) % COLORFUL_PERIOD,
            Self::Rainbow => (tick + RAINBOW_STEP) % RAINBOW_LEN,
            Self::Static | Self::Temperature | Self::Load => 0,
        }
    }
}

impl FromStr for LedMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_lowercase();
        match s.as_str() {
            "spectrum" | "gradient" => Ok(Self::Colorful),
            "temp" => Ok(Self::Temperature),
            _ => Self::ALL.into_iter().find(|m| m.name() == s).ok_or_else(|| {
                format!(
                    "unknown led mode: {s}. Available: static, breathing, colorful, rainbow, temperature, load"
                )
            }),
        }
    }
}

impl fmt::Display for LedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Breathing amplitude at `tick`, rising for half the period then falling
pub fn breathing_factor(tick: u32) -> f64 {
    let half = BREATHING_PERIOD / 2;
    let tick = tick % BREATHING_PERIOD;
    if tick < half {
        f64::from(tick) / f64::from(half)
    } else {
        f64::from(BREATHING_PERIOD - 1 - tick) / f64::from(half)
    }
}

pub fn breathing(tick: u32, color: Rgb) -> Rgb {
    let factor = breathing_factor(tick);
    color.map(|c| {
        let c = f64::from(c);
        (c * factor * BREATHING_AMPLITUDE + c * BREATHING_FLOOR) as u8
    })
}

/// One point of a six phase hue wheel (red, yellow, green, cyan, blue, magenta)
fn hue(phase: u32, t: u8) -> Rgb {
    match phase {
        0 => [255, t, 0],
        1 => [255 - t, 255, 0],
        2 => [0, 255, t],
        3 => [0, 255 - t, 255],
        4 => [t, 0, 255],
        _ => [255, 0, 255 - t],
    }
}

fn ramp(offset: u32, phase_len: u32) -> u8 {
    (255 * offset / (phase_len - 1)) as u8
}

pub fn colorful(tick: u32) -> Rgb {
    let tick = tick % COLORFUL_PERIOD;
    hue(tick / COLORFUL_PHASE, ramp(tick % COLORFUL_PHASE, COLORFUL_PHASE))
}

/// 768-entry hue table, 128 steps per phase
pub fn rainbow_table() -> &'static [Rgb] {
    static TABLE: OnceLock<Vec<Rgb>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let phase_len = RAINBOW_LEN / 6;
        (0..RAINBOW_LEN)
            .map(|i| hue(i / phase_len, ramp(i % phase_len, phase_len)))
            .collect()
    })
}

pub fn rainbow(tick: u32, segments: usize) -> Vec<Rgb> {
    let table = rainbow_table();
    let len = table.len();
    (0..segments)
        .map(|i| table[(tick as usize + i * len / segments.max(1)) % len])
        .collect()
}

/// Colour band for a temperature or load reading
pub fn band_color(value: f32) -> Rgb {
    BANDS
        .iter()
        .find(|(bound, _)| value < *bound)
        .map_or(BAND_HIGH, |&(_, color)| color)
}

/// Colours of `segments` segments for one mode at one tick
pub fn render(mode: LedMode, tick: u32, color: Rgb, metric: f32, segments: usize) -> Vec<Rgb> {
    match mode {
        LedMode::Static => vec![color; segments],
        LedMode::Breathing => vec![breathing(tick, color); segments],
        LedMode::Colorful => vec![colorful(tick); segments],
        LedMode::Rainbow => rainbow(tick, segments),
        LedMode::Temperature | LedMode::Load => vec![band_color(metric); segments],
    }
}

/// Split `total` segments over `zones`, the remainder going to the first zones
pub fn zone_sizes(total: usize, zones: usize) -> Vec<usize> {
    let zones = zones.max(1);
    (0..zones)
        .map(|i| total / zones + usize::from(i < total % zones))
        .collect()
}

/// Independent effect state of one zone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zone {
    pub mode: LedMode,
    pub color: Rgb,
    /// 0..=100, applied on top of the device brightness
    pub brightness: u8,
    pub on: bool,
    tick: u32,
}

impl Default for Zone {
    fn default() -> Self {
        Self {
            mode: LedMode::Static,
            color: [255, 0, 0],
            brightness: 100,
            on: true,
            tick: 0,
        }
    }
}

impl Zone {
    pub fn tick(&self) -> u32 {
        self.tick
    }

    fn step(&mut self, metric: f32, segments: usize) -> Vec<Rgb> {
        if !self.on {
            return vec![[0, 0, 0]; segments];
        }
        let mut colors = render(self.mode, self.tick, self.color, metric, segments);
        self.tick = self.mode.advance(self.tick);
        if self.brightness < 100 {
            let b = u16::from(self.brightness);
            for rgb in &mut colors {
                *rgb = rgb.map(|c| (u16::from(c) * b / 100) as u8);
            }
        }
        colors
    }
}

/// Render one tick for every zone, concatenated in zone order
pub fn render_zones(zones: &mut [Zone], segments: usize, metric: f32) -> Vec<Rgb> {
    zone_sizes(segments, zones.len())
        .into_iter()
        .zip(zones.iter_mut())
        .flat_map(|(n, zone)| zone.step(metric, n))
        .collect()
}

/// Stateful driver for one controller
#[derive(Debug, Clone)]
pub struct LedEngine {
    topology: LedTopology,
    zones: Vec<Zone>,
    metric: f32,
    digits: Option<DigitDisplay>,
    readout: Readout,
}

impl LedEngine {
    pub fn new(topology: LedTopology) -> Self {
        Self {
            topology,
            zones: vec![Zone::default(); topology.zone_count.max(1)],
            metric: 0.0,
            digits: None,
            readout: Readout::default(),
        }
    }

    pub fn topology(&self) -> &LedTopology {
        &self.topology
    }

    /// Same mode on every zone; restarts the animation
    pub fn set_mode(&mut self, mode: LedMode) {
        for zone in &mut self.zones {
            zone.mode = mode;
            zone.tick = 0;
        }
    }

    pub fn set_color(&mut self, color: Rgb) {
        for zone in &mut self.zones {
            zone.color = color;
        }
    }

    /// Temperature or load reading for the linked modes
    pub fn set_metric(&mut self, metric: f32) {
        self.metric = metric;
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn zone_mut(&mut self, index: usize) -> Option<&mut Zone> {
        self.zones.get_mut(index)
    }

    /// Light only the digit segments, in the first zone's colour. Returns whether the style
    /// has a digit display.
    pub fn show_digits(&mut self, on: bool) -> bool {
        self.digits = Layout::for_style(self.topology.style_id)
            .filter(|_| on)
            .map(DigitDisplay::new);
        self.digits.is_some()
    }

    /// Current rotation phase while digits are shown
    pub fn digit_phase(&self) -> Option<usize> {
        self.digits.as_ref().map(DigitDisplay::phase)
    }

    pub fn set_sensor(&mut self, sensor: Sensor, value: f32) {
        self.readout.metrics.set(sensor, value);
    }

    pub fn set_clock(&mut self, clock: Clock) {
        self.readout.clock = clock;
    }

    pub fn set_temp_unit(&mut self, unit: TempUnit) {
        self.readout.unit = unit;
    }

    pub fn set_clock_24h(&mut self, clock_24h: bool) {
        self.readout.clock_24h = clock_24h;
    }

    pub fn readout(&self) -> &Readout {
        &self.readout
    }

    /// Advance one tick and return the colours to send: segment colours, or one colour per
    /// logical LED while digits are shown
    pub fn tick(&mut self) -> Vec<Rgb> {
        let colors = render_zones(&mut self.zones, self.topology.segment_count, self.metric);
        match &mut self.digits {
            Some(display) => {
                let base = colors.first().copied().unwrap_or([0, 0, 0]);
                segment::apply(&display.step(&self.readout), base)
            },
            None => colors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::styles::style;

    #[test]
    fn breathing_floor_peak_and_wrap() {
        assert_eq!(breathing_factor(0), 0.0);
        assert_eq!(breathing(0, [255, 100, 0]), [51, 20, 0]);
        assert!(breathing_factor(33) > 0.95);
        assert!(breathing_factor(32) > 0.95);
        assert_eq!(LedMode::Breathing.advance(65), 0);
        assert_eq!(breathing_factor(66), breathing_factor(0));
    }

    #[test]
    fn colorful_phases() {
        assert_eq!(colorful(0), [255, 0, 0]);
        assert_eq!(colorful(27), [255, 255, 0]);
        assert_eq!(colorful(28), [255, 255, 0]);
        assert_eq!(colorful(56), [0, 255, 0]);
        assert_eq!(colorful(167), [255, 0, 0]);
        assert_eq!(LedMode::Colorful.advance(167), 0);
    }

    #[test]
    fn rainbow_table_shape() {
        let table = rainbow_table();
        assert_eq!(table.len(), 768);
        assert_eq!(table[0], [255, 0, 0]);
        assert_eq!(table[127], [255, 255, 0]);
        assert_eq!(table[256], [0, 255, 0]);
        assert_eq!(table[767], [255, 0, 0]);
    }

    #[test]
    fn rainbow_offsets_per_segment() {
        let colors = rainbow(0, 6);
        assert_eq!(colors[0], rainbow_table()[0]);
        assert_eq!(colors[1], rainbow_table()[128]);
        assert_eq!(rainbow(4, 1)[0], rainbow_table()[4]);
        assert_eq!(LedMode::Rainbow.advance(764), 0);
    }

    #[test]
    fn bands() {
        assert_eq!(band_color(20.0), [0, 255, 255]);
        assert_eq!(band_color(30.0), [0, 255, 0]);
        assert_eq!(band_color(69.9), [255, 255, 0]);
        assert_eq!(band_color(85.0), [255, 110, 0]);
        assert_eq!(band_color(90.0), [255, 0, 0]);
    }

    #[test]
    fn zone_split_favours_first_zones() {
        assert_eq!(zone_sizes(18, 4), vec![5, 5, 4, 4]);
        assert_eq!(zone_sizes(10, 1), vec![10]);
        assert_eq!(zone_sizes(10, 0), vec![10]);
    }

    #[test]
    fn mode_names_round_trip() {
        for mode in LedMode::ALL {
            assert_eq!(mode.name().parse::<LedMode>(), Ok(mode));
        }
        assert_eq!("Gradient".parse::<LedMode>(), Ok(LedMode::Colorful));
        assert!("strobe".parse::<LedMode>().is_err());
    }

    #[test]
    fn engine_renders_zones_independently() {
        let mut engine = LedEngine::new(style(2).unwrap().topology());
        engine.set_color([0, 0, 200]);
        if let Some(zone) = engine.zone_mut(1) {
            zone.on = false;
        }
        if let Some(zone) = engine.zone_mut(2) {
            zone.brightness = 50;
        }
        let colors = engine.tick();
        assert_eq!(colors.len(), 18);
        assert_eq!(colors[0], [0, 0, 200]);
        assert_eq!(colors[5], [0, 0, 0]);
        assert_eq!(colors[10], [0, 0, 100]);
    }

    #[test]
    fn engine_advances_and_resets() {
        let mut engine = LedEngine::new(style(1).unwrap().topology());
        engine.set_mode(LedMode::Breathing);
        for _ in 0..10 {
            engine.tick();
        }
        assert_eq!(engine.zones()[0].tick(), 10);
        engine.set_mode(LedMode::Rainbow);
        assert_eq!(engine.zones()[0].tick(), 0);
        assert_eq!(engine.tick().len(), 10);
    }

    #[test]
    fn digits_mask_the_base_colour() {
        let mut engine = LedEngine::new(style(1).unwrap().topology());
        engine.set_color([0, 0, 255]);
        engine.set_sensor(Sensor::CpuTemp, 42.0);
        assert!(engine.show_digits(true));
        let colors = engine.tick();
        assert_eq!(colors.len(), 30);
        assert_eq!(colors[6], [0, 0, 255]);
        assert_eq!(colors[7], [0, 0, 0]);
        assert_eq!(colors[17], [0, 0, 255]);
        assert_eq!(colors[9], [0, 0, 0]);

        engine.set_temp_unit(TempUnit::Fahrenheit);
        assert_eq!(engine.tick()[7], [0, 0, 255]);
        assert!(!engine.show_digits(false));
        assert_eq!(engine.tick().len(), 10);
    }

    #[test]
    fn digits_rotate_with_ticks() {
        let mut engine = LedEngine::new(style(8).unwrap().topology());
        engine.show_digits(true);
        for _ in 0..segment::PHASE_TICKS {
            engine.tick();
        }
        assert_eq!(engine.digit_phase(), Some(1));
        // cpu load indicator
        assert_eq!(engine.tick()[2], [255, 0, 0]);
    }

    #[test]
    fn styles_without_digits_stay_plain() {
        let mut engine = LedEngine::new(style(12).unwrap().topology());
        assert!(!engine.show_digits(true));
        assert_eq!(engine.digit_phase(), None);
        assert_eq!(engine.tick().len(), 62);
    }

    #[test]
    fn linked_modes_follow_metric() {
        let mut engine = LedEngine::new(style(1).unwrap().topology());
        engine.set_mode(LedMode::Temperature);
        engine.set_metric(75.0);
        assert!(engine.tick().iter().all(|&c| c == [255, 110, 0]));
    }
}
