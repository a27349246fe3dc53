use anyhow::{anyhow, Result};
use serde::{Serialize, Serializer};

/// A 24-bit fill color, no alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Parse `#rrggbb` (the leading `#` is optional)
    pub fn from_hex(s: &str) -> Result<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(anyhow!("Invalid hex color: {}", s));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| anyhow!("Invalid hex color {}: {}", s, e))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

pub const NEGATIVE: Rgb = Rgb::new(0xff, 0x49, 0x76);
pub const NEUTRAL: Rgb = Rgb::new(0x75, 0x75, 0x75);
pub const POSITIVE: Rgb = Rgb::new(0x22, 0xc5, 0x5e);

/// Percentage change at which the scale saturates
pub const SATURATION_PCT: f64 = 10.0;

/// Map a signed percentage change onto the negative / neutral / positive scale.
///
/// Values are clamped to +/-10%. NaN has no sign and maps to neutral;
/// infinities clamp to the matching end of the scale.
pub fn color_for(percentage_change: f64) -> Rgb {
    if percentage_change.is_nan() {
        return NEUTRAL;
    }
    let clamped = percentage_change.clamp(-SATURATION_PCT, SATURATION_PCT);

    if clamped >= SATURATION_PCT {
        return POSITIVE;
    }
    if clamped <= -SATURATION_PCT {
        return NEGATIVE;
    }
    if clamped == 0.0 {
        return NEUTRAL;
    }

    if clamped > 0.0 {
        interpolate(NEUTRAL, POSITIVE, clamped / SATURATION_PCT)
    } else {
        interpolate(NEUTRAL, NEGATIVE, clamped.abs() / SATURATION_PCT)
    }
}

/// Per-channel linear blend, `ratio` in `[0, 1]`
pub fn interpolate(from: Rgb, to: Rgb, ratio: f64) -> Rgb {
    let lerp = |a: u8, b: u8| {
        let v = (a as f64 + (b as f64 - a as f64) * ratio).round();
        v.clamp(0.0, 255.0) as u8
    };
    Rgb::new(lerp(from.r, to.r), lerp(from.g, to.g), lerp(from.b, to.b))
}
