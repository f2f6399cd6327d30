use serde::{Deserialize, Serialize};

/// Straight (non-premultiplied) colour with a fractional alpha channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0.0);

    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// `0xRRGGBB`, the integer form three.js colours use.
    pub fn from_hex(hex: u32) -> Self {
        Self::rgb((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
    }

    pub fn to_hex(&self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    /// Builds a colour from unit-range channels.
    pub fn from_unit(r: f64, g: f64, b: f64) -> Self {
        Self::rgb(unit_to_byte(r), unit_to_byte(g), unit_to_byte(b))
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    pub fn scaled(self, factor: f32) -> Self {
        let scale = |c: u8| (c as f32 * factor).round().clamp(0.0, 255.0) as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b), self.a)
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        [
            self.r,
            self.g,
            self.b,
            (self.a.clamp(0.0, 1.0) * 255.0).round() as u8,
        ]
    }
}

fn unit_to_byte(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Parses the CSS colour forms generated canvas code tends to use. Returns
/// `None` for anything unrecognised so callers can keep their previous style.
pub fn parse_css_color(input: &str) -> Option<Rgba> {
    let value = input.trim().to_ascii_lowercase();
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(args) = function_args(&value, "rgba").or_else(|| function_args(&value, "rgb")) {
        return parse_rgb(&args);
    }
    if let Some(args) = function_args(&value, "hsla").or_else(|| function_args(&value, "hsl")) {
        return parse_hsl(&args);
    }
    named(&value)
}

fn function_args(value: &str, name: &str) -> Option<Vec<String>> {
    let inner = value.strip_prefix(name)?.trim_start().strip_prefix('(')?;
    let inner = inner.strip_suffix(')')?;
    Some(
        inner
            .split([',', '/', ' '])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    let digits: Vec<u8> = hex
        .chars()
        .map(|c| c.to_digit(16).map(|d| d as u8))
        .collect::<Option<_>>()?;
    match digits.len() {
        3 => Some(Rgba::rgb(digits[0] * 17, digits[1] * 17, digits[2] * 17)),
        4 => Some(Rgba::new(
            digits[0] * 17,
            digits[1] * 17,
            digits[2] * 17,
            (digits[3] * 17) as f32 / 255.0,
        )),
        6 | 8 => {
            let byte = |i: usize| digits[i] * 16 + digits[i + 1];
            let a = if digits.len() == 8 {
                byte(6) as f32 / 255.0
            } else {
                1.0
            };
            Some(Rgba::new(byte(0), byte(2), byte(4), a))
        }
        _ => None,
    }
}

fn parse_channel(part: &str) -> Option<u8> {
    let v = if let Some(pct) = part.strip_suffix('%') {
        pct.parse::<f64>().ok()? * 2.55
    } else {
        part.parse::<f64>().ok()?
    };
    v.is_finite().then(|| v.round().clamp(0.0, 255.0) as u8)
}

fn parse_alpha(part: Option<&String>) -> Option<f32> {
    match part {
        None => Some(1.0),
        Some(raw) => {
            let v = if let Some(pct) = raw.strip_suffix('%') {
                pct.parse::<f32>().ok()? / 100.0
            } else {
                raw.parse::<f32>().ok()?
            };
            v.is_finite().then(|| v.clamp(0.0, 1.0))
        }
    }
}

fn parse_rgb(args: &[String]) -> Option<Rgba> {
    if !(3..=4).contains(&args.len()) {
        return None;
    }
    Some(Rgba::new(
        parse_channel(&args[0])?,
        parse_channel(&args[1])?,
        parse_channel(&args[2])?,
        parse_alpha(args.get(3))?,
    ))
}

fn parse_hsl(args: &[String]) -> Option<Rgba> {
    if !(3..=4).contains(&args.len()) {
        return None;
    }
    let hue = args[0].trim_end_matches("deg").parse::<f64>().ok()?;
    let sat = args[1].trim_end_matches('%').parse::<f64>().ok()? / 100.0;
    let light = args[2].trim_end_matches('%').parse::<f64>().ok()? / 100.0;
    if !(hue.is_finite() && sat.is_finite() && light.is_finite()) {
        return None;
    }
    let (r, g, b) = hsl_to_rgb(hue, sat.clamp(0.0, 1.0), light.clamp(0.0, 1.0));
    Some(Rgba::from_unit(r, g, b).with_alpha(parse_alpha(args.get(3))?))
}

/// Hue in degrees, saturation and lightness in `0..=1`.
pub(crate) fn hsl_to_rgb(hue: f64, sat: f64, light: f64) -> (f64, f64, f64) {
    let h = hue.rem_euclid(360.0) / 360.0;
    if sat == 0.0 {
        return (light, light, light);
    }
    let q = if light < 0.5 {
        light * (1.0 + sat)
    } else {
        light + sat - light * sat
    };
    let p = 2.0 * light - q;
    let channel = |mut t: f64| {
        t = t.rem_euclid(1.0);
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };
    (channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0))
}

fn named(value: &str) -> Option<Rgba> {
    let color = match value {
        "black" => Rgba::BLACK,
        "white" => Rgba::WHITE,
        "transparent" => Rgba::TRANSPARENT,
        "red" => Rgba::rgb(255, 0, 0),
        "lime" => Rgba::rgb(0, 255, 0),
        "green" => Rgba::rgb(0, 128, 0),
        "blue" => Rgba::rgb(0, 0, 255),
        "yellow" => Rgba::rgb(255, 255, 0),
        "cyan" | "aqua" => Rgba::rgb(0, 255, 255),
        "magenta" | "fuchsia" => Rgba::rgb(255, 0, 255),
        "orange" => Rgba::rgb(255, 165, 0),
        "purple" => Rgba::rgb(128, 0, 128),
        "pink" => Rgba::rgb(255, 192, 203),
        "gray" | "grey" => Rgba::rgb(128, 128, 128),
        _ => return None,
    };
    Some(color)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_forms() {
        assert_eq!(parse_css_color("#fff"), Some(Rgba::WHITE));
        assert_eq!(parse_css_color("#FF8000"), Some(Rgba::rgb(255, 128, 0)));
        assert_eq!(parse_css_color("#12"), None);
    }

    #[test]
    fn parses_rgba_with_alpha() {
        let c = parse_css_color("rgba(0, 0, 0, 0.8)").unwrap();
        assert_eq!((c.r, c.g, c.b), (0, 0, 0));
        assert!((c.a - 0.8).abs() < 1e-6);
    }

    #[test]
    fn parses_hsl() {
        assert_eq!(parse_css_color("hsl(0, 100%, 50%)"), Some(Rgba::rgb(255, 0, 0)));
        assert_eq!(parse_css_color("hsl(120, 100%, 50%)"), Some(Rgba::rgb(0, 255, 0)));
        let c = parse_css_color("hsla(240, 100%, 50%, 0.25)").unwrap();
        assert_eq!((c.r, c.g, c.b), (0, 0, 255));
        assert!((c.a - 0.25).abs() < 1e-6);
    }

    #[test]
    fn hue_wraps_around() {
        assert_eq!(parse_css_color("hsl(480, 100%, 50%)"), parse_css_color("hsl(120, 100%, 50%)"));
    }

    #[test]
    fn unknown_strings_are_rejected() {
        assert_eq!(parse_css_color("not a colour"), None);
        assert_eq!(parse_css_color("rgb(1, 2)"), None);
    }

    #[test]
    fn hex_integers_round_trip() {
        assert_eq!(Rgba::from_hex(0x336699).to_hex(), 0x336699);
    }
}
