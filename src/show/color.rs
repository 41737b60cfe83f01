use std::ops::{Add, Mul};

/// Linear RGB triple, one float per channel, nominally 0.0-1.0
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);
    pub const RED: Rgb = Rgb::new(1.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Full-saturation, full-value color for a hue in [0, 1]
    pub fn from_hue(hue: f32) -> Self {
        hsv_to_rgb(hue, 1.0, 1.0)
    }

    pub fn max(self, other: Rgb) -> Rgb {
        Rgb::new(self.r.max(other.r), self.g.max(other.g), self.b.max(other.b))
    }

    pub fn clamped(self) -> Rgb {
        Rgb::new(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
        )
    }

    /// Mean of the three channels
    pub fn luma(self) -> f32 {
        (self.r + self.g + self.b) / 3.0
    }

    /// 8-bit representation for transmission (truncating)
    pub fn to_rgb8(self) -> [u8; 3] {
        let c = self.clamped();
        [
            (c.r * 255.0) as u8,
            (c.g * 255.0) as u8,
            (c.b * 255.0) as u8,
        ]
    }
}

impl Add for Rgb {
    type Output = Rgb;

    fn add(self, rhs: Rgb) -> Rgb {
        Rgb::new(self.r + rhs.r, self.g + rhs.g, self.b + rhs.b)
    }
}

impl Mul<f32> for Rgb {
    type Output = Rgb;

    fn mul(self, rhs: f32) -> Rgb {
        Rgb::new(self.r * rhs, self.g * rhs, self.b * rhs)
    }
}

/// Standard six-sector hue wheel. `h` wraps, so 1.0 is red again.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    if s <= 0.0 {
        return Rgb::new(v, v, v);
    }

    let scaled = h * 6.0;
    let sector = scaled.floor();
    let f = scaled - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    match (sector as i64).rem_euclid(6) {
        0 => Rgb::new(v, t, p),
        1 => Rgb::new(q, v, p),
        2 => Rgb::new(p, v, t),
        3 => Rgb::new(p, q, v),
        4 => Rgb::new(t, p, v),
        _ => Rgb::new(v, p, q),
    }
}
