use super::color::Rgb;

/// A traveling brightness bump, in element-index units
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pulse {
    pub position: f32,
    pub amplitude: f32,
    pub color: Rgb,
}

impl Pulse {
    /// New pulse at the head of a zone
    pub fn spawn(amplitude: f32, color: Rgb) -> Self {
        Self {
            position: 0.0,
            amplitude: amplitude.clamp(0.0, 1.0),
            color,
        }
    }

    /// Triangular falloff: 1 at the center, 0 at `width` elements away and beyond
    pub fn intensity_at(&self, element: f32, width: f32) -> f32 {
        triangle(self.position - element, width)
    }
}

/// Shape and motion shared by every pulse in the show
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PulseParams {
    /// Half-width of the triangle, in elements. Always > 0.
    pub width: f32,
    /// Elements per second
    pub speed: f32,
    /// Per-step multiplier applied to the previous frame
    pub decay: f32,
}

pub fn triangle(distance: f32, width: f32) -> f32 {
    ((width - distance.abs()) / width).clamp(0.0, 1.0)
}
