//! Region-of-interest algebra (spec.md §4.2, C2).

/// `{x, y, width, height, scale}`. Invariant: `x >= 0`, `y >= 0`, `width > 0`,
/// `height > 0`, `scale > 0`; `scale == 1.0` is full image resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    pub scale: f32,
}

impl Roi {
    pub fn new(x: i64, y: i64, width: u32, height: u32, scale: f32) -> Self {
        Roi {
            x,
            y,
            width,
            height,
            scale,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// A region is "degenerate" after a geometric transform if either side
    /// drops below 4 pixels (spec.md §4.2 failure modes).
    pub fn is_degenerate(&self) -> bool {
        !self.is_empty() && (self.width < 4 || self.height < 4)
    }

    /// Clips this ROI to lie within `[0, image_width) x [0, image_height)`.
    pub fn clip_to(&self, image_width: u32, image_height: u32) -> Roi {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = (self.x + self.width as i64).min(image_width as i64);
        let y1 = (self.y + self.height as i64).min(image_height as i64);
        let width = (x1 - x0).max(0) as u32;
        let height = (y1 - y0).max(0) as u32;
        Roi {
            x: x0,
            y: y0,
            width,
            height,
            scale: self.scale,
        }
    }

    /// The smallest ROI containing both `self` and `other`, at `self`'s scale.
    pub fn union(&self, other: &Roi) -> Roi {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = (self.x + self.width as i64).max(other.x + other.width as i64);
        let y1 = (self.y + self.height as i64).max(other.y + other.height as i64);
        Roi {
            x: x0,
            y: y0,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
            scale: self.scale,
        }
    }

    /// Whether `self` contains `other` entirely — used to verify the
    /// backward-forward composition invariant `modify_roi_in(modify_roi_out(r)) superset r`.
    pub fn contains(&self, other: &Roi) -> bool {
        if other.is_empty() {
            return true;
        }
        self.x <= other.x
            && self.y <= other.y
            && self.x + self.width as i64 >= other.x + other.width as i64
            && self.y + self.height as i64 >= other.y + other.height as i64
    }

    /// Grow the ROI by `halo` pixels on every side (used by tiling, §4.7).
    pub fn grow(&self, halo: u32) -> Roi {
        Roi {
            x: self.x - halo as i64,
            y: self.y - halo as i64,
            width: self.width + 2 * halo,
            height: self.height + 2 * halo,
            scale: self.scale,
        }
    }
}
