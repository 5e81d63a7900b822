use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn contains(&self, point: ScreenPoint) -> bool {
        point.x >= 0 && point.y >= 0 && (point.x as u32) < self.width && (point.y as u32) < self.height
    }
}

/// Pixel coordinate on the sandbox screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

impl ScreenPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Post-action screen state handed to the step memory.
#[derive(Debug, Clone)]
pub struct Observation {
    /// PNG shown to the model; carries the interaction marker when one was set.
    pub model_png: Vec<u8>,
    pub saved_path: PathBuf,
    /// Repetition warning, or empty.
    pub note: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_is_half_open() {
        let size = ScreenSize { width: 1024, height: 768 };
        assert!(size.contains(ScreenPoint::new(0, 0)));
        assert!(size.contains(ScreenPoint::new(1023, 767)));
        assert!(!size.contains(ScreenPoint::new(1024, 10)));
        assert!(!size.contains(ScreenPoint::new(10, 768)));
        assert!(!size.contains(ScreenPoint::new(-1, 10)));
    }
}
