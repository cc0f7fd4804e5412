use serde::{Deserialize, Serialize};

// A [start, end] frame range. Either side may be unset. When both are set
// start <= end always holds; moving one bound past the other drags the other
// bound along with it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    start: Option<u64>,
    #[serde(default)]
    end: Option<u64>,
}

impl Selection {
    pub fn new(a: u64, b: u64) -> Self {
        Self {
            start: Some(a.min(b)),
            end: Some(a.max(b)),
        }
    }

    pub fn start(&self) -> Option<u64> {
        self.start
    }

    pub fn end(&self) -> Option<u64> {
        self.end
    }

    // Both bounds, if the selection is complete
    pub fn bounds(&self) -> Option<(u64, u64)> {
        Some((self.start?, self.end?))
    }

    pub fn set_start(&mut self, position: u64) {
        self.start = Some(position);
        if let Some(end) = self.end {
            if end < position {
                self.end = Some(position);
            }
        }
    }

    pub fn set_end(&mut self, position: u64) {
        self.end = Some(position);
        if let Some(start) = self.start {
            if start > position {
                self.start = Some(position);
            }
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    // Pull both bounds inside a track of `frames` frames
    pub fn clamped_to(&self, frames: u64) -> Self {
        let last = frames.saturating_sub(1);
        Self {
            start: self.start.map(|s| s.min(last)),
            end: self.end.map(|e| e.min(last)),
        }
    }

    // The persisted form, also reused as a sanity gate on load
    pub fn from_bounds(start: Option<u64>, end: Option<u64>) -> Self {
        match (start, end) {
            (Some(s), Some(e)) => Self::new(s, e),
            _ => Self { start, end },
        }
    }
}
