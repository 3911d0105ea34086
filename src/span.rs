use serde::{Deserialize, Serialize};

/// A source location in the contract source: file ID + byte offset range.
///
/// Spans originate in the front end and travel through the module manifest
/// so that diagnostics raised during IR generation can point back at the
/// contract text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub file_id: u16,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(file_id: u16, start: u32, end: u32) -> Self {
        Self {
            file_id,
            start,
            end,
        }
    }

    /// Span for synthesized nodes with no source location.
    pub fn dummy() -> Self {
        Self {
            file_id: 0,
            start: 0,
            end: 0,
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.start == 0 && self.end == 0
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::dummy()
    }
}
