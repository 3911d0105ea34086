use serde::{Deserialize, Serialize};

/// Round up to the next 32-byte boundary.
pub fn ceil32(n: u64) -> u64 {
    (n + 31) / 32 * 32
}

/// Upper bound on one value's memory footprint, enforced by the
/// manifest loader.
pub const MAX_VALUE_SIZE: u64 = 1 << 24;

/// Value types as the code generator sees them: enough structure to size
/// frame slots and return buffers, nothing more. Semantic analysis has
/// already run; what remains of a type at this layer is its memory layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValType {
    /// A single 32-byte machine word (integers, addresses, booleans).
    Word,
    /// A byte string with a static capacity: one length word plus the
    /// payload padded to a word boundary.
    Bytes { len: u32 },
    Tuple(Vec<ValType>),
}

impl ValType {
    /// Bytes of memory a value of this type occupies in a frame or
    /// return buffer. Wider than the offset type: a `bytes` capacity
    /// near the `u32` limit sizes exactly instead of wrapping.
    pub fn memory_size(&self) -> u64 {
        match self {
            ValType::Word => 32,
            ValType::Bytes { len } => 32 + ceil32(*len as u64),
            ValType::Tuple(elems) => elems.iter().map(|t| t.memory_size()).sum(),
        }
    }

    /// Number of word-sized slots, counting byte strings by capacity.
    pub fn word_count(&self) -> u64 {
        self.memory_size() / 32
    }

    pub fn display(&self) -> String {
        match self {
            ValType::Word => "word".to_string(),
            ValType::Bytes { len } => format!("bytes[{len}]"),
            ValType::Tuple(elems) => {
                let parts: Vec<_> = elems.iter().map(|t| t.display()).collect();
                format!("({})", parts.join(", "))
            }
        }
    }
}
