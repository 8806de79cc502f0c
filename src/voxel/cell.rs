//! Per-cell flag word

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use bytemuck::{Pod, Zeroable};

/// Raw flag bits
pub mod flags {
    pub const FILLED: u32 = 1 << 0;
    pub const MESH_GENERATED: u32 = 1 << 1;
    pub const SELECTED: u32 = 1 << 2;
}

/// Flag word stored for every cell - exactly 4 bytes so the buffer uploads as `array<u32>`
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct CellFlags(u32);

impl CellFlags {
    pub const EMPTY: CellFlags = CellFlags(0);
    /// Material present
    pub const FILLED: CellFlags = CellFlags(flags::FILLED);
    /// Already absorbed into a greedy run during the current meshing pass
    pub const MESH_GENERATED: CellFlags = CellFlags(flags::MESH_GENERATED);
    pub const SELECTED: CellFlags = CellFlags(flags::SELECTED);
    /// Bits that survive save/load
    pub const PERSISTENT: CellFlags = CellFlags(flags::FILLED | flags::SELECTED);

    pub const fn from_bits(bits: u32) -> Self {
        CellFlags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set
    pub const fn contains(self, other: CellFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set
    pub const fn intersects(self, other: CellFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: CellFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: CellFlags) {
        self.0 &= !other.0;
    }

    #[must_use]
    pub const fn with(self, other: CellFlags) -> Self {
        CellFlags(self.0 | other.0)
    }

    #[must_use]
    pub const fn without(self, other: CellFlags) -> Self {
        CellFlags(self.0 & !other.0)
    }

    #[inline]
    pub const fn is_filled(self) -> bool {
        self.0 & flags::FILLED != 0
    }
}

impl BitOr for CellFlags {
    type Output = CellFlags;
    fn bitor(self, rhs: CellFlags) -> CellFlags {
        CellFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for CellFlags {
    fn bitor_assign(&mut self, rhs: CellFlags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for CellFlags {
    type Output = CellFlags;
    fn bitand(self, rhs: CellFlags) -> CellFlags {
        CellFlags(self.0 & rhs.0)
    }
}

impl Not for CellFlags {
    type Output = CellFlags;
    fn not(self) -> CellFlags {
        CellFlags(!self.0)
    }
}

impl fmt::Debug for CellFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (flags::FILLED, "FILLED"),
            (flags::MESH_GENERATED, "MESH_GENERATED"),
            (flags::SELECTED, "SELECTED"),
        ];
        let mut first = true;
        write!(f, "CellFlags(")?;
        for (bit, name) in names {
            if self.0 & bit != 0 {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        let unknown = self.0 & !(flags::FILLED | flags::MESH_GENERATED | flags::SELECTED);
        if unknown != 0 {
            if !first {
                write!(f, " | ")?;
            }
            write!(f, "{unknown:#x}")?;
        } else if first {
            write!(f, "EMPTY")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_size() {
        assert_eq!(std::mem::size_of::<CellFlags>(), 4);
    }

    #[test]
    fn test_flags_independent() {
        let mut cell = CellFlags::EMPTY;
        cell.insert(CellFlags::FILLED);
        cell.insert(CellFlags::SELECTED);
        assert!(cell.is_filled());
        assert!(!cell.intersects(CellFlags::MESH_GENERATED));

        cell.remove(CellFlags::FILLED);
        assert!(!cell.is_filled());
        assert!(cell.contains(CellFlags::SELECTED));
    }

    #[test]
    fn test_contains_vs_intersects() {
        let cell = CellFlags::FILLED;
        let both = CellFlags::FILLED | CellFlags::SELECTED;
        assert!(cell.intersects(both));
        assert!(!cell.contains(both));
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", CellFlags::EMPTY), "CellFlags(EMPTY)");
        assert_eq!(
            format!("{:?}", CellFlags::FILLED | CellFlags::MESH_GENERATED),
            "CellFlags(FILLED | MESH_GENERATED)"
        );
    }

    #[test]
    fn test_pod_cast() {
        let cells = [CellFlags::FILLED, CellFlags::EMPTY, CellFlags::SELECTED];
        let words: &[u32] = bytemuck::cast_slice(&cells);
        assert_eq!(words, &[1, 0, 4]);
    }
}
