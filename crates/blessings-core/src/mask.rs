//! Permission bitmasks.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// A set of permission flags.
    ///
    /// Masks combine with `|` (union) and `&` (intersection). The low bits are
    /// reserved for the well-known flags; applications may define their own
    /// flags in the remaining bits.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PermissionMask: u32 {
        /// Edits are applied directly (otherwise they are suggestions).
        const WRITE = 1 << 0;
        /// Content is visible.
        const READ = 1 << 1;
        /// Full control, including re-delegation of the path.
        const ADMIN = 1 << 2;

        // Application-defined flags pass through every operation untouched.
        const _ = !0;
    }
}

impl PermissionMask {
    /// No access.
    pub const NONE: Self = Self::empty();
    /// Every flag, including application-defined ones.
    pub const ALL: Self = Self::all();
}

impl Default for PermissionMask {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<u32> for PermissionMask {
    fn from(bits: u32) -> Self {
        Self::from_bits_retain(bits)
    }
}

impl fmt::Debug for PermissionMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ALL {
            return f.write_str("ALL");
        }
        if self.is_empty() {
            return f.write_str("NONE");
        }

        let mut parts: Vec<String> = self.iter_names().map(|(name, _)| name.to_string()).collect();
        let named = Self::WRITE | Self::READ | Self::ADMIN;
        let rest = self.bits() & !named.bits();
        if rest != 0 {
            parts.push(format!("{:#x}", rest));
        }
        f.write_str(&parts.join("|"))
    }
}

impl fmt::Display for PermissionMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
