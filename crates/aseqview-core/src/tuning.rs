//! Micro-tuning categories and the tuning-type mute mask.

/// Number of tuning-type categories with a mute toggle.
pub const TUNING_CATEGORIES: usize = 8;

/// Short labels for the category toggles, in category order.
pub const TUNING_LABELS: [&str; TUNING_CATEGORIES] =
    ["eq.", "Py.", "mt.", "pu.", "u0", "u1", "u2", "u3"];

/// Presets 0x00..0x03 map to categories 0..3, user tables 0x40..0x43 to 4..7.
#[inline]
pub fn category(tuning_type: u8) -> u8 {
    if tuning_type >= 0x40 {
        tuning_type - 0x3c
    } else {
        tuning_type
    }
}

/// Set of suppressed tuning-type categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TuningMuteMask(u32);

impl TuningMuteMask {
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Categories outside the 32-bit mask never match.
    #[inline]
    pub fn contains(self, category: u8) -> bool {
        1u32.checked_shl(category as u32)
            .map(|bit| self.0 & bit != 0)
            .unwrap_or(false)
    }

    /// Flips `category`; returns the new state, or `None` for categories
    /// without a toggle.
    pub fn toggle(&mut self, category: u8) -> Option<bool> {
        if category as usize >= TUNING_CATEGORIES {
            return None;
        }
        self.0 ^= 1 << category;
        Some(self.contains(category))
    }

    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }
}
