//! Park calendar. A park year runs March to October (eight months).

use serde::{Deserialize, Serialize};

/// Month ticks added per simulation tick. A month ends when the 16-bit
/// month tick counter wraps.
pub const MONTH_TICKS_INCREMENT: u16 = 4;

/// Months per park year.
pub const MONTHS_PER_YEAR: u32 = 8;

const DAYS_IN_MONTH: [u32; MONTHS_PER_YEAR as usize] = [31, 30, 31, 30, 31, 31, 30, 31];

/// Calendar state advanced once per tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameDate {
    pub month_ticks: u16,
    pub months_elapsed: u32,
}

/// Calendar boundaries crossed by a single [`GameDate::advance`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateEvents {
    pub new_day: bool,
    pub new_month: bool,
    pub new_year: bool,
}

impl GameDate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-based month within the year (0 = March).
    pub fn month(&self) -> u32 {
        self.months_elapsed % MONTHS_PER_YEAR
    }

    /// One-based year.
    pub fn year(&self) -> u32 {
        self.months_elapsed / MONTHS_PER_YEAR + 1
    }

    pub fn days_in_month(&self) -> u32 {
        DAYS_IN_MONTH[self.month() as usize]
    }

    /// Zero-based day within the month.
    pub fn day(&self) -> u32 {
        (self.month_ticks as u32 * self.days_in_month()) >> 16
    }

    /// Advance by one tick.
    pub fn advance(&mut self) -> DateEvents {
        let day_before = self.day();
        let (next, wrapped) = self.month_ticks.overflowing_add(MONTH_TICKS_INCREMENT);
        self.month_ticks = next;

        let mut events = DateEvents::default();
        if wrapped {
            self.months_elapsed += 1;
            events.new_month = true;
            events.new_day = true;
            events.new_year = self.month() == 0;
        } else if self.day() != day_before {
            events.new_day = true;
        }
        events
    }
}
