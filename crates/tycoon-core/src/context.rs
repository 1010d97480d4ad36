//! The simulation context: every piece of state the tick loop and game
//! actions read or write, owned in one place and passed explicitly.

use crate::checksum::{StateChecksum, StateHash};
use crate::cheats::Cheats;
use crate::date::GameDate;
use crate::entity::EntityTable;
use crate::fixed::Ticks;
use crate::park::Park;
use crate::player::PlayerTable;
use crate::rng::SimRng;
use crate::weather::Weather;

/// Default number of entity slots.
pub const DEFAULT_ENTITY_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct SimulationContext {
    /// Number of completed ticks.
    pub current_ticks: Ticks,
    pub(crate) paused: bool,
    pub rng: SimRng,
    pub date: GameDate,
    pub weather: Weather,
    pub park: Park,
    pub cheats: Cheats,
    pub entities: EntityTable,
    pub players: PlayerTable,
    pub editor_mode: bool,
}

impl SimulationContext {
    pub fn new(seed: u64, entity_capacity: usize) -> Self {
        Self {
            current_ticks: 0,
            paused: false,
            rng: SimRng::new(seed),
            date: GameDate::new(),
            weather: Weather::default(),
            park: Park::default(),
            cheats: Cheats::default(),
            entities: EntityTable::new(entity_capacity),
            players: PlayerTable::default(),
            editor_mode: false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Checksum of all simulation-relevant state. Render-only entity fields
    /// and the pause flag are not included.
    pub fn checksum(&self) -> StateChecksum {
        let mut hash = StateHash::new();
        hash.write_u32(self.current_ticks);
        hash.write_u64(self.rng.state());
        hash.write_u16(self.date.month_ticks);
        hash.write_u32(self.date.months_elapsed);
        hash.write_u8(self.weather.kind as u8);
        hash.write_u8(self.weather.temperature as u8);
        hash.write_u16(self.weather.update_timer);
        self.park.hash_into(&mut hash);
        self.cheats.hash_into(&mut hash);
        self.entities.hash_into(&mut hash);
        StateChecksum::from_hash(hash)
    }
}

impl Default for SimulationContext {
    fn default() -> Self {
        Self::new(0, DEFAULT_ENTITY_CAPACITY)
    }
}
