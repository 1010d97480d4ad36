use serde::{Deserialize, Serialize};

use crate::checksum::StateHash;

/// Individually toggleable cheats. Recorded with replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CheatKind {
    NoMoney = 0,
    BuildInPauseMode = 1,
    DisableLittering = 2,
    DisableBreakdowns = 3,
    DisableRideAgeing = 4,
}

impl CheatKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(CheatKind::NoMoney),
            1 => Some(CheatKind::BuildInPauseMode),
            2 => Some(CheatKind::DisableLittering),
            3 => Some(CheatKind::DisableBreakdowns),
            4 => Some(CheatKind::DisableRideAgeing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cheats {
    pub no_money: bool,
    pub build_in_pause_mode: bool,
    pub disable_littering: bool,
    pub disable_breakdowns: bool,
    pub disable_ride_ageing: bool,
}

impl Cheats {
    pub fn get(&self, kind: CheatKind) -> bool {
        match kind {
            CheatKind::NoMoney => self.no_money,
            CheatKind::BuildInPauseMode => self.build_in_pause_mode,
            CheatKind::DisableLittering => self.disable_littering,
            CheatKind::DisableBreakdowns => self.disable_breakdowns,
            CheatKind::DisableRideAgeing => self.disable_ride_ageing,
        }
    }

    pub fn set(&mut self, kind: CheatKind, enabled: bool) {
        let slot = match kind {
            CheatKind::NoMoney => &mut self.no_money,
            CheatKind::BuildInPauseMode => &mut self.build_in_pause_mode,
            CheatKind::DisableLittering => &mut self.disable_littering,
            CheatKind::DisableBreakdowns => &mut self.disable_breakdowns,
            CheatKind::DisableRideAgeing => &mut self.disable_ride_ageing,
        };
        *slot = enabled;
    }

    pub(crate) fn hash_into(&self, hash: &mut StateHash) {
        let bits = (self.no_money as u8)
            | (self.build_in_pause_mode as u8) << 1
            | (self.disable_littering as u8) << 2
            | (self.disable_breakdowns as u8) << 3
            | (self.disable_ride_ageing as u8) << 4;
        hash.write_u8(bits);
    }
}
