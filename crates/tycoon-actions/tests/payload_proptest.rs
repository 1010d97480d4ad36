//! Property tests for action payloads: whatever a peer encodes, the
//! registry decodes to an equal action.

use proptest::prelude::*;
use tycoon_actions::{
    CreateRide, DemolishRide, PauseToggle, PlaceTrack, RemoveTrack, RenameGuest, SetCheat, SetParkEntranceFee,
    SetRideStatus, SpawnGuest,
};
use tycoon_core::action::{ActionEnvelope, GameAction};
use tycoon_core::id::{EntityId, RideId};
use tycoon_core::park::{RideKind, RideStatus};
use tycoon_core::registry::ActionRegistry;

fn registry() -> ActionRegistry {
    tycoon_actions::registry().unwrap()
}

fn through_registry<T: GameAction + Clone + PartialEq + 'static>(registry: &ActionRegistry, action: &T) -> T {
    let packet = ActionEnvelope::of(action.clone()).to_packet().unwrap();
    let decoded = registry.decode(packet.opcode, &packet.payload).unwrap();
    decoded.as_any().downcast_ref::<T>().cloned().unwrap()
}

fn arb_ride() -> impl Strategy<Value = RideId> {
    any::<u16>().prop_map(RideId)
}

fn arb_kind() -> impl Strategy<Value = RideKind> {
    prop_oneof![
        Just(RideKind::Coaster),
        Just(RideKind::FlatRide),
        Just(RideKind::Shop),
        Just(RideKind::Transport),
    ]
}

fn arb_status() -> impl Strategy<Value = RideStatus> {
    prop_oneof![Just(RideStatus::Closed), Just(RideStatus::Open), Just(RideStatus::Broken)]
}

proptest! {
    #[test]
    fn place_track_survives_the_wire(ride in arb_ride(), x in any::<i32>(), y in any::<i32>(), z in any::<i32>(), piece in any::<u8>(), dir in any::<u8>()) {
        let action = PlaceTrack { ride, x, y, z, piece_type: piece, direction: dir };
        prop_assert_eq!(through_registry(&registry(), &action), action);
    }

    #[test]
    fn remove_track_survives_the_wire(ride in arb_ride(), x in any::<i32>(), y in any::<i32>(), z in any::<i32>()) {
        let action = RemoveTrack { ride, x, y, z };
        prop_assert_eq!(through_registry(&registry(), &action), action);
    }

    #[test]
    fn create_ride_survives_the_wire(name in "\\PC{0,40}", kind in arb_kind()) {
        let action = CreateRide { name, kind };
        prop_assert_eq!(through_registry(&registry(), &action), action);
    }

    #[test]
    fn ride_status_survives_the_wire(ride in arb_ride(), status in arb_status()) {
        let action = SetRideStatus { ride, status };
        prop_assert_eq!(through_registry(&registry(), &action), action);
    }

    #[test]
    fn demolish_survives_the_wire(ride in arb_ride()) {
        let action = DemolishRide { ride };
        prop_assert_eq!(through_registry(&registry(), &action), action);
    }

    #[test]
    fn rename_survives_the_wire(guest in any::<u16>(), name in "\\PC{0,40}") {
        let action = RenameGuest { guest: EntityId(guest), name };
        prop_assert_eq!(through_registry(&registry(), &action), action);
    }

    #[test]
    fn spawn_guest_survives_the_wire(x in any::<i32>(), y in any::<i32>(), z in any::<i32>()) {
        let action = SpawnGuest { x, y, z };
        prop_assert_eq!(through_registry(&registry(), &action), action);
    }

    #[test]
    fn fee_survives_the_wire(fee in any::<i64>()) {
        let action = SetParkEntranceFee { fee };
        prop_assert_eq!(through_registry(&registry(), &action), action);
    }

    #[test]
    fn cheat_survives_the_wire(cheat in any::<u8>(), enabled in any::<bool>()) {
        let action = SetCheat { cheat, enabled };
        prop_assert_eq!(through_registry(&registry(), &action), action);
    }
}

#[test]
fn pause_toggle_survives_the_wire() {
    assert_eq!(through_registry(&registry(), &PauseToggle), PauseToggle);
}
