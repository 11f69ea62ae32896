//! Shared server context.
//!
//! One value owns the world, the roster, the character store, the help
//! catalog, and the world RNG; every component receives an `Arc<Ctx>`
//! explicitly rather than reaching for globals.

use std::sync::{Arc, Mutex};

use crate::db::CharacterStore;
use crate::help::HelpSystem;
use crate::player::Roster;
use crate::rng::Rng64;
use crate::world::{RoomId, World};

pub struct Ctx {
    pub world: World,
    pub roster: Roster,
    pub store: CharacterStore,
    pub help: HelpSystem,
    pub respawn_room: RoomId,
    rng: Mutex<Rng64>,
}

impl Ctx {
    pub fn new(
        world: World,
        store: CharacterStore,
        help: HelpSystem,
        respawn_room: RoomId,
        rng: Rng64,
    ) -> Arc<Self> {
        Arc::new(Self {
            world,
            roster: Roster::new(),
            store,
            help,
            respawn_room,
            rng: Mutex::new(rng),
        })
    }

    /// Run a closure against the world RNG.
    pub fn with_rng<T>(&self, f: impl FnOnce(&mut Rng64) -> T) -> T {
        let mut rng = self.rng.lock().expect("rng lock");
        f(&mut rng)
    }
}

#[cfg(test)]
pub(crate) fn test_ctx(world: World, seed: u64) -> Arc<Ctx> {
    Ctx::new(
        world,
        CharacterStore::open_in_memory().expect("in-memory store"),
        HelpSystem::empty(),
        RoomId(3001),
        Rng64::from_seed(seed),
    )
}
