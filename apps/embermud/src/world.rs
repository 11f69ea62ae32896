//! In-memory world state.
//!
//! Room and exit topology is immutable once loaded; the only runtime
//! mutations are door open/close (an atomic bool per door side) and the
//! mob indexes behind the world-entity lock: instance registry, per-room
//! occupancy, and per-template world counts. Those three are kept
//! consistent together; the sum of a template's occupancy entries always
//! equals its world count.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(pub i64);

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Down,
    East,
    North,
    South,
    Up,
    West,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::Up,
        Direction::Down,
    ];

    /// Parse a full direction name or its one-letter shorthand.
    pub fn parse(s: &str) -> Option<Direction> {
        match s.trim().to_ascii_lowercase().as_str() {
            "north" | "n" => Some(Direction::North),
            "south" | "s" => Some(Direction::South),
            "east" | "e" => Some(Direction::East),
            "west" | "w" => Some(Direction::West),
            "up" | "u" => Some(Direction::Up),
            "down" | "d" => Some(Direction::Down),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

/// Paired door state on an exit. `closed` flips at runtime (plain boolean
/// writes, relaxed ordering; the reset pass re-synchronizes both sides and
/// is idempotent); `locked` is fixed after the load-time coherence pass.
#[derive(Debug)]
pub struct Door {
    pub short_description: String,
    pub keywords: Vec<String>,
    pub locked: bool,
    closed: AtomicBool,
}

impl Door {
    pub fn new(short_description: String, keywords: Vec<String>, locked: bool, closed: bool) -> Self {
        Self {
            short_description,
            keywords,
            locked,
            closed: AtomicBool::new(closed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    pub fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::Relaxed);
    }

    pub fn matches_keyword(&self, word: &str) -> bool {
        self.keywords.iter().any(|k| k.eq_ignore_ascii_case(word))
    }
}

impl Clone for Door {
    fn clone(&self) -> Self {
        Self {
            short_description: self.short_description.clone(),
            keywords: self.keywords.clone(),
            locked: self.locked,
            closed: AtomicBool::new(self.is_closed()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Exit {
    pub to: RoomId,
    pub description: Option<String>,
    pub door: Option<Door>,
}

#[derive(Debug, Clone)]
pub struct EnvAttr {
    pub keywords: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub description: String,
    pub area: String,
    pub exits: HashMap<Direction, Exit>,
    pub environment: Vec<EnvAttr>,
    pub no_wandering: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toughness {
    Easy,
    Medium,
    Hard,
    Savage,
    Boss,
    God,
}

impl Toughness {
    /// Unknown tags fall back to medium.
    pub fn parse(s: &str) -> Toughness {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Toughness::Easy,
            "hard" => Toughness::Hard,
            "savage" => Toughness::Savage,
            "boss" => Toughness::Boss,
            "god" => Toughness::God,
            _ => Toughness::Medium,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Toughness::Easy => "easy",
            Toughness::Medium => "medium",
            Toughness::Hard => "hard",
            Toughness::Savage => "savage",
            Toughness::Boss => "boss",
            Toughness::God => "god",
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            Toughness::Easy => 0.8,
            Toughness::Medium => 1.0,
            Toughness::Hard => 1.2,
            Toughness::Savage => 1.5,
            Toughness::Boss => 2.0,
            Toughness::God => 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MobTemplate {
    pub id: TemplateId,
    pub keywords: Vec<String>,
    pub short_description: String,
    pub long_description: String,
    pub description: String,
    pub race: String,
    pub level: i32,
    pub toughness: Toughness,
    pub wandering: bool,
}

impl MobTemplate {
    pub fn max_hp(&self) -> i32 {
        (self.level as f64 * 10.0 * self.toughness.multiplier()) as i32
    }
}

/// A realized mob. The template is shared immutably; the instance owns its
/// own health and location.
#[derive(Debug, Clone)]
pub struct MobInstance {
    pub id: InstanceId,
    pub template: Arc<MobTemplate>,
    pub hp: i32,
    pub max_hp: i32,
    pub room_id: RoomId,
    pub home_area: String,
}

/// Declarative population target for the reset sweep.
#[derive(Debug, Clone)]
pub struct ResetRule {
    pub template: TemplateId,
    pub room: RoomId,
    pub room_limit: usize,
    pub world_limit: usize,
}

#[derive(Debug, Default)]
pub struct MobState {
    pub templates: HashMap<TemplateId, Arc<MobTemplate>>,
    instances: HashMap<InstanceId, MobInstance>,
    room_mobs: HashMap<RoomId, Vec<InstanceId>>,
    world_counts: HashMap<TemplateId, usize>,
    next_instance_id: u64,
}

impl MobState {
    pub fn instance(&self, id: InstanceId) -> Option<&MobInstance> {
        self.instances.get(&id)
    }

    pub fn instance_ids(&self) -> Vec<InstanceId> {
        self.instances.keys().copied().collect()
    }

    pub fn world_count(&self, template: TemplateId) -> usize {
        self.world_counts.get(&template).copied().unwrap_or(0)
    }

    pub fn room_instance_ids(&self, room: RoomId) -> &[InstanceId] {
        self.room_mobs.get(&room).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count_in_room(&self, room: RoomId, template: TemplateId) -> usize {
        self.room_instance_ids(room)
            .iter()
            .filter_map(|id| self.instances.get(id))
            .filter(|m| m.template.id == template)
            .count()
    }

    /// Create an instance in a room. Bookkeeping only; population limits
    /// are the reset sweep's business.
    pub fn spawn(&mut self, template: &Arc<MobTemplate>, room: &Room) -> InstanceId {
        self.next_instance_id += 1;
        let id = InstanceId(self.next_instance_id);
        let max_hp = template.max_hp();
        self.instances.insert(
            id,
            MobInstance {
                id,
                template: Arc::clone(template),
                hp: max_hp,
                max_hp,
                room_id: room.id,
                home_area: room.area.clone(),
            },
        );
        *self.world_counts.entry(template.id).or_insert(0) += 1;
        self.room_mobs.entry(room.id).or_default().push(id);
        id
    }

    /// Destroy an instance: out of occupancy and the world count, then out
    /// of the registry.
    pub fn remove(&mut self, id: InstanceId) -> Option<MobInstance> {
        let mob = self.instances.remove(&id)?;
        if let Some(list) = self.room_mobs.get_mut(&mob.room_id) {
            list.retain(|x| *x != id);
            if list.is_empty() {
                self.room_mobs.remove(&mob.room_id);
            }
        }
        let count = self.world_counts.entry(mob.template.id).or_insert(0);
        *count = count.saturating_sub(1);
        Some(mob)
    }

    /// Relocate an instance: occupancy of both rooms plus the instance's
    /// room pointer. World counts are untouched.
    pub fn relocate(&mut self, id: InstanceId, to: RoomId) -> Option<(RoomId, RoomId)> {
        let mob = self.instances.get_mut(&id)?;
        let from = mob.room_id;
        mob.room_id = to;
        if let Some(list) = self.room_mobs.get_mut(&from) {
            list.retain(|x| *x != id);
            if list.is_empty() {
                self.room_mobs.remove(&from);
            }
        }
        self.room_mobs.entry(to).or_default().push(id);
        Some((from, to))
    }

    /// Apply damage; returns the remaining hp, clamped at zero.
    pub fn damage(&mut self, id: InstanceId, amount: i32) -> Option<i32> {
        let mob = self.instances.get_mut(&id)?;
        mob.hp = (mob.hp - amount).max(0);
        Some(mob.hp)
    }
}

/// Notice produced by a coherent door mutation: one per room whose
/// occupants should hear about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoorSideNotice {
    pub room: RoomId,
    pub door_description: String,
}

pub struct World {
    rooms: HashMap<RoomId, Room>,
    resets: Vec<ResetRule>,
    mobs: RwLock<MobState>,
}

impl World {
    pub fn new(
        rooms: HashMap<RoomId, Room>,
        templates: HashMap<TemplateId, Arc<MobTemplate>>,
        resets: Vec<ResetRule>,
    ) -> Self {
        let state = MobState {
            templates,
            ..MobState::default()
        };
        Self {
            rooms,
            resets,
            mobs: RwLock::new(state),
        }
    }

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    pub fn has_room(&self, id: RoomId) -> bool {
        self.rooms.contains_key(&id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn resets(&self) -> &[ResetRule] {
        &self.resets
    }

    pub fn mobs(&self) -> std::sync::RwLockReadGuard<'_, MobState> {
        self.mobs.read().expect("world-entity lock")
    }

    pub fn mobs_mut(&self) -> std::sync::RwLockWriteGuard<'_, MobState> {
        self.mobs.write().expect("world-entity lock")
    }

    /// Snapshot of the mobs currently in a room.
    pub fn mobs_in_room(&self, room: RoomId) -> Vec<MobInstance> {
        let state = self.mobs();
        state
            .room_instance_ids(room)
            .iter()
            .filter_map(|id| state.instance(*id).cloned())
            .collect()
    }

    /// Resolve a player's target phrase to a mob in the room.
    ///
    /// `2.guard` picks the second keyword-or-substring match; otherwise an
    /// exact keyword match wins, then a case-insensitive substring of the
    /// short description.
    pub fn find_mob_in_room(&self, room: RoomId, query: &str) -> Option<MobInstance> {
        let query = query.trim().to_ascii_lowercase();
        if query.is_empty() {
            return None;
        }

        let mobs = self.mobs_in_room(room);
        if mobs.is_empty() {
            return None;
        }

        if let Some((index, keyword)) = parse_numeric_prefix(&query) {
            let mut matches: Vec<&MobInstance> = mobs
                .iter()
                .filter(|m| m.template.keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword)))
                .collect();
            if matches.is_empty() {
                matches = mobs
                    .iter()
                    .filter(|m| m.template.short_description.to_ascii_lowercase().contains(keyword))
                    .collect();
            }
            return matches.get(index - 1).map(|m| (*m).clone());
        }

        if let Some(m) = mobs.iter().find(|m| {
            m.template.keywords.iter().any(|k| k.eq_ignore_ascii_case(&query))
                || m.template.short_description.eq_ignore_ascii_case(&query)
        }) {
            return Some(m.clone());
        }

        mobs.iter()
            .find(|m| m.template.short_description.to_ascii_lowercase().contains(&query))
            .cloned()
    }

    /// Coherent two-sided door mutation.
    ///
    /// Sets the local side, then the mirror door on the destination's
    /// reverse exit, and reports the rooms whose occupants should be told.
    /// A missing reverse door is a warning, not a failure.
    pub fn set_door(&self, room: RoomId, dir: Direction, closed: bool) -> Vec<DoorSideNotice> {
        let mut notices = Vec::new();

        let Some(exit) = self.rooms.get(&room).and_then(|r| r.exits.get(&dir)) else {
            return notices;
        };
        let Some(door) = exit.door.as_ref() else {
            return notices;
        };

        door.set_closed(closed);
        notices.push(DoorSideNotice {
            room,
            door_description: door.short_description.clone(),
        });

        let reverse = self
            .rooms
            .get(&exit.to)
            .and_then(|r| r.exits.get(&dir.opposite()))
            .and_then(|e| e.door.as_ref());
        match reverse {
            Some(far_door) => {
                far_door.set_closed(closed);
                notices.push(DoorSideNotice {
                    room: exit.to,
                    door_description: far_door.short_description.clone(),
                });
            }
            None => {
                tracing::warn!(room = %room, dir = dir.as_str(), "door has no reverse side");
            }
        }

        notices
    }
}

/// Split `"2.guard"` into (2, "guard"). A prefix below 1 is not a match.
fn parse_numeric_prefix(query: &str) -> Option<(usize, &str)> {
    let (num, rest) = query.split_once('.')?;
    let index: usize = num.parse().ok()?;
    if index < 1 || rest.is_empty() {
        return None;
    }
    Some((index, rest))
}
