//! Players: per-session character state, progression, and the roster of
//! everyone online.
//!
//! Each connection owns an `Arc<Player>`: an outbound line channel (the
//! send capability, a non-blocking push, so a stuck client only ever backs
//! up its own writer task) plus the mutable character state behind its own
//! mutex. The roster is the process-wide player-set lock; broadcasts
//! snapshot recipients under it and send after releasing it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use emberio::color;

use crate::db::CharacterRecord;
use crate::stats::{Attributes, Class, Race};
use crate::world::{InstanceId, RoomId};

/// XP needed to clear the given level.
pub fn next_level_xp(level: i32) -> i64 {
    (level as i64) * 1000 + (level as i64 - 1) * 500
}

/// Display-only combat stats, recomputed from attributes and level.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Derived {
    pub hit: f64,
    pub evasion: f64,
    pub crit: f64,
    pub crit_damage: f64,
    pub attack_speed: f64,
    pub cast_speed: f64,
}

impl Derived {
    pub fn compute(attrs: &Attributes, level: i32) -> Derived {
        let (s, d, i, w, p) = (
            attrs.str_ as f64,
            attrs.dex as f64,
            attrs.intl as f64,
            attrs.wis as f64,
            attrs.pre as f64,
        );
        let lvl = level as f64;
        Derived {
            hit: 50.0 + d * 1.5 + w * 0.5 + lvl * 0.5,
            evasion: d * 1.8 + w * 0.2 - lvl * 0.3,
            crit: d * 0.5 + p * 0.7 + lvl * 0.2,
            crit_damage: 150.0 + s * 1.2 + w * 0.5,
            attack_speed: 100.0 + d * 1.5 + s * 0.5,
            cast_speed: 100.0 + i * 1.3 + w * 0.8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LevelUp {
    pub level: i32,
    pub hp_gain: i32,
    pub mp_gain: i32,
}

#[derive(Debug)]
pub struct PlayerState {
    pub race: Race,
    pub class: Class,
    pub title: String,
    pub attrs: Attributes,
    pub level: i32,
    pub xp: i64,
    pub next_level_xp: i64,
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub stamina: i32,
    pub max_stamina: i32,
    pub gold: i64,
    pub room_id: RoomId,
    pub in_combat: bool,
    pub target: Option<InstanceId>,
    pub dead: bool,
    pub last_command: String,
    pub derived: Derived,
}

impl PlayerState {
    pub fn from_record(rec: &CharacterRecord) -> Self {
        let mut state = Self {
            race: rec.race,
            class: rec.class,
            title: rec.title.clone(),
            attrs: rec.attrs,
            level: rec.level,
            xp: rec.xp,
            next_level_xp: rec.next_level_xp,
            hp: rec.hp,
            max_hp: rec.max_hp,
            mp: rec.mp,
            max_mp: rec.max_mp,
            stamina: rec.stamina,
            max_stamina: rec.max_stamina,
            gold: rec.gold,
            room_id: rec.room_id,
            in_combat: false,
            target: None,
            dead: false,
            last_command: String::new(),
            derived: Derived::default(),
        };
        state.update_derived();
        state
    }

    pub fn update_derived(&mut self) {
        self.derived = Derived::compute(&self.attrs, self.level);
    }

    pub fn is_in_combat(&self) -> bool {
        self.in_combat && self.target.is_some()
    }

    pub fn enter_combat(&mut self, target: InstanceId) {
        self.in_combat = true;
        self.target = Some(target);
    }

    pub fn exit_combat(&mut self) {
        self.in_combat = false;
        self.target = None;
    }

    /// Add experience and drain any level-ups, carrying overflow. Each
    /// level raises the pools and fully restores them.
    pub fn gain_xp(&mut self, amount: i64) -> Vec<LevelUp> {
        self.xp += amount;

        let mut ups = Vec::new();
        while self.xp >= self.next_level_xp {
            self.xp -= self.next_level_xp;
            self.level += 1;
            self.next_level_xp = next_level_xp(self.level);

            let hp_gain = self.attrs.con * 5 + 10;
            let mp_gain = (self.attrs.intl + self.attrs.wis) * 3 + 8;
            self.max_hp += hp_gain;
            self.max_mp += mp_gain;
            self.hp = self.max_hp;
            self.mp = self.max_mp;

            ups.push(LevelUp {
                level: self.level,
                hp_gain,
                mp_gain,
            });
        }
        if !ups.is_empty() {
            self.update_derived();
        }
        ups
    }

    /// One regeneration tick. Does nothing for the dead.
    pub fn regen_tick(&mut self) {
        if self.hp <= 0 || self.dead {
            return;
        }
        let hp_regen = (self.attrs.con / 2).max(1);
        let mp_regen = ((self.attrs.intl + self.attrs.wis) / 4).max(1);
        self.hp = (self.hp + hp_regen).min(self.max_hp);
        self.mp = (self.mp + mp_regen).min(self.max_mp);
        self.stamina = (self.stamina + 10).min(self.max_stamina);
    }

    /// The stat prompt, colorized by health band.
    pub fn prompt(&self) -> String {
        let text = format!(
            "[HP: {}/{} | MP: {}/{} | ST: {}/{}]> ",
            self.hp, self.max_hp, self.mp, self.max_mp, self.stamina, self.max_stamina
        );
        let band = self.hp as f64 / self.max_hp.max(1) as f64;
        let code = if band < 0.3 {
            "{R}"
        } else if band < 0.6 {
            "{Y}"
        } else {
            "{G}"
        };
        format!("{code}{text}{{x}}")
    }
}

pub struct Player {
    pub name: String,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    color: AtomicBool,
    pub state: Mutex<PlayerState>,
}

impl Player {
    pub fn new(name: String, tx: mpsc::UnboundedSender<Vec<u8>>, state: PlayerState, color: bool) -> Self {
        Self {
            name,
            tx,
            color: AtomicBool::new(color),
            state: Mutex::new(state),
        }
    }

    pub fn color_enabled(&self) -> bool {
        self.color.load(Ordering::Relaxed)
    }

    pub fn set_color(&self, enabled: bool) {
        self.color.store(enabled, Ordering::Relaxed);
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, PlayerState> {
        self.state.lock().expect("player state lock")
    }

    pub fn room_id(&self) -> RoomId {
        self.lock().room_id
    }

    /// Send one message line: color tokens processed per the player's
    /// preference, line ending appended when absent. Never blocks.
    pub fn send(&self, message: &str) {
        if message.is_empty() {
            return;
        }
        let mut out = color::process(message, self.color_enabled());
        if !out.ends_with("\r\n") {
            out.push_str("\r\n");
        }
        let _ = self.tx.send(out.into_bytes());
    }

    /// Send without adding a line ending (prompts are inline).
    pub fn send_inline(&self, message: &str) {
        let out = color::process(message, self.color_enabled());
        let _ = self.tx.send(out.into_bytes());
    }

    pub fn send_prompt(&self) {
        let prompt = self.lock().prompt();
        self.send_inline(&prompt);
    }
}

/// The active-player index. One of the two process-wide locks; held only
/// long enough to mutate the map or snapshot recipients.
#[derive(Default)]
pub struct Roster {
    inner: Mutex<HashMap<String, Arc<Player>>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, player: Arc<Player>) {
        let mut map = self.inner.lock().expect("roster lock");
        map.insert(player.name.clone(), player);
    }

    pub fn remove(&self, name: &str) {
        let mut map = self.inner.lock().expect("roster lock");
        map.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().expect("roster lock").contains_key(name)
    }

    pub fn snapshot(&self) -> Vec<Arc<Player>> {
        let map = self.inner.lock().expect("roster lock");
        map.values().cloned().collect()
    }

    /// Everyone in `room` except `exclude`, snapshotted outside the lock's
    /// critical section for the room check.
    pub fn players_in_room(&self, room: RoomId, exclude: Option<&str>) -> Vec<Arc<Player>> {
        self.snapshot()
            .into_iter()
            .filter(|p| exclude != Some(p.name.as_str()) && p.room_id() == room)
            .collect()
    }

    pub fn broadcast_room(&self, room: RoomId, exclude: Option<&str>, message: &str) {
        for p in self.players_in_room(room, exclude) {
            p.send(message);
        }
    }

    pub fn broadcast_all(&self, exclude: Option<&str>, message: &str) {
        for p in self.snapshot() {
            if exclude != Some(p.name.as_str()) {
                p.send(message);
            }
        }
    }
}
