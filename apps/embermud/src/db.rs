//! Durable character records.
//!
//! One SQLite file, one `players` table. The schema evolves by additive
//! columns only: on open the base table is created if absent and every
//! column the current build knows about is added when missing, so a
//! database written by an older build keeps working.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};

use crate::stats::{Attributes, Class, Race};
use crate::world::RoomId;

/// Everything the store knows about one character.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterRecord {
    pub name: String,
    pub race: Race,
    pub class: Class,
    pub title: String,
    pub room_id: RoomId,
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
    pub color_enabled: bool,
}

pub struct CharacterStore {
    conn: Mutex<Connection>,
}

// Columns added after the original release; each is checked and added
// idempotently on open.
const EVOLVED_COLUMNS: [(&str, &str); 12] = [
    ("title", "TEXT"),
    ("level", "INTEGER NOT NULL DEFAULT 1"),
    ("xp", "INTEGER"),
    ("next_level_xp", "INTEGER"),
    ("hp", "INTEGER"),
    ("max_hp", "INTEGER"),
    ("mp", "INTEGER"),
    ("max_mp", "INTEGER"),
    ("stamina", "INTEGER"),
    ("max_stamina", "INTEGER"),
    ("gold", "INTEGER"),
    ("color_enabled", "INTEGER NOT NULL DEFAULT 1"),
];

impl CharacterStore {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("open character db {}", path.as_ref().display()))?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                race TEXT NOT NULL,
                class TEXT NOT NULL,
                room_id INTEGER NOT NULL DEFAULT 3001,
                str INTEGER NOT NULL DEFAULT 10,
                dex INTEGER NOT NULL DEFAULT 10,
                con INTEGER NOT NULL DEFAULT 10,
                int INTEGER NOT NULL DEFAULT 10,
                wis INTEGER NOT NULL DEFAULT 10,
                pre INTEGER NOT NULL DEFAULT 10
            );
            "#,
        )
        .context("create players table")?;

        for (name, def) in EVOLVED_COLUMNS {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM pragma_table_info('players') WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )?;
            if exists == 0 {
                conn.execute(&format!("ALTER TABLE players ADD COLUMN {name} {def}"), [])
                    .with_context(|| format!("add column {name}"))?;
                tracing::info!(column = name, "added players column");
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        let conn = self.conn.lock().expect("db mutex");
        conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM players WHERE name = ?1)",
            params![name],
            |row| row.get::<_, bool>(0),
        )
        .unwrap_or(false)
    }

    /// Insert a fresh character: title "the Newbie", the configured respawn
    /// room, level 1, 0 xp toward a 1000-xp first level, every pool at
    /// 100/100, color on. Pools are reshaped by the creation flow right
    /// after this via `update_pools`.
    pub fn create(
        &self,
        name: &str,
        race: Race,
        class: Class,
        attrs: &Attributes,
        start_room: RoomId,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("db mutex");
        conn.execute(
            r#"
            INSERT INTO players (
                name, race, class, title, room_id,
                str, dex, con, int, wis, pre,
                level, xp, next_level_xp,
                hp, max_hp, mp, max_mp, stamina, max_stamina,
                gold, color_enabled
            )
            VALUES (?1, ?2, ?3, 'the Newbie', ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                    1, 0, 1000, 100, 100, 100, 100, 100, 100, 0, 1)
            "#,
            params![
                name,
                race.as_str(),
                class.as_str(),
                start_room.0,
                attrs.str_,
                attrs.dex,
                attrs.con,
                attrs.intl,
                attrs.wis,
                attrs.pre,
            ],
        )
        .with_context(|| format!("create character {name}"))?;
        Ok(())
    }

    pub fn load(&self, name: &str) -> anyhow::Result<Option<CharacterRecord>> {
        let conn = self.conn.lock().expect("db mutex");
        let rec = conn
            .query_row(
                r#"
                SELECT name, race, class, COALESCE(title, ''), room_id,
                       str, dex, con, int, wis, pre,
                       level, COALESCE(xp, 0), COALESCE(next_level_xp, 1000),
                       COALESCE(hp, 100), COALESCE(max_hp, 100),
                       COALESCE(mp, 100), COALESCE(max_mp, 100),
                       COALESCE(stamina, 100), COALESCE(max_stamina, 100),
                       COALESCE(gold, 0), COALESCE(color_enabled, 1)
                FROM players WHERE name = ?1
                "#,
                params![name],
                |row| {
                    Ok(RawRecord {
                        name: row.get(0)?,
                        race: row.get(1)?,
                        class: row.get(2)?,
                        title: row.get(3)?,
                        room_id: row.get(4)?,
                        attrs: [
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                            row.get(8)?,
                            row.get(9)?,
                            row.get(10)?,
                        ],
                        level: row.get(11)?,
                        xp: row.get(12)?,
                        next_level_xp: row.get(13)?,
                        hp: row.get(14)?,
                        max_hp: row.get(15)?,
                        mp: row.get(16)?,
                        max_mp: row.get(17)?,
                        stamina: row.get(18)?,
                        max_stamina: row.get(19)?,
                        gold: row.get(20)?,
                        color_enabled: row.get(21)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("load character {name}"))?;

        rec.map(RawRecord::decode).transpose()
    }

    pub fn update_room(&self, name: &str, room_id: RoomId) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("db mutex");
        conn.execute(
            "UPDATE players SET room_id = ?1 WHERE name = ?2",
            params![room_id.0, name],
        )?;
        Ok(())
    }

    pub fn update_level(&self, name: &str, level: i32, xp: i64, next_xp: i64) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("db mutex");
        conn.execute(
            "UPDATE players SET level = ?1, xp = ?2, next_level_xp = ?3 WHERE name = ?4",
            params![level, xp, next_xp, name],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_pools(
        &self,
        name: &str,
        hp: i32,
        max_hp: i32,
        mp: i32,
        max_mp: i32,
        stamina: i32,
        max_stamina: i32,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("db mutex");
        conn.execute(
            "UPDATE players SET hp = ?1, max_hp = ?2, mp = ?3, max_mp = ?4, \
             stamina = ?5, max_stamina = ?6 WHERE name = ?7",
            params![hp, max_hp, mp, max_mp, stamina, max_stamina, name],
        )?;
        Ok(())
    }

    pub fn update_attributes(&self, name: &str, attrs: &Attributes) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("db mutex");
        conn.execute(
            "UPDATE players SET str = ?1, dex = ?2, con = ?3, int = ?4, wis = ?5, pre = ?6 \
             WHERE name = ?7",
            params![
                attrs.str_,
                attrs.dex,
                attrs.con,
                attrs.intl,
                attrs.wis,
                attrs.pre,
                name
            ],
        )?;
        Ok(())
    }

    pub fn update_title(&self, name: &str, title: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("db mutex");
        conn.execute(
            "UPDATE players SET title = ?1 WHERE name = ?2",
            params![title, name],
        )?;
        Ok(())
    }

    pub fn update_color(&self, name: &str, enabled: bool) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("db mutex");
        conn.execute(
            "UPDATE players SET color_enabled = ?1 WHERE name = ?2",
            params![enabled, name],
        )?;
        Ok(())
    }

    pub fn update_gold(&self, name: &str, gold: i64) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("db mutex");
        conn.execute(
            "UPDATE players SET gold = ?1 WHERE name = ?2",
            params![gold, name],
        )?;
        Ok(())
    }
}

struct RawRecord {
    name: String,
    race: String,
    class: String,
    title: String,
    room_id: i64,
    attrs: [i32; 6],
    level: i32,
    xp: i64,
    next_level_xp: i64,
    hp: i32,
    max_hp: i32,
    mp: i32,
    max_mp: i32,
    stamina: i32,
    max_stamina: i32,
    gold: i64,
    color_enabled: i64,
}

impl RawRecord {
    fn decode(self) -> anyhow::Result<CharacterRecord> {
        let race = Race::parse(&self.race)
            .with_context(|| format!("unknown race '{}' for {}", self.race, self.name))?;
        let class = Class::parse(&self.class)
            .with_context(|| format!("unknown class '{}' for {}", self.class, self.name))?;
        let [s, d, c, i, w, p] = self.attrs;
        Ok(CharacterRecord {
            name: self.name,
            race,
            class,
            title: self.title,
            room_id: RoomId(self.room_id),
            attrs: Attributes::new(s, d, c, i, w, p),
            level: self.level,
            xp: self.xp,
            next_level_xp: self.next_level_xp,
            hp: self.hp,
            max_hp: self.max_hp,
            mp: self.mp,
            max_mp: self.max_mp,
            stamina: self.stamina,
            max_stamina: self.max_stamina,
            gold: self.gold,
            color_enabled: self.color_enabled != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(name: &str) -> CharacterStore {
        let store = CharacterStore::open_in_memory().unwrap();
        let attrs = Race::Elf.base_attributes();
        store
            .create(name, Race::Elf, Class::Mage, &attrs, RoomId(3001))
            .unwrap();
        store
    }

    #[test]
    fn create_then_load_round_trips() {
        let store = store_with("Ada");
        assert!(store.exists("Ada"));
        assert!(!store.exists("ada")); // names are case-sensitive
        assert!(!store.exists("Bob"));

        let rec = store.load("Ada").unwrap().unwrap();
        assert_eq!(rec.race, Race::Elf);
        assert_eq!(rec.class, Class::Mage);
        assert_eq!(rec.title, "the Newbie");
        assert_eq!(rec.room_id, RoomId(3001));
        assert_eq!(rec.level, 1);
        assert_eq!(rec.xp, 0);
        assert_eq!(rec.next_level_xp, 1000);
        assert_eq!((rec.hp, rec.max_hp), (100, 100));
        assert!(rec.color_enabled);
        assert_eq!(rec.gold, 0);
    }

    #[test]
    fn load_missing_is_none() {
        let store = CharacterStore::open_in_memory().unwrap();
        assert!(store.load("Nobody").unwrap().is_none());
    }

    #[test]
    fn update_room_round_trips() {
        let store = store_with("Ada");
        store.update_room("Ada", RoomId(3054)).unwrap();
        let rec = store.load("Ada").unwrap().unwrap();
        assert_eq!(rec.room_id, RoomId(3054));
    }

    #[test]
    fn updates_cover_every_progression_field() {
        let store = store_with("Ada");
        store.update_level("Ada", 3, 250, 4000).unwrap();
        store.update_pools("Ada", 23, 46, 40, 46, 90, 100).unwrap();
        store
            .update_attributes("Ada", &Attributes::new(8, 13, 9, 14, 11, 10))
            .unwrap();
        store.update_title("Ada", "the Arcane").unwrap();
        store.update_color("Ada", false).unwrap();
        store.update_gold("Ada", 15).unwrap();

        let rec = store.load("Ada").unwrap().unwrap();
        assert_eq!((rec.level, rec.xp, rec.next_level_xp), (3, 250, 4000));
        assert_eq!((rec.hp, rec.max_hp), (23, 46));
        assert_eq!(rec.attrs.dex, 13);
        assert_eq!(rec.title, "the Arcane");
        assert!(!rec.color_enabled);
        assert_eq!(rec.gold, 15);
    }

    #[test]
    fn old_databases_gain_missing_columns() {
        // A database from before the progression columns existed.
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE players (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                race TEXT NOT NULL,
                class TEXT NOT NULL,
                room_id INTEGER NOT NULL DEFAULT 3001,
                str INTEGER NOT NULL DEFAULT 10,
                dex INTEGER NOT NULL DEFAULT 10,
                con INTEGER NOT NULL DEFAULT 10,
                int INTEGER NOT NULL DEFAULT 10,
                wis INTEGER NOT NULL DEFAULT 10,
                pre INTEGER NOT NULL DEFAULT 10
            );
            INSERT INTO players (name, race, class) VALUES ('Old', 'Dwarf', 'Warrior');
            "#,
        )
        .unwrap();

        let store = CharacterStore::from_connection(conn).unwrap();
        let rec = store.load("Old").unwrap().unwrap();
        // Missing optional columns degrade to defaults rather than failing.
        assert_eq!(rec.gold, 0);
        assert_eq!(rec.title, "");
        assert_eq!(rec.level, 1);
        assert!(rec.color_enabled);

        // Opening again is idempotent.
        store.update_gold("Old", 7).unwrap();
        assert_eq!(store.load("Old").unwrap().unwrap().gold, 7);
    }
}
