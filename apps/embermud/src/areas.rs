//! Area file loading.
//!
//! One YAML document per area: rooms, mob templates, and reset rules. Exit
//! destinations are a bare integer for same-area rooms or `"file:id"` for
//! cross-area references; both resolve to a plain `RoomId` here, so no
//! union type reaches the runtime. After every area is parsed a coherence
//! pass repairs half-specified doors: a door with no reverse exit gets one
//! created, a reverse exit with no door gets a mirror, and mismatched
//! states are forced equal. Repairs are warnings; only an unreadable file
//! is fatal.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use crate::world::{
    Direction, Door, EnvAttr, Exit, MobTemplate, ResetRule, Room, RoomId, TemplateId, Toughness,
};

#[derive(Debug, Deserialize)]
struct AreaFile {
    #[allow(dead_code)]
    name: Option<String>,
    #[serde(default)]
    rooms: HashMap<i64, RoomDef>,
    #[serde(default)]
    mobiles: HashMap<i64, MobDef>,
    #[serde(default)]
    mob_resets: Vec<ResetDef>,
}

#[derive(Debug, Deserialize)]
struct RoomDef {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    exits: HashMap<String, ExitDef>,
    #[serde(default)]
    environment: Vec<EnvDef>,
    #[serde(default)]
    no_wandering: bool,
}

#[derive(Debug, Deserialize)]
struct ExitDef {
    id: RawTarget,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    door: Option<DoorDef>,
}

/// Bare integer (same area) or `"file:id"` (cross area).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTarget {
    Local(i64),
    Qualified(String),
}

#[derive(Debug, Deserialize)]
struct DoorDef {
    short_description: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    locked: bool,
    /// A door that exists defaults to closed.
    #[serde(default)]
    closed: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct EnvDef {
    keywords: Vec<String>,
    description: String,
}

#[derive(Debug, Deserialize)]
struct MobDef {
    #[serde(default)]
    keywords: Vec<String>,
    short_description: String,
    #[serde(default)]
    long_description: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    race: String,
    level: i32,
    #[serde(default)]
    toughness: Option<String>,
    #[serde(default)]
    wandering: bool,
}

#[derive(Debug, Deserialize)]
struct ResetDef {
    mob_vnum: i64,
    room_vnum: i64,
    #[serde(default = "default_room_limit")]
    limit: usize,
    #[serde(default = "default_world_limit")]
    max_world: usize,
    #[allow(dead_code)]
    #[serde(default)]
    comment: Option<String>,
}

fn default_room_limit() -> usize {
    5
}

fn default_world_limit() -> usize {
    20
}

/// Everything the world is built from.
pub struct WorldData {
    pub rooms: HashMap<RoomId, Room>,
    pub templates: HashMap<TemplateId, Arc<MobTemplate>>,
    pub resets: Vec<ResetRule>,
}

/// Load every `.yml` file in the areas directory.
pub fn load_dir(dir: impl AsRef<Path>) -> anyhow::Result<WorldData> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("read areas directory {}", dir.display()))?;

    let mut parsed = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if path.extension().and_then(|e| e.to_str()) != Some("yml") {
            continue;
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("read area file {}", path.display()))?;
        let area: AreaFile = serde_yaml::from_str(&text)
            .with_context(|| format!("parse area file {}", path.display()))?;
        parsed.push((stem.to_string(), area));
    }

    parsed.sort_by(|a, b| a.0.cmp(&b.0));
    let data = assemble(parsed);
    tracing::info!(
        rooms = data.rooms.len(),
        templates = data.templates.len(),
        resets = data.resets.len(),
        "world loaded"
    );
    Ok(data)
}

/// Build world data from parsed `(area stem, file)` pairs and run the door
/// coherence pass.
fn assemble(areas: Vec<(String, AreaFile)>) -> WorldData {
    let mut rooms: HashMap<RoomId, Room> = HashMap::new();
    let mut templates: HashMap<TemplateId, Arc<MobTemplate>> = HashMap::new();
    let mut raw_resets: Vec<ResetDef> = Vec::new();

    for (stem, area) in areas {
        for (raw_id, def) in area.rooms {
            let id = RoomId(raw_id);
            let mut exits = HashMap::new();
            for (dir_name, exit) in def.exits {
                let Some(dir) = Direction::parse(&dir_name) else {
                    tracing::warn!(room = %id, dir = %dir_name, "unknown exit direction; dropped");
                    continue;
                };
                let to = match exit.id {
                    RawTarget::Local(n) => RoomId(n),
                    RawTarget::Qualified(ref q) => match parse_qualified(q) {
                        Some(n) => RoomId(n),
                        None => {
                            tracing::warn!(room = %id, target = %q, "bad cross-area exit; dropped");
                            continue;
                        }
                    },
                };
                exits.insert(
                    dir,
                    Exit {
                        to,
                        description: exit.description,
                        door: exit.door.map(|d| {
                            Door::new(
                                d.short_description,
                                d.keywords,
                                d.locked,
                                d.closed.unwrap_or(true),
                            )
                        }),
                    },
                );
            }

            rooms.insert(
                id,
                Room {
                    id,
                    name: def.name,
                    description: def.description.trim().to_string(),
                    area: stem.clone(),
                    exits,
                    environment: def
                        .environment
                        .into_iter()
                        .map(|e| EnvAttr {
                            keywords: e.keywords,
                            description: e.description.trim().to_string(),
                        })
                        .collect(),
                    no_wandering: def.no_wandering,
                },
            );
        }

        for (raw_id, def) in area.mobiles {
            let id = TemplateId(raw_id);
            templates.insert(
                id,
                Arc::new(MobTemplate {
                    id,
                    keywords: def.keywords,
                    short_description: def.short_description.trim().to_string(),
                    long_description: def.long_description.trim().to_string(),
                    description: def.description.trim().to_string(),
                    race: def.race,
                    level: def.level,
                    toughness: Toughness::parse(def.toughness.as_deref().unwrap_or("medium")),
                    wandering: def.wandering,
                }),
            );
        }

        raw_resets.extend(area.mob_resets);
    }

    drop_dangling_exits(&mut rooms);
    repair_doors(&mut rooms);

    let resets = raw_resets
        .into_iter()
        .filter_map(|r| {
            let template = TemplateId(r.mob_vnum);
            let room = RoomId(r.room_vnum);
            if !templates.contains_key(&template) {
                tracing::warn!(template = r.mob_vnum, "reset names unknown template; skipped");
                return None;
            }
            if !rooms.contains_key(&room) {
                tracing::warn!(room = r.room_vnum, "reset names unknown room; skipped");
                return None;
            }
            Some(ResetRule {
                template,
                room,
                room_limit: r.limit,
                world_limit: r.max_world,
            })
        })
        .collect();

    WorldData {
        rooms,
        templates,
        resets,
    }
}

fn parse_qualified(q: &str) -> Option<i64> {
    let (_area, id) = q.split_once(':')?;
    id.trim().parse().ok()
}

fn drop_dangling_exits(rooms: &mut HashMap<RoomId, Room>) {
    let known: std::collections::HashSet<RoomId> = rooms.keys().copied().collect();
    for room in rooms.values_mut() {
        let room_id = room.id;
        room.exits.retain(|dir, exit| {
            let ok = known.contains(&exit.to);
            if !ok {
                tracing::warn!(room = %room_id, dir = dir.as_str(), to = %exit.to,
                    "exit to unknown room; dropped");
            }
            ok
        });
    }
}

/// For every exit with a door, make the destination's reverse exit exist
/// and carry a door in the same state.
fn repair_doors(rooms: &mut HashMap<RoomId, Room>) {
    // Collect the edges first; applying them mutates other rooms. The
    // source door state is re-read live at apply time so earlier repairs
    // are not undone by stale snapshots.
    struct Edge {
        source: RoomId,
        dir: Direction,
        dest: RoomId,
        back: Direction,
    }

    let mut edges = Vec::new();
    for room in rooms.values() {
        for (dir, exit) in &room.exits {
            if exit.door.is_none() {
                continue;
            }
            edges.push(Edge {
                source: room.id,
                dir: *dir,
                dest: exit.to,
                back: dir.opposite(),
            });
        }
    }

    for edge in edges {
        let Some(source_room) = rooms.get(&edge.source) else {
            continue;
        };
        let source_name = source_room.name.clone();
        let Some(door) = source_room
            .exits
            .get(&edge.dir)
            .and_then(|e| e.door.as_ref())
            .map(Door::clone)
        else {
            continue;
        };

        let Some(dest) = rooms.get_mut(&edge.dest) else {
            continue;
        };
        match dest.exits.get_mut(&edge.back) {
            None => {
                tracing::warn!(
                    source = %edge.source, dest = %edge.dest,
                    "door with no exit back; adding reciprocal exit"
                );
                dest.exits.insert(
                    edge.back,
                    Exit {
                        to: edge.source,
                        description: Some(format!("You see {}.", source_name)),
                        door: Some(door),
                    },
                );
            }
            Some(back_exit) => match back_exit.door.as_ref() {
                None => {
                    tracing::warn!(
                        source = %edge.source, dest = %edge.dest,
                        "door with no door back; adding reciprocal door"
                    );
                    back_exit.door = Some(door);
                }
                Some(far_door) => {
                    if far_door.is_closed() != door.is_closed() || far_door.locked != door.locked {
                        tracing::warn!(
                            source = %edge.source, dest = %edge.dest,
                            "door state mismatch; forcing"
                        );
                        back_exit.door = Some(door);
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(stem: &str, yaml: &str) -> (String, AreaFile) {
        (stem.to_string(), serde_yaml::from_str(yaml).unwrap())
    }

    const MIDGAARD: &str = r#"
name: Midgaard
rooms:
  3001:
    name: The Temple
    description: |
      A quiet temple.
    no_wandering: true
    environment:
      - keywords: [altar]
        description: A worn stone altar.
    exits:
      north:
        id: 3002
        door:
          short_description: iron gate
          keywords: [gate]
      east:
        id: "eastwood:4001"
  3002:
    name: Gate Road
    description: A rutted road.
mobiles:
  9001:
    keywords: [guard]
    short_description: the cityguard
    long_description: A cityguard stands here.
    description: Scarred armor.
    race: human
    level: 3
    toughness: medium
    wandering: true
mob_resets:
  - mob_vnum: 9001
    room_vnum: 3002
    limit: 2
    max_world: 4
  - mob_vnum: 9999
    room_vnum: 3002
    limit: 1
    max_world: 1
"#;

    const EASTWOOD: &str = r#"
name: Eastwood
rooms:
  4001:
    name: Forest Edge
    description: Trees crowd in.
    exits:
      west:
        id: "midgaard:3001"
      south:
        id: 4999
"#;

    fn load_fixture() -> WorldData {
        assemble(vec![area("midgaard", MIDGAARD), area("eastwood", EASTWOOD)])
    }

    #[test]
    fn rooms_carry_area_and_flags() {
        let data = load_fixture();
        let temple = &data.rooms[&RoomId(3001)];
        assert_eq!(temple.area, "midgaard");
        assert!(temple.no_wandering);
        assert_eq!(temple.environment.len(), 1);
        assert_eq!(data.rooms[&RoomId(4001)].area, "eastwood");
    }

    #[test]
    fn cross_area_exits_resolve_to_plain_room_ids() {
        let data = load_fixture();
        let temple = &data.rooms[&RoomId(3001)];
        assert_eq!(temple.exits[&Direction::East].to, RoomId(4001));
        let forest = &data.rooms[&RoomId(4001)];
        assert_eq!(forest.exits[&Direction::West].to, RoomId(3001));
    }

    #[test]
    fn dangling_exits_are_dropped() {
        let data = load_fixture();
        let forest = &data.rooms[&RoomId(4001)];
        assert!(!forest.exits.contains_key(&Direction::South));
    }

    #[test]
    fn one_sided_door_gains_a_reciprocal_exit_and_door() {
        let data = load_fixture();
        // Gate Road declared no exits at all; the coherence pass adds the
        // way back through the gate.
        let road = &data.rooms[&RoomId(3002)];
        let back = road.exits.get(&Direction::South).expect("reciprocal exit");
        assert_eq!(back.to, RoomId(3001));
        let door = back.door.as_ref().expect("reciprocal door");
        assert_eq!(door.short_description, "iron gate");
        assert!(door.is_closed());
        assert!(!door.locked);
    }

    #[test]
    fn doors_default_to_closed() {
        let data = load_fixture();
        let temple = &data.rooms[&RoomId(3001)];
        assert!(temple.exits[&Direction::North].door.as_ref().unwrap().is_closed());
    }

    #[test]
    fn explicit_open_door_stays_open_on_both_sides() {
        let yaml = r#"
rooms:
  1:
    name: A
    exits:
      north:
        id: 2
        door:
          short_description: curtain
          closed: false
  2:
    name: B
"#;
        let data = assemble(vec![area("x", yaml)]);
        assert!(!data.rooms[&RoomId(1)].exits[&Direction::North].door.as_ref().unwrap().is_closed());
        let back = &data.rooms[&RoomId(2)].exits[&Direction::South];
        assert!(!back.door.as_ref().unwrap().is_closed());
    }

    #[test]
    fn resets_with_unknown_references_are_skipped() {
        let data = load_fixture();
        assert_eq!(data.resets.len(), 1);
        assert_eq!(data.resets[0].template, TemplateId(9001));
        assert_eq!(data.resets[0].room_limit, 2);
        assert_eq!(data.resets[0].world_limit, 4);
    }

    #[test]
    fn templates_parse_with_trimmed_text() {
        let data = load_fixture();
        let tpl = &data.templates[&TemplateId(9001)];
        assert_eq!(tpl.short_description, "the cityguard");
        assert_eq!(tpl.level, 3);
        assert_eq!(tpl.toughness, Toughness::Medium);
        assert!(tpl.wandering);
    }

    #[test]
    fn mismatched_door_states_are_forced_equal() {
        let yaml = r#"
rooms:
  1:
    name: A
    exits:
      north:
        id: 2
        door:
          short_description: oak door
          closed: false
  2:
    name: B
    exits:
      south:
        id: 1
        door:
          short_description: oak door
          closed: true
"#;
        let data = assemble(vec![area("x", yaml)]);
        let near = data.rooms[&RoomId(1)].exits[&Direction::North].door.as_ref().unwrap();
        let far = data.rooms[&RoomId(2)].exits[&Direction::South].door.as_ref().unwrap();
        assert_eq!(near.is_closed(), far.is_closed());
    }
}
