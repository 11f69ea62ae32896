//! Typed command dispatch.
//!
//! The first whitespace token, lowercased, routes through a closed command
//! enum; `n/s/e/w/u/d` alias to the full directions. `ooc` is matched
//! before tokenization so the message body keeps its spacing. Dead players
//! pass only the short allow-list.

use std::sync::Arc;

use emberio::color;

use crate::chat;
use crate::combat;
use crate::ctx::Ctx;
use crate::player::Player;
use crate::view;
use crate::world::{Direction, RoomId};

/// What the session loop should do with the handler's result.
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Send this response and re-prompt.
    Response(String),
    /// The handler already sent everything it wanted to.
    Silent,
    /// Send this response, then end the session.
    Quit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Look,
    Move(Direction),
    Attack,
    Flee,
    Status,
    Score,
    GainXp,
    Save,
    Quit,
    Respawn,
    Color,
    Title,
    Who,
    Help,
    Open,
    Close,
    Goto,
    Recall,
}

impl Command {
    fn parse(token: &str) -> Option<Command> {
        if let Some(dir) = Direction::parse(token) {
            return Some(Command::Move(dir));
        }
        match token {
            "look" => Some(Command::Look),
            "attack" | "kill" => Some(Command::Attack),
            "flee" => Some(Command::Flee),
            "status" | "combat" => Some(Command::Status),
            "score" | "scorecard" => Some(Command::Score),
            "gainxp" => Some(Command::GainXp),
            "save" => Some(Command::Save),
            "quit" => Some(Command::Quit),
            "respawn" => Some(Command::Respawn),
            "color" => Some(Command::Color),
            "title" => Some(Command::Title),
            "who" => Some(Command::Who),
            "help" => Some(Command::Help),
            "open" => Some(Command::Open),
            "close" => Some(Command::Close),
            "goto" => Some(Command::Goto),
            "recall" => Some(Command::Recall),
            _ => None,
        }
    }

    /// The few things a corpse can still do.
    fn allowed_while_dead(self) -> bool {
        matches!(
            self,
            Command::Look | Command::Score | Command::Quit | Command::Respawn
        )
    }
}

pub fn dispatch(ctx: &Arc<Ctx>, player: &Arc<Player>, input: &str) -> Dispatch {
    let input = input.trim();
    if input.is_empty() {
        return Dispatch::Silent;
    }

    // OOC owns its whole line.
    if input == "ooc" || input.starts_with("ooc ") {
        chat::handle_ooc(ctx, player, input);
        return Dispatch::Silent;
    }

    player.lock().last_command = input.to_string();

    let mut parts = input.split_whitespace();
    let token = parts.next().unwrap_or("").to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    let Some(command) = Command::parse(&token) else {
        return Dispatch::Response(format!("Unknown command: {token}"));
    };

    if player.lock().dead && !command.allowed_while_dead() {
        return Dispatch::Response(
            "You are dead and cannot do that. Type 'respawn' to return to life.".to_string(),
        );
    }

    match command {
        Command::Look => Dispatch::Response(view::look(ctx, player, &args)),
        Command::Move(dir) => handle_move(ctx, player, dir),
        Command::Attack => handle_attack(ctx, player, &args),
        Command::Flee => handle_flee(ctx, player),
        Command::Status => Dispatch::Response(view::combat_status(ctx, player)),
        Command::Score => Dispatch::Response(view::scorecard(player)),
        Command::GainXp => handle_gainxp(ctx, player, &args),
        Command::Save => handle_save(ctx, player),
        Command::Quit => handle_quit(ctx, player),
        Command::Respawn => handle_respawn(ctx, player),
        Command::Color => handle_color(ctx, player, &args),
        Command::Title => handle_title(ctx, player, &args),
        Command::Who => Dispatch::Response(view::who(ctx)),
        Command::Help => Dispatch::Response(ctx.help.render(args.first().copied())),
        Command::Open => handle_door(ctx, player, &args, false),
        Command::Close => handle_door(ctx, player, &args, true),
        Command::Goto => handle_goto(ctx, player, &args),
        Command::Recall => handle_recall(ctx, player),
    }
}

fn handle_move(ctx: &Arc<Ctx>, player: &Arc<Player>, dir: Direction) -> Dispatch {
    let (room_id, in_combat) = {
        let st = player.lock();
        (st.room_id, st.is_in_combat())
    };
    if in_combat {
        return Dispatch::Response("You can't move while in combat.".to_string());
    }

    let Some(room) = ctx.world.room(room_id) else {
        return Dispatch::Response("You can't go that way.".to_string());
    };
    let Some(exit) = room.exits.get(&dir) else {
        return Dispatch::Response("You can't go that way.".to_string());
    };
    if let Some(door) = exit.door.as_ref() {
        if door.is_closed() {
            return Dispatch::Response(format!("The {} is closed.", door.short_description));
        }
    }
    let dest = exit.to;

    // Memory is authoritative; a failed write is logged and reconciled by
    // the next successful save.
    if let Err(e) = ctx.store.update_room(&player.name, dest) {
        tracing::warn!(player = %player.name, err = %e, "persist room failed");
    }

    let name = player.name.as_str();
    ctx.roster.broadcast_room(
        room_id,
        Some(name),
        &format!("{name} leaves {}.", dir.as_str()),
    );

    player.lock().room_id = dest;

    player.send(&format!("You move {}.", dir.as_str()));
    player.send(&view::describe_room(ctx, player, dest));
    ctx.roster
        .broadcast_room(dest, Some(name), &format!("{name} arrives."));

    Dispatch::Silent
}

fn handle_attack(ctx: &Arc<Ctx>, player: &Arc<Player>, args: &[&str]) -> Dispatch {
    let (room_id, in_combat) = {
        let st = player.lock();
        (st.room_id, st.is_in_combat())
    };
    if in_combat {
        return Dispatch::Response("You are already in combat!".to_string());
    }
    if args.is_empty() {
        return Dispatch::Response("Attack what?".to_string());
    }

    let target = args.join(" ").to_ascii_lowercase();
    let Some(mob) = ctx.world.find_mob_in_room(room_id, &target) else {
        return Dispatch::Response("You don't see that here.".to_string());
    };
    if mob.hp <= 0 {
        return Dispatch::Response(format!(
            "The {} is already dead!",
            mob.template.short_description
        ));
    }

    player.lock().enter_combat(mob.id);

    let desc = &mob.template.short_description;
    ctx.roster.broadcast_room(
        room_id,
        Some(&player.name),
        &format!("{{R}}{} attacks the {desc}!{{x}}", player.name),
    );
    Dispatch::Response(format!(
        "You attack the {desc}!\r\nThe {desc} turns to fight you!"
    ))
}

fn handle_flee(ctx: &Arc<Ctx>, player: &Arc<Player>) -> Dispatch {
    let (room_id, target) = {
        let st = player.lock();
        (st.room_id, st.target)
    };
    let Some(target) = target else {
        return Dispatch::Response("You're not in combat.".to_string());
    };

    let mob_name = ctx
        .world
        .mobs()
        .instance(target)
        .map(|m| m.template.short_description.clone())
        .unwrap_or_else(|| "something".to_string());

    player.lock().exit_combat();

    ctx.roster.broadcast_room(
        room_id,
        Some(&player.name),
        &format!("{{R}}{} flees from the {mob_name}!{{x}}", player.name),
    );
    Dispatch::Response(format!("You flee from the {mob_name}!"))
}

fn handle_gainxp(ctx: &Arc<Ctx>, player: &Arc<Player>, args: &[&str]) -> Dispatch {
    let Some(amount) = args.first().and_then(|a| a.parse::<i64>().ok()) else {
        return Dispatch::Response("Usage: gainxp <amount>".to_string());
    };

    let (ups, level, xp, next_xp, pools) = {
        let mut st = player.lock();
        let ups = st.gain_xp(amount);
        (
            ups,
            st.level,
            st.xp,
            st.next_level_xp,
            (st.hp, st.max_hp, st.mp, st.max_mp, st.stamina, st.max_stamina),
        )
    };
    for up in &ups {
        player.send(&format!(
            "\r\n{{W}}CONGRATULATIONS! You have reached level {}!{{x}}",
            up.level
        ));
        player.send(&format!(
            "Your Max HP increased by {}! Your Max MP increased by {}!",
            up.hp_gain, up.mp_gain
        ));
    }
    if !ups.is_empty() {
        if let Err(e) = ctx.store.update_level(&player.name, level, xp, next_xp) {
            tracing::warn!(player = %player.name, err = %e, "persist level failed");
        }
        if let Err(e) = ctx.store.update_pools(
            &player.name,
            pools.0,
            pools.1,
            pools.2,
            pools.3,
            pools.4,
            pools.5,
        ) {
            tracing::warn!(player = %player.name, err = %e, "persist pools failed");
        }
    }
    Dispatch::Response(format!("Gained {{G}}{amount}{{x}} XP."))
}

/// Flush the character's mutable state.
pub(crate) fn save_player(ctx: &Ctx, player: &Player) -> anyhow::Result<()> {
    let (level, xp, next_xp, pools, attrs, room, gold) = {
        let st = player.lock();
        (
            st.level,
            st.xp,
            st.next_level_xp,
            (st.hp, st.max_hp, st.mp, st.max_mp, st.stamina, st.max_stamina),
            st.attrs,
            st.room_id,
            st.gold,
        )
    };
    let name = &player.name;
    ctx.store.update_level(name, level, xp, next_xp)?;
    ctx.store
        .update_pools(name, pools.0, pools.1, pools.2, pools.3, pools.4, pools.5)?;
    ctx.store.update_attributes(name, &attrs)?;
    ctx.store.update_room(name, room)?;
    ctx.store.update_gold(name, gold)?;
    Ok(())
}

fn handle_save(ctx: &Arc<Ctx>, player: &Arc<Player>) -> Dispatch {
    match save_player(ctx, player) {
        Ok(()) => Dispatch::Response("Your progress has been saved.".to_string()),
        Err(e) => {
            tracing::warn!(player = %player.name, err = %e, "save failed");
            Dispatch::Response("Error saving your progress.".to_string())
        }
    }
}

fn handle_quit(ctx: &Arc<Ctx>, player: &Arc<Player>) -> Dispatch {
    if let Err(e) = save_player(ctx, player) {
        tracing::warn!(player = %player.name, err = %e, "save on quit failed");
    }
    Dispatch::Quit("Your progress has been saved. Goodbye!".to_string())
}

fn handle_respawn(ctx: &Arc<Ctx>, player: &Arc<Player>) -> Dispatch {
    if !player.lock().dead {
        return Dispatch::Response("You are not dead!".to_string());
    }
    if combat::respawn(ctx, player) {
        Dispatch::Response(
            "{G}You feel your spirit being pulled back to the world of the living...{x}"
                .to_string(),
        )
    } else {
        Dispatch::Response("You are not dead!".to_string())
    }
}

fn handle_color(ctx: &Arc<Ctx>, player: &Arc<Player>, args: &[&str]) -> Dispatch {
    let Some(arg) = args.first() else {
        return Dispatch::Response(if player.color_enabled() {
            "Colors are currently {G}ON{x}. Use 'color off' to disable.".to_string()
        } else {
            "Colors are currently OFF. Use 'color on' to enable.".to_string()
        });
    };

    match arg.to_ascii_lowercase().as_str() {
        "on" => {
            player.set_color(true);
            if let Err(e) = ctx.store.update_color(&player.name, true) {
                tracing::warn!(player = %player.name, err = %e, "persist color failed");
                return Dispatch::Response(
                    "Error saving color preference. Colors enabled for this session only."
                        .to_string(),
                );
            }
            Dispatch::Response("{G}Colors enabled.{x} You will now see colored text.".to_string())
        }
        "off" => {
            player.set_color(false);
            if let Err(e) = ctx.store.update_color(&player.name, false) {
                tracing::warn!(player = %player.name, err = %e, "persist color failed");
                return Dispatch::Response(
                    "Error saving color preference. Colors disabled for this session only."
                        .to_string(),
                );
            }
            Dispatch::Response("Colors disabled. You will no longer see colored text.".to_string())
        }
        _ => Dispatch::Response("Usage: color [on|off]".to_string()),
    }
}

fn handle_title(ctx: &Arc<Ctx>, player: &Arc<Player>, args: &[&str]) -> Dispatch {
    if args.is_empty() {
        player.lock().title.clear();
        if let Err(e) = ctx.store.update_title(&player.name, "") {
            tracing::warn!(player = %player.name, err = %e, "persist title failed");
        }
        return Dispatch::Response("Your title has been removed.".to_string());
    }

    let mut title = args.join(" ").trim().to_string();

    // The limit counts what the client sees, not the markup.
    if color::visible_len(&title) > 40 {
        return Dispatch::Response("Titles must be no longer than 40 characters.".to_string());
    }

    // A title that opens a color must close it.
    if color::has_tokens(&title) && !title.ends_with("{x}") {
        title.push_str("{x}");
    }

    player.lock().title = title.clone();
    if let Err(e) = ctx.store.update_title(&player.name, &title) {
        tracing::warn!(player = %player.name, err = %e, "persist title failed");
    }
    Dispatch::Response(format!("Your title is now: {title}"))
}

fn handle_door(ctx: &Arc<Ctx>, player: &Arc<Player>, args: &[&str], close: bool) -> Dispatch {
    let verb = if close { "close" } else { "open" };
    let Some(raw_target) = args.first() else {
        return Dispatch::Response(format!(
            "{} what?",
            if close { "Close" } else { "Open" }
        ));
    };
    let target = raw_target.to_ascii_lowercase();

    let room_id = player.room_id();
    let Some(room) = ctx.world.room(room_id) else {
        return Dispatch::Response("You don't see that here.".to_string());
    };

    // A direction name first.
    if let Some(dir) = Direction::parse(&target) {
        if let Some(exit) = room.exits.get(&dir) {
            let Some(door) = exit.door.as_ref() else {
                return Dispatch::Response(format!("There is no door to the {}.", dir.as_str()));
            };
            if let Some(rejection) = check_door(door, dir.as_str(), close, true) {
                return Dispatch::Response(rejection);
            }
            return apply_door(ctx, player, room_id, dir, close, verb, None);
        }
        // No exit that way; maybe a door keyword happens to shadow a
        // direction name. Fall through to the keyword walk.
    }

    // Then door keywords across this room's exits.
    for (dir, exit) in &room.exits {
        let Some(door) = exit.door.as_ref() else {
            continue;
        };
        if !door.matches_keyword(&target) {
            continue;
        }
        if let Some(rejection) = check_door(door, dir.as_str(), close, false) {
            return Dispatch::Response(rejection);
        }
        return apply_door(ctx, player, room_id, *dir, close, verb, Some(dir.as_str()));
    }

    Dispatch::Response("You don't see that here.".to_string())
}

/// Already-open / already-closed / locked rejections.
fn check_door(
    door: &crate::world::Door,
    dir: &str,
    close: bool,
    dir_addressed: bool,
) -> Option<String> {
    let desc = &door.short_description;
    if close && door.is_closed() {
        return Some(if dir_addressed {
            format!("The {dir} {desc} is already closed.")
        } else {
            format!("The {desc} is already closed.")
        });
    }
    if !close {
        if !door.is_closed() {
            return Some(if dir_addressed {
                format!("The {dir} {desc} is already open.")
            } else {
                format!("The {desc} is already open.")
            });
        }
        if door.locked {
            return Some(if dir_addressed {
                format!("The {dir} {desc} is locked.")
            } else {
                format!("The {desc} is locked.")
            });
        }
    }
    None
}

fn apply_door(
    ctx: &Arc<Ctx>,
    player: &Arc<Player>,
    room_id: RoomId,
    dir: Direction,
    close: bool,
    verb: &str,
    via_keyword: Option<&str>,
) -> Dispatch {
    let notices = ctx.world.set_door(room_id, dir, close);

    let mut response = String::new();
    for notice in notices {
        let desc = &notice.door_description;
        if notice.room == room_id {
            response = match via_keyword {
                Some(d) => format!("You {verb} the {desc} to the {d}."),
                None => format!("You {verb} the {desc}."),
            };
            ctx.roster.broadcast_room(
                room_id,
                Some(&player.name),
                &match via_keyword {
                    Some(d) => format!("{} {verb}s the {desc} to the {d}.", player.name),
                    None => format!("{} {verb}s the {desc}.", player.name),
                },
            );
        } else {
            let what = if close { "closes" } else { "opens" };
            ctx.roster
                .broadcast_room(notice.room, None, &format!("The {desc} {what}."));
        }
    }
    Dispatch::Response(response)
}

fn handle_goto(ctx: &Arc<Ctx>, player: &Arc<Player>, args: &[&str]) -> Dispatch {
    let Some(arg) = args.first() else {
        return Dispatch::Response("Goto where? Please specify a room ID.".to_string());
    };
    let Ok(id) = arg.parse::<i64>() else {
        return Dispatch::Response("Invalid room ID. Please specify a numeric room ID.".to_string());
    };
    let room_id = RoomId(id);
    let Some(room) = ctx.world.room(room_id) else {
        return Dispatch::Response(format!("Room {id} does not exist."));
    };

    if let Err(e) = ctx.store.update_room(&player.name, room_id) {
        tracing::warn!(player = %player.name, err = %e, "persist room failed");
    }
    player.lock().room_id = room_id;
    Dispatch::Response(format!("You teleport to Room {id} ({}).", room.name))
}

fn handle_recall(ctx: &Arc<Ctx>, player: &Arc<Player>) -> Dispatch {
    let (old_room, in_combat) = {
        let st = player.lock();
        (st.room_id, st.is_in_combat())
    };
    if in_combat {
        return Dispatch::Response("You cannot recall while fighting!".to_string());
    }
    if !ctx.world.has_room(ctx.respawn_room) {
        return Dispatch::Response(
            "The recall magic fizzles. The destination seems to be missing.".to_string(),
        );
    }

    if let Err(e) = ctx.store.update_room(&player.name, ctx.respawn_room) {
        tracing::warn!(player = %player.name, err = %e, "persist recall failed");
    }

    let name = player.name.as_str();
    ctx.roster.broadcast_room(
        old_room,
        Some(name),
        &format!("{name} disappears in a flash of light."),
    );
    player.lock().room_id = ctx.respawn_room;
    ctx.roster.broadcast_room(
        ctx.respawn_room,
        Some(name),
        &format!("{name} appears in a flash of light."),
    );

    player.send("A bright flash surrounds you, and you find yourself back at the Temple Square.");
    player.send(&view::describe_room(ctx, player, ctx.respawn_room));
    Dispatch::Silent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctx::test_ctx;
    use crate::db::CharacterRecord;
    use crate::player::PlayerState;
    use crate::stats::{Class, Race};
    use crate::world::testing::{small_world, spawn_guard};
    use tokio::sync::mpsc;

    fn ctx_and_player() -> (Arc<Ctx>, Arc<Player>) {
        let ctx = test_ctx(small_world(), 5);
        let rec = CharacterRecord {
            name: "Ada".to_string(),
            race: Race::Elf,
            class: Class::Mage,
            title: "the Newbie".to_string(),
            room_id: RoomId(3001),
            attrs: Race::Elf.base_attributes(),
            level: 1,
            xp: 0,
            next_level_xp: 1000,
            hp: 23,
            max_hp: 23,
            mp: 46,
            max_mp: 46,
            stamina: 100,
            max_stamina: 100,
            gold: 0,
            color_enabled: true,
        };
        ctx.store
            .create("Ada", rec.race, rec.class, &rec.attrs, rec.room_id)
            .unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let player = Arc::new(Player::new(
            "Ada".to_string(),
            tx,
            PlayerState::from_record(&rec),
            true,
        ));
        ctx.roster.add(Arc::clone(&player));
        (ctx, player)
    }

    fn response(d: Dispatch) -> String {
        match d {
            Dispatch::Response(s) | Dispatch::Quit(s) => s,
            Dispatch::Silent => String::new(),
        }
    }

    #[test]
    fn unknown_commands_get_the_fixed_reply() {
        let (ctx, player) = ctx_and_player();
        assert_eq!(
            dispatch(&ctx, &player, "dance wildly"),
            Dispatch::Response("Unknown command: dance".to_string())
        );
    }

    #[test]
    fn empty_input_is_silent() {
        let (ctx, player) = ctx_and_player();
        assert_eq!(dispatch(&ctx, &player, "   "), Dispatch::Silent);
    }

    #[test]
    fn dead_players_pass_only_the_allow_list() {
        let (ctx, player) = ctx_and_player();
        player.lock().dead = true;

        let denied = response(dispatch(&ctx, &player, "north"));
        assert!(denied.contains("You are dead"));
        let denied = response(dispatch(&ctx, &player, "attack guard"));
        assert!(denied.contains("You are dead"));

        // The allow-list still works.
        let looked = response(dispatch(&ctx, &player, "look"));
        assert!(looked.contains("The Temple"));
        let scored = response(dispatch(&ctx, &player, "score"));
        assert!(scored.contains("SCORECARD"));
    }

    #[test]
    fn movement_is_blocked_by_closed_doors_and_combat() {
        let (ctx, player) = ctx_and_player();

        // The north gate starts closed.
        let out = response(dispatch(&ctx, &player, "north"));
        assert_eq!(out, "The iron gate is closed.");
        assert_eq!(player.room_id(), RoomId(3001));

        // Combat pins you in place.
        let id = spawn_guard(&ctx.world, RoomId(3001));
        player.lock().enter_combat(id);
        let out = response(dispatch(&ctx, &player, "east"));
        assert_eq!(out, "You can't move while in combat.");
        player.lock().exit_combat();

        // No exit south at all.
        let out = response(dispatch(&ctx, &player, "south"));
        assert_eq!(out, "You can't go that way.");
    }

    #[test]
    fn movement_updates_memory_and_store() {
        let (ctx, player) = ctx_and_player();
        assert_eq!(dispatch(&ctx, &player, "east"), Dispatch::Silent);
        assert_eq!(player.room_id(), RoomId(4001));
        let rec = ctx.store.load("Ada").unwrap().unwrap();
        assert_eq!(rec.room_id, RoomId(4001));
    }

    #[test]
    fn open_then_walk_through_the_gate() {
        let (ctx, player) = ctx_and_player();

        let out = response(dispatch(&ctx, &player, "open north"));
        assert_eq!(out, "You open the iron gate.");

        // Opening again is a rule violation, not a repeat.
        let out = response(dispatch(&ctx, &player, "open north"));
        assert_eq!(out, "The north iron gate is already open.");

        assert_eq!(dispatch(&ctx, &player, "north"), Dispatch::Silent);
        assert_eq!(player.room_id(), RoomId(3002));

        // The reverse side opened too: walk straight back.
        assert_eq!(dispatch(&ctx, &player, "south"), Dispatch::Silent);
        assert_eq!(player.room_id(), RoomId(3001));
    }

    #[test]
    fn doors_answer_to_keywords() {
        let (ctx, player) = ctx_and_player();
        let out = response(dispatch(&ctx, &player, "open gate"));
        assert_eq!(out, "You open the iron gate to the north.");
        let out = response(dispatch(&ctx, &player, "close gate"));
        assert_eq!(out, "You close the iron gate to the north.");
        let out = response(dispatch(&ctx, &player, "close gate"));
        assert_eq!(out, "The iron gate is already closed.");
        let out = response(dispatch(&ctx, &player, "open portcullis"));
        assert_eq!(out, "You don't see that here.");
    }

    #[test]
    fn open_without_door_reports_no_door() {
        let (ctx, player) = ctx_and_player();
        let out = response(dispatch(&ctx, &player, "open east"));
        assert_eq!(out, "There is no door to the east.");
        let out = response(dispatch(&ctx, &player, "open"));
        assert_eq!(out, "Open what?");
    }

    #[test]
    fn attack_rejections_then_engagement() {
        let (ctx, player) = ctx_and_player();
        let out = response(dispatch(&ctx, &player, "attack"));
        assert_eq!(out, "Attack what?");
        let out = response(dispatch(&ctx, &player, "attack guard"));
        assert_eq!(out, "You don't see that here.");

        let id = spawn_guard(&ctx.world, RoomId(3001));
        let out = response(dispatch(&ctx, &player, "kill guard"));
        assert!(out.contains("You attack the cityguard!"));
        assert!(player.lock().is_in_combat());
        assert_eq!(player.lock().target, Some(id));

        let out = response(dispatch(&ctx, &player, "attack guard"));
        assert_eq!(out, "You are already in combat!");
    }

    #[test]
    fn flee_leaves_combat() {
        let (ctx, player) = ctx_and_player();
        let out = response(dispatch(&ctx, &player, "flee"));
        assert_eq!(out, "You're not in combat.");

        let id = spawn_guard(&ctx.world, RoomId(3001));
        player.lock().enter_combat(id);
        let out = response(dispatch(&ctx, &player, "flee"));
        assert_eq!(out, "You flee from the cityguard!");
        assert!(!player.lock().is_in_combat());
    }

    #[test]
    fn title_rules() {
        let (ctx, player) = ctx_and_player();

        let long = "x".repeat(41);
        let out = response(dispatch(&ctx, &player, &format!("title {long}")));
        assert!(out.contains("no longer than 40"));

        // Thirteen raw characters, seven visible once tokens are stripped.
        let out = response(dispatch(&ctx, &player, "title {R}the Red{x}"));
        assert!(out.contains("Your title is now:"));
        assert_eq!(player.lock().title, "{R}the Red{x}");
        assert_eq!(ctx.store.load("Ada").unwrap().unwrap().title, "{R}the Red{x}");

        // An unterminated color gets its reset appended.
        let out = response(dispatch(&ctx, &player, "title {G}verdant"));
        assert!(out.ends_with("{G}verdant{x}"));

        let out = response(dispatch(&ctx, &player, "title"));
        assert_eq!(out, "Your title has been removed.");
        assert_eq!(player.lock().title, "");
    }

    #[test]
    fn goto_teleports_or_rejects() {
        let (ctx, player) = ctx_and_player();
        let out = response(dispatch(&ctx, &player, "goto 9999"));
        assert_eq!(out, "Room 9999 does not exist.");
        let out = response(dispatch(&ctx, &player, "goto xyz"));
        assert!(out.contains("Invalid room ID"));

        let out = response(dispatch(&ctx, &player, "goto 3002"));
        assert_eq!(out, "You teleport to Room 3002 (Gate Road).");
        assert_eq!(player.room_id(), RoomId(3002));
    }

    #[test]
    fn recall_refuses_mid_fight_then_teleports() {
        let (ctx, player) = ctx_and_player();
        dispatch(&ctx, &player, "goto 3002");

        let id = spawn_guard(&ctx.world, RoomId(3002));
        player.lock().enter_combat(id);
        let out = response(dispatch(&ctx, &player, "recall"));
        assert_eq!(out, "You cannot recall while fighting!");
        player.lock().exit_combat();

        assert_eq!(dispatch(&ctx, &player, "recall"), Dispatch::Silent);
        assert_eq!(player.room_id(), RoomId(3001));
    }

    #[test]
    fn respawn_requires_death() {
        let (ctx, player) = ctx_and_player();
        let out = response(dispatch(&ctx, &player, "respawn"));
        assert_eq!(out, "You are not dead!");

        {
            let mut st = player.lock();
            st.dead = true;
            st.hp = 0;
            st.room_id = RoomId(3002);
        }
        let out = response(dispatch(&ctx, &player, "respawn"));
        assert!(out.contains("pulled back to the world of the living"));
        let st = player.lock();
        assert!(!st.dead);
        assert_eq!(st.room_id, RoomId(3001));
        assert_eq!(st.hp, st.max_hp / 2);
        assert_eq!(st.mp, st.max_mp / 2);
        drop(st);
        assert_eq!(ctx.store.load("Ada").unwrap().unwrap().room_id, RoomId(3001));
    }

    #[test]
    fn gainxp_levels_and_persists() {
        let (ctx, player) = ctx_and_player();
        let out = response(dispatch(&ctx, &player, "gainxp 1000"));
        assert!(out.contains("Gained {G}1000{x} XP."));
        assert_eq!(player.lock().level, 2);
        let rec = ctx.store.load("Ada").unwrap().unwrap();
        assert_eq!(rec.level, 2);
        assert_eq!(rec.xp, 0);

        let out = response(dispatch(&ctx, &player, "gainxp"));
        assert_eq!(out, "Usage: gainxp <amount>");
    }

    #[test]
    fn save_and_quit_flush_state() {
        let (ctx, player) = ctx_and_player();
        player.lock().gold = 99;
        let out = response(dispatch(&ctx, &player, "save"));
        assert_eq!(out, "Your progress has been saved.");
        assert_eq!(ctx.store.load("Ada").unwrap().unwrap().gold, 99);

        match dispatch(&ctx, &player, "quit") {
            Dispatch::Quit(msg) => assert!(msg.contains("Goodbye")),
            other => panic!("expected quit, got {other:?}"),
        }
    }

    #[test]
    fn color_toggle_persists() {
        let (ctx, player) = ctx_and_player();
        let out = response(dispatch(&ctx, &player, "color off"));
        assert!(out.contains("Colors disabled"));
        assert!(!player.color_enabled());
        assert!(!ctx.store.load("Ada").unwrap().unwrap().color_enabled);

        let out = response(dispatch(&ctx, &player, "color"));
        assert!(out.contains("currently OFF"));
    }
}
