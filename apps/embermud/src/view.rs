//! Rendering: rooms, look targets, the scorecard, combat status, who.

use std::sync::Arc;

use crate::combat;
use crate::ctx::Ctx;
use crate::player::Player;
use crate::world::{Direction, InstanceId, MobInstance, Room, RoomId};

/// Who, if anyone, is fighting this mob right now.
fn fighting_annotation(ctx: &Ctx, viewer: &str, mob_id: InstanceId) -> String {
    for p in ctx.roster.snapshot() {
        let st = p.lock();
        if st.is_in_combat() && st.target == Some(mob_id) {
            return if p.name == viewer {
                " {R}[FIGHTING YOU]{x}".to_string()
            } else {
                format!(" {{R}}[FIGHTING {}]{{x}}", p.name)
            };
        }
    }
    String::new()
}

/// The exit list, sorted by direction name; closed doors render their
/// direction in parentheses.
fn exit_list(room: &Room) -> String {
    let mut entries: Vec<(&str, bool)> = room
        .exits
        .iter()
        .map(|(dir, exit)| {
            (
                dir.as_str(),
                exit.door.as_ref().is_some_and(|d| d.is_closed()),
            )
        })
        .collect();
    entries.sort();

    entries
        .into_iter()
        .map(|(dir, closed)| {
            if closed {
                format!("({dir})")
            } else {
                dir.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render the room for a viewer: name, prose, mobs, exits, other players.
pub fn describe_room(ctx: &Ctx, viewer: &Player, room_id: RoomId) -> String {
    let Some(room) = ctx.world.room(room_id) else {
        return "You float in the void.".to_string();
    };

    let mut out = format!("{{C}}{}{{x}}\r\n{}", room.name, room.description);

    let mobs = ctx.world.mobs_in_room(room_id);
    if !mobs.is_empty() {
        out.push_str("\r\n");
        for mob in &mobs {
            let annotation = fighting_annotation(ctx, &viewer.name, mob.id);
            out.push_str(&format!("\r\n{}{}", mob.template.long_description, annotation));
        }
    }

    out.push_str(&format!("\r\n\r\n{{G}}Available exits:{{x}} [{}]", exit_list(room)));

    let mut others: Vec<String> = ctx
        .roster
        .players_in_room(room_id, Some(&viewer.name))
        .into_iter()
        .map(|p| {
            let title = p.lock().title.clone();
            if title.is_empty() {
                p.name.clone()
            } else {
                format!("{} {}", p.name, title)
            }
        })
        .collect();
    if !others.is_empty() {
        others.sort();
        out.push_str(&format!("\r\n{{Y}}Also here:{{x}} {}", others.join(", ")));
    }

    out
}

fn describe_mob(ctx: &Ctx, viewer: &Player, mob: &MobInstance) -> String {
    let annotation = fighting_annotation(ctx, &viewer.name, mob.id);
    format!(
        "{}\r\n[Level {} {}] [HP: {}/{}]{}",
        mob.template.description,
        mob.template.level,
        mob.template.toughness.as_str(),
        mob.hp,
        mob.max_hp,
        annotation
    )
}

/// `look` with or without a target.
pub fn look(ctx: &Ctx, viewer: &Arc<Player>, args: &[&str]) -> String {
    let room_id = viewer.room_id();
    if args.is_empty() {
        return describe_room(ctx, viewer, room_id);
    }

    // A direction first: exit flavor, or a shrug for a blank wall.
    if let Some(dir) = Direction::parse(args[0]) {
        let Some(room) = ctx.world.room(room_id) else {
            return "Nothing special there.".to_string();
        };
        return match room.exits.get(&dir) {
            Some(exit) => exit
                .description
                .clone()
                .unwrap_or_else(|| format!("You see a passage leading {}.", dir.as_str())),
            None => "Nothing special there.".to_string(),
        };
    }

    let target = args.join(" ").to_ascii_lowercase();

    // Environment details beat mobs.
    if let Some(room) = ctx.world.room(room_id) {
        for attr in &room.environment {
            if attr.keywords.iter().any(|k| k.eq_ignore_ascii_case(&target)) {
                return attr.description.clone();
            }
        }
    }

    if let Some(mob) = ctx.world.find_mob_in_room(room_id, &target) {
        return describe_mob(ctx, viewer, &mob);
    }

    "You do not see that here.".to_string()
}

/// The full character sheet.
pub fn scorecard(player: &Player) -> String {
    let mut st = player.lock();
    st.update_derived();

    let title = if st.title.is_empty() {
        "[not set]".to_string()
    } else {
        st.title.clone()
    };
    let d = st.derived;

    let mut sb = String::new();
    sb.push_str("-------------------------------------------------\r\n");
    sb.push_str("                CHARACTER SCORECARD              \r\n");
    sb.push_str("-------------------------------------------------\r\n");
    sb.push_str(&format!(
        " Name:         {:<12}  Level:     {:<6}\r\n",
        player.name, st.level
    ));
    sb.push_str(&format!(
        " Race:         {:<12}  Class:     {:<6}\r\n",
        st.race.as_str(),
        st.class.as_str()
    ));
    sb.push_str(&format!(" Title:        {title}\r\n"));
    sb.push_str(&format!(
        " XP:           {:<12}  Gold:      {:<6}\r\n",
        format!("{} / {}", st.xp, st.next_level_xp),
        st.gold
    ));
    sb.push_str("-------------------------------------------------\r\n");
    sb.push_str("                   ATTRIBUTES                    \r\n");
    sb.push_str("-------------------------------------------------\r\n");
    sb.push_str(&format!(
        " Strength:     {:<8}  Dexterity:    {:<8}\r\n",
        st.attrs.str_, st.attrs.dex
    ));
    sb.push_str(&format!(
        " Constitution: {:<8}  Intelligence: {:<8}\r\n",
        st.attrs.con, st.attrs.intl
    ));
    sb.push_str(&format!(
        " Wisdom:       {:<8}  Presence:     {:<8}\r\n",
        st.attrs.wis, st.attrs.pre
    ));
    sb.push_str("-------------------------------------------------\r\n");
    sb.push_str("                  COMBAT STATS                   \r\n");
    sb.push_str("-------------------------------------------------\r\n");
    sb.push_str(&format!(
        " HP:           {:<12}  MP:          {:<12}\r\n",
        format!("{} / {}", st.hp, st.max_hp),
        format!("{} / {}", st.mp, st.max_mp)
    ));
    sb.push_str(&format!(
        " Stamina:      {:<12}  Hit%:        {:<12}\r\n",
        format!("{}%", st.stamina),
        format!("{:.1}%", d.hit)
    ));
    sb.push_str(&format!(
        " Evasion:      {:<12}  Crit%:       {:<12}\r\n",
        format!("{:.1}%", d.evasion),
        format!("{:.1}%", d.crit)
    ));
    sb.push_str(&format!(
        " Crit DMG:     {:<12}  Attack SPD:  {:<12}\r\n",
        format!("{:.1}%", d.crit_damage),
        format!("{:.1}%", d.attack_speed)
    ));
    sb.push_str(&format!(" Cast SPD:     {:<12}\r\n", format!("{:.1}%", d.cast_speed)));
    sb.push_str("-------------------------------------------------");

    sb
}

/// The in-combat status readout.
pub fn combat_status(ctx: &Ctx, player: &Arc<Player>) -> String {
    let (target, hp, max_hp, level) = {
        let st = player.lock();
        if !st.is_in_combat() {
            return "You are not in combat.".to_string();
        }
        (st.target.unwrap(), st.hp, st.max_hp, st.level)
    };

    let Some(mob) = ctx.world.mobs().instance(target).cloned() else {
        return "You are not in combat.".to_string();
    };

    format!(
        "You are fighting {}.\r\n\
         Your health: {}/{}\r\n\
         Target health: {}/{}\r\n\
         Your level: {}, Target level: {}\r\n\
         Hit chance: {:.0}%\r\n\
         Expected damage per hit: {}",
        mob.template.short_description,
        hp,
        max_hp,
        mob.hp,
        mob.max_hp,
        level,
        mob.template.level,
        combat::hit_chance(level, mob.template.level) * 100.0,
        combat::damage(level)
    )
}

/// Everyone online, `[race class level] Name title`.
pub fn who(ctx: &Ctx) -> String {
    let players = ctx.roster.snapshot();
    if players.is_empty() {
        return "There are no players currently online.".to_string();
    }

    let mut out = String::from("{Y}Players currently online:{x}\r\n");
    out.push_str("{C}----------------------------------------{x}\r\n");

    let mut lines: Vec<String> = players
        .iter()
        .map(|p| {
            let st = p.lock();
            let bracket = format!(
                "[{{G}}{:<6}{{x}} {{B}}{:<8}{{x}} {{M}}{:<3}{{x}}]",
                st.race.as_str(),
                st.class.as_str(),
                st.level
            );
            if st.title.is_empty() {
                format!("{bracket} {{W}}{}{{x}}", p.name)
            } else {
                format!("{bracket} {{W}}{}{{x}} {}", p.name, st.title)
            }
        })
        .collect();
    lines.sort();
    for line in lines {
        out.push_str(&line);
        out.push_str("\r\n");
    }

    out.push_str("{C}----------------------------------------{x}\r\n");
    out.push_str(&format!(
        "{{Y}}Total players online: {{W}}{}{{x}}",
        players.len()
    ));
    out
}
