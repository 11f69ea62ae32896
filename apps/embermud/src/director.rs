//! Autonomous world behavior: the reset sweep and mob wandering.
//!
//! Resets run every fifteen ticks and push the population back toward the
//! declared targets; the same sweep closes every door that players left
//! open. Wandering runs on the pulse and shuffles flagged mobs around
//! their home areas.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::ctx::Ctx;
use crate::world::{Direction, InstanceId, ResetRule, RoomId, TemplateId};

/// Global gate: the chance per pulse that wandering is considered at all.
const WANDER_GLOBAL_CHANCE: f64 = 0.15;
/// Per-mob chance of attempting a move once the gate opens.
const WANDER_MOB_CHANCE: f64 = 0.20;

/// Spawn mobs toward their reset targets.
///
/// Per template: the world allowance is the largest `max_world` across its
/// rules minus the live count. The first pass seeds one instance into each
/// reset room that lacks the template, spreading mob kinds across their
/// spawn sites; the second fills remaining room capacity. Rule order is
/// shuffled before each pass so tie-broken locations rotate.
pub fn process_mob_resets(ctx: &Ctx) {
    let mut by_template: HashMap<TemplateId, Vec<ResetRule>> = HashMap::new();
    for rule in ctx.world.resets() {
        by_template.entry(rule.template).or_default().push(rule.clone());
    }

    for (template_id, rules) in by_template {
        let world_limit = rules.iter().map(|r| r.world_limit).max().unwrap_or(0);

        // Shuffles happen outside the world-entity lock.
        let (pass_one, pass_two) = ctx.with_rng(|rng| {
            let mut a = rules.clone();
            rng.shuffle(&mut a);
            let mut b = rules;
            rng.shuffle(&mut b);
            (a, b)
        });

        let mut mobs = ctx.world.mobs_mut();
        let Some(template) = mobs.templates.get(&template_id).map(Arc::clone) else {
            continue;
        };

        let mut allowance = world_limit.saturating_sub(mobs.world_count(template_id));
        if allowance == 0 {
            continue;
        }

        for rule in &pass_one {
            if allowance == 0 {
                break;
            }
            if rule.room_limit == 0 || mobs.count_in_room(rule.room, template_id) > 0 {
                continue;
            }
            let Some(room) = ctx.world.room(rule.room) else {
                continue;
            };
            mobs.spawn(&template, room);
            allowance -= 1;
        }

        for rule in &pass_two {
            if allowance == 0 {
                break;
            }
            let current = mobs.count_in_room(rule.room, template_id);
            if current >= rule.room_limit {
                continue;
            }
            let Some(room) = ctx.world.room(rule.room) else {
                continue;
            };
            let want = (rule.room_limit - current).min(allowance);
            for _ in 0..want {
                mobs.spawn(&template, room);
                allowance -= 1;
            }
        }
    }
}

/// Close every open door in the world, both sides at once.
///
/// Each edge is visited once, keyed by the unordered room pair, so the
/// occupants of each room hear exactly one "closes" per door.
pub fn reset_doors(ctx: &Ctx) {
    let mut processed: HashSet<(RoomId, RoomId)> = HashSet::new();

    for room in ctx.world.rooms() {
        for (dir, exit) in &room.exits {
            let Some(door) = exit.door.as_ref() else {
                continue;
            };
            if door.is_closed() {
                continue;
            }

            let key = (room.id.min(exit.to), room.id.max(exit.to));
            if !processed.insert(key) {
                continue;
            }

            for notice in ctx.world.set_door(room.id, *dir, true) {
                ctx.roster.broadcast_room(
                    notice.room,
                    None,
                    &format!("The {} closes.", notice.door_description),
                );
            }
        }
    }
}

/// One wandering pulse.
pub fn process_wandering(ctx: &Ctx) {
    if !ctx.with_rng(|rng| rng.chance(WANDER_GLOBAL_CHANCE)) {
        return;
    }

    // Mobs someone is fighting stay put. Snapshot the engaged set from the
    // roster before touching the world-entity lock.
    let engaged: HashSet<InstanceId> = ctx
        .roster
        .snapshot()
        .iter()
        .filter_map(|p| {
            let st = p.lock();
            if st.is_in_combat() { st.target } else { None }
        })
        .collect();

    let candidates: Vec<InstanceId> = {
        let mobs = ctx.world.mobs();
        mobs.instance_ids()
            .into_iter()
            .filter(|id| {
                mobs.instance(*id)
                    .map(|m| m.template.wandering && m.hp > 0)
                    .unwrap_or(false)
            })
            .collect()
    };

    for id in candidates {
        if engaged.contains(&id) {
            continue;
        }
        if !ctx.with_rng(|rng| rng.chance(WANDER_MOB_CHANCE)) {
            continue;
        }
        try_wander(ctx, id);
    }
}

/// Pick an eligible direction and move. Eligibility filtering happens
/// outside the write lock; the move re-validates under it.
fn try_wander(ctx: &Ctx, id: InstanceId) {
    let Some(mob) = ctx.world.mobs().instance(id).cloned() else {
        return;
    };
    let Some(room) = ctx.world.room(mob.room_id) else {
        return;
    };

    let eligible: Vec<(Direction, RoomId)> = room
        .exits
        .iter()
        .filter(|(_, exit)| {
            if exit.door.as_ref().is_some_and(|d| d.is_closed()) {
                return false;
            }
            ctx.world
                .room(exit.to)
                .is_some_and(|dest| !dest.no_wandering && dest.area == mob.home_area)
        })
        .map(|(dir, exit)| (*dir, exit.to))
        .collect();
    if eligible.is_empty() {
        return;
    }

    let (dir, to) = eligible[ctx.with_rng(|rng| rng.index(eligible.len()))];

    let moved = {
        let mut mobs = ctx.world.mobs_mut();
        match mobs.instance(id) {
            Some(current) if current.room_id == mob.room_id && current.hp > 0 => {
                mobs.relocate(id, to)
            }
            _ => None,
        }
    };

    if let Some((from, to)) = moved {
        let desc = &mob.template.short_description;
        ctx.roster
            .broadcast_room(from, None, &format!("{desc} leaves {}.", dir.as_str()));
        ctx.roster.broadcast_room(
            to,
            None,
            &format!("{desc} arrives from the {}.", dir.opposite().as_str()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctx::test_ctx;
    use crate::world::testing::{small_world, spawn_guard};

    #[test]
    fn resets_spread_then_fill_within_limits() {
        // One rule: room 3002, room limit 2, world limit 4.
        let ctx = test_ctx(small_world(), 11);
        process_mob_resets(&ctx);

        let mobs = ctx.world.mobs();
        // Only one reset room, so the sweep can place at most room_limit.
        assert_eq!(mobs.count_in_room(RoomId(3002), TemplateId(9001)), 2);
        assert_eq!(mobs.world_count(TemplateId(9001)), 2);
    }

    #[test]
    fn resets_are_idempotent_at_capacity() {
        let ctx = test_ctx(small_world(), 11);
        process_mob_resets(&ctx);
        process_mob_resets(&ctx);
        let mobs = ctx.world.mobs();
        assert_eq!(mobs.world_count(TemplateId(9001)), 2);
    }

    #[test]
    fn resets_respect_existing_population() {
        let ctx = test_ctx(small_world(), 11);
        // Pre-place one guard in the reset room; the sweep tops up to the
        // room limit, not past it.
        spawn_guard(&ctx.world, RoomId(3002));
        process_mob_resets(&ctx);
        let mobs = ctx.world.mobs();
        assert_eq!(mobs.count_in_room(RoomId(3002), TemplateId(9001)), 2);
    }

    #[test]
    fn door_reset_closes_both_sides_once() {
        let ctx = test_ctx(small_world(), 3);
        ctx.world.set_door(RoomId(3001), Direction::North, false);
        assert!(!ctx.world.room(RoomId(3001)).unwrap().exits[&Direction::North]
            .door
            .as_ref()
            .unwrap()
            .is_closed());

        reset_doors(&ctx);

        let near = &ctx.world.room(RoomId(3001)).unwrap().exits[&Direction::North];
        let far = &ctx.world.room(RoomId(3002)).unwrap().exits[&Direction::South];
        assert!(near.door.as_ref().unwrap().is_closed());
        assert!(far.door.as_ref().unwrap().is_closed());
    }

    #[test]
    fn wandering_never_leaves_the_home_area() {
        // The guard's only open exits from the temple lead out of its home
        // area (4001, eastwood) or through a closed gate (3002). Spawned
        // into 3001 its home area is midgaard, and 3001 itself is
        // no-wandering for outsiders but home-area filtering is what pins
        // it here: eastwood is off limits and the gate stays shut.
        let ctx = test_ctx(small_world(), 99);
        let id = spawn_guard(&ctx.world, RoomId(3001));

        for _ in 0..10_000 {
            process_wandering(&ctx);
        }

        let mobs = ctx.world.mobs();
        let mob = mobs.instance(id).unwrap();
        assert_eq!(mob.room_id, RoomId(3001));
        assert_eq!(
            ctx.world.room(mob.room_id).unwrap().area,
            mob.home_area
        );
    }

    #[test]
    fn wandering_respects_no_wandering_rooms() {
        let ctx = test_ctx(small_world(), 7);
        let id = spawn_guard(&ctx.world, RoomId(3002));
        // Open the gate: the only exit leads to 3001, which is flagged
        // no-wandering, so the guard stays put even with the door open.
        ctx.world.set_door(RoomId(3002), Direction::South, false);
        for _ in 0..1_000 {
            process_wandering(&ctx);
        }
        assert_eq!(ctx.world.mobs().instance(id).unwrap().room_id, RoomId(3002));
    }

}
