//! Combat: the chance math, one-swing resolution, the per-pulse round, and
//! death/respawn.
//!
//! The math functions are pure and `resolve_swing` takes its three rolls
//! as arguments, so outcomes can be pinned in tests; the live path draws
//! rolls from the world RNG. The pulse round never holds a lock across the
//! readability delay: it snapshots, mutates briefly, and releases.

use std::sync::Arc;
use std::time::Duration;

use crate::ctx::Ctx;
use crate::player::Player;
use crate::world::MobInstance;

pub const RESPAWN_DELAY: Duration = Duration::from_secs(5);
const COUNTER_SWING_DELAY: Duration = Duration::from_millis(100);

/// Chance for an attacker to land a swing at all.
pub fn hit_chance(attacker_level: i32, defender_level: i32) -> f64 {
    let adjustment: f64 = match attacker_level - defender_level {
        d if d >= 2 => 0.10,
        1 => 0.05,
        0 => 0.0,
        -1 => -0.05,
        _ => -0.10,
    };
    (0.80 + adjustment).clamp(0.05, 1.00)
}

/// Chance for the defender to evade a landed swing.
pub fn evade_chance(defender_level: i32, attacker_level: i32) -> f64 {
    let adjustment: f64 = match defender_level - attacker_level {
        d if d >= 3 => 0.10,
        d if d <= -3 => -0.05,
        _ => 0.0,
    };
    (0.05 + adjustment).clamp(0.05, 0.50)
}

/// Chance for a landed, unevaded swing to crit.
pub fn crit_chance(attacker_level: i32, defender_level: i32) -> f64 {
    let adjustment: f64 = match attacker_level - defender_level {
        d if d >= 3 => 0.10,
        d if d <= -3 => -0.05,
        _ => 0.0,
    };
    (0.05 + adjustment).clamp(0.05, 0.50)
}

pub fn damage(attacker_level: i32) -> i32 {
    attacker_level * 2
}

/// Experience for a kill, scaled by how far above or below the player the
/// target was. Four or more levels below: nothing.
pub fn xp_for_kill(player_level: i32, target_level: i32) -> i64 {
    let base = 100 * target_level as i64;
    let factor = match target_level - player_level {
        d if d >= 5 => 2.0,
        d if d >= 3 => 1.5,
        d if d >= 2 => 1.25,
        d if d >= 0 => 1.0,
        -1 => 0.75,
        -2 => 0.5,
        -3 => 0.25,
        _ => 0.0,
    };
    (base as f64 * factor) as i64
}

pub fn gold_for_kill(target_level: i32) -> i64 {
    5 * target_level as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingOutcome {
    Miss,
    Evaded,
    Hit { damage: i32, critical: bool },
}

/// Resolve one swing: miss roll first, then evade, then crit. Rolls are
/// uniform draws in `[0,1)`.
pub fn resolve_swing(
    attacker_level: i32,
    defender_level: i32,
    hit_roll: f64,
    evade_roll: f64,
    crit_roll: f64,
) -> SwingOutcome {
    if hit_roll > hit_chance(attacker_level, defender_level) {
        return SwingOutcome::Miss;
    }
    if evade_roll <= evade_chance(defender_level, attacker_level) {
        return SwingOutcome::Evaded;
    }
    let critical = crit_roll <= crit_chance(attacker_level, defender_level);
    let mut dmg = damage(attacker_level);
    if critical {
        dmg *= 2;
    }
    SwingOutcome::Hit {
        damage: dmg,
        critical,
    }
}

fn draw_swing(ctx: &Ctx, attacker_level: i32, defender_level: i32) -> SwingOutcome {
    let (h, e, c) = ctx.with_rng(|rng| (rng.next_f64(), rng.next_f64(), rng.next_f64()));
    resolve_swing(attacker_level, defender_level, h, e, c)
}

/// One pulse for one player: the low-health nag, then the combat round.
pub async fn pulse_update(ctx: Arc<Ctx>, player: Arc<Player>) {
    let (dead, nag, engaged) = {
        let st = player.lock();
        (
            st.dead,
            st.hp > 0 && st.hp < st.max_hp / 5,
            st.is_in_combat(),
        )
    };
    if dead {
        return;
    }
    if nag {
        player.send("{R}*Your health is critically low!*{x}");
        player.send_prompt();
    }
    if engaged {
        combat_round(&ctx, &player).await;
    }
}

/// Validate the target, swing, pause for readability, then let the target
/// swing back if everyone involved is still standing in the same place.
async fn combat_round(ctx: &Arc<Ctx>, player: &Arc<Player>) {
    let (target_id, room) = {
        let st = player.lock();
        match st.target {
            Some(t) => (t, st.room_id),
            None => return,
        }
    };

    let mob = ctx.world.mobs().instance(target_id).cloned();
    let mob = match validate_target(mob, room) {
        Ok(mob) => mob,
        Err(reason) => {
            player.lock().exit_combat();
            player.send(reason);
            player.send_prompt();
            return;
        }
    };

    player_swing(ctx, player, &mob);

    if !player.lock().is_in_combat() {
        return;
    }

    // Readability beat between the exchange of blows.
    tokio::time::sleep(COUNTER_SWING_DELAY).await;

    // The target may have died or moved on while we slept.
    let player_room = player.room_id();
    let counter = ctx
        .world
        .mobs()
        .instance(target_id)
        .filter(|m| m.hp > 0 && m.room_id == player_room)
        .cloned();
    if let Some(mob) = counter {
        if player.lock().is_in_combat() {
            mob_swing(ctx, player, &mob);
        }
    }
}

fn validate_target(
    mob: Option<MobInstance>,
    player_room: crate::world::RoomId,
) -> Result<MobInstance, &'static str> {
    let Some(mob) = mob else {
        return Err("Your target is no longer available.");
    };
    if mob.room_id != player_room {
        return Err("Your target has left the room.");
    }
    if mob.hp <= 0 {
        return Err("Your target is already dead.");
    }
    Ok(mob)
}

/// The player's half of the exchange.
fn player_swing(ctx: &Ctx, player: &Arc<Player>, mob: &MobInstance) {
    let (level, room) = {
        let st = player.lock();
        (st.level, st.room_id)
    };
    let name = player.name.as_str();
    let desc = mob.template.short_description.as_str();

    match draw_swing(ctx, level, mob.template.level) {
        SwingOutcome::Miss => {
            player.send(&format!("You miss {desc}."));
            ctx.roster
                .broadcast_room(room, Some(name), &format!("{{R}}{name} misses {desc}.{{x}}"));
        }
        SwingOutcome::Evaded => {
            player.send(&format!("{desc} evades your attack."));
            ctx.roster.broadcast_room(
                room,
                Some(name),
                &format!("{{R}}{desc} evades {name}'s attack.{{x}}"),
            );
        }
        SwingOutcome::Hit { damage, critical } => {
            if critical {
                player.send(&format!(
                    "You land a {{R}}CRITICAL{{x}} hit on {desc} for {{R}}{damage}{{x}} damage!"
                ));
                ctx.roster.broadcast_room(
                    room,
                    Some(name),
                    &format!("{{R}}{name} lands a CRITICAL hit on {desc}!{{x}}"),
                );
            } else {
                player.send(&format!("You hit {desc} for {{R}}{damage}{{x}} damage."));
                ctx.roster
                    .broadcast_room(room, Some(name), &format!("{{R}}{name} hits {desc}.{{x}}"));
            }

            let remaining = ctx.world.mobs_mut().damage(mob.id, damage);
            if remaining == Some(0) {
                handle_mob_death(ctx, player, mob);
            }
        }
    }
}

/// The target's counter-swing.
fn mob_swing(ctx: &Arc<Ctx>, player: &Arc<Player>, mob: &MobInstance) {
    let level = player.lock().level;
    let room = player.room_id();
    let name = player.name.as_str();
    let desc = mob.template.short_description.as_str();

    match draw_swing(ctx, mob.template.level, level) {
        SwingOutcome::Miss => {
            player.send(&format!("The {desc} swings at you but misses!"));
            ctx.roster.broadcast_room(
                room,
                Some(name),
                &format!("{{R}}The {desc} swings at {name} but misses!{{x}}"),
            );
        }
        SwingOutcome::Evaded => {
            player.send(&format!(
                "The {desc} swings at you, but you evade just in time!"
            ));
            ctx.roster.broadcast_room(
                room,
                Some(name),
                &format!("{{R}}The {desc} swings at {name}, but they evade just in time!{{x}}"),
            );
        }
        SwingOutcome::Hit { damage, critical } => {
            if critical {
                player.send(&format!(
                    "The {desc} lands a {{R}}CRITICAL HIT{{x}} on you for {{R}}{damage}{{x}} damage!"
                ));
                ctx.roster.broadcast_room(
                    room,
                    Some(name),
                    &format!("{{R}}The {desc} lands a CRITICAL HIT on {name} for {damage} damage!{{x}}"),
                );
            } else {
                player.send(&format!("The {desc} strikes you for {{R}}{damage}{{x}} damage."));
                ctx.roster.broadcast_room(
                    room,
                    Some(name),
                    &format!("{{R}}The {desc} strikes {name} for {damage} damage.{{x}}"),
                );
            }

            let died = {
                let mut st = player.lock();
                st.hp = (st.hp - damage).max(0);
                st.hp == 0
            };
            if died {
                kill_player(ctx, player, desc);
            }
        }
    }
}

/// The target dropped: leave combat, pay out, destroy the instance.
fn handle_mob_death(ctx: &Ctx, player: &Arc<Player>, mob: &MobInstance) {
    let desc = mob.template.short_description.as_str();
    let name = player.name.as_str();

    let (room, xp, level_ups) = {
        let mut st = player.lock();
        st.exit_combat();
        let xp = xp_for_kill(st.level, mob.template.level);
        st.gold += gold_for_kill(mob.template.level);
        let ups = st.gain_xp(xp);
        (st.room_id, xp, ups)
    };

    player.send(&format!("{{R}}You have slain {desc}!{{x}}"));
    player.send(&format!("You gain {{G}}{xp}{{x}} experience points."));
    player.send(&format!(
        "You loot {{Y}}{}{{x}} gold coins.",
        gold_for_kill(mob.template.level)
    ));
    for up in &level_ups {
        player.send(&format!(
            "\r\n{{W}}CONGRATULATIONS! You have reached level {}!{{x}}",
            up.level
        ));
        player.send(&format!(
            "Your Max HP increased by {}! Your Max MP increased by {}!",
            up.hp_gain, up.mp_gain
        ));
    }
    ctx.roster
        .broadcast_room(room, Some(name), &format!("{{R}}{name} has slain {desc}!{{x}}"));

    ctx.world.mobs_mut().remove(mob.id);

    let st = player.lock();
    let (level, xp_now, next_xp, gold) = (st.level, st.xp, st.next_level_xp, st.gold);
    let pools = (st.hp, st.max_hp, st.mp, st.max_mp, st.stamina, st.max_stamina);
    drop(st);
    if let Err(e) = ctx.store.update_level(name, level, xp_now, next_xp) {
        tracing::warn!(player = name, err = %e, "persist level failed");
    }
    if let Err(e) = ctx
        .store
        .update_pools(name, pools.0, pools.1, pools.2, pools.3, pools.4, pools.5)
    {
        tracing::warn!(player = name, err = %e, "persist pools failed");
    }
    if let Err(e) = ctx.store.update_gold(name, gold) {
        tracing::warn!(player = name, err = %e, "persist gold failed");
    }
}

/// The player dropped: flag dead, announce, and start the respawn timer.
/// The timer is a no-op if the player respawned manually first.
pub fn kill_player(ctx: &Arc<Ctx>, player: &Arc<Player>, killer_desc: &str) {
    let room = {
        let mut st = player.lock();
        st.hp = 0;
        st.dead = true;
        st.exit_combat();
        st.room_id
    };

    player.send(&format!("{{M}}You have been killed by {killer_desc}!{{x}}"));
    ctx.roster.broadcast_room(
        room,
        Some(&player.name),
        &format!("{{M}}{} has been killed by {killer_desc}!{{x}}", player.name),
    );
    player.send("{W}Type 'respawn' to return to life.{x}");

    let ctx = Arc::clone(ctx);
    let player = Arc::clone(player);
    tokio::spawn(async move {
        tokio::time::sleep(RESPAWN_DELAY).await;
        if respawn(&ctx, &player) {
            player.send("{W}You have been resurrected!{x}");
            player.send("{C}Your blurred vision comes to focus and you find yourself next to the Temple Altar.{x}");
            player.send_prompt();
        }
    });
}

/// Return a dead player to the respawn room with half pools. Returns false
/// if the player was not dead (the manual command and the timer race; the
/// first one wins).
pub fn respawn(ctx: &Ctx, player: &Arc<Player>) -> bool {
    let (old_room, pools) = {
        let mut st = player.lock();
        if !st.dead {
            return false;
        }
        st.dead = false;
        st.hp = st.max_hp / 2;
        st.mp = st.max_mp / 2;
        let old = st.room_id;
        st.room_id = ctx.respawn_room;
        (
            old,
            (st.hp, st.max_hp, st.mp, st.max_mp, st.stamina, st.max_stamina),
        )
    };

    let name = player.name.as_str();
    if old_room != ctx.respawn_room {
        ctx.roster
            .broadcast_room(old_room, Some(name), &format!("{name}'s body fades away."));
    }
    ctx.roster.broadcast_room(
        ctx.respawn_room,
        Some(name),
        &format!("{{W}}{name} appears in a flash of divine light.{{x}}"),
    );

    if let Err(e) = ctx.store.update_room(name, ctx.respawn_room) {
        tracing::warn!(player = name, err = %e, "persist respawn room failed");
    }
    if let Err(e) = ctx
        .store
        .update_pools(name, pools.0, pools.1, pools.2, pools.3, pools.4, pools.5)
    {
        tracing::warn!(player = name, err = %e, "persist respawn pools failed");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close_to(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn hit_chance_adjusts_by_level_gap() {
        assert!(close_to(hit_chance(5, 5), 0.80));
        assert!(close_to(hit_chance(6, 5), 0.85));
        assert!(close_to(hit_chance(7, 5), 0.90));
        assert!(close_to(hit_chance(4, 5), 0.75));
        assert!(close_to(hit_chance(3, 5), 0.70));
    }

    #[test]
    fn hit_chance_stays_in_bounds_at_extreme_gaps() {
        // The gap table saturates at +/-2; fifty levels either way stays
        // on the band value, inside the clamp.
        assert!(close_to(hit_chance(1, 51), 0.70));
        assert!(close_to(hit_chance(51, 1), 0.90));
        assert!(hit_chance(1, 51) >= 0.05);
        assert!(hit_chance(51, 1) <= 1.00);
    }

    #[test]
    fn evade_and_crit_bands() {
        assert!(close_to(evade_chance(5, 5), 0.05));
        assert!(close_to(evade_chance(8, 5), 0.15));
        assert!(close_to(evade_chance(2, 5), 0.05)); // floor
        assert!(close_to(crit_chance(8, 5), 0.15));
        assert!(close_to(crit_chance(2, 5), 0.05));
    }

    #[test]
    fn swing_resolution_order_is_miss_evade_crit() {
        // hit_roll beyond the chance: miss, regardless of the other rolls.
        assert_eq!(resolve_swing(5, 5, 0.99, 0.0, 0.0), SwingOutcome::Miss);
        // landed but evaded.
        assert_eq!(resolve_swing(5, 5, 0.1, 0.01, 0.0), SwingOutcome::Evaded);
        // landed, unevaded, crit.
        assert_eq!(
            resolve_swing(5, 5, 0.1, 0.9, 0.01),
            SwingOutcome::Hit {
                damage: 20,
                critical: true
            }
        );
        // plain hit.
        assert_eq!(
            resolve_swing(5, 5, 0.1, 0.9, 0.9),
            SwingOutcome::Hit {
                damage: 10,
                critical: false
            }
        );
    }

    #[test]
    fn five_clean_swings_fell_a_medium_level_three() {
        // Level-3 player vs level-3 medium mob (30 hp): every swing lands,
        // nothing evades, nothing crits. ceil(30/6) = 5 swings.
        let mut hp = 30;
        let mut swings = 0;
        while hp > 0 {
            match resolve_swing(3, 3, 0.5, 0.9, 0.9) {
                SwingOutcome::Hit { damage, .. } => hp -= damage,
                other => panic!("expected a hit, got {other:?}"),
            }
            swings += 1;
        }
        assert_eq!(swings, 5);
        assert_eq!(xp_for_kill(3, 3), 300);
        assert_eq!(gold_for_kill(3), 15);
    }

    #[test]
    fn xp_factors_follow_the_gap_table() {
        assert_eq!(xp_for_kill(1, 6), 1200); // +5 -> x2
        assert_eq!(xp_for_kill(1, 4), 600); // +3 -> x1.5
        assert_eq!(xp_for_kill(1, 3), 375); // +2 -> x1.25
        assert_eq!(xp_for_kill(3, 3), 300); // even -> x1
        assert_eq!(xp_for_kill(4, 3), 225); // -1 -> x0.75
        assert_eq!(xp_for_kill(5, 3), 150); // -2 -> x0.5
        assert_eq!(xp_for_kill(6, 3), 75); // -3 -> x0.25
        assert_eq!(xp_for_kill(7, 3), 0); // -4 -> nothing
        assert_eq!(xp_for_kill(50, 3), 0);
    }
}
