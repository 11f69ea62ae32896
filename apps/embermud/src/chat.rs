//! Out-of-character chat: a global channel outside the world fiction.

use crate::ctx::Ctx;
use crate::player::Player;

/// Handle `ooc` / `ooc <text>`. The input arrives with the `ooc` token
/// still attached so the message body keeps its original spacing.
pub fn handle_ooc(ctx: &Ctx, player: &Player, input: &str) {
    if input.trim() == "ooc" {
        player.send("OOC (Out of Character) lets you chat with other players.\r\nUsage: ooc <message>");
        return;
    }
    let Some(message) = input.strip_prefix("ooc ") else {
        return;
    };
    ctx.roster
        .broadcast_all(None, &format!("[OOC] {}: {}", player.name, message));
}

/// Connect/disconnect announcements.
pub fn announce(ctx: &Ctx, who: &str, what: &str) {
    ctx.roster
        .broadcast_all(Some(who), &format!("[OOC] {who} has {what}."));
}
