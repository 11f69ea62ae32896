//! ROM-style color tokens.
//!
//! Outbound text may carry `{R}`-style tokens. When a player has color
//! enabled the tokens become ANSI SGR escapes; when disabled they are
//! stripped so the markup never reaches the client.
//!
//! Token table: `{R}` red, `{G}` green, `{Y}` yellow, `{B}` blue, `{M}`
//! magenta, `{C}` cyan, `{W}` white, `{D}` dark gray, `{x}` reset.

pub const RESET: &str = "\x1b[0m";

const TOKENS: [(&str, &str); 9] = [
    ("{R}", "\x1b[31m"),
    ("{G}", "\x1b[32m"),
    ("{Y}", "\x1b[33m"),
    ("{B}", "\x1b[34m"),
    ("{M}", "\x1b[35m"),
    ("{C}", "\x1b[36m"),
    ("{W}", "\x1b[37m"),
    ("{D}", "\x1b[90m"),
    ("{x}", RESET),
];

/// True if the text contains any recognized color token.
pub fn has_tokens(text: &str) -> bool {
    TOKENS.iter().any(|(tok, _)| text.contains(tok))
}

/// Substitute (or strip) color tokens.
///
/// With color enabled, a message that used any color but did not end on a
/// reset gets one appended, so markup mistakes never bleed into the next
/// line the client sees.
pub fn process(text: &str, color_enabled: bool) -> String {
    let mut out = text.to_string();
    for (tok, ansi) in TOKENS {
        if !out.contains(tok) {
            continue;
        }
        out = out.replace(tok, if color_enabled { ansi } else { "" });
    }

    if color_enabled && !out.ends_with(RESET) {
        let colored = TOKENS.iter().any(|(_, ansi)| out.contains(ansi));
        if colored {
            out.push_str(RESET);
        }
    }

    out
}

/// Length of the text as the client will see it: color tokens excluded.
pub fn visible_len(text: &str) -> usize {
    let mut stripped = text.to_string();
    for (tok, _) in TOKENS {
        stripped = stripped.replace(tok, "");
    }
    stripped.chars().count()
}
