//! Per-client sessions.
//!
//! One task per accepted connection. A writer task drains an unbounded
//! channel onto the socket so nothing upstream ever blocks on a slow
//! client; the reader side runs the greet / login / creation flow and then
//! the play loop. The handler is generic over the stream so the whole
//! session can be driven through an in-memory pipe in tests.

use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use emberio::color;
use emberio::line::{trim_ascii_ws, LineBuffer};
use emberio::telnet::TelnetFilter;

use crate::chat;
use crate::commands::{self, Dispatch};
use crate::ctx::Ctx;
use crate::db::CharacterRecord;
use crate::player::{Player, PlayerState};
use crate::stats::{Attr, Attributes, Class, Race, BONUS_POINTS};

const MAX_NAME_LEN: usize = 20;

/// The read half plus everything needed to turn raw bytes into lines.
struct Conn<R> {
    rd: R,
    telnet: TelnetFilter,
    lines: LineBuffer,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    color: bool,
}

impl<R: AsyncRead + Unpin> Conn<R> {
    /// Write with color processing against the session's current choice.
    fn send(&self, text: &str) {
        let _ = self.tx.send(color::process(text, self.color).into_bytes());
    }

    /// Next complete line, trimmed. `None` on EOF.
    async fn read_line(&mut self) -> anyhow::Result<Option<String>> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(line) = self.lines.pop_line() {
                let line = String::from_utf8_lossy(trim_ascii_ws(&line)).into_owned();
                return Ok(Some(line));
            }

            let n = self.rd.read(&mut buf).await.context("connection read")?;
            if n == 0 {
                return Ok(None);
            }

            let mut data = Vec::new();
            let replies = self.telnet.filter(&buf[..n], &mut data);
            if !replies.is_empty() {
                let _ = self.tx.send(replies);
            }
            if !data.is_empty() && !self.lines.push(&data) {
                anyhow::bail!("line too long");
            }
        }
    }

    /// Keep prompting until a non-empty line arrives (or EOF).
    async fn prompt_line(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        loop {
            self.send(prompt);
            match self.read_line().await? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => return Ok(Some(line)),
            }
        }
    }
}

fn splash(color: bool) -> String {
    if color {
        concat!(
            "\r\n{C}  ___  __  __  ___  ___  ___  __  __  _  _  ___{x}\r\n",
            "{C} | __||  \\/  || _ )| __|| _ \\|  \\/  || | | ||   \\{x}\r\n",
            "{C} | _| | |\\/| || _ \\| _| |   /| |\\/| || |_| || |) |{x}\r\n",
            "{C} |___||_|  |_||___/|___||_|_\\|_|  |_| \\___/ |___/{x}\r\n",
            "\r\n{G}  Welcome to Embermud!{x}\r\n",
            "{C}  A text-based multiplayer adventure{x}\r\n\r\n"
        )
        .to_string()
    } else {
        concat!(
            "\r\n  EMBERMUD\r\n",
            "\r\n  Welcome to Embermud!\r\n",
            "  A text-based multiplayer adventure\r\n\r\n"
        )
        .to_string()
    }
}

fn valid_name(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_NAME_LEN
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Drive one client session from greet to disconnect.
pub async fn handle_conn<S>(ctx: Arc<Ctx>, stream: S) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (rd, mut wr) = tokio::io::split(stream);

    let (tx, mut write_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let writer = tokio::spawn(async move {
        while let Some(b) = write_rx.recv().await {
            if wr.write_all(&b).await.is_err() {
                break;
            }
        }
        let _ = wr.shutdown().await;
    });

    let mut conn = Conn {
        rd,
        telnet: TelnetFilter::new(),
        lines: LineBuffer::new(),
        tx: tx.clone(),
        color: false,
    };

    let result = run_session(&ctx, &mut conn, tx).await;

    // Closing the channel lets the writer flush and exit.
    drop(conn);
    let _ = writer.await;
    result
}

async fn run_session(
    ctx: &Arc<Ctx>,
    conn: &mut Conn<impl AsyncRead + Unpin>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
) -> anyhow::Result<()> {
    // Color first, so even the splash honors the choice.
    conn.send("Would you like to enable ANSI colors? (yes/no): ");
    let Some(answer) = conn.read_line().await? else {
        return Ok(());
    };
    conn.color = !answer.eq_ignore_ascii_case("no");

    conn.send(&splash(conn.color));

    // Name.
    let name = loop {
        let Some(name) = conn
            .prompt_line("{W}What's your name, traveler? {x}")
            .await?
        else {
            return Ok(());
        };
        if !valid_name(&name) {
            conn.send("Names are letters, numbers, _ or -, at most 20 characters.\r\n");
            continue;
        }
        break name;
    };

    if ctx.roster.contains(&name) {
        conn.send("That character is already in the world.\r\nGoodbye!\r\n");
        return Ok(());
    }

    let (record, created) = if ctx.store.exists(&name) {
        match ctx.store.load(&name) {
            Ok(Some(rec)) => (rec, false),
            Ok(None) | Err(_) => {
                conn.send("Error loading character.\r\n");
                return Ok(());
            }
        }
    } else {
        match create_character(ctx, conn, &name).await? {
            Some(rec) => (rec, true),
            None => return Ok(()),
        }
    };

    // The character's room has to exist, or the session is unusable.
    if !ctx.world.has_room(record.room_id) {
        tracing::error!(player = %name, room = %record.room_id, "unknown room on load");
        conn.send("Error loading game world.\r\n");
        return Ok(());
    }

    // Reconcile the stored color preference with tonight's answer.
    if conn.color != record.color_enabled {
        if let Err(e) = ctx.store.update_color(&name, conn.color) {
            tracing::warn!(player = %name, err = %e, "persist color failed");
        }
    }

    let player = Arc::new(Player::new(
        name.clone(),
        tx,
        PlayerState::from_record(&record),
        conn.color,
    ));

    if created {
        player.send(&format!(
            "Character created! Welcome, {} the {} {}!",
            name,
            record.race.as_str(),
            record.class.as_str()
        ));
    } else {
        player.send(&format!("Welcome back, {name}!"));
    }

    ctx.roster.add(Arc::clone(&player));
    chat::announce(ctx, &name, "connected");
    player.send(&crate::view::describe_room(ctx, &player, record.room_id));

    tracing::info!(player = %name, "entered the world");
    let result = play_loop(ctx, conn, &player).await;

    ctx.roster.remove(&name);
    chat::announce(ctx, &name, "disconnected");
    tracing::info!(player = %name, "left the world");
    result
}

/// The command loop: prompt, read, dispatch, respond.
async fn play_loop(
    ctx: &Arc<Ctx>,
    conn: &mut Conn<impl AsyncRead + Unpin>,
    player: &Arc<Player>,
) -> anyhow::Result<()> {
    loop {
        player.send_prompt();
        let Some(line) = conn.read_line().await? else {
            return Ok(());
        };
        if line.is_empty() {
            continue;
        }

        match commands::dispatch(ctx, player, &line) {
            Dispatch::Response(resp) => {
                if !resp.is_empty() {
                    player.send(&resp);
                }
            }
            Dispatch::Silent => {}
            Dispatch::Quit(resp) => {
                player.send(&resp);
                return Ok(());
            }
        }
    }
}

/// The creation flow: confirm, race, class, bonus points, persist.
async fn create_character(
    ctx: &Arc<Ctx>,
    conn: &mut Conn<impl AsyncRead + Unpin>,
    name: &str,
) -> anyhow::Result<Option<CharacterRecord>> {
    conn.send("Character not found. Would you like to create a new character? (yes/no) ");
    let Some(answer) = conn.read_line().await? else {
        return Ok(None);
    };
    if !answer.eq_ignore_ascii_case("yes") {
        conn.send("Goodbye!\r\n");
        return Ok(None);
    }

    // Race.
    conn.send("\r\nChoose your race:\r\n");
    for (i, race) in Race::ALL.iter().enumerate() {
        conn.send(&format!("{}. {}\r\n", i + 1, race.as_str()));
    }
    let race = loop {
        let Some(choice) = conn.prompt_line("Enter your choice (1-4): ").await? else {
            return Ok(None);
        };
        match choice.parse::<usize>() {
            Ok(n) if (1..=4).contains(&n) => break Race::ALL[n - 1],
            _ => conn.send("Invalid choice. Please try again.\r\n"),
        }
    };

    // Class.
    conn.send("\r\nChoose your class:\r\n");
    for (i, class) in Class::ALL.iter().enumerate() {
        conn.send(&format!("{}. {}\r\n", i + 1, class.as_str()));
    }
    let class = loop {
        let Some(choice) = conn.prompt_line("Enter your choice (1-4): ").await? else {
            return Ok(None);
        };
        match choice.parse::<usize>() {
            Ok(n) if (1..=4).contains(&n) => break Class::ALL[n - 1],
            _ => conn.send("Invalid choice. Please try again.\r\n"),
        }
    };

    // Bonus points.
    let mut attrs = race.base_attributes();
    let mut remaining = BONUS_POINTS;
    conn.send(&format!(
        "\r\nYou have {remaining} bonus points to allocate to your stats.\r\n"
    ));
    conn.send("Current stats based on your race:\r\n");
    for attr in Attr::ALL {
        conn.send(&format!("{}: {}\r\n", attr.as_str(), attrs.get(attr)));
    }

    while remaining > 0 {
        conn.send(&format!("\r\nRemaining points: {remaining}\r\n"));
        let Some(input) = conn
            .prompt_line("Enter stat to increase (STR/DEX/CON/INT/WIS/PRE) or 'done' to finish: ")
            .await?
        else {
            return Ok(None);
        };
        if input.eq_ignore_ascii_case("done") {
            break;
        }
        let Some(attr) = Attr::parse(&input) else {
            conn.send("Invalid stat. Please try again.\r\n");
            continue;
        };
        if !attrs.raise(attr) {
            conn.send("Cannot increase stat above 18.\r\n");
            continue;
        }
        remaining -= 1;
    }

    match persist_new_character(ctx, name, race, class, &attrs) {
        Ok(rec) => Ok(Some(rec)),
        Err(e) => {
            tracing::warn!(player = name, err = %e, "character creation failed");
            conn.send("Error creating character. Please try again.\r\n");
            Ok(None)
        }
    }
}

/// Insert the row, then shape the pools by class and write them back.
fn persist_new_character(
    ctx: &Ctx,
    name: &str,
    race: Race,
    class: Class,
    attrs: &Attributes,
) -> anyhow::Result<CharacterRecord> {
    ctx.store
        .create(name, race, class, attrs, ctx.respawn_room)?;

    let (max_hp, max_mp) = class.starting_pools(attrs);
    ctx.store
        .update_pools(name, max_hp, max_hp, max_mp, max_mp, 100, 100)?;

    ctx.store
        .load(name)?
        .ok_or_else(|| anyhow::anyhow!("character vanished after create"))
}
