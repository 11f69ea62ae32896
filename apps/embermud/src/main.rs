//! embermud: a multi-user text adventure server.
//!
//! One process, one TCP listener, one shared world. Sessions get a task
//! each; the clock drives combat rounds, regeneration, auto-saves, and the
//! reset sweep; characters persist in a single SQLite file next to the
//! binary.

mod areas;
mod chat;
mod clock;
mod combat;
mod commands;
mod config;
mod ctx;
mod db;
mod director;
mod help;
mod player;
mod rng;
mod session;
mod stats;
mod view;
mod world;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};

use crate::clock::{Clock, AUTOSAVE_TICKS, RESET_TICKS};
use crate::ctx::Ctx;
use crate::db::CharacterStore;
use crate::help::HelpSystem;
use crate::rng::Rng64;
use crate::world::World;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,embermud=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = config::parse_args();

    let store = CharacterStore::open(&cfg.db_path)?;
    let data = areas::load_dir(&cfg.areas_dir)?;
    let world = World::new(data.rooms, data.templates, data.resets);
    if !world.has_room(cfg.respawn_room) {
        anyhow::bail!("respawn room {} is not in the loaded world", cfg.respawn_room);
    }
    let help = HelpSystem::load_dir(&cfg.docs_dir);

    let rng = match cfg.world_seed {
        Some(seed) => Rng64::from_seed(seed),
        None => Rng64::from_entropy(),
    };

    let ctx = Ctx::new(world, store, help, cfg.respawn_room, rng);

    let clock = Clock::new();
    register_clock_jobs(&clock, &ctx);
    clock.start();

    // Populate the world before the first player arrives.
    director::process_mob_resets(&ctx);

    let listener = TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("bind {}", cfg.bind))?;
    info!(bind = %cfg.bind, "embermud listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("accept")?;
                info!(peer = %peer, "connection");
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    if let Err(e) = session::handle_conn(ctx, stream).await {
                        warn!(peer = %peer, err = %e, "session ended with error");
                    }
                });
            }
            _ = shutdown_signal() => {
                break;
            }
        }
    }

    info!("shutting down");
    clock.stop();
    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

/// Wire the periodic world behavior onto the clock.
fn register_clock_jobs(clock: &Clock, ctx: &Arc<Ctx>) {
    // Regeneration, once a tick.
    {
        let ctx = Arc::clone(ctx);
        clock.register_tick(
            "regen",
            Arc::new(move || {
                let ctx = Arc::clone(&ctx);
                Box::pin(async move {
                    for p in ctx.roster.snapshot() {
                        p.lock().regen_tick();
                    }
                })
            }),
        );
    }

    // Auto-save every five ticks.
    {
        let ctx = Arc::clone(ctx);
        let ticks = Arc::new(AtomicU32::new(0));
        clock.register_tick(
            "autosave",
            Arc::new(move || {
                let ctx = Arc::clone(&ctx);
                let ticks = Arc::clone(&ticks);
                Box::pin(async move {
                    if (ticks.fetch_add(1, Ordering::SeqCst) + 1) % AUTOSAVE_TICKS != 0 {
                        return;
                    }
                    for p in ctx.roster.snapshot() {
                        if let Err(e) = commands::save_player(&ctx, &p) {
                            warn!(player = %p.name, err = %e, "auto-save failed");
                        }
                    }
                })
            }),
        );
    }

    // Door and mob resets every fifteen ticks.
    {
        let ctx = Arc::clone(ctx);
        let ticks = Arc::new(AtomicU32::new(0));
        clock.register_tick(
            "resets",
            Arc::new(move || {
                let ctx = Arc::clone(&ctx);
                let ticks = Arc::clone(&ticks);
                Box::pin(async move {
                    if (ticks.fetch_add(1, Ordering::SeqCst) + 1) % RESET_TICKS != 0 {
                        return;
                    }
                    director::reset_doors(&ctx);
                    director::process_mob_resets(&ctx);
                })
            }),
        );
    }

    // Combat rounds and the low-health nag, once a pulse per player, each
    // player in its own task so one slow round never delays the rest.
    {
        let ctx = Arc::clone(ctx);
        clock.register_pulse(
            "players",
            Arc::new(move || {
                let ctx = Arc::clone(&ctx);
                Box::pin(async move {
                    for p in ctx.roster.snapshot() {
                        tokio::spawn(combat::pulse_update(Arc::clone(&ctx), p));
                    }
                })
            }),
        );
    }

    // Wandering, once a pulse.
    {
        let ctx = Arc::clone(ctx);
        clock.register_pulse(
            "wandering",
            Arc::new(move || {
                let ctx = Arc::clone(&ctx);
                Box::pin(async move {
                    director::process_wandering(&ctx);
                })
            }),
        );
    }
}
