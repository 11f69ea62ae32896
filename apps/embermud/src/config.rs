use std::net::SocketAddr;

use crate::world::RoomId;

fn usage_and_exit() -> ! {
    eprintln!(
        "embermud (game server)\n\n\
USAGE:\n  embermud [--bind HOST:PORT] [--db-path FILE] [--areas-dir DIR] [--docs-dir DIR]\n\n\
ENV:\n  EMBERMUD_BIND          default 0.0.0.0:4000\n  EMBERMUD_DB_PATH       default mud.db\n  EMBERMUD_AREAS_DIR     default areas\n  EMBERMUD_DOCS_DIR      default docs\n  EMBERMUD_RESPAWN_ROOM  default 3001\n  EMBERMUD_WORLD_SEED    optional; fixed RNG seed for reproducible worlds\n"
    );
    std::process::exit(2);
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind: SocketAddr,
    pub db_path: String,
    pub areas_dir: String,
    pub docs_dir: String,
    pub respawn_room: RoomId,
    pub world_seed: Option<u64>,
}

pub fn parse_args() -> Config {
    let mut bind: SocketAddr = std::env::var("EMBERMUD_BIND")
        .unwrap_or_else(|_| "0.0.0.0:4000".to_string())
        .parse()
        .unwrap_or_else(|_| usage_and_exit());

    let mut db_path = std::env::var("EMBERMUD_DB_PATH").unwrap_or_else(|_| "mud.db".to_string());
    let mut areas_dir = std::env::var("EMBERMUD_AREAS_DIR").unwrap_or_else(|_| "areas".to_string());
    let mut docs_dir = std::env::var("EMBERMUD_DOCS_DIR").unwrap_or_else(|_| "docs".to_string());

    let respawn_room = std::env::var("EMBERMUD_RESPAWN_ROOM")
        .ok()
        .map(|v| v.parse::<i64>().unwrap_or_else(|_| usage_and_exit()))
        .map(RoomId)
        .unwrap_or(RoomId(3001));

    let world_seed = std::env::var("EMBERMUD_WORLD_SEED")
        .ok()
        .map(|v| v.parse::<u64>().unwrap_or_else(|_| usage_and_exit()));

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--bind" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                bind = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--db-path" => {
                db_path = it.next().unwrap_or_else(|| usage_and_exit());
            }
            "--areas-dir" => {
                areas_dir = it.next().unwrap_or_else(|| usage_and_exit());
            }
            "--docs-dir" => {
                docs_dir = it.next().unwrap_or_else(|| usage_and_exit());
            }
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    Config {
        bind,
        db_path,
        areas_dir,
        docs_dir,
        respawn_room,
        world_seed,
    }
}
