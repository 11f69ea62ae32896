//! `emberio`: byte-level plumbing for a line-oriented MUD connection.
//!
//! Three concerns live here, all of them about the wire and none about the
//! game: splitting a raw telnet byte stream into lines, filtering IAC
//! negotiation out of that stream, and processing `{R}`-style color tokens
//! into ANSI escapes (or stripping them) on the way back out.

pub mod color;
pub mod line;
pub mod telnet;
