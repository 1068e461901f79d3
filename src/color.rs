//! Terminal colors
//!
//! ANSI escape codes used when rendering messages and prompts.

use rand::seq::SliceRandom;

pub const RESET: &str = "\x1b[0m";
pub const WHITE_TEXT: &str = "\x1b[1;97m";
pub const NOTIFICATION: &str = "\x1b[5;92m";

/// Background colors a room may be assigned
pub const ROOM_COLORS: [&str; 7] = [
    "\x1b[0;104m",
    "\x1b[0;105m",
    "\x1b[0;106m",
    "\x1b[1;100m",
    "\x1b[1;103m",
    "\x1b[1;41m",
    "\x1b[1;42m",
];

/// Pick a color for a newly created room
pub fn random_room_color() -> &'static str {
    ROOM_COLORS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(RESET)
}

/// Input prompt shown to a member, e.g. `alice 🏠 LOBBY > `
pub fn prompt(color: &str, username: &str, room: &str) -> String {
    format!("{}{} 🏠 {}{} > ", color, username, room, RESET)
}
