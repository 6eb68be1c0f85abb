//! Commands that read or rewrite the identity behind Discord and Twitch accounts.

pub mod link;
pub mod points;
pub mod whois;
