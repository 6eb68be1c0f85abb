// Central constants for caching and limits.
pub const SWEEPS_PER_EXPIRATION: u32 = 10; // sweeps per expiration window (~110% worst-case staleness)
pub const USER_CACHE_TTL_MS: u64 = 60 * 60 * 1000; // Twitch + Discord user caches
pub const SESSION_CACHE_TTL_MS: u64 = 60 * 60 * 1000;
pub const MAX_CACHE_TTL_MS: u64 = 365 * 24 * 60 * 60 * 1000; // longer lifetimes are clamped
pub const CACHE_RETRIEVE_TIMEOUT_MS: u64 = 10_000;
pub const SESSION_LENGTH_DAYS: i64 = 14;

pub const USER_NOT_FOUND: &str = "User not found!";
pub const SESSION_NOT_FOUND: &str = "Session not found!";

// Embed colours.
pub const COLOR_OK: u32 = 0x5865F2;
pub const COLOR_ERROR: u32 = 0xED4245;
