//! Cache keys and the lenient numeric normalization applied on lookup.
//!
//! Platform ids reach the caches from many call sites: serenity `UserId`s,
//! database `BIGINT`s, strings pulled out of command options or OAuth callbacks.
//! Normalizing numeric-looking text to an integer lets all of those land on the
//! same slot.
use serenity::model::id::UserId;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Numeric(i64),
    Text(String),
}

/// Outcome of trying to read a key as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyParse {
    Parsed(i64),
    Unparsed,
}

impl CacheKey {
    /// Strict integer parse (surrounding whitespace is ignored, trailing garbage is not).
    pub fn parse_numeric(&self) -> KeyParse {
        match self {
            CacheKey::Numeric(n) => KeyParse::Parsed(*n),
            CacheKey::Text(s) => match s.trim().parse::<i64>() {
                Ok(n) => KeyParse::Parsed(n),
                Err(_) => KeyParse::Unparsed,
            },
        }
    }

    /// The slot a normalized lookup resolves to: the integer form when the key parses,
    /// the key itself otherwise.
    pub fn normalized(self) -> CacheKey {
        match self.parse_numeric() {
            KeyParse::Parsed(n) => CacheKey::Numeric(n),
            KeyParse::Unparsed => self,
        }
    }

    /// Every slot that may hold the same logical entry as this key.
    /// The key itself always comes first.
    pub(crate) fn aliases(&self) -> Vec<CacheKey> {
        let mut out = vec![self.clone()];
        if let KeyParse::Parsed(n) = self.parse_numeric() {
            for alt in [CacheKey::Numeric(n), CacheKey::Text(n.to_string())] {
                if !out.contains(&alt) {
                    out.push(alt);
                }
            }
        }
        out
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Numeric(n) => write!(f, "{n}"),
            CacheKey::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for CacheKey {
    fn from(n: i64) -> Self {
        CacheKey::Numeric(n)
    }
}

impl From<i32> for CacheKey {
    fn from(n: i32) -> Self {
        CacheKey::Numeric(n.into())
    }
}

impl From<u64> for CacheKey {
    fn from(n: u64) -> Self {
        // Snowflakes fit in i63; anything larger can only be matched textually.
        match i64::try_from(n) {
            Ok(n) => CacheKey::Numeric(n),
            Err(_) => CacheKey::Text(n.to_string()),
        }
    }
}

impl From<UserId> for CacheKey {
    fn from(id: UserId) -> Self {
        id.get().into()
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        CacheKey::Text(s.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        CacheKey::Text(s)
    }
}

impl From<&String> for CacheKey {
    fn from(s: &String) -> Self {
        CacheKey::Text(s.clone())
    }
}
