//! Misc small utilities shared across modules.

/// Formats an integer with `,` thousands separators: `1234567` -> `"1,234,567"`.
pub fn comma(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// `"1 point"`, `"1,250 points"`.
pub fn format_points(points: i64) -> String {
    format!(
        "{} point{}",
        comma(points),
        if points == 1 { "" } else { "s" }
    )
}

/// Twitch logins arrive as `#Channel` from chat; the store keeps them lowercase.
pub fn normalize_login(login: &str) -> String {
    login.trim().replacen('#', "", 1).to_lowercase()
}
