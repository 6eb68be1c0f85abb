//! This module defines shared database types and the startup bootstrap.
//! The connection pool is created once in `main.rs` and shared through `AppState`.

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;

/// A type alias for the database connection pool (`Pool<Postgres>`).
/// This is used throughout the application to provide a consistent, clear name
/// for the shared database connection state.
pub type DbPool = Pool<Postgres>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS identities (
    id BIGSERIAL PRIMARY KEY,
    authenticated BOOLEAN NOT NULL DEFAULT FALSE,
    admin BOOLEAN NOT NULL DEFAULT FALSE,
    moderator BOOLEAN NOT NULL DEFAULT FALSE,
    points BIGINT NOT NULL DEFAULT 0 CHECK (points >= 0),
    supporter INTEGER,
    merged_into BIGINT REFERENCES identities (id)
);

CREATE TABLE IF NOT EXISTS twitch_users (
    id BIGINT PRIMARY KEY,
    login TEXT NOT NULL,
    display_name TEXT NOT NULL,
    identity BIGINT REFERENCES identities (id),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS twitch_users_login_idx ON twitch_users (login);
CREATE INDEX IF NOT EXISTS twitch_users_identity_idx ON twitch_users (identity);

CREATE TABLE IF NOT EXISTS discord_users (
    id BIGINT PRIMARY KEY,
    global_name TEXT,
    display_name TEXT,
    identity BIGINT REFERENCES identities (id),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS discord_users_identity_idx ON discord_users (identity);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    identity BIGINT REFERENCES identities (id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    expires_at TIMESTAMPTZ NOT NULL DEFAULT NOW() + INTERVAL '14 days',
    last_used TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS sessions_identity_idx ON sessions (identity);
"#;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Creates the tables the bot needs when they are missing. Safe to run on every start.
pub async fn ensure_schema(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    info!(target = "db.init", "schema ready");
    Ok(())
}
