pub mod queries;

use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Apply migrations with the privileged role. Only the init binary calls
/// this; the services connect as the RLS-constrained application role.
pub async fn run_migrations(admin_url: &str) -> Result<(), anyhow::Error> {
    let pool = PgPoolOptions::new().max_connections(1).connect(admin_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    pool.close().await;
    Ok(())
}

/// A transaction bound to one tenant. `set_config('app.current_guild', …,
/// true)` is transaction-local, so the row-level-security policies on games,
/// templates, and participants observe the guild id for exactly the lifetime
/// of this scope. Dropping the scope without `commit` rolls back.
pub struct GuildScope<'a> {
    tx: Transaction<'a, Postgres>,
    guild_id: i64,
}

impl<'a> GuildScope<'a> {
    pub async fn begin(pool: &PgPool, guild_id: i64) -> Result<GuildScope<'_>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("SELECT set_config('app.current_guild', $1, true)")
            .bind(guild_id.to_string())
            .execute(&mut *tx)
            .await?;
        Ok(GuildScope { tx, guild_id })
    }

    pub fn guild_id(&self) -> i64 {
        self.guild_id
    }

    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}

/// Bind a daemon fire-transaction to the guild that owns the row being
/// fired, so status updates on the games table pass the isolation policy.
pub async fn bind_guild(
    tx: &mut Transaction<'_, Postgres>,
    guild_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT set_config('app.current_guild', $1, true)")
        .bind(guild_id.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}
