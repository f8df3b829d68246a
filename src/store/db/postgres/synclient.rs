use std::{future::Future, sync::Arc, time::Duration};

use sea_query_binder::SqlxValues;
use sqlx::{
    Database, Error, IntoArguments, PgPool, Postgres,
    postgres::{PgPoolOptions, PgRow},
};
use tokio::{
    runtime::{Handle, Runtime},
    task::block_in_place,
};

/// Blocking facade over a postgres pool, driven by a dedicated runtime.
#[derive(Debug, Clone)]
pub struct SynClient {
    pool: PgPool,

    runtime: Arc<Runtime>,
}

impl SynClient {
    pub fn connect(
        db_url: &str,
        runtime: Arc<Runtime>,
    ) -> Result<Self, Error> {
        let pool = block_on(&runtime, async move { PgPoolOptions::new().acquire_timeout(Duration::from_secs(5)).max_connections(200).connect(db_url).await })?;

        Ok(Self {
            pool,
            runtime,
        })
    }

    pub fn query_one<'q, A>(
        &self,
        sql: &'q str,
        params: A,
    ) -> Result<PgRow, Error>
    where
        A: IntoArguments<'q, Postgres> + 'q,
    {
        block_on(&self.runtime, async move {
            let mut conn = self.pool.acquire().await?;

            sqlx::query_with(sql, params).fetch_one(&mut *conn).await
        })
    }

    pub fn query<'q, A>(
        &self,
        sql: &'q str,
        params: A,
    ) -> Result<Vec<PgRow>, Error>
    where
        A: IntoArguments<'q, Postgres> + 'q,
    {
        block_on(&self.runtime, async move {
            let mut conn = self.pool.acquire().await?;

            sqlx::query_with(sql, params).fetch_all(&mut *conn).await
        })
    }

    pub fn execute<'q, A>(
        &self,
        sql: &'q str,
        params: A,
    ) -> Result<<Postgres as Database>::QueryResult, Error>
    where
        A: IntoArguments<'q, Postgres> + 'q,
    {
        block_on(&self.runtime, async move {
            let mut conn = self.pool.acquire().await?;

            sqlx::query_with(sql, params).execute(&mut *conn).await
        })
    }

    pub fn batch_execute(
        &self,
        sqls: &[String],
    ) -> Result<(), Error> {
        block_on(&self.runtime, async move {
            let mut tx = self.pool.begin().await?;

            for sql in sqls {
                sqlx::query(sql).execute(&mut *tx).await?;
            }
            tx.commit().await
        })
    }

    /// Run bound statements in one transaction, returning rows affected per statement.
    pub fn transaction(
        &self,
        statements: Vec<(String, SqlxValues)>,
    ) -> Result<Vec<u64>, Error> {
        block_on(&self.runtime, async move {
            let mut tx = self.pool.begin().await?;

            let mut affected = Vec::with_capacity(statements.len());
            for (sql, values) in statements {
                let result = sqlx::query_with(&sql, values).execute(&mut *tx).await?;
                affected.push(result.rows_affected());
            }
            tx.commit().await?;
            Ok(affected)
        })
    }
}

fn block_on<F: Future>(
    runtime: &Runtime,
    fut: F,
) -> F::Output {
    if Handle::try_current().is_ok() {
        block_in_place(|| runtime.block_on(fut))
    } else {
        runtime.block_on(fut)
    }
}
