use std::str::FromStr;

use sea_query::{
    Alias as SeaAlias, ColumnDef, Expr as SeaExpr, Func as SeaFunc, Iden, Index, LockType, Order as SeaOrder, PostgresQueryBuilder, Query as SeaQuery, Table,
};
use sea_query_binder::{SqlxBinder, SqlxValues};
use sqlx::{Error as DbError, Row, postgres::PgRow};

use crate::{
    Result,
    store::{
        DbCollection, PageData,
        data::{self, VersionStatus},
        db::postgres::{DbInit, DbRow},
        query,
    },
};

use super::{DbConnection, into_query, map_db_err, map_find_err};

#[derive(Debug)]
pub struct VersionCollection {
    conn: DbConnection,
}

#[derive(Iden, Clone, Copy)]
#[iden = "versions"]
enum CollectionIden {
    Table,

    Id,
    GraphId,
    VersionNumber,
    Status,
    PublicToken,
    VisitCount,
    CreatedAt,
}

const COLUMNS: [CollectionIden; 7] = [
    CollectionIden::Id,
    CollectionIden::GraphId,
    CollectionIden::VersionNumber,
    CollectionIden::Status,
    CollectionIden::PublicToken,
    CollectionIden::VisitCount,
    CollectionIden::CreatedAt,
];

impl DbCollection for VersionCollection {
    type Item = data::VersionRow;

    fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        let (sql, values) = SeaQuery::select()
            .from(CollectionIden::Table)
            .expr(SeaFunc::count(SeaExpr::col(CollectionIden::Id)))
            .and_where(SeaExpr::col(CollectionIden::Id).eq(id))
            .build_sqlx(PostgresQueryBuilder);

        let count = self.conn.query_one(sql.as_str(), values).map(|row| row.get::<i64, usize>(0)).map_err(map_db_err)?;

        Ok(count > 0)
    }

    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item> {
        let (sql, values) =
            SeaQuery::select().from(CollectionIden::Table).columns(COLUMNS).and_where(SeaExpr::col(CollectionIden::Id).eq(id)).build_sqlx(PostgresQueryBuilder);
        let row = self.conn.query_one(&sql, values).map_err(map_find_err("versions", id))?;
        Self::Item::from_row(&row).map_err(map_db_err)
    }

    fn query(
        &self,
        q: &query::Query,
    ) -> Result<PageData<Self::Item>> {
        let filter = into_query(q);

        let mut count_query = SeaQuery::select();
        count_query.from(CollectionIden::Table).expr(SeaFunc::count(SeaExpr::col(CollectionIden::Id)));

        let mut query = SeaQuery::select();
        query.columns(COLUMNS).from(CollectionIden::Table);

        if !filter.is_empty() {
            count_query.cond_where(filter.clone());
            query.cond_where(filter);
        }

        for (order, rev) in q.orders().iter() {
            query.order_by(SeaAlias::new(order), if *rev { SeaOrder::Desc } else { SeaOrder::Asc });
        }
        let (sql, values) = query.limit(q.limit() as u64).offset(q.offset() as u64).build_sqlx(PostgresQueryBuilder);

        let (count_sql, count_values) = count_query.build_sqlx(PostgresQueryBuilder);
        let count = self.conn.query_one(count_sql.as_str(), count_values).map_err(map_db_err)?.get::<i64, usize>(0) as usize;
        let rows = self.conn.query(&sql, values).map_err(map_db_err)?.iter().map(Self::Item::from_row).collect::<std::result::Result<Vec<_>, _>>().map_err(map_db_err)?;
        Ok(PageData {
            count,
            page_size: q.limit(),
            page_num: q.offset() / q.limit() + 1,
            page_count: count.div_ceil(q.limit()),
            rows,
        })
    }

    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let data = data.clone();
        let (sql, sql_values) = SeaQuery::insert()
            .into_table(CollectionIden::Table)
            .columns(COLUMNS)
            .values([
                data.id.into(),
                data.graph_id.into(),
                data.version_number.into(),
                data.status.as_ref().into(),
                data.public_token.into(),
                data.visit_count.into(),
                data.created_at.into(),
            ])
            .map_err(map_db_err)?
            .build_sqlx(PostgresQueryBuilder);

        let result = self.conn.execute(sql.as_str(), sql_values).map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let model = data.clone();
        let (sql, sql_values) = SeaQuery::update()
            .table(CollectionIden::Table)
            .values([
                (CollectionIden::GraphId, model.graph_id.into()),
                (CollectionIden::VersionNumber, model.version_number.into()),
                (CollectionIden::Status, model.status.as_ref().into()),
                (CollectionIden::PublicToken, model.public_token.into()),
                (CollectionIden::VisitCount, model.visit_count.into()),
            ])
            .and_where(SeaExpr::col(CollectionIden::Id).eq(data.id()))
            .build_sqlx(PostgresQueryBuilder);

        let result = self.conn.execute(sql.as_str(), sql_values).map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    fn delete(
        &self,
        id: &str,
    ) -> Result<bool> {
        let (sql, values) =
            SeaQuery::delete().from_table(CollectionIden::Table).and_where(SeaExpr::col(CollectionIden::Id).eq(id)).build_sqlx(PostgresQueryBuilder);

        let result = self.conn.execute(sql.as_str(), values).map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

impl DbRow for data::VersionRow {
    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &PgRow) -> std::result::Result<Self, DbError>
    where
        Self: Sized,
    {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            graph_id: row.try_get("graph_id")?,
            version_number: row.try_get("version_number")?,
            status: VersionStatus::from_str(&status).map_err(|e| DbError::Decode(Box::new(e)))?,
            public_token: row.try_get("public_token")?,
            visit_count: row.try_get("visit_count")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl DbInit for VersionCollection {
    fn init(&self) -> Result<()> {
        let sql = [
            Table::create()
                .table(CollectionIden::Table)
                .if_not_exists()
                .col(ColumnDef::new(CollectionIden::Id).string().not_null().primary_key())
                .col(ColumnDef::new(CollectionIden::GraphId).string().not_null())
                .col(ColumnDef::new(CollectionIden::VersionNumber).integer().not_null())
                .col(ColumnDef::new(CollectionIden::Status).string().not_null())
                .col(ColumnDef::new(CollectionIden::PublicToken).string().null())
                .col(ColumnDef::new(CollectionIden::VisitCount).big_integer().not_null().default(0))
                .col(ColumnDef::new(CollectionIden::CreatedAt).big_integer().default(0))
                .build(PostgresQueryBuilder),
            Index::create()
                .name("idx_versions_graph_number")
                .if_not_exists()
                .table(CollectionIden::Table)
                .col(CollectionIden::GraphId)
                .col(CollectionIden::VersionNumber)
                .unique()
                .build(PostgresQueryBuilder),
            Index::create()
                .name("idx_versions_public_token")
                .if_not_exists()
                .table(CollectionIden::Table)
                .col(CollectionIden::PublicToken)
                .unique()
                .build(PostgresQueryBuilder),
            single_published_index(),
        ];

        self.conn.batch_execute(&sql).map_err(map_db_err)
    }
}

impl VersionCollection {
    pub fn new(conn: &DbConnection) -> Self {
        Self {
            conn: conn.clone(),
        }
    }

    /// Demote every other published version of the graph, then promote `version_id`.
    ///
    /// The version rows of the graph are locked first so concurrent publishes serialize.
    pub fn publish_statements(
        graph_id: &str,
        version_id: &str,
    ) -> Vec<(String, SqlxValues)> {
        let lock = SeaQuery::select()
            .column(CollectionIden::Id)
            .from(CollectionIden::Table)
            .and_where(SeaExpr::col(CollectionIden::GraphId).eq(graph_id))
            .lock(LockType::Update)
            .build_sqlx(PostgresQueryBuilder);
        let demote = SeaQuery::update()
            .table(CollectionIden::Table)
            .value(CollectionIden::Status, VersionStatus::Draft.as_ref())
            .and_where(SeaExpr::col(CollectionIden::GraphId).eq(graph_id))
            .and_where(SeaExpr::col(CollectionIden::Status).eq(VersionStatus::Published.as_ref()))
            .and_where(SeaExpr::col(CollectionIden::Id).ne(version_id))
            .build_sqlx(PostgresQueryBuilder);
        let promote = SeaQuery::update()
            .table(CollectionIden::Table)
            .value(CollectionIden::Status, VersionStatus::Published.as_ref())
            .and_where(SeaExpr::col(CollectionIden::Id).eq(version_id))
            .and_where(SeaExpr::col(CollectionIden::GraphId).eq(graph_id))
            .build_sqlx(PostgresQueryBuilder);
        vec![lock, demote, promote]
    }

    /// Atomically bump the visit counter of the version holding `token`.
    pub fn increment_visits(
        &self,
        token: &str,
    ) -> Result<bool> {
        let (sql, values) = SeaQuery::update()
            .table(CollectionIden::Table)
            .value(CollectionIden::VisitCount, SeaExpr::col(CollectionIden::VisitCount).add(1))
            .and_where(SeaExpr::col(CollectionIden::PublicToken).eq(token))
            .build_sqlx(PostgresQueryBuilder);

        let result = self.conn.execute(sql.as_str(), values).map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

/// At most one published version per graph.
fn single_published_index() -> String {
    format!(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS "idx_versions_single_published" ON "{}" ("{}") WHERE "{}" = '{}'"#,
        CollectionIden::Table.to_string(),
        CollectionIden::GraphId.to_string(),
        CollectionIden::Status.to_string(),
        VersionStatus::Published.as_ref()
    )
}
