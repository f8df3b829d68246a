use sea_query::{
    Alias as SeaAlias, ColumnDef, Expr as SeaExpr, Func as SeaFunc, Iden, Index, Order as SeaOrder, PostgresQueryBuilder, Query as SeaQuery, Table,
};
use sea_query_binder::{SqlxBinder, SqlxValues};
use sqlx::{Error as DbError, Row, postgres::PgRow};

use crate::{
    Result,
    store::{
        DbCollection, PageData, data,
        db::postgres::{DbInit, DbRow},
        query,
    },
};

use super::{DbConnection, into_query, map_db_err, map_find_err};

#[derive(Debug)]
pub struct NodeCollection {
    conn: DbConnection,
}

#[derive(Iden, Clone, Copy)]
#[iden = "nodes"]
enum CollectionIden {
    Table,

    Id,
    VersionId,
    NodeKey,
    Title,
    Category,
    Data,
    Seq,
}

const COLUMNS: [CollectionIden; 7] = [
    CollectionIden::Id,
    CollectionIden::VersionId,
    CollectionIden::NodeKey,
    CollectionIden::Title,
    CollectionIden::Category,
    CollectionIden::Data,
    CollectionIden::Seq,
];

impl DbCollection for NodeCollection {
    type Item = data::NodeRow;

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
        let row = self.conn.query_one(&sql, values).map_err(map_find_err("nodes", id))?;
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
        let (sql, sql_values) = Self::insert_statement(data)?;
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
                (CollectionIden::NodeKey, model.node_key.into()),
                (CollectionIden::Title, model.title.into()),
                (CollectionIden::Category, model.category.into()),
                (CollectionIden::Data, model.data.into()),
                (CollectionIden::Seq, model.seq.into()),
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

impl DbRow for data::NodeRow {
    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &PgRow) -> std::result::Result<Self, DbError>
    where
        Self: Sized,
    {
        Ok(Self {
            id: row.try_get("id")?,
            version_id: row.try_get("version_id")?,
            node_key: row.try_get("node_key")?,
            title: row.try_get("title")?,
            category: row.try_get("category")?,
            data: row.try_get("data")?,
            seq: row.try_get("seq")?,
        })
    }
}

impl DbInit for NodeCollection {
    fn init(&self) -> Result<()> {
        let sql = [
            Table::create()
                .table(CollectionIden::Table)
                .if_not_exists()
                .col(ColumnDef::new(CollectionIden::Id).string().not_null().primary_key())
                .col(ColumnDef::new(CollectionIden::VersionId).string().not_null())
                .col(ColumnDef::new(CollectionIden::NodeKey).string().not_null())
                .col(ColumnDef::new(CollectionIden::Title).string().not_null())
                .col(ColumnDef::new(CollectionIden::Category).string().not_null())
                .col(ColumnDef::new(CollectionIden::Data).text().not_null())
                .col(ColumnDef::new(CollectionIden::Seq).big_integer().not_null().default(0))
                .build(PostgresQueryBuilder),
            Index::create()
                .name("idx_nodes_version_key")
                .if_not_exists()
                .table(CollectionIden::Table)
                .col(CollectionIden::VersionId)
                .col(CollectionIden::NodeKey)
                .unique()
                .build(PostgresQueryBuilder),
        ];

        self.conn.batch_execute(&sql).map_err(map_db_err)
    }
}

impl NodeCollection {
    pub fn new(conn: &DbConnection) -> Self {
        Self {
            conn: conn.clone(),
        }
    }

    fn insert_statement(data: &data::NodeRow) -> Result<(String, SqlxValues)> {
        let data = data.clone();
        Ok(SeaQuery::insert()
            .into_table(CollectionIden::Table)
            .columns(COLUMNS)
            .values([
                data.id.into(),
                data.version_id.into(),
                data.node_key.into(),
                data.title.into(),
                data.category.into(),
                data.data.into(),
                data.seq.into(),
            ])
            .map_err(map_db_err)?
            .build_sqlx(PostgresQueryBuilder))
    }

    /// Statements replacing every node of `version_id` with `rows`.
    pub fn replace_statements(
        &self,
        version_id: &str,
        rows: &[data::NodeRow],
    ) -> Result<Vec<(String, SqlxValues)>> {
        let mut statements =
            vec![SeaQuery::delete().from_table(CollectionIden::Table).and_where(SeaExpr::col(CollectionIden::VersionId).eq(version_id)).build_sqlx(PostgresQueryBuilder)];
        for row in rows {
            statements.push(Self::insert_statement(row)?);
        }
        Ok(statements)
    }
}
