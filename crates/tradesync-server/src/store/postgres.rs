//! PostgreSQL store
//!
//! Every unit of work is one `READ COMMITTED` transaction. Check-then-act on a
//! natural key is made atomic by a transaction-scoped advisory lock per key
//! (taken in lock-id order) followed by `SELECT ... FOR UPDATE`; the
//! primary key is the last line of defence. Snapshot replacement takes
//! `EXCLUSIVE` on the table, which keeps out other writers but lets plain
//! readers keep reading the last committed snapshot until commit.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::query_builder::Separated;
use sqlx::{FromRow, Postgres, QueryBuilder, Transaction};

use super::{Repository, SnapshotRepository, Store, StoreError, StoreResult, UnitOfWork};
use crate::models::{Account, Deal, Entity, KeyedEntity, Order, Position};

/// Rows per multi-row INSERT; keeps bind parameters well under the protocol limit.
const INSERT_CHUNK_SIZE: usize = 1000;

/// One transaction-scoped advisory lock per distinct lock id, taken in
/// lock-id order. Distinct keys may share a lock id.
const LOCK_KEYS_SQL: &str = r#"
    SELECT pg_advisory_xact_lock(l.id)
    FROM (
        SELECT DISTINCT hashtextextended($1 || ':' || k.key::text, 0) AS id
        FROM unnest($2::bigint[]) AS k(key)
    ) AS l
    ORDER BY l.id
"#;

/// Column layout of a table holding one entity kind
pub trait PgTable: Entity + for<'r> FromRow<'r, PgRow> {
    const TABLE: &'static str;

    /// Columns written on insert and update, in bind order
    const COLUMNS: &'static [&'static str];

    fn bind_columns<'args>(&'args self, row: &mut Separated<'_, 'args, Postgres, &'static str>);
}

/// A table keyed by a single `BIGINT` natural key
pub trait PgKeyedTable: PgTable + KeyedEntity<Key = i64> {
    const KEY_COLUMN: &'static str;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The committed position snapshot, in insertion order
    pub async fn positions(&self) -> StoreResult<Vec<Position>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY id",
            column_list::<Position>(),
            Position::TABLE
        );
        Ok(sqlx::query_as::<_, Position>(&sql).fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgUnitOfWork;

    async fn begin(&self) -> StoreResult<PgUnitOfWork> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;
        Ok(PgUnitOfWork { tx })
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// An open transaction; dropping it rolls back
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn column_list<E: PgTable>() -> String {
    E::COLUMNS.join(", ")
}

fn map_write_error<E: KeyedEntity>(err: sqlx::Error, key: E::Key) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::duplicate(E::KIND, key)
        },
        _ => StoreError::Sqlx(err),
    }
}

#[async_trait]
impl<E: PgKeyedTable> Repository<E> for PgUnitOfWork {
    async fn lock_keys(&mut self, keys: &[i64]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        sqlx::query(LOCK_KEYS_SQL)
            .bind(E::KIND.as_str())
            .bind(keys)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn find(&mut self, key: i64) -> StoreResult<Option<E>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 FOR UPDATE",
            column_list::<E>(),
            E::TABLE,
            E::KEY_COLUMN
        );

        let row = sqlx::query_as::<_, E>(&sql)
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row)
    }

    async fn update(&mut self, record: &E) -> StoreResult<()> {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("UPDATE {} SET ({}) = ROW(", E::TABLE, column_list::<E>()));
        {
            let mut row = query_builder.separated(", ");
            record.bind_columns(&mut row);
        }
        query_builder.push("), updated_at = NOW() WHERE ");
        query_builder.push(E::KEY_COLUMN);
        query_builder.push(" = ");
        query_builder.push_bind(record.key());

        query_builder
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_write_error::<E>(e, record.key()))?;

        Ok(())
    }

    async fn insert(&mut self, record: &E) -> StoreResult<()> {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} ({}) ", E::TABLE, column_list::<E>()));
        query_builder.push_values(std::iter::once(record), |mut b, record| {
            record.bind_columns(&mut b);
        });

        query_builder
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_write_error::<E>(e, record.key()))?;

        Ok(())
    }
}

#[async_trait]
impl SnapshotRepository<Position> for PgUnitOfWork {
    async fn clear(&mut self) -> StoreResult<u64> {
        sqlx::query("LOCK TABLE positions IN EXCLUSIVE MODE")
            .execute(&mut *self.tx)
            .await?;

        let result = sqlx::query("DELETE FROM positions")
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_all(&mut self, records: &[Position]) -> StoreResult<()> {
        for chunk in records.chunks(INSERT_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} ({}) ",
                Position::TABLE,
                column_list::<Position>()
            ));
            query_builder.push_values(chunk, |mut b, position| {
                position.bind_columns(&mut b);
            });

            query_builder.build().execute(&mut *self.tx).await?;
        }

        Ok(())
    }
}

// ============================================================================
// Column layouts
// ============================================================================

impl PgTable for Order {
    const TABLE: &'static str = "orders";
    const COLUMNS: &'static [&'static str] = &[
        "ticket",
        "symbol",
        "time_setup",
        "time_setup_msc",
        "time_done",
        "time_done_msc",
        "time_expiration",
        "order_type",
        "type_time",
        "type_filling",
        "state",
        "magic",
        "position_id",
        "position_by_id",
        "reason",
        "volume_initial",
        "volume_current",
        "price_open",
        "sl",
        "tp",
        "price_current",
        "price_stoplimit",
        "comment",
        "external_id",
        "time_setup_normalized",
        "time_setup_msc_normalized",
        "time_done_normalized",
        "time_done_msc_normalized",
        "time_expiration_normalized",
    ];

    fn bind_columns<'args>(&'args self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
        row.push_bind(self.ticket)
            .push_bind(&self.symbol)
            .push_bind(self.time_setup)
            .push_bind(self.time_setup_msc)
            .push_bind(self.time_done)
            .push_bind(self.time_done_msc)
            .push_bind(self.time_expiration)
            .push_bind(self.order_type)
            .push_bind(self.type_time)
            .push_bind(self.type_filling)
            .push_bind(self.state)
            .push_bind(self.magic)
            .push_bind(self.position_id)
            .push_bind(self.position_by_id)
            .push_bind(self.reason)
            .push_bind(self.volume_initial)
            .push_bind(self.volume_current)
            .push_bind(self.price_open)
            .push_bind(self.sl)
            .push_bind(self.tp)
            .push_bind(self.price_current)
            .push_bind(self.price_stoplimit)
            .push_bind(&self.comment)
            .push_bind(&self.external_id)
            .push_bind(self.time_setup_normalized)
            .push_bind(self.time_setup_msc_normalized)
            .push_bind(self.time_done_normalized)
            .push_bind(self.time_done_msc_normalized)
            .push_bind(self.time_expiration_normalized);
    }
}

impl PgKeyedTable for Order {
    const KEY_COLUMN: &'static str = "ticket";
}

impl PgTable for Deal {
    const TABLE: &'static str = "deals";
    const COLUMNS: &'static [&'static str] = &[
        "ticket",
        "symbol",
        "order_ticket",
        "time",
        "time_msc",
        "deal_type",
        "entry",
        "magic",
        "position_id",
        "reason",
        "volume",
        "price",
        "commission",
        "swap",
        "profit",
        "fee",
        "comment",
        "external_id",
        "time_normalized",
        "time_msc_normalized",
    ];

    fn bind_columns<'args>(&'args self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
        row.push_bind(self.ticket)
            .push_bind(&self.symbol)
            .push_bind(self.order_ticket)
            .push_bind(self.time)
            .push_bind(self.time_msc)
            .push_bind(self.deal_type)
            .push_bind(self.entry)
            .push_bind(self.magic)
            .push_bind(self.position_id)
            .push_bind(self.reason)
            .push_bind(self.volume)
            .push_bind(self.price)
            .push_bind(self.commission)
            .push_bind(self.swap)
            .push_bind(self.profit)
            .push_bind(self.fee)
            .push_bind(&self.comment)
            .push_bind(&self.external_id)
            .push_bind(self.time_normalized)
            .push_bind(self.time_msc_normalized);
    }
}

impl PgKeyedTable for Deal {
    const KEY_COLUMN: &'static str = "ticket";
}

impl PgTable for Account {
    const TABLE: &'static str = "accounts";
    const COLUMNS: &'static [&'static str] = &[
        "login",
        "trade_mode",
        "leverage",
        "limit_orders",
        "margin_so_mode",
        "trade_allowed",
        "trade_expert",
        "margin_mode",
        "currency_digits",
        "fifo_close",
        "balance",
        "credit",
        "profit",
        "equity",
        "margin",
        "margin_free",
        "margin_level",
        "margin_so_call",
        "margin_so_so",
        "margin_initial",
        "margin_maintenance",
        "assets",
        "liabilities",
        "commission_blocked",
        "name",
        "server",
        "currency",
        "company",
    ];

    fn bind_columns<'args>(&'args self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
        row.push_bind(self.login)
            .push_bind(self.trade_mode)
            .push_bind(self.leverage)
            .push_bind(self.limit_orders)
            .push_bind(self.margin_so_mode)
            .push_bind(self.trade_allowed)
            .push_bind(self.trade_expert)
            .push_bind(self.margin_mode)
            .push_bind(self.currency_digits)
            .push_bind(self.fifo_close)
            .push_bind(self.balance)
            .push_bind(self.credit)
            .push_bind(self.profit)
            .push_bind(self.equity)
            .push_bind(self.margin)
            .push_bind(self.margin_free)
            .push_bind(self.margin_level)
            .push_bind(self.margin_so_call)
            .push_bind(self.margin_so_so)
            .push_bind(self.margin_initial)
            .push_bind(self.margin_maintenance)
            .push_bind(self.assets)
            .push_bind(self.liabilities)
            .push_bind(self.commission_blocked)
            .push_bind(&self.name)
            .push_bind(&self.server)
            .push_bind(&self.currency)
            .push_bind(&self.company);
    }
}

impl PgKeyedTable for Account {
    const KEY_COLUMN: &'static str = "login";
}

impl PgTable for Position {
    const TABLE: &'static str = "positions";
    const COLUMNS: &'static [&'static str] = &[
        "ticket",
        "symbol",
        "time",
        "time_msc",
        "time_update",
        "time_update_msc",
        "position_type",
        "magic",
        "identifier",
        "reason",
        "volume",
        "price_open",
        "sl",
        "tp",
        "price_current",
        "swap",
        "profit",
        "comment",
        "external_id",
        "time_normalized",
        "time_msc_normalized",
        "time_update_normalized",
        "time_update_msc_normalized",
    ];

    fn bind_columns<'args>(&'args self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
        row.push_bind(self.ticket)
            .push_bind(&self.symbol)
            .push_bind(self.time)
            .push_bind(self.time_msc)
            .push_bind(self.time_update)
            .push_bind(self.time_update_msc)
            .push_bind(self.position_type)
            .push_bind(self.magic)
            .push_bind(self.identifier)
            .push_bind(self.reason)
            .push_bind(self.volume)
            .push_bind(self.price_open)
            .push_bind(self.sl)
            .push_bind(self.tp)
            .push_bind(self.price_current)
            .push_bind(self.swap)
            .push_bind(self.profit)
            .push_bind(&self.comment)
            .push_bind(&self.external_id)
            .push_bind(self.time_normalized)
            .push_bind(self.time_msc_normalized)
            .push_bind(self.time_update_normalized)
            .push_bind(self.time_update_msc_normalized);
    }
}
