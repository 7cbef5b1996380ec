//! SQLite receipt store, member store and principal directory
//!
//! One connection behind a mutex; every operation runs on the blocking pool.
//! Receipt transactions use `BEGIN IMMEDIATE` so concurrent creators
//! serialize on the write lock instead of failing at commit. Amounts are
//! stored as decimal text and timestamps as RFC 3339 text.
//!
//! Receipt identities come from the `receipt_sequence` row, bumped in its own
//! committed statement before the receipt transaction begins. A rollback
//! therefore never returns an identity to the pool.
//!
//! Text filters compare through the `fold_case` SQL function, which is
//! registered per connection and lowercases exactly as the in-memory filters
//! do, non-ASCII letters included.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use registry_core::effects::{
    ClockEffects, MemberStore, PrincipalDirectory, ReceiptStore, ReceiptTransaction, StoreError,
    SystemClock,
};
use registry_core::{
    fold_case, Account, Member, MemberChanges, MemberDraft, MemberFilter, MemberId, MemberPage,
    MemberStats, MemberType, NewAccount, PageRequest, PrincipalId, Receipt, ReceiptChanges,
    ReceiptCode, ReceiptDraft, ReceiptFilter, ReceiptId, ReceiptPage, ReceiptStatus, ReceiptTotals,
    RegistryError, Result, RoleName,
};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    is_active INTEGER NOT NULL DEFAULT 1,
    is_superuser INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS user_roles (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role_name TEXT NOT NULL,
    PRIMARY KEY (user_id, role_name)
);
CREATE TABLE IF NOT EXISTS receipts (
    id INTEGER PRIMARY KEY,
    receipt_no TEXT NOT NULL UNIQUE,
    receipt_date TEXT NOT NULL,
    donor_name TEXT NOT NULL,
    village TEXT,
    residence TEXT,
    mobile TEXT,
    relation_address TEXT,
    payment_mode TEXT NOT NULL,
    payment_details TEXT,
    donation1_purpose TEXT,
    donation1_amount TEXT NOT NULL,
    donation2_amount TEXT NOT NULL,
    total_amount TEXT NOT NULL,
    total_amount_words TEXT,
    status TEXT NOT NULL,
    created_by INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_receipts_created_by ON receipts(created_by);
CREATE INDEX IF NOT EXISTS idx_receipts_listing ON receipts(receipt_date DESC, id DESC);
CREATE TABLE IF NOT EXISTS receipt_sequence (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    next_id INTEGER NOT NULL
);
INSERT OR IGNORE INTO receipt_sequence (id, next_id)
    SELECT 1, COALESCE(MAX(id), 0) + 1 FROM receipts;
CREATE TABLE IF NOT EXISTS members (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    usercode TEXT,
    name TEXT NOT NULL,
    surname TEXT,
    father_or_husband_name TEXT,
    mother_name TEXT,
    gender TEXT,
    birth_date TEXT,
    mobile_no1 TEXT,
    mobile_no2 TEXT,
    area TEXT,
    village TEXT,
    address TEXT,
    pincode TEXT,
    occupation TEXT,
    email_id TEXT,
    status TEXT NOT NULL,
    member_type TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    created_by INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_members_listing ON members(member_type, village, name, id);
";

const RECEIPT_COLUMNS: &str = "id, receipt_no, receipt_date, donor_name, village, residence, \
     mobile, relation_address, payment_mode, payment_details, donation1_purpose, \
     donation1_amount, donation2_amount, total_amount, total_amount_words, status, \
     created_by, created_at, updated_at";

const ACCOUNT_COLUMNS: &str = "id, username, is_active, is_superuser, created_at";

const MEMBER_COLUMNS: &str = "id, usercode, name, surname, father_or_husband_name, mother_name, \
     gender, birth_date, mobile_no1, mobile_no2, area, village, address, pincode, occupation, \
     email_id, status, member_type, deleted, created_by, created_at, modified_at";

/// SQLite handler for [`ReceiptStore`], [`MemberStore`] and [`PrincipalDirectory`]
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn ClockEffects>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the database file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(sql)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(sql)?;
        info!(path = %path.display(), "opened receipt database");
        Self::from_connection(conn, Arc::new(SystemClock))
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(
            Connection::open_in_memory().map_err(sql)?,
            Arc::new(SystemClock),
        )
    }

    /// Replace the clock used to stamp new accounts
    pub fn with_clock(mut self, clock: Arc<dyn ClockEffects>) -> Self {
        self.clock = clock;
        self
    }

    fn from_connection(conn: Connection, clock: Arc<dyn ClockEffects>) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5)).map_err(sql)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(sql)?;
        conn.create_scalar_function(
            "fold_case",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| fold_case(&text))),
        )
        .map_err(sql)?;
        conn.execute_batch(SCHEMA).map_err(sql)?;
        debug!("receipt schema ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            op(&mut guard)
        })
        .await
        .map_err(|e| RegistryError::store_unavailable(format!("blocking task failed: {e}")))?
    }
}

/// Map a driver error onto the handler error vocabulary
fn sql(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let detail = message.clone().unwrap_or_default();
            match detail.strip_prefix("UNIQUE constraint failed: ") {
                Some(column) => StoreError::UniqueViolation {
                    column: column.rsplit('.').next().unwrap_or(column).to_string(),
                    value: String::new(),
                },
                None => StoreError::Corrupt(err.to_string()),
            }
        }
        rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
            StoreError::Corrupt(err.to_string())
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}

/// Same as [`sql`], filling in the value a unique constraint rejected
fn sql_unique(value: &str) -> impl Fn(rusqlite::Error) -> StoreError + '_ {
    move |err| match sql(err) {
        StoreError::UniqueViolation { column, .. } => StoreError::UniqueViolation {
            column,
            value: value.to_string(),
        },
        other => other,
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn receipt_from_row(row: &Row<'_>) -> rusqlite::Result<Receipt> {
    let code: String = row.get(1)?;
    let receipt_no = ReceiptCode::new(code)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(Receipt {
        id: ReceiptId(row.get(0)?),
        receipt_no,
        receipt_date: parse_column::<NaiveDate>(row, 2)?,
        donor_name: row.get(3)?,
        village: row.get(4)?,
        residence: row.get(5)?,
        mobile: row.get(6)?,
        relation_address: row.get(7)?,
        payment_mode: parse_column(row, 8)?,
        payment_details: row.get(9)?,
        donation1_purpose: row.get(10)?,
        donation1_amount: parse_column::<Decimal>(row, 11)?,
        donation2_amount: parse_column::<Decimal>(row, 12)?,
        total_amount: parse_column::<Decimal>(row, 13)?,
        total_amount_words: row.get(14)?,
        status: parse_column(row, 15)?,
        created_by: PrincipalId(row.get(16)?),
        created_at: parse_column::<DateTime<Utc>>(row, 17)?,
        updated_at: parse_column::<DateTime<Utc>>(row, 18)?,
    })
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: PrincipalId(row.get(0)?),
        username: row.get(1)?,
        active: row.get(2)?,
        superuser: row.get(3)?,
        created_at: parse_column::<DateTime<Utc>>(row, 4)?,
    })
}

fn load_receipt(conn: &Connection, id: ReceiptId) -> std::result::Result<Option<Receipt>, StoreError> {
    conn.query_row(
        &format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = ?1"),
        params![id.value()],
        receipt_from_row,
    )
    .optional()
    .map_err(sql)
}

fn load_account(conn: &Connection, id: PrincipalId) -> Result<Option<Account>> {
    Ok(conn
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = ?1"),
            params![id.value()],
            account_from_row,
        )
        .optional()
        .map_err(sql)?)
}

/// Folded needle for `instr(fold_case(column), ?) > 0`
fn needle(term: &str) -> Value {
    Value::Text(fold_case(term))
}

/// `?, ?, ?` for an `IN` list of `count` values
fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Take the next receipt identity and commit the bump immediately
fn reserve_receipt_id(conn: &Connection) -> std::result::Result<ReceiptId, StoreError> {
    conn.query_row(
        "UPDATE receipt_sequence SET next_id = next_id + 1 WHERE id = 1 RETURNING next_id - 1",
        [],
        |row| row.get(0),
    )
    .map(ReceiptId)
    .map_err(sql)
}

/// `WHERE` clause and positional parameters for a filter
fn where_clause(filter: &ReceiptFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(owner) = filter.created_by {
        conditions.push("created_by = ?");
        values.push(Value::Integer(owner.value()));
    }
    if let Some(term) = &filter.search {
        conditions.push(
            "(instr(fold_case(donor_name), ?) > 0 OR instr(fold_case(receipt_no), ?) > 0)",
        );
        values.push(needle(term));
        values.push(needle(term));
    }
    if let Some(term) = &filter.village {
        conditions.push("(instr(fold_case(village), ?) > 0 OR instr(fold_case(residence), ?) > 0)");
        values.push(needle(term));
        values.push(needle(term));
    }
    if let Some(mode) = filter.payment_mode {
        conditions.push("payment_mode = ?");
        values.push(Value::Text(mode.as_str().to_string()));
    }
    if let Some(term) = &filter.purpose {
        conditions.push("instr(fold_case(donation1_purpose), ?) > 0");
        values.push(needle(term));
    }
    if let Some(status) = filter.status {
        conditions.push("status = ?");
        values.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(from) = filter.date_from {
        conditions.push("receipt_date >= ?");
        values.push(Value::Text(from.to_string()));
    }
    if let Some(to) = filter.date_to {
        conditions.push("receipt_date <= ?");
        values.push(Value::Text(to.to_string()));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

fn select_receipts(
    conn: &Connection,
    filter: &ReceiptFilter,
    limit: Option<(u32, u64)>,
) -> Result<Vec<Receipt>> {
    let (clause, mut values) = where_clause(filter);
    let mut query =
        format!("SELECT {RECEIPT_COLUMNS} FROM receipts{clause} ORDER BY receipt_date DESC, id DESC");
    if let Some((page_size, offset)) = limit {
        query.push_str(" LIMIT ? OFFSET ?");
        values.push(Value::Integer(i64::from(page_size)));
        values.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
    }
    let mut stmt = conn.prepare(&query).map_err(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), receipt_from_row)
        .map_err(sql)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(sql)?;
    Ok(rows)
}

struct SqliteTransaction<'a> {
    conn: &'a Connection,
    reserved: ReceiptId,
    inserted: bool,
}

impl ReceiptTransaction for SqliteTransaction<'_> {
    fn insert_provisional(
        &mut self,
        draft: &ReceiptDraft,
        placeholder: &ReceiptCode,
        created_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> std::result::Result<ReceiptId, StoreError> {
        if self.inserted {
            return Err(StoreError::Rejected(format!(
                "transaction already created receipt {}",
                self.reserved
            )));
        }
        let stamp = timestamp(now);
        self.conn
            .execute(
                "INSERT INTO receipts (id, receipt_no, receipt_date, donor_name, village, residence,
                     mobile, relation_address, payment_mode, payment_details, donation1_purpose,
                     donation1_amount, donation2_amount, total_amount, total_amount_words, status,
                     created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                params![
                    self.reserved.value(),
                    placeholder.as_str(),
                    draft.receipt_date.to_string(),
                    draft.donor_name,
                    draft.village,
                    draft.residence,
                    draft.mobile,
                    draft.relation_address,
                    draft.payment_mode.as_str(),
                    draft.payment_details,
                    draft.donation1_purpose,
                    draft.donation1_amount.to_string(),
                    draft.donation2_amount.to_string(),
                    draft.total_amount.to_string(),
                    draft.total_amount_words,
                    ReceiptStatus::Completed.as_str(),
                    created_by.value(),
                    stamp,
                    stamp,
                ],
            )
            .map_err(sql_unique(placeholder.as_str()))?;
        self.inserted = true;
        Ok(self.reserved)
    }

    fn finalize_code(
        &mut self,
        id: ReceiptId,
        code: &ReceiptCode,
    ) -> std::result::Result<(), StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE receipts SET receipt_no = ?1 WHERE id = ?2",
                params![code.as_str(), id.value()],
            )
            .map_err(sql_unique(code.as_str()))?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("receipt {id}")));
        }
        Ok(())
    }

    fn load(&mut self, id: ReceiptId) -> std::result::Result<Option<Receipt>, StoreError> {
        load_receipt(self.conn, id)
    }
}

#[async_trait]
impl ReceiptStore for SqliteStore {
    async fn transaction<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn ReceiptTransaction) -> Result<T> + Send + 'static,
    {
        self.blocking(move |conn| {
            let reserved = reserve_receipt_id(conn)?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(sql)?;
            let mut handle = SqliteTransaction {
                conn: &tx,
                reserved,
                inserted: false,
            };
            let outcome = {
                let handle: &mut dyn ReceiptTransaction = &mut handle;
                work(handle)
            };
            match outcome {
                Ok(value) => {
                    tx.commit().map_err(sql)?;
                    Ok(value)
                }
                Err(err) => {
                    debug!(%reserved, error = %err, "rolling back transaction");
                    tx.rollback().map_err(sql)?;
                    Err(err)
                }
            }
        })
        .await
    }

    async fn receipt(&self, id: ReceiptId) -> Result<Option<Receipt>> {
        self.blocking(move |conn| Ok(load_receipt(conn, id)?)).await
    }

    async fn update_receipt(
        &self,
        id: ReceiptId,
        changes: ReceiptChanges,
        now: DateTime<Utc>,
    ) -> Result<Receipt> {
        self.blocking(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(sql)?;
            let mut receipt = load_receipt(&tx, id)?
                .ok_or_else(|| RegistryError::not_found(format!("receipt {id}")))?;
            changes.apply_to(&mut receipt, now)?;
            tx.execute(
                "UPDATE receipts SET receipt_date = ?1, donor_name = ?2, village = ?3,
                     residence = ?4, mobile = ?5, relation_address = ?6, payment_mode = ?7,
                     payment_details = ?8, donation1_purpose = ?9, donation1_amount = ?10,
                     donation2_amount = ?11, total_amount = ?12, total_amount_words = ?13,
                     status = ?14, updated_at = ?15
                 WHERE id = ?16",
                params![
                    receipt.receipt_date.to_string(),
                    receipt.donor_name,
                    receipt.village,
                    receipt.residence,
                    receipt.mobile,
                    receipt.relation_address,
                    receipt.payment_mode.as_str(),
                    receipt.payment_details,
                    receipt.donation1_purpose,
                    receipt.donation1_amount.to_string(),
                    receipt.donation2_amount.to_string(),
                    receipt.total_amount.to_string(),
                    receipt.total_amount_words,
                    receipt.status.as_str(),
                    timestamp(receipt.updated_at),
                    id.value(),
                ],
            )
            .map_err(sql)?;
            tx.commit().map_err(sql)?;
            Ok(receipt)
        })
        .await
    }

    async fn query(&self, filter: &ReceiptFilter, page: PageRequest) -> Result<ReceiptPage> {
        page.validate()?;
        let filter = filter.clone();
        self.blocking(move |conn| {
            let (clause, values) = where_clause(&filter);
            let total_count: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM receipts{clause}"),
                    params_from_iter(values),
                    |row| row.get(0),
                )
                .map_err(sql)?;
            let data = select_receipts(conn, &filter, Some((page.page_size, page.offset())))?;
            Ok(ReceiptPage {
                total_count: u64::try_from(total_count).unwrap_or_default(),
                page_num: page.page_num,
                page_size: page.page_size,
                data,
            })
        })
        .await
    }

    async fn query_all(&self, filter: &ReceiptFilter) -> Result<Vec<Receipt>> {
        let filter = filter.clone();
        self.blocking(move |conn| select_receipts(conn, &filter, None))
            .await
    }

    async fn totals(&self, filter: &ReceiptFilter) -> Result<ReceiptTotals> {
        let filter = filter.clone();
        self.blocking(move |conn| {
            let (clause, values) = where_clause(&filter);
            let mut stmt = conn
                .prepare(&format!("SELECT total_amount, status FROM receipts{clause}"))
                .map_err(sql)?;
            let mut rows = stmt.query(params_from_iter(values)).map_err(sql)?;
            let mut totals = ReceiptTotals::default();
            while let Some(row) = rows.next().map_err(sql)? {
                let amount = parse_column::<Decimal>(row, 0).map_err(sql)?;
                let status = parse_column::<ReceiptStatus>(row, 1).map_err(sql)?;
                totals.total_receipts += 1;
                totals.total_donation_amount += amount;
                match status {
                    ReceiptStatus::Completed => totals.completed_receipts += 1,
                    ReceiptStatus::Cancelled => totals.cancelled_receipts += 1,
                }
            }
            Ok(totals)
        })
        .await
    }

    async fn creator_ids(&self) -> Result<Vec<PrincipalId>> {
        self.blocking(|conn| {
            let mut stmt = conn
                .prepare("SELECT DISTINCT created_by FROM receipts ORDER BY created_by")
                .map_err(sql)?;
            let ids = stmt
                .query_map([], |row| row.get::<_, i64>(0))
                .map_err(sql)?
                .map(|id| id.map(PrincipalId))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql)?;
            Ok(ids)
        })
        .await
    }
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    let birth_date: Option<String> = row.get(7)?;
    let birth_date = birth_date
        .map(|text| {
            text.parse::<NaiveDate>()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))
        })
        .transpose()?;
    Ok(Member {
        id: MemberId(row.get(0)?),
        usercode: row.get(1)?,
        name: row.get(2)?,
        surname: row.get(3)?,
        father_or_husband_name: row.get(4)?,
        mother_name: row.get(5)?,
        gender: row.get(6)?,
        birth_date,
        mobile_no1: row.get(8)?,
        mobile_no2: row.get(9)?,
        area: row.get(10)?,
        village: row.get(11)?,
        address: row.get(12)?,
        pincode: row.get(13)?,
        occupation: row.get(14)?,
        email_id: row.get(15)?,
        status: parse_column(row, 16)?,
        member_type: parse_column(row, 17)?,
        deleted: row.get(18)?,
        created_by: PrincipalId(row.get(19)?),
        created_at: parse_column::<DateTime<Utc>>(row, 20)?,
        modified_at: parse_column::<DateTime<Utc>>(row, 21)?,
    })
}

fn load_live_member(conn: &Connection, id: MemberId) -> Result<Option<Member>> {
    Ok(conn
        .query_row(
            &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1 AND deleted = 0"),
            params![id.value()],
            member_from_row,
        )
        .optional()
        .map_err(sql)?)
}

/// `WHERE` clause and positional parameters for a member filter
fn member_where_clause(filter: &MemberFilter) -> (String, Vec<Value>) {
    let mut conditions = vec!["deleted = 0".to_string()];
    let mut values = Vec::new();

    if let Some(owner) = filter.created_by {
        conditions.push("created_by = ?".to_string());
        values.push(Value::Integer(owner.value()));
    }
    if let Some(term) = &filter.search {
        let columns = ["name", "father_or_husband_name", "mobile_no1", "mobile_no2"];
        let any = columns
            .iter()
            .map(|column| format!("instr(fold_case({column}), ?) > 0"))
            .collect::<Vec<_>>()
            .join(" OR ");
        conditions.push(format!("({any})"));
        values.extend(columns.iter().map(|_| needle(term)));
    }
    if !filter.types.is_empty() {
        conditions.push(format!("member_type IN ({})", placeholders(filter.types.len())));
        values.extend(
            filter
                .types
                .iter()
                .map(|t| Value::Text(t.as_str().to_string())),
        );
    }
    for (column, wanted) in [("village", &filter.villages), ("area", &filter.areas)] {
        if !wanted.is_empty() {
            conditions.push(format!(
                "fold_case({column}) IN ({})",
                placeholders(wanted.len())
            ));
            values.extend(wanted.iter().map(|w| needle(w)));
        }
    }
    if !filter.ids.is_empty() {
        conditions.push(format!("id IN ({})", placeholders(filter.ids.len())));
        values.extend(filter.ids.iter().map(|id| Value::Integer(id.value())));
    }

    (format!(" WHERE {}", conditions.join(" AND ")), values)
}

fn select_members(
    conn: &Connection,
    filter: &MemberFilter,
    limit: Option<(u32, u64)>,
) -> Result<Vec<Member>> {
    let (clause, mut values) = member_where_clause(filter);
    let mut query = format!(
        "SELECT {MEMBER_COLUMNS} FROM members{clause} ORDER BY member_type, village, name, id"
    );
    if let Some((page_size, offset)) = limit {
        query.push_str(" LIMIT ? OFFSET ?");
        values.push(Value::Integer(i64::from(page_size)));
        values.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
    }
    let mut stmt = conn.prepare(&query).map_err(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), member_from_row)
        .map_err(sql)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(sql)?;
    Ok(rows)
}

fn write_member(conn: &Connection, member: &Member) -> Result<()> {
    conn.execute(
        "UPDATE members SET usercode = ?1, name = ?2, surname = ?3, father_or_husband_name = ?4,
             mother_name = ?5, gender = ?6, birth_date = ?7, mobile_no1 = ?8, mobile_no2 = ?9,
             area = ?10, village = ?11, address = ?12, pincode = ?13, occupation = ?14,
             email_id = ?15, status = ?16, member_type = ?17, deleted = ?18, modified_at = ?19
         WHERE id = ?20",
        params![
            member.usercode,
            member.name,
            member.surname,
            member.father_or_husband_name,
            member.mother_name,
            member.gender,
            member.birth_date.map(|d| d.to_string()),
            member.mobile_no1,
            member.mobile_no2,
            member.area,
            member.village,
            member.address,
            member.pincode,
            member.occupation,
            member.email_id,
            member.status.as_str(),
            member.member_type.as_str(),
            member.deleted,
            timestamp(member.modified_at),
            member.id.value(),
        ],
    )
    .map_err(sql)?;
    Ok(())
}

/// Load a live member, let `change` edit it, and write it back in one transaction
fn rewrite_member(
    conn: &mut Connection,
    id: MemberId,
    change: impl FnOnce(&mut Member),
) -> Result<Member> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(sql)?;
    let mut member =
        load_live_member(&tx, id)?.ok_or_else(|| RegistryError::not_found(format!("member {id}")))?;
    change(&mut member);
    write_member(&tx, &member)?;
    tx.commit().map_err(sql)?;
    Ok(member)
}

#[async_trait]
impl MemberStore for SqliteStore {
    async fn insert_member(
        &self,
        draft: MemberDraft,
        created_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<Member> {
        self.blocking(move |conn| {
            let stamp = timestamp(now);
            conn.execute(
                "INSERT INTO members (usercode, name, surname, father_or_husband_name,
                     mother_name, gender, birth_date, mobile_no1, mobile_no2, area, village,
                     address, pincode, occupation, email_id, status, member_type, deleted,
                     created_by, created_at, modified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, 0, ?18, ?19, ?20)",
                params![
                    draft.usercode,
                    draft.name,
                    draft.surname,
                    draft.father_or_husband_name,
                    draft.mother_name,
                    draft.gender,
                    draft.birth_date.map(|d| d.to_string()),
                    draft.mobile_no1,
                    draft.mobile_no2,
                    draft.area,
                    draft.village,
                    draft.address,
                    draft.pincode,
                    draft.occupation,
                    draft.email_id,
                    draft.status.as_str(),
                    draft.member_type.as_str(),
                    created_by.value(),
                    stamp,
                    stamp,
                ],
            )
            .map_err(sql)?;
            let id = MemberId(conn.last_insert_rowid());
            load_live_member(conn, id)?
                .ok_or_else(|| RegistryError::store_unavailable("inserted member vanished"))
        })
        .await
    }

    async fn member(&self, id: MemberId) -> Result<Option<Member>> {
        self.blocking(move |conn| load_live_member(conn, id)).await
    }

    async fn update_member(
        &self,
        id: MemberId,
        changes: MemberChanges,
        now: DateTime<Utc>,
    ) -> Result<Member> {
        self.blocking(move |conn| rewrite_member(conn, id, |member| changes.apply_to(member, now)))
            .await
    }

    async fn delete_member(&self, id: MemberId, now: DateTime<Utc>) -> Result<Member> {
        self.blocking(move |conn| {
            rewrite_member(conn, id, |member| {
                member.deleted = true;
                member.modified_at = now;
            })
        })
        .await
    }

    async fn query_members(&self, filter: &MemberFilter, page: PageRequest) -> Result<MemberPage> {
        page.validate()?;
        let filter = filter.clone();
        self.blocking(move |conn| {
            let (clause, values) = member_where_clause(&filter);
            let total_count: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM members{clause}"),
                    params_from_iter(values),
                    |row| row.get(0),
                )
                .map_err(sql)?;
            let data = select_members(conn, &filter, Some((page.page_size, page.offset())))?;
            Ok(MemberPage {
                total_count: u64::try_from(total_count).unwrap_or_default(),
                page_num: page.page_num,
                page_size: page.page_size,
                data,
            })
        })
        .await
    }

    async fn query_all_members(&self, filter: &MemberFilter) -> Result<Vec<Member>> {
        let filter = filter.clone();
        self.blocking(move |conn| select_members(conn, &filter, None))
            .await
    }

    async fn member_stats(&self, filter: &MemberFilter) -> Result<MemberStats> {
        let filter = filter.clone();
        self.blocking(move |conn| {
            let (clause, values) = member_where_clause(&filter);
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT member_type, COUNT(*) FROM members{clause} GROUP BY member_type"
                ))
                .map_err(sql)?;
            let mut rows = stmt.query(params_from_iter(values)).map_err(sql)?;
            let mut stats = MemberStats::default();
            while let Some(row) = rows.next().map_err(sql)? {
                let member_type = parse_column::<MemberType>(row, 0).map_err(sql)?;
                let count: i64 = row.get(1).map_err(sql)?;
                stats.add_many(member_type, u64::try_from(count).unwrap_or_default());
            }
            Ok(stats)
        })
        .await
    }
}

#[async_trait]
impl PrincipalDirectory for SqliteStore {
    async fn account(&self, id: PrincipalId) -> Result<Option<Account>> {
        self.blocking(move |conn| load_account(conn, id)).await
    }

    async fn account_by_username(&self, username: &str) -> Result<Option<Account>> {
        let username = username.to_string();
        self.blocking(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE username = ?1"),
                    params![username],
                    account_from_row,
                )
                .optional()
                .map_err(sql)?)
        })
        .await
    }

    async fn roles_of(&self, id: PrincipalId) -> Result<Vec<RoleName>> {
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare("SELECT role_name FROM user_roles WHERE user_id = ?1 ORDER BY role_name")
                .map_err(sql)?;
            let roles = stmt
                .query_map(params![id.value()], |row| row.get::<_, String>(0))
                .map_err(sql)?
                .map(|name| name.map(RoleName::from))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql)?;
            Ok(roles)
        })
        .await
    }

    async fn create_account(&self, new: NewAccount) -> Result<Account> {
        new.validate()?;
        let now = self.clock.now();
        self.blocking(move |conn| {
            let tx = conn.transaction().map_err(sql)?;
            tx.execute(
                "INSERT INTO users (username, is_active, is_superuser, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![new.username, new.active, new.superuser, timestamp(now)],
            )
            .map_err(sql_unique(&new.username))?;
            let id = PrincipalId(tx.last_insert_rowid());
            for role in &new.roles {
                tx.execute(
                    "INSERT OR IGNORE INTO user_roles (user_id, role_name) VALUES (?1, ?2)",
                    params![id.value(), role.as_str()],
                )
                .map_err(sql)?;
            }
            let account = load_account(&tx, id)?
                .ok_or_else(|| RegistryError::store_unavailable("inserted account vanished"))?;
            tx.commit().map_err(sql)?;
            Ok(account)
        })
        .await
    }

    async fn set_roles(&self, id: PrincipalId, roles: &[RoleName]) -> Result<()> {
        let roles = roles.to_vec();
        self.blocking(move |conn| {
            let tx = conn.transaction().map_err(sql)?;
            if load_account(&tx, id)?.is_none() {
                return Err(RegistryError::not_found(format!("account {id}")));
            }
            tx.execute(
                "DELETE FROM user_roles WHERE user_id = ?1",
                params![id.value()],
            )
            .map_err(sql)?;
            for role in &roles {
                tx.execute(
                    "INSERT OR IGNORE INTO user_roles (user_id, role_name) VALUES (?1, ?2)",
                    params![id.value(), role.as_str()],
                )
                .map_err(sql)?;
            }
            tx.commit().map_err(sql)?;
            Ok(())
        })
        .await
    }

    async fn set_active(&self, id: PrincipalId, active: bool) -> Result<Account> {
        self.blocking(move |conn| update_flag(conn, id, "is_active", active))
            .await
    }

    async fn set_superuser(&self, id: PrincipalId, superuser: bool) -> Result<Account> {
        self.blocking(move |conn| update_flag(conn, id, "is_superuser", superuser))
            .await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.blocking(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {ACCOUNT_COLUMNS} FROM users ORDER BY username"))
                .map_err(sql)?;
            let accounts = stmt
                .query_map([], account_from_row)
                .map_err(sql)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql)?;
            Ok(accounts)
        })
        .await
    }
}

fn update_flag(conn: &Connection, id: PrincipalId, column: &str, value: bool) -> Result<Account> {
    let changed = conn
        .execute(
            &format!("UPDATE users SET {column} = ?1 WHERE id = ?2"),
            params![value, id.value()],
        )
        .map_err(sql)?;
    if changed == 0 {
        return Err(RegistryError::not_found(format!("account {id}")));
    }
    load_account(conn, id)?.ok_or_else(|| RegistryError::not_found(format!("account {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use registry_core::PaymentMode;

    fn draft(donor: &str, day: u32) -> ReceiptDraft {
        ReceiptDraft {
            village: Some("Rampur".to_string()),
            donation1_purpose: Some("Temple".to_string()),
            donation1_amount: Decimal::new(25050, 2),
            ..ReceiptDraft::new(
                NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
                donor,
                PaymentMode::Online,
                Decimal::new(25050, 2),
            )
        }
    }

    async fn create(store: &SqliteStore, donor: &str, day: u32, final_code: &str) -> ReceiptId {
        let draft = draft(donor, day);
        let final_code = ReceiptCode::new(final_code).unwrap();
        let placeholder = ReceiptCode::new(format!("TEMP_{donor}")).unwrap();
        store
            .transaction(move |tx| {
                let id = tx.insert_provisional(&draft, &placeholder, PrincipalId(4), Utc::now())?;
                tx.finalize_code(id, &final_code)?;
                Ok(id)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn round_trips_receipt_columns() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = create(&store, "Asha", 3, "RC4/2025/0001").await;

        let stored = store.receipt(id).await.unwrap().unwrap();
        assert_eq!(stored.donor_name, "Asha");
        assert_eq!(stored.total_amount, Decimal::new(25050, 2));
        assert_eq!(stored.payment_mode, PaymentMode::Online);
        assert_eq!(stored.created_by, PrincipalId(4));
        assert_eq!(stored.receipt_no.as_str(), "RC4/2025/0001");
    }

    #[tokio::test]
    async fn failed_transaction_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result: Result<ReceiptId> = store
            .transaction(|tx| {
                let placeholder = ReceiptCode::new("TEMP_x")?;
                tx.insert_provisional(&draft("Ravi", 1), &placeholder, PrincipalId(1), Utc::now())?;
                Err(RegistryError::invalid("abort"))
            })
            .await;
        assert!(result.is_err());
        assert!(store
            .query_all(&ReceiptFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn rolled_back_identity_survives_reopen_unissued() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        let store = SqliteStore::open(&path).unwrap();
        let first = create(&store, "Asha", 3, "RC4/2025/0001").await;

        let aborted: Result<ReceiptId> = store
            .transaction(|tx| {
                let placeholder = ReceiptCode::new("TEMP_z")?;
                let id =
                    tx.insert_provisional(&draft("Ravi", 4), &placeholder, PrincipalId(4), Utc::now())?;
                tx.finalize_code(id, &ReceiptCode::new("RC4/2025/0001")?)?;
                Ok(id)
            })
            .await;
        assert_matches!(aborted, Err(RegistryError::ConflictOnCreate { .. }));
        drop(store);

        let reopened = SqliteStore::open(&path).unwrap();
        let next = create(&reopened, "Ravi", 4, "RC4/2025/0003").await;
        assert_eq!(first, ReceiptId(1));
        assert_eq!(next, ReceiptId(3));
    }

    #[tokio::test]
    async fn second_insert_in_one_transaction_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result: Result<ReceiptId> = store
            .transaction(|tx| {
                tx.insert_provisional(
                    &draft("Asha", 1),
                    &ReceiptCode::new("TEMP_1")?,
                    PrincipalId(1),
                    Utc::now(),
                )?;
                Ok(tx.insert_provisional(
                    &draft("Ravi", 1),
                    &ReceiptCode::new("TEMP_2")?,
                    PrincipalId(1),
                    Utc::now(),
                )?)
            })
            .await;
        assert_matches!(result, Err(RegistryError::Invalid { .. }));
        assert!(store
            .query_all(&ReceiptFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn duplicate_code_maps_to_conflict_on_create() {
        let store = SqliteStore::open_in_memory().unwrap();
        create(&store, "Asha", 3, "RCA/2025/0001").await;

        let draft = draft("Ravi", 4);
        let result = store
            .transaction(move |tx| {
                let placeholder = ReceiptCode::new("TEMP_y")?;
                let id = tx.insert_provisional(&draft, &placeholder, PrincipalId(1), Utc::now())?;
                tx.finalize_code(id, &ReceiptCode::new("RCA/2025/0001")?)?;
                Ok(id)
            })
            .await;
        assert_matches!(result, Err(RegistryError::ConflictOnCreate { .. }));
        assert_eq!(store.query_all(&ReceiptFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn query_filters_and_pages_in_listing_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        for day in 1..=5 {
            create(&store, &format!("Donor{day}"), day, &format!("RC4/2025/000{day}")).await;
        }

        let page = store
            .query(&ReceiptFilter::default(), PageRequest::new(2, 2).unwrap())
            .await
            .unwrap();
        assert_eq!(page.total_count, 5);
        let names: Vec<_> = page.data.iter().map(|r| r.donor_name.as_str()).collect();
        assert_eq!(names, vec!["Donor3", "Donor2"]);

        let filter = ReceiptFilter {
            search: Some("donor4".to_string()),
            ..ReceiptFilter::default()
        };
        let hits = store.query_all(&filter).await.unwrap();
        assert_eq!(hits.len(), 1);

        let totals = store.totals(&ReceiptFilter::default()).await.unwrap();
        assert_eq!(totals.total_receipts, 5);
        assert_eq!(totals.total_donation_amount, Decimal::new(125250, 2));
    }

    #[tokio::test]
    async fn search_folds_non_ascii_letters() {
        let store = SqliteStore::open_in_memory().unwrap();
        create(&store, "ÉLISE", 2, "RC4/2025/0001").await;
        create(&store, "Zoë_100%", 3, "RC4/2025/0002").await;

        let by_name = |term: &str| ReceiptFilter {
            search: Some(term.to_string()),
            ..ReceiptFilter::default()
        };
        assert_eq!(store.query_all(&by_name("élise")).await.unwrap().len(), 1);
        assert_eq!(store.query_all(&by_name("ZOË")).await.unwrap().len(), 1);
        assert_eq!(store.query_all(&by_name("_100%")).await.unwrap().len(), 1);
        assert_eq!(store.query_all(&by_name("%")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn members_persist_and_soft_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let draft = MemberDraft {
            village: Some("Rampur".into()),
            birth_date: NaiveDate::from_ymd_opt(1980, 4, 2),
            status: registry_core::MemberStatus::PassedAway,
            ..MemberDraft::new("Asha", MemberType::Siddhpur)
        };
        let member = store
            .insert_member(draft, PrincipalId(4), Utc::now())
            .await
            .unwrap();
        let loaded = store.member(member.id).await.unwrap().unwrap();
        assert_eq!(loaded, member);

        let filter = MemberFilter {
            villages: vec!["rampur".into()],
            types: vec![MemberType::Siddhpur],
            ..MemberFilter::default()
        };
        assert_eq!(store.query_all_members(&filter).await.unwrap().len(), 1);
        assert_eq!(store.member_stats(&filter).await.unwrap().by_type["siddhpur"], 1);

        store.delete_member(member.id, Utc::now()).await.unwrap();
        assert!(store.member(member.id).await.unwrap().is_none());
        assert_eq!(
            store
                .query_members(&MemberFilter::default(), PageRequest::default())
                .await
                .unwrap()
                .total_count,
            0
        );
        assert_matches!(
            store.delete_member(member.id, Utc::now()).await,
            Err(RegistryError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn accounts_and_roles_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        let store = SqliteStore::open(&path).unwrap();

        let account = store
            .create_account(NewAccount::new(
                "receipt_creator7",
                [RoleName::from("receipt_creator")],
            ))
            .await
            .unwrap();
        assert_matches!(
            store.create_account(NewAccount::new("receipt_creator7", [])).await,
            Err(RegistryError::Conflict { .. })
        );

        store.set_active(account.id, false).await.unwrap();
        drop(store);

        let reopened = SqliteStore::open(&path).unwrap();
        let loaded = reopened
            .account_by_username("receipt_creator7")
            .await
            .unwrap()
            .unwrap();
        assert!(!loaded.active);
        assert_eq!(
            reopened.roles_of(loaded.id).await.unwrap(),
            vec![RoleName::from("receipt_creator")]
        );
        assert_matches!(
            reopened.set_roles(PrincipalId(999), &[]).await,
            Err(RegistryError::NotFound { .. })
        );
    }
}
