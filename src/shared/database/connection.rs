use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// ハンドラー間で共有するデータベース接続
pub type DbPool = Arc<Mutex<Connection>>;

/// 共有ウォレットの名前（常に1行だけ存在する）
pub const GLOBAL_WALLET_NAME: &str = "Global Wallet";

/// データベース接続を開き、テーブルを作成する
///
/// # 引数
/// * `database_path` - SQLiteファイルのパス
///
/// # 戻り値
/// データベース接続、または失敗時はエラー
///
/// # 処理内容
/// 1. 親ディレクトリの確保
/// 2. データベース接続の開設
/// 3. テーブル作成と初期データ投入
pub fn open_database<P: AsRef<Path>>(database_path: P) -> AppResult<Connection> {
    let database_path = database_path.as_ref();

    if let Some(parent) = database_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::configuration(format!("データベースディレクトリの作成に失敗: {e}"))
            })?;
            log::info!("データベースディレクトリを作成: {parent:?}");
        }
    }

    let conn = Connection::open(database_path)?;
    create_tables(&conn)?;

    log::info!("データベースを初期化しました: {database_path:?}");

    Ok(conn)
}

/// テスト用のインメモリデータベースを作成する
pub fn create_in_memory_connection() -> AppResult<Connection> {
    let conn = Connection::open_in_memory()?;
    create_tables(&conn)?;
    Ok(conn)
}

/// 共有接続のロックを取得する
///
/// ロックは`.await`をまたいで保持しないこと
pub fn lock_connection(db: &DbPool) -> AppResult<MutexGuard<'_, Connection>> {
    db.lock()
        .map_err(|e| AppError::concurrency(format!("データベースロックの取得に失敗: {e}")))
}

/// データベーステーブルを作成する
///
/// 何度呼び出しても結果は同じになる
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn create_tables(conn: &Connection) -> AppResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    create_user_tables(conn)?;
    create_car_tables(conn)?;
    create_finance_tables(conn)?;
    create_approval_tables(conn)?;
    create_indexes(conn)?;
    insert_global_wallet(conn)?;

    Ok(())
}

/// ユーザー・セッションテーブルを作成する
fn create_user_tables(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            phone TEXT,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('ADMIN', 'USER', 'DRIVER')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// 車両関連テーブルを作成する
fn create_car_tables(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cars (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            license_plate TEXT NOT NULL UNIQUE,
            barcode TEXT NOT NULL UNIQUE,
            image_url TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT
        );

        CREATE TABLE IF NOT EXISTS car_usages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            car_id INTEGER NOT NULL REFERENCES cars(id),
            user_id INTEGER NOT NULL REFERENCES users(id),
            purpose TEXT NOT NULL,
            destination TEXT,
            start_odometer INTEGER NOT NULL CHECK (start_odometer >= 0),
            end_odometer INTEGER,
            started_at TEXT NOT NULL,
            ended_at TEXT
        );

        CREATE TABLE IF NOT EXISTS fuel_purchases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            car_id INTEGER NOT NULL REFERENCES cars(id),
            user_id INTEGER NOT NULL REFERENCES users(id),
            liters REAL NOT NULL CHECK (liters > 0),
            amount INTEGER NOT NULL CHECK (amount > 0),
            odometer INTEGER,
            receipt_url TEXT,
            purchased_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS car_taxes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            car_id INTEGER NOT NULL REFERENCES cars(id),
            tax_type TEXT NOT NULL CHECK (tax_type IN ('ANNUAL', 'FIVE_YEAR')),
            amount INTEGER NOT NULL CHECK (amount > 0),
            due_date TEXT NOT NULL,
            paid_at TEXT,
            receipt_url TEXT,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// 取引・支出・ウォレットテーブルを作成する
fn create_finance_tables(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            amount INTEGER NOT NULL CHECK (amount > 0),
            type TEXT NOT NULL CHECK (type IN ('INCOME', 'EXPENSE')),
            description TEXT NOT NULL,
            date TEXT NOT NULL,
            car_id INTEGER REFERENCES cars(id),
            created_by INTEGER NOT NULL REFERENCES users(id),
            is_deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS spending_tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL CHECK (status IN (
                'DRAFT', 'FUNDED', 'SPENDING', 'NEEDS_REFUND', 'NEEDS_REIMBURSE', 'SETTLED'
            )),
            budget INTEGER NOT NULL CHECK (budget >= 0),
            created_by INTEGER NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS spending_receipts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL REFERENCES spending_tasks(id) ON DELETE CASCADE,
            amount INTEGER NOT NULL CHECK (amount > 0),
            description TEXT,
            image_url TEXT,
            spent_at TEXT NOT NULL,
            created_by INTEGER NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS wallets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS wallet_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            wallet_id INTEGER NOT NULL REFERENCES wallets(id),
            amount INTEGER NOT NULL CHECK (amount > 0),
            type TEXT NOT NULL CHECK (type IN ('CREDIT', 'DEBIT')),
            source TEXT NOT NULL CHECK (source IN ('CASHBACK', 'MANUAL', 'REFUND', 'REIMBURSE')),
            description TEXT,
            occurred_at TEXT NOT NULL,
            created_by INTEGER NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// 承認ワークフロー（Pengajuan / Perizinan）のテーブルを作成する
fn create_approval_tables(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS pengajuan (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            status TEXT NOT NULL CHECK (status IN ('PENDING', 'APPROVED', 'REJECTED')),
            notes TEXT,
            created_by INTEGER NOT NULL REFERENCES users(id),
            decided_by INTEGER REFERENCES users(id),
            decided_at TEXT,
            decision_note TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pengajuan_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pengajuan_id INTEGER NOT NULL REFERENCES pengajuan(id) ON DELETE CASCADE,
            requirement TEXT NOT NULL,
            cost_estimation INTEGER NOT NULL CHECK (cost_estimation >= 0),
            car_id INTEGER REFERENCES cars(id),
            image_url TEXT
        );

        CREATE TABLE IF NOT EXISTS perizinan (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            status TEXT NOT NULL CHECK (status IN ('PENDING', 'APPROVED', 'REJECTED')),
            purpose TEXT NOT NULL,
            destination TEXT NOT NULL,
            trip_date TEXT NOT NULL,
            passenger_count INTEGER NOT NULL DEFAULT 1,
            cost_estimate INTEGER NOT NULL DEFAULT 0,
            car_id INTEGER REFERENCES cars(id),
            notes TEXT,
            created_by INTEGER NOT NULL REFERENCES users(id),
            token_hash TEXT UNIQUE,
            token_expires_at TEXT,
            token_used_at TEXT,
            decided_by INTEGER REFERENCES users(id),
            decided_via TEXT CHECK (decided_via IN ('IN_APP', 'TOKEN')),
            decided_at TEXT,
            decision_note TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// インデックスを作成する
fn create_indexes(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
        CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
        CREATE INDEX IF NOT EXISTS idx_car_usages_car ON car_usages(car_id);
        CREATE INDEX IF NOT EXISTS idx_fuel_purchases_car ON fuel_purchases(car_id);
        CREATE INDEX IF NOT EXISTS idx_car_taxes_due ON car_taxes(due_date);
        CREATE INDEX IF NOT EXISTS idx_spending_receipts_task ON spending_receipts(task_id);
        CREATE INDEX IF NOT EXISTS idx_wallet_entries_wallet ON wallet_entries(wallet_id);
        CREATE INDEX IF NOT EXISTS idx_pengajuan_items_parent ON pengajuan_items(pengajuan_id);
        CREATE INDEX IF NOT EXISTS idx_perizinan_status ON perizinan(status);",
    )?;
    Ok(())
}

/// 共有ウォレットを挿入する（既存の場合は何もしない）
fn insert_global_wallet(conn: &Connection) -> AppResult<()> {
    let now = crate::shared::utils::now_jakarta();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO wallets (name, created_at) VALUES (?1, ?2)",
        rusqlite::params![GLOBAL_WALLET_NAME, now],
    )?;

    if inserted > 0 {
        log::info!("共有ウォレットを作成しました: {GLOBAL_WALLET_NAME}");
    }

    Ok(())
}

/// テーブルにカラムが存在するかチェックする
pub fn check_column_exists(conn: &Connection, table: &str, column: &str) -> bool {
    let query = format!("PRAGMA table_info({table})");
    let Ok(mut stmt) = conn.prepare(&query) else {
        return false;
    };

    let columns = stmt.query_map([], |row| row.get::<_, String>(1));
    match columns {
        Ok(names) => names.flatten().any(|name| name == column),
        Err(_) => false,
    }
}
