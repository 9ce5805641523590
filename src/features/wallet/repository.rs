use super::models::{CreateWalletEntryDto, EntryType, Wallet, WalletEntry, WalletOverview};
use crate::shared::database::GLOBAL_WALLET_NAME;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{
    normalize_optional, now_jakarta, today_jakarta, validate_amount, validate_date,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ENTRY_COLUMNS: &str = "id, wallet_id, amount, type, source, description, occurred_at, \
                             created_by, created_at";

fn map_entry(row: &Row) -> rusqlite::Result<WalletEntry> {
    Ok(WalletEntry {
        id: row.get(0)?,
        wallet_id: row.get(1)?,
        amount: row.get(2)?,
        entry_type: row.get(3)?,
        source: row.get(4)?,
        description: row.get(5)?,
        occurred_at: row.get(6)?,
        created_by: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// 共有ウォレット（Global Wallet）を取得する
pub fn global_wallet(conn: &Connection) -> AppResult<Wallet> {
    conn.query_row(
        "SELECT id, name, created_at FROM wallets WHERE name = ?1",
        params![GLOBAL_WALLET_NAME],
        |row| {
            Ok(Wallet {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Dompet"))
}

/// ウォレット残高を計算する
///
/// # 戻り値
/// CREDITの合計 - DEBITの合計
pub fn balance(conn: &Connection, wallet_id: i64) -> AppResult<i64> {
    let balance = conn.query_row(
        "SELECT COALESCE(SUM(CASE WHEN type = 'CREDIT' THEN amount ELSE -amount END), 0)
         FROM wallet_entries WHERE wallet_id = ?1",
        params![wallet_id],
        |row| row.get(0),
    )?;
    Ok(balance)
}

/// 記帳する
///
/// # 引数
/// * `conn` - データベース接続
/// * `wallet_id` - ウォレットID
/// * `user_id` - 記帳者ID
/// * `dto` - 記帳内容
pub fn create_entry(
    conn: &Connection,
    wallet_id: i64,
    user_id: i64,
    dto: &CreateWalletEntryDto,
) -> AppResult<WalletEntry> {
    validate_amount(dto.amount)?;
    let occurred_at = dto.occurred_at.clone().unwrap_or_else(today_jakarta);
    validate_date(&occurred_at)?;

    conn.execute(
        "INSERT INTO wallet_entries
            (wallet_id, amount, type, source, description, occurred_at, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            wallet_id,
            dto.amount,
            dto.entry_type,
            dto.source,
            normalize_optional(dto.description.clone()),
            occurred_at,
            user_id,
            now_jakarta()
        ],
    )?;

    let id = conn.last_insert_rowid();
    log::info!(
        "ウォレットに記帳しました: id={id}, type={}, source={}, amount={}",
        dto.entry_type,
        dto.source,
        dto.amount
    );

    if dto.entry_type == EntryType::Debit {
        let current = balance(conn, wallet_id)?;
        if current < 0 {
            log::warn!("ウォレット残高がマイナスになりました: wallet_id={wallet_id}, balance={current}");
        }
    }

    find_entry(conn, id)
}

pub fn find_entry(conn: &Connection, id: i64) -> AppResult<WalletEntry> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM wallet_entries WHERE id = ?1"),
        params![id],
        map_entry,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Catatan dompet"))
}

/// 記帳履歴を新しい順に取得する
pub fn find_entries(conn: &Connection, wallet_id: i64) -> AppResult<Vec<WalletEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM wallet_entries WHERE wallet_id = ?1
         ORDER BY occurred_at DESC, id DESC"
    ))?;
    let entries = stmt
        .query_map(params![wallet_id], map_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// 記帳を削除する
///
/// 精算記帳（REFUND/REIMBURSE）は支出タスクの記録の一部のため削除できない
pub fn delete_entry(conn: &Connection, id: i64) -> AppResult<()> {
    let entry = find_entry(conn, id)?;
    if entry.source.is_settlement() {
        log::warn!("精算記帳の削除が要求されました: id={id}, source={}", entry.source);
        return Err(AppError::conflict(
            "Catatan penyelesaian tugas belanja tidak dapat dihapus",
        ));
    }

    conn.execute("DELETE FROM wallet_entries WHERE id = ?1", params![id])?;

    log::info!("ウォレットの記帳を削除しました: id={id}");
    Ok(())
}

/// 共有ウォレットの概要を取得する
pub fn overview(conn: &Connection) -> AppResult<WalletOverview> {
    let wallet = global_wallet(conn)?;
    let entries = find_entries(conn, wallet.id)?;

    let (total_credit, total_debit) =
        entries
            .iter()
            .fold((0, 0), |(credit, debit), entry| match entry.entry_type {
                EntryType::Credit => (credit + entry.amount, debit),
                EntryType::Debit => (credit, debit + entry.amount),
            });

    Ok(WalletOverview {
        balance: balance(conn, wallet.id)?,
        wallet,
        total_credit,
        total_debit,
        entries,
    })
}
