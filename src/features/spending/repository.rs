use super::models::{
    CreateReceiptDto, CreateSpendingTaskDto, SpendingReceipt, SpendingStatus, SpendingSummary,
    SpendingTask, SpendingTaskDetail, SpendingTaskWithSummary, UpdateSpendingTaskDto,
};
use crate::features::wallet::models::{CreateWalletEntryDto, EntrySource, EntryType};
use crate::features::wallet::repository as wallet_repository;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{
    normalize_optional, now_jakarta, today_jakarta, validate_amount, validate_date, MAX_AMOUNT,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const TASK_COLUMNS: &str =
    "id, title, description, status, budget, created_by, created_at, updated_at";

const RECEIPT_COLUMNS: &str =
    "id, task_id, amount, description, image_url, spent_at, created_by, created_at";

fn map_task(row: &Row) -> rusqlite::Result<SpendingTask> {
    Ok(SpendingTask {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        budget: row.get(4)?,
        created_by: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn map_receipt(row: &Row) -> rusqlite::Result<SpendingReceipt> {
    Ok(SpendingReceipt {
        id: row.get(0)?,
        task_id: row.get(1)?,
        amount: row.get(2)?,
        description: row.get(3)?,
        image_url: row.get(4)?,
        spent_at: row.get(5)?,
        created_by: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn validate_budget(budget: i64) -> AppResult<()> {
    if !(0..MAX_AMOUNT).contains(&budget) {
        return Err(AppError::validation("Anggaran tidak valid"));
    }
    Ok(())
}

fn invalid_transition(from: SpendingStatus, to: SpendingStatus) -> AppError {
    AppError::conflict(format!(
        "Status tidak dapat diubah dari {} ke {}",
        from.label(),
        to.label()
    ))
}

/// 支出タスクを作成する（ステータスはDRAFT）
pub fn create(
    conn: &Connection,
    user_id: i64,
    dto: &CreateSpendingTaskDto,
) -> AppResult<SpendingTask> {
    validate_budget(dto.budget)?;

    let now = now_jakarta();
    conn.execute(
        "INSERT INTO spending_tasks
            (title, description, status, budget, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            dto.title.trim(),
            normalize_optional(dto.description.clone()),
            SpendingStatus::Draft,
            dto.budget,
            user_id,
            now,
            now
        ],
    )?;

    let id = conn.last_insert_rowid();
    log::info!("支出タスクを作成しました: id={id}, budget={}", dto.budget);
    find_by_id(conn, id)
}

pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<SpendingTask> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM spending_tasks WHERE id = ?1"),
        params![id],
        map_task,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Tugas belanja"))
}

/// 予算とレシート合計を集計する
///
/// # 戻り値
/// diff = budget - total_receipts（レシートが無い場合はbudgetと等しい）
pub fn summary(conn: &Connection, task: &SpendingTask) -> AppResult<SpendingSummary> {
    let (total, count): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0), COUNT(*) FROM spending_receipts WHERE task_id = ?1",
        params![task.id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(SpendingSummary::new(task.budget, total, count))
}

/// 支出タスク一覧を取得する（新しい順）
pub fn find_all(
    conn: &Connection,
    status: Option<SpendingStatus>,
) -> AppResult<Vec<SpendingTaskWithSummary>> {
    let mut query = format!("SELECT {TASK_COLUMNS} FROM spending_tasks WHERE 1=1");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(status) = status {
        query.push_str(" AND status = ?");
        params.push(Box::new(status));
    }

    query.push_str(" ORDER BY created_at DESC, id DESC");

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let tasks = stmt
        .query_map(param_refs.as_slice(), map_task)?
        .collect::<Result<Vec<_>, _>>()?;

    tasks
        .into_iter()
        .map(|task| {
            Ok(SpendingTaskWithSummary {
                summary: summary(conn, &task)?,
                status_label: task.status.label(),
                task,
            })
        })
        .collect()
}

/// タスク詳細（集計とレシートを含む）を取得する
pub fn find_detail(conn: &Connection, id: i64) -> AppResult<SpendingTaskDetail> {
    let task = find_by_id(conn, id)?;
    Ok(SpendingTaskDetail {
        summary: summary(conn, &task)?,
        receipts: find_receipts(conn, id)?,
        status_label: task.status.label(),
        task,
    })
}

/// 支出タスクを更新する
///
/// 予算の変更はDRAFT/FUNDEDのみ、精算完了後は一切変更不可
pub fn update(conn: &Connection, id: i64, dto: &UpdateSpendingTaskDto) -> AppResult<SpendingTask> {
    let current = find_by_id(conn, id)?;
    if current.status == SpendingStatus::Settled {
        return Err(AppError::conflict("Tugas yang sudah selesai tidak dapat diubah"));
    }

    let budget = match dto.budget {
        Some(budget) if budget != current.budget => {
            if !current.status.allows_budget_change() {
                return Err(AppError::conflict(
                    "Anggaran hanya dapat diubah saat status Draf atau Dana Diterima",
                ));
            }
            validate_budget(budget)?;
            budget
        }
        _ => current.budget,
    };

    let title = dto
        .title
        .as_deref()
        .map(|t| t.trim().to_string())
        .unwrap_or(current.title);
    let description = match &dto.description {
        Some(description) => normalize_optional(Some(description.clone())),
        None => current.description,
    };

    conn.execute(
        "UPDATE spending_tasks SET title = ?1, description = ?2, budget = ?3, updated_at = ?4
         WHERE id = ?5",
        params![title, description, budget, now_jakarta(), id],
    )?;

    log::info!("支出タスクを更新しました: id={id}");
    find_by_id(conn, id)
}

/// 支出タスクを削除する（DRAFTのみ）
pub fn delete(conn: &Connection, id: i64) -> AppResult<()> {
    let task = find_by_id(conn, id)?;
    if task.status != SpendingStatus::Draft {
        return Err(AppError::conflict("Hanya tugas berstatus Draf yang dapat dihapus"));
    }

    conn.execute("DELETE FROM spending_tasks WHERE id = ?1", params![id])?;
    log::info!("支出タスクを削除しました: id={id}");
    Ok(())
}

fn set_status(conn: &Connection, id: i64, status: SpendingStatus) -> AppResult<()> {
    conn.execute(
        "UPDATE spending_tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status, now_jakarta(), id],
    )?;
    Ok(())
}

/// ステータスを変更する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - タスクID
/// * `next` - 変更後のステータス
/// * `user_id` - 操作者ID（ウォレット記帳時の記帳者）
/// * `record_to_wallet` - NEEDS_REFUND/NEEDS_REIMBURSE → SETTLED の際に差額を共有ウォレットへ記帳する
///
/// # 戻り値
/// 許可されていない遷移、またはSPENDINGから差額と異なるステータスへの遷移はConflictエラー
pub fn change_status(
    conn: &Connection,
    id: i64,
    next: SpendingStatus,
    user_id: i64,
    record_to_wallet: bool,
) -> AppResult<SpendingTask> {
    let task = find_by_id(conn, id)?;
    if !task.status.can_transition_to(next) {
        log::warn!(
            "許可されていないステータス遷移: id={id}, {} -> {}",
            task.status,
            next
        );
        return Err(invalid_transition(task.status, next));
    }

    // SPENDINGから抜ける先は差額で決まる
    if task.status == SpendingStatus::Spending {
        let diff = summary(conn, &task)?.diff;
        let expected = SpendingStatus::closing_status(diff);
        if next != expected {
            log::warn!(
                "差額と一致しないステータス遷移: id={id}, diff={diff}, {next} (期待値: {expected})"
            );
            return Err(AppError::conflict(format!(
                "Status harus {} sesuai selisih anggaran",
                expected.label()
            )));
        }
    }

    let tx = conn.unchecked_transaction()?;
    set_status(&tx, id, next)?;

    if record_to_wallet && next == SpendingStatus::Settled {
        let diff = summary(&tx, &task)?.diff;
        let entry = match task.status {
            SpendingStatus::NeedsRefund if diff > 0 => Some((EntryType::Credit, EntrySource::Refund)),
            SpendingStatus::NeedsReimburse if diff < 0 => {
                Some((EntryType::Debit, EntrySource::Reimburse))
            }
            _ => None,
        };

        if let Some((entry_type, source)) = entry {
            let wallet = wallet_repository::global_wallet(&tx)?;
            let dto = CreateWalletEntryDto {
                amount: diff.abs(),
                entry_type,
                source,
                description: Some(format!("Penyelesaian tugas belanja: {}", task.title)),
                occurred_at: None,
            };
            wallet_repository::create_entry(&tx, wallet.id, user_id, &dto)?;
        }
    }

    tx.commit()?;
    log::info!("支出タスクのステータスを変更しました: id={id}, {} -> {next}", task.status);
    find_by_id(conn, id)
}

/// 支出を締める（SPENDINGのみ）
///
/// 差額が正ならNEEDS_REFUND、負ならNEEDS_REIMBURSE、0ならSETTLED
pub fn close(conn: &Connection, id: i64) -> AppResult<SpendingTask> {
    let task = find_by_id(conn, id)?;
    if task.status != SpendingStatus::Spending {
        return Err(AppError::conflict(
            "Hanya tugas berstatus Sedang Berbelanja yang dapat ditutup",
        ));
    }

    let diff = summary(conn, &task)?.diff;
    let next = SpendingStatus::closing_status(diff);
    set_status(conn, id, next)?;

    log::info!("支出タスクを締めました: id={id}, diff={diff}, status={next}");
    find_by_id(conn, id)
}

/// レシートを追加する
///
/// FUNDEDのタスクに最初のレシートを追加するとSPENDINGへ移行する
pub fn add_receipt(
    conn: &Connection,
    task_id: i64,
    user_id: i64,
    dto: &CreateReceiptDto,
) -> AppResult<SpendingReceipt> {
    let task = find_by_id(conn, task_id)?;
    if !task.status.accepts_receipts() {
        return Err(AppError::conflict(format!(
            "Struk tidak dapat ditambahkan pada status {}",
            task.status.label()
        )));
    }

    validate_amount(dto.amount)?;
    let spent_at = dto.spent_at.clone().unwrap_or_else(today_jakarta);
    validate_date(&spent_at)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO spending_receipts
            (task_id, amount, description, image_url, spent_at, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            task_id,
            dto.amount,
            normalize_optional(dto.description.clone()),
            normalize_optional(dto.image_url.clone()),
            spent_at,
            user_id,
            now_jakarta()
        ],
    )?;
    let id = tx.last_insert_rowid();

    if task.status == SpendingStatus::Funded {
        set_status(&tx, task_id, SpendingStatus::Spending)?;
        log::info!("最初のレシートによりSPENDINGへ移行しました: task_id={task_id}");
    }
    tx.commit()?;

    log::info!("レシートを追加しました: id={id}, task_id={task_id}, amount={}", dto.amount);
    find_receipt(conn, id)
}

pub fn find_receipt(conn: &Connection, id: i64) -> AppResult<SpendingReceipt> {
    conn.query_row(
        &format!("SELECT {RECEIPT_COLUMNS} FROM spending_receipts WHERE id = ?1"),
        params![id],
        map_receipt,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Struk"))
}

/// タスクのレシートを取得する（支出日の古い順）
pub fn find_receipts(conn: &Connection, task_id: i64) -> AppResult<Vec<SpendingReceipt>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECEIPT_COLUMNS} FROM spending_receipts WHERE task_id = ?1
         ORDER BY spent_at ASC, id ASC"
    ))?;
    let receipts = stmt
        .query_map(params![task_id], map_receipt)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(receipts)
}

/// レシートを削除する（タスクがSPENDINGの間のみ）
///
/// # 戻り値
/// 削除したレシート
pub fn delete_receipt(conn: &Connection, id: i64) -> AppResult<SpendingReceipt> {
    let receipt = find_receipt(conn, id)?;
    let task = find_by_id(conn, receipt.task_id)?;
    if task.status != SpendingStatus::Spending {
        return Err(AppError::conflict(
            "Struk hanya dapat dihapus saat status Sedang Berbelanja",
        ));
    }

    conn.execute("DELETE FROM spending_receipts WHERE id = ?1", params![id])?;
    log::info!("レシートを削除しました: id={id}, task_id={}", receipt.task_id);
    Ok(receipt)
}
