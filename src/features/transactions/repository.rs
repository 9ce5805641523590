use super::models::{
    CreateTransactionDto, Transaction, TransactionLedger, TransactionType, TransactionWithBalance,
    UpdateTransactionDto,
};
use crate::features::cars::repository::ensure_active;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{now_jakarta, validate_amount, validate_date};
use rusqlite::{params, Connection, OptionalExtension, Row};

const TRANSACTION_COLUMNS: &str =
    "id, amount, type, description, date, car_id, created_by, created_at, updated_at";

fn map_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        amount: row.get(1)?,
        transaction_type: row.get(2)?,
        description: row.get(3)?,
        date: row.get(4)?,
        car_id: row.get(5)?,
        created_by: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// 指定日より前の残高を計算する
///
/// # 引数
/// * `conn` - データベース接続
/// * `as_of` - 基準日（YYYY-MM-DD）。当日の取引は含まない
/// * `exclude_id` - 計算から除外する取引ID（編集中の取引など）
///
/// # 戻り値
/// 削除されていない取引の 収入合計 - 支出合計
pub fn balance_before(conn: &Connection, as_of: &str, exclude_id: Option<i64>) -> AppResult<i64> {
    validate_date(as_of)?;

    let balance = conn.query_row(
        "SELECT COALESCE(SUM(CASE WHEN type = 'INCOME' THEN amount ELSE -amount END), 0)
         FROM transactions
         WHERE is_deleted = 0 AND date < ?1 AND (?2 IS NULL OR id <> ?2)",
        params![as_of, exclude_id],
        |row| row.get(0),
    )?;
    Ok(balance)
}

/// 取引を作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `user_id` - 登録者ID
/// * `dto` - 取引作成用DTO
pub fn create(conn: &Connection, user_id: i64, dto: &CreateTransactionDto) -> AppResult<Transaction> {
    validate_amount(dto.amount)?;
    validate_date(&dto.date)?;
    if let Some(car_id) = dto.car_id {
        ensure_active(conn, car_id)?;
    }

    let now = now_jakarta();
    conn.execute(
        "INSERT INTO transactions
            (amount, type, description, date, car_id, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            dto.amount,
            dto.transaction_type,
            dto.description.trim(),
            dto.date,
            dto.car_id,
            user_id,
            now,
            now
        ],
    )?;

    let id = conn.last_insert_rowid();
    log::info!(
        "取引を登録しました: id={id}, type={}, amount={}, date={}",
        dto.transaction_type,
        dto.amount,
        dto.date
    );
    find_by_id(conn, id)
}

/// IDで取引を取得する（削除済みは対象外）
pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Transaction> {
    conn.query_row(
        &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1 AND is_deleted = 0"),
        params![id],
        map_transaction,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Transaksi"))
}

/// 期間内の取引を日付・ID順に取得する
///
/// # 引数
/// * `from` - 開始日（含む）
/// * `to` - 終了日（含む）
pub fn find_in_range(
    conn: &Connection,
    from: Option<&str>,
    to: Option<&str>,
) -> AppResult<Vec<Transaction>> {
    let mut query = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE is_deleted = 0");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(from) = from {
        validate_date(from)?;
        query.push_str(" AND date >= ?");
        params.push(Box::new(from.to_string()));
    }

    if let Some(to) = to {
        validate_date(to)?;
        query.push_str(" AND date <= ?");
        params.push(Box::new(to.to_string()));
    }

    query.push_str(" ORDER BY date ASC, id ASC");

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let transactions = stmt
        .query_map(param_refs.as_slice(), map_transaction)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(transactions)
}

/// 期間内の取引台帳を作成する
///
/// 各行の`balance_before`は期首残高にそれ以前の行を順に加算した値
pub fn ledger(conn: &Connection, from: Option<&str>, to: Option<&str>) -> AppResult<TransactionLedger> {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::validation(
                "Tanggal awal tidak boleh setelah tanggal akhir",
            ));
        }
    }

    let opening_balance = match from {
        Some(from) => balance_before(conn, from, None)?,
        None => 0,
    };

    let mut running = opening_balance;
    let mut total_income = 0;
    let mut total_expense = 0;
    let mut rows = Vec::new();

    for transaction in find_in_range(conn, from, to)? {
        match transaction.transaction_type {
            TransactionType::Income => total_income += transaction.amount,
            TransactionType::Expense => total_expense += transaction.amount,
        }
        let balance_before = running;
        running += transaction.signed_amount();
        rows.push(TransactionWithBalance {
            transaction,
            balance_before,
            balance_after: running,
        });
    }

    Ok(TransactionLedger {
        opening_balance,
        closing_balance: running,
        total_income,
        total_expense,
        transactions: rows,
    })
}

/// 取引を更新する
pub fn update(conn: &Connection, id: i64, dto: &UpdateTransactionDto) -> AppResult<Transaction> {
    let current = find_by_id(conn, id)?;

    let amount = dto.amount.unwrap_or(current.amount);
    validate_amount(amount)?;
    let date = dto.date.clone().unwrap_or(current.date);
    validate_date(&date)?;
    let car_id = match dto.car_id {
        Some(Some(car_id)) => {
            ensure_active(conn, car_id)?;
            Some(car_id)
        }
        Some(None) => None,
        None => current.car_id,
    };
    let description = dto
        .description
        .as_deref()
        .map(str::trim)
        .map(str::to_string)
        .unwrap_or(current.description);

    conn.execute(
        "UPDATE transactions
         SET amount = ?1, type = ?2, description = ?3, date = ?4, car_id = ?5, updated_at = ?6
         WHERE id = ?7 AND is_deleted = 0",
        params![
            amount,
            dto.transaction_type.unwrap_or(current.transaction_type),
            description,
            date,
            car_id,
            now_jakarta(),
            id
        ],
    )?;

    log::info!("取引を更新しました: id={id}");
    find_by_id(conn, id)
}

/// 取引を論理削除する
pub fn soft_delete(conn: &Connection, id: i64) -> AppResult<()> {
    let affected = conn.execute(
        "UPDATE transactions SET is_deleted = 1, updated_at = ?1 WHERE id = ?2 AND is_deleted = 0",
        params![now_jakarta(), id],
    )?;

    if affected == 0 {
        return Err(AppError::not_found("Transaksi"));
    }

    log::info!("取引を削除しました: id={id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::auth::Role;
    use crate::shared::database::create_in_memory_connection;
    use crate::test_support::{seed_car, seed_user};
    use quickcheck_macros::quickcheck;

    fn dto(amount: i64, transaction_type: TransactionType, date: &str) -> CreateTransactionDto {
        CreateTransactionDto {
            amount,
            transaction_type,
            description: "Test".to_string(),
            date: date.to_string(),
            car_id: None,
        }
    }

    fn setup() -> (Connection, i64) {
        let conn = create_in_memory_connection().unwrap();
        let user_id = seed_user(&conn, "finance", Role::User);
        (conn, user_id)
    }

    #[test]
    fn test_balance_before_is_strict_and_skips_deleted() {
        let (conn, user) = setup();
        create(&conn, user, &dto(1_000_000, TransactionType::Income, "2024-05-01")).unwrap();
        create(&conn, user, &dto(250_000, TransactionType::Expense, "2024-05-02")).unwrap();
        let deleted = create(&conn, user, &dto(90_000, TransactionType::Expense, "2024-05-02")).unwrap();
        create(&conn, user, &dto(400_000, TransactionType::Income, "2024-05-03")).unwrap();
        soft_delete(&conn, deleted.id).unwrap();

        assert_eq!(balance_before(&conn, "2024-05-01", None).unwrap(), 0);
        assert_eq!(balance_before(&conn, "2024-05-02", None).unwrap(), 1_000_000);
        assert_eq!(balance_before(&conn, "2024-05-03", None).unwrap(), 750_000);
        assert_eq!(balance_before(&conn, "2024-05-04", None).unwrap(), 1_150_000);
    }

    #[test]
    fn test_balance_before_excludes_given_id() {
        let (conn, user) = setup();
        let income = create(&conn, user, &dto(500_000, TransactionType::Income, "2024-05-01")).unwrap();
        create(&conn, user, &dto(100_000, TransactionType::Expense, "2024-05-01")).unwrap();

        assert_eq!(balance_before(&conn, "2024-05-02", None).unwrap(), 400_000);
        assert_eq!(
            balance_before(&conn, "2024-05-02", Some(income.id)).unwrap(),
            -100_000
        );
    }

    #[test]
    fn test_ledger_running_balance() {
        let (conn, user) = setup();
        create(&conn, user, &dto(1_000_000, TransactionType::Income, "2024-04-30")).unwrap();
        let a = create(&conn, user, &dto(200_000, TransactionType::Expense, "2024-05-01")).unwrap();
        let b = create(&conn, user, &dto(50_000, TransactionType::Income, "2024-05-01")).unwrap();
        create(&conn, user, &dto(10_000, TransactionType::Expense, "2024-06-01")).unwrap();

        let ledger = ledger(&conn, Some("2024-05-01"), Some("2024-05-31")).unwrap();
        assert_eq!(ledger.opening_balance, 1_000_000);
        assert_eq!(ledger.transactions.len(), 2);
        assert_eq!(ledger.transactions[0].transaction.id, a.id);
        assert_eq!(ledger.transactions[0].balance_before, 1_000_000);
        assert_eq!(ledger.transactions[1].transaction.id, b.id);
        assert_eq!(ledger.transactions[1].balance_before, 800_000);
        assert_eq!(ledger.closing_balance, 850_000);
        assert_eq!(ledger.total_income, 50_000);
        assert_eq!(ledger.total_expense, 200_000);

        // 各行のbalance_beforeはbalance_beforeユーティリティの値と一致する（同日の先行行を除く）
        assert_eq!(
            balance_before(&conn, "2024-05-01", None).unwrap(),
            ledger.transactions[0].balance_before
        );
    }

    #[test]
    fn test_ledger_rejects_inverted_range() {
        let (conn, _) = setup();
        assert!(matches!(
            ledger(&conn, Some("2024-06-01"), Some("2024-05-01")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_update_and_soft_delete() {
        let (conn, user) = setup();
        let car_id = seed_car(&conn, "B 1 A");
        let created = create(&conn, user, &dto(100_000, TransactionType::Expense, "2024-05-01")).unwrap();

        let updated = update(
            &conn,
            created.id,
            &UpdateTransactionDto {
                amount: Some(120_000),
                car_id: Some(Some(car_id)),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.amount, 120_000);
        assert_eq!(updated.car_id, Some(car_id));
        assert_eq!(updated.transaction_type, TransactionType::Expense);

        let untouched = update(
            &conn,
            created.id,
            &UpdateTransactionDto {
                description: Some("Bensin".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(untouched.car_id, Some(car_id));

        let cleared = update(
            &conn,
            created.id,
            &UpdateTransactionDto {
                car_id: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(cleared.car_id, None);
        assert_eq!(cleared.description, "Bensin");

        soft_delete(&conn, created.id).unwrap();
        assert!(matches!(find_by_id(&conn, created.id), Err(AppError::NotFound(_))));
        assert!(matches!(soft_delete(&conn, created.id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_invalid_amount_rejected() {
        let (conn, user) = setup();
        assert!(matches!(
            create(&conn, user, &dto(0, TransactionType::Income, "2024-05-01")),
            Err(AppError::Validation(_))
        ));
    }

    /// 任意の取引列について、SQLの集計と素朴な計算が一致する
    #[quickcheck]
    fn prop_balance_before_matches_model(entries: Vec<(u32, bool, u8, bool)>, cutoff: u8) -> bool {
        let (conn, user) = setup();
        let day = |d: u8| format!("2024-01-{:02}", d % 28 + 1);
        let as_of = day(cutoff);

        let mut expected = 0i64;
        for (amount, is_income, d, deleted) in entries.iter().take(30) {
            let amount = i64::from(*amount % 1_000_000) + 1;
            let transaction_type = if *is_income {
                TransactionType::Income
            } else {
                TransactionType::Expense
            };
            let date = day(*d);
            let created = create(&conn, user, &dto(amount, transaction_type, &date)).unwrap();
            if *deleted {
                soft_delete(&conn, created.id).unwrap();
            } else if date < as_of {
                expected += transaction_type.signed(amount);
            }
        }

        balance_before(&conn, &as_of, None).unwrap() == expected
    }
}
