use super::models::{CarTax, CreateCarTaxDto, PayCarTaxDto, UpcomingTax};
use super::repository::ensure_active;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{
    normalize_optional, now_jakarta, today_jakarta, validate_amount, validate_date,
};
use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension, Row};

const TAX_COLUMNS: &str = "t.id, t.car_id, t.tax_type, t.amount, t.due_date, t.paid_at, \
                           t.receipt_url, t.notes, t.created_at, t.updated_at";

/// 納付期限検索のデフォルト日数
pub const DEFAULT_UPCOMING_DAYS: i64 = 30;

/// 納付期限検索で指定できる最大日数（10年）
pub const MAX_UPCOMING_DAYS: i64 = 3650;

fn map_tax(row: &Row) -> rusqlite::Result<CarTax> {
    Ok(CarTax {
        id: row.get(0)?,
        car_id: row.get(1)?,
        tax_type: row.get(2)?,
        amount: row.get(3)?,
        due_date: row.get(4)?,
        paid_at: row.get(5)?,
        receipt_url: row.get(6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn parse_date(value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::validation("Tanggal tidak valid"))
}

/// 自動車税の記録を作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `car_id` - 車両ID
/// * `dto` - 作成用DTO
pub fn create(conn: &Connection, car_id: i64, dto: &CreateCarTaxDto) -> AppResult<CarTax> {
    ensure_active(conn, car_id)?;
    validate_amount(dto.amount)?;
    validate_date(&dto.due_date)?;

    let now = now_jakarta();
    conn.execute(
        "INSERT INTO car_taxes (car_id, tax_type, amount, due_date, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            car_id,
            dto.tax_type,
            dto.amount,
            dto.due_date,
            normalize_optional(dto.notes.clone()),
            now,
            now
        ],
    )?;

    let id = conn.last_insert_rowid();
    log::info!(
        "自動車税を登録しました: id={id}, car_id={car_id}, type={}, due={}",
        dto.tax_type,
        dto.due_date
    );
    find_by_id(conn, id)
}

pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<CarTax> {
    conn.query_row(
        &format!("SELECT {TAX_COLUMNS} FROM car_taxes t WHERE t.id = ?1"),
        params![id],
        map_tax,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Data pajak"))
}

/// 車両の税記録を取得する（納付期限の新しい順）
pub fn find_by_car(conn: &Connection, car_id: i64) -> AppResult<Vec<CarTax>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TAX_COLUMNS} FROM car_taxes t WHERE t.car_id = ?1 ORDER BY t.due_date DESC, t.id DESC"
    ))?;
    let taxes = stmt
        .query_map(params![car_id], map_tax)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(taxes)
}

/// 納付済みとして登録する
///
/// 二重納付はConflictエラー
pub fn pay(conn: &Connection, id: i64, dto: &PayCarTaxDto) -> AppResult<CarTax> {
    let tax = find_by_id(conn, id)?;
    if tax.paid_at.is_some() {
        return Err(AppError::conflict("Pajak sudah dibayar"));
    }

    let paid_at = dto.paid_at.clone().unwrap_or_else(today_jakarta);
    validate_date(&paid_at)?;

    conn.execute(
        "UPDATE car_taxes SET paid_at = ?1, receipt_url = COALESCE(?2, receipt_url), updated_at = ?3
         WHERE id = ?4",
        params![
            paid_at,
            normalize_optional(dto.receipt_url.clone()),
            now_jakarta(),
            id
        ],
    )?;

    log::info!("自動車税を納付済みにしました: id={id}, paid_at={paid_at}");
    find_by_id(conn, id)
}

/// 納付期限が近い未納の税を取得する（期限切れを含む）
///
/// # 引数
/// * `conn` - データベース接続
/// * `today` - 基準日（YYYY-MM-DD）
/// * `days` - 基準日から何日先までを対象とするか
///
/// # 戻り値
/// 納付期限の早い順の一覧
pub fn find_upcoming(conn: &Connection, today: &str, days: i64) -> AppResult<Vec<UpcomingTax>> {
    if !(0..=MAX_UPCOMING_DAYS).contains(&days) {
        return Err(AppError::validation(format!(
            "Jumlah hari harus antara 0 dan {MAX_UPCOMING_DAYS}"
        )));
    }
    let today = parse_date(today)?;
    let until = Duration::try_days(days)
        .and_then(|delta| today.checked_add_signed(delta))
        .ok_or_else(|| AppError::validation("Jumlah hari tidak valid"))?
        .format("%Y-%m-%d")
        .to_string();

    let mut stmt = conn.prepare(&format!(
        "SELECT {TAX_COLUMNS}, c.name, c.license_plate
         FROM car_taxes t JOIN cars c ON c.id = t.car_id
         WHERE t.paid_at IS NULL AND c.deleted_at IS NULL AND t.due_date <= ?1
         ORDER BY t.due_date ASC, t.id ASC"
    ))?;

    let rows = stmt
        .query_map(params![until], |row| {
            Ok((map_tax(row)?, row.get::<_, String>(10)?, row.get::<_, String>(11)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(tax, car_name, license_plate)| {
            let due = parse_date(&tax.due_date)?;
            Ok(UpcomingTax {
                days_until_due: (due - today).num_days(),
                tax,
                car_name,
                license_plate,
            })
        })
        .collect()
}
