use super::models::{CarUsage, FinishUsageDto, StartUsageDto};
use super::repository::ensure_active;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{normalize_optional, now_jakarta};
use rusqlite::{params, Connection, OptionalExtension, Row};

const USAGE_COLUMNS: &str = "id, car_id, user_id, purpose, destination, start_odometer, \
                             end_odometer, started_at, ended_at";

fn map_usage(row: &Row) -> rusqlite::Result<CarUsage> {
    Ok(CarUsage {
        id: row.get(0)?,
        car_id: row.get(1)?,
        user_id: row.get(2)?,
        purpose: row.get(3)?,
        destination: row.get(4)?,
        start_odometer: row.get(5)?,
        end_odometer: row.get(6)?,
        started_at: row.get(7)?,
        ended_at: row.get(8)?,
    })
}

/// 車両の利用を開始する
///
/// # 引数
/// * `conn` - データベース接続
/// * `car_id` - 車両ID
/// * `user_id` - 利用者ID
/// * `dto` - 利用開始用DTO
///
/// # 戻り値
/// 作成された利用記録、車両が利用中の場合はConflictエラー
pub fn start(
    conn: &Connection,
    car_id: i64,
    user_id: i64,
    dto: &StartUsageDto,
) -> AppResult<CarUsage> {
    ensure_active(conn, car_id)?;

    if find_active(conn, car_id)?.is_some() {
        return Err(AppError::conflict("Mobil sedang digunakan"));
    }

    conn.execute(
        "INSERT INTO car_usages (car_id, user_id, purpose, destination, start_odometer, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            car_id,
            user_id,
            dto.purpose.trim(),
            normalize_optional(dto.destination.clone()),
            dto.start_odometer,
            now_jakarta()
        ],
    )?;

    let id = conn.last_insert_rowid();
    log::info!("車両利用を開始しました: id={id}, car_id={car_id}, user_id={user_id}");
    find_by_id(conn, id)
}

/// 車両の利用を終了する
///
/// 終了時のメーター値は開始時以上でなければならない
pub fn finish(conn: &Connection, id: i64, dto: &FinishUsageDto) -> AppResult<CarUsage> {
    let usage = find_by_id(conn, id)?;

    if usage.is_finished() {
        return Err(AppError::conflict("Penggunaan mobil sudah selesai"));
    }
    if dto.end_odometer < usage.start_odometer {
        return Err(AppError::validation(
            "Odometer akhir tidak boleh lebih kecil dari odometer awal",
        ));
    }

    conn.execute(
        "UPDATE car_usages SET end_odometer = ?1, ended_at = ?2 WHERE id = ?3 AND ended_at IS NULL",
        params![dto.end_odometer, now_jakarta(), id],
    )?;

    log::info!("車両利用を終了しました: id={id}");
    find_by_id(conn, id)
}

/// IDで利用記録を取得する
pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<CarUsage> {
    conn.query_row(
        &format!("SELECT {USAGE_COLUMNS} FROM car_usages WHERE id = ?1"),
        params![id],
        map_usage,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Penggunaan mobil"))
}

/// 車両の未終了の利用記録を取得する
pub fn find_active(conn: &Connection, car_id: i64) -> AppResult<Option<CarUsage>> {
    let usage = conn
        .query_row(
            &format!(
                "SELECT {USAGE_COLUMNS} FROM car_usages
                 WHERE car_id = ?1 AND ended_at IS NULL
                 ORDER BY id DESC LIMIT 1"
            ),
            params![car_id],
            map_usage,
        )
        .optional()?;
    Ok(usage)
}

/// 車両の利用履歴を取得する（新しい順）
pub fn find_by_car(conn: &Connection, car_id: i64) -> AppResult<Vec<CarUsage>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USAGE_COLUMNS} FROM car_usages WHERE car_id = ?1 ORDER BY started_at DESC, id DESC"
    ))?;
    let usages = stmt
        .query_map(params![car_id], map_usage)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(usages)
}
