use super::models::{CreatePerizinanDto, DecisionVia, Perizinan, PublicPerizinanView};
use super::token::{hash_token, is_well_formed, IssuedToken};
use crate::features::approval::{already_decided, ApprovalStatus, Decision};
use crate::features::cars::repository::ensure_active;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{
    format_timestamp, normalize_optional, now_jakarta, parse_timestamp, validate_date, MAX_AMOUNT,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const PERIZINAN_COLUMNS: &str = "id, status, purpose, destination, trip_date, passenger_count, \
                                 cost_estimate, car_id, notes, created_by, token_expires_at, \
                                 token_used_at, decided_by, decided_via, decided_at, \
                                 decision_note, created_at, updated_at";

fn map_perizinan(row: &Row) -> rusqlite::Result<Perizinan> {
    Ok(Perizinan {
        id: row.get(0)?,
        status: row.get(1)?,
        purpose: row.get(2)?,
        destination: row.get(3)?,
        trip_date: row.get(4)?,
        passenger_count: row.get(5)?,
        cost_estimate: row.get(6)?,
        car_id: row.get(7)?,
        notes: row.get(8)?,
        created_by: row.get(9)?,
        token_expires_at: row.get(10)?,
        token_used_at: row.get(11)?,
        decided_by: row.get(12)?,
        decided_via: row.get(13)?,
        decided_at: row.get(14)?,
        decision_note: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn invalid_link() -> AppError {
    AppError::not_found("Tautan persetujuan")
}

/// 許可申請を作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `user_id` - 申請者ID
/// * `dto` - 申請内容
/// * `token` - 発行済みの承認トークン（ハッシュのみ保存）
pub fn create(
    conn: &Connection,
    user_id: i64,
    dto: &CreatePerizinanDto,
    token: &IssuedToken,
) -> AppResult<Perizinan> {
    validate_date(&dto.trip_date)?;
    if !(0..MAX_AMOUNT).contains(&dto.cost_estimate) {
        return Err(AppError::validation("Estimasi biaya tidak valid"));
    }
    if let Some(car_id) = dto.car_id {
        ensure_active(conn, car_id)?;
    }

    let now = now_jakarta();
    conn.execute(
        "INSERT INTO perizinan
            (status, purpose, destination, trip_date, passenger_count, cost_estimate, car_id,
             notes, created_by, token_hash, token_expires_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            ApprovalStatus::Pending,
            dto.purpose.trim(),
            dto.destination.trim(),
            dto.trip_date,
            dto.passenger_count,
            dto.cost_estimate,
            dto.car_id,
            normalize_optional(dto.notes.clone()),
            user_id,
            token.token_hash,
            format_timestamp(&token.expires_at),
            now,
            now
        ],
    )?;

    let id = conn.last_insert_rowid();
    log::info!(
        "許可申請を作成しました: id={id}, user_id={user_id}, trip_date={}",
        dto.trip_date
    );
    find_by_id(conn, id)
}

pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Perizinan> {
    conn.query_row(
        &format!("SELECT {PERIZINAN_COLUMNS} FROM perizinan WHERE id = ?1"),
        params![id],
        map_perizinan,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Perizinan"))
}

/// 許可申請の一覧を取得する（出発日の新しい順）
pub fn find_all(conn: &Connection, status: Option<ApprovalStatus>) -> AppResult<Vec<Perizinan>> {
    let mut query = format!("SELECT {PERIZINAN_COLUMNS} FROM perizinan WHERE 1=1");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(status) = status {
        query.push_str(" AND status = ?");
        params.push(Box::new(status));
    }
    query.push_str(" ORDER BY trip_date DESC, id DESC");

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), map_perizinan)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// 承認リンクのトークンから申請を取得する
///
/// 未知・期限切れ・使用済み・処理済みのトークンはエラー
///
/// # 引数
/// * `token` - リンクに含まれる生のトークン
/// * `now` - 判定時刻
pub fn find_by_token(conn: &Connection, token: &str, now: DateTime<Utc>) -> AppResult<Perizinan> {
    if !is_well_formed(token) {
        return Err(invalid_link());
    }

    let perizinan = conn
        .query_row(
            &format!("SELECT {PERIZINAN_COLUMNS} FROM perizinan WHERE token_hash = ?1"),
            params![hash_token(token)],
            map_perizinan,
        )
        .optional()?
        .ok_or_else(invalid_link)?;

    if perizinan.token_used_at.is_some() {
        return Err(AppError::conflict("Tautan persetujuan sudah digunakan"));
    }
    if perizinan.status.is_terminal() {
        return Err(already_decided("Perizinan", perizinan.status));
    }

    let expires_at = perizinan
        .token_expires_at
        .as_deref()
        .map(parse_timestamp)
        .transpose()?
        .ok_or_else(invalid_link)?;
    if expires_at.with_timezone(&Utc) <= now {
        log::info!("期限切れの承認リンクが使用されました: id={}", perizinan.id);
        return Err(AppError::conflict("Tautan persetujuan sudah kedaluwarsa"));
    }

    Ok(perizinan)
}

/// 承認リンク閲覧用の情報を組み立てる
pub fn public_view(conn: &Connection, perizinan: &Perizinan) -> AppResult<PublicPerizinanView> {
    let requester_name: String = conn.query_row(
        "SELECT name FROM users WHERE id = ?1",
        params![perizinan.created_by],
        |row| row.get(0),
    )?;

    let car: Option<(String, String)> = match perizinan.car_id {
        Some(car_id) => conn
            .query_row(
                "SELECT name, license_plate FROM cars WHERE id = ?1",
                params![car_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
        None => None,
    };
    let (car_name, license_plate) = car.unzip();

    Ok(PublicPerizinanView {
        id: perizinan.id,
        status: perizinan.status,
        purpose: perizinan.purpose.clone(),
        destination: perizinan.destination.clone(),
        trip_date: perizinan.trip_date.clone(),
        passenger_count: perizinan.passenger_count,
        cost_estimate: perizinan.cost_estimate,
        notes: perizinan.notes.clone(),
        requester_name,
        car_name,
        license_plate,
        token_expires_at: perizinan.token_expires_at.clone(),
    })
}

/// 承認リンク経由で承認・却下する
///
/// トークンは一度だけ使用でき、使用と同時に無効になる
pub fn redeem_token(
    conn: &Connection,
    token: &str,
    decision: Decision,
    note: Option<String>,
    now: DateTime<Utc>,
) -> AppResult<Perizinan> {
    let perizinan = find_by_token(conn, token, now)?;

    let decided_at = format_timestamp(&now);
    let affected = conn.execute(
        "UPDATE perizinan
         SET status = ?1, decided_via = ?2, decided_at = ?3, decision_note = ?4,
             token_used_at = ?3, updated_at = ?3
         WHERE id = ?5 AND status = 'PENDING' AND token_used_at IS NULL AND token_hash = ?6",
        params![
            decision.status(),
            DecisionVia::Token,
            decided_at,
            normalize_optional(note),
            perizinan.id,
            hash_token(token)
        ],
    )?;
    if affected == 0 {
        return Err(AppError::conflict("Tautan persetujuan sudah digunakan"));
    }

    log::info!(
        "承認リンクで許可申請を処理しました: id={}, status={}",
        perizinan.id,
        decision.status()
    );
    find_by_id(conn, perizinan.id)
}

/// アプリ内でADMINが承認・却下する
///
/// 発行済みの承認リンクも同時に無効化する
pub fn decide_in_app(
    conn: &Connection,
    id: i64,
    decided_by: i64,
    decision: Decision,
    note: Option<String>,
) -> AppResult<Perizinan> {
    let current = find_by_id(conn, id)?;
    if current.status.is_terminal() {
        return Err(already_decided("Perizinan", current.status));
    }

    let now = now_jakarta();
    let affected = conn.execute(
        "UPDATE perizinan
         SET status = ?1, decided_by = ?2, decided_via = ?3, decided_at = ?4, decision_note = ?5,
             token_used_at = COALESCE(token_used_at, ?4), updated_at = ?4
         WHERE id = ?6 AND status = 'PENDING'",
        params![
            decision.status(),
            decided_by,
            DecisionVia::InApp,
            now,
            normalize_optional(note),
            id
        ],
    )?;
    if affected == 0 {
        let latest = find_by_id(conn, id)?;
        return Err(already_decided("Perizinan", latest.status));
    }

    log::info!(
        "許可申請を処理しました: id={id}, status={}, decided_by={decided_by}",
        decision.status()
    );
    find_by_id(conn, id)
}

/// 承認トークンを再発行する（PENDINGのみ、旧トークンは無効になる）
pub fn reissue_token(conn: &Connection, id: i64, token: &IssuedToken) -> AppResult<Perizinan> {
    let current = find_by_id(conn, id)?;
    if current.status.is_terminal() {
        return Err(already_decided("Perizinan", current.status));
    }

    conn.execute(
        "UPDATE perizinan
         SET token_hash = ?1, token_expires_at = ?2, token_used_at = NULL, updated_at = ?3
         WHERE id = ?4",
        params![
            token.token_hash,
            format_timestamp(&token.expires_at),
            now_jakarta(),
            id
        ],
    )?;

    log::info!("承認トークンを再発行しました: id={id}");
    find_by_id(conn, id)
}

/// 許可申請を削除する（PENDINGのみ）
pub fn delete(conn: &Connection, id: i64) -> AppResult<()> {
    let current = find_by_id(conn, id)?;
    if current.status.is_terminal() {
        return Err(already_decided("Perizinan", current.status));
    }

    conn.execute("DELETE FROM perizinan WHERE id = ?1", params![id])?;
    log::info!("許可申請を削除しました: id={id}");
    Ok(())
}
