use super::models::{CreatePengajuanDto, Pengajuan, PengajuanDetail, PengajuanItem};
use crate::features::approval::{already_decided, ApprovalStatus, Decision};
use crate::features::cars::repository::ensure_active;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{normalize_optional, now_jakarta, MAX_AMOUNT};
use rusqlite::{params, Connection, OptionalExtension, Row};

const PENGAJUAN_COLUMNS: &str = "id, status, notes, created_by, decided_by, decided_at, \
                                 decision_note, created_at, updated_at";

fn map_pengajuan(row: &Row) -> rusqlite::Result<Pengajuan> {
    Ok(Pengajuan {
        id: row.get(0)?,
        status: row.get(1)?,
        notes: row.get(2)?,
        created_by: row.get(3)?,
        decided_by: row.get(4)?,
        decided_at: row.get(5)?,
        decision_note: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn map_item(row: &Row) -> rusqlite::Result<PengajuanItem> {
    Ok(PengajuanItem {
        id: row.get(0)?,
        pengajuan_id: row.get(1)?,
        requirement: row.get(2)?,
        cost_estimation: row.get(3)?,
        car_id: row.get(4)?,
        image_url: row.get(5)?,
    })
}

/// 調達申請を作成する
///
/// 申請本体と全明細を1つのトランザクションで保存する
///
/// # 引数
/// * `conn` - データベース接続
/// * `user_id` - 申請者ID
/// * `dto` - 申請内容（明細は1件以上）
pub fn create(conn: &Connection, user_id: i64, dto: &CreatePengajuanDto) -> AppResult<PengajuanDetail> {
    if dto.items.is_empty() {
        return Err(AppError::validation("Minimal satu item pengajuan"));
    }
    for item in &dto.items {
        if !(0..MAX_AMOUNT).contains(&item.cost_estimation) {
            return Err(AppError::validation("Estimasi biaya tidak valid"));
        }
        if let Some(car_id) = item.car_id {
            ensure_active(conn, car_id)?;
        }
    }

    let now = now_jakarta();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO pengajuan (status, notes, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            ApprovalStatus::Pending,
            normalize_optional(dto.notes.clone()),
            user_id,
            now,
            now
        ],
    )?;
    let id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare(
            "INSERT INTO pengajuan_items (pengajuan_id, requirement, cost_estimation, car_id, image_url)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for item in &dto.items {
            stmt.execute(params![
                id,
                item.requirement.trim(),
                item.cost_estimation,
                item.car_id,
                normalize_optional(item.image_url.clone())
            ])?;
        }
    }
    tx.commit()?;

    log::info!(
        "調達申請を作成しました: id={id}, user_id={user_id}, items={}",
        dto.items.len()
    );
    find_detail(conn, id)
}

pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Pengajuan> {
    conn.query_row(
        &format!("SELECT {PENGAJUAN_COLUMNS} FROM pengajuan WHERE id = ?1"),
        params![id],
        map_pengajuan,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Pengajuan"))
}

pub fn find_items(conn: &Connection, pengajuan_id: i64) -> AppResult<Vec<PengajuanItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, pengajuan_id, requirement, cost_estimation, car_id, image_url
         FROM pengajuan_items WHERE pengajuan_id = ?1 ORDER BY id ASC",
    )?;
    let items = stmt
        .query_map(params![pengajuan_id], map_item)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn find_detail(conn: &Connection, id: i64) -> AppResult<PengajuanDetail> {
    let pengajuan = find_by_id(conn, id)?;
    Ok(PengajuanDetail::new(pengajuan, find_items(conn, id)?))
}

/// 調達申請の一覧を取得する（新しい順）
pub fn find_all(conn: &Connection, status: Option<ApprovalStatus>) -> AppResult<Vec<PengajuanDetail>> {
    let mut query = format!("SELECT {PENGAJUAN_COLUMNS} FROM pengajuan WHERE 1=1");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(status) = status {
        query.push_str(" AND status = ?");
        params.push(Box::new(status));
    }
    query.push_str(" ORDER BY created_at DESC, id DESC");

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), map_pengajuan)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|pengajuan| {
            let items = find_items(conn, pengajuan.id)?;
            Ok(PengajuanDetail::new(pengajuan, items))
        })
        .collect()
}

/// 承認または却下する（PENDINGのみ）
///
/// # 引数
/// * `decided_by` - 判断したADMINのID
/// * `decision` - 承認か却下か
/// * `note` - 任意のコメント
pub fn decide(
    conn: &Connection,
    id: i64,
    decided_by: i64,
    decision: Decision,
    note: Option<String>,
) -> AppResult<Pengajuan> {
    let current = find_by_id(conn, id)?;
    if current.status.is_terminal() {
        return Err(already_decided("Pengajuan", current.status));
    }

    let now = now_jakarta();
    let affected = conn.execute(
        "UPDATE pengajuan
         SET status = ?1, decided_by = ?2, decided_at = ?3, decision_note = ?4, updated_at = ?5
         WHERE id = ?6 AND status = 'PENDING'",
        params![
            decision.status(),
            decided_by,
            now,
            normalize_optional(note),
            now,
            id
        ],
    )?;
    if affected == 0 {
        let latest = find_by_id(conn, id)?;
        return Err(already_decided("Pengajuan", latest.status));
    }

    log::info!(
        "調達申請を処理しました: id={id}, status={}, decided_by={decided_by}",
        decision.status()
    );
    find_by_id(conn, id)
}

/// 調達申請を削除する（PENDINGのみ）
pub fn delete(conn: &Connection, id: i64) -> AppResult<()> {
    let current = find_by_id(conn, id)?;
    if current.status.is_terminal() {
        return Err(already_decided("Pengajuan", current.status));
    }

    conn.execute("DELETE FROM pengajuan WHERE id = ?1", params![id])?;
    log::info!("調達申請を削除しました: id={id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::auth::Role;
    use crate::features::pengajuan::models::CreatePengajuanItemDto;
    use crate::shared::database::create_in_memory_connection;
    use crate::test_support::{seed_car, seed_user};

    fn item(requirement: &str, cost: i64, car_id: Option<i64>) -> CreatePengajuanItemDto {
        CreatePengajuanItemDto {
            requirement: requirement.to_string(),
            cost_estimation: cost,
            car_id,
            image_url: None,
        }
    }

    fn setup() -> (Connection, i64, i64) {
        let conn = create_in_memory_connection().unwrap();
        let user = seed_user(&conn, "staff", Role::User);
        let admin = seed_user(&conn, "boss", Role::Admin);
        (conn, user, admin)
    }

    #[test]
    fn test_create_with_items() {
        let (conn, user, _) = setup();
        let car_id = seed_car(&conn, "B 1 A");

        let detail = create(
            &conn,
            user,
            &CreatePengajuanDto {
                notes: Some("Servis rutin".to_string()),
                items: vec![item("Ganti oli", 450_000, Some(car_id)), item("Ban", 1_200_000, None)],
            },
        )
        .unwrap();

        assert_eq!(detail.pengajuan.status, ApprovalStatus::Pending);
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.items[0].car_id, Some(car_id));
        assert_eq!(detail.total_cost_estimation, 1_650_000);
    }

    #[test]
    fn test_invalid_item_inserts_nothing() {
        let (conn, user, _) = setup();

        let result = create(
            &conn,
            user,
            &CreatePengajuanDto {
                notes: None,
                items: vec![item("Ganti oli", 450_000, None), item("Ban", 100, Some(999))],
            },
        );
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(find_all(&conn, None).unwrap().is_empty());

        let empty = create(&conn, user, &CreatePengajuanDto { notes: None, items: vec![] });
        assert!(matches!(empty, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_decisions_are_final() {
        let (conn, user, admin) = setup();
        let detail = create(
            &conn,
            user,
            &CreatePengajuanDto {
                notes: None,
                items: vec![item("Aki", 900_000, None)],
            },
        )
        .unwrap();
        let id = detail.pengajuan.id;

        let approved = decide(&conn, id, admin, Decision::Approve, Some("OK".to_string())).unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert_eq!(approved.decided_by, Some(admin));
        assert_eq!(approved.decision_note.as_deref(), Some("OK"));

        assert!(matches!(
            decide(&conn, id, admin, Decision::Reject, None),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(delete(&conn, id), Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_find_all_by_status_and_delete() {
        let (conn, user, admin) = setup();
        let dto = || CreatePengajuanDto {
            notes: None,
            items: vec![item("Wiper", 150_000, None)],
        };
        let first = create(&conn, user, &dto()).unwrap();
        let second = create(&conn, user, &dto()).unwrap();
        decide(&conn, first.pengajuan.id, admin, Decision::Reject, None).unwrap();

        let pending = find_all(&conn, Some(ApprovalStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].pengajuan.id, second.pengajuan.id);

        delete(&conn, second.pengajuan.id).unwrap();
        assert!(find_items(&conn, second.pengajuan.id).unwrap().is_empty());
        assert_eq!(find_all(&conn, None).unwrap().len(), 1);
    }
}
