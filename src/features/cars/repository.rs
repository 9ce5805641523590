use super::models::{Car, CreateCarDto, UpdateCarDto};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{
    generate_object_suffix, normalize_license_plate, normalize_optional, now_jakarta,
    validate_required_field,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const CAR_COLUMNS: &str = "id, name, license_plate, barcode, image_url, created_at, updated_at";

fn map_car(row: &Row) -> rusqlite::Result<Car> {
    Ok(Car {
        id: row.get(0)?,
        name: row.get(1)?,
        license_plate: row.get(2)?,
        barcode: row.get(3)?,
        image_url: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// ナンバープレートが使用済みかチェックする（論理削除済みの車両も含む）
fn license_plate_taken(conn: &Connection, plate: &str, exclude_id: Option<i64>) -> AppResult<bool> {
    let taken = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM cars WHERE license_plate = ?1 AND id != ?2)",
        params![plate, exclude_id.unwrap_or(0)],
        |row| row.get(0),
    )?;
    Ok(taken)
}

fn barcode_taken(conn: &Connection, barcode: &str, exclude_id: Option<i64>) -> AppResult<bool> {
    let taken = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM cars WHERE barcode = ?1 AND id != ?2)",
        params![barcode, exclude_id.unwrap_or(0)],
        |row| row.get(0),
    )?;
    Ok(taken)
}

fn ensure_unique(
    conn: &Connection,
    plate: &str,
    barcode: &str,
    exclude_id: Option<i64>,
) -> AppResult<()> {
    if license_plate_taken(conn, plate, exclude_id)? {
        return Err(AppError::conflict("Plat nomor sudah terdaftar"));
    }
    if barcode_taken(conn, barcode, exclude_id)? {
        return Err(AppError::conflict("Barcode sudah terdaftar"));
    }
    Ok(())
}

/// 車両を作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `dto` - 車両作成用DTO
///
/// # 戻り値
/// 作成された車両、ナンバープレート重複時はConflictエラー
pub fn create(conn: &Connection, dto: &CreateCarDto) -> AppResult<Car> {
    let plate = normalize_license_plate(&dto.license_plate);
    validate_required_field(&plate, "Plat nomor")?;

    let barcode = normalize_optional(dto.barcode.clone())
        .unwrap_or_else(|| format!("CAR-{}", generate_object_suffix().to_uppercase()));
    ensure_unique(conn, &plate, &barcode, None)?;

    let now = now_jakarta();
    conn.execute(
        "INSERT INTO cars (name, license_plate, barcode, image_url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            dto.name.trim(),
            plate,
            barcode,
            normalize_optional(dto.image_url.clone()),
            now,
            now
        ],
    )?;

    let id = conn.last_insert_rowid();
    log::info!("車両を登録しました: id={id}, plate={plate}");
    find_by_id(conn, id)
}

/// IDで車両を取得する（論理削除済みは除外）
pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Car> {
    conn.query_row(
        &format!("SELECT {CAR_COLUMNS} FROM cars WHERE id = ?1 AND deleted_at IS NULL"),
        params![id],
        map_car,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Mobil"))
}

/// バーコードで車両を取得する
pub fn find_by_barcode(conn: &Connection, barcode: &str) -> AppResult<Car> {
    conn.query_row(
        &format!("SELECT {CAR_COLUMNS} FROM cars WHERE barcode = ?1 AND deleted_at IS NULL"),
        params![barcode.trim()],
        map_car,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Mobil"))
}

/// 車両一覧を取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `search` - 名前・ナンバープレートの部分一致（オプション）
pub fn find_all(conn: &Connection, search: Option<&str>) -> AppResult<Vec<Car>> {
    let mut query = format!("SELECT {CAR_COLUMNS} FROM cars WHERE deleted_at IS NULL");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
        query.push_str(" AND (name LIKE ?1 OR license_plate LIKE ?1)");
        params.push(Box::new(format!("%{}%", term.to_uppercase())));
    }

    query.push_str(" ORDER BY name ASC, id ASC");

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let cars = stmt
        .query_map(param_refs.as_slice(), map_car)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cars)
}

/// 車両を更新する
pub fn update(conn: &Connection, id: i64, dto: &UpdateCarDto) -> AppResult<Car> {
    let existing = find_by_id(conn, id)?;

    let name = dto
        .name
        .as_deref()
        .map(|n| n.trim().to_string())
        .unwrap_or(existing.name);
    let plate = dto
        .license_plate
        .as_deref()
        .map(normalize_license_plate)
        .unwrap_or(existing.license_plate);
    validate_required_field(&plate, "Plat nomor")?;
    let barcode = normalize_optional(dto.barcode.clone()).unwrap_or(existing.barcode);
    let image_url = match &dto.image_url {
        Some(url) => normalize_optional(Some(url.clone())),
        None => existing.image_url,
    };

    ensure_unique(conn, &plate, &barcode, Some(id))?;

    conn.execute(
        "UPDATE cars SET name = ?1, license_plate = ?2, barcode = ?3, image_url = ?4, updated_at = ?5
         WHERE id = ?6",
        params![name, plate, barcode, image_url, now_jakarta(), id],
    )?;

    log::info!("車両を更新しました: id={id}");
    find_by_id(conn, id)
}

/// 車両を論理削除する
///
/// ナンバープレートとバーコードは予約されたまま残る
pub fn soft_delete(conn: &Connection, id: i64) -> AppResult<()> {
    let now = now_jakarta();
    let affected = conn.execute(
        "UPDATE cars SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![now, id],
    )?;

    if affected == 0 {
        return Err(AppError::not_found("Mobil"));
    }

    log::info!("車両を削除しました: id={id}");
    Ok(())
}

/// 車両が存在する（論理削除されていない）ことを確認する
pub fn ensure_active(conn: &Connection, id: i64) -> AppResult<()> {
    find_by_id(conn, id).map(|_| ())
}
