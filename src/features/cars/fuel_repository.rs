use super::models::{CreateFuelPurchaseDto, FuelPurchase};
use super::repository::ensure_active;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{
    normalize_optional, now_jakarta, today_jakarta, validate_amount, validate_date,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const FUEL_COLUMNS: &str =
    "id, car_id, user_id, liters, amount, odometer, receipt_url, purchased_at, created_at";

fn map_fuel(row: &Row) -> rusqlite::Result<FuelPurchase> {
    Ok(FuelPurchase {
        id: row.get(0)?,
        car_id: row.get(1)?,
        user_id: row.get(2)?,
        liters: row.get(3)?,
        amount: row.get(4)?,
        odometer: row.get(5)?,
        receipt_url: row.get(6)?,
        purchased_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// 給油記録を作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `car_id` - 車両ID
/// * `user_id` - 登録者ID
/// * `dto` - 給油記録作成用DTO
pub fn create(
    conn: &Connection,
    car_id: i64,
    user_id: i64,
    dto: &CreateFuelPurchaseDto,
) -> AppResult<FuelPurchase> {
    ensure_active(conn, car_id)?;
    validate_amount(dto.amount)?;

    let purchased_at = dto.purchased_at.clone().unwrap_or_else(today_jakarta);
    validate_date(&purchased_at)?;

    conn.execute(
        "INSERT INTO fuel_purchases
            (car_id, user_id, liters, amount, odometer, receipt_url, purchased_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            car_id,
            user_id,
            dto.liters,
            dto.amount,
            dto.odometer,
            normalize_optional(dto.receipt_url.clone()),
            purchased_at,
            now_jakarta()
        ],
    )?;

    let id = conn.last_insert_rowid();
    log::info!("給油記録を登録しました: id={id}, car_id={car_id}, amount={}", dto.amount);
    find_by_id(conn, id)
}

pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<FuelPurchase> {
    conn.query_row(
        &format!("SELECT {FUEL_COLUMNS} FROM fuel_purchases WHERE id = ?1"),
        params![id],
        map_fuel,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Data BBM"))
}

/// 車両の給油履歴を取得する（新しい順）
pub fn find_by_car(conn: &Connection, car_id: i64) -> AppResult<Vec<FuelPurchase>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FUEL_COLUMNS} FROM fuel_purchases WHERE car_id = ?1
         ORDER BY purchased_at DESC, id DESC"
    ))?;
    let purchases = stmt
        .query_map(params![car_id], map_fuel)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(purchases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::auth::Role;
    use crate::shared::database::create_in_memory_connection;
    use crate::test_support::{seed_car, seed_user};

    fn dto(amount: i64, date: Option<&str>) -> CreateFuelPurchaseDto {
        CreateFuelPurchaseDto {
            liters: 30.5,
            amount,
            odometer: Some(15_000),
            receipt_url: None,
            purchased_at: date.map(str::to_string),
        }
    }

    #[test]
    fn test_create_and_list_fuel_purchases() {
        let conn = create_in_memory_connection().unwrap();
        let user_id = seed_user(&conn, "driver", Role::Driver);
        let car_id = seed_car(&conn, "B 1 A");

        create(&conn, car_id, user_id, &dto(300_000, Some("2024-05-01"))).unwrap();
        let latest = create(&conn, car_id, user_id, &dto(250_000, Some("2024-05-10"))).unwrap();

        let purchases = find_by_car(&conn, car_id).unwrap();
        assert_eq!(purchases.len(), 2);
        assert_eq!(purchases[0].id, latest.id);
        assert_eq!(purchases[0].liters, 30.5);
    }

    #[test]
    fn test_purchase_date_defaults_to_today() {
        let conn = create_in_memory_connection().unwrap();
        let user_id = seed_user(&conn, "driver", Role::Driver);
        let car_id = seed_car(&conn, "B 1 A");

        let purchase = create(&conn, car_id, user_id, &dto(300_000, None)).unwrap();
        assert_eq!(purchase.purchased_at, today_jakarta());
    }

    #[test]
    fn test_invalid_date_rejected() {
        let conn = create_in_memory_connection().unwrap();
        let user_id = seed_user(&conn, "driver", Role::Driver);
        let car_id = seed_car(&conn, "B 1 A");

        assert!(matches!(
            create(&conn, car_id, user_id, &dto(300_000, Some("2024-13-01"))),
            Err(AppError::Validation(_))
        ));
    }
}
