use super::models::{
    Car, CarQuery, CarTax, CarUsage, CreateCarDto, CreateCarTaxDto, CreateFuelPurchaseDto,
    FinishUsageDto, FuelPurchase, PayCarTaxDto, StartUsageDto, UpcomingQuery, UpcomingTax,
    UpdateCarDto,
};
use super::tax_repository::DEFAULT_UPCOMING_DAYS;
use super::{fuel_repository, repository, tax_repository, usage_repository};
use crate::features::auth::{CurrentUser, Role};
use crate::shared::database::lock_connection;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::extract::ValidatedJson;
use crate::shared::utils::today_jakarta;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/cars", get(list_cars).post(create_car))
        .route("/api/cars/barcode/:barcode", get(get_car_by_barcode))
        .route(
            "/api/cars/:id",
            get(get_car).put(update_car).delete(delete_car),
        )
        .route("/api/cars/:id/usages", get(list_usages).post(start_usage))
        .route("/api/car-usages/:id/finish", post(finish_usage))
        .route(
            "/api/cars/:id/fuel-purchases",
            get(list_fuel_purchases).post(create_fuel_purchase),
        )
        .route("/api/cars/:id/taxes", get(list_taxes).post(create_tax))
        .route("/api/car-taxes/upcoming", get(upcoming_taxes))
        .route("/api/car-taxes/:id/pay", post(pay_tax))
}

async fn list_cars(
    State(state): State<AppState>,
    Query(query): Query<CarQuery>,
) -> AppResult<Json<Vec<Car>>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::find_all(&conn, query.q.as_deref())?))
}

async fn get_car(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Car>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::find_by_id(&conn, id)?))
}

async fn get_car_by_barcode(
    State(state): State<AppState>,
    Path(barcode): Path<String>,
) -> AppResult<Json<Car>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::find_by_barcode(&conn, &barcode)?))
}

async fn create_car(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(dto): ValidatedJson<CreateCarDto>,
) -> AppResult<Json<Car>> {
    user.require_role(&[Role::Admin])?;
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::create(&conn, &dto)?))
}

async fn update_car(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    ValidatedJson(dto): ValidatedJson<UpdateCarDto>,
) -> AppResult<Json<Car>> {
    user.require_role(&[Role::Admin])?;
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::update(&conn, id, &dto)?))
}

async fn delete_car(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    user.require_role(&[Role::Admin])?;
    let conn = lock_connection(&state.db)?;
    repository::soft_delete(&conn, id)?;
    Ok(Json(json!({ "success": true })))
}

async fn list_usages(
    State(state): State<AppState>,
    Path(car_id): Path<i64>,
) -> AppResult<Json<Vec<CarUsage>>> {
    let conn = lock_connection(&state.db)?;
    repository::ensure_active(&conn, car_id)?;
    Ok(Json(usage_repository::find_by_car(&conn, car_id)?))
}

async fn start_usage(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(car_id): Path<i64>,
    ValidatedJson(dto): ValidatedJson<StartUsageDto>,
) -> AppResult<Json<CarUsage>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(usage_repository::start(&conn, car_id, user.id, &dto)?))
}

/// 利用者本人または管理者のみ終了できる
async fn finish_usage(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    ValidatedJson(dto): ValidatedJson<FinishUsageDto>,
) -> AppResult<Json<CarUsage>> {
    let conn = lock_connection(&state.db)?;
    let usage = usage_repository::find_by_id(&conn, id)?;
    if usage.user_id != user.id && !user.is_admin() {
        return Err(AppError::forbidden("他のユーザーの利用記録は終了できません"));
    }
    Ok(Json(usage_repository::finish(&conn, id, &dto)?))
}

async fn list_fuel_purchases(
    State(state): State<AppState>,
    Path(car_id): Path<i64>,
) -> AppResult<Json<Vec<FuelPurchase>>> {
    let conn = lock_connection(&state.db)?;
    repository::ensure_active(&conn, car_id)?;
    Ok(Json(fuel_repository::find_by_car(&conn, car_id)?))
}

async fn create_fuel_purchase(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(car_id): Path<i64>,
    ValidatedJson(dto): ValidatedJson<CreateFuelPurchaseDto>,
) -> AppResult<Json<FuelPurchase>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(fuel_repository::create(&conn, car_id, user.id, &dto)?))
}

async fn list_taxes(
    State(state): State<AppState>,
    Path(car_id): Path<i64>,
) -> AppResult<Json<Vec<CarTax>>> {
    let conn = lock_connection(&state.db)?;
    repository::ensure_active(&conn, car_id)?;
    Ok(Json(tax_repository::find_by_car(&conn, car_id)?))
}

async fn create_tax(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(car_id): Path<i64>,
    ValidatedJson(dto): ValidatedJson<CreateCarTaxDto>,
) -> AppResult<Json<CarTax>> {
    user.require_role(&[Role::Admin, Role::User])?;
    let conn = lock_connection(&state.db)?;
    Ok(Json(tax_repository::create(&conn, car_id, &dto)?))
}

async fn pay_tax(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    ValidatedJson(dto): ValidatedJson<PayCarTaxDto>,
) -> AppResult<Json<CarTax>> {
    user.require_role(&[Role::Admin, Role::User])?;
    let conn = lock_connection(&state.db)?;
    Ok(Json(tax_repository::pay(&conn, id, &dto)?))
}

async fn upcoming_taxes(
    State(state): State<AppState>,
    Query(query): Query<UpcomingQuery>,
) -> AppResult<Json<Vec<UpcomingTax>>> {
    let days = query.days.unwrap_or(DEFAULT_UPCOMING_DAYS);
    let conn = lock_connection(&state.db)?;
    Ok(Json(tax_repository::find_upcoming(&conn, &today_jakarta(), days)?))
}
