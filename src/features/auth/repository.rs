use super::models::{CreateUserDto, Role, UpdateUserDto, User};
use super::password::hash_password;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{normalize_optional, now_jakarta, validate_phone_number};
use rusqlite::{params, Connection, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, username, name, phone, role, created_at, updated_at";

fn map_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        role: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn normalize_phone(phone: Option<String>) -> AppResult<Option<String>> {
    normalize_optional(phone)
        .map(|p| validate_phone_number(&p))
        .transpose()
}

/// ユーザーを作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `request` - 作成リクエスト（検証済み）
///
/// # 戻り値
/// 作成されたユーザー、ユーザー名重複時はConflictエラー
pub fn create(conn: &Connection, request: &CreateUserDto) -> AppResult<User> {
    let username = request.username.trim().to_lowercase();
    let phone = normalize_phone(request.phone.clone())?;
    let password_hash = hash_password(&request.password)?;
    let now = now_jakarta();

    conn.execute(
        "INSERT INTO users (username, name, phone, password_hash, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            username,
            request.name.trim(),
            phone,
            password_hash,
            request.role,
            now,
            now
        ],
    )
    .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::conflict("Username sudah digunakan"),
        other => other,
    })?;

    let id = conn.last_insert_rowid();
    log::info!("ユーザーを作成しました: id={id}, role={}", request.role);
    get_by_id(conn, id)
}

/// IDでユーザーを取得する
pub fn get_by_id(conn: &Connection, id: i64) -> AppResult<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        map_user,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Pengguna"))
}

/// ユーザー名でユーザーとパスワードハッシュを取得する
///
/// # 戻り値
/// 見つかった場合は(ユーザー, パスワードハッシュ)
pub fn find_by_username(conn: &Connection, username: &str) -> AppResult<Option<(User, String)>> {
    let result = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = ?1"),
            params![username.trim().to_lowercase()],
            |row| Ok((map_user(row)?, row.get::<_, String>(7)?)),
        )
        .optional()?;
    Ok(result)
}

/// すべてのユーザーを取得する（ユーザー名順）
pub fn find_all(conn: &Connection) -> AppResult<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY username ASC"
    ))?;
    let users = stmt
        .query_map([], map_user)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

/// ユーザーを更新する（指定された項目のみ）
pub fn update(conn: &Connection, id: i64, request: &UpdateUserDto) -> AppResult<User> {
    let current = get_by_id(conn, id)?;

    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .unwrap_or(&current.name)
        .to_string();
    let phone = match &request.phone {
        Some(phone) => normalize_phone(Some(phone.clone()))?,
        None => current.phone.clone(),
    };
    let role = request.role.unwrap_or(current.role);
    let now = now_jakarta();

    conn.execute(
        "UPDATE users SET name = ?1, phone = ?2, role = ?3, updated_at = ?4 WHERE id = ?5",
        params![name, phone, role, now, id],
    )?;

    if let Some(password) = &request.password {
        let password_hash = hash_password(password)?;
        conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, id],
        )?;
        log::info!("パスワードを変更しました: user_id={id}");
    }

    log::info!("ユーザーを更新しました: id={id}");
    get_by_id(conn, id)
}

/// ユーザーを削除する
///
/// 取引などから参照されている場合はConflictエラー
pub fn delete(conn: &Connection, id: i64) -> AppResult<()> {
    let affected = conn
        .execute("DELETE FROM users WHERE id = ?1", params![id])
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::conflict("Pengguna masih memiliki data terkait")
            }
            other => other,
        })?;

    if affected == 0 {
        return Err(AppError::not_found("Pengguna"));
    }

    log::info!("ユーザーを削除しました: id={id}");
    Ok(())
}

/// ユーザー数を取得する
pub fn count(conn: &Connection) -> AppResult<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count)
}

/// 指定された役割を持つユーザーの電話番号を取得する
pub fn phones_by_role(conn: &Connection, role: Role) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT phone FROM users WHERE role = ?1 AND phone IS NOT NULL ORDER BY id ASC",
    )?;
    let phones = stmt
        .query_map(params![role], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(phones)
}

/// ユーザーテーブルが空の場合に初期管理者を作成する
///
/// # 引数
/// * `username` - 管理者ユーザー名
/// * `password` - 管理者パスワード
///
/// # 戻り値
/// 作成した場合はSome(ユーザー)、既にユーザーが存在する場合はNone
pub fn ensure_admin_user(
    conn: &Connection,
    username: &str,
    password: &str,
) -> AppResult<Option<User>> {
    if count(conn)? > 0 {
        return Ok(None);
    }

    let request = CreateUserDto {
        username: username.to_string(),
        name: "Administrator".to_string(),
        phone: None,
        password: password.to_string(),
        role: Role::Admin,
    };
    let user = create(conn, &request)?;
    log::info!("初期管理者を作成しました: username={}", user.username);
    Ok(Some(user))
}
