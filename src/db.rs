use crate::{
    auth::{DbUser, DbUserSession, User, UserSession},
    error::AppError,
};
use chrono::{NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::models::{
    DbDepartment, DbDeptadmin, DbStudent, DbTeacher, Department, Deptadmin, Student,
    StudentProfile, Teacher, TeacherProfile,
};

const USER_COLUMNS: &str =
    "id, email, is_student, is_teacher, is_deptadmin, is_staff, is_accepted, is_active";

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE id = ?",
        USER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn find_user_by_email(
    pool: &Pool<Sqlite>,
    email: &str,
) -> Result<Option<User>, AppError> {
    info!("Fetching user by email");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE email = ?",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

#[instrument]
pub async fn get_all_users(pool: &Pool<Sqlite>) -> Result<Vec<User>, AppError> {
    info!("Getting all users");
    let rows = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users ORDER BY id",
        USER_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(User::from).collect())
}

/// Credential check plus acceptance gate. Unknown email, wrong password and
/// deactivated accounts all collapse into `InvalidCredentials`; the
/// `AccountDisabled` rejection is only reachable after the credentials have
/// been verified.
#[instrument(skip_all, fields(email))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<User, AppError> {
    info!("Authenticating user");
    let password_hash: Option<String> =
        sqlx::query_scalar("SELECT password FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(pool)
            .await?;

    let hash = match password_hash {
        Some(hash) => hash,
        _ => return Err(AppError::InvalidCredentials),
    };

    let valid = match bcrypt::verify(password, &hash) {
        Ok(valid) => valid,
        Err(_) => false,
    };
    if !valid {
        return Err(AppError::InvalidCredentials);
    }

    let user = find_user_by_email(pool, email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !user.is_active {
        return Err(AppError::InvalidCredentials);
    }

    if !user.is_accepted {
        return Err(AppError::AccountDisabled);
    }

    Ok(user)
}

// Account actions ====================================================

#[instrument]
pub async fn accept_user(pool: &Pool<Sqlite>, user_id: i64) -> Result<(), AppError> {
    info!("Accepting user account");
    let res = sqlx::query("UPDATE users SET is_accepted = 1 WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            user_id
        )));
    }

    Ok(())
}

#[instrument]
pub async fn set_user_active(
    pool: &Pool<Sqlite>,
    user_id: i64,
    active: bool,
) -> Result<(), AppError> {
    info!("Toggling user active status");
    let res = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
        .bind(active)
        .bind(user_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            user_id
        )));
    }

    Ok(())
}

/// Deleting an absent user is a no-op, not an error. Profile, membership and
/// session rows go with the user via FK cascade.
#[instrument]
pub async fn delete_user(pool: &Pool<Sqlite>, user_id: i64) -> Result<(), AppError> {
    info!("Deleting user account");
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

// Uniqueness pre-checks ==============================================
//
// Advisory only: the unique indexes decide the loser of a race, and a
// violation that slips past these checks surfaces as a Database error.

#[instrument]
pub async fn email_in_use(
    pool: &Pool<Sqlite>,
    email: &str,
    exclude_user: Option<i64>,
) -> Result<bool, AppError> {
    let existing: Option<i64> = match exclude_user {
        Some(user_id) => {
            sqlx::query_scalar("SELECT id FROM users WHERE email = ? AND id != ?")
                .bind(email)
                .bind(user_id)
                .fetch_optional(pool)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(pool)
                .await?
        }
    };

    Ok(existing.is_some())
}

#[instrument]
pub async fn registry_id_in_use(
    pool: &Pool<Sqlite>,
    registry_id: &str,
    exclude_user: Option<i64>,
) -> Result<bool, AppError> {
    let existing: Option<i64> = match exclude_user {
        Some(user_id) => {
            sqlx::query_scalar("SELECT user_id FROM students WHERE registry_id = ? AND user_id != ?")
                .bind(registry_id)
                .bind(user_id)
                .fetch_optional(pool)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT user_id FROM students WHERE registry_id = ?")
                .bind(registry_id)
                .fetch_optional(pool)
                .await?
        }
    };

    Ok(existing.is_some())
}

#[instrument]
pub async fn department_exists(pool: &Pool<Sqlite>, department_id: i64) -> Result<bool, AppError> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM departments WHERE id = ?")
        .bind(department_id)
        .fetch_optional(pool)
        .await?;

    Ok(existing.is_some())
}

// Student ============================================================

#[instrument(skip_all, fields(email, department_id))]
pub async fn create_student_account(
    pool: &Pool<Sqlite>,
    department_id: i64,
    email: &str,
    password: &str,
    profile: &StudentProfile,
) -> Result<i64, AppError> {
    info!("Creating student account");

    if !department_exists(pool, department_id).await? {
        return Err(AppError::NotFound(format!(
            "Department with id {} not found in database",
            department_id
        )));
    }

    if email_in_use(pool, email, None).await? {
        return Err(AppError::EmailTaken);
    }

    if registry_id_in_use(pool, &profile.registry_id, None).await? {
        return Err(AppError::DuplicateRegistryId);
    }

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let mut tx = pool.begin().await?;

    let res = sqlx::query("INSERT INTO users (email, password, is_student) VALUES (?, ?, 1)")
        .bind(email)
        .bind(&hashed_password)
        .execute(&mut *tx)
        .await?;
    let user_id = res.last_insert_rowid();

    sqlx::query(
        "INSERT INTO students (user_id, registry_id, first_name, last_name, admission_year)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&profile.registry_id)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(profile.admission_year)
    .execute(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO department_students (department_id, user_id) VALUES (?, ?)")
        .bind(department_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(user_id)
}

#[instrument(skip_all, fields(user_id, email, department_id))]
pub async fn update_student_account(
    pool: &Pool<Sqlite>,
    user_id: i64,
    department_id: i64,
    email: &str,
    profile: &StudentProfile,
) -> Result<(), AppError> {
    info!("Updating student account");

    if !department_exists(pool, department_id).await? {
        return Err(AppError::NotFound(format!(
            "Department with id {} not found in database",
            department_id
        )));
    }

    if email_in_use(pool, email, Some(user_id)).await? {
        return Err(AppError::EmailTaken);
    }

    if registry_id_in_use(pool, &profile.registry_id, Some(user_id)).await? {
        return Err(AppError::DuplicateRegistryId);
    }

    let mut tx = pool.begin().await?;

    let res = sqlx::query("UPDATE users SET email = ? WHERE id = ?")
        .bind(email)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            user_id
        )));
    }

    let res = sqlx::query(
        "UPDATE students
         SET registry_id = ?, first_name = ?, last_name = ?, admission_year = ?
         WHERE user_id = ?",
    )
    .bind(&profile.registry_id)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(profile.admission_year)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Student profile for user {} not found in database",
            user_id
        )));
    }

    // The membership row must already exist: update, never insert.
    let res = sqlx::query("UPDATE department_students SET department_id = ? WHERE user_id = ?")
        .bind(department_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Department membership for user {} not found in database",
            user_id
        )));
    }

    tx.commit().await?;

    Ok(())
}

#[instrument]
pub async fn get_student_profile(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Option<Student>, AppError> {
    info!("Fetching student profile");
    let row = sqlx::query_as::<_, DbStudent>(
        "SELECT s.user_id, s.registry_id, s.first_name, s.last_name, s.admission_year,
                m.department_id
         FROM students s
         LEFT JOIN department_students m ON m.user_id = s.user_id
         WHERE s.user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Student::from))
}

// Teacher ============================================================

#[instrument(skip_all, fields(email, department_id))]
pub async fn create_teacher_account(
    pool: &Pool<Sqlite>,
    department_id: i64,
    email: &str,
    password: &str,
    profile: &TeacherProfile,
) -> Result<i64, AppError> {
    info!("Creating teacher account");

    if !department_exists(pool, department_id).await? {
        return Err(AppError::NotFound(format!(
            "Department with id {} not found in database",
            department_id
        )));
    }

    if email_in_use(pool, email, None).await? {
        return Err(AppError::EmailTaken);
    }

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let mut tx = pool.begin().await?;

    let res = sqlx::query("INSERT INTO users (email, password, is_teacher) VALUES (?, ?, 1)")
        .bind(email)
        .bind(&hashed_password)
        .execute(&mut *tx)
        .await?;
    let user_id = res.last_insert_rowid();

    sqlx::query("INSERT INTO teachers (user_id, first_name, last_name, rank) VALUES (?, ?, ?, ?)")
        .bind(user_id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(profile.rank.as_str())
        .execute(&mut *tx)
        .await?;

    sqlx::query("INSERT INTO department_teachers (department_id, user_id) VALUES (?, ?)")
        .bind(department_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(user_id)
}

#[instrument(skip_all, fields(user_id, email, department_id))]
pub async fn update_teacher_account(
    pool: &Pool<Sqlite>,
    user_id: i64,
    department_id: i64,
    email: &str,
    profile: &TeacherProfile,
) -> Result<(), AppError> {
    info!("Updating teacher account");

    if !department_exists(pool, department_id).await? {
        return Err(AppError::NotFound(format!(
            "Department with id {} not found in database",
            department_id
        )));
    }

    if email_in_use(pool, email, Some(user_id)).await? {
        return Err(AppError::EmailTaken);
    }

    let mut tx = pool.begin().await?;

    let res = sqlx::query("UPDATE users SET email = ? WHERE id = ?")
        .bind(email)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            user_id
        )));
    }

    let res = sqlx::query(
        "UPDATE teachers SET first_name = ?, last_name = ?, rank = ? WHERE user_id = ?",
    )
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(profile.rank.as_str())
    .bind(user_id)
    .execute(&mut *tx)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Teacher profile for user {} not found in database",
            user_id
        )));
    }

    let res = sqlx::query("UPDATE department_teachers SET department_id = ? WHERE user_id = ?")
        .bind(department_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Department membership for user {} not found in database",
            user_id
        )));
    }

    tx.commit().await?;

    Ok(())
}

#[instrument]
pub async fn get_teacher_profile(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Option<Teacher>, AppError> {
    info!("Fetching teacher profile");
    let row = sqlx::query_as::<_, DbTeacher>(
        "SELECT t.user_id, t.first_name, t.last_name, t.rank, m.department_id
         FROM teachers t
         LEFT JOIN department_teachers m ON m.user_id = t.user_id
         WHERE t.user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Teacher::from))
}

// Deptadmin ==========================================================

#[instrument(skip_all, fields(email, department_id))]
pub async fn create_deptadmin_account(
    pool: &Pool<Sqlite>,
    department_id: i64,
    email: &str,
    password: &str,
) -> Result<i64, AppError> {
    info!("Creating deptadmin account");

    if !department_exists(pool, department_id).await? {
        return Err(AppError::NotFound(format!(
            "Department with id {} not found in database",
            department_id
        )));
    }

    if email_in_use(pool, email, None).await? {
        return Err(AppError::EmailTaken);
    }

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let mut tx = pool.begin().await?;

    // Department admins also get the staff flag at signup.
    let res = sqlx::query(
        "INSERT INTO users (email, password, is_deptadmin, is_staff) VALUES (?, ?, 1, 1)",
    )
    .bind(email)
    .bind(&hashed_password)
    .execute(&mut *tx)
    .await?;
    let user_id = res.last_insert_rowid();

    sqlx::query("INSERT INTO deptadmins (user_id, department_id) VALUES (?, ?)")
        .bind(user_id)
        .bind(department_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(user_id)
}

#[instrument(skip_all, fields(user_id, email, department_id))]
pub async fn update_deptadmin_account(
    pool: &Pool<Sqlite>,
    user_id: i64,
    department_id: i64,
    email: &str,
) -> Result<(), AppError> {
    info!("Updating deptadmin account");

    if !department_exists(pool, department_id).await? {
        return Err(AppError::NotFound(format!(
            "Department with id {} not found in database",
            department_id
        )));
    }

    if email_in_use(pool, email, Some(user_id)).await? {
        return Err(AppError::EmailTaken);
    }

    let mut tx = pool.begin().await?;

    let res = sqlx::query("UPDATE users SET email = ? WHERE id = ?")
        .bind(email)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            user_id
        )));
    }

    let res = sqlx::query("UPDATE deptadmins SET department_id = ? WHERE user_id = ?")
        .bind(department_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Deptadmin profile for user {} not found in database",
            user_id
        )));
    }

    tx.commit().await?;

    Ok(())
}

#[instrument]
pub async fn get_deptadmin_profile(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Option<Deptadmin>, AppError> {
    info!("Fetching deptadmin profile");
    let row = sqlx::query_as::<_, DbDeptadmin>(
        "SELECT user_id, department_id FROM deptadmins WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Deptadmin::from))
}

// Departments ========================================================

#[instrument]
pub async fn get_all_departments(pool: &Pool<Sqlite>) -> Result<Vec<Department>, AppError> {
    info!("Getting all departments");
    let rows = sqlx::query_as::<_, DbDepartment>("SELECT id, name FROM departments ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Department::from).collect())
}

#[instrument]
pub async fn create_department(pool: &Pool<Sqlite>, name: &str) -> Result<i64, AppError> {
    info!("Creating department");

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM departments WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Validation(format!(
            "Department '{}' already exists",
            name
        )));
    }

    let res = sqlx::query("INSERT INTO departments (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

// Sessions ===========================================================

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::InvalidCredentials),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
