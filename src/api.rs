use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{User, UserSession};
use crate::db::{
    accept_user, authenticate_user, clean_expired_sessions, create_department,
    create_deptadmin_account, create_student_account, create_teacher_account, create_user_session,
    delete_user, get_all_departments, get_all_users, get_deptadmin_profile, get_student_profile,
    get_teacher_profile, get_user, invalidate_session, set_user_active, update_deptadmin_account,
    update_student_account, update_teacher_account,
};
use crate::models::{
    Department, Deptadmin, Student, StudentProfile, Teacher, TeacherProfile, TeacherRank,
};
use crate::validation::AppErrorExt;
use crate::validation::JsonValidateExt;
use crate::validation::PermissionCheckExt;
use crate::validation::ValidationResponse;

static REGISTRY_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9./-]*$").unwrap());

// Checks the derived `validator` rules cannot express: cross-field and
// calendar-dependent constraints.

pub(crate) fn check_passwords_match(
    password: &str,
    password_confirm: &str,
) -> Result<(), Custom<Json<ValidationResponse>>> {
    if password != password_confirm {
        return Err(Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::with_error(
                "password_confirm",
                "Passwords do not match",
            )),
        ));
    }
    Ok(())
}

pub(crate) fn check_admission_year(year: i64) -> Result<(), Custom<Json<ValidationResponse>>> {
    let current_year = Utc::now().year() as i64;
    if year > current_year {
        return Err(Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::with_error(
                "admission_year",
                &format!("Admission year cannot be later than {}", current_year),
            )),
        ));
    }
    Ok(())
}

pub(crate) fn check_registry_id_format(registry_id: &str) -> Result<(), Custom<Json<ValidationResponse>>> {
    if !REGISTRY_ID_RE.is_match(registry_id) {
        return Err(Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::with_error(
                "registry_id",
                "Registry id may only contain letters, digits, '.', '/' and '-'",
            )),
        ));
    }
    Ok(())
}

// Signin =============================================================

#[derive(Deserialize, Validate)]
pub struct SigninRequest {
    #[validate(email, length(max = 254))]
    email: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct SigninResponse {
    pub success: bool,
    pub user: Option<UserData>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub email: String,
    pub role: String,
    pub is_staff: bool,
    pub is_accepted: bool,
    pub is_active: bool,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role_label().to_string(),
            is_staff: user.is_staff,
            is_accepted: user.is_accepted,
            is_active: user.is_active,
        }
    }
}

#[post("/signin", data = "<signin>")]
pub async fn api_signin(
    signin: Json<SigninRequest>,
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SigninResponse>, Custom<Json<ValidationResponse>>> {
    use rocket::http::{Cookie, SameSite};

    let validated = signin.validate_custom()?;

    let user = authenticate_user(db, &validated.email, &validated.password)
        .await
        .validate_custom()?;

    let token = UserSession::generate_token();
    let expires_at = Utc::now() + chrono::Duration::hours(1);

    create_user_session(db, user.id, &token, expires_at.naive_utc())
        .await
        .validate_custom()?;

    let cookie = Cookie::build(("session_token", token))
        .same_site(SameSite::Lax)
        .http_only(true)
        .max_age(rocket::time::Duration::hours(1));
    cookies.add_private(cookie);

    cookies.add_private(
        Cookie::build(("user_id", user.id.to_string()))
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(rocket::time::Duration::hours(1)),
    );

    cookies.add_private(
        Cookie::build(("user_role", user.role_label().to_string()))
            .same_site(SameSite::Lax)
            .max_age(rocket::time::Duration::hours(1)),
    );

    Ok(Json(SigninResponse {
        success: true,
        user: Some(UserData::from(user)),
    }))
}

#[post("/signout")]
pub async fn api_signout(
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Status {
    let token = cookies
        .get_private("session_token")
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        let _ = invalidate_session(db, &token).await;
    }

    cookies.remove_private(rocket::http::Cookie::build("session_token"));
    cookies.remove_private(rocket::http::Cookie::build("user_id"));
    cookies.remove_private(rocket::http::Cookie::build("user_role"));

    Status::Ok
}

#[get("/me")]
pub async fn api_me(user: User) -> Json<UserData> {
    Json(UserData::from(user))
}

#[get("/me", rank = 2)]
pub async fn api_me_unauthorized() -> Status {
    Status::Unauthorized
}

// Signup =============================================================

#[derive(Serialize, Deserialize)]
pub struct SignupResponse {
    pub user_id: i64,
}

#[derive(Deserialize, Validate, Clone)]
pub struct StudentSignupRequest {
    pub department_id: i64,
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub first_name: String,
    #[validate(length(min = 1, max = 200))]
    pub last_name: String,
    #[validate(length(min = 1, max = 100))]
    pub registry_id: String,
    #[validate(range(min = 2000, message = "Admission year must be 2000 or later"))]
    pub admission_year: i64,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub password_confirm: String,
}

#[post("/signup/student", data = "<signup>")]
pub async fn api_signup_student(
    signup: Json<StudentSignupRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<SignupResponse>>, Custom<Json<ValidationResponse>>> {
    let validated = signup.validate_custom()?;
    check_passwords_match(&validated.password, &validated.password_confirm)?;
    check_admission_year(validated.admission_year)?;
    check_registry_id_format(&validated.registry_id)?;

    let profile = StudentProfile {
        registry_id: validated.registry_id.clone(),
        first_name: validated.first_name.clone(),
        last_name: validated.last_name.clone(),
        admission_year: validated.admission_year,
    };

    let user_id = create_student_account(
        db,
        validated.department_id,
        &validated.email,
        &validated.password,
        &profile,
    )
    .await
    .validate_custom()?;

    Ok(Custom(Status::Created, Json(SignupResponse { user_id })))
}

#[derive(Deserialize, Validate, Clone)]
pub struct TeacherSignupRequest {
    pub department_id: i64,
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub first_name: String,
    #[validate(length(min = 1, max = 200))]
    pub last_name: String,
    pub rank: TeacherRank,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub password_confirm: String,
}

#[post("/signup/teacher", data = "<signup>")]
pub async fn api_signup_teacher(
    signup: Json<TeacherSignupRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<SignupResponse>>, Custom<Json<ValidationResponse>>> {
    let validated = signup.validate_custom()?;
    check_passwords_match(&validated.password, &validated.password_confirm)?;

    let profile = TeacherProfile {
        first_name: validated.first_name.clone(),
        last_name: validated.last_name.clone(),
        rank: validated.rank,
    };

    let user_id = create_teacher_account(
        db,
        validated.department_id,
        &validated.email,
        &validated.password,
        &profile,
    )
    .await
    .validate_custom()?;

    Ok(Custom(Status::Created, Json(SignupResponse { user_id })))
}

#[derive(Deserialize, Validate, Clone)]
pub struct DeptadminSignupRequest {
    pub department_id: i64,
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub password_confirm: String,
}

#[post("/signup/deptadmin", data = "<signup>")]
pub async fn api_signup_deptadmin(
    signup: Json<DeptadminSignupRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<SignupResponse>>, Custom<Json<ValidationResponse>>> {
    let validated = signup.validate_custom()?;
    check_passwords_match(&validated.password, &validated.password_confirm)?;

    let user_id = create_deptadmin_account(
        db,
        validated.department_id,
        &validated.email,
        &validated.password,
    )
    .await
    .validate_custom()?;

    Ok(Custom(Status::Created, Json(SignupResponse { user_id })))
}

// Updates ============================================================

#[derive(Deserialize, Validate, Clone)]
pub struct StudentUpdateRequest {
    pub department_id: i64,
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub first_name: String,
    #[validate(length(min = 1, max = 200))]
    pub last_name: String,
    #[validate(length(min = 1, max = 100))]
    pub registry_id: String,
    #[validate(range(min = 2000, message = "Admission year must be 2000 or later"))]
    pub admission_year: i64,
}

#[put("/users/<id>/student", data = "<update>")]
pub async fn api_update_student(
    id: i64,
    update: Json<StudentUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    if user.id != id {
        user.require_staff().validate_custom()?;
    }

    let validated = update.validate_custom()?;
    check_admission_year(validated.admission_year)?;
    check_registry_id_format(&validated.registry_id)?;

    let profile = StudentProfile {
        registry_id: validated.registry_id.clone(),
        first_name: validated.first_name.clone(),
        last_name: validated.last_name.clone(),
        admission_year: validated.admission_year,
    };

    update_student_account(db, id, validated.department_id, &validated.email, &profile)
        .await
        .validate_custom()?;

    Ok(Status::Ok)
}

#[derive(Deserialize, Validate, Clone)]
pub struct TeacherUpdateRequest {
    pub department_id: i64,
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub first_name: String,
    #[validate(length(min = 1, max = 200))]
    pub last_name: String,
    pub rank: TeacherRank,
}

#[put("/users/<id>/teacher", data = "<update>")]
pub async fn api_update_teacher(
    id: i64,
    update: Json<TeacherUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    if user.id != id {
        user.require_staff().validate_custom()?;
    }

    let validated = update.validate_custom()?;

    let profile = TeacherProfile {
        first_name: validated.first_name.clone(),
        last_name: validated.last_name.clone(),
        rank: validated.rank,
    };

    update_teacher_account(db, id, validated.department_id, &validated.email, &profile)
        .await
        .validate_custom()?;

    Ok(Status::Ok)
}

#[derive(Deserialize, Validate, Clone)]
pub struct DeptadminUpdateRequest {
    pub department_id: i64,
    #[validate(email, length(max = 254))]
    pub email: String,
}

#[put("/users/<id>/deptadmin", data = "<update>")]
pub async fn api_update_deptadmin(
    id: i64,
    update: Json<DeptadminUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    if user.id != id {
        user.require_staff().validate_custom()?;
    }

    let validated = update.validate_custom()?;

    update_deptadmin_account(db, id, validated.department_id, &validated.email)
        .await
        .validate_custom()?;

    Ok(Status::Ok)
}

// Account actions ====================================================

#[post("/users/<id>/accept")]
pub async fn api_accept_user(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_staff().validate_custom()?;
    accept_user(db, id).await.validate_custom()?;
    Ok(Status::Ok)
}

#[post("/users/<id>/activate")]
pub async fn api_activate_user(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_staff().validate_custom()?;
    set_user_active(db, id, true).await.validate_custom()?;
    Ok(Status::Ok)
}

#[post("/users/<id>/deactivate")]
pub async fn api_deactivate_user(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_staff().validate_custom()?;
    set_user_active(db, id, false).await.validate_custom()?;
    Ok(Status::Ok)
}

#[delete("/users/<id>")]
pub async fn api_delete_user(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_staff().validate_custom()?;
    delete_user(db, id).await.validate_custom()?;
    Ok(Status::Ok)
}

// Directory ==========================================================

#[get("/users")]
pub async fn api_get_users(
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UserData>>, Custom<Json<ValidationResponse>>> {
    let users = get_all_users(db).await.validate_custom()?;

    Ok(Json(users.into_iter().map(UserData::from).collect()))
}

#[derive(Serialize, Deserialize)]
pub struct StudentData {
    pub registry_id: String,
    pub first_name: String,
    pub last_name: String,
    pub admission_year: i64,
    pub department_id: i64,
}

impl From<Student> for StudentData {
    fn from(student: Student) -> Self {
        Self {
            registry_id: student.registry_id,
            first_name: student.first_name,
            last_name: student.last_name,
            admission_year: student.admission_year,
            department_id: student.department_id,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct TeacherData {
    pub first_name: String,
    pub last_name: String,
    pub rank: String,
    pub department_id: i64,
}

impl From<Teacher> for TeacherData {
    fn from(teacher: Teacher) -> Self {
        Self {
            first_name: teacher.first_name,
            last_name: teacher.last_name,
            rank: teacher.rank.to_string(),
            department_id: teacher.department_id,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct DeptadminData {
    pub department_id: i64,
}

impl From<Deptadmin> for DeptadminData {
    fn from(deptadmin: Deptadmin) -> Self {
        Self {
            department_id: deptadmin.department_id,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct UserDetailResponse {
    pub user: UserData,
    pub student: Option<StudentData>,
    pub teacher: Option<TeacherData>,
    pub deptadmin: Option<DeptadminData>,
}

#[get("/users/<id>")]
pub async fn api_get_user(
    id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserDetailResponse>, Custom<Json<ValidationResponse>>> {
    let user = get_user(db, id).await.validate_custom()?;

    let student = get_student_profile(db, id).await.validate_custom()?;
    let teacher = get_teacher_profile(db, id).await.validate_custom()?;
    let deptadmin = get_deptadmin_profile(db, id).await.validate_custom()?;

    Ok(Json(UserDetailResponse {
        user: UserData::from(user),
        student: student.map(StudentData::from),
        teacher: teacher.map(TeacherData::from),
        deptadmin: deptadmin.map(DeptadminData::from),
    }))
}

// Departments ========================================================

// Unauthenticated: the signup forms need the department list before any
// account exists.
#[get("/departments")]
pub async fn api_get_departments(
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Department>>, Custom<Json<ValidationResponse>>> {
    let departments = get_all_departments(db).await.validate_custom()?;
    Ok(Json(departments))
}

#[derive(Deserialize, Validate)]
pub struct CreateDepartmentRequest {
    #[validate(length(min = 1, max = 200))]
    name: String,
}

#[post("/departments", data = "<department>")]
pub async fn api_create_department(
    department: Json<CreateDepartmentRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Department>>, Custom<Json<ValidationResponse>>> {
    user.require_staff().validate_custom()?;

    let validated = department.validate_custom()?;

    let id = create_department(db, &validated.name).await.validate_custom()?;

    Ok(Custom(
        Status::Created,
        Json(Department {
            id,
            name: validated.name,
        }),
    ))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

/// Manual sweep, same operation the background task runs hourly.
#[post("/admin/clean_sessions")]
pub async fn api_clean_sessions(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_staff().validate_custom()?;
    clean_expired_sessions(db).await.validate_custom()?;
    Ok(Status::Ok)
}
