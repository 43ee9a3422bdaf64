use rocket::http::Status;
use serde::Serialize;

/// Identity record. Role flags are set once at signup and never transitioned
/// afterwards; there is no role-change operation.
#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub is_student: bool,
    pub is_teacher: bool,
    pub is_deptadmin: bool,
    pub is_staff: bool,
    pub is_accepted: bool,
    pub is_active: bool,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub email: Option<String>,
    pub is_student: Option<bool>,
    pub is_teacher: Option<bool>,
    pub is_deptadmin: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_accepted: Option<bool>,
    pub is_active: Option<bool>,
}

impl From<DbUser> for User {
    fn from(user: DbUser) -> Self {
        Self {
            id: user.id.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
            is_student: user.is_student.unwrap_or_default(),
            is_teacher: user.is_teacher.unwrap_or_default(),
            is_deptadmin: user.is_deptadmin.unwrap_or_default(),
            is_staff: user.is_staff.unwrap_or_default(),
            is_accepted: user.is_accepted.unwrap_or_default(),
            is_active: user.is_active.unwrap_or_default(),
        }
    }
}

impl User {
    pub fn role_label(&self) -> &'static str {
        if self.is_student {
            "student"
        } else if self.is_teacher {
            "teacher"
        } else if self.is_deptadmin {
            "deptadmin"
        } else {
            "staff"
        }
    }

    /// Route-level guard for the privileged operations (account actions,
    /// department management). The save pipeline itself does not authorize.
    pub fn require_staff(&self) -> Result<(), Status> {
        if self.is_staff {
            Ok(())
        } else {
            tracing::warn!(
                email = %self.email,
                role = %self.role_label(),
                "Staff permission denied"
            );
            Err(Status::Forbidden)
        }
    }
}
