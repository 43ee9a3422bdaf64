use anyhow::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Student profile, joined with the current department membership row.
#[derive(Serialize)]
pub struct Student {
    pub user_id: i64,
    pub registry_id: String,
    pub first_name: String,
    pub last_name: String,
    pub admission_year: i64,
    pub department_id: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbStudent {
    pub user_id: Option<i64>,
    pub registry_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub admission_year: Option<i64>,
    pub department_id: Option<i64>,
}

impl From<DbStudent> for Student {
    fn from(student: DbStudent) -> Self {
        Self {
            user_id: student.user_id.unwrap_or_default(),
            registry_id: student.registry_id.unwrap_or_default(),
            first_name: student.first_name.unwrap_or_default(),
            last_name: student.last_name.unwrap_or_default(),
            admission_year: student.admission_year.unwrap_or_default(),
            department_id: student.department_id.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
pub struct Teacher {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub rank: TeacherRank,
    pub department_id: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTeacher {
    pub user_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub rank: Option<String>,
    pub department_id: Option<i64>,
}

impl From<DbTeacher> for Teacher {
    fn from(teacher: DbTeacher) -> Self {
        Self {
            user_id: teacher.user_id.unwrap_or_default(),
            first_name: teacher.first_name.unwrap_or_default(),
            last_name: teacher.last_name.unwrap_or_default(),
            rank: TeacherRank::from_str(&teacher.rank.unwrap_or_default()).unwrap_or_default(),
            department_id: teacher.department_id.unwrap_or_default(),
        }
    }
}

/// Department admin profile. Unlike students and teachers, the department
/// reference lives directly on the profile row, not in a membership table.
#[derive(Serialize)]
pub struct Deptadmin {
    pub user_id: i64,
    pub department_id: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbDeptadmin {
    pub user_id: Option<i64>,
    pub department_id: Option<i64>,
}

impl From<DbDeptadmin> for Deptadmin {
    fn from(deptadmin: DbDeptadmin) -> Self {
        Self {
            user_id: deptadmin.user_id.unwrap_or_default(),
            department_id: deptadmin.department_id.unwrap_or_default(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Department {
    pub id: i64,
    pub name: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbDepartment {
    pub id: Option<i64>,
    pub name: Option<String>,
}

impl From<DbDepartment> for Department {
    fn from(department: DbDepartment) -> Self {
        Self {
            id: department.id.unwrap_or_default(),
            name: department.name.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeacherRank {
    #[default]
    Lecturer,
    AssistantProfessor,
    AssociateProfessor,
    Professor,
}

impl TeacherRank {
    pub fn as_str(&self) -> &str {
        match self {
            TeacherRank::Lecturer => "lecturer",
            TeacherRank::AssistantProfessor => "assistant_professor",
            TeacherRank::AssociateProfessor => "associate_professor",
            TeacherRank::Professor => "professor",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "lecturer" => Ok(TeacherRank::Lecturer),
            "assistant_professor" => Ok(TeacherRank::AssistantProfessor),
            "associate_professor" => Ok(TeacherRank::AssociateProfessor),
            "professor" => Ok(TeacherRank::Professor),
            _ => Err(Error::msg(format!("Unknown teacher rank: {}", s))),
        }
    }
}

impl fmt::Display for TeacherRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Profile fields shared by student signup and update.
#[derive(Debug, Clone)]
pub struct StudentProfile {
    pub registry_id: String,
    pub first_name: String,
    pub last_name: String,
    pub admission_year: i64,
}

#[derive(Debug, Clone)]
pub struct TeacherProfile {
    pub first_name: String,
    pub last_name: String,
    pub rank: TeacherRank,
}
