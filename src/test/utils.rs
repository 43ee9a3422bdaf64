use crate::db::{
    accept_user, create_department, create_deptadmin_account, create_student_account,
    create_teacher_account,
};
use crate::error::AppError;
use crate::models::{StudentProfile, TeacherProfile, TeacherRank};
use rocket::http::{ContentType, Cookie, Status};
use rocket::local::asynchronous::Client;
use serde_json::json;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Once;

static INIT: Once = Once::new();
pub static STANDARD_PASSWORD: &str = "password123";

#[derive(Default)]
pub struct TestDbBuilder {
    departments: Vec<String>,
    students: Vec<TestStudent>,
    teachers: Vec<TestTeacher>,
    deptadmins: Vec<TestDeptadmin>,
    accepted: Vec<String>,
}

pub struct TestStudent {
    pub email: String,
    pub registry_id: String,
    pub department: String,
    pub admission_year: i64,
}

pub struct TestTeacher {
    pub email: String,
    pub rank: TeacherRank,
    pub department: String,
}

pub struct TestDeptadmin {
    pub email: String,
    pub department: String,
}

impl TestDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn department(mut self, name: &str) -> Self {
        self.departments.push(name.to_string());
        self
    }

    pub fn student(mut self, email: &str, registry_id: &str, department: &str) -> Self {
        self.students.push(TestStudent {
            email: email.to_string(),
            registry_id: registry_id.to_string(),
            department: department.to_string(),
            admission_year: 2020,
        });
        self
    }

    pub fn teacher(mut self, email: &str, department: &str) -> Self {
        self.teachers.push(TestTeacher {
            email: email.to_string(),
            rank: TeacherRank::Lecturer,
            department: department.to_string(),
        });
        self
    }

    pub fn deptadmin(mut self, email: &str, department: &str) -> Self {
        self.deptadmins.push(TestDeptadmin {
            email: email.to_string(),
            department: department.to_string(),
        });
        self
    }

    /// Marks an account (by email) to be accepted after creation, so it can
    /// pass the signin gate.
    pub fn accepted(mut self, email: &str) -> Self {
        self.accepted.push(email.to_string());
        self
    }

    pub async fn build(self) -> Result<TestDb, AppError> {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });

        let pool = SqlitePool::connect("sqlite::memory:").await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let mut department_id_map: HashMap<String, i64> = HashMap::new();
        let mut user_id_map: HashMap<String, i64> = HashMap::new();

        for name in &self.departments {
            let department_id = create_department(&pool, name).await?;
            department_id_map.insert(name.clone(), department_id);
        }

        for student in &self.students {
            let department_id = department_id_map[&student.department];
            let profile = StudentProfile {
                registry_id: student.registry_id.clone(),
                first_name: "Test".to_string(),
                last_name: "Student".to_string(),
                admission_year: student.admission_year,
            };

            let user_id = create_student_account(
                &pool,
                department_id,
                &student.email,
                STANDARD_PASSWORD,
                &profile,
            )
            .await?;

            user_id_map.insert(student.email.clone(), user_id);
        }

        for teacher in &self.teachers {
            let department_id = department_id_map[&teacher.department];
            let profile = TeacherProfile {
                first_name: "Test".to_string(),
                last_name: "Teacher".to_string(),
                rank: teacher.rank,
            };

            let user_id = create_teacher_account(
                &pool,
                department_id,
                &teacher.email,
                STANDARD_PASSWORD,
                &profile,
            )
            .await?;

            user_id_map.insert(teacher.email.clone(), user_id);
        }

        for deptadmin in &self.deptadmins {
            let department_id = department_id_map[&deptadmin.department];

            let user_id =
                create_deptadmin_account(&pool, department_id, &deptadmin.email, STANDARD_PASSWORD)
                    .await?;

            user_id_map.insert(deptadmin.email.clone(), user_id);
        }

        for email in &self.accepted {
            accept_user(&pool, user_id_map[email]).await?;
        }

        Ok(TestDb {
            pool,
            user_id_map,
            department_id_map,
        })
    }
}

pub struct TestDb {
    pub pool: Pool<Sqlite>,
    pub user_id_map: HashMap<String, i64>,
    pub department_id_map: HashMap<String, i64>,
}

impl TestDb {
    pub fn user_id(&self, email: &str) -> Option<i64> {
        self.user_id_map.get(email).copied()
    }

    pub fn department_id(&self, name: &str) -> Option<i64> {
        self.department_id_map.get(name).copied()
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count rows")
    }
}

/// Accepted accounts for every role, plus one student still waiting on
/// acceptance.
pub async fn create_standard_test_db() -> TestDb {
    TestDbBuilder::new()
        .department("Computer Science")
        .department("Mathematics")
        .student("student@example.com", "CS-2020-001", "Computer Science")
        .teacher("teacher@example.com", "Computer Science")
        .deptadmin("admin@example.com", "Computer Science")
        .student("pending@example.com", "CS-2021-002", "Computer Science")
        .accepted("student@example.com")
        .accepted("teacher@example.com")
        .accepted("admin@example.com")
        .build()
        .await
        .expect("Failed to build test DB")
}

pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
    let client = Client::tracked(crate::init_rocket(test_db.pool.clone()).await)
        .await
        .expect("Failed to build test client");

    (client, test_db)
}

pub async fn signin_test_user(client: &Client, email: &str, password: &str) -> Vec<Cookie<'static>> {
    let response = client
        .post("/api/signin")
        .header(ContentType::JSON)
        .body(
            json!({
                "email": email,
                "password": password
            })
            .to_string(),
        )
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok, "Signin failed for {}", email);

    response.cookies().iter().map(|c| c.clone()).collect()
}
