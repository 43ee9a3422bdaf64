#[cfg(test)]
mod tests {
    use crate::api::{SigninResponse, SignupResponse, UserData, UserDetailResponse};
    use crate::db::{get_student_profile, get_user};
    use crate::models::Department;
    use crate::test::utils::{
        STANDARD_PASSWORD, create_standard_test_db, setup_test_client, signin_test_user,
    };
    use rocket::http::{ContentType, Cookie, Status};
    use serde_json::json;

    #[rocket::async_test]
    async fn test_signin_api() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let response = client
            .post("/api/signin")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "student@example.com",
                    "password": "password123"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let signin_response: SigninResponse = serde_json::from_str(&body).unwrap();

        assert!(signin_response.success);
        assert_eq!(
            signin_response.user.unwrap().email,
            "student@example.com"
        );

        let response = client
            .post("/api/signin")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "student@example.com",
                    "password": "wrong_password"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_signin_does_not_reveal_account_existence() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let unknown_email = client
            .post("/api/signin")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "nobody@example.com",
                    "password": "password123"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        let unknown_status = unknown_email.status();
        let unknown_body = unknown_email.into_string().await.unwrap();

        let wrong_password = client
            .post("/api/signin")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "student@example.com",
                    "password": "wrong_password"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        let wrong_status = wrong_password.status();
        let wrong_body = wrong_password.into_string().await.unwrap();

        assert_eq!(unknown_status, Status::Unauthorized);
        assert_eq!(unknown_status, wrong_status);
        assert_eq!(unknown_body, wrong_body, "Rejections must be identical");
    }

    #[rocket::async_test]
    async fn test_signin_pending_account_gets_disabled_response() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let response = client
            .post("/api/signin")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "pending@example.com",
                    "password": "password123"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Forbidden);

        let body = response.into_string().await.unwrap();
        assert!(
            body.contains("Please wait for your account to be enabled."),
            "Expected the disabled-account message, got: {}",
            body
        );
    }

    #[rocket::async_test]
    async fn test_auth_required_apis() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let endpoints = vec!["/api/me", "/api/users", "/api/users/1"];

        for endpoint in endpoints {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "Endpoint {} did not require authentication",
                endpoint
            );
        }
    }

    #[rocket::async_test]
    async fn test_api_session_security() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let forged_cookie = Cookie::build(("session_token", "fake_token")).build();

        let response = client
            .get("/api/me")
            .private_cookie(forged_cookie)
            .dispatch()
            .await;

        assert_eq!(
            response.status(),
            Status::Unauthorized,
            "Forged session token was accepted"
        );

        let cookies = signin_test_user(&client, "student@example.com", STANDARD_PASSWORD).await;

        let response = client.get("/api/me").cookies(cookies).dispatch().await;

        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let user_data: UserData = serde_json::from_str(&body).unwrap();
        assert_eq!(user_data.email, "student@example.com");
        assert_eq!(user_data.role, "student");
    }

    #[rocket::async_test]
    async fn test_student_signup_and_accept_flow() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let department_id = test_db
            .department_id("Computer Science")
            .expect("Department not found");

        let response = client
            .post("/api/signup/student")
            .header(ContentType::JSON)
            .body(
                json!({
                    "department_id": department_id,
                    "email": "newstudent@example.com",
                    "first_name": "Nikos",
                    "last_name": "Antoniou",
                    "registry_id": "CS-2024-100",
                    "admission_year": 2024,
                    "password": "password123",
                    "password_confirm": "password123"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);

        let body = response.into_string().await.unwrap();
        let signup_response: SignupResponse = serde_json::from_str(&body).unwrap();

        let student = get_student_profile(&test_db.pool, signup_response.user_id)
            .await
            .expect("Failed to fetch student profile")
            .expect("Student profile missing");
        assert_eq!(student.registry_id, "CS-2024-100");

        // Not yet accepted, so the new account cannot sign in.
        let response = client
            .post("/api/signin")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "newstudent@example.com",
                    "password": "password123"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        // A staff account accepts it.
        let cookies = signin_test_user(&client, "admin@example.com", STANDARD_PASSWORD).await;
        let response = client
            .post(format!("/api/users/{}/accept", signup_response.user_id))
            .cookies(cookies)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        signin_test_user(&client, "newstudent@example.com", "password123").await;
    }

    #[rocket::async_test]
    async fn test_student_signup_duplicate_registry_id_api() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let department_id = test_db
            .department_id("Computer Science")
            .expect("Department not found");

        let users_before = test_db.count("users").await;

        // CS-2020-001 already belongs to student@example.com.
        let response = client
            .post("/api/signup/student")
            .header(ContentType::JSON)
            .body(
                json!({
                    "department_id": department_id,
                    "email": "someoneelse@example.com",
                    "first_name": "Nikos",
                    "last_name": "Antoniou",
                    "registry_id": "CS-2020-001",
                    "admission_year": 2024,
                    "password": "password123",
                    "password_confirm": "password123"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Conflict);
        assert_eq!(test_db.count("users").await, users_before);
    }

    #[rocket::async_test]
    async fn test_student_signup_validation_errors() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let department_id = test_db
            .department_id("Computer Science")
            .expect("Department not found");

        let valid = json!({
            "department_id": department_id,
            "email": "invalid@example.com",
            "first_name": "Nikos",
            "last_name": "Antoniou",
            "registry_id": "CS-2024-200",
            "admission_year": 2024,
            "password": "password123",
            "password_confirm": "password123"
        });

        let mut too_early = valid.clone();
        too_early["admission_year"] = json!(1999);

        let mut mismatch = valid.clone();
        mismatch["password_confirm"] = json!("different123");

        let mut bad_email = valid.clone();
        bad_email["email"] = json!("not-an-email");

        for body in [too_early, mismatch, bad_email] {
            let response = client
                .post("/api/signup/student")
                .header(ContentType::JSON)
                .body(body.to_string())
                .dispatch()
                .await;

            assert_eq!(response.status(), Status::UnprocessableEntity);
        }

        assert_eq!(test_db.count("users").await, 4);
    }

    #[rocket::async_test]
    async fn test_teacher_signup_api() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let department_id = test_db
            .department_id("Mathematics")
            .expect("Department not found");

        let response = client
            .post("/api/signup/teacher")
            .header(ContentType::JSON)
            .body(
                json!({
                    "department_id": department_id,
                    "email": "newteacher@example.com",
                    "first_name": "Maria",
                    "last_name": "Ioannou",
                    "rank": "associate_professor",
                    "password": "password123",
                    "password_confirm": "password123"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);

        // An out-of-range rank never reaches the pipeline.
        let response = client
            .post("/api/signup/teacher")
            .header(ContentType::JSON)
            .body(
                json!({
                    "department_id": department_id,
                    "email": "other@example.com",
                    "first_name": "Maria",
                    "last_name": "Ioannou",
                    "rank": "dean",
                    "password": "password123",
                    "password_confirm": "password123"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);
    }

    #[rocket::async_test]
    async fn test_deptadmin_signup_api() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let department_id = test_db
            .department_id("Mathematics")
            .expect("Department not found");

        let response = client
            .post("/api/signup/deptadmin")
            .header(ContentType::JSON)
            .body(
                json!({
                    "department_id": department_id,
                    "email": "newadmin@example.com",
                    "password": "password123",
                    "password_confirm": "password123"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);

        let body = response.into_string().await.unwrap();
        let signup_response: SignupResponse = serde_json::from_str(&body).unwrap();

        let user = get_user(&test_db.pool, signup_response.user_id)
            .await
            .expect("Failed to fetch user");
        assert!(user.is_deptadmin);
        assert!(user.is_staff);
    }

    #[rocket::async_test]
    async fn test_user_detail_api() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let student_id = test_db.user_id("student@example.com").expect("User not found");

        let cookies = signin_test_user(&client, "teacher@example.com", STANDARD_PASSWORD).await;

        let response = client
            .get(format!("/api/users/{}", student_id))
            .cookies(cookies.clone())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let detail: UserDetailResponse = serde_json::from_str(&body).unwrap();

        assert_eq!(detail.user.email, "student@example.com");
        let student = detail.student.expect("Student profile missing");
        assert_eq!(student.registry_id, "CS-2020-001");
        assert!(detail.teacher.is_none());
        assert!(detail.deptadmin.is_none());

        let response = client
            .get("/api/users/9999")
            .cookies(cookies)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_student_update_api() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let student_id = test_db.user_id("student@example.com").expect("User not found");
        let new_department = test_db
            .department_id("Mathematics")
            .expect("Department not found");

        let cookies = signin_test_user(&client, "student@example.com", STANDARD_PASSWORD).await;

        let response = client
            .put(format!("/api/users/{}/student", student_id))
            .cookies(cookies.clone())
            .header(ContentType::JSON)
            .body(
                json!({
                    "department_id": new_department,
                    "email": "student@example.com",
                    "first_name": "Updated",
                    "last_name": "Name",
                    "registry_id": "CS-2020-001",
                    "admission_year": 2021
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let student = get_student_profile(&test_db.pool, student_id)
            .await
            .expect("Failed to fetch student profile")
            .expect("Student profile missing");
        assert_eq!(student.first_name, "Updated");
        assert_eq!(student.department_id, new_department);

        // Another user's email is a conflict.
        let response = client
            .put(format!("/api/users/{}/student", student_id))
            .cookies(cookies.clone())
            .header(ContentType::JSON)
            .body(
                json!({
                    "department_id": new_department,
                    "email": "teacher@example.com",
                    "first_name": "Updated",
                    "last_name": "Name",
                    "registry_id": "CS-2020-001",
                    "admission_year": 2021
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Conflict);
    }

    #[rocket::async_test]
    async fn test_update_other_user_requires_staff() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let pending_id = test_db.user_id("pending@example.com").expect("User not found");
        let department_id = test_db
            .department_id("Computer Science")
            .expect("Department not found");

        let cookies = signin_test_user(&client, "student@example.com", STANDARD_PASSWORD).await;

        let response = client
            .put(format!("/api/users/{}/student", pending_id))
            .cookies(cookies)
            .header(ContentType::JSON)
            .body(
                json!({
                    "department_id": department_id,
                    "email": "pending@example.com",
                    "first_name": "Hijacked",
                    "last_name": "Name",
                    "registry_id": "CS-2021-002",
                    "admission_year": 2021
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn test_departments_api() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        // The list is public: signup forms need it before any session exists.
        let response = client.get("/api/departments").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let departments: Vec<Department> = serde_json::from_str(&body).unwrap();
        assert!(departments.iter().any(|d| d.name == "Computer Science"));

        // Creation is staff-only.
        let cookies = signin_test_user(&client, "student@example.com", STANDARD_PASSWORD).await;
        let response = client
            .post("/api/departments")
            .cookies(cookies)
            .header(ContentType::JSON)
            .body(json!({ "name": "Physics" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let cookies = signin_test_user(&client, "admin@example.com", STANDARD_PASSWORD).await;
        let response = client
            .post("/api/departments")
            .cookies(cookies.clone())
            .header(ContentType::JSON)
            .body(json!({ "name": "Physics" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);

        let response = client
            .post("/api/departments")
            .cookies(cookies)
            .header(ContentType::JSON)
            .body(json!({ "name": "Physics" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[rocket::async_test]
    async fn test_account_action_apis() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        let pending_id = test_db.user_id("pending@example.com").expect("User not found");

        let cookies = signin_test_user(&client, "admin@example.com", STANDARD_PASSWORD).await;

        let response = client
            .post(format!("/api/users/{}/deactivate", pending_id))
            .cookies(cookies.clone())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let user = get_user(&test_db.pool, pending_id)
            .await
            .expect("Failed to fetch user");
        assert!(!user.is_active);

        let response = client
            .post(format!("/api/users/{}/activate", pending_id))
            .cookies(cookies.clone())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        // Accepting an unknown id is an error, deleting one is not.
        let response = client
            .post("/api/users/9999/accept")
            .cookies(cookies.clone())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);

        let response = client
            .delete("/api/users/9999")
            .cookies(cookies.clone())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .delete(format!("/api/users/{}", pending_id))
            .cookies(cookies)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert!(matches!(
            get_user(&test_db.pool, pending_id).await,
            Err(crate::error::AppError::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn test_signout_api() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        signin_test_user(&client, "student@example.com", STANDARD_PASSWORD).await;

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.post("/api/signout").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_health() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "OK");
    }
}
