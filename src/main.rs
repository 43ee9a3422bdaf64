#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod env;
mod error;
mod models;
mod telemetry;
mod validation;
#[cfg(test)]
mod test;

use api::{
    api_accept_user, api_activate_user, api_clean_sessions, api_create_department,
    api_deactivate_user, api_delete_user, api_get_departments, api_get_user, api_get_users,
    api_me, api_me_unauthorized, api_signin, api_signout, api_signup_deptadmin,
    api_signup_student, api_signup_teacher, api_update_deptadmin, api_update_student,
    api_update_teacher, health,
};
use auth::unauthorized_api;
use db::clean_expired_sessions;
use env::load_environment;
use rocket::{Build, Rocket, tokio};
use telemetry::TelemetryFairing;
use telemetry::init_tracing;

use sqlx::SqlitePool;
use tracing::{error, info};

#[launch]
async fn rocket() -> _ {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_tracing();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_default();

    let pool = SqlitePool::connect(&database_url)
        .await
        .expect("Failed to connect to SQLite database");

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    init_rocket(pool).await
}

pub async fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    info!("Starting class manager");

    rocket::build()
        .manage(pool)
        .mount(
            "/api",
            routes![
                api_signin,
                api_signout,
                api_me,
                api_me_unauthorized,
                api_signup_student,
                api_signup_teacher,
                api_signup_deptadmin,
                api_update_student,
                api_update_teacher,
                api_update_deptadmin,
                api_accept_user,
                api_activate_user,
                api_deactivate_user,
                api_delete_user,
                api_get_users,
                api_get_user,
                api_get_departments,
                api_create_department,
                api_clean_sessions,
            ],
        )
        .register("/api", catchers![unauthorized_api])
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
}
