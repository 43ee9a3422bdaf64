use opentelemetry_semantic_conventions::{attribute::OTEL_STATUS_CODE, trace::ERROR_TYPE};
use rocket::http::Status;
use thiserror::Error;
use tracing::{Span, error, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // One message for both unknown-email and wrong-password so the response
    // cannot be used to probe which accounts exist.
    #[error("Incorrect email or password.")]
    InvalidCredentials,

    #[error("Please wait for your account to be enabled.")]
    AccountDisabled,

    #[error("This email is used by another user.")]
    EmailTaken,

    #[error("A student with this registry id already exists.")]
    DuplicateRegistryId,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn log_and_record(&self, ctx: &str) {
        let current_span = Span::current();
        let is_valid_span = !current_span.is_none();

        let message = self.to_string();
        let error_kind = match self {
            AppError::Database(err) => {
                error!(error = %message, context = %ctx, db_error = %err, "Database error");
                "database_error"
            }
            AppError::InvalidCredentials => {
                warn!(context = %ctx, "Invalid credentials");
                "invalid_credentials"
            }
            AppError::AccountDisabled => {
                warn!(context = %ctx, "Account not yet accepted");
                "account_disabled"
            }
            AppError::EmailTaken => {
                warn!(context = %ctx, "Email already in use");
                "email_taken"
            }
            AppError::DuplicateRegistryId => {
                warn!(context = %ctx, "Registry id already in use");
                "duplicate_registry_id"
            }
            AppError::Validation(msg) => {
                warn!(message = %msg, context = %ctx, "Validation error");
                "validation_error"
            }
            AppError::NotFound(msg) => {
                warn!(message = %msg, context = %ctx, "Not found error");
                "not_found_error"
            }
            AppError::Internal(msg) => {
                error!(message = %msg, context = %ctx, "Internal server error");
                "internal_error"
            }
        };

        if is_valid_span {
            current_span.record("error", tracing::field::display(true));
            current_span.record(ERROR_TYPE, tracing::field::display(error_kind));
            current_span.record("error.message", tracing::field::display(&message));

            match self {
                AppError::Database(_) | AppError::Internal(_) => {
                    current_span.record(OTEL_STATUS_CODE, tracing::field::display("ERROR"));
                }
                _ => {}
            }
        }
    }

    pub fn status_code(&self) -> Status {
        match self {
            AppError::Database(_) => rocket::http::Status::InternalServerError,
            AppError::InvalidCredentials => rocket::http::Status::Unauthorized,
            AppError::AccountDisabled => rocket::http::Status::Forbidden,
            AppError::EmailTaken => rocket::http::Status::Conflict,
            AppError::DuplicateRegistryId => rocket::http::Status::Conflict,
            AppError::Validation(_) => rocket::http::Status::BadRequest,
            AppError::NotFound(_) => rocket::http::Status::NotFound,
            AppError::Internal(_) => rocket::http::Status::InternalServerError,
        }
    }

    pub fn to_status_with_log(&self, context: &str) -> Status {
        self.log_and_record(context);
        self.status_code()
    }
}

impl<'r> rocket::response::Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        self.to_status_with_log(&format!("Request to {} {}", req.method(), req.uri()))
            .respond_to(req)
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Cryptography error: {}", error))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {}", error))
    }
}

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        err.to_status_with_log("Error conversion into Status")
    }
}
