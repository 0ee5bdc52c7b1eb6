use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Form and payload checks shared by the client, the HTML forms and the API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Task title is required")]
    TitleRequired,
    #[error("Due date must be on or after start date")]
    DueBeforeStart,
    #[error("End time must be after start time")]
    EndNotAfterStart,
    #[error("Username must be at least 3 characters")]
    UsernameTooShort,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Invalid month {0}")]
    InvalidMonth(u32),
    #[error("Invalid {field}: {value}")]
    Unparseable { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid username or password")]
    Unauthorized,

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Username {0} is already taken")]
    UsernameTaken(String),

    /// A remote call failed; the message names the action, the source keeps the cause.
    #[error("Failed to {action}")]
    Request {
        action: &'static str,
        #[source]
        source: Option<reqwest::Error>,
        status: Option<u16>,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn task_not_found(id: i64) -> Self {
        Error::NotFound(format!("task {id}"))
    }

    pub fn subtask_not_found(id: i64) -> Self {
        Error::NotFound(format!("subtask {id}"))
    }
}
