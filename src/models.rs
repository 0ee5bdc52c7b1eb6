use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

/// The user-editable part of a task or subtask.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFields {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// `true` is high priority, `false` low.
    #[serde(default)]
    pub priority: bool,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, with = "opt_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, with = "opt_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, with = "opt_time")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "opt_time")]
    pub end_time: Option<NaiveTime>,
}

impl TaskFields {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::TitleRequired);
        }
        if let (Some(start), Some(due)) = (self.start_date, self.due_date) {
            if start > due {
                return Err(ValidationError::DueBeforeStart);
            }
        }
        // Times only order against each other when both ends fall on the same day.
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if self.start_date == self.due_date && start >= end {
                return Err(ValidationError::EndNotAfterStart);
            }
        }
        Ok(())
    }

    /// Trims the title and turns blank optional text into `None`.
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = non_blank(self.description);
        self.category = non_blank(self.category);
        self
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub created_date: NaiveDate,
    #[serde(flatten)]
    pub fields: TaskFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: i64,
    #[serde(rename = "parentTaskID")]
    pub parent_task_id: i64,
    pub created_date: NaiveDate,
    #[serde(flatten)]
    pub fields: TaskFields,
}

/// Body of `PUT /tasks/update` and `PUT /subtasks/update`.
///
/// Anything besides the id and the editable fields (`createdDate`,
/// `parentTaskID`) is ignored, so those never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub id: i64,
    #[serde(flatten)]
    pub fields: TaskFields,
}

impl From<Task> for TaskUpdate {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            fields: task.fields,
        }
    }
}

impl From<Subtask> for TaskUpdate {
    fn from(subtask: Subtask) -> Self {
        Self {
            id: subtask.id,
            fields: subtask.fields,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub password: String,
}

impl Registration {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            password: password.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.username.trim().chars().count() < MIN_USERNAME_LEN {
            return Err(ValidationError::UsernameTooShort);
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort);
        }
        Ok(())
    }

    /// Registration form check, including the confirmation field.
    pub fn validate_confirmed(&self, confirmation: &str) -> Result<(), ValidationError> {
        self.validate()?;
        if self.password != confirmation {
            return Err(ValidationError::PasswordMismatch);
        }
        Ok(())
    }
}

/// `YYYY-MM-DD`; blank strings and `null` read as absent.
pub(crate) mod opt_date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(value: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => s.collect_str(&date.format(FORMAT)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => parse(text).map(Some).map_err(de::Error::custom),
        }
    }

    pub fn parse(text: &str) -> Result<NaiveDate, chrono::ParseError> {
        // Accept full timestamps by keeping only the date part.
        let date_part = text.split('T').next().unwrap_or(text);
        NaiveDate::parse_from_str(date_part, FORMAT)
    }
}

/// `HH:MM` on output; `HH:MM` or `HH:MM:SS` on input.
pub(crate) mod opt_time {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => s.collect_str(&time.format(FORMAT)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => parse(text).map(Some).map_err(de::Error::custom),
        }
    }

    pub fn parse(text: &str) -> Result<NaiveTime, chrono::ParseError> {
        NaiveTime::parse_from_str(text, "%H:%M:%S").or_else(|_| NaiveTime::parse_from_str(text, FORMAT))
    }
}
