use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::models::{Registration, Subtask, Task, TaskFields, TaskUpdate};
use crate::session::Credentials;

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder().build().map_err(|e| Error::Request {
            action: "build HTTP client",
            source: Some(e),
            status: None,
        })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn register(&self, registration: &Registration) -> Result<()> {
        registration.validate()?;
        let request = self.http.post(self.url("/register")).json(registration);
        let response = send(request, "register").await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(Error::UsernameTaken(registration.username.clone()));
        }
        check(response, "register").await?;
        Ok(())
    }

    /// Checks credentials by fetching the task list with them.
    pub async fn probe(&self, credentials: &Credentials) -> Result<Vec<Task>> {
        self.tasks(credentials).list().await
    }

    pub fn tasks<'a>(&'a self, credentials: &'a Credentials) -> TaskStore<'a> {
        TaskStore {
            api: self,
            credentials,
        }
    }
}

/// Task and subtask operations for one signed-in user.
#[derive(Debug, Clone, Copy)]
pub struct TaskStore<'a> {
    api: &'a ApiClient,
    credentials: &'a Credentials,
}

impl TaskStore<'_> {
    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.credentials.username, Some(&self.credentials.password))
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str, action: &'static str) -> Result<T> {
        let request = self.authed(self.api.http.get(self.api.url(path)));
        let response = check(send(request, action).await?, action).await?;
        json(response, action).await
    }

    pub async fn list(&self) -> Result<Vec<Task>> {
        self.fetch("/tasks", "fetch tasks").await
    }

    pub async fn get(&self, id: i64) -> Result<Task> {
        self.fetch(&format!("/tasks/{id}"), "fetch task")
            .await
            .map_err(|e| not_found_as(e, Error::task_not_found(id)))
    }

    pub async fn create(&self, fields: &TaskFields) -> Result<Task> {
        fields.validate()?;
        let action = "add task";
        let request = self.authed(self.api.http.post(self.api.url("/add")).json(fields));
        let response = check(send(request, action).await?, action).await?;
        json(response, action).await
    }

    pub async fn update(&self, update: &TaskUpdate) -> Result<Task> {
        update.fields.validate()?;
        let action = "update task";
        let request = self.authed(self.api.http.put(self.api.url("/tasks/update")).json(update));
        let response = check(send(request, action).await?, action)
            .await
            .map_err(|e| not_found_as(e, Error::task_not_found(update.id)))?;
        json(response, action).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let action = "delete task";
        let request = self.authed(self.api.http.delete(self.api.url(&format!("/task/{id}"))));
        check(send(request, action).await?, action)
            .await
            .map_err(|e| not_found_as(e, Error::task_not_found(id)))?;
        Ok(())
    }

    pub async fn all_subtasks(&self) -> Result<Vec<Subtask>> {
        self.fetch("/subtasks", "fetch all subtasks").await
    }

    pub async fn subtasks(&self, task_id: i64) -> Result<Vec<Subtask>> {
        self.fetch(&format!("/{task_id}/subtasks"), "fetch subtasks")
            .await
            .map_err(|e| not_found_as(e, Error::task_not_found(task_id)))
    }

    pub async fn get_subtask(&self, id: i64) -> Result<Subtask> {
        self.fetch(&format!("/subtasks/{id}"), "fetch subtask")
            .await
            .map_err(|e| not_found_as(e, Error::subtask_not_found(id)))
    }

    pub async fn create_subtask(&self, task_id: i64, fields: &TaskFields) -> Result<Subtask> {
        fields.validate()?;
        let action = "add subtask";
        let url = self.api.url(&format!("/{task_id}/add/subtask"));
        let request = self.authed(self.api.http.post(url).json(fields));
        let response = check(send(request, action).await?, action)
            .await
            .map_err(|e| not_found_as(e, Error::task_not_found(task_id)))?;
        json(response, action).await
    }

    pub async fn update_subtask(&self, update: &TaskUpdate) -> Result<Subtask> {
        update.fields.validate()?;
        let action = "update subtask";
        let request = self.authed(self.api.http.put(self.api.url("/subtasks/update")).json(update));
        let response = check(send(request, action).await?, action)
            .await
            .map_err(|e| not_found_as(e, Error::subtask_not_found(update.id)))?;
        json(response, action).await
    }

    pub async fn delete_subtask(&self, id: i64) -> Result<()> {
        let action = "delete subtask";
        let request = self.authed(self.api.http.delete(self.api.url(&format!("/subtasks/{id}"))));
        check(send(request, action).await?, action)
            .await
            .map_err(|e| not_found_as(e, Error::subtask_not_found(id)))?;
        Ok(())
    }
}

async fn send(request: RequestBuilder, action: &'static str) -> Result<Response> {
    request.send().await.map_err(|e| {
        tracing::debug!(action, error = %e, "request failed");
        Error::Request {
            action,
            source: Some(e),
            status: None,
        }
    })
}

async fn check(response: Response, action: &'static str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    tracing::debug!(action, %status, "server rejected request");
    match status {
        StatusCode::UNAUTHORIZED => Err(Error::Unauthorized),
        StatusCode::NOT_FOUND => Err(Error::NotFound(action.to_string())),
        _ => Err(Error::Request {
            action,
            source: None,
            status: Some(status.as_u16()),
        }),
    }
}

async fn json<T: DeserializeOwned>(response: Response, action: &'static str) -> Result<T> {
    response.json().await.map_err(|e| Error::Request {
        action,
        source: Some(e),
        status: None,
    })
}

/// Swaps the generic not-found error for one naming the record.
fn not_found_as(error: Error, specific: Error) -> Error {
    match error {
        Error::NotFound(_) => specific,
        other => other,
    }
}
