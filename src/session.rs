use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::error::{Error, Result};
use crate::models::{Registration, Task};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            password: password.to_string(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    Anonymous,
    Authenticated { user: User, credentials: Credentials },
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    user: User,
    credentials: Credentials,
}

/// JSON file holding the signed-in user between runs.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<(User, Credentials)>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)?;
        let stored: StoredSession = serde_json::from_str(&text)?;
        Ok(Some((stored.user, stored.credentials)))
    }

    pub fn save(&self, user: &User, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let stored = StoredSession {
            user: user.clone(),
            credentials: credentials.clone(),
        };
        let mut file = open_private(&self.path)?;
        file.write_all(serde_json::to_string_pretty(&stored)?.as_bytes())?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Opens `path` for writing with owner-only permissions, set before any
/// bytes land, including when the file already exists.
#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[derive(Debug)]
pub struct SessionManager {
    store: CredentialStore,
    session: Session,
}

impl SessionManager {
    /// Starts from whatever the store holds; an unreadable store starts anonymous.
    pub fn restore(store: CredentialStore) -> Self {
        let session = match store.load() {
            Ok(Some((user, credentials))) => Session::Authenticated { user, credentials },
            Ok(None) => Session::Anonymous,
            Err(e) => {
                tracing::warn!(path = %store.path().display(), error = %e, "ignoring unreadable session file");
                Session::Anonymous
            }
        };
        Self { store, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.session, Session::Authenticated { .. })
    }

    pub fn user(&self) -> Option<&User> {
        match &self.session {
            Session::Authenticated { user, .. } => Some(user),
            Session::Anonymous => None,
        }
    }

    pub fn credentials(&self) -> Result<&Credentials> {
        match &self.session {
            Session::Authenticated { credentials, .. } => Ok(credentials),
            Session::Anonymous => Err(Error::NotAuthenticated),
        }
    }

    /// Probes the API with the pair; only a successful probe is remembered.
    pub async fn login(&mut self, api: &ApiClient, username: &str, password: &str) -> Result<Vec<Task>> {
        let credentials = Credentials::new(username, password);
        let tasks = api.probe(&credentials).await?;
        let user = User {
            username: credentials.username.clone(),
        };
        self.store.save(&user, &credentials)?;
        tracing::info!(username = %user.username, "signed in");
        self.session = Session::Authenticated { user, credentials };
        Ok(tasks)
    }

    /// Registers the account, then signs in with it.
    pub async fn register(&mut self, api: &ApiClient, username: &str, password: &str) -> Result<Vec<Task>> {
        api.register(&Registration::new(username, password)).await?;
        self.login(api, username, password).await
    }

    pub fn logout(&mut self) -> Result<()> {
        self.store.clear()?;
        self.session = Session::Anonymous;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_roundtrip_uses_user_and_credentials_keys() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("nested").join("session.json"));
        let user = User {
            username: "alice".into(),
        };
        let credentials = Credentials::new("alice", "secret1");

        store.save(&user, &credentials).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["user"]["username"], "alice");
        assert_eq!(raw["credentials"]["password"], "secret1");

        let (loaded_user, loaded) = store.load().unwrap().unwrap();
        assert_eq!(loaded_user, user);
        assert_eq!(loaded, credentials);
    }

    #[cfg(unix)]
    #[test]
    fn test_store_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("session.json"));
        store
            .save(&User { username: "alice".into() }, &Credentials::new("alice", "secret1"))
            .unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_tightens_existing_file() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let store = CredentialStore::new(&path);
        store
            .save(&User { username: "alice".into() }, &Credentials::new("alice", "secret1"))
            .unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load().unwrap().unwrap().1.password, "secret1");
    }

    #[test]
    fn test_restore_and_logout() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("session.json"));
        store
            .save(&User { username: "alice".into() }, &Credentials::new("alice", "secret1"))
            .unwrap();

        let mut manager = SessionManager::restore(store.clone());
        assert!(manager.is_authenticated());
        assert_eq!(manager.user().unwrap().username, "alice");

        manager.logout().unwrap();
        assert!(!manager.is_authenticated());
        assert!(matches!(manager.credentials(), Err(Error::NotAuthenticated)));
        assert!(!store.path().exists());
        // clearing twice is fine
        manager.logout().unwrap();
    }

    #[test]
    fn test_corrupt_store_starts_anonymous() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        let manager = SessionManager::restore(CredentialStore::new(path));
        assert_eq!(manager.session(), &Session::Anonymous);
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", Credentials::new("alice", "secret1"));
        assert!(!rendered.contains("secret1"));
    }
}
