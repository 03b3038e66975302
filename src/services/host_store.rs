use crate::error::Result;
use crate::models::host::Host;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// JSON-file persistence for user-defined hosts.
#[derive(Debug, Clone)]
pub struct HostStore {
    path: Option<PathBuf>,
    file_lock: Arc<Mutex<()>>,
}

impl HostStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            file_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            file_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Missing or malformed files load as an empty list.
    pub async fn load(&self) -> Vec<Host> {
        let Some(path) = self.path.as_ref() else {
            return Vec::new();
        };

        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read host list {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Host>>(&content) {
            Ok(mut hosts) => {
                for host in &mut hosts {
                    host.is_user_defined = true;
                }
                info!("Loaded {} user-defined host(s) from {}", hosts.len(), path.display());
                hosts
            }
            Err(e) => {
                warn!("Ignoring malformed host list {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    pub async fn save(&self, hosts: &[Host]) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        let _guard = self.file_lock.lock().await;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        // Atomic write: write to temp file then rename
        let temp_file = path.with_extension("json.tmp");
        fs::write(&temp_file, serde_json::to_string_pretty(hosts)?).await?;
        fs::rename(&temp_file, path).await?;

        Ok(())
    }
}
