use arbor_core::{ArborError, Config, ProjectWatcher, Store};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedState = Arc<AppState>;

/// Per-process registries: one store per project root, one watcher per
/// registered project. Both use insert-if-absent discipline.
pub struct AppState {
    pub config: Config,
    stores: RwLock<HashMap<String, Arc<Store>>>,
    pub watchers: RwLock<HashMap<String, Arc<ProjectWatcher>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stores: RwLock::new(HashMap::new()),
            watchers: RwLock::new(HashMap::new()),
        }
    }

    /// Open (or reuse) the store for a canonical project root
    pub async fn store_for(&self, root: &str) -> Result<Arc<Store>, ArborError> {
        {
            let stores = self.stores.read().await;
            if let Some(store) = stores.get(root) {
                return Ok(Arc::clone(store));
            }
        }

        let root_owned = root.to_string();
        let store = tokio::task::spawn_blocking(move || {
            let db_path = Store::project_db_path(Path::new(&root_owned))?;
            Store::open(&db_path)
        })
        .await
        .map_err(|e| ArborError::Io(std::io::Error::other(e)))??;

        let mut stores = self.stores.write().await;
        let entry = stores
            .entry(root.to_string())
            .or_insert_with(|| Arc::new(store));
        Ok(Arc::clone(entry))
    }
}
