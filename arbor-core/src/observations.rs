//! Session memory (observations) CRUD

use crate::model::{now_epoch, Observation};
use crate::store::Store;
use std::collections::HashMap;

/// CRUD interface for session observations: stamps `created_at` at insert
/// time and normalizes missing tags to an empty list.
pub struct ObservationStore<'a> {
    store: &'a Store,
}

impl<'a> ObservationStore<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn add(
        &self,
        content: impl Into<String>,
        node_id: Option<String>,
        tags: Option<Vec<String>>,
        source: impl Into<String>,
    ) -> crate::Result<Observation> {
        let mut obs = Observation {
            id: None,
            content: content.into(),
            node_id,
            tags: tags.unwrap_or_default(),
            created_at: now_epoch(),
            source: source.into(),
        };
        obs.id = Some(self.store.add_observation(&obs)?);
        Ok(obs)
    }

    pub fn get(&self, obs_id: i64) -> crate::Result<Option<Observation>> {
        self.store.get_observation(obs_id)
    }

    pub fn list(
        &self,
        node_id: Option<&str>,
        tag: Option<&str>,
    ) -> crate::Result<Vec<Observation>> {
        self.store.list_observations(node_id, tag)
    }

    /// Observations created strictly after `since` (epoch seconds)
    pub fn list_since(
        &self,
        since: f64,
        source: Option<&str>,
        limit: Option<usize>,
    ) -> crate::Result<Vec<Observation>> {
        self.store.list_observations_since(since, source, limit)
    }

    pub fn delete(&self, obs_id: i64) -> crate::Result<bool> {
        self.store.delete_observation(obs_id)
    }

    /// Collapse repeated observations with identical content, keeping the
    /// latest timestamp per content string. Compresses the edit storms the
    /// watcher hook produces ("Edited: auth.py" many times over). Result is
    /// newest-first.
    pub fn deduplicate_hook_observations(observations: Vec<Observation>) -> Vec<Observation> {
        let mut seen: HashMap<String, Observation> = HashMap::new();
        for obs in observations {
            match seen.get(&obs.content) {
                Some(kept) if kept.created_at >= obs.created_at => {}
                _ => {
                    seen.insert(obs.content.clone(), obs);
                }
            }
        }
        let mut result: Vec<Observation> = seen.into_values().collect();
        result.sort_by(|a, b| {
            b.created_at
                .partial_cmp(&a.created_at)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_stamps_time_and_defaults_tags() {
        let store = Store::open_in_memory().unwrap();
        let obs_store = ObservationStore::new(&store);

        let obs = obs_store.add("a note", None, None, "user").unwrap();
        assert!(obs.id.is_some());
        assert!(obs.tags.is_empty());
        assert!(obs.created_at > 0.0);

        let loaded = obs_store.get(obs.id.unwrap()).unwrap().unwrap();
        assert_eq!(loaded.content, "a note");
        assert_eq!(loaded.source, "user");
    }

    #[test]
    fn list_filters_by_tag() {
        let store = Store::open_in_memory().unwrap();
        let obs_store = ObservationStore::new(&store);
        obs_store
            .add("tagged", None, Some(vec!["decision".to_string()]), "claude")
            .unwrap();
        obs_store.add("untagged", None, None, "claude").unwrap();

        let tagged = obs_store.list(None, Some("decision")).unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].content, "tagged");
    }

    #[test]
    fn delete_reports_outcome() {
        let store = Store::open_in_memory().unwrap();
        let obs_store = ObservationStore::new(&store);
        let obs = obs_store.add("gone soon", None, None, "user").unwrap();

        assert!(obs_store.delete(obs.id.unwrap()).unwrap());
        assert!(!obs_store.delete(obs.id.unwrap()).unwrap());
    }

    #[test]
    fn dedupe_keeps_latest_per_content() {
        let mk = |content: &str, at: f64| Observation {
            id: None,
            content: content.to_string(),
            node_id: None,
            tags: Vec::new(),
            created_at: at,
            source: "hook".to_string(),
        };
        let deduped = ObservationStore::deduplicate_hook_observations(vec![
            mk("Edited: auth.py", 1.0),
            mk("Edited: auth.py", 3.0),
            mk("Edited: models.py", 2.0),
            mk("Edited: auth.py", 2.0),
        ]);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].content, "Edited: auth.py");
        assert_eq!(deduped[0].created_at, 3.0);
        assert_eq!(deduped[1].content, "Edited: models.py");
    }
}
