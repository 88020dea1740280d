use sqlx::SqlitePool;
use tracing::warn;

use super::{LiveQuery, LocalStore, LocalStoreError, Table};
use crate::models::Species;

pub const SELECTED_SPECIES_KEY: &str = "selected_species";

/// Device-local string selections used as read-time filters. Nothing here
/// is mirrored to the remote store.
#[derive(Clone)]
pub struct PreferenceStore {
    store: LocalStore,
}

impl PreferenceStore {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// The stored selection, empty when nothing was saved.
    pub async fn get_selection(&self, key: &str) -> Result<Vec<String>, LocalStoreError> {
        read_selection(self.store.pool(), key).await
    }

    pub async fn set_selection(&self, key: &str, values: &[String]) -> Result<(), LocalStoreError> {
        let encoded = serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string());
        sqlx::query(
            "INSERT INTO preferences (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(&encoded)
        .execute(self.store.pool())
        .await?;

        self.store.notify(&[Table::Preferences]);
        Ok(())
    }

    pub fn watch_selection(&self, key: &str) -> LiveQuery<Vec<String>> {
        let key = key.to_string();
        self.store.live(&[Table::Preferences], move |pool| {
            let key = key.clone();
            async move { read_selection(&pool, &key).await }
        })
    }

    pub async fn selected_species(&self) -> Result<Vec<Species>, LocalStoreError> {
        read_selected_species(self.store.pool()).await
    }

    pub fn watch_selected_species(&self) -> LiveQuery<Vec<Species>> {
        self.store
            .live(&[Table::Preferences], |pool| async move {
                read_selected_species(&pool).await
            })
    }

    pub async fn save_selected_species(&self, species: &[Species]) -> Result<(), LocalStoreError> {
        let values: Vec<String> = species.iter().map(|s| s.as_str().to_string()).collect();
        self.set_selection(SELECTED_SPECIES_KEY, &values).await
    }
}

pub(crate) async fn read_selection(
    pool: &SqlitePool,
    key: &str,
) -> Result<Vec<String>, LocalStoreError> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM preferences WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match value {
        Some(value) => serde_json::from_str(&value).map_err(|e| LocalStoreError::CorruptRow {
            table: Table::Preferences.name(),
            id: key.to_string(),
            detail: e.to_string(),
        }),
        None => Ok(Vec::new()),
    }
}

/// Unknown labels are skipped so an older build can read a newer selection.
pub(crate) async fn read_selected_species(
    pool: &SqlitePool,
) -> Result<Vec<Species>, LocalStoreError> {
    let mut species = Vec::new();
    for label in read_selection(pool, SELECTED_SPECIES_KEY).await? {
        match label.parse::<Species>() {
            Ok(s) => species.push(s),
            Err(e) => warn!(label = %label, "Ignoring stored species selection: {}", e),
        }
    }
    Ok(species)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_store;

    #[tokio::test]
    async fn test_missing_selection_is_empty() {
        let ctx = setup_store().await;
        let prefs = PreferenceStore::new(ctx.store.clone());
        assert!(prefs.get_selection("anything").await.unwrap().is_empty());
        assert!(prefs.selected_species().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_overwrites_and_notifies() {
        let ctx = setup_store().await;
        let prefs = PreferenceStore::new(ctx.store.clone());
        let mut live = prefs.watch_selected_species();
        assert!(live.next().await.unwrap().unwrap().is_empty());

        prefs
            .save_selected_species(&[Species::Bovine, Species::Caprine])
            .await
            .unwrap();
        assert_eq!(
            live.next().await.unwrap().unwrap(),
            vec![Species::Bovine, Species::Caprine]
        );

        prefs.save_selected_species(&[Species::Ovine]).await.unwrap();
        assert_eq!(live.next().await.unwrap().unwrap(), vec![Species::Ovine]);
    }

    #[tokio::test]
    async fn test_unknown_species_labels_are_skipped() {
        let ctx = setup_store().await;
        let prefs = PreferenceStore::new(ctx.store.clone());
        prefs
            .set_selection(
                SELECTED_SPECIES_KEY,
                &["bovine".to_string(), "camelid".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(prefs.selected_species().await.unwrap(), vec![Species::Bovine]);
    }
}
