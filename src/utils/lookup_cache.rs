use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;

use crate::model::lookup::{Lookup, LookupItem};

/// Department/site/position lists change rarely and are read by every
/// employee form and import, so they are cached whole per table.
static LOOKUP_CACHE: Lazy<Cache<Lookup, Arc<Vec<LookupItem>>>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(8)
        .time_to_live(Duration::from_secs(60 * 10))
        .build()
});

pub async fn items(pool: &MySqlPool, lookup: Lookup) -> Result<Arc<Vec<LookupItem>>, sqlx::Error> {
    if let Some(hit) = LOOKUP_CACHE.get(&lookup).await {
        return Ok(hit);
    }

    let sql = format!("SELECT id, name FROM {} ORDER BY name", lookup.table());
    let rows: Vec<LookupItem> = sqlx::query_as(&sql).fetch_all(pool).await?;
    tracing::debug!(lookup = %lookup, count = rows.len(), "Lookup cache filled");

    let rows = Arc::new(rows);
    LOOKUP_CACHE.insert(lookup, rows.clone()).await;
    Ok(rows)
}

/// Lowercased name -> id, for resolving names typed into spreadsheets.
pub async fn name_index(pool: &MySqlPool, lookup: Lookup) -> Result<HashMap<String, u64>, sqlx::Error> {
    let rows = items(pool, lookup).await?;
    Ok(index_by_name(&rows))
}

pub fn index_by_name(items: &[LookupItem]) -> HashMap<String, u64> {
    items
        .iter()
        .map(|item| (item.name.trim().to_lowercase(), item.id))
        .collect()
}

pub async fn invalidate(lookup: Lookup) {
    LOOKUP_CACHE.invalidate(&lookup).await;
}
