//! Pagekeeper Demo
//!
//! Drives a record manager against an in-memory catalog: first page, a
//! debounced search, and syncing a selection whose item is not loaded yet.
//!
//! Usage: `pagekeeper-demo [config.toml]`

use anyhow::Result;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use pagekeeper::data::{
    DataInitOptionals, InputDataManager, LoadResult, Loader, LoaderOptionals, PageResult,
    RecordInputDataManager,
};
use pagekeeper::domain::item::{ItemStrategy, lookup};
use pagekeeper::paging::{OffsetAdvance, OffsetFeedback, OffsetPager};
use pagekeeper::utils::load_config;

/// Serves records from memory, filtered by name
struct CatalogLoader {
    records: Arc<Vec<Value>>,
}

impl CatalogLoader {
    fn new(count: usize) -> Self {
        let records = (1..=count)
            .map(|id| json!({ "id": id, "name": format!("turbine-{id:03}") }))
            .collect();
        Self {
            records: Arc::new(records),
        }
    }
}

impl Loader<Value, Value, OffsetPager> for CatalogLoader {
    fn load(
        &self,
        info: OffsetAdvance,
        _current: Vec<Value>,
        optionals: LoaderOptionals<Value>,
    ) -> BoxFuture<'static, pagekeeper::Result<PageResult<Value, OffsetPager>>> {
        let records = self.records.clone();
        async move {
            // simulated round trip
            tokio::time::sleep(Duration::from_millis(20)).await;

            let matches: Vec<&Value> = match (&optionals.selected_values, &optionals.search) {
                (Some(values), _) => records
                    .iter()
                    .filter(|r| values.iter().any(|v| lookup(r, "id") == Some(v)))
                    .collect(),
                (None, Some(search)) => records
                    .iter()
                    .filter(|r| {
                        lookup(r, "name")
                            .and_then(Value::as_str)
                            .is_some_and(|name| name.contains(search.as_str()))
                    })
                    .collect(),
                (None, None) => records.iter().collect(),
            };

            let total = matches.len();
            let page: Vec<Value> = matches
                .into_iter()
                .skip(info.skip)
                .take(info.take)
                .cloned()
                .collect();
            let feedback = OffsetFeedback {
                total_count: optionals.req_total_count.then_some(total),
            };
            Ok(LoadResult::new(page).page(feedback))
        }
        .boxed()
    }
}

fn names(data: &[Value]) -> Vec<&str> {
    data.iter()
        .filter_map(|r| lookup(r, "name").and_then(Value::as_str))
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(path)?,
        None => Default::default(),
    };
    tracing::info!("Starting pagekeeper demo (take = {})", config.take);

    let manager: RecordInputDataManager<OffsetPager, CatalogLoader> = InputDataManager::builder(
        OffsetPager::from_config(&config),
        CatalogLoader::new(250),
        ItemStrategy::record(Some("id")),
    )
    .config(config.clone())
    .name("turbines")
    .build();

    manager
        .init(DataInitOptionals {
            req_total_count: true,
        })
        .await;
    manager.settled().await;
    tracing::info!("First page: {} item(s)", manager.data().len());

    manager.request_next_page();
    tokio::time::sleep(config.next_page_debounce() + Duration::from_millis(10)).await;
    manager.settled().await;
    tracing::info!("After scrolling: {} item(s)", manager.data().len());

    manager.filter("turbine-1", DataInitOptionals::default());
    tokio::time::sleep(config.filter_debounce() + Duration::from_millis(10)).await;
    manager.settled().await;
    tracing::info!("Search 'turbine-1': {:?}", names(&manager.data()));

    // 240 is not part of the filtered result
    if manager.sync([json!(240)]) {
        manager.settled().await;
    }
    tracing::info!(
        "Selected: {:?}, visible: {} item(s)",
        names(&manager.selected_items()),
        manager.data().len()
    );

    let state = serde_json::to_string(&manager.state())?;
    tracing::info!("Final state: {} bytes, phase {}", state.len(), manager.phase());

    manager.shutdown();
    Ok(())
}
