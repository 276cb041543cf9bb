//! Client-side persisted state, used by navigation as a side channel

use async_trait::async_trait;
use std::sync::Arc;

use crate::driver::PageDriver;
use crate::error::SmokeResult;
use crate::script;

/// Key/value view of the application's persisted client state
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> SmokeResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> SmokeResult<()>;
}

/// `window.localStorage` of the current page origin
pub struct LocalStorageStore {
    page: Arc<dyn PageDriver>,
}

impl LocalStorageStore {
    pub fn new(page: Arc<dyn PageDriver>) -> Self {
        Self { page }
    }
}

#[async_trait]
impl StateStore for LocalStorageStore {
    async fn get(&self, key: &str) -> SmokeResult<Option<String>> {
        let value = self.page.evaluate(&script::storage_get(key)).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn set(&self, key: &str, value: &str) -> SmokeResult<()> {
        self.page.evaluate(&script::storage_set(key, value)).await?;
        Ok(())
    }
}
