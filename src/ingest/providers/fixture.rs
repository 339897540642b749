// src/ingest/providers/fixture.rs
//! Offline `ListSource` reading JSON files from a directory:
//! `{dir}/lists/{list_id}.json` and `{dir}/items/{id}.json`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{decode_detail, decode_list};
use crate::ingest::types::{ListSource, RawItem};

const NAME: &str = "fixture";

pub struct FixtureSource {
    dir: PathBuf,
}

impl FixtureSource {
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    async fn read(&self, sub: &str, name: &str) -> Result<String> {
        let path = self.dir.join(sub).join(format!("{name}.json"));
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading fixture {}", path.display()))
    }
}

#[async_trait]
impl ListSource for FixtureSource {
    async fn authenticate(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch_list_items(&self, list_id: &str, max: usize) -> Result<Vec<RawItem>> {
        let body = self.read("lists", list_id).await?;
        let mut items = decode_list(&body, NAME)?;
        items.truncate(max);
        Ok(items)
    }

    async fn fetch_item_detail(&self, id: &str) -> Result<RawItem> {
        decode_detail(&self.read("items", id).await?)
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
