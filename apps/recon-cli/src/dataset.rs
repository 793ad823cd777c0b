//! A `PagedDataset` over a local JSON-lines file: one dataset item per
//! line. The crawler's own storage is out of scope (spec §1); this is the
//! simplest real collaborator the CLI can drive the orchestrator with
//! without standing up a network service.

use std::path::Path;

use async_trait::async_trait;
use recon_core::DatasetItem;
use recon_dataset::PagedDataset;

pub struct JsonLinesDataset {
    items: Vec<DatasetItem>,
}

impl JsonLinesDataset {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let items = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map(DatasetItem))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { items })
    }
}

#[async_trait]
impl PagedDataset for JsonLinesDataset {
    async fn fetch_page(&self, _dataset_id: &str, offset: usize, limit: usize) -> anyhow::Result<Vec<DatasetItem>> {
        Ok(self.items.iter().skip(offset).take(limit).cloned().collect())
    }
}
