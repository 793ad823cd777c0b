//! Dataset Reader (spec §4.1): paged iteration over the upstream crawl
//! dataset, projecting configured fields into a text blob plus metadata.
//!
//! The crawler and its storage are explicitly out of scope (spec §1); this
//! crate only defines the narrow interface the Engine drives it through
//! (`PagedDataset`) and the pure projection logic that turns raw items into
//! `Document`s.

use async_trait::async_trait;
use recon_core::{DatasetItem, Document, MetadataMap, ReconError};

pub const DEFAULT_PAGE_SIZE: usize = 1_000;

/// External collaborator: a paged fetch API over crawled items (spec §6
/// upstream interface). Implementations talk to the crawler's dataset
/// storage; this crate never retries transport errors itself — retries
/// belong to the adapter transport (spec §4.1).
#[async_trait]
pub trait PagedDataset: Send + Sync {
    /// Fetch one page starting at `offset`, at most `limit` items. An empty
    /// result signals the end of the dataset.
    async fn fetch_page(
        &self,
        dataset_id: &str,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<DatasetItem>>;
}

/// Configuration recognised by the Dataset Reader (spec §6 config table).
#[derive(Debug, Clone, Default)]
pub struct DatasetReaderConfig {
    pub dataset_id: String,
    /// Ordered list of field paths projected into `page_content`.
    pub dataset_fields: Vec<String>,
    /// Static key/value pairs added to every Document's metadata.
    pub metadata_object: MetadataMap,
    /// Output metadata key -> source field path.
    pub metadata_dataset_fields: std::collections::BTreeMap<String, String>,
}

/// Project one dataset item into a `Document`, or `None` if the resulting
/// `page_content` is empty (spec §4.1: "Documents with empty `page_content`
/// are filtered out").
pub fn project_item(item: &DatasetItem, config: &DatasetReaderConfig) -> Option<Document> {
    let page_content = stringify_fields(item, &config.dataset_fields);
    if page_content.is_empty() {
        return None;
    }

    let mut metadata = config.metadata_object.clone();
    for (output_key, field_path) in &config.metadata_dataset_fields {
        metadata.insert(output_key.clone(), item.get_nested(field_path).into());
    }

    Some(Document::new(page_content, metadata))
}

/// `page_content = "\n".join(f"{path}: {value}")` over non-empty
/// projections, preserving input order of the configured paths (spec §4.1).
fn stringify_fields(item: &DatasetItem, fields: &[String]) -> String {
    fields
        .iter()
        .filter_map(|path| {
            let value = item.get_nested(path);
            if value.is_empty() {
                None
            } else {
                Some(format!("{path}: {value}"))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Page through the entire dataset and project every item into a `Document`,
/// filtering empties. Transport errors bubble up as `DATASET_UNAVAILABLE`
/// (spec §4.1) and abort the read; the reader does not retry.
pub async fn read_documents(
    source: &dyn PagedDataset,
    config: &DatasetReaderConfig,
) -> Result<Vec<Document>, ReconError> {
    let mut documents = Vec::new();
    let mut offset = 0usize;

    loop {
        let page = source
            .fetch_page(&config.dataset_id, offset, DEFAULT_PAGE_SIZE)
            .await
            .map_err(|e| ReconError::DatasetUnavailable(e.to_string()))?;

        if page.is_empty() {
            break;
        }

        let page_len = page.len();
        documents.extend(page.iter().filter_map(|item| project_item(item, config)));

        offset += page_len;
        if page_len < DEFAULT_PAGE_SIZE {
            break;
        }
    }

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn item(value: serde_json::Value) -> DatasetItem {
        DatasetItem(value)
    }

    #[test]
    fn given_nested_path_when_projecting_then_joins_in_configured_order() {
        let data = item(json!({
            "a": {"text": "Apify is cool"},
            "description": "Apify platform",
        }));
        let config = DatasetReaderConfig {
            dataset_fields: vec!["a.text".to_string(), "description".to_string()],
            ..Default::default()
        };

        let doc = project_item(&data, &config).expect("non-empty content");
        assert_eq!(doc.page_content, "a.text: Apify is cool\ndescription: Apify platform");
    }

    #[test]
    fn given_missing_intermediate_path_when_projecting_then_field_is_skipped() {
        let data = item(json!({"a": {"text": "hello"}}));
        let config = DatasetReaderConfig {
            dataset_fields: vec!["a.text".to_string(), "missing.field".to_string()],
            ..Default::default()
        };

        let doc = project_item(&data, &config).expect("non-empty content");
        assert_eq!(doc.page_content, "a.text: hello");
    }

    #[test]
    fn given_all_fields_empty_when_projecting_then_document_is_filtered_out() {
        let data = item(json!({}));
        let config = DatasetReaderConfig {
            dataset_fields: vec!["missing".to_string()],
            ..Default::default()
        };

        assert!(project_item(&data, &config).is_none());
    }

    #[test]
    fn given_metadata_dataset_fields_when_projecting_then_output_keys_are_populated() {
        let data = item(json!({"url": "https://example.com", "title": "Example"}));
        let mut metadata_dataset_fields = BTreeMap::new();
        metadata_dataset_fields.insert("source_url".to_string(), "url".to_string());

        let mut metadata_object = MetadataMap::new();
        metadata_object.insert("crawler".into(), "apify".into());

        let config = DatasetReaderConfig {
            dataset_fields: vec!["title".to_string()],
            metadata_object,
            metadata_dataset_fields,
            ..Default::default()
        };

        let doc = project_item(&data, &config).expect("non-empty content");
        assert_eq!(
            doc.metadata.get("source_url").unwrap().stringify(),
            "https://example.com"
        );
        assert_eq!(doc.metadata.get("crawler").unwrap().stringify(), "apify");
    }

    struct PagedFixture {
        pages: Vec<Vec<DatasetItem>>,
    }

    #[async_trait]
    impl PagedDataset for PagedFixture {
        async fn fetch_page(
            &self,
            _dataset_id: &str,
            offset: usize,
            _limit: usize,
        ) -> anyhow::Result<Vec<DatasetItem>> {
            Ok(self.pages.get(offset / DEFAULT_PAGE_SIZE).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn given_multiple_pages_when_reading_then_all_documents_are_collected() {
        let pages = vec![
            (0..DEFAULT_PAGE_SIZE)
                .map(|i| item(json!({"title": format!("doc-{i}")})))
                .collect::<Vec<_>>(),
            vec![item(json!({"title": "tail"}))],
        ];
        let source = PagedFixture { pages };
        let config = DatasetReaderConfig {
            dataset_fields: vec!["title".to_string()],
            ..Default::default()
        };

        let documents = read_documents(&source, &config).await.expect("read ok");
        assert_eq!(documents.len(), DEFAULT_PAGE_SIZE + 1);
    }

    struct FailingSource;

    #[async_trait]
    impl PagedDataset for FailingSource {
        async fn fetch_page(
            &self,
            _dataset_id: &str,
            _offset: usize,
            _limit: usize,
        ) -> anyhow::Result<Vec<DatasetItem>> {
            anyhow::bail!("connection reset")
        }
    }

    #[tokio::test]
    async fn given_transport_error_when_reading_then_reports_dataset_unavailable() {
        let config = DatasetReaderConfig::default();
        let err = read_documents(&FailingSource, &config).await.unwrap_err();
        assert_eq!(err.kind(), "DATASET_UNAVAILABLE");
    }
}
