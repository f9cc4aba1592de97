use std::collections::HashMap;

use crate::types::read_page::ReadPage;

/// Lookup table from normalized URL to its read record.
///
/// When the list holds several records for the same URL, the first one wins,
/// matching how removal picks the first match.
#[derive(Debug, Clone, Default)]
pub struct ReadStateIndex {
    by_url: HashMap<String, ReadPage>,
}

impl ReadStateIndex {
    pub fn build(pages: &[ReadPage]) -> Self {
        let mut by_url = HashMap::with_capacity(pages.len());
        for page in pages {
            by_url.entry(page.url.clone()).or_insert_with(|| page.clone());
        }
        Self { by_url }
    }

    pub fn lookup(&self, normalized_url: &str) -> Option<&ReadPage> {
        self.by_url.get(normalized_url)
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }
}
