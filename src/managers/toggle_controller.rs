use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::dom::Document;
use crate::format::timestamp;
use crate::managers::annotation_engine::{ContentEngine, EngineState};
use crate::types::errors::EngineError;
use crate::types::read_page::ReadPage;

/// What a toggle did to the read-page list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "page", rename_all = "camelCase")]
pub enum ToggleOutcome {
    Marked(ReadPage),
    Unmarked(ReadPage),
}

/// Flips `normalized_url` in `pages`.
///
/// Removes the first record with that URL if there is one, otherwise appends
/// a new record stamped with `now`. Other records keep their order.
pub fn toggle_record(
    pages: &[ReadPage],
    normalized_url: &str,
    now: DateTime<Utc>,
) -> (Vec<ReadPage>, ToggleOutcome) {
    let mut updated = pages.to_vec();
    match updated.iter().position(|p| p.url == normalized_url) {
        Some(pos) => {
            let removed = updated.remove(pos);
            (updated, ToggleOutcome::Unmarked(removed))
        }
        None => {
            let page = ReadPage::new(normalized_url, timestamp(now));
            updated.push(page.clone());
            (updated, ToggleOutcome::Marked(page))
        }
    }
}

/// Toggles the page shown in `doc` and re-reports it.
pub fn toggle_current_page(
    engine: &mut ContentEngine,
    doc: &Document,
) -> Result<ToggleOutcome, EngineError> {
    toggle_current_page_at(engine, doc, Utc::now())
}

/// Like [`toggle_current_page`] with an explicit clock.
///
/// Refused unless the engine is running, since a stopped engine no longer
/// follows the store and its list may be stale. The whole list this engine last saw is written back, so a concurrent
/// toggle in another tab that this engine has not yet heard about is
/// overwritten.
pub fn toggle_current_page_at(
    engine: &mut ContentEngine,
    doc: &Document,
    now: DateTime<Utc>,
) -> Result<ToggleOutcome, EngineError> {
    if engine.state() != EngineState::Running {
        return Err(EngineError::NotRunning);
    }
    let pages = engine
        .read_pages()
        .ok_or(EngineError::NotInitialized("readPages"))?;
    let normalized = engine.normalize(doc.url())?;
    let (updated, outcome) = toggle_record(pages, &normalized, now);

    engine.commit_read_pages(updated)?;
    engine.report(doc)?;

    match &outcome {
        ToggleOutcome::Marked(page) => info!(tab_id = engine.tab(), url = %page.url, "page marked as read"),
        ToggleOutcome::Unmarked(page) => info!(tab_id = engine.tab(), url = %page.url, "page unmarked"),
    }
    Ok(outcome)
}
