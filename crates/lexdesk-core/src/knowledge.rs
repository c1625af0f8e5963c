use crate::{error::ApiError, store::Store, types::GENERAL_AREA};

/// Most knowledge documents injected into a single AI prompt.
pub const CONTEXT_LIMIT: usize = 5;

/// Selects which tenant knowledge-base documents ground a given call.
///
/// With an area: documents tagged with that area, falling back to documents
/// tagged "geral", falling back to the most recent uploads. Without an area:
/// always the most recent uploads. Every tier orders newest-first so fresh
/// precedent surfaces before stale precedent.
pub fn resolve_context(
    store: &Store,
    tenant_id: &str,
    area: Option<&str>,
) -> Result<Vec<String>, ApiError> {
    if let Some(area) = area.filter(|a| !a.trim().is_empty()) {
        let tagged = store.knowledge_refs_by_area(tenant_id, area, CONTEXT_LIMIT)?;
        if !tagged.is_empty() {
            return Ok(tagged);
        }
        let general = store.knowledge_refs_by_area(tenant_id, GENERAL_AREA, CONTEXT_LIMIT)?;
        if !general.is_empty() {
            return Ok(general);
        }
    }
    Ok(store.knowledge_refs_recent(tenant_id, CONTEXT_LIMIT)?)
}
