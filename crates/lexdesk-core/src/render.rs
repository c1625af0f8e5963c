use crate::types::OfficeSettings;

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// What the renderer needs to produce a downloadable document. `body` is
/// plain text whose `## `/`# ` marker lines map 1:1 to document headings.
#[derive(Debug, Clone)]
pub struct DocumentSpec<'a> {
    pub title: &'a str,
    pub subtitle: &'a str,
    pub body: &'a str,
    pub office: Option<&'a OfficeSettings>,
}

/// Pure function from generated text to a binary document. The concrete
/// format (DOCX layout, margins, fonts) is the implementor's concern.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, spec: &DocumentSpec<'_>) -> Result<Vec<u8>, String>;
}
