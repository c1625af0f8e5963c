pub mod docx;
pub mod sections;

pub use docx::DocxRenderer;
pub use sections::{parse_sections, Section};
