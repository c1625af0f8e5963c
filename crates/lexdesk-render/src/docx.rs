use std::io::{Cursor, Write};

use lexdesk_core::render::{DocumentRenderer, DocumentSpec};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::sections::parse_sections;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

// A4 page, 3 cm margins, in twips.
const PAGE_W: u32 = 11906;
const PAGE_H: u32 = 16838;
const MARGIN: u32 = 1701;

/// DOCX renderer: a pure function from marker-structured text to an OOXML
/// package. `## `/`# ` lines become headings; paragraphs are justified with
/// 1.5 line spacing; the header carries the office identity and the footer
/// carries page numbers.
pub struct DocxRenderer;

impl DocumentRenderer for DocxRenderer {
    fn render(&self, spec: &DocumentSpec<'_>) -> Result<Vec<u8>, String> {
        build_docx(spec).map_err(|e| e.to_string())
    }
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn is_numbered_item(text: &str) -> bool {
    let Some(dot) = text.find('.') else {
        return false;
    };
    let head = &text[..dot];
    !head.is_empty() && head.chars().all(|c| c.is_ascii_digit())
}

/// Run with explicit size (half-points) and optional bold/color.
fn run(text: &str, size: u32, bold: bool, color: Option<&str>) -> String {
    let mut props = format!("<w:sz w:val=\"{size}\"/><w:szCs w:val=\"{size}\"/>");
    if bold {
        props.push_str("<w:b/>");
    }
    if let Some(color) = color {
        props.push_str(&format!("<w:color w:val=\"{color}\"/>"));
    }
    format!(
        "<w:r><w:rPr>{props}</w:rPr><w:t xml:space=\"preserve\">{}</w:t></w:r>",
        xml_escape(text)
    )
}

fn document_xml(spec: &DocumentSpec<'_>) -> String {
    let mut body = String::new();

    // Title block.
    body.push_str(&format!(
        "<w:p><w:pPr><w:jc w:val=\"center\"/><w:spacing w:after=\"200\"/></w:pPr>{}</w:p>",
        run(spec.title, 32, true, None)
    ));
    if !spec.subtitle.is_empty() {
        body.push_str(&format!(
            "<w:p><w:pPr><w:jc w:val=\"center\"/><w:spacing w:after=\"400\"/></w:pPr>{}</w:p>",
            run(spec.subtitle, 22, false, Some("666666"))
        ));
    }

    for section in parse_sections(spec.body) {
        if let Some(heading) = &section.heading {
            body.push_str(&format!(
                "<w:p><w:pPr><w:spacing w:before=\"400\" w:after=\"200\"/></w:pPr>{}</w:p>",
                run(&heading.to_uppercase(), 26, true, Some("1E293B"))
            ));
        }
        for para in section.content.split("\n\n") {
            let trimmed = para.trim();
            if trimmed.is_empty() {
                continue;
            }
            if is_numbered_item(trimmed) {
                body.push_str(&format!(
                    "<w:p><w:pPr><w:ind w:left=\"720\"/><w:spacing w:after=\"120\"/></w:pPr>{}</w:p>",
                    run(trimmed, 24, false, None)
                ));
            } else {
                body.push_str(&format!(
                    "<w:p><w:pPr><w:jc w:val=\"both\"/><w:spacing w:after=\"200\" w:line=\"360\" w:lineRule=\"auto\"/></w:pPr>{}</w:p>",
                    run(trimmed, 24, false, None)
                ));
            }
        }
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<w:document xmlns:w=\"{W_NS}\" xmlns:r=\"{R_NS}\"><w:body>{body}\
<w:sectPr>\
<w:headerReference w:type=\"default\" r:id=\"rId2\"/>\
<w:footerReference w:type=\"default\" r:id=\"rId3\"/>\
<w:pgSz w:w=\"{PAGE_W}\" w:h=\"{PAGE_H}\"/>\
<w:pgMar w:top=\"{MARGIN}\" w:right=\"{MARGIN}\" w:bottom=\"{MARGIN}\" w:left=\"{MARGIN}\"/>\
</w:sectPr></w:body></w:document>"
    )
}

fn header_xml(spec: &DocumentSpec<'_>) -> String {
    let office_name = spec
        .office
        .and_then(|o| o.name.as_deref())
        .unwrap_or("LEXDESK");
    let mut runs = run(office_name, 18, true, Some("6366F1"));
    if let Some(oab) = spec.office.and_then(|o| o.oab_number.as_deref()) {
        runs.push_str(&run(&format!("   |   OAB: {oab}"), 18, false, Some("666666")));
    }
    runs.push_str(&run(&format!("   |   {}", spec.subtitle), 18, false, Some("666666")));
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<w:hdr xmlns:w=\"{W_NS}\"><w:p><w:pPr><w:jc w:val=\"right\"/></w:pPr>{runs}</w:p></w:hdr>"
    )
}

fn footer_xml() -> String {
    let gray = "<w:rPr><w:sz w:val=\"18\"/><w:color w:val=\"666666\"/></w:rPr>";
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<w:ftr xmlns:w=\"{W_NS}\"><w:p><w:pPr><w:jc w:val=\"center\"/></w:pPr>\
<w:r>{gray}<w:t xml:space=\"preserve\">Página </w:t></w:r>\
<w:fldSimple w:instr=\" PAGE \"><w:r>{gray}<w:t>1</w:t></w:r></w:fldSimple>\
<w:r>{gray}<w:t xml:space=\"preserve\"> de </w:t></w:r>\
<w:fldSimple w:instr=\" NUMPAGES \"><w:r>{gray}<w:t>1</w:t></w:r></w:fldSimple>\
</w:p></w:ftr>"
    )
}

fn styles_xml() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<w:styles xmlns:w=\"{W_NS}\"><w:docDefaults><w:rPrDefault><w:rPr>\
<w:rFonts w:ascii=\"Arial\" w:hAnsi=\"Arial\" w:cs=\"Arial\"/>\
<w:sz w:val=\"24\"/><w:szCs w:val=\"24\"/>\
</w:rPr></w:rPrDefault></w:docDefaults></w:styles>"
    )
}

const CONTENT_TYPES_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>\
<Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>\
<Override PartName=\"/word/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml\"/>\
<Override PartName=\"/word/header1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml\"/>\
<Override PartName=\"/word/footer1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml\"/>\
</Types>";

const ROOT_RELS_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"word/document.xml\"/>\
</Relationships>";

const DOCUMENT_RELS_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles\" Target=\"styles.xml\"/>\
<Relationship Id=\"rId2\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/header\" Target=\"header1.xml\"/>\
<Relationship Id=\"rId3\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer\" Target=\"footer1.xml\"/>\
</Relationships>";

fn build_docx(spec: &DocumentSpec<'_>) -> zip::result::ZipResult<Vec<u8>> {
    let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let files: [(&str, String); 7] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
        ("_rels/.rels", ROOT_RELS_XML.to_string()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS_XML.to_string()),
        ("word/document.xml", document_xml(spec)),
        ("word/styles.xml", styles_xml()),
        ("word/header1.xml", header_xml(spec)),
        ("word/footer1.xml", footer_xml()),
    ];

    for (name, contents) in files {
        zw.start_file(name, opts)?;
        zw.write_all(contents.as_bytes())?;
    }

    let cursor = zw.finish()?;
    Ok(cursor.into_inner())
}
