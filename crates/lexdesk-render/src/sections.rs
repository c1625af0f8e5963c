/// One rendered block: an optional heading plus the body text that follows
/// it, up to the next marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: Option<String>,
    pub content: String,
}

/// Splits generated prose on the `## `/`# ` marker convention. Markers map
/// 1:1 to document headings; text before the first marker becomes a
/// headingless leading section.
pub fn parse_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut heading: Option<String> = None;
    let mut content: Vec<&str> = Vec::new();

    for line in text.lines() {
        let marker = line
            .strip_prefix("## ")
            .or_else(|| line.strip_prefix("# "));
        if let Some(title) = marker {
            flush(&mut sections, &mut heading, &mut content);
            heading = Some(title.trim().to_string());
        } else {
            content.push(line);
        }
    }
    flush(&mut sections, &mut heading, &mut content);

    // Drop a leading empty headingless block (text starting directly with a
    // marker produces one otherwise).
    sections.retain(|s| s.heading.is_some() || !s.content.is_empty());
    sections
}

fn flush(sections: &mut Vec<Section>, heading: &mut Option<String>, content: &mut Vec<&str>) {
    if heading.is_some() || !content.is_empty() {
        sections.push(Section {
            heading: heading.take(),
            content: content.join("\n").trim().to_string(),
        });
        content.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_markers_give_two_headings_in_order() {
        let text = "## DOS FATOS\nNarrativa dos fatos.\n\n## DO DIREITO\nFundamentação legal.";
        let sections = parse_sections(text);
        let headings: Vec<_> = sections.iter().filter_map(|s| s.heading.as_deref()).collect();
        assert_eq!(headings, vec!["DOS FATOS", "DO DIREITO"]);
        assert_eq!(sections[0].content, "Narrativa dos fatos.");
        assert_eq!(sections[1].content, "Fundamentação legal.");
    }

    #[test]
    fn body_runs_until_the_next_marker() {
        let text = "## A\nlinha 1\nlinha 2\n## B\nlinha 3";
        let sections = parse_sections(text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].content, "linha 1\nlinha 2");
        assert_eq!(sections[1].content, "linha 3");
    }

    #[test]
    fn leading_text_without_marker_is_kept() {
        let text = "Excelentíssimo Senhor Doutor Juiz.\n\n## DOS FATOS\ncorpo";
        let sections = parse_sections(text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].heading, None);
        assert!(sections[0].content.starts_with("Excelentíssimo"));
    }

    #[test]
    fn single_hash_markers_also_become_headings() {
        let text = "# TÍTULO\ncorpo";
        let sections = parse_sections(text);
        assert_eq!(sections[0].heading.as_deref(), Some("TÍTULO"));
    }

    #[test]
    fn plain_text_yields_one_headingless_section() {
        let sections = parse_sections("apenas texto corrido");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].heading, None);
    }

    #[test]
    fn empty_input_yields_no_sections() {
        assert!(parse_sections("").is_empty());
    }

    #[test]
    fn marker_with_empty_body_is_kept() {
        let text = "## SÓ TÍTULO";
        let sections = parse_sections(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].heading.as_deref(), Some("SÓ TÍTULO"));
        assert_eq!(sections[0].content, "");
    }
}
