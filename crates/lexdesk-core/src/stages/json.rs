/// Returns the first balanced `{…}` block in `text`, honoring JSON string
/// and escape rules. Drafting models sometimes wrap their JSON in
/// explanatory prose; anything without such a block is a stage failure for
/// the caller to report.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_wrapped_in_prose() {
        let response = "Here is the analysis:\n{\"a\": 1, \"b\": [2, 3]}\nHope this helps!";
        assert_eq!(first_json_object(response), Some("{\"a\": 1, \"b\": [2, 3]}"));
    }

    #[test]
    fn extracts_nested_objects() {
        let response = "x {\"a\": {\"b\": {\"c\": 1}}} y {\"second\": 2}";
        assert_eq!(first_json_object(response), Some("{\"a\": {\"b\": {\"c\": 1}}}"));
    }

    #[test]
    fn braces_inside_strings_do_not_close_the_block() {
        let response = r#"{"text": "chaves } e { no meio", "n": 1}"#;
        assert_eq!(first_json_object(response), Some(response));
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let response = r#"{"text": "aspas \" e } depois", "n": 1}"#;
        assert_eq!(first_json_object(response), Some(response));
    }

    #[test]
    fn no_brace_yields_none() {
        assert_eq!(first_json_object("sem json aqui"), None);
    }

    #[test]
    fn unbalanced_brace_yields_none() {
        assert_eq!(first_json_object("{\"a\": 1"), None);
    }

    #[test]
    fn handles_multibyte_text_around_the_block() {
        let response = "Análise concluída — segue o JSON:\n{\"área\": \"cível\"}\nAté já!";
        assert_eq!(first_json_object(response), Some("{\"área\": \"cível\"}"));
    }
}
