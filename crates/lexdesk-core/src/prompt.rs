use crate::types::AnswerMap;

/// Separator between the base stage instructions and a tenant's custom
/// instructions. Overrides augment the base prompt, never replace it, and
/// every stage applies them through this one function.
const OFFICE_SEPARATOR: &str = "\n\nINSTRUÇÕES ADICIONAIS DO ESCRITÓRIO:\n";

pub fn with_office_instructions(base: &str, custom: Option<&str>) -> String {
    match custom.map(str::trim).filter(|c| !c.is_empty()) {
        Some(custom) => format!("{base}{OFFICE_SEPARATOR}{custom}"),
        None => base.to_string(),
    }
}

/// Strategic answers flattened for prompt composition, one per line.
pub fn answers_text(answers: &AnswerMap) -> String {
    answers
        .iter()
        .map(|(id, answer)| format!("Pergunta {id}: {}", answer.joined()))
        .collect::<Vec<_>>()
        .join("\n")
}
