//! Prompt adjustments owned by the orchestrator's image retry policy.

use std::sync::LazyLock;

use regex::Regex;

static DEMOGRAPHIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(japanese|asian|caucasian|african)\s+").expect("valid regex")
});

static PERSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(man|woman|person)\b").expect("valid regex"));

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Append a per-scene free-text instruction to a base prompt.
pub fn with_instruction(prompt: &str, instruction: Option<&str>) -> String {
    match instruction.map(str::trim) {
        Some(extra) if !extra.is_empty() => format!("{prompt}. Additional instructions: {extra}"),
        _ => prompt.to_string(),
    }
}

/// Strip identity descriptors that commonly trip content-safety filters.
///
/// Ethnicity adjectives are removed and person nouns become
/// "professional".
pub fn simplify_prompt(prompt: &str) -> String {
    let stripped = DEMOGRAPHIC_RE.replace_all(prompt, "");
    let neutral = PERSON_RE.replace_all(&stripped, "professional");
    WHITESPACE_RE.replace_all(neutral.trim(), " ").into_owned()
}

/// Prompt to use for a 1-based attempt number.
pub fn prompt_for_attempt(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        base.to_string()
    } else {
        simplify_prompt(base)
    }
}
