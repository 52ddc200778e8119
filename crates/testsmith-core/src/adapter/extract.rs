//! Pull test source out of a model response.
//!
//! The response is expected to hold a fenced code block. A block tagged with
//! one of the adapter's language tags wins over an untagged block; blocks
//! tagged with some other language are never used.

use std::sync::LazyLock;

use regex::Regex;

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*([^\s`]*)[^\n]*\n(.*?)```").expect("fence regex is valid")
});

/// Why no code could be extracted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("response contains no fenced code block")]
    NoCodeBlock,

    #[error("response contains an unterminated code fence")]
    Unterminated,

    #[error("code block is empty")]
    EmptyBlock,

    #[error("no block tagged {expected}; found blocks tagged {found:?}")]
    WrongLanguage { expected: String, found: Vec<String> },
}

/// Extract the body of the best matching fenced block in `response`.
///
/// `tags` are compared case-insensitively against the info string.
pub fn extract_code_block(response: &str, tags: &[&str]) -> Result<String, ExtractError> {
    let blocks: Vec<(String, &str)> = FENCE
        .captures_iter(response)
        .map(|c| {
            let tag = c.get(1).map_or("", |m| m.as_str()).to_ascii_lowercase();
            let body = c.get(2).map_or("", |m| m.as_str());
            (tag, body)
        })
        .collect();

    if blocks.is_empty() {
        return Err(if response.contains("```") {
            ExtractError::Unterminated
        } else {
            ExtractError::NoCodeBlock
        });
    }

    let chosen = blocks
        .iter()
        .find(|(tag, _)| tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
        .or_else(|| blocks.iter().find(|(tag, _)| tag.is_empty()));

    let Some((_, body)) = chosen else {
        return Err(ExtractError::WrongLanguage {
            expected: tags.join("/"),
            found: blocks.into_iter().map(|(tag, _)| tag).collect(),
        });
    };

    let code = body.trim_end_matches(['\n', '\r', ' ', '\t']);
    if code.trim().is_empty() {
        return Err(ExtractError::EmptyBlock);
    }
    Ok(code.to_string())
}
