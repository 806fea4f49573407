//! Variable extraction for mustache-style configuration templates.
//!
//! Templates reference deployment-time variables as `{{NAME}}`. Section tags
//! (`{{#NAME}}`, `{{^NAME}}`) also reference a variable; comments (`{{!...}}`),
//! closing tags (`{{/NAME}}`), and partials (`{{>name}}`) reference nothing.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated tag starting at byte {0}")]
    UnterminatedTag(usize),
    #[error("empty tag at byte {0}")]
    EmptyTag(usize),
}

/// Extract the variable names referenced by a template, in order of
/// appearance. Duplicates are preserved; callers that need a set build one.
pub fn extract_variables(template: &str) -> Result<Vec<String>, TemplateError> {
    let mut names = Vec::new();
    let mut rest = template;
    let mut offset = 0;

    while let Some(open) = rest.find("{{") {
        let tag_start = offset + open;
        let after_open = &rest[open + 2..];

        // Triple mustache {{{NAME}}} is an unescaped interpolation.
        let (body_start, closer) = if after_open.starts_with('{') {
            (open + 3, "}}}")
        } else {
            (open + 2, "}}")
        };

        let body_rest = &rest[body_start..];
        let Some(close) = body_rest.find(closer) else {
            return Err(TemplateError::UnterminatedTag(tag_start));
        };

        let raw = &body_rest[..close];
        let (sigil, name) = match raw.chars().next() {
            Some(c @ ('#' | '^' | '/' | '!' | '>' | '&')) => (Some(c), &raw[c.len_utf8()..]),
            _ => (None, raw),
        };
        let name = name.trim();

        match sigil {
            // Comments, closing tags, and partials reference no variable.
            Some('!' | '/' | '>') => {}
            _ => {
                if name.is_empty() {
                    return Err(TemplateError::EmptyTag(tag_start));
                }
                names.push(name.to_owned());
            }
        }

        let consumed = body_start + close + closer.len();
        offset += consumed;
        rest = &rest[consumed..];
    }

    Ok(names)
}
