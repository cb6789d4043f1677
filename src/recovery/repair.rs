//! Textual repairs for malformed structured output.
//!
//! Applied in a fixed order, each step independent of the others:
//! 1. strip delimiter fencing (markdown fences, surrounding prose for JSON)
//! 2. strip decorative markup (reasoning blocks, wrapper tags, bold markers)
//! 3. normalize typographic quotes
//! 4. remove trailing commas
//! 5. fix YAML indentation (tabs, uniform indent)

use std::sync::OnceLock;

use regex::Regex;

use crate::recovery::StructuredFormat;

fn fence_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_+\-]*[ \t]*\r?\n?(.*?)```").expect("invalid fence regex")
    })
}

fn open_fence_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?m)^```[A-Za-z0-9_+\-]*[ \t]*$\r?\n?").expect("invalid open fence regex")
    })
}

fn think_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?is)<think(?:ing)?>.*?</think(?:ing)?>").expect("invalid think regex")
    })
}

fn wrapper_tag_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?i)</?(?:json|yaml|output|response|answer|result|data)\s*>")
            .expect("invalid wrapper tag regex")
    })
}

fn bold_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\*\*([^*\n]+)\*\*").expect("invalid bold regex"))
}

fn trailing_comma_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("invalid trailing comma regex"))
}

/// Run every repair step in order.
pub fn repair(text: &str, format: StructuredFormat) -> String {
    let text = strip_fencing(text, format);
    let text = strip_markup(&text);
    let text = normalize_quotes(&text);
    let text = remove_trailing_commas(&text);
    match format {
        StructuredFormat::Yaml => fix_yaml_indentation(&text),
        StructuredFormat::Json => text,
    }
}

/// Keep the first fenced block; for JSON also cut prose around the outermost brackets.
pub fn strip_fencing(text: &str, format: StructuredFormat) -> String {
    let unfenced = match fence_regex().captures(text) {
        Some(caps) => caps[1].to_string(),
        // Truncated output: opening fence with no closing one.
        None => open_fence_regex().replace_all(text, "").into_owned(),
    };

    match format {
        StructuredFormat::Json => json_span(&unfenced).unwrap_or(&unfenced).to_string(),
        StructuredFormat::Yaml => unfenced.trim_matches('\n').to_string(),
    }
}

fn json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

pub fn strip_markup(text: &str) -> String {
    let text = think_regex().replace_all(text, "");
    let text = wrapper_tag_regex().replace_all(&text, "");
    bold_regex().replace_all(&text, "$1").trim().to_string()
}

pub fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{FF02}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => '\'',
            other => other,
        })
        .collect()
}

pub fn remove_trailing_commas(text: &str) -> String {
    trailing_comma_regex().replace_all(text, "$1").into_owned()
}

/// Expand leading tabs, drop uniform indentation and trailing whitespace.
pub fn fix_yaml_indentation(text: &str) -> String {
    let expanded: Vec<String> = text
        .lines()
        .map(|line| {
            let indent_len = line.len() - line.trim_start_matches([' ', '\t']).len();
            let (indent, rest) = line.split_at(indent_len);
            let indent = indent.replace('\t', "  ");
            format!("{}{}", indent, rest.trim_end())
        })
        .collect();

    let common = expanded
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches(' ').len())
        .min()
        .unwrap_or(0);

    expanded
        .iter()
        .map(|line| if line.len() >= common { &line[common..] } else { line.trim() })
        .collect::<Vec<_>>()
        .join("\n")
}
