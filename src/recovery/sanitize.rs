//! Input sanitization for structured output.
//!
//! # Responsibilities
//! - Remove control and zero-width characters (newline, carriage return and tab survive)
//! - Remove YAML type tags able to request arbitrary type construction
//!   (`!!python/object`, `!ruby/object:Foo`, `!<tag:...>`, `!e!handle` shorthands)
//! - Remove `%TAG` directives that would define new tag handles
//!
//! Tags are only recognized where YAML allows them: at the start of a node, outside
//! quoted scalars, comments and block scalars. A `!` anywhere else is content.
//! Core-schema tags (`!!str`, `!!int`, ...) are kept, and plain local tags (`!Foo`)
//! are left for the parser step to reject structurally.

use std::sync::OnceLock;

use regex::Regex;

use crate::recovery::StructuredFormat;

const CORE_TAGS: [&str; 7] = ["!!str", "!!int", "!!float", "!!bool", "!!null", "!!seq", "!!map"];

fn tag_directive_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?m)^%TAG[^\n]*\n?").expect("invalid tag directive regex"))
}

/// Sanitize `raw` for parsing as `format`.
pub fn sanitize(raw: &str, format: StructuredFormat) -> String {
    let cleaned = strip_control_chars(raw);
    match format {
        StructuredFormat::Json => cleaned,
        StructuredFormat::Yaml => strip_unsafe_tags(&cleaned),
    }
}

fn is_stripped_char(c: char) -> bool {
    (c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
        || matches!(c, '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}')
}

/// Drop control and zero-width characters.
pub fn strip_control_chars(text: &str) -> String {
    text.chars().filter(|c| !is_stripped_char(*c)).collect()
}

/// Remove tag directives and type-construction tags in tag position.
pub fn strip_unsafe_tags(text: &str) -> String {
    let without_directives = tag_directive_regex().replace_all(text, "");
    let mut scanner = TagScanner::default();
    let mut out = String::with_capacity(without_directives.len());
    for line in without_directives.split_inclusive('\n') {
        scanner.scan_line(line, &mut out);
    }
    out
}

/// Verbatim tags, named handles and anything path- or namespace-shaped.
fn requests_construction(tag: &str) -> bool {
    if CORE_TAGS.contains(&tag) {
        return false;
    }
    let body = &tag[1..];
    body.starts_with('<') || body.contains('!') || body.contains('/') || body.contains(':')
}

/// Tracks just enough YAML structure to tell tag positions from content.
#[derive(Default)]
struct TagScanner {
    /// Open quoted scalar, which may span lines.
    quote: Option<char>,
    flow_depth: usize,
    /// Indentation of the line that opened a `|` or `>` block scalar.
    block_scalar_parent: Option<usize>,
    node_start: bool,
}

impl TagScanner {
    fn scan_line(&mut self, line: &str, out: &mut String) {
        let indent = line.len() - line.trim_start_matches(' ').len();
        if let Some(parent) = self.block_scalar_parent {
            if line.trim().is_empty() || indent > parent {
                out.push_str(line);
                return;
            }
            self.block_scalar_parent = None;
        }
        if self.quote.is_none() && self.flow_depth == 0 {
            self.node_start = true;
        }

        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];

            if let Some(quote) = self.quote {
                out.push(c);
                if quote == '"' && c == '\\' {
                    if let Some(&escaped) = chars.get(i + 1) {
                        out.push(escaped);
                        i += 1;
                    }
                } else if c == quote {
                    if quote == '\'' && chars.get(i + 1) == Some(&'\'') {
                        out.push('\'');
                        i += 1;
                    } else {
                        self.quote = None;
                    }
                }
                i += 1;
                continue;
            }

            let followed_by_blank = chars.get(i + 1).map_or(true, |n| n.is_whitespace());
            match c {
                '#' if i == 0 || chars[i - 1].is_whitespace() => {
                    out.extend(&chars[i..]);
                    return;
                }
                '!' if self.node_start => {
                    let end = token_end(&chars, i, self.flow_depth > 0);
                    let tag: String = chars[i..end].iter().collect();
                    if requests_construction(&tag) {
                        tracing::warn!(tag = %tag, "Stripped unsafe type tag from model output");
                    } else {
                        out.push_str(&tag);
                    }
                    i = end;
                    continue;
                }
                '&' if self.node_start => {
                    let end = token_end(&chars, i, self.flow_depth > 0);
                    out.extend(&chars[i..end]);
                    i = end;
                    continue;
                }
                '"' | '\'' if self.node_start => {
                    self.quote = Some(c);
                    self.node_start = false;
                    out.push(c);
                }
                '|' | '>' if self.node_start && self.flow_depth == 0 => {
                    self.block_scalar_parent = Some(indent);
                    out.extend(&chars[i..]);
                    return;
                }
                '[' | '{' if self.node_start || self.flow_depth > 0 => {
                    self.flow_depth += 1;
                    self.node_start = true;
                    out.push(c);
                }
                ']' | '}' if self.flow_depth > 0 => {
                    self.flow_depth -= 1;
                    self.node_start = false;
                    out.push(c);
                }
                ',' if self.flow_depth > 0 => {
                    self.node_start = true;
                    out.push(c);
                }
                ':' if followed_by_blank => {
                    self.node_start = true;
                    out.push(c);
                }
                '-' | '?' if self.node_start && followed_by_blank => out.push(c),
                c if c.is_whitespace() => out.push(c),
                _ => {
                    self.node_start = false;
                    out.push(c);
                }
            }
            i += 1;
        }
    }
}

/// End of a tag or anchor token starting at `start`.
fn token_end(chars: &[char], start: usize, in_flow: bool) -> usize {
    if chars.get(start + 1) == Some(&'<') {
        return chars[start..]
            .iter()
            .position(|c| *c == '>')
            .map_or(chars.len(), |offset| start + offset + 1);
    }
    chars[start..]
        .iter()
        .position(|c| c.is_whitespace() || (in_flow && matches!(c, ',' | '[' | ']' | '{' | '}')))
        .map_or(chars.len(), |offset| start + offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_and_ruby_tags_removed() {
        let raw = "a: !!python/object/apply:os.system [\"id\"]\nb: !ruby/object:Gem::Installer {}\nc: !<tag:yaml.org,2002:python/name:os.system> x\n";
        let out = sanitize(raw, StructuredFormat::Yaml);
        assert!(!out.contains("python"));
        assert!(!out.contains("ruby"));
        assert!(out.contains("a:  [\"id\"]"));
    }

    #[test]
    fn test_tag_handles_and_directives_removed() {
        let raw = "%TAG !e! tag:evil.example,2024:\n---\nx: !e!Payload {cmd: run}\n";
        let out = sanitize(raw, StructuredFormat::Yaml);
        assert!(!out.contains("%TAG"));
        assert!(!out.contains("!e!"));
        assert!(out.contains("x:  {cmd: run}"));
    }

    #[test]
    fn test_tags_inside_sequences_removed() {
        let out = sanitize("- !!python/object:Foo {}\n- [!!js/function 'f']\n", StructuredFormat::Yaml);
        assert!(!out.contains("!!"));
    }

    #[test]
    fn test_core_tags_and_plain_text_kept() {
        let raw = "a: !!str 10\nb: Hello! World\nc: \"wow!\"\n";
        assert_eq!(sanitize(raw, StructuredFormat::Yaml), raw);
    }

    #[test]
    fn test_control_chars_removed_for_json() {
        let raw = "\u{FEFF}{\"a\":\u{0001}\"b\u{200B}\"}\n\t";
        assert_eq!(sanitize(raw, StructuredFormat::Json), "{\"a\":\"b\"}\n\t");
    }

    #[test]
    fn test_bang_inside_quoted_scalars_kept() {
        let raw = "note: \"see !ruby/docs for details\"\ncheer: \"Great job !!\"\nsingle: 'it''s !e!x'\n";
        assert_eq!(sanitize(raw, StructuredFormat::Yaml), raw);
    }

    #[test]
    fn test_bang_inside_plain_scalars_and_comments_kept() {
        let raw = "note: see !ruby/docs for details\nratio: a !a:b c\nshout: wow !! # !!python/object\n";
        assert_eq!(sanitize(raw, StructuredFormat::Yaml), raw);
    }

    #[test]
    fn test_block_scalar_content_kept() {
        let raw = "poem: |\n  !!python/object is just a line here\n  - !ruby/x too\nnext: !!python/object:Foo {}\n";
        let out = sanitize(raw, StructuredFormat::Yaml);
        assert!(out.contains("  !!python/object is just a line here\n"));
        assert!(out.contains("  - !ruby/x too\n"));
        assert!(out.contains("next:  {}"));
    }

    #[test]
    fn test_multiline_quoted_scalar_kept() {
        let raw = "text: \"first line\n  - !ruby/object:Foo inside quotes\"\nafter: 1\n";
        assert_eq!(sanitize(raw, StructuredFormat::Yaml), raw);
    }
}
