/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

/// One logical configuration line after comment-stripping and trimming,
/// tagged with its originating file (if inside a `file start`/`file end`
/// bracket) and 1-based line number for error reporting.
#[derive(Debug, Clone)]
pub struct LogicalLine {
    pub text: String,
    pub source_file: Option<String>,
    pub line_no: usize,
}

/// Strips an unescaped `#`-comment (a `#` not preceded by `\`) and trims
/// surrounding whitespace. Returns `None` for a line that is empty after
/// stripping.
fn strip_comment(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut prev_backslash = false;
    while let Some(c) = chars.next() {
        if c == '#' && !prev_backslash {
            break;
        }
        if c == '\\' && chars.peek() == Some(&'#') {
            prev_backslash = true;
            continue;
        }
        prev_backslash = false;
        out.push(c);
    }
    let trimmed = out.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Lexes raw configuration text into logical lines, stripping comments and
/// blank lines. Continuation (`file start`/`file end`) tracking is left to
/// the caller since it needs to thread through `include` expansion.
pub fn lex(text: &str, source_file: Option<&str>) -> Vec<LogicalLine> {
    text.lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            strip_comment(raw).map(|t| LogicalLine {
                text: t,
                source_file: source_file.map(str::to_string),
                line_no: i + 1,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_comment() {
        assert_eq!(strip_comment("score FOO 2.0 # a comment"), Some("score FOO 2.0".to_string()));
    }

    #[test]
    fn unescapes_escaped_hash_without_treating_it_as_a_comment() {
        assert_eq!(strip_comment(r"body FOO /\#hashtag/"), Some("body FOO /#hashtag/".to_string()));
    }

    #[test]
    fn blank_and_comment_only_lines_are_dropped() {
        let lines = lex("# just a comment\n\n   \nscore FOO 1.0\n", None);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "score FOO 1.0");
    }
}
