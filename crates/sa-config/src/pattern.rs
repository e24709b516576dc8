/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

/// A parsed delimited regex literal: `/pat/mods`, `m{pat}mods`,
/// `m(pat)mods`, `m<pat>mods`, or `m⟨char⟩pat⟨char⟩mods` for any other
/// delimiter character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedPattern {
    pub body: String,
    pub modifiers: String,
}

const PAIRED_DELIMS: &[(char, char)] = &[('{', '}'), ('(', ')'), ('<', '>'), ('[', ']')];

/// Parses a delimited regex literal starting at the first recognised
/// delimiter in `text`. Returns the pattern body and trailing modifier
/// letters, or `None` if no well-formed delimited literal is present.
pub fn parse_delimited(text: &str) -> Option<DelimitedPattern> {
    let trimmed = text.trim();
    let (rest, stripped_m) = match trimmed.strip_prefix('m') {
        Some(rest) if rest.chars().next().map(|c| !c.is_alphanumeric()).unwrap_or(false) => {
            (rest, true)
        }
        _ => (trimmed, false),
    };
    if !stripped_m && !rest.starts_with('/') {
        return None;
    }

    let mut chars = rest.chars();
    let open = chars.next()?;
    let close = PAIRED_DELIMS
        .iter()
        .find(|(o, _)| *o == open)
        .map(|(_, c)| *c)
        .unwrap_or(open);

    let body_and_tail = chars.as_str();
    let close_pos = find_unescaped(body_and_tail, close)?;
    let body = body_and_tail[..close_pos].to_string();
    let tail = &body_and_tail[close_pos + close.len_utf8()..];
    let modifiers = tail
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    Some(DelimitedPattern { body, modifiers })
}

fn find_unescaped(s: &str, needle: char) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            continue;
        }
        if c == needle {
            return Some(idx);
        }
    }
    None
}

/// Translates Perl-ish modifier letters (`i`, `m`, `s`, `x`) into the
/// `(?ism x)` inline-flag prefix the `regex` crate understands; unknown
/// modifiers are dropped (they affect interpolation features not honored
/// here, e.g. `o`).
pub fn modifiers_to_inline_flags(modifiers: &str) -> String {
    let known: String = modifiers
        .chars()
        .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
        .collect();
    if known.is_empty() {
        String::new()
    } else {
        format!("(?{known})")
    }
}

/// Builds a final `regex`-crate pattern string from a delimited literal.
pub fn to_regex_source(pat: &DelimitedPattern) -> String {
    format!("{}{}", modifiers_to_inline_flags(&pat.modifiers), pat.body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_delimited() {
        let p = parse_delimited(r"/\bwin\b/i").unwrap();
        assert_eq!(p.body, r"\bwin\b");
        assert_eq!(p.modifiers, "i");
    }

    #[test]
    fn m_with_braces() {
        let p = parse_delimited(r"m{foo\}bar}msx").unwrap();
        assert_eq!(p.body, r"foo\}bar");
        assert_eq!(p.modifiers, "msx");
    }

    #[test]
    fn m_with_arbitrary_char_delimiter() {
        let p = parse_delimited("m#foo#i").unwrap();
        assert_eq!(p.body, "foo");
        assert_eq!(p.modifiers, "i");
    }

    #[test]
    fn regex_source_includes_inline_flags() {
        let p = parse_delimited(r"/win/i").unwrap();
        assert_eq!(to_regex_source(&p), "(?i)win");
    }
}
