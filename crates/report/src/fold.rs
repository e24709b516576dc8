/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

/// Folds a header value to `width` columns, breaking at the last space
/// before the limit and continuing with a tab, matching the classic
/// RFC 5322 continuation-line style (§4.5 "folded to 74 columns").
pub fn fold(value: &str, width: usize) -> String {
    if value.len() <= width {
        return value.to_string();
    }
    let mut out = String::new();
    let mut line_start = 0;
    let mut last_space: Option<usize> = None;
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b' ' {
            last_space = Some(i);
        }
        if i - line_start >= width {
            if let Some(sp) = last_space {
                out.push_str(&value[line_start..sp]);
                out.push_str("\n\t");
                line_start = sp + 1;
                last_space = None;
                i = line_start;
                continue;
            }
        }
        i += 1;
    }
    out.push_str(&value[line_start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_value_is_unchanged() {
        assert_eq!(fold("short value", 74), "short value");
    }

    #[test]
    fn long_value_is_folded_at_word_boundary() {
        let value = "No, hits=1.0 required=5.0 tests=AAAA,BBBB,CCCC,DDDD,EEEE,FFFF,GGGG autolearn=no";
        let folded = fold(value, 30);
        assert!(folded.contains("\n\t"));
        for line in folded.split("\n\t") {
            assert!(line.len() <= 30 || !line.contains(' '));
        }
    }
}
