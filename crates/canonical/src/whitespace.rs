//! Whitespace cleanup for consolidated sections.
//!
//! Line structure is kept because stack traces and reproduction steps read
//! badly when flattened. Within a line, runs of whitespace collapse to one
//! space; runs of blank lines collapse to one blank line.

/// Collapses repeated whitespace, trims edges, and normalizes newlines to
/// single spaces.
///
/// ```rust
/// use canonical::collapse_whitespace;
///
/// assert_eq!(collapse_whitespace("  hello \n\t world  "), "hello world");
/// ```
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean a multi-line section while keeping its line breaks.
///
/// ```rust
/// use canonical::clean_lines;
///
/// let cleaned = clean_lines("step 1:\r\n   open   app \r\n\r\n\r\n\r\nstep 2 ");
/// assert_eq!(cleaned, "step 1:\nopen app\n\nstep 2");
/// ```
pub fn clean_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;

    for line in text.lines() {
        let line: String = line
            .chars()
            .filter(|c| !c.is_control() || *c == '\t')
            .collect();
        let collapsed = collapse_whitespace(&line);
        if collapsed.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(&collapsed);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters() {
        assert_eq!(clean_lines("a\u{0007}b\u{0000}"), "ab");
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert_eq!(clean_lines(" \n\t\n  "), "");
        assert_eq!(collapse_whitespace("   "), "");
    }
}
