use tempfile::TempDir;

/// Temporary base directory holding the given `(name, contents)` files.
pub fn workspace(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).expect("write fixture");
    }
    dir
}

/// Drops `ESC [ ... <final byte>` color sequences.
pub fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' && chars.peek() == Some(&'[') {
            chars.next();
            for next in chars.by_ref() {
                if ('@'..='~').contains(&next) {
                    break;
                }
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("plain", "plain")]
    #[case("\u{1b}[1m\u{1b}[36mPhase\u{1b}[39m\u{1b}[0m", "Phase")]
    #[case("a\u{1b}[2mb\u{1b}[0mc", "abc")]
    fn color_sequences_are_removed(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(strip_ansi(input), expected);
    }
}
