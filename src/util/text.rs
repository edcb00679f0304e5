use std::borrow::Cow;

/// Returns true for characters XML 1.0 allows in character data.
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Removes characters that cannot appear in an XML 1.0 document.
///
/// Source feeds sometimes smuggle C0 control characters in through
/// numeric references (`&#1;`); writing them back out would produce a
/// document strict parsers refuse. Tabs, newlines and carriage returns
/// are kept.
///
/// Returns `Cow::Borrowed` when nothing needed removing.
///
/// # Examples
///
/// ```
/// use podbridge::util::strip_invalid_xml_chars;
///
/// assert_eq!(strip_invalid_xml_chars("Ep\u{1}1"), "Ep1");
/// assert_eq!(strip_invalid_xml_chars("line\nbreak"), "line\nbreak");
/// ```
pub fn strip_invalid_xml_chars(s: &str) -> Cow<'_, str> {
    if s.chars().all(is_xml_char) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| is_xml_char(c)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_returns_borrowed() {
        let input = "Hello, world! Ünïcödé and emoji 🎙️ are fine.";
        let result = strip_invalid_xml_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_preserves_tabs_newlines_cr() {
        let input = "line1\nline2\ttabbed\r\nwindows";
        assert!(matches!(strip_invalid_xml_chars(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strips_c0_controls() {
        assert_eq!(strip_invalid_xml_chars("a\u{0}b\u{8}c\u{1b}d"), "abcd");
    }

    #[test]
    fn test_strips_noncharacters() {
        assert_eq!(strip_invalid_xml_chars("x\u{FFFE}y\u{FFFF}"), "xy");
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(strip_invalid_xml_chars(""), "");
    }
}
