//! Case mapping and case-insensitive comparison.
//!
//! The std Unicode case tables handle the language-independent part;
//! Turkish and Azeri dotted/dotless `i` get explicit handling on top,
//! since those are the mappings that actually vary by language tag.
//! The results of the Unicode case algorithms are already NFC when the
//! input was, so the mapped codepoints are re-wrapped without another
//! normalization pass.

use unicode_normalization::UnicodeNormalization;

use crate::text::graphemes::grapheme_codepoints;
use crate::text::Text;

fn is_turkic(language: Option<&str>) -> bool {
    matches!(language, Some("tr") | Some("az"))
}

fn upper_chars(c: char, turkic: bool, out: &mut Vec<char>) {
    if turkic && c == 'i' {
        out.push('\u{0130}'); // LATIN CAPITAL LETTER I WITH DOT ABOVE
    } else {
        out.extend(c.to_uppercase());
    }
}

fn lower_chars(c: char, turkic: bool, out: &mut Vec<char>) {
    if turkic && c == 'I' {
        out.push('\u{0131}'); // LATIN SMALL LETTER DOTLESS I
    } else if turkic && c == '\u{0130}' {
        out.push('i');
    } else {
        out.extend(c.to_lowercase());
    }
}

fn collect_chars(text: &Text) -> Vec<char> {
    text.utf32_codepoints()
        .iter()
        .filter_map(|&c| char::from_u32(c))
        .collect()
}

impl Text {
    pub fn upper(&self, language: Option<&str>) -> Text {
        if self.is_empty() {
            return self.clone();
        }
        let turkic = is_turkic(language);
        let mut out = Vec::new();
        for c in collect_chars(self) {
            upper_chars(c, turkic, &mut out);
        }
        Text::from_chars_unnormalized(out)
    }

    pub fn lower(&self, language: Option<&str>) -> Text {
        if self.is_empty() {
            return self.clone();
        }
        let turkic = is_turkic(language);
        let mut out = Vec::new();
        for c in collect_chars(self) {
            lower_chars(c, turkic, &mut out);
        }
        Text::from_chars_unnormalized(out)
    }

    /// Title case: the first cased letter of every word goes to upper
    /// case, the rest to lower case.
    pub fn title(&self, language: Option<&str>) -> Text {
        if self.is_empty() {
            return self.clone();
        }
        let turkic = is_turkic(language);
        let mut out = Vec::new();
        let mut at_word_start = true;
        for c in collect_chars(self) {
            if c.is_alphabetic() {
                if at_word_start {
                    upper_chars(c, turkic, &mut out);
                    at_word_start = false;
                } else {
                    lower_chars(c, turkic, &mut out);
                }
            } else {
                out.push(c);
                at_word_start = true;
            }
        }
        Text::from_chars_unnormalized(out)
    }

    fn from_chars_unnormalized(chars: Vec<char>) -> Text {
        let codepoints: Vec<u32> = chars.into_iter().map(|c| c as u32).collect();
        Text::from_u32(&codepoints, false)
    }

    /// Grapheme-wise equality up to case. Each mismatching pair of
    /// graphemes falls back to a casefolded comparison of the clusters'
    /// codepoint sequences under NFC.
    pub fn equal_ignoring_case(&self, other: &Text, language: Option<&str>) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let turkic = is_turkic(language);
        let mut a_state = self.iter_state();
        let mut b_state = other.iter_state();
        for i in 0..self.len() {
            let ai = a_state.get(i);
            let bi = b_state.get(i);
            if ai == bi {
                continue;
            }
            if casefold_cluster(ai, turkic) != casefold_cluster(bi, turkic) {
                return false;
            }
        }
        true
    }
}

fn casefold_cluster(g: i32, turkic: bool) -> Vec<char> {
    let chars: Vec<char> = grapheme_codepoints(g)
        .iter()
        .filter_map(|&c| char::from_u32(c))
        .collect();
    let mut folded = Vec::new();
    for c in chars.into_iter().nfc() {
        lower_chars(c, turkic, &mut folded);
    }
    folded.into_iter().nfc().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_case_mapping() {
        let t = Text::from_str("Hello, World");
        assert_eq!(t.upper(None).to_string(), "HELLO, WORLD");
        assert_eq!(t.lower(None).to_string(), "hello, world");
        assert_eq!(Text::from_str("hello world").title(None).to_string(), "Hello World");
    }

    #[test]
    fn casing_handles_expansion() {
        // German sharp s uppercases to "SS":
        assert_eq!(Text::from_str("straße").upper(None).to_string(), "STRASSE");
    }

    #[test]
    fn turkish_dotted_i() {
        let i = Text::from_str("i");
        assert_eq!(i.upper(Some("tr")).to_string(), "\u{0130}");
        assert_eq!(i.upper(None).to_string(), "I");
        let cap = Text::from_str("I");
        assert_eq!(cap.lower(Some("tr")).to_string(), "\u{0131}");
        assert_eq!(cap.lower(None).to_string(), "i");
    }

    #[test]
    fn upper_then_lower_preserves_grapheme_length() {
        for s in ["hello", "Grüße", "e\u{0329}x"] {
            let t = Text::from_str(s);
            assert_eq!(t.lower(None).upper(None).len(), t.upper(None).len(), "{s:?}");
        }
    }

    #[test]
    fn case_insensitive_equality() {
        let a = Text::from_str("Hello");
        let b = Text::from_str("hELLO");
        assert!(a.equal_ignoring_case(&b, None));
        assert!(!a.equal_ignoring_case(&Text::from_str("hells"), None));
        assert!(!a.equal_ignoring_case(&Text::from_str("hell"), None));

        // Accented pairs compare equal up to case:
        let acute = Text::from_str("É");
        let lower_acute = Text::from_str("é");
        assert!(acute.equal_ignoring_case(&lower_acute, None));
    }
}
