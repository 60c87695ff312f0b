//! Property tests for the text runtime: construction round-trips,
//! concat stability, hashing, and case mapping.

use proptest::prelude::*;
use tomo::Text;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// A character mix that exercises the interesting NFG paths: plain
/// ASCII, a precomposed accent, combining marks (one that composes
/// with `e`, one that never does), and multibyte CJK.
fn text_chars() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            proptest::char::range('a', 'z'),
            Just('é'),
            Just('\u{0301}'), // COMBINING ACUTE ACCENT
            Just('\u{0329}'), // COMBINING VERTICAL LINE BELOW
            Just('日'),
            Just(' '),
        ],
        0..40,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

fn ascii_strings() -> impl Strategy<Value = String> {
    "[ -~]{0,40}"
}

proptest! {
    #[test]
    fn length_counts_nfc_graphemes(s in text_chars()) {
        let normalized: String = s.chars().nfc().collect();
        let expected = normalized.graphemes(true).count() as i64;
        prop_assert_eq!(Text::from_str(&s).len(), expected);
    }

    #[test]
    fn utf8_round_trip(s in text_chars()) {
        let t = Text::from_str(&s);
        prop_assert_eq!(Text::from_bytes(&t.utf8_bytes()), t);
    }

    #[test]
    fn codepoint_round_trip(s in text_chars()) {
        let t = Text::from_str(&s);
        prop_assert_eq!(Text::from_codepoints(&t.utf32_codepoints()), t);
    }

    #[test]
    fn concat_is_associative(s in text_chars(), cut_a in 0usize..40, cut_b in 0usize..40) {
        let chars: Vec<char> = s.chars().collect();
        let cut_a = cut_a.min(chars.len());
        let cut_b = cut_b.min(chars.len()).max(cut_a);
        let a = Text::from_str(&chars[..cut_a].iter().collect::<String>());
        let b = Text::from_str(&chars[cut_a..cut_b].iter().collect::<String>());
        let c = Text::from_str(&chars[cut_b..].iter().collect::<String>());

        let left = a.concat(&b.concat(&c));
        let right = a.concat(&b).concat(&c);
        prop_assert_eq!(&left, &right);
        prop_assert_eq!(left.hash(), right.hash());
    }

    #[test]
    fn concat_two_matches_concat_many(s in text_chars(), cut in 0usize..40) {
        let chars: Vec<char> = s.chars().collect();
        let cut = cut.min(chars.len());
        let a = Text::from_str(&chars[..cut].iter().collect::<String>());
        let b = Text::from_str(&chars[cut..].iter().collect::<String>());
        prop_assert_eq!(a.concat(&b), Text::concat_many(&[a, b]));
    }

    #[test]
    fn equal_texts_hash_equally(s in text_chars(), chunk in 1usize..8) {
        let whole = Text::from_str(&s);
        let chars: Vec<char> = s.chars().collect();
        let mut pieced = Text::empty();
        for piece in chars.chunks(chunk) {
            pieced = pieced.concat(&Text::from_str(&piece.iter().collect::<String>()));
        }
        prop_assert_eq!(&whole, &pieced);
        prop_assert_eq!(whole.hash(), pieced.hash());
    }

    #[test]
    fn stable_concat_slices_recover_inputs(a in ascii_strings(), b in ascii_strings()) {
        let ta = Text::from_str(&a);
        let tb = Text::from_str(&b);
        // ASCII junctions are always concat-stable:
        let joined = ta.concat(&tb);
        prop_assert_eq!(joined.len(), ta.len() + tb.len());
        if !ta.is_empty() {
            prop_assert_eq!(joined.slice(1, ta.len()), ta.clone());
        }
        if !tb.is_empty() {
            prop_assert_eq!(joined.slice(ta.len() + 1, joined.len()), tb);
        }
    }

    #[test]
    fn comparison_matches_equality(a in text_chars(), b in text_chars()) {
        let ta = Text::from_str(&a);
        let tb = Text::from_str(&b);
        prop_assert_eq!(ta.compare(&tb) == std::cmp::Ordering::Equal, ta == tb);
        prop_assert_eq!(ta.compare(&tb), tb.compare(&ta).reverse());
    }

    #[test]
    fn case_round_trip_preserves_upper_length(s in text_chars()) {
        let t = Text::from_str(&s);
        let via_lower = t.lower(None).upper(None);
        prop_assert_eq!(via_lower.len(), t.upper(None).len());
    }

    #[test]
    fn slicing_matches_grapheme_indexing(s in text_chars(), first in 1i64..45, last in 1i64..45) {
        let t = Text::from_str(&s);
        let slice = t.slice(first, last);
        let expected: Vec<i32> = (first..=last.min(t.len()))
            .filter(|i| *i >= 1 && *i <= t.len())
            .map(|i| t.get_grapheme(i - 1))
            .collect();
        let actual: Vec<i32> = (0..slice.len()).map(|i| slice.get_grapheme(i)).collect();
        prop_assert_eq!(actual, expected);
    }
}

#[test]
fn case_insensitive_comparison_uses_language() {
    let a = Text::from_str("I");
    let b = Text::from_str("i");
    assert!(a.equal_ignoring_case(&b, None));
    // In Turkish, "I" lowers to dotless ı, so it does not match "i":
    assert!(!a.equal_ignoring_case(&b, Some("tr")));
    assert!(a.equal_ignoring_case(&Text::from_str("\u{0131}"), Some("tr")));
}
