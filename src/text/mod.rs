//! The Text datatype: NFC-normalized Unicode text stored one grapheme
//! cluster per index.
//!
//! A text value is one of five shapes, chosen to minimize allocation:
//! short ASCII is stored inline, longer ASCII points into a shared
//! immutable buffer, one or two grapheme codes are stored inline, longer
//! grapheme runs point into a shared code buffer, and concatenations
//! become a depth-1 rope (a "subtext") over a flat child list.
//!
//! A grapheme code is a 32-bit signed integer: values >= 0 are plain
//! Unicode scalar values, values < 0 are synthetic IDs for
//! multi-codepoint clusters, assigned by the process-wide interner in
//! [`graphemes`]. Storing one cluster per index gives O(1) length, O(1)
//! indexing, and fast slicing, at the cost of interning the rare cluster
//! that doesn't normalize down to a single codepoint.
//!
//! Text values are immutable and structurally shared; the grapheme
//! length is precomputed and the hash is computed lazily and cached
//! (0 means "not yet computed"; a computed hash of 0 is forced to 1).

pub mod casing;
pub mod graphemes;

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::array::Array;
use crate::hashing::SipHash;
use graphemes::{grapheme_codepoints, intern};

/// Ropes are only ever one level deep in practice; this bounds the
/// iterator state for any future deeper nesting.
pub const MAX_TEXT_DEPTH: usize = 48;

/// Results above this many graphemes are refused by `repeat`.
const MAX_TEXT_LENGTH: i64 = 1 << 40;

#[derive(Clone, Debug)]
enum Repr {
    /// Inline ASCII, length <= 8.
    ShortAscii { bytes: [u8; 8] },
    /// A window into an immutable ASCII byte buffer.
    Ascii { buf: Arc<[u8]>, start: usize },
    /// One or two inline grapheme codes.
    ShortGraphemes { codes: [i32; 2] },
    /// A window into an immutable grapheme code buffer.
    Graphemes { buf: Arc<[i32]>, start: usize },
    /// A bounded rope: a flat list of child texts (depth exactly one).
    Subtext { children: Array<Text> },
}

#[derive(Clone, Debug)]
pub struct Text {
    length: i64,
    hash: Cell<u64>,
    repr: Repr,
}

impl Default for Text {
    fn default() -> Text {
        Text::empty()
    }
}

impl Text {
    pub fn empty() -> Text {
        Text {
            length: 0,
            hash: Cell::new(0),
            repr: Repr::ShortAscii { bytes: [0; 8] },
        }
    }

    fn with_repr(length: i64, repr: Repr) -> Text {
        Text {
            length,
            hash: Cell::new(0),
            repr,
        }
    }

    fn subtext(children: Vec<Text>) -> Text {
        let length = children.iter().map(|c| c.length).sum();
        Text::with_repr(length, Repr::Subtext { children: Array::from_vec(children) })
    }

    /// Build a text from a UTF-8 string: an all-ASCII input stays as a
    /// byte buffer, anything else is normalized to NFC and segmented
    /// into grapheme codes.
    pub fn from_str(s: &str) -> Text {
        if s.is_ascii() {
            let len = s.len() as i64;
            if s.len() <= 8 {
                let mut bytes = [0u8; 8];
                bytes[..s.len()].copy_from_slice(s.as_bytes());
                Text::with_repr(len, Repr::ShortAscii { bytes })
            } else {
                Text::with_repr(
                    len,
                    Repr::Ascii { buf: Arc::from(s.as_bytes().to_vec()), start: 0 },
                )
            }
        } else {
            Text::from_chars(s.chars(), true)
        }
    }

    /// Build a text from raw UTF-32 codepoints. Codepoints that are not
    /// Unicode scalar values become U+FFFD.
    pub fn from_u32(codepoints: &[u32], normalize: bool) -> Text {
        Text::from_chars(
            codepoints
                .iter()
                .map(|&c| char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER)),
            normalize,
        )
    }

    fn from_chars(chars: impl Iterator<Item = char>, normalize: bool) -> Text {
        let s: String = if normalize {
            chars.nfc().collect()
        } else {
            chars.collect()
        };

        let mut codes: Vec<i32> = Vec::new();
        for cluster in s.graphemes(true) {
            let mut cluster_chars = cluster.chars();
            let first = match cluster_chars.next() {
                Some(c) => c,
                None => continue,
            };
            if cluster_chars.next().is_none() {
                codes.push(first as i32);
            } else {
                let codepoints: Vec<u32> = cluster.chars().map(|c| c as u32).collect();
                codes.push(intern(&codepoints));
            }
        }

        let length = codes.len() as i64;
        if codes.len() <= 2 {
            let mut inline = [0i32; 2];
            inline[..codes.len()].copy_from_slice(&codes);
            Text::with_repr(length, Repr::ShortGraphemes { codes: inline })
        } else {
            Text::with_repr(length, Repr::Graphemes { buf: Arc::from(codes), start: 0 })
        }
    }

    /// Grapheme length, precomputed.
    pub fn len(&self) -> i64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The number of children in the rope (1 for any leaf shape).
    pub fn num_subtexts(&self) -> usize {
        match &self.repr {
            Repr::Subtext { children } => children.len(),
            _ => 1,
        }
    }

    /// The grapheme code at 0-based index `i`, or 0 when out of range.
    /// O(depth) over the rope; use [`TextIter`] for sequential access.
    pub fn get_grapheme(&self, i: i64) -> i32 {
        if i < 0 || i >= self.length {
            return 0;
        }
        match &self.repr {
            Repr::ShortAscii { bytes } => bytes[i as usize] as i32,
            Repr::Ascii { buf, start } => buf[start + i as usize] as i32,
            Repr::ShortGraphemes { codes } => codes[i as usize],
            Repr::Graphemes { buf, start } => buf[start + i as usize],
            Repr::Subtext { children } => {
                let mut remaining = i;
                for child in children {
                    if remaining < child.length {
                        return child.get_grapheme(remaining);
                    }
                    remaining -= child.length;
                }
                0
            }
        }
    }

    pub fn iter_state(&self) -> TextIter<'_> {
        TextIter { text: self, subtext: 0, sum_of_previous: 0 }
    }

    /// 1-based inclusive slice; negative indices count from the end
    /// (`-1` is the last grapheme, index 0 is invalid). Out-of-range
    /// slices yield the empty text. Slicing shares the underlying
    /// buffers; it never copies grapheme data.
    pub fn slice(&self, first: i64, last: i64) -> Text {
        assert!(first != 0, "text indices are 1-based; 0 is not a valid index");
        if last == 0 {
            return Text::empty();
        }
        let mut first = if first < 0 { self.length + first + 1 } else { first };
        let mut last = if last < 0 { self.length + last + 1 } else { last };
        if last > self.length {
            last = self.length;
        }
        if first > self.length || last < first {
            return Text::empty();
        }
        if first == 1 && last == self.length {
            return self.clone();
        }
        let count = last - first + 1;

        match &self.repr {
            Repr::ShortAscii { bytes } => {
                let mut out = [0u8; 8];
                out[..count as usize]
                    .copy_from_slice(&bytes[(first - 1) as usize..last as usize]);
                Text::with_repr(count, Repr::ShortAscii { bytes: out })
            }
            Repr::Ascii { buf, start } => Text::with_repr(
                count,
                Repr::Ascii { buf: Arc::clone(buf), start: start + (first - 1) as usize },
            ),
            Repr::ShortGraphemes { codes } => {
                let mut out = [0i32; 2];
                out[..count as usize]
                    .copy_from_slice(&codes[(first - 1) as usize..last as usize]);
                Text::with_repr(count, Repr::ShortGraphemes { codes: out })
            }
            Repr::Graphemes { buf, start } => Text::with_repr(
                count,
                Repr::Graphemes { buf: Arc::clone(buf), start: start + (first - 1) as usize },
            ),
            Repr::Subtext { children } => {
                // Skip fully-elided leading children:
                let mut child_index = 0;
                while first > children.get(child_index).map_or(0, |c| c.length) {
                    first -= children.get(child_index).expect("slice range checked").length;
                    child_index += 1;
                }

                let mut pieces: Vec<Text> = Vec::new();
                let mut remaining = count;
                let mut from = first;
                while remaining > 0 {
                    let child = children.get(child_index).expect("slice range checked");
                    let take = (child.length - from + 1).min(remaining);
                    pieces.push(child.slice(from, from + take - 1));
                    remaining -= take;
                    from = 1;
                    child_index += 1;
                }
                if pieces.len() == 1 {
                    pieces.pop().expect("one piece")
                } else {
                    Text::subtext(pieces)
                }
            }
        }
    }

    /// Repeat the text `count` times. Refuses results over 2^40
    /// graphemes.
    pub fn repeat(&self, count: i64) -> Text {
        if self.length == 0 || count <= 0 {
            return Text::empty();
        }
        if self
            .length
            .checked_mul(count)
            .map_or(true, |total| total > MAX_TEXT_LENGTH)
        {
            panic!("Text repeating would produce too big of a result!");
        }
        let mut children = Vec::new();
        for _ in 0..count {
            match &self.repr {
                Repr::Subtext { children: cs } => children.extend(cs.iter().cloned()),
                _ => children.push(self.clone()),
            }
        }
        Text::subtext(children)
    }

    /// SipHash-2-4 over the grapheme code sequence (each code as a
    /// little-endian 32-bit word), cached on the value.
    pub fn hash(&self) -> u64 {
        if self.hash.get() != 0 {
            return self.hash.get();
        }
        let mut sh = SipHash::init(4 * self.length as usize);
        let mut state = self.iter_state();
        let mut i = 0;
        while i + 1 < self.length {
            let low = state.get(i) as u32 as u64;
            let high = state.get(i + 1) as u32 as u64;
            sh.add_u64(low | (high << 32));
            i += 2;
        }
        let leftover = if i < self.length {
            state.get(i) as u32 as u64
        } else {
            0
        };
        let mut hash = sh.finish_part(leftover);
        if hash == 0 {
            hash = 1;
        }
        self.hash.set(hash);
        hash
    }

    /// Lexicographic comparison by grapheme. Positive scalar pairs
    /// compare directly; anything involving a synthetic cluster compares
    /// the cluster codepoint sequences.
    pub fn compare(&self, other: &Text) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        let len = self.length.max(other.length);
        let mut a_state = self.iter_state();
        let mut b_state = other.iter_state();
        for i in 0..len {
            let ai = a_state.get(i);
            let bi = b_state.get(i);
            if ai == bi {
                continue;
            }
            let cmp = if ai >= 0 && bi >= 0 {
                (ai as u32).cmp(&(bi as u32))
            } else {
                grapheme_codepoints(ai).cmp(&grapheme_codepoints(bi))
            };
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    }

    pub fn equal_values(&self, other: &Text) -> bool {
        if self.length != other.length {
            return false;
        }
        if self.hash.get() != 0 && other.hash.get() != 0 && self.hash.get() != other.hash.get() {
            return false;
        }
        let mut a_state = self.iter_state();
        let mut b_state = other.iter_state();
        (0..self.length).all(|i| a_state.get(i) == b_state.get(i))
    }

    pub fn starts_with(&self, prefix: &Text) -> bool {
        if self.length < prefix.length {
            return false;
        }
        let mut a = self.iter_state();
        let mut b = prefix.iter_state();
        (0..prefix.length).all(|i| a.get(i) == b.get(i))
    }

    pub fn ends_with(&self, suffix: &Text) -> bool {
        if self.length < suffix.length {
            return false;
        }
        let offset = self.length - suffix.length;
        let mut a = self.iter_state();
        let mut b = suffix.iter_state();
        (0..suffix.length).all(|i| a.get(offset + i) == b.get(i))
    }

    /// Concatenate, preserving NFG normalization at the boundary. When
    /// the junction is concat-stable this is a cheap rope operation;
    /// otherwise the 1-3 boundary graphemes are renormalized into a
    /// "glue" text.
    pub fn concat(&self, other: &Text) -> Text {
        if self.length == 0 {
            return other.clone();
        }
        if other.length == 0 {
            return self.clone();
        }
        if is_concat_stable(self, other) {
            return concat_assuming_safe(self, other);
        }

        let last_a = self.get_grapheme(self.length - 1);
        let first_b = other.get_grapheme(0);
        let mut junction: Vec<u32> = Vec::new();
        junction.extend_from_slice(&grapheme_codepoints(last_a));
        junction.extend_from_slice(&grapheme_codepoints(first_b));
        let glue = Text::from_u32(&junction, true);

        if self.length == 1 && other.length == 1 {
            glue
        } else if self.length == 1 {
            concat_assuming_safe(&glue, &other.slice(2, other.length))
        } else if other.length == 1 {
            concat_assuming_safe(&self.slice(1, self.length - 1), &glue)
        } else {
            concat_assuming_safe(
                &concat_assuming_safe(&self.slice(1, self.length - 1), &glue),
                &other.slice(2, other.length),
            )
        }
    }

    /// Concatenate many texts. Pairwise stability is checked between
    /// successive inputs; any unstable boundary splits the work so the
    /// result is never observably different from left-to-right binary
    /// concatenation.
    pub fn concat_many(items: &[Text]) -> Text {
        match items.len() {
            0 => return Text::empty(),
            1 => return items[0].clone(),
            2 => return items[0].concat(&items[1]),
            _ => {}
        }

        let mut children: Vec<Text> = Vec::new();
        let mut length = 0;
        for (i, item) in items.iter().enumerate() {
            if item.length == 0 {
                continue;
            }
            if i > 0 && !is_concat_stable(&items[i - 1], item) {
                // The stable-bulk builder hit an unstable boundary;
                // finish what we have and recurse on the rest.
                let done = Text::with_repr(
                    length,
                    Repr::Subtext { children: Array::from_vec(children) },
                );
                return done.concat(&Text::concat_many(&items[i..]));
            }
            match &item.repr {
                Repr::Subtext { children: cs } => children.extend(cs.iter().cloned()),
                _ => children.push(item.clone()),
            }
            length += item.length;
        }
        match children.len() {
            0 => Text::empty(),
            1 => children.pop().expect("one child"),
            _ => Text::with_repr(length, Repr::Subtext { children: Array::from_vec(children) }),
        }
    }

    /// All codepoints, expanding synthetic clusters.
    pub fn utf32_codepoints(&self) -> Array<u32> {
        let mut out: Array<u32> = Array::new();
        let mut state = self.iter_state();
        for i in 0..self.length {
            let g = state.get(i);
            if g < 0 {
                for c in grapheme_codepoints(g).iter() {
                    out.push(*c);
                }
            } else {
                out.push(g as u32);
            }
        }
        out
    }

    /// UTF-8 encoding of the whole text.
    pub fn utf8_bytes(&self) -> Array<u8> {
        Array::from_vec(self.to_string().into_bytes())
    }

    /// The Unicode character name of every codepoint, in order.
    /// Codepoints with no assigned name fall back to `U+XXXX`.
    pub fn codepoint_names(&self) -> Array<Text> {
        self.utf32_codepoints()
            .iter()
            .map(|&c| {
                let name = char::from_u32(c)
                    .and_then(unicode_names2::name)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("U+{c:04X}"));
                Text::from_str(&name)
            })
            .collect()
    }

    /// Each grapheme cluster as its own single-grapheme text.
    pub fn clusters(&self) -> Array<Text> {
        (1..=self.length).map(|i| self.slice(i, i)).collect()
    }

    pub fn from_codepoints(codepoints: &Array<u32>) -> Text {
        Text::from_u32(&codepoints.to_vec(), true)
    }

    /// Inverse of [`Text::codepoint_names`]; names that don't resolve
    /// are skipped.
    pub fn from_codepoint_names(names: &Array<Text>) -> Text {
        let codepoints: Vec<u32> = names
            .iter()
            .filter_map(|name| unicode_names2::character(&name.to_string()))
            .map(|c| c as u32)
            .collect();
        Text::from_u32(&codepoints, true)
    }

    /// Decode UTF-8 bytes; invalid UTF-8 yields the empty-text sentinel.
    pub fn from_bytes(bytes: &Array<u8>) -> Text {
        match String::from_utf8(bytes.to_vec()) {
            Ok(s) => Text::from_str(&s),
            Err(_) => Text::empty(),
        }
    }

    /// Split on `\n` and `\r\n`. An unterminated trailing non-empty
    /// line is included.
    pub fn lines(&self) -> Array<Text> {
        let mut lines: Array<Text> = Array::new();
        let mut state = self.iter_state();
        let mut line_start = 0i64;
        let mut i = 0i64;
        while i < self.length {
            let g = state.get(i);
            if g == '\r' as i32 && state.get(i + 1) == '\n' as i32 {
                lines.push(self.slice(line_start + 1, i));
                i += 2;
                line_start = i;
            } else if g == '\n' as i32 {
                lines.push(self.slice(line_start + 1, i));
                i += 1;
                line_start = i;
            } else {
                i += 1;
            }
        }
        if line_start < self.length {
            lines.push(self.slice(line_start + 1, self.length));
        }
        lines
    }

    pub fn join(glue: &Text, pieces: &Array<Text>) -> Text {
        let mut result = match pieces.first() {
            Some(first) => first.clone(),
            None => return Text::empty(),
        };
        for piece in pieces.iter().skip(1) {
            result = Text::concat_many(&[result, glue.clone(), piece.clone()]);
        }
        result
    }
}

/// Forward/backward grapheme access with O(amortized 1) sequential
/// cost: remembers which child of the rope the last index fell in and
/// the total length of the children before it.
pub struct TextIter<'a> {
    text: &'a Text,
    subtext: usize,
    sum_of_previous: i64,
}

impl<'a> TextIter<'a> {
    pub fn get(&mut self, index: i64) -> i32 {
        if index < 0 || index >= self.text.length {
            return 0;
        }
        let children = match &self.text.repr {
            Repr::Subtext { children } => children,
            _ => return self.text.get_grapheme(index),
        };
        while index < self.sum_of_previous && self.subtext > 0 {
            self.subtext -= 1;
            self.sum_of_previous -= children
                .get(self.subtext)
                .expect("iterator subtext in range")
                .length;
        }
        loop {
            let child = children.get(self.subtext).expect("index checked against length");
            if index < self.sum_of_previous + child.length {
                return child.get_grapheme(index - self.sum_of_previous);
            }
            self.sum_of_previous += child.length;
            self.subtext += 1;
        }
    }
}

/// Two texts are concat-stable when their grapheme-wise concatenation is
/// exactly the concatenation of their grapheme arrays, i.e. no
/// renormalization happens at the junction.
pub fn is_concat_stable(a: &Text, b: &Text) -> bool {
    if a.length == 0 || b.length == 0 {
        return true;
    }
    let last_a = a.get_grapheme(a.length - 1);
    let first_b = b.get_grapheme(0);

    // Synthetic clusters at the junction always require the slow path:
    if last_a < 0 || first_b < 0 {
        return false;
    }

    // No codepoints below U+0300 can trigger instability:
    const LOWEST_CODEPOINT_TO_CHECK: i32 = 0x300;
    if last_a < LOWEST_CODEPOINT_TO_CHECK && first_b < LOWEST_CODEPOINT_TO_CHECK {
        return true;
    }

    let (ca, cb) = match (char::from_u32(last_a as u32), char::from_u32(first_b as u32)) {
        (Some(ca), Some(cb)) => (ca, cb),
        _ => return false,
    };
    let normalized: String = [ca, cb].into_iter().nfc().collect();
    if normalized.chars().count() != 2 {
        return false;
    }
    // Still two codepoints; stable only if a grapheme break separates them:
    normalized.graphemes(true).count() == 2
}

fn concat_assuming_safe(a: &Text, b: &Text) -> Text {
    if a.length == 0 {
        return b.clone();
    }
    if b.length == 0 {
        return a.clone();
    }
    let children = match (&a.repr, &b.repr) {
        (Repr::Subtext { children: ca }, Repr::Subtext { children: cb }) => {
            ca.iter().chain(cb.iter()).cloned().collect()
        }
        (Repr::Subtext { children: ca }, _) => {
            ca.iter().cloned().chain(std::iter::once(b.clone())).collect()
        }
        (_, Repr::Subtext { children: cb }) => {
            std::iter::once(a.clone()).chain(cb.iter().cloned()).collect()
        }
        _ => vec![a.clone(), b.clone()],
    };
    Text::with_repr(a.length + b.length, Repr::Subtext { children: Array::from_vec(children) })
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::ShortAscii { bytes } => {
                let s = std::str::from_utf8(&bytes[..self.length as usize])
                    .expect("short ascii is valid UTF-8");
                f.write_str(s)
            }
            Repr::Ascii { buf, start } => {
                let s = std::str::from_utf8(&buf[*start..*start + self.length as usize])
                    .expect("ascii buffer is valid UTF-8");
                f.write_str(s)
            }
            Repr::ShortGraphemes { .. } | Repr::Graphemes { .. } => {
                for i in 0..self.length {
                    let g = self.get_grapheme(i);
                    if g >= 0 {
                        let c = char::from_u32(g as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
                        write!(f, "{c}")?;
                    } else {
                        f.write_str(&graphemes::synthetic(g).utf8)?;
                    }
                }
                Ok(())
            }
            Repr::Subtext { children } => {
                for child in children {
                    write!(f, "{child}")?;
                }
                Ok(())
            }
        }
    }
}

impl PartialEq for Text {
    fn eq(&self, other: &Text) -> bool {
        self.equal_values(other)
    }
}

impl Eq for Text {}

impl PartialOrd for Text {
    fn partial_cmp(&self, other: &Text) -> Option<std::cmp::Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Text {
    fn cmp(&self, other: &Text) -> std::cmp::Ordering {
        self.compare(other)
    }
}

impl std::hash::Hash for Text {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash());
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Text {
        Text::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_shapes() {
        let short = Text::from_str("hi");
        assert!(matches!(short.repr, Repr::ShortAscii { .. }));
        assert_eq!(short.len(), 2);

        let long = Text::from_str("hello, world");
        assert!(matches!(long.repr, Repr::Ascii { .. }));
        assert_eq!(long.len(), 12);
        assert_eq!(long.to_string(), "hello, world");
    }

    #[test]
    fn nfg_scenario() {
        // "e" + COMBINING VERTICAL LINE BELOW does not normalize to a
        // single codepoint, so it becomes one synthetic grapheme:
        let t = Text::from_str("e\u{0329}");
        assert_eq!(t.len(), 1);
        assert!(t.get_grapheme(0) < 0);
        assert_eq!(t.utf32_codepoints().to_vec(), vec![0x65, 0x0329]);
        let doubled = t.concat(&t);
        assert_eq!(doubled.len(), 2);
        assert_eq!(doubled.to_string(), "e\u{0329}e\u{0329}");
    }

    #[test]
    fn nfc_merges_at_construction() {
        // "e" + COMBINING ACUTE ACCENT normalizes to U+00E9:
        let t = Text::from_str("e\u{0301}");
        assert_eq!(t.len(), 1);
        assert_eq!(t.get_grapheme(0), 0xE9);
    }

    #[test]
    fn utf8_round_trip() {
        for s in ["", "plain", "café", "e\u{0329}xyz", "日本語テキスト"] {
            let t = Text::from_str(s);
            assert_eq!(Text::from_bytes(&t.utf8_bytes()), t, "{s:?}");
        }
    }

    #[test]
    fn codepoint_round_trip() {
        for s in ["plain", "café", "e\u{0329}"] {
            let t = Text::from_str(s);
            assert_eq!(Text::from_codepoints(&t.utf32_codepoints()), t, "{s:?}");
        }
    }

    #[test]
    fn invalid_utf8_is_empty_sentinel() {
        let bad = Array::from_vec(vec![0xffu8, 0xfe, 0x41]);
        assert!(Text::from_bytes(&bad).is_empty());
    }

    #[test]
    fn slicing() {
        let t = Text::from_str("hello, world");
        assert_eq!(t.slice(1, 5).to_string(), "hello");
        assert_eq!(t.slice(-5, -1).to_string(), "world");
        assert_eq!(t.slice(8, 100).to_string(), "world");
        assert!(t.slice(20, 25).is_empty());
        assert!(t.slice(5, 2).is_empty());
    }

    #[test]
    fn slicing_preserves_sharing() {
        let t = Text::from_str("a fairly long ascii text here");
        let s = t.slice(3, 8);
        match (&t.repr, &s.repr) {
            (Repr::Ascii { buf: a, .. }, Repr::Ascii { buf: b, start }) => {
                assert!(Arc::ptr_eq(a, b));
                assert_eq!(*start, 2);
            }
            other => panic!("expected shared ascii buffers, got {other:?}"),
        }
    }

    #[test]
    fn concat_stability() {
        let a = Text::from_str("abc");
        let b = Text::from_str("def");
        assert!(is_concat_stable(&a, &b));
        let joined = a.concat(&b);
        assert_eq!(joined.to_string(), "abcdef");
        assert_eq!(joined.len(), 6);

        // "e" then a lone combining mark is unstable at the junction:
        let e = Text::from_str("e");
        let mark = Text::from_u32(&[0x0301], false);
        assert!(!is_concat_stable(&e, &mark));
        let merged = e.concat(&mark);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.get_grapheme(0), 0xE9);
    }

    #[test]
    fn concat_matches_concat_many() {
        let pieces = [
            Text::from_str("one "),
            Text::from_str("two "),
            Text::from_str("three"),
            Text::from_str(""),
            Text::from_str("!"),
        ];
        let folded = pieces
            .iter()
            .fold(Text::empty(), |acc, t| acc.concat(t));
        let bulk = Text::concat_many(&pieces);
        assert_eq!(folded, bulk);
        assert_eq!(bulk.to_string(), "one two three!");
    }

    #[test]
    fn concat_rope_scenario() {
        // 1000 one-character leaves, left-folded:
        let mut t = Text::empty();
        for i in 0..1000 {
            let c = (b'a' + (i % 26) as u8) as char;
            t = t.concat(&Text::from_str(&c.to_string()));
        }
        assert_eq!(t.len(), 1000);
        assert_eq!(t.get_grapheme(500), (b'a' + (500 % 26) as u8) as i32);
        // The rope stays depth 1 with one child per leaf:
        assert!(t.num_subtexts() <= 1000);
        // Sequential access through the iterator agrees with indexing:
        let mut iter = t.iter_state();
        for i in 0..1000 {
            assert_eq!(iter.get(i), t.get_grapheme(i));
        }
        // And so does backward iteration:
        for i in (0..1000).rev() {
            assert_eq!(iter.get(i), t.get_grapheme(i));
        }
    }

    #[test]
    fn slices_of_stable_concat_recover_inputs() {
        let a = Text::from_str("stable ascii ");
        let b = Text::from_str("tail part");
        let joined = a.concat(&b);
        assert_eq!(joined.slice(1, a.len()), a);
        assert_eq!(joined.slice(a.len() + 1, a.len() + b.len()), b);
    }

    #[test]
    fn hash_agrees_across_shapes() {
        let flat = Text::from_str("hello, world");
        let pieced = Text::from_str("hello")
            .concat(&Text::from_str(", "))
            .concat(&Text::from_str("world"));
        assert_eq!(flat, pieced);
        assert_eq!(flat.hash(), pieced.hash());
        assert_ne!(flat.hash(), 0);
    }

    #[test]
    fn comparison() {
        use std::cmp::Ordering;
        assert_eq!(Text::from_str("abc").compare(&Text::from_str("abd")), Ordering::Less);
        assert_eq!(Text::from_str("abc").compare(&Text::from_str("abc")), Ordering::Equal);
        assert_eq!(Text::from_str("b").compare(&Text::from_str("a")), Ordering::Greater);
        assert_eq!(Text::from_str("ab").compare(&Text::from_str("abc")), Ordering::Less);
    }

    #[test]
    fn repeat_builds_ropes() {
        let t = Text::from_str("ab").repeat(3);
        assert_eq!(t.to_string(), "ababab");
        assert_eq!(t.len(), 6);
        assert!(Text::from_str("x").repeat(0).is_empty());
        assert!(Text::from_str("x").repeat(-2).is_empty());
    }

    #[test]
    #[should_panic(expected = "too big")]
    fn repeat_refuses_huge_results() {
        let _ = Text::from_str("abcdefgh").repeat(1 << 40);
    }

    #[test]
    fn lines_splitting() {
        let t = Text::from_str("one\ntwo\r\nthree");
        let lines: Vec<String> = t.lines().iter().map(|l| l.to_string()).collect();
        assert_eq!(lines, ["one", "two", "three"]);

        let terminated = Text::from_str("a\nb\n");
        let lines: Vec<String> = terminated.lines().iter().map(|l| l.to_string()).collect();
        assert_eq!(lines, ["a", "b"]);

        let single = Text::from_str("a\nb");
        let lines: Vec<String> = single.lines().iter().map(|l| l.to_string()).collect();
        assert_eq!(lines, ["a", "b"]);
    }

    #[test]
    fn join_with_glue() {
        let pieces: Array<Text> = ["a", "b", "c"].iter().map(|s| Text::from_str(s)).collect();
        assert_eq!(Text::join(&Text::from_str(", "), &pieces).to_string(), "a, b, c");
        assert!(Text::join(&Text::from_str(","), &Array::new()).is_empty());
    }

    #[test]
    fn prefix_and_suffix() {
        let t = Text::from_str("hello, world");
        assert!(t.starts_with(&Text::from_str("hello")));
        assert!(!t.starts_with(&Text::from_str("world")));
        assert!(t.ends_with(&Text::from_str("world")));
        assert!(!t.ends_with(&Text::from_str("hello")));
        assert!(t.starts_with(&Text::empty()));
    }

    #[test]
    fn codepoint_names_round_trip() {
        let t = Text::from_str("A!");
        let names: Vec<String> = t.codepoint_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names[0], "LATIN CAPITAL LETTER A");
        assert_eq!(names[1], "EXCLAMATION MARK");
        assert_eq!(Text::from_codepoint_names(&t.codepoint_names()), t);
    }

    #[test]
    fn clusters_of_mixed_text() {
        let t = Text::from_str("ae\u{0329}z");
        let clusters: Vec<String> = t.clusters().iter().map(|c| c.to_string()).collect();
        assert_eq!(clusters, ["a", "e\u{0329}", "z"]);
    }
}
