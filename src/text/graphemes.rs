//! The process-wide synthetic grapheme interner.
//!
//! Grapheme clusters of more than one codepoint get a dense negative
//! 32-bit ID (-1, -2, ...) the first time they are seen. An interned
//! entry records the cluster's codepoints, its UTF-8 encoding, and its
//! "main" codepoint (the first codepoint that is not a prepended
//! concatenation mark), and is never moved or freed afterwards, so an ID
//! stays valid for the process lifetime.
//!
//! All writes go through one mutex; a one-entry cache short-circuits the
//! common case of the same cluster being interned repeatedly.

use std::sync::{Arc, Mutex, OnceLock};

use crate::hashing::Table;

/// One interned multi-codepoint cluster.
#[derive(Clone, Debug)]
pub struct SyntheticGrapheme {
    pub codepoints: Arc<[u32]>,
    pub utf8: Arc<str>,
    pub main_codepoint: u32,
}

struct Interner {
    entries: Vec<SyntheticGrapheme>,
    ids_by_cluster: Table<Box<[u32]>, i32>,
    // Hot-path cache for the most recently interned cluster:
    last: Option<(Box<[u32]>, i32)>,
}

fn interner() -> &'static Mutex<Interner> {
    static INTERNER: OnceLock<Mutex<Interner>> = OnceLock::new();
    INTERNER.get_or_init(|| {
        Mutex::new(Interner {
            entries: Vec::new(),
            ids_by_cluster: Table::new(),
            last: None,
        })
    })
}

// Unicode Prepended_Concatenation_Mark (PropList.txt): these may start a
// cluster without being its main codepoint.
fn is_prepended_concatenation_mark(c: u32) -> bool {
    matches!(
        c,
        0x0600..=0x0605 | 0x06DD | 0x070F | 0x0890..=0x0891 | 0x08E2 | 0x110BD | 0x110CD
    )
}

/// Intern a multi-codepoint cluster and return its negative ID.
pub fn intern(cluster: &[u32]) -> i32 {
    debug_assert!(cluster.len() > 1, "single codepoints are their own graphemes");
    let mut interner = interner().lock().expect("grapheme interner lock poisoned");

    if let Some((last_cluster, last_id)) = &interner.last {
        if last_cluster.as_ref() == cluster {
            return *last_id;
        }
    }

    let boxed: Box<[u32]> = cluster.into();
    if let Some(id) = interner.ids_by_cluster.get(&boxed) {
        return *id;
    }

    let id = -(interner.entries.len() as i32 + 1);
    let utf8: String = cluster
        .iter()
        .map(|&c| char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    let main_codepoint = cluster
        .iter()
        .copied()
        .find(|&c| !is_prepended_concatenation_mark(c))
        .unwrap_or(cluster[0]);

    interner.entries.push(SyntheticGrapheme {
        codepoints: cluster.into(),
        utf8: utf8.into(),
        main_codepoint,
    });
    interner.ids_by_cluster.set(boxed.clone(), id);
    interner.last = Some((boxed, id));
    id
}

/// Look up an interned cluster by its negative ID.
pub fn synthetic(id: i32) -> SyntheticGrapheme {
    assert!(id < 0, "only negative grapheme codes are synthetic");
    let interner = interner().lock().expect("grapheme interner lock poisoned");
    interner.entries[(-id - 1) as usize].clone()
}

/// The number of synthetic graphemes interned so far.
pub fn num_synthetic_graphemes() -> usize {
    interner().lock().expect("grapheme interner lock poisoned").entries.len()
}

/// The codepoints of any grapheme code: a positive code is itself, a
/// negative one expands to its cluster.
pub fn grapheme_codepoints(g: i32) -> Arc<[u32]> {
    if g >= 0 {
        Arc::from(vec![g as u32])
    } else {
        synthetic(g).codepoints
    }
}

/// The "main" codepoint of a grapheme code, used for case mapping and
/// fast-path comparisons.
pub fn main_grapheme_codepoint(g: i32) -> u32 {
    if g >= 0 {
        g as u32
    } else {
        synthetic(g).main_codepoint
    }
}
