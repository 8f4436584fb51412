//! Text normalization for matching
//!
//! Canonicalizes strings before similarity scoring so that "Café S.A." and
//! "Cafe SA" compare equal. Pure functions, no I/O. Pipeline order matters:
//! diacritic folding, lowercasing, business-suffix canonicalization,
//! optional special-character stripping, whitespace cleanup.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Fixed diacritic substitution table. Covers the Latin-extended, Slavic,
/// Turkish and Icelandic ranges seen in CRM name data.
static DIACRITICS: Lazy<HashMap<char, &'static str>> = Lazy::new(|| {
    let pairs: &[(&str, &str)] = &[
        ("àáâãäåāăą", "a"),
        ("ÀÁÂÃÄÅĀĂĄ", "a"),
        ("èéêëēĕėęě", "e"),
        ("ÈÉÊËĒĔĖĘĚ", "e"),
        ("ìíîïĩīĭįı", "i"),
        ("ÌÍÎÏĨĪĬĮİ", "i"),
        ("òóôõöøōŏő", "o"),
        ("ÒÓÔÕÖØŌŎŐ", "o"),
        ("ùúûüũūŭůűų", "u"),
        ("ÙÚÛÜŨŪŬŮŰŲ", "u"),
        ("ýÿŷ", "y"),
        ("ÝŸŶ", "y"),
        ("ñńņňŉ", "n"),
        ("ÑŃŅŇ", "n"),
        ("çćĉċč", "c"),
        ("ÇĆĈĊČ", "c"),
        ("śŝşš", "s"),
        ("ŚŜŞŠ", "s"),
        ("źżž", "z"),
        ("ŹŻŽ", "z"),
        ("ğĝġģ", "g"),
        ("ĞĜĠĢ", "g"),
        ("ĺļľŀł", "l"),
        ("ĹĻĽĿŁ", "l"),
        ("ŕŗř", "r"),
        ("ŔŖŘ", "r"),
        ("ţťŧ", "t"),
        ("ŢŤŦ", "t"),
        ("ďđ", "d"),
        ("ĎĐÐ", "d"),
        ("ð", "d"),
    ];
    let mut map = HashMap::new();
    for (chars, replacement) in pairs {
        for c in chars.chars() {
            map.insert(c, *replacement);
        }
    }
    map.insert('ß', "ss");
    map.insert('þ', "th");
    map.insert('Þ', "th");
    map.insert('æ', "ae");
    map.insert('Æ', "ae");
    map.insert('œ', "oe");
    map.insert('Œ', "oe");
    map
});

/// Legal-entity suffixes mapped to short canonical tokens. Keys are
/// lowercase, diacritic-folded, period-free; multi-word entries are matched
/// longest-first. Canonical tokens map to themselves so normalization is
/// idempotent.
static BUSINESS_SUFFIXES: Lazy<Vec<(Vec<&'static str>, &'static str)>> = Lazy::new(|| {
    let raw: &[(&str, &str)] = &[
        ("gesellschaft mit beschrankter haftung", "gmbh"),
        ("sociedad anonima", "sa"),
        ("societe anonyme", "sa"),
        ("societa per azioni", "spa"),
        ("public limited company", "plc"),
        ("limited liability company", "llc"),
        ("limited liability partnership", "llp"),
        ("pty ltd", "pty"),
        ("aktiengesellschaft", "ag"),
        ("aktiebolag", "ab"),
        ("corporation", "corp"),
        ("incorporated", "inc"),
        ("kabushiki kaisha", "kk"),
        ("limited", "ltd"),
        ("company", "co"),
        ("corp", "corp"),
        ("inc", "inc"),
        ("ltd", "ltd"),
        ("co", "co"),
        ("gmbh", "gmbh"),
        ("ag", "ag"),
        ("sa", "sa"),
        ("spa", "spa"),
        ("plc", "plc"),
        ("llc", "llc"),
        ("llp", "llp"),
        ("pty", "pty"),
        ("bv", "bv"),
        ("nv", "nv"),
        ("sarl", "sarl"),
        ("srl", "srl"),
        ("oy", "oy"),
        ("ab", "ab"),
        ("kk", "kk"),
    ];
    let mut entries: Vec<(Vec<&'static str>, &'static str)> = raw
        .iter()
        .map(|(suffix, canonical)| (suffix.split(' ').collect(), *canonical))
        .collect();
    // Longest match first: more tokens wins, then longer total text.
    entries.sort_by(|a, b| {
        b.0.len()
            .cmp(&a.0.len())
            .then_with(|| b.0.join(" ").len().cmp(&a.0.join(" ").len()))
    });
    entries
});

/// Normalization pipeline switches. Diacritic folding and lowercasing always
/// run; the rest are per-field-kind choices.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Canonicalize legal-entity suffixes (company names only)
    pub canonicalize_suffixes: bool,
    /// Drop everything but alphanumerics and spaces
    pub strip_special: bool,
    /// Keep `@` when stripping (emails)
    pub preserve_at: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            canonicalize_suffixes: false,
            strip_special: true,
            preserve_at: false,
        }
    }
}

fn fold_diacritics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match DIACRITICS.get(&c) {
            Some(replacement) => out.push_str(replacement),
            None => out.push(c),
        }
    }
    out
}

/// Token comparison key: periods and commas removed so "S.A." matches "sa".
fn suffix_key(token: &str) -> String {
    token.chars().filter(|c| *c != '.' && *c != ',').collect()
}

fn canonicalize_suffixes(text: &str) -> String {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let keys: Vec<String> = tokens.iter().map(|t| suffix_key(t)).collect();
    let mut out: Vec<&str> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    'outer: while i < tokens.len() {
        for (suffix_tokens, canonical) in BUSINESS_SUFFIXES.iter() {
            let n = suffix_tokens.len();
            if i + n <= tokens.len()
                && keys[i..i + n]
                    .iter()
                    .zip(suffix_tokens.iter())
                    .all(|(key, suffix)| key == suffix)
            {
                out.push(canonical);
                i += n;
                continue 'outer;
            }
        }
        out.push(tokens[i]);
        i += 1;
    }
    out.join(" ")
}

fn strip_special(text: &str, preserve_at: bool) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || (preserve_at && c == '@') {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Run the full pipeline. `""` maps to `""`; output is stable under repeated
/// application.
pub fn normalize(text: &str, options: &NormalizeOptions) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut current = fold_diacritics(text).to_lowercase();

    if options.canonicalize_suffixes {
        current = canonicalize_suffixes(&current);
    }

    if options.strip_special {
        current = strip_special(&current, options.preserve_at);
    }

    let collapsed = current.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches('.').trim().to_string()
}

/// Email normalization: keep `@`, never touch suffixes.
pub fn normalize_email(text: &str) -> String {
    normalize(
        text,
        &NormalizeOptions {
            canonicalize_suffixes: false,
            strip_special: true,
            preserve_at: true,
        },
    )
}

/// Company names: full pipeline including suffix canonicalization.
pub fn normalize_company_name(text: &str) -> String {
    normalize(
        text,
        &NormalizeOptions {
            canonicalize_suffixes: true,
            strip_special: true,
            preserve_at: false,
        },
    )
}

/// Person names: fold and strip, but "Ltd" in a surname stays alone.
pub fn normalize_person_name(text: &str) -> String {
    normalize(text, &NormalizeOptions::default())
}

/// Aggressive variant used to widen search recall.
pub fn normalize_for_search(text: &str) -> String {
    normalize(
        text,
        &NormalizeOptions {
            canonicalize_suffixes: true,
            strip_special: true,
            preserve_at: false,
        },
    )
}
