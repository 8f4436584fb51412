//! String similarity engine
//!
//! Four independent measures plus a weighted composite. All scores live in
//! [0.0, 1.0] and all comparisons are case-insensitive. Callers get every
//! sub-score, not just the blend, so match diagnostics can say which
//! algorithm fired.

use serde::{Deserialize, Serialize};

/// Weights for the composite blend. Defaults follow the tuned production
/// values; override per call to retune a deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimilarityWeights {
    pub edit_distance: f64,
    pub prefix_weighted: f64,
    pub ngram: f64,
    pub phonetic: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            edit_distance: 0.3,
            prefix_weighted: 0.4,
            ngram: 0.2,
            phonetic: 0.1,
        }
    }
}

/// Which algorithm produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimilarityAlgorithm {
    EditDistance,
    PrefixWeighted,
    Ngram,
    Phonetic,
}

/// All sub-scores plus the weighted composite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimilarityScore {
    pub edit_distance: f64,
    pub prefix_weighted: f64,
    pub ngram: f64,
    pub phonetic: f64,
    pub composite: f64,
    /// Algorithm with the highest individual score, for diagnostics
    pub best_algorithm: SimilarityAlgorithm,
}

/// Edit-distance similarity: `1 - distance / max(len)`, unit-cost
/// insert/delete/substitute.
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    // Two-row DP over the shorter string.
    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let mut prev: Vec<usize> = (0..=shorter.len()).collect();
    let mut curr = vec![0usize; shorter.len() + 1];
    for (i, lc) in longer.iter().enumerate() {
        curr[0] = i + 1;
        for (j, sc) in shorter.iter().enumerate() {
            let cost = if lc == sc { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let distance = prev[shorter.len()];
    1.0 - distance as f64 / longer.len() as f64
}

/// Jaro similarity with the Winkler prefix boost (0.1 per matching leading
/// character, up to 4).
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let window = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut a_matched = vec![false; a.len()];
    let mut b_matched = vec![false; b.len()];
    let mut matches = 0usize;

    for (i, ca) in a.iter().enumerate() {
        let lo = i.saturating_sub(window);
        let hi = (i + window + 1).min(b.len());
        for j in lo..hi {
            if !b_matched[j] && b[j] == *ca {
                a_matched[i] = true;
                b_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }

    if matches == 0 {
        return 0.0;
    }

    let mut transpositions = 0usize;
    let mut j = 0usize;
    for (i, matched) in a_matched.iter().enumerate() {
        if !matched {
            continue;
        }
        while !b_matched[j] {
            j += 1;
        }
        if a[i] != b[j] {
            transpositions += 1;
        }
        j += 1;
    }
    let transpositions = transpositions as f64 / 2.0;

    let m = matches as f64;
    let jaro = (m / a.len() as f64 + m / b.len() as f64 + (m - transpositions) / m) / 3.0;

    let prefix = a
        .iter()
        .zip(b.iter())
        .take(4)
        .take_while(|(x, y)| x == y)
        .count() as f64;
    jaro + prefix * 0.1 * (1.0 - jaro)
}

/// Trigram Dice coefficient over boundary-padded 3-character windows.
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;

    fn trigrams(s: &str) -> HashSet<Vec<char>> {
        let padded: Vec<char> = format!("##{}##", s.to_lowercase()).chars().collect();
        padded.windows(3).map(|w| w.to_vec()).collect()
    }

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let ta = trigrams(a);
    let tb = trigrams(b);
    let intersection = ta.intersection(&tb).count();
    2.0 * intersection as f64 / (ta.len() + tb.len()) as f64
}

fn soundex_class(c: char) -> u8 {
    match c {
        'b' | 'f' | 'p' | 'v' => 1,
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => 2,
        'd' | 't' => 3,
        'l' => 4,
        'm' | 'n' => 5,
        'r' => 6,
        // vowels, h, w, y
        _ => 0,
    }
}

/// Fixed-length 4-character phonetic code: first letter preserved,
/// consonant-class digits after it, adjacent duplicate classes collapsed,
/// zero classes skipped, right-padded with zeros. `""` for input with no
/// letters.
pub fn soundex(s: &str) -> String {
    let letters: Vec<char> = s
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();
    let Some(&first) = letters.first() else {
        return String::new();
    };

    let mut code = String::with_capacity(4);
    code.push(first.to_ascii_uppercase());
    let mut prev_class = soundex_class(first);
    for &c in &letters[1..] {
        let class = soundex_class(c);
        if class != 0 && class != prev_class {
            code.push((b'0' + class) as char);
            if code.len() == 4 {
                break;
            }
        }
        prev_class = class;
    }
    while code.len() < 4 {
        code.push('0');
    }
    code
}

/// Binary phonetic similarity: codes equal or not.
pub fn phonetic_similarity(a: &str, b: &str) -> f64 {
    let ca = soundex(a);
    let cb = soundex(b);
    if !ca.is_empty() && ca == cb { 1.0 } else { 0.0 }
}

/// Weighted blend of all four measures, normalized by the weight sum so that
/// custom weights keep the score in [0, 1].
pub fn composite_similarity(a: &str, b: &str, weights: &SimilarityWeights) -> SimilarityScore {
    let edit_distance = levenshtein_similarity(a, b);
    let prefix_weighted = jaro_winkler(a, b);
    let ngram = trigram_similarity(a, b);
    let phonetic = phonetic_similarity(a, b);

    let weight_sum =
        weights.edit_distance + weights.prefix_weighted + weights.ngram + weights.phonetic;
    let composite = if weight_sum > 0.0 {
        (edit_distance * weights.edit_distance
            + prefix_weighted * weights.prefix_weighted
            + ngram * weights.ngram
            + phonetic * weights.phonetic)
            / weight_sum
    } else {
        0.0
    };

    let scored = [
        (SimilarityAlgorithm::EditDistance, edit_distance),
        (SimilarityAlgorithm::PrefixWeighted, prefix_weighted),
        (SimilarityAlgorithm::Ngram, ngram),
        (SimilarityAlgorithm::Phonetic, phonetic),
    ];
    let best_algorithm = scored
        .iter()
        .max_by(|x, y| x.1.total_cmp(&y.1))
        .map(|(alg, _)| *alg)
        .unwrap_or(SimilarityAlgorithm::EditDistance);

    SimilarityScore {
        edit_distance,
        prefix_weighted,
        ngram,
        phonetic,
        composite: composite.clamp(0.0, 1.0),
        best_algorithm,
    }
}
