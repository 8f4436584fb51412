//! Fuzzy matching services
//!
//! Text normalization, string similarity scoring and the duplicate search
//! that combines them. Normalizer and similarity functions are pure; only the
//! duplicate matcher talks to the remote service.

pub mod duplicate;
pub mod normalize;
pub mod similarity;

pub use duplicate::{
    ConfidenceThresholds, ConfidenceTier, DuplicateMatcher, DuplicateSearchConfig, MatchResult,
};
pub use normalize::{
    NormalizeOptions, normalize, normalize_company_name, normalize_email, normalize_for_search,
    normalize_person_name,
};
pub use similarity::{
    SimilarityScore, SimilarityWeights, composite_similarity, jaro_winkler,
    levenshtein_similarity, phonetic_similarity, soundex, trigram_similarity,
};
