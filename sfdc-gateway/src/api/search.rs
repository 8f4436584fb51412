//! SOSL search pattern construction
//!
//! The duplicate matcher issues several independent full-text searches per
//! term. Each strategy decorates the escaped term differently; the statement
//! shape is always `FIND {term} IN ALL FIELDS RETURNING Entity(fields) LIMIT n`.

/// Characters SOSL reserves inside a FIND clause.
const SOSL_RESERVED: &[char] = &[
    '?', '&', '|', '!', '{', '}', '[', ']', '(', ')', '^', '~', '*', ':', '\\', '"', '\'', '+', '-',
];

/// Backslash-escape every reserved SOSL character in a raw term.
pub fn escape_sosl_term(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if SOSL_RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// How a search pattern decorates the term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchStrategy {
    /// `term` as-is
    Exact,
    /// `term*`
    Prefix,
    /// `*term*`
    Substring,
    /// `term~` (native fuzzy; not every org supports it)
    Fuzzy,
    /// Exact search over the normalized form of the term
    Normalized,
}

impl SearchStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Prefix => "prefix",
            Self::Substring => "substring",
            Self::Fuzzy => "fuzzy",
            Self::Normalized => "normalized",
        }
    }
}

/// One ready-to-send SOSL statement plus the strategy that produced it.
#[derive(Debug, Clone)]
pub struct SearchPattern {
    pub strategy: SearchStrategy,
    pub statement: String,
}

impl SearchPattern {
    /// Build the statement for `strategy` over an already-escaped term.
    pub fn build(
        strategy: SearchStrategy,
        escaped_term: &str,
        sobject: &str,
        fields: &[&str],
        limit: usize,
    ) -> Self {
        let decorated = match strategy {
            SearchStrategy::Exact | SearchStrategy::Normalized => escaped_term.to_string(),
            SearchStrategy::Prefix => format!("{escaped_term}*"),
            SearchStrategy::Substring => format!("*{escaped_term}*"),
            SearchStrategy::Fuzzy => format!("{escaped_term}~"),
        };
        let field_list = fields.join(",");
        let statement = format!(
            "FIND {{{decorated}}} IN ALL FIELDS RETURNING {sobject}({field_list}) LIMIT {limit}"
        );
        Self {
            strategy,
            statement,
        }
    }
}
