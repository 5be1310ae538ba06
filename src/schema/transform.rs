//! Text transforms applied by logical fields
//!
//! A transform takes the current term list and produces the next one;
//! most are one-to-one, `Split` fans a term out into name tokens.

use serde::{Deserialize, Serialize};

/// Surname particles that stay glued to the token that follows them when
/// splitting a name, so "DE LA CRUZ" yields "DE LA CRUZ" rather than
/// three terms.
const NAME_PREFIXES: &[&str] = &[
    "DE", "DEL", "LO", "MC", "MAC", "ST", "DU", "VAN", "SAINT", "D'", "L'", "O'", "LE", "LA",
    "VON", "O", "DI", "LI",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "fn", rename_all = "snake_case")]
pub enum Transform {
    /// Uppercase each term.
    Upcase,
    /// Trim surrounding whitespace from each term.
    Trim,
    /// Keep the character range `[begin, end)` of each term; out-of-range
    /// bounds clamp to the term length.
    Substr { begin: usize, end: usize },
    /// Truncate each term at the first occurrence of `sep`.
    KillAfter { sep: String },
    /// Split each term into whitespace/hyphen-separated name tokens,
    /// keeping recognised prefixes attached to the following token.
    Split,
}

impl Transform {
    pub fn apply(&self, input: Vec<String>) -> Vec<String> {
        match self {
            Transform::Upcase => input.into_iter().map(|t| t.to_uppercase()).collect(),
            Transform::Trim => input.into_iter().map(|t| t.trim().to_string()).collect(),
            Transform::Substr { begin, end } => input
                .into_iter()
                .map(|t| substr(&t, *begin, *end))
                .collect(),
            Transform::KillAfter { sep } => input
                .into_iter()
                .map(|t| kill_after(&t, sep))
                .collect(),
            Transform::Split => input.iter().flat_map(|t| split_name(t)).collect(),
        }
    }
}

fn substr(term: &str, begin: usize, end: usize) -> String {
    if begin >= end {
        return String::new();
    }
    term.chars().skip(begin).take(end - begin).collect()
}

fn kill_after(term: &str, sep: &str) -> String {
    match term.find(sep) {
        Some(i) => term[..i].to_string(),
        None => term.to_string(),
    }
}

/// Split a name on whitespace and hyphens, joining each run of recognised
/// prefixes with the token that ends it.
fn split_name(name: &str) -> Vec<String> {
    let normalized = name.trim().replace('-', " ");
    let tokens: Vec<&str> = normalized.split_whitespace().collect();

    let mut out = Vec::new();
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if !NAME_PREFIXES.contains(token) {
            out.push(tokens[start..=i].join(" "));
            start = i + 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upcase_and_trim() {
        let terms = Transform::Upcase.apply(vec!["  smith ".into()]);
        assert_eq!(terms, vec!["  SMITH "]);
        let terms = Transform::Trim.apply(terms);
        assert_eq!(terms, vec!["SMITH"]);
    }

    #[test]
    fn substr_clamps_out_of_range() {
        let t = Transform::Substr { begin: 0, end: 4 };
        assert_eq!(t.apply(vec!["JOHNSON".into()]), vec!["JOHN"]);
        assert_eq!(t.apply(vec!["JO".into()]), vec!["JO"]);
        let t = Transform::Substr { begin: 5, end: 3 };
        assert_eq!(t.apply(vec!["JOHNSON".into()]), vec![""]);
    }

    #[test]
    fn kill_after_truncates_at_separator() {
        let t = Transform::KillAfter { sep: " JR".into() };
        assert_eq!(t.apply(vec!["SMITH JR".into()]), vec!["SMITH"]);
        assert_eq!(t.apply(vec!["SMITH".into()]), vec!["SMITH"]);
    }

    #[test]
    fn split_keeps_prefixes_attached() {
        assert_eq!(
            Transform::Split.apply(vec!["DE LA CRUZ".into()]),
            vec!["DE LA CRUZ"]
        );
        assert_eq!(
            Transform::Split.apply(vec!["MARY ANNE SMITH-JONES".into()]),
            vec!["MARY", "ANNE", "SMITH", "JONES"]
        );
        assert_eq!(
            Transform::Split.apply(vec!["VAN DYKE".into()]),
            vec!["VAN DYKE"]
        );
    }

    #[test]
    fn split_drops_trailing_unterminated_prefix() {
        // A prefix with nothing after it never closes a token run.
        assert_eq!(Transform::Split.apply(vec!["VAN".into()]), Vec::<String>::new());
    }

    #[test]
    fn transform_serde_tag_round_trip() {
        let t: Transform = serde_json::from_str(r#"{"fn":"substr","begin":0,"end":4}"#).unwrap();
        assert_eq!(t, Transform::Substr { begin: 0, end: 4 });
        let t: Transform = serde_json::from_str(r#"{"fn":"upcase"}"#).unwrap();
        assert_eq!(t, Transform::Upcase);
    }
}
