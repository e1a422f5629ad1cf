//! Query classifier
//!
//! Decides which agents answer a query:
//! - Extraction: company names, ticker aliases and corpus filenames found in the text
//! - Intent: whether the query is financial, given what was extracted
//! - Selection: a fixed decision table from (is_financial, tickers present) to agents
//!
//! Everything here is synchronous and free of I/O.

use crate::error::RouterError;
use crate::lexicon::Lexicon;
use crate::models::{AgentKind, AgentOrdering, AgentPlan};
use crate::Result;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::warn;

/// A query reduced to at most this many characters once its entities are
/// removed counts as "just a company or ticker", hence financial.
/// Tunable, but changing it changes classification outcomes.
pub const ENTITY_ONLY_REMAINDER_CHARS: usize = 2;

/// Whole-word, case-sensitive pattern for an already-lowercased needle
fn word_pattern(needle: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!(r"\b{}\b", regex::escape(needle)))
}

/// Whole-word match, falling back to substring containment when the
/// pattern cannot be built.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    match word_pattern(needle) {
        Ok(pattern) => pattern.is_match(haystack),
        Err(_) => haystack.contains(needle),
    }
}

fn remove_word(haystack: &str, needle: &str) -> Result<String> {
    if needle.is_empty() {
        return Ok(haystack.to_string());
    }
    let pattern = word_pattern(needle).map_err(|e| {
        RouterError::Classification(format!("cannot build pattern for '{}': {}", needle, e))
    })?;
    Ok(pattern.replace_all(haystack, "").trim().to_string())
}

/// Company names mentioned in `query`.
///
/// Matches lexicon names, lexicon tickers (reported as their canonical
/// company) and corpus company identifiers, all as whole words.
pub fn extract_companies(
    query: &str,
    lexicon: &Lexicon,
    document_names: &[String],
) -> BTreeSet<String> {
    let mut companies = BTreeSet::new();
    if query.is_empty() {
        return companies;
    }

    let query_lower = query.to_lowercase();

    for name in lexicon.companies() {
        if contains_word(&query_lower, name) {
            companies.insert(name.to_string());
        }
    }

    for (alias, company) in lexicon.ticker_aliases() {
        if contains_word(&query_lower, &alias) {
            companies.insert(company.to_string());
        }
    }

    for document_company in document_names {
        let document_company = document_company.to_lowercase();
        if contains_word(&query_lower, &document_company) {
            companies.insert(document_company);
        }
    }

    companies
}

/// Tickers for the given companies; unknown names are skipped.
pub fn map_to_tickers<S: AsRef<str>>(companies: &[S], lexicon: &Lexicon) -> BTreeSet<String> {
    companies
        .iter()
        .filter_map(|company| lexicon.ticker_for(company.as_ref()))
        .map(str::to_string)
        .collect()
}

/// Two-step financial intent check.
///
/// With entities: strip them and look at what is left. Nothing meaningful
/// left means the query was just a name; otherwise the remainder must carry
/// a financial keyword ("apple pie" is not financial).
/// Without entities: plain keyword scan of the whole query.
pub fn is_financial_query<C, T>(
    query: &str,
    companies: &[C],
    tickers: &[T],
    lexicon: &Lexicon,
) -> Result<bool>
where
    C: AsRef<str>,
    T: AsRef<str>,
{
    let query_lower = query.to_lowercase().trim().to_string();
    let has_keyword = |text: &str| {
        lexicon
            .financial_keywords()
            .iter()
            .any(|keyword| text.contains(keyword.as_str()))
    };

    if companies.is_empty() && tickers.is_empty() {
        return Ok(has_keyword(&query_lower));
    }

    let mut remaining = query_lower;
    for company in companies {
        remaining = remove_word(&remaining, &company.as_ref().to_lowercase())?;
    }
    for ticker in tickers {
        remaining = remove_word(&remaining, &ticker.as_ref().to_lowercase())?;
    }

    if remaining.trim().chars().count() <= ENTITY_ONLY_REMAINDER_CHARS {
        return Ok(true);
    }

    Ok(has_keyword(&remaining))
}

/// Decision table. Pure in its three inputs.
pub fn select_agents(is_financial: bool, has_tickers: bool, ordering: AgentOrdering) -> AgentPlan {
    use AgentKind::*;

    let agents = match (is_financial, has_tickers, ordering) {
        (false, _, _) => vec![General],
        (true, true, AgentOrdering::FinanceFirst) => vec![Finance, Yahoo, Sec, Reddit],
        (true, true, AgentOrdering::RedditFirst) => vec![Reddit, Finance, Yahoo, Sec],
        (true, false, AgentOrdering::FinanceFirst) => vec![Finance, Reddit],
        (true, false, AgentOrdering::RedditFirst) => vec![Reddit, Finance],
    };

    AgentPlan::new(agents)
}

/// Classify and select. Never fails: a classification error yields the
/// fallback plan.
pub fn determine_agents<C, T>(
    query: &str,
    companies: &[C],
    tickers: &[T],
    ordering: AgentOrdering,
    lexicon: &Lexicon,
) -> AgentPlan
where
    C: AsRef<str>,
    T: AsRef<str>,
{
    match is_financial_query(query, companies, tickers, lexicon) {
        Ok(is_financial) => select_agents(is_financial, !tickers.is_empty(), ordering),
        Err(e) => {
            warn!(error = %e, "Classification failed, using fallback agent plan");
            AgentPlan::fallback(ordering)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: &[&str] = &[];

    fn extract(query: &str) -> Vec<String> {
        extract_companies(query, &Lexicon::default(), &[])
            .into_iter()
            .collect()
    }

    #[test]
    fn test_extracts_whole_word_company_names() {
        assert_eq!(extract("What about APPLE?"), vec!["apple"]);
        assert_eq!(extract("apple pie"), vec!["apple"]);
        assert_eq!(
            extract("Compare Apple and Microsoft stocks"),
            vec!["apple", "microsoft"]
        );
        // substring inside another word is not a match
        assert!(extract("pineapples are great").is_empty());
        assert!(extract("metadata formats").is_empty());
    }

    #[test]
    fn test_ticker_alias_maps_to_canonical_company() {
        assert_eq!(extract("how is msft doing"), vec!["microsoft"]);
        assert_eq!(extract("GOOGL earnings"), vec!["google"]);
    }

    #[test]
    fn test_empty_query_extracts_nothing() {
        assert!(extract("").is_empty());
    }

    #[test]
    fn test_corpus_names_are_matched() {
        let docs = vec!["berkshire".to_string(), "c++".to_string()];
        let found = extract_companies("Berkshire annual report", &Lexicon::default(), &docs);
        assert!(found.contains("berkshire"));

        // regex metacharacters in a name must not panic
        let found = extract_companies("anything about c++ here", &Lexicon::default(), &docs);
        assert!(!found.contains("berkshire"));
    }

    #[test]
    fn test_map_to_tickers_dedupes_and_skips_unknown() {
        let lexicon = Lexicon::default();
        let tickers = map_to_tickers(&["google", "Alphabet", "berkshire"], &lexicon);
        assert_eq!(tickers.into_iter().collect::<Vec<_>>(), vec!["GOOGL"]);
        assert!(map_to_tickers(NONE, &lexicon).is_empty());
    }

    #[test]
    fn test_entity_only_query_is_financial() {
        let lexicon = Lexicon::default();
        assert!(is_financial_query("apple", &["apple"], &["AAPL"], &lexicon).unwrap());
        assert!(is_financial_query("AAPL?", &["apple"], &["AAPL"], &lexicon).unwrap());
    }

    #[test]
    fn test_entity_with_non_financial_context_is_not_financial() {
        let lexicon = Lexicon::default();
        assert!(!is_financial_query("apple pie", &["apple"], NONE, &lexicon).unwrap());
        assert!(!is_financial_query("apple pie recipe", &["apple"], &["AAPL"], &lexicon).unwrap());
    }

    #[test]
    fn test_entity_with_financial_context_is_financial() {
        let lexicon = Lexicon::default();
        assert!(is_financial_query(
            "Compare Apple and Microsoft stocks",
            &["apple", "microsoft"],
            &["AAPL", "MSFT"],
            &lexicon
        )
        .unwrap());
    }

    #[test]
    fn test_keyword_scan_without_entities() {
        let lexicon = Lexicon::default();
        assert!(!is_financial_query("tell me about the weather", NONE, NONE, &lexicon).unwrap());
        assert!(!is_financial_query("What's the weather today?", NONE, NONE, &lexicon).unwrap());
        assert!(is_financial_query("best dividend ETFs", NONE, NONE, &lexicon).unwrap());
        assert!(!is_financial_query("", NONE, NONE, &lexicon).unwrap());
    }

    #[test]
    fn test_decision_table() {
        use AgentKind::*;
        let f = AgentOrdering::FinanceFirst;
        let r = AgentOrdering::RedditFirst;

        assert_eq!(select_agents(false, true, f).agents(), &[General]);
        assert_eq!(select_agents(false, false, r).agents(), &[General]);
        assert_eq!(select_agents(true, true, f).agents(), &[Finance, Yahoo, Sec, Reddit]);
        assert_eq!(select_agents(true, true, r).agents(), &[Reddit, Finance, Yahoo, Sec]);
        assert_eq!(select_agents(true, false, f).agents(), &[Finance, Reddit]);
        assert_eq!(select_agents(true, false, r).agents(), &[Reddit, Finance]);
    }

    #[test]
    fn test_ordering_never_changes_membership() {
        for is_financial in [true, false] {
            for has_tickers in [true, false] {
                let mut a = select_agents(is_financial, has_tickers, AgentOrdering::FinanceFirst)
                    .agents()
                    .to_vec();
                let mut b = select_agents(is_financial, has_tickers, AgentOrdering::RedditFirst)
                    .agents()
                    .to_vec();
                a.sort();
                b.sort();
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_determine_agents_end_to_end() {
        let lexicon = Lexicon::default();
        let query = "Compare Apple and Microsoft stocks";
        let companies: Vec<String> = extract_companies(query, &lexicon, &[]).into_iter().collect();
        let tickers: Vec<String> = map_to_tickers(&companies, &lexicon).into_iter().collect();

        assert_eq!(tickers, vec!["AAPL", "MSFT"]);
        let plan = determine_agents(query, &companies, &tickers, AgentOrdering::FinanceFirst, &lexicon);
        assert_eq!(
            plan.agents(),
            &[AgentKind::Finance, AgentKind::Yahoo, AgentKind::Sec, AgentKind::Reddit]
        );

        let plan = determine_agents(
            "What's the weather today?",
            NONE,
            NONE,
            AgentOrdering::FinanceFirst,
            &lexicon,
        );
        assert_eq!(plan.agents(), &[AgentKind::General]);
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let lexicon = Lexicon::default();
        let query = "Is Tesla a good investment?";
        let first = extract_companies(query, &lexicon, &[]);
        let second = extract_companies(query, &lexicon, &[]);
        assert_eq!(first, second);

        let companies: Vec<String> = first.into_iter().collect();
        let tickers: Vec<String> = map_to_tickers(&companies, &lexicon).into_iter().collect();
        let a = determine_agents(query, &companies, &tickers, AgentOrdering::RedditFirst, &lexicon);
        let b = determine_agents(query, &companies, &tickers, AgentOrdering::RedditFirst, &lexicon);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_plan() {
        assert_eq!(
            AgentPlan::fallback(AgentOrdering::FinanceFirst).agents(),
            &[AgentKind::Finance, AgentKind::Reddit]
        );
        assert_eq!(
            AgentPlan::fallback(AgentOrdering::RedditFirst).agents(),
            &[AgentKind::Reddit, AgentKind::Finance]
        );
    }

    #[test]
    fn test_uncompilable_entity_pattern_falls_back() {
        let lexicon = Lexicon::default();
        // exceeds the regex size limit
        let huge = vec!["a".repeat(3_000_000)];

        assert!(matches!(
            is_financial_query("x y z", &huge, NONE, &lexicon),
            Err(RouterError::Classification(_))
        ));

        let plan = determine_agents("x y z", &huge, NONE, AgentOrdering::FinanceFirst, &lexicon);
        assert_eq!(plan.agents(), &[AgentKind::Finance, AgentKind::Reddit]);

        let plan = determine_agents("x y z", &huge, NONE, AgentOrdering::RedditFirst, &lexicon);
        assert_eq!(plan.agents(), &[AgentKind::Reddit, AgentKind::Finance]);
    }
}
