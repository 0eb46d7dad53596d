use std::collections::BTreeMap;

use crate::classify::DocKind;
use crate::extract::Link;

/// Priority offset for draft documents. Larger than the spread of base
/// priorities, so a draft of any kind ranks below every finalized kind
/// while still winning a year that has no finalized candidate at all.
pub const DRAFT_PENALTY: u32 = 10;

/// A document link annotated with classification results.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub link: Link,
    pub kind: DocKind,
    pub year: Option<i32>,
    pub draft: bool,
}

impl Candidate {
    /// Lower wins.
    pub fn priority(&self) -> u32 {
        let base = self.kind.base_priority();
        if self.draft { base + DRAFT_PENALTY } else { base }
    }
}

/// Pick at most one candidate per fiscal year. Candidates without a year
/// are skipped, as are years that have not ended yet (an annual report
/// for the current year cannot exist). Within a year the strictly lowest
/// priority wins; ties keep the candidate seen first.
pub fn select_best_per_year(
    candidates: &[Candidate],
    current_year: i32,
) -> BTreeMap<i32, Candidate> {
    let mut by_year: BTreeMap<i32, Candidate> = BTreeMap::new();

    for candidate in candidates {
        let Some(year) = candidate.year else {
            continue;
        };
        if year >= current_year {
            continue;
        }

        match by_year.get(&year) {
            Some(best) if candidate.priority() >= best.priority() => {}
            _ => {
                by_year.insert(year, candidate.clone());
            }
        }
    }

    by_year
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    const CURRENT_YEAR: i32 = 2025;

    fn candidate(url: &str, kind: DocKind, year: Option<i32>, draft: bool) -> Candidate {
        Candidate {
            link: Link {
                url: Url::parse(url).unwrap(),
                text: String::new(),
                is_document: true,
                is_folder: false,
            },
            kind,
            year,
            draft,
        }
    }

    #[test]
    fn better_kind_wins_the_year() {
        let candidates = vec![
            candidate("https://x.ca/other.pdf", DocKind::Other, Some(2022), false),
            candidate("https://x.ca/ar.pdf", DocKind::AnnualReport, Some(2022), false),
        ];
        let best = select_best_per_year(&candidates, CURRENT_YEAR);
        assert_eq!(best[&2022].kind, DocKind::AnnualReport);
    }

    #[test]
    fn draft_of_the_best_kind_loses_to_any_final_document() {
        // Draft annual report is priority 11; a final "other" is 4.
        let candidates = vec![
            candidate("https://x.ca/draft.pdf", DocKind::AnnualReport, Some(2022), true),
            candidate("https://x.ca/other.pdf", DocKind::Other, Some(2022), false),
        ];
        let best = select_best_per_year(&candidates, CURRENT_YEAR);
        assert_eq!(best[&2022].kind, DocKind::Other);
        assert!(!best[&2022].draft);
    }

    #[test]
    fn lone_draft_still_claims_its_year() {
        let candidates = vec![candidate(
            "https://x.ca/draft.pdf",
            DocKind::AnnualReport,
            Some(2021),
            true,
        )];
        let best = select_best_per_year(&candidates, CURRENT_YEAR);
        assert!(best[&2021].draft);
    }

    #[test]
    fn final_beats_draft_of_the_same_kind() {
        let candidates = vec![
            candidate("https://x.ca/draft.pdf", DocKind::AnnualReport, Some(2023), true),
            candidate("https://x.ca/final.pdf", DocKind::AnnualReport, Some(2023), false),
        ];
        let best = select_best_per_year(&candidates, CURRENT_YEAR);
        assert_eq!(best[&2023].link.url.as_str(), "https://x.ca/final.pdf");
    }

    #[test]
    fn ties_keep_the_first_candidate_seen() {
        let candidates = vec![
            candidate("https://x.ca/first.pdf", DocKind::FinancialStatement, Some(2020), false),
            candidate("https://x.ca/second.pdf", DocKind::FinancialStatement, Some(2020), false),
        ];
        let best = select_best_per_year(&candidates, CURRENT_YEAR);
        assert_eq!(best[&2020].link.url.as_str(), "https://x.ca/first.pdf");
    }

    #[test]
    fn current_and_future_years_are_excluded() {
        let candidates = vec![
            candidate("https://x.ca/now.pdf", DocKind::AnnualReport, Some(CURRENT_YEAR), false),
            candidate("https://x.ca/later.pdf", DocKind::AnnualReport, Some(CURRENT_YEAR + 1), false),
            candidate("https://x.ca/past.pdf", DocKind::AnnualReport, Some(2024), false),
        ];
        let best = select_best_per_year(&candidates, CURRENT_YEAR);
        assert_eq!(best.len(), 1);
        assert!(best.contains_key(&2024));
    }

    #[test]
    fn candidates_without_a_year_are_skipped() {
        let candidates = vec![candidate("https://x.ca/na.pdf", DocKind::AnnualReport, None, false)];
        assert!(select_best_per_year(&candidates, CURRENT_YEAR).is_empty());
    }

    #[test]
    fn map_iterates_years_in_order() {
        let candidates = vec![
            candidate("https://x.ca/a.pdf", DocKind::AnnualReport, Some(2021), false),
            candidate("https://x.ca/b.pdf", DocKind::AnnualReport, Some(2023), false),
            candidate("https://x.ca/c.pdf", DocKind::AnnualReport, Some(2022), false),
        ];
        let best = select_best_per_year(&candidates, CURRENT_YEAR);
        let newest_first: Vec<i32> = best.keys().rev().copied().collect();
        assert_eq!(newest_first, vec![2023, 2022, 2021]);
    }
}
