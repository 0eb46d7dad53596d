use regex::Regex;

/// Document kind, in order of preference when several documents cover the
/// same fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    AnnualReport,
    FinancialStatement,
    Sofi,
    Other,
}

impl DocKind {
    /// Lower is preferred.
    pub fn base_priority(self) -> u32 {
        match self {
            DocKind::AnnualReport => 1,
            DocKind::FinancialStatement => 2,
            DocKind::Sofi => 3,
            DocKind::Other => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocKind::AnnualReport => "annual_report",
            DocKind::FinancialStatement => "financial_statement",
            DocKind::Sofi => "sofi",
            DocKind::Other => "other",
        }
    }
}

/// Lowercased text+url with hyphens and underscores flattened to spaces,
/// so "Annual-Report" and "annual_report" both match "annual report".
fn normalized(text: &str, url: &str) -> String {
    format!("{} {}", text.to_lowercase(), url.to_lowercase()).replace(['_', '-'], " ")
}

/// First match wins; "annual report" is checked first because it is the
/// most specific and most desired kind.
pub fn classify_kind(text: &str, url: &str) -> DocKind {
    let combined = normalized(text, url);

    if combined.contains("annual report") {
        return DocKind::AnnualReport;
    }

    let financial = ["financial statement", "audited financial", "consolidated financial"];
    if financial.iter().any(|kw| combined.contains(kw)) {
        return DocKind::FinancialStatement;
    }

    if combined.contains("sofi") || combined.contains("statement of financial information") {
        return DocKind::Sofi;
    }

    DocKind::Other
}

pub fn is_draft(text: &str, url: &str) -> bool {
    normalized(text, url).contains("draft")
}

/// Separates annual-report-family documents from budget/forecast noise.
/// Disqualifying keywords always win over qualifying ones.
pub fn is_relevant_report(text: &str, url: &str) -> bool {
    let combined = normalized(text, url);

    let exclude = [
        "budget", "projection", "forecast", "plan", "proposed", "preliminary", "bylaw",
        "tax rate", "levy", "quarterly",
    ];
    if exclude.iter().any(|kw| combined.contains(kw)) {
        return false;
    }

    let include = [
        "annual report", "annual financial", "financial statement", "audited",
        "consolidated financial", "year end", "sofi",
    ];
    if include.iter().any(|kw| combined.contains(kw)) {
        return true;
    }

    // Bare "annual" without "report" is usually a meeting or a levy page.
    if combined.contains("annual") && !combined.contains("report") {
        return false;
    }

    combined.contains("financial report")
}

/// Extract the fiscal year from link text or a URL. Patterns run in strict
/// priority order against the raw text:
///
/// 1. "Year Ended ... YYYY" names the report year directly.
/// 2. A range `YYYY-YYYY` or `YYYY/YYYY` yields the end year.
/// 3. A short range `YYYY-NN` (suffix 10..=29) yields `2000 + NN`.
/// 4. Otherwise the newest `20xx` token below `current_year`, or the
///    overall newest when only current-or-later tokens exist (selection
///    drops those later).
pub fn extract_fiscal_year(text: &str, current_year: i32) -> Option<i32> {
    if text.is_empty() {
        return None;
    }

    let year_ended = Regex::new(r"(?i)year\s+ended[^0-9]*(20[0-2]\d)").ok()?;
    if let Some(cap) = year_ended.captures(text) {
        return cap[1].parse().ok();
    }

    // Trailing word boundary keeps calendar dates like 2022-05-15 out.
    let range = Regex::new(r"(20[0-2]\d)[-/](20[0-2]\d)\b").ok()?;
    if let Some(cap) = range.captures(text) {
        return cap[2].parse().ok();
    }

    // Suffix must be >= 10 so day-of-month and month numbers never match.
    let short_range = Regex::new(r"20[0-2]\d[-/]([1-2]\d)\b").ok()?;
    if let Some(cap) = short_range.captures(text) {
        return cap[1].parse::<i32>().ok().map(|suffix| 2000 + suffix);
    }

    let token = Regex::new(r"20[0-2]\d").ok()?;
    let all_years: Vec<i32> = token
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    if all_years.is_empty() {
        return None;
    }

    let newest_past = all_years.iter().copied().filter(|year| *year < current_year).max();
    newest_past.or_else(|| all_years.iter().copied().max())
}
