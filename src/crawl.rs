use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::Datelike as _;
use url::Url;

use crate::classify;
use crate::cli::DownloadArgs;
use crate::download;
use crate::extract::{self, Link};
use crate::formats::{MasterRecord, SeedRow, StatusRecord};
use crate::ledger::{MasterLedger, StatusLedger};
use crate::municipalities::Directory;
use crate::select::{self, Candidate};

/// Traversal stops once this many pages have been visited for one
/// municipality; document centers nest far deeper than any report
/// archive warrants.
const MAX_PAGES_PER_MUNICIPALITY: usize = 5;

/// Cap on downloads of documents whose year could not be resolved.
const MAX_UNKNOWN_YEAR_DOWNLOADS: usize = 5;

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub downloads: usize,
    pub found: usize,
    pub years: usize,
    pub message: String,
}

impl RunOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            downloads: 0,
            found: 0,
            years: 0,
            message: message.into(),
        }
    }
}

pub async fn run(args: DownloadArgs) -> anyhow::Result<()> {
    let seeds = load_seeds(Path::new(&args.urls)).context("load seed urls")?;
    tracing::info!(seeds = seeds.len(), "loaded seed rows");
    if seeds.is_empty() {
        anyhow::bail!("no seed rows in {}", args.urls);
    }

    let master_ledger = MasterLedger::new(&args.master);
    let status_ledger = StatusLedger::new(&args.status);

    let directory = match &args.municipalities {
        Some(path) => Some(
            Directory::load(
                Path::new(path),
                args.status_codes.as_deref().map(Path::new),
                args.province_codes.as_deref().map(Path::new),
            )
            .context("load municipality reference data")?,
        ),
        None => None,
    };

    let seeds = filter_seeds(seeds, &args, &status_ledger)?;
    if seeds.is_empty() {
        tracing::info!("no municipalities to process");
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("build http client")?;

    let lake_dir = PathBuf::from(&args.lake);
    let current_year = chrono::Local::now().year();
    let total = args.limit.min(seeds.len());

    let mut summaries = Vec::new();
    for (index, seed) in seeds.into_iter().take(args.limit).enumerate() {
        let seed = resolve_identity(seed, directory.as_ref());
        tracing::info!(
            n = index + 1,
            total,
            municipality = %seed.municipality_name,
            csd = %seed.census_subdivision_id,
            "processing municipality"
        );

        let outcome = process_municipality(
            &client,
            &seed,
            &lake_dir,
            &master_ledger,
            args.max_downloads,
            current_year,
        )
        .await?;

        status_ledger
            .upsert(status_record(&seed, &lake_dir, &outcome, current_timestamp()))
            .context("update status ledger")?;

        summaries.push((seed, outcome));
    }

    for (seed, outcome) in &summaries {
        let status = if outcome.success { "OK" } else { "FAIL" };
        tracing::info!(
            status,
            municipality = %seed.municipality_name,
            csd = %seed.census_subdivision_id,
            "{}",
            outcome.message
        );
    }

    Ok(())
}

/// Crawl one municipality's report page and download its reports, one per
/// fiscal year. Only ledger I/O can fail; everything network-shaped
/// degrades into the outcome.
pub async fn process_municipality(
    client: &reqwest::Client,
    seed: &SeedRow,
    lake_dir: &Path,
    master: &MasterLedger,
    max_downloads: usize,
    current_year: i32,
) -> anyhow::Result<RunOutcome> {
    let page_url = seed.page_url.trim();
    if page_url.is_empty() {
        return Ok(RunOutcome::failure("No page url"));
    }
    let start_url = match Url::parse(page_url) {
        Ok(url) => url,
        Err(err) => {
            tracing::warn!(%err, page_url, "seed url does not parse");
            return Ok(RunOutcome::failure(format!("Invalid page url: {page_url}")));
        }
    };

    tracing::info!(url = %start_url, "crawling report page");
    let raw_links = collect_links(client, start_url.clone()).await;

    let candidates = classify_candidates(&raw_links, current_year);
    tracing::info!(
        links = raw_links.len(),
        candidates = candidates.len(),
        "classified report documents"
    );

    if candidates.is_empty() {
        return Ok(RunOutcome::failure("No annual reports found"));
    }

    let best_by_year = select::select_best_per_year(&candidates, current_year);
    for (year, candidate) in best_by_year.iter().rev().take(5) {
        tracing::debug!(
            year,
            kind = candidate.kind.as_str(),
            draft = candidate.draft,
            text = %candidate.link.text,
            "selected"
        );
    }

    let save_dir = lake_dir
        .join(&seed.province_id)
        .join(&seed.census_subdivision_id);
    let mut downloads = 0;

    for (&year, candidate) in best_by_year.iter().rev().take(max_downloads) {
        let dest = save_dir.join(format!("financial_statement_{year}.pdf"));
        if dest.exists() {
            tracing::debug!(year, path = %dest.display(), "skip, already on disk");
            continue;
        }

        tracing::info!(year, text = %candidate.link.text, "downloading");
        if download::download_document(client, &candidate.link.url, &dest)
            .await
            .is_none()
        {
            continue;
        }
        downloads += 1;

        master
            .append(&master_record(seed, &start_url, candidate, Some(year), &dest))
            .context("append master ledger")?;
    }

    // A few documents we could not date are still worth keeping; the
    // server-declared filename sometimes dates them after the fact.
    let unknown_year: Vec<&Candidate> = candidates
        .iter()
        .filter(|candidate| candidate.year.is_none())
        .collect();
    for (index, candidate) in unknown_year
        .iter()
        .take(MAX_UNKNOWN_YEAR_DOWNLOADS)
        .enumerate()
    {
        let dest = save_dir.join(format!("financial_statement_unknown_{}.pdf", index + 1));
        if dest.exists() {
            continue;
        }

        tracing::info!(text = %candidate.link.text, "downloading (unknown year)");
        let Some(downloaded) = download::download_document(client, &candidate.link.url, &dest).await
        else {
            continue;
        };
        downloads += 1;

        let mut year = None;
        let mut path = dest;
        if let Some(filename) = downloaded.original_filename
            && let Some(discovered) = classify::extract_fiscal_year(&filename, current_year)
        {
            year = Some(discovered);
            match download::finalize_with_year(&path, discovered) {
                Ok(finalized) => path = finalized,
                Err(err) => {
                    tracing::warn!(?err, path = %path.display(), "rename failed, keeping placeholder name");
                }
            }
        }

        master
            .append(&master_record(seed, &start_url, candidate, year, &path))
            .context("append master ledger")?;
    }

    let found = candidates.len();
    let years = best_by_year.len();
    Ok(RunOutcome {
        success: downloads > 0 || found > 0,
        downloads,
        found,
        years,
        message: format!("Downloaded {downloads}, found {found} total for {years} years"),
    })
}

/// Drain a bounded frontier: the seed page plus any financially relevant
/// folders the document-center strategy surfaces. The visited set both
/// dedups and enforces the page budget.
async fn collect_links(client: &reqwest::Client, start_url: Url) -> Vec<Link> {
    let mut frontier: VecDeque<Url> = VecDeque::from([start_url]);
    let mut visited: HashSet<String> = HashSet::new();
    let mut collected = Vec::new();

    while let Some(current) = frontier.pop_front() {
        if visited.len() >= MAX_PAGES_PER_MUNICIPALITY {
            break;
        }
        if !visited.insert(current.to_string()) {
            continue;
        }

        let links = extract::extract_links(client, &current).await;
        tracing::debug!(url = %current, links = links.len(), "extracted links");

        for link in links {
            if link.is_folder {
                if visited.len() < MAX_PAGES_PER_MUNICIPALITY {
                    frontier.push_back(link.url);
                }
            } else {
                collected.push(link);
            }
        }
    }

    collected
}

/// Funnel raw links into classified candidates: document-looking only,
/// first occurrence of each URL, annual-report family only.
fn classify_candidates(links: &[Link], current_year: i32) -> Vec<Candidate> {
    let mut seen_urls: HashSet<&str> = HashSet::new();
    let mut candidates = Vec::new();

    for link in links {
        if !link.is_document {
            continue;
        }
        if seen_urls.contains(link.url.as_str()) {
            continue;
        }
        if !classify::is_relevant_report(&link.text, link.url.as_str()) {
            continue;
        }
        seen_urls.insert(link.url.as_str());

        // The text names the report year; the URL often carries an upload
        // date instead, so it is only a fallback.
        let year = classify::extract_fiscal_year(&link.text, current_year)
            .or_else(|| classify::extract_fiscal_year(link.url.as_str(), current_year));

        candidates.push(Candidate {
            kind: classify::classify_kind(&link.text, link.url.as_str()),
            draft: classify::is_draft(&link.text, link.url.as_str()),
            year,
            link: link.clone(),
        });
    }

    candidates
}

/// Fill identity fields the seed is missing from the reference directory.
fn resolve_identity(mut seed: SeedRow, directory: Option<&Directory>) -> SeedRow {
    if seed.census_subdivision_id.is_empty() {
        return seed;
    }

    if let Some(directory) = directory
        && let Some(municipality) = directory.by_csd(&seed.census_subdivision_id)
    {
        if seed.province_id.is_empty() {
            seed.province_id = municipality.province_id.clone();
        }
        if seed.province.is_empty() {
            seed.province = municipality.province_name.clone();
        }
        if seed.municipality_name.is_empty() {
            seed.municipality_name = municipality.name.clone();
        }
        if seed.municipality_type.is_empty() {
            seed.municipality_type = municipality.municipal_status_name.clone();
        }
    }

    seed
}

fn status_record(
    seed: &SeedRow,
    lake_dir: &Path,
    outcome: &RunOutcome,
    timestamp: String,
) -> StatusRecord {
    let status = if outcome.success { "OK" } else { "FAIL" };

    // Count what is actually on disk, not what this session downloaded.
    let municipality_dir = lake_dir
        .join(&seed.province_id)
        .join(&seed.census_subdivision_id);
    let downloaded = count_documents_on_disk(&municipality_dir);

    let needs_reparse = if !outcome.success || outcome.years < 5 {
        "YES"
    } else {
        "NO"
    };
    let mut notes = if outcome.success {
        String::new()
    } else {
        outcome.message.clone()
    };
    if notes.is_empty() && outcome.years < 5 && outcome.success {
        notes = "Low year count".to_owned();
    }

    StatusRecord {
        census_subdivision_id: seed.census_subdivision_id.clone(),
        municipality_name: seed.municipality_name.clone(),
        municipality_type: seed.municipality_type.clone(),
        province_id: seed.province_id.clone(),
        province: seed.province.clone(),
        status: status.to_owned(),
        downloaded,
        found: outcome.found,
        years: outcome.years,
        needs_reparse: needs_reparse.to_owned(),
        notes,
        last_updated: timestamp,
        page_url: seed.page_url.clone(),
    }
}

fn current_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn count_documents_on_disk(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.path().extension().and_then(|ext| ext.to_str()) == Some("pdf")
        })
        .count()
}

fn master_record(
    seed: &SeedRow,
    source: &Url,
    candidate: &Candidate,
    year: Option<i32>,
    path: &Path,
) -> MasterRecord {
    MasterRecord {
        census_subdivision_id: seed.census_subdivision_id.clone(),
        municipality: seed.municipality_name.clone(),
        province_id: seed.province_id.clone(),
        province: seed.province.clone(),
        municipality_type: seed.municipality_type.clone(),
        year,
        source_page_url: source.to_string(),
        document_url: candidate.link.url.to_string(),
        document_path: path.to_string_lossy().to_string(),
    }
}

fn load_seeds(path: &Path) -> anyhow::Result<Vec<SeedRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open seed csv: {}", path.display()))?;

    let mut seeds = Vec::new();
    for row in reader.deserialize() {
        seeds.push(row.context("parse seed row")?);
    }
    Ok(seeds)
}

fn filter_seeds(
    mut seeds: Vec<SeedRow>,
    args: &DownloadArgs,
    status_ledger: &StatusLedger,
) -> anyhow::Result<Vec<SeedRow>> {
    if let Some(csd) = &args.csd {
        seeds.retain(|seed| seed.census_subdivision_id == *csd);
        tracing::info!(seeds = seeds.len(), csd = %csd, "filtered by census subdivision id");
    }

    if let Some(needle) = &args.municipality {
        let needle = needle.to_lowercase();
        seeds.retain(|seed| seed.municipality_name.to_lowercase().contains(&needle));
        tracing::info!(seeds = seeds.len(), name = %needle, "filtered by municipality name");
    }

    if args.retry_failed || args.retry_incomplete {
        let table = status_ledger.load().context("load status ledger")?;
        seeds.retain(|seed| {
            let key = (
                seed.census_subdivision_id.clone(),
                seed.municipality_type.clone(),
            );
            match table.get(&key) {
                // Never processed yet.
                None => true,
                Some(row) if args.retry_failed && row.status == "FAIL" => true,
                Some(row) if args.retry_incomplete && row.needs_reparse == "YES" => true,
                Some(_) => false,
            }
        });
        tracing::info!(seeds = seeds.len(), "filtered by recorded status");
    }

    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::DocKind;

    fn seed(csd: &str) -> SeedRow {
        SeedRow {
            census_subdivision_id: csd.to_owned(),
            municipality_name: "Oak Bay".to_owned(),
            municipality_type: "District Municipality".to_owned(),
            province_id: "59".to_owned(),
            province: "British Columbia".to_owned(),
            search_terms: String::new(),
            page_url: "https://oakbay.ca/finance".to_owned(),
        }
    }

    fn outcome(success: bool, years: usize) -> RunOutcome {
        RunOutcome {
            success,
            downloads: 0,
            found: 3,
            years,
            message: "No annual reports found".to_owned(),
        }
    }

    #[test]
    fn counts_only_pdf_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("financial_statement_2022.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("financial_statement_2023.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        assert_eq!(count_documents_on_disk(dir.path()), 2);
        assert_eq!(count_documents_on_disk(&dir.path().join("missing")), 0);
    }

    #[test]
    fn status_low_year_count_sets_reparse_and_notes() {
        let dir = tempfile::tempdir().unwrap();
        let record = status_record(&seed("5917034"), dir.path(), &outcome(true, 2), now());

        assert_eq!(record.status, "OK");
        assert_eq!(record.needs_reparse, "YES");
        assert_eq!(record.notes, "Low year count");
    }

    #[test]
    fn status_failure_keeps_the_message() {
        let dir = tempfile::tempdir().unwrap();
        let record = status_record(&seed("5917034"), dir.path(), &outcome(false, 0), now());

        assert_eq!(record.status, "FAIL");
        assert_eq!(record.needs_reparse, "YES");
        assert_eq!(record.notes, "No annual reports found");
    }

    #[test]
    fn status_enough_years_needs_no_reparse() {
        let dir = tempfile::tempdir().unwrap();
        let record = status_record(&seed("5917034"), dir.path(), &outcome(true, 6), now());

        assert_eq!(record.needs_reparse, "NO");
        assert_eq!(record.notes, "");
    }

    fn now() -> String {
        "2024-06-01 12:00:00".to_owned()
    }

    #[test]
    fn classification_funnel_filters_and_dedups() {
        let links = vec![
            link("https://x.ca/files/annual-report-2023.pdf", "2023 Annual Report", true),
            link("https://x.ca/files/annual-report-2023.pdf", "2023 Annual Report", true),
            link("https://x.ca/files/budget-2024.pdf", "2024 Budget", true),
            link("https://x.ca/contact", "Contact", false),
        ];
        let candidates = classify_candidates(&links, 2025);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, DocKind::AnnualReport);
        assert_eq!(candidates[0].year, Some(2023));
    }

    #[test]
    fn duplicate_url_with_better_text_survives_an_irrelevant_first_sighting() {
        // The first occurrence fails the relevance filter; the second,
        // with report-like text, must still be considered.
        let links = vec![
            link("https://x.ca/files/123.pdf", "click here", true),
            link("https://x.ca/files/123.pdf", "2022 Annual Report", true),
        ];
        let candidates = classify_candidates(&links, 2025);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].year, Some(2022));
    }

    fn link(url: &str, text: &str, is_document: bool) -> Link {
        Link {
            url: Url::parse(url).unwrap(),
            text: text.to_owned(),
            is_document,
            is_folder: false,
        }
    }

    #[test]
    fn identity_backfill_fills_only_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let municipalities = dir.path().join("m.csv");
        std::fs::write(
            &municipalities,
            "region,name,municipal_status,PR_UID,pop\n5917034,Oak Bay,DM,59,18094\n",
        )
        .unwrap();
        let directory = Directory::load(&municipalities, None, None).unwrap();

        let mut incomplete = seed("5917034");
        incomplete.province_id.clear();
        incomplete.municipality_type.clear();

        let resolved = resolve_identity(incomplete, Some(&directory));
        assert_eq!(resolved.province_id, "59");
        assert_eq!(resolved.municipality_type, "DM");
        // Present fields are left alone.
        assert_eq!(resolved.municipality_name, "Oak Bay");
    }
}
