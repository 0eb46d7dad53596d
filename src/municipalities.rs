use std::collections::HashMap;
use std::path::Path;

use anyhow::Context as _;
use serde::Deserialize;

use crate::cli::LookupArgs;

/// A municipality with its code lookups resolved.
#[derive(Debug, Clone)]
pub struct Municipality {
    pub census_subdivision_id: String,
    pub name: String,
    pub municipal_status_code: String,
    pub municipal_status_name: String,
    pub province_id: String,
    pub province_name: String,
    pub population: u32,
}

#[derive(Debug, Deserialize)]
struct MunicipalityRow {
    /// Census subdivision id.
    #[serde(default)]
    region: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    municipal_status: String,
    #[serde(default, rename = "PR_UID")]
    pr_uid: String,
    #[serde(default)]
    pop: String,
}

#[derive(Debug, Deserialize)]
struct StatusCodeRow {
    #[serde(default)]
    code: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ProvinceRow {
    #[serde(default)]
    id: String,
    #[serde(default)]
    province: String,
}

/// Read-only municipality reference data, loaded once from CSV and passed
/// where needed. Status and province names fall back to the raw code when
/// a table or an entry is missing.
#[derive(Debug, Default)]
pub struct Directory {
    municipalities: Vec<Municipality>,
    by_csd: HashMap<String, usize>,
}

impl Directory {
    pub fn load(
        municipalities_csv: &Path,
        status_codes_csv: Option<&Path>,
        province_codes_csv: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let status_codes = match status_codes_csv {
            Some(path) => load_status_codes(path)?,
            None => HashMap::new(),
        };
        let province_codes = match province_codes_csv {
            Some(path) => load_province_codes(path)?,
            None => HashMap::new(),
        };

        let mut reader = csv::Reader::from_path(municipalities_csv)
            .with_context(|| format!("open municipalities: {}", municipalities_csv.display()))?;

        let mut municipalities = Vec::new();
        let mut by_csd = HashMap::new();
        for row in reader.deserialize() {
            let row: MunicipalityRow = row.context("parse municipality row")?;
            let csd = row.region.trim().to_owned();
            let status_code = row.municipal_status.trim().to_owned();
            let province_id = row.pr_uid.trim().to_owned();

            let municipality = Municipality {
                census_subdivision_id: csd.clone(),
                name: row.name.trim().to_owned(),
                municipal_status_name: resolve(&status_codes, &status_code),
                municipal_status_code: status_code,
                province_name: resolve(&province_codes, &province_id),
                province_id,
                population: row.pop.trim().parse().unwrap_or(0),
            };

            if !csd.is_empty() {
                by_csd.insert(csd, municipalities.len());
            }
            municipalities.push(municipality);
        }

        Ok(Self {
            municipalities,
            by_csd,
        })
    }

    pub fn by_csd(&self, census_subdivision_id: &str) -> Option<&Municipality> {
        self.by_csd
            .get(census_subdivision_id)
            .map(|&index| &self.municipalities[index])
    }

    pub fn all(&self) -> &[Municipality] {
        &self.municipalities
    }

    pub fn by_province<'a>(&'a self, province_id: &'a str) -> impl Iterator<Item = &'a Municipality> {
        self.municipalities
            .iter()
            .filter(move |municipality| municipality.province_id == province_id)
    }
}

fn resolve(table: &HashMap<String, String>, code: &str) -> String {
    table.get(code).cloned().unwrap_or_else(|| code.to_owned())
}

fn load_status_codes(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open status codes: {}", path.display()))?;

    let mut table = HashMap::new();
    for row in reader.deserialize() {
        let row: StatusCodeRow = row.context("parse status code row")?;
        let code = row.code.trim().to_owned();
        if !code.is_empty() {
            table.insert(code, row.name.trim().to_owned());
        }
    }
    Ok(table)
}

fn load_province_codes(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open province codes: {}", path.display()))?;

    let mut table = HashMap::new();
    for row in reader.deserialize() {
        let row: ProvinceRow = row.context("parse province row")?;
        let id = row.id.trim().to_owned();
        if !id.is_empty() {
            table.insert(id, row.province.trim().to_owned());
        }
    }
    Ok(table)
}

pub fn run(args: LookupArgs) -> anyhow::Result<()> {
    let directory = Directory::load(
        Path::new(&args.municipalities),
        args.status_codes.as_deref().map(Path::new),
        args.province_codes.as_deref().map(Path::new),
    )
    .context("load municipality reference data")?;

    if let Some(csd) = &args.csd {
        let municipality = directory
            .by_csd(csd)
            .ok_or_else(|| anyhow::anyhow!("no municipality with census subdivision id {csd}"))?;
        print_municipality(municipality);
        return Ok(());
    }

    match &args.province {
        Some(province) => {
            for municipality in directory.by_province(province) {
                print_municipality(municipality);
            }
        }
        None => {
            for municipality in directory.all() {
                print_municipality(municipality);
            }
        }
    }

    Ok(())
}

fn print_municipality(municipality: &Municipality) {
    println!(
        "{}\t{} ({})\t{} {}\tpop {}",
        municipality.census_subdivision_id,
        municipality.name,
        municipality.municipal_status_name,
        municipality.province_id,
        municipality.province_name,
        municipality.population,
    );
}
