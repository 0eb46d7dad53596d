use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Download(DownloadArgs),
    Lookup(LookupArgs),
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Seed CSV of municipality report pages (one row per municipality).
    #[arg(long)]
    pub urls: String,

    /// Root directory for downloaded documents (<lake>/<province>/<csd>/).
    #[arg(long)]
    pub lake: String,

    /// Master ledger CSV, appended with one row per successful download.
    #[arg(long)]
    pub master: String,

    /// Status ledger CSV, upserted with one row per municipality.
    #[arg(long)]
    pub status: String,

    /// Maximum municipalities to process.
    #[arg(long, default_value_t = 5)]
    pub limit: usize,

    /// Maximum per-year downloads per municipality.
    #[arg(long, default_value_t = 50)]
    pub max_downloads: usize,

    /// Only process seeds whose municipality name contains this string.
    #[arg(long, short = 'm')]
    pub municipality: Option<String>,

    /// Only process the seed with this census subdivision id.
    #[arg(long)]
    pub csd: Option<String>,

    /// Only retry municipalities whose recorded status is FAIL.
    #[arg(long, default_value_t = false)]
    pub retry_failed: bool,

    /// Only retry municipalities marked needs_reparse.
    #[arg(long, default_value_t = false)]
    pub retry_incomplete: bool,

    /// Municipality reference CSV, used to backfill missing seed fields.
    #[arg(long)]
    pub municipalities: Option<String>,

    /// Municipal status code table (code,name).
    #[arg(long)]
    pub status_codes: Option<String>,

    /// Province code table (id,province).
    #[arg(long)]
    pub province_codes: Option<String>,
}

#[derive(Debug, Args)]
pub struct LookupArgs {
    /// Municipality reference CSV.
    #[arg(long)]
    pub municipalities: String,

    /// Municipal status code table (code,name).
    #[arg(long)]
    pub status_codes: Option<String>,

    /// Province code table (id,province).
    #[arg(long)]
    pub province_codes: Option<String>,

    /// Print a single municipality by census subdivision id.
    #[arg(long)]
    pub csd: Option<String>,

    /// Restrict the listing to one province id.
    #[arg(long, short = 'p')]
    pub province: Option<String>,
}
