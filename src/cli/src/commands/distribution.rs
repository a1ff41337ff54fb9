//! Distribution commands: `incr`, `get`, `dist`, `top` and `size`.

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use super::config::Settings;
use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

/// Decay options shared by the read commands.
#[derive(Args, Debug, Default)]
pub struct DecayArgs {
    /// Decay rate; falls back to the configured `rate`, then the server default
    #[arg(short, long)]
    rate: Option<f64>,

    /// Let fields decay to zero and be removed
    #[arg(long)]
    prune: bool,
}

impl DecayArgs {
    fn query(&self, settings: &Settings) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(rate) = self.rate.or(settings.rate) {
            query.push(("rate", rate.to_string()));
        }
        if self.prune {
            query.push(("prune", "true".to_string()));
        }
        query
    }
}

#[derive(Args)]
pub struct IncrArgs {
    /// Distribution name
    distribution: String,

    /// Fields to increment
    #[arg(required = true)]
    fields: Vec<String>,

    /// Amount added to each field
    #[arg(short = 'n', long, default_value_t = 1)]
    amount: u64,
}

#[derive(Args)]
pub struct GetArgs {
    /// Distribution name
    distribution: String,

    /// Fields to read
    #[arg(required = true)]
    fields: Vec<String>,

    #[command(flatten)]
    decay: DecayArgs,
}

#[derive(Args)]
pub struct DistArgs {
    /// Distribution name
    distribution: String,

    #[command(flatten)]
    decay: DecayArgs,
}

#[derive(Args)]
pub struct TopArgs {
    /// Distribution name
    distribution: String,

    /// Number of fields to return
    #[arg(short = 'n', long, default_value_t = 10)]
    count: usize,

    #[command(flatten)]
    decay: DecayArgs,
}

/// Server view of a distribution.
#[derive(Debug, Serialize, Deserialize)]
pub struct DistributionView {
    pub distribution: String,
    #[serde(rename = "Z")]
    pub z: u64,
    #[serde(rename = "T")]
    pub t: i64,
    pub rate: f64,
    pub prune: bool,
    pub last_sync_time: i64,
    pub full: bool,
    pub data: Vec<Bin>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Bin {
    pub bin: String,
    pub count: u64,
    pub p: f64,
}

#[derive(Tabled)]
struct BinRow {
    #[tabled(rename = "Field")]
    bin: String,
    #[tabled(rename = "Count")]
    count: u64,
    #[tabled(rename = "P")]
    p: String,
}

impl From<&Bin> for BinRow {
    fn from(b: &Bin) -> Self {
        Self {
            bin: b.bin.clone(),
            count: b.count,
            p: format!("{:.4}", b.p),
        }
    }
}

pub async fn incr(args: IncrArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let mut query = vec![
        ("distribution", args.distribution.clone()),
        ("N", args.amount.to_string()),
    ];
    query.extend(args.fields.iter().map(|f| ("field", f.clone())));

    let resp: serde_json::Value = client.get("/incr", &query).await?;

    match format {
        OutputFormat::Table => output::print_success(&format!(
            "{} += {} for {}",
            args.distribution,
            args.amount,
            args.fields.join(", ")
        )),
        _ => output::print_item(&resp, format)?,
    }
    Ok(())
}

pub async fn get(args: GetArgs, settings: &Settings, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let mut query = vec![("distribution", args.distribution)];
    query.extend(args.fields.into_iter().map(|f| ("field", f)));
    query.extend(args.decay.query(settings));

    let view: DistributionView = client.get("/get", &query).await?;
    print_distribution(&view, format)
}

pub async fn dist(args: DistArgs, settings: &Settings, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let mut query = vec![("distribution", args.distribution)];
    query.extend(args.decay.query(settings));

    let view: DistributionView = client.get("/dist", &query).await?;
    print_distribution(&view, format)
}

pub async fn top(args: TopArgs, settings: &Settings, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let mut query = vec![
        ("distribution", args.distribution),
        ("N", args.count.to_string()),
    ];
    query.extend(args.decay.query(settings));

    let view: DistributionView = client.get("/nmostprobable", &query).await?;
    print_distribution(&view, format)
}

pub async fn size(client: &ApiClient, format: OutputFormat) -> Result<()> {
    #[derive(Serialize, Deserialize)]
    struct DbSize {
        dbsize: u64,
    }

    let resp: DbSize = client.get("/dbsize", &[]).await?;
    match format {
        OutputFormat::Table => println!("{}", resp.dbsize),
        _ => output::print_item(&resp, format)?,
    }
    Ok(())
}

fn print_distribution(view: &DistributionView, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            output::print_header(&view.distribution);
            output::print_detail("Z", &view.z.to_string());
            output::print_detail("T", &view.t.to_string());
            output::print_detail("Rate", &view.rate.to_string());
            output::print_detail("Prune", &view.prune.to_string());
            output::print_detail("Full", &view.full.to_string());
            println!();
            let rows: Vec<BinRow> = view.data.iter().map(BinRow::from).collect();
            output::print_table(&rows);
            Ok(())
        }
        _ => output::print_item(view, format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_query_prefers_flag_over_settings() {
        let settings = Settings {
            api_url: None,
            rate: Some(0.1),
        };

        let args = DecayArgs {
            rate: Some(0.5),
            prune: true,
        };
        assert_eq!(
            args.query(&settings),
            vec![("rate", "0.5".to_string()), ("prune", "true".to_string())]
        );

        let args = DecayArgs::default();
        assert_eq!(args.query(&settings), vec![("rate", "0.1".to_string())]);
        assert!(args.query(&Settings::default()).is_empty());
    }

    #[test]
    fn test_view_deserializes_server_shape() {
        let json = r#"{
            "distribution": "colors",
            "Z": 4, "T": 1700000000, "rate": 0.5, "prune": false,
            "last_sync_time": 1700000000, "full": true,
            "data": [{"bin": "red", "count": 3, "p": 0.75}]
        }"#;
        let view: DistributionView = serde_json::from_str(json).unwrap();

        assert_eq!(view.z, 4);
        let row = BinRow::from(&view.data[0]);
        assert_eq!(row.p, "0.7500");
    }
}
