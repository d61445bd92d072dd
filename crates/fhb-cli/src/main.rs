use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fhb_client::{build_payload, FiscalHarmonyClient};
use fhb_config::secrets::{resolve_secrets, SecretsMode};
use fhb_config::LoadedConfig;
use fhb_log::ExchangeLog;
use fhb_schemas::{CurrencyMapping, SalesDocument, TaxMapping};
use fhb_signature::{
    apply_status_update, available_actions, classify, Action, DispatchGuard, Role, SignatureStore,
};
use std::fs;

mod store;
use store::FileStore;

#[derive(Parser)]
#[command(name = "fhb")]
#[command(about = "Fiscal Harmony bridge CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Config utilities
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },

    /// Settings-level operations against the remote service
    Settings {
        #[command(subcommand)]
        cmd: SettingsCmd,
    },

    /// Per-record signature operations
    Signature {
        #[command(subcommand)]
        cmd: SignatureCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Compute layered config hash + print canonical JSON
    Hash {
        /// Paths in merge order (base -> site -> overrides)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum SettingsCmd {
    /// Fetch the remote user profile and print its id
    CheckProfile {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Print the remote fiscal device configuration
    DeviceInfo {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// List the currency codes the service supports
    Currencies {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Print the webhook delivery URL to register with the service
    WebhookUrl {
        /// Public HTTPS host of this site (e.g. https://erp.example.co.zw)
        #[arg(long)]
        host: String,
    },

    /// Validate an API key/secret pair against the remote service
    UpdateCredentials {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Candidate API key; the secret is read from the configured env var
        #[arg(long)]
        api_key: String,
    },

    /// Push the configured mapping table to the remote service
    SyncMappings {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Which table to sync: "currency" or "tax"
        #[arg(long)]
        kind: String,
    },
}

#[derive(Subcommand)]
enum SignatureCmd {
    /// Show the computed status and permitted actions for a record
    Status {
        /// JSON record file exported from the ERP
        #[arg(long, default_value = "records.json")]
        records: String,

        /// Sales document id
        #[arg(long)]
        id: String,

        /// Viewer role: "system-manager" or "standard"
        #[arg(long, default_value = "standard")]
        role: String,
    },

    /// Resubmit a failed document for fiscalisation
    Retry {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long, default_value = "records.json")]
        records: String,

        #[arg(long)]
        id: String,

        /// JSON snapshot of the sales document being resubmitted
        #[arg(long)]
        document: String,

        #[arg(long, default_value = "standard")]
        role: String,
    },

    /// Pull signing data the webhook never delivered
    Fetch {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long, default_value = "records.json")]
        records: String,

        #[arg(long)]
        id: String,

        #[arg(long, default_value = "standard")]
        role: String,
    },

    /// Download the fiscal PDF named on a record
    AttachPdf {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long, default_value = "records.json")]
        records: String,

        #[arg(long)]
        id: String,

        /// Output path; defaults to the remote filename
        #[arg(long)]
        out: Option<String>,

        #[arg(long, default_value = "standard")]
        role: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Config { cmd } => match cmd {
            ConfigCmd::Hash { paths } => {
                let loaded = load_config(&paths)?;
                println!("config_hash={}", loaded.config_hash);
                println!("{}", loaded.canonical_json);
            }
        },

        Commands::Settings { cmd } => match cmd {
            SettingsCmd::CheckProfile { config_paths } => {
                let loaded = load_config(&config_paths)?;
                let client = make_client(&loaded)?;
                let profile_id = client.check_user_profile().await?;
                println!("user_profile_id={profile_id}");
            }

            SettingsCmd::DeviceInfo { config_paths } => {
                let loaded = load_config(&config_paths)?;
                let client = make_client(&loaded)?;
                let info = client.get_device_info().await?;
                for (key, value) in &info.fields {
                    println!("{key}={value}");
                }
            }

            SettingsCmd::Currencies { config_paths } => {
                let loaded = load_config(&config_paths)?;
                let client = make_client(&loaded)?;
                let currencies = client.supported_currencies().await?;
                println!("supported_currencies={}", currencies.join(","));
            }

            SettingsCmd::WebhookUrl { host } => {
                // The signing service only delivers to TLS endpoints.
                if !host.starts_with("https://") {
                    bail!("the webhook host must be an https:// URL, got {host}");
                }
                let host = host.trim_end_matches('/');
                println!("webhook_url={host}/api/method/capture_signatures");
            }

            SettingsCmd::UpdateCredentials {
                config_paths,
                api_key,
            } => {
                let loaded = load_config(&config_paths)?;
                let secrets = resolve_secrets(&loaded.config_json, SecretsMode::WebhookOnly)?;

                // Shape check before any network traffic.
                fhb_validate::validate_credentials(&api_key, &secrets.api_secret)?;

                let client = make_client(&loaded)?;
                client.validate_api_credentials(&api_key).await?;
                println!("credentials_valid=true");
                println!("api_key={api_key}");
            }

            SettingsCmd::SyncMappings { config_paths, kind } => {
                let loaded = load_config(&config_paths)?;
                let client = make_client(&loaded)?;

                let profile_id = client.check_user_profile().await?;
                let user_id: u64 = profile_id
                    .parse()
                    .with_context(|| format!("user profile id {profile_id} is not numeric"))?;

                match kind.as_str() {
                    "currency" => {
                        let mut rows: Vec<CurrencyMapping> = mapping_table(
                            &loaded,
                            "/fiscal_harmony/currency_mappings",
                        )?;
                        client.sync_currency_mappings(user_id, &mut rows).await?;
                        println!("synced=true kind=currency rows={}", rows.len());
                        for row in &rows {
                            println!(
                                "currency_mapping source={} destination={} id={}",
                                row.system_currency,
                                row.fiscal_harmony_currency,
                                opt_id(row.currency_id),
                            );
                        }
                    }
                    "tax" => {
                        let mut rows: Vec<TaxMapping> =
                            mapping_table(&loaded, "/fiscal_harmony/tax_mappings")?;
                        client.sync_tax_mappings(user_id, &mut rows).await?;
                        println!("synced=true kind=tax rows={}", rows.len());
                        for row in &rows {
                            println!(
                                "tax_mapping tax_code={} destination={} id={}",
                                row.tax_code,
                                row.destination_tax_id,
                                opt_id(row.tax_id),
                            );
                        }
                    }
                    other => bail!("unknown mapping kind {other}, expected currency or tax"),
                }
            }
        },

        Commands::Signature { cmd } => match cmd {
            SignatureCmd::Status { records, id, role } => {
                let store = FileStore::open(&records)?;
                let record = store.load(&id)?;
                let indicator = classify(&record)?;
                println!("id={id}");
                println!("label={}", indicator.label);
                println!("color={:?}", indicator.color);
                println!(
                    "filter=({},{},{})",
                    indicator.filter.field, indicator.filter.operator, indicator.filter.value
                );
                let actions = available_actions(&record, parse_role(&role)?);
                let names: Vec<&str> = actions.iter().map(action_name).collect();
                println!("actions={}", names.join(","));
            }

            SignatureCmd::Retry {
                config_paths,
                records,
                id,
                document,
                role,
            } => {
                let loaded = load_config(&config_paths)?;
                let client = make_client(&loaded)?;
                let mut store = FileStore::open(&records)?;
                let mut record = store.load(&id)?;

                require_action(&record, &role, Action::RetryFiscalisation)?;

                let document: SalesDocument = read_json_file(&document)?;
                if let Err(errors) = fhb_validate::validate_tax_identifiers(
                    document.customer.tax_id.as_deref(),
                    document.customer.tin_number.as_deref(),
                ) {
                    for err in &errors {
                        eprintln!("{err}");
                    }
                    bail!("tax identifiers on {id} are invalid");
                }

                let time_zone: chrono_tz::Tz = loaded
                    .time_zone()
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid site time zone: {e}"))?;
                let tax_mappings: Vec<TaxMapping> =
                    mapping_table(&loaded, "/fiscal_harmony/tax_mappings")?;

                let mut guard = DispatchGuard::new();
                guard.begin(&id)?;

                // A resubmission always goes out with the flag cleared.
                record.needs_retry = false;
                let payload = build_payload(
                    &document,
                    &record,
                    &tax_mappings,
                    loaded.include_hs_codes(),
                    time_zone,
                )?;

                match client.fiscalise(&payload).await {
                    Ok(remote_id) => {
                        record.fiscal_harmony_id = Some(remote_id);
                    }
                    Err(err) => {
                        record.needs_retry = true;
                        store.save(&id, record)?;
                        store.persist()?;
                        return Err(err);
                    }
                }
                store.save(&id, record)?;
                store.persist()?;

                let reloaded = guard.complete(&store, &id)?;
                println!("submitted=true id={id}");
                println!(
                    "fiscal_harmony_id={}",
                    reloaded.fiscal_harmony_id.as_deref().unwrap_or_default()
                );
                println!("label={}", classify(&reloaded)?.label);
            }

            SignatureCmd::Fetch {
                config_paths,
                records,
                id,
                role,
            } => {
                let loaded = load_config(&config_paths)?;
                let client = make_client(&loaded)?;
                let mut store = FileStore::open(&records)?;
                let mut record = store.load(&id)?;

                require_action(&record, &role, Action::FetchSigningData)?;

                let remote_id = record
                    .fiscal_harmony_id
                    .clone()
                    .context("record has no remote id")?;

                let mut guard = DispatchGuard::new();
                guard.begin(&id)?;

                let callback = client.fetch_signing_data(&remote_id).await?;
                apply_status_update(&mut record, &callback)?;
                store.save(&id, record)?;
                store.persist()?;

                let reloaded = guard.complete(&store, &id)?;
                println!("fetched=true id={id}");
                println!("label={}", classify(&reloaded)?.label);
                println!(
                    "fdms_url={}",
                    reloaded.signing_url.as_deref().unwrap_or_default()
                );
                println!(
                    "fiscal_harmony_filename={}",
                    reloaded.attachment_filename.as_deref().unwrap_or_default()
                );
            }

            SignatureCmd::AttachPdf {
                config_paths,
                records,
                id,
                out,
                role,
            } => {
                let loaded = load_config(&config_paths)?;
                let client = make_client(&loaded)?;
                let store = FileStore::open(&records)?;
                let record = store.load(&id)?;

                require_action(&record, &role, Action::AttachFiscalPdf)?;

                let filename = record
                    .attachment_filename
                    .clone()
                    .context("record has no fiscal PDF filename")?;

                let mut guard = DispatchGuard::new();
                guard.begin(&id)?;

                let bytes = client.download_pdf(&filename).await?;
                let out = out.unwrap_or(filename);
                fs::write(&out, &bytes).with_context(|| format!("write pdf to {out}"))?;

                let _ = guard.complete(&store, &id)?;
                println!("pdf_written=true id={id} path={out} bytes={}", bytes.len());
            }
        },
    }

    Ok(())
}

fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    fhb_config::load_layered_yaml(&path_refs)
}

fn make_client(loaded: &LoadedConfig) -> Result<FiscalHarmonyClient> {
    let secrets = resolve_secrets(&loaded.config_json, SecretsMode::Full)?;
    let api_key = secrets.api_key.clone().context("api key missing")?;
    let endpoint = loaded.endpoint()?;

    let log_path =
        std::env::var("FHB_LOG_PATH").unwrap_or_else(|_| "logs/exchanges.jsonl".to_string());
    let log = ExchangeLog::new(log_path)?;

    FiscalHarmonyClient::new(endpoint, api_key, secrets.api_secret, log)
}

fn mapping_table<T: serde::de::DeserializeOwned>(
    loaded: &LoadedConfig,
    pointer: &str,
) -> Result<Vec<T>> {
    match loaded.config_json.pointer(pointer) {
        Some(v) => serde_json::from_value(v.clone())
            .with_context(|| format!("parse mapping table at {pointer}")),
        None => Ok(Vec::new()),
    }
}

fn parse_role(role: &str) -> Result<Role> {
    match role {
        "system-manager" => Ok(Role::SystemManager),
        "standard" => Ok(Role::Standard),
        other => bail!("unknown role {other}, expected system-manager or standard"),
    }
}

fn require_action(
    record: &fhb_schemas::SignatureRecord,
    role: &str,
    action: Action,
) -> Result<()> {
    let role = parse_role(role)?;
    if !available_actions(record, role).contains(&action) {
        bail!(
            "{} is not available on this record for the given role",
            action_name(&action)
        );
    }
    Ok(())
}

fn action_name(action: &Action) -> &'static str {
    match action {
        Action::RetryFiscalisation => "retry-fiscalisation",
        Action::FetchSigningData => "fetch-signing-data",
        Action::AttachFiscalPdf => "attach-fiscal-pdf",
    }
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {path}"))
}

fn opt_id(id: Option<u64>) -> String {
    id.map(|v| v.to_string()).unwrap_or_default()
}
