//! HTTP client for the Fiscal Harmony API.
//!
//! Every exchange, successful or not, is appended to the [`ExchangeLog`]
//! before the result is returned. GET requests carry the identity headers;
//! requests with a body are additionally signed (see [`crate::signing`]).

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use fhb_log::{ExchangeEntry, ExchangeLog, ExchangeStatus};
use fhb_schemas::{CurrencyMapping, DeviceInfo, FiscalPayload, SignatureCallback, TaxMapping};
use serde_json::{json, Value};

use crate::signing::{canonical_body, sign_payload};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_APPLICATION: &str = "FiscalHarmonyBridge";
const DEFAULT_STATION: &str = "fhb";

/// Why a credential probe failed. Each variant maps to a distinct
/// operator-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialCheckError {
    /// 401: the key or secret is wrong.
    AuthenticationFailed,
    /// 404: the endpoint address does not host the service.
    EndpointNotFound,
    /// 5xx: the revenue authority is down; the credentials are undecided.
    AuthorityUnavailable,
    /// Any other non-success status.
    Rejected { status: u16 },
    /// The request never completed (timeout, DNS, TLS, ...).
    Transport { detail: String },
}

impl std::fmt::Display for CredentialCheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialCheckError::AuthenticationFailed => {
                write!(f, "failed to authenticate, check the API details")
            }
            CredentialCheckError::EndpointNotFound => {
                write!(f, "unable to locate the service, check the endpoint address")
            }
            CredentialCheckError::AuthorityUnavailable => {
                write!(f, "the revenue authority is unavailable")
            }
            CredentialCheckError::Rejected { status } => {
                write!(f, "the service rejected the credential probe ({status})")
            }
            CredentialCheckError::Transport { detail } => {
                write!(f, "the credential probe did not complete: {detail}")
            }
        }
    }
}

impl std::error::Error for CredentialCheckError {}

/// Which mapping table a sync run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    Currency,
    Tax,
}

impl MappingKind {
    fn route_name(self) -> &'static str {
        match self {
            MappingKind::Currency => "currency",
            MappingKind::Tax => "tax",
        }
    }
}

/// One mapping row in transit, independent of table shape.
struct MappingRow {
    remote_id: Option<u64>,
    body: Value,
}

pub struct FiscalHarmonyClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    api_secret: String,
    application: String,
    station: String,
    log: ExchangeLog,
}

impl std::fmt::Debug for FiscalHarmonyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiscalHarmonyClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<REDACTED>")
            .field("api_secret", &"<REDACTED>")
            .finish_non_exhaustive()
    }
}

impl FiscalHarmonyClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        log: ExchangeLog,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            application: DEFAULT_APPLICATION.to_string(),
            station: DEFAULT_STATION.to_string(),
            log,
        })
    }

    /// Override the application/station identity headers.
    pub fn with_identity(mut self, application: impl Into<String>, station: impl Into<String>) -> Self {
        self.application = application.into();
        self.station = station.into();
        self
    }

    /// Fetch the user profile and return its remote `Id`.
    pub async fn check_user_profile(&self) -> Result<String> {
        let body = self.get_json("/profile").await?;
        body.get("Id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("profile response carries no Id"))
    }

    /// Fetch the fiscal device configuration.
    pub async fn get_device_info(&self) -> Result<DeviceInfo> {
        let body = self.get_json("/fiscaldevice").await?;
        serde_json::from_value(body).context("parse fiscal device response")
    }

    /// List the currency codes the service supports.
    pub async fn supported_currencies(&self) -> Result<Vec<String>> {
        let body = self.get_json("/currencymapping/supported-currencies").await?;
        serde_json::from_value(body).context("parse supported currencies response")
    }

    /// Probe `/fiscaldevice` with a candidate key. Success means the pair
    /// may be stored; the stored key is not consulted.
    pub async fn validate_api_credentials(
        &self,
        candidate_key: &str,
    ) -> Result<(), CredentialCheckError> {
        let url = self.request_url("/fiscaldevice");
        let mut entry = ExchangeEntry::new(ExchangeStatus::Success, &url);

        let response = match self
            .http
            .get(&url)
            .header("X-Api-Key", candidate_key)
            .header("X-Application", &self.application)
            .header("X-App-Station", &self.station)
            .send()
            .await
        {
            Ok(r) => r,
            Err(err) => {
                entry.status = ExchangeStatus::Failure;
                self.record(entry.with_error(err.to_string()));
                return Err(CredentialCheckError::Transport {
                    detail: err.to_string(),
                });
            }
        };

        let status = response.status().as_u16();
        entry.response_status_code = Some(status);
        if response.status().is_success() {
            self.record(entry);
            return Ok(());
        }

        let err = match status {
            401 => CredentialCheckError::AuthenticationFailed,
            404 => CredentialCheckError::EndpointNotFound,
            s if s >= 500 => CredentialCheckError::AuthorityUnavailable,
            s => CredentialCheckError::Rejected { status: s },
        };
        entry.status = exchange_status(status);
        self.record(entry.with_error(err.to_string()));
        Err(err)
    }

    /// Submit a document for fiscalisation. The response body is the
    /// remote id assigned to the submission.
    pub async fn fiscalise(&self, payload: &FiscalPayload) -> Result<String> {
        let route = if payload.is_credit_note() {
            "/creditnote"
        } else {
            "/invoice"
        };
        let body = canonical_body(payload)?;
        let url = self.request_url(route);
        let mut entry = ExchangeEntry::new(ExchangeStatus::Success, &url)
            .with_payload(serde_json::to_value(payload).context("serialize payload for log")?);

        let response = match self.post_signed(&url, body).await {
            Ok(r) => r,
            Err(err) => {
                entry.status = ExchangeStatus::Failure;
                self.record(entry.with_error(err.to_string()));
                return Err(err);
            }
        };

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        entry.response_status_code = Some(status);
        entry.response = Some(Value::String(text.clone()));

        if !(200..300).contains(&status) {
            entry.status = exchange_status(status);
            if entry.status == ExchangeStatus::Unauthorised {
                entry.signature_valid = false;
            }
            self.record(entry.with_error(format!("status {status} whilst signing")));
            bail!("fiscalisation submission failed with status {status}");
        }

        entry.request_id = Some(text.clone());
        self.record(entry);
        Ok(text)
    }

    /// Fetch the signing outcome for a submission whose webhook callback
    /// never arrived. The service answers a one-element array.
    pub async fn fetch_signing_data(&self, remote_id: &str) -> Result<SignatureCallback> {
        let body = canonical_body(&json!([remote_id]))?;
        let url = self.request_url("status");
        let mut entry = ExchangeEntry::new(ExchangeStatus::Success, &url)
            .with_request_id(remote_id)
            .with_payload(json!([remote_id]));

        let response = match self.post_signed(&url, body).await {
            Ok(r) => r,
            Err(err) => {
                entry.status = ExchangeStatus::Failure;
                self.record(entry.with_error(err.to_string()));
                return Err(err);
            }
        };

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        entry.response_status_code = Some(status);
        entry.response = serde_json::from_str(&text).ok();

        if !(200..300).contains(&status) {
            entry.status = exchange_status(status);
            if entry.status == ExchangeStatus::Unauthorised {
                entry.signature_valid = false;
            }
            self.record(entry.with_error(format!("status {status} whilst fetching signing data")));
            bail!("signing data fetch failed with status {status}");
        }

        let mut callbacks: Vec<SignatureCallback> = match serde_json::from_str(&text) {
            Ok(c) => c,
            Err(err) => {
                entry.status = ExchangeStatus::InvalidJson;
                self.record(entry.with_error(err.to_string()));
                return Err(err).context("parse signing data response");
            }
        };
        if callbacks.is_empty() {
            entry.status = ExchangeStatus::Failure;
            self.record(entry.with_error("empty signing data response"));
            bail!("the service returned no signing data for {remote_id}");
        }
        self.record(entry);
        Ok(callbacks.remove(0))
    }

    /// Download the fiscal PDF named on a record.
    pub async fn download_pdf(&self, filename: &str) -> Result<Vec<u8>> {
        let url = self.request_url(&format!("/download/{filename}"));
        let mut entry = ExchangeEntry::new(ExchangeStatus::Success, &url);

        let response = match self.get_raw(&url).await {
            Ok(r) => r,
            Err(err) => {
                entry.status = ExchangeStatus::Failure;
                self.record(entry.with_error(err.to_string()));
                return Err(err);
            }
        };

        let status = response.status().as_u16();
        entry.response_status_code = Some(status);
        if !(200..300).contains(&status) {
            entry.status = exchange_status(status);
            self.record(entry.with_error(format!("status {status} whilst downloading {filename}")));
            bail!("pdf download failed with status {status}");
        }

        let bytes = response.bytes().await.context("read pdf body")?;
        self.record(entry);
        Ok(bytes.to_vec())
    }

    /// Push local currency mappings, assigning remote ids to new rows and
    /// deleting remote rows no longer present locally.
    pub async fn sync_currency_mappings(
        &self,
        user_id: u64,
        rows: &mut [CurrencyMapping],
    ) -> Result<()> {
        let wire: Vec<MappingRow> = rows
            .iter()
            .map(|r| MappingRow {
                remote_id: r.currency_id,
                body: json!({
                    "UserId": user_id,
                    "SourceCurrency": r.system_currency,
                    "DestinationCurrency": r.fiscal_harmony_currency,
                }),
            })
            .collect();
        let assigned = self.sync_rows(MappingKind::Currency, wire).await?;
        for (row, id) in rows.iter_mut().zip(assigned) {
            row.currency_id = id;
        }
        Ok(())
    }

    /// Push local tax mappings; same contract as currency sync.
    pub async fn sync_tax_mappings(&self, user_id: u64, rows: &mut [TaxMapping]) -> Result<()> {
        let wire: Vec<MappingRow> = rows
            .iter()
            .map(|r| MappingRow {
                remote_id: r.tax_id,
                body: json!({
                    "UserId": user_id,
                    "TaxCode": r.tax_code,
                    "DestinationTaxId": r.destination_tax_id,
                }),
            })
            .collect();
        let assigned = self.sync_rows(MappingKind::Tax, wire).await?;
        for (row, id) in rows.iter_mut().zip(assigned) {
            row.tax_id = id;
        }
        Ok(())
    }

    async fn sync_rows(&self, kind: MappingKind, rows: Vec<MappingRow>) -> Result<Vec<Option<u64>>> {
        let route_name = kind.route_name();
        let post_url = self.request_url(&format!("/{route_name}mapping"));
        let mut kept: Vec<u64> = Vec::new();
        let mut assigned: Vec<Option<u64>> = Vec::with_capacity(rows.len());

        for row in rows {
            let mut body = row.body;
            let url = match row.remote_id {
                Some(id) => {
                    body["Id"] = json!(id);
                    self.request_url(&format!("/{route_name}mapping/{id}"))
                }
                None => post_url.clone(),
            };
            let encoded = canonical_body(&body)?;
            let mut entry =
                ExchangeEntry::new(ExchangeStatus::Success, &url).with_payload(body.clone());

            let request = match row.remote_id {
                Some(_) => self.http.put(&url),
                None => self.http.post(&url),
            };
            let signature = sign_payload(&self.api_secret, &encoded);
            let response = match request
                .header("X-Api-Key", &self.api_key)
                .header("X-Application", &self.application)
                .header("X-App-Station", &self.station)
                .header("X-Api-Signature", signature)
                .header("Content-Type", "application/json")
                .body(encoded)
                .send()
                .await
            {
                Ok(r) => r,
                Err(err) => {
                    entry.status = ExchangeStatus::Failure;
                    self.record(entry.with_error(err.to_string()));
                    return Err(err).context("send mapping row");
                }
            };

            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            entry.response_status_code = Some(status);
            entry.response = serde_json::from_str(&text).ok();

            if !(200..300).contains(&status) {
                entry.status = exchange_status(status);
                if entry.status == ExchangeStatus::Unauthorised {
                    entry.signature_valid = false;
                }
                self.record(
                    entry.with_error(format!("status {status} whilst syncing {route_name} mappings")),
                );
                bail!("{route_name} mapping sync failed with status {status}");
            }
            self.record(entry);

            let id = match row.remote_id {
                Some(id) => id,
                None => serde_json::from_str::<Value>(&text)
                    .ok()
                    .and_then(|v| v.get("Id").and_then(Value::as_u64))
                    .ok_or_else(|| anyhow!("{route_name} mapping response carries no Id"))?,
            };
            kept.push(id);
            assigned.push(Some(id));
        }

        // Remote rows absent from the local table are stale; delete them.
        let listing = self.get_json(&format!("/{route_name}mapping")).await?;
        let remote: Vec<Value> =
            serde_json::from_value(listing).context("parse mapping listing")?;
        for mapping in remote {
            let Some(id) = mapping.get("Id").and_then(Value::as_u64) else {
                continue;
            };
            if kept.contains(&id) {
                continue;
            }
            let url = self.request_url(&format!("/{route_name}mapping/{id}"));
            let mut entry = ExchangeEntry::new(ExchangeStatus::Success, &url);
            match self
                .http
                .delete(&url)
                .header("X-Api-Key", &self.api_key)
                .header("X-Application", &self.application)
                .header("X-App-Station", &self.station)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status().as_u16();
                    entry.response_status_code = Some(status);
                    if !(200..300).contains(&status) {
                        entry.status = exchange_status(status);
                        entry = entry
                            .with_error(format!("status {status} whilst deleting {route_name} mappings"));
                    }
                    self.record(entry);
                }
                Err(err) => {
                    entry.status = ExchangeStatus::Failure;
                    self.record(entry.with_error(err.to_string()));
                    return Err(err).context("delete stale mapping");
                }
            }
        }

        Ok(assigned)
    }

    async fn get_raw(&self, url: &str) -> Result<reqwest::Response> {
        self.http
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .header("X-Application", &self.application)
            .header("X-App-Station", &self.station)
            .send()
            .await
            .with_context(|| format!("GET {url}"))
    }

    /// Plain GET returning the parsed JSON body, logged either way.
    async fn get_json(&self, route: &str) -> Result<Value> {
        let url = self.request_url(route);
        let mut entry = ExchangeEntry::new(ExchangeStatus::Success, &url);

        let response = match self.get_raw(&url).await {
            Ok(r) => r,
            Err(err) => {
                entry.status = ExchangeStatus::Failure;
                self.record(entry.with_error(err.to_string()));
                return Err(err);
            }
        };

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        entry.response_status_code = Some(status);
        entry.response = serde_json::from_str(&text).ok();

        if !(200..300).contains(&status) {
            entry.status = exchange_status(status);
            self.record(entry.with_error(format!("status {status} on GET {route}")));
            bail!("GET {route} failed with status {status}");
        }
        self.record(entry);
        serde_json::from_str(&text).with_context(|| format!("parse GET {route} response"))
    }

    async fn post_signed(&self, url: &str, body: String) -> Result<reqwest::Response> {
        let signature = sign_payload(&self.api_secret, &body);
        self.http
            .post(url)
            .header("X-Api-Key", &self.api_key)
            .header("X-Application", &self.application)
            .header("X-App-Station", &self.station)
            .header("X-Api-Signature", signature)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))
    }

    fn request_url(&self, route: &str) -> String {
        if route.starts_with('/') {
            format!("{}{}", self.endpoint, route)
        } else {
            format!("{}/{}", self.endpoint, route)
        }
    }

    /// Logging must never mask the outcome of the exchange itself.
    fn record(&self, entry: ExchangeEntry) {
        if let Err(err) = self.log.append(&entry) {
            tracing::warn!(error = %err, "failed to append exchange log entry");
        }
    }
}

/// 400 means the service rejected our JSON; 401 is an authentication
/// failure; everything else non-success is a generic failure.
fn exchange_status(status_code: u16) -> ExchangeStatus {
    match status_code {
        400 => ExchangeStatus::InvalidJson,
        401 => ExchangeStatus::Unauthorised,
        _ => ExchangeStatus::Failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> FiscalHarmonyClient {
        let path = std::env::temp_dir().join(format!(
            "fhb_client_test_{}_{}",
            std::process::id(),
            uuid_suffix()
        ));
        FiscalHarmonyClient::new(
            "https://api.fiscalharmony.co.zw/api",
            "KEY",
            "SECRET",
            ExchangeLog::new(path).unwrap(),
        )
        .unwrap()
    }

    fn uuid_suffix() -> u128 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    }

    #[test]
    fn request_url_handles_both_route_forms() {
        let c = client();
        assert_eq!(
            c.request_url("/profile"),
            "https://api.fiscalharmony.co.zw/api/profile"
        );
        assert_eq!(
            c.request_url("status"),
            "https://api.fiscalharmony.co.zw/api/status"
        );
    }

    #[test]
    fn non_success_statuses_classify_for_the_log() {
        assert_eq!(exchange_status(400), ExchangeStatus::InvalidJson);
        assert_eq!(exchange_status(401), ExchangeStatus::Unauthorised);
        assert_eq!(exchange_status(404), ExchangeStatus::Failure);
        assert_eq!(exchange_status(503), ExchangeStatus::Failure);
    }

    #[test]
    fn credential_errors_render_operator_messages() {
        assert_eq!(
            CredentialCheckError::AuthenticationFailed.to_string(),
            "failed to authenticate, check the API details"
        );
        assert_eq!(
            CredentialCheckError::AuthorityUnavailable.to_string(),
            "the revenue authority is unavailable"
        );
    }
}
