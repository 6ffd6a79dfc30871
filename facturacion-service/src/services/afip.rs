//! Tax-authority (AFIP) client.
//!
//! Owns the process-wide access-ticket cache and the two web-service calls
//! the workflow needs: last authorized voucher number (WSFE
//! `FECompUltimoAutorizado`) and voucher authorization (WSFE
//! `FECAESolicitar`). Authentication goes through the WSAA login exchange.
//!
//! Wire formatting is a fixed contract: dates travel as 8-digit
//! year-month-day strings and amounts with exactly two decimal digits; the
//! authority rejects anything else.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use service_core::config::AfipConfig;
use service_core::error::AppError;
use service_core::utils::signature::sign_payload;

use crate::models::fiscal::{AccessTicket, AuthorizationApproval, AuthorizationRequest};
use crate::models::invoice::DocumentType;
use crate::services::metrics::{AUTHORITY_REQUESTS_TOTAL, AUTHORITY_REQUEST_DURATION};

/// Operations the invoice workflow needs from the authority.
#[async_trait]
pub trait FiscalAuthority: Send + Sync {
    /// Last voucher number the authority has authorized for the
    /// (point of sale, document type) sequence. Zero when none exists.
    async fn last_voucher_number(
        &self,
        point_of_sale: u32,
        document_type: DocumentType,
    ) -> Result<u64, AppError>;

    /// Submit a voucher for authorization and parse the authority's answer.
    async fn request_authorization(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationApproval, AppError>;
}

/// Signs the login ticket request.
///
/// The production WSAA exchange requires a CMS (PKCS#7) signature made with
/// the taxpayer certificate and private key; that implementation plugs in
/// here. The HMAC signer below is what the homologation environment of this
/// service runs with.
pub trait TicketSigner: Send + Sync {
    fn sign(&self, ticket_request: &str) -> Result<String, AppError>;
}

/// HMAC-SHA256 development signer.
pub struct HmacTicketSigner {
    secret: Secret<String>,
}

impl HmacTicketSigner {
    pub fn new(secret: Secret<String>) -> Self {
        Self { secret }
    }
}

impl TicketSigner for HmacTicketSigner {
    fn sign(&self, ticket_request: &str) -> Result<String, AppError> {
        sign_payload(self.secret.expose_secret(), ticket_request).map_err(AppError::InternalError)
    }
}

/// HTTP client for the authority web services.
pub struct AfipClient {
    client: reqwest::Client,
    config: AfipConfig,
    signer: Arc<dyn TicketSigner>,
    ticket: RwLock<Option<AccessTicket>>,
}

impl AfipClient {
    pub fn new(config: AfipConfig) -> Self {
        let signer = Arc::new(HmacTicketSigner::new(config.signing_secret.clone()));
        Self::with_signer(config, signer)
    }

    pub fn with_signer(config: AfipConfig, signer: Arc<dyn TicketSigner>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            signer,
            ticket: RwLock::new(None),
        }
    }

    /// Returns a valid ticket, performing the login exchange if the cached
    /// one is absent or expired. At most one refresh attempt per call;
    /// concurrent callers may refresh redundantly, which the authority
    /// tolerates.
    async fn ensure_ticket(&self) -> Result<AccessTicket, AppError> {
        if let Some(ticket) = self.ticket.read().await.as_ref() {
            if ticket.is_valid_at(Utc::now()) {
                return Ok(ticket.clone());
            }
        }

        let fresh = self.login().await?;
        *self.ticket.write().await = Some(fresh.clone());
        Ok(fresh)
    }

    #[instrument(skip(self), fields(cuit = %self.config.cuit))]
    async fn login(&self) -> Result<AccessTicket, AppError> {
        let timer = AUTHORITY_REQUEST_DURATION
            .with_label_values(&["login"])
            .start_timer();

        let now = Utc::now();
        let ticket_request = self.build_ticket_request(now);
        let cms = self.signer.sign(&ticket_request)?;

        let response = self
            .client
            .post(self.config.wsaa_url())
            .json(&LoginBody {
                login_cms: LoginCms { in0: cms },
            })
            .send()
            .await
            .map_err(|e| self.count_transport_error("login", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.count_transport_error("login", e))?;

        debug!(status = %status, "authority login response");

        if !status.is_success() {
            return Err(self.count_http_error("login", status, &body));
        }

        let parsed: LoginResponse = serde_json::from_str(&body).map_err(|e| {
            AUTHORITY_REQUESTS_TOTAL
                .with_label_values(&["login", "rejected"])
                .inc();
            AppError::AuthorityRejected {
                reason: format!("malformed login response: {}", e),
            }
        })?;

        timer.observe_duration();
        AUTHORITY_REQUESTS_TOTAL
            .with_label_values(&["login", "ok"])
            .inc();

        info!(expires_at = %parsed.expiration_time, "authority ticket obtained");

        Ok(AccessTicket {
            token: parsed.token,
            sign: parsed.sign,
            expires_at: parsed.expiration_time,
        })
    }

    /// Login ticket request document for the `wsfe` service.
    fn build_ticket_request(&self, now: DateTime<Utc>) -> String {
        let expires = now + Duration::hours(self.config.ticket_ttl_hours);
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<loginTicketRequest version="1.0">
  <header>
    <uniqueId>{}</uniqueId>
    <generationTime>{}</generationTime>
    <expirationTime>{}</expirationTime>
  </header>
  <service>wsfe</service>
</loginTicketRequest>"#,
            now.timestamp(),
            now.to_rfc3339_opts(SecondsFormat::Secs, true),
            expires.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    }

    fn auth(&self, ticket: &AccessTicket) -> WireAuth {
        WireAuth {
            token: ticket.token.clone(),
            sign: ticket.sign.clone(),
            cuit: self.config.cuit.clone(),
        }
    }

    fn count_transport_error(&self, operation: &str, err: reqwest::Error) -> AppError {
        AUTHORITY_REQUESTS_TOTAL
            .with_label_values(&[operation, "unreachable"])
            .inc();
        AppError::AuthorityUnreachable(anyhow::Error::new(err))
    }

    fn count_http_error(
        &self,
        operation: &str,
        status: reqwest::StatusCode,
        body: &str,
    ) -> AppError {
        if status.is_server_error() {
            AUTHORITY_REQUESTS_TOTAL
                .with_label_values(&[operation, "unreachable"])
                .inc();
            AppError::AuthorityUnreachable(anyhow::anyhow!("HTTP {}: {}", status, body))
        } else {
            AUTHORITY_REQUESTS_TOTAL
                .with_label_values(&[operation, "rejected"])
                .inc();
            AppError::AuthorityRejected {
                reason: format!("HTTP {}: {}", status, body),
            }
        }
    }
}

#[async_trait]
impl FiscalAuthority for AfipClient {
    #[instrument(skip(self))]
    async fn last_voucher_number(
        &self,
        point_of_sale: u32,
        document_type: DocumentType,
    ) -> Result<u64, AppError> {
        let ticket = self.ensure_ticket().await?;

        let timer = AUTHORITY_REQUEST_DURATION
            .with_label_values(&["last_voucher"])
            .start_timer();

        let body = LastVoucherBody {
            request: LastVoucherRequest {
                auth: self.auth(&ticket),
                point_of_sale,
                voucher_type: document_type.code(),
            },
        };

        let response = self
            .client
            .post(self.config.wsfe_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.count_transport_error("last_voucher", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.count_transport_error("last_voucher", e))?;

        debug!(status = %status, body = %text, "last voucher response");

        if !status.is_success() {
            return Err(self.count_http_error("last_voucher", status, &text));
        }

        let parsed: LastVoucherResponse = serde_json::from_str(&text).map_err(|e| {
            AUTHORITY_REQUESTS_TOTAL
                .with_label_values(&["last_voucher", "rejected"])
                .inc();
            AppError::AuthorityRejected {
                reason: format!("malformed last-voucher response: {}", e),
            }
        })?;

        if let Some(reason) = join_errors(&parsed.result.errors) {
            AUTHORITY_REQUESTS_TOTAL
                .with_label_values(&["last_voucher", "rejected"])
                .inc();
            return Err(AppError::AuthorityRejected { reason });
        }

        timer.observe_duration();
        AUTHORITY_REQUESTS_TOTAL
            .with_label_values(&["last_voucher", "ok"])
            .inc();

        Ok(parsed.result.voucher_number.max(0) as u64)
    }

    #[instrument(
        skip_all,
        fields(
            point_of_sale = request.point_of_sale,
            document_type = request.document_type.as_str(),
            voucher_number = request.voucher_number
        )
    )]
    async fn request_authorization(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationApproval, AppError> {
        let ticket = self.ensure_ticket().await?;

        let timer = AUTHORITY_REQUEST_DURATION
            .with_label_values(&["request_cae"])
            .start_timer();

        let body = CaeBody {
            request: CaeRequest {
                auth: self.auth(&ticket),
                detail: FeCaeReq {
                    header: FeCabReq {
                        record_count: 1,
                        point_of_sale: request.point_of_sale,
                        voucher_type: request.document_type.code(),
                    },
                    detail: FeDetReq {
                        request: build_detail(request),
                    },
                },
            },
        };

        let response = self
            .client
            .post(self.config.wsfe_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.count_transport_error("request_cae", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.count_transport_error("request_cae", e))?;

        debug!(status = %status, body = %text, "authorization response");

        if !status.is_success() {
            return Err(self.count_http_error("request_cae", status, &text));
        }

        let raw: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            AUTHORITY_REQUESTS_TOTAL
                .with_label_values(&["request_cae", "rejected"])
                .inc();
            AppError::AuthorityRejected {
                reason: format!("malformed authorization response: {}", e),
            }
        })?;

        let approval = parse_authorization_response(&raw).map_err(|e| {
            AUTHORITY_REQUESTS_TOTAL
                .with_label_values(&["request_cae", "rejected"])
                .inc();
            e
        })?;

        timer.observe_duration();
        AUTHORITY_REQUESTS_TOTAL
            .with_label_values(&["request_cae", "ok"])
            .inc();

        info!(
            authorization_code = %approval.authorization_code,
            voucher_number = approval.voucher_number,
            expires_on = %approval.expires_on,
            "authorization code received"
        );

        Ok(approval)
    }
}

fn build_detail(request: &AuthorizationRequest) -> FeCaeDetRequest {
    FeCaeDetRequest {
        concept: 1, // products
        doc_type: request.buyer_doc_type.code(),
        doc_number: request.buyer_doc_number.clone(),
        voucher_from: request.voucher_number,
        voucher_to: request.voucher_number,
        voucher_date: format_fiscal_date(request.issue_date),
        total: format_amount(request.total_amount),
        untaxed: format_amount(Decimal::ZERO),
        net: format_amount(request.net_amount),
        exempt: format_amount(Decimal::ZERO),
        tax: format_amount(request.tax_amount),
        currency: "PES".to_string(),
        exchange_rate: 1,
        associated: request.related_voucher.map(|related| {
            vec![AssociatedVoucher {
                voucher_type: related.document_type.code(),
                point_of_sale: related.point_of_sale,
                number: related.voucher_number,
            }]
        }),
    }
}

/// Parses the `FECAESolicitarResult` payload into an approval, surfacing the
/// authority's own rejection reasons when present.
fn parse_authorization_response(raw: &serde_json::Value) -> Result<AuthorizationApproval, AppError> {
    let parsed: CaeResponse = serde_json::from_value(raw.clone()).map_err(|e| {
        AppError::AuthorityRejected {
            reason: format!("malformed authorization response: {}", e),
        }
    })?;

    if let Some(reason) = join_errors(&parsed.result.errors) {
        return Err(AppError::AuthorityRejected { reason });
    }

    let detail =
        parsed
            .result
            .details
            .into_iter()
            .next()
            .ok_or_else(|| AppError::AuthorityRejected {
                reason: "authorization response carried no voucher detail".to_string(),
            })?;

    if detail.result.as_deref() == Some("R") {
        let reason = detail
            .observations
            .unwrap_or_default()
            .into_iter()
            .map(|o| format!("{}: {}", o.code, o.msg))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(AppError::AuthorityRejected {
            reason: if reason.is_empty() {
                "voucher rejected without observations".to_string()
            } else {
                reason
            },
        });
    }

    Ok(AuthorizationApproval {
        authorization_code: detail.cae,
        expires_on: parse_fiscal_date(&detail.cae_expiry)?,
        voucher_number: detail.voucher_from,
        raw: raw.clone(),
    })
}

fn join_errors(errors: &[WireError]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    Some(
        errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.msg))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// 8-digit year-month-day encoding used everywhere on the wire.
pub fn format_fiscal_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

pub fn parse_fiscal_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| AppError::AuthorityRejected {
            reason: format!("unparseable date in authority response: {:?}", s),
        })
}

/// Exactly two decimal digits, half-up. The authority compares amounts
/// textually, so this must not vary.
pub fn format_amount(amount: Decimal) -> String {
    let cents = (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let cents = cents.to_i128().unwrap_or_default();
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

// Wire payloads. Field names are the authority's, verbatim.

#[derive(Serialize)]
struct LoginBody {
    #[serde(rename = "loginCms")]
    login_cms: LoginCms,
}

#[derive(Serialize)]
struct LoginCms {
    in0: String,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    sign: String,
    #[serde(rename = "expirationTime")]
    expiration_time: DateTime<Utc>,
}

#[derive(Serialize)]
struct WireAuth {
    #[serde(rename = "Token")]
    token: String,
    #[serde(rename = "Sign")]
    sign: String,
    #[serde(rename = "Cuit")]
    cuit: String,
}

#[derive(Serialize)]
struct LastVoucherBody {
    #[serde(rename = "FECompUltimoAutorizado")]
    request: LastVoucherRequest,
}

#[derive(Serialize)]
struct LastVoucherRequest {
    #[serde(rename = "Auth")]
    auth: WireAuth,
    #[serde(rename = "PtoVta")]
    point_of_sale: u32,
    #[serde(rename = "CbteTipo")]
    voucher_type: u32,
}

#[derive(Deserialize)]
struct LastVoucherResponse {
    #[serde(rename = "FECompUltimoAutorizadoResult")]
    result: LastVoucherResult,
}

#[derive(Deserialize)]
struct LastVoucherResult {
    #[serde(rename = "CbteNro")]
    voucher_number: i64,
    #[serde(rename = "Errors", default)]
    errors: Vec<WireError>,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(rename = "Code")]
    code: i64,
    #[serde(rename = "Msg")]
    msg: String,
}

#[derive(Serialize)]
struct CaeBody {
    #[serde(rename = "FECAESolicitar")]
    request: CaeRequest,
}

#[derive(Serialize)]
struct CaeRequest {
    #[serde(rename = "Auth")]
    auth: WireAuth,
    #[serde(rename = "FeCAEReq")]
    detail: FeCaeReq,
}

#[derive(Serialize)]
struct FeCaeReq {
    #[serde(rename = "FeCabReq")]
    header: FeCabReq,
    #[serde(rename = "FeDetReq")]
    detail: FeDetReq,
}

#[derive(Serialize)]
struct FeCabReq {
    #[serde(rename = "CantReg")]
    record_count: u32,
    #[serde(rename = "PtoVta")]
    point_of_sale: u32,
    #[serde(rename = "CbteTipo")]
    voucher_type: u32,
}

#[derive(Serialize)]
struct FeDetReq {
    #[serde(rename = "FECAEDetRequest")]
    request: FeCaeDetRequest,
}

#[derive(Serialize)]
struct FeCaeDetRequest {
    #[serde(rename = "Concepto")]
    concept: u32,
    #[serde(rename = "DocTipo")]
    doc_type: u32,
    #[serde(rename = "DocNro")]
    doc_number: String,
    #[serde(rename = "CbteDesde")]
    voucher_from: u64,
    #[serde(rename = "CbteHasta")]
    voucher_to: u64,
    #[serde(rename = "CbteFch")]
    voucher_date: String,
    #[serde(rename = "ImpTotal")]
    total: String,
    #[serde(rename = "ImpTotConc")]
    untaxed: String,
    #[serde(rename = "ImpNeto")]
    net: String,
    #[serde(rename = "ImpOpEx")]
    exempt: String,
    #[serde(rename = "ImpIVA")]
    tax: String,
    #[serde(rename = "MonId")]
    currency: String,
    #[serde(rename = "MonCotiz")]
    exchange_rate: u32,
    #[serde(rename = "CbtesAsoc", skip_serializing_if = "Option::is_none")]
    associated: Option<Vec<AssociatedVoucher>>,
}

#[derive(Serialize)]
struct AssociatedVoucher {
    #[serde(rename = "Tipo")]
    voucher_type: u32,
    #[serde(rename = "PtoVta")]
    point_of_sale: u32,
    #[serde(rename = "Nro")]
    number: u64,
}

#[derive(Deserialize)]
struct CaeResponse {
    #[serde(rename = "FECAESolicitarResult")]
    result: CaeResult,
}

#[derive(Deserialize)]
struct CaeResult {
    #[serde(rename = "FeDetResp", default)]
    details: Vec<CaeDetail>,
    #[serde(rename = "Errors", default)]
    errors: Vec<WireError>,
}

#[derive(Deserialize)]
struct CaeDetail {
    #[serde(rename = "CAE")]
    cae: String,
    #[serde(rename = "CAEFchVto")]
    cae_expiry: String,
    #[serde(rename = "CbteDesde")]
    voucher_from: u64,
    #[serde(rename = "Resultado", default)]
    result: Option<String>,
    #[serde(rename = "Observaciones", default)]
    observations: Option<Vec<WireObservation>>,
}

#[derive(Deserialize)]
struct WireObservation {
    #[serde(rename = "Code")]
    code: i64,
    #[serde(rename = "Msg")]
    msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use service_core::config::AfipEnvironment;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn test_config() -> AfipConfig {
        AfipConfig {
            cuit: "20123456789".into(),
            environment: AfipEnvironment::Homologacion,
            signing_secret: Secret::new("dev-secret".into()),
            ticket_ttl_hours: 24,
        }
    }

    #[test]
    fn ticket_request_carries_service_and_window() {
        let client = AfipClient::new(test_config());
        let now = Utc::now();
        let document = client.build_ticket_request(now);

        assert!(document.contains("<service>wsfe</service>"));
        assert!(document.contains(&format!("<uniqueId>{}</uniqueId>", now.timestamp())));
        assert!(document.contains("<generationTime>"));
        assert!(document.contains("<expirationTime>"));
    }

    #[test]
    fn hmac_signer_is_deterministic() {
        let signer = HmacTicketSigner::new(Secret::new("dev-secret".into()));
        let a = signer.sign("<loginTicketRequest/>").unwrap();
        let b = signer.sign("<loginTicketRequest/>").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, signer.sign("<other/>").unwrap());
    }

    #[test]
    fn fiscal_dates_are_eight_digits() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(format_fiscal_date(date), "20260307");
        assert_eq!(parse_fiscal_date("20260307").unwrap(), date);
        assert_eq!(parse_fiscal_date("2026-03-07").unwrap(), date);
        assert!(parse_fiscal_date("07/03/2026").is_err());
    }

    #[test]
    fn amounts_always_carry_two_decimals() {
        assert_eq!(format_amount(dec("15000")), "15000.00");
        assert_eq!(format_amount(dec("3150.5")), "3150.50");
        assert_eq!(format_amount(dec("0.005")), "0.01");
        assert_eq!(format_amount(dec("-5.5")), "-5.50");
        assert_eq!(format_amount(Decimal::ZERO), "0.00");
    }

    #[test]
    fn detail_payload_matches_the_wire_contract() {
        let request = AuthorizationRequest {
            point_of_sale: 1,
            document_type: DocumentType::FacturaB,
            voucher_number: 43,
            buyer_doc_type: crate::models::invoice::BuyerDocType::Dni,
            buyer_doc_number: "30123456".into(),
            issue_date: NaiveDate::from_ymd_opt(2026, 3, 7).unwrap(),
            net_amount: dec("15000"),
            tax_amount: dec("3150"),
            total_amount: dec("18150"),
            related_voucher: None,
        };

        let detail = build_detail(&request);
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["Concepto"], 1);
        assert_eq!(value["DocTipo"], 96);
        assert_eq!(value["CbteDesde"], 43);
        assert_eq!(value["CbteFch"], "20260307");
        assert_eq!(value["ImpNeto"], "15000.00");
        assert_eq!(value["ImpIVA"], "3150.00");
        assert_eq!(value["ImpTotal"], "18150.00");
        assert_eq!(value["MonId"], "PES");
        assert_eq!(value["MonCotiz"], 1);
        assert!(value.get("CbtesAsoc").is_none());
    }

    #[test]
    fn approved_response_parses_into_an_approval() {
        let raw = json!({
            "FECAESolicitarResult": {
                "FeDetResp": [{
                    "CAE": "71234567890123",
                    "CAEFchVto": "20260317",
                    "CbteDesde": 43,
                    "Resultado": "A"
                }]
            }
        });

        let approval = parse_authorization_response(&raw).unwrap();
        assert_eq!(approval.authorization_code, "71234567890123");
        assert_eq!(approval.voucher_number, 43);
        assert_eq!(
            approval.expires_on,
            NaiveDate::from_ymd_opt(2026, 3, 17).unwrap()
        );
        assert_eq!(approval.raw, raw);
    }

    #[test]
    fn rejected_response_surfaces_the_observations() {
        let raw = json!({
            "FECAESolicitarResult": {
                "FeDetResp": [{
                    "CAE": "",
                    "CAEFchVto": "",
                    "CbteDesde": 43,
                    "Resultado": "R",
                    "Observaciones": [{"Code": 10016, "Msg": "voucher number already authorized"}]
                }]
            }
        });

        let err = parse_authorization_response(&raw).unwrap_err();
        match err {
            AppError::AuthorityRejected { reason } => {
                assert!(reason.contains("10016"));
                assert!(reason.contains("already authorized"));
            }
            other => panic!("expected AuthorityRejected, got {:?}", other),
        }
    }

    #[test]
    fn top_level_errors_win_over_details() {
        let raw = json!({
            "FECAESolicitarResult": {
                "FeDetResp": [],
                "Errors": [{"Code": 600, "Msg": "invalid token"}]
            }
        });

        let err = parse_authorization_response(&raw).unwrap_err();
        match err {
            AppError::AuthorityRejected { reason } => assert!(reason.contains("600")),
            other => panic!("expected AuthorityRejected, got {:?}", other),
        }
    }
}
