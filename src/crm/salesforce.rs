//! Salesforce CRM sync.
//!
//! Provisions an Account + Contact pair for a local user via the Salesforce
//! REST API. Access tokens are fetched per call with the password grant;
//! Salesforce returns the instance URL alongside the token, so nothing is
//! persisted between calls.

use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::error::SyncError;
use crate::providers::TOKEN_REQUEST_TIMEOUT;

const LOGIN_URL: &str = "https://login.salesforce.com/services/oauth2/token";
const API_VERSION: &str = "v58.0";

pub struct SalesforceClient {
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
    security_token: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SalesforceTokenResponse {
    access_token: String,
    instance_url: String,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    id: String,
}

impl SalesforceClient {
    /// Build a client from config; `None` when Salesforce is not configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        Some(Self {
            client_id: config.salesforce_client_id.clone()?,
            client_secret: config.salesforce_client_secret.clone()?,
            username: config.salesforce_username.clone()?,
            password: config.salesforce_password.clone()?,
            security_token: config.salesforce_security_token.clone().unwrap_or_default(),
            http: reqwest::Client::new(),
        })
    }

    /// Password-grant token request. Salesforce expects the security token
    /// appended to the password.
    async fn access_data(&self) -> Result<SalesforceTokenResponse, SyncError> {
        let password = format!("{}{}", self.password, self.security_token);

        let resp = self
            .http
            .post(LOGIN_URL)
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .form(&[
                ("grant_type", "password"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("username", self.username.as_str()),
                ("password", password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Provider(format!("Salesforce token request failed: {e}")))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Provider(format!("Salesforce login failed: {body}")));
        }

        resp.json()
            .await
            .map_err(|e| SyncError::Provider(format!("Failed to parse Salesforce token response: {e}")))
    }

    /// Create an Account for the company and a Contact linked to it.
    /// Returns the Salesforce account id.
    pub async fn provision_contact(
        &self,
        name: &str,
        email: &str,
        company_name: &str,
        job_title: &str,
    ) -> Result<String, SyncError> {
        let access = self.access_data().await?;

        let account: CreateRecordResponse = self
            .create_record(&access, "Account", json!({ "Name": company_name }))
            .await?;

        let (first_name, last_name) = split_name(name);
        self.create_record(
            &access,
            "Contact",
            json!({
                "FirstName": first_name,
                "LastName": last_name,
                "Email": email,
                "Title": job_title,
                "AccountId": account.id,
            }),
        )
        .await?;

        Ok(account.id)
    }

    async fn create_record(
        &self,
        access: &SalesforceTokenResponse,
        sobject: &str,
        body: serde_json::Value,
    ) -> Result<CreateRecordResponse, SyncError> {
        let url = format!(
            "{}/services/data/{API_VERSION}/sobjects/{sobject}/",
            access.instance_url
        );

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&access.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Provider(format!("Salesforce {sobject} request failed: {e}")))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Provider(format!(
                "Salesforce {sobject} create failed: {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| SyncError::Provider(format!("Failed to parse {sobject} response: {e}")))
    }
}

/// Salesforce Contacts require a last name; fall back to "User" for
/// single-word names.
fn split_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or("").to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    let last = if rest.is_empty() { "User".to_string() } else { rest };
    (first, last)
}
