//! PostgREST HTTP client

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Thin client for the Supabase REST endpoint
pub struct SupabaseClient {
    /// `<project>/rest/v1/`
    rest_url: Url,
    api_key: String,
    agent: ureq::Agent,
}

impl SupabaseClient {
    const REST_PATH: &'static str = "rest/v1/";
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Create a client for a project URL such as `https://xyz.supabase.co`
    pub fn new(project_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let mut base = Url::parse(project_url)
            .with_context(|| format!("Invalid Supabase URL: {}", project_url))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let rest_url = base
            .join(Self::REST_PATH)
            .context("Failed to build Supabase REST URL")?;

        Ok(Self {
            rest_url,
            api_key: api_key.into(),
            agent: build_agent(Self::DEFAULT_TIMEOUT),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    /// Build the URL for a table query
    pub fn table_url(&self, table: &str, params: &[(String, String)]) -> Result<Url> {
        let mut url = self
            .rest_url
            .join(table)
            .with_context(|| format!("Invalid table name: {}", table))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// GET rows from a table
    pub fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(String, String)],
    ) -> Result<Vec<T>> {
        let url = self.table_url(table, params)?;

        let mut response = self
            .agent
            .get(url.as_str())
            .header("apikey", &self.api_key)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .call()
            .with_context(|| format!("Failed to query {}", table))?;

        let rows: Vec<T> = response
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse {} rows", table))?;

        Ok(rows)
    }

    /// POST a row with merge-on-conflict semantics
    pub fn upsert<T: Serialize>(&self, table: &str, on_conflict: &str, row: &T) -> Result<()> {
        let url = self.table_url(table, &[("on_conflict".to_string(), on_conflict.to_string())])?;

        self.agent
            .post(url.as_str())
            .header("apikey", &self.api_key)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .send_json(row)
            .with_context(|| format!("Failed to upsert into {}", table))?;

        Ok(())
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Format a timestamp the way PostgREST filters expect it
pub fn timestamp_param(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Turn user text into a literal `ilike.` operand.
///
/// `*` is PostgREST's wildcard and cannot be escaped, so it is dropped.
/// `%`, `_` and the escape character itself are backslash-escaped.
pub fn like_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => {}
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
