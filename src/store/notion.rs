//! Notion REST implementation of [`RecordStore`].
//!
//! Tables are the child databases of one page. Every request goes through
//! [`NotionStore::request`], which retries rate-limited responses and turns
//! any other non-2xx status into a hard error.
use super::props::{decode_page, encode_record, equals_filter, field_schema, schema_type};
use super::{EnsureReport, RecordStore, RemoteTable, Row, RowFilter, Schema};
use crate::config::SyncConfig;
use crate::flat::{FieldType, FlatRecord};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::thread::sleep;
use std::time::{Duration, Instant};

pub const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: usize = 100;

/// Page id embedded in a Notion URL: 32 hex chars, or a dashed UUID.
pub fn extract_page_id(url: &str) -> Option<String> {
    let compact = Regex::new(r"[0-9a-fA-F]{32}").ok()?;
    if let Some(found) = compact.find(url) {
        return Some(found.as_str().to_string());
    }
    let dashed = Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .ok()?;
    dashed.find(url).map(|found| found.as_str().to_string())
}

#[derive(Debug, Clone)]
pub struct NotionOptions {
    pub api_base: String,
    pub token: String,
    pub page_id: String,
    pub max_retries: u32,
    pub default_retry: Duration,
    pub timeout: Duration,
}

impl NotionOptions {
    /// Options from config; `page_url` overrides `notion.page_url`.
    pub fn from_config(config: &SyncConfig, page_url: Option<&str>) -> Result<Self> {
        let url = page_url.or(config.notion.page_url.as_deref()).ok_or_else(|| {
            anyhow!("no Notion page configured (set notion.page_url or pass --page-url)")
        })?;
        let page_id = extract_page_id(url)
            .ok_or_else(|| anyhow!("could not find a page id in {url:?}"))?;
        Ok(Self {
            api_base: config.notion.api_base.trim_end_matches('/').to_string(),
            token: config.notion.token()?,
            page_id,
            max_retries: config.notion.max_retries,
            default_retry: config.notion.default_retry(),
            timeout: config.notion.timeout(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
    Patch,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
        }
    }
}

pub struct NotionStore {
    agent: ureq::Agent,
    options: NotionOptions,
    schemas: BTreeMap<String, Schema>,
}

impl NotionStore {
    pub fn new(options: NotionOptions) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(options.timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            options,
            schemas: BTreeMap::new(),
        }
    }

    fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
        let auth = format!("Bearer {}", self.options.token);
        let empty = Value::Object(Map::new());
        match method {
            Method::Get => self
                .agent
                .get(url)
                .header("Authorization", auth.as_str())
                .header("Notion-Version", NOTION_VERSION)
                .call(),
            Method::Post => self
                .agent
                .post(url)
                .header("Authorization", auth.as_str())
                .header("Notion-Version", NOTION_VERSION)
                .send_json(body.unwrap_or(&empty)),
            Method::Patch => self
                .agent
                .patch(url)
                .header("Authorization", auth.as_str())
                .header("Notion-Version", NOTION_VERSION)
                .send_json(body.unwrap_or(&empty)),
        }
    }

    fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = format!("{}/{}", self.options.api_base, path.trim_start_matches('/'));
        let mut attempt = 0u32;
        loop {
            let start = Instant::now();
            let mut response = self
                .send_once(method, &url, body)
                .with_context(|| format!("{} {path}", method.as_str()))?;
            let status = response.status().as_u16();
            tracing::debug!(
                method = method.as_str(),
                path,
                status,
                elapsed_ms = start.elapsed().as_millis(),
                "notion request"
            );

            if status == 429 {
                if attempt >= self.options.max_retries {
                    return Err(anyhow!(
                        "Notion API still rate limited after {} retries ({} {path})",
                        self.options.max_retries,
                        method.as_str()
                    ));
                }
                attempt += 1;
                let wait = retry_after(&response).unwrap_or(self.options.default_retry);
                tracing::warn!(
                    path,
                    attempt,
                    wait_ms = wait.as_millis(),
                    "rate limited; retrying"
                );
                sleep(wait);
                continue;
            }
            if !(200..300).contains(&status) {
                let text = response.body_mut().read_to_string().unwrap_or_default();
                return Err(anyhow!("Notion API error {status}: {}", error_detail(&text)));
            }
            return response
                .body_mut()
                .read_json::<Value>()
                .with_context(|| format!("decode response of {} {path}", method.as_str()));
        }
    }

    fn schema(&mut self, table_id: &str) -> Result<&Schema> {
        if !self.schemas.contains_key(table_id) {
            let database = self.request(Method::Get, &format!("databases/{table_id}"), None)?;
            let schema: Schema = database
                .get("properties")
                .and_then(Value::as_object)
                .map(|properties| {
                    properties
                        .iter()
                        .map(|(name, property)| (name.clone(), schema_type(property)))
                        .collect()
                })
                .unwrap_or_default();
            self.schemas.insert(table_id.to_string(), schema);
        }
        self.schemas
            .get(table_id)
            .ok_or_else(|| anyhow!("schema for {table_id} not cached"))
    }

    fn query_pages(&self, table_id: &str, filter: Option<Value>) -> Result<Vec<Value>> {
        collect_pages(|cursor| {
            let mut body = json!({"page_size": PAGE_SIZE});
            if let Some(filter) = &filter {
                body["filter"] = filter.clone();
            }
            if let Some(cursor) = cursor {
                body["start_cursor"] = json!(cursor);
            }
            self.request(Method::Post, &format!("databases/{table_id}/query"), Some(&body))
        })
    }
}

impl RecordStore for NotionStore {
    fn list_tables(&mut self) -> Result<Vec<RemoteTable>> {
        let page_id = self.options.page_id.clone();
        let blocks = collect_pages(|cursor| {
            let mut path = format!("blocks/{page_id}/children?page_size={PAGE_SIZE}");
            if let Some(cursor) = cursor {
                path.push_str(&format!("&start_cursor={cursor}"));
            }
            self.request(Method::Get, &path, None)
        })?;
        let tables = blocks
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("child_database"))
            .filter_map(|block| {
                let id = block.get("id").and_then(Value::as_str)?;
                let title = block
                    .get("child_database")
                    .and_then(|child| child.get("title"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Some(RemoteTable {
                    id: id.to_string(),
                    title: title.to_string(),
                })
            })
            .collect::<Vec<_>>();
        tracing::info!(page = %page_id, tables = tables.len(), "listed child databases");
        Ok(tables)
    }

    fn get_schema(&mut self, table_id: &str) -> Result<Schema> {
        self.schema(table_id).cloned()
    }

    fn ensure_fields(
        &mut self,
        table_id: &str,
        fields: &[(String, FieldType)],
    ) -> Result<EnsureReport> {
        let schema = self.schema(table_id)?.clone();
        let mut report = EnsureReport::default();
        let mut payload = Map::new();
        for (name, ty) in fields {
            if schema.contains_key(name) || payload.contains_key(name) {
                continue;
            }
            match field_schema(*ty) {
                Some(definition) => {
                    payload.insert(name.clone(), definition);
                    report.created.push(name.clone());
                }
                None => report.skipped.push(name.clone()),
            }
        }
        if !payload.is_empty() {
            let body = json!({"properties": Value::Object(payload)});
            self.request(Method::Patch, &format!("databases/{table_id}"), Some(&body))?;
            if let Some(cached) = self.schemas.get_mut(table_id) {
                for (name, ty) in fields {
                    if report.created.contains(name) {
                        cached.insert(name.clone(), *ty);
                    }
                }
            }
            tracing::info!(table_id, created = ?report.created, "created missing fields");
        }
        Ok(report)
    }

    fn find_by_key(
        &mut self,
        table_id: &str,
        key_field: &str,
        key: &str,
    ) -> Result<Option<String>> {
        let ty = self
            .schema(table_id)?
            .get(key_field)
            .copied()
            .unwrap_or(FieldType::Title);
        let body = json!({"filter": equals_filter(key_field, ty, key), "page_size": 1});
        let found = self.request(Method::Post, &format!("databases/{table_id}/query"), Some(&body))?;
        Ok(found
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .and_then(|page| page.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn create_row(&mut self, table_id: &str, record: &FlatRecord) -> Result<String> {
        let body = json!({
            "parent": {"database_id": table_id},
            "properties": encode_record(record),
        });
        let page = self.request(Method::Post, "pages", Some(&body))?;
        page.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("created page in {table_id} has no id"))
    }

    fn update_row(&mut self, row_id: &str, record: &FlatRecord) -> Result<()> {
        let body = json!({"properties": encode_record(record)});
        self.request(Method::Patch, &format!("pages/{row_id}"), Some(&body))?;
        Ok(())
    }

    fn query(&mut self, table_id: &str, filter: Option<&RowFilter>) -> Result<Vec<Row>> {
        let filter = filter.map(|filter| {
            json!({"property": filter.field, "checkbox": {"equals": filter.checked}})
        });
        let pages = self.query_pages(table_id, filter)?;
        Ok(pages
            .iter()
            .filter_map(|page| {
                let id = page.get("id").and_then(Value::as_str)?;
                Some(Row {
                    id: id.to_string(),
                    fields: decode_page(page),
                })
            })
            .collect())
    }
}

/// Concatenate the `results` of a cursor-paginated listing.
fn collect_pages<F>(mut fetch: F) -> Result<Vec<Value>>
where
    F: FnMut(Option<&str>) -> Result<Value>,
{
    let mut results = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = fetch(cursor.as_deref())?;
        if let Some(items) = page.get("results").and_then(Value::as_array) {
            results.extend(items.iter().cloned());
        }
        let has_more = page.get("has_more").and_then(Value::as_bool).unwrap_or(false);
        cursor = page
            .get("next_cursor")
            .and_then(Value::as_str)
            .map(str::to_string);
        if !has_more || cursor.is_none() {
            return Ok(results);
        }
    }
}

fn retry_after(response: &ureq::http::Response<ureq::Body>) -> Option<Duration> {
    let raw = response.headers().get("retry-after")?.to_str().ok()?;
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// The `message` of a Notion error body, or the raw text.
fn error_detail(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| text.trim().to_string())
}
