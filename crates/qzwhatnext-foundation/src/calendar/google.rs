//! Google Calendar v3 REST client.
//!
//! One client per (user, reconcile pass), built after a successful token
//! refresh. Every request carries a bounded timeout; 5xx responses are
//! retried up to three times with jitter; 404/410 on get/delete are
//! handled transparently.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;

use super::gateway::{
    CalendarError, CalendarEvent, CalendarGateway, CalendarResult, EventDraft, EventPatch,
};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRIES: u32 = 3;
const MAX_LIST_PAGES: usize = 10;
const LIST_FIELDS: &str =
    "items(id,etag,updated,status,summary,start,end,extendedProperties(private)),nextPageToken";

pub struct GoogleCalendarClient {
    http: reqwest::Client,
    base_url: String,
    calendar_id: String,
    access_token: String,
}

impl GoogleCalendarClient {
    pub fn new(access_token: impl Into<String>, calendar_id: impl Into<String>) -> Self {
        Self::with_base_url(access_token, calendar_id, DEFAULT_BASE_URL)
    }

    /// Override the API base URL (tests, proxies).
    pub fn with_base_url(
        access_token: impl Into<String>,
        calendar_id: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            calendar_id: calendar_id.into(),
            access_token: access_token.into(),
        }
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.base_url, self.calendar_id)
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), event_id)
    }

    /// Send a request, retrying 5xx with jitter.
    async fn send_with_retry<F>(&self, build: F) -> CalendarResult<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = build().bearer_auth(&self.access_token).send().await;
            match result {
                Ok(response) if response.status().is_server_error() && attempt < MAX_RETRIES => {
                    let delay = Duration::from_millis(
                        100 * u64::from(attempt) + rand::thread_rng().gen_range(0..200),
                    );
                    tracing::debug!(
                        status = %response.status(),
                        attempt,
                        "retrying calendar request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() => return Err(CalendarError::Timeout),
                Err(e) if e.is_connect() && attempt < MAX_RETRIES => {
                    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
                }
                Err(e) => return Err(CalendarError::Transient(e.to_string())),
            }
        }
    }

    async fn check(&self, response: reqwest::Response) -> CalendarResult<Value> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(CalendarError::AuthRevoked);
        }
        if status.is_server_error() {
            return Err(CalendarError::Transient(format!("upstream {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CalendarError::Api(format!("{status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| CalendarError::Api(e.to_string()))
    }
}

fn rfc3339(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_event_time(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let value = value?;
    if let Some(dt) = value.get("dateTime").and_then(Value::as_str) {
        return DateTime::parse_from_rfc3339(dt)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    // All-day events carry a bare date; pin to midnight UTC.
    let date = value.get("date").and_then(Value::as_str)?;
    let day = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(day.and_hms_opt(0, 0, 0)?.and_utc())
}

fn parse_event(value: &Value) -> Option<CalendarEvent> {
    let id = value.get("id").and_then(Value::as_str)?.to_string();
    let private: HashMap<String, String> = value
        .pointer("/extendedProperties/private")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    Some(CalendarEvent {
        id,
        etag: value.get("etag").and_then(Value::as_str).map(String::from),
        status: value.get("status").and_then(Value::as_str).map(String::from),
        summary: value.get("summary").and_then(Value::as_str).map(String::from),
        description: value
            .get("description")
            .and_then(Value::as_str)
            .map(String::from),
        start: parse_event_time(value.get("start")),
        end: parse_event_time(value.get("end")),
        updated: value
            .get("updated")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        private,
    })
}

fn draft_body(draft: &EventDraft) -> Value {
    let tz = draft.time_zone.clone().unwrap_or_else(|| "UTC".to_string());
    let mut body = json!({
        "summary": draft.summary,
        "description": draft.description.clone().unwrap_or_default(),
        "start": { "dateTime": rfc3339(&draft.start), "timeZone": tz },
        "end": { "dateTime": rfc3339(&draft.end), "timeZone": tz },
        "extendedProperties": { "private": draft.private },
    });
    if let Some(rrule) = &draft.recurrence {
        body["recurrence"] = json!([format!("RRULE:{rrule}")]);
    }
    body
}

#[async_trait]
impl CalendarGateway for GoogleCalendarClient {
    async fn get_event(&self, event_id: &str) -> CalendarResult<Option<CalendarEvent>> {
        let url = self.event_url(event_id);
        let response = self.send_with_retry(|| self.http.get(&url)).await?;
        // Deleted-from-calendar shows up as 404 (not found) or 410 (gone).
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(None);
        }
        let body = self.check(response).await?;
        Ok(parse_event(&body))
    }

    async fn insert_event(&self, draft: &EventDraft) -> CalendarResult<CalendarEvent> {
        let url = self.events_url();
        let body = draft_body(draft);
        let response = self
            .send_with_retry(|| self.http.post(&url).json(&body))
            .await?;
        let value = self.check(response).await?;
        parse_event(&value).ok_or_else(|| CalendarError::Api("insert returned no event".into()))
    }

    async fn patch_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
    ) -> CalendarResult<CalendarEvent> {
        let url = self.event_url(event_id);
        let mut body = serde_json::Map::new();
        if let Some(summary) = &patch.summary {
            body.insert("summary".into(), json!(summary));
        }
        if let Some(start) = &patch.start {
            body.insert("start".into(), json!({ "dateTime": rfc3339(start), "timeZone": "UTC" }));
        }
        if let Some(end) = &patch.end {
            body.insert("end".into(), json!({ "dateTime": rfc3339(end), "timeZone": "UTC" }));
        }
        let body = Value::Object(body);
        let response = self
            .send_with_retry(|| self.http.patch(&url).json(&body))
            .await?;
        let value = self.check(response).await?;
        parse_event(&value).ok_or_else(|| CalendarError::Api("patch returned no event".into()))
    }

    async fn delete_event(&self, event_id: &str) -> CalendarResult<()> {
        let url = self.event_url(event_id);
        let response = self.send_with_retry(|| self.http.delete(&url)).await?;
        // Deleting a missing event is a no-op.
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(());
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(CalendarError::AuthRevoked);
        }
        if !status.is_success() {
            return Err(CalendarError::Api(format!("{status}")));
        }
        Ok(())
    }

    async fn list_events_in_range(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> CalendarResult<Vec<CalendarEvent>> {
        let url = self.events_url();
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let response = self
                .send_with_retry(|| {
                    let mut request = self.http.get(&url).query(&[
                        ("timeMin", rfc3339(&time_min)),
                        ("timeMax", rfc3339(&time_max)),
                        ("singleEvents", "true".to_string()),
                        ("orderBy", "startTime".to_string()),
                        ("maxResults", "2500".to_string()),
                        ("fields", LIST_FIELDS.to_string()),
                    ]);
                    if let Some(token) = &page_token {
                        request = request.query(&[("pageToken", token.as_str())]);
                    }
                    request
                })
                .await?;
            let body = self.check(response).await?;

            if let Some(page_items) = body.get("items").and_then(Value::as_array) {
                items.extend(page_items.iter().filter_map(parse_event));
            }
            page_token = body
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(String::from);
            if page_token.is_none() {
                break;
            }
        }
        Ok(items)
    }

    async fn free_busy(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> CalendarResult<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        let url = format!("{}/freeBusy", self.base_url);
        let body = json!({
            "timeMin": rfc3339(&time_min),
            "timeMax": rfc3339(&time_max),
            "items": [{ "id": self.calendar_id }],
        });
        let response = self
            .send_with_retry(|| self.http.post(&url).json(&body))
            .await?;
        let value = self.check(response).await?;

        let busy = value
            .pointer(&format!("/calendars/{}/busy", self.calendar_id))
            .and_then(Value::as_array)
            .map(|intervals| {
                intervals
                    .iter()
                    .filter_map(|interval| {
                        let start = interval.get("start").and_then(Value::as_str)?;
                        let end = interval.get("end").and_then(Value::as_str)?;
                        Some((
                            DateTime::parse_from_rfc3339(start).ok()?.with_timezone(&Utc),
                            DateTime::parse_from_rfc3339(end).ok()?.with_timezone(&Utc),
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(busy)
    }

    async fn timezone(&self) -> CalendarResult<String> {
        let url = format!("{}/calendars/{}", self.base_url, self.calendar_id);
        let response = self.send_with_retry(|| self.http.get(&url)).await?;
        let value = self.check(response).await?;
        Ok(value
            .get("timeZone")
            .and_then(Value::as_str)
            .unwrap_or("UTC")
            .to_string())
    }
}
