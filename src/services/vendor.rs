//! Dreamina / Jimeng web API client.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use md5::{Digest, Md5};
use rand::Rng;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use crate::models::job::{Job, JobKind, JobSpec, RemoteStatus, StatusCheck, VendorStatus};
use crate::services::classifier::{
    self, ApiError, ErrorKind, RequestError, RetryPolicy, TransportError,
};
use crate::services::ids::IdGenerator;
use crate::services::region::{self, Region};

const PLATFORM_CODE: &str = "7";
const VERSION_CODE: &str = "8.4.0";
const WEB_VERSION: &str = "7.5.0";
const DA_VERSION: &str = "3.3.8";
const AIGC_FEATURES: &str = "app_lip_sync";

const GENERATE_URI: &str = "/mweb/v1/aigc_draft/generate";
const HISTORY_URI: &str = "/mweb/v1/get_history_by_ids";
const USER_CREDIT_URI: &str = "/commerce/v1/benefits/user_credit";
const CREDIT_RECEIVE_URI: &str = "/commerce/v1/benefits/credit_receive";
const ACCOUNT_INFO_URI: &str = "/passport/account/info/v2";

const BROWSER_HEADERS: &[(&str, &str)] = &[
    ("Accept", "application/json, text/plain, */*"),
    ("Accept-Language", "zh-CN,zh;q=0.9"),
    ("Cache-Control", "no-cache"),
    ("Last-Event-Id", "undefined"),
    ("Appvr", VERSION_CODE),
    ("Pragma", "no-cache"),
    ("Priority", "u=1, i"),
    ("Pf", PLATFORM_CODE),
    ("Sec-Ch-Ua", "\"Google Chrome\";v=\"142\", \"Chromium\";v=\"142\", \"Not_A Brand\";v=\"24\""),
    ("Sec-Ch-Ua-Mobile", "?0"),
    ("Sec-Ch-Ua-Platform", "\"Windows\""),
    ("Sec-Fetch-Dest", "empty"),
    ("Sec-Fetch-Mode", "cors"),
    ("Sec-Fetch-Site", "same-origin"),
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36",
    ),
];

/// Remote side of a generation job.
///
/// Both calls are classified before they return; callers only ever see
/// [`ApiError`].
#[async_trait]
pub trait RemoteJobClient: Send + Sync {
    /// Create a job and return the vendor's history record id.
    async fn submit(&self, spec: &JobSpec) -> Result<String, ApiError>;

    /// One status check. Never retried here; the polling loop owns pacing.
    async fn check_status(&self, job: &Job) -> Result<StatusCheck, ApiError>;

    /// Account housekeeping before a submission. Failures are logged only.
    async fn prepare(&self, _credential: &str) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CreditInfo {
    pub gift_credit: i64,
    pub purchase_credit: i64,
    pub vip_credit: i64,
    pub total_credit: i64,
}

#[derive(Debug, Default)]
struct RequestOptions {
    params: Vec<(&'static str, String)>,
    no_default_params: bool,
    referer: Option<String>,
}

pub struct DreaminaClient {
    http: Client,
    retry: RetryPolicy,
    web_id: u64,
    user_id: String,
}

impl DreaminaClient {
    pub fn new(
        request_timeout: Duration,
        retry: RetryPolicy,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            retry,
            web_id: rand::thread_rng().gen_range(7_000_000_000_000_000_000..8_000_000_000_000_000_000),
            user_id: ids.next_id(),
        })
    }

    /// One HTTP exchange with the vendor, unwrapping the `{ret, errmsg, data}` envelope.
    async fn request(
        &self,
        token: &str,
        uri: &str,
        body: &Value,
        options: &RequestOptions,
    ) -> Result<Value, RequestError> {
        let region = Region::from_token(token);
        let base_url = region.base_url_for(uri);
        let url = format!("{base_url}{uri}");
        let device_time = chrono::Utc::now().timestamp();

        let mut query = if options.no_default_params {
            Vec::new()
        } else {
            default_params(region, self.web_id)
        };
        query.extend(options.params.iter().cloned());

        let mut request = self.http.post(&url).query(&query).json(body);
        for (name, value) in BROWSER_HEADERS {
            request = request.header(*name, *value);
        }
        request = request
            .header("Origin", base_url)
            .header("Referer", options.referer.as_deref().unwrap_or(base_url))
            .header("Appid", region.assistant_id().to_string())
            .header("Cookie", self.cookie(token, device_time))
            .header("Device-Time", device_time.to_string())
            .header("Sign", sign(uri, device_time))
            .header("Sign-Ver", "1");

        tracing::debug!(url = %url, region = region.code(), "Vendor request");
        let response = request.send().await.map_err(TransportError::from)?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                url,
                body,
            }
            .into());
        }

        let payload: Value = response.json().await.map_err(TransportError::from)?;
        unwrap_envelope(payload).map_err(RequestError::Rejected)
    }

    /// [`Self::request`] under the retry policy.
    async fn call(
        &self,
        token: &str,
        uri: &str,
        body: &Value,
        options: RequestOptions,
    ) -> Result<Value, ApiError> {
        let context = format!("POST {uri}");
        classifier::with_retry(&self.retry, &context, || self.request(token, uri, body, &options)).await
    }

    fn cookie(&self, token: &str, now: i64) -> String {
        let region = Region::from_token(token);
        let session = region::strip_region_prefix(token);
        [
            format!("_tea_web_id={}", self.web_id),
            "is_staff_user=false".to_string(),
            format!("store-region={}", region.store_region()),
            "store-region-src=uid".to_string(),
            format!("sid_guard={session}%7C{now}%7C5184000%7CMon%2C+03-Feb-2025+08%3A17%3A09+GMT"),
            format!("uid_tt={}", self.user_id),
            format!("uid_tt_ss={}", self.user_id),
            format!("sid_tt={session}"),
            format!("sessionid={session}"),
            format!("sessionid_ss={session}"),
        ]
        .join("; ")
    }

    pub async fn get_credit(&self, token: &str) -> Result<CreditInfo, ApiError> {
        let region = Region::from_token(token);
        let options = RequestOptions {
            no_default_params: true,
            referer: Some(region.referer("/ai-tool/image/generate")),
            ..Default::default()
        };
        let data = self.call(token, USER_CREDIT_URI, &json!({}), options).await?;

        let read = |key: &str| number_at(&data, &format!("/credit/{key}"));
        let gift_credit = read("gift_credit");
        let purchase_credit = read("purchase_credit");
        let vip_credit = read("vip_credit");
        let credit = CreditInfo {
            gift_credit,
            purchase_credit,
            vip_credit,
            total_credit: gift_credit + purchase_credit + vip_credit,
        };
        tracing::info!(
            gift = credit.gift_credit,
            purchase = credit.purchase_credit,
            vip = credit.vip_credit,
            "Account credit"
        );
        Ok(credit)
    }

    /// Claim the daily free credit. Returns the new balance.
    pub async fn receive_credit(&self, token: &str) -> Result<i64, ApiError> {
        let region = Region::from_token(token);
        let options = RequestOptions {
            referer: Some(region.referer("/ai-tool/home")),
            ..Default::default()
        };
        let body = json!({ "time_zone": "Asia/Shanghai" });
        let data = self.call(token, CREDIT_RECEIVE_URI, &body, options).await?;
        let balance = number_at(&data, "/cur_total_credits");
        tracing::info!(balance, "Daily credit received");
        Ok(balance)
    }

    /// Whether the vendor still accepts `token`. An expired session is
    /// `Ok(false)`; any other failure is an error.
    pub async fn token_live(&self, token: &str) -> Result<bool, ApiError> {
        let options = RequestOptions {
            params: vec![("account_sdk_source", "web".to_string())],
            ..Default::default()
        };
        match self.call(token, ACCOUNT_INFO_URI, &json!({}), options).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind == ErrorKind::TokenExpired => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Download a result file and encode it for `b64_json` responses.
    pub async fn fetch_base64(&self, url: &str) -> Result<String, ApiError> {
        let fetch = async {
            let response = self.http.get(url).send().await?.error_for_status()?;
            response.bytes().await
        };
        let bytes = fetch.await.map_err(|err| {
            ApiError::new(ErrorKind::RequestFailed, format!("failed to download {url}: {err}"))
        })?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

#[async_trait]
impl RemoteJobClient for DreaminaClient {
    async fn submit(&self, spec: &JobSpec) -> Result<String, ApiError> {
        let data = self
            .call(&spec.credential, GENERATE_URI, &spec.payload, RequestOptions::default())
            .await?;
        history_record_id(&data).ok_or_else(|| {
            ApiError::generation_failed(format!("{} submission returned no history record id", spec.kind))
        })
    }

    async fn check_status(&self, job: &Job) -> Result<StatusCheck, ApiError> {
        let mut body = json!({ "history_ids": [job.id] });
        if job.kind == JobKind::Image {
            body["image_info"] = image_info();
        }
        let data = self
            .request(&job.credential, HISTORY_URI, &body, &RequestOptions::default())
            .await
            .map_err(RequestError::classify)?;
        parse_history(job, &data)
    }

    async fn prepare(&self, credential: &str) {
        match self.get_credit(credential).await {
            Ok(credit) if credit.total_credit <= 0 => {
                if let Err(err) = self.receive_credit(credential).await {
                    tracing::warn!(error = %err, "Failed to receive daily credit");
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "Failed to read account credit"),
        }
    }
}

/// `Sign` header: MD5 over the last seven characters of the path and the device time.
pub fn sign(uri: &str, device_time: i64) -> String {
    let tail = uri.len().checked_sub(7).and_then(|start| uri.get(start..)).unwrap_or(uri);
    let digest = Md5::digest(format!("9e2c|{tail}|{PLATFORM_CODE}|{VERSION_CODE}|{device_time}||11ac"));
    format!("{digest:x}")
}

fn default_params(region: Region, web_id: u64) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("aid", region.assistant_id().to_string()),
        ("device_platform", "web".to_string()),
        ("region", region.code().to_string()),
        ("da_version", DA_VERSION.to_string()),
        ("os", "windows".to_string()),
        ("web_component_open_flag", "1".to_string()),
        ("web_version", WEB_VERSION.to_string()),
        ("aigc_features", AIGC_FEATURES.to_string()),
    ];
    if !region.is_international() {
        params.push(("webId", web_id.to_string()));
    }
    params
}

/// `ret == "0"` yields `data` (or the whole payload when `data` is not an
/// object); any other code is a classified rejection. Payloads without `ret`
/// pass through untouched.
pub fn unwrap_envelope(mut payload: Value) -> Result<Value, ApiError> {
    let ret = match payload.get("ret") {
        None => return Ok(payload),
        Some(Value::String(code)) => code.clone(),
        Some(other) => other.to_string(),
    };

    if ret == "0" {
        if payload.get("data").is_some_and(Value::is_object) {
            return Ok(payload["data"].take());
        }
        return Ok(payload);
    }

    let message = payload.get("errmsg").and_then(Value::as_str).unwrap_or_default();
    Err(classifier::classify_vendor_error(&ret, message))
}

fn history_record_id(data: &Value) -> Option<String> {
    match data.pointer("/aigc_data/history_record_id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn number_at(data: &Value, pointer: &str) -> i64 {
    data.pointer(pointer).and_then(Value::as_f64).unwrap_or(0.0) as i64
}

/// Normalize a `get_history_by_ids` response for `job`.
pub fn parse_history(job: &Job, data: &Value) -> Result<StatusCheck, ApiError> {
    if job.kind == JobKind::Video {
        if let Some(url) = find_video_url(&data.to_string()) {
            tracing::info!(job_id = %job.id, url, "Video URL found in status payload");
            return Ok(StatusCheck {
                status: RemoteStatus::new(VendorStatus::Success, 1),
                record: json!({
                    "status": VendorStatus::Success.code(),
                    "item_list": [{ "video": { "transcoded_video": { "origin": { "video_url": url } } } }],
                }),
            });
        }
    }

    let record = data
        .get(&job.id)
        .filter(|record| record.as_object().is_some_and(|fields| !fields.is_empty()));

    let Some(record) = record else {
        return match job.kind {
            JobKind::Image => {
                tracing::error!(job_id = %job.id, "History record not found");
                Err(ApiError::generation_failed(format!("history record {} not found", job.id)))
            }
            JobKind::Video => {
                // The vendor creates video records lazily.
                tracing::warn!(job_id = %job.id, "History record not created yet, continuing to wait");
                Ok(StatusCheck {
                    status: RemoteStatus::new(VendorStatus::Processing, 0),
                    record: json!({ "status": VendorStatus::Processing.code(), "item_list": [] }),
                })
            }
        };
    };

    Ok(StatusCheck {
        status: remote_status(record),
        record: record.clone(),
    })
}

fn remote_status(record: &Value) -> RemoteStatus {
    let code = record
        .get("status")
        .and_then(|status| status.as_i64().or_else(|| status.as_f64().map(|f| f as i64)))
        .unwrap_or_default();
    let item_count = record
        .get("item_list")
        .and_then(Value::as_array)
        .map_or(0, |items| items.len() as u32);
    let fail_code = match record.get("fail_code") {
        Some(Value::String(code)) if !code.is_empty() => Some(code.clone()),
        Some(Value::Number(code)) => Some(code.to_string()),
        _ => None,
    };
    let finish_time = record
        .pointer("/task/finish_time")
        .and_then(Value::as_i64)
        .filter(|time| *time > 0);

    RemoteStatus {
        status: VendorStatus::from_code(code),
        fail_code,
        item_count,
        finish_time,
    }
}

static VIDEO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https://v[0-9]+-artist\.vlabvod\.com/[^"\s]+"#).expect("video URL pattern is valid")
});

/// First rendered video URL anywhere in a raw status payload.
fn find_video_url(raw: &str) -> Option<&str> {
    VIDEO_URL.find(raw).map(|found| found.as_str())
}

fn scene(scene: &str, width: u32, height: u32, key: &str) -> Value {
    json!({ "scene": scene, "width": width, "height": height, "uniq_key": key, "format": "webp" })
}

/// Renditions requested alongside image status checks.
fn image_info() -> Value {
    let mut scenes: Vec<Value> = [(360, 360), (480, 480), (720, 720), (720, 480), (360, 240), (240, 320), (480, 640)]
        .iter()
        .map(|(w, h)| scene("smart_crop", *w, *h, &format!("smart_crop-w:{w}-h:{h}")))
        .collect();
    scenes.extend(
        [2400, 1080, 720, 480, 360]
            .iter()
            .map(|size| scene("normal", *size, *size, &size.to_string())),
    );
    json!({ "width": 2048, "height": 2048, "format": "webp", "image_scene_list": scenes })
}
