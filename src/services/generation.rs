//! Image and video generation on top of the submit-then-poll orchestrator.

use std::sync::Arc;

use base64::Engine;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::job::{Job, JobKind, JobSpec};
use crate::services::catalog;
use crate::services::classifier::ApiError;
use crate::services::draft::{self, ImageDraft, VideoDraft};
use crate::services::ids::IdGenerator;
use crate::services::orchestrator::{TaskContext, TaskEvent, TaskOrchestrator};
use crate::services::poller::{PollOutcome, Poller, PollingConfig};
use crate::services::region::Region;
use crate::services::vendor::RemoteJobClient;

/// Images the vendor produces per regular text-to-image submission.
pub const IMAGES_PER_JOB: u32 = 4;

const DEFAULT_SAMPLE_STRENGTH: f64 = 0.5;
const DEFAULT_VIDEO_RATIO: &str = "1:1";
const DEFAULT_VIDEO_RESOLUTION: &str = "720p";
const DEFAULT_VIDEO_DURATION: u32 = 5;

#[derive(Debug, Clone, Default)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub ratio: String,
    pub resolution: String,
    pub sample_strength: Option<f64>,
    pub intelligent_ratio: bool,
}

#[derive(Debug, Clone, Default)]
pub struct VideoRequest {
    pub model: String,
    pub prompt: String,
    pub ratio: String,
    pub resolution: String,
    pub duration: Option<u32>,
}

/// Result of a generation. `partial` is set when polling timed out with
/// fewer items than expected.
#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    Images { urls: Vec<String>, partial: bool },
    Video { url: String, partial: bool },
}

#[derive(Clone)]
pub struct GenerationService {
    client: Arc<dyn RemoteJobClient>,
    ids: Arc<dyn IdGenerator>,
    orchestrator: TaskOrchestrator,
    image_polling: PollingConfig,
    video_polling: PollingConfig,
}

impl GenerationService {
    pub fn new(
        client: Arc<dyn RemoteJobClient>,
        ids: Arc<dyn IdGenerator>,
        orchestrator: TaskOrchestrator,
        image_polling: PollingConfig,
        video_polling: PollingConfig,
    ) -> Self {
        Self {
            client,
            ids,
            orchestrator,
            image_polling,
            video_polling,
        }
    }

    pub async fn generate_images(
        &self,
        request: &ImageRequest,
        token: &str,
        ctx: Option<&TaskContext>,
    ) -> Result<Generated, ApiError> {
        let region = Region::from_token(token);
        let model = non_empty(&request.model, catalog::DEFAULT_IMAGE_MODEL);
        let model_key = catalog::image_model(model, region)?;
        let size = catalog::image_size_for_model(model, &request.resolution, &request.ratio)?;
        let sample_strength = request
            .sample_strength
            .filter(|strength| *strength > 0.0)
            .unwrap_or(DEFAULT_SAMPLE_STRENGTH);
        let multi_image_target = draft::multi_image_target(model, &request.prompt);
        let expected_items = multi_image_target.unwrap_or(IMAGES_PER_JOB);

        tracing::info!(
            model,
            model_key,
            region = region.code(),
            width = size.width,
            height = size.height,
            sample_strength,
            intelligent_ratio = request.intelligent_ratio,
            multi_image = multi_image_target.is_some(),
            expected_items,
            "Submitting image generation"
        );

        self.client.prepare(token).await;
        let payload = draft::image_payload(
            self.ids.as_ref(),
            region,
            &ImageDraft {
                model_key,
                prompt: &request.prompt,
                negative_prompt: &request.negative_prompt,
                sample_strength,
                size,
                intelligent_ratio: request.intelligent_ratio,
                seed: draft::random_seed(),
                multi_image: multi_image_target.is_some(),
            },
        );

        let spec = JobSpec {
            kind: JobKind::Image,
            credential: token.to_string(),
            payload,
        };
        let outcome = self.run_job(spec, expected_items, &self.image_polling, ctx).await?;

        let urls = extract_image_urls(&outcome.record);
        if urls.is_empty() {
            return Err(ApiError::generation_failed(format!(
                "image generation returned {} item(s) but no image URL could be extracted",
                outcome.item_count
            )));
        }
        tracing::info!(count = urls.len(), elapsed_secs = outcome.elapsed.as_secs_f64(), "Images generated");
        Ok(Generated::Images {
            urls,
            partial: outcome.is_partial(),
        })
    }

    pub async fn generate_video(
        &self,
        request: &VideoRequest,
        token: &str,
        ctx: Option<&TaskContext>,
    ) -> Result<Generated, ApiError> {
        let region = Region::from_token(token);
        let model = non_empty(&request.model, catalog::DEFAULT_VIDEO_MODEL);
        let model_key = catalog::video_model(model, region);
        let duration_secs =
            catalog::video_duration(model_key, request.duration.unwrap_or(DEFAULT_VIDEO_DURATION));
        let ratio = non_empty(&request.ratio, DEFAULT_VIDEO_RATIO);
        let resolution = catalog::video_supports_resolution(model_key)
            .then(|| non_empty(&request.resolution, DEFAULT_VIDEO_RESOLUTION));

        tracing::info!(
            model,
            model_key,
            region = region.code(),
            ratio,
            resolution = resolution.unwrap_or("unsupported"),
            duration_secs,
            "Submitting video generation"
        );

        self.client.prepare(token).await;
        let payload = draft::video_payload(
            self.ids.as_ref(),
            region,
            &VideoDraft {
                model_key,
                prompt: &request.prompt,
                ratio,
                resolution,
                duration_secs,
                seed: draft::random_seed(),
            },
        );

        let spec = JobSpec {
            kind: JobKind::Video,
            credential: token.to_string(),
            payload,
        };
        let outcome = self.run_job(spec, 1, &self.video_polling, ctx).await?;

        let item = outcome
            .record
            .pointer("/item_list/0")
            .ok_or_else(|| ApiError::generation_failed("video generation returned no items"))?;
        let url = extract_video_url(item)
            .ok_or_else(|| ApiError::generation_failed("video generation finished but no video URL could be extracted"))?;

        tracing::info!(url = %url, elapsed_secs = outcome.elapsed.as_secs_f64(), "Video generated");
        Ok(Generated::Video {
            url,
            partial: outcome.is_partial(),
        })
    }

    /// Generate in the background, streaming progress for SSE consumers.
    pub fn spawn_stream(
        &self,
        kind: JobKind,
        model: String,
        prompt: String,
        token: String,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<TaskEvent<Generated>> {
        let service = self.clone();
        self.orchestrator.spawn_streaming(cancel, move |ctx| async move {
            match kind {
                JobKind::Image => {
                    let request = ImageRequest {
                        model,
                        prompt,
                        ..Default::default()
                    };
                    service.generate_images(&request, &token, Some(&ctx)).await
                }
                JobKind::Video => {
                    let request = VideoRequest {
                        model,
                        prompt,
                        ..Default::default()
                    };
                    service.generate_video(&request, &token, Some(&ctx)).await
                }
            }
        })
    }

    /// Submit `spec` and poll it to a terminal outcome, recording metrics.
    async fn run_job(
        &self,
        spec: JobSpec,
        expected_items: u32,
        polling: &PollingConfig,
        ctx: Option<&TaskContext>,
    ) -> Result<PollOutcome, ApiError> {
        let kind = spec.kind;
        let client = self.client.as_ref();
        let credential = spec.credential.clone();

        let result = self
            .orchestrator
            .execute_task(
                || async {
                    // a job created after the caller left would never be polled
                    if ctx.is_some_and(|ctx| ctx.cancel.is_cancelled()) {
                        return Err(ApiError::cancelled());
                    }
                    let job_id = client.submit(&spec).await?;
                    metrics::counter!("generation_jobs_submitted_total", "kind" => kind.to_string())
                        .increment(1);
                    Ok::<_, ApiError>(job_id)
                },
                |job_id| async move {
                    let job = Job::new(job_id, kind, credential).expecting(expected_items);
                    let mut poller = Poller::new(polling.clone());
                    if let Some(ctx) = ctx {
                        poller = poller
                            .with_cancellation(ctx.cancel.clone())
                            .with_progress(Arc::clone(&ctx.progress));
                    }
                    poller.run(&job, || client.check_status(&job)).await
                },
            )
            .await;

        match &result {
            Ok(outcome) => {
                metrics::counter!("generation_jobs_completed_total", "kind" => kind.to_string()).increment(1);
                metrics::histogram!("generation_poll_seconds", "kind" => kind.to_string())
                    .record(outcome.elapsed.as_secs_f64());
                if outcome.is_partial() {
                    metrics::counter!("generation_partial_results_total", "kind" => kind.to_string())
                        .increment(1);
                }
            }
            Err(err) => {
                metrics::counter!("generation_jobs_failed_total", "kind" => err.kind.to_string()).increment(1);
            }
        }
        result
    }
}

fn non_empty<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}

fn clean_url(url: &str) -> String {
    url.replace("\\u0026", "&")
}

/// Image URLs from a finished record, one per item that carries one.
pub fn extract_image_urls(record: &Value) -> Vec<String> {
    let Some(items) = record.get("item_list").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            item.pointer("/image/large_images/0/image_url")
                .and_then(Value::as_str)
                .or_else(|| item.get("url").and_then(Value::as_str))
                .map(clean_url)
        })
        .collect()
}

/// Video URL from one result item, trying the known locations in order.
pub fn extract_video_url(item: &Value) -> Option<String> {
    let non_empty_str = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(url) = non_empty_str(item.get("video_url")) {
        return Some(url);
    }
    let video = item.get("video")?;
    for pointer in [
        "/transcoded_video/origin/video_url",
        "/play_url",
        "/download_url",
        "/url",
    ] {
        if let Some(url) = non_empty_str(video.pointer(pointer)) {
            return Some(url);
        }
    }

    // video_list entries are base64 encoded
    ["/video_list/video_1/main_url", "/video_list/video_1/backup_url_1"]
        .iter()
        .filter_map(|pointer| non_empty_str(video.pointer(pointer)))
        .find_map(|encoded| {
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .filter(|url| !url.is_empty())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_image_urls_prefer_large_image_and_unescape() {
        let record = json!({
            "item_list": [
                { "image": { "large_images": [{ "image_url": "https://img/a?x=1\\u0026y=2" }] } },
                { "url": "https://img/b" },
                { "image": { "large_images": [] } }
            ]
        });
        assert_eq!(
            extract_image_urls(&record),
            vec!["https://img/a?x=1&y=2".to_string(), "https://img/b".to_string()]
        );
        assert!(extract_image_urls(&json!({})).is_empty());
    }

    #[test]
    fn test_video_url_lookup_order() {
        assert_eq!(
            extract_video_url(&json!({ "video_url": "https://v/top", "video": { "play_url": "https://v/play" } })),
            Some("https://v/top".to_string())
        );
        assert_eq!(
            extract_video_url(&json!({ "video": {
                "transcoded_video": { "origin": { "video_url": "" } },
                "play_url": "https://v/play"
            } })),
            Some("https://v/play".to_string())
        );
        assert_eq!(
            extract_video_url(&json!({ "video": { "download_url": "https://v/dl" } })),
            Some("https://v/dl".to_string())
        );
        assert_eq!(extract_video_url(&json!({ "video": {} })), None);
        assert_eq!(extract_video_url(&json!({})), None);
    }

    #[test]
    fn test_video_list_urls_are_base64_decoded() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("https://v/encoded.mp4");
        let item = json!({ "video": { "video_list": { "video_1": { "main_url": encoded } } } });
        assert_eq!(extract_video_url(&item), Some("https://v/encoded.mp4".to_string()));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        assert_eq!(non_empty("  ", "1:1"), "1:1");
        assert_eq!(non_empty("16:9", "1:1"), "16:9");
    }
}
