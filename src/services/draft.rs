//! Vendor draft payloads for `/mweb/v1/aigc_draft/generate`.
//!
//! The vendor expects its web editor's document format: a draft holding one
//! component whose abilities carry the generation parameters. The draft
//! travels as a JSON string inside the outer JSON body.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use serde_json::{json, Value};

use crate::services::catalog::ImageSize;
use crate::services::ids::IdGenerator;
use crate::services::region::Region;

const DRAFT_VERSION: &str = "3.3.8";
const DRAFT_MIN_VERSION: &str = "3.0.2";
const VIDEO_DRAFT_MIN_VERSION: &str = "3.0.5";

/// Only this model supports batched storyboard generation.
const MULTI_IMAGE_MODEL: &str = "jimeng-4.0";
const MULTI_IMAGE_KEYWORDS: &[&str] = &["连续", "绘本", "故事"];
const MULTI_IMAGE_DEFAULT_COUNT: u32 = 4;

static IMAGE_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)张").expect("image count pattern is valid"));

#[derive(Debug, Clone)]
pub struct ImageDraft<'a> {
    pub model_key: &'a str,
    pub prompt: &'a str,
    pub negative_prompt: &'a str,
    pub sample_strength: f64,
    pub size: ImageSize,
    pub intelligent_ratio: bool,
    pub seed: u64,
    /// Submit as a multi-image (storyboard) request.
    pub multi_image: bool,
}

#[derive(Debug, Clone)]
pub struct VideoDraft<'a> {
    pub model_key: &'a str,
    pub prompt: &'a str,
    pub ratio: &'a str,
    /// Set only for models that accept an explicit resolution.
    pub resolution: Option<&'a str>,
    pub duration_secs: u32,
    pub seed: u64,
}

pub fn random_seed() -> u64 {
    rand::thread_rng().gen_range(2_500_000_000..2_600_000_000)
}

/// Number of images a multi-image prompt asks for, or `None` when the prompt
/// should go through the regular four-image path.
///
/// A prompt qualifies when it names a count (`6张`) or reads as a sequence
/// (`连续`, `绘本`, `故事`). Without a usable count the batch is four images.
pub fn multi_image_target(model: &str, prompt: &str) -> Option<u32> {
    if model != MULTI_IMAGE_MODEL {
        return None;
    }
    let count = IMAGE_COUNT.captures(prompt);
    let keyword = MULTI_IMAGE_KEYWORDS.iter().any(|keyword| prompt.contains(keyword));
    if count.is_none() && !keyword {
        return None;
    }
    let target = count
        .and_then(|captures| captures[1].parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(MULTI_IMAGE_DEFAULT_COUNT);
    Some(target)
}

fn created_time_ms() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

fn component_metadata(ids: &dyn IdGenerator) -> Value {
    json!({
        "type": "",
        "id": ids.next_id(),
        "created_platform": 3,
        "created_platform_version": "",
        "created_time_in_ms": created_time_ms(),
        "created_did": "",
    })
}

fn wrap_draft(ids: &dyn IdGenerator, min_version: &str, component_id: &str, component: Value) -> Value {
    json!({
        "type": "draft",
        "id": ids.next_id(),
        "min_version": min_version,
        "min_features": [],
        "is_from_tsn": true,
        "version": DRAFT_VERSION,
        "main_component_id": component_id,
        "component_list": [component],
    })
}

/// Text-to-image request body.
pub fn image_payload(ids: &dyn IdGenerator, region: Region, draft: &ImageDraft<'_>) -> Value {
    let component_id = ids.next_id();
    let submit_id = ids.next_id();
    let metrics_extra = if draft.multi_image {
        json!({
            "templateId": "",
            "generateCount": 1,
            "promptSource": "custom",
            "templateSource": "",
            "lastRequestId": "",
            "originRequestId": "",
        })
    } else {
        json!({
            "promptSource": "custom",
            "generateCount": 1,
            "enterFrom": "click",
            "generateId": ids.next_id(),
            "isRegenerate": false,
        })
    };

    let mut core_param = json!({
        "type": "",
        "id": ids.next_id(),
        "model": draft.model_key,
        "prompt": draft.prompt,
        "negative_prompt": draft.negative_prompt,
        "seed": draft.seed,
        "sample_strength": draft.sample_strength,
        "large_image_info": {
            "type": "",
            "id": ids.next_id(),
            "height": draft.size.height,
            "width": draft.size.width,
            "resolution_type": draft.size.resolution_type,
        },
        "intelligent_ratio": draft.intelligent_ratio,
    });
    if !draft.intelligent_ratio {
        core_param["image_ratio"] = json!(draft.size.ratio);
    }

    let component = json!({
        "type": "image_base_component",
        "id": component_id,
        "min_version": DRAFT_MIN_VERSION,
        "aigc_mode": "workbench",
        "metadata": component_metadata(ids),
        "generate_type": "generate",
        "abilities": {
            "type": "",
            "id": ids.next_id(),
            "generate": {
                "type": "",
                "id": ids.next_id(),
                "core_param": core_param,
            },
        },
    });
    let draft_content = wrap_draft(ids, DRAFT_MIN_VERSION, &component_id, component);

    json!({
        "extend": { "root_model": draft.model_key },
        "submit_id": submit_id,
        "metrics_extra": metrics_extra.to_string(),
        "draft_content": draft_content.to_string(),
        "http_common_info": { "aid": region.assistant_id() },
    })
}

/// Text-to-video request body.
pub fn video_payload(ids: &dyn IdGenerator, region: Region, draft: &VideoDraft<'_>) -> Value {
    let component_id = ids.next_id();

    let mut gen_input = json!({
        "type": "",
        "id": ids.next_id(),
        "min_version": VIDEO_DRAFT_MIN_VERSION,
        "prompt": draft.prompt,
        "video_mode": 2,
        "fps": 24,
        "duration_ms": draft.duration_secs * 1000,
        "first_frame_image": null,
        "end_frame_image": null,
        "idip_meta_list": [],
    });

    let mut scene_option = json!({
        "type": "video",
        "scene": "BasicVideoGenerateButton",
        "modelReqKey": draft.model_key,
        "videoDuration": draft.duration_secs,
        "reportParams": {
            "enterSource": "generate",
            "vipSource": "generate",
            "extraVipFunctionKey": draft.model_key,
            "useVipFunctionDetailsReporterHoc": true,
        },
    });

    if let Some(resolution) = draft.resolution {
        gen_input["resolution"] = json!(resolution);
        scene_option["resolution"] = json!(resolution);
        scene_option["reportParams"]["extraVipFunctionKey"] = json!(format!("{}-{resolution}", draft.model_key));
    }

    let metrics_extra = json!({
        "promptSource": "custom",
        "isDefaultSeed": 1,
        "originSubmitId": ids.next_id(),
        "isRegenerate": false,
        "enterFrom": "click",
        "functionMode": "first_last_frames",
        "sceneOptions": json!([scene_option]).to_string(),
    })
    .to_string();

    let component = json!({
        "type": "video_base_component",
        "id": component_id,
        "min_version": "1.0.0",
        "aigc_mode": "workbench",
        "generate_type": "gen_video",
        "metadata": component_metadata(ids),
        "abilities": {
            "type": "",
            "id": ids.next_id(),
            "gen_video": {
                "id": ids.next_id(),
                "type": "",
                "text_to_video_params": {
                    "type": "",
                    "id": ids.next_id(),
                    "video_gen_inputs": [gen_input],
                    "video_aspect_ratio": draft.ratio,
                    "seed": draft.seed,
                    "model_req_key": draft.model_key,
                    "priority": 0,
                },
                "video_task_extra": metrics_extra,
            },
        },
    });
    let draft_content = wrap_draft(ids, VIDEO_DRAFT_MIN_VERSION, &component_id, component);

    let commerce_info = json!({
        "benefit_type": crate::services::catalog::video_benefit_type(draft.model_key),
        "resource_id": "generate_video",
        "resource_id_type": "str",
        "resource_sub_type": "aigc",
    });

    json!({
        "extend": {
            "root_model": draft.model_key,
            "m_video_commerce_info": commerce_info.clone(),
            "m_video_commerce_info_list": [commerce_info],
        },
        "submit_id": ids.next_id(),
        "metrics_extra": metrics_extra,
        "draft_content": draft_content.to_string(),
        "http_common_info": { "aid": region.assistant_id() },
    })
}
