//! Public model names, vendor model keys and the size tables behind them.

use serde::Serialize;

use crate::models::job::JobKind;
use crate::services::classifier::ApiError;
use crate::services::region::Region;

pub const DEFAULT_IMAGE_MODEL: &str = "jimeng-4.0";
pub const DEFAULT_VIDEO_MODEL: &str = "jimeng-video-3.5-pro";

const IMAGE_MODELS_CN: &[(&str, &str)] = &[
    ("jimeng-4.5", "high_aes_general_v40l"),
    ("jimeng-4.1", "high_aes_general_v41"),
    ("jimeng-4.0", "high_aes_general_v40"),
    ("jimeng-3.1", "high_aes_general_v30l_art_fangzhou:general_v3.0_18b"),
    ("jimeng-3.0", "high_aes_general_v30l:general_v3.0_18b"),
    ("jimeng-2.1", "high_aes_general_v21_L:general_v2.1_L"),
    ("jimeng-2.0-pro", "high_aes_general_v20_L:general_v2.0_L"),
    ("jimeng-2.0", "high_aes_general_v20:general_v2.0"),
    ("jimeng-1.4", "high_aes_general_v14:general_v1.4"),
    ("jimeng-xl-pro", "text2img_xl_sft"),
];

const IMAGE_MODELS_INTERNATIONAL: &[(&str, &str)] = &[
    ("jimeng-4.5", "high_aes_general_v40l"),
    ("jimeng-4.1", "high_aes_general_v41"),
    ("jimeng-4.0", "high_aes_general_v40"),
    ("jimeng-3.0", "high_aes_general_v30l:general_v3.0_18b"),
    ("nanobanana", "external_model_gemini_flash_image_v25"),
    ("nanobananapro", "dreamina_image_lib_1"),
];

const VIDEO_MODELS_CN: &[(&str, &str)] = &[
    ("jimeng-video-4.0-pro", "dreamina_seedance_40_pro"),
    ("jimeng-video-4.0", "dreamina_seedance_40"),
    ("jimeng-video-3.5-pro", "dreamina_ic_generate_video_model_vgfm_3.5_pro"),
    ("jimeng-video-3.0-pro", "dreamina_ic_generate_video_model_vgfm_3.0_pro"),
    ("jimeng-video-3.0", "dreamina_ic_generate_video_model_vgfm_3.0"),
    ("jimeng-video-3.0-fast", "dreamina_ic_generate_video_model_vgfm_3.0_fast"),
    ("jimeng-video-2.0", "dreamina_ic_generate_video_model_vgfm_lite"),
    ("jimeng-video-2.0-pro", "dreamina_ic_generate_video_model_vgfm1.0"),
];

const VIDEO_MODELS_US: &[(&str, &str)] = &[
    ("jimeng-video-3.5-pro", "dreamina_ic_generate_video_model_vgfm_3.5_pro"),
    ("jimeng-video-3.0", "dreamina_ic_generate_video_model_vgfm_3.0"),
];

const VIDEO_MODELS_ASIA: &[(&str, &str)] = &[
    ("jimeng-video-veo3", "dreamina_veo3_generate_video"),
    ("jimeng-video-veo3.1", "dreamina_veo3.1_generate_video"),
    ("jimeng-video-sora2", "dreamina_sora2_generate_video"),
    ("jimeng-video-3.5-pro", "dreamina_ic_generate_video_model_vgfm_3.5_pro"),
    ("jimeng-video-3.0-pro", "dreamina_ic_generate_video_model_vgfm_3.0_pro"),
    ("jimeng-video-3.0", "dreamina_ic_generate_video_model_vgfm_3.0"),
    ("jimeng-video-3.0-fast", "dreamina_ic_generate_video_model_vgfm_3.0_fast"),
    ("jimeng-video-2.0", "dreamina_ic_generate_video_model_vgfm_lite"),
    ("jimeng-video-2.0-pro", "dreamina_ic_generate_video_model_vgfm1.0"),
];

fn lookup(table: &[(&str, &'static str)], model: &str) -> Option<&'static str> {
    table.iter().find(|(name, _)| *name == model).map(|(_, key)| *key)
}

fn names(table: &[(&'static str, &str)]) -> String {
    let mut names: Vec<&str> = table.iter().map(|(name, _)| *name).collect();
    names.sort_unstable();
    names.join(", ")
}

/// Vendor model key for a public image model name.
///
/// International accounts only see a subset and get a `ParamsInvalid` for
/// anything else; CN falls back to the default model.
pub fn image_model(model: &str, region: Region) -> Result<&'static str, ApiError> {
    let model = if model.trim().is_empty() { DEFAULT_IMAGE_MODEL } else { model };

    if region.is_international() {
        return lookup(IMAGE_MODELS_INTERNATIONAL, model).ok_or_else(|| {
            ApiError::params_invalid(format!(
                "model \"{model}\" is not available outside CN, supported: {}",
                names(IMAGE_MODELS_INTERNATIONAL)
            ))
        });
    }

    lookup(IMAGE_MODELS_CN, model)
        .or_else(|| lookup(IMAGE_MODELS_CN, DEFAULT_IMAGE_MODEL))
        .ok_or_else(|| ApiError::params_invalid(format!("unsupported model \"{model}\"")))
}

/// Vendor model key for a public video model name, falling back to the
/// regional default for unknown names.
pub fn video_model(model: &str, region: Region) -> &'static str {
    let model = if model.trim().is_empty() { DEFAULT_VIDEO_MODEL } else { model };
    let table = match region {
        Region::Cn => VIDEO_MODELS_CN,
        Region::Us => VIDEO_MODELS_US,
        Region::Hk | Region::Jp | Region::Sg => VIDEO_MODELS_ASIA,
    };
    lookup(table, model)
        .or_else(|| lookup(table, DEFAULT_VIDEO_MODEL))
        .unwrap_or("dreamina_ic_generate_video_model_vgfm_3.5_pro")
}

/// Chat routes dispatch on the public name: `jimeng-video*` means video.
pub fn kind_of(model: &str) -> JobKind {
    if model.trim().to_ascii_lowercase().starts_with("jimeng-video") {
        JobKind::Video
    } else {
        JobKind::Image
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub id: &'static str,
    pub object: &'static str,
    pub owned_by: &'static str,
    pub kind: JobKind,
}

/// Every public model name known to any region, images first.
pub fn all_models() -> Vec<ModelEntry> {
    let mut seen = std::collections::HashSet::new();
    let images = IMAGE_MODELS_CN
        .iter()
        .chain(IMAGE_MODELS_INTERNATIONAL)
        .map(|(name, _)| (*name, JobKind::Image));
    let videos = VIDEO_MODELS_CN
        .iter()
        .chain(VIDEO_MODELS_ASIA)
        .chain(VIDEO_MODELS_US)
        .map(|(name, _)| (*name, JobKind::Video));

    images
        .chain(videos)
        .filter(|(name, _)| seen.insert(*name))
        .map(|(id, kind)| ModelEntry {
            id,
            object: "model",
            owned_by: "jimeng-gateway",
            kind,
        })
        .collect()
}

/// Pixel size and vendor ratio code for one resolution / aspect combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
    pub ratio: u32,
    pub resolution_type: &'static str,
}

const RATIOS: [(&str, u32); 8] = [
    ("1:1", 1),
    ("4:3", 4),
    ("3:4", 2),
    ("16:9", 3),
    ("9:16", 5),
    ("3:2", 7),
    ("2:3", 6),
    ("21:9", 8),
];

// Same order as RATIOS.
const SIZES_1K: [(u32, u32); 8] = [
    (1328, 1328),
    (1472, 1104),
    (1104, 1472),
    (1664, 936),
    (936, 1664),
    (1584, 1056),
    (1056, 1584),
    (2016, 864),
];
const SIZES_2K: [(u32, u32); 8] = [
    (2048, 2048),
    (2304, 1728),
    (1728, 2304),
    (2560, 1440),
    (1440, 2560),
    (2496, 1664),
    (1664, 2496),
    (3024, 1296),
];
const SIZES_4K: [(u32, u32); 8] = [
    (4096, 4096),
    (4693, 3520),
    (3520, 4693),
    (5404, 3040),
    (3040, 5404),
    (4992, 3328),
    (3328, 4992),
    (6197, 2656),
];

pub const DEFAULT_RESOLUTION: &str = "2k";
pub const DEFAULT_RATIO: &str = "1:1";

pub fn image_size(resolution: &str, ratio: &str) -> Result<ImageSize, ApiError> {
    let resolution = if resolution.is_empty() { DEFAULT_RESOLUTION } else { resolution };
    let ratio = if ratio.is_empty() { DEFAULT_RATIO } else { ratio };

    let (resolution_type, sizes) = match resolution {
        "1k" => ("1k", &SIZES_1K),
        "2k" => ("2k", &SIZES_2K),
        "4k" => ("4k", &SIZES_4K),
        other => {
            return Err(ApiError::params_invalid(format!(
                "unsupported resolution \"{other}\", supported: 1k, 2k, 4k"
            )))
        }
    };

    let index = RATIOS.iter().position(|(name, _)| *name == ratio).ok_or_else(|| {
        let supported: Vec<&str> = RATIOS.iter().map(|(name, _)| *name).collect();
        ApiError::params_invalid(format!(
            "unsupported ratio \"{ratio}\" at {resolution_type}, supported: {}",
            supported.join(", ")
        ))
    })?;

    let (width, height) = sizes[index];
    Ok(ImageSize {
        width,
        height,
        ratio: RATIOS[index].1,
        resolution_type,
    })
}

/// `nanobanana` ignores the requested size.
pub fn image_size_for_model(model: &str, resolution: &str, ratio: &str) -> Result<ImageSize, ApiError> {
    if model == "nanobanana" {
        tracing::warn!(model, "Model uses a fixed 1024x1024 size, ignoring requested resolution and ratio");
        return Ok(ImageSize {
            width: 1024,
            height: 1024,
            ratio: 1,
            resolution_type: "2k",
        });
    }
    image_size(resolution, ratio)
}

/// Clip length in seconds for a vendor video model key.
pub fn video_duration(model_key: &str, requested: u32) -> u32 {
    if model_key.contains("veo3") {
        return 8;
    }
    let allowed: &[u32] = if model_key.contains("sora2") {
        &[4, 8, 12]
    } else if model_key.contains("3.5_pro") {
        &[5, 10, 12]
    } else if model_key.contains("40") {
        &[5, 10, 15]
    } else {
        &[5, 10]
    };
    if allowed.contains(&requested) {
        requested
    } else {
        allowed[0]
    }
}

/// Only the non-pro 3.0 family accepts an explicit resolution.
pub fn video_supports_resolution(model_key: &str) -> bool {
    model_key.contains("vgfm_3.0") && !model_key.contains("_pro")
}

/// Billing bucket the vendor charges the clip against.
pub fn video_benefit_type(model_key: &str) -> &'static str {
    if model_key.contains("veo3.1") {
        "generate_video_veo3.1"
    } else if model_key.contains("veo3") {
        "generate_video_veo3"
    } else if model_key.contains("sora2") {
        "generate_video_sora2"
    } else if model_key.contains("40_pro") {
        "dreamina_video_seedance_20_pro"
    } else if model_key.contains("40") {
        "dreamina_video_seedance_20"
    } else if model_key.contains("3.5_pro") {
        "dreamina_video_seedance_15_pro"
    } else if model_key.contains("3.5") {
        "dreamina_video_seedance_15"
    } else {
        "basic_video_operation_vgfm_v_three"
    }
}
