//! Vendor history records and status snapshots used across the test suites.

#![allow(dead_code)]

use jimeng_gateway::models::job::{RemoteStatus, StatusCheck, VendorStatus};
use serde_json::{json, Value};

pub const JOB_ID: &str = "7412345678901234567";

pub fn image_url(index: u32) -> String {
    format!("https://p3-dreamina.test/img/{index}.webp?x-expires=1\\u0026sign=abc")
}

/// The same URL after the gateway unescapes `&`.
pub fn clean_image_url(index: u32) -> String {
    format!("https://p3-dreamina.test/img/{index}.webp?x-expires=1&sign=abc")
}

pub const VIDEO_URL: &str = "https://v26-dreamina.test/video/out.mp4";

/// Image history record with `items` finished images.
pub fn image_record(status: VendorStatus, items: u32) -> Value {
    let item_list: Vec<Value> = (0..items)
        .map(|i| json!({ "image": { "large_images": [{ "image_url": image_url(i), "width": 2048, "height": 2048 }] } }))
        .collect();
    json!({
        "status": status.code(),
        "item_list": item_list,
        "total_image_count": 4,
        "finished_image_count": items,
    })
}

pub fn image_check(status: VendorStatus, items: u32) -> StatusCheck {
    StatusCheck {
        status: RemoteStatus::new(status, items),
        record: image_record(status, items),
    }
}

pub fn video_check(status: VendorStatus, url: Option<&str>) -> StatusCheck {
    let item_list: Vec<Value> = url
        .map(|url| vec![json!({ "video": { "transcoded_video": { "origin": { "video_url": url } } } })])
        .unwrap_or_default();
    let items = item_list.len() as u32;
    StatusCheck {
        status: RemoteStatus::new(status, items),
        record: json!({ "status": status.code(), "item_list": item_list }),
    }
}

pub fn failed_check(fail_code: &str) -> StatusCheck {
    StatusCheck {
        status: RemoteStatus::new(VendorStatus::Failed, 0).with_fail_code(fail_code),
        record: json!({ "status": 30, "fail_code": fail_code, "item_list": [] }),
    }
}
