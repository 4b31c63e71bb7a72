//! Output extraction.
//!
//! Upstream providers change their output shape between releases without
//! versioning, so media assets are recovered by ordered shape recognition
//! over the raw output object, with a last-resort URL sniff. Everything in
//! here is pure and total: unrecognized input yields an empty list, never
//! an error.

use serde_json::Value;
use url::Url;

use crate::models::job::MediaAsset;

/// File extensions accepted by the media-URL predicate.
const MEDIA_EXTENSIONS: &[&str] = &[
    ".mp4", ".webm", ".mov", ".avi", ".png", ".jpg", ".jpeg", ".webp", ".gif",
];

const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mov", ".avi"];

/// Single-string fields that may name a direct asset URL.
const URL_FIELDS: &[&str] = &["video_url", "s3_url", "image_url", "image", "url"];

/// Extract all media assets from a raw provider output object.
///
/// Recognized shapes, checked in order (non-exclusive):
/// 1. asset arrays under `images` / `videos` / `files`, entries being
///    either `{url, filename?}` objects or bare URL strings;
/// 2. single-string URL fields (`video_url`, `s3_url`, `image_url`,
///    `image`, `url`), gated by the media-URL predicate;
/// 3. if nothing matched, every string-valued field is sniffed with the
///    same predicate.
///
/// An orchestration-style envelope (`outputs: [{data: {...}}]`) and a
/// serverless-style `output` wrapper are both unwrapped first. URLs that
/// fail to parse are discarded.
pub fn extract_assets(raw: &Value) -> Vec<MediaAsset> {
    let Some(obj) = raw.as_object() else {
        return Vec::new();
    };

    // Orchestration envelope: each outputs[] entry carries its payload
    // under `data`.
    if let Some(outputs) = obj.get("outputs").and_then(Value::as_array) {
        let mut assets = Vec::new();
        for entry in outputs {
            let data = entry.get("data").unwrap_or(entry);
            assets.extend(extract_from_object(data));
        }
        if !assets.is_empty() {
            return assets;
        }
    }

    extract_from_object(raw)
}

fn extract_from_object(raw: &Value) -> Vec<MediaAsset> {
    // Serverless responses often nest the real payload one level down.
    let raw = match raw.get("output") {
        Some(inner) if inner.is_object() => inner,
        _ => raw,
    };
    let Some(obj) = raw.as_object() else {
        return Vec::new();
    };

    let mut assets = Vec::new();

    // Shape 1: arrays of asset entries.
    for (key, fallback) in [
        ("images", "image.png"),
        ("videos", "video.mp4"),
        ("files", "image.png"),
    ] {
        if let Some(entries) = obj.get(key).and_then(Value::as_array) {
            for entry in entries {
                let (candidate, explicit_name) = match entry {
                    Value::String(s) => (s.as_str(), None),
                    Value::Object(map) => {
                        let Some(u) = map.get("url").and_then(Value::as_str) else {
                            continue;
                        };
                        (u, map.get("filename").and_then(Value::as_str))
                    }
                    _ => continue,
                };
                if let Some(asset) = make_asset(candidate, explicit_name, fallback) {
                    assets.push(asset);
                }
            }
        }
    }

    // Shape 2: direct single-URL fields, gated by the media predicate.
    for field in URL_FIELDS {
        if let Some(candidate) = obj.get(*field).and_then(Value::as_str) {
            if is_media_url(candidate) {
                let fallback = default_filename(candidate);
                if let Some(asset) = make_asset(candidate, None, fallback) {
                    assets.push(asset);
                }
            }
        }
    }

    // Shape 3: nothing recognized yet, sniff every string field.
    if assets.is_empty() {
        for value in obj.values() {
            if let Some(candidate) = value.as_str() {
                if is_media_url(candidate) {
                    let fallback = default_filename(candidate);
                    if let Some(asset) = make_asset(candidate, None, fallback) {
                        assets.push(asset);
                    }
                }
            }
        }
    }

    assets
}

/// Build an asset, discarding candidates whose URL does not parse.
fn make_asset(candidate: &str, explicit_name: Option<&str>, fallback: &str) -> Option<MediaAsset> {
    let parsed = Url::parse(candidate).ok()?;
    let filename = explicit_name
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| filename_from_url(&parsed, fallback));
    Some(MediaAsset {
        url: candidate.to_string(),
        filename,
    })
}

/// Last non-empty path segment, or the type-appropriate fallback.
fn filename_from_url(url: &Url, fallback: &str) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

fn default_filename(candidate: &str) -> &'static str {
    let lower = candidate.to_lowercase();
    if VIDEO_EXTENSIONS.iter().any(|ext| lower.contains(ext)) {
        "video.mp4"
    } else {
        "image.png"
    }
}

/// Whether a string plausibly points at a produced media file: a known
/// media extension in the path, or an S3-style host.
pub fn is_media_url(candidate: &str) -> bool {
    let Ok(parsed) = Url::parse(candidate) else {
        return false;
    };

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        if host.contains("s3.") || host.contains("amazonaws.com") {
            return true;
        }
    }

    let path = parsed.path().to_lowercase();
    MEDIA_EXTENSIONS.iter().any(|ext| path.contains(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_object_yields_nothing() {
        assert!(extract_assets(&json!({})).is_empty());
    }

    #[test]
    fn null_and_non_object_yield_nothing() {
        assert!(extract_assets(&Value::Null).is_empty());
        assert!(extract_assets(&json!("https://cdn/x.png")).is_empty());
        assert!(extract_assets(&json!(42)).is_empty());
    }

    #[test]
    fn image_array_of_objects() {
        let raw = json!({
            "images": [
                {"url": "https://cdn.example.com/out/a.png", "filename": "a.png"},
                {"url": "https://cdn.example.com/out/b.png"}
            ]
        });
        let assets = extract_assets(&raw);
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].filename, "a.png");
        assert_eq!(assets[1].filename, "b.png");
    }

    #[test]
    fn image_array_of_bare_strings() {
        let raw = json!({"images": ["https://cdn.example.com/result_1.png"]});
        let assets = extract_assets(&raw);
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].filename, "result_1.png");
    }

    #[test]
    fn nested_output_s3_url() {
        // Serverless wrapper + single-URL field.
        let raw = json!({"output": {"s3_url": "https://bucket.s3.amazonaws.com/out.mp4"}});
        let assets = extract_assets(&raw);
        assert_eq!(
            assets,
            vec![MediaAsset {
                url: "https://bucket.s3.amazonaws.com/out.mp4".to_string(),
                filename: "out.mp4".to_string(),
            }]
        );
    }

    #[test]
    fn orchestration_envelope() {
        let raw = json!({
            "status": "success",
            "outputs": [
                {"data": {"images": [{"url": "https://cdn/x.png", "filename": "x.png"}]}},
                {"data": {"text": ["not media"]}}
            ]
        });
        let assets = extract_assets(&raw);
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].url, "https://cdn/x.png");
    }

    #[test]
    fn fallback_scans_string_fields() {
        let raw = json!({
            "message": "done",
            "result_location": "https://files.example.com/render/final.webm"
        });
        let assets = extract_assets(&raw);
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].filename, "final.webm");
    }

    #[test]
    fn fallback_skipped_when_shape_matched() {
        let raw = json!({
            "video_url": "https://files.example.com/a.mp4",
            "stray": "https://files.example.com/b.mp4"
        });
        let assets = extract_assets(&raw);
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].filename, "a.mp4");
    }

    #[test]
    fn unparseable_urls_are_discarded() {
        let raw = json!({"images": [{"url": "not a url"}]});
        assert!(extract_assets(&raw).is_empty());
    }

    #[test]
    fn empty_path_segment_gets_default_filename() {
        let raw = json!({"output": {"video_url": "https://renders.s3.amazonaws.com/"}});
        let assets = extract_assets(&raw);
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].filename, "video.mp4");
    }

    #[test]
    fn media_url_predicate() {
        assert!(is_media_url("https://cdn.example.com/a.PNG"));
        assert!(is_media_url("https://cdn.example.com/clip.mp4?sig=abc"));
        assert!(is_media_url("https://bucket.s3.us-east-1.amazonaws.com/blob"));
        assert!(is_media_url("https://host/anim.gif"));
        assert!(!is_media_url("https://example.com/page.html"));
        assert!(!is_media_url("definitely not a url"));
    }
}
