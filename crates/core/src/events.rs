//! Notifications emitted to the host.

use serde::Serialize;

/// Outward event. Each fires at most once per state transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ViewerEvent {
    /// A page finished loading. `page` is 1-based; `width` and `height`
    /// are the page's pixel size at the base raster scale.
    #[serde(rename_all = "camelCase")]
    LoadComplete { page: u32, width: u32, height: u32 },
    Error { message: String },
    PageCount { count: u32 },
    PasswordRequired,
    DownloadProgress { percent: u8 },
    /// The displayed page changed (0-based).
    PageChanged { page: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_type_tag() {
        let json = serde_json::to_value(ViewerEvent::LoadComplete { page: 1, width: 1224, height: 1584 })
            .unwrap();
        assert_eq!(json["type"], "loadComplete");
        assert_eq!(json["width"], 1224);

        let json = serde_json::to_value(ViewerEvent::PasswordRequired).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "passwordRequired" }));
    }
}
