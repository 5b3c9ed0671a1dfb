use serde::{Deserialize, Serialize};
use url::Url;

/// Schemes whose responses never touch the network stack.
pub const NON_NETWORK_PROTOCOLS: [&str; 6] = [
    "blob",
    "data",
    "intent",
    "file",
    "filesystem",
    "chrome-extension",
];

pub const SECURE_SCHEMES: [&str; 2] = ["https", "wss"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum RequestPriority {
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl RequestPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestPriority::VeryLow => "VeryLow",
            RequestPriority::Low => "Low",
            RequestPriority::Medium => "Medium",
            RequestPriority::High => "High",
            RequestPriority::VeryHigh => "VeryHigh",
        }
    }

    pub fn is_low(&self) -> bool {
        matches!(self, RequestPriority::VeryLow | RequestPriority::Low)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResourceType {
    Document,
    Stylesheet,
    Script,
    Image,
    Font,
    Media,
    Fetch,
    #[serde(rename = "XHR")]
    Xhr,
    #[default]
    Other,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Document => "document",
            ResourceType::Stylesheet => "stylesheet",
            ResourceType::Script => "script",
            ResourceType::Image => "image",
            ResourceType::Font => "font",
            ResourceType::Media => "media",
            ResourceType::Fetch => "fetch",
            ResourceType::Xhr => "xhr",
            ResourceType::Other => "other",
        }
    }
}

/// DevTools resource timing, in milliseconds relative to the request start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTiming {
    #[serde(default)]
    pub dns_start: Option<f64>,
    #[serde(default)]
    pub dns_end: Option<f64>,
    #[serde(default)]
    pub connect_start: Option<f64>,
    #[serde(default)]
    pub connect_end: Option<f64>,
    #[serde(default)]
    pub ssl_start: Option<f64>,
    #[serde(default)]
    pub ssl_end: Option<f64>,
    #[serde(default)]
    pub send_start: Option<f64>,
    #[serde(default)]
    pub send_end: Option<f64>,
    #[serde(default)]
    pub receive_headers_end: Option<f64>,
}

impl ResourceTiming {
    /// Time between the request being sent and the first response byte.
    pub fn time_to_first_byte(&self) -> Option<f64> {
        match (self.send_end, self.receive_headers_end) {
            (Some(send_end), Some(headers_end)) if headers_end >= send_end => {
                Some(headers_end - send_end)
            }
            _ => None,
        }
    }
}

fn default_status_code() -> u16 {
    200
}

/// One observed network request, as recorded by the browser driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    pub request_id: String,
    pub url: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub priority: RequestPriority,
    #[serde(default)]
    pub transfer_size: Option<u64>,
    #[serde(default)]
    pub resource_size: Option<u64>,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub timing: Option<ResourceTiming>,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub from_disk_cache: bool,
    #[serde(default)]
    pub from_memory_cache: bool,
    #[serde(default)]
    pub initiator_request_id: Option<String>,
    #[serde(default)]
    pub initiator_url: Option<String>,
    #[serde(default)]
    pub connection_reused: bool,
}

impl NetworkRecord {
    pub fn new(request_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            url: url.into(),
            protocol: "http/1.1".to_string(),
            resource_type: ResourceType::Other,
            priority: RequestPriority::Medium,
            transfer_size: None,
            resource_size: None,
            start_time: 0.0,
            end_time: 0.0,
            timing: None,
            status_code: default_status_code(),
            failed: false,
            from_disk_cache: false,
            from_memory_cache: false,
            initiator_request_id: None,
            initiator_url: None,
            connection_reused: false,
        }
    }

    pub fn parsed_url(&self) -> Option<Url> {
        Url::parse(&self.url).ok()
    }

    pub fn scheme(&self) -> String {
        self.parsed_url()
            .map(|u| u.scheme().to_string())
            .unwrap_or_default()
    }

    /// `scheme://host[:port]`, the key connections are pooled under.
    pub fn origin(&self) -> String {
        self.parsed_url()
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|| "null".to_string())
    }

    pub fn host(&self) -> String {
        self.parsed_url()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default()
    }

    pub fn is_secure(&self) -> bool {
        SECURE_SCHEMES.contains(&self.scheme().as_str())
    }

    pub fn is_non_network_protocol(&self) -> bool {
        NON_NETWORK_PROTOCOLS.contains(&self.scheme().as_str())
    }

    pub fn is_cache_hit(&self) -> bool {
        self.from_disk_cache || self.from_memory_cache || self.transfer_size == Some(0)
    }

    pub fn is_h2(&self) -> bool {
        self.protocol == "h2"
    }

    /// Wall-clock time the request took when it was observed.
    pub fn observed_duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }

    /// VeryHigh requests, and High priority scripts, hold up first paint.
    pub fn has_render_blocking_priority(&self) -> bool {
        match self.priority {
            RequestPriority::VeryHigh => true,
            RequestPriority::High => self.resource_type == ResourceType::Script,
            _ => false,
        }
    }

    /// Absolute time the response headers arrived, falling back to the start time.
    pub fn response_headers_end_time(&self) -> f64 {
        self.timing
            .as_ref()
            .and_then(|t| t.receive_headers_end)
            .map(|end| self.start_time + end)
            .unwrap_or(self.start_time)
    }
}
