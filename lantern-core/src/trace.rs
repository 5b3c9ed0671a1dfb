// Page trace model and loader

use crate::error::Result;
use lantern_sim::{CpuNode, NetworkRecord, ResourceType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// One main-thread task from the performance trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub start_time: f64,
    pub duration: f64,
    #[serde(default)]
    pub attributable_urls: Vec<String>,
    #[serde(default)]
    pub did_perform_layout: bool,
    /// Requests this task started (e.g. a script inserting a tag).
    #[serde(default)]
    pub initiated_request_ids: Vec<String>,
}

impl TraceTask {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    pub fn to_cpu_node(&self) -> CpuNode {
        CpuNode {
            start_time: self.start_time,
            duration: self.duration,
            attributable_urls: self.attributable_urls.clone(),
            did_perform_layout: self.did_perform_layout,
        }
    }
}

/// Observed paint milestones, in ms on the same clock as the records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricTimestamps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_contentful_paint: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub largest_contentful_paint: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTrace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_document_url: Option<String>,
    pub records: Vec<NetworkRecord>,
    #[serde(default)]
    pub tasks: Vec<TraceTask>,
    #[serde(default)]
    pub timestamps: MetricTimestamps,
}

impl PageTrace {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The record for the page itself: the one matching
    /// `main_document_url`, else the earliest Document request.
    pub fn main_document(&self) -> Option<&NetworkRecord> {
        let earliest = |a: &&NetworkRecord, b: &&NetworkRecord| a.start_time.total_cmp(&b.start_time);

        if let Some(url) = &self.main_document_url {
            let matching = self
                .records
                .iter()
                .filter(|record| &record.url == url)
                .min_by(earliest);
            if matching.is_some() {
                return matching;
            }
            debug!("No record matches main document URL {}", url);
        }

        self.records
            .iter()
            .filter(|record| record.resource_type == ResourceType::Document)
            .min_by(earliest)
    }
}

/// Load a page trace from a JSON file
pub fn load_page_trace(path: &Path) -> Result<PageTrace> {
    let content = fs::read_to_string(path)?;
    let trace = PageTrace::from_json(&content)?;
    debug!(
        "Loaded {} records and {} tasks from {}",
        trace.records.len(),
        trace.tasks.len(),
        path.display()
    );
    Ok(trace)
}
