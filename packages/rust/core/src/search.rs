//! Query generation and consolidation of search responses.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use crate::collaborators::{SearchHit, SearchResponse};
use crate::stages::text_field;

/// Sources kept in the summary list of a consolidated search.
pub const SOURCES_SUMMARY_LIMIT: usize = 20;

/// Build the search queries for a project, most specific first.
///
/// A caller-supplied `query` leads, followed by product-aware (or
/// segment-only) market queries, audience queries, and a fixed block of
/// market-intelligence queries. At most `max` are returned.
pub fn generate_queries(data: &Map<String, Value>, max: usize) -> Vec<String> {
    let segment = text_field(data, "segment").unwrap_or_default();
    let product = text_field(data, "product");
    let audience = text_field(data, "audience");

    let mut queries = Vec::new();

    if let Some(custom) = data.get("query").and_then(Value::as_str) {
        let custom = custom.trim();
        if !custom.is_empty() {
            queries.push(custom.to_string());
        }
    }

    match product {
        Some(product) => queries.extend([
            format!("{segment} {product} market analysis 2024 statistics growth data"),
            format!("{segment} {product} competition main players market share"),
            format!("{segment} {product} trends innovation technology outlook"),
            format!("{segment} {product} consumer behaviour purchase decision"),
            format!("{segment} {product} pricing average ticket market benchmarks"),
        ]),
        None => queries.extend([
            format!("{segment} market 2024 size growth opportunities"),
            format!("{segment} competitive analysis leading companies"),
            format!("{segment} trends innovation technological disruption"),
            format!("{segment} investment venture capital startup funding"),
            format!("{segment} regulation legal changes business impact"),
        ]),
    }

    if let Some(audience) = audience {
        queries.extend([
            format!("{audience} {segment} demographic profile data"),
            format!("{audience} {segment} consumption behaviour survey"),
            format!("{audience} {segment} buying journey decision process"),
        ]);
    }

    queries.extend([
        format!("{segment} success cases leading companies unicorns"),
        format!("{segment} mergers acquisitions M&A consolidation"),
        format!("{segment} IPO stock exchange capital markets"),
        format!("{segment} market research institutes consulting data"),
        format!("{segment} sector reports McKinsey BCG Deloitte"),
    ]);

    let mut seen = HashSet::new();
    queries.retain(|q| seen.insert(q.clone()));
    queries.truncate(max);
    queries
}

// ---------------------------------------------------------------------------
// Consolidation
// ---------------------------------------------------------------------------

/// One source in the summary list, without any content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    pub title: String,
    pub url: String,
    pub source: String,
    pub quality_score: f64,
}

impl From<&SearchHit> for SourceSummary {
    fn from(hit: &SearchHit) -> Self {
        Self {
            title: hit.title.clone(),
            url: hit.url.clone(),
            source: hit.source.clone(),
            quality_score: hit.quality_score,
        }
    }
}

/// Aggregate of every accepted search response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedSearch {
    pub total_sources: u64,
    pub total_content_length: u64,
    pub avg_quality: f64,
    pub unique_domains: usize,
    pub sources_summary: Vec<SourceSummary>,
    /// Full per-source records. Stripped by redaction before output.
    pub detailed_results: Vec<SearchHit>,
}

/// Merge the responses that met the quality bar.
pub fn consolidate(responses: &[SearchResponse]) -> ConsolidatedSearch {
    let hits: Vec<&SearchHit> = responses
        .iter()
        .flat_map(|r| r.search_results.iter())
        .collect();

    let extracted: u64 = responses
        .iter()
        .map(|r| r.statistics.successful_extractions)
        .sum();
    let qualities: Vec<f64> = responses
        .iter()
        .map(|r| r.statistics.avg_quality_score)
        .filter(|q| *q > 0.0)
        .collect();
    let avg_quality = if qualities.is_empty() {
        0.0
    } else {
        qualities.iter().sum::<f64>() / qualities.len() as f64
    };

    ConsolidatedSearch {
        total_sources: if extracted > 0 {
            extracted
        } else {
            hits.len() as u64
        },
        total_content_length: responses
            .iter()
            .map(|r| r.statistics.total_content_length)
            .sum(),
        avg_quality,
        unique_domains: unique_domains(hits.iter().copied()),
        sources_summary: hits
            .iter()
            .take(SOURCES_SUMMARY_LIMIT)
            .map(|h| SourceSummary::from(*h))
            .collect(),
        detailed_results: hits.into_iter().cloned().collect(),
    }
}

/// Minimal consolidation of secondary (title/URL only) hits.
pub fn consolidate_basic(hits: &[SearchHit]) -> ConsolidatedSearch {
    ConsolidatedSearch {
        total_sources: hits.len() as u64,
        total_content_length: 0,
        avg_quality: 0.0,
        unique_domains: unique_domains(hits.iter()),
        sources_summary: hits
            .iter()
            .take(SOURCES_SUMMARY_LIMIT)
            .map(SourceSummary::from)
            .collect(),
        detailed_results: hits.to_vec(),
    }
}

fn unique_domains<'a>(hits: impl Iterator<Item = &'a SearchHit>) -> usize {
    hits.filter_map(|h| Url::parse(&h.url).ok())
        .filter_map(|u| u.host_str().map(str::to_lowercase))
        .collect::<HashSet<_>>()
        .len()
}
