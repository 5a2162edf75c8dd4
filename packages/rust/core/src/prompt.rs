//! Prompt construction for the AI analysis stage.
//!
//! The model sees search statistics and source titles/URLs only. Raw page
//! content never reaches the prompt.

use std::fmt::Write;

use serde_json::{Map, Value};

use crate::stages::text_field;

/// Sources listed in the prompt context.
const CONTEXT_SOURCES: usize = 10;

/// Response schema the downstream stages read.
const RESPONSE_SCHEMA: &str = r#"{
  "avatar": {
    "fictionalName": "string",
    "demographicProfile": {
      "age": "string", "gender": "string", "income": "string",
      "education": "string", "location": "string", "occupation": "string"
    },
    "psychographicProfile": {
      "personality": "string", "values": "string", "interests": "string",
      "buyingBehaviour": "string", "influencers": "string",
      "deepFears": "string", "secretAspirations": "string"
    },
    "painPoints": ["10-15 concrete pains"],
    "desires": ["10-15 concrete desires"],
    "objections": ["8-12 concrete objections"],
    "internalLanguage": {
      "painPhrases": ["string"], "desirePhrases": ["string"],
      "vocabulary": ["string"], "tone": "string"
    }
  },
  "positioning": {
    "marketPositioning": "string",
    "uniqueValueProposition": "string",
    "competitiveDifferentiators": ["string"],
    "coreMessage": "string",
    "blueOceanStrategy": "string",
    "priceAnchoring": "string"
  },
  "competitorAnalysis": [
    {
      "name": "string", "positioning": "string",
      "strengths": ["string"], "weaknesses": ["string"], "vulnerabilities": ["string"],
      "marketingStrategy": "string", "estimatedShare": "string"
    }
  ],
  "marketingStrategy": {
    "primaryKeywords": ["string"], "secondaryKeywords": ["string"],
    "longTailKeywords": ["string"], "contentStrategy": "string",
    "acquisitionChannels": ["string"],
    "funnel": {"top": "string", "middle": "string", "bottom": "string"}
  },
  "kpis": {
    "primary": [{"metric": "string", "target": "string", "benchmark": "string"}],
    "projections": {
      "conservative": {"monthlyRevenue": "string", "monthlyCustomers": "string", "averageTicket": "string"},
      "realistic": {"monthlyRevenue": "string", "monthlyCustomers": "string", "averageTicket": "string"},
      "optimistic": {"monthlyRevenue": "string", "monthlyCustomers": "string", "averageTicket": "string"}
    }
  },
  "insights": ["20-30 specific, actionable insights"]
}"#;

/// Summarize a web-search section for the model: statistics plus the top
/// sources by title and URL.
pub fn search_context(web_search: &Value) -> String {
    let num = |key: &str| web_search.get(key).and_then(Value::as_f64).unwrap_or(0.0);

    let mut out = String::from("WEB RESEARCH SUMMARY\n\nStatistics:\n");
    let _ = writeln!(out, "- Sources analysed: {}", num("totalSources") as u64);
    let _ = writeln!(out, "- Unique domains: {}", num("uniqueDomains") as u64);
    let _ = writeln!(out, "- Average source quality: {:.1}%", num("avgQuality"));
    let _ = writeln!(
        out,
        "- Content analysed: {} characters",
        num("totalContentLength") as u64
    );
    out.push_str("\nMain sources:\n");

    let sources = web_search
        .get("sourcesSummary")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for (i, source) in sources.iter().take(CONTEXT_SOURCES).enumerate() {
        let field = |key: &str| source.get(key).and_then(Value::as_str).unwrap_or("");
        let _ = writeln!(out, "{}. {}", i + 1, non_empty(field("title"), "Untitled"));
        let _ = writeln!(out, "   URL: {}", field("url"));
        let _ = writeln!(out, "   Source: {}", non_empty(field("source"), "unknown"));
        let quality = source
            .get("qualityScore")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let _ = writeln!(out, "   Quality: {quality:.1}\n");
    }

    out
}

/// Full analysis prompt for a project and its search context.
pub fn analysis_prompt(data: &Map<String, Value>, context: &str) -> String {
    let field = |key: &str| {
        text_field(data, key)
            .map(str::to_string)
            .or_else(|| number_field(data, key))
            .unwrap_or_else(|| "unspecified".to_string())
    };

    format!(
        "# MARKET ANALYSIS\n\n\
         You are a senior market-research director.\n\n\
         ## Project\n\
         - Segment: {segment}\n\
         - Product: {product}\n\
         - Audience: {audience}\n\
         - Price: {price}\n\
         - Revenue goal: {revenue}\n\n\
         {context}\n\
         ## Rules\n\
         1. Use only facts supported by the research above.\n\
         2. Never write placeholders such as \"N/A\", \"customized for\" or \"based on\".\n\
         3. Be concrete: numbers, names, places.\n\
         4. Omit a section rather than invent it.\n\
         5. Prefer actionable insights.\n\n\
         ## Output\n\
         Reply with a single JSON document in a ```json fence, matching:\n\
         ```json\n{RESPONSE_SCHEMA}\n```\n",
        segment = field("segment"),
        product = field("product"),
        audience = field("audience"),
        price = field("price"),
        revenue = field("revenueGoal"),
    )
}

fn number_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key)
        .filter(|v| v.is_number())
        .map(Value::to_string)
}

fn non_empty<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() { default } else { value }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn context_lists_top_sources_without_content() {
        let sources: Vec<Value> = (0..15)
            .map(|i| {
                json!({
                    "title": format!("Source {i}"),
                    "url": format!("https://s{i}.example/"),
                    "source": "web",
                    "qualityScore": 70.0
                })
            })
            .collect();
        let ws = json!({
            "totalSources": 15,
            "uniqueDomains": 15,
            "avgQuality": 72.25,
            "totalContentLength": 48000,
            "sourcesSummary": sources,
            "detailedResults": [{"content": "SECRET RAW BODY"}]
        });
        let ctx = search_context(&ws);
        assert!(ctx.contains("Sources analysed: 15"));
        assert!(ctx.contains("72.2%") || ctx.contains("72.3%"));
        assert!(ctx.contains("10. Source 9"));
        assert!(!ctx.contains("Source 10"));
        assert!(!ctx.contains("SECRET RAW BODY"));
    }

    #[test]
    fn prompt_carries_project_fields() {
        let data = match json!({
            "segment": "Digital Education",
            "product": "Online Course",
            "price": 497.0
        }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let prompt = analysis_prompt(&data, "CTX");
        assert!(prompt.contains("Segment: Digital Education"));
        assert!(prompt.contains("Price: 497.0"));
        assert!(prompt.contains("Audience: unspecified"));
        assert!(prompt.contains("\"painPoints\""));
        assert!(prompt.contains("CTX"));
    }
}
