//! Deterministic fallback content for stages that could not produce output.
//!
//! Everything here is a pure function of the stage name and the run context.
//! Mappings returned by [`RecoveryGenerator::recover`] carry
//! `fallbackMode: true` and `recoveredStage`, so the validator and report
//! readers can tell them from researched content.

use serde_json::{Map, Value, json};

use reportforge_quality::{FALLBACK_MARKER, RECOVERED_STAGE_KEY};
use reportforge_shared::{QualityConfig, StageName};

use crate::stages::text_field;

const DEFAULT_SEGMENT: &str = "General business";
const DEFAULT_PRODUCT: &str = "Core offer";
const DEFAULT_AUDIENCE: &str = "Prospective customers";
const MIN_SEGMENT_CHARS: usize = 3;

pub struct RecoveryGenerator {
    min_insights: usize,
    min_insight_length: usize,
}

impl RecoveryGenerator {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            min_insights: config.min_insights,
            min_insight_length: config.min_insight_length,
        }
    }

    /// Minimum viable value for `stage`, or `None` when recovery is not
    /// possible (unsupported stage, or no segment to build from).
    pub fn recover(&self, stage: StageName, context: &Map<String, Value>) -> Option<Value> {
        if stage == StageName::ProjectData {
            return Some(mark(stage, project_data(context)));
        }

        let segment = text_field(context, "segment")?;
        let value = match stage {
            StageName::WebSearch => mark(stage, web_search(segment)),
            StageName::AiAnalysis => {
                let avatar = mark(StageName::Avatar, avatar_template(segment, context));
                let positioning = mark(StageName::Positioning, positioning(segment, context));
                mark(
                    stage,
                    json!({
                        "avatar": avatar,
                        "positioning": positioning,
                        "insights": self.supplemental_insights(context, self.min_insights),
                    }),
                )
            }
            StageName::Avatar => mark(stage, avatar_template(segment, context)),
            StageName::Positioning => mark(stage, positioning(segment, context)),
            // A list of strings has nowhere to carry the marker; the pipeline
            // records recovered insights in metadata instead.
            StageName::Insights => Value::from(self.supplemental_insights(context, self.min_insights)),
            _ => return None,
        };
        Some(value)
    }

    /// Up to `count` distinct insights built from the project parameters.
    pub fn supplemental_insights(&self, context: &Map<String, Value>, count: usize) -> Vec<String> {
        let Some(segment) = text_field(context, "segment") else {
            return Vec::new();
        };
        let product = text_field(context, "product").unwrap_or(DEFAULT_PRODUCT);
        let audience = text_field(context, "audience").unwrap_or(DEFAULT_AUDIENCE);

        let templates = [
            format!("Buyers in the {segment} market compare several providers before committing to a purchase"),
            format!("Trust signals such as reviews and case studies weigh heavily on {segment} purchase decisions"),
            format!("{audience} respond better to concrete outcomes than to feature lists when evaluating {product}"),
            format!("Clear pricing tiers for {product} reduce friction during the first purchase in {segment}"),
            format!("Content that teaches before it sells builds authority quickly in the {segment} space"),
            format!("A guarantee that removes first-purchase risk can lift conversion for {product} noticeably"),
            format!("Referral programmes are an underused acquisition channel across most of the {segment} market"),
            format!("Onboarding in the first week decides whether {audience} stay with {product} long term"),
            format!("Competitors in {segment} rarely publish measurable results, which leaves room for proof-led messaging"),
            format!("Short-form video is the fastest way to reach {audience} who are still researching {segment} options"),
            format!("Bundling {product} with a focused implementation session raises perceived value without discounting"),
            format!("Retargeting warm {segment} leads with testimonials converts better than repeating the original offer"),
            format!("Community features around {product} create switching costs that protect recurring revenue"),
            format!("Seasonal demand peaks in {segment} should set the calendar for launches and promotions"),
            format!("Segmenting {audience} by urgency of need lets campaigns for {product} match message to intent"),
        ];

        templates
            .into_iter()
            .filter(|t| t.chars().count() > self.min_insight_length)
            .take(count)
            .collect()
    }

    /// Fill gaps in an avatar until it reaches full depth: missing
    /// demographic fields, short or missing pain points, and too few desires
    /// or objections. Existing long-form entries are kept in order.
    pub fn enrich_avatar(&self, avatar: &Value, context: &Map<String, Value>) -> Value {
        let segment = text_field(context, "segment").unwrap_or(DEFAULT_SEGMENT);
        let template = avatar_template(segment, context);
        let mut out = avatar.as_object().cloned().unwrap_or_default();

        let mut demographics = out
            .get("demographicProfile")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if let Some(defaults) = template.get("demographicProfile").and_then(Value::as_object) {
            for (k, v) in defaults {
                if demographics.len() >= 4 {
                    break;
                }
                demographics.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        out.insert("demographicProfile".into(), Value::Object(demographics));

        for (key, minimum, min_len) in [
            ("painPoints", 5, 30),
            ("desires", 5, 0),
            ("objections", 3, 0),
        ] {
            let mut items: Vec<Value> = out
                .get(key)
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter(|v| v.as_str().is_some_and(|s| s.chars().count() >= min_len))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            let padding = template
                .get(key)
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for candidate in padding {
                if items.len() >= minimum {
                    break;
                }
                if !items.contains(candidate) {
                    items.push(candidate.clone());
                }
            }
            out.insert(key.into(), Value::Array(items));
        }

        out.insert("enrichmentApplied".into(), Value::Bool(true));
        Value::Object(out)
    }
}

fn mark(stage: StageName, value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            map.insert(FALLBACK_MARKER.into(), Value::Bool(true));
            map.insert(RECOVERED_STAGE_KEY.into(), Value::from(stage.as_str()));
            Value::Object(map)
        }
        other => other,
    }
}

fn project_data(context: &Map<String, Value>) -> Value {
    let text = |key: &str, default: &str| {
        Value::from(text_field(context, key).unwrap_or(default).to_string())
    };
    let segment = text_field(context, "segment")
        .filter(|s| s.chars().count() >= MIN_SEGMENT_CHARS)
        .unwrap_or(DEFAULT_SEGMENT);
    json!({
        "segment": segment,
        "product": text("product", DEFAULT_PRODUCT),
        "audience": text("audience", DEFAULT_AUDIENCE),
        "price": context.get("price").filter(|v| v.is_number()).cloned().unwrap_or(json!(0)),
    })
}

fn web_search(segment: &str) -> Value {
    json!({
        "totalSources": 1,
        "totalContentLength": 0,
        "avgQuality": 0.0,
        "uniqueDomains": 0,
        "sourcesSummary": [{
            "title": format!("Recovered research placeholder for {segment}"),
            "url": "",
            "source": "recovery",
            "qualityScore": 0.0,
            "lowQuality": true,
        }],
        "queriesExecuted": [],
        "searchMode": "recovery",
    })
}

fn avatar_template(segment: &str, context: &Map<String, Value>) -> Value {
    let audience = text_field(context, "audience").unwrap_or(DEFAULT_AUDIENCE);
    let product = text_field(context, "product").unwrap_or(DEFAULT_PRODUCT);
    json!({
        "fictionalName": format!("{segment} buyer"),
        "demographicProfile": {
            "age": "25-45",
            "gender": "mixed",
            "income": "middle to upper-middle income",
            "education": "higher education",
            "location": "urban centres",
            "occupation": audience,
        },
        "painPoints": [
            format!("Struggles to find trustworthy, current information about {segment} offers"),
            format!("Has wasted money on {segment} solutions that did not deliver results"),
            format!("Lacks the time to evaluate every {segment} option in enough depth"),
            format!("Feels unsure whether {product} fits the stage their situation is in"),
            format!("Worries about hidden costs after committing to a {segment} provider"),
        ],
        "desires": [
            format!("Reach visible results with {product} within the first weeks"),
            format!("Be seen as well-informed among peers in {segment}"),
            "Spend less time on trial and error".to_string(),
            "Get direct support when stuck".to_string(),
            "Pay a fair price for a proven method".to_string(),
        ],
        "objections": [
            "Price feels high before results are proven".to_string(),
            "Not sure there is time to apply it now".to_string(),
            format!("Previous {segment} purchases were disappointing"),
        ],
    })
}

fn positioning(segment: &str, context: &Map<String, Value>) -> Value {
    let product = text_field(context, "product").unwrap_or(DEFAULT_PRODUCT);
    json!({
        "marketPositioning": format!("{product} as the practical, results-first choice in {segment}"),
        "uniqueValueProposition": format!("{product} turns {segment} know-how into measurable outcomes quickly"),
        "competitiveDifferentiators": [
            "Outcome-focused delivery",
            "Direct support during implementation",
        ],
        "coreMessage": format!("Results in {segment} without guesswork"),
    })
}
