// src/enhance.rs
//! Intelligence enhancer: sends top candidates to the AI analysis provider
//! and merges the response back onto each event.
//!
//! The provider response is treated as an untrusted semi-structured blob: a
//! small dedicated parser locates marker lines for the two requested sections
//! and falls back to a truncated prefix + generic string when no marker is
//! found. Per-item failures keep the un-enhanced candidate; the batch never
//! aborts.

use crate::error::ProviderError;
use crate::types::MarketEvent;
use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Confidence never exceeds this after enhancement.
pub const CONFIDENCE_CEILING: u8 = 98;

/// Used when the response carries no recognizable implications section.
pub const GENERIC_IMPLICATIONS: &str =
    "Market implications unclear; monitor follow-up coverage for confirmation.";

const RAW_PREFIX_LEN: usize = 200;

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
    fn name(&self) -> &'static str;
}

/// OpenAI Chat Completions provider. Requires an API key; an empty key makes
/// every call fail, which the enhancer degrades through.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("market-pulse/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client");
        Self { http, api_key, model }
    }
}

#[async_trait]
impl AnalysisProvider for OpenAiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Disabled);
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: "You are a market analyst. Answer in two short labeled sections: \
                              ANALYSIS: and IMPLICATIONS:.",
                },
                Msg {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
            max_tokens: 300,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ProviderError::Status(resp.status().as_u16()));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("empty choices".to_string()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Always fails; used when AI is disabled in config. The enhancer passes
/// candidates through untouched.
pub struct DisabledAnalysisProvider;

#[async_trait]
impl AnalysisProvider for DisabledAnalysisProvider {
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Disabled)
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Parsed sections of a free-text provider response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAnalysis {
    pub analysis: String,
    pub implications: String,
    /// False when both sections came from fallback branches.
    pub matched_markers: bool,
}

/// Marker-line parser. Scans for the first line mentioning each section
/// marker; the section text is what follows the colon on that line (or the
/// remainder of the line). No marker at all falls back to a truncated prefix
/// of the raw response for analysis and a fixed generic string for
/// implications.
pub fn parse_sections(raw: &str) -> ParsedAnalysis {
    let mut analysis: Option<String> = None;
    let mut implications: Option<String> = None;

    for line in raw.lines() {
        let lowered = line.to_lowercase();
        if analysis.is_none() && lowered.contains("analysis") {
            if let Some(text) = marker_payload(line) {
                analysis = Some(text);
            }
        } else if implications.is_none()
            && (lowered.contains("implication") || lowered.contains("market impact"))
        {
            if let Some(text) = marker_payload(line) {
                implications = Some(text);
            }
        }
        if analysis.is_some() && implications.is_some() {
            break;
        }
    }

    let matched = analysis.is_some() || implications.is_some();
    ParsedAnalysis {
        analysis: analysis.unwrap_or_else(|| truncated_prefix(raw)),
        implications: implications.unwrap_or_else(|| GENERIC_IMPLICATIONS.to_string()),
        matched_markers: matched,
    }
}

fn marker_payload(line: &str) -> Option<String> {
    let payload = match line.split_once(':') {
        Some((_, rest)) => rest.trim(),
        None => line.trim(),
    };
    if payload.is_empty() {
        None
    } else {
        Some(payload.to_string())
    }
}

fn truncated_prefix(raw: &str) -> String {
    let single_line: String = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    single_line.chars().take(RAW_PREFIX_LEN).collect()
}

pub struct IntelligenceEnhancer {
    provider: Arc<dyn AnalysisProvider>,
    top_n: usize,
    confidence_bump: u8,
}

impl IntelligenceEnhancer {
    pub fn new(provider: Arc<dyn AnalysisProvider>, top_n: usize, confidence_bump: u8) -> Self {
        Self {
            provider,
            // AI calls are the most expensive step; hard cap.
            top_n: top_n.min(5),
            confidence_bump,
        }
    }

    /// Enhance the top candidates in place; the rest pass through untouched.
    /// Output has the same length and order as the input.
    pub async fn enhance(&self, mut events: Vec<MarketEvent>) -> Vec<MarketEvent> {
        let n = self.top_n.min(events.len());
        for ev in events.iter_mut().take(n) {
            let prompt = build_prompt(ev);
            match self.provider.complete(&prompt).await {
                Ok(raw) => {
                    let parsed = parse_sections(&raw);
                    if !parsed.matched_markers {
                        tracing::debug!(
                            target: "enhance",
                            provider = self.provider.name(),
                            title = %ev.title,
                            "no section markers in response; using fallback text"
                        );
                        counter!("enhance_marker_fallback_total").increment(1);
                    }
                    ev.ai_analysis = Some(parsed.analysis);
                    ev.market_implications = Some(parsed.implications);
                    ev.confidence =
                        (ev.confidence.saturating_add(self.confidence_bump)).min(CONFIDENCE_CEILING);
                    counter!("enhance_success_total").increment(1);
                }
                Err(e) => {
                    // Keep the un-enhanced candidate; enhancement failure
                    // must never drop an event or abort the batch.
                    tracing::warn!(
                        target: "enhance",
                        provider = self.provider.name(),
                        title = %ev.title,
                        error = %e,
                        "analysis call failed; passing candidate through"
                    );
                    counter!("enhance_errors_total").increment(1);
                }
            }
        }
        events
    }
}

pub fn build_prompt(ev: &MarketEvent) -> String {
    format!(
        "Headline: {}\nDetails: {}\nCategory: {}\n\n\
         Give two short sections.\n\
         ANALYSIS: what happened and why it moves the market.\n\
         IMPLICATIONS: expected market implications over the next sessions.",
        ev.title,
        ev.description,
        ev.category.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventCategory;
    use chrono::Utc;

    fn event(title: &str, confidence: u8) -> MarketEvent {
        MarketEvent {
            title: title.to_string(),
            description: "desc".to_string(),
            source: "web-search".to_string(),
            url: None,
            discovered_at: Utc::now(),
            freshness: 70,
            category: EventCategory::General,
            confidence,
            ai_analysis: None,
            market_implications: None,
        }
    }

    #[test]
    fn parses_both_labeled_sections() {
        let raw = "ANALYSIS: Rate cut lifts rate-sensitive stocks.\n\
                   IMPLICATIONS: Banks likely to open higher.";
        let p = parse_sections(raw);
        assert!(p.matched_markers);
        assert_eq!(p.analysis, "Rate cut lifts rate-sensitive stocks.");
        assert_eq!(p.implications, "Banks likely to open higher.");
    }

    #[test]
    fn first_marker_line_wins_per_section() {
        let raw = "Analysis: first take.\nanalysis: second take.\n\
                   Market impact: initial view.\nImplications: later view.";
        let p = parse_sections(raw);
        assert_eq!(p.analysis, "first take.");
        // "Market impact" matched first for the implications section.
        assert_eq!(p.implications, "initial view.");
    }

    #[test]
    fn no_markers_falls_back_to_prefix_and_generic_string() {
        let raw = "The central bank unexpectedly held rates steady, citing \
                   sticky core readings across categories.";
        let p = parse_sections(raw);
        assert!(!p.matched_markers);
        assert!(p.analysis.starts_with("The central bank unexpectedly"));
        assert_eq!(p.implications, GENERIC_IMPLICATIONS);
    }

    #[test]
    fn empty_marker_payload_is_not_a_match() {
        let raw = "ANALYSIS:\nsome unlabeled text follows here";
        let p = parse_sections(raw);
        // The empty payload doesn't count; falls through to prefix fallback.
        assert!(!p.matched_markers);
        assert!(p.analysis.contains("ANALYSIS"));
    }

    #[test]
    fn prefix_fallback_is_single_line_and_bounded() {
        let raw = "word\n".repeat(200);
        let p = parse_sections(&raw);
        assert!(!p.analysis.contains('\n'));
        assert!(p.analysis.chars().count() <= 200);
    }

    struct FixedProvider(String);

    #[async_trait]
    impl AnalysisProvider for FixedProvider {
        async fn complete(&self, _p: &str) -> Result<String, ProviderError> {
            Ok(self.0.clone())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl AnalysisProvider for AlwaysFails {
        async fn complete(&self, _p: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Status(503))
        }
        fn name(&self) -> &'static str {
            "fails"
        }
    }

    #[tokio::test]
    async fn enhances_only_top_n_and_bumps_confidence() {
        let provider = Arc::new(FixedProvider(
            "ANALYSIS: a.\nIMPLICATIONS: b.".to_string(),
        ));
        let enhancer = IntelligenceEnhancer::new(provider, 5, 5);
        let events: Vec<MarketEvent> = (0..7).map(|i| event(&format!("e{i}"), 80)).collect();
        let out = enhancer.enhance(events).await;
        assert_eq!(out.len(), 7);
        for ev in out.iter().take(5) {
            assert_eq!(ev.ai_analysis.as_deref(), Some("a."));
            assert_eq!(ev.confidence, 85);
        }
        for ev in out.iter().skip(5) {
            assert!(ev.ai_analysis.is_none());
            assert_eq!(ev.confidence, 80);
        }
    }

    #[tokio::test]
    async fn confidence_bump_caps_at_ceiling() {
        let provider = Arc::new(FixedProvider("ANALYSIS: a.".to_string()));
        let enhancer = IntelligenceEnhancer::new(provider, 5, 5);
        let out = enhancer.enhance(vec![event("near-cap", 96)]).await;
        assert_eq!(out[0].confidence, CONFIDENCE_CEILING);
    }

    #[tokio::test]
    async fn provider_failure_keeps_unenhanced_candidates() {
        let enhancer = IntelligenceEnhancer::new(Arc::new(AlwaysFails), 5, 5);
        let out = enhancer.enhance(vec![event("a", 80), event("b", 75)]).await;
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.ai_analysis.is_none()));
        assert_eq!(out[0].confidence, 80);
        assert_eq!(out[1].confidence, 75);
    }
}
