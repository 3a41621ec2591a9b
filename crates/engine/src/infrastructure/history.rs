//! Historical context artifacts.
//!
//! One JSON file per route, named by numeric route id, mapping breakpoint
//! `order_index` to a curated historical text. Missing files or missing
//! breakpoints fall back to a synthesized stub derived from the POI, so the
//! story pipeline always has something to ground a chapter in.

use std::collections::HashMap;
use std::path::PathBuf;

use trailweaver_domain::{Breakpoint, RouteId};

/// Context handed to a chapter prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalContext {
    pub text: String,
    /// True when no curated artifact covered this breakpoint.
    pub synthesized: bool,
}

/// Loads per-route artifacts from a directory on disk. Pure given its
/// inputs: the only I/O is the artifact read itself.
pub struct HistoricalContextProvider {
    dir: PathBuf,
}

impl HistoricalContextProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load the artifact for a route: `{order_index -> historical text}`.
    ///
    /// A missing or unreadable artifact yields an empty map; every
    /// breakpoint will then synthesize.
    pub async fn load_for_route(&self, route_id: RouteId) -> HashMap<u32, String> {
        let path = self.dir.join(format!("{route_id}.json"));
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                tracing::warn!(route_id = %route_id, path = %path.display(), error = %e,
                    "Failed to read historical artifact");
                return HashMap::new();
            }
        };

        let parsed: HashMap<String, String> = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(route_id = %route_id, error = %e,
                    "Malformed historical artifact, ignoring");
                return HashMap::new();
            }
        };

        parsed
            .into_iter()
            .filter_map(|(key, text)| match key.parse::<u32>() {
                Ok(order_index) => Some((order_index, text)),
                Err(_) => {
                    tracing::warn!(route_id = %route_id, key = %key,
                        "Non-numeric breakpoint key in historical artifact");
                    None
                }
            })
            .collect()
    }

    /// Resolve the context for one breakpoint from a loaded artifact,
    /// synthesizing a stub on miss.
    pub fn context_for(
        contexts: &HashMap<u32, String>,
        breakpoint: &Breakpoint,
    ) -> HistoricalContext {
        if let Some(text) = contexts.get(&breakpoint.order_index) {
            if !text.trim().is_empty() {
                return HistoricalContext {
                    text: text.clone(),
                    synthesized: false,
                };
            }
        }

        HistoricalContext {
            text: synthesize_stub(
                breakpoint.poi_name.as_deref(),
                breakpoint.poi_type.as_deref(),
            ),
            synthesized: true,
        }
    }
}

/// Deterministic stub keyed on POI name and type.
fn synthesize_stub(poi_name: Option<&str>, poi_type: Option<&str>) -> String {
    let name = poi_name.filter(|n| !n.trim().is_empty()).unwrap_or("this spot");
    let kind = poi_type
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.trim().to_lowercase());

    match kind {
        Some(kind) => format!(
            "No written chronicle survives for {name}. Like many a {kind} along these paths, \
             it earned its place through daily use: travelers rested here, locals traded news, \
             and the seasons slowly wore their marks into it. Whatever stories it holds were \
             passed from walker to walker rather than set down in any archive."
        ),
        None => format!(
            "No written chronicle survives for {name}. The trail has passed it for longer than \
             anyone can say, and what is known of it was passed from walker to walker rather \
             than set down in any archive."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trailweaver_domain::BreakpointId;

    fn breakpoint(order_index: u32, name: Option<&str>, kind: Option<&str>) -> Breakpoint {
        Breakpoint {
            id: BreakpointId::new(order_index as i64 + 1),
            route_id: RouteId::new(1),
            order_index,
            poi_name: name.map(String::from),
            poi_type: kind.map(String::from),
            coordinates: None,
            main_quest_snippet: None,
            mini_quests: Vec::new(),
        }
    }

    #[tokio::test]
    async fn loads_artifact_for_route() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = r#"{"0": "The old gate guarded the pass.", "2": "The bridge was rebuilt in 1911."}"#;
        tokio::fs::write(dir.path().join("7.json"), artifact)
            .await
            .expect("write artifact");

        let provider = HistoricalContextProvider::new(dir.path());
        let contexts = provider.load_for_route(RouteId::new(7)).await;

        assert_eq!(contexts.len(), 2);
        assert_eq!(
            contexts.get(&0).map(String::as_str),
            Some("The old gate guarded the pass.")
        );
    }

    #[tokio::test]
    async fn missing_artifact_yields_empty_map() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = HistoricalContextProvider::new(dir.path());

        let contexts = provider.load_for_route(RouteId::new(99)).await;

        assert!(contexts.is_empty());
    }

    #[tokio::test]
    async fn malformed_artifact_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("3.json"), "not json at all")
            .await
            .expect("write artifact");

        let provider = HistoricalContextProvider::new(dir.path());
        assert!(provider.load_for_route(RouteId::new(3)).await.is_empty());
    }

    #[test]
    fn hit_returns_curated_text() {
        let mut contexts = HashMap::new();
        contexts.insert(1, "A statue of the town founder.".to_string());

        let ctx = HistoricalContextProvider::context_for(&contexts, &breakpoint(1, None, None));

        assert!(!ctx.synthesized);
        assert_eq!(ctx.text, "A statue of the town founder.");
    }

    #[test]
    fn miss_synthesizes_from_poi() {
        let contexts = HashMap::new();
        let ctx = HistoricalContextProvider::context_for(
            &contexts,
            &breakpoint(1, Some("Old Mill"), Some("Mill")),
        );

        assert!(ctx.synthesized);
        assert!(ctx.text.contains("Old Mill"));
        assert!(ctx.text.contains("mill"));
    }

    #[test]
    fn miss_without_poi_still_yields_text() {
        let contexts = HashMap::new();
        let ctx = HistoricalContextProvider::context_for(&contexts, &breakpoint(0, None, None));

        assert!(ctx.synthesized);
        assert!(!ctx.text.is_empty());
    }

    #[test]
    fn stub_is_deterministic() {
        let a = synthesize_stub(Some("Gate"), Some("gate"));
        let b = synthesize_stub(Some("Gate"), Some("gate"));
        assert_eq!(a, b);
    }
}
