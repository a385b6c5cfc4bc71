//! Known OpenAI-compatible endpoints and how a model name picks one.

use std::collections::HashMap;

pub use toolwire_core::config::ProviderConfig;

/// How a provider takes part in model matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    /// Serves its own models; matched by keyword.
    Direct,
    /// Routes to many vendors; used when nothing direct matches.
    Gateway,
    /// Self-hosted; used only when the config points at it.
    Local,
}

#[derive(Clone, Debug)]
pub struct ProviderSpec {
    /// Key in the `providers` config section.
    pub name: &'static str,
    pub display_name: &'static str,
    pub kind: ProviderKind,
    /// Lowercase substrings that select this provider from a model name.
    pub keywords: &'static [&'static str],
    pub default_api_base: Option<&'static str>,
    /// Send `llama-3.3-70b` for `groq/llama-3.3-70b`.
    pub strip_model_prefix: bool,
}

const fn spec(
    name: &'static str,
    display_name: &'static str,
    kind: ProviderKind,
    keywords: &'static [&'static str],
    default_api_base: Option<&'static str>,
    strip_model_prefix: bool,
) -> ProviderSpec {
    ProviderSpec {
        name,
        display_name,
        kind,
        keywords,
        default_api_base,
        strip_model_prefix,
    }
}

/// Matching priority is table order.
pub static PROVIDERS: &[ProviderSpec] = &[
    spec(
        "openrouter",
        "OpenRouter",
        ProviderKind::Gateway,
        &["openrouter"],
        Some("https://openrouter.ai/api/v1"),
        false,
    ),
    spec(
        "anthropic",
        "Anthropic",
        ProviderKind::Direct,
        &["anthropic", "claude"],
        Some("https://api.anthropic.com/v1"),
        true,
    ),
    spec("openai", "OpenAI", ProviderKind::Direct, &["openai", "gpt"], None, true),
    spec(
        "deepseek",
        "DeepSeek",
        ProviderKind::Direct,
        &["deepseek"],
        Some("https://api.deepseek.com/v1"),
        true,
    ),
    spec(
        "groq",
        "Groq",
        ProviderKind::Direct,
        &["groq"],
        Some("https://api.groq.com/openai/v1"),
        true,
    ),
    // Needs `apiBase` in config.
    spec("vllm", "vLLM", ProviderKind::Local, &["vllm"], None, false),
];

// ─────────────────────────────────────────────
// Matching
// ─────────────────────────────────────────────

/// First direct provider whose keyword appears in `model`.
pub fn find_by_model(model: &str) -> Option<&'static ProviderSpec> {
    let model = model.to_lowercase();
    PROVIDERS.iter().find(|spec| {
        spec.kind == ProviderKind::Direct && spec.keywords.iter().any(|kw| model.contains(kw))
    })
}

pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|spec| spec.name == name)
}

/// The model name the API expects.
pub fn resolve_model_name(model: &str, spec: &ProviderSpec) -> String {
    match model.rsplit_once('/') {
        Some((_, bare)) if spec.strip_model_prefix => bare.to_string(),
        _ => model.to_string(),
    }
}

/// Pick the provider for `model` among the configured ones.
///
/// A keyword match wins when that provider has a key. Otherwise a local
/// server with an explicit `apiBase`, then the first configured gateway.
pub fn match_provider<'a>(
    model: &str,
    providers: &'a HashMap<String, ProviderConfig>,
) -> Option<(&'a ProviderConfig, &'static ProviderSpec)> {
    let configured = move |spec: &'static ProviderSpec| {
        providers
            .get(spec.name)
            .filter(|c| c.is_configured())
            .map(|c| (c, spec))
    };

    if let Some(found) = find_by_model(model).and_then(configured) {
        return Some(found);
    }

    let of_kind = |kind: ProviderKind| PROVIDERS.iter().filter(move |s| s.kind == kind);
    of_kind(ProviderKind::Local)
        .filter_map(configured)
        .find(|(c, _)| c.api_base.is_some())
        .or_else(|| of_kind(ProviderKind::Gateway).find_map(configured))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(key: &str) -> ProviderConfig {
        ProviderConfig {
            api_key: key.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_find_by_model_claude() {
        let spec = find_by_model("claude-sonnet-4-20250514").unwrap();
        assert_eq!(spec.name, "anthropic");
    }

    #[test]
    fn test_find_by_model_gpt() {
        let spec = find_by_model("gpt-4o-mini").unwrap();
        assert_eq!(spec.name, "openai");
    }

    #[test]
    fn test_find_by_model_groq() {
        let spec = find_by_model("groq/llama-3.3-70b").unwrap();
        assert_eq!(spec.name, "groq");
    }

    #[test]
    fn test_find_by_model_skips_gateway() {
        // "openrouter" is a gateway: the embedded vendor wins
        let spec = find_by_model("openrouter/anthropic/claude-3");
        assert_eq!(spec.unwrap().name, "anthropic");
    }

    #[test]
    fn test_find_by_model_unknown() {
        assert!(find_by_model("some-random-model-xyz").is_none());
    }

    #[test]
    fn test_find_by_name() {
        let spec = find_by_name("deepseek").unwrap();
        assert_eq!(spec.display_name, "DeepSeek");
        assert_eq!(spec.kind, ProviderKind::Direct);
    }

    // ── resolve_model_name ──

    #[test]
    fn test_resolve_model_strips_routing_prefix() {
        let spec = find_by_name("groq").unwrap();
        assert_eq!(resolve_model_name("groq/llama-3.3-70b", spec), "llama-3.3-70b");
        assert_eq!(resolve_model_name("llama-3.3-70b", spec), "llama-3.3-70b");
    }

    #[test]
    fn test_resolve_model_gateway_keeps_vendor() {
        let spec = find_by_name("openrouter").unwrap();
        assert_eq!(
            resolve_model_name("anthropic/claude-sonnet-4", spec),
            "anthropic/claude-sonnet-4"
        );
    }

    // ── match_provider ──

    #[test]
    fn test_match_provider_direct() {
        let mut providers = HashMap::new();
        providers.insert("anthropic".to_string(), configured("sk-ant-123"));

        let (config, spec) = match_provider("claude-sonnet-4-20250514", &providers).unwrap();
        assert_eq!(spec.name, "anthropic");
        assert_eq!(config.api_key, "sk-ant-123");
    }

    #[test]
    fn test_match_provider_gateway_fallback() {
        let mut providers = HashMap::new();
        providers.insert("openrouter".to_string(), configured("sk-or-fallback"));

        let (config, spec) = match_provider("some-unknown-model", &providers).unwrap();
        assert_eq!(spec.name, "openrouter");
        assert_eq!(config.api_key, "sk-or-fallback");
    }

    #[test]
    fn test_match_provider_local_needs_base() {
        let mut providers = HashMap::new();
        providers.insert("vllm".to_string(), configured("token"));
        assert!(match_provider("qwen2.5-7b", &providers).is_none());

        providers.insert(
            "vllm".to_string(),
            ProviderConfig {
                api_base: Some("http://localhost:8000/v1".into()),
                ..configured("token")
            },
        );
        let (_, spec) = match_provider("qwen2.5-7b", &providers).unwrap();
        assert_eq!(spec.name, "vllm");
    }

    #[test]
    fn test_match_provider_no_key() {
        let mut providers = HashMap::new();
        providers.insert("anthropic".to_string(), configured(""));
        assert!(match_provider("claude-3", &providers).is_none());
    }

    #[test]
    fn test_specs_cover_config_sections() {
        let names: Vec<&str> = PROVIDERS.iter().map(|s| s.name).collect();
        let sections = toolwire_core::config::Config::default().providers.to_map();
        assert_eq!(names.len(), sections.len());
        for name in names {
            assert!(sections.contains_key(name), "no config section for {name}");
        }
    }
}
