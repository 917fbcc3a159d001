//! # Translation Route Resolution
//!
//! Finds a working model route for a language pair and runs text through it.
//!
//! ## Resolution Order (first hit wins):
//! 1. **Direct**: a model trained for `source -> target`
//! 2. **Multilingual**: a `source -> mul` model
//! 3. **Reverse**: the `target -> source` model, only when enabled
//! 4. **Bridge**: `source -> pivot -> target`, each leg resolved with 1-3
//!
//! `source == target` short-circuits to an identity route with no model.
//!
//! ## Caching:
//! Resolved routes are memoized for the lifetime of the process. A pair with
//! no route is remembered for `miss_ttl` and answered without touching the
//! hub; once that expires a model published since is picked up.
//!
//! Every model load runs under `load_timeout`. A load that does not finish
//! in time counts as a miss, like one that fails.

use super::language::{LanguagePair, LanguageTag};
use super::TranslationError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A loaded translation model.
///
/// Most models have one fixed direction and ignore `target`; multilingual
/// ones use it to pick their output language.
#[async_trait]
pub trait TranslationModel: Send + Sync {
    fn model_id(&self) -> &str;

    fn supports_target(&self, _target: &LanguageTag) -> bool {
        true
    }

    async fn translate(&self, text: &str, target: &LanguageTag) -> Result<String, TranslationError>;
}

/// Looks up and loads translation models by repository id.
#[async_trait]
pub trait TranslationModelLoader: Send + Sync {
    /// `Ok(None)` means the model does not exist.
    async fn load(&self, model_id: &str) -> Result<Option<Arc<dyn TranslationModel>>, TranslationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteStrategy {
    Identity,
    Direct,
    Multilingual,
    Reverse,
    BridgeViaPivot { pivot: LanguageTag },
}

impl fmt::Display for RouteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteStrategy::Identity => write!(f, "identity"),
            RouteStrategy::Direct => write!(f, "direct"),
            RouteStrategy::Multilingual => write!(f, "multilingual"),
            RouteStrategy::Reverse => write!(f, "reverse"),
            RouteStrategy::BridgeViaPivot { pivot } => write!(f, "bridge via {}", pivot),
        }
    }
}

/// One model call in a route and the language it should produce.
struct RouteLeg {
    model: Arc<dyn TranslationModel>,
    target: LanguageTag,
}

/// A resolved, immutable route. Legs run in order, each feeding the next.
pub struct TranslationRoute {
    pub pair: LanguagePair,
    pub strategy: RouteStrategy,
    legs: Vec<RouteLeg>,
}

impl TranslationRoute {
    pub fn model_ids(&self) -> Vec<String> {
        self.legs.iter().map(|leg| leg.model.model_id().to_string()).collect()
    }
}

impl fmt::Debug for TranslationRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationRoute")
            .field("pair", &self.pair)
            .field("strategy", &self.strategy)
            .field("legs", &self.model_ids())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Repository id template with `{src}` and `{tgt}` placeholders
    pub model_template: String,
    pub multilingual_code: String,
    pub pivot: LanguageTag,
    pub allow_reverse_model: bool,
    pub call_timeout: Duration,
    pub load_timeout: Duration,
    /// Zero disables miss caching
    pub miss_ttl: Duration,
}

impl ResolverSettings {
    fn model_id(&self, source: &str, target: &str) -> String {
        self.model_template.replace("{src}", source).replace("{tgt}", target)
    }
}

/// Resolves and caches translation routes.
pub struct TranslationResolver {
    loader: Arc<dyn TranslationModelLoader>,
    settings: ResolverSettings,
    routes: RwLock<HashMap<LanguagePair, Arc<TranslationRoute>>>,
    /// When each unroutable pair was last found unroutable
    misses: RwLock<HashMap<LanguagePair, Instant>>,
}

impl TranslationResolver {
    pub fn new(loader: Arc<dyn TranslationModelLoader>, settings: ResolverSettings) -> Self {
        Self {
            loader,
            settings,
            routes: RwLock::new(HashMap::new()),
            misses: RwLock::new(HashMap::new()),
        }
    }

    /// Number of memoized routes.
    pub async fn cached_routes(&self) -> usize {
        self.routes.read().await.len()
    }

    pub async fn resolve(&self, pair: &LanguagePair) -> Result<Arc<TranslationRoute>, TranslationError> {
        if let Some(route) = self.routes.read().await.get(pair) {
            debug!(pair = %pair, strategy = %route.strategy, "Route cache hit");
            return Ok(route.clone());
        }

        if self.recent_miss(pair).await {
            debug!(pair = %pair, "Route miss cache hit");
            return Err(TranslationError::NoRouteAvailable(pair.clone()));
        }

        let route = match self.find_route(pair).await {
            Ok(route) => Arc::new(route),
            Err(e) => {
                if matches!(e, TranslationError::NoRouteAvailable(_)) && !self.settings.miss_ttl.is_zero() {
                    self.misses.write().await.insert(pair.clone(), Instant::now());
                }
                return Err(e);
            }
        };
        self.misses.write().await.remove(pair);
        info!(pair = %pair, strategy = %route.strategy, models = ?route.model_ids(), "Resolved translation route");

        // Another request may have resolved the same pair meanwhile; keep the first.
        let mut routes = self.routes.write().await;
        Ok(routes.entry(pair.clone()).or_insert(route).clone())
    }

    async fn recent_miss(&self, pair: &LanguagePair) -> bool {
        let ttl = self.settings.miss_ttl;
        let fresh = match self.misses.read().await.get(pair) {
            Some(at) => at.elapsed() < ttl,
            None => return false,
        };
        if !fresh {
            self.misses.write().await.remove(pair);
        }
        fresh
    }

    pub async fn translate(&self, route: &TranslationRoute, text: &str) -> Result<String, TranslationError> {
        let mut current = text.to_string();

        for leg in &route.legs {
            let model_id = leg.model.model_id().to_string();
            current = tokio::time::timeout(self.settings.call_timeout, leg.model.translate(&current, &leg.target))
                .await
                .map_err(|_| TranslationError::Timeout {
                    model_id: model_id.clone(),
                    timeout: self.settings.call_timeout,
                })??;
            debug!(model = %model_id, output_len = current.len(), "Translation leg complete");
        }

        Ok(current)
    }

    /// Normalize the languages, resolve a route and translate in one go.
    pub async fn translate_text(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<(String, Arc<TranslationRoute>), TranslationError> {
        let pair = LanguagePair::parse(source, target)?;
        let route = self.resolve(&pair).await?;
        let translated = self.translate(&route, text).await?;
        Ok((translated, route))
    }

    async fn find_route(&self, pair: &LanguagePair) -> Result<TranslationRoute, TranslationError> {
        if pair.is_identity() {
            return Ok(TranslationRoute {
                pair: pair.clone(),
                strategy: RouteStrategy::Identity,
                legs: Vec::new(),
            });
        }

        if let Some((strategy, leg)) = self.single_leg(pair).await {
            return Ok(TranslationRoute { pair: pair.clone(), strategy, legs: vec![leg] });
        }

        let pivot = &self.settings.pivot;
        if &pair.source != pivot && &pair.target != pivot {
            debug!(pair = %pair, pivot = %pivot, "Trying bridge route");
            let first = LanguagePair::new(pair.source.clone(), pivot.clone());
            let second = LanguagePair::new(pivot.clone(), pair.target.clone());

            if let Some((_, into_pivot)) = self.single_leg(&first).await {
                if let Some((_, out_of_pivot)) = self.single_leg(&second).await {
                    return Ok(TranslationRoute {
                        pair: pair.clone(),
                        strategy: RouteStrategy::BridgeViaPivot { pivot: pivot.clone() },
                        legs: vec![into_pivot, out_of_pivot],
                    });
                }
            }
        }

        warn!(pair = %pair, "No translation route available");
        Err(TranslationError::NoRouteAvailable(pair.clone()))
    }

    /// Strategies 1-3 for a single direction.
    async fn single_leg(&self, pair: &LanguagePair) -> Option<(RouteStrategy, RouteLeg)> {
        let source = pair.source.as_str();
        let target = pair.target.as_str();

        let mut candidates = vec![
            (RouteStrategy::Direct, self.settings.model_id(source, target)),
            (
                RouteStrategy::Multilingual,
                self.settings.model_id(source, &self.settings.multilingual_code),
            ),
        ];
        if self.settings.allow_reverse_model {
            let reversed = pair.reversed();
            candidates.push((
                RouteStrategy::Reverse,
                self.settings.model_id(reversed.source.as_str(), reversed.target.as_str()),
            ));
        }

        for (strategy, model_id) in candidates {
            let Some(model) = self.try_load(&model_id).await else {
                continue;
            };
            if !model.supports_target(&pair.target) {
                debug!(model = %model_id, target = %pair.target, "Model cannot produce the target language");
                continue;
            }
            return Some((strategy, RouteLeg { model, target: pair.target.clone() }));
        }
        None
    }

    async fn try_load(&self, model_id: &str) -> Option<Arc<dyn TranslationModel>> {
        let timeout = self.settings.load_timeout;
        match tokio::time::timeout(timeout, self.loader.load(model_id)).await {
            Ok(Ok(Some(model))) => Some(model),
            Ok(Ok(None)) => {
                debug!(model = %model_id, "Model not found");
                None
            }
            Ok(Err(e)) => {
                warn!(model = %model_id, error = %e, "Model failed to load, skipping");
                None
            }
            Err(_) => {
                warn!(model = %model_id, timeout_secs = timeout.as_secs_f64(), "Model load timed out, skipping");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Scripted model that tags its input with its own direction.
    struct TaggingModel {
        id: String,
        calls: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl TranslationModel for TaggingModel {
        fn model_id(&self) -> &str {
            &self.id
        }

        fn supports_target(&self, target: &LanguageTag) -> bool {
            !self.id.ends_with("-mul") || target.as_str() != "ja"
        }

        async fn translate(&self, text: &str, target: &LanguageTag) -> Result<String, TranslationError> {
            self.calls.lock().unwrap().push(format!("{}>>{}", self.id, target));
            if self.fail {
                return Err(TranslationError::Inference {
                    model_id: self.id.clone(),
                    message: "scripted failure".to_string(),
                });
            }
            if self.id.ends_with("en-vi") && text == "dog" {
                return Ok("con chó".to_string());
            }
            Ok(format!("{}[{}]", text, self.id))
        }
    }

    #[derive(Default)]
    struct ScriptedLoader {
        available: HashSet<String>,
        broken: HashSet<String>,
        failing: HashSet<String>,
        hanging: HashSet<String>,
        lookups: Arc<Mutex<Vec<String>>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedLoader {
        fn with(models: &[&str]) -> Self {
            Self {
                available: models.iter().map(|m| format!("Helsinki-NLP/opus-mt-{}", m)).collect(),
                ..Default::default()
            }
        }

        fn lookups(&self) -> Vec<String> {
            self.lookups.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TranslationModelLoader for ScriptedLoader {
        async fn load(&self, model_id: &str) -> Result<Option<Arc<dyn TranslationModel>>, TranslationError> {
            self.lookups.lock().unwrap().push(model_id.to_string());
            if self.hanging.contains(model_id) {
                std::future::pending::<()>().await;
            }
            if self.broken.contains(model_id) {
                return Err(TranslationError::ModelLoad {
                    model_id: model_id.to_string(),
                    message: "corrupt weights".to_string(),
                });
            }
            if !self.available.contains(model_id) {
                return Ok(None);
            }
            Ok(Some(Arc::new(TaggingModel {
                id: model_id.to_string(),
                calls: self.calls.clone(),
                fail: self.failing.contains(model_id),
            })))
        }
    }

    fn settings(allow_reverse_model: bool) -> ResolverSettings {
        ResolverSettings {
            model_template: "Helsinki-NLP/opus-mt-{src}-{tgt}".to_string(),
            multilingual_code: "mul".to_string(),
            pivot: LanguageTag::parse("en").unwrap(),
            allow_reverse_model,
            call_timeout: Duration::from_secs(5),
            load_timeout: Duration::from_secs(5),
            miss_ttl: Duration::from_secs(60),
        }
    }

    fn pair(source: &str, target: &str) -> LanguagePair {
        LanguagePair::parse(source, target).unwrap()
    }

    #[tokio::test]
    async fn identity_never_touches_models() {
        let loader = Arc::new(ScriptedLoader::default());
        let resolver = TranslationResolver::new(loader.clone(), settings(false));

        let (text, route) = resolver.translate_text("hello", "English", "en").await.unwrap();

        assert_eq!(text, "hello");
        assert_eq!(route.strategy, RouteStrategy::Identity);
        assert!(loader.lookups().is_empty());
        assert!(loader.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn direct_model_short_circuits() {
        let loader = Arc::new(ScriptedLoader::with(&["en-vi", "en-mul"]));
        let resolver = TranslationResolver::new(loader.clone(), settings(false));

        let route = resolver.resolve(&pair("en", "vi")).await.unwrap();

        assert_eq!(route.strategy, RouteStrategy::Direct);
        assert_eq!(loader.lookups(), vec!["Helsinki-NLP/opus-mt-en-vi"]);
    }

    #[tokio::test]
    async fn dog_english_to_vietnamese() {
        let loader = Arc::new(ScriptedLoader::with(&["en-vi"]));
        let resolver = TranslationResolver::new(loader, settings(false));

        let (text, _) = resolver.translate_text("dog", "English", "Vietnamese").await.unwrap();

        assert!(!text.is_empty());
        assert_ne!(text, "dog");
    }

    #[tokio::test]
    async fn multilingual_is_second_choice() {
        let loader = Arc::new(ScriptedLoader::with(&["fr-mul"]));
        let resolver = TranslationResolver::new(loader.clone(), settings(false));

        let route = resolver.resolve(&pair("fr", "en")).await.unwrap();

        assert_eq!(route.strategy, RouteStrategy::Multilingual);
        assert_eq!(
            loader.lookups(),
            vec!["Helsinki-NLP/opus-mt-fr-en", "Helsinki-NLP/opus-mt-fr-mul"]
        );
    }

    #[tokio::test]
    async fn multilingual_model_is_told_the_target() {
        let loader = Arc::new(ScriptedLoader::with(&["fr-mul"]));
        let resolver = TranslationResolver::new(loader.clone(), settings(false));

        let (_, route) = resolver.translate_text("chien", "fr", "vi").await.unwrap();
        assert_eq!(route.strategy, RouteStrategy::Multilingual);
        assert_eq!(loader.calls.lock().unwrap().as_slice(), ["Helsinki-NLP/opus-mt-fr-mul>>vi"]);
    }

    #[tokio::test]
    async fn multilingual_model_without_the_target_is_a_miss() {
        let loader = Arc::new(ScriptedLoader::with(&["fr-mul"]));
        let resolver = TranslationResolver::new(loader, settings(false));

        let err = resolver.resolve(&pair("fr", "ja")).await.unwrap_err();
        assert!(matches!(err, TranslationError::NoRouteAvailable(_)));
    }

    #[tokio::test]
    async fn reverse_is_skipped_unless_enabled() {
        let loader = Arc::new(ScriptedLoader::with(&["vi-en"]));
        let resolver = TranslationResolver::new(loader.clone(), settings(false));
        let err = resolver.resolve(&pair("en", "vi")).await.unwrap_err();
        assert!(matches!(err, TranslationError::NoRouteAvailable(_)));
        assert!(!loader.lookups().contains(&"Helsinki-NLP/opus-mt-vi-en".to_string()));

        let loader = Arc::new(ScriptedLoader::with(&["vi-en"]));
        let resolver = TranslationResolver::new(loader, settings(true));
        let route = resolver.resolve(&pair("en", "vi")).await.unwrap();
        assert_eq!(route.strategy, RouteStrategy::Reverse);
    }

    #[tokio::test]
    async fn bridge_chains_exactly_two_calls() {
        let loader = Arc::new(ScriptedLoader::with(&["fr-en", "en-vi"]));
        let resolver = TranslationResolver::new(loader.clone(), settings(false));

        let route = resolver.resolve(&pair("fr", "vi")).await.unwrap();
        assert_eq!(
            route.strategy,
            RouteStrategy::BridgeViaPivot { pivot: LanguageTag::parse("en").unwrap() }
        );

        let text = resolver.translate(&route, "chien").await.unwrap();
        assert_eq!(
            loader.calls.lock().unwrap().as_slice(),
            ["Helsinki-NLP/opus-mt-fr-en>>en", "Helsinki-NLP/opus-mt-en-vi>>vi"]
        );
        assert_eq!(text, "chien[Helsinki-NLP/opus-mt-fr-en][Helsinki-NLP/opus-mt-en-vi]");
    }

    #[tokio::test]
    async fn bridge_leg_failure_fails_translation() {
        let mut loader = ScriptedLoader::with(&["fr-en", "en-vi"]);
        loader.failing.insert("Helsinki-NLP/opus-mt-en-vi".to_string());
        let resolver = TranslationResolver::new(Arc::new(loader), settings(false));

        let route = resolver.resolve(&pair("fr", "vi")).await.unwrap();
        let err = resolver.translate(&route, "chien").await.unwrap_err();
        assert!(matches!(err, TranslationError::Inference { .. }));
    }

    #[tokio::test]
    async fn no_bridge_when_pivot_is_an_endpoint() {
        let loader = Arc::new(ScriptedLoader::with(&["fr-en"]));
        let resolver = TranslationResolver::new(loader, settings(false));

        let err = resolver.resolve(&pair("en", "xx")).await.unwrap_err();
        assert!(matches!(err, TranslationError::NoRouteAvailable(_)));
    }

    #[tokio::test]
    async fn broken_model_is_treated_as_miss() {
        let mut loader = ScriptedLoader::with(&["de-vi", "de-mul"]);
        loader.broken.insert("Helsinki-NLP/opus-mt-de-vi".to_string());
        let resolver = TranslationResolver::new(Arc::new(loader), settings(false));

        let route = resolver.resolve(&pair("de", "vi")).await.unwrap();
        assert_eq!(route.strategy, RouteStrategy::Multilingual);
    }

    #[tokio::test]
    async fn stalled_load_is_treated_as_miss() {
        let mut loader = ScriptedLoader::with(&["de-vi", "de-mul"]);
        loader.hanging.insert("Helsinki-NLP/opus-mt-de-vi".to_string());
        let mut settings = settings(false);
        settings.load_timeout = Duration::from_millis(50);
        let resolver = TranslationResolver::new(Arc::new(loader), settings);

        let route = tokio::time::timeout(Duration::from_secs(5), resolver.resolve(&pair("de", "vi")))
            .await
            .expect("resolution must not hang")
            .unwrap();
        assert_eq!(route.strategy, RouteStrategy::Multilingual);
    }

    #[tokio::test]
    async fn unroutable_pairs_are_remembered() {
        let loader = Arc::new(ScriptedLoader::default());
        let resolver = TranslationResolver::new(loader.clone(), settings(false));

        let err = resolver.resolve(&pair("xx", "vi")).await.unwrap_err();
        assert!(matches!(err, TranslationError::NoRouteAvailable(_)));
        let first_lookups = loader.lookups().len();
        assert!(first_lookups > 0);

        let err = resolver.resolve(&pair("xx", "vi")).await.unwrap_err();
        assert!(matches!(err, TranslationError::NoRouteAvailable(_)));
        assert_eq!(loader.lookups().len(), first_lookups);
        assert_eq!(resolver.cached_routes().await, 0);
    }

    #[tokio::test]
    async fn expired_miss_is_retried() {
        let loader = Arc::new(ScriptedLoader::default());
        let mut settings = settings(false);
        settings.miss_ttl = Duration::ZERO;
        let resolver = TranslationResolver::new(loader.clone(), settings);

        resolver.resolve(&pair("xx", "vi")).await.unwrap_err();
        let first_lookups = loader.lookups().len();
        resolver.resolve(&pair("xx", "vi")).await.unwrap_err();
        assert_eq!(loader.lookups().len(), first_lookups * 2);
    }

    #[tokio::test]
    async fn routes_are_memoized() {
        let loader = Arc::new(ScriptedLoader::with(&["en-vi"]));
        let resolver = TranslationResolver::new(loader.clone(), settings(false));

        let first = resolver.resolve(&pair("en", "vi")).await.unwrap();
        let second = resolver.resolve(&pair("English", "Vietnamese")).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.lookups().len(), 1);
        assert_eq!(resolver.cached_routes().await, 1);
    }

    #[tokio::test]
    async fn invalid_language_is_rejected_before_lookup() {
        let loader = Arc::new(ScriptedLoader::default());
        let resolver = TranslationResolver::new(loader.clone(), settings(false));

        let err = resolver.translate_text("dog", "Klingonese", "vi").await.unwrap_err();
        assert!(matches!(err, TranslationError::InvalidLanguage(_)));
        assert!(loader.lookups().is_empty());
    }
}
