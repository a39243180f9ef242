//! Resolves matchers and mailets by name.
//!
//! Units are registered as factories under a fully qualified name. A lookup
//! tries `<namespace><name>` for each configured namespace in order, so with
//! the default single empty namespace the plain name is used.

use std::sync::Arc;

use ahash::AHashMap;
use postroom_common::internal;

use crate::{
    config::LoaderConfig,
    context::ProcessingContext,
    error::{LoadError, UnitKind},
    mailet::{Mailet, MailetConfig, builtin as mailets},
    matcher::{Matcher, MatcherConfig, builtin as matchers},
};

type MatcherFactory = Arc<dyn Fn() -> Box<dyn Matcher> + Send + Sync>;
type MailetFactory = Arc<dyn Fn() -> Box<dyn Mailet> + Send + Sync>;

pub struct Loader {
    config: LoaderConfig,
    context: Arc<ProcessingContext>,
    matchers: AHashMap<String, MatcherFactory>,
    mailets: AHashMap<String, MailetFactory>,
}

impl Loader {
    /// A loader with nothing registered.
    pub fn new(config: LoaderConfig, context: Arc<ProcessingContext>) -> Self {
        Self {
            config,
            context,
            matchers: AHashMap::new(),
            mailets: AHashMap::new(),
        }
    }

    /// A loader with the built-in units registered under their plain names.
    pub fn with_builtins(config: LoaderConfig, context: Arc<ProcessingContext>) -> Self {
        let mut loader = Self::new(config, context);

        loader.register_matcher("All", || Box::new(matchers::All));
        loader.register_matcher("RecipientIs", || Box::<matchers::RecipientIs>::default());
        loader.register_matcher("SenderIs", || Box::<matchers::SenderIs>::default());
        loader.register_matcher("HostIs", || Box::<matchers::HostIs>::default());
        loader.register_matcher("HasAttribute", || Box::<matchers::HasAttribute>::default());
        loader.register_matcher("HasHeader", || Box::<matchers::HasHeader>::default());

        loader.register_mailet("Null", || Box::new(mailets::Null));
        loader.register_mailet("ToProcessor", || Box::<mailets::ToProcessor>::default());
        loader.register_mailet("SetAttribute", || Box::<mailets::SetAttribute>::default());
        loader.register_mailet("AddHeader", || Box::<mailets::AddHeader>::default());
        loader.register_mailet("Bounce", || Box::<mailets::Bounce>::default());
        loader.register_mailet("LogMessage", || Box::<mailets::LogMessage>::default());

        loader
    }

    pub fn register_matcher(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn Matcher> + Send + Sync + 'static,
    ) {
        self.matchers.insert(name.into(), Arc::new(factory));
    }

    pub fn register_mailet(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn Mailet> + Send + Sync + 'static,
    ) {
        self.mailets.insert(name.into(), Arc::new(factory));
    }

    pub const fn context(&self) -> &Arc<ProcessingContext> {
        &self.context
    }

    /// Instantiates and initialises a matcher from `Name` or
    /// `Name=condition`.
    ///
    /// # Errors
    ///
    /// [`LoadError::NotFound`] when no namespace has the name,
    /// [`LoadError::Init`] when the matcher rejects its configuration.
    pub fn load_matcher(&self, spec: &str) -> Result<Box<dyn Matcher>, LoadError> {
        let (name, condition) = match spec.split_once('=') {
            Some((name, condition)) => (name.trim(), Some(condition.trim().to_string())),
            None => (spec.trim(), None),
        };

        let factory = Self::resolve(&self.matchers, &self.config.matcher_namespaces, name)
            .ok_or_else(|| LoadError::NotFound {
                kind: UnitKind::Matcher,
                name: name.to_string(),
                namespaces: self.config.matcher_namespaces.clone(),
            })?;

        let mut matcher = factory();
        matcher
            .init(&MatcherConfig {
                name: name.to_string(),
                condition,
                context: Arc::clone(&self.context),
            })
            .map_err(|err| LoadError::Init {
                kind: UnitKind::Matcher,
                name: name.to_string(),
                source: Box::new(err),
            })?;

        internal!(matcher = %matcher.info(), "Loaded matcher");
        Ok(matcher)
    }

    /// Instantiates and initialises a mailet.
    ///
    /// # Errors
    ///
    /// [`LoadError::NotFound`] when no namespace has the name,
    /// [`LoadError::Init`] when the mailet rejects its configuration.
    pub fn load_mailet(
        &self,
        name: &str,
        params: &AHashMap<String, String>,
    ) -> Result<Box<dyn Mailet>, LoadError> {
        let name = name.trim();
        let factory = Self::resolve(&self.mailets, &self.config.mailet_namespaces, name)
            .ok_or_else(|| LoadError::NotFound {
                kind: UnitKind::Mailet,
                name: name.to_string(),
                namespaces: self.config.mailet_namespaces.clone(),
            })?;

        let mut mailet = factory();
        mailet
            .init(&MailetConfig {
                name: name.to_string(),
                params: params.clone(),
                context: Arc::clone(&self.context),
            })
            .map_err(|err| LoadError::Init {
                kind: UnitKind::Mailet,
                name: name.to_string(),
                source: Box::new(err),
            })?;

        internal!(mailet = %mailet.info(), "Loaded mailet");
        Ok(mailet)
    }

    fn resolve<'a, F>(
        registry: &'a AHashMap<String, F>,
        namespaces: &[String],
        name: &str,
    ) -> Option<&'a F> {
        namespaces
            .iter()
            .find_map(|namespace| registry.get(&format!("{namespace}{name}")))
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut matchers: Vec<_> = self.matchers.keys().collect();
        let mut mailets: Vec<_> = self.mailets.keys().collect();
        matchers.sort();
        mailets.sort();

        f.debug_struct("Loader")
            .field("config", &self.config)
            .field("matchers", &matchers)
            .field("mailets", &mailets)
            .finish_non_exhaustive()
    }
}
