//! The converter catalog: which `(source, target)` pairs exist and how to
//! build the converter for each.
//!
//! The host's composition root supplies an explicit list of
//! [`ConverterDescriptor`]s (format pair + factory closure). There is no type
//! scanning and no global registry: each [`ConverterRegistry`] is an ordinary
//! value, built once through [`RegistryBuilder`] and read-only afterwards, so
//! tests can create as many independent catalogs as they like.

use crate::config::DuplicatePolicy;
use crate::converter::{short_type_name, Converter};
use crate::error::{BoxError, RegistrationError};
use crate::format::{FormatPair, FormatTag, Side};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds a converter instance. Called at most once per successful
/// construction by [`crate::ConverterCache`].
pub type ConverterFactory =
    Arc<dyn Fn() -> Result<Arc<dyn Converter>, BoxError> + Send + Sync + 'static>;

/// Host-supplied registration: a format pair plus a factory.
///
/// The formats are validated by [`RegistryBuilder::register`], not here, so a
/// bad descriptor surfaces as a [`RegistrationError`] rather than a panic.
#[derive(Clone)]
pub struct ConverterDescriptor {
    source: String,
    target: String,
    name: String,
    factory: ConverterFactory,
}

impl ConverterDescriptor {
    /// Describe a converter whose construction cannot fail.
    pub fn new<C, F>(source: impl Into<String>, target: impl Into<String>, factory: F) -> Self
    where
        C: Converter + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            source: source.into(),
            target: target.into(),
            name: short_type_name::<C>().to_string(),
            factory: Arc::new(move || Ok(Arc::new(factory()) as Arc<dyn Converter>)),
        }
    }

    /// Describe a converter whose construction may fail, e.g. because a native
    /// library is missing.
    pub fn fallible<C, E, F>(
        source: impl Into<String>,
        target: impl Into<String>,
        factory: F,
    ) -> Self
    where
        C: Converter + 'static,
        E: Into<BoxError>,
        F: Fn() -> Result<C, E> + Send + Sync + 'static,
    {
        Self {
            source: source.into(),
            target: target.into(),
            name: short_type_name::<C>().to_string(),
            factory: Arc::new(move || {
                factory()
                    .map(|c| Arc::new(c) as Arc<dyn Converter>)
                    .map_err(Into::into)
            }),
        }
    }

    /// Override the converter name used in logs and errors.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Debug for ConverterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterDescriptor")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A validated catalog entry.
#[derive(Clone)]
pub struct RegisteredConverter {
    pair: FormatPair,
    name: String,
    factory: ConverterFactory,
}

impl RegisteredConverter {
    pub fn pair(&self) -> &FormatPair {
        &self.pair
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The factory closure. The cache is the only production caller.
    pub(crate) fn factory(&self) -> ConverterFactory {
        Arc::clone(&self.factory)
    }
}

impl fmt::Debug for RegisteredConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredConverter")
            .field("pair", &self.pair)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Startup-phase builder for a [`ConverterRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<FormatPair, RegisteredConverter>,
    duplicate_policy: DuplicatePolicy,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Validate and add one descriptor.
    ///
    /// # Errors
    /// - [`RegistrationError::InvalidFormat`] for an empty or malformed tag
    /// - [`RegistrationError::Duplicate`] when the pair exists and the policy
    ///   is [`DuplicatePolicy::Reject`]
    pub fn register(
        &mut self,
        descriptor: ConverterDescriptor,
    ) -> Result<&mut Self, RegistrationError> {
        let ConverterDescriptor {
            source,
            target,
            name,
            factory,
        } = descriptor;

        let parse = |side: Side, input: &str| {
            FormatTag::parse(input).map_err(|reason| RegistrationError::InvalidFormat {
                converter: name.clone(),
                side,
                input: input.to_string(),
                reason,
            })
        };
        let pair = FormatPair::new(parse(Side::Source, &source)?, parse(Side::Target, &target)?);

        if let Some(existing) = self.entries.get(&pair) {
            match self.duplicate_policy {
                DuplicatePolicy::Reject => {
                    return Err(RegistrationError::Duplicate {
                        converter: name,
                        pair,
                        existing: existing.name.clone(),
                    });
                }
                DuplicatePolicy::Replace => {
                    warn!("{} replaces {} for {}", name, existing.name, pair);
                }
            }
        }

        debug!("Registered {} for {}", name, pair);
        self.entries.insert(
            pair.clone(),
            RegisteredConverter {
                pair,
                name,
                factory,
            },
        );
        Ok(self)
    }

    /// Freeze the catalog.
    pub fn build(self) -> ConverterRegistry {
        ConverterRegistry {
            entries: self.entries,
        }
    }
}

/// Read-only catalog of registered converters.
#[derive(Debug, Clone, Default)]
pub struct ConverterRegistry {
    entries: BTreeMap<FormatPair, RegisteredConverter>,
}

impl ConverterRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Register an explicit host-supplied list.
    ///
    /// A bad descriptor is logged and returned in the error list; it does not
    /// stop the remaining descriptors from registering.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ConverterDescriptor>,
        duplicate_policy: DuplicatePolicy,
    ) -> (Self, Vec<RegistrationError>) {
        let mut builder = RegistryBuilder::new().duplicate_policy(duplicate_policy);
        let mut errors = Vec::new();
        for descriptor in descriptors {
            if let Err(e) = builder.register(descriptor) {
                warn!("Skipping converter registration: {}", e);
                errors.push(e);
            }
        }
        (builder.build(), errors)
    }

    /// Case-insensitive lookup. `None` is a lookup miss, not an error; an
    /// unparsable tag is also a miss.
    pub fn lookup(&self, source: &str, target: &str) -> Option<&RegisteredConverter> {
        let pair = FormatPair::parse(source, target).ok()?;
        self.entries.get(&pair)
    }

    pub fn get(&self, pair: &FormatPair) -> Option<&RegisteredConverter> {
        self.entries.get(pair)
    }

    pub fn contains(&self, source: &str, target: &str) -> bool {
        self.lookup(source, target).is_some()
    }

    /// Every format that appears as a source.
    pub fn list_source_formats(&self) -> BTreeSet<FormatTag> {
        self.entries.keys().map(|p| p.source.clone()).collect()
    }

    /// Formats reachable in one step from `source`. Empty for unknown sources.
    pub fn list_target_formats(&self, source: &str) -> BTreeSet<FormatTag> {
        let Ok(source) = FormatTag::parse(source) else {
            return BTreeSet::new();
        };
        self.entries
            .keys()
            .filter(|p| p.source == source)
            .map(|p| p.target.clone())
            .collect()
    }

    pub fn pairs(&self) -> impl Iterator<Item = &FormatPair> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredConverter> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::TransformContext;
    use crate::error::TransformError;
    use crate::format::FormatTagError;
    use async_trait::async_trait;
    use tokio::io::{AsyncRead, AsyncWrite};

    struct Stub {
        source: FormatTag,
        target: FormatTag,
    }

    impl Stub {
        fn new(source: &str, target: &str) -> Self {
            Self {
                source: FormatTag::parse(source).unwrap(),
                target: FormatTag::parse(target).unwrap(),
            }
        }
    }

    #[async_trait]
    impl Converter for Stub {
        fn source_format(&self) -> &FormatTag {
            &self.source
        }

        fn target_format(&self) -> &FormatTag {
            &self.target
        }

        async fn transform(
            &self,
            _source: &mut (dyn AsyncRead + Unpin + Send),
            _target: &mut (dyn AsyncWrite + Unpin + Send),
            _ctx: &TransformContext,
        ) -> Result<(), TransformError> {
            Ok(())
        }
    }

    fn stub(source: &'static str, target: &'static str) -> ConverterDescriptor {
        ConverterDescriptor::new(source, target, move || Stub::new(source, target))
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut b = ConverterRegistry::builder();
        b.register(stub("txt", "pdf")).unwrap();
        let reg = b.build();

        let hit = reg.lookup("TXT", "Pdf").expect("registered");
        assert_eq!(hit.name(), "Stub");
        assert_eq!(hit.pair().to_string(), "txt → pdf");
        assert!(reg.lookup("pdf", "txt").is_none());
        assert!(reg.lookup("", "pdf").is_none());
    }

    #[test]
    fn empty_format_is_rejected() {
        let mut b = ConverterRegistry::builder();
        let err = b
            .register(ConverterDescriptor::new("", "pdf", || Stub::new("txt", "pdf")))
            .unwrap_err();
        assert_eq!(
            err,
            RegistrationError::InvalidFormat {
                converter: "Stub".into(),
                side: Side::Source,
                input: String::new(),
                reason: FormatTagError::Empty,
            }
        );
        assert!(b.build().is_empty());
    }

    #[test]
    fn duplicate_replace_keeps_latest() {
        let mut b = ConverterRegistry::builder();
        b.register(stub("png", "jpg")).unwrap();
        b.register(stub("PNG", "JPG").named("Faster")).unwrap();
        let reg = b.build();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup("png", "jpg").unwrap().name(), "Faster");
    }

    #[test]
    fn duplicate_reject_keeps_first() {
        let mut b = ConverterRegistry::builder().duplicate_policy(DuplicatePolicy::Reject);
        b.register(stub("png", "jpg")).unwrap();
        let err = b.register(stub("png", "jpg").named("Second")).unwrap_err();
        assert!(matches!(err, RegistrationError::Duplicate { ref existing, .. } if existing == "Stub"));
        assert_eq!(b.build().lookup("png", "jpg").unwrap().name(), "Stub");
    }

    #[test]
    fn from_descriptors_collects_errors_and_continues() {
        let (reg, errors) = ConverterRegistry::from_descriptors(
            vec![
                stub("txt", "pdf"),
                ConverterDescriptor::new("md", " ", || Stub::new("md", "html")),
                stub("pdf", "txt"),
            ],
            DuplicatePolicy::Replace,
        );
        assert_eq!(reg.len(), 2);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("invalid target format"));
    }

    #[test]
    fn listing_formats() {
        let (reg, _) = ConverterRegistry::from_descriptors(
            vec![stub("png", "jpg"), stub("png", "bmp"), stub("jpg", "png")],
            DuplicatePolicy::Replace,
        );
        let sources: Vec<String> = reg.list_source_formats().into_iter().map(String::from).collect();
        assert_eq!(sources, vec!["jpg", "png"]);

        let targets: Vec<String> = reg
            .list_target_formats("PNG")
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(targets, vec!["bmp", "jpg"]);
        assert!(reg.list_target_formats("gif").is_empty());
        assert!(reg.list_target_formats("").is_empty());
    }

    #[test]
    fn factory_builds_converter() {
        let mut b = ConverterRegistry::builder();
        b.register(stub("txt", "pdf")).unwrap();
        let reg = b.build();
        let entry = reg.lookup("txt", "pdf").unwrap();
        let converter = (entry.factory())().unwrap();
        assert!(converter.can_convert(&entry.pair().source, &entry.pair().target));
    }
}
