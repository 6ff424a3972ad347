//! The ordered, insert-once digester registry.
//!
//! Registration order is the only dependency mechanism: a digester that
//! consumes another's output registers after its producer. The registry is
//! built once at startup and immutable afterwards.

use crate::digest::digester::{Digester, OutputSpec};
use crate::error::Result;
use std::sync::Arc;

#[derive(Default)]
pub struct Registry {
    digesters: Vec<Arc<dyn Digester>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a digester. Names must be unique across the registry, output
    /// names too.
    pub fn register(&mut self, digester: Arc<dyn Digester>) -> Result<()> {
        if self.by_name(digester.name()).is_some() {
            return Err(anyhow::anyhow!(
                "digester '{}' is already registered",
                digester.name()
            )
            .into());
        }

        for spec in digester.outputs() {
            if self.output_spec(spec.name).is_some() {
                return Err(anyhow::anyhow!(
                    "digester output '{}' is already registered",
                    spec.name
                )
                .into());
            }
        }

        self.digesters.push(digester);
        Ok(())
    }

    /// All digesters in registration order.
    pub fn all(&self) -> &[Arc<dyn Digester>] {
        &self.digesters
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<dyn Digester>> {
        self.digesters
            .iter()
            .find(|digester| digester.name() == name)
    }

    /// Union of every registered digester's output names, registration order.
    pub fn all_output_names(&self) -> Vec<&'static str> {
        self.digesters
            .iter()
            .flat_map(|digester| digester.outputs())
            .map(|spec| spec.name)
            .collect()
    }

    /// The spec of a registered output name, if any digester declares it.
    pub fn output_spec(&self, name: &str) -> Option<OutputSpec> {
        self.digesters
            .iter()
            .flat_map(|digester| digester.outputs())
            .find(|spec| spec.name == name)
    }

    pub fn is_screenshot_output(&self, name: &str) -> bool {
        self.output_spec(name)
            .is_some_and(|spec| spec.is_screenshot)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("digesters", &self.all_output_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digester::{DigestContext, DigestOutput};
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Digester for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn label(&self) -> &'static str {
            "test digester"
        }

        async fn applies(&self, _ctx: &DigestContext<'_>) -> crate::Result<bool> {
            Ok(false)
        }

        async fn run(&self, _ctx: &DigestContext<'_>) -> crate::Result<Vec<DigestOutput>> {
            Ok(Vec::new())
        }
    }

    struct TwoOutputs;

    #[async_trait]
    impl Digester for TwoOutputs {
        fn name(&self) -> &'static str {
            "crawler"
        }

        fn label(&self) -> &'static str {
            "crawler"
        }

        fn outputs(&self) -> Vec<OutputSpec> {
            vec![
                OutputSpec::content("crawler-content"),
                OutputSpec::screenshot("crawler-screenshot"),
            ]
        }

        async fn applies(&self, _ctx: &DigestContext<'_>) -> crate::Result<bool> {
            Ok(false)
        }

        async fn run(&self, _ctx: &DigestContext<'_>) -> crate::Result<Vec<DigestOutput>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = Registry::new();
        registry
            .register(Arc::new(Named("tags")))
            .expect("first registration should succeed");

        let error = registry
            .register(Arc::new(Named("tags")))
            .expect_err("duplicate must be rejected");
        assert!(error.to_string().contains("already registered"));
    }

    #[test]
    fn output_names_preserve_registration_order() {
        let mut registry = Registry::new();
        registry
            .register(Arc::new(TwoOutputs))
            .expect("registration should succeed");
        registry
            .register(Arc::new(Named("tags")))
            .expect("registration should succeed");

        assert_eq!(
            registry.all_output_names(),
            vec!["crawler-content", "crawler-screenshot", "tags"]
        );
        assert!(registry.is_screenshot_output("crawler-screenshot"));
        assert!(!registry.is_screenshot_output("crawler-content"));
        assert!(registry.by_name("crawler").is_some());
        assert!(registry.by_name("crawler-content").is_none());
    }
}
