//! Outcome rules: a tag mapped to free-text suggestions, looked up by tag.

use tracing::info;

use crate::error::{Error, Result};
use crate::model::{OutcomeRule, OutcomeRuleInput};
use crate::store::DynOutcomeRuleStore;

#[derive(Clone)]
pub struct OutcomeRules {
    store: DynOutcomeRuleStore,
}

impl OutcomeRules {
    pub fn new(store: DynOutcomeRuleStore) -> Self {
        Self { store }
    }

    pub async fn create(&self, input: OutcomeRuleInput) -> Result<OutcomeRule> {
        let tag = clean_tag(&input.tag)?;
        let rule = self
            .store
            .create_rule(tag, clean_suggestions(input.suggestions))
            .await?;
        info!(target: "outcome", tag = %rule.tag, n = rule.suggestions.len(), "outcome rule created");
        Ok(rule)
    }

    pub async fn suggestions(&self, tag: &str) -> Result<OutcomeRule> {
        self.store
            .find_rule(tag.trim())
            .await?
            .ok_or_else(|| Error::NotFound("No suggestions found for this tag.".into()))
    }

    pub async fn all(&self) -> Result<Vec<OutcomeRule>> {
        Ok(self.store.all_rules().await?)
    }

    pub async fn update(&self, tag: &str, suggestions: Vec<String>) -> Result<OutcomeRule> {
        self.store
            .replace_suggestions(tag.trim(), clean_suggestions(suggestions))
            .await?
            .ok_or_else(|| Error::NotFound("Outcome rule not found.".into()))
    }

    pub async fn delete(&self, tag: &str) -> Result<()> {
        if self.store.delete_rule(tag.trim()).await? {
            Ok(())
        } else {
            Err(Error::NotFound("Outcome rule not found.".into()))
        }
    }
}

fn clean_tag(raw: &str) -> Result<String> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(Error::InvalidInput("Outcome rule tag is required.".into()));
    }
    Ok(t.to_string())
}

/// Trim entries and drop empty ones, keeping order.
fn clean_suggestions(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn rules() -> OutcomeRules {
        OutcomeRules::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn create_trims_and_looks_up_by_tag() {
        let r = rules();
        r.create(OutcomeRuleInput {
            tag: " relocation ".into(),
            suggestions: vec![" Visit first ".into(), "".into(), "Budget movers".into()],
        })
        .await
        .unwrap();

        let found = r.suggestions("relocation").await.unwrap();
        assert_eq!(found.suggestions, vec!["Visit first", "Budget movers"]);
    }

    #[tokio::test]
    async fn missing_tag_is_not_found() {
        let r = rules();
        assert!(matches!(
            r.suggestions("nope").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(r.delete("nope").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn empty_tag_is_rejected() {
        let r = rules();
        let err = r
            .create(OutcomeRuleInput {
                tag: "   ".into(),
                suggestions: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn duplicate_tag_conflicts() {
        let r = rules();
        let input = OutcomeRuleInput {
            tag: "career".into(),
            suggestions: vec!["Ask a mentor".into()],
        };
        r.create(input.clone()).await.unwrap();
        assert!(matches!(r.create(input).await, Err(Error::Conflict(_))));
    }
}
