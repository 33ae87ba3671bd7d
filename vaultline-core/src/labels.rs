//! Operation label generation
//!
//! Labels name snapshots in the engine's repository and key every ledger
//! table, so they must never repeat. Generation is a pure query: a template
//! is rendered from the operation context and, when the rendered base is
//! already taken, a `_rN` revision suffix is appended until a free label is
//! found. Callers supply the "is taken" lookup; the ledger runs it inside
//! the same transaction that reserves the label.

use crate::{Error, Result};
use chrono::NaiveDate;

/// Template used when the caller gives no base name
pub const DEFAULT_TEMPLATE: &str = "{scope}_{yyyymmdd}_{type}";

/// Highest revision suffix tried before giving up
pub const MAX_REVISIONS: u32 = 1000;

const TOKENS: [&str; 5] = ["{scope}", "{group}", "{yyyymmdd}", "{date}", "{type}"];

/// Values substituted into a label template
#[derive(Debug, Clone)]
pub struct LabelContext<'a> {
    pub scope: &'a str,
    pub date: NaiveDate,
    /// Kind token, e.g. `full`, `inc`, `restore`
    pub kind: &'a str,
}

/// Renders label templates and resolves collisions
#[derive(Debug, Clone)]
pub struct LabelGenerator {
    max_revisions: u32,
}

impl Default for LabelGenerator {
    fn default() -> Self {
        Self {
            max_revisions: MAX_REVISIONS,
        }
    }
}

impl LabelGenerator {
    pub fn new(max_revisions: u32) -> Self {
        Self {
            max_revisions: max_revisions.max(1),
        }
    }

    pub fn max_revisions(&self) -> u32 {
        self.max_revisions
    }

    /// Render the base label for an operation without checking collisions
    pub fn render(&self, template: Option<&str>, ctx: &LabelContext<'_>) -> Result<String> {
        let template = template
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TEMPLATE);

        let rendered = template
            .replace("{scope}", ctx.scope)
            .replace("{group}", ctx.scope)
            .replace("{yyyymmdd}", &ctx.date.format("%Y%m%d").to_string())
            .replace("{date}", &ctx.date.format("%Y-%m-%d").to_string())
            .replace("{type}", ctx.kind);

        let label = sanitize(&rendered);
        if label.trim_matches('_').is_empty() {
            return Err(Error::InvalidLabel(format!(
                "template '{}' renders to an empty label",
                template
            )));
        }
        Ok(label)
    }

    /// Render a template and resolve it against existing labels
    pub fn generate<F>(
        &self,
        template: Option<&str>,
        ctx: &LabelContext<'_>,
        is_taken: F,
    ) -> Result<String>
    where
        F: FnMut(&str) -> bool,
    {
        let base = self.render(template, ctx)?;
        self.resolve(&base, is_taken)
    }

    /// Find the first free label among `base`, `base_r2`, ..., `base_r{max}`
    pub fn resolve<F>(&self, base: &str, mut is_taken: F) -> Result<String>
    where
        F: FnMut(&str) -> bool,
    {
        if !is_taken(base) {
            return Ok(base.to_string());
        }

        for revision in 2..=self.max_revisions {
            let candidate = format!("{}_r{}", base, revision);
            if !is_taken(&candidate) {
                return Ok(candidate);
            }
        }

        Err(Error::LabelExhausted(base.to_string()))
    }
}

/// Whether a template contains any substitution token
pub fn has_tokens(template: &str) -> bool {
    TOKENS.iter().any(|t| template.contains(t))
}

/// Replace characters the engine rejects in snapshot names
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ctx() -> LabelContext<'static> {
        LabelContext {
            scope: "sales",
            date: NaiveDate::from_ymd_opt(2025, 10, 15).unwrap(),
            kind: "inc",
        }
    }

    #[test]
    fn test_default_template() {
        let label = LabelGenerator::default()
            .generate(None, &ctx(), |_| false)
            .unwrap();
        assert_eq!(label, "sales_20251015_inc");
    }

    #[test]
    fn test_custom_template_tokens() {
        let label = LabelGenerator::default()
            .generate(Some("nightly-{group}-{date}"), &ctx(), |_| false)
            .unwrap();
        assert_eq!(label, "nightly_sales_2025_10_15");
    }

    #[test]
    fn test_plain_name_used_verbatim() {
        assert!(!has_tokens("before_migration"));
        let label = LabelGenerator::default()
            .generate(Some("before_migration"), &ctx(), |_| false)
            .unwrap();
        assert_eq!(label, "before_migration");
    }

    #[test]
    fn test_collision_appends_revision_starting_at_two() {
        let taken: HashSet<&str> = ["sales_20251015_inc", "sales_20251015_inc_r2"]
            .into_iter()
            .collect();
        let label = LabelGenerator::default()
            .generate(None, &ctx(), |l| taken.contains(l))
            .unwrap();
        assert_eq!(label, "sales_20251015_inc_r3");
    }

    #[test]
    fn test_exhaustion_fails_instead_of_looping() {
        let generator = LabelGenerator::new(5);
        let err = generator.resolve("busy", |_| true).unwrap_err();
        assert_eq!(err, Error::LabelExhausted("busy".to_string()));
    }

    #[test]
    fn test_empty_render_is_rejected() {
        let result = LabelGenerator::default().render(Some("---"), &ctx());
        assert!(matches!(result, Err(Error::InvalidLabel(_))));
    }
}
