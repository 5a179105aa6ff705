use serde::{Deserialize, Serialize};

use crate::error::LaurelError;
use crate::record::RenderRecord;
use crate::template::TemplateConfig;

pub const PLAYER_FALLBACK_AWARD: &str = "一等奖";
pub const COACH_AWARD_SUFFIX: &str = "-辅导员";

/// Source of stored templates keyed by (category, award level).
pub trait TemplateStore {
    /// First template stored for `award_level`, restricted to `category`
    /// when one is given.
    fn find(&self, category: Option<&str>, award_level: &str) -> Option<TemplateConfig>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTemplate {
    #[serde(default)]
    pub name: String,
    pub category: String,
    pub award_level: String,
    pub config: TemplateConfig,
}

impl StoredTemplate {
    pub fn new(category: &str, award_level: &str, config: TemplateConfig) -> Self {
        Self {
            name: format!("{category}-{award_level}模板"),
            category: category.to_string(),
            award_level: award_level.to_string(),
            config,
        }
    }
}

/// In-memory template store. Insertion order decides which template an
/// "any category" lookup returns.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<StoredTemplate>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON array of `{name, category, award_level, config}` entries.
    pub fn from_json(raw: &str) -> Result<Self, LaurelError> {
        let entries: Vec<StoredTemplate> = serde_json::from_str(raw)
            .map_err(|err| LaurelError::MalformedTemplate(err.to_string()))?;
        let mut catalog = Self::new();
        for entry in entries {
            catalog.insert(entry)?;
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, template: StoredTemplate) -> Result<(), LaurelError> {
        if self.templates.iter().any(|existing| {
            existing.category == template.category && existing.award_level == template.award_level
        }) {
            return Err(LaurelError::InvalidConfiguration(format!(
                "duplicate template for {} - {}",
                template.category, template.award_level
            )));
        }
        self.templates.push(template);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredTemplate> {
        self.templates.iter()
    }
}

impl TemplateStore for TemplateCatalog {
    fn find(&self, category: Option<&str>, award_level: &str) -> Option<TemplateConfig> {
        self.templates
            .iter()
            .find(|t| {
                t.award_level == award_level && category.is_none_or(|c| t.category == c)
            })
            .map(|t| t.config.clone())
    }
}

/// Picks a template: exact, any category, exact fallback, any-category
/// fallback.
pub fn resolve_template(
    store: &dyn TemplateStore,
    category: &str,
    award_level: &str,
    fallback_award_level: Option<&str>,
) -> Result<TemplateConfig, LaurelError> {
    let fallback = fallback_award_level.filter(|f| !f.is_empty());
    let found = store
        .find(Some(category), award_level)
        .or_else(|| store.find(None, award_level))
        .or_else(|| fallback.and_then(|f| store.find(Some(category), f)))
        .or_else(|| fallback.and_then(|f| store.find(None, f)));
    match found {
        Some(template) => {
            tracing::debug!(category, award_level, "template resolved");
            Ok(template)
        }
        None => Err(LaurelError::TemplateNotFound {
            category: category.to_string(),
            award_level: award_level.to_string(),
            fallback_award_level: fallback.map(str::to_string),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateKind {
    Player,
    Coach,
}

impl CertificateKind {
    pub const ALL: [CertificateKind; 2] = [CertificateKind::Player, CertificateKind::Coach];

    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateKind::Player => "player",
            CertificateKind::Coach => "coach",
        }
    }

    /// Award level the template lookup uses for this kind.
    pub fn award_level(&self, award_level: &str) -> String {
        match self {
            CertificateKind::Player => award_level.to_string(),
            CertificateKind::Coach => format!("{award_level}{COACH_AWARD_SUFFIX}"),
        }
    }

    pub fn fallback_award_level(&self) -> String {
        self.award_level(PLAYER_FALLBACK_AWARD)
    }

    pub fn resolve(
        &self,
        store: &dyn TemplateStore,
        record: &dyn RenderRecord,
    ) -> Result<TemplateConfig, LaurelError> {
        let award_level = self.award_level(&record.award_level());
        let fallback = self.fallback_award_level();
        resolve_template(store, &record.category(), &award_level, Some(&fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ApplicationRecord;

    fn tagged(marker: f32) -> TemplateConfig {
        TemplateConfig {
            global_y_offset: marker,
            ..TemplateConfig::default()
        }
    }

    fn catalog() -> TemplateCatalog {
        let mut catalog = TemplateCatalog::new();
        for (category, award, marker) in [
            ("机器人", "二等奖", 1.0),
            ("编程", "一等奖", 2.0),
            ("机器人", "一等奖", 3.0),
            ("编程", "一等奖-辅导员", 4.0),
        ] {
            catalog
                .insert(StoredTemplate::new(category, award, tagged(marker)))
                .expect("insert");
        }
        catalog
    }

    fn marker(result: Result<TemplateConfig, LaurelError>) -> f32 {
        result.expect("template").global_y_offset
    }

    #[test]
    fn exact_match_wins() {
        let catalog = catalog();
        assert_eq!(marker(resolve_template(&catalog, "机器人", "一等奖", None)), 3.0);
    }

    #[test]
    fn any_category_comes_before_fallback() {
        let catalog = catalog();
        // No 航模/一等奖: first stored 一等奖 in insertion order.
        assert_eq!(
            marker(resolve_template(&catalog, "航模", "一等奖", Some("二等奖"))),
            2.0
        );
    }

    #[test]
    fn fallback_prefers_same_category() {
        let catalog = catalog();
        assert_eq!(
            marker(resolve_template(&catalog, "机器人", "优秀奖", Some("一等奖"))),
            3.0
        );
        assert_eq!(
            marker(resolve_template(&catalog, "航模", "优秀奖", Some("二等奖"))),
            1.0
        );
    }

    #[test]
    fn missing_template_reports_the_query() {
        let catalog = catalog();
        let err = resolve_template(&catalog, "航模", "优秀奖", Some("特等奖")).expect_err("missing");
        match &err {
            LaurelError::TemplateNotFound {
                category,
                award_level,
                fallback_award_level,
            } => {
                assert_eq!(category, "航模");
                assert_eq!(award_level, "优秀奖");
                assert_eq!(fallback_award_level.as_deref(), Some("特等奖"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("特等奖"));

        let err = resolve_template(&catalog, "航模", "优秀奖", None).expect_err("missing");
        assert!(matches!(
            err,
            LaurelError::TemplateNotFound {
                fallback_award_level: None,
                ..
            }
        ));
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut catalog = catalog();
        let err = catalog
            .insert(StoredTemplate::new("机器人", "一等奖", TemplateConfig::default()))
            .expect_err("duplicate");
        assert!(matches!(err, LaurelError::InvalidConfiguration(_)));
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn kinds_derive_award_levels() {
        assert_eq!(CertificateKind::Player.award_level("二等奖"), "二等奖");
        assert_eq!(CertificateKind::Coach.award_level("二等奖"), "二等奖-辅导员");
        assert_eq!(CertificateKind::Coach.fallback_award_level(), "一等奖-辅导员");

        let catalog = catalog();
        let record = ApplicationRecord::default()
            .with_attribute("category", "编程")
            .with_attribute("award_level", "三等奖");
        assert_eq!(marker(CertificateKind::Coach.resolve(&catalog, &record)), 4.0);
        assert_eq!(marker(CertificateKind::Player.resolve(&catalog, &record)), 2.0);
    }

    #[test]
    fn catalog_loads_from_json() {
        let catalog = TemplateCatalog::from_json(
            r#"[
                {"name": "机器人-一等奖模板", "category": "机器人", "award_level": "一等奖",
                 "config": {"coord_unit": "px", "y_origin": "top", "texts": []}},
                {"category": "编程", "award_level": "一等奖", "config": {}}
            ]"#,
        )
        .expect("catalog");
        assert_eq!(catalog.len(), 2);
        let names: Vec<_> = catalog.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["机器人-一等奖模板", ""]);

        let duplicated = r#"[
            {"category": "编程", "award_level": "一等奖", "config": {}},
            {"category": "编程", "award_level": "一等奖", "config": {}}
        ]"#;
        assert!(TemplateCatalog::from_json(duplicated).is_err());
    }
}
