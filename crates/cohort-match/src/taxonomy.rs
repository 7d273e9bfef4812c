//! Category to tag taxonomy.
//!
//! A posting names one category; profiles carry free-form skill tags. The
//! taxonomy says which tags count as belonging to a category. A category
//! always includes its own name. Lookups are case-insensitive.
//!
//! YAML format:
//!
//! ```yaml
//! categories:
//!   design: [ux, ui, figma]
//!   development: [rust, backend]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use cohort_core::{Error, Result};

const BUILTIN: &[(&str, &[&str])] = &[
    (
        "design",
        &[
            "ux",
            "ui",
            "ux/ui",
            "figma",
            "graphic design",
            "product design",
            "illustration",
            "branding",
            "motion design",
        ],
    ),
    (
        "development",
        &[
            "frontend",
            "backend",
            "mobile",
            "rust",
            "go",
            "python",
            "javascript",
            "typescript",
            "devops",
        ],
    ),
    (
        "marketing",
        &["smm", "seo", "content", "copywriting", "targeting", "ads", "pr"],
    ),
    (
        "sales",
        &["business development", "crm", "lead generation", "b2b"],
    ),
    (
        "analytics",
        &["data", "sql", "data science", "ml", "bi"],
    ),
    (
        "management",
        &["project management", "product management", "agile", "scrum"],
    ),
];

#[derive(Debug, Deserialize)]
struct TaxonomyFile {
    categories: BTreeMap<String, Vec<String>>,
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Category to tag-set mapping.
#[derive(Debug, Clone, Default)]
pub struct CategoryTaxonomy {
    categories: BTreeMap<String, BTreeSet<String>>,
}

impl CategoryTaxonomy {
    /// Built-in taxonomy.
    pub fn builtin() -> Self {
        let mut taxonomy = Self::default();
        for (category, tags) in BUILTIN {
            taxonomy.insert(category, tags.iter().copied());
        }
        taxonomy
    }

    /// Parse a YAML taxonomy document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: TaxonomyFile = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Invalid taxonomy: {}", e)))?;
        let mut taxonomy = Self::default();
        for (category, tags) in &file.categories {
            taxonomy.insert(category, tags.iter().map(String::as_str));
        }
        Ok(taxonomy)
    }

    /// Load a YAML taxonomy from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path.as_ref())?;
        let taxonomy = Self::from_yaml_str(&yaml)?;
        info!(
            subsystem = "matching",
            component = "taxonomy",
            path = %path.as_ref().display(),
            categories = taxonomy.categories.len(),
            "Loaded category taxonomy"
        );
        Ok(taxonomy)
    }

    /// `TAXONOMY_PATH` if set, else the built-in taxonomy.
    pub fn from_env() -> Result<Self> {
        match std::env::var("TAXONOMY_PATH") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim()),
            _ => Ok(Self::builtin()),
        }
    }

    fn insert<'a>(&mut self, category: &str, tags: impl Iterator<Item = &'a str>) {
        let entry = self.categories.entry(normalize(category)).or_default();
        entry.extend(tags.map(normalize).filter(|t| !t.is_empty()));
    }

    /// Tags belonging to `category`, including the category name itself.
    ///
    /// Unknown categories map to just their own name.
    pub fn tags_for(&self, category: &str) -> BTreeSet<String> {
        let key = normalize(category);
        let mut tags = self.categories.get(&key).cloned().unwrap_or_default();
        if !key.is_empty() {
            tags.insert(key);
        }
        tags
    }

    /// Known category names.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_design_includes_ux() {
        let taxonomy = CategoryTaxonomy::builtin();
        let tags = taxonomy.tags_for("design");
        assert!(tags.contains("ux"));
        assert!(tags.contains("figma"));
        assert!(tags.contains("design"));
        assert!(!tags.contains("sales"));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let taxonomy = CategoryTaxonomy::builtin();
        assert_eq!(taxonomy.tags_for(" Design "), taxonomy.tags_for("design"));
    }

    #[test]
    fn test_unknown_category_maps_to_itself() {
        let taxonomy = CategoryTaxonomy::builtin();
        let tags = taxonomy.tags_for("Pottery");
        assert_eq!(tags.len(), 1);
        assert!(tags.contains("pottery"));
    }

    #[test]
    fn test_from_yaml() {
        let yaml = "categories:\n  Music:\n    - Guitar\n    - ' drums '\n";
        let taxonomy = CategoryTaxonomy::from_yaml_str(yaml).unwrap();
        let tags = taxonomy.tags_for("music");
        assert!(tags.contains("guitar"));
        assert!(tags.contains("drums"));
        assert!(tags.contains("music"));
        assert_eq!(taxonomy.categories().collect::<Vec<_>>(), vec!["music"]);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = CategoryTaxonomy::from_yaml_str("categories: [oops").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = CategoryTaxonomy::from_file("/nonexistent/taxonomy.yaml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
