//! The research pipeline's growing state bag.
//!
//! Modeled as a typed record with optional fields rather than a dynamic
//! mapping: each stage reads a prefix of fields and writes its own, so the
//! compiler enforces which stage can see what instead of a stringly-keyed
//! dict the way the source passed state between steps.
use std::collections::BTreeMap;

use crate::util::url::canonicalize;

/// One retrieved or extracted piece of evidence about a company.
#[derive(Debug, Clone)]
pub(crate) struct Document {
    pub(crate) url: String,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) raw_content: Option<String>,
    pub(crate) query: String,
    pub(crate) source: DocumentSource,
    pub(crate) score: f64,
    pub(crate) evaluation: Option<Evaluation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DocumentSource {
    WebSearch,
    CompanyWebsite,
}

#[derive(Debug, Clone)]
pub(crate) struct Evaluation {
    pub(crate) overall_score: f64,
    pub(crate) query: String,
}

/// A company's homepage, fetched and concatenated into a single text blob.
#[derive(Debug, Clone)]
pub(crate) struct SiteScrape {
    pub(crate) url: String,
    pub(crate) title: String,
    pub(crate) raw_content: String,
}

/// Category tag for researcher/curator/enricher/briefing stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Category {
    Financial,
    News,
    Industry,
    Company,
}

impl Category {
    pub(crate) const ALL: [Category; 4] = [
        Category::Financial,
        Category::News,
        Category::Industry,
        Category::Company,
    ];

    #[must_use]
    pub(crate) fn analyst_tag(self) -> &'static str {
        match self {
            Category::Financial => "financial_analyst",
            Category::News => "news_scanner",
            Category::Industry => "industry_analyst",
            Category::Company => "company_analyst",
        }
    }

    #[must_use]
    pub(crate) fn label(self) -> &'static str {
        match self {
            Category::Financial => "financial",
            Category::News => "news",
            Category::Industry => "industry",
            Category::Company => "company",
        }
    }

    #[must_use]
    pub(crate) fn heading(self) -> &'static str {
        match self {
            Category::Financial => "Financial",
            Category::News => "News",
            Category::Industry => "Industry",
            Category::Company => "Company",
        }
    }
}

/// A canonical-URL-keyed bag of documents, one per category.
pub(crate) type DocumentMap = BTreeMap<String, Document>;

/// The full research state, as it grows through the pipeline.
///
/// Every field beyond `company` is optional-or-empty until the stage that
/// populates it has run. Stages are handed a snapshot and return a delta
/// that the engine merges back in; nothing here is mutated concurrently.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResearchState {
    pub(crate) company: String,
    pub(crate) company_url: Option<String>,
    pub(crate) industry: Option<String>,
    pub(crate) hq_location: Option<String>,

    pub(crate) site_scrape: Option<SiteScrape>,
    pub(crate) messages: Vec<String>,

    pub(crate) financial_data: DocumentMap,
    pub(crate) news_data: DocumentMap,
    pub(crate) industry_data: DocumentMap,
    pub(crate) company_data: DocumentMap,

    pub(crate) curated_financial_data: DocumentMap,
    pub(crate) curated_news_data: DocumentMap,
    pub(crate) curated_industry_data: DocumentMap,
    pub(crate) curated_company_data: DocumentMap,

    pub(crate) financial_briefing: String,
    pub(crate) news_briefing: String,
    pub(crate) industry_briefing: String,
    pub(crate) company_briefing: String,

    pub(crate) references: Vec<String>,
    pub(crate) report: String,
}

impl ResearchState {
    #[must_use]
    pub(crate) fn new(
        company: String,
        company_url: Option<String>,
        industry: Option<String>,
        hq_location: Option<String>,
    ) -> Self {
        Self {
            company,
            company_url: company_url.map(|url| canonicalize(&url)),
            industry,
            hq_location,
            ..Self::default()
        }
    }

    #[must_use]
    pub(crate) fn category_data(&self, category: Category) -> &DocumentMap {
        match category {
            Category::Financial => &self.financial_data,
            Category::News => &self.news_data,
            Category::Industry => &self.industry_data,
            Category::Company => &self.company_data,
        }
    }

    pub(crate) fn category_data_mut(&mut self, category: Category) -> &mut DocumentMap {
        match category {
            Category::Financial => &mut self.financial_data,
            Category::News => &mut self.news_data,
            Category::Industry => &mut self.industry_data,
            Category::Company => &mut self.company_data,
        }
    }

    #[must_use]
    pub(crate) fn curated_data(&self, category: Category) -> &DocumentMap {
        match category {
            Category::Financial => &self.curated_financial_data,
            Category::News => &self.curated_news_data,
            Category::Industry => &self.curated_industry_data,
            Category::Company => &self.curated_company_data,
        }
    }

    pub(crate) fn curated_data_mut(&mut self, category: Category) -> &mut DocumentMap {
        match category {
            Category::Financial => &mut self.curated_financial_data,
            Category::News => &mut self.curated_news_data,
            Category::Industry => &mut self.curated_industry_data,
            Category::Company => &mut self.curated_company_data,
        }
    }

    pub(crate) fn briefing_mut(&mut self, category: Category) -> &mut String {
        match category {
            Category::Financial => &mut self.financial_briefing,
            Category::News => &mut self.news_briefing,
            Category::Industry => &mut self.industry_briefing,
            Category::Company => &mut self.company_briefing,
        }
    }

    #[must_use]
    pub(crate) fn briefing(&self, category: Category) -> &str {
        match category {
            Category::Financial => &self.financial_briefing,
            Category::News => &self.news_briefing,
            Category::Industry => &self.industry_briefing,
            Category::Company => &self.company_briefing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_canonicalizes_company_url() {
        let state = ResearchState::new(
            "Acme".to_owned(),
            Some("https://acme.example/?utm_source=x".to_owned()),
            None,
            None,
        );
        assert_eq!(state.company_url.as_deref(), Some("https://acme.example/"));
    }

    #[test]
    fn category_data_accessors_round_trip() {
        let mut state = ResearchState::new("Acme".to_owned(), None, None, None);
        state.category_data_mut(Category::News).insert(
            "https://example.com/a".to_owned(),
            Document {
                url: "https://example.com/a".to_owned(),
                title: "A".to_owned(),
                content: "content".to_owned(),
                raw_content: None,
                query: "acme news".to_owned(),
                source: DocumentSource::WebSearch,
                score: 0.9,
                evaluation: None,
            },
        );
        assert_eq!(state.category_data(Category::News).len(), 1);
        assert!(state.category_data(Category::Financial).is_empty());
    }
}
