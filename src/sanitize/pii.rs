//! Anonymization of company and personal data before it reaches a provider
//!
//! Names are swapped for placeholders that can be restored afterwards;
//! contact details, large amounts and addresses are masked for good.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::re;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| re(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"));
static URL: LazyLock<Regex> = LazyLock::new(|| re(r#"(?i)https?://[^\s<>"{}|\\^`\[\]]+"#));
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}"));
static LARGE_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| re(r"\$(?:\d{2,3}(?:,\d{3})+|\d(?:,\d{3}){2,}|\d{5,})(?:\.\d{2})?"));
static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b\d{1,5}\s+[\w\s]+?\b(?:street|st|avenue|ave|road|rd|boulevard|blvd|drive|dr|lane|ln|way|court|ct|place|pl)\b\.?(?:\s*,?\s*(?:suite|ste|apt|unit|#)\s*\d+)?")
});

/// Names to anonymize in a piece of text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PiiSubjects {
    pub company_name: Option<String>,
    pub founder_name: Option<String>,
    #[serde(default)]
    pub additional_names: Vec<String>,
}

impl PiiSubjects {
    pub fn is_empty(&self) -> bool {
        self.company_name.is_none() && self.founder_name.is_none() && self.additional_names.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiMapping {
    pub original: String,
    pub placeholder: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedText {
    pub text: String,
    pub mappings: Vec<PiiMapping>,
}

/// Swap names for placeholders and mask contact details and large figures
pub fn sanitize_pii(text: &str, subjects: &PiiSubjects) -> SanitizedText {
    let mut mappings = Vec::new();
    let mut sanitized = text.to_string();

    let mut names: Vec<(&str, String)> = Vec::new();
    if let Some(company) = subjects.company_name.as_deref() {
        names.push((company, "[COMPANY]".to_string()));
    }
    if let Some(founder) = subjects.founder_name.as_deref() {
        names.push((founder, "[FOUNDER]".to_string()));
    }
    for (index, name) in subjects.additional_names.iter().enumerate() {
        names.push((name.as_str(), format!("[PERSON_{}]", index + 1)));
    }

    for (name, placeholder) in names {
        let name = name.trim();
        if name.chars().count() <= 2 {
            continue;
        }
        let Ok(pattern) = Regex::new(&format!("(?i){}", regex::escape(name))) else {
            continue;
        };
        if pattern.is_match(&sanitized) {
            sanitized = pattern
                .replace_all(&sanitized, regex::NoExpand(&placeholder))
                .into_owned();
            mappings.push(PiiMapping {
                original: name.to_string(),
                placeholder,
            });
        }
    }

    sanitized = EMAIL.replace_all(&sanitized, "[EMAIL]").into_owned();
    sanitized = URL.replace_all(&sanitized, "[URL]").into_owned();
    sanitized = PHONE.replace_all(&sanitized, "[PHONE]").into_owned();
    sanitized = LARGE_AMOUNT.replace_all(&sanitized, "[AMOUNT]").into_owned();
    sanitized = ADDRESS.replace_all(&sanitized, "[ADDRESS]").into_owned();

    SanitizedText {
        text: sanitized,
        mappings,
    }
}

/// Put the original names back in place of their placeholders
pub fn restore_pii(text: &str, mappings: &[PiiMapping]) -> String {
    mappings.iter().rev().fold(text.to_string(), |acc, mapping| {
        acc.replace(&mapping.placeholder, &mapping.original)
    })
}

/// The company facts an advisory prompt is built from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartupProfile {
    pub company_name: Option<String>,
    pub founder_name: Option<String>,
    pub industry: Option<String>,
    pub sector: Option<String>,
    pub stage: Option<String>,
    pub business_model: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub team_size: Option<u32>,
    pub funding_stage: Option<String>,
    pub total_raised: Option<f64>,
    pub monthly_revenue: Option<f64>,
}

impl StartupProfile {
    pub fn subjects(&self) -> PiiSubjects {
        PiiSubjects {
            company_name: self.company_name.clone(),
            founder_name: self.founder_name.clone(),
            additional_names: Vec::new(),
        }
    }

    /// One-line context with identity removed and money bucketed into ranges
    pub fn sanitized_context(&self) -> SanitizedText {
        let mut mappings = Vec::new();
        if let Some(company) = self.company_name.as_deref().filter(|c| c.chars().count() > 2) {
            mappings.push(PiiMapping {
                original: company.to_string(),
                placeholder: "[COMPANY]".to_string(),
            });
        }
        if let Some(founder) = self.founder_name.as_deref().filter(|f| f.chars().count() > 2) {
            mappings.push(PiiMapping {
                original: founder.to_string(),
                placeholder: "[FOUNDER]".to_string(),
            });
        }

        let mut parts = vec!["Company: [COMPANY]".to_string()];
        let fields = [
            ("Industry", &self.industry),
            ("Sector", &self.sector),
            ("Stage", &self.stage),
            ("Business Model", &self.business_model),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                parts.push(format!("{}: {}", label, value));
            }
        }
        if let Some(country) = &self.country {
            match &self.city {
                Some(city) => parts.push(format!("Location: {}, {}", city, country)),
                None => parts.push(format!("Location: {}", country)),
            }
        }
        if let Some(team_size) = self.team_size {
            parts.push(format!("Team Size: {}", team_size));
        }
        if let Some(funding) = &self.funding_stage {
            parts.push(format!("Funding: {}", funding));
        }
        if let Some(raised) = self.total_raised.filter(|r| *r > 0.0) {
            parts.push(format!("Raised: {}", raised_bucket(raised)));
        }
        if let Some(mrr) = self.monthly_revenue.filter(|m| *m > 0.0) {
            parts.push(format!("Revenue: {}", mrr_bucket(mrr)));
        }

        SanitizedText {
            text: parts.join(" | "),
            mappings,
        }
    }
}

fn raised_bucket(raised: f64) -> &'static str {
    match raised {
        r if r < 100_000.0 => "under $100K",
        r if r < 500_000.0 => "$100K-$500K",
        r if r < 1_000_000.0 => "$500K-$1M",
        r if r < 5_000_000.0 => "$1M-$5M",
        r if r < 10_000_000.0 => "$5M-$10M",
        _ => "$10M+",
    }
}

fn mrr_bucket(mrr: f64) -> &'static str {
    match mrr {
        m if m < 10_000.0 => "under $10K MRR",
        m if m < 50_000.0 => "$10K-$50K MRR",
        m if m < 100_000.0 => "$50K-$100K MRR",
        m if m < 500_000.0 => "$100K-$500K MRR",
        _ => "$500K+ MRR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn acme() -> PiiSubjects {
        PiiSubjects {
            company_name: Some("Acme Robotics".to_string()),
            founder_name: Some("Dana Reyes".to_string()),
            additional_names: vec!["Li Wei".to_string()],
        }
    }

    #[test]
    fn test_names_are_replaced_and_restored() {
        let input = "ACME ROBOTICS was founded by Dana Reyes with Li Wei.";
        let sanitized = sanitize_pii(input, &acme());

        assert_eq!(
            sanitized.text,
            "[COMPANY] was founded by [FOUNDER] with [PERSON_1]."
        );
        assert_eq!(sanitized.mappings.len(), 3);
        assert_eq!(
            restore_pii(&sanitized.text, &sanitized.mappings),
            "Acme Robotics was founded by Dana Reyes with Li Wei."
        );
    }

    #[test]
    fn test_contact_details_masked() {
        let input = "Mail dana@acme.io, see https://acme.io/pitch or call 415-555-0199.";
        let sanitized = sanitize_pii(input, &PiiSubjects::default());
        assert_eq!(
            sanitized.text,
            "Mail [EMAIL], see [URL] or call [PHONE]."
        );
        assert!(sanitized.mappings.is_empty());
    }

    #[test]
    fn test_only_large_amounts_masked() {
        let sanitized = sanitize_pii(
            "We spent $950, then $2,400, and raised $1,500,000 plus $25000.",
            &PiiSubjects::default(),
        );
        assert_eq!(
            sanitized.text,
            "We spent $950, then $2,400, and raised [AMOUNT] plus [AMOUNT]."
        );
    }

    #[test]
    fn test_address_masked() {
        let sanitized = sanitize_pii("Office at 221 Market Street, Suite 400 downtown", &PiiSubjects::default());
        assert_eq!(sanitized.text, "Office at [ADDRESS] downtown");
    }

    #[test]
    fn test_short_names_ignored() {
        let subjects = PiiSubjects {
            company_name: Some("AI".to_string()),
            ..PiiSubjects::default()
        };
        let sanitized = sanitize_pii("AI tooling", &subjects);
        assert_eq!(sanitized.text, "AI tooling");
        assert!(sanitized.mappings.is_empty());
    }

    #[test]
    fn test_profile_context_buckets_money() {
        let profile = StartupProfile {
            company_name: Some("Acme Robotics".to_string()),
            industry: Some("Robotics".to_string()),
            stage: Some("Seed".to_string()),
            country: Some("Spain".to_string()),
            city: Some("Madrid".to_string()),
            total_raised: Some(750_000.0),
            monthly_revenue: Some(42_000.0),
            ..StartupProfile::default()
        };

        let context = profile.sanitized_context();
        assert_eq!(
            context.text,
            "Company: [COMPANY] | Industry: Robotics | Stage: Seed | Location: Madrid, Spain | Raised: $500K-$1M | Revenue: $10K-$50K MRR"
        );
        assert_eq!(context.mappings[0].original, "Acme Robotics");
    }
}
