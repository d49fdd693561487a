//! Company table
//!
//! Static lookup of supported companies, their display names, known exam names and aliases.
//! The table is built once, validated, and never mutated afterwards.

use crate::error::PipelineError;
use std::collections::HashMap;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

/// Minimum number of companies the table must carry
pub const MIN_COMPANIES: usize = 31;

/// One supported company
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyProfile {
    /// Canonical key used in fingerprints and cache keys
    pub canonical: &'static str,
    pub display_name: &'static str,
    /// Well-known name of the company's placement exam, if any
    pub exam_name: Option<&'static str>,
    pub aliases: &'static [&'static str],
}

impl CompanyProfile {
    const fn new(
        canonical: &'static str,
        display_name: &'static str,
        exam_name: Option<&'static str>,
        aliases: &'static [&'static str],
    ) -> Self {
        Self {
            canonical,
            display_name,
            exam_name,
            aliases,
        }
    }
}

const BUILTIN_PROFILES: &[CompanyProfile] = &[
    CompanyProfile::new("tcs", "TCS", Some("TCS NQT"), &["tata consultancy services", "tcs nqt", "tata consultancy"]),
    CompanyProfile::new("infosys", "Infosys", Some("InfyTQ"), &["infosys limited", "infy", "infytq"]),
    CompanyProfile::new("wipro", "Wipro", Some("Wipro NLTH"), &["wipro limited", "wipro nlth", "wipro elite"]),
    CompanyProfile::new("capgemini", "Capgemini", Some("Capgemini Game-Based Aptitude"), &["cap gemini"]),
    CompanyProfile::new("accenture", "Accenture", Some("Accenture Cognitive Assessment"), &["accenture india"]),
    CompanyProfile::new("cognizant", "Cognizant", Some("Cognizant GenC"), &["cts", "cognizant technology solutions", "genc"]),
    CompanyProfile::new("hcl-technologies", "HCL Technologies", Some("HCL TechBee"), &["hcl", "hcltech", "hcl tech"]),
    CompanyProfile::new("tech-mahindra", "Tech Mahindra", None, &["techm", "tech m"]),
    CompanyProfile::new("ibm", "IBM", None, &["international business machines"]),
    CompanyProfile::new("microsoft", "Microsoft", None, &["msft"]),
    CompanyProfile::new("amazon", "Amazon", None, &["amazon india", "aws"]),
    CompanyProfile::new("google", "Google", None, &["alphabet"]),
    CompanyProfile::new("adobe", "Adobe", None, &["adobe systems"]),
    CompanyProfile::new("oracle", "Oracle", None, &["oracle corporation"]),
    CompanyProfile::new("salesforce", "Salesforce", None, &["salesforce.com"]),
    CompanyProfile::new("sap", "SAP", None, &["sap labs"]),
    CompanyProfile::new("deloitte", "Deloitte", None, &["deloitte usi"]),
    CompanyProfile::new("ey", "EY", None, &["ernst & young", "ernst and young"]),
    CompanyProfile::new("pwc", "PwC", None, &["pricewaterhousecoopers"]),
    CompanyProfile::new("kpmg", "KPMG", None, &[]),
    CompanyProfile::new("flipkart", "Flipkart", None, &[]),
    CompanyProfile::new("paytm", "Paytm", None, &["one97"]),
    CompanyProfile::new("zomato", "Zomato", None, &[]),
    CompanyProfile::new("swiggy", "Swiggy", None, &[]),
    CompanyProfile::new("ola", "Ola", None, &["ola cabs"]),
    CompanyProfile::new("uber", "Uber", None, &[]),
    CompanyProfile::new("samsung", "Samsung", Some("Samsung GSAT"), &["samsung r&d", "gsat"]),
    CompanyProfile::new("lg", "LG", None, &["lg electronics"]),
    CompanyProfile::new("siemens", "Siemens", None, &[]),
    CompanyProfile::new("bosch", "Bosch", None, &["robert bosch"]),
    CompanyProfile::new("l-and-t", "L&T", None, &["larsen & toubro", "larsen and toubro", "lnt", "l&t infotech"]),
    CompanyProfile::new("bajaj", "Bajaj", None, &["bajaj auto", "bajaj finserv"]),
    CompanyProfile::new("maruti", "Maruti", None, &["maruti suzuki"]),
    CompanyProfile::new("hdfc", "HDFC", None, &["hdfc bank"]),
    CompanyProfile::new("icici", "ICICI", None, &["icici bank"]),
    CompanyProfile::new("sbi", "SBI", Some("SBI PO"), &["state bank of india"]),
    CompanyProfile::new("axis-bank", "Axis Bank", None, &["axis"]),
];

/// Validated, immutable company lookup table
#[derive(Debug)]
pub struct CompanyTable {
    profiles: Vec<CompanyProfile>,
    /// Normalized name or alias -> index into `profiles`
    index: HashMap<String, usize>,
}

impl CompanyTable {
    /// The built-in table, validated on first access
    pub fn builtin() -> Result<&'static CompanyTable, PipelineError> {
        static TABLE: OnceLock<Result<CompanyTable, PipelineError>> = OnceLock::new();
        TABLE
            .get_or_init(|| CompanyTable::from_profiles(BUILTIN_PROFILES.to_vec()))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Build and validate a table.
    ///
    /// Rejects tables with fewer than [`MIN_COMPANIES`] entries, duplicate canonical keys,
    /// and names or aliases that would resolve to two different companies.
    pub fn from_profiles(profiles: Vec<CompanyProfile>) -> Result<Self, PipelineError> {
        if profiles.len() < MIN_COMPANIES {
            return Err(PipelineError::Config(format!(
                "Company table has {} entries, at least {} required",
                profiles.len(),
                MIN_COMPANIES
            )));
        }

        let mut index: HashMap<String, usize> = HashMap::new();
        for (idx, profile) in profiles.iter().enumerate() {
            let names = std::iter::once(profile.canonical)
                .chain(std::iter::once(profile.display_name))
                .chain(profile.aliases.iter().copied());
            for name in names {
                for key in [normalize(name), slug(name)] {
                    if key.is_empty() {
                        continue;
                    }
                    match index.get(&key) {
                        Some(&existing) if existing != idx => {
                            return Err(PipelineError::Config(format!(
                                "Company name '{}' maps to both '{}' and '{}'",
                                name, profiles[existing].canonical, profile.canonical
                            )));
                        }
                        _ => {
                            index.insert(key, idx);
                        }
                    }
                }
            }
        }

        Ok(Self { profiles, index })
    }

    /// Look up a company by any of its names or aliases
    pub fn resolve(&self, raw: &str) -> Option<&CompanyProfile> {
        let normalized = normalize(raw);
        self.index
            .get(&normalized)
            .or_else(|| self.index.get(&slug(&normalized)))
            .map(|&idx| &self.profiles[idx])
    }

    /// Canonical key for a raw company name.
    ///
    /// Known companies map to their canonical key; unknown ones to a slug of the normalized name.
    pub fn canonical_key(&self, raw: &str) -> String {
        match self.resolve(raw) {
            Some(profile) => profile.canonical.to_string(),
            None => slug(raw),
        }
    }

    pub fn profiles(&self) -> &[CompanyProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Trim, NFKC-normalize, lowercase and collapse internal whitespace
pub fn normalize(raw: &str) -> String {
    let composed: String = raw.trim().nfkc().collect();
    composed
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase alphanumeric runs joined by `-`
pub fn slug(raw: &str) -> String {
    normalize(raw)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
