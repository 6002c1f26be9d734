//! Classification of canonical URLs into national and international profile families.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileFamily {
    BaseFhir,
    UsCore,
    GermanBasis,
    Kbv,
    MedizinInformatik,
    SwissCore,
    AuBase,
    UkCore,
    InternationalPatientSummary,
}

// Matched against the URL with its scheme removed. More specific prefixes first.
const FAMILY_PREFIXES: &[(&str, ProfileFamily)] = &[
    ("hl7.org/fhir/us/core/", ProfileFamily::UsCore),
    ("hl7.org/fhir/uv/ips/", ProfileFamily::InternationalPatientSummary),
    ("hl7.org/fhir/structuredefinition/", ProfileFamily::BaseFhir),
    ("fhir.kbv.de/", ProfileFamily::Kbv),
    ("www.medizininformatik-initiative.de/fhir/", ProfileFamily::MedizinInformatik),
    ("fhir.de/", ProfileFamily::GermanBasis),
    ("fhir.ch/ig/ch-core/", ProfileFamily::SwissCore),
    ("hl7.org.au/fhir/", ProfileFamily::AuBase),
    ("fhir.hl7.org.uk/", ProfileFamily::UkCore),
];

impl ProfileFamily {
    pub fn display_name(&self) -> &'static str {
        match self {
            ProfileFamily::BaseFhir => "FHIR Base",
            ProfileFamily::UsCore => "US Core",
            ProfileFamily::GermanBasis => "Basisprofil DE",
            ProfileFamily::Kbv => "KBV",
            ProfileFamily::MedizinInformatik => "Medizininformatik-Initiative",
            ProfileFamily::SwissCore => "CH Core",
            ProfileFamily::AuBase => "AU Base",
            ProfileFamily::UkCore => "UK Core",
            ProfileFamily::InternationalPatientSummary => "International Patient Summary",
        }
    }

    /// ISO 3166 country code, or `None` for international families.
    pub fn country(&self) -> Option<&'static str> {
        match self {
            ProfileFamily::UsCore => Some("US"),
            ProfileFamily::GermanBasis | ProfileFamily::Kbv | ProfileFamily::MedizinInformatik => {
                Some("DE")
            }
            ProfileFamily::SwissCore => Some("CH"),
            ProfileFamily::AuBase => Some("AU"),
            ProfileFamily::UkCore => Some("GB"),
            ProfileFamily::BaseFhir | ProfileFamily::InternationalPatientSummary => None,
        }
    }
}

pub fn classify_profile_family(canonical_url: &str) -> Option<ProfileFamily> {
    let lowered = canonical_url.trim().to_ascii_lowercase();
    let without_scheme = lowered
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(&lowered);

    FAMILY_PREFIXES
        .iter()
        .find(|(prefix, _)| without_scheme.starts_with(prefix))
        .map(|(_, family)| *family)
}
