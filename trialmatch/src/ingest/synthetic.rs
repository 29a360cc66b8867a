//! Synthetic patient generation for demos and load testing. Seeded, so the
//! same invocation reproduces the same cohort.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::db::traits::{MatchStore, OrganizationStore, PatientStore, TrialStore};
use crate::error::Result;
use crate::ingest::profile::infer_structured_profile;
use crate::models::{ContactChannel, Organization, PatientProfile, ScoreWeights};

const FIRST_NAMES: [&str; 16] = [
    "Aisha", "Fatima", "Sara", "Noor", "Amna", "Hina", "Rehana", "Zainab", "Ali", "Ahmed",
    "Bilal", "Hamza", "Usman", "Omar", "Khalid", "Sameer",
];

const LAST_NAMES: [&str; 11] = [
    "Khan", "Hussain", "Malik", "Iqbal", "Siddiqui", "Ahmed", "Mirza", "Al-Mansouri", "Abdullah",
    "Rahman", "Qureshi",
];

const CITY_COUNTRY: [(&str, &str); 10] = [
    ("Karachi", "Pakistan"),
    ("Lahore", "Pakistan"),
    ("Islamabad", "Pakistan"),
    ("Rawalpindi", "Pakistan"),
    ("Abu Dhabi", "UAE"),
    ("Dubai", "UAE"),
    ("Riyadh", "Saudi Arabia"),
    ("Jeddah", "Saudi Arabia"),
    ("Mumbai", "India"),
    ("Delhi", "India"),
];

const MATCH_FRIENDLY_CITIES: [(&str, &str); 3] = [
    ("Karachi", "Pakistan"),
    ("Islamabad", "Pakistan"),
    ("Abu Dhabi", "UAE"),
];

const DISTANT_CITIES: [(&str, &str); 4] = [
    ("Mumbai", "India"),
    ("Delhi", "India"),
    ("Riyadh", "Saudi Arabia"),
    ("Jeddah", "Saudi Arabia"),
];

const LANGUAGES: [&str; 4] = ["english", "urdu", "arabic", "hindi"];
const CONTACT_CHANNELS: [ContactChannel; 4] = [
    ContactChannel::Sms,
    ContactChannel::Whatsapp,
    ContactChannel::Email,
    ContactChannel::Phone,
];
const STAGE_HINTS: [&str; 4] = ["stage ii", "stage iii", "stage iv", "metastatic"];
const MARKER_HINTS: [&str; 4] = ["HER2", "TNBC", "BRCA", "HR+"];

const LIKELY_BREAST_CONDITIONS: [&str; 4] = [
    "HER2+ Metastatic Breast Cancer",
    "Triple-Negative Breast Cancer",
    "Metastatic Breast Cancer",
    "Locally Advanced Breast Cancer",
];

const UNLIKELY_ONCOLOGY_CONDITIONS: [&str; 4] = [
    "Prostate Cancer",
    "Colorectal Cancer",
    "Liver Cancer",
    "Ovarian Cancer",
];

const NON_MATCH_DIAGNOSES: [&str; 5] = [
    "Type 2 Diabetes",
    "Chronic Migraine",
    "Hypertension",
    "Asthma",
    "Hypothyroidism",
];

const NO_MATCH_STORIES: [&str; 3] = [
    "lorem zyxw qwer asdf zxcv tyui ghjk",
    "abcde qqqqq plmokn ibhytg vfrcdex swswsw",
    "random words without useful medical meaning repeated text",
];

/// Spectrum bucket weights, summing to 1.0.
const PROFILE_BUCKETS: [(&str, f64); 6] = [
    ("strong_match", 0.24),
    ("good_match", 0.24),
    ("borderline_match", 0.20),
    ("weak_match", 0.14),
    ("unlikely_match", 0.10),
    ("no_match", 0.08),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedMode {
    /// Weighted buckets from obvious matches down to gibberish intakes.
    Spectrum,
    /// Uniform plausible oncology patients.
    Random,
}

impl SeedMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "random" => SeedMode::Random,
            _ => SeedMode::Spectrum,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeedSummary {
    pub created: usize,
    pub organization_slug: String,
    /// Patient count per seed bucket, keyed by bucket name.
    pub profile_distribution: BTreeMap<String, usize>,
}

struct SeedProfile {
    profile_name: &'static str,
    age: u32,
    sex: &'static str,
    city: String,
    country: String,
    diagnosis_hint: String,
    stage_hint: String,
    story: String,
    completeness: u8,
}

fn pick<'a, T>(rng: &mut ChaCha8Rng, items: &'a [T]) -> &'a T {
    // All pools here are non-empty constants.
    items.choose(rng).unwrap()
}

fn weighted_bucket(rng: &mut ChaCha8Rng) -> &'static str {
    let mut roll: f64 = rng.gen();
    for (name, weight) in PROFILE_BUCKETS {
        if roll < weight {
            return name;
        }
        roll -= weight;
    }
    PROFILE_BUCKETS[PROFILE_BUCKETS.len() - 1].0
}

fn build_seed_profile(rng: &mut ChaCha8Rng, mode: SeedMode, conditions: &[String]) -> SeedProfile {
    if mode == SeedMode::Random {
        let condition = pick(rng, conditions).clone();
        let marker = *pick(rng, &MARKER_HINTS);
        let stage_hint = *pick(rng, &STAGE_HINTS);
        let (city, country) = *pick(rng, &CITY_COUNTRY);
        let ecog = *pick(rng, &[0, 1, 1, 2]);
        return SeedProfile {
            profile_name: "random",
            age: rng.gen_range(24..=76),
            sex: *pick(rng, &["female", "male"]),
            city: city.to_string(),
            country: country.to_string(),
            diagnosis_hint: condition.clone(),
            stage_hint: stage_hint.to_string(),
            story: format!(
                "Patient diagnosed with {condition}. {marker} marker noted. \
                 Disease currently {stage_hint}. Prior systemic treatment attempted with \
                 partial response, then progression. ECOG {ecog}. Considering trial \
                 enrollment and willing to attend visits in {city}."
            ),
            completeness: rng.gen_range(70..=100),
        };
    }

    match weighted_bucket(rng) {
        "strong_match" => {
            let condition = pick(rng, conditions).clone();
            let marker = *pick(rng, &["HER2", "TNBC"]);
            let (city, country) = *pick(rng, &MATCH_FRIENDLY_CITIES);
            let ecog = *pick(rng, &[0, 1]);
            SeedProfile {
                profile_name: "strong_match",
                age: rng.gen_range(32..=64),
                sex: "female",
                city: city.to_string(),
                country: country.to_string(),
                diagnosis_hint: condition.clone(),
                stage_hint: "Stage IV".to_string(),
                story: format!(
                    "Diagnosed with {condition}. Biomarker: {marker}. Stage IV metastatic \
                     progression after prior anti-HER2/chemo treatment. ECOG {ecog}. Recent \
                     CBC, bilirubin and creatinine labs are available and acceptable. Patient \
                     can attend visits at {city} and is actively seeking clinical trial \
                     enrollment."
                ),
                completeness: rng.gen_range(92..=100),
            }
        }
        "good_match" => {
            let condition = pick(rng, conditions).clone();
            let marker = *pick(rng, &MARKER_HINTS);
            let (city, country) = *pick(rng, &MATCH_FRIENDLY_CITIES);
            SeedProfile {
                profile_name: "good_match",
                age: rng.gen_range(28..=69),
                sex: *pick(rng, &["female", "male"]),
                city: city.to_string(),
                country: country.to_string(),
                diagnosis_hint: condition.clone(),
                stage_hint: "Stage III".to_string(),
                story: format!(
                    "History of {condition} with {marker} marker status noted. Disease is \
                     advanced with prior lines of therapy. ECOG 1. Interested in enrollment \
                     and can travel to {city}. Lab updates are partially available."
                ),
                completeness: rng.gen_range(80..=92),
            }
        }
        "borderline_match" => {
            let condition = pick(rng, conditions).clone();
            let pool: Vec<(&str, &str)> = DISTANT_CITIES
                .iter()
                .chain(MATCH_FRIENDLY_CITIES.iter())
                .copied()
                .collect();
            let (city, country) = *pick(rng, &pool);
            SeedProfile {
                profile_name: "borderline_match",
                age: rng.gen_range(22..=74),
                sex: *pick(rng, &["female", "male"]),
                city: city.to_string(),
                country: country.to_string(),
                diagnosis_hint: condition.clone(),
                stage_hint: "Stage II".to_string(),
                story: format!(
                    "Possible {condition} with incomplete biomarker confirmation. Prior \
                     treatment history is partial and ECOG is not documented. Patient \
                     currently in {city}. Interested in trial options but clinical records \
                     are incomplete."
                ),
                completeness: rng.gen_range(62..=80),
            }
        }
        "weak_match" => {
            let condition = *pick(rng, &UNLIKELY_ONCOLOGY_CONDITIONS);
            let (city, country) = *pick(rng, &DISTANT_CITIES);
            SeedProfile {
                profile_name: "weak_match",
                age: rng.gen_range(35..=78),
                sex: *pick(rng, &["female", "male"]),
                city: city.to_string(),
                country: country.to_string(),
                diagnosis_hint: condition.to_string(),
                stage_hint: "Unknown stage".to_string(),
                story: format!(
                    "Diagnosed with {condition}. Multiple prior treatments, uncertain \
                     metastatic status, and missing ECOG/labs. Patient is located in {city} \
                     with limited ability to travel frequently."
                ),
                completeness: rng.gen_range(48..=68),
            }
        }
        "unlikely_match" => {
            let diagnosis = *pick(rng, &NON_MATCH_DIAGNOSES);
            let (city, country) = *pick(rng, &CITY_COUNTRY);
            SeedProfile {
                profile_name: "unlikely_match",
                age: rng.gen_range(25..=80),
                sex: *pick(rng, &["female", "male"]),
                city: city.to_string(),
                country: country.to_string(),
                diagnosis_hint: diagnosis.to_string(),
                stage_hint: String::new(),
                story: format!(
                    "Primary issue is {diagnosis}. No documented cancer diagnosis, no \
                     biomarker data, and no oncology treatment history. Patient asks whether \
                     any trial is relevant."
                ),
                completeness: rng.gen_range(35..=58),
            }
        }
        _ => {
            let (city, country) = *pick(rng, &CITY_COUNTRY);
            SeedProfile {
                profile_name: "no_match",
                age: rng.gen_range(21..=70),
                sex: *pick(rng, &["female", "male"]),
                city: city.to_string(),
                country: country.to_string(),
                diagnosis_hint: String::new(),
                stage_hint: String::new(),
                story: pick(rng, &NO_MATCH_STORIES).to_string(),
                completeness: rng.gen_range(20..=40),
            }
        }
    }
}

fn build_contact(
    rng: &mut ChaCha8Rng,
    first: &str,
    last: &str,
    country: &str,
) -> (ContactChannel, String) {
    let channel = *pick(rng, &CONTACT_CHANNELS);
    let country_key = country.trim().to_lowercase();
    if matches!(
        channel,
        ContactChannel::Sms | ContactChannel::Phone | ContactChannel::Whatsapp
    ) {
        let value = match country_key.as_str() {
            "uae" => format!("+971{}", rng.gen_range(500_000_000u64..=599_999_999)),
            "saudi arabia" => format!("+966{}", rng.gen_range(500_000_000u64..=599_999_999)),
            _ => format!("+92{}", rng.gen_range(3_000_000_000u64..=3_499_999_999)),
        };
        return (channel, value);
    }
    let local = format!(
        "{}.{}{}",
        first.to_lowercase(),
        last.to_lowercase(),
        rng.gen_range(10..=99)
    );
    (channel, format!("{local}@example.com"))
}

async fn get_or_create_organization(store: &dyn MatchStore, slug: &str) -> Result<Organization> {
    if let Some(existing) = store.get_organization_by_slug(slug).await? {
        return Ok(existing);
    }
    let mut org = Organization::new(
        Uuid::new_v4().to_string(),
        "Aga Khan University Hospital".to_string(),
        slug.to_string(),
        "Pakistan".to_string(),
    );
    org.score_weights = ScoreWeights::from_values(0.45, 0.30, 0.20, 0.05);
    store.create_organization(&org).await?;
    Ok(org)
}

/// Conditions sampled into the seed stories: breast-cancer conditions from
/// stored trials when present, a built-in list otherwise.
async fn condition_pool(store: &dyn MatchStore) -> Result<Vec<String>> {
    let mut pool = Vec::new();
    for trial in store.list_matchable_trials(1000).await? {
        for condition in &trial.conditions {
            let trimmed = condition.trim();
            if trimmed.is_empty() {
                continue;
            }
            let lowered = trimmed.to_lowercase();
            if lowered.contains("breast") || lowered.contains("her2") || lowered.contains("tnbc") {
                pool.push(trimmed.to_string());
            }
        }
    }
    if pool.is_empty() {
        pool = LIKELY_BREAST_CONDITIONS
            .iter()
            .map(|c| c.to_string())
            .collect();
    }
    Ok(pool)
}

async fn next_patient_code(store: &dyn MatchStore, candidate: &mut usize) -> Result<String> {
    loop {
        let code = format!("PAT-{:04}", *candidate);
        *candidate += 1;
        if store.get_patient_by_code(&code).await?.is_none() {
            return Ok(code);
        }
    }
}

pub async fn generate_patients(
    store: &dyn MatchStore,
    count: usize,
    org_slug: &str,
    seed: u64,
    mode: SeedMode,
) -> Result<SeedSummary> {
    let count = count.clamp(1, 5000);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let organization = get_or_create_organization(store, org_slug).await?;
    let conditions = condition_pool(store).await?;
    let mut code_candidate = store.list_patients().await?.len() + 1;

    let mut created = 0usize;
    let mut profile_distribution: BTreeMap<String, usize> = BTreeMap::new();

    for _ in 0..count {
        let first = *pick(&mut rng, &FIRST_NAMES);
        let last = *pick(&mut rng, &LAST_NAMES);
        let seed_profile = build_seed_profile(&mut rng, mode, &conditions);

        let mut structured = infer_structured_profile(&seed_profile.story);
        let mut diagnosis = structured
            .diagnosis
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| seed_profile.diagnosis_hint.clone());
        let mut stage = structured
            .stage
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| seed_profile.stage_hint.clone());

        if seed_profile.profile_name == "no_match" {
            // Kept sparse on purpose so the gate filters it out.
            diagnosis = String::new();
            stage = String::new();
            structured = Default::default();
        }
        structured.extra.insert(
            "seed_profile".to_string(),
            Value::String(seed_profile.profile_name.to_string()),
        );

        let (channel, contact_value) = build_contact(&mut rng, first, last, &seed_profile.country);

        let mut patient = PatientProfile::new(
            Uuid::new_v4().to_string(),
            next_patient_code(store, &mut code_candidate).await?,
            organization.id.clone(),
        );
        patient.full_name = format!("{first} {last}");
        patient.age = seed_profile.age;
        patient.sex = seed_profile.sex.to_string();
        patient.city = seed_profile.city.clone();
        patient.country = seed_profile.country.clone();
        patient.language = pick(&mut rng, &LANGUAGES).to_string();
        patient.diagnosis = diagnosis;
        patient.stage = stage;
        patient.story = seed_profile.story.clone();
        patient.structured_profile = structured;
        patient.contact_channel = channel;
        patient.contact_value = contact_value;
        patient.consent = true;
        patient.profile_completeness = seed_profile.completeness;

        store.create_patient(&patient).await?;
        created += 1;
        *profile_distribution
            .entry(seed_profile.profile_name.to_string())
            .or_insert(0) += 1;

        if created % 100 == 0 {
            info!(created, latest = %patient.patient_code, "Generated patients");
        }
    }

    info!(created, org = org_slug, "Synthetic patient generation complete");
    Ok(SeedSummary {
        created,
        organization_slug: org_slug.to_string(),
        profile_distribution,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::{Database, LibSqlBackend};

    async fn backend() -> LibSqlBackend {
        LibSqlBackend::new(Database::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_generate_patients_is_deterministic_per_seed() {
        let a = backend().await;
        let b = backend().await;

        let summary_a = generate_patients(&a, 30, "aga-khan-demo", 42, SeedMode::Spectrum)
            .await
            .unwrap();
        let summary_b = generate_patients(&b, 30, "aga-khan-demo", 42, SeedMode::Spectrum)
            .await
            .unwrap();

        assert_eq!(summary_a.created, 30);
        assert_eq!(summary_a.profile_distribution, summary_b.profile_distribution);

        let names_a: Vec<String> = a
            .list_patients()
            .await
            .unwrap()
            .iter()
            .map(|p| p.full_name.clone())
            .collect();
        let names_b: Vec<String> = b
            .list_patients()
            .await
            .unwrap()
            .iter()
            .map(|p| p.full_name.clone())
            .collect();
        assert_eq!(names_a, names_b);
    }

    #[tokio::test]
    async fn test_generate_patients_creates_organization_once() {
        let store = backend().await;
        generate_patients(&store, 3, "aga-khan-demo", 1, SeedMode::Spectrum)
            .await
            .unwrap();
        let org = store
            .get_organization_by_slug("aga-khan-demo")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(org.name, "Aga Khan University Hospital");
        assert_eq!(org.country, "Pakistan");

        generate_patients(&store, 2, "aga-khan-demo", 2, SeedMode::Spectrum)
            .await
            .unwrap();
        let same = store
            .get_organization_by_slug("aga-khan-demo")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(same.id, org.id);
        assert_eq!(store.list_patients().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_patient_codes_are_sequential_and_unique() {
        let store = backend().await;
        generate_patients(&store, 4, "aga-khan-demo", 7, SeedMode::Random)
            .await
            .unwrap();
        let codes: Vec<String> = store
            .list_patients()
            .await
            .unwrap()
            .iter()
            .map(|p| p.patient_code.clone())
            .collect();
        assert_eq!(codes, vec!["PAT-0001", "PAT-0002", "PAT-0003", "PAT-0004"]);
    }

    #[tokio::test]
    async fn test_no_match_bucket_stays_sparse() {
        let store = backend().await;
        // Large enough that the 8% bucket is all but guaranteed to appear.
        generate_patients(&store, 120, "aga-khan-demo", 42, SeedMode::Spectrum)
            .await
            .unwrap();

        let patients = store.list_patients().await.unwrap();
        let sparse: Vec<_> = patients
            .iter()
            .filter(|p| {
                p.structured_profile
                    .extra
                    .get("seed_profile")
                    .and_then(Value::as_str)
                    == Some("no_match")
            })
            .collect();
        assert!(!sparse.is_empty());
        for patient in sparse {
            assert!(patient.diagnosis.is_empty());
            assert!(patient.stage.is_empty());
            assert!(patient.structured_profile.diagnosis.is_none());
            assert!(NO_MATCH_STORIES.contains(&patient.story.as_str()));
        }
    }

    #[tokio::test]
    async fn test_random_mode_tags_every_patient() {
        let store = backend().await;
        generate_patients(&store, 5, "aga-khan-demo", 3, SeedMode::Random)
            .await
            .unwrap();
        for patient in store.list_patients().await.unwrap() {
            assert_eq!(
                patient
                    .structured_profile
                    .extra
                    .get("seed_profile")
                    .and_then(Value::as_str),
                Some("random")
            );
            assert!(patient.consent);
            assert!(!patient.contact_value.is_empty());
        }
    }

    #[test]
    fn test_seed_mode_parse() {
        assert_eq!(SeedMode::parse("random"), SeedMode::Random);
        assert_eq!(SeedMode::parse("spectrum"), SeedMode::Spectrum);
        assert_eq!(SeedMode::parse("anything"), SeedMode::Spectrum);
    }
}
