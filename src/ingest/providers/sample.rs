// src/ingest/providers/sample.rs
//! Fixed, deterministic placeholder datasets. Only served when the caller asks
//! for sample mode; every record carries a sample provenance tag.

use serde_json::json;

use crate::ingest::normalize::normalize_batch;
use crate::ingest::types::{CanonicalTrial, Provenance, RawRecord, Registry, ScrapedRow};

/// Sample studies in the structured API's nested shape.
pub fn ctgov_sample() -> Vec<CanonicalTrial> {
    let raw = [
        json!({
            "protocolSection": {
                "identificationModule": {
                    "nctId": "NCT90000001",
                    "briefTitle": "Wearable ECG Patch for Atrial Fibrillation Screening",
                    "officialTitle": "A Randomized Study of a Wearable ECG Patch for Early Detection of Atrial Fibrillation"
                },
                "statusModule": {
                    "overallStatus": "RECRUITING",
                    "startDateStruct": { "date": "2024-03-01" },
                    "completionDateStruct": { "date": "2026-09" }
                },
                "designModule": { "studyType": "INTERVENTIONAL" },
                "conditionsModule": { "conditions": ["Atrial Fibrillation"] },
                "sponsorCollaboratorsModule": { "leadSponsor": { "name": "Cardio Sample Labs" } }
            }
        }),
        json!({
            "protocolSection": {
                "identificationModule": {
                    "nctId": "NCT90000002",
                    "briefTitle": "Closed-Loop Insulin Delivery in Adolescents"
                },
                "statusModule": {
                    "overallStatus": "ACTIVE_NOT_RECRUITING",
                    "startDateStruct": { "date": "2023-05" },
                    "completionDateStruct": { "date": "2025-12" }
                },
                "designModule": { "studyType": "INTERVENTIONAL" },
                "conditionsModule": { "conditions": ["Type 1 Diabetes"] },
                "sponsorCollaboratorsModule": { "leadSponsor": { "name": "Sample Endocrine Institute" } }
            }
        }),
        json!({
            "protocolSection": {
                "identificationModule": {
                    "nctId": "NCT90000003",
                    "briefTitle": "Robotic-Assisted Knee Arthroplasty Outcomes"
                },
                "statusModule": {
                    "overallStatus": "COMPLETED",
                    "startDateStruct": { "date": "2021-02-15" },
                    "completionDateStruct": { "date": "2023-11-30" }
                },
                "designModule": { "studyType": "INTERVENTIONAL" },
                "conditionsModule": { "conditions": ["Osteoarthritis, Knee", "Arthroplasty"] },
                "sponsorCollaboratorsModule": { "leadSponsor": { "name": "Ortho Sample Group" } }
            }
        }),
    ];
    let records: Vec<RawRecord> = raw.into_iter().map(RawRecord::Nested).collect();
    normalize_batch(&records, Provenance::sample(Registry::ClinicalTrialsGov)).0
}

/// Sample entries in the scraped registry's flat shape.
pub fn euctr_sample() -> Vec<CanonicalTrial> {
    let rows = [
        ScrapedRow {
            eudract_id: Some("2022-001234-56".into()),
            public_title: Some("A study on the use of a new medical device for joint repair".into()),
            condition: Some("Osteoarthritis".into()),
            study_type: Some("Interventional trial".into()),
            status: Some("Recruiting".into()),
            start_date: Some("2022-05-15".into()),
            completion_date: Some("2024-12-31".into()),
            main_sponsor: Some("Wapyrus Innovations".into()),
        },
        ScrapedRow {
            eudract_id: Some("2021-004321-10".into()),
            public_title: Some("Implantable neurostimulator for refractory migraine".into()),
            condition: Some("Migraine; Chronic headache".into()),
            study_type: Some("Interventional trial".into()),
            status: Some("Ongoing".into()),
            start_date: Some("2021-09-01".into()),
            completion_date: Some("2025-03-31".into()),
            main_sponsor: Some("Sample Neuro GmbH".into()),
        },
    ];
    let records: Vec<RawRecord> = rows.into_iter().map(RawRecord::Scraped).collect();
    normalize_batch(&records, Provenance::sample(Registry::EuCtr)).0
}
