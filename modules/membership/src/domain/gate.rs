//! Consent gate rules: agreement ordering, latest-record status, contract
//! item merging and the tamper-evident checksum.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};
use sha2::{Digest, Sha256};

use crate::contract::model::{AgreementKind, AgreementState, ConsentItem, ConsentRecord};

/// Agreements a member must accept in this order before using the site.
pub const ORDERED_AGREEMENTS: [AgreementKind; 3] = [
    AgreementKind::PrivacyPolicy,
    AgreementKind::MemberSiteTerms,
    AgreementKind::ToolTerms,
];

/// Most recent record of `kind` by `agreed_at`. Ties go to the later entry.
pub fn latest_record(records: &[ConsentRecord], kind: AgreementKind) -> Option<&ConsentRecord> {
    records
        .iter()
        .filter(|r| r.kind == kind)
        .max_by_key(|r| r.agreed_at)
}

pub fn agreement_state(
    records: &[ConsentRecord],
    kind: AgreementKind,
    offset: FixedOffset,
) -> AgreementState {
    match latest_record(records, kind) {
        Some(r) if r.agreed => AgreementState {
            agreed: true,
            agreed_at: Some(r.agreed_at),
            agreed_date: Some(format_display_date(r.agreed_at, offset)),
        },
        _ => AgreementState::default(),
    }
}

/// First ordered agreement whose latest record is not agreed.
pub fn next_outstanding(records: &[ConsentRecord]) -> Option<AgreementKind> {
    ORDERED_AGREEMENTS
        .into_iter()
        .find(|kind| !latest_record(records, *kind).is_some_and(|r| r.agreed))
}

/// Member-facing date, e.g. `2026年1月15日`.
pub fn format_display_date(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%Y年%-m月%-d日").to_string()
}

/// `sha256("{version}|{display_date}")`, hex encoded.
pub fn consent_checksum(version: &str, display_date: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(version.as_bytes());
    hasher.update(b"|");
    hasher.update(display_date.as_bytes());
    hex::encode(hasher.finalize())
}

/// True once every required item is present and agreed. With no required
/// items configured, a non-empty map with every entry agreed counts.
pub fn contract_complete(items: &BTreeMap<String, ConsentItem>, required: &[String]) -> bool {
    if required.is_empty() {
        return !items.is_empty() && items.values().all(|i| i.agreed);
    }
    required
        .iter()
        .all(|name| items.get(name).is_some_and(|i| i.agreed))
}

/// Accumulate submitted items onto the previous state. Items only ever go
/// from unagreed to agreed; each newly agreed item is stamped with `now`.
pub fn merge_contract_items(
    previous: Option<&BTreeMap<String, ConsentItem>>,
    submitted: &BTreeMap<String, bool>,
    required: &[String],
    now: DateTime<Utc>,
) -> BTreeMap<String, ConsentItem> {
    let mut merged = previous.cloned().unwrap_or_default();
    for name in required {
        merged.entry(name.clone()).or_insert(ConsentItem {
            agreed: false,
            agreed_at: None,
        });
    }
    for (name, agreed) in submitted {
        let entry = merged.entry(name.clone()).or_insert(ConsentItem {
            agreed: false,
            agreed_at: None,
        });
        if *agreed && !entry.agreed {
            entry.agreed = true;
            entry.agreed_at = Some(now);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::model::{Actor, ClientEnvironment};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn record(kind: AgreementKind, agreed: bool, at: DateTime<Utc>) -> ConsentRecord {
        ConsentRecord {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            kind,
            version: "1.0".into(),
            agreed,
            agreed_at: at,
            actor: Actor {
                user_id: "u1".into(),
                email: "u1@example.com".into(),
                role: "member".into(),
            },
            environment: ClientEnvironment::default(),
            checksum: String::new(),
            items: BTreeMap::new(),
            dates: None,
        }
    }

    fn required() -> Vec<String> {
        vec!["contractTerms".into(), "paymentTerms".into()]
    }

    #[test]
    fn next_outstanding_follows_fixed_order() {
        let t = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let mut records = vec![];
        assert_eq!(next_outstanding(&records), Some(AgreementKind::PrivacyPolicy));

        // agreeing out of order does not skip the earlier step
        records.push(record(AgreementKind::ToolTerms, true, t));
        assert_eq!(next_outstanding(&records), Some(AgreementKind::PrivacyPolicy));

        records.push(record(AgreementKind::PrivacyPolicy, true, t));
        assert_eq!(next_outstanding(&records), Some(AgreementKind::MemberSiteTerms));

        records.push(record(AgreementKind::MemberSiteTerms, true, t));
        assert_eq!(next_outstanding(&records), None);

        // onboarding kinds never appear
        records.push(record(AgreementKind::Contract, false, t));
        assert_eq!(next_outstanding(&records), None);
    }

    #[test]
    fn latest_record_decides_status() {
        let early = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let records = vec![
            record(AgreementKind::PrivacyPolicy, true, late),
            record(AgreementKind::PrivacyPolicy, false, early),
        ];
        let state = agreement_state(&records, AgreementKind::PrivacyPolicy, jst());
        assert!(state.agreed);
        assert_eq!(state.agreed_at, Some(late));
        assert_eq!(state.agreed_date.as_deref(), Some("2026年1月2日"));
    }

    #[test]
    fn display_date_uses_offset() {
        // 2026-01-14T20:00Z is already the 15th at +09:00
        let at = Utc.with_ymd_and_hms(2026, 1, 14, 20, 0, 0).unwrap();
        assert_eq!(format_display_date(at, jst()), "2026年1月15日");
        assert_eq!(
            format_display_date(at, FixedOffset::east_opt(0).unwrap()),
            "2026年1月14日"
        );
    }

    #[test]
    fn checksum_is_stable_and_input_sensitive() {
        let a = consent_checksum("1.0", "2026年1月15日");
        assert_eq!(a.len(), 64);
        assert_eq!(a, consent_checksum("1.0", "2026年1月15日"));
        assert_ne!(a, consent_checksum("1.1", "2026年1月15日"));
        assert_ne!(a, consent_checksum("1.0", "2026年1月16日"));
    }

    #[test]
    fn partial_contract_items_accumulate() {
        let t1 = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 11, 0, 0, 0).unwrap();

        let first = merge_contract_items(
            None,
            &BTreeMap::from([("contractTerms".to_string(), true)]),
            &required(),
            t1,
        );
        assert!(!contract_complete(&first, &required()));
        assert!(!first["paymentTerms"].agreed);

        let second = merge_contract_items(
            Some(&first),
            &BTreeMap::from([
                ("contractTerms".to_string(), false),
                ("paymentTerms".to_string(), true),
            ]),
            &required(),
            t2,
        );
        assert!(contract_complete(&second, &required()));
        // earlier stamp is kept and a false never revokes
        assert_eq!(second["contractTerms"].agreed_at, Some(t1));
        assert_eq!(second["paymentTerms"].agreed_at, Some(t2));
    }

    #[test]
    fn completeness_without_required_items() {
        let t = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        assert!(!contract_complete(&BTreeMap::new(), &[]));
        let items = merge_contract_items(None, &BTreeMap::from([("x".to_string(), true)]), &[], t);
        assert!(contract_complete(&items, &[]));
    }
}
