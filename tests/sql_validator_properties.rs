//! Property tests for the safety validator, title tiers and update merging
//!
//! Run: cargo test --test sql_validator_properties

use proptest::prelude::*;

use icp_query::config::TitleTierConfig;
use icp_query::sql::{strip_comments, SqlSafetyValidator, UnsafeSql};
use icp_query::workflow::extraction::{apply_extraction, RawExtraction};
use icp_query::workflow::{ExtractedInfo, Field, FieldValue, Tier, TitleTierResolver};

const COLUMNS: [&str; 4] = ["geography", "industry", "title_tier", "employee_size"];

const WRITES: [&str; 6] = [
    "INSERT INTO icp_data VALUES (1)",
    "UPDATE icp_data SET industry = '7342'",
    "DELETE FROM icp_data",
    "DROP TABLE icp_data",
    "TRUNCATE icp_data",
    "ALTER TABLE icp_data ADD COLUMN x INT",
];

fn arb_field_value() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        Just(FieldValue::Unset),
        Just(FieldValue::Cleared),
        "[A-Za-z ]{1,12}".prop_map(|v| FieldValue::Value(v.trim().to_string())),
    ]
}

fn arb_extracted() -> impl Strategy<Value = ExtractedInfo> {
    prop::collection::vec(arb_field_value(), 7).prop_map(|values| {
        let mut info = ExtractedInfo::default();
        for (field, value) in Field::ALL.into_iter().zip(values) {
            info.set(field, value);
        }
        info
    })
}

fn arb_raw() -> impl Strategy<Value = RawExtraction> {
    (
        prop::collection::vec(prop::option::of("[A-Za-z]{1,10}"), 7),
        prop::collection::vec(any::<bool>(), 7),
    )
        .prop_map(|(values, mentioned)| RawExtraction {
            geography: values[0].clone(),
            industry: values[1].clone(),
            target_customer_type: values[2].clone(),
            title: values[3].clone(),
            employee_size: values[4].clone(),
            square_footage: values[5].clone(),
            sales_volume: values[6].clone(),
            geography_mentioned: mentioned[0],
            industry_mentioned: mentioned[1],
            target_customer_type_mentioned: mentioned[2],
            title_mentioned: mentioned[3],
            employee_size_mentioned: mentioned[4],
            square_footage_mentioned: mentioned[5],
            sales_volume_mentioned: mentioned[6],
        })
}

proptest! {
    #[test]
    fn strip_comments_is_idempotent(sql in "[ -~\n]{0,60}") {
        let once = strip_comments(&sql);
        prop_assert_eq!(strip_comments(&once), once);
    }

    #[test]
    fn two_statements_are_rejected(
        a in "[a-z]{1,8}",
        b in "[a-z]{1,8}",
        trailing in prop::bool::ANY,
    ) {
        let sql = format!(
            "SELECT {a} FROM t; SELECT {b} FROM u{}",
            if trailing { ";" } else { "" }
        );
        let result = SqlSafetyValidator::new().validate(&sql);
        prop_assert!(
            matches!(result, Err(UnsafeSql::MultipleStatements { .. })),
            "{:?}", result
        );
    }

    #[test]
    fn writes_are_rejected_up_front(
        index in 0..WRITES.len(),
        padding in "[ \t\n]{0,3}",
    ) {
        let sql = format!("{}{}", padding, WRITES[index]);
        prop_assert_eq!(SqlSafetyValidator::new().validate(&sql), Err(UnsafeSql::NotSelect));
    }

    #[test]
    fn literal_filters_pass(
        index in 0..COLUMNS.len(),
        value in "[A-Za-z ]{0,12}",
        terminated in prop::bool::ANY,
    ) {
        let sql = format!(
            "SELECT * FROM icp_data WHERE {} = '{}'{}",
            COLUMNS[index],
            value,
            if terminated { ";" } else { "" }
        );
        prop_assert_eq!(SqlSafetyValidator::new().validate(&sql), Ok(()));
    }

    #[test]
    fn owner_titles_are_tier_one(prefix in "[a-z ]{0,8}", suffix in "[a-z ]{0,8}") {
        let resolver = TitleTierResolver::new(&TitleTierConfig::default());
        let title = format!("{}owner{}", prefix, suffix);
        prop_assert_eq!(resolver.match_tier(&title), Some(Tier::I));
    }

    #[test]
    fn update_preserves_unmentioned_fields(prior in arb_extracted(), raw in arb_raw()) {
        let (next, mentioned) = apply_extraction(&prior, &raw, true, "please adjust");
        for field in Field::ALL {
            if raw.mentioned(field) {
                prop_assert!(mentioned.contains(&field));
            } else {
                prop_assert!(!mentioned.contains(&field));
                prop_assert_eq!(next.get(field), prior.get(field));
            }
        }
    }
}
