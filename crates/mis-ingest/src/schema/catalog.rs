//! Built-in schemas for the MIS survey forms

use super::{BlockMatch, DedupRules, EntitySchema, FieldSpec};
use crate::record::FieldValue;

fn entity(
    name: &str,
    form_id: &str,
    block_match: BlockMatch,
    fields: Vec<FieldSpec>,
) -> EntitySchema {
    EntitySchema {
        name: name.to_string(),
        form_id: form_id.to_string(),
        block_tag: form_id.to_string(),
        tracking_table: format!("{}ids", name),
        destination_table: name.to_string(),
        key_column: "instanceid".to_string(),
        row_id_column: "rowid".to_string(),
        block_match,
        fields,
        dedup: None,
    }
}

/// census, household, member, net, child, visit, in dependency order
pub fn builtin_entities() -> Vec<EntitySchema> {
    vec![census(), household(), member(), net(), child(), visit()]
}

fn census() -> EntitySchema {
    let mut schema = entity(
        "census",
        "census",
        BlockMatch::Strict,
        vec![
            FieldSpec::text("createdDate"),
            FieldSpec::text("dateLastSelected"),
            FieldSpec::text("deviceId"),
            FieldSpec::text("excluded"),
            FieldSpec::text("placeName"),
            FieldSpec::text("headName"),
            FieldSpec::text("houseNumber"),
            FieldSpec::geopoint("location"),
            FieldSpec::float("random").or_default(FieldValue::Float(0.0)),
            FieldSpec::integer("selected").or_default(FieldValue::Integer(0)),
            FieldSpec::integer("valid").or_default(FieldValue::Integer(0)),
            FieldSpec::float("sampleFrame").or_default(FieldValue::Float(0.0)),
        ],
    );
    schema.key_column = "instanceID".to_string();
    schema.row_id_column = "rowID".to_string();
    schema.dedup = Some(DedupRules {
        selected_column: "selected".to_string(),
        random_column: "random".to_string(),
    });
    schema
}

fn household() -> EntitySchema {
    entity(
        "household",
        "household",
        BlockMatch::Strict,
        vec![
            FieldSpec::text("savepointTimestamp")
                .from_meta()
                .into_column("savepointtimestamp"),
            FieldSpec::text("region"),
            FieldSpec::text("zone"),
            FieldSpec::text("district"),
            FieldSpec::text("ea"),
            FieldSpec::geopoint("gps_location"),
            FieldSpec::text("data_collector"),
            FieldSpec::text("data_collector_name"),
            FieldSpec::text("have_nets"),
            FieldSpec::text("how_many_nets"),
            FieldSpec::text("is_consent_given"),
            FieldSpec::text("hh_quest_start_time"),
            FieldSpec::text("hh_quest_end_time"),
        ],
    )
}

fn member() -> EntitySchema {
    entity(
        "member",
        "household_member",
        BlockMatch::Strict,
        vec![
            FieldSpec::text("household_id"),
            FieldSpec::integer("age_in_years"),
            FieldSpec::integer("age_in_months"),
            FieldSpec::integer("age_in_days"),
            FieldSpec::text("gender"),
            FieldSpec::text("sleep_under_net"),
            FieldSpec::text("which_net"),
            FieldSpec::text("is_consent_given"),
            FieldSpec::text("is_present_4_test"),
            FieldSpec::text("is_haemo_measured"),
            FieldSpec::text("rdt_result"),
            FieldSpec::text("blood_slide"),
            FieldSpec::text("dbs"),
            FieldSpec::text("is_woman_consent_given"),
            FieldSpec::text("is_pregnant_now"),
            FieldSpec::text("woman_quest_start_time"),
            FieldSpec::text("woman_quest_end_time"),
        ],
    )
}

fn net() -> EntitySchema {
    entity(
        "net",
        "net",
        BlockMatch::FirstBlockFallback,
        vec![
            FieldSpec::text("household_id"),
            FieldSpec::text("any_one_sleep_under_this_net"),
        ],
    )
}

fn child() -> EntitySchema {
    entity(
        "child",
        "child",
        BlockMatch::FirstBlockFallback,
        vec![FieldSpec::text("household_id"), FieldSpec::text("mother_id")],
    )
}

fn visit() -> EntitySchema {
    entity(
        "visit",
        "visit",
        BlockMatch::FirstBlockFallback,
        vec![
            FieldSpec::text("household_id"),
            FieldSpec::text("visit_number"),
            FieldSpec::text("visit_result"),
        ],
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_member_uses_household_member_form() {
        let member = member();
        assert_eq!(member.form_id, "household_member");
        assert_eq!(member.block_tag, "household_member");
        assert_eq!(member.tracking_table, "memberids");
        assert_eq!(member.destination_table, "member");
    }

    #[test]
    fn test_census_keys_and_defaults() {
        let census = census();
        assert_eq!(census.key_column, "instanceID");
        assert_eq!(census.row_id_column, "rowID");

        let selected = census.fields.iter().find(|f| f.tag == "selected").unwrap();
        assert_eq!(selected.default, Some(FieldValue::Integer(0)));
    }
}
