//! Submission document to typed record extraction

use tracing::debug;

use crate::aggregate::RawDocument;
use crate::document::{self, Element, OPENROSA_NS, SUBMISSIONS_NS};
use crate::error::{Result, SyncError};
use crate::record::{ExtractedRecord, FieldValue};
use crate::schema::{BlockMatch, EntitySchema, FieldKind, FieldSource, FieldSpec};

/// Applies one entity schema to submission envelopes
#[derive(Debug, Clone, Copy)]
pub struct RecordExtractor<'a> {
    schema: &'a EntitySchema,
}

impl<'a> RecordExtractor<'a> {
    pub fn new(schema: &'a EntitySchema) -> Self {
        Self { schema }
    }

    pub fn extract(&self, raw: &RawDocument) -> Result<ExtractedRecord> {
        let root = document::parse(&raw.body)?;
        self.extract_from(&root)
    }

    /// Extract from an already parsed envelope
    pub fn extract_from(&self, root: &Element) -> Result<ExtractedRecord> {
        let block = self.locate_block(root).ok_or_else(|| {
            SyncError::malformed(format!(
                "no '{}' data block in submission",
                self.schema.block_tag
            ))
        })?;

        let instance_id = block
            .attr("instanceID")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::malformed("data block has no instanceID attribute"))?;

        let meta = block
            .child(OPENROSA_NS, "meta")
            .or_else(|| block.descendants(OPENROSA_NS, "meta").into_iter().next());

        let row_id = meta
            .and_then(|m| m.child(OPENROSA_NS, "rowID"))
            .and_then(Element::text)
            .map(str::to_string);

        let mut record = ExtractedRecord::new(&self.schema.key_column, instance_id)
            .with(&self.schema.row_id_column, FieldValue::from(row_id));

        for field in &self.schema.fields {
            let text = field_text(block, meta, field);
            match &field.kind {
                FieldKind::Geopoint(columns) => {
                    let parts = parse_geopoint(text);
                    for (column, value) in columns.as_array().into_iter().zip(parts) {
                        record.set(column, FieldValue::from(value));
                    }
                },
                kind => {
                    let column = field.column.as_deref().unwrap_or(field.tag.as_str());
                    let value = match (text, &field.default) {
                        (None, Some(default)) => kind.coerce_default(default),
                        (None, None) => FieldValue::Null,
                        (Some(text), _) => coerce(kind, text),
                    };
                    if value.is_null() && text.is_some() {
                        debug!(field = %field.tag, value = ?text, "Unparsable numeric value");
                    }
                    record.set(column, value);
                },
            }
        }

        Ok(record)
    }

    fn locate_block<'e>(&self, root: &'e Element) -> Option<&'e Element> {
        let mut candidates = Vec::new();
        for outer in std::iter::once(root).chain(root.descendants(SUBMISSIONS_NS, "data")) {
            if !outer.is(SUBMISSIONS_NS, "data") {
                continue;
            }
            candidates.extend(outer.children.iter().filter(|c| c.is(SUBMISSIONS_NS, "data")));
        }

        let exact = candidates
            .iter()
            .copied()
            .find(|block| block.attr("id") == Some(self.schema.block_tag.as_str()));

        match (exact, self.schema.block_match) {
            (Some(block), _) => Some(block),
            (None, BlockMatch::FirstBlockFallback) => candidates.first().copied(),
            (None, BlockMatch::Strict) => None,
        }
    }
}

fn field_text<'e>(block: &'e Element, meta: Option<&'e Element>, field: &FieldSpec) -> Option<&'e str> {
    let element = match field.source {
        FieldSource::Data => block.child(SUBMISSIONS_NS, &field.tag),
        FieldSource::Meta => meta.and_then(|m| m.child(OPENROSA_NS, &field.tag)),
    };
    element.and_then(Element::text)
}

fn coerce(kind: &FieldKind, text: &str) -> FieldValue {
    match kind {
        FieldKind::Text => FieldValue::Text(text.to_string()),
        FieldKind::Integer => FieldValue::from(parse_integer(text)),
        FieldKind::Float => FieldValue::from(parse_float(text)),
        FieldKind::Geopoint(_) => FieldValue::Null,
    }
}

fn parse_float(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integers also accept integral decimals such as "3.0"
fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>().ok().or_else(|| {
        parse_float(text)
            .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
            .map(|v| v as i64)
    })
}

/// Split "lat lon [alt [acc]]" into four positional values
///
/// Missing trailing tokens stay `None`. Any non-numeric token among the
/// first four voids the whole point.
pub fn parse_geopoint(text: Option<&str>) -> [Option<f64>; 4] {
    let mut parts = [None; 4];
    let Some(text) = text else {
        return parts;
    };

    for (slot, token) in parts.iter_mut().zip(text.split_whitespace()) {
        match parse_float(token) {
            Some(value) => *slot = Some(value),
            None => return [None; 4],
        }
    }
    parts
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::SchemaCatalog;

    fn envelope(block_id: &str, body: &str) -> RawDocument {
        RawDocument {
            submission_id: "uuid:1".to_string(),
            body: format!(
                r#"<submission xmlns="http://opendatakit.org/submissions" xmlns:orx="http://openrosa.org/xforms">
                    <data>
                        <data id="{}" instanceID="uuid:1">
                            <orx:meta>
                                <orx:instanceID>uuid:1</orx:instanceID>
                                <orx:rowID>row-1</orx:rowID>
                                <orx:savepointTimestamp>2025-02-01T10:00:00Z</orx:savepointTimestamp>
                            </orx:meta>
                            {}
                        </data>
                    </data>
                </submission>"#,
                block_id, body
            ),
        }
    }

    fn schema(name: &str) -> EntitySchema {
        SchemaCatalog::builtin().get(name).unwrap().clone()
    }

    #[test]
    fn test_geopoint_two_tokens() {
        assert_eq!(
            parse_geopoint(Some("1.5 2.5")),
            [Some(1.5), Some(2.5), None, None]
        );
    }

    #[test]
    fn test_geopoint_bad_data() {
        assert_eq!(parse_geopoint(Some("bad data")), [None; 4]);
        assert_eq!(parse_geopoint(Some("1.5 2.5 x 4")), [None; 4]);
        assert_eq!(parse_geopoint(None), [None; 4]);
    }

    #[test]
    fn test_geopoint_ignores_extra_tokens() {
        assert_eq!(
            parse_geopoint(Some("-1.25 36.8 1650 4.5 extra")),
            [Some(-1.25), Some(36.8), Some(1650.0), Some(4.5)]
        );
    }

    #[test]
    fn test_extract_census_with_defaults() {
        let schema = schema("census");
        let raw = envelope(
            "census",
            "<placeName> Kisumu </placeName><location>0.1 34.7</location><selected>1</selected><houseNumber></houseNumber>",
        );

        let record = RecordExtractor::new(&schema).extract(&raw).unwrap();

        assert_eq!(record.key_column(), "instanceID");
        assert_eq!(record.instance_id(), "uuid:1");
        assert_eq!(record.get("rowID"), Some(&FieldValue::Text("row-1".into())));
        assert_eq!(record.get("placeName"), Some(&FieldValue::Text("Kisumu".into())));
        assert_eq!(record.get("houseNumber"), Some(&FieldValue::Null));
        assert_eq!(record.get("latitude"), Some(&FieldValue::Float(0.1)));
        assert_eq!(record.get("altitude"), Some(&FieldValue::Null));
        assert_eq!(record.get("selected"), Some(&FieldValue::Integer(1)));
        assert_eq!(record.get("valid"), Some(&FieldValue::Integer(0)));
        assert_eq!(record.get("random"), Some(&FieldValue::Float(0.0)));
    }

    #[test]
    fn test_numeric_failure_is_null_not_default() {
        let schema = schema("census");
        let raw = envelope("census", "<selected>yes</selected><random>0.42</random>");

        let record = RecordExtractor::new(&schema).extract(&raw).unwrap();

        assert_eq!(record.get("selected"), Some(&FieldValue::Null));
        assert_eq!(record.get("random"), Some(&FieldValue::Float(0.42)));
    }

    #[test]
    fn test_integer_accepts_integral_decimal() {
        let schema = schema("member");
        let raw = envelope(
            "household_member",
            "<age_in_years>34.0</age_in_years><age_in_months>2.5</age_in_months>",
        );

        let record = RecordExtractor::new(&schema).extract(&raw).unwrap();

        assert_eq!(record.get("age_in_years"), Some(&FieldValue::Integer(34)));
        assert_eq!(record.get("age_in_months"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_meta_field() {
        let schema = schema("household");
        let raw = envelope("household", "<region>Western</region>");

        let record = RecordExtractor::new(&schema).extract(&raw).unwrap();

        assert_eq!(
            record.get("savepointtimestamp"),
            Some(&FieldValue::Text("2025-02-01T10:00:00Z".into()))
        );
        assert_eq!(record.get("region"), Some(&FieldValue::Text("Western".into())));
    }

    #[test]
    fn test_strict_entity_rejects_mismatched_block() {
        let schema = schema("household");
        let raw = envelope("household_v2", "<region>Western</region>");

        let err = RecordExtractor::new(&schema).extract(&raw).unwrap_err();
        assert!(matches!(err, SyncError::MalformedDocument(_)));
    }

    #[test]
    fn test_fallback_entity_takes_first_block() {
        let schema = schema("net");
        let raw = envelope("net_2025", "<household_id>HH-7</household_id>");

        let record = RecordExtractor::new(&schema).extract(&raw).unwrap();
        assert_eq!(record.get("household_id"), Some(&FieldValue::Text("HH-7".into())));
    }

    #[test]
    fn test_missing_instance_id() {
        let schema = schema("child");
        let raw = RawDocument {
            submission_id: "x".to_string(),
            body: r#"<submission xmlns="http://opendatakit.org/submissions"><data><data id="child"><mother_id>M1</mother_id></data></data></submission>"#.to_string(),
        };

        let err = RecordExtractor::new(&schema).extract(&raw).unwrap_err();
        assert!(matches!(err, SyncError::MalformedDocument(_)));
    }

    #[test]
    fn test_missing_meta_gives_null_row_id() {
        let schema = schema("visit");
        let raw = RawDocument {
            submission_id: "x".to_string(),
            body: r#"<submission xmlns="http://opendatakit.org/submissions"><data><data id="visit" instanceID="uuid:v"><visit_number>2</visit_number></data></data></submission>"#.to_string(),
        };

        let record = RecordExtractor::new(&schema).extract(&raw).unwrap();
        assert_eq!(record.get("rowid"), Some(&FieldValue::Null));
        assert_eq!(record.get("visit_number"), Some(&FieldValue::Text("2".into())));
    }
}
