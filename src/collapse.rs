//! Flattening of the generator's study → series → instance document.
//!
//! The generator emits
//!
//! ```json
//! { "studies": [ { "…": "…", "series": [ { "…": "…", "instances": [
//!     { "metadata": { "…": "…" }, "url": "https://…/file.dcm" } ] } ] } ] }
//! ```
//!
//! Study and series keys (other than their child collections) and every
//! instance's `metadata` are merged into one flat map. A later value for the
//! same field overwrites an earlier one. Instance URLs are collected in
//! document order.

use serde_json::{Map, Value};
use tracing::{debug, info};

/// Flat metadata for one directory plus the file URLs it applies to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collapsed {
    pub fields: Map<String, Value>,
    pub urls: Vec<String>,
}

impl Collapsed {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.urls.is_empty()
    }
}

/// Collapse a generated document. A document without `studies` yields an
/// empty result; it is not an error.
pub fn collapse(document: &Value) -> Collapsed {
    let Some(studies) = document.get("studies").and_then(Value::as_array) else {
        info!("Generated metadata has no top-level `studies`; nothing to apply");
        return Collapsed::default();
    };

    let mut collapsed = Collapsed::default();
    for study in studies.iter().filter_map(Value::as_object) {
        add_all_except(&mut collapsed.fields, study, "series");
        for series in children(study, "series") {
            add_all_except(&mut collapsed.fields, series, "instances");
            for instance in children(series, "instances") {
                match instance.get("metadata").and_then(Value::as_object) {
                    Some(metadata) => collapsed
                        .fields
                        .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone()))),
                    None => debug!("Instance without a `metadata` object"),
                }
                match instance.get("url").and_then(Value::as_str) {
                    Some(url) => collapsed.urls.push(url.to_string()),
                    None => debug!("Instance without a `url`"),
                }
            }
        }
    }
    collapsed
}

fn add_all_except(to: &mut Map<String, Value>, from: &Map<String, Value>, skip_key: &str) {
    for (key, value) in from {
        if key != skip_key {
            to.insert(key.clone(), value.clone());
        }
    }
}

fn children<'a>(
    parent: &'a Map<String, Value>,
    key: &str,
) -> impl Iterator<Item = &'a Map<String, Value>> {
    parent
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_studies_is_empty() {
        assert!(collapse(&json!({})).is_empty());
        assert!(collapse(&json!({"study": []})).is_empty());
        assert!(collapse(&json!({"studies": "nope"})).is_empty());
        assert!(collapse(&json!([1, 2, 3])).is_empty());
    }

    #[test]
    fn flattens_all_levels_in_order() {
        let doc = json!({"studies": [{
            "patient": "X",
            "series": [{
                "modality": "CT",
                "instances": [
                    {
                        "metadata": {"AccessionNumber": "", "ImageType": ["A", "B"]},
                        "url": "http://x/f1.dcm"
                    },
                    {"metadata": {"ImageType": ["A", "B"]}, "url": "http://x/f2.dcm"}
                ]
            }]
        }]});

        let collapsed = collapse(&doc);
        assert_eq!(collapsed.urls, vec!["http://x/f1.dcm", "http://x/f2.dcm"]);
        assert_eq!(collapsed.fields["patient"], json!("X"));
        assert_eq!(collapsed.fields["modality"], json!("CT"));
        assert_eq!(collapsed.fields["ImageType"], json!(["A", "B"]));
        assert_eq!(collapsed.fields["AccessionNumber"], json!(""));
        assert!(!collapsed.fields.contains_key("series"));
        assert!(!collapsed.fields.contains_key("instances"));
    }

    #[test]
    fn last_write_wins_across_series_and_studies() {
        let doc = json!({"studies": [
            {"StudyDate": "20200101", "series": [
                {
                    "SeriesNumber": 1,
                    "instances": [{"metadata": {"SliceThickness": 1}, "url": "u1"}]
                },
                {"SeriesNumber": 2, "instances": [{"metadata": {"SliceThickness": 2}, "url": "u2"}]}
            ]},
            {"StudyDate": "20210101", "series": []}
        ]});

        let collapsed = collapse(&doc);
        assert_eq!(collapsed.fields["SeriesNumber"], json!(2));
        assert_eq!(collapsed.fields["SliceThickness"], json!(2));
        assert_eq!(collapsed.fields["StudyDate"], json!("20210101"));
        assert_eq!(collapsed.urls, vec!["u1", "u2"]);
    }

    #[test]
    fn tolerates_missing_children() {
        let doc = json!({"studies": [
            {"A": 1},
            {"series": [{"B": 2}, "junk", {"instances": [{"url": "u"}, {"metadata": {"C": 3}}]}]}
        ]});

        let collapsed = collapse(&doc);
        assert_eq!(collapsed.fields.len(), 3);
        assert_eq!(collapsed.urls, vec!["u"]);
    }
}
