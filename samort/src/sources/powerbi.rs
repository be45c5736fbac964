//! Minimal client-side support for the public PowerBI `querydata` endpoint:
//! building a `SemanticQueryDataShapeCommand` payload and inflating the
//! compressed DSR rows that come back.

use anyhow::{Context, Result};
use serde_json::{json, Value};

/// A table of the report's data model, bound to a short alias in the query.
#[derive(Clone, Copy, Debug)]
pub struct TableRef {
    pub name: &'static str,
    pub entity: &'static str,
}

/// A plain column projection: `alias.property`.
pub fn column(table: &TableRef, property: &str) -> Value {
    json!({
        "Column": {
            "Expression": { "SourceRef": { "Source": table.name } },
            "Property": property,
        },
        "Name": format!("{}.{}", table.entity, property),
    })
}

/// A model measure projection.
pub fn measure(table: &TableRef, property: &str) -> Value {
    json!({
        "Measure": {
            "Expression": { "SourceRef": { "Source": table.name } },
            "Property": property,
        },
        "Name": format!("{}.{}", table.entity, property),
    })
}

/// `alias.column >= literal` (kind 2) or `> literal` (kind 1), matching the
/// endpoint's ComparisonKind values.
pub fn where_comparison(target: Value, literal: &str, kind: u8) -> Value {
    json!({
        "Condition": {
            "Comparison": {
                "ComparisonKind": kind,
                "Left": target,
                "Right": { "Literal": { "Value": literal } },
            }
        }
    })
}

/// `alias.column IN (literal)`.
pub fn where_in(table: &TableRef, property: &str, literal: &str) -> Value {
    json!({
        "Condition": {
            "In": {
                "Expressions": [{
                    "Column": {
                        "Expression": { "SourceRef": { "Source": table.name } },
                        "Property": property,
                    }
                }],
                "Values": [[{ "Literal": { "Value": literal } }]],
            }
        }
    })
}

pub struct Connection {
    pub dataset_id: &'static str,
    pub report_id: &'static str,
    pub visual_id: &'static str,
    pub model_id: u64,
}

/// Assemble the full `querydata` POST body.
pub fn build_query(
    connection: &Connection,
    from: &[TableRef],
    select: Vec<Value>,
    where_clauses: Vec<Value>,
) -> Value {
    let from: Vec<Value> = from
        .iter()
        .map(|t| json!({ "Name": t.name, "Entity": t.entity, "Type": 0 }))
        .collect();
    let projections: Vec<usize> = (0..select.len()).collect();
    json!({
        "version": "1.0.0",
        "queries": [{
            "Query": {
                "Commands": [{
                    "SemanticQueryDataShapeCommand": {
                        "Query": {
                            "Version": 2,
                            "From": from,
                            "Select": select,
                            "Where": where_clauses,
                        },
                        "Binding": {
                            "Primary": { "Groupings": [{ "Projections": projections }] },
                            "DataReduction": {
                                "DataVolume": 4,
                                "Primary": { "Window": { "Count": 500000 } },
                            },
                            "Version": 1,
                        },
                    }
                }]
            },
            "ApplicationContext": {
                "DatasetId": connection.dataset_id,
                "Sources": [{
                    "ReportId": connection.report_id,
                    "VisualId": connection.visual_id,
                }],
            },
        }],
        "cancelQueries": [],
        "modelId": connection.model_id,
    })
}

/// Inflate the DSR row encoding into one `Value` per cell.
///
/// Each `DM0` entry carries the changed cells in `C`; bit `i` of `R` means
/// column `i` repeats the previous row, bit `i` of `Ø` means it is null.
/// Dictionary-encoded columns (named by `DN` in the select descriptor) carry
/// indices into `ValueDicts`, resolved here.
pub fn inflate(response: &Value) -> Result<Vec<Vec<Value>>> {
    let data = response
        .pointer("/results/0/result/data")
        .context("malformed querydata response")?;
    let dict_names: Vec<Option<String>> = data
        .pointer("/descriptor/Select")
        .and_then(Value::as_array)
        .context("querydata response has no select descriptor")?
        .iter()
        .map(|s| s.get("DN").and_then(Value::as_str).map(str::to_string))
        .collect();
    let columns = dict_names.len();
    let value_dicts = data
        .pointer("/dsr/DS/0/ValueDicts")
        .cloned()
        .unwrap_or_else(|| json!({}));
    let entries = data
        .pointer("/dsr/DS/0/PH/0/DM0")
        .and_then(Value::as_array)
        .context("querydata response has no rows")?;

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(entries.len());
    let mut previous: Vec<Value> = vec![Value::Null; columns];
    for entry in entries {
        let changed = entry
            .get("C")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let repeats = entry.get("R").and_then(Value::as_u64).unwrap_or(0);
        let nulls = entry.get("Ø").and_then(Value::as_u64).unwrap_or(0);

        let mut row = Vec::with_capacity(columns);
        let mut next_changed = 0;
        for i in 0..columns {
            let bit = 1u64 << i;
            let value = if nulls & bit != 0 {
                Value::Null
            } else if repeats & bit != 0 {
                previous[i].clone()
            } else {
                let value = changed.get(next_changed).cloned().unwrap_or(Value::Null);
                next_changed += 1;
                value
            };
            row.push(value);
        }
        previous = row.clone();
        rows.push(row);
    }

    // Resolve dictionary indices into their string values.
    for row in &mut rows {
        for (i, dict) in dict_names.iter().enumerate() {
            let Some(dict) = dict else { continue };
            if let Some(index) = row[i].as_u64() {
                if let Some(value) = value_dicts.pointer(&format!("/{dict}/{index}")) {
                    row[i] = value.clone();
                }
            }
        }
    }
    Ok(rows)
}
