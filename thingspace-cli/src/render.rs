//! Text forms of stored records

use thingspace_core::{ThingRecord, ValueRecord};

/// One-line form, e.g. `Item{id="a", title="A"}`
pub fn record(record: &ThingRecord) -> String {
    let mut out = String::new();
    write_record(record, &mut out);
    out
}

pub fn value(value: &ValueRecord) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_record(record: &ThingRecord, out: &mut String) {
    out.push_str(&record.type_name);
    out.push('{');
    for (i, (name, value)) in record.fields.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(name);
        out.push('=');
        write_value(value, out);
    }
    out.push('}');
}

fn write_value(value: &ValueRecord, out: &mut String) {
    match value {
        ValueRecord::Null => out.push_str("null"),
        ValueRecord::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        ValueRecord::Int(i) => out.push_str(&i.to_string()),
        ValueRecord::Text(s) => out.push_str(&format!("{s:?}")),
        ValueRecord::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(item, out);
            }
            out.push(']');
        }
        ValueRecord::Thing(nested) => write_record(nested, out),
    }
}
