//! Custom schema functions for fields that need extra `OpenAPI` annotations
//! `#[derive(JsonSchema)]` cannot express on its own.
use schemars::{json_schema, Schema, SchemaGenerator};

pub fn date_time(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "string",
        "format": "date-time",
    })
}

pub fn observed_generation(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "integer",
        "format": "int64",
        "minimum": 0
    })
}

// `status.conditions` needs `x-kubernetes-list-type: map` and
// `x-kubernetes-list-map-keys: [type]` so server-side apply can merge
// individual conditions instead of replacing the whole list.
pub fn conditions(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "array",
        "x-kubernetes-list-type": "map",
        "x-kubernetes-list-map-keys": ["type"],
        "items": {
            "type": "object",
            "properties": {
                "lastTransitionTime": {
                    "description": "Last time the condition transitioned from one status to another.",
                    "format": "date-time",
                    "type": "string"
                },
                "status": {
                    "default": "Unknown",
                    "description": "Status of the condition.",
                    "enum": ["Unknown", "True", "False"],
                    "type": "string"
                },
                "reason": { "type": "string" },
                "message": { "type": "string" },
                "type": {
                    "description": "Type of condition.",
                    "pattern": "^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$",
                    "type": "string"
                }
            },
            "required": ["lastTransitionTime", "status", "type", "reason", "message"],
        },
    })
}
