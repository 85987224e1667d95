//! Per-app trigger catalog.
//!
//! Each supported app declares the trigger types it offers, with a human
//! description and a JSON schema for the trigger's `config` map. The catalog
//! is read-only at runtime: the orchestrator validates create/update requests
//! against it, and the admin layer serves it to users.

use std::collections::HashMap;
use std::sync::LazyLock;

use hookwire_core::error::CoreError;
use serde::Serialize;
use serde_json::json;

/// One available trigger type for an app.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerTypeSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema for the trigger `config` map.
    pub config_schema: serde_json::Value,
}

fn no_config() -> serde_json::Value {
    json!({ "type": "object", "properties": {}, "additionalProperties": false })
}

static CATALOG: LazyLock<HashMap<&'static str, Vec<TriggerTypeSpec>>> = LazyLock::new(|| {
    let mut catalog = HashMap::new();

    catalog.insert(
        "HUBSPOT",
        vec![
            TriggerTypeSpec {
                name: "contact.creation",
                description: "A contact is created in the CRM",
                config_schema: no_config(),
            },
            TriggerTypeSpec {
                name: "contact.deletion",
                description: "A contact is deleted from the CRM",
                config_schema: no_config(),
            },
            TriggerTypeSpec {
                name: "contact.propertyChange",
                description: "A watched contact property changes",
                config_schema: json!({
                    "type": "object",
                    "properties": {
                        "property_name": {
                            "type": "string",
                            "description": "CRM property to watch",
                        },
                    },
                    "required": ["property_name"],
                }),
            },
            TriggerTypeSpec {
                name: "deal.creation",
                description: "A deal is created in the CRM",
                config_schema: no_config(),
            },
            TriggerTypeSpec {
                name: "deal.propertyChange",
                description: "A watched deal property changes",
                config_schema: json!({
                    "type": "object",
                    "properties": {
                        "property_name": {
                            "type": "string",
                            "description": "CRM property to watch",
                        },
                    },
                    "required": ["property_name"],
                }),
            },
            TriggerTypeSpec {
                name: "company.creation",
                description: "A company is created in the CRM",
                config_schema: no_config(),
            },
        ],
    );

    catalog.insert(
        "SHOPIFY",
        vec![
            TriggerTypeSpec {
                name: "orders/create",
                description: "An order is placed in the shop",
                config_schema: no_config(),
            },
            TriggerTypeSpec {
                name: "orders/updated",
                description: "An order is updated",
                config_schema: no_config(),
            },
            TriggerTypeSpec {
                name: "products/create",
                description: "A product is added to the shop",
                config_schema: no_config(),
            },
            TriggerTypeSpec {
                name: "customers/create",
                description: "A customer account is created",
                config_schema: no_config(),
            },
            TriggerTypeSpec {
                name: "app/uninstalled",
                description: "The app is uninstalled from the shop",
                config_schema: no_config(),
            },
        ],
    );

    catalog.insert(
        "SLACK",
        vec![
            TriggerTypeSpec {
                name: "message",
                description: "A message is posted to a subscribed channel",
                config_schema: json!({
                    "type": "object",
                    "properties": {
                        "channel": {
                            "type": "string",
                            "description": "Restrict to one channel id",
                        },
                    },
                }),
            },
            TriggerTypeSpec {
                name: "reaction_added",
                description: "A reaction is added to a message",
                config_schema: no_config(),
            },
            TriggerTypeSpec {
                name: "app_mention",
                description: "The app is mentioned in a message",
                config_schema: no_config(),
            },
        ],
    );

    catalog.insert(
        "GITHUB",
        vec![
            TriggerTypeSpec {
                name: "push",
                description: "Commits are pushed to the repository",
                config_schema: github_repo_schema(),
            },
            TriggerTypeSpec {
                name: "pull_request",
                description: "A pull request is opened, updated, or closed",
                config_schema: github_repo_schema(),
            },
            TriggerTypeSpec {
                name: "issues",
                description: "An issue is opened, edited, or closed",
                config_schema: github_repo_schema(),
            },
            TriggerTypeSpec {
                name: "release",
                description: "A release is published",
                config_schema: github_repo_schema(),
            },
        ],
    );

    catalog.insert(
        "GMAIL",
        vec![
            TriggerTypeSpec {
                name: "message.received",
                description: "A message arrives in the inbox",
                config_schema: no_config(),
            },
            TriggerTypeSpec {
                name: "message.sent",
                description: "A message is sent from the mailbox",
                config_schema: no_config(),
            },
        ],
    );

    catalog
});

fn github_repo_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "owner": { "type": "string", "description": "Repository owner" },
            "repo": { "type": "string", "description": "Repository name" },
        },
        "required": ["owner", "repo"],
    })
}

/// Trigger types available for an app, or `None` for unknown apps.
pub fn trigger_types_for(app_name: &str) -> Option<&'static [TriggerTypeSpec]> {
    CATALOG
        .get(app_name.to_uppercase().as_str())
        .map(Vec::as_slice)
}

/// Validate that `trigger_type` is offered by `app_name`.
pub fn validate_trigger_type(app_name: &str, trigger_type: &str) -> Result<(), CoreError> {
    let types = trigger_types_for(app_name).ok_or_else(|| {
        CoreError::Validation(format!("unknown app: {app_name}"))
    })?;
    if types.iter().any(|spec| spec.name == trigger_type) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "app {app_name} has no trigger type '{trigger_type}'"
        )))
    }
}
