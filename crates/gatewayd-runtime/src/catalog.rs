//! Aggregate catalog: the union of tools/resources/prompts across backends,
//! with first-declared-wins collision handling (spec §3 "Tool/resource/prompt
//! entry", §4.3 "Aggregator / Router").

use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub name: String,
    pub backend_id: String,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct ShadowedEntry {
    pub name: String,
    pub shadowing_backend_id: String,
    pub shadowed_backend_id: String,
}

/// A resource URI template compiled to a matcher, in first-declared order
/// (spec §4.3 "Resource URI templates").
pub struct CompiledTemplate {
    pub template: String,
    pub backend_id: String,
    pub regex: Regex,
}

impl std::fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("template", &self.template)
            .field("backend_id", &self.backend_id)
            .finish()
    }
}

/// Immutable once published; the Router holds only this read view
/// (spec §3 "Ownership").
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    pub tools: FxHashMap<String, CatalogEntry>,
    pub resources: FxHashMap<String, CatalogEntry>,
    pub prompts: FxHashMap<String, CatalogEntry>,
    pub shadows: Vec<ShadowedEntry>,
    pub resource_templates: Vec<CompiledTemplate>,
}

impl CatalogSnapshot {
    pub fn tools_list(&self) -> Vec<Value> {
        self.tools.values().map(|e| e.raw.clone()).collect()
    }

    pub fn resources_list(&self) -> Vec<Value> {
        self.resources.values().map(|e| e.raw.clone()).collect()
    }

    pub fn prompts_list(&self) -> Vec<Value> {
        self.prompts.values().map(|e| e.raw.clone()).collect()
    }

    /// Resolves a concrete `resources/read` URI to its owning entry: an
    /// exact literal match first, falling back to the compiled URI
    /// templates in declaration order (spec §4.3).
    pub fn match_resource_uri(&self, uri: &str) -> Option<&CatalogEntry> {
        if let Some(entry) = self.resources.get(uri) {
            return Some(entry);
        }
        let matched = self
            .resource_templates
            .iter()
            .find(|t| t.regex.is_match(uri))?;
        self.resources.get(&matched.template)
    }
}

/// Compiles a `{param}`-style URI template to a regex: non-greedy interior
/// segments, a greedy final segment, literal segments escaped verbatim
/// (spec §4.3 "Resource URI templates").
pub fn compile_uri_template(template: &str) -> Option<Regex> {
    let segments: Vec<&str> = template.split('/').collect();
    let last = segments.len().saturating_sub(1);
    let mut pattern = String::from("^");
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            pattern.push('/');
        }
        if segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2 {
            pattern.push_str(if i == last { "(.+)" } else { "([^/]+?)" });
        } else {
            pattern.push_str(&regex::escape(segment));
        }
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}

/// Unions two backends' `initialize` capability objects in place: boolean
/// leaves are OR'd, nested objects merged key-wise, and a leaf present on
/// only one side is carried through unchanged (spec §4.4 "the union of
/// backend capabilities").
pub fn merge_capabilities(acc: &mut Value, other: &Value) {
    if acc.is_null() {
        *acc = other.clone();
        return;
    }
    if let (Some(acc_bool), Some(other_bool)) = (acc.as_bool(), other.as_bool()) {
        *acc = Value::Bool(acc_bool || other_bool);
        return;
    }
    if let (Some(acc_map), Some(other_map)) = (acc.as_object_mut(), other.as_object()) {
        for (key, other_value) in other_map {
            match acc_map.get_mut(key) {
                Some(existing) => merge_capabilities(existing, other_value),
                None => {
                    acc_map.insert(key.clone(), other_value.clone());
                }
            }
        }
    }
}

/// One backend's contribution to the merge: declaration-order id plus its
/// currently known tool/resource/prompt entries.
pub struct BackendContribution {
    pub backend_id: String,
    pub tools: Vec<Value>,
    pub resources: Vec<Value>,
    pub prompts: Vec<Value>,
}

fn entry_name(raw: &Value, key_field: &str) -> Option<String> {
    raw.get(key_field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn merge_into(
    map: &mut FxHashMap<String, CatalogEntry>,
    shadows: &mut Vec<ShadowedEntry>,
    backend_id: &str,
    entries: &[Value],
    key_field: &str,
) -> Vec<String> {
    let mut inserted_order = Vec::new();
    for raw in entries {
        let Some(name) = entry_name(raw, key_field) else {
            continue;
        };
        if let Some(existing) = map.get(&name) {
            shadows.push(ShadowedEntry {
                name,
                shadowing_backend_id: existing.backend_id.clone(),
                shadowed_backend_id: backend_id.to_string(),
            });
        } else {
            inserted_order.push(name.clone());
            map.insert(
                name.clone(),
                CatalogEntry {
                    name,
                    backend_id: backend_id.to_string(),
                    raw: raw.clone(),
                },
            );
        }
    }
    inserted_order
}

/// Ordered merge over backends in declaration order: each backend's entries
/// are added if their key is free, otherwise shadowed (spec §4.3).
pub fn build_snapshot(contributions: &[BackendContribution]) -> Arc<CatalogSnapshot> {
    let mut snapshot = CatalogSnapshot::default();
    for contribution in contributions {
        merge_into(
            &mut snapshot.tools,
            &mut snapshot.shadows,
            &contribution.backend_id,
            &contribution.tools,
            "name",
        );
        let resource_order = merge_into(
            &mut snapshot.resources,
            &mut snapshot.shadows,
            &contribution.backend_id,
            &contribution.resources,
            "uriTemplate",
        );
        for template in resource_order {
            if let Some(regex) = compile_uri_template(&template) {
                snapshot.resource_templates.push(CompiledTemplate {
                    template,
                    backend_id: contribution.backend_id.clone(),
                    regex,
                });
            }
        }
        merge_into(
            &mut snapshot.prompts,
            &mut snapshot.shadows,
            &contribution.backend_id,
            &contribution.prompts,
            "name",
        );
    }
    Arc::new(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_declared_wins_and_records_shadow() {
        let contributions = vec![
            BackendContribution {
                backend_id: "a".to_string(),
                tools: vec![json!({"name": "fs.read", "description": "from a"})],
                resources: vec![],
                prompts: vec![],
            },
            BackendContribution {
                backend_id: "b".to_string(),
                tools: vec![json!({"name": "fs.read", "description": "from b"})],
                resources: vec![],
                prompts: vec![],
            },
        ];

        let snapshot = build_snapshot(&contributions);
        assert_eq!(snapshot.tools.len(), 1);
        assert_eq!(snapshot.tools["fs.read"].backend_id, "a");
        assert_eq!(snapshot.shadows.len(), 1);
        assert_eq!(snapshot.shadows[0].shadowed_backend_id, "b");
    }

    #[test]
    fn merge_is_order_deterministic() {
        let forward = vec![
            BackendContribution {
                backend_id: "a".to_string(),
                tools: vec![json!({"name": "x"})],
                resources: vec![],
                prompts: vec![],
            },
            BackendContribution {
                backend_id: "b".to_string(),
                tools: vec![json!({"name": "x"})],
                resources: vec![],
                prompts: vec![],
            },
        ];
        let mut reversed = forward.iter().rev().collect::<Vec<_>>();
        let snap_forward = build_snapshot(&forward);
        let reversed_owned: Vec<BackendContribution> = reversed
            .drain(..)
            .map(|c| BackendContribution {
                backend_id: c.backend_id.clone(),
                tools: c.tools.clone(),
                resources: c.resources.clone(),
                prompts: c.prompts.clone(),
            })
            .collect();
        let snap_reversed = build_snapshot(&reversed_owned);

        assert_eq!(snap_forward.tools["x"].backend_id, "a");
        assert_eq!(snap_reversed.tools["x"].backend_id, "b");
    }

    #[test]
    fn distinct_names_do_not_shadow() {
        let contributions = vec![
            BackendContribution {
                backend_id: "a".to_string(),
                tools: vec![json!({"name": "one"})],
                resources: vec![],
                prompts: vec![],
            },
            BackendContribution {
                backend_id: "b".to_string(),
                tools: vec![json!({"name": "two"})],
                resources: vec![],
                prompts: vec![],
            },
        ];
        let snapshot = build_snapshot(&contributions);
        assert_eq!(snapshot.tools.len(), 2);
        assert!(snapshot.shadows.is_empty());
    }

    #[test]
    fn resource_template_matches_concrete_uri() {
        let contributions = vec![BackendContribution {
            backend_id: "fs".to_string(),
            tools: vec![],
            resources: vec![json!({"uriTemplate": "file:///{path}", "name": "file"})],
            prompts: vec![],
        }];
        let snapshot = build_snapshot(&contributions);
        let entry = snapshot
            .match_resource_uri("file:///etc/hosts")
            .expect("template should match");
        assert_eq!(entry.backend_id, "fs");
    }

    #[test]
    fn literal_uri_matches_before_falling_back_to_templates() {
        let contributions = vec![BackendContribution {
            backend_id: "fs".to_string(),
            tools: vec![],
            resources: vec![
                json!({"uriTemplate": "file:///exact", "name": "exact"}),
                json!({"uriTemplate": "file:///{path}", "name": "wild"}),
            ],
            prompts: vec![],
        }];
        let snapshot = build_snapshot(&contributions);
        let entry = snapshot.match_resource_uri("file:///exact").unwrap();
        assert_eq!(entry.name, "exact");
    }

    #[test]
    fn merge_capabilities_ors_nested_booleans() {
        let mut acc = json!({"tools": {"listChanged": false}});
        merge_capabilities(&mut acc, &json!({"tools": {"listChanged": true}}));
        assert_eq!(acc, json!({"tools": {"listChanged": true}}));
    }

    #[test]
    fn merge_capabilities_carries_keys_present_on_only_one_side() {
        let mut acc = json!({"tools": {"listChanged": true}});
        merge_capabilities(
            &mut acc,
            &json!({"resources": {"listChanged": true, "subscribe": true}}),
        );
        assert_eq!(
            acc,
            json!({
                "tools": {"listChanged": true},
                "resources": {"listChanged": true, "subscribe": true},
            })
        );
    }

    #[test]
    fn non_matching_uri_returns_none() {
        let contributions = vec![BackendContribution {
            backend_id: "fs".to_string(),
            tools: vec![],
            resources: vec![json!({"uriTemplate": "file:///{path}", "name": "file"})],
            prompts: vec![],
        }];
        let snapshot = build_snapshot(&contributions);
        assert!(snapshot.match_resource_uri("http://nope").is_none());
    }
}
