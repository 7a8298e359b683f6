//! # Drift Detection
//!
//! Canonicalizes NetworkPolicy specs into an order-independent form and hashes
//! them, so a cluster object and its repository file compare equal whenever
//! they enforce the same rules.
//!
//! Canonical form:
//! - selectors: `matchLabels` keyed in order, `matchExpressions` values sorted,
//!   expressions sorted by serialized form
//! - ingress/egress rules, their peers and their ports sorted by serialized form
//! - ports default to `TCP`; numeric string ports become numbers
//! - absent and empty lists are the same
//! - `policyTypes` sorted, defaulted as the API server does
//! - metadata never participates

use k8s_openapi::api::networking::v1::NetworkPolicy;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Canonical representation of a policy spec (given as its JSON value)
#[must_use]
pub fn canonicalize_spec(spec: &Value) -> Value {
    let mut out = Map::new();
    out.insert(
        "podSelector".to_string(),
        canonical_selector(spec.get("podSelector")).unwrap_or_else(|| Value::Object(Map::new())),
    );

    let ingress = canonical_rules(spec.get("ingress"), "from");
    let egress = canonical_rules(spec.get("egress"), "to");

    let mut policy_types: BTreeSet<String> = list(spec.get("policyTypes"))
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    if policy_types.is_empty() {
        policy_types.insert("Ingress".to_string());
        if !egress.is_empty() {
            policy_types.insert("Egress".to_string());
        }
    }

    out.insert("ingress".to_string(), Value::Array(ingress));
    out.insert("egress".to_string(), Value::Array(egress));
    out.insert(
        "policyTypes".to_string(),
        Value::Array(policy_types.into_iter().map(Value::String).collect()),
    );
    sort_keys(Value::Object(out))
}

/// SHA-256 (hex) of the canonical spec
#[must_use]
pub fn rules_hash(spec: &Value) -> String {
    let canonical = canonical_string(&canonicalize_spec(spec));
    Sha256::digest(canonical.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Rules hash of a typed policy; a policy without spec hashes like an empty spec
#[must_use]
pub fn policy_rules_hash(policy: &NetworkPolicy) -> String {
    let spec = policy
        .spec
        .as_ref()
        .and_then(|s| serde_json::to_value(s).ok())
        .unwrap_or(Value::Object(Map::new()));
    rules_hash(&spec)
}

/// Whether two policies enforce the same rules
#[must_use]
pub fn policies_identical(a: &NetworkPolicy, b: &NetworkPolicy) -> bool {
    policy_rules_hash(a) == policy_rules_hash(b)
}

fn list(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

fn canonical_rules(rules: Option<&Value>, peer_key: &str) -> Vec<Value> {
    let rules = list(rules)
        .iter()
        .map(|rule| {
            let mut out = Map::new();
            let peers = sorted(
                list(rule.get(peer_key))
                    .iter()
                    .map(canonical_peer)
                    .collect(),
            );
            let ports = sorted(list(rule.get("ports")).iter().map(canonical_port).collect());
            out.insert(peer_key.to_string(), Value::Array(peers));
            out.insert("ports".to_string(), Value::Array(ports));
            Value::Object(out)
        })
        .collect();
    sorted(rules)
}

fn canonical_peer(peer: &Value) -> Value {
    let mut out = Map::new();
    for key in ["podSelector", "namespaceSelector"] {
        if let Some(selector) = canonical_selector(peer.get(key)) {
            out.insert(key.to_string(), selector);
        }
    }
    if let Some(block) = peer.get("ipBlock").filter(|b| b.is_object()) {
        let mut ip_block = Map::new();
        if let Some(cidr) = block.get("cidr") {
            ip_block.insert("cidr".to_string(), cidr.clone());
        }
        let except: BTreeSet<String> = list(block.get("except"))
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        ip_block.insert(
            "except".to_string(),
            Value::Array(except.into_iter().map(Value::String).collect()),
        );
        out.insert("ipBlock".to_string(), Value::Object(ip_block));
    }
    Value::Object(out)
}

fn canonical_port(port: &Value) -> Value {
    let mut out = Map::new();
    let protocol = port
        .get("protocol")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .unwrap_or("TCP");
    out.insert("protocol".to_string(), Value::from(protocol.to_ascii_uppercase()));
    if let Some(number) = port.get("port").and_then(canonical_port_number) {
        out.insert("port".to_string(), number);
    }
    if let Some(end_port) = port.get("endPort").filter(|v| !v.is_null()) {
        out.insert("endPort".to_string(), end_port.clone());
    }
    Value::Object(out)
}

fn canonical_port_number(port: &Value) -> Option<Value> {
    match port {
        Value::Number(n) => Some(Value::Number(n.clone())),
        Value::String(s) => Some(
            s.trim()
                .parse::<u64>()
                .map_or_else(|_| Value::String(s.clone()), Value::from),
        ),
        _ => None,
    }
}

/// `None` when the selector is absent; an empty selector stays an (empty) object
fn canonical_selector(selector: Option<&Value>) -> Option<Value> {
    let selector = selector.filter(|s| s.is_object())?;
    let mut out = Map::new();

    if let Some(Value::Object(labels)) = selector.get("matchLabels") {
        let labels: BTreeMap<&String, &Value> = labels.iter().collect();
        if !labels.is_empty() {
            let mut map = Map::new();
            for (k, v) in labels {
                map.insert(k.clone(), v.clone());
            }
            out.insert("matchLabels".to_string(), Value::Object(map));
        }
    }

    let expressions: Vec<Value> = list(selector.get("matchExpressions"))
        .iter()
        .map(|expr| {
            let mut e = Map::new();
            for key in ["key", "operator"] {
                if let Some(v) = expr.get(key) {
                    e.insert(key.to_string(), v.clone());
                }
            }
            let values: BTreeSet<String> = list(expr.get("values"))
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            e.insert(
                "values".to_string(),
                Value::Array(values.into_iter().map(Value::String).collect()),
            );
            Value::Object(e)
        })
        .collect();
    if !expressions.is_empty() {
        out.insert("matchExpressions".to_string(), Value::Array(sorted(expressions)));
    }

    Some(Value::Object(out))
}

fn sorted(items: Vec<Value>) -> Vec<Value> {
    let mut keyed: Vec<(String, Value)> = items
        .into_iter()
        .map(|item| (canonical_string(&item), item))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, item)| item).collect()
}

/// Rebuild every object with keys inserted in sorted order
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let entries: BTreeMap<String, Value> = map.into_iter().collect();
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Serialization with sorted keys, independent of the map implementation
fn canonical_string(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let entries: BTreeMap<&String, &Value> = map.iter().collect();
            let body: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_string(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_string).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}
