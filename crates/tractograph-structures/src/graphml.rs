// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Minimal GraphML reader.
//!
//! Keeps node and edge `<data>` values as strings keyed by the attribute name
//! declared in the matching `<key>` element (or the raw key id when no
//! `attr.name` is declared). Key defaults are applied to elements that omit
//! a value.

use std::collections::BTreeMap;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Result, StructuresError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphmlNode {
    pub id: String,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphmlEdge {
    pub source: String,
    pub target: String,
    pub data: BTreeMap<String, String>,
}

/// Parsed GraphML graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphmlDocument {
    /// `id` attribute of the `<graph>` element
    pub id: Option<String>,
    pub directed: bool,
    pub nodes: Vec<GraphmlNode>,
    pub edges: Vec<GraphmlEdge>,
}

#[derive(Debug, Clone)]
struct KeyDecl {
    name: String,
    domain: String,
    default: Option<String>,
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn required(element: &BytesStart<'_>, name: &str) -> Result<String> {
    attribute(element, name.as_bytes())?.ok_or_else(|| {
        StructuresError::Graphml(format!(
            "<{}> without '{}' attribute",
            String::from_utf8_lossy(element.name().as_ref()),
            name
        ))
    })
}

enum Open {
    Node(GraphmlNode),
    Edge(GraphmlEdge),
}

/// Parse a GraphML document from text
pub fn parse_graphml(text: &str) -> Result<GraphmlDocument> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut keys: BTreeMap<String, KeyDecl> = BTreeMap::new();
    let mut document = GraphmlDocument::default();
    let mut open: Option<Open> = None;
    // (key id, accumulated text) of the <data> or <default> being read
    let mut data: Option<(String, String)> = None;
    let mut key_in_progress: Option<String> = None;

    loop {
        let event = reader.read_event()?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"key" => {
                        let id = required(e, "id")?;
                        let name = attribute(e, b"attr.name")?.unwrap_or_else(|| id.clone());
                        let domain = attribute(e, b"for")?.unwrap_or_else(|| "all".to_string());
                        keys.insert(
                            id.clone(),
                            KeyDecl {
                                name,
                                domain,
                                default: None,
                            },
                        );
                        if !is_empty {
                            key_in_progress = Some(id);
                        }
                    }
                    b"default" if key_in_progress.is_some() && !is_empty => {
                        data = Some((String::new(), String::new()));
                    }
                    b"graph" => {
                        document.id = attribute(e, b"id")?;
                        document.directed =
                            attribute(e, b"edgedefault")?.as_deref() == Some("directed");
                    }
                    b"node" => {
                        let node = GraphmlNode {
                            id: required(e, "id")?,
                            data: BTreeMap::new(),
                        };
                        if is_empty {
                            document.nodes.push(node);
                        } else {
                            open = Some(Open::Node(node));
                        }
                    }
                    b"edge" => {
                        let edge = GraphmlEdge {
                            source: required(e, "source")?,
                            target: required(e, "target")?,
                            data: BTreeMap::new(),
                        };
                        if is_empty {
                            document.edges.push(edge);
                        } else {
                            open = Some(Open::Edge(edge));
                        }
                    }
                    b"data" => {
                        let key = required(e, "key")?;
                        if is_empty {
                            store_data(&mut open, &keys, key, String::new());
                        } else {
                            data = Some((key, String::new()));
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if let Some((_, value)) = data.as_mut() {
                    value.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some((_, value)) = data.as_mut() {
                    value.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"data" => {
                    if let Some((key, value)) = data.take() {
                        store_data(&mut open, &keys, key, value);
                    }
                }
                b"default" => {
                    if let (Some(id), Some((_, value))) = (key_in_progress.as_ref(), data.take()) {
                        if let Some(decl) = keys.get_mut(id) {
                            decl.default = Some(value);
                        }
                    }
                }
                b"key" => key_in_progress = None,
                b"node" | b"edge" => match open.take() {
                    Some(Open::Node(node)) => document.nodes.push(node),
                    Some(Open::Edge(edge)) => document.edges.push(edge),
                    None => {}
                },
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    apply_defaults(&mut document, &keys);
    Ok(document)
}

fn store_data(
    open: &mut Option<Open>,
    keys: &BTreeMap<String, KeyDecl>,
    key: String,
    value: String,
) {
    let name = keys.get(&key).map(|k| k.name.clone()).unwrap_or(key);
    match open {
        Some(Open::Node(node)) => {
            node.data.insert(name, value);
        }
        Some(Open::Edge(edge)) => {
            edge.data.insert(name, value);
        }
        // Graph-level data is not needed
        None => {}
    }
}

fn apply_defaults(document: &mut GraphmlDocument, keys: &BTreeMap<String, KeyDecl>) {
    for decl in keys.values() {
        let Some(default) = decl.default.as_ref() else {
            continue;
        };
        if decl.domain == "node" || decl.domain == "all" {
            for node in &mut document.nodes {
                node.data
                    .entry(decl.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        if decl.domain == "edge" || decl.domain == "all" {
            for edge in &mut document.edges {
                edge.data
                    .entry(decl.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
    }
}

/// Read and parse a GraphML file
pub fn read_graphml<P: AsRef<Path>>(path: P) -> Result<GraphmlDocument> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| StructuresError::io(path, e))?;
    parse_graphml(&text).map_err(|e| match e {
        StructuresError::Graphml(msg) => {
            StructuresError::Graphml(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}
