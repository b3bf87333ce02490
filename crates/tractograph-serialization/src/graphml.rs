// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! GraphML connectome writer and reader.
//!
//! Node attributes are denormalized: the centroid is split into
//! `dn_position_x/y/z` and the voxel count is stored as `roi_volume`. Edge
//! attributes are the flat metric keys.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tractograph_structures::{
    parse_graphml, region_descriptions, ConnectivityGraph, EdgeMetrics, RegionId, RegionNode,
};
use tractograph_structures::graph::NUMBER_OF_FIBERS;

use crate::{format_value, parse_value, Result, SerializationError};

const FORMAT: &str = "GraphML";

const POSITION_KEYS: [&str; 3] = ["dn_position_x", "dn_position_y", "dn_position_z"];
const ROI_VOLUME: &str = "roi_volume";

/// Node attribute name, GraphML type
const NODE_KEYS: [(&str, &str); 10] = [
    ("dn_correspondence_id", "int"),
    ("dn_multiscaleID", "int"),
    ("dn_name", "string"),
    ("dn_fsname", "string"),
    ("dn_hemisphere", "string"),
    ("dn_region", "string"),
    ("dn_position_x", "double"),
    ("dn_position_y", "double"),
    ("dn_position_z", "double"),
    (ROI_VOLUME, "int"),
];

fn node_values(node: &RegionNode) -> Vec<Option<String>> {
    let description = &node.description;
    let mut values = vec![
        Some(description.voxel_id.to_string()),
        Some(description.multiscale_id.to_string()),
        Some(description.name.clone()),
        Some(description.fs_name.clone()),
        Some(description.hemisphere.clone()),
        Some(description.region.clone()),
    ];
    match node.centroid {
        Some(centroid) => values.extend(centroid.iter().map(|c| Some(format_value(*c)))),
        None => values.extend([None, None, None]),
    }
    values.push(Some(node.volume.to_string()));
    values
}

fn write_key<W: Write>(
    writer: &mut Writer<W>,
    id: &str,
    domain: &str,
    name: &str,
    kind: &str,
) -> Result<()> {
    let mut key = BytesStart::new("key");
    key.push_attribute(("id", id));
    key.push_attribute(("for", domain));
    key.push_attribute(("attr.name", name));
    key.push_attribute(("attr.type", kind));
    writer.write_event(Event::Empty(key))?;
    Ok(())
}

fn write_data<W: Write>(writer: &mut Writer<W>, key: &str, value: &str) -> Result<()> {
    let mut data = BytesStart::new("data");
    data.push_attribute(("key", key));
    writer.write_event(Event::Start(data))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new("data")))?;
    Ok(())
}

/// Write `graph` as an undirected GraphML document
pub fn write_graphml<W: Write>(inner: W, graph: &ConnectivityGraph) -> Result<()> {
    let mut writer = Writer::new_with_indent(inner, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("graphml");
    root.push_attribute(("xmlns", "http://graphml.graphdrawing.org/xmlns"));
    writer.write_event(Event::Start(root))?;

    for (index, (name, kind)) in NODE_KEYS.iter().enumerate() {
        write_key(&mut writer, &format!("n{}", index), "node", name, kind)?;
    }
    let metric_keys = graph.metric_keys();
    for (index, name) in metric_keys.iter().enumerate() {
        let kind = if name == NUMBER_OF_FIBERS { "int" } else { "double" };
        write_key(&mut writer, &format!("e{}", index), "edge", name, kind)?;
    }

    let mut element = BytesStart::new("graph");
    element.push_attribute(("id", graph.resolution.as_str()));
    element.push_attribute(("edgedefault", "undirected"));
    writer.write_event(Event::Start(element))?;

    for node in graph.nodes.values() {
        let id = node.label().to_string();
        let mut element = BytesStart::new("node");
        element.push_attribute(("id", id.as_str()));
        writer.write_event(Event::Start(element))?;
        for (index, value) in node_values(node).iter().enumerate() {
            if let Some(value) = value {
                write_data(&mut writer, &format!("n{}", index), value)?;
            }
        }
        writer.write_event(Event::End(BytesEnd::new("node")))?;
    }

    for (edge, metrics) in &graph.edges {
        let source = edge.source().to_string();
        let target = edge.target().to_string();
        let mut element = BytesStart::new("edge");
        element.push_attribute(("source", source.as_str()));
        element.push_attribute(("target", target.as_str()));
        writer.write_event(Event::Start(element))?;
        let values: BTreeMap<String, f64> = metrics.entries().into_iter().collect();
        for (index, name) in metric_keys.iter().enumerate() {
            if let Some(value) = values.get(name) {
                write_data(&mut writer, &format!("e{}", index), &format_value(*value))?;
            }
        }
        writer.write_event(Event::End(BytesEnd::new("edge")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("graph")))?;
    writer.write_event(Event::End(BytesEnd::new("graphml")))?;
    writer.into_inner().flush()?;
    Ok(())
}

pub fn write_graphml_file<P: AsRef<Path>>(path: P, graph: &ConnectivityGraph) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| SerializationError::io(path, e))?;
    write_graphml(BufWriter::new(file), graph)
}

fn number(data: &BTreeMap<String, String>, key: &str) -> Result<Option<f64>> {
    match data.get(key) {
        None => Ok(None),
        Some(text) => parse_value(text).map(Some).ok_or_else(|| {
            SerializationError::format(FORMAT, format!("'{}' is not a number for {}", text, key))
        }),
    }
}

fn region_id(text: &str) -> Result<RegionId> {
    text.trim().parse::<RegionId>().map_err(|_| {
        SerializationError::format(FORMAT, format!("'{}' is not a region id", text))
    })
}

/// Parse a connectome GraphML document written by [`write_graphml`]
pub fn parse_graphml_graph(text: &str) -> Result<ConnectivityGraph> {
    let document = parse_graphml(text)?;
    let mut graph = ConnectivityGraph::new(document.id.clone().unwrap_or_default());

    let mut data_by_label = BTreeMap::new();
    for node in &document.nodes {
        data_by_label.insert(region_id(&node.id)?, &node.data);
    }

    for description in region_descriptions(&document)? {
        let Some(data) = data_by_label.get(&description.label) else {
            continue;
        };
        let position = [
            number(data, POSITION_KEYS[0])?,
            number(data, POSITION_KEYS[1])?,
            number(data, POSITION_KEYS[2])?,
        ];
        let centroid = match position {
            [Some(x), Some(y), Some(z)] => Some([x, y, z]),
            _ => None,
        };
        let volume = number(data, ROI_VOLUME)?.unwrap_or(0.0);
        if volume < 0.0 || volume.fract() != 0.0 {
            return Err(SerializationError::format(
                FORMAT,
                format!("region {} has invalid {} {}", description.label, ROI_VOLUME, volume),
            ));
        }
        graph.add_node(RegionNode {
            description,
            centroid,
            volume: volume as usize,
        });
    }

    for edge in &document.edges {
        let (u, v) = (region_id(&edge.source)?, region_id(&edge.target)?);
        let mut entries = Vec::with_capacity(edge.data.len());
        for key in edge.data.keys() {
            if let Some(value) = number(&edge.data, key)? {
                entries.push((key.as_str(), value));
            }
        }
        let metrics = EdgeMetrics::from_entries(entries)?;
        if graph.edge(u, v).is_some() {
            return Err(SerializationError::format(
                FORMAT,
                format!("edge ({}, {}) appears twice", u, v),
            ));
        }
        graph.insert_edge(u, v, metrics);
    }

    Ok(graph)
}

pub fn read_graphml_graph<P: AsRef<Path>>(path: P) -> Result<ConnectivityGraph> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| SerializationError::io(path, e))?;
    parse_graphml_graph(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tractograph_structures::{RegionDescription, ScalarStats};

    fn graph() -> ConnectivityGraph {
        let mut graph = ConnectivityGraph::new("scale33");
        graph.add_node(RegionNode {
            description: RegionDescription {
                voxel_id: 35,
                multiscale_id: 1035,
                name: "insula & operculum".to_string(),
                fs_name: "ctx-lh-insula".to_string(),
                hemisphere: "left".to_string(),
                region: "cortical".to_string(),
                ..RegionDescription::unnamed(1)
            },
            centroid: Some([10.5, 20.0, -3.25]),
            volume: 120,
        });
        graph.add_node(RegionNode {
            description: RegionDescription::unnamed(2),
            centroid: None,
            volume: 0,
        });
        graph.insert_edge(
            2,
            1,
            EdgeMetrics {
                number_of_fibers: 4,
                fiber_length: Some(ScalarStats {
                    mean: 31.5,
                    median: 30.0,
                    std: 2.5,
                }),
                fiber_density: Some(0.0),
                ..EdgeMetrics::default()
            },
        );
        graph
    }

    #[test]
    fn test_write_then_parse() {
        let original = graph();
        let mut buffer = Vec::new();
        write_graphml(&mut buffer, &original).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains(r#"<graph id="scale33" edgedefault="undirected">"#));
        assert!(text.contains("insula &amp; operculum"));
        assert!(text.contains(r#"attr.name="dn_position_x""#));
        assert!(text.contains(r#"attr.name="dn_correspondence_id""#));

        let parsed = parse_graphml_graph(&text).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_non_numeric_metric_is_error() {
        let text = r#"<graphml>
  <key id="e0" for="edge" attr.name="number_of_fibers"/>
  <graph id="s" edgedefault="undirected">
    <node id="1"/><node id="2"/>
    <edge source="1" target="2"><data key="e0">many</data></edge>
  </graph>
</graphml>"#;
        assert!(matches!(
            parse_graphml_graph(text),
            Err(SerializationError::Format { .. })
        ));
    }
}
