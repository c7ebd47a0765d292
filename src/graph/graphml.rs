//! GraphML-like road network loader
//!
//! Accepts the usual GraphML shape: `<key>` declarations mapping data ids to
//! attribute names, `<node id>` elements carrying `lat`/`lon` (or the `y`/`x`
//! aliases), and `<edge source target>` elements carrying `length`, `highway`
//! and optionally `name` and `key`. A node without coordinates or an edge
//! without a usable length is fatal, matching the store's load contract.

use super::{EdgeDescriptor, GraphError, RoadNode};
use crate::domain_types::{NodeId, RoadClass};
use crate::geo::Coord;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::path::Path;

/// Parsed network document: nodes plus edge descriptors, ready for
/// [`super::RoadGraph::from_parts`].
#[derive(Debug, Default)]
pub struct NetworkDocument {
    /// Every parsed intersection.
    pub nodes: Vec<RoadNode>,
    /// Every parsed segment descriptor.
    pub edges: Vec<EdgeDescriptor>,
}

#[derive(Debug, Default)]
struct PendingNode {
    id: Option<i64>,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Debug, Default)]
struct PendingEdge {
    source: Option<i64>,
    target: Option<i64>,
    key: Option<u32>,
    length_m: Option<f64>,
    road_class: Option<RoadClass>,
    name: Option<String>,
}

/// Reads a network document from disk.
pub fn read_network(path: &Path) -> Result<NetworkDocument, GraphError> {
    let raw = std::fs::read_to_string(path)?;
    parse_network(&raw)
}

/// Parses a network document from an in-memory string.
pub fn parse_network(raw: &str) -> Result<NetworkDocument, GraphError> {
    let mut reader = Reader::from_str(raw);
    reader.trim_text(true);

    // data-id -> attribute name, per <key id=".." attr.name=".."/>.
    let mut key_names: HashMap<String, String> = HashMap::new();
    let mut current_node: Option<PendingNode> = None;
    let mut current_edge: Option<PendingEdge> = None;
    let mut active_data_key: Option<String> = None;
    let mut document = NetworkDocument::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"key" => {
                        if let (Some(id), Some(attr_name)) =
                            (attribute(e, "id")?, attribute(e, "attr.name")?)
                        {
                            key_names.insert(id, attr_name);
                        }
                    }
                    b"node" => {
                        let id = attribute(e, "id")?
                            .and_then(|v| v.parse::<i64>().ok());
                        current_node = Some(PendingNode {
                            id,
                            ..PendingNode::default()
                        });
                    }
                    b"edge" => {
                        let source = attribute(e, "source")?
                            .and_then(|v| v.parse::<i64>().ok());
                        let target = attribute(e, "target")?
                            .and_then(|v| v.parse::<i64>().ok());
                        let key = attribute(e, "key")?
                            .and_then(|v| v.parse::<u32>().ok());
                        current_edge = Some(PendingEdge {
                            source,
                            target,
                            key,
                            ..PendingEdge::default()
                        });
                    }
                    b"data" => {
                        active_data_key = attribute(e, "key")?
                            .map(|id| key_names.get(&id).cloned().unwrap_or(id));
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                // Self-closing nodes/edges carry no <data> children; finishing
                // them immediately surfaces the missing-field error.
                match e.local_name().as_ref() {
                    b"key" => {
                        if let (Some(id), Some(attr_name)) =
                            (attribute(e, "id")?, attribute(e, "attr.name")?)
                        {
                            key_names.insert(id, attr_name);
                        }
                    }
                    b"node" => {
                        let id = attribute(e, "id")?.and_then(|v| v.parse::<i64>().ok());
                        document.nodes.push(finish_node(PendingNode {
                            id,
                            ..PendingNode::default()
                        })?);
                    }
                    b"edge" => {
                        let source =
                            attribute(e, "source")?.and_then(|v| v.parse::<i64>().ok());
                        let target =
                            attribute(e, "target")?.and_then(|v| v.parse::<i64>().ok());
                        document.edges.push(finish_edge(PendingEdge {
                            source,
                            target,
                            ..PendingEdge::default()
                        })?);
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| GraphError::Document(err.to_string()))?
                    .trim()
                    .to_string();
                if text.is_empty() {
                    continue;
                }
                let Some(ref field) = active_data_key else {
                    continue;
                };
                if let Some(node) = current_node.as_mut() {
                    match field.as_str() {
                        "lat" | "y" => node.lat = text.parse().ok(),
                        "lon" | "x" => node.lon = text.parse().ok(),
                        _ => {}
                    }
                } else if let Some(edge) = current_edge.as_mut() {
                    match field.as_str() {
                        "length" | "length_m" => edge.length_m = text.parse().ok(),
                        "highway" | "road_class" => {
                            edge.road_class = Some(RoadClass::parse(&text));
                        }
                        "name" => edge.name = Some(text),
                        "key" => edge.key = text.parse().ok(),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                match e.local_name().as_ref() {
                    b"node" => {
                        if let Some(pending) = current_node.take() {
                            document.nodes.push(finish_node(pending)?);
                        }
                    }
                    b"edge" => {
                        if let Some(pending) = current_edge.take() {
                            document.edges.push(finish_edge(pending)?);
                        }
                    }
                    b"data" => active_data_key = None,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(GraphError::Document(err.to_string())),
            _ => {}
        }
    }

    Ok(document)
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>, GraphError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|err| GraphError::Document(err.to_string()))?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| GraphError::Document(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn finish_node(pending: PendingNode) -> Result<RoadNode, GraphError> {
    let id = pending
        .id
        .ok_or_else(|| GraphError::Document("node without a numeric id".to_string()))?;
    let (Some(lat), Some(lon)) = (pending.lat, pending.lon) else {
        return Err(GraphError::Document(format!(
            "node {id} is missing lat/lon coordinates"
        )));
    };
    Ok(RoadNode {
        id: NodeId::new(id),
        coord: Coord::new(lat, lon)?,
    })
}

fn finish_edge(pending: PendingEdge) -> Result<EdgeDescriptor, GraphError> {
    let (Some(source), Some(target)) = (pending.source, pending.target) else {
        return Err(GraphError::Document(
            "edge without numeric source/target".to_string(),
        ));
    };
    let length_m = pending.length_m.ok_or_else(|| GraphError::Document(format!(
        "edge {source}->{target} is missing its length"
    )))?;
    Ok(EdgeDescriptor {
        u: NodeId::new(source),
        v: NodeId::new(target),
        key: pending.key,
        length_m,
        road_class: pending.road_class.unwrap_or(RoadClass::Unclassified),
        name: pending.name,
    })
}
