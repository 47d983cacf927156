//! Bundled in-memory graph driver.
//!
//! Serves a tiny fixed service graph so a fresh server can be exercised
//! without installing a real backend:
//!
//! ```text
//! load sample
//! info
//! data types=node,edge
//! data types=edge&&links=api>db,db>api
//! ```

use crate::driver::{Driver, OperationTable, Reply, Signature};
use crate::error::DriverError;
use grapher_protocol::{ArgumentMap, StatusCode};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

/// Name the sample driver registers under.
pub const SAMPLE_DRIVER_NAME: &str = "sample";

const NODE_TYPE: &str = "node";
const EDGE_TYPE: &str = "edge";

/// Fixed graph of services and their dependencies.
#[derive(Debug, Clone)]
pub struct SampleGraphDriver {
    nodes: Vec<(String, String)>,
    edges: Vec<(String, String)>,
}

impl Default for SampleGraphDriver {
    fn default() -> Self {
        Self::new(
            &[("api", "API gateway"), ("db", "Database"), ("cache", "Cache")],
            &[("api", "db"), ("api", "cache")],
        )
    }
}

impl SampleGraphDriver {
    pub fn new(nodes: &[(&str, &str)], edges: &[(&str, &str)]) -> Self {
        Self {
            nodes: nodes
                .iter()
                .map(|(id, label)| (id.to_string(), label.to_string()))
                .collect(),
            edges: edges
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }

    fn info(&mut self, _args: &ArgumentMap) -> Result<Reply, DriverError> {
        Ok(Reply::value(json!({
            "driver": SAMPLE_DRIVER_NAME,
            "types": [NODE_TYPE, EDGE_TYPE],
            "nodes": self.nodes.len(),
            "edges": self.edges.len(),
        })))
    }

    fn data(&mut self, args: &ArgumentMap) -> Result<Reply, DriverError> {
        let types = args.list("types").unwrap_or_default();
        if let Some(unknown) = types.iter().find(|t| **t != NODE_TYPE && **t != EDGE_TYPE) {
            return Err(DriverError::invalid("types", format!("unknown type '{}'", unknown)));
        }

        if let Some(links) = args.list("links") {
            let links = parse_links(&links)?;
            if has_cycle(&links) {
                return Err(StatusCode::LinksWithCycle.into());
            }
        }

        let mut items: Vec<Value> = Vec::new();
        if types.contains(&NODE_TYPE) {
            items.extend(self.nodes.iter().map(|(id, label)| {
                json!({ "type": NODE_TYPE, "id": id, "label": label })
            }));
        }
        if types.contains(&EDGE_TYPE) {
            items.extend(self.edges.iter().map(|(from, to)| {
                json!({ "type": EDGE_TYPE, "from": from, "to": to })
            }));
        }
        Ok(Reply::items(items))
    }
}

impl Driver for SampleGraphDriver {
    fn operations() -> OperationTable<Self> {
        let mut table = OperationTable::new();
        table
            .register("info", Signature::none(), Self::info)
            .register(
                "data",
                Signature::required(&["types"]).with_optional(&["links"]),
                Self::data,
            );
        table
    }
}

/// Parses `from>to` pairs.
fn parse_links<'a>(links: &[&'a str]) -> Result<Vec<(&'a str, &'a str)>, DriverError> {
    links
        .iter()
        .map(|link| {
            link.split_once('>')
                .map(|(from, to)| (from.trim(), to.trim()))
                .filter(|(from, to)| !from.is_empty() && !to.is_empty())
                .ok_or_else(|| DriverError::invalid("links", format!("malformed link '{}'", link)))
        })
        .collect()
}

fn has_cycle(links: &[(&str, &str)]) -> bool {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for &(from, to) in links {
        adjacency.entry(from).or_default().push(to);
    }

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        on_path: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> bool {
        if done.contains(node) {
            return false;
        }
        if !on_path.insert(node) {
            return true;
        }
        let cyclic = adjacency
            .get(node)
            .into_iter()
            .flatten()
            .copied()
            .any(|next| visit(next, adjacency, on_path, done));
        on_path.remove(node);
        done.insert(node);
        cyclic
    }

    let mut on_path = HashSet::new();
    let mut done = HashSet::new();
    adjacency
        .keys()
        .copied()
        .any(|node| visit(node, &adjacency, &mut on_path, &mut done))
}
