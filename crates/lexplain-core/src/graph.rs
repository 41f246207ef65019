//! Article knowledge graph for force-directed display.
//!
//! [`build`] projects one [`ArticleDetail`] into nodes and edges:
//!
//! ```text
//! article ──HAS_OBLIGATION──▶ obl-<i> ──APPLIES_TO──▶ role-<Role-Name>
//! article ──DEFINES─────────▶ term-<i>
//! article ──REFERS_TO───────▶ <referenced article id>
//! ```
//!
//! Node ids are part of the display contract (persisted layouts key on them),
//! so the derivation below must not change. Any insertion whose id already
//! exists reuses the existing node; edges are always added.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::article::ArticleDetail;

/// Fixed node taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Article,
    Obligation,
    Role,
    Term,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Obligation => "obligation",
            Self::Role => "role",
            Self::Term => "term",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge relation labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    HasObligation,
    AppliesTo,
    Defines,
    RefersTo,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HasObligation => "HAS_OBLIGATION",
            Self::AppliesTo => "APPLIES_TO",
            Self::Defines => "DEFINES",
            Self::RefersTo => "REFERS_TO",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub label: EdgeKind,
}

/// Display graph for one article.
///
/// Nodes are unique by id and kept in insertion order; edges keep insertion
/// order too. Rebuilt from scratch whenever the source article changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    #[serde(skip)]
    ids: HashSet<String>,
}

impl Graph {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        if !self.ids.contains(id) {
            return None;
        }
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Outgoing edges of `id`, in insertion order.
    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Edges whose endpoints are missing from the node set. Empty for any
    /// graph produced by [`build`].
    pub fn dangling_edges(&self) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| !self.ids.contains(&e.source) || !self.ids.contains(&e.target))
            .collect()
    }

    /// Layout-engine element list: one `{"data": {...}}` object per node, then
    /// one per edge.
    pub fn to_elements(&self) -> Value {
        let nodes = self.nodes.iter().map(|n| {
            let mut data = Map::new();
            data.insert("id".into(), Value::from(n.id.as_str()));
            data.insert("label".into(), Value::from(n.label.as_str()));
            data.insert("type".into(), Value::from(n.kind.as_str()));
            if let Some(tip) = &n.tooltip {
                data.insert("tooltip".into(), Value::from(tip.as_str()));
            }
            json!({ "data": data })
        });
        let edges = self.edges.iter().map(|e| {
            json!({
                "data": {
                    "source": e.source,
                    "target": e.target,
                    "label": e.label.as_str(),
                }
            })
        });
        Value::Array(nodes.chain(edges).collect())
    }

    /// Insert a node unless its id is already present. Returns the id either way.
    fn insert_node(&mut self, node: Node) -> String {
        let id = node.id.clone();
        if self.ids.insert(id.clone()) {
            self.nodes.push(node);
        }
        id
    }

    fn connect(&mut self, source: &str, target: &str, label: EdgeKind) {
        self.edges.push(Edge {
            source: source.to_string(),
            target: target.to_string(),
            label,
        });
    }
}

/// Role node id: `role-` followed by the role with every whitespace run
/// collapsed to one hyphen (`"Data  Controller"` → `role-Data-Controller`).
pub fn role_node_id(role: &str) -> String {
    let mut id = String::with_capacity(role.len() + 5);
    id.push_str("role-");
    let mut in_space = false;
    for c in role.chars() {
        if c.is_whitespace() {
            if !in_space {
                id.push('-');
            }
            in_space = true;
        } else {
            id.push(c);
            in_space = false;
        }
    }
    id
}

fn article_label(number: u32) -> String {
    format!("Art. {number}")
}

/// Build the display graph for `article`. Pure and deterministic.
pub fn build(article: &ArticleDetail) -> Graph {
    let mut graph = Graph::default();

    let root = graph.insert_node(Node {
        id: article.id.clone(),
        label: article_label(article.number),
        kind: NodeKind::Article,
        tooltip: None,
    });

    for (idx, obligation) in article.obligations.iter().enumerate() {
        let obl = graph.insert_node(Node {
            id: format!("obl-{idx}"),
            label: "Obligation".to_string(),
            kind: NodeKind::Obligation,
            tooltip: Some(obligation.summary.clone()),
        });
        graph.connect(&root, &obl, EdgeKind::HasObligation);

        let role = graph.insert_node(Node {
            id: role_node_id(&obligation.role),
            label: obligation.role.clone(),
            kind: NodeKind::Role,
            tooltip: None,
        });
        graph.connect(&obl, &role, EdgeKind::AppliesTo);
    }

    for (idx, term) in article.terms.iter().enumerate() {
        let term_id = graph.insert_node(Node {
            id: format!("term-{idx}"),
            label: term.term.clone(),
            kind: NodeKind::Term,
            tooltip: Some(term.definition.clone()),
        });
        graph.connect(&root, &term_id, EdgeKind::Defines);
    }

    for reference in &article.references {
        let target = graph.insert_node(Node {
            id: reference.id.clone(),
            label: article_label(reference.number),
            kind: NodeKind::Article,
            tooltip: None,
        });
        graph.connect(&root, &target, EdgeKind::RefersTo);
    }

    tracing::debug!(
        article = %article.id,
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "built article graph"
    );
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::{ArticleRef, DefinedTerm, Obligation};

    fn article(id: &str, number: u32) -> ArticleDetail {
        ArticleDetail {
            id: id.into(),
            number,
            title: String::new(),
            obligations: vec![],
            terms: vec![],
            topics: Default::default(),
            references: vec![],
        }
    }

    fn obligation(summary: &str, role: &str) -> Obligation {
        Obligation {
            summary: summary.into(),
            role: role.into(),
        }
    }

    fn edge_triples(graph: &Graph) -> Vec<(&str, &str, &str)> {
        graph
            .edges()
            .iter()
            .map(|e| (e.label.as_str(), e.source.as_str(), e.target.as_str()))
            .collect()
    }

    #[test]
    fn article_six_scenario() {
        let mut art = article("art-6", 6);
        art.obligations = vec![obligation("x", "Processor")];
        art.references = vec![ArticleRef {
            id: "art-5".into(),
            number: 5,
        }];

        let graph = build(&art);

        let nodes: Vec<(&str, NodeKind)> = graph
            .nodes()
            .iter()
            .map(|n| (n.id.as_str(), n.kind))
            .collect();
        assert_eq!(
            nodes,
            [
                ("art-6", NodeKind::Article),
                ("obl-0", NodeKind::Obligation),
                ("role-Processor", NodeKind::Role),
                ("art-5", NodeKind::Article),
            ]
        );
        assert_eq!(
            edge_triples(&graph),
            [
                ("HAS_OBLIGATION", "art-6", "obl-0"),
                ("APPLIES_TO", "obl-0", "role-Processor"),
                ("REFERS_TO", "art-6", "art-5"),
            ]
        );
        assert_eq!(graph.node("art-5").unwrap().label, "Art. 5");
        assert_eq!(graph.node("obl-0").unwrap().tooltip.as_deref(), Some("x"));
    }

    #[test]
    fn shared_role_collapses_to_one_node() {
        let mut art = article("art-24", 24);
        art.obligations = vec![
            obligation("implement measures", "Data Controller"),
            obligation("demonstrate compliance", "Data Controller"),
        ];

        let graph = build(&art);

        let roles: Vec<&Node> = graph
            .nodes()
            .iter()
            .filter(|n| n.kind == NodeKind::Role)
            .collect();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].id, "role-Data-Controller");
        assert_eq!(roles[0].label, "Data Controller");

        let applies: Vec<_> = graph
            .edges()
            .iter()
            .filter(|e| e.label == EdgeKind::AppliesTo)
            .collect();
        assert_eq!(applies.len(), 2);
        assert_eq!(applies[0].source, "obl-0");
        assert_eq!(applies[1].source, "obl-1");
        assert!(applies.iter().all(|e| e.target == "role-Data-Controller"));
    }

    #[test]
    fn duplicate_references_reuse_node() {
        let mut art = article("art-9", 9);
        art.references = vec![
            ArticleRef {
                id: "art-6".into(),
                number: 6,
            },
            ArticleRef {
                id: "art-6".into(),
                number: 6,
            },
        ];

        let graph = build(&art);

        assert_eq!(graph.nodes().len(), 2);
        assert_eq!(graph.edges_from("art-9").count(), 2);
    }

    #[test]
    fn terms_get_positional_ids_and_tooltips() {
        let mut art = article("art-4", 4);
        art.terms = vec![
            DefinedTerm {
                term: "personal data".into(),
                definition: "any information relating to an identified person".into(),
            },
            DefinedTerm {
                term: "processing".into(),
                definition: "any operation performed on personal data".into(),
            },
        ];

        let graph = build(&art);

        let term = graph.node("term-1").unwrap();
        assert_eq!(term.kind, NodeKind::Term);
        assert_eq!(term.label, "processing");
        assert_eq!(
            edge_triples(&graph),
            [("DEFINES", "art-4", "term-0"), ("DEFINES", "art-4", "term-1")]
        );
    }

    #[test]
    fn role_id_collapses_whitespace_runs() {
        assert_eq!(role_node_id("Data Controller"), "role-Data-Controller");
        assert_eq!(role_node_id("Data \t\n Controller"), "role-Data-Controller");
        assert_eq!(role_node_id(" Processor"), "role--Processor");
        assert_eq!(role_node_id("Supervisory Authority "), "role-Supervisory-Authority-");
    }

    #[test]
    fn build_is_deterministic() {
        let mut art = article("art-28", 28);
        art.obligations = vec![
            obligation("a", "Controller"),
            obligation("b", "Processor"),
            obligation("c", "Controller"),
        ];
        art.references = vec![ArticleRef {
            id: "art-32".into(),
            number: 32,
        }];

        let first = build(&art);
        let second = build(&art.clone());
        assert_eq!(first, second);
        assert_eq!(first.to_elements(), second.to_elements());
    }

    #[test]
    fn edges_never_dangle() {
        let mut art = article("art-6", 6);
        art.obligations = vec![obligation("x", "Controller"), obligation("y", "Controller")];
        art.references = vec![ArticleRef {
            id: "art-6".into(),
            number: 6,
        }];

        let graph = build(&art);
        assert!(graph.dangling_edges().is_empty());
        // Self-reference reuses the root node.
        assert_eq!(graph.nodes().iter().filter(|n| n.id == "art-6").count(), 1);
    }

    #[test]
    fn elements_list_nodes_then_edges() {
        let mut art = article("art-6", 6);
        art.obligations = vec![obligation("lawful basis", "Controller")];

        let elements = build(&art).to_elements();
        let items = elements.as_array().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(
            items[0],
            json!({"data": {"id": "art-6", "label": "Art. 6", "type": "article"}})
        );
        assert_eq!(items[1]["data"]["tooltip"], "lawful basis");
        assert_eq!(
            items[3],
            json!({"data": {"source": "obl-0", "target": "role-Controller", "label": "APPLIES_TO"}})
        );
    }
}
