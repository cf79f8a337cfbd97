//! GraphML export.
//!
//! Nodes carry no data. Edges carry `weight` (omitted when unweighted),
//! `source`, the comma-separated networks that contributed the edge, and
//! `weights`, their weights in the same order (`none` for an unweighted row).

use crate::graph::Graph;

const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns">
  <key id="weight" for="edge" attr.name="weight" attr.type="double"/>
  <key id="source" for="edge" attr.name="source" attr.type="string"/>
  <key id="weights" for="edge" attr.name="weights" attr.type="string"/>
  <graph id="G" edgedefault="undirected">
"#;

/// Render a graph as a GraphML document.
#[must_use]
pub fn to_graphml(graph: &Graph) -> String {
    let mut xml = String::from(HEADER);

    for node in graph.nodes() {
        xml.push_str(&format!("    <node id=\"{}\"/>\n", escape(node.as_str())));
    }

    for (index, edge) in graph.edges().enumerate() {
        xml.push_str(&format!(
            "    <edge id=\"e{}\" source=\"{}\" target=\"{}\">\n",
            index,
            escape(edge.source.as_str()),
            escape(edge.target.as_str())
        ));
        if let Some(weight) = edge.weight {
            xml.push_str(&format!("      <data key=\"weight\">{}</data>\n", weight));
        }
        if !edge.networks.is_empty() {
            xml.push_str(&format!(
                "      <data key=\"source\">{}</data>\n",
                escape(&edge.networks.join(","))
            ));
        }
        if !edge.weights.is_empty() {
            let weights: Vec<String> = edge
                .weights
                .iter()
                .map(|weight| weight.map_or_else(|| "none".to_string(), |w| w.to_string()))
                .collect();
            xml.push_str(&format!(
                "      <data key=\"weights\">{}</data>\n",
                weights.join(",")
            ));
        }
        xml.push_str("    </edge>\n");
    }

    xml.push_str("  </graph>\n</graphml>\n");
    xml
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaxonId;

    #[test]
    fn writes_nodes_and_weighted_edges() {
        let mut graph = Graph::new();
        let edge = graph.add_edge(TaxonId::new("x"), TaxonId::new("y"), Some(-1.0));
        edge.networks.push("A".to_string());
        edge.networks.push("B".to_string());
        edge.weights.push(Some(-0.5));
        edge.weights.push(None);

        let xml = to_graphml(&graph);
        assert!(xml.contains("<node id=\"x\"/>"));
        assert!(xml.contains("source=\"x\" target=\"y\""));
        assert!(xml.contains("<data key=\"weight\">-1</data>"));
        assert!(xml.contains("<data key=\"source\">A,B</data>"));
        assert!(xml.contains("<data key=\"weights\">-0.5,none</data>"));
        assert!(xml.ends_with("</graphml>\n"));
    }

    #[test]
    fn unweighted_edges_have_no_weight_data() {
        let mut graph = Graph::new();
        graph.add_edge(TaxonId::new("a"), TaxonId::new("b"), None);
        assert!(!to_graphml(&graph).contains("key=\"weight\">"));
    }

    #[test]
    fn ids_are_escaped() {
        let mut graph = Graph::new();
        graph.add_node(TaxonId::new("a<&>\"b"));
        assert!(to_graphml(&graph).contains("a&lt;&amp;&gt;&quot;b"));
    }
}
