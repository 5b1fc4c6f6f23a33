use std::{
    collections::{BTreeSet, HashSet},
    io::Write,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    Call,
    Goto,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallGraphEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    edges: Vec<CallGraphEdge>,
    nodes: BTreeSet<String>,
    seen: HashSet<(String, String)>,
    single_trace: bool,
}

impl CallGraph {
    /// With `single_trace`, only the first edge between two labels is kept.
    pub fn new(single_trace: bool) -> Self {
        Self {
            single_trace,
            ..Default::default()
        }
    }

    pub fn add_node(&mut self, label: &str) {
        if !self.nodes.contains(label) {
            self.nodes.insert(label.to_owned());
        }
    }

    pub fn add_edge(&mut self, from: &str, to: &str, kind: EdgeKind) -> bool {
        if self.single_trace && !self.seen.insert((from.to_owned(), to.to_owned())) {
            return false;
        }
        self.add_node(from);
        self.add_node(to);
        self.edges.push(CallGraphEdge {
            from: from.to_owned(),
            to: to.to_owned(),
            kind,
        });
        true
    }

    pub fn edges(&self) -> &[CallGraphEdge] {
        &self.edges
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }
}

/// Graphviz rendering: calls solid, gotos dashed.
pub fn write_dot(out: &mut impl Write, graph: &CallGraph) -> std::io::Result<()> {
    writeln!(out, "digraph calls {{")?;
    writeln!(out, "    node [shape=box];")?;
    for node in graph.nodes() {
        writeln!(out, "    \"{node}\";")?;
    }
    for edge in graph.edges() {
        let style = match edge.kind {
            EdgeKind::Call => "solid",
            EdgeKind::Goto => "dashed",
        };
        writeln!(out, "    \"{}\" -> \"{}\" [style={style}];", edge.from, edge.to)?;
    }
    writeln!(out, "}}")
}
