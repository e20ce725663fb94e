//! Graphviz export of the subgraph reachable from a term.

use std::io::Write;

use crate::tape::{topo_sort, Tape, TapeNode};

/// Options for writing a graphviz dot file, obtained by [`crate::TapeTerm::dot_builder`].
pub struct DotBuilder<'a> {
    tape: &'a Tape,
    root: u32,
    show_values: bool,
    highlights: Option<u32>,
}

impl<'a> DotBuilder<'a> {
    pub(crate) fn new(tape: &'a Tape, root: u32) -> Self {
        Self {
            tape,
            root,
            show_values: false,
            highlights: None,
        }
    }

    /// Print `data` and `grad` in every vertex.
    pub fn show_values(mut self, v: bool) -> Self {
        self.show_values = v;
        self
    }

    /// Fill the vertex of the node at `idx`.
    pub fn highlights(mut self, idx: u32) -> Self {
        self.highlights = Some(idx);
        self
    }

    /// Write graphviz dot file to the given writer.
    pub fn dot(self, writer: &mut impl Write) -> std::io::Result<()> {
        let tape = self.tape;
        let nodes = tape.nodes();
        self.dot_borrowed(&nodes, writer)
    }

    /// Like [`DotBuilder::dot`], but with nodes that are already borrowed, e.g. inside
    /// a [`crate::TapeTerm::backward_cb`] callback.
    pub fn dot_borrowed(self, nodes: &[TapeNode], writer: &mut impl Write) -> std::io::Result<()> {
        let topo = topo_sort(nodes, self.root);
        writeln!(writer, "digraph G {{\nrankdir=\"LR\";")?;
        for &idx in &topo {
            let node = &nodes[idx as usize];
            let name = node.name().replace('\\', "\\\\").replace('"', "\\\"");
            let label = node.op_label();
            let label = if label.is_empty() {
                name
            } else {
                format!("{name} ({label})")
            };
            let style = if self.highlights == Some(idx) {
                " style=filled fillcolor=\"#ff7f7f\""
            } else {
                ""
            };
            if self.show_values {
                writeln!(
                    writer,
                    "a{idx} [label=\"{label}\\ndata:{}, grad:{}\"{style}];",
                    node.data(),
                    node.grad()
                )?;
            } else {
                writeln!(writer, "a{idx} [label=\"{label}\"{style}];")?;
            }
        }
        for &idx in &topo {
            for operand in nodes[idx as usize].operands() {
                writeln!(writer, "a{operand} -> a{idx};")?;
            }
        }
        writeln!(writer, "}}")?;
        Ok(())
    }
}
