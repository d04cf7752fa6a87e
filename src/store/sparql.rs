//! SPARQL statement builders.
//!
//! All values reaching a statement go through [`iri`] or [`literal`]; ids and
//! predicates are validated IRIs by construction, literals are escaped here.

use std::fmt::Write as _;

/// An object position value written by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Iri(String),
    Literal(String),
    Typed { value: String, datatype: String },
    Tagged { value: String, language: String },
}

impl Node {
    pub fn iri(value: impl Into<String>) -> Self {
        Self::Iri(value.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn typed(value: impl Into<String>, datatype: &str) -> Self {
        Self::Typed {
            value: value.into(),
            datatype: datatype.to_string(),
        }
    }

    pub fn tagged(value: impl Into<String>, language: &str) -> Self {
        Self::Tagged {
            value: value.into(),
            language: language.to_string(),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Self::Iri(v) => iri(v),
            Self::Literal(v) => literal(v),
            Self::Typed { value, datatype } => format!("{}^^{}", literal(value), iri(datatype)),
            Self::Tagged { value, language } => format!("{}@{language}", literal(value)),
        }
    }
}

/// A concrete triple with an IRI subject and predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Node,
}

impl Triple {
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: Node) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        }
    }

    fn render(&self) -> String {
        format!(
            "{} {} {} .",
            iri(&self.subject),
            iri(&self.predicate),
            self.object.render()
        )
    }
}

/// Wrap an IRI for use in a statement.
pub fn iri(value: &str) -> String {
    format!("<{value}>")
}

/// Quote and escape a plain string literal.
pub fn literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `VALUES ?var { <a> <b> }`
pub fn values<S: AsRef<str>>(var: &str, iris: &[S]) -> String {
    let mut out = format!("VALUES ?{var} {{");
    for value in iris {
        let _ = write!(out, " {}", iri(value.as_ref()));
    }
    out.push_str(" }");
    out
}

fn data_block(keyword: &str, graph: &str, triples: &[Triple]) -> String {
    let mut out = format!("{keyword} DATA {{ GRAPH {} {{\n", iri(graph));
    for triple in triples {
        let _ = writeln!(out, "  {}", triple.render());
    }
    out.push_str("} }");
    out
}

/// `INSERT DATA` of exactly these triples into one graph.
pub fn insert_data(graph: &str, triples: &[Triple]) -> String {
    data_block("INSERT", graph, triples)
}

/// `DELETE DATA` of exactly these triples from one graph.
pub fn delete_data(graph: &str, triples: &[Triple]) -> String {
    data_block("DELETE", graph, triples)
}

/// Remove every value of `predicate` on `subject`, then set `object`.
pub fn replace_predicate(graph: &str, subject: &str, predicate: &str, object: &Node) -> String {
    format!(
        "DELETE WHERE {{ GRAPH {g} {{ {s} {p} ?old }} }} ;\n\
         INSERT DATA {{ GRAPH {g} {{ {s} {p} {o} }} }}",
        g = iri(graph),
        s = iri(subject),
        p = iri(predicate),
        o = object.render(),
    )
}

/// Remove every value of `predicate` on `subject`.
pub fn delete_predicate(graph: &str, subject: &str, predicate: &str) -> String {
    format!(
        "DELETE WHERE {{ GRAPH {} {{ {} {} ?old }} }}",
        iri(graph),
        iri(subject),
        iri(predicate),
    )
}

/// Join update operations into one request.
pub fn sequence<S: AsRef<str>>(operations: &[S]) -> String {
    operations
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ;\n")
}

/// Rewrite every reference to `old` in `graph` so it points at `new`.
pub fn repoint_references(graph: &str, old: &str, new: &str) -> String {
    format!(
        "DELETE {{ GRAPH {g} {{ ?s ?p {old} }} }}\n\
         INSERT {{ GRAPH {g} {{ ?s ?p {new} }} }}\n\
         WHERE {{ GRAPH {g} {{ ?s ?p {old} }} }}",
        g = iri(graph),
        old = iri(old),
        new = iri(new),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_are_escaped() {
        assert_eq!(literal("plain"), "\"plain\"");
        assert_eq!(literal("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\"");
        assert_eq!(literal("back\\slash"), "\"back\\\\slash\"");
    }

    #[test]
    fn data_block_renders_every_triple() {
        let triples = vec![
            Triple::new("urn:s", "urn:p", Node::iri("urn:o")),
            Triple::new("urn:s", "urn:q", Node::typed("3", "urn:int")),
        ];
        let text = insert_data("urn:g", &triples);
        assert!(text.starts_with("INSERT DATA { GRAPH <urn:g> {"));
        assert!(text.contains("<urn:s> <urn:p> <urn:o> ."));
        assert!(text.contains("<urn:s> <urn:q> \"3\"^^<urn:int> ."));
    }

    #[test]
    fn sequence_joins_operations() {
        let text = sequence(&[
            delete_predicate("urn:g", "urn:s", "urn:p"),
            insert_data("urn:g", &[Triple::new("urn:s", "urn:p", Node::literal("x"))]),
        ]);
        assert!(text.starts_with("DELETE WHERE { GRAPH <urn:g> { <urn:s> <urn:p> ?old } } ;\n"));
        assert!(text.ends_with("} }"));
    }

    #[test]
    fn values_clause() {
        assert_eq!(values("g", &["urn:a", "urn:b"]), "VALUES ?g { <urn:a> <urn:b> }");
    }

    #[test]
    fn escaped_statements_execute() {
        use crate::store::{GraphStore, OxigraphStore};

        let store = OxigraphStore::in_memory(std::time::Duration::from_secs(5)).unwrap();
        let tricky = "quote \" backslash \\ newline \n done";
        store
            .update(&insert_data(
                "urn:g",
                &[Triple::new("urn:s", "urn:p", Node::literal(tricky))],
            ))
            .unwrap();
        let rows = store
            .select("SELECT ?o WHERE { GRAPH <urn:g> { <urn:s> <urn:p> ?o } }")
            .unwrap();
        assert_eq!(rows[0].str("o"), Some(tricky));

        store
            .update(&replace_predicate("urn:g", "urn:s", "urn:p", &Node::literal("new")))
            .unwrap();
        let rows = store
            .select("SELECT ?o WHERE { GRAPH <urn:g> { <urn:s> <urn:p> ?o } }")
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].str("o"), Some("new"));
    }
}
