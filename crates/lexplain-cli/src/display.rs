//! Terminal rendering for articles, graphs, search hits and streamed turns.
//!
//! Cards follow one layout: a `=== heading ===` banner, then sections with
//! a left column padded to 26 characters.

use std::fmt::Write as _;
use std::io::Write as _;

use chrono::Utc;
use lexplain_core::{ArticleDetail, Graph, SearchResult};
use lexplain_stream::{
    FAILURE_MESSAGE, SettledKind, TransportError, TurnId, TurnObserver, TurnSnapshot,
};

const MAX_SNIPPET: usize = 160;

// ── Cards ──

pub fn article_card(article: &ArticleDetail) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", article.heading());
    let _ = writeln!(out);

    if !article.obligations.is_empty() {
        let _ = writeln!(out, "Obligations ({})", article.obligations.len());
        for obligation in &article.obligations {
            let _ = writeln!(out, "  {:<26} {}", obligation.role, obligation.summary);
        }
        let _ = writeln!(out);
    }
    if !article.terms.is_empty() {
        let _ = writeln!(out, "Definitions ({})", article.terms.len());
        for term in &article.terms {
            let _ = writeln!(out, "  {:<26} {}", term.term, term.definition);
        }
        let _ = writeln!(out);
    }
    if !article.topics.is_empty() {
        let topics: Vec<&str> = article.topics.iter().map(String::as_str).collect();
        let _ = writeln!(out, "Topics");
        let _ = writeln!(out, "  {}", topics.join(", "));
        let _ = writeln!(out);
    }
    if !article.references.is_empty() {
        let _ = writeln!(out, "References");
        for reference in &article.references {
            let _ = writeln!(out, "  {:<26} Art. {}", reference.id, reference.number);
        }
        let _ = writeln!(out);
    }
    out
}

pub fn graph_text(graph: &Graph) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Graph ({} nodes, {} edges)",
        graph.nodes().len(),
        graph.edges().len()
    );
    for node in graph.nodes() {
        let _ = write!(out, "  {:<26} {:<10} {}", node.id, node.kind.as_str(), node.label);
        if let Some(tooltip) = &node.tooltip {
            let _ = write!(out, "  ({})", truncate(tooltip, 60));
        }
        let _ = writeln!(out);
    }
    for edge in graph.edges() {
        let _ = writeln!(out, "  {:<26} -{}-> {}", edge.source, edge.label, edge.target);
    }
    out
}

pub fn search_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No matching articles.\n".to_string();
    }
    let mut out = String::new();
    for (rank, hit) in results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}. {:<26} {:.2}  [{}]",
            rank + 1,
            format!("Art. {} {}", hit.article_number, truncate(&hit.title, 16)),
            hit.score,
            hit.id
        );
        if !hit.text_snippet.is_empty() {
            let _ = writeln!(out, "       {}", truncate(&hit.text_snippet, MAX_SNIPPET));
        }
    }
    out
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

// ── Streaming ──

/// Prints a turn as it streams: token deltas in place, then the settled
/// text and attachment.
#[derive(Default)]
pub struct StreamPrinter {
    shown: String,
    last_error: Option<TransportError>,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The transport error reported for the last turn, if any.
    pub fn take_error(&mut self) -> Option<TransportError> {
        self.last_error.take()
    }

    /// Reset between turns.
    pub fn reset(&mut self) {
        self.shown.clear();
        self.last_error = None;
    }

    /// Print the failure notice below whatever streamed so far.
    pub fn show_failure(&self) {
        if !self.shown.is_empty() {
            println!();
        }
        println!("{FAILURE_MESSAGE}");
    }

    fn print_settled(&mut self, turn: &TurnSnapshot) {
        if turn.text != self.shown {
            if !self.shown.is_empty() {
                println!();
            }
            print!("{}", turn.text);
        }
        println!();
        self.shown.clone_from(&turn.text);

        match turn.settled_kind() {
            SettledKind::SearchResults => {
                if let Some(results) = turn.search_results() {
                    println!();
                    print!("{}", search_results(results));
                }
            }
            SettledKind::Explanation => {
                if let Some(article) = turn.article() {
                    println!();
                    print!("{}", article_card(article));
                    print!("{}", graph_text(&lexplain_core::graph::build(article)));
                }
            }
            SettledKind::Error | SettledKind::None => {}
        }

        let elapsed = Utc::now().signed_duration_since(turn.started_at);
        eprintln!(
            "[{} {} in {:.1}s]",
            turn.id,
            turn.state,
            elapsed.num_milliseconds() as f64 / 1000.0
        );
    }
}

impl TurnObserver for StreamPrinter {
    fn on_progress(&mut self, turn: &TurnSnapshot) {
        if !turn.is_open() {
            self.print_settled(turn);
            return;
        }
        if let Some(delta) = turn.text.strip_prefix(self.shown.as_str()) {
            print!("{delta}");
        } else {
            print!("\n{}", turn.text);
        }
        self.shown.clone_from(&turn.text);
        std::io::stdout().flush().ok();
    }

    fn on_error(&mut self, _turn: TurnId, error: TransportError) {
        self.show_failure();
        self.last_error = Some(error);
    }

    fn on_complete(&mut self, _turn: TurnId) {}
}

#[cfg(test)]
mod tests {
    use lexplain_core::{ArticleRef, DefinedTerm, Obligation, graph};

    use super::*;

    fn article() -> ArticleDetail {
        ArticleDetail {
            id: "art-6".into(),
            number: 6,
            title: "Lawfulness of processing".into(),
            obligations: vec![Obligation {
                summary: "have a lawful basis".into(),
                role: "Controller".into(),
            }],
            terms: vec![DefinedTerm {
                term: "consent".into(),
                definition: "freely given indication".into(),
            }],
            topics: ["lawfulness".to_string()].into(),
            references: vec![ArticleRef {
                id: "art-5".into(),
                number: 5,
            }],
        }
    }

    #[test]
    fn card_lists_every_section() {
        let card = article_card(&article());
        assert!(card.starts_with("=== Article 6: Lawfulness of processing ===\n"));
        assert!(card.contains(&format!("  {:<26} have a lawful basis\n", "Controller")));
        assert!(card.contains("Definitions (1)"));
        assert!(card.contains("  lawfulness\n"));
        assert!(card.contains(&format!("  {:<26} Art. 5\n", "art-5")));
    }

    #[test]
    fn card_skips_empty_sections() {
        let mut bare = article();
        bare.obligations.clear();
        bare.terms.clear();
        bare.topics.clear();
        bare.references.clear();
        assert_eq!(article_card(&bare), "=== Article 6: Lawfulness of processing ===\n\n");
    }

    #[test]
    fn graph_text_lists_nodes_then_edges() {
        let text = graph_text(&graph::build(&article()));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Graph (5 nodes, 4 edges)");
        assert!(lines[2].contains("obl-0") && lines[2].ends_with("(have a lawful basis)"));
        assert!(lines.last().unwrap().ends_with("-REFERS_TO-> art-5"));
    }

    #[test]
    fn search_results_are_ranked_in_order() {
        let hits = vec![
            SearchResult {
                id: "a17".into(),
                article_number: 17,
                title: "Right to erasure".into(),
                text_snippet: "The data subject shall have the right".into(),
                score: 0.923,
            },
            SearchResult {
                id: "a5".into(),
                article_number: 5,
                title: "Principles".into(),
                text_snippet: String::new(),
                score: 0.4,
            },
        ];
        let text = search_results(&hits);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("  1. Art. 17 Right to erasure"));
        assert!(lines[0].contains("0.92  [a17]"));
        assert!(lines[2].starts_with("  2. Art. 5 Principles"));
        assert_eq!(search_results(&[]), "No matching articles.\n");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Verarbeitungsgrundsätze", 10), "Verarbe...");
        assert_eq!(truncate("ääääääääääää", 5), "ää...");
    }
}
