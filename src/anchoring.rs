//! Re-anchoring highlights onto a live document.
//!
//! Highlights carry char offsets into the text snapshot taken at
//! extraction time. The live page a user is looking at may differ: scripts
//! re-ran, banners appeared, whitespace changed. [`plan_render`] maps each
//! highlight onto the live document and returns a plan that a renderer can
//! apply without doing any matching of its own.
//!
//! Matching is best effort. A span is looked up exactly at its original
//! offset, then anywhere (nearest to its proportional position wins), then
//! ignoring ASCII case. Failing that the highlight's selector is tried,
//! and failing that the highlight is dropped. Nothing is ever marked on a guess.

use crate::types::{Highlight, Severity};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// One text node of the live document, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveNode {
    /// Path of the element containing the text, as a CSS selector.
    pub path: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RenderTarget {
    /// Char offsets into `LiveDocument::nodes()`; the end offset is exclusive.
    #[serde(rename_all = "camelCase")]
    TextRange {
        start_node: usize,
        start_offset: usize,
        end_node: usize,
        end_offset: usize,
    },
    Element { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderItem {
    pub highlight_id: String,
    pub severity: Severity,
    pub target: RenderTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPlan {
    pub items: Vec<RenderItem>,
    /// Ids of highlights that could not be placed.
    pub dropped: Vec<String>,
}

/// Parsed live markup plus its text nodes and the whitespace-normalized
/// text they join into.
pub struct LiveDocument {
    html: Html,
    nodes: Vec<LiveNode>,
    text: Vec<char>,
    /// For each char of `text`, the node and char offset it came from.
    origin: Vec<(usize, usize)>,
}

impl std::fmt::Debug for LiveDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveDocument")
            .field("nodes", &self.nodes.len())
            .field("text_chars", &self.text.len())
            .finish()
    }
}

fn element_path(el: ElementRef) -> String {
    let mut segments = Vec::new();
    let mut current = Some(el);
    while let Some(e) = current {
        let name = e.value().name();
        let index = e
            .prev_siblings()
            .filter_map(ElementRef::wrap)
            .filter(|s| s.value().name() == name)
            .count()
            + 1;
        segments.push(format!("{}:nth-of-type({})", name, index));
        current = e.parent().and_then(ElementRef::wrap);
    }
    segments.reverse();
    segments.join(" > ")
}

fn collect_nodes(element: ElementRef, nodes: &mut Vec<LiveNode>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if matches!(
                child_element.value().name(),
                "script" | "style" | "noscript" | "template" | "head"
            ) {
                continue;
            }
            collect_nodes(child_element, nodes);
        } else if let Some(text) = child.value().as_text() {
            if !text.trim().is_empty() {
                nodes.push(LiveNode {
                    path: element_path(element),
                    text: text.to_string(),
                });
            }
        }
    }
}

impl LiveDocument {
    pub fn parse(markup: &str) -> Self {
        let html = Html::parse_document(markup);
        let mut nodes = Vec::new();
        collect_nodes(html.root_element(), &mut nodes);

        // Same normalization as extraction: nodes joined by a space, runs of
        // whitespace collapsed, no leading or trailing space.
        let mut text = Vec::new();
        let mut origin = Vec::new();
        let mut pending_space: Option<(usize, usize)> = None;
        for (ni, node) in nodes.iter().enumerate() {
            let mut len = 0;
            for (ci, c) in node.text.chars().enumerate() {
                len = ci + 1;
                if c.is_whitespace() {
                    if !text.is_empty() && pending_space.is_none() {
                        pending_space = Some((ni, ci));
                    }
                    continue;
                }
                if let Some(pos) = pending_space.take() {
                    text.push(' ');
                    origin.push(pos);
                }
                text.push(c);
                origin.push((ni, ci));
            }
            if !text.is_empty() && pending_space.is_none() {
                pending_space = Some((ni, len));
            }
        }

        Self {
            html,
            nodes,
            text,
            origin,
        }
    }

    pub fn nodes(&self) -> &[LiveNode] {
        &self.nodes
    }

    /// The normalized live text, comparable with an extraction snapshot.
    pub fn text(&self) -> String {
        self.text.iter().collect()
    }

    fn matches_at(&self, at: usize, needle: &[char], fold_case: bool) -> bool {
        self.text.get(at..at + needle.len()).is_some_and(|window| {
            window.iter().zip(needle).all(|(a, b)| {
                if fold_case {
                    a.eq_ignore_ascii_case(b)
                } else {
                    a == b
                }
            })
        })
    }

    /// Occurrence of `needle` closest to `expected`, earliest on ties.
    fn nearest(&self, needle: &[char], expected: usize, fold_case: bool) -> Option<usize> {
        if needle.is_empty() || needle.len() > self.text.len() {
            return None;
        }
        (0..=self.text.len() - needle.len())
            .filter(|&i| self.matches_at(i, needle, fold_case))
            .min_by_key(|&i| i.abs_diff(expected))
    }

    fn range_target(&self, start: usize, len: usize) -> RenderTarget {
        let (start_node, start_offset) = self.origin[start];
        let (end_node, last) = self.origin[start + len - 1];
        RenderTarget::TextRange {
            start_node,
            start_offset,
            end_node,
            end_offset: last + 1,
        }
    }

    fn locate_text(&self, snapshot: &[char], start: usize, end: usize) -> Option<RenderTarget> {
        let raw = snapshot.get(start..end)?;
        // never anchor on surrounding whitespace
        let lead = raw.iter().take_while(|c| c.is_whitespace()).count();
        let trail = raw.iter().rev().take_while(|c| c.is_whitespace()).count();
        if lead == raw.len() {
            return None;
        }
        let needle = &raw[lead..raw.len() - trail];
        let start = start + lead;

        let expected = if snapshot.is_empty() {
            0
        } else {
            (start as f64 / snapshot.len() as f64 * self.text.len() as f64) as usize
        };
        let found = if self.matches_at(start, needle, false) {
            Some(start)
        } else {
            self.nearest(needle, expected, false)
                .or_else(|| self.nearest(needle, expected, true))
        };
        found.map(|at| self.range_target(at, needle.len()))
    }

    fn locate_selector(&self, selector: &str) -> Option<RenderTarget> {
        let sel = Selector::parse(selector).ok()?;
        let el = self.html.select(&sel).next()?;
        Some(RenderTarget::Element {
            path: element_path(el),
        })
    }
}

/// Places each highlight on the live document. `snapshot` is the extracted
/// text the highlights' offsets were computed against.
pub fn plan_render(snapshot: &str, live: &LiveDocument, highlights: &[Highlight]) -> RenderPlan {
    let snapshot: Vec<char> = snapshot.chars().collect();
    let mut plan = RenderPlan::default();
    for h in highlights {
        let target = h
            .anchor
            .text
            .and_then(|span| live.locate_text(&snapshot, span.start, span.end))
            .or_else(|| {
                h.anchor
                    .selector
                    .as_deref()
                    .and_then(|s| live.locate_selector(s))
            });
        match target {
            Some(target) => plan.items.push(RenderItem {
                highlight_id: h.id.clone(),
                severity: h.severity,
                target,
            }),
            None => plan.dropped.push(h.id.clone()),
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Anchor;

    fn highlight(id: &str, anchor: Anchor) -> Highlight {
        Highlight {
            id: id.to_string(),
            category: None,
            severity: Severity::Medium,
            reason: "r".into(),
            suggestion: "s".into(),
            anchor,
            example: None,
        }
    }

    #[test]
    fn test_text_normalization_matches_extraction() {
        let live = LiveDocument::parse(
            "<html><body><p>Hello   <b>big</b>\n world.</p><script>var x;</script></body></html>",
        );
        assert_eq!(live.text(), "Hello big world.");
        assert_eq!(live.nodes().len(), 3);
        assert_eq!(live.nodes()[1].path, "html:nth-of-type(1) > body:nth-of-type(1) > p:nth-of-type(1) > b:nth-of-type(1)");
    }

    #[test]
    fn test_exact_match_in_place() {
        let live = LiveDocument::parse("<body><p>Caching saves time.</p></body>");
        let plan = plan_render("Caching saves time.", &live, &[highlight("hl-1", Anchor::span(8, 13))]);
        assert_eq!(
            plan.items[0].target,
            RenderTarget::TextRange { start_node: 0, start_offset: 8, end_node: 0, end_offset: 13 }
        );
        assert!(plan.dropped.is_empty());
    }

    #[test]
    fn test_drifted_text_is_found() {
        let live = LiveDocument::parse(
            "<body><div>Cookie banner text</div><p>Caching saves <em>time</em>.</p></body>",
        );
        // "saves time" in the snapshot
        let plan = plan_render("Caching saves time.", &live, &[highlight("hl-1", Anchor::span(8, 18))]);
        assert_eq!(
            plan.items[0].target,
            RenderTarget::TextRange { start_node: 1, start_offset: 8, end_node: 2, end_offset: 4 }
        );
    }

    #[test]
    fn test_case_drift_and_selector_fallback() {
        let live = LiveDocument::parse("<body><h1>Guide</h1><p>CACHING SAVES TIME.</p></body>");
        let highlights = vec![
            highlight("hl-1", Anchor::span(0, 7)),
            highlight("hl-2", Anchor::span(20, 33).with_selector("h1")),
            highlight("hl-3", Anchor::selector("table")),
        ];
        let plan = plan_render("Caching saves time. Old paragraph.", &live, &highlights);
        assert_eq!(plan.items.len(), 2);
        assert!(matches!(plan.items[0].target, RenderTarget::TextRange { start_node: 1, .. }));
        // "Old paragraph" is gone from the live page
        assert_eq!(
            plan.items[1].target,
            RenderTarget::Element { path: "html:nth-of-type(1) > body:nth-of-type(1) > h1:nth-of-type(1)".into() }
        );
        assert_eq!(plan.dropped, vec!["hl-3".to_string()]);
    }

    #[test]
    fn test_out_of_range_span_without_selector_is_dropped() {
        let live = LiveDocument::parse("<body><p>Short</p></body>");
        let plan = plan_render("Short", &live, &[highlight("hl-1", Anchor::span(3, 50))]);
        assert!(plan.items.is_empty());
        assert_eq!(plan.dropped, vec!["hl-1".to_string()]);
    }
}
