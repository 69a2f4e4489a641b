//! Structural paths over the accessibility tree.
//!
//! Supports the subset of XPath that uiautomator tooling emits:
//!
//! ```text
//! /hierarchy/android.widget.FrameLayout/android.widget.LinearLayout[2]
//! //Button[@text='Sign In']
//! //*[contains(@content-desc,'Close') and @clickable='true']
//! //RecyclerView/*[starts-with(@resource-id,'com.eatvermont')][1]
//! ```
//!
//! Node tests match the full class name or its short form; `*` and `node`
//! match anything. Positions are 1-based and counted per parent.

use crate::result::{ProbeError, ProbeResult};
use crate::tree::UiTree;
use std::iter::Peekable;
use std::str::Chars;

/// A parsed structural path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    descendant: bool,
    name: NameTest,
    filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Class(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Filter {
    Position(usize),
    Conditions(Vec<Condition>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Condition {
    Equals(String, String),
    Contains(String, String),
    StartsWith(String, String),
    Present(String),
}

impl Condition {
    fn holds(&self, tree: &UiTree, index: usize) -> bool {
        let Some(element) = tree.get(index) else {
            return false;
        };
        match self {
            Self::Equals(attr, value) => element.attribute(attr).as_deref() == Some(value),
            Self::Contains(attr, value) => element
                .attribute(attr)
                .is_some_and(|actual| actual.contains(value.as_str())),
            Self::StartsWith(attr, value) => element
                .attribute(attr)
                .is_some_and(|actual| actual.starts_with(value.as_str())),
            Self::Present(attr) => element.attribute(attr).is_some_and(|a| !a.is_empty()),
        }
    }
}

impl PathExpr {
    /// Parse a structural path
    ///
    /// # Errors
    ///
    /// Returns a parse error describing the first unsupported construct
    pub fn parse(raw: &str) -> ProbeResult<Self> {
        Parser::new(raw).parse()
    }

    /// Indices of matching nodes in document order, without duplicates
    #[must_use]
    pub fn evaluate(&self, tree: &UiTree) -> Vec<usize> {
        // `None` is the document node above the roots
        let mut contexts: Vec<Option<usize>> = vec![None];

        for (i, step) in self.steps.iter().enumerate() {
            if i == 0 && !step.descendant && step.name == NameTest::Class("hierarchy".into()) {
                continue;
            }
            let mut next = Vec::new();
            for &context in &contexts {
                let bases = if step.descendant {
                    descendant_or_self(tree, context)
                } else {
                    vec![context]
                };
                for base in bases {
                    next.extend(step.apply(tree, children_of(tree, base)));
                }
            }
            next.sort_unstable();
            next.dedup();
            contexts = next.into_iter().map(Some).collect();
        }

        contexts.into_iter().flatten().collect()
    }
}

impl Step {
    fn apply(&self, tree: &UiTree, candidates: &[usize]) -> Vec<usize> {
        let mut hits: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| self.name_matches(tree, i))
            .collect();
        for filter in &self.filters {
            hits = match filter {
                Filter::Position(n) => hits.get(n - 1).map(|&i| vec![i]).unwrap_or_default(),
                Filter::Conditions(conds) => hits
                    .into_iter()
                    .filter(|&i| conds.iter().all(|c| c.holds(tree, i)))
                    .collect(),
            };
        }
        hits
    }

    fn name_matches(&self, tree: &UiTree, index: usize) -> bool {
        match &self.name {
            NameTest::Any => true,
            NameTest::Class(name) => tree
                .get(index)
                .is_some_and(|e| e.class_name == *name || e.short_class() == name),
        }
    }
}

fn children_of(tree: &UiTree, node: Option<usize>) -> &[usize] {
    match node {
        None => tree.roots(),
        Some(i) => tree.children(i),
    }
}

fn descendant_or_self(tree: &UiTree, node: Option<usize>) -> Vec<Option<usize>> {
    match node {
        None => std::iter::once(None)
            .chain((0..tree.len()).map(Some))
            .collect(),
        Some(i) => tree.subtree(i).into_iter().map(Some).collect(),
    }
}

struct Parser<'a> {
    raw: &'a str,
    chars: Peekable<Chars<'a>>,
}

impl<'a> Parser<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            chars: raw.trim().chars().peekable(),
        }
    }

    fn error(&self, reason: impl std::fmt::Display) -> ProbeError {
        ProbeError::parse(format!("invalid structural path '{}': {reason}", self.raw))
    }

    fn parse(mut self) -> ProbeResult<PathExpr> {
        let mut steps = Vec::new();
        while self.chars.peek().is_some() {
            if !self.eat('/') {
                return Err(self.error("expected '/'"));
            }
            let descendant = self.eat('/');
            steps.push(self.step(descendant)?);
        }
        if steps.is_empty() {
            return Err(self.error("empty path"));
        }
        Ok(PathExpr { steps })
    }

    fn step(&mut self, descendant: bool) -> ProbeResult<Step> {
        let name = if self.eat('*') {
            NameTest::Any
        } else {
            match self.name().as_str() {
                "" => return Err(self.error("expected a node test")),
                "node" => NameTest::Any,
                other => NameTest::Class(other.to_string()),
            }
        };

        let mut filters = Vec::new();
        while self.eat('[') {
            self.skip_ws();
            let filter = if self.chars.peek().is_some_and(char::is_ascii_digit) {
                let n = self.number()?;
                if n == 0 {
                    return Err(self.error("positions start at 1"));
                }
                Filter::Position(n)
            } else {
                Filter::Conditions(self.conditions()?)
            };
            self.skip_ws();
            if !self.eat(']') {
                return Err(self.error("expected ']'"));
            }
            filters.push(filter);
        }

        Ok(Step {
            descendant,
            name,
            filters,
        })
    }

    fn conditions(&mut self) -> ProbeResult<Vec<Condition>> {
        let mut conds = vec![self.condition()?];
        loop {
            self.skip_ws();
            if self.chars.peek() == Some(&']') {
                return Ok(conds);
            }
            if self.name() != "and" {
                return Err(self.error("expected 'and' or ']'"));
            }
            conds.push(self.condition()?);
        }
    }

    fn condition(&mut self) -> ProbeResult<Condition> {
        self.skip_ws();
        if self.chars.peek() == Some(&'@') {
            let attr = self.attribute()?;
            self.skip_ws();
            if !self.eat('=') {
                return Ok(Condition::Present(attr));
            }
            let value = self.literal()?;
            return Ok(Condition::Equals(attr, value));
        }

        let function = self.name();
        self.skip_ws();
        if !self.eat('(') {
            return Err(self.error(format!("unsupported expression '{function}'")));
        }
        let attr = self.attribute()?;
        self.skip_ws();
        if !self.eat(',') {
            return Err(self.error("expected ','"));
        }
        let value = self.literal()?;
        self.skip_ws();
        if !self.eat(')') {
            return Err(self.error("expected ')'"));
        }
        match function.as_str() {
            "contains" => Ok(Condition::Contains(attr, value)),
            "starts-with" => Ok(Condition::StartsWith(attr, value)),
            other => Err(self.error(format!("unsupported function '{other}'"))),
        }
    }

    fn attribute(&mut self) -> ProbeResult<String> {
        self.skip_ws();
        if !self.eat('@') {
            return Err(self.error("expected '@attribute'"));
        }
        let attr = self.name();
        if attr.is_empty() {
            return Err(self.error("empty attribute name"));
        }
        Ok(attr)
    }

    fn literal(&mut self) -> ProbeResult<String> {
        self.skip_ws();
        let quote = match self.chars.next() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected a quoted string")),
        };
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some(c) if c == quote => return Ok(value),
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn number(&mut self) -> ProbeResult<usize> {
        let mut digits = String::new();
        while let Some(c) = self.chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(c);
            self.chars.next();
        }
        digits.parse().map_err(|_| self.error("bad position"))
    }

    fn name(&mut self) -> String {
        let mut name = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '$') {
                name.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        name
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tree::{Size, UiNode};

    fn feed() -> UiTree {
        UiTree::screen(
            Size::new(1080, 2340),
            [
                UiNode::widget("LinearLayout").children([
                    UiNode::text_view("Today"),
                    UiNode::widget("ImageButton").desc("Close dialog").clickable(true),
                ]),
                UiNode::new("androidx.recyclerview.widget.RecyclerView")
                    .scrollable(true)
                    .children([
                        UiNode::widget("LinearLayout")
                            .id("com.eatvermont.app:id/event_row")
                            .child(UiNode::text_view("Maple Fest")),
                        UiNode::widget("LinearLayout")
                            .id("com.eatvermont.app:id/event_row")
                            .child(UiNode::text_view("Cider Days")),
                    ]),
            ],
        )
    }

    fn texts(tree: &UiTree, path: &str) -> Vec<String> {
        PathExpr::parse(path)
            .unwrap()
            .evaluate(tree)
            .into_iter()
            .map(|i| tree.get(i).unwrap().label().to_string())
            .collect()
    }

    mod evaluation {
        use super::*;

        #[test]
        fn test_descendant_by_attribute() {
            assert_eq!(texts(&feed(), "//TextView[@text='Cider Days']"), vec!["Cider Days"]);
        }

        #[test]
        fn test_absolute_with_hierarchy_prefix() {
            let tree = feed();
            let hits = texts(
                &tree,
                "/hierarchy/android.widget.FrameLayout/android.widget.LinearLayout/android.widget.TextView",
            );
            assert_eq!(hits, vec!["Today"]);
        }

        #[test]
        fn test_positional_per_parent() {
            let tree = feed();
            // each row has exactly one TextView, so [1] picks one per row
            assert_eq!(texts(&tree, "//RecyclerView/*/TextView[1]"), vec!["Maple Fest", "Cider Days"]);
            assert_eq!(
                texts(&tree, "//RecyclerView/LinearLayout[2]/TextView"),
                vec!["Cider Days"]
            );
            assert!(texts(&tree, "//RecyclerView/LinearLayout[3]").is_empty());
        }

        #[test]
        fn test_contains_and_conjunction() {
            let tree = feed();
            assert_eq!(
                texts(&tree, "//*[contains(@content-desc,'Close') and @clickable='true']"),
                vec!["Close dialog"]
            );
            assert!(texts(&tree, "//*[contains(@content-desc,'Close') and @clickable='false']").is_empty());
        }

        #[test]
        fn test_starts_with_and_presence() {
            let tree = feed();
            let rows = PathExpr::parse("//*[starts-with(@resource-id,'com.eatvermont')]")
                .unwrap()
                .evaluate(&tree);
            assert_eq!(rows.len(), 2);
            let described = texts(&tree, "//node[@content-desc]");
            assert_eq!(described, vec!["Close dialog"]);
        }

        #[test]
        fn test_results_are_deduplicated_in_document_order() {
            let tree = feed();
            let hits = PathExpr::parse("//*//TextView").unwrap().evaluate(&tree);
            let mut sorted = hits.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(hits, sorted);
            assert_eq!(hits.len(), 3);
        }

        #[test]
        fn test_filter_then_position() {
            let tree = feed();
            assert_eq!(
                texts(&tree, "//TextView[contains(@text,'a')][2]"),
                Vec::<String>::new()
            );
            assert_eq!(
                texts(&tree, "//LinearLayout[@resource-id='com.eatvermont.app:id/event_row'][2]/TextView"),
                vec!["Cider Days"]
            );
        }
    }

    mod parsing {
        use super::*;

        #[test]
        fn test_rejects_malformed_paths() {
            for bad in [
                "",
                "Button",
                "//",
                "//Button[",
                "//Button[@text=Sign]",
                "//Button[@text='open",
                "//Button[0]",
                "//Button[last()]",
                "//Button[@text='a' or @text='b']",
            ] {
                assert!(PathExpr::parse(bad).is_err(), "accepted {bad:?}");
            }
        }

        #[test]
        fn test_double_quoted_literals() {
            let tree = feed();
            assert_eq!(texts(&tree, "//TextView[@text=\"Today\"]"), vec!["Today"]);
        }
    }
}
