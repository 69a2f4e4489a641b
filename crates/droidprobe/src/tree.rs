//! Accessibility tree snapshots.
//!
//! A [`UiTree`] is one immutable view of the screen, parsed from a uiautomator
//! hierarchy dump. Nodes are stored flat in document (pre-order) order; the
//! position of a node in that order is its `index`.

use crate::result::{ProbeError, ProbeResult};
use crate::target::Predicate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::OnceLock;

/// Android class prefix used by the short-name constructors
pub const WIDGET_PREFIX: &str = "android.widget.";

/// A point in device pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: i32,
    /// Y coordinate
    pub y: i32,
}

impl Point {
    /// Create a new point
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Screen dimensions in device pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    /// Width
    pub width: i32,
    /// Height
    pub height: i32,
}

impl Size {
    /// Create a new size
    #[must_use]
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Point at the given fractions of the width and height
    #[must_use]
    pub fn at_fraction(&self, fx: f64, fy: f64) -> Point {
        Point::new(
            (f64::from(self.width) * fx).round() as i32,
            (f64::from(self.height) * fy).round() as i32,
        )
    }
}

/// Element bounds as reported by uiautomator (`[left,top][right,bottom]`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Bounds {
    /// Left edge
    pub left: i32,
    /// Top edge
    pub top: i32,
    /// Right edge (exclusive)
    pub right: i32,
    /// Bottom edge (exclusive)
    pub bottom: i32,
}

impl Bounds {
    /// Create new bounds
    #[must_use]
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Width in pixels
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    /// Height in pixels
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Whether the bounds cover no pixels (off-screen or collapsed)
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Center point
    #[must_use]
    pub const fn center(&self) -> Point {
        Point::new(
            self.left + self.width() / 2,
            self.top + self.height() / 2,
        )
    }

    /// Check if a point lies inside the bounds
    #[must_use]
    pub const fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x < self.right && point.y >= self.top && point.y < self.bottom
    }

    /// Smallest bounds covering both
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Parse the uiautomator `[l,t][r,b]` form
    ///
    /// # Errors
    ///
    /// Returns a parse error on malformed input
    #[allow(clippy::expect_used)] // literal pattern
    pub fn parse(raw: &str) -> ProbeResult<Self> {
        static BOUNDS: OnceLock<Regex> = OnceLock::new();
        let re = BOUNDS.get_or_init(|| {
            Regex::new(r"^\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]$").expect("valid bounds regex")
        });
        let caps = re
            .captures(raw.trim())
            .ok_or_else(|| ProbeError::parse(format!("invalid bounds '{raw}'")))?;
        let num = |i: usize| -> ProbeResult<i32> {
            caps[i]
                .parse()
                .map_err(|_| ProbeError::parse(format!("invalid bounds '{raw}'")))
        };
        Ok(Self::new(num(1)?, num(2)?, num(3)?, num(4)?))
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{},{}][{},{}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// One node of a snapshot, without its children
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Element {
    /// Position in document order
    pub index: usize,
    /// Fully qualified class name
    pub class_name: String,
    /// Visible text
    pub text: String,
    /// Accessibility description
    pub content_desc: String,
    /// Resource identifier (`package:id/name`)
    pub resource_id: String,
    /// Owning package
    pub package: String,
    /// On-screen bounds
    pub bounds: Bounds,
    /// Accepts taps
    pub clickable: bool,
    /// Enabled for input
    pub enabled: bool,
    /// Can take focus
    pub focusable: bool,
    /// Currently focused
    pub focused: bool,
    /// Scroll container
    pub scrollable: bool,
    /// Selected (tabs, list items)
    pub selected: bool,
    /// Has a checked state
    pub checkable: bool,
    /// Checked
    pub checked: bool,
}

impl Element {
    /// Class name without the package prefix
    #[must_use]
    pub fn short_class(&self) -> &str {
        self.class_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.class_name)
    }

    /// Label a human would use: description, then text, then resource id
    #[must_use]
    pub fn label(&self) -> &str {
        if !self.content_desc.is_empty() {
            &self.content_desc
        } else if !self.text.is_empty() {
            &self.text
        } else {
            &self.resource_id
        }
    }

    /// Whether the element occupies screen space
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        !self.bounds.is_empty()
    }

    /// Look up an attribute by its uiautomator name
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        let flag = |b: bool| Some(b.to_string());
        match name {
            "text" => Some(self.text.clone()),
            "content-desc" => Some(self.content_desc.clone()),
            "resource-id" => Some(self.resource_id.clone()),
            "class" => Some(self.class_name.clone()),
            "package" => Some(self.package.clone()),
            "bounds" => Some(self.bounds.to_string()),
            "clickable" => flag(self.clickable),
            "enabled" => flag(self.enabled),
            "focusable" => flag(self.focusable),
            "focused" => flag(self.focused),
            "scrollable" => flag(self.scrollable),
            "selected" => flag(self.selected),
            "checkable" => flag(self.checkable),
            "checked" => flag(self.checked),
            _ => None,
        }
    }
}

/// Nested node used to build trees in code
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UiNode {
    /// Attributes of this node
    pub element: Element,
    /// Child nodes in order
    pub children: Vec<UiNode>,
}

impl UiNode {
    /// Create a node with a fully qualified class name
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            element: Element {
                class_name: class_name.into(),
                enabled: true,
                ..Element::default()
            },
            children: Vec::new(),
        }
    }

    /// Create an `android.widget.*` node from its short name
    #[must_use]
    pub fn widget(short: &str) -> Self {
        Self::new(format!("{WIDGET_PREFIX}{short}"))
    }

    /// A TextView with the given text
    #[must_use]
    pub fn text_view(text: impl Into<String>) -> Self {
        Self::widget("TextView").text(text)
    }

    /// A clickable Button with the given text
    #[must_use]
    pub fn button(text: impl Into<String>) -> Self {
        Self::widget("Button").text(text).clickable(true)
    }

    /// Set text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.element.text = text.into();
        self
    }

    /// Set accessibility description
    #[must_use]
    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.element.content_desc = desc.into();
        self
    }

    /// Set resource id
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.element.resource_id = id.into();
        self
    }

    /// Set package
    #[must_use]
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.element.package = package.into();
        self
    }

    /// Set bounds
    #[must_use]
    pub const fn bounds(mut self, left: i32, top: i32, right: i32, bottom: i32) -> Self {
        self.element.bounds = Bounds::new(left, top, right, bottom);
        self
    }

    /// Set clickable
    #[must_use]
    pub const fn clickable(mut self, clickable: bool) -> Self {
        self.element.clickable = clickable;
        self
    }

    /// Set enabled
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.element.enabled = enabled;
        self
    }

    /// Set scrollable
    #[must_use]
    pub const fn scrollable(mut self, scrollable: bool) -> Self {
        self.element.scrollable = scrollable;
        self
    }

    /// Set selected
    #[must_use]
    pub const fn selected(mut self, selected: bool) -> Self {
        self.element.selected = selected;
        self
    }

    /// Set checkable and checked
    #[must_use]
    pub const fn checked(mut self, checked: bool) -> Self {
        self.element.checkable = true;
        self.element.checked = checked;
        self
    }

    /// Append a child
    #[must_use]
    pub fn child(mut self, child: UiNode) -> Self {
        self.children.push(child);
        self
    }

    /// Append several children
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = UiNode>) -> Self {
        self.children.extend(children);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeEntry {
    element: Element,
    parent: Option<usize>,
    children: Vec<usize>,
    depth: usize,
}

/// A parsed accessibility tree snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UiTree {
    nodes: Vec<NodeEntry>,
    roots: Vec<usize>,
    rotation: u8,
}

impl UiTree {
    /// Build a tree from nested nodes
    #[must_use]
    pub fn from_roots(roots: impl IntoIterator<Item = UiNode>) -> Self {
        let mut tree = Self::default();
        for root in roots {
            let idx = tree.push_nested(root, None, 0);
            tree.roots.push(idx);
        }
        tree
    }

    /// Build a tree with a single full-screen root frame holding `children`
    #[must_use]
    pub fn screen(size: Size, children: impl IntoIterator<Item = UiNode>) -> Self {
        let root = UiNode::widget("FrameLayout")
            .bounds(0, 0, size.width, size.height)
            .children(children);
        Self::from_roots([root])
    }

    fn push_nested(&mut self, node: UiNode, parent: Option<usize>, depth: usize) -> usize {
        let idx = self.push_entry(node.element, parent, depth);
        for child in node.children {
            let child_idx = self.push_nested(child, Some(idx), depth + 1);
            self.nodes[idx].children.push(child_idx);
        }
        idx
    }

    fn push_entry(&mut self, mut element: Element, parent: Option<usize>, depth: usize) -> usize {
        let idx = self.nodes.len();
        element.index = idx;
        self.nodes.push(NodeEntry {
            element,
            parent,
            children: Vec::new(),
            depth,
        });
        idx
    }

    /// Parse a uiautomator hierarchy dump
    ///
    /// # Errors
    ///
    /// Returns a parse error if the input is not a well-formed hierarchy
    #[allow(clippy::expect_used)] // literal patterns
    pub fn parse(xml: &str) -> ProbeResult<Self> {
        static TAG: OnceLock<Regex> = OnceLock::new();
        static ATTR: OnceLock<Regex> = OnceLock::new();
        let tag_re = TAG.get_or_init(|| {
            Regex::new(r"<(/?)([A-Za-z][\w.-]*)((?:\s+[\w:.-]+\s*=\s*(?:\x22[^\x22]*\x22|'[^']*'))*)\s*(/?)>")
                .expect("valid tag regex")
        });
        let attr_re = ATTR.get_or_init(|| {
            Regex::new(r#"([\w:.-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid attr regex")
        });

        let mut tree = Self::default();
        let mut stack: Vec<usize> = Vec::new();
        let mut saw_hierarchy = false;
        let mut hierarchy_open = false;

        for caps in tag_re.captures_iter(xml) {
            let closing = !caps[1].is_empty();
            let name = &caps[2];
            let attrs = caps.get(3).map_or("", |m| m.as_str());
            let self_closing = !caps[4].is_empty();

            match (name, closing) {
                ("hierarchy", false) => {
                    saw_hierarchy = true;
                    hierarchy_open = !self_closing;
                    for a in attr_re.captures_iter(attrs) {
                        if &a[1] == "rotation" {
                            let raw = a.get(2).or_else(|| a.get(3)).map_or("", |m| m.as_str());
                            tree.rotation = raw.parse().unwrap_or(0);
                        }
                    }
                }
                ("hierarchy", true) => {
                    if !stack.is_empty() {
                        return Err(ProbeError::parse(format!(
                            "{} unclosed node(s) at end of hierarchy",
                            stack.len()
                        )));
                    }
                    hierarchy_open = false;
                }
                ("node", false) => {
                    if !hierarchy_open {
                        return Err(ProbeError::parse("node outside of <hierarchy>"));
                    }
                    let element = parse_element(attr_re, attrs)?;
                    let parent = stack.last().copied();
                    let idx = tree.push_entry(element, parent, stack.len());
                    match parent {
                        Some(p) => tree.nodes[p].children.push(idx),
                        None => tree.roots.push(idx),
                    }
                    if !self_closing {
                        stack.push(idx);
                    }
                }
                ("node", true) => {
                    if stack.pop().is_none() {
                        return Err(ProbeError::parse("unbalanced </node>"));
                    }
                }
                _ => {}
            }
        }

        if !saw_hierarchy {
            return Err(ProbeError::parse("input is not a uiautomator hierarchy dump"));
        }
        if hierarchy_open || !stack.is_empty() {
            return Err(ProbeError::parse("truncated hierarchy dump"));
        }
        Ok(tree)
    }

    /// Number of nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the snapshot has no nodes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Screen rotation reported by the dump
    #[must_use]
    pub const fn rotation(&self) -> u8 {
        self.rotation
    }

    /// Node at a document-order index
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Element> {
        self.nodes.get(index).map(|n| &n.element)
    }

    /// Parent index of a node
    #[must_use]
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.nodes.get(index).and_then(|n| n.parent)
    }

    /// Child indices of a node
    #[must_use]
    pub fn children(&self, index: usize) -> &[usize] {
        self.nodes.get(index).map_or(&[], |n| n.children.as_slice())
    }

    /// Root node indices
    #[must_use]
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Depth of a node (roots are 0)
    #[must_use]
    pub fn depth(&self, index: usize) -> usize {
        self.nodes.get(index).map_or(0, |n| n.depth)
    }

    /// All elements in document order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.nodes.iter().map(|n| &n.element)
    }

    /// Indices of `index` and all of its descendants, in document order
    #[must_use]
    pub fn subtree(&self, index: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            if i >= self.nodes.len() {
                continue;
            }
            out.push(i);
            stack.extend(self.nodes[i].children.iter().rev().copied());
        }
        out
    }

    /// Elements matching a predicate, in document order
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed structural paths
    pub fn find_all(&self, predicate: &Predicate) -> ProbeResult<Vec<Element>> {
        predicate.select(self)
    }

    /// Convert back into nested builder nodes
    #[must_use]
    pub fn to_nodes(&self) -> Vec<UiNode> {
        self.roots.iter().map(|&r| self.nested(r)).collect()
    }

    fn nested(&self, index: usize) -> UiNode {
        UiNode {
            element: self.nodes[index].element.clone(),
            children: self.nodes[index]
                .children
                .iter()
                .map(|&c| self.nested(c))
                .collect(),
        }
    }

    /// Copy of the tree without the nodes failing `keep` (and their subtrees)
    #[must_use]
    pub fn retain(&self, keep: impl Fn(&Element) -> bool) -> Self {
        fn prune(node: UiNode, keep: &dyn Fn(&Element) -> bool) -> Option<UiNode> {
            if !keep(&node.element) {
                return None;
            }
            let children = node
                .children
                .into_iter()
                .filter_map(|c| prune(c, keep))
                .collect();
            Some(UiNode {
                element: node.element,
                children,
            })
        }
        let mut tree =
            Self::from_roots(self.to_nodes().into_iter().filter_map(|r| prune(r, &keep)));
        tree.rotation = self.rotation;
        tree
    }

    /// Indices of nodes whose bounds contain `point`, outermost first
    #[must_use]
    pub fn hit_test(&self, point: Point) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.element.bounds.contains(point))
            .map(|(i, _)| i)
            .collect()
    }

    /// Replace the text of one node
    pub fn set_text(&mut self, index: usize, text: impl Into<String>) {
        if let Some(entry) = self.nodes.get_mut(index) {
            entry.element.text = text.into();
        }
    }

    /// Bounds covering every root
    #[must_use]
    pub fn screen_bounds(&self) -> Option<Bounds> {
        self.roots
            .iter()
            .map(|&r| self.nodes[r].element.bounds)
            .reduce(|a, b| a.union(&b))
    }

    /// Serialize back to the uiautomator dump format
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::from(
            "<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>",
        );
        let _ = write!(out, "<hierarchy rotation=\"{}\">", self.rotation);
        for &root in &self.roots {
            self.write_node(&mut out, root, 0);
        }
        out.push_str("</hierarchy>");
        out
    }

    fn write_node(&self, out: &mut String, idx: usize, sibling_index: usize) {
        let entry = &self.nodes[idx];
        let e = &entry.element;
        let _ = write!(
            out,
            "<node index=\"{sibling_index}\" text=\"{}\" resource-id=\"{}\" class=\"{}\" package=\"{}\" content-desc=\"{}\" checkable=\"{}\" checked=\"{}\" clickable=\"{}\" enabled=\"{}\" focusable=\"{}\" focused=\"{}\" scrollable=\"{}\" selected=\"{}\" bounds=\"{}\"",
            escape(&e.text),
            escape(&e.resource_id),
            escape(&e.class_name),
            escape(&e.package),
            escape(&e.content_desc),
            e.checkable,
            e.checked,
            e.clickable,
            e.enabled,
            e.focusable,
            e.focused,
            e.scrollable,
            e.selected,
            e.bounds,
        );
        if entry.children.is_empty() {
            out.push_str(" />");
        } else {
            out.push('>');
            for (i, &child) in entry.children.iter().enumerate() {
                self.write_node(out, child, i);
            }
            out.push_str("</node>");
        }
    }

    /// Content hash of the snapshot.
    ///
    /// Focus is excluded: it flickers between dumps without the content
    /// changing.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.nodes {
            let e = &entry.element;
            hasher.update(
                format!(
                    "{}|{}|{}|{}|{}|{}|{}|{}\n",
                    entry.depth,
                    e.class_name,
                    e.text,
                    e.content_desc,
                    e.resource_id,
                    e.bounds,
                    e.selected,
                    e.checked
                )
                .as_bytes(),
            );
        }
        hasher.finalize().iter().fold(String::new(), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
    }

    /// Indented human-readable listing
    #[must_use]
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for entry in &self.nodes {
            let e = &entry.element;
            let _ = write!(out, "{}{}", "  ".repeat(entry.depth), e.short_class());
            if !e.text.is_empty() {
                let _ = write!(out, " {:?}", e.text);
            }
            if !e.content_desc.is_empty() {
                let _ = write!(out, " desc={:?}", e.content_desc);
            }
            if !e.resource_id.is_empty() {
                let _ = write!(out, " id={}", e.resource_id);
            }
            let _ = writeln!(out, " {}", e.bounds);
        }
        out
    }
}

fn parse_element(attr_re: &Regex, attrs: &str) -> ProbeResult<Element> {
    let mut element = Element {
        enabled: true,
        ..Element::default()
    };
    for a in attr_re.captures_iter(attrs) {
        let raw = a.get(2).or_else(|| a.get(3)).map_or("", |m| m.as_str());
        let value = unescape(raw);
        let flag = || value == "true";
        match &a[1] {
            "text" => element.text = value.clone(),
            "resource-id" => element.resource_id = value.clone(),
            "class" => element.class_name = value.clone(),
            "package" => element.package = value.clone(),
            "content-desc" => element.content_desc = value.clone(),
            "checkable" => element.checkable = flag(),
            "checked" => element.checked = flag(),
            "clickable" => element.clickable = flag(),
            "enabled" => element.enabled = flag(),
            "focusable" => element.focusable = flag(),
            "focused" => element.focused = flag(),
            "scrollable" => element.scrollable = flag(),
            "selected" => element.selected = flag(),
            "bounds" => element.bounds = Bounds::parse(&value)?,
            _ => {}
        }
    }
    Ok(element)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let Some(end) = rest.find(';') else {
            break;
        };
        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const LOGIN_DUMP: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?><hierarchy rotation="0"><node index="0" text="" resource-id="" class="android.widget.FrameLayout" package="com.eatvermont.app" content-desc="" checkable="false" checked="false" clickable="false" enabled="true" focusable="false" focused="false" scrollable="false" long-clickable="false" password="false" selected="false" bounds="[0,0][1080,2340]"><node index="0" text="Welcome back" resource-id="com.eatvermont.app:id/title" class="android.widget.TextView" package="com.eatvermont.app" content-desc="" checkable="false" checked="false" clickable="false" enabled="true" focusable="false" focused="false" scrollable="false" long-clickable="false" password="false" selected="false" bounds="[60,300][1020,380]" /><node index="1" text="Email" resource-id="com.eatvermont.app:id/email" class="android.widget.EditText" package="com.eatvermont.app" content-desc="" checkable="false" checked="false" clickable="true" enabled="true" focusable="true" focused="true" scrollable="false" long-clickable="true" password="false" selected="false" bounds="[60,500][1020,620]" /><node index="2" text="Log In" resource-id="" class="android.widget.Button" package="com.eatvermont.app" content-desc="Log in &amp; continue" checkable="false" checked="false" clickable="true" enabled="true" focusable="true" focused="false" scrollable="false" long-clickable="false" password="false" selected="false" bounds="[60,900][1020,1020]" /></node></hierarchy>"#;

    mod geometry {
        use super::*;

        #[test]
        fn test_bounds_parse() {
            let b = Bounds::parse("[60,300][1020,380]").unwrap();
            assert_eq!(b, Bounds::new(60, 300, 1020, 380));
            assert_eq!(b.width(), 960);
            assert_eq!(b.height(), 80);
        }

        #[test]
        fn test_bounds_parse_rejects_garbage() {
            assert!(Bounds::parse("[1,2]").is_err());
            assert!(Bounds::parse("").is_err());
        }

        #[test]
        fn test_bounds_center_and_contains() {
            let b = Bounds::new(0, 0, 100, 50);
            assert_eq!(b.center(), Point::new(50, 25));
            assert!(b.contains(Point::new(0, 0)));
            assert!(!b.contains(Point::new(100, 25)));
        }

        #[test]
        fn test_empty_bounds() {
            assert!(Bounds::new(10, 10, 10, 40).is_empty());
            assert!(!Bounds::new(0, 0, 1, 1).is_empty());
        }

        #[test]
        fn test_size_fraction() {
            let size = Size::new(1080, 2340);
            assert_eq!(size.at_fraction(0.5, 0.8), Point::new(540, 1872));
        }

        #[test]
        fn test_bounds_display_round_trip() {
            let b = Bounds::new(-5, 0, 30, 40);
            assert_eq!(Bounds::parse(&b.to_string()).unwrap(), b);
        }
    }

    mod parsing {
        use super::*;

        #[test]
        fn test_parse_real_dump() {
            let tree = UiTree::parse(LOGIN_DUMP).unwrap();
            assert_eq!(tree.len(), 4);
            assert_eq!(tree.roots(), &[0]);
            assert_eq!(tree.children(0), &[1, 2, 3]);
            let email = tree.get(2).unwrap();
            assert_eq!(email.short_class(), "EditText");
            assert!(email.focused);
            assert_eq!(email.resource_id, "com.eatvermont.app:id/email");
            assert_eq!(tree.parent(2), Some(0));
            assert_eq!(tree.depth(2), 1);
        }

        #[test]
        fn test_parse_unescapes_entities() {
            let tree = UiTree::parse(LOGIN_DUMP).unwrap();
            assert_eq!(tree.get(3).unwrap().content_desc, "Log in & continue");
        }

        #[test]
        fn test_parse_empty_hierarchy() {
            let tree = UiTree::parse("<hierarchy rotation=\"1\"></hierarchy>").unwrap();
            assert!(tree.is_empty());
            assert_eq!(tree.rotation(), 1);
            assert!(tree.screen_bounds().is_none());
        }

        #[test]
        fn test_parse_rejects_non_dump() {
            let err = UiTree::parse("ERROR: could not get idle state.").unwrap_err();
            assert!(err.to_string().contains("not a uiautomator"));
        }

        #[test]
        fn test_parse_rejects_truncated() {
            let truncated = &LOGIN_DUMP[..LOGIN_DUMP.len() - 30];
            assert!(UiTree::parse(truncated).is_err());
        }

        #[test]
        fn test_parse_rejects_stray_close() {
            assert!(UiTree::parse("<hierarchy></node></hierarchy>").is_err());
        }

        #[test]
        fn test_unescape_numeric() {
            assert_eq!(unescape("a&#10;b&#x41;"), "a\nbA");
            assert_eq!(unescape("fish & chips"), "fish & chips");
        }
    }

    mod building {
        use super::*;

        fn sample() -> UiTree {
            UiTree::screen(
                Size::new(1080, 2340),
                [
                    UiNode::text_view("Events for you").bounds(0, 200, 1080, 300),
                    UiNode::widget("LinearLayout").bounds(0, 300, 1080, 800).children([
                        UiNode::button("Not now").bounds(100, 600, 500, 700),
                        UiNode::button("Show me").desc("Show events").bounds(580, 600, 980, 700),
                    ]),
                ],
            )
        }

        #[test]
        fn test_document_order() {
            let tree = sample();
            let labels: Vec<_> = tree.elements().map(|e| e.label().to_string()).collect();
            assert_eq!(labels, vec!["", "Events for you", "", "Not now", "Show events"]);
            assert_eq!(tree.subtree(2), vec![2, 3, 4]);
        }

        #[test]
        fn test_xml_round_trip() {
            let tree = sample();
            let reparsed = UiTree::parse(&tree.to_xml()).unwrap();
            assert_eq!(reparsed, tree);
        }

        #[test]
        fn test_escaping_round_trip() {
            let tree = UiTree::screen(
                Size::new(100, 100),
                [UiNode::text_view("Ben & Jerry's <Waterbury> \"tour\"")],
            );
            let reparsed = UiTree::parse(&tree.to_xml()).unwrap();
            assert_eq!(
                reparsed.get(1).unwrap().text,
                "Ben & Jerry's <Waterbury> \"tour\""
            );
        }

        #[test]
        fn test_fingerprint_ignores_focus() {
            let a = sample();
            let mut b = sample();
            b.nodes[3].element.focused = true;
            assert_eq!(a.fingerprint(), b.fingerprint());
        }

        #[test]
        fn test_fingerprint_detects_content_change() {
            let a = sample();
            let mut b = sample();
            b.nodes[1].element.text = "Plans".into();
            assert_ne!(a.fingerprint(), b.fingerprint());
            assert_eq!(a.fingerprint().len(), 64);
        }

        #[test]
        fn test_outline_lists_labels() {
            let outline = sample().outline();
            assert!(outline.contains("TextView \"Events for you\""));
            assert!(outline.contains("    Button \"Show me\" desc=\"Show events\""));
        }

        #[test]
        fn test_screen_bounds() {
            assert_eq!(
                sample().screen_bounds(),
                Some(Bounds::new(0, 0, 1080, 2340))
            );
        }

        #[test]
        fn test_attribute_lookup() {
            let tree = sample();
            let button = tree.get(3).unwrap();
            assert_eq!(button.attribute("clickable").as_deref(), Some("true"));
            assert_eq!(button.attribute("text").as_deref(), Some("Not now"));
            assert_eq!(button.attribute("nope"), None);
        }

        #[test]
        fn test_retain_drops_subtrees() {
            let pruned = sample().retain(|e| e.short_class() != "LinearLayout");
            let labels: Vec<_> = pruned.elements().map(|e| e.label().to_string()).collect();
            assert_eq!(labels, vec!["", "Events for you"]);
        }

        #[test]
        fn test_hit_test_outermost_first() {
            let hits = sample().hit_test(Point::new(300, 650));
            assert_eq!(hits, vec![0, 2, 3]);
            assert!(sample().hit_test(Point::new(5000, 5)).is_empty());
        }

        #[test]
        fn test_set_text() {
            let mut tree = sample();
            tree.set_text(1, "Plans");
            assert_eq!(tree.get(1).unwrap().text, "Plans");
            tree.set_text(99, "ignored");
            assert_eq!(tree.len(), 5);
        }
    }
}
