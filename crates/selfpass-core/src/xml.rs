//! Owned XML element tree with parse, serialize, and a small xpath subset.
//!
//! Elements own their children outright; detaching a child hands ownership
//! to the caller and attaching moves it in. There is no per-node locking:
//! whoever owns the [`XmlDocument`] decides how it is shared (the server
//! keeps the whole configuration behind one `RwLock`).
//!
//! Supported xpath: absolute (`/a/b`) and relative (`a/b`) child steps,
//! descendant steps (`//b`, `a//b`), the `*` wildcard, and predicates
//! `[@attr]`, `[@attr='value']` and `[n]` (1-based position).

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::XmlError;

/// One element: name, ordered attributes, text content, and children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<XmlElement>,
}

impl XmlElement {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder: set text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    /// Builder: set an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Builder: append a child.
    #[must_use]
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.attach(child);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Set or replace an attribute, keeping its original position.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| k == name) {
            slot.1 = value;
        } else {
            self.attributes.push((name.to_owned(), value));
        }
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let idx = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(idx).1)
    }

    /// Text content, or `""` when the element has none.
    #[must_use]
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Text content trimmed of surrounding whitespace.
    #[must_use]
    pub fn text_trim(&self) -> &str {
        self.text().trim()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    pub fn clear_text(&mut self) {
        self.text = None;
    }

    #[must_use]
    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    /// First child with the given name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// All children with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Append a child, taking ownership of it.
    pub fn attach(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    /// Append several children.
    pub fn attach_all(&mut self, children: impl IntoIterator<Item = XmlElement>) {
        self.children.extend(children);
    }

    /// Remove and return every child with the given name.
    pub fn detach_children(&mut self, name: &str) -> Vec<XmlElement> {
        let (detached, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.children)
            .into_iter()
            .partition(|c| c.name == name);
        self.children = kept;
        detached
    }

    /// Remove and return the children matching a predicate.
    pub fn detach_where(&mut self, mut pred: impl FnMut(&XmlElement) -> bool) -> Vec<XmlElement> {
        let (detached, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.children)
            .into_iter()
            .partition(|c| pred(c));
        self.children = kept;
        detached
    }

    fn append_text(&mut self, fragment: &str) {
        match &mut self.text {
            Some(existing) => existing.push_str(fragment),
            None => self.text = Some(fragment.to_owned()),
        }
    }

    /// Serialize this element alone, without declaration or indentation.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Write`] if serialization fails.
    pub fn to_canonical_string(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());
        write_element(&mut writer, self)?;
        bytes_to_string(writer.into_inner())
    }
}

/// A parsed or freshly built document with a single root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    root: XmlElement,
}

impl XmlDocument {
    /// Create a document with an empty root element.
    #[must_use]
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            root: XmlElement::new(root_name),
        }
    }

    #[must_use]
    pub fn from_root(root: XmlElement) -> Self {
        Self { root }
    }

    /// Parse a document.
    ///
    /// Whitespace-only text between child elements is dropped; text inside
    /// leaf elements is kept verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Parse`] for malformed input and
    /// [`XmlError::MissingRoot`] when no element is present.
    pub fn parse(input: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(input);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let position = reader.buffer_position() as u64;
            let parse_err = |reason: String| XmlError::Parse { position, reason };

            let event = reader.read_event().map_err(|e| parse_err(e.to_string()))?;
            match event {
                Event::Start(start) => stack.push(element_from_start(&start, position)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start, position)?;
                    close_element(element, &mut stack, &mut root, position)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| parse_err("unexpected closing tag".to_owned()))?;
                    close_element(element, &mut stack, &mut root, position)?;
                }
                Event::Text(text) => {
                    let unescaped = text.unescape().map_err(|e| parse_err(e.to_string()))?;
                    if let Some(top) = stack.last_mut() {
                        top.append_text(&unescaped);
                    }
                }
                Event::CData(data) => {
                    let raw = data.into_inner();
                    if let Some(top) = stack.last_mut() {
                        top.append_text(&String::from_utf8_lossy(&raw));
                    }
                }
                Event::Eof => break,
                Event::Decl(_) | Event::PI(_) | Event::DocType(_) | Event::Comment(_) => {}
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::Parse {
                position: reader.buffer_position() as u64,
                reason: format!("unclosed element '{}'", stack.last().map_or("", |e| e.name())),
            });
        }
        root.map(Self::from_root).ok_or(XmlError::MissingRoot)
    }

    #[must_use]
    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }

    #[must_use]
    pub fn into_root(self) -> XmlElement {
        self.root
    }

    /// Serialize with an XML declaration and two-space indentation.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Write`] if serialization fails.
    pub fn to_pretty_string(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_err)?;
        write_element(&mut writer, &self.root)?;
        let mut text = bytes_to_string(writer.into_inner())?;
        text.push('\n');
        Ok(text)
    }

    /// Serialize without declaration or indentation. Stable for hashing.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Write`] if serialization fails.
    pub fn to_canonical_string(&self) -> Result<String, XmlError> {
        self.root.to_canonical_string()
    }

    /// Evaluate an xpath expression against the document.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::XPath`] when the expression is outside the
    /// supported subset.
    pub fn evaluate_xpath(&self, expr: &str) -> Result<Vec<&XmlElement>, XmlError> {
        let paths = self.matching_paths(expr)?;
        Ok(paths
            .iter()
            .filter_map(|p| element_at(&self.root, p))
            .collect())
    }

    fn matching_paths(&self, expr: &str) -> Result<Vec<Vec<usize>>, XmlError> {
        let steps = parse_xpath(expr)?;
        let absolute = expr.trim_start().starts_with('/');

        // `None` is the document node; `Some(path)` addresses an element.
        let mut context: Vec<Option<Vec<usize>>> = if absolute {
            vec![None]
        } else {
            vec![Some(Vec::new())]
        };

        for step in &steps {
            let mut next: Vec<Option<Vec<usize>>> = Vec::new();
            for ctx in &context {
                let candidates = step_candidates(&self.root, ctx.as_ref(), step);
                for path in apply_predicates(&self.root, candidates, &step.predicates) {
                    let entry = Some(path);
                    if !next.contains(&entry) {
                        next.push(entry);
                    }
                }
            }
            context = next;
        }

        Ok(context.into_iter().flatten().collect())
    }
}

fn write_err(e: impl std::fmt::Display) -> XmlError {
    XmlError::Write {
        reason: e.to_string(),
    }
}

fn bytes_to_string(bytes: Vec<u8>) -> Result<String, XmlError> {
    String::from_utf8(bytes).map_err(write_err)
}

fn element_from_start(start: &BytesStart<'_>, position: u64) -> Result<XmlElement, XmlError> {
    let parse_err = |reason: String| XmlError::Parse { position, reason };
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| parse_err(e.to_string()))?
        .to_owned();
    let mut element = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| parse_err(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value: Cow<'_, str> = attr.unescape_value().map_err(|e| parse_err(e.to_string()))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn close_element(
    mut element: XmlElement,
    stack: &mut Vec<XmlElement>,
    root: &mut Option<XmlElement>,
    position: u64,
) -> Result<(), XmlError> {
    if !element.children.is_empty() && element.text.as_deref().is_some_and(|t| t.trim().is_empty()) {
        element.text = None;
    }
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlError::Parse {
            position,
            reason: "multiple root elements".to_owned(),
        });
    }
    *root = Some(element);
    Ok(())
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, element: &XmlElement) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    let text = element.text.as_deref().filter(|t| !t.is_empty());
    if element.children.is_empty() && text.is_none() {
        return writer.write_event(Event::Empty(start)).map_err(write_err);
    }

    writer.write_event(Event::Start(start)).map_err(write_err)?;
    if let Some(text) = text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(write_err)?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(write_err)
}

fn element_at<'a>(root: &'a XmlElement, path: &[usize]) -> Option<&'a XmlElement> {
    path.iter().try_fold(root, |el, idx| el.children.get(*idx))
}

// ── xpath subset ─────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, PartialEq)]
enum Predicate {
    HasAttribute(String),
    AttributeEquals(String, String),
    Position(usize),
}

#[derive(Debug, PartialEq)]
struct Step {
    axis: Axis,
    name: String,
    predicates: Vec<Predicate>,
}

fn parse_xpath(expr: &str) -> Result<Vec<Step>, XmlError> {
    let fail = |reason: &str| XmlError::XPath {
        expr: expr.to_owned(),
        reason: reason.to_owned(),
    };

    let mut steps = Vec::new();
    let mut chars = expr.trim().chars().peekable();
    let mut axis = Axis::Child;

    while chars.peek().is_some() {
        if chars.peek() == Some(&'/') {
            chars.next();
            if chars.peek() == Some(&'/') {
                chars.next();
                axis = Axis::Descendant;
            }
            continue;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c == '/' || c == '[' {
                break;
            }
            name.push(c);
            chars.next();
        }
        let name = name.trim().to_owned();
        if name.is_empty() {
            return Err(fail("empty step"));
        }
        if name != "*" && !name.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')) {
            return Err(fail("unsupported step syntax"));
        }

        let mut predicates = Vec::new();
        while chars.peek() == Some(&'[') {
            chars.next();
            let mut body = String::new();
            let mut quote: Option<char> = None;
            loop {
                let c = chars.next().ok_or_else(|| fail("unterminated predicate"))?;
                match (quote, c) {
                    (None, ']') => break,
                    (None, '\'' | '"') => quote = Some(c),
                    (Some(q), c) if c == q => quote = None,
                    _ => {}
                }
                body.push(c);
            }
            predicates.push(parse_predicate(body.trim()).ok_or_else(|| fail("unsupported predicate"))?);
        }

        steps.push(Step {
            axis: std::mem::replace(&mut axis, Axis::Child),
            name,
            predicates,
        });
    }

    if steps.is_empty() {
        return Err(fail("no steps"));
    }
    Ok(steps)
}

fn parse_predicate(body: &str) -> Option<Predicate> {
    if let Ok(n) = body.parse::<usize>() {
        return (n > 0).then_some(Predicate::Position(n));
    }
    let attr = body.strip_prefix('@')?;
    match attr.split_once('=') {
        None => Some(Predicate::HasAttribute(attr.trim().to_owned())),
        Some((name, value)) => {
            let value = value.trim();
            let unquoted = value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))?;
            Some(Predicate::AttributeEquals(name.trim().to_owned(), unquoted.to_owned()))
        }
    }
}

fn name_matches(element: &XmlElement, name: &str) -> bool {
    name == "*" || element.name == name
}

fn step_candidates(root: &XmlElement, ctx: Option<&Vec<usize>>, step: &Step) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    match (ctx, &step.axis) {
        (None, Axis::Child) => {
            if name_matches(root, &step.name) {
                out.push(Vec::new());
            }
        }
        (None, Axis::Descendant) => {
            if name_matches(root, &step.name) {
                out.push(Vec::new());
            }
            collect_descendants(root, &mut Vec::new(), &step.name, &mut out);
        }
        (Some(path), Axis::Child) => {
            if let Some(el) = element_at(root, path) {
                for (idx, child) in el.children.iter().enumerate() {
                    if name_matches(child, &step.name) {
                        let mut p = path.clone();
                        p.push(idx);
                        out.push(p);
                    }
                }
            }
        }
        (Some(path), Axis::Descendant) => {
            if let Some(el) = element_at(root, path) {
                let mut prefix = path.clone();
                collect_descendants(el, &mut prefix, &step.name, &mut out);
            }
        }
    }
    out
}

fn collect_descendants(el: &XmlElement, prefix: &mut Vec<usize>, name: &str, out: &mut Vec<Vec<usize>>) {
    for (idx, child) in el.children.iter().enumerate() {
        prefix.push(idx);
        if name_matches(child, name) {
            out.push(prefix.clone());
        }
        collect_descendants(child, prefix, name, out);
        prefix.pop();
    }
}

fn apply_predicates(root: &XmlElement, mut paths: Vec<Vec<usize>>, predicates: &[Predicate]) -> Vec<Vec<usize>> {
    for predicate in predicates {
        paths = match predicate {
            Predicate::Position(n) => paths.into_iter().nth(n.saturating_sub(1)).into_iter().collect(),
            Predicate::HasAttribute(name) => paths
                .into_iter()
                .filter(|p| element_at(root, p).is_some_and(|e| e.attribute(name).is_some()))
                .collect(),
            Predicate::AttributeEquals(name, value) => paths
                .into_iter()
                .filter(|p| element_at(root, p).is_some_and(|e| e.attribute(name) == Some(value.as_str())))
                .collect(),
        };
    }
    paths
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<PwmConfiguration xmlVersion="5">
  <!-- comment -->
  <settings>
    <setting key="display.title" syntax="STRING">
      <value>  Self Service &amp; More  </value>
    </setting>
    <setting key="security.cspHeader" syntax="STRING">
      <value><![CDATA[default-src 'self']]></value>
    </setting>
    <setting key="a/b" syntax="BOOLEAN"><value>true</value></setting>
  </settings>
</PwmConfiguration>"#;

    #[test]
    fn parse_keeps_leaf_text_verbatim_and_drops_indentation() {
        let doc = XmlDocument::parse(SAMPLE).unwrap();
        let settings = doc.root().child("settings").unwrap();
        assert_eq!(settings.text(), "");
        let first = settings.children().first().unwrap();
        assert_eq!(first.attribute("key"), Some("display.title"));
        assert_eq!(first.child("value").unwrap().text(), "  Self Service & More  ");
    }

    #[test]
    fn parse_reads_cdata() {
        let doc = XmlDocument::parse(SAMPLE).unwrap();
        let found = doc
            .evaluate_xpath("//setting[@key='security.cspHeader']/value")
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text(), "default-src 'self'");
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!(matches!(
            XmlDocument::parse("<a><b></a>"),
            Err(XmlError::Parse { .. })
        ));
        assert!(matches!(XmlDocument::parse("<a>"), Err(XmlError::Parse { .. })));
        assert!(matches!(XmlDocument::parse(""), Err(XmlError::MissingRoot)));
    }

    #[test]
    fn pretty_output_reparses_to_same_tree() {
        let doc = XmlDocument::parse(SAMPLE).unwrap();
        let text = doc.to_pretty_string().unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        let again = XmlDocument::parse(&text).unwrap();
        assert_eq!(again, doc);
    }

    #[test]
    fn canonical_output_escapes_text_and_attributes() {
        let el = XmlElement::new("value")
            .with_attribute("locale", "en\"US")
            .with_text("a < b & c");
        assert_eq!(
            el.to_canonical_string().unwrap(),
            r#"<value locale="en&quot;US">a &lt; b &amp; c</value>"#
        );
    }

    #[test]
    fn empty_element_is_self_closing() {
        assert_eq!(XmlElement::new("value").to_canonical_string().unwrap(), "<value/>");
    }

    #[test]
    fn xpath_absolute_relative_and_wildcard() {
        let doc = XmlDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.evaluate_xpath("/PwmConfiguration/settings/setting").unwrap().len(), 3);
        assert_eq!(doc.evaluate_xpath("settings/*").unwrap().len(), 3);
        assert!(doc.evaluate_xpath("/settings").unwrap().is_empty());
        assert_eq!(doc.evaluate_xpath("//setting[@syntax]").unwrap().len(), 3);
    }

    #[test]
    fn xpath_position_and_quoted_slash() {
        let doc = XmlDocument::parse(SAMPLE).unwrap();
        let second = doc.evaluate_xpath("//setting[2]").unwrap();
        assert_eq!(second[0].attribute("key"), Some("security.cspHeader"));
        let slashed = doc.evaluate_xpath("//setting[@key=\"a/b\"]/value").unwrap();
        assert_eq!(slashed[0].text(), "true");
    }

    #[test]
    fn xpath_rejects_unsupported_syntax() {
        let doc = XmlDocument::parse(SAMPLE).unwrap();
        assert!(matches!(doc.evaluate_xpath("count(//setting)"), Err(XmlError::XPath { .. })));
        assert!(matches!(doc.evaluate_xpath("//setting[@key"), Err(XmlError::XPath { .. })));
        assert!(matches!(doc.evaluate_xpath(""), Err(XmlError::XPath { .. })));
    }

    #[test]
    fn detach_and_attach_move_ownership() {
        let mut parent = XmlElement::new("setting")
            .with_child(XmlElement::new("value").with_text("1"))
            .with_child(XmlElement::new("label"))
            .with_child(XmlElement::new("value").with_text("2"));
        let values = parent.detach_children("value");
        assert_eq!(values.len(), 2);
        assert_eq!(parent.children().len(), 1);
        let mut other = XmlElement::new("setting");
        other.attach_all(values);
        assert_eq!(other.children_named("value").count(), 2);
    }

    #[test]
    fn attributes_replace_in_place() {
        let mut el = XmlElement::new("setting")
            .with_attribute("key", "a")
            .with_attribute("syntax", "STRING");
        el.set_attribute("key", "b");
        assert_eq!(el.attributes()[0], ("key".to_owned(), "b".to_owned()));
        assert_eq!(el.remove_attribute("syntax"), Some("STRING".to_owned()));
        assert_eq!(el.attribute("syntax"), None);
    }
}
